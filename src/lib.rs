// RIOTBENCH -- BENCHMARK HARNESS FOR EMBEDDED / VIRTUALIZATION TARGETS
// BUILD, FLASH, RUN EXTERNAL TOOLS AND EXTRACT TELEMETRY FROM DEVICE CONSOLES
//
// LIBRARY CRATE: THE ENGINE. THE BINARY (src/main.rs) ONLY WIRES CLI + SIGNALS.

pub mod config;
pub mod coordinator;
pub mod error;
pub mod executor;
pub mod marker;
pub mod results;
pub mod retry;
pub mod stream;
pub mod supervisor;
pub mod telemetry;
