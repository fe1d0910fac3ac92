// Library exports for runlink
// This allows the test suite to import modules

pub mod cli;
pub mod config;
pub mod console;
pub mod executor;
pub mod keys;
pub mod protocol;
pub mod session;
pub mod transport;
