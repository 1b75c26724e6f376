// Library for the binary and integration tests

pub mod assembler;
pub mod backup;
pub mod config;
pub mod correlator;
pub mod detector;
pub mod error;
pub mod evaluator;
pub mod extensions;
pub mod logging;
pub mod models;
pub mod sampler;
pub mod status;
