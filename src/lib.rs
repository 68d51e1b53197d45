// Public API - configuration, session state, the ping loop and its output
pub mod cli;
pub mod config;
pub mod export;
pub mod ping;
pub mod probe;
pub mod resolve;
pub mod state;
pub mod timing;
