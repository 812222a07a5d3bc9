pub mod commands;
pub mod config;
pub mod log_sink;
pub mod serial;
pub mod session;
