// Library exports for customrp
// The binary and the integration tests build on these modules

pub mod app;
pub mod cli;
pub mod command;
pub mod config;
pub mod connection;
pub mod instance;
pub mod ipc;
pub mod logging;
pub mod presence;
