pub mod agent;
pub mod app;
pub mod bruteforcer;
pub mod cli;
pub mod config;
pub mod http;
pub mod logging;
pub mod output;
pub mod probe;
pub mod runner;
pub mod utils;

#[cfg(test)]
mod tests;
