mod client;
pub mod runner;
