pub mod app;
pub mod cli;
pub mod config;
pub mod control;
pub mod filter;
pub mod offline;
pub mod pipeline;
pub mod resolver;
pub mod types;
