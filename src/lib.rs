pub mod app;
pub mod cache;
pub mod cli;
pub mod config;
pub mod filters;
pub mod logging;
pub mod source;
pub mod state;
pub mod utils;
pub mod web;
