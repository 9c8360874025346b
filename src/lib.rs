pub mod app;
pub mod cli;
pub mod config;
pub mod db;
pub mod error;
pub mod handlers;
pub mod middleware;
pub mod notify;
pub mod plugins;
pub mod scrape;
pub mod server;
pub mod service;
pub mod site;
pub mod types;

pub use config::Config;
pub use error::PilotError;
pub use plugins::{Plugin, PluginContext};
