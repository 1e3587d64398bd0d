#![forbid(unsafe_code)]

pub mod cli;
pub mod config;
pub mod detail;
pub mod dispatch;
pub mod fetch;
pub mod formats;
pub mod json_store;
pub mod listing;
pub mod logging;
pub mod pipeline;
pub mod progress;
pub mod record_store;
