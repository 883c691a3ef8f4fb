pub mod calendar;
pub mod chat;
pub mod commands;
pub mod config;
pub mod error_recovery;
pub mod errors;
pub mod formatters;
pub mod http_utils;

pub use errors::{DonnaError, DonnaResult};
