pub mod bucket;
pub mod calendar;
pub mod client;
pub mod config;
pub mod db;
pub mod display;
pub mod error;
pub mod models;
pub mod server;
pub mod session;

pub use error::{Error, Result, ValidationError};
