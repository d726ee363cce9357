//! CLI command implementations

mod capture;
mod config;
mod info;

pub use capture::{CaptureArgs, capture};
pub use config::{ConfigArgs, config};
pub use info::{InfoArgs, info};
