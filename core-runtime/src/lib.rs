//! # Core Runtime Module
//!
//! Foundational runtime infrastructure for the session core:
//! - Logging and tracing infrastructure
//! - Configuration management
//! - Event bus for session lifecycle events

pub mod config;
pub mod error;
pub mod events;
pub mod logging;

pub use error::{Error, Result};
