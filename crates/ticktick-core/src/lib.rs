//! Core types, filtering engine, and configuration for ticktick-tools.
//!
//! This crate holds everything that is independent of the HTTP transport:
//! the task/project data model, the timezone and date-window filtering
//! engine, the batch operation executor, and text formatting for tool
//! output.

pub mod batch;
pub mod config;
pub mod error;
pub mod filter;
pub mod format;
pub mod timezone;
pub mod types;

pub use config::Config;
pub use error::{Error, Result};
pub use filter::{QueryClock, TaskFilter};
pub use types::{DateFilterKind, Priority, Project, ProjectData, Task};
