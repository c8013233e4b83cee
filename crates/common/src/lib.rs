//! Shared entity types, error taxonomy and configuration for every concord
//! crate. Nothing in here touches the filesystem except `config::SystemConfig::load`.

pub mod config;
pub mod error;
pub mod slug;
pub mod types;

pub use error::{AgentError, Result};
pub use types::*;
