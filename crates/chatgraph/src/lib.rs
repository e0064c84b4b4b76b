//! A terminal chat client that lets a hosted model answer questions with
//! tools from a remote catalog.
//!
//! The crate includes a CLI tool for using in the terminal. It can also be
//! used as a library: [`bootstrap`] assembles a ready [`Session`] from a
//! [`Config`].

#![deny(missing_docs)]

#[macro_use]
extern crate tracing;

mod bootstrap;
mod config;
mod session;

pub use bootstrap::{BootstrapError, bootstrap};
pub use config::{Config, ConfigError};
pub use session::{Session, SessionError};

/// The system prompt used when none is given.
pub const DEFAULT_SYSTEM_PROMPT: &str = include_str!("./system_prompt.md");

/// Re-exports of [`chatgraph_core`] crate.
pub mod core {
    pub use chatgraph_core::*;
}
