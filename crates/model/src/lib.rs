//! Provider-neutral protocol between the chat workflow and language models.
//!
//! The workflow talks to every model through the types defined here: it
//! builds a [`ModelRequest`], hands it to a [`ModelProvider`], and pulls
//! [`ModelResponseEvent`]s out of the streamed [`ModelResponse`]. Providers
//! translate these types into their own wire formats.
//!
//! Nothing in this crate performs I/O. Retries, history trimming and tool
//! execution belong to the callers.

#![deny(missing_docs)]

mod error;
mod opaque;
mod provider;
mod request;
mod response;

pub use error::*;
pub use opaque::*;
pub use provider::*;
pub use request::*;
pub use response::*;
