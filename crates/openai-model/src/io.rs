mod body;
mod sse;

pub use body::{Body, ReadError};
pub use sse::Sse;
