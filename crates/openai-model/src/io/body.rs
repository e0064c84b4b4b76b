use std::fmt::{self, Display};

use bytes::Bytes;
use reqwest::Response;

/// Failure to read the next piece of a response body.
#[derive(Debug, PartialEq, Eq)]
pub struct ReadError(String);

impl Display for ReadError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "failed to read response body: {}", self.0)
    }
}

/// The byte source behind an event stream.
pub enum Body {
    Http(Response),
    /// Canned pieces, served in order.
    #[cfg(test)]
    Fixture(std::vec::IntoIter<Bytes>),
}

impl Body {
    #[inline]
    pub fn http(response: Response) -> Self {
        Body::Http(response)
    }

    #[cfg(test)]
    pub fn fixture(pieces: &[&'static [u8]]) -> Self {
        let pieces: Vec<Bytes> =
            pieces.iter().map(|p| Bytes::from_static(*p)).collect();
        Body::Fixture(pieces.into_iter())
    }

    /// Returns the next piece of the body, or `None` at its end.
    pub async fn read(&mut self) -> Result<Option<Bytes>, ReadError> {
        match self {
            Body::Http(response) => response.chunk().await.map_err(|err| {
                warn!("failed to read response body: {err}");
                ReadError(err.to_string())
            }),
            #[cfg(test)]
            Body::Fixture(pieces) => Ok(pieces.next()),
        }
    }
}
