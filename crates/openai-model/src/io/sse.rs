use std::fmt::{self, Display};

use super::{Body, ReadError};

#[derive(Debug, PartialEq, Eq)]
pub enum Error {
    Read(ReadError),
    InvalidPayload,
}

impl Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Read(err) => Display::fmt(err, f),
            Error::InvalidPayload => write!(f, "malformed event stream"),
        }
    }
}

/// A type for reading server-sent events from a response body.
///
/// Only the `data` field is surfaced. Comments and all other fields are
/// skipped; blocks without data produce no event.
pub struct Sse {
    buf: Vec<u8>,
    body: Body,
}

impl Sse {
    #[inline]
    pub fn new(body: Body) -> Self {
        Self {
            buf: Vec::new(),
            body,
        }
    }

    pub async fn next_event(&mut self) -> Result<Option<String>, Error> {
        loop {
            // Drain complete blocks that are already buffered first.
            while let Some(block) = self.take_block() {
                if let Some(event) = parse_block(&block)? {
                    return Ok(Some(event));
                }
            }

            let Some(bytes) =
                self.body.read().await.map_err(Error::Read)?
            else {
                // An incomplete trailing block is discarded.
                return Ok(None);
            };
            // Carriage returns are dropped, so `\r\n` line endings behave
            // like `\n`.
            self.buf.extend(bytes.iter().copied().filter(|b| *b != b'\r'));
        }
    }

    fn take_block(&mut self) -> Option<Vec<u8>> {
        let eob_idx = self.buf.windows(2).position(|w| w == b"\n\n")?;
        let block = self.buf[..eob_idx].to_vec();
        self.buf.drain(..eob_idx + 2);
        Some(block)
    }
}

// event         = *( comment / field ) end-of-line
// comment       = colon *any-char end-of-line
// field         = 1*name-char [ colon [ space ] *any-char ] end-of-line
fn parse_block(block: &[u8]) -> Result<Option<String>, Error> {
    let Ok(block) = str::from_utf8(block) else {
        return Err(Error::InvalidPayload);
    };

    let mut data: Option<String> = None;
    for line in block.split('\n') {
        if line.is_empty() || line.starts_with(':') {
            continue;
        }
        let (name, value) = match line.split_once(':') {
            Some((name, value)) => {
                (name, value.strip_prefix(' ').unwrap_or(value))
            }
            None => (line, ""),
        };
        if name != "data" {
            // Unknown fields are ignored, along with `event`, `id` and
            // `retry`.
            continue;
        }
        match &mut data {
            Some(data) => {
                data.push('\n');
                data.push_str(value);
            }
            None => data = Some(value.to_owned()),
        }
    }
    Ok(data)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sse_of(pieces: &[&'static [u8]]) -> Sse {
        Sse::new(Body::fixture(pieces))
    }

    #[tokio::test]
    async fn test_normal_events() {
        let mut sse = sse_of(&[b"data: hello\n\n", b"data: bye\n\n"]);
        assert_eq!(sse.next_event().await.unwrap().unwrap(), "hello");
        assert_eq!(sse.next_event().await.unwrap().unwrap(), "bye");
        assert_eq!(sse.next_event().await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_quirk_streaming() {
        let mut sse = sse_of(&[b"data:", b" hello\n", b"\n"]);
        assert_eq!(sse.next_event().await.unwrap().unwrap(), "hello");
        assert_eq!(sse.next_event().await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_events_in_one_chunk() {
        let mut sse = sse_of(&[b"data: a\n\ndata: b\n\n"]);
        assert_eq!(sse.next_event().await.unwrap().unwrap(), "a");
        assert_eq!(sse.next_event().await.unwrap().unwrap(), "b");
        assert_eq!(sse.next_event().await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_comments_crlf_and_split_utf8() {
        let mut sse = sse_of(&[
            b": keep-alive\r\n\r\n",
            b"event: chunk\r\ndata: caf\xc3",
            b"\xa9\r\n\r\n",
        ]);
        assert_eq!(sse.next_event().await.unwrap().unwrap(), "café");
        assert_eq!(sse.next_event().await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_unknown_fields_are_ignored() {
        let mut sse =
            sse_of(&[b"x-trace: 1\ndata: hello\n\n", b"xxxxxx\n\n"]);
        assert_eq!(sse.next_event().await.unwrap().unwrap(), "hello");
        assert_eq!(sse.next_event().await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_empty_data_lines() {
        let mut sse = sse_of(&[b"data:\ndata: x\n\n", b"data\n\n"]);
        assert_eq!(sse.next_event().await.unwrap().unwrap(), "\nx");
        assert_eq!(sse.next_event().await.unwrap().unwrap(), "");
        assert_eq!(sse.next_event().await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_invalid_data() {
        let mut sse = sse_of(&[b"data: \xff\n\n"]);
        assert_eq!(sse.next_event().await.unwrap_err(), Error::InvalidPayload);

        let mut sse = sse_of(&[b"xxxxxx\n"]);
        assert_eq!(sse.next_event().await.unwrap(), None);

        let mut sse = sse_of(&[b"data: hello\n", b"data: bye\n"]);
        assert_eq!(sse.next_event().await.unwrap(), None);
    }
}
