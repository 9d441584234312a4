//! Line and literal framing.
//!
//! A response is one CRLF line, extended by `{n}\r\n<n bytes>` literals
//! and the text that follows each of them.

use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufReader};

use crate::{Error, Result};

const BUFFER_SIZE: usize = 8192;

/// Longest line accepted outside literals.
const MAX_LINE_LENGTH: usize = 1024 * 1024;

/// Largest literal accepted.
const MAX_LITERAL_SIZE: usize = 64 * 1024 * 1024;

/// Buffered framing over a byte stream.
pub struct FramedStream<S> {
    reader: BufReader<S>,
}

impl<S> FramedStream<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    /// Wraps a stream.
    pub fn new(stream: S) -> Self {
        Self {
            reader: BufReader::with_capacity(BUFFER_SIZE, stream),
        }
    }

    /// Reads one complete response with its literals inlined.
    ///
    /// # Errors
    ///
    /// Returns an error on EOF, I/O failure or an oversized line/literal.
    pub async fn read_response(&mut self) -> Result<Vec<u8>> {
        let mut response = Vec::new();
        loop {
            let line = self.read_line().await?;
            response.extend_from_slice(&line);

            let Some(len) = literal_length(&line) else {
                return Ok(response);
            };
            if len > MAX_LITERAL_SIZE {
                return Err(Error::Protocol(format!(
                    "literal too large: {len} bytes (max {MAX_LITERAL_SIZE})"
                )));
            }
            let start = response.len();
            response.resize(start + len, 0);
            self.reader.read_exact(&mut response[start..]).await?;
        }
    }

    async fn read_line(&mut self) -> Result<Vec<u8>> {
        let mut line = Vec::new();
        loop {
            let available = self.reader.fill_buf().await?;
            if available.is_empty() {
                return Err(Error::Io(std::io::Error::new(
                    std::io::ErrorKind::UnexpectedEof,
                    "connection closed by server",
                )));
            }

            // The CR may sit at the end of the previous chunk.
            let search_from = line.len().saturating_sub(1);
            line.extend_from_slice(available);
            let consumed = available.len();

            if let Some(pos) = line[search_from..]
                .windows(2)
                .position(|w| w == b"\r\n")
            {
                let end = search_from + pos + 2;
                let surplus = line.len() - end;
                line.truncate(end);
                self.reader.consume(consumed - surplus);
                return Ok(line);
            }
            self.reader.consume(consumed);

            if line.len() > MAX_LINE_LENGTH {
                return Err(Error::Protocol("line too long".to_string()));
            }
        }
    }

    /// Writes and flushes bytes.
    ///
    /// # Errors
    ///
    /// Returns an error if the write fails.
    pub async fn write_all(&mut self, data: &[u8]) -> Result<()> {
        let stream = self.reader.get_mut();
        stream.write_all(data).await?;
        stream.flush().await?;
        Ok(())
    }

    /// Returns the inner stream. Only valid when no data is buffered, e.g.
    /// right after the tagged OK to STARTTLS.
    pub fn into_inner(self) -> S {
        self.reader.into_inner()
    }
}

/// Length announced by a trailing `{n}` or `{n+}`.
fn literal_length(line: &[u8]) -> Option<usize> {
    let line = line.strip_suffix(b"\r\n")?;
    let line = line.strip_suffix(b"}")?;
    let open = line.iter().rposition(|&b| b == b'{')?;
    let digits = &line[open + 1..];
    let digits = digits.strip_suffix(b"+").unwrap_or(digits);
    std::str::from_utf8(digits).ok()?.parse().ok()
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::redundant_clone,
    clippy::manual_string_new,
    clippy::needless_collect,
    clippy::unreadable_literal,
    clippy::used_underscore_items,
    clippy::similar_names
)]
mod tests {
    use super::*;
    use tokio_test::io::Builder;

    #[test]
    fn test_literal_length() {
        assert_eq!(literal_length(b"BODY[] {123}\r\n"), Some(123));
        assert_eq!(literal_length(b"{7+}\r\n"), Some(7));
        assert_eq!(literal_length(b"{0}\r\n"), Some(0));
        assert_eq!(literal_length(b"no literal\r\n"), None);
        assert_eq!(literal_length(b"{12}"), None);
        assert_eq!(literal_length(b"{abc}\r\n"), None);
    }

    #[tokio::test]
    async fn test_reads_lines_one_at_a_time() {
        let mock = Builder::new()
            .read(b"* OK ready\r\nA0001 OK done\r\n")
            .build();
        let mut framed = FramedStream::new(mock);
        assert_eq!(framed.read_response().await.unwrap(), b"* OK ready\r\n");
        assert_eq!(framed.read_response().await.unwrap(), b"A0001 OK done\r\n");
    }

    #[tokio::test]
    async fn test_crlf_split_across_reads() {
        let mock = Builder::new().read(b"* OK split\r").read(b"\n").build();
        let mut framed = FramedStream::new(mock);
        assert_eq!(framed.read_response().await.unwrap(), b"* OK split\r\n");
    }

    #[tokio::test]
    async fn test_literal_inlined() {
        let mock = Builder::new()
            .read(b"* 1 FETCH (BODY[] {6}\r\n")
            .read(b"a\r\nb\r\n)")
            .read(b"\r\n")
            .build();
        let mut framed = FramedStream::new(mock);
        assert_eq!(
            framed.read_response().await.unwrap(),
            b"* 1 FETCH (BODY[] {6}\r\na\r\nb\r\n)\r\n"
        );
    }

    #[tokio::test]
    async fn test_oversized_literal_rejected() {
        let header = format!("* 1 FETCH (BODY[] {{{}}}\r\n", MAX_LITERAL_SIZE + 1);
        let mock = Builder::new().read(header.as_bytes()).build();
        let mut framed = FramedStream::new(mock);
        let err = framed.read_response().await.unwrap_err();
        assert!(err.to_string().contains("literal too large"));
    }

    #[tokio::test]
    async fn test_eof() {
        let mock = Builder::new().read(b"* OK partial").build();
        let mut framed = FramedStream::new(mock);
        assert!(matches!(framed.read_response().await, Err(Error::Io(_))));
    }

    #[tokio::test]
    async fn test_write_all() {
        let mock = Builder::new().write(b"A0001 NOOP\r\n").build();
        let mut framed = FramedStream::new(mock);
        framed.write_all(b"A0001 NOOP\r\n").await.unwrap();
    }
}
