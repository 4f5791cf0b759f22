//! Line counting over raw container log output.
//!
//! A line is terminated by a line-feed byte. A non-empty stream whose last byte
//! is not a line feed contributes one more (partial) line.

use tokio::io::{AsyncRead, AsyncReadExt};

/// Size of the read buffer used by [`count_lines`].
const READ_BUF_SIZE: usize = 8 * 1024;

/// Incremental line counter.
///
/// Bytes can be fed in chunks of any size; the result does not depend on where
/// the chunk boundaries fall.
///
/// # Examples
///
/// ```
/// # use dockerx::logcount::LineCounter;
/// let mut counter = LineCounter::default();
/// counter.update(b"a\nb");
/// counter.update(b"\nc");
/// assert_eq!(counter.finish(), 3);
/// ```
#[derive(Debug, Default, Clone, Copy)]
pub struct LineCounter {
    newlines: u64,
    last_byte: Option<u8>,
}

impl LineCounter {
    pub fn update(&mut self, chunk: &[u8]) {
        self.newlines += memchr::memchr_iter(b'\n', chunk).count() as u64;
        if let Some(&last) = chunk.last() {
            self.last_byte = Some(last);
        }
    }

    pub fn finish(self) -> u64 {
        match self.last_byte {
            Some(b'\n') | None => self.newlines,
            Some(_) => self.newlines + 1,
        }
    }
}

/// Consumes `reader` to exhaustion and returns the number of lines it contained.
///
/// # Errors
///
/// Returns the underlying I/O error if any read fails before the end of the
/// stream. Lines counted before the failure are discarded.
pub async fn count_lines<R>(mut reader: R) -> std::io::Result<u64>
where
    R: AsyncRead + Unpin,
{
    let mut counter = LineCounter::default();
    let mut buf = vec![0u8; READ_BUF_SIZE];
    loop {
        let n = reader.read(&mut buf).await?;
        if n == 0 {
            break;
        }
        counter.update(&buf[..n]);
    }

    Ok(counter.finish())
}

#[cfg(test)]
mod tests {
    use std::io;
    use std::pin::Pin;
    use std::task::{Context, Poll};

    use tokio::io::ReadBuf;

    use super::*;

    async fn count(data: &[u8]) -> u64 {
        count_lines(data).await.unwrap()
    }

    #[tokio::test]
    async fn test_count_empty_stream() {
        assert_eq!(count(b"").await, 0);
    }

    #[tokio::test]
    async fn test_count_terminated_lines() {
        assert_eq!(count(b"a\n").await, 1);
        assert_eq!(count(b"a\nb\n").await, 2);
        assert_eq!(count(b"line1\nline2\nline3\n").await, 3);
    }

    #[tokio::test]
    async fn test_count_trailing_partial_line() {
        assert_eq!(count(b"a").await, 1);
        assert_eq!(count(b"a\nb").await, 2);
    }

    #[tokio::test]
    async fn test_count_blank_lines() {
        assert_eq!(count(b"\n").await, 1);
        assert_eq!(count(b"\n\n\n").await, 3);
    }

    #[tokio::test]
    async fn test_count_larger_than_read_buffer() {
        let mut data = b"0123456789\n".repeat(READ_BUF_SIZE);
        data.extend_from_slice(b"tail");
        assert_eq!(count(&data).await, READ_BUF_SIZE as u64 + 1);
    }

    #[test]
    fn test_counter_chunk_boundaries() {
        let data = b"first\nsecond\n\nfourth";
        for split in 0..=data.len() {
            let mut counter = LineCounter::default();
            counter.update(&data[..split]);
            counter.update(&data[split..]);
            assert_eq!(counter.finish(), 4, "split at {split}");
        }
    }

    #[test]
    fn test_counter_ignores_empty_chunks() {
        let mut counter = LineCounter::default();
        counter.update(b"a\n");
        counter.update(b"");
        assert_eq!(counter.finish(), 1);
    }

    /// Yields some data and then fails.
    struct FailingReader {
        data: Option<&'static [u8]>,
    }

    impl AsyncRead for FailingReader {
        fn poll_read(
            mut self: Pin<&mut Self>,
            _cx: &mut Context<'_>,
            buf: &mut ReadBuf<'_>,
        ) -> Poll<io::Result<()>> {
            match self.data.take() {
                Some(data) => {
                    buf.put_slice(data);
                    Poll::Ready(Ok(()))
                }
                None => Poll::Ready(Err(io::Error::new(
                    io::ErrorKind::ConnectionReset,
                    "connection reset",
                ))),
            }
        }
    }

    #[tokio::test]
    async fn test_count_read_error_discards_partial_count() {
        let reader = FailingReader {
            data: Some(b"a\nb\n"),
        };
        let err = count_lines(reader).await.unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::ConnectionReset);
    }
}
