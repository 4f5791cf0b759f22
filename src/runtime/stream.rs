use std::io;
use std::pin::Pin;
use std::task::{Context, Poll, ready};

use hyper::body::{Body, Bytes, Incoming};
use tokio::io::{AsyncRead, ReadBuf};

use super::BoxError;

/// Length of the header in front of every frame of a multiplexed log stream.
const FRAME_HEADER_LEN: usize = 8;

/// Raw log bytes of a container, read from a streaming HTTP response body.
///
/// Containers without a TTY deliver their logs as a multiplexed stream in which
/// every chunk of stdout/stderr output is prefixed by an 8 byte header
/// (`[stream, 0, 0, 0, len_be_u32]`). Those headers are stripped so that only
/// the log output itself is yielded.
#[derive(Debug)]
pub struct LogStream<B = Incoming> {
    body: B,
    chunk: Bytes,
    framing: Framing,
    eof: bool,
}

#[derive(Debug)]
enum Framing {
    Raw,
    Multiplexed {
        header: [u8; FRAME_HEADER_LEN],
        header_len: usize,
        payload_left: usize,
    },
}

impl<B> LogStream<B> {
    /// Passes the body through unchanged (TTY containers).
    pub fn raw(body: B) -> Self {
        Self::with_framing(body, Framing::Raw)
    }

    /// Strips the frame headers of a multiplexed stream.
    pub fn multiplexed(body: B) -> Self {
        Self::with_framing(
            body,
            Framing::Multiplexed {
                header: [0; FRAME_HEADER_LEN],
                header_len: 0,
                payload_left: 0,
            },
        )
    }

    fn with_framing(body: B, framing: Framing) -> Self {
        Self {
            body,
            chunk: Bytes::new(),
            framing,
            eof: false,
        }
    }

    /// Moves bytes of the current chunk into `buf`, returns how many were copied.
    ///
    /// Frame header bytes are consumed without being copied.
    fn consume(&mut self, buf: &mut ReadBuf<'_>) -> usize {
        match &mut self.framing {
            Framing::Raw => {
                let n = self.chunk.len().min(buf.remaining());
                buf.put_slice(&self.chunk.split_to(n));
                n
            }
            Framing::Multiplexed {
                header,
                header_len,
                payload_left,
            } => {
                if *payload_left == 0 {
                    let n = (FRAME_HEADER_LEN - *header_len).min(self.chunk.len());
                    header[*header_len..*header_len + n].copy_from_slice(&self.chunk.split_to(n));
                    *header_len += n;
                    if *header_len == FRAME_HEADER_LEN {
                        *payload_left =
                            u32::from_be_bytes([header[4], header[5], header[6], header[7]])
                                as usize;
                        *header_len = 0;
                    }
                    return 0;
                }
                let n = (*payload_left).min(self.chunk.len()).min(buf.remaining());
                buf.put_slice(&self.chunk.split_to(n));
                *payload_left -= n;
                n
            }
        }
    }

    fn finish(&self) -> io::Result<()> {
        match self.framing {
            Framing::Multiplexed {
                header_len,
                payload_left,
                ..
            } if header_len > 0 || payload_left > 0 => Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                "log stream ended inside a multiplexed frame",
            )),
            _ => Ok(()),
        }
    }
}

impl<B> AsyncRead for LogStream<B>
where
    B: Body<Data = Bytes> + Unpin,
    B::Error: Into<BoxError>,
{
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        let this = self.get_mut();
        loop {
            if buf.remaining() == 0 {
                return Poll::Ready(Ok(()));
            }
            if !this.chunk.is_empty() {
                if this.consume(buf) > 0 {
                    return Poll::Ready(Ok(()));
                }
                continue;
            }
            if this.eof {
                return Poll::Ready(this.finish());
            }
            match ready!(Pin::new(&mut this.body).poll_frame(cx)) {
                Some(Ok(frame)) => {
                    // trailers carry no log output
                    if let Ok(data) = frame.into_data() {
                        this.chunk = data;
                    }
                }
                Some(Err(err)) => return Poll::Ready(Err(io::Error::other(err))),
                None => this.eof = true,
            }
        }
    }
}
