//! Target accounting: count bytes as they pass to the caller's stream.
//!
//! Counting on the way through gives an exact `bytes_written` without
//! requiring the target to be seekable, and without trusting the converter to
//! report it.

use std::io;
use std::pin::Pin;
use std::task::{Context, Poll};
use tokio::io::AsyncWrite;

/// An [`AsyncWrite`] adapter that counts bytes accepted by the inner writer.
///
/// `poll_shutdown` only flushes: the inner stream belongs to the caller and
/// must stay open.
pub struct CountingWriter<'a> {
    inner: &'a mut (dyn AsyncWrite + Unpin + Send),
    written: u64,
}

impl<'a> CountingWriter<'a> {
    pub fn new(inner: &'a mut (dyn AsyncWrite + Unpin + Send)) -> Self {
        Self { inner, written: 0 }
    }

    pub fn written(&self) -> u64 {
        self.written
    }
}

impl AsyncWrite for CountingWriter<'_> {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        let this = self.get_mut();
        match Pin::new(&mut *this.inner).poll_write(cx, buf) {
            Poll::Ready(Ok(n)) => {
                this.written += n as u64;
                Poll::Ready(Ok(n))
            }
            other => other,
        }
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut *self.get_mut().inner).poll_flush(cx)
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut *self.get_mut().inner).poll_flush(cx)
    }
}
