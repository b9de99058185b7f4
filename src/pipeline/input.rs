//! Source buffering: drain the caller's stream once into replayable memory.
//!
//! Many converters need random access or several passes, while the caller's
//! stream may be forward-only (a clipboard pipe, a socket). The pipeline
//! therefore reads it to the end exactly once and hands the converter a fresh
//! cursor over the buffered bytes. After this stage the caller's stream
//! position no longer matters.

use crate::error::{ResourceError, ResourceOp};
use std::io::Cursor;
use std::path::Path;
use tokio::io::{AsyncRead, AsyncReadExt};
use tracing::debug;

/// Why buffering stopped early.
#[derive(Debug)]
pub enum BufferError {
    Io(ResourceError),
    TooLarge { limit: u64 },
}

/// Bytes drained from a source, replayable from the start.
#[derive(Debug, Clone, Default)]
pub struct SourceBuffer {
    bytes: Vec<u8>,
}

impl SourceBuffer {
    pub fn len(&self) -> u64 {
        self.bytes.len() as u64
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.bytes
    }

    /// A reader positioned at the first byte. Each call starts over.
    pub fn reader(&self) -> Cursor<&[u8]> {
        Cursor::new(&self.bytes)
    }
}

impl From<Vec<u8>> for SourceBuffer {
    fn from(bytes: Vec<u8>) -> Self {
        Self { bytes }
    }
}

/// Read `source` to the end into a [`SourceBuffer`].
///
/// With a `limit`, reading stops as soon as one byte more than the limit has
/// been seen, so an oversized stream is never fully materialised.
pub async fn buffer_source<R>(
    source: &mut R,
    limit: Option<u64>,
    initial_capacity: usize,
) -> Result<SourceBuffer, BufferError>
where
    R: AsyncRead + Unpin + ?Sized,
{
    let mut bytes = Vec::with_capacity(initial_capacity);

    match limit {
        None => {
            source
                .read_to_end(&mut bytes)
                .await
                .map_err(|e| BufferError::Io(ResourceError::stream(ResourceOp::BufferSource, e)))?;
        }
        Some(limit) => {
            let mut bounded = AsyncReadExt::take(&mut *source, limit.saturating_add(1));
            bounded
                .read_to_end(&mut bytes)
                .await
                .map_err(|e| BufferError::Io(ResourceError::stream(ResourceOp::BufferSource, e)))?;
            if bytes.len() as u64 > limit {
                return Err(BufferError::TooLarge { limit });
            }
        }
    }

    debug!("Buffered {} source bytes", bytes.len());
    Ok(SourceBuffer { bytes })
}

/// Open a source file for shared reading.
pub async fn open_source(path: &Path) -> Result<tokio::fs::File, ResourceError> {
    let file = tokio::fs::File::open(path)
        .await
        .map_err(|e| ResourceError::at(ResourceOp::OpenSource, path, e))?;
    debug!("Opened source {}", path.display());
    Ok(file)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::AsyncReadExt;

    #[tokio::test]
    async fn buffers_whole_stream_and_replays() {
        let mut src: &[u8] = b"replay me";
        let buf = buffer_source(&mut src, None, 0).await.unwrap();
        assert_eq!(buf.len(), 9);
        assert!(src.is_empty(), "caller stream should be drained");

        for _ in 0..2 {
            let mut out = String::new();
            buf.reader().read_to_string(&mut out).await.unwrap();
            assert_eq!(out, "replay me");
        }
    }

    #[tokio::test]
    async fn empty_source_is_fine() {
        let mut src: &[u8] = b"";
        let buf = buffer_source(&mut src, Some(10), 16).await.unwrap();
        assert!(buf.is_empty());
    }

    #[tokio::test]
    async fn limit_is_inclusive() {
        let mut src: &[u8] = b"12345";
        assert_eq!(buffer_source(&mut src, Some(5), 0).await.unwrap().len(), 5);

        let mut src: &[u8] = b"123456";
        match buffer_source(&mut src, Some(5), 0).await {
            Err(BufferError::TooLarge { limit }) => assert_eq!(limit, 5),
            other => panic!("expected TooLarge, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn read_errors_are_resource_errors() {
        let mut src = tokio_test::io::Builder::new()
            .read(b"partial")
            .read_error(std::io::Error::new(std::io::ErrorKind::ConnectionReset, "reset"))
            .build();
        match buffer_source(&mut src, None, 0).await {
            Err(BufferError::Io(e)) => assert_eq!(e.op, ResourceOp::BufferSource),
            other => panic!("expected Io, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn open_missing_source() {
        let err = open_source(Path::new("/definitely/missing.txt"))
            .await
            .unwrap_err();
        assert!(err.is_not_found());
        assert_eq!(err.op, ResourceOp::OpenSource);
    }
}
