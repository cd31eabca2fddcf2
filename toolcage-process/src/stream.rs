use std::io;

use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::sync::oneshot;

const CHUNK_SIZE: usize = 8 * 1024;

/// Bytes captured from a child pipe.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CapturedStream {
    /// At most `limit` bytes, in arrival order.
    pub bytes: Vec<u8>,
    /// Everything the pipe produced, including dropped bytes.
    pub total_bytes: usize,
}

impl CapturedStream {
    pub fn exceeded(&self) -> bool {
        self.total_bytes > self.bytes.len()
    }

    pub fn to_string_lossy(&self) -> String {
        String::from_utf8_lossy(&self.bytes).into_owned()
    }
}

/// Drain `reader` to EOF, keeping at most `limit` bytes.
///
/// The pipe is always drained completely so the writer never blocks on a full
/// buffer. The first time the limit is crossed `on_overflow` fires, letting the
/// caller kill the producer instead of waiting for it.
pub async fn read_bounded<R: AsyncRead + Unpin>(
    reader: &mut R,
    limit: usize,
    mut on_overflow: Option<oneshot::Sender<usize>>,
) -> io::Result<CapturedStream> {
    let mut captured = CapturedStream::default();
    let mut chunk = vec![0_u8; CHUNK_SIZE];

    loop {
        let read = match reader.read(&mut chunk).await {
            Ok(0) => break,
            Ok(read) => read,
            Err(err) if err.kind() == io::ErrorKind::Interrupted => continue,
            Err(err) => return Err(err),
        };

        let room = limit.saturating_sub(captured.bytes.len());
        let keep = room.min(read);
        if let Some(data) = chunk.get(..keep) {
            captured.bytes.extend_from_slice(data);
        }
        captured.total_bytes += read;

        if captured.total_bytes > limit {
            if let Some(notify) = on_overflow.take() {
                let _ = notify.send(limit);
            }
        }
    }

    Ok(captured)
}
