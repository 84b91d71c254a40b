//! ndjson line framing over any async byte stream.

use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};

/// Read one ndjson line, stripping the trailing newline.
///
/// Returns `Ok(None)` at end of stream.
pub async fn read_line<R: AsyncBufRead + Unpin>(reader: &mut R) -> std::io::Result<Option<String>> {
    let mut buf = String::new();
    let bytes_read = reader.read_line(&mut buf).await?;
    if bytes_read == 0 {
        return Ok(None);
    }
    while buf.ends_with('\n') || buf.ends_with('\r') {
        buf.pop();
    }
    Ok(Some(buf))
}

/// Write one ndjson line and flush.
pub async fn write_line<W: AsyncWrite + Unpin>(writer: &mut W, line: &str) -> std::io::Result<()> {
    writer.write_all(line.as_bytes()).await?;
    writer.write_all(b"\n").await?;
    writer.flush().await
}
