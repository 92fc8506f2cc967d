//! Newline-delimited record framing over async byte streams

use std::io;

use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};

pub const DELIMITER: u8 = b'\n';

/// Outcome of reading one record
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Frame {
    /// A record is in the buffer, delimiter stripped
    Record,
    /// An empty line. Not end of stream, read again.
    Blank,
    /// The stream ended on a record boundary
    Eof,
}

/// Read the next record into `buf`, replacing its contents.
///
/// If the stream closes part way through a record the partial bytes are left
/// in `buf` and an `UnexpectedEof` error is returned. Other I/O errors are
/// returned as-is, again with whatever was read kept in `buf`.
pub async fn read_record<R>(reader: &mut R, buf: &mut Vec<u8>) -> io::Result<Frame>
where
    R: AsyncBufRead + Unpin,
{
    buf.clear();
    let n = reader.read_until(DELIMITER, buf).await?;
    if n == 0 {
        return Ok(Frame::Eof);
    }

    if buf.last() != Some(&DELIMITER) {
        return Err(io::Error::new(
            io::ErrorKind::UnexpectedEof,
            format!("stream closed after {} bytes of a partial record", buf.len()),
        ));
    }

    buf.pop();
    if buf.is_empty() {
        Ok(Frame::Blank)
    } else {
        Ok(Frame::Record)
    }
}

/// Write `record` followed by a delimiter, unless it already ends with one,
/// and flush.
pub async fn write_record<W>(writer: &mut W, record: &[u8]) -> io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    writer.write_all(record).await?;
    if record.last() != Some(&DELIMITER) {
        writer.write_all(&[DELIMITER]).await?;
    }
    writer.flush().await
}
