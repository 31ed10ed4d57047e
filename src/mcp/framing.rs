//! Message framing for the stdio transport.
//!
//! Two framings are accepted and answered in kind:
//! ```text
//! Content-Length: <N>\r\n
//! \r\n
//! <N bytes of JSON>
//! ```
//! or one JSON object per line (NDJSON).

use std::io::{self, BufRead, Write};

/// Largest Content-Length body accepted.
pub const MAX_MESSAGE_BYTES: usize = 64 * 1024 * 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WireFormat {
    ContentLength,
    Ndjson,
}

/// Read one message. `Ok(None)` on EOF.
pub fn read_message<R: BufRead>(reader: &mut R) -> io::Result<Option<(Vec<u8>, WireFormat)>> {
    loop {
        let mut first_line = String::new();
        if reader.read_line(&mut first_line)? == 0 {
            return Ok(None);
        }

        let trimmed = first_line.trim();
        if trimmed.is_empty() {
            continue;
        }

        if let Some(length) = trimmed.strip_prefix("Content-Length:") {
            let content_length: usize = length.trim().parse().map_err(|_| {
                io::Error::new(io::ErrorKind::InvalidData, "Invalid Content-Length header")
            })?;
            if content_length > MAX_MESSAGE_BYTES {
                return Err(io::Error::new(
                    io::ErrorKind::InvalidData,
                    format!(
                        "Content-Length {} exceeds the {} byte limit",
                        content_length, MAX_MESSAGE_BYTES
                    ),
                ));
            }

            // Skip any further headers up to the blank separator line.
            loop {
                let mut header = String::new();
                if reader.read_line(&mut header)? == 0 {
                    return Ok(None);
                }
                if header.trim().is_empty() {
                    break;
                }
            }

            let mut body = vec![0u8; content_length];
            reader.read_exact(&mut body)?;
            return Ok(Some((body, WireFormat::ContentLength)));
        }

        if trimmed.starts_with('{') || trimmed.starts_with('[') {
            return Ok(Some((trimmed.as_bytes().to_vec(), WireFormat::Ndjson)));
        }

        let preview: String = trimmed.chars().take(50).collect();
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            format!(
                "Unknown message format, expected Content-Length or JSON, got: {}",
                preview
            ),
        ));
    }
}

pub fn write_message<W: Write, T: serde::Serialize>(
    writer: &mut W,
    message: &T,
    format: WireFormat,
) -> io::Result<()> {
    let body = serde_json::to_vec(message)?;

    match format {
        WireFormat::ContentLength => {
            write!(writer, "Content-Length: {}\r\n\r\n", body.len())?;
            writer.write_all(&body)?;
        }
        WireFormat::Ndjson => {
            writer.write_all(&body)?;
            writer.write_all(b"\n")?;
        }
    }

    writer.flush()
}
