use serde_json::Value;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// Largest `Content-Length` accepted on stdin.
const MAX_CONTENT_LENGTH: usize = 16 * 1024 * 1024;

/// How a stdio message was framed; replies use the same framing.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Framing {
    /// `Content-Length` headers followed by a blank line and the body.
    Headers,
    /// One JSON document per line.
    Lines,
}

#[derive(Debug)]
pub struct InboundMessage {
    pub framing: Framing,
    /// `Err` carries the parse error text for a body that was not valid JSON.
    pub payload: Result<Value, String>,
}

pub async fn read_message<R>(reader: &mut R) -> Result<Option<InboundMessage>, std::io::Error>
where
    R: AsyncBufRead + Unpin,
{
    let mut content_length: Option<usize> = None;
    let mut in_headers = false;

    loop {
        let mut line = String::new();
        let bytes_read = reader.read_line(&mut line).await?;
        if bytes_read == 0 {
            if !in_headers {
                return Ok(None);
            }
            return Err(std::io::Error::new(
                std::io::ErrorKind::UnexpectedEof,
                "Unexpected EOF while reading MCP headers",
            ));
        }

        let trimmed = line.trim_end_matches(['\r', '\n']);
        if in_headers {
            if trimmed.is_empty() {
                break;
            }
        } else if trimmed.trim().is_empty() {
            continue;
        } else if !is_header_line(trimmed) {
            return Ok(Some(InboundMessage {
                framing: Framing::Lines,
                payload: serde_json::from_str(trimmed).map_err(|e| e.to_string()),
            }));
        }

        in_headers = true;
        if trimmed.to_ascii_lowercase().starts_with("content-length:") {
            let raw_len = trimmed
                .split_once(':')
                .map(|(_, right)| right.trim())
                .unwrap_or_default();
            let parsed = raw_len.parse::<usize>().map_err(|_| {
                std::io::Error::new(
                    std::io::ErrorKind::InvalidData,
                    "Invalid Content-Length header",
                )
            })?;
            content_length = Some(parsed);
        }
    }

    let content_length = content_length.ok_or_else(|| {
        std::io::Error::new(
            std::io::ErrorKind::InvalidData,
            "Missing Content-Length header",
        )
    })?;
    if content_length > MAX_CONTENT_LENGTH {
        return Err(std::io::Error::new(
            std::io::ErrorKind::InvalidData,
            format!("Content-Length {content_length} exceeds limit of {MAX_CONTENT_LENGTH} bytes"),
        ));
    }
    let mut payload = vec![0_u8; content_length];
    reader.read_exact(&mut payload).await?;

    Ok(Some(InboundMessage {
        framing: Framing::Headers,
        payload: serde_json::from_slice(&payload).map_err(|e| e.to_string()),
    }))
}

fn is_header_line(line: &str) -> bool {
    !line.starts_with(['{', '['])
        && line
            .split_once(':')
            .is_some_and(|(name, _)| !name.is_empty() && !name.contains(char::is_whitespace))
}

pub async fn write_message<W>(
    writer: &mut W,
    framing: Framing,
    value: &Value,
) -> Result<(), std::io::Error>
where
    W: AsyncWrite + Unpin,
{
    let body = serde_json::to_vec(value).map_err(|e| {
        std::io::Error::new(
            std::io::ErrorKind::InvalidData,
            format!("Failed to serialize JSON: {e}"),
        )
    })?;
    match framing {
        Framing::Headers => {
            let header = format!(
                "Content-Length: {}\r\nContent-Type: application/json\r\n\r\n",
                body.len()
            );
            writer.write_all(header.as_bytes()).await?;
            writer.write_all(&body).await?;
        }
        Framing::Lines => {
            writer.write_all(&body).await?;
            writer.write_all(b"\n").await?;
        }
    }
    writer.flush().await?;
    Ok(())
}

pub fn to_pretty_json(value: &Value) -> String {
    serde_json::to_string_pretty(value).unwrap_or_else(|_| "{}".to_string())
}
