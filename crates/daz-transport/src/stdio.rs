//! Line-delimited stdio transport
//!
//! One JSON-RPC message per line in each direction. Stdout carries nothing
//! but replies; all logging goes to stderr.

use crate::{serve_channel, McpDispatcher, MessageChannel};
use async_trait::async_trait;
use daz_foundation::errors::DazResult;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tracing::{debug, info};

/// Newline-framed channel over any async reader/writer pair
pub struct LineChannel<R, W> {
    reader: BufReader<R>,
    writer: W,
}

impl<R, W> LineChannel<R, W>
where
    R: AsyncRead + Unpin + Send,
    W: AsyncWrite + Unpin + Send,
{
    pub fn new(reader: R, writer: W) -> Self {
        Self {
            reader: BufReader::new(reader),
            writer,
        }
    }

    pub fn into_writer(self) -> W {
        self.writer
    }
}

#[async_trait]
impl<R, W> MessageChannel for LineChannel<R, W>
where
    R: AsyncRead + Unpin + Send,
    W: AsyncWrite + Unpin + Send,
{
    async fn receive(&mut self) -> DazResult<Option<String>> {
        let mut buffer = Vec::new();
        loop {
            buffer.clear();
            let bytes_read = self.reader.read_until(b'\n', &mut buffer).await?;
            if bytes_read == 0 {
                debug!("EOF on input, closing stdio channel");
                return Ok(None);
            }

            // Invalid UTF-8 is left for the codec to reject as a parse error
            let line = String::from_utf8_lossy(&buffer);
            let line = line.trim();
            if !line.is_empty() {
                return Ok(Some(line.to_string()));
            }
        }
    }

    async fn send(&mut self, frame: &str) -> DazResult<()> {
        self.writer.write_all(frame.as_bytes()).await?;
        self.writer.write_all(b"\n").await?;
        self.writer.flush().await?;
        Ok(())
    }
}

/// Serve MCP over the process's stdin/stdout until stdin closes
pub async fn start_stdio_server(dispatcher: Arc<dyn McpDispatcher>) -> DazResult<()> {
    info!("Starting stdio MCP server");

    let mut channel = LineChannel::new(tokio::io::stdin(), tokio::io::stdout());
    serve_channel(&mut channel, dispatcher.as_ref(), "stdio").await?;

    info!("Stdio server stopped");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[tokio::test]
    async fn test_receive_skips_blank_lines_and_trims() {
        let input: &[u8] = b"\n   \n  {\"a\":1}  \r\n\n{\"b\":2}";
        let mut channel = LineChannel::new(input, Vec::new());

        assert_eq!(channel.receive().await.unwrap().as_deref(), Some("{\"a\":1}"));
        assert_eq!(channel.receive().await.unwrap().as_deref(), Some("{\"b\":2}"));
        assert_eq!(channel.receive().await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_invalid_utf8_is_delivered_not_fatal() {
        let input: &[u8] = b"\xff\xfe{}\n{\"ok\":true}\n";
        let mut channel = LineChannel::new(input, Vec::new());

        let first = channel.receive().await.unwrap().unwrap();
        assert!(first.contains('\u{FFFD}'));
        assert_eq!(
            channel.receive().await.unwrap().as_deref(),
            Some("{\"ok\":true}")
        );
    }

    #[tokio::test]
    async fn test_send_writes_one_line_per_frame() {
        let input: &[u8] = b"";
        let mut channel = LineChannel::new(input, Vec::new());

        channel.send("{\"id\":1}").await.unwrap();
        channel.send("{\"id\":2}").await.unwrap();

        assert_eq!(
            String::from_utf8(channel.into_writer()).unwrap(),
            "{\"id\":1}\n{\"id\":2}\n"
        );
    }
}
