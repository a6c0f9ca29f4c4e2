//! Stdio transport
//!
//! Newline-delimited JSON-RPC. Each request is handled on its own task and
//! responses are written by a single writer. A line that cannot be decoded
//! is answered with a parse error and skipped; only a failing input stream
//! ends the loop.

use super::protocol::{JsonRpcRequest, JsonRpcResponse, PARSE_ERROR};
use super::server::TribeCrmMcpServer;
use bytes::BytesMut;
use futures::StreamExt;
use std::io;
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;
use tokio_util::codec::{Decoder, FramedRead, LinesCodec, LinesCodecError};

/// Longest accepted request line in bytes
pub const MAX_LINE_LENGTH: usize = 8 * 1024 * 1024;

/// One framed input line
#[derive(Debug, PartialEq, Eq)]
enum Frame {
    Line(String),
    /// Not valid UTF-8, or longer than the limit
    Rejected(String),
}

/// Line framing that reports bad lines as frames instead of failing the stream
#[derive(Debug)]
struct RequestLines {
    inner: LinesCodec,
}

impl RequestLines {
    fn new(max_length: usize) -> Self {
        Self {
            inner: LinesCodec::new_with_max_length(max_length),
        }
    }

    fn recover(
        result: Result<Option<String>, LinesCodecError>,
    ) -> Result<Option<Frame>, LinesCodecError> {
        match result {
            Ok(line) => Ok(line.map(Frame::Line)),
            // The codec discards the rest of the line on its own
            Err(LinesCodecError::MaxLineLengthExceeded) => Ok(Some(Frame::Rejected(
                "line exceeds maximum length".to_string(),
            ))),
            Err(LinesCodecError::Io(e)) if e.kind() == io::ErrorKind::InvalidData => {
                Ok(Some(Frame::Rejected(e.to_string())))
            }
            Err(e) => Err(e),
        }
    }
}

impl Decoder for RequestLines {
    type Item = Frame;
    type Error = LinesCodecError;

    fn decode(&mut self, buf: &mut BytesMut) -> Result<Option<Frame>, LinesCodecError> {
        Self::recover(self.inner.decode(buf))
    }

    fn decode_eof(&mut self, buf: &mut BytesMut) -> Result<Option<Frame>, LinesCodecError> {
        Self::recover(self.inner.decode_eof(buf))
    }
}

/// Serve requests from `input` until it is closed, writing responses to `output`.
///
/// Responses of requests still in flight are written before returning.
pub async fn serve<R, W>(server: Arc<TribeCrmMcpServer>, input: R, output: W) -> io::Result<()>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin + Send + 'static,
{
    serve_lines(server, input, output, MAX_LINE_LENGTH).await
}

async fn serve_lines<R, W>(
    server: Arc<TribeCrmMcpServer>,
    input: R,
    mut output: W,
    max_line_length: usize,
) -> io::Result<()>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin + Send + 'static,
{
    let (tx, mut rx) = mpsc::unbounded_channel::<JsonRpcResponse>();

    let writer = tokio::spawn(async move {
        while let Some(response) = rx.recv().await {
            write_response(&mut output, &response).await?;
        }
        Ok::<_, io::Error>(())
    });

    let mut frames = FramedRead::new(input, RequestLines::new(max_line_length));
    let mut read_error = None;

    while let Some(frame) = frames.next().await {
        let line = match frame {
            Ok(Frame::Line(line)) => line,
            Ok(Frame::Rejected(reason)) => {
                tracing::warn!("Skipping unreadable input line: {}", reason);
                let response =
                    JsonRpcResponse::error(None, PARSE_ERROR, &format!("Parse error: {}", reason));
                tx.send(response).ok();
                continue;
            }
            Err(e) => {
                tracing::error!("Failed to read input: {}", e);
                read_error = Some(e);
                break;
            }
        };

        if line.trim().is_empty() {
            continue;
        }

        tracing::debug!("Received: {}", line);

        let request: JsonRpcRequest = match serde_json::from_str(&line) {
            Ok(req) => req,
            Err(e) => {
                let response =
                    JsonRpcResponse::error(None, PARSE_ERROR, &format!("Parse error: {}", e));
                tx.send(response).ok();
                continue;
            }
        };

        let server = Arc::clone(&server);
        let tx = tx.clone();
        tokio::spawn(async move {
            if let Some(response) = server.handle_request(request).await {
                tx.send(response).ok();
            }
        });
    }

    // The writer finishes once every in-flight request has dropped its sender
    drop(tx);
    let written = writer.await.map_err(io::Error::other)?;

    match read_error {
        Some(LinesCodecError::Io(e)) => Err(e),
        Some(e) => Err(io::Error::other(e)),
        None => written,
    }
}

async fn write_response<W>(output: &mut W, response: &JsonRpcResponse) -> io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    let mut json = serde_json::to_string(response)?;
    tracing::debug!("Sending: {}", json);
    json.push('\n');
    output.write_all(json.as_bytes()).await?;
    output.flush().await
}
