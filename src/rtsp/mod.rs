pub mod message;

use bytes::Bytes;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;

pub use message::{Headers, Method, RtspRequest, RtspResponse};

/// One unit read off the RTSP control connection: either a textual
/// request/response, or one interleaved `$CH LL LL ...` data-channel frame
/// sharing the same socket, per section 6's external-interfaces framing.
#[derive(Debug)]
pub enum RtspFrame {
    Request(RtspRequest),
    Response(RtspResponse),
    Interleaved { channel: u8, payload: Bytes },
}

const INTERLEAVED_MAGIC: u8 = b'$';

/// Owns the buffered reader half of the RTSP control socket and exposes
/// frame-at-a-time reads that transparently demultiplex interleaved data from
/// control messages, mirroring the line-based parsing in the plain-HTTP
/// control path this engine's control plane descends from.
pub struct RtspConnection {
    reader: BufReader<TcpStream>,
}

impl RtspConnection {
    pub fn new(stream: TcpStream) -> Self {
        Self { reader: BufReader::new(stream) }
    }

    pub async fn write_request(&mut self, request: &RtspRequest) -> std::io::Result<()> {
        self.reader.get_mut().write_all(request.serialize().as_bytes()).await
    }

    pub async fn write_response(&mut self, response: &RtspResponse) -> std::io::Result<()> {
        self.reader.get_mut().write_all(response.serialize().as_bytes()).await
    }

    pub async fn write_interleaved(&mut self, channel: u8, payload: &[u8]) -> std::io::Result<()> {
        let mut frame = Vec::with_capacity(4 + payload.len());
        frame.push(INTERLEAVED_MAGIC);
        frame.push(channel);
        frame.extend_from_slice(&(payload.len() as u16).to_be_bytes());
        frame.extend_from_slice(payload);
        self.reader.get_mut().write_all(&frame).await
    }

    async fn read_line(&mut self) -> std::io::Result<Option<String>> {
        let mut line = String::new();
        let n = self.reader.read_line(&mut line).await?;
        if n == 0 {
            return Ok(None);
        }
        while line.ends_with('\n') || line.ends_with('\r') {
            line.pop();
        }
        Ok(Some(line))
    }

    /// Reads the next frame. Returns `Ok(None)` on a clean EOF.
    pub async fn read_frame(&mut self) -> std::io::Result<Option<RtspFrame>> {
        let first_byte = match self.reader.fill_buf().await {
            Ok(buf) if buf.is_empty() => return Ok(None),
            Ok(buf) => buf[0],
            Err(e) => return Err(e),
        };

        if first_byte == INTERLEAVED_MAGIC {
            let mut header = [0u8; 4];
            self.reader.read_exact(&mut header).await?;
            let channel = header[1];
            let len = u16::from_be_bytes([header[2], header[3]]) as usize;
            let mut payload = vec![0u8; len];
            self.reader.read_exact(&mut payload).await?;
            return Ok(Some(RtspFrame::Interleaved { channel, payload: Bytes::from(payload) }));
        }

        let start_line = match self.read_line().await? {
            Some(line) if !line.is_empty() => line,
            _ => return Ok(None),
        };

        let mut header_lines = vec![];
        loop {
            let line = self.read_line().await?.unwrap_or_default();
            if line.is_empty() {
                break;
            }
            header_lines.push(line);
        }
        let headers = message::parse_headers(&header_lines);
        let content_length: usize = headers.get("content-length").and_then(|v| v.parse().ok()).unwrap_or(0);
        let body = if content_length > 0 {
            let mut buf = vec![0u8; content_length];
            self.reader.read_exact(&mut buf).await?;
            Some(String::from_utf8_lossy(&buf).into_owned())
        } else {
            None
        };

        let cseq: u32 = headers.get("cseq").and_then(|v| v.parse().ok()).unwrap_or(0);

        if start_line.starts_with("RTSP/") {
            let mut parts = start_line.splitn(3, ' ');
            let _version = parts.next();
            let status: u16 = parts.next().and_then(|s| s.parse().ok()).unwrap_or(500);
            let reason = parts.next().unwrap_or("").to_string();

            let mut headers_bag = Headers::new();
            for (k, v) in &headers {
                headers_bag.insert(k.clone(), v.clone());
            }

            Ok(Some(RtspFrame::Response(RtspResponse { status, reason, cseq, headers: headers_bag, body })))
        } else {
            let mut parts = start_line.splitn(3, ' ');
            let method_name = parts.next().unwrap_or("");
            let uri = parts.next().unwrap_or("").to_string();
            let method = Method::parse(method_name).ok_or_else(|| {
                std::io::Error::new(std::io::ErrorKind::InvalidData, format!("unsupported RTSP method {method_name}"))
            })?;

            let mut headers_bag = Headers::new();
            for (k, v) in &headers {
                headers_bag.insert(k.clone(), v.clone());
            }

            Ok(Some(RtspFrame::Request(RtspRequest { method, uri, cseq, headers: headers_bag, body })))
        }
    }
}
