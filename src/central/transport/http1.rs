//! gRPC-Web over HTTP/1.1
//!
//! Compatibility transport for networks whose proxies cannot carry HTTP/2.
//! Each unary call is a single `POST` with a gRPC-Web framed body:
//!
//! ```text
//! +------+----------------+-----------+
//! | flag | length (u32 BE)| payload   |
//! +------+----------------+-----------+
//! ```
//!
//! Flag `0x00` marks a message frame, `0x80` the trailer frame whose body
//! holds `grpc-status` and `grpc-message` as HTTP-style header lines.

use super::{ConnectivityState, DialOptions, StateCell, Transport};
use crate::central::auth::CallMetadata;
use crate::error::{McpError, Result};
use async_trait::async_trait;
use bytes::{BufMut, Bytes, BytesMut};
use std::collections::HashMap;
use tonic::{Code, Status};
use url::Url;

const CONTENT_TYPE: &str = "application/grpc-web+proto";
const FRAME_HEADER_LEN: usize = 5;
const TRAILER_FLAG: u8 = 0x80;

/// Unary calls as gRPC-Web requests
#[derive(Debug)]
pub struct Http1Transport {
    http: reqwest::Client,
    base_url: Url,
    state: StateCell,
}

impl Http1Transport {
    /// Build the HTTP/1.1 client
    pub fn new(options: &DialOptions) -> Result<Self> {
        let http = reqwest::Client::builder()
            .http1_only()
            .connect_timeout(options.min_connect_timeout)
            .min_tls_version(reqwest::tls::Version::TLS_1_2)
            .danger_accept_invalid_certs(options.insecure_skip_tls_verify)
            .user_agent(concat!("stackrox-mcp/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| McpError::Transport(format!("failed to build HTTP/1.1 client: {}", e)))?;

        Ok(Self {
            http,
            base_url: options.endpoint.clone(),
            state: StateCell::new(ConnectivityState::Idle),
        })
    }

    async fn post(
        &self,
        method: &str,
        metadata: &CallMetadata,
        payload: Bytes,
    ) -> std::result::Result<Bytes, Status> {
        let url = self
            .base_url
            .join(method.trim_start_matches('/'))
            .map_err(|e| Status::internal(format!("invalid method path '{}': {}", method, e)))?;

        let mut request = self
            .http
            .post(url)
            .header(reqwest::header::CONTENT_TYPE, CONTENT_TYPE)
            .header(reqwest::header::ACCEPT, CONTENT_TYPE)
            .header("x-grpc-web", "1")
            .body(encode_frame(0x00, &payload));
        for (key, value) in metadata {
            request = request.header(key.as_str(), value.as_str());
        }

        let response = request
            .send()
            .await
            .map_err(|e| Status::unavailable(format!("HTTP/1.1 request failed: {}", e)))?;

        let http_status = response.status();
        if !http_status.is_success() {
            return Err(status_from_http(http_status.as_u16()));
        }

        let header_status = trailers_from_headers(response.headers());
        let body = response
            .bytes()
            .await
            .map_err(|e| Status::unavailable(format!("failed to read response body: {}", e)))?;

        let (message, trailers) = decode_frames(body)?;
        let trailers = trailers.or(header_status).unwrap_or_default();
        status_from_trailers(&trailers)?;

        Ok(message.unwrap_or_default())
    }
}

#[async_trait]
impl Transport for Http1Transport {
    async fn unary(
        &self,
        method: &str,
        metadata: &CallMetadata,
        payload: Bytes,
    ) -> std::result::Result<Bytes, Status> {
        if self.state.get() == ConnectivityState::Shutdown {
            return Err(Status::unavailable("connection is closed"));
        }
        if self.state.get() != ConnectivityState::Ready {
            self.state.set(ConnectivityState::Connecting);
        }

        let result = self.post(method, metadata, payload).await;
        self.state.observe(&result);
        result
    }

    fn state(&self) -> ConnectivityState {
        self.state.get()
    }

    fn close(&self) {
        self.state.shutdown();
    }
}

/// Prefix `payload` with a gRPC-Web frame header
pub fn encode_frame(flag: u8, payload: &[u8]) -> Bytes {
    let mut frame = BytesMut::with_capacity(FRAME_HEADER_LEN + payload.len());
    frame.put_u8(flag);
    frame.put_u32(payload.len() as u32);
    frame.put_slice(payload);
    frame.freeze()
}

/// Split a response body into its message and trailer frames
fn decode_frames(
    mut body: Bytes,
) -> std::result::Result<(Option<Bytes>, Option<HashMap<String, String>>), Status> {
    let mut message = None;
    let mut trailers = None;

    while !body.is_empty() {
        if body.len() < FRAME_HEADER_LEN {
            return Err(Status::internal("truncated gRPC-Web frame header"));
        }
        let flag = body[0];
        let len = u32::from_be_bytes([body[1], body[2], body[3], body[4]]) as usize;
        if body.len() < FRAME_HEADER_LEN + len {
            return Err(Status::internal("truncated gRPC-Web frame"));
        }

        let frame = body.slice(FRAME_HEADER_LEN..FRAME_HEADER_LEN + len);
        body = body.slice(FRAME_HEADER_LEN + len..);

        if flag & TRAILER_FLAG != 0 {
            trailers = Some(parse_trailer_block(&frame));
        } else if message.is_none() {
            message = Some(frame);
        } else {
            return Err(Status::internal("unexpected second message in unary response"));
        }
    }

    Ok((message, trailers))
}

fn parse_trailer_block(block: &[u8]) -> HashMap<String, String> {
    String::from_utf8_lossy(block)
        .split("\r\n")
        .filter_map(|line| {
            let (name, value) = line.split_once(':')?;
            Some((name.trim().to_ascii_lowercase(), value.trim().to_string()))
        })
        .collect()
}

/// Trailers-only responses put the status into the HTTP headers
fn trailers_from_headers(headers: &reqwest::header::HeaderMap) -> Option<HashMap<String, String>> {
    let status = headers.get("grpc-status")?.to_str().ok()?;
    let mut trailers = HashMap::new();
    trailers.insert("grpc-status".to_string(), status.to_string());
    if let Some(message) = headers.get("grpc-message").and_then(|v| v.to_str().ok()) {
        trailers.insert("grpc-message".to_string(), message.to_string());
    }
    Some(trailers)
}

fn status_from_trailers(trailers: &HashMap<String, String>) -> std::result::Result<(), Status> {
    let code = match trailers.get("grpc-status") {
        Some(raw) => raw
            .parse::<i32>()
            .map(Code::from_i32)
            .map_err(|_| Status::internal(format!("invalid grpc-status '{}'", raw)))?,
        None => return Err(Status::internal("response is missing grpc-status")),
    };

    if code == Code::Ok {
        return Ok(());
    }

    let message = trailers
        .get("grpc-message")
        .map(|m| percent_decode(m))
        .unwrap_or_default();
    Err(Status::new(code, message))
}

/// Status for a non-2xx HTTP response, following the gRPC HTTP mapping
pub fn status_from_http(status: u16) -> Status {
    let code = match status {
        400 => Code::Internal,
        401 => Code::Unauthenticated,
        403 => Code::PermissionDenied,
        404 => Code::Unimplemented,
        429 | 502 | 503 | 504 => Code::Unavailable,
        _ => Code::Unknown,
    };
    Status::new(code, format!("HTTP status {}", status))
}

/// `grpc-message` is percent-encoded on the wire
fn percent_decode(value: &str) -> String {
    let bytes = value.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%' && i + 2 < bytes.len() {
            let hex = std::str::from_utf8(&bytes[i + 1..i + 3]).ok();
            if let Some(byte) = hex.and_then(|h| u8::from_str_radix(h, 16).ok()) {
                out.push(byte);
                i += 3;
                continue;
            }
        }
        out.push(bytes[i]);
        i += 1;
    }
    String::from_utf8_lossy(&out).into_owned()
}
