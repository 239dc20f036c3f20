//! Native gRPC transport
//!
//! Uses a lazily connected tonic `Channel` whose connector performs the
//! TLS handshake itself, so the SNI name always comes from the configured
//! hostname. Request and response bodies pass through untouched as bytes;
//! encoding happens in [`crate::central::api`].

use super::{tls, ConnectBackoff, ConnectivityState, DialOptions, StateCell, Transport};
use crate::central::auth::CallMetadata;
use crate::error::{McpError, Result};
use async_trait::async_trait;
use bytes::{Buf, BufMut, Bytes};
use std::sync::{Arc, Mutex};
use tokio::net::TcpStream;
use tokio::time::Instant;
use tokio_rustls::TlsConnector;
use tonic::codec::{Codec, DecodeBuf, Decoder, EncodeBuf, Encoder};
use tonic::codegen::http::uri::PathAndQuery;
use tonic::codegen::http::Uri;
use tonic::metadata::{AsciiMetadataKey, AsciiMetadataValue};
use tonic::transport::{Channel, Endpoint};
use tonic::Status;

/// Unary calls over HTTP/2
#[derive(Debug)]
pub struct GrpcTransport {
    channel: Channel,
    state: StateCell,
    backoff: ConnectBackoff,
    failures: Mutex<FailureWindow>,
}

#[derive(Debug, Default)]
struct FailureWindow {
    consecutive: u32,
    retry_at: Option<Instant>,
}

impl GrpcTransport {
    /// Build the channel; no connection is opened until the first call
    pub fn new(options: &DialOptions) -> Result<Self> {
        let tls_config = Arc::new(tls::client_config(options.insecure_skip_tls_verify)?);
        let server_name = tls::server_name(&options.server_name)?;
        let connector = TlsConnector::from(tls_config);

        let target = options.endpoint.as_str().trim_end_matches('/').to_string();
        let endpoint = Endpoint::from_shared(target)
            .map_err(|e| McpError::Transport(format!("invalid Central endpoint: {}", e)))?
            .connect_timeout(options.min_connect_timeout);

        let channel = endpoint.connect_with_connector_lazy(tower::service_fn(move |uri: Uri| {
            let connector = connector.clone();
            let server_name = server_name.clone();
            async move {
                let host = uri
                    .host()
                    .unwrap_or_default()
                    .trim_start_matches('[')
                    .trim_end_matches(']')
                    .to_string();
                let port = uri.port_u16().unwrap_or(crate::config::DEFAULT_CENTRAL_PORT);
                let tcp = TcpStream::connect((host.as_str(), port)).await?;
                tcp.set_nodelay(true)?;
                connector.connect(server_name, tcp).await
            }
        }));

        Ok(Self {
            channel,
            state: StateCell::new(ConnectivityState::Idle),
            backoff: options.backoff,
            failures: Mutex::new(FailureWindow::default()),
        })
    }

    /// Sleep out the backoff window left by earlier connection failures
    async fn wait_for_backoff(&self) {
        let retry_at = self
            .failures
            .lock()
            .map(|window| window.retry_at)
            .unwrap_or_default();

        if let Some(retry_at) = retry_at {
            if retry_at > Instant::now() {
                tracing::debug!(
                    wait_ms = (retry_at - Instant::now()).as_millis() as u64,
                    "Waiting for connection backoff"
                );
                tokio::time::sleep_until(retry_at).await;
            }
        }
    }

    fn record(&self, result: &std::result::Result<Bytes, Status>) {
        self.state.observe(result);
        let Ok(mut window) = self.failures.lock() else {
            return;
        };

        if self.state.get() == ConnectivityState::TransientFailure {
            window.consecutive = window.consecutive.saturating_add(1);
            window.retry_at = Some(Instant::now() + self.backoff.delay(window.consecutive));
        } else {
            *window = FailureWindow::default();
        }
    }
}

#[async_trait]
impl Transport for GrpcTransport {
    async fn unary(
        &self,
        method: &str,
        metadata: &CallMetadata,
        payload: Bytes,
    ) -> std::result::Result<Bytes, Status> {
        if self.state.get() == ConnectivityState::Shutdown {
            return Err(Status::unavailable("connection is closed"));
        }

        self.wait_for_backoff().await;
        if self.state.get() != ConnectivityState::Ready {
            self.state.set(ConnectivityState::Connecting);
        }

        let path = PathAndQuery::try_from(method)
            .map_err(|e| Status::internal(format!("invalid method path '{}': {}", method, e)))?;

        let mut request = tonic::Request::new(payload);
        for (key, value) in metadata {
            let key = AsciiMetadataKey::from_bytes(key.as_bytes())
                .map_err(|e| Status::internal(format!("invalid metadata key '{}': {}", key, e)))?;
            let value = AsciiMetadataValue::try_from(value.as_str())
                .map_err(|e| Status::internal(format!("invalid metadata value: {}", e)))?;
            request.metadata_mut().insert(key, value);
        }

        let mut grpc = tonic::client::Grpc::new(self.channel.clone());
        let result = match grpc.ready().await {
            Ok(()) => grpc
                .unary(request, path, BytesCodec)
                .await
                .map(tonic::Response::into_inner)
                .map_err(local_failure_as_unavailable),
            Err(e) => Err(Status::unavailable(format!("service was not ready: {}", e))),
        };

        self.record(&result);
        result
    }

    fn state(&self) -> ConnectivityState {
        self.state.get()
    }

    fn close(&self) {
        self.state.shutdown();
    }
}

/// Failures raised by the client stack carry their cause; those are
/// connection problems, not answers from Central.
fn local_failure_as_unavailable(status: Status) -> Status {
    if status.code() == tonic::Code::Unknown && std::error::Error::source(&status).is_some() {
        Status::unavailable(format!("connection error: {}", status.message()))
    } else {
        status
    }
}

/// Codec that leaves message bodies as raw bytes
#[derive(Debug, Clone, Copy, Default)]
pub struct BytesCodec;

impl Codec for BytesCodec {
    type Encode = Bytes;
    type Decode = Bytes;
    type Encoder = BytesCodec;
    type Decoder = BytesCodec;

    fn encoder(&mut self) -> Self::Encoder {
        BytesCodec
    }

    fn decoder(&mut self) -> Self::Decoder {
        BytesCodec
    }
}

impl Encoder for BytesCodec {
    type Item = Bytes;
    type Error = Status;

    fn encode(
        &mut self,
        item: Self::Item,
        dst: &mut EncodeBuf<'_>,
    ) -> std::result::Result<(), Self::Error> {
        dst.put_slice(&item);
        Ok(())
    }
}

impl Decoder for BytesCodec {
    type Item = Bytes;
    type Error = Status;

    fn decode(
        &mut self,
        src: &mut DecodeBuf<'_>,
    ) -> std::result::Result<Option<Self::Item>, Self::Error> {
        let len = src.remaining();
        Ok(Some(src.copy_to_bytes(len)))
    }
}
