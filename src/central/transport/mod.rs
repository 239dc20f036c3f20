//! Transports that carry unary calls to Central
//!
//! A [`Transport`] moves one encoded request to Central and returns the
//! encoded response or a `tonic::Status`. It also reports a
//! [`ConnectivityState`], which the connection manager uses to decide
//! whether to redial. Two implementations exist:
//!
//! - [`grpc::GrpcTransport`]: native HTTP/2 gRPC over a rustls connector
//! - [`http1::Http1Transport`]: gRPC-Web over HTTP/1.1 for networks that
//!   cannot pass HTTP/2

pub mod grpc;
pub mod http1;
pub mod tls;

use super::auth::CallMetadata;
use crate::error::{McpError, Result};
use async_trait::async_trait;
use bytes::Bytes;
use rand::Rng;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tonic::Status;
use url::Url;

/// Lower bound for establishing a connection
pub const MIN_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Connection state reported by a transport
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ConnectivityState {
    /// Dialed, no traffic yet
    Idle = 0,
    /// Connection attempt in progress
    Connecting = 1,
    /// Last exchange succeeded
    Ready = 2,
    /// Last connection attempt failed
    TransientFailure = 3,
    /// Closed
    Shutdown = 4,
}

impl ConnectivityState {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => Self::Idle,
            1 => Self::Connecting,
            2 => Self::Ready,
            3 => Self::TransientFailure,
            _ => Self::Shutdown,
        }
    }

    /// States after which the connection manager must dial again
    pub fn needs_redial(&self) -> bool {
        matches!(self, Self::TransientFailure | Self::Shutdown)
    }
}

/// Lock-free holder of a transport's [`ConnectivityState`]
#[derive(Debug)]
pub struct StateCell(AtomicU8);

impl StateCell {
    /// Cell starting at `state`
    pub fn new(state: ConnectivityState) -> Self {
        Self(AtomicU8::new(state as u8))
    }

    /// Current state
    pub fn get(&self) -> ConnectivityState {
        ConnectivityState::from_u8(self.0.load(Ordering::Acquire))
    }

    /// Move to `state` unless the transport was shut down
    pub fn set(&self, state: ConnectivityState) {
        let _ = self
            .0
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |current| {
                if current == ConnectivityState::Shutdown as u8 {
                    None
                } else {
                    Some(state as u8)
                }
            });
    }

    /// Move to `Shutdown`; terminal
    pub fn shutdown(&self) {
        self.0
            .store(ConnectivityState::Shutdown as u8, Ordering::Release);
    }

    /// Record the outcome of a call
    ///
    /// `Unavailable` means the connection itself failed; any other status
    /// came from a reachable server.
    pub fn observe<T>(&self, result: &std::result::Result<T, Status>) {
        match result {
            Err(status) if status.code() == tonic::Code::Unavailable => {
                self.set(ConnectivityState::TransientFailure)
            }
            _ => self.set(ConnectivityState::Ready),
        }
    }
}

/// Moves encoded unary calls to Central
#[async_trait]
pub trait Transport: Send + Sync + std::fmt::Debug {
    /// Send `payload` to `method` (`/package.Service/Method`)
    async fn unary(
        &self,
        method: &str,
        metadata: &CallMetadata,
        payload: Bytes,
    ) -> std::result::Result<Bytes, Status>;

    /// Current connectivity
    fn state(&self) -> ConnectivityState;

    /// Release the connection; in-flight calls fail on their own
    fn close(&self);
}

/// Exponential backoff between connection attempts
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ConnectBackoff {
    /// Delay after the first failure
    pub base_delay: Duration,
    /// Growth factor per consecutive failure
    pub multiplier: f64,
    /// Random spread applied to every delay, as a fraction
    pub jitter: f64,
    /// Upper bound before jitter
    pub max_delay: Duration,
}

impl ConnectBackoff {
    /// Backoff seeded from the retry bounds
    pub fn new(base_delay: Duration, max_delay: Duration) -> Self {
        Self {
            base_delay,
            multiplier: 2.0,
            jitter: 0.2,
            max_delay,
        }
    }

    /// Delay after `failures` consecutive failed attempts
    pub fn delay(&self, failures: u32) -> Duration {
        if failures == 0 {
            return Duration::ZERO;
        }

        let exponent = i32::try_from(failures - 1).unwrap_or(i32::MAX);
        let raw = self.base_delay.as_secs_f64() * self.multiplier.powi(exponent);
        let capped = raw.min(self.max_delay.as_secs_f64());
        let spread = if self.jitter > 0.0 {
            rand::rng().random_range(-self.jitter..=self.jitter)
        } else {
            0.0
        };

        Duration::from_secs_f64((capped * (1.0 + spread)).max(0.0))
    }
}

/// Everything needed to open a transport to Central
#[derive(Debug, Clone)]
pub struct DialOptions {
    /// Normalized endpoint URL
    pub endpoint: Url,
    /// Hostname for SNI and certificate checks
    pub server_name: String,
    /// Skip certificate verification
    pub insecure_skip_tls_verify: bool,
    /// Use the gRPC-Web compatibility transport
    pub force_http1: bool,
    /// Backoff between connection attempts
    pub backoff: ConnectBackoff,
    /// Timeout for establishing a connection
    pub min_connect_timeout: Duration,
    /// Refuse plaintext endpoints
    pub require_secure_transport: bool,
}

/// Opens transports
pub trait Dialer: Send + Sync + std::fmt::Debug {
    /// Open a transport with `options`
    fn dial(&self, options: &DialOptions) -> Result<Arc<dyn Transport>>;
}

/// Dialer used outside tests
#[derive(Debug, Default, Clone, Copy)]
pub struct DefaultDialer;

impl Dialer for DefaultDialer {
    fn dial(&self, options: &DialOptions) -> Result<Arc<dyn Transport>> {
        if options.require_secure_transport && options.endpoint.scheme() != "https" {
            return Err(McpError::Transport(
                "credentials require transport level security (use https)".to_string(),
            )
            .into());
        }

        if options.force_http1 {
            tracing::debug!(endpoint = %options.endpoint, "Dialing Central over HTTP/1.1 (gRPC-Web)");
            Ok(Arc::new(http1::Http1Transport::new(options)?))
        } else {
            tracing::debug!(endpoint = %options.endpoint, "Dialing Central over gRPC");
            Ok(Arc::new(grpc::GrpcTransport::new(options)?))
        }
    }
}
