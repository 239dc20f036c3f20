//! Connection manager for StackRox Central
//!
//! [`Client`] owns the single shared connection. Readers take the shared
//! lock; [`Client::connect`] and [`Client::close`] take the exclusive lock,
//! and the redial decision plus handle replacement happen under it, so
//! concurrent callers never dial twice.

use super::auth::{self, CredentialProvider};
use super::context::CallContext;
use super::error::CentralError;
use super::interceptor::{Chain, Interceptor, LoggingInterceptor, RetryInterceptor, TransportInvoker};
use super::retry::RetryPolicy;
use super::transport::{
    ConnectBackoff, ConnectivityState, DefaultDialer, DialOptions, Dialer, Transport,
    MIN_CONNECT_TIMEOUT,
};
use crate::config::CentralConfig;
use bytes::Bytes;
use std::sync::Arc;
use tokio::sync::RwLock;
use tonic::Status;

/// Operation name recorded on dial failures
pub const CONNECT_OPERATION: &str = "Connect";

/// A dialed connection with its interceptor chain
///
/// Cheap to clone; clones share the underlying transport.
#[derive(Debug, Clone)]
pub struct Connection {
    inner: Arc<ConnectionInner>,
}

#[derive(Debug)]
struct ConnectionInner {
    transport: Arc<dyn Transport>,
    interceptors: Vec<Arc<dyn Interceptor>>,
    terminal: TransportInvoker,
}

impl Connection {
    fn new(
        transport: Arc<dyn Transport>,
        credentials: Arc<dyn CredentialProvider>,
        interceptors: Vec<Arc<dyn Interceptor>>,
    ) -> Self {
        let terminal = TransportInvoker::new(transport.clone(), credentials);
        Self {
            inner: Arc::new(ConnectionInner {
                transport,
                interceptors,
                terminal,
            }),
        }
    }

    /// Send an encoded unary call through the interceptor chain
    pub async fn invoke(
        &self,
        ctx: &CallContext,
        method: &str,
        payload: Bytes,
    ) -> Result<Bytes, Status> {
        use super::interceptor::Invoker as _;
        Chain::new(&self.inner.interceptors, &self.inner.terminal)
            .invoke(ctx, method, payload)
            .await
    }

    /// Encode `request`, call `method` and decode the response
    pub async fn unary<Req, Resp>(
        &self,
        ctx: &CallContext,
        method: &str,
        request: &Req,
    ) -> Result<Resp, Status>
    where
        Req: prost::Message,
        Resp: prost::Message + Default,
    {
        let payload = Bytes::from(request.encode_to_vec());
        let response = self.invoke(ctx, method, payload).await?;
        Resp::decode(response)
            .map_err(|e| Status::internal(format!("failed to decode response: {}", e)))
    }

    /// Connectivity reported by the transport
    pub fn state(&self) -> ConnectivityState {
        self.inner.transport.state()
    }

    fn close(&self) {
        self.inner.transport.close();
    }
}

#[derive(Debug, Default)]
struct ConnectionSlot {
    conn: Option<Connection>,
    connected: bool,
}

impl ConnectionSlot {
    fn needs_redial(&self) -> bool {
        match (&self.conn, self.connected) {
            (Some(conn), true) => conn.state().needs_redial(),
            _ => true,
        }
    }

    fn reset(&mut self) {
        self.conn = None;
        self.connected = false;
    }
}

/// Connection manager shared by every tool invocation
#[derive(Debug)]
pub struct Client {
    config: CentralConfig,
    dialer: Arc<dyn Dialer>,
    slot: RwLock<ConnectionSlot>,
}

impl Client {
    /// Manager dialing with the default transports
    pub fn new(config: CentralConfig) -> Self {
        Self::with_dialer(config, Arc::new(DefaultDialer))
    }

    /// Manager dialing through `dialer`
    pub fn with_dialer(config: CentralConfig, dialer: Arc<dyn Dialer>) -> Self {
        Self {
            config,
            dialer,
            slot: RwLock::new(ConnectionSlot::default()),
        }
    }

    /// Ensure a usable connection exists
    ///
    /// A no-op while the current connection is healthy. Otherwise the old
    /// handle is closed and a new one dialed. Dial failures are returned,
    /// not retried.
    pub async fn connect(&self) -> Result<(), CentralError> {
        let mut slot = self.slot.write().await;
        if !slot.needs_redial() {
            return Ok(());
        }

        if let Some(old) = slot.conn.take() {
            tracing::info!(state = ?old.state(), "Replacing StackRox Central connection");
            old.close();
        }
        slot.reset();

        let conn = self
            .dial()
            .map_err(|e| CentralError::new(e, CONNECT_OPERATION))?;

        slot.conn = Some(conn);
        slot.connected = true;
        tracing::info!(url = %self.config.url, "Connected to StackRox Central");

        Ok(())
    }

    fn dial(&self) -> anyhow::Result<Connection> {
        let credentials = auth::provider_for(&self.config)?;
        let options = DialOptions {
            endpoint: self.config.endpoint()?,
            server_name: self.config.hostname()?,
            insecure_skip_tls_verify: self.config.insecure_skip_tls_verify,
            force_http1: self.config.force_http1,
            backoff: ConnectBackoff::new(self.config.initial_backoff, self.config.max_backoff),
            min_connect_timeout: MIN_CONNECT_TIMEOUT,
            require_secure_transport: credentials.requires_secure_transport(),
        };

        let transport = self.dialer.dial(&options)?;
        let interceptors: Vec<Arc<dyn Interceptor>> = vec![
            Arc::new(LoggingInterceptor),
            Arc::new(RetryInterceptor::new(
                RetryPolicy::from_config(&self.config),
                self.config.request_timeout,
            )),
        ];

        Ok(Connection::new(transport, credentials, interceptors))
    }

    /// Release the connection; safe to call repeatedly
    pub async fn close(&self) {
        let mut slot = self.slot.write().await;
        if let Some(conn) = slot.conn.take() {
            conn.close();
            tracing::info!("Closed StackRox Central connection");
        }
        slot.reset();
    }

    /// Whether a connection is currently held
    pub async fn is_connected(&self) -> bool {
        self.slot.read().await.connected
    }

    /// Current connection, if any, without dialing
    pub async fn conn(&self) -> Option<Connection> {
        self.slot.read().await.conn.clone()
    }

    /// Connect if needed and return the connection
    pub async fn ready_conn(&self) -> Result<Connection, CentralError> {
        self.connect().await?;
        self.conn().await.ok_or_else(|| {
            CentralError::new(
                Status::unavailable("connection was closed concurrently"),
                CONNECT_OPERATION,
            )
        })
    }

    /// Central configuration this manager dials with
    pub fn config(&self) -> &CentralConfig {
        &self.config
    }
}
