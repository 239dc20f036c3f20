//! Unary call interceptors
//!
//! Calls flow through an ordered chain of [`Interceptor`]s before reaching
//! the terminal [`Invoker`] that attaches credentials and talks to the
//! transport. The connection manager installs logging first, then retry.

use super::auth::CredentialProvider;
use super::context::CallContext;
use super::error::CentralError;
use super::retry::RetryPolicy;
use super::transport::Transport;
use async_trait::async_trait;
use bytes::Bytes;
use metrics::increment_counter;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tonic::Status;

/// Performs a unary call
#[async_trait]
pub trait Invoker: Send + Sync {
    /// Send `payload` to `method` under `ctx`
    async fn invoke(&self, ctx: &CallContext, method: &str, payload: Bytes)
        -> Result<Bytes, Status>;
}

/// Wraps a unary call
#[async_trait]
pub trait Interceptor: Send + Sync + std::fmt::Debug {
    /// Handle the call, delegating to `next` as often as needed
    async fn intercept(
        &self,
        ctx: &CallContext,
        method: &str,
        payload: Bytes,
        next: &dyn Invoker,
    ) -> Result<Bytes, Status>;
}

/// Remaining interceptors in front of the terminal invoker
pub struct Chain<'a> {
    interceptors: &'a [Arc<dyn Interceptor>],
    terminal: &'a dyn Invoker,
}

impl<'a> Chain<'a> {
    /// Run `interceptors` in order, ending at `terminal`
    pub fn new(interceptors: &'a [Arc<dyn Interceptor>], terminal: &'a dyn Invoker) -> Self {
        Self {
            interceptors,
            terminal,
        }
    }
}

#[async_trait]
impl Invoker for Chain<'_> {
    async fn invoke(
        &self,
        ctx: &CallContext,
        method: &str,
        payload: Bytes,
    ) -> Result<Bytes, Status> {
        match self.interceptors.split_first() {
            Some((first, rest)) => {
                let next = Chain::new(rest, self.terminal);
                first.intercept(ctx, method, payload, &next).await
            }
            None => self.terminal.invoke(ctx, method, payload).await,
        }
    }
}

/// Attaches credentials and sends the call over the transport
///
/// Honors the context's cancellation and deadline. Credential failures
/// surface as `Unauthenticated`, which is never retried.
#[derive(Debug, Clone)]
pub struct TransportInvoker {
    transport: Arc<dyn Transport>,
    credentials: Arc<dyn CredentialProvider>,
}

impl TransportInvoker {
    /// Invoker over `transport` authenticated by `credentials`
    pub fn new(transport: Arc<dyn Transport>, credentials: Arc<dyn CredentialProvider>) -> Self {
        Self {
            transport,
            credentials,
        }
    }
}

#[async_trait]
impl Invoker for TransportInvoker {
    async fn invoke(
        &self,
        ctx: &CallContext,
        method: &str,
        payload: Bytes,
    ) -> Result<Bytes, Status> {
        let metadata = self.credentials.call_metadata(ctx).map_err(|e| {
            Status::unauthenticated(format!("per-RPC credentials failed: {}", e))
        })?;

        let call = self.transport.unary(method, &metadata, payload);
        let bounded = async move {
            match ctx.deadline() {
                Some(deadline) => tokio::time::timeout_at(deadline, call)
                    .await
                    .unwrap_or_else(|_| Err(Status::deadline_exceeded("context deadline exceeded"))),
                None => call.await,
            }
        };

        tokio::select! {
            biased;
            _ = ctx.cancelled() => Err(Status::cancelled("context canceled")),
            result = bounded => result,
        }
    }
}

/// Logs the start, duration and outcome of every call
#[derive(Debug, Default, Clone, Copy)]
pub struct LoggingInterceptor;

#[async_trait]
impl Interceptor for LoggingInterceptor {
    async fn intercept(
        &self,
        ctx: &CallContext,
        method: &str,
        payload: Bytes,
        next: &dyn Invoker,
    ) -> Result<Bytes, Status> {
        let start = Instant::now();
        tracing::debug!(method, "gRPC request started");

        let result = next.invoke(ctx, method, payload).await;
        let duration_ms = start.elapsed().as_millis() as u64;

        match &result {
            Ok(_) => tracing::debug!(method, duration_ms, "gRPC request completed"),
            Err(status) => tracing::error!(
                method,
                duration_ms,
                code = ?status.code(),
                error = %status.message(),
                "gRPC request failed"
            ),
        }

        result
    }
}

/// Retries transient failures with exponential backoff
#[derive(Debug, Clone, Copy)]
pub struct RetryInterceptor {
    policy: RetryPolicy,
    attempt_timeout: Duration,
}

impl RetryInterceptor {
    /// Retry under `policy`, bounding each attempt by `attempt_timeout`
    pub fn new(policy: RetryPolicy, attempt_timeout: Duration) -> Self {
        Self {
            policy,
            attempt_timeout,
        }
    }
}

#[async_trait]
impl Interceptor for RetryInterceptor {
    async fn intercept(
        &self,
        ctx: &CallContext,
        method: &str,
        payload: Bytes,
        next: &dyn Invoker,
    ) -> Result<Bytes, Status> {
        let max_attempts = self.policy.max_attempts();
        let mut last_error = None;

        for attempt in 0..max_attempts {
            let attempt_ctx = ctx.child_with_timeout(self.attempt_timeout);
            let result = next.invoke(&attempt_ctx, method, payload.clone()).await;

            let status = match result {
                Ok(response) => {
                    if attempt > 0 {
                        tracing::info!(
                            method,
                            attempt = attempt + 1,
                            "Request succeeded after retry"
                        );
                    }
                    return Ok(response);
                }
                Err(status) => status,
            };

            let classified = CentralError::from_status(status.clone(), method);
            if !classified.is_retriable() {
                return Err(status);
            }

            let attempt = i64::from(attempt);
            if !self.policy.should_retry(attempt) {
                last_error = Some(status);
                break;
            }

            let backoff = self.policy.next_backoff(attempt);
            tracing::warn!(
                method,
                attempt = attempt + 1,
                max_retries = self.policy.max_retries(),
                backoff_ms = backoff.as_millis() as u64,
                error = %classified,
                "Request failed, retrying"
            );
            increment_counter!("stackrox_mcp_grpc_retries_total", "method" => method.to_string());
            last_error = Some(status);

            tokio::select! {
                biased;
                _ = ctx.cancelled() => return Err(Status::cancelled("context canceled")),
                _ = tokio::time::sleep(backoff) => {}
            }
        }

        let status =
            last_error.unwrap_or_else(|| Status::unknown("request failed without an attempt"));
        tracing::error!(
            method,
            max_retries = self.policy.max_retries(),
            error = %status.message(),
            "Request failed after all retries"
        );
        Err(status)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::central::auth::{PassthroughProvider, StaticTokenProvider};
    use crate::central::context::RequestMeta;
    use crate::central::transport::ConnectivityState;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use tonic::Code;

    /// Invoker replaying scripted results and counting calls
    #[derive(Default)]
    struct ScriptedInvoker {
        results: Mutex<VecDeque<Result<Bytes, Status>>>,
        calls: AtomicUsize,
    }

    impl ScriptedInvoker {
        fn new(results: Vec<Result<Bytes, Status>>) -> Self {
            Self {
                results: Mutex::new(results.into()),
                calls: AtomicUsize::new(0),
            }
        }

        fn always(status: Status) -> Self {
            Self::new((0..32).map(|_| Err(status.clone())).collect())
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl Invoker for ScriptedInvoker {
        async fn invoke(&self, _: &CallContext, _: &str, _: Bytes) -> Result<Bytes, Status> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.results
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Ok(Bytes::new()))
        }
    }

    fn retry(max_retries: u32) -> RetryInterceptor {
        RetryInterceptor::new(
            RetryPolicy::new(max_retries, Duration::from_millis(100), Duration::from_secs(1)),
            Duration::from_secs(30),
        )
    }

    #[tokio::test(start_paused = true)]
    async fn test_retriable_failures_use_every_attempt() {
        for max_retries in 1..=5u32 {
            let invoker = ScriptedInvoker::always(Status::unavailable("down"));
            let err = retry(max_retries)
                .intercept(&CallContext::new(), "/svc/M", Bytes::new(), &invoker)
                .await
                .unwrap_err();
            assert_eq!(err.code(), Code::Unavailable);
            assert_eq!(invoker.calls(), max_retries as usize);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_non_retriable_failure_stops_immediately() {
        let invoker = ScriptedInvoker::always(Status::permission_denied("no"));
        let err = retry(5)
            .intercept(&CallContext::new(), "/svc/M", Bytes::new(), &invoker)
            .await
            .unwrap_err();
        assert_eq!(err.code(), Code::PermissionDenied);
        assert_eq!(invoker.calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_zero_retries_means_one_attempt() {
        let invoker = ScriptedInvoker::always(Status::deadline_exceeded("slow"));
        let started = tokio::time::Instant::now();
        let err = retry(0)
            .intercept(&CallContext::new(), "/svc/M", Bytes::new(), &invoker)
            .await
            .unwrap_err();
        assert_eq!(err.code(), Code::DeadlineExceeded);
        assert_eq!(invoker.calls(), 1);
        assert_eq!(started.elapsed(), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn test_success_after_retry() {
        let invoker = ScriptedInvoker::new(vec![
            Err(Status::unavailable("blip")),
            Ok(Bytes::from_static(b"ok")),
        ]);
        let started = tokio::time::Instant::now();
        let response = retry(3)
            .intercept(&CallContext::new(), "/svc/M", Bytes::new(), &invoker)
            .await
            .unwrap();
        assert_eq!(response, Bytes::from_static(b"ok"));
        assert_eq!(invoker.calls(), 2);
        assert_eq!(started.elapsed(), Duration::from_millis(100));
    }

    #[tokio::test(start_paused = true)]
    async fn test_backoff_grows_between_attempts() {
        let invoker = ScriptedInvoker::always(Status::unavailable("down"));
        let started = tokio::time::Instant::now();
        let _ = retry(4)
            .intercept(&CallContext::new(), "/svc/M", Bytes::new(), &invoker)
            .await;
        // 100ms + 200ms + 400ms, no sleep after the last attempt
        assert_eq!(started.elapsed(), Duration::from_millis(700));
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_during_backoff_returns_cancelled_after_one_attempt() {
        let invoker = Arc::new(ScriptedInvoker::always(Status::unavailable("down")));
        let ctx = CallContext::new();
        let interceptor = RetryInterceptor::new(
            RetryPolicy::new(5, Duration::from_secs(10), Duration::from_secs(10)),
            Duration::from_secs(30),
        );

        let task = {
            let ctx = ctx.clone();
            let invoker = invoker.clone();
            tokio::spawn(async move {
                interceptor
                    .intercept(&ctx, "/svc/M", Bytes::new(), invoker.as_ref())
                    .await
            })
        };

        tokio::time::sleep(Duration::from_secs(1)).await;
        ctx.cancel();

        let err = task.await.unwrap().unwrap_err();
        assert_eq!(err.code(), Code::Cancelled);
        assert_eq!(invoker.calls(), 1);
    }

    #[derive(Debug)]
    struct SlowTransport {
        delay: Duration,
        seen: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl Transport for SlowTransport {
        async fn unary(
            &self,
            _method: &str,
            metadata: &crate::central::auth::CallMetadata,
            payload: Bytes,
        ) -> Result<Bytes, Status> {
            if let Some(value) = metadata.get("authorization") {
                self.seen.lock().unwrap().push(value.clone());
            }
            tokio::time::sleep(self.delay).await;
            Ok(payload)
        }

        fn state(&self) -> ConnectivityState {
            ConnectivityState::Ready
        }

        fn close(&self) {}
    }

    fn slow(delay: Duration) -> Arc<SlowTransport> {
        Arc::new(SlowTransport {
            delay,
            seen: Mutex::new(Vec::new()),
        })
    }

    #[tokio::test(start_paused = true)]
    async fn test_transport_invoker_attaches_credentials() {
        let transport = slow(Duration::ZERO);
        let invoker =
            TransportInvoker::new(transport.clone(), Arc::new(StaticTokenProvider::new("abc")));
        let response = invoker
            .invoke(&CallContext::new(), "/svc/M", Bytes::from_static(b"x"))
            .await
            .unwrap();
        assert_eq!(response, Bytes::from_static(b"x"));
        assert_eq!(transport.seen.lock().unwrap().as_slice(), ["Bearer abc"]);
    }

    #[tokio::test]
    async fn test_transport_invoker_credential_failure_is_unauthenticated() {
        let transport = slow(Duration::ZERO);
        let invoker = TransportInvoker::new(transport.clone(), Arc::new(PassthroughProvider::new()));
        let ctx = CallContext::new().with_request(RequestMeta::with_headers([("x", "y")]));
        let err = invoker.invoke(&ctx, "/svc/M", Bytes::new()).await.unwrap_err();
        assert_eq!(err.code(), Code::Unauthenticated);
        assert!(err.message().contains("authorization header is missing"));
        assert!(transport.seen.lock().unwrap().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_transport_invoker_enforces_deadline() {
        let invoker = TransportInvoker::new(
            slow(Duration::from_secs(60)),
            Arc::new(StaticTokenProvider::new("abc")),
        );
        let ctx = CallContext::new().child_with_timeout(Duration::from_secs(1));
        let err = invoker.invoke(&ctx, "/svc/M", Bytes::new()).await.unwrap_err();
        assert_eq!(err.code(), Code::DeadlineExceeded);
    }

    #[tokio::test(start_paused = true)]
    async fn test_attempt_timeout_is_retried() {
        let transport = slow(Duration::from_secs(60));
        let terminal =
            TransportInvoker::new(transport.clone(), Arc::new(StaticTokenProvider::new("abc")));
        let interceptors: Vec<Arc<dyn Interceptor>> = vec![
            Arc::new(LoggingInterceptor),
            Arc::new(RetryInterceptor::new(
                RetryPolicy::new(2, Duration::from_millis(10), Duration::from_millis(10)),
                Duration::from_secs(1),
            )),
        ];

        let err = Chain::new(&interceptors, &terminal)
            .invoke(&CallContext::new(), "/svc/M", Bytes::new())
            .await
            .unwrap_err();
        assert_eq!(err.code(), Code::DeadlineExceeded);
        assert_eq!(transport.seen.lock().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_chain_without_interceptors_reaches_terminal() {
        let terminal = ScriptedInvoker::new(vec![Ok(Bytes::from_static(b"done"))]);
        let response = Chain::new(&[], &terminal)
            .invoke(&CallContext::new(), "/svc/M", Bytes::new())
            .await
            .unwrap();
        assert_eq!(response, Bytes::from_static(b"done"));
    }
}
