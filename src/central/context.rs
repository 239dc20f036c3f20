//! Per-call context threaded from the MCP boundary into RPC calls
//!
//! A [`CallContext`] carries the caller's cancellation signal, an optional
//! deadline and the inbound request metadata the passthrough credential
//! provider reads. Contexts are cheap to clone and children inherit
//! cancellation from their parent.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// Metadata of the inbound MCP request that triggered a call
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RequestMeta {
    headers: Option<BTreeMap<String, String>>,
}

impl RequestMeta {
    /// Request without transport headers (stdio)
    pub fn without_headers() -> Self {
        Self { headers: None }
    }

    /// Request carrying HTTP headers; names are matched case-insensitively
    pub fn with_headers<I, K, V>(headers: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: Into<String>,
    {
        let headers = headers
            .into_iter()
            .map(|(k, v)| (k.as_ref().to_ascii_lowercase(), v.into()))
            .collect();
        Self {
            headers: Some(headers),
        }
    }

    /// Whether the transport supplied headers at all
    pub fn has_headers(&self) -> bool {
        self.headers.is_some()
    }

    /// Header value by case-insensitive name
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .as_ref()?
            .get(&name.to_ascii_lowercase())
            .map(String::as_str)
    }
}

/// Cancellation, deadline and caller metadata for one logical call
#[derive(Debug, Clone, Default)]
pub struct CallContext {
    cancel: CancellationToken,
    deadline: Option<Instant>,
    request: Option<Arc<RequestMeta>>,
}

impl CallContext {
    /// Root context with no deadline and no request metadata
    pub fn new() -> Self {
        Self::default()
    }

    /// Root context bound to an existing cancellation token
    pub fn with_cancellation(cancel: CancellationToken) -> Self {
        Self {
            cancel,
            ..Self::default()
        }
    }

    /// Attach the inbound request metadata
    pub fn with_request(mut self, request: RequestMeta) -> Self {
        self.request = Some(Arc::new(request));
        self
    }

    /// Inbound request metadata, if any was attached
    pub fn request(&self) -> Option<&RequestMeta> {
        self.request.as_deref()
    }

    /// Child context that expires `timeout` from now
    ///
    /// The child is cancelled when the parent is, but its deadline does not
    /// depend on the parent's deadline.
    pub fn child_with_timeout(&self, timeout: Duration) -> Self {
        Self {
            cancel: self.cancel.child_token(),
            deadline: Some(Instant::now() + timeout),
            request: self.request.clone(),
        }
    }

    /// Deadline of this context
    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Cancel this context and all of its children
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Whether the context was cancelled
    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Resolves when the context is cancelled
    pub async fn cancelled(&self) {
        self.cancel.cancelled().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_header_lookup_is_case_insensitive() {
        let meta = RequestMeta::with_headers([("Authorization", "Bearer abc")]);
        assert!(meta.has_headers());
        assert_eq!(meta.header("authorization"), Some("Bearer abc"));
        assert_eq!(meta.header("AUTHORIZATION"), Some("Bearer abc"));
        assert_eq!(meta.header("x-other"), None);
    }

    #[test]
    fn test_without_headers() {
        let meta = RequestMeta::without_headers();
        assert!(!meta.has_headers());
        assert_eq!(meta.header("authorization"), None);
    }

    #[tokio::test]
    async fn test_child_cancelled_with_parent() {
        let parent = CallContext::new();
        let child = parent.child_with_timeout(Duration::from_secs(60));
        assert!(!child.is_cancelled());

        parent.cancel();
        child.cancelled().await;
        assert!(child.is_cancelled());
    }

    #[tokio::test]
    async fn test_child_cancel_does_not_cancel_parent() {
        let parent = CallContext::new();
        let child = parent.child_with_timeout(Duration::from_secs(1));
        child.cancel();
        assert!(!parent.is_cancelled());
    }

    #[tokio::test(start_paused = true)]
    async fn test_child_deadline_independent_of_parent() {
        let parent = CallContext::new().child_with_timeout(Duration::from_millis(10));
        let child = parent.child_with_timeout(Duration::from_secs(5));
        assert!(child.deadline().unwrap() > parent.deadline().unwrap());
    }

    #[test]
    fn test_child_keeps_request_meta() {
        let ctx = CallContext::new().with_request(RequestMeta::with_headers([("a", "b")]));
        let child = ctx.child_with_timeout(Duration::from_secs(1));
        assert_eq!(child.request().and_then(|r| r.header("a")), Some("b"));
    }
}
