//! Test utilities for the StackRox MCP server
//!
//! Shared assertion helpers and fixtures for unit tests.

use crate::central::auth::CallMetadata;
use crate::central::transport::{
    ConnectivityState, DialOptions, Dialer, StateCell, Transport,
};
use crate::central::Client;
use crate::config::Config;
use async_trait::async_trait;
use bytes::Bytes;
use std::fmt::Display;
use std::sync::{Arc, Mutex};
use tonic::Status;

/// Assert that an error contains the expected message
///
/// Works with any error type that implements `Display`, including
/// `anyhow::Error`, [`crate::error::McpError`] and `tonic::Status`.
///
/// # Panics
///
/// Panics if the result is Ok or if the error doesn't contain the expected message
pub fn assert_error_contains<T, E: Display>(result: Result<T, E>, expected: &str) {
    match result {
        Ok(_) => panic!("Expected error containing '{}' but got Ok", expected),
        Err(e) => {
            let error_msg = e.to_string();
            assert!(
                error_msg.contains(expected),
                "Error message '{}' does not contain '{}'",
                error_msg,
                expected
            );
        }
    }
}

/// Configuration with static auth and both toolsets enabled
pub fn test_config() -> Config {
    let mut config = Config::default();
    config.central.auth_type = "static".to_string();
    config.central.api_token = "test-token".to_string();
    config.tools.vulnerability.enabled = true;
    config.tools.config_manager.enabled = true;
    config
}

type Handler = Box<dyn Fn(&str, Bytes) -> Result<Bytes, Status> + Send + Sync>;

/// In-memory Central answering unary calls from a closure
///
/// Records every call with its metadata so tests can inspect the
/// requests the tools produced.
pub struct FakeCentral {
    handler: Handler,
    state: StateCell,
    calls: Mutex<Vec<(String, CallMetadata, Bytes)>>,
}

impl FakeCentral {
    /// Fake answering with `handler(method, request)`
    pub fn new<F>(handler: F) -> Arc<Self>
    where
        F: Fn(&str, Bytes) -> Result<Bytes, Status> + Send + Sync + 'static,
    {
        Arc::new(Self {
            handler: Box::new(handler),
            state: StateCell::new(ConnectivityState::Idle),
            calls: Mutex::new(Vec::new()),
        })
    }

    /// Calls received so far
    pub fn calls(&self) -> Vec<(String, CallMetadata, Bytes)> {
        self.calls.lock().unwrap().clone()
    }

    /// Decode the request body of call `index`
    pub fn request<M: prost::Message + Default>(&self, index: usize) -> M {
        let calls = self.calls.lock().unwrap();
        M::decode(calls[index].2.clone()).unwrap()
    }

    /// Client whose every dial returns this fake
    pub fn client(self: &Arc<Self>, config: &Config) -> Arc<Client> {
        Arc::new(Client::with_dialer(
            config.central.clone(),
            Arc::new(FakeDialer(self.clone())),
        ))
    }
}

impl std::fmt::Debug for FakeCentral {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FakeCentral")
            .field("state", &self.state.get())
            .finish()
    }
}

#[async_trait]
impl Transport for FakeCentral {
    async fn unary(
        &self,
        method: &str,
        metadata: &CallMetadata,
        payload: Bytes,
    ) -> Result<Bytes, Status> {
        self.calls
            .lock()
            .unwrap()
            .push((method.to_string(), metadata.clone(), payload.clone()));
        let result = (self.handler)(method, payload);
        self.state.observe(&result);
        result
    }

    fn state(&self) -> ConnectivityState {
        self.state.get()
    }

    fn close(&self) {}
}

#[derive(Debug)]
struct FakeDialer(Arc<FakeCentral>);

impl Dialer for FakeDialer {
    fn dial(&self, _options: &DialOptions) -> crate::error::Result<Arc<dyn Transport>> {
        Ok(self.0.clone())
    }
}

/// Encode a prost message as a response body
pub fn encode<M: prost::Message>(message: &M) -> Bytes {
    Bytes::from(message.encode_to_vec())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_test_config_is_valid() {
        assert!(test_config().validate().is_ok());
    }

    #[test]
    fn test_assert_error_contains_success() {
        let result: Result<(), String> = Err("central.url is required".to_string());
        assert_error_contains(result, "url");
    }

    #[test]
    #[should_panic(expected = "Expected error")]
    fn test_assert_error_contains_panics_on_ok() {
        let result: Result<(), String> = Ok(());
        assert_error_contains(result, "error");
    }

    #[test]
    #[should_panic(expected = "does not contain")]
    fn test_assert_error_contains_panics_on_wrong_message() {
        let result: Result<(), String> = Err("other".to_string());
        assert_error_contains(result, "expected");
    }
}
