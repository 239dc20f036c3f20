//! Shared helpers for integration tests; each test crate uses a subset

#![allow(dead_code)]

use async_trait::async_trait;
use bytes::Bytes;
use std::fs;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use tempfile::TempDir;
use tonic::Status;

use stackrox_mcp::central::auth::CallMetadata;
use stackrox_mcp::central::transport::{
    ConnectivityState, DialOptions, Dialer, StateCell, Transport,
};
use stackrox_mcp::central::Client;
use stackrox_mcp::config::Config;

pub fn temp_config_file(contents: &str) -> (TempDir, PathBuf) {
    let temp_dir = TempDir::new().expect("failed to create tempdir");
    let config_path = temp_dir.path().join("config.yaml");
    fs::write(&config_path, contents).expect("failed to write config file");
    (temp_dir, config_path)
}

/// Static-auth configuration with both toolsets on
pub fn static_config() -> Config {
    let mut config = Config::default();
    config.central.auth_type = "static".to_string();
    config.central.api_token = "integration-token".to_string();
    config.central.initial_backoff = std::time::Duration::from_millis(10);
    config.central.max_backoff = std::time::Duration::from_millis(20);
    config.tools.vulnerability.enabled = true;
    config.tools.config_manager.enabled = true;
    config
}

type Handler = Box<dyn Fn(&str, Bytes) -> Result<Bytes, Status> + Send + Sync>;

/// Central stand-in answering from a closure and recording every call
pub struct ScriptedCentral {
    handler: Handler,
    state: StateCell,
    pub calls: Mutex<Vec<(String, CallMetadata)>>,
}

impl ScriptedCentral {
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

    pub fn client(self: &Arc<Self>, config: &Config) -> Arc<Client> {
        Arc::new(Client::with_dialer(
            config.central.clone(),
            Arc::new(ScriptedDialer(self.clone())),
        ))
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }
}

impl std::fmt::Debug for ScriptedCentral {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScriptedCentral").finish()
    }
}

#[async_trait]
impl Transport for ScriptedCentral {
    async fn unary(
        &self,
        method: &str,
        metadata: &CallMetadata,
        payload: Bytes,
    ) -> Result<Bytes, Status> {
        self.calls
            .lock()
            .unwrap()
            .push((method.to_string(), metadata.clone()));
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
struct ScriptedDialer(Arc<ScriptedCentral>);

impl Dialer for ScriptedDialer {
    fn dial(&self, _options: &DialOptions) -> anyhow::Result<Arc<dyn Transport>> {
        Ok(self.0.clone())
    }
}
