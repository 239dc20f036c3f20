//! Resilient client for StackRox Central
//!
//! Layers, from the tools down:
//!
//! - [`api`]: typed calls for the services the tools use
//! - [`client`]: the shared connection manager
//! - [`interceptor`]: logging and retry around every unary call
//! - [`auth`]: per-call bearer credentials
//! - [`transport`]: native gRPC or gRPC-Web over HTTP/1.1
//!
//! Failures leave this module as [`CentralError`], classified by
//! [`error`].

pub mod api;
pub mod auth;
pub mod client;
pub mod context;
pub mod error;
pub mod interceptor;
pub mod retry;
pub mod transport;

pub use client::{Client, Connection};
pub use context::{CallContext, RequestMeta};
pub use error::CentralError;
pub use retry::RetryPolicy;
