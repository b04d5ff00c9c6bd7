//! Library root for the `xmlrpc_host` crate
//!
//! A single-endpoint XML-RPC host: handler objects are registered under a
//! namespace, requests are dispatched by `namespace.method`, and results or
//! faults are encoded back onto the wire.

// Error handling
pub mod api_errors;
pub mod errors;
pub mod fault;

// Wire format
pub mod codec;
pub mod value;

// Dispatch
pub mod registry;
pub mod service;
pub mod system;

// Configuration, CLI and logging
pub mod cli;
pub mod config;
pub mod logging;

// HTTP server
pub mod server;

pub use config::HostConfig;
pub use errors::{HostError, HostResult};
pub use fault::{Fault, RpcResult, ServiceError};
pub use registry::{Handler, Registry};
pub use value::Value;

/// The registry the binary serves: the `service` namespace plus whatever
/// `system.*` features `config` enables.
pub fn build_registry(config: &HostConfig) -> HostResult<Registry> {
    system::install(
        Registry::builder().add_handler(service::NAMESPACE, service::Service),
        config.system_options(),
    )
}
