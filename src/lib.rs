//! Async client for compute resources
//!
//! Three layers on top of a provider's REST surface:
//!
//! - [`InstanceHandle`] / [`DiskHandle`] - in-memory proxies for remote
//!   resources, caching last-known state and exposing mutations
//! - [`OperationTracker`] - submits mutating calls, polls the returned
//!   [`Operation`] to its terminal state
//! - [`wait_for`] - generic predicate polling with backoff, for blocking
//!   until a refreshed snapshot satisfies an arbitrary condition
//!
//! Handles are independently owned and carry no shared mutable state;
//! consistency is delegated to the provider's per-resource serialization
//! and to fingerprint-versioned metadata writes.
//!
//! # Example
//!
//! ```ignore
//! use nimbus::{ClientConfig, ComputeClient, InstanceHandle, WaitOptions};
//!
//! async fn restart(name: &str) -> nimbus::Result<()> {
//!     let client = ComputeClient::new(ClientConfig::from_env()?)?;
//!     let mut server = InstanceHandle::attach(client, name).await?;
//!
//!     let op = server.stop(false).await?;
//!     server.complete(op).await?;
//!     server.wait_until(|i| i.status.is_stopped(), &WaitOptions::default()).await?;
//!
//!     let op = server.start().await?;
//!     server.complete(op).await?;
//!     Ok(())
//! }
//! ```

pub mod api;
pub mod config;
pub mod error;
pub mod instance;
pub mod operation;
pub mod wait;

pub use api::client::ComputeClient;
pub use config::ClientConfig;
pub use error::{ApiErrorPayload, Error, ErrorDetail, Result};
pub use instance::disk::DiskHandle;
pub use instance::handle::{BootstrapParams, InstanceHandle};
pub use instance::types::{
    parse_ssh_keys, render_ssh_keys, AccessConfig, AttachedDisk, Disk, Instance, InstanceStatus,
    Metadata, MetadataItem, NetworkInterface, SshKeyEntry, SSH_KEYS_METADATA_KEY,
};
pub use operation::{Operation, OperationError, OperationStatus, OperationTracker};
pub use wait::{wait_for, Backoff, WaitOptions};
