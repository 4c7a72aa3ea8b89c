//! Instance resource layer
//!
//! Handles over remote compute resources, caching last-known state and
//! routing every mutation through tracked operations.
//!
//! # Module Structure
//!
//! - [`types`] - Snapshot models (instance, disk, metadata, interfaces)
//! - [`handle`] - [`InstanceHandle`](handle::InstanceHandle), the mutable-state proxy
//! - [`disk`] - [`DiskHandle`](disk::DiskHandle), for observing disk-side attachment state

pub mod disk;
pub mod handle;
pub mod types;
