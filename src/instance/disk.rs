//! Disk handle
//!
//! Proxy for one standalone disk. Attach/detach operations complete on
//! the instance side first; the disk's `users` list catches up later, so
//! visibility is observed here by polling the disk itself.

use super::types::{short_name, Disk};
use crate::api::client::ComputeClient;
use crate::error::Result;
use crate::instance::handle::InstanceHandle;
use crate::wait::{wait_for, WaitOptions};

/// Proxy for one remote disk
pub struct DiskHandle {
    client: ComputeClient,
    name: String,
    snapshot: Disk,
}

impl DiskHandle {
    /// Attach to an existing disk, fetching its initial snapshot.
    pub async fn attach(client: ComputeClient, name: &str) -> Result<Self> {
        let snapshot = fetch_disk(&client, name).await?;
        Ok(Self {
            client,
            name: name.to_string(),
            snapshot,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn snapshot(&self) -> &Disk {
        &self.snapshot
    }

    /// Full resource link of this disk, as reported by the provider.
    pub fn self_link(&self) -> Option<&str> {
        self.snapshot.self_link.as_deref()
    }

    /// Instance self-links this disk is attached to, per the last reload.
    pub fn users(&self) -> &[String] {
        &self.snapshot.users
    }

    /// Whether the last-known `users` list names the given instance.
    pub fn is_attached_to(&self, instance: &InstanceHandle) -> bool {
        self.snapshot.users.iter().any(|user| {
            match instance.snapshot().self_link.as_deref() {
                Some(link) => user == link,
                None => short_name(user) == instance.name(),
            }
        })
    }

    /// Re-fetch the snapshot. Fails with
    /// [`Error::NotFound`](crate::Error::NotFound) if the disk vanished
    /// (e.g. auto-delete fired).
    pub async fn reload(&mut self) -> Result<()> {
        self.snapshot = fetch_disk(&self.client, &self.name).await?;
        Ok(())
    }

    /// Poll until the refreshed snapshot satisfies `predicate`; the
    /// satisfying state becomes the cached snapshot.
    pub async fn wait_until<P>(&mut self, predicate: P, opts: &WaitOptions) -> Result<()>
    where
        P: Fn(&Disk) -> bool,
    {
        let client = self.client.clone();
        let name = self.name.clone();
        let snapshot = wait_for(
            move || {
                let client = client.clone();
                let name = name.clone();
                async move { fetch_disk(&client, &name).await }
            },
            predicate,
            opts,
        )
        .await?;
        self.snapshot = snapshot;
        Ok(())
    }
}

/// Fetch a fresh disk snapshot.
async fn fetch_disk(client: &ComputeClient, name: &str) -> Result<Disk> {
    let response = client.get(&client.disk_url(name)).await?;
    Ok(serde_json::from_value(response)?)
}
