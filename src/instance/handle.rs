//! Instance handle
//!
//! Typed, mutable-state proxy for one remote instance. The handle caches
//! the last-known server-side snapshot and refreshes it only through
//! [`reload`](InstanceHandle::reload); every mutation is submitted as a
//! tracked operation. Mutators return the [`Operation`] (asynchronous
//! mode); [`complete`](InstanceHandle::complete) is the blocking mode:
//! await the operation, then reload so the cached view reflects the
//! outcome.

use super::types::{
    parse_ssh_keys, render_ssh_keys, Instance, InstanceStatus, Metadata, MetadataItem,
    SshKeyEntry, SSH_KEYS_METADATA_KEY,
};
use crate::api::client::ComputeClient;
use crate::error::{Error, Result};
use crate::operation::Operation;
use crate::wait::{wait_for, WaitOptions};
use serde_json::{json, Value};
use std::collections::HashSet;
use std::path::PathBuf;

/// Serial port the in-guest agent answers password resets on.
const WINDOWS_AGENT_SERIAL_PORT: u8 = 4;

/// Parameters for [`InstanceHandle::bootstrap`].
#[derive(Debug, Clone)]
pub struct BootstrapParams {
    pub name: String,
    pub username: String,
    pub public_key_path: PathBuf,
    pub machine_type: String,
    pub source_image: String,
    pub wait: WaitOptions,
}

impl BootstrapParams {
    pub fn new(name: &str, username: &str, public_key_path: impl Into<PathBuf>) -> Self {
        Self {
            name: name.to_string(),
            username: username.to_string(),
            public_key_path: public_key_path.into(),
            machine_type: "e2-medium".to_string(),
            source_image: "projects/debian-cloud/global/images/family/debian-12".to_string(),
            wait: WaitOptions::default(),
        }
    }

    pub fn with_machine_type(mut self, machine_type: &str) -> Self {
        self.machine_type = machine_type.to_string();
        self
    }

    pub fn with_source_image(mut self, source_image: &str) -> Self {
        self.source_image = source_image.to_string();
        self
    }

    pub fn with_wait(mut self, wait: WaitOptions) -> Self {
        self.wait = wait;
        self
    }
}

/// Proxy for one remote instance
pub struct InstanceHandle {
    client: ComputeClient,
    name: String,
    snapshot: Instance,
    wait: WaitOptions,
}

impl InstanceHandle {
    /// Attach to an existing instance, fetching its initial snapshot.
    pub async fn attach(client: ComputeClient, name: &str) -> Result<Self> {
        let snapshot = fetch_instance(&client, name).await?;
        Ok(Self {
            client,
            name: name.to_string(),
            snapshot,
            wait: WaitOptions::default(),
        })
    }

    /// Create an instance with an auto-delete boot disk and an injected
    /// SSH key, wait for it to run and expose a public address, and
    /// return a ready handle.
    ///
    /// The key file is validated before any remote call, so a missing
    /// file never leaves an orphaned instance behind.
    pub async fn bootstrap(client: ComputeClient, params: BootstrapParams) -> Result<Self> {
        let public_key = std::fs::read_to_string(&params.public_key_path).map_err(|e| {
            Error::Configuration {
                message: format!(
                    "cannot read public key {}: {e}",
                    params.public_key_path.display()
                ),
            }
        })?;
        let ssh_entry = SshKeyEntry {
            username: params.username.clone(),
            key: public_key.trim().to_string(),
        };

        tracing::info!("bootstrapping instance {}", params.name);

        let body = json!({
            "name": &params.name,
            "machineType": machine_type_path(&client.config.zone, &params.machine_type),
            "disks": [{
                "boot": true,
                "autoDelete": true,
                "initializeParams": {"sourceImage": &params.source_image}
            }],
            "networkInterfaces": [{
                "accessConfigs": [{"name": "External NAT", "type": "ONE_TO_ONE_NAT"}]
            }],
            "metadata": {
                "items": [{"key": SSH_KEYS_METADATA_KEY, "value": ssh_entry.render()}]
            }
        });

        let url = client.zonal_url("instances");
        let mut op = client.operations().submit(&url, Some(&body)).await?;
        client.operations().await_completion(&mut op, &params.wait).await?;

        let mut handle = Self::attach(client, &params.name).await?;
        handle
            .wait_until(|i| i.status.is_running(), &params.wait)
            .await?;
        handle
            .wait_until(|i| i.public_ip().is_some(), &params.wait)
            .await?;

        tracing::info!(
            "instance {} running at {:?}",
            handle.name,
            handle.public_ip()
        );
        Ok(handle)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Last-known snapshot. Refreshed only by [`reload`](Self::reload)
    /// and the wait/complete paths.
    pub fn snapshot(&self) -> &Instance {
        &self.snapshot
    }

    pub fn status(&self) -> InstanceStatus {
        self.snapshot.status
    }

    pub fn metadata(&self) -> &Metadata {
        &self.snapshot.metadata
    }

    /// First external NAT IP (first interface, first access config).
    pub fn public_ip(&self) -> Option<&str> {
        self.snapshot.public_ip()
    }

    /// All external NAT IPs across interfaces.
    pub fn public_ips(&self) -> Vec<&str> {
        self.snapshot.public_ips()
    }

    pub fn private_ip(&self) -> Option<&str> {
        self.snapshot.private_ip()
    }

    pub fn private_ips(&self) -> Vec<&str> {
        self.snapshot.private_ips()
    }

    /// Override the cadence used by [`complete`](Self::complete) and the
    /// composite operations.
    pub fn set_wait_options(&mut self, wait: WaitOptions) {
        self.wait = wait;
    }

    /// Re-fetch the snapshot, replacing the cached attributes atomically.
    /// Fails with [`Error::NotFound`] if the instance no longer exists.
    pub async fn reload(&mut self) -> Result<()> {
        self.snapshot = fetch_instance(&self.client, &self.name).await?;
        Ok(())
    }

    /// Blocking mode for any mutator: await the operation to its terminal
    /// state, then reload so the snapshot reflects the outcome. Returns
    /// the terminal operation.
    pub async fn complete(&mut self, mut op: Operation) -> Result<Operation> {
        self.client
            .operations()
            .await_completion(&mut op, &self.wait)
            .await?;
        self.reload().await?;
        Ok(op)
    }

    /// Poll until the refreshed snapshot satisfies `predicate`; the
    /// satisfying state becomes the cached snapshot.
    pub async fn wait_until<P>(&mut self, predicate: P, opts: &WaitOptions) -> Result<()>
    where
        P: Fn(&Instance) -> bool,
    {
        let client = self.client.clone();
        let name = self.name.clone();
        let snapshot = wait_for(
            move || {
                let client = client.clone();
                let name = name.clone();
                async move { fetch_instance(&client, &name).await }
            },
            predicate,
            opts,
        )
        .await?;
        self.snapshot = snapshot;
        Ok(())
    }

    // =========================================================================
    // Status transitions
    // =========================================================================

    /// Start a stopped instance.
    pub async fn start(&mut self) -> Result<Operation> {
        tracing::info!("starting instance {}", self.name);
        let url = self.client.instance_action_url(&self.name, "start");
        self.client.operations().submit(&url, None).await
    }

    /// Stop the instance. `discard_local_ssd` is provider policy passed
    /// through: scratch disk contents are dropped instead of preserved.
    pub async fn stop(&mut self, discard_local_ssd: bool) -> Result<Operation> {
        tracing::info!("stopping instance {}", self.name);
        let mut url = self.client.instance_action_url(&self.name, "stop");
        if discard_local_ssd {
            url.push_str("?discardLocalSsd=true");
        }
        self.client.operations().submit(&url, None).await
    }

    /// Hard reset (power-cycle) the instance.
    pub async fn reboot(&mut self) -> Result<Operation> {
        tracing::info!("rebooting instance {}", self.name);
        let url = self.client.instance_action_url(&self.name, "reset");
        self.client.operations().submit(&url, None).await
    }

    /// Delete the instance. The handle stays usable for tracking the
    /// operation but any later reload fails with [`Error::NotFound`].
    pub async fn delete(&mut self) -> Result<Operation> {
        tracing::info!("deleting instance {}", self.name);
        let url = self.client.instance_url(&self.name);
        let response = self.client.delete(&url).await?;
        Operation::from_value(response)
    }

    // =========================================================================
    // Shape mutations
    // =========================================================================

    /// Change the machine type. The instance must be stopped; checked
    /// against the last-known status before any remote call is issued
    /// (reload first for a fresh check).
    pub async fn set_machine_type(&mut self, machine_type: &str) -> Result<Operation> {
        if !self.snapshot.status.is_stopped() {
            return Err(Error::Precondition {
                reason: format!(
                    "machine type of {} can only change while stopped (status is {:?})",
                    self.name, self.snapshot.status
                ),
            });
        }

        tracing::info!("setting machine type of {} to {}", self.name, machine_type);
        let url = self.client.instance_action_url(&self.name, "setMachineType");
        let body = json!({
            "machineType": machine_type_path(&self.client.config.zone, machine_type)
        });
        self.client.operations().submit(&url, Some(&body)).await
    }

    /// Replace the full metadata item list. Reloads first to pick up the
    /// current fingerprint; a concurrent write in between surfaces as
    /// [`Error::Conflict`] - reload and retry. The submitted list must be
    /// key-unique.
    pub async fn set_metadata(&mut self, items: Vec<MetadataItem>) -> Result<Operation> {
        let mut seen = HashSet::new();
        for item in &items {
            if !seen.insert(item.key.as_str()) {
                return Err(Error::Precondition {
                    reason: format!("duplicate metadata key {:?}", item.key),
                });
            }
        }

        self.reload().await?;
        let fingerprint = self.snapshot.metadata.fingerprint.clone();
        self.submit_metadata(items, fingerprint).await
    }

    /// Append a `user:key` line to the ssh-keys metadata entry.
    ///
    /// Read-modify-write against one reload: the write carries that
    /// reload's fingerprint, so a concurrent metadata change is caught as
    /// a conflict rather than silently lost. Append-only - a duplicate
    /// user+key pair yields a duplicate line.
    pub async fn add_ssh_key(&mut self, username: &str, key: &str) -> Result<Operation> {
        self.reload().await?;

        let mut entries = self
            .snapshot
            .metadata
            .get(SSH_KEYS_METADATA_KEY)
            .map(parse_ssh_keys)
            .unwrap_or_default();
        entries.push(SshKeyEntry {
            username: username.to_string(),
            key: key.to_string(),
        });

        let mut metadata = self.snapshot.metadata.clone();
        metadata.set(SSH_KEYS_METADATA_KEY, &render_ssh_keys(&entries));

        tracing::info!("adding ssh key for {} to {}", username, self.name);
        self.submit_metadata(metadata.items, metadata.fingerprint)
            .await
    }

    async fn submit_metadata(
        &self,
        items: Vec<MetadataItem>,
        fingerprint: Option<String>,
    ) -> Result<Operation> {
        let url = self.client.instance_action_url(&self.name, "setMetadata");
        let mut body = json!({ "items": items });
        if let Some(fp) = fingerprint {
            body["fingerprint"] = Value::String(fp);
        }
        self.client.operations().submit(&url, Some(&body)).await
    }

    // =========================================================================
    // Disks
    // =========================================================================

    /// Attach a disk under a device name. The disk's own `users` list
    /// trails this operation; observe it through
    /// [`DiskHandle`](super::disk::DiskHandle), not here.
    pub async fn attach_disk(
        &mut self,
        source: &str,
        device_name: &str,
        auto_delete: bool,
    ) -> Result<Operation> {
        tracing::info!("attaching disk {} to {} as {}", source, self.name, device_name);
        let url = self.client.instance_action_url(&self.name, "attachDisk");
        let body = json!({
            "source": source,
            "deviceName": device_name,
            "autoDelete": auto_delete
        });
        self.client.operations().submit(&url, Some(&body)).await
    }

    /// Detach the disk under a device name. Completion of the operation
    /// does not imply the disk's `users` list has cleared yet.
    pub async fn detach_disk(&mut self, device_name: &str) -> Result<Operation> {
        tracing::info!("detaching {} from {}", device_name, self.name);
        let url = format!(
            "{}?deviceName={}",
            self.client.instance_action_url(&self.name, "detachDisk"),
            device_name
        );
        self.client.operations().submit(&url, None).await
    }

    // =========================================================================
    // Console access
    // =========================================================================

    /// Fetch serial console output for a port.
    pub async fn serial_port_output(&self, port: u8) -> Result<String> {
        fetch_serial_output(&self.client, &self.name, port).await
    }

    /// Reset a Windows account password: submit the reset operation, then
    /// poll the agent's serial port until the response for `username`
    /// appears, and return the reported password.
    pub async fn reset_windows_password(&mut self, username: &str) -> Result<String> {
        tracing::info!("resetting Windows password for {} on {}", username, self.name);

        let url = self
            .client
            .instance_action_url(&self.name, "resetWindowsPassword");
        let body = json!({ "userName": username });
        let mut op = self.client.operations().submit(&url, Some(&body)).await?;
        self.client
            .operations()
            .await_completion(&mut op, &self.wait)
            .await?;

        let client = self.client.clone();
        let name = self.name.clone();
        let wanted = username.to_string();
        let contents = wait_for(
            move || {
                let client = client.clone();
                let name = name.clone();
                async move { fetch_serial_output(&client, &name, WINDOWS_AGENT_SERIAL_PORT).await }
            },
            move |contents: &String| find_windows_password(contents, &wanted).is_some(),
            &self.wait,
        )
        .await?;

        find_windows_password(&contents, username).ok_or_else(|| Error::Operation {
            id: op.name.clone(),
            message: format!("agent response for {username} disappeared from serial output"),
        })
    }
}

/// Fetch a fresh instance snapshot.
async fn fetch_instance(client: &ComputeClient, name: &str) -> Result<Instance> {
    let response = client.get(&client.instance_url(name)).await?;
    Ok(serde_json::from_value(response)?)
}

/// Fetch serial console contents for a port.
async fn fetch_serial_output(client: &ComputeClient, name: &str, port: u8) -> Result<String> {
    let response = client.get(&client.serial_port_url(name, port)).await?;
    Ok(response
        .get("contents")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string())
}

/// Qualify a machine type as a zonal path unless already qualified.
fn machine_type_path(zone: &str, machine_type: &str) -> String {
    if machine_type.contains('/') {
        machine_type.to_string()
    } else {
        format!("zones/{zone}/machineTypes/{machine_type}")
    }
}

/// Scan serial output (newest line first) for the agent's JSON response
/// carrying a password for `username`.
fn find_windows_password(contents: &str, username: &str) -> Option<String> {
    contents.lines().rev().find_map(|line| {
        let value: Value = serde_json::from_str(line.trim()).ok()?;
        if value.get("userName")?.as_str()? != username {
            return None;
        }
        value.get("password")?.as_str().map(str::to_string)
    })
}
