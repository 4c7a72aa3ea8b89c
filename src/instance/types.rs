//! Instance and disk snapshot models
//!
//! Serde models for the provider's wire format (camelCase JSON), plus the
//! metadata and ssh-keys editing helpers. Snapshots are what `reload`
//! fetches; they are never mutated in place by the client - all mutation
//! goes through tracked operations.

use serde::{Deserialize, Serialize};

/// Metadata key holding the newline-delimited `user:key` ssh entries.
pub const SSH_KEYS_METADATA_KEY: &str = "ssh-keys";

/// Instance lifecycle status as reported by the provider.
///
/// A stopped instance reports `TERMINATED`; `SUSPENDED` is the separate
/// memory-preserving state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum InstanceStatus {
    Provisioning,
    Staging,
    Running,
    Stopping,
    Suspending,
    Suspended,
    Terminated,
}

impl InstanceStatus {
    /// Whether the instance is stopped (the provider reports stopped
    /// instances as `TERMINATED`).
    pub fn is_stopped(&self) -> bool {
        matches!(self, InstanceStatus::Terminated)
    }

    pub fn is_running(&self) -> bool {
        matches!(self, InstanceStatus::Running)
    }
}

/// One metadata entry. Keys are unique within an instance's metadata set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetadataItem {
    pub key: String,
    #[serde(default)]
    pub value: String,
}

impl MetadataItem {
    pub fn new(key: &str, value: &str) -> Self {
        Self {
            key: key.to_string(),
            value: value.to_string(),
        }
    }
}

/// Instance metadata: an ordered key/value list versioned by an opaque
/// fingerprint. Every write must carry the fingerprint read from the
/// latest reload; the provider rejects stale ones (optimistic
/// concurrency).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Metadata {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fingerprint: Option<String>,
    #[serde(default)]
    pub items: Vec<MetadataItem>,
}

impl Metadata {
    /// Value for a key, if present.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.items
            .iter()
            .find(|item| item.key == key)
            .map(|item| item.value.as_str())
    }

    /// Set a key, replacing an existing entry in place (order-preserving)
    /// or appending a new one.
    pub fn set(&mut self, key: &str, value: &str) {
        match self.items.iter_mut().find(|item| item.key == key) {
            Some(item) => item.value = value.to_string(),
            None => self.items.push(MetadataItem::new(key, value)),
        }
    }

    /// Remove a key, returning its previous value.
    pub fn remove(&mut self, key: &str) -> Option<String> {
        let idx = self.items.iter().position(|item| item.key == key)?;
        Some(self.items.remove(idx).value)
    }
}

/// One `user:key` line of the ssh-keys metadata entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SshKeyEntry {
    pub username: String,
    pub key: String,
}

impl SshKeyEntry {
    pub fn render(&self) -> String {
        format!("{}:{}", self.username, self.key)
    }
}

/// Parse the newline-delimited ssh-keys entry. Blank lines are skipped;
/// a line without a colon is treated as a bare key with no username.
pub fn parse_ssh_keys(raw: &str) -> Vec<SshKeyEntry> {
    raw.lines()
        .filter(|line| !line.trim().is_empty())
        .map(|line| match line.split_once(':') {
            Some((user, key)) => SshKeyEntry {
                username: user.to_string(),
                key: key.to_string(),
            },
            None => SshKeyEntry {
                username: String::new(),
                key: line.to_string(),
            },
        })
        .collect()
}

/// Render ssh-key entries back to the newline-delimited wire form.
pub fn render_ssh_keys(entries: &[SshKeyEntry]) -> String {
    entries
        .iter()
        .map(SshKeyEntry::render)
        .collect::<Vec<_>>()
        .join("\n")
}

/// A disk as seen from the instance it is attached to.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AttachedDisk {
    #[serde(default)]
    pub device_name: String,
    #[serde(default)]
    pub boot: bool,
    #[serde(default)]
    pub auto_delete: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
}

/// External address binding on a network interface.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccessConfig {
    #[serde(default)]
    pub name: String,
    #[serde(default, rename = "natIP", skip_serializing_if = "Option::is_none")]
    pub nat_ip: Option<String>,
}

/// One NIC of an instance.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NetworkInterface {
    #[serde(default)]
    pub name: String,
    #[serde(default, rename = "networkIP")]
    pub network_ip: Option<String>,
    #[serde(default)]
    pub access_configs: Vec<AccessConfig>,
}

/// Last-known server-side view of one instance.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Instance {
    pub name: String,
    #[serde(default)]
    pub self_link: Option<String>,
    #[serde(default)]
    pub zone: Option<String>,
    #[serde(default)]
    pub machine_type: Option<String>,
    pub status: InstanceStatus,
    #[serde(default)]
    pub metadata: Metadata,
    #[serde(default)]
    pub disks: Vec<AttachedDisk>,
    #[serde(default)]
    pub network_interfaces: Vec<NetworkInterface>,
}

impl Instance {
    /// Short machine type name (`.../machineTypes/e2-medium` -> `e2-medium`).
    pub fn machine_type_short(&self) -> Option<&str> {
        self.machine_type.as_deref().map(short_name)
    }

    /// External NAT IPs across all interfaces, in interface order.
    pub fn public_ips(&self) -> Vec<&str> {
        self.network_interfaces
            .iter()
            .flat_map(|nic| nic.access_configs.iter())
            .filter_map(|ac| ac.nat_ip.as_deref())
            .collect()
    }

    /// First external NAT IP (first interface, first access config).
    pub fn public_ip(&self) -> Option<&str> {
        self.public_ips().first().copied()
    }

    /// Internal IPs across all interfaces, in interface order.
    pub fn private_ips(&self) -> Vec<&str> {
        self.network_interfaces
            .iter()
            .filter_map(|nic| nic.network_ip.as_deref())
            .collect()
    }

    /// First internal IP.
    pub fn private_ip(&self) -> Option<&str> {
        self.private_ips().first().copied()
    }

    /// Attached disk by device name.
    pub fn disk_by_device(&self, device_name: &str) -> Option<&AttachedDisk> {
        self.disks.iter().find(|d| d.device_name == device_name)
    }
}

/// Standalone disk resource. The `users` list names the instances the
/// disk is attached to, by self-link; it trails attach/detach operations
/// (eventual consistency) and must be observed by polling the disk.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Disk {
    pub name: String,
    #[serde(default)]
    pub self_link: Option<String>,
    #[serde(default)]
    pub size_gb: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub users: Vec<String>,
}

/// Extract the short name from a resource URL
/// e.g. "https://x/compute/v1/projects/p/zones/z/instances/vm-1" -> "vm-1"
pub(crate) fn short_name(url: &str) -> &str {
    url.rsplit('/').next().unwrap_or(url)
}
