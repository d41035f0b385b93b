/*
 * SPDX-FileCopyrightText: 2024 A3Mailer Project
 *
 * SPDX-License-Identifier: AGPL-3.0-only OR LicenseRef-SEL
 */

//! Mailbox store configuration.
//!
//! Loading is deliberately narrow: a single TOML document describing
//! where partitions, lockfiles and per-mailbox counters live, and the
//! handful of policy knobs the registry and storage engine consult
//! (virtual domains, the deleted-mailbox prefix, the default ACL).
//! Everything else a full server needs — listener config, TLS, auth
//! backends — is out of scope per the spec's Non-goals.

use std::{collections::BTreeMap, path::PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::ErrorContext;

/// Hash mode used to derive the on-disk directory for a mailbox name,
/// see §6 of the spec.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HashMode {
    /// One letter taken from the whole canonical name.
    Full,
    /// One letter taken from the last path segment only.
    Partial,
}

impl Default for HashMode {
    fn default() -> Self {
        HashMode::Full
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MailboxStoreConfig {
    /// Root directory holding `mailboxes.db`, per-user `.sub`/`.modseq`
    /// files, and per-mailbox `.modseq` counters.
    pub config_dir: PathBuf,

    /// Named partitions: partition name -> filesystem root.
    pub partitions: BTreeMap<String, PathBuf>,

    /// Partition chosen for new mailboxes when the caller and the
    /// parent mailbox do not specify one.
    pub default_partition: String,

    /// Root directory for per-mailbox lockfiles.
    pub lock_dir: PathBuf,

    /// Prefix prepended to the name of a mailbox awaiting purge.
    #[serde(default = "default_deleted_prefix")]
    pub deleted_prefix: String,

    /// Whether mailbox names may carry a `domain!` prefix.
    #[serde(default)]
    pub virtual_domains: bool,

    /// ACL applied to newly created shared mailboxes when neither the
    /// parent nor the caller supplies one.
    #[serde(default = "default_acl")]
    pub default_acl: String,

    #[serde(default)]
    pub hash_mode: HashMode,

    /// Maximum number of mailboxes directly under `user.<uid>`.
    #[serde(default = "default_folder_limit")]
    pub folder_limit_per_user: u32,

    /// Maximum byte length of a (non-deleted) mailbox name.
    #[serde(default = "default_max_name_len")]
    pub max_mailbox_name_len: usize,

    /// UNIX datagram socket the delivery notifier writes to. `None`
    /// disables the notifier (tests run with it unset).
    #[serde(default)]
    pub notify_socket: Option<PathBuf>,

    /// Address of the cross-node mailbox-update peer, if this node
    /// participates in a replicated topology.
    #[serde(default)]
    pub update_peer: Option<String>,
}

fn default_deleted_prefix() -> String {
    "DELETED".to_string()
}

fn default_acl() -> String {
    "anyone lrs".to_string()
}

fn default_folder_limit() -> u32 {
    1000
}

fn default_max_name_len() -> usize {
    490
}

impl MailboxStoreConfig {
    /// Reads and parses a TOML configuration file.
    pub fn load(path: &std::path::Path) -> trc::Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("reading config file {}", path.display()))?;
        toml::from_str(&content)
            .map_err(|e| {
                trc::Error::new(trc::EventType::Config(trc::ConfigEvent::ParseError))
                    .ctx(trc::Key::Reason, e.to_string())
            })
            .map_err(|e| e.caused_by(trc::location!()))
    }

    /// Resolves a partition name to its filesystem root.
    pub fn partition_path(&self, partition: &str) -> trc::Result<&PathBuf> {
        self.partitions.get(partition).ok_or_else(|| {
            trc::Error::new(trc::EventType::Config(trc::ConfigEvent::Missing))
                .ctx(trc::Key::PartitionName, partition.to_string())
                .caused_by(trc::location!())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> MailboxStoreConfig {
        let mut partitions = BTreeMap::new();
        partitions.insert("default".to_string(), PathBuf::from("/var/mail/default"));
        MailboxStoreConfig {
            config_dir: PathBuf::from("/var/mail/conf"),
            partitions,
            default_partition: "default".to_string(),
            lock_dir: PathBuf::from("/var/mail/lock"),
            deleted_prefix: default_deleted_prefix(),
            virtual_domains: false,
            default_acl: default_acl(),
            hash_mode: HashMode::Full,
            folder_limit_per_user: default_folder_limit(),
            max_mailbox_name_len: default_max_name_len(),
            notify_socket: None,
            update_peer: None,
        }
    }

    #[test]
    fn round_trips_through_toml() {
        let config = sample();
        let text = toml::to_string_pretty(&config).unwrap();
        let parsed: MailboxStoreConfig = toml::from_str(&text).unwrap();
        assert_eq!(parsed.default_partition, config.default_partition);
        assert_eq!(parsed.deleted_prefix, config.deleted_prefix);
    }

    #[test]
    fn load_rejects_missing_file() {
        let err = MailboxStoreConfig::load(std::path::Path::new("/nonexistent/path.toml"));
        assert!(err.is_err());
    }

    #[test]
    fn partition_path_reports_missing() {
        let config = sample();
        assert!(config.partition_path("default").is_ok());
        assert!(config.partition_path("ghost").is_err());
    }
}
