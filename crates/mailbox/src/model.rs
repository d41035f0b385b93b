/*
 * SPDX-FileCopyrightText: 2024 A3Mailer Project
 *
 * SPDX-License-Identifier: AGPL-3.0-only OR LicenseRef-SEL
 */

//! Registry record and on-disk index record shapes (§3).

use bitflags::bitflags;
use serde::{Deserialize, Serialize};

bitflags! {
    /// Mailbox type bitset.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
    pub struct MbType: u32 {
        /// Mailbox lives on another node; `partition` is `host!partition`.
        const REMOTE = 0b0000_0001;
        /// Name claimed, not yet materialised on disk.
        const RESERVE = 0b0000_0010;
        /// Mid-rename to a new location.
        const MOVING = 0b0000_0100;
        /// Transitioned to its deleted-prefix name, awaiting purge.
        const DELETED = 0b0000_1000;
        const CALENDAR = 0b0001_0000;
        const NETNEWS = 0b0010_0000;
        const SPECIALUSE = 0b0100_0000;
        /// Visible in listings but not selectable (an intermediate node).
        const NOSELECT = 0b1000_0000;
    }
}

/// The value stored in `mblist` under a mailbox's internal name.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegistryRecord {
    pub mbtype: MbType,
    /// Local partition name, or `"host!partition"` when `REMOTE` is set.
    pub partition: String,
    /// Whitespace-separated `identifier rights` pairs.
    pub acl: String,
    pub uniqueid: String,
    pub uidvalidity: u32,
    /// Nearest ancestor name this mailbox's usage accounts against,
    /// or itself if it is a quota root.
    pub quota_root: Option<String>,
}

impl RegistryRecord {
    pub fn encode(&self) -> Vec<u8> {
        serde_json::to_vec(self).expect("RegistryRecord always serialises")
    }

    pub fn decode(bytes: &[u8]) -> trc::Result<Self> {
        serde_json::from_slice(bytes).map_err(|e| {
            trc::Error::new(trc::EventType::Store(trc::StoreEvent::Corruption))
                .ctx(trc::Key::Reason, e.to_string())
                .caused_by(trc::location!())
        })
    }
}

/// System flags tracked per message (§3 index record).
bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
    pub struct SystemFlags: u8 {
        const SEEN = 0b0000_0001;
        const DELETED = 0b0000_0010;
        const DRAFT = 0b0000_0100;
        const FLAGGED = 0b0000_1000;
        const ANSWERED = 0b0001_0000;
    }
}

/// A fixed-shape per-message index record (§3, §6).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexRecord {
    pub uid: u32,
    pub internaldate: i64,
    pub sentdate: i64,
    pub size: u32,
    pub hdrsize: u32,
    pub system_flags: SystemFlags,
    pub user_flags: Vec<bool>,
    pub guid: [u8; 20],
    pub modseq: u64,
    pub cache_offset: u64,
}

/// The mailbox header (§3, §6): ACL backup, unique id, the
/// per-mailbox user-flag vocabulary, option bits, and the running
/// counters that gate UID/modseq assignment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Header {
    pub acl: String,
    pub uniqueid: String,
    /// At most 128 user-flag names, indexed by `IndexRecord::user_flags`.
    pub flag_names: Vec<String>,
    pub options: u32,
    pub quota_root: Option<String>,
    pub uidvalidity: u32,
    pub last_uid: u32,
    pub highestmodseq: u64,
    pub last_appenddate: i64,
    pub exists: u32,
    pub deleted_count: u32,
    pub answered_count: u32,
    pub flagged_count: u32,
    pub quota_mailbox_used: u64,
    pub pop3_last_login: i64,
}

impl Header {
    pub fn new(uniqueid: String, acl: String, uidvalidity: u32) -> Self {
        Header {
            acl,
            uniqueid,
            flag_names: Vec::new(),
            options: 0,
            quota_root: None,
            uidvalidity,
            last_uid: 0,
            highestmodseq: 1,
            last_appenddate: 0,
            exists: 0,
            deleted_count: 0,
            answered_count: 0,
            flagged_count: 0,
            quota_mailbox_used: 0,
            pop3_last_login: 0,
        }
    }
}
