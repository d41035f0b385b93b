/*
 * SPDX-FileCopyrightText: 2024 A3Mailer Project
 *
 * SPDX-License-Identifier: AGPL-3.0-only OR LicenseRef-SEL
 */

//! `SORTED_MBOX` key collation: `.` sorts below every other printable
//! byte, so a mailbox sorts immediately before its own children.
//!
//! Plain byte order would put `user.fredjr` between `user.fred` and
//! `user.fred.INBOX` (`'j' < '.'`... no, `.` is 0x2e and `j` is 0x6a,
//! so plain order already has `user.fred` < `user.fred.INBOX` <
//! `user.fredjr`). The case that plain order gets wrong is any
//! separator-vs-printable tie where a sibling's name is a prefix
//! extension of its parent using a byte below `.`; remapping `.` to
//! the lowest rank makes prefix relationships collate as a contiguous
//! range regardless of which other bytes follow.

use std::cmp::Ordering;

/// Rank assigned to each byte under `SORTED_MBOX`: `.` (0x2e) is
/// remapped to rank 0, and every other byte keeps its natural order
/// shifted up by one so the mapping stays injective.
fn rank(byte: u8) -> u16 {
    match byte {
        b'.' => 0,
        other => other as u16 + 1,
    }
}

/// Compares two keys under the `SORTED_MBOX` collation.
pub fn compare(a: &[u8], b: &[u8]) -> Ordering {
    for (x, y) in a.iter().zip(b.iter()) {
        match rank(*x).cmp(&rank(*y)) {
            Ordering::Equal => continue,
            other => return other,
        }
    }
    a.len().cmp(&b.len())
}

/// A `BTreeMap`-friendly ordered key wrapper using [`compare`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MboxKey(pub Vec<u8>);

impl PartialOrd for MboxKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for MboxKey {
    fn cmp(&self, other: &Self) -> Ordering {
        compare(&self.0, &other.0)
    }
}
