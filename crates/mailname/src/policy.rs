/*
 * SPDX-FileCopyrightText: 2024 A3Mailer Project
 *
 * SPDX-License-Identifier: AGPL-3.0-only OR LicenseRef-SEL
 */

//! Name-legality checks applied before a mailbox is created or
//! renamed into existence.

use crate::parts::to_parts;

/// A segment may not be empty, may not be `..`, and may not contain a
/// NUL or `!` (the latter is reserved as the domain separator).
fn segment_is_legal(segment: &str) -> bool {
    !segment.is_empty() && !segment.contains(['\0', '!']) && segment != ".."
}

/// Enforces the hierarchy's bad-name patterns and length limit.
/// Deleted-named mailboxes (already carrying the deleted prefix) are
/// exempt from the length limit, since the hex8 suffix is
/// system-appended and must never itself be rejected.
pub fn policycheck(internal: &str, deleted_prefix: &str, max_len: usize) -> trc::Result<()> {
    if internal.is_empty() {
        return Err(bad_name(internal, "empty name"));
    }

    let rest = internal.split_once('!').map(|(_, r)| r).unwrap_or(internal);
    for segment in rest.split('.') {
        if !segment_is_legal(segment) {
            return Err(bad_name(internal, "illegal segment"));
        }
    }

    let parts = to_parts(internal, deleted_prefix);
    if !parts.is_deleted && internal.len() > max_len {
        return Err(bad_name(internal, "name exceeds maximum length"));
    }

    crate::utf7::validate(rest).map_err(|_| bad_name(internal, "invalid modified UTF-7 segment"))?;

    Ok(())
}

fn bad_name(internal: &str, reason: &str) -> trc::Error {
    trc::Error::new(trc::EventType::Registry(trc::RegistryEvent::BadName))
        .ctx(trc::Key::MailboxName, internal.to_string())
        .ctx(trc::Key::Reason, reason.to_string())
        .caused_by(trc::location!())
}
