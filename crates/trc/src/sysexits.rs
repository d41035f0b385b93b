/*
 * SPDX-FileCopyrightText: 2024 A3Mailer Project
 *
 * SPDX-License-Identifier: AGPL-3.0-only OR LicenseRef-SEL
 */

//! POSIX `sysexits.h` codes used by the administrative CLI tools.

/// Successful termination.
pub const EX_OK: i32 = 0;
/// Command line usage error.
pub const EX_USAGE: i32 = 64;
/// Configuration error.
pub const EX_CONFIG: i32 = 78;
/// An operating system error occurred (e.g. cannot fork, cannot open a file).
pub const EX_OSERR: i32 = 71;
/// Temporary failure; the request should be retried.
pub const EX_TEMPFAIL: i32 = 75;
/// Internal software error detected.
pub const EX_SOFTWARE: i32 = 70;

use crate::{Error, EventType, LockEvent, MailboxEvent, RegistryEvent, StoreEvent};

/// Maps a workspace [`Error`] to the closest `sysexits` code, the way
/// admin binaries translate an error taxonomy into a process exit
/// status.
pub fn exit_code_for(err: &Error) -> i32 {
    match err.event {
        EventType::Config(_) => EX_CONFIG,
        EventType::Store(StoreEvent::IoError) => EX_OSERR,
        EventType::Store(StoreEvent::Conflict) => EX_TEMPFAIL,
        EventType::Mailbox(MailboxEvent::Again) => EX_TEMPFAIL,
        EventType::Lock(LockEvent::Contended) | EventType::Lock(LockEvent::Locked) => EX_TEMPFAIL,
        EventType::Registry(RegistryEvent::NotFound)
        | EventType::Registry(RegistryEvent::BadName)
        | EventType::Registry(RegistryEvent::BadIdentifier)
        | EventType::Registry(RegistryEvent::UnknownPartition) => EX_USAGE,
        EventType::Registry(RegistryEvent::PermissionDenied) => EX_USAGE,
        EventType::Registry(_) | EventType::Mailbox(_) | EventType::Lock(_) => EX_SOFTWARE,
        _ => EX_SOFTWARE,
    }
}
