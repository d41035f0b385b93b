/*
 * SPDX-FileCopyrightText: 2024 A3Mailer Project
 *
 * SPDX-License-Identifier: AGPL-3.0-only OR LicenseRef-SEL
 */

//! Shared configuration and error-context plumbing used by the
//! mailbox registry, storage engine, and administrative CLI.

pub mod config;
pub mod error;

pub use config::{HashMode, MailboxStoreConfig};
pub use error::ErrorContext;
