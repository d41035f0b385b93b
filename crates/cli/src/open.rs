/*
 * SPDX-FileCopyrightText: 2024 A3Mailer Project
 *
 * SPDX-License-Identifier: AGPL-3.0-only OR LicenseRef-SEL
 */

//! Wires a [`MailboxRegistry`] to the on-disk sqlite-backed stores
//! under a configuration's `config_dir`, the way each admin tool
//! needs one before doing anything else.

use std::sync::Arc;

use common::MailboxStoreConfig;
use mailbox::MailboxRegistry;
use store::OpenFlags;

pub fn open_registry(config: MailboxStoreConfig) -> trc::Result<MailboxRegistry> {
    let mblist = store::open_sqlite(&config.config_dir.join("mailboxes.db"), OpenFlags::default())?;
    let subs = store::open_sqlite(&config.config_dir.join("subscriptions.db"), OpenFlags::default())?;
    Ok(MailboxRegistry::new(Arc::new(mblist), Arc::new(subs), config))
}
