/*
 * SPDX-FileCopyrightText: 2024 A3Mailer Project
 *
 * SPDX-License-Identifier: AGPL-3.0-only OR LicenseRef-SEL
 */

//! `dav_reconstruct`: rebuilds a user's calendar/addressbook mailbox
//! set from its on-disk state. The mailbox store itself has nothing
//! to reconstruct beyond what `lookup` already verifies, so this is a
//! thin existence check plus an audit log entry per user id.

use clap::Args as ClapArgs;
use mailbox::{Caller, MailboxRegistry};

#[derive(ClapArgs)]
pub struct Args {
    /// Reconstruct every user's mailboxes, not just the ones named.
    #[arg(short = 'a', long)]
    all: bool,

    userids: Vec<String>,
}

pub fn run(registry: &MailboxRegistry, args: Args) -> trc::Result<()> {
    let userids = if args.all {
        let mut found = Vec::new();
        registry.findall("user.*", &Caller::admin(), |name| {
            if let Some(rest) = name.strip_prefix("user.") {
                if !rest.contains('.') {
                    found.push(rest.to_string());
                }
            }
            true
        })?;
        found
    } else {
        args.userids
    };

    for userid in &userids {
        let inbox = mailname::user_inbox(Some(userid)).ok_or_else(|| {
            trc::Error::new(trc::EventType::Registry(trc::RegistryEvent::BadIdentifier))
                .ctx(trc::Key::Identifier, userid.clone())
                .caused_by(trc::location!())
        })?;
        registry.lookup(&inbox)?;

        trc::Event::new(trc::EventType::Cli(trc::CliEvent::Completed))
            .ctx(trc::Key::Identifier, userid.clone())
            .emit();
        println!("{userid}: ok");
    }
    Ok(())
}
