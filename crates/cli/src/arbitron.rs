/*
 * SPDX-FileCopyrightText: 2024 A3Mailer Project
 *
 * SPDX-License-Identifier: AGPL-3.0-only OR LicenseRef-SEL
 */

//! `arbitron`: reports readership counts per mailbox. Per-user
//! `\Seen` state is outside this store's index record (it tracks only
//! the mailbox-wide system flag bitset), so "seen" here is reported
//! as the count of messages carrying the mailbox-wide `\Seen` flag
//! rather than a genuine per-reader tally; "subscribed" is an exact
//! count against the subscription store.

use clap::Args as ClapArgs;
use mailbox::{Caller, MailboxRegistry, OpenIntent, SystemFlags};
use prettytable::{row, Table};

#[derive(ClapArgs)]
pub struct Args {
    /// Print counts in parseable form instead of a table.
    #[arg(short = 'o', long)]
    machine_readable: bool,

    /// Only report unique-subscriber counts.
    #[arg(short = 'u', long)]
    subscribers_only: bool,

    /// Only report mailboxes with at least one reader.
    #[arg(short = 'l', long)]
    active_only: bool,

    pattern: Option<String>,
}

pub fn run(registry: &MailboxRegistry, args: Args) -> trc::Result<()> {
    let pattern = args.pattern.as_deref().unwrap_or("*");

    let mut names = Vec::new();
    registry.findall(pattern, &Caller::admin(), |name| {
        names.push(name.to_string());
        true
    })?;

    let mut table = Table::new();
    table.add_row(row!["mailbox", "seen", "subscribed"]);

    for name in names {
        let (open, _lock) = registry.open_mailbox(&name, OpenIntent::Irl)?;
        let seen = open.records.iter().filter(|r| r.system_flags.contains(SystemFlags::SEEN)).count();

        let subscribed = registry.subscriber_count(&name)?;

        if args.active_only && seen == 0 && subscribed == 0 {
            continue;
        }

        if args.machine_readable {
            if args.subscribers_only {
                println!("{name} {subscribed}");
            } else {
                println!("{name} {seen} {subscribed}");
            }
        } else {
            table.add_row(row![name, seen, subscribed]);
        }
    }

    if !args.machine_readable {
        table.printstd();
    }
    Ok(())
}
