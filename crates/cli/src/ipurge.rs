/*
 * SPDX-FileCopyrightText: 2024 A3Mailer Project
 *
 * SPDX-License-Identifier: AGPL-3.0-only OR LicenseRef-SEL
 */

//! `ipurge`: expunges messages out of every mailbox matching the
//! given patterns according to an age or size policy, printing a
//! running total/bytes/deleted/deleted_bytes/remaining/remaining_bytes
//! tally.

use std::time::{SystemTime, UNIX_EPOCH};

use clap::Args as ClapArgs;
use mailbox::{MailboxRegistry, OpenIntent, SystemFlags};

#[derive(ClapArgs)]
pub struct Args {
    /// Unlink message files immediately instead of leaving them for
    /// a later `reap`.
    #[arg(short = 'f', long)]
    force: bool,

    /// Don't purge messages carrying `\Flagged`.
    #[arg(short = 's', long)]
    skip_flagged: bool,

    /// Exclude messages already marked `\Deleted` from this pass.
    #[arg(short = 'x', long)]
    exclude_deleted: bool,

    /// Only consider messages already marked `\Deleted`.
    #[arg(short = 'X', long)]
    only_deleted: bool,

    /// Also purge messages already marked `\Deleted`, regardless of
    /// the age/size policy.
    #[arg(short = 'i', long)]
    include_deleted: bool,

    /// Report counts without expunging anything.
    #[arg(short = 'o', long)]
    report_only: bool,

    /// Purge messages older than this many days.
    #[arg(short = 'd', long, conflicts_with_all = ["bytes", "kilobytes", "megabytes"])]
    days: Option<u64>,

    /// Purge messages at least this many bytes.
    #[arg(short = 'b', long)]
    bytes: Option<u64>,

    /// Purge messages at least this many kilobytes.
    #[arg(short = 'k', long)]
    kilobytes: Option<u64>,

    /// Purge messages at least this many megabytes.
    #[arg(short = 'm', long)]
    megabytes: Option<u64>,

    /// Mailbox name patterns (`*`/`%`/`?` globs); every mailbox if empty.
    patterns: Vec<String>,
}

#[derive(Default)]
struct Tally {
    total: u64,
    bytes: u64,
    deleted: u64,
    deleted_bytes: u64,
}

pub fn run(registry: &MailboxRegistry, args: Args) -> trc::Result<()> {
    let size_threshold = args
        .bytes
        .or(args.kilobytes.map(|k| k * 1024))
        .or(args.megabytes.map(|m| m * 1024 * 1024));

    let now = SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default().as_secs() as i64;
    let age_cutoff = args.days.map(|days| now - (days as i64) * 86_400);

    let patterns = if args.patterns.is_empty() {
        vec!["*".to_string()]
    } else {
        args.patterns
    };

    let mut names = Vec::new();
    for pattern in &patterns {
        registry.findall(pattern, &mailbox::Caller::admin(), |name| {
            names.push(name.to_string());
            true
        })?;
    }
    names.sort();
    names.dedup();

    let mut tally = Tally::default();
    for name in names {
        let (mut open, _lock) = registry.open_mailbox(&name, OpenIntent::Iwl)?;
        let mut matched = Vec::new();
        for record in &open.records {
            tally.total += 1;
            tally.bytes += record.size as u64;

            let already_deleted = record.system_flags.contains(SystemFlags::DELETED);
            if args.only_deleted && !already_deleted {
                continue;
            }
            if args.exclude_deleted && already_deleted {
                continue;
            }
            if args.skip_flagged && record.system_flags.contains(SystemFlags::FLAGGED) {
                continue;
            }

            let age_matches = age_cutoff.map(|cutoff| record.internaldate <= cutoff).unwrap_or(false);
            let size_matches = size_threshold.map(|t| record.size as u64 >= t).unwrap_or(false);
            if age_matches || size_matches || (args.include_deleted && already_deleted) {
                matched.push(record.uid);
            }
        }

        if !matched.is_empty() && !args.report_only {
            let expunged = open.expunge(|r| matched.contains(&r.uid))?;
            for record in &open.records {
                if expunged.contains(&record.uid) {
                    tally.deleted += 1;
                    tally.deleted_bytes += record.size as u64;
                }
            }
            open.commit()?;
            if args.force {
                registry.reap(&name)?;
            }
        } else if !matched.is_empty() {
            for record in &open.records {
                if matched.contains(&record.uid) {
                    tally.deleted += 1;
                    tally.deleted_bytes += record.size as u64;
                }
            }
        }
    }

    let remaining = tally.total - tally.deleted;
    let remaining_bytes = tally.bytes.saturating_sub(tally.deleted_bytes);
    println!(
        "{} {} {} {} {} {}",
        tally.total, tally.bytes, tally.deleted, tally.deleted_bytes, remaining, remaining_bytes
    );
    Ok(())
}
