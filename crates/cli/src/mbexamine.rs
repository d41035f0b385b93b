/*
 * SPDX-FileCopyrightText: 2024 A3Mailer Project
 *
 * SPDX-License-Identifier: AGPL-3.0-only OR LicenseRef-SEL
 */

//! `mbexamine`: dumps a mailbox's header fields and either a single
//! index record (by UID or sequence number) or every record.

use clap::Args as ClapArgs;
use mailbox::{MailboxRegistry, OpenIntent};
use prettytable::{row, Table};

#[derive(ClapArgs)]
pub struct Args {
    /// Dump only the record for this UID.
    #[arg(short = 'u', long, conflicts_with = "seq")]
    uid: Option<u32>,

    /// Dump only the record at this 1-based sequence number.
    #[arg(short = 's', long)]
    seq: Option<usize>,

    mailboxes: Vec<String>,
}

pub fn run(registry: &MailboxRegistry, args: Args) -> trc::Result<()> {
    for name in &args.mailboxes {
        let (open, _lock) = registry.open_mailbox(name, OpenIntent::Irl)?;

        println!("mailbox: {name}");
        let mut header_table = Table::new();
        header_table.add_row(row!["uniqueid", open.header.uniqueid]);
        header_table.add_row(row!["acl", open.header.acl]);
        header_table.add_row(row!["uidvalidity", open.header.uidvalidity]);
        header_table.add_row(row!["last_uid", open.header.last_uid]);
        header_table.add_row(row!["highestmodseq", open.header.highestmodseq]);
        header_table.add_row(row!["exists", open.header.exists]);
        header_table.add_row(row!["deleted_count", open.header.deleted_count]);
        header_table.add_row(row!["answered_count", open.header.answered_count]);
        header_table.add_row(row!["flagged_count", open.header.flagged_count]);
        header_table.add_row(row!["quota_mailbox_used", open.header.quota_mailbox_used]);
        header_table.add_row(row!["quota_root", open.header.quota_root.clone().unwrap_or_default()]);
        header_table.printstd();

        let selected: Vec<_> = if let Some(uid) = args.uid {
            open.records.iter().filter(|r| r.uid == uid).collect()
        } else if let Some(seq) = args.seq {
            open.records.iter().skip(seq.saturating_sub(1)).take(1).collect()
        } else {
            open.records.iter().collect()
        };

        let mut record_table = Table::new();
        record_table.add_row(row!["uid", "internaldate", "size", "modseq", "flags"]);
        for record in selected {
            record_table.add_row(row![
                record.uid,
                record.internaldate,
                record.size,
                record.modseq,
                format!("{:?}", record.system_flags)
            ]);
        }
        record_table.printstd();
        println!();
    }
    Ok(())
}
