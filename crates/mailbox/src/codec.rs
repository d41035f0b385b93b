/*
 * SPDX-FileCopyrightText: 2024 A3Mailer Project
 *
 * SPDX-License-Identifier: AGPL-3.0-only OR LicenseRef-SEL
 */

//! Bit-exact on-disk encoding for index records (§3, §6), plus a
//! fixed-width numeric preamble for the header with a small JSON
//! trailer for its variable-length fields (ACL, unique id, flag
//! names). The index is pure fixed-width since every record has the
//! same shape; the header mixes a handful of counters updated on
//! every commit with data that changes only on `setacl`/`rename`.

use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};
use std::io::{self, Cursor, Read, Write};

use crate::model::{Header, IndexRecord, SystemFlags};

/// Fixed size in bytes of one encoded [`IndexRecord`].
pub const INDEX_RECORD_SIZE: usize = 84;

const MAX_USER_FLAGS: usize = 128;

pub fn encode_index_record(record: &IndexRecord, buf: &mut Vec<u8>) {
    let mut words = [0u32; 4];
    for (i, set) in record.user_flags.iter().enumerate().take(MAX_USER_FLAGS) {
        if *set {
            words[i / 32] |= 1 << (i % 32);
        }
    }

    buf.write_u32::<BigEndian>(record.uid).unwrap();
    buf.write_i64::<BigEndian>(record.internaldate).unwrap();
    buf.write_i64::<BigEndian>(record.sentdate).unwrap();
    buf.write_u32::<BigEndian>(record.size).unwrap();
    buf.write_u32::<BigEndian>(record.hdrsize).unwrap();
    buf.write_u8(record.system_flags.bits()).unwrap();
    buf.write_all(&[0u8; 3]).unwrap();
    for word in words {
        buf.write_u32::<BigEndian>(word).unwrap();
    }
    buf.write_all(&record.guid).unwrap();
    buf.write_u64::<BigEndian>(record.modseq).unwrap();
    buf.write_u64::<BigEndian>(record.cache_offset).unwrap();
}

pub fn decode_index_record(bytes: &[u8], flag_name_count: usize) -> io::Result<IndexRecord> {
    if bytes.len() != INDEX_RECORD_SIZE {
        return Err(io::Error::new(io::ErrorKind::InvalidData, "short index record"));
    }
    let mut cursor = Cursor::new(bytes);
    let uid = cursor.read_u32::<BigEndian>()?;
    let internaldate = cursor.read_i64::<BigEndian>()?;
    let sentdate = cursor.read_i64::<BigEndian>()?;
    let size = cursor.read_u32::<BigEndian>()?;
    let hdrsize = cursor.read_u32::<BigEndian>()?;
    let system_flags = SystemFlags::from_bits_truncate(cursor.read_u8()?);
    let mut pad = [0u8; 3];
    cursor.read_exact(&mut pad)?;
    let mut words = [0u32; 4];
    for word in &mut words {
        *word = cursor.read_u32::<BigEndian>()?;
    }
    let mut guid = [0u8; 20];
    cursor.read_exact(&mut guid)?;
    let modseq = cursor.read_u64::<BigEndian>()?;
    let cache_offset = cursor.read_u64::<BigEndian>()?;

    let mut user_flags = Vec::with_capacity(flag_name_count);
    for i in 0..flag_name_count.min(MAX_USER_FLAGS) {
        user_flags.push(words[i / 32] & (1 << (i % 32)) != 0);
    }

    Ok(IndexRecord {
        uid,
        internaldate,
        sentdate,
        size,
        hdrsize,
        system_flags,
        user_flags,
        guid,
        modseq,
        cache_offset,
    })
}

/// Fixed-width numeric preamble, followed by a length-prefixed JSON
/// trailer holding ACL/uniqueid/flag-name/quota-root.
pub fn encode_header(header: &Header) -> Vec<u8> {
    let mut buf = Vec::new();
    buf.write_u32::<BigEndian>(1).unwrap(); // generation
    buf.write_u32::<BigEndian>(1).unwrap(); // minor_version
    buf.write_u32::<BigEndian>(header.exists).unwrap();
    buf.write_u32::<BigEndian>(header.last_uid).unwrap();
    buf.write_u64::<BigEndian>(header.quota_mailbox_used).unwrap();
    buf.write_i64::<BigEndian>(header.last_appenddate).unwrap();
    buf.write_u32::<BigEndian>(header.uidvalidity).unwrap();
    buf.write_u32::<BigEndian>(header.deleted_count).unwrap();
    buf.write_u32::<BigEndian>(header.answered_count).unwrap();
    buf.write_u32::<BigEndian>(header.flagged_count).unwrap();
    buf.write_u32::<BigEndian>(header.options).unwrap();
    buf.write_i64::<BigEndian>(header.pop3_last_login).unwrap();
    buf.write_u64::<BigEndian>(header.highestmodseq).unwrap();

    let trailer = serde_json::to_vec(&HeaderTrailer {
        acl: header.acl.clone(),
        uniqueid: header.uniqueid.clone(),
        flag_names: header.flag_names.clone(),
        quota_root: header.quota_root.clone(),
    })
    .expect("header trailer always serialises");
    buf.write_u32::<BigEndian>(trailer.len() as u32).unwrap();
    buf.extend_from_slice(&trailer);
    buf
}

#[derive(serde::Serialize, serde::Deserialize)]
struct HeaderTrailer {
    acl: String,
    uniqueid: String,
    flag_names: Vec<String>,
    quota_root: Option<String>,
}

pub fn decode_header(bytes: &[u8]) -> trc::Result<Header> {
    let mut cursor = Cursor::new(bytes);
    let read = || -> io::Result<Header> {
        let mut cursor = Cursor::new(bytes);
        let _generation = cursor.read_u32::<BigEndian>()?;
        let _minor_version = cursor.read_u32::<BigEndian>()?;
        let exists = cursor.read_u32::<BigEndian>()?;
        let last_uid = cursor.read_u32::<BigEndian>()?;
        let quota_mailbox_used = cursor.read_u64::<BigEndian>()?;
        let last_appenddate = cursor.read_i64::<BigEndian>()?;
        let uidvalidity = cursor.read_u32::<BigEndian>()?;
        let deleted_count = cursor.read_u32::<BigEndian>()?;
        let answered_count = cursor.read_u32::<BigEndian>()?;
        let flagged_count = cursor.read_u32::<BigEndian>()?;
        let options = cursor.read_u32::<BigEndian>()?;
        let pop3_last_login = cursor.read_i64::<BigEndian>()?;
        let highestmodseq = cursor.read_u64::<BigEndian>()?;
        let trailer_len = cursor.read_u32::<BigEndian>()? as usize;
        let mut trailer_bytes = vec![0u8; trailer_len];
        cursor.read_exact(&mut trailer_bytes)?;
        let trailer: HeaderTrailer = serde_json::from_slice(&trailer_bytes)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;

        Ok(Header {
            acl: trailer.acl,
            uniqueid: trailer.uniqueid,
            flag_names: trailer.flag_names,
            options,
            quota_root: trailer.quota_root,
            uidvalidity,
            last_uid,
            highestmodseq,
            last_appenddate,
            exists,
            deleted_count,
            answered_count,
            flagged_count,
            quota_mailbox_used,
            pop3_last_login,
        })
    };
    let _ = &mut cursor;
    read().map_err(|e| {
        trc::Error::new(trc::EventType::Mailbox(trc::MailboxEvent::HeaderCorrupt))
            .ctx(trc::Key::Reason, e.to_string())
            .caused_by(trc::location!())
    })
}
