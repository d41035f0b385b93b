/*
 * SPDX-FileCopyrightText: 2024 A3Mailer Project
 *
 * SPDX-License-Identifier: AGPL-3.0-only OR LicenseRef-SEL
 */

//! Canonical mailbox name decomposition.
//!
//! A canonical name is `[domain "!"] segment ("." segment)*`. The
//! `user.<local>` prefix marks a personal mailbox; everything else is
//! shared. A deleted mailbox is `[domain!]<prefix>.<orig>.<hex8>`.

/// The decomposed parts of a canonical mailbox name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NameParts {
    pub domain: Option<String>,
    pub userid: Option<String>,
    /// The mailbox path below the user root (`None` for the user's
    /// own inbox), or the full shared-mailbox path when `userid` is
    /// `None`.
    pub boxname: Option<String>,
    pub is_deleted: bool,
    /// Deletion timestamp, parsed from the trailing hex8 component.
    pub deleted_at: Option<u32>,
}

fn split_domain(internal: &str) -> (Option<&str>, &str) {
    match internal.split_once('!') {
        Some((domain, rest)) => (Some(domain), rest),
        None => (None, internal),
    }
}

/// Splits a canonical internal name into `(domain?, userid?, box?)`,
/// recognising the deleted-name pattern when `deleted_prefix` matches
/// the name's leading segment.
pub fn to_parts(internal: &str, deleted_prefix: &str) -> NameParts {
    let (domain, rest) = split_domain(internal);
    let domain = domain.map(str::to_string);

    let segments: Vec<&str> = rest.split('.').collect();
    if segments.first() == Some(&deleted_prefix) && segments.len() >= 3 {
        let hex = segments[segments.len() - 1];
        let deleted_at = u32::from_str_radix(hex, 16).ok();
        if deleted_at.is_some() && hex.len() == 8 {
            let orig = segments[1..segments.len() - 1].join(".");
            let mut parts = to_parts(&orig, deleted_prefix);
            parts.domain = domain;
            parts.is_deleted = true;
            parts.deleted_at = deleted_at;
            return parts;
        }
    }

    if segments.first() == Some(&"user") && segments.len() >= 2 {
        let userid = segments[1].to_string();
        let boxname = if segments.len() > 2 {
            Some(segments[2..].join("."))
        } else {
            None
        };
        return NameParts {
            domain,
            userid: Some(userid),
            boxname,
            is_deleted: false,
            deleted_at: None,
        };
    }

    NameParts {
        domain,
        userid: None,
        boxname: Some(rest.to_string()),
        is_deleted: false,
        deleted_at: None,
    }
}

/// Rebuilds a canonical internal name from its parts, the inverse of
/// [`to_parts`] for well-formed inputs.
pub fn to_internal(parts: &NameParts) -> String {
    let mut rest = match (&parts.userid, &parts.boxname) {
        (Some(userid), Some(boxname)) => format!("user.{userid}.{boxname}"),
        (Some(userid), None) => format!("user.{userid}"),
        (None, Some(boxname)) => boxname.clone(),
        (None, None) => String::new(),
    };
    if let Some(at) = parts.deleted_at {
        rest = format!("DELETED.{rest}.{at:08x}");
    }
    match &parts.domain {
        Some(domain) => format!("{domain}!{rest}"),
        None => rest,
    }
}

/// Concatenates `userid[@domain]`, or `None` for a shared mailbox.
pub fn to_userid(internal: &str, deleted_prefix: &str) -> Option<String> {
    let parts = to_parts(internal, deleted_prefix);
    parts.userid.map(|userid| match parts.domain {
        Some(domain) => format!("{userid}@{domain}"),
        None => userid,
    })
}

/// True iff both names resolve to the same `(domain, userid)` pair.
pub fn same_userid(a: &str, b: &str, deleted_prefix: &str) -> bool {
    let pa = to_parts(a, deleted_prefix);
    let pb = to_parts(b, deleted_prefix);
    pa.userid.is_some() && pa.userid == pb.userid && pa.domain == pb.domain
}

/// True iff `internal` matches the deleted-name pattern; when it
/// does, also returns the parsed deletion timestamp.
pub fn is_deleted(internal: &str, deleted_prefix: &str) -> (bool, Option<u32>) {
    let parts = to_parts(internal, deleted_prefix);
    (parts.is_deleted, parts.deleted_at)
}

/// Builds `[dom!]user.<local>` for a `local[@domain]` identifier.
pub fn user_inbox(userid: Option<&str>) -> Option<String> {
    let userid = userid?;
    match userid.split_once('@') {
        Some((local, domain)) => Some(format!("{domain}!user.{local}")),
        None => Some(format!("user.{userid}")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PREFIX: &str = "DELETED";

    #[test]
    fn name_to_parts_personal() {
        let p = to_parts("user.fred.Drafts", PREFIX);
        assert_eq!(p.domain, None);
        assert_eq!(p.userid.as_deref(), Some("fred"));
        assert_eq!(p.boxname.as_deref(), Some("Drafts"));
    }

    #[test]
    fn name_to_parts_personal_with_domain() {
        let p = to_parts("bloggs.com!user.jane.Sent", PREFIX);
        assert_eq!(p.domain.as_deref(), Some("bloggs.com"));
        assert_eq!(p.userid.as_deref(), Some("jane"));
        assert_eq!(p.boxname.as_deref(), Some("Sent"));
    }

    #[test]
    fn name_to_parts_shared() {
        let p = to_parts("shared.Gossip", PREFIX);
        assert_eq!(p.domain, None);
        assert_eq!(p.userid, None);
        assert_eq!(p.boxname.as_deref(), Some("shared.Gossip"));
    }

    #[test]
    fn name_to_parts_shared_with_domain() {
        let p = to_parts("foonly.com!shared.Tattle", PREFIX);
        assert_eq!(p.domain.as_deref(), Some("foonly.com"));
        assert_eq!(p.userid, None);
        assert_eq!(p.boxname.as_deref(), Some("shared.Tattle"));
    }

    #[test]
    fn same_userid_matches_siblings() {
        assert!(same_userid("user.fred.Drafts", "user.fred.Sent", PREFIX));
        assert!(!same_userid("user.jane.Sent", "user.fred.Sent", PREFIX));
        assert!(same_userid(
            "bloggs.com!user.fred.Drafts",
            "bloggs.com!user.fred.Sent",
            PREFIX
        ));
        assert!(!same_userid("user.jane.Sent", "bloggs.com!user.jane.Sent", PREFIX));
    }

    #[test]
    fn user_inbox_construction() {
        assert_eq!(user_inbox(Some("sam")).as_deref(), Some("user.sam"));
        assert_eq!(
            user_inbox(Some("betty@boop.com")).as_deref(),
            Some("boop.com!user.betty")
        );
        assert_eq!(user_inbox(None), None);
    }

    #[test]
    fn round_trips_for_well_formed_names() {
        for name in ["user.fred.Drafts", "bloggs.com!user.jane.Sent", "shared.Gossip"] {
            let parts = to_parts(name, PREFIX);
            assert_eq!(to_internal(&parts), name);
        }
    }

    #[test]
    fn deleted_name_round_trips_and_parses_timestamp() {
        let p = to_parts("DELETED.user.fred.Drafts.deadbeef", PREFIX);
        assert!(p.is_deleted);
        assert_eq!(p.deleted_at, Some(0xdeadbeef));
        assert_eq!(p.userid.as_deref(), Some("fred"));
        assert_eq!(p.boxname.as_deref(), Some("Drafts"));
        assert_eq!(to_internal(&p), "DELETED.user.fred.Drafts.deadbeef");
    }
}
