/*
 * SPDX-FileCopyrightText: 2024 A3Mailer Project
 *
 * SPDX-License-Identifier: AGPL-3.0-only OR LicenseRef-SEL
 */

//! IMAP `LIST`-style glob matching for `findall`/`findsub`: `*`
//! matches any run of characters including `.`; `%` matches any run
//! excluding `.`; `?` matches exactly one character; `@domain`
//! restricts the match to mailboxes whose canonical name carries that
//! domain (the part before `!`), the way a client-facing
//! `mailbox@domain` pattern restricts a `LIST` to the named domain
//! rather than every domain the admin can see.
//!
//! `name` is always a canonical internal name (`[domain!]rest`);
//! `pattern` may carry a trailing `@domain` qualifier even though
//! canonical names never contain `@` themselves.

/// True iff canonical mailbox name `name` matches `pattern`.
pub fn matches(pattern: &str, name: &str) -> bool {
    let (pattern_rest, required_domain) = match pattern.split_once('@') {
        Some((rest, domain)) => (rest, Some(domain)),
        None => (pattern, None),
    };

    match required_domain {
        Some(required) => {
            let (name_domain, name_rest) =
                name.split_once('!').map(|(d, r)| (Some(d), r)).unwrap_or((None, name));
            name_domain == Some(required) && matches_bytes(pattern_rest.as_bytes(), name_rest.as_bytes())
        }
        None => matches_bytes(pattern.as_bytes(), name.as_bytes()),
    }
}

fn matches_bytes(pattern: &[u8], name: &[u8]) -> bool {
    match pattern.first() {
        None => name.is_empty(),
        Some(b'*') => {
            (0..=name.len()).any(|i| matches_bytes(&pattern[1..], &name[i..]))
        }
        Some(b'%') => (0..=name.len())
            .take_while(|&i| !name[..i].contains(&b'.'))
            .any(|i| matches_bytes(&pattern[1..], &name[i..])),
        Some(b'?') => !name.is_empty() && matches_bytes(&pattern[1..], &name[1..]),
        Some(&c) => name.first() == Some(&c) && matches_bytes(&pattern[1..], &name[1..]),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn star_crosses_hierarchy_separator() {
        assert!(matches("user.*", "user.fred.Drafts"));
    }

    #[test]
    fn percent_stops_at_hierarchy_separator() {
        assert!(matches("user.%", "user.fred"));
        assert!(!matches("user.%", "user.fred.Drafts"));
    }

    #[test]
    fn question_mark_matches_single_char() {
        assert!(matches("user.fre?", "user.fred"));
        assert!(!matches("user.fre?", "user.fredd"));
    }

    #[test]
    fn literal_segments_must_match_exactly() {
        assert!(!matches("user.fred", "user.george"));
        assert!(matches("user.fred", "user.fred"));
    }

    #[test]
    fn at_domain_restricts_match_to_named_domain() {
        assert!(matches("user.*@bloggs.com", "bloggs.com!user.fred"));
        assert!(!matches("user.*@bloggs.com", "foonly.com!user.fred"));
        assert!(!matches("user.*@bloggs.com", "user.fred"));
    }

    #[test]
    fn pattern_without_at_matches_full_canonical_name() {
        assert!(matches("bloggs.com!user.*", "bloggs.com!user.fred"));
        assert!(!matches("user.*", "bloggs.com!user.fred"));
    }
}
