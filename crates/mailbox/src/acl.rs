/*
 * SPDX-FileCopyrightText: 2024 A3Mailer Project
 *
 * SPDX-License-Identifier: AGPL-3.0-only OR LicenseRef-SEL
 */

//! ACL string handling: whitespace-separated `identifier rights`
//! pairs, where `rights` is a string of single-letter codes.
//!
//! Letters used here: `l` LOOKUP, `r` READ, `c` CREATE, `d`
//! DELETEMBOX, `w` WRITE, `i` INSERT, `a` ADMIN.

/// True iff `identifier` (or the `anyone` pseudo-identifier) has
/// `right` in `acl`.
pub fn has_right(acl: &str, identifier: &str, right: char) -> bool {
    for pair in acl.split_whitespace().collect::<Vec<_>>().chunks(2) {
        if let [id, rights] = pair {
            if (*id == identifier || *id == "anyone") && rights.contains(right) {
                return true;
            }
        }
    }
    false
}

/// Applies a `setacl` rights string (`+rights`, `-rights`, or a bare
/// `rights` replacing the identifier's entry outright) to `acl`,
/// returning the updated ACL string.
pub fn apply(acl: &str, identifier: &str, rights: &str) -> String {
    let mut pairs: Vec<(String, String)> = acl
        .split_whitespace()
        .collect::<Vec<_>>()
        .chunks(2)
        .filter_map(|pair| match pair {
            [id, r] => Some((id.to_string(), r.to_string())),
            _ => None,
        })
        .collect();

    let existing = pairs.iter().position(|(id, _)| id == identifier);

    let new_rights = if let Some(stripped) = rights.strip_prefix('+') {
        let mut current: String = existing.map(|i| pairs[i].1.clone()).unwrap_or_default();
        for c in stripped.chars() {
            if !current.contains(c) {
                current.push(c);
            }
        }
        current
    } else if let Some(stripped) = rights.strip_prefix('-') {
        let current: String = existing.map(|i| pairs[i].1.clone()).unwrap_or_default();
        current.chars().filter(|c| !stripped.contains(*c)).collect()
    } else {
        rights.to_string()
    };

    match existing {
        Some(i) if new_rights.is_empty() => {
            pairs.remove(i);
        }
        Some(i) => pairs[i].1 = new_rights,
        None if !new_rights.is_empty() => pairs.push((identifier.to_string(), new_rights)),
        None => {}
    }

    pairs
        .into_iter()
        .map(|(id, rights)| format!("{id} {rights}"))
        .collect::<Vec<_>>()
        .join(" ")
}

/// Rights a personal mailbox's owner keeps regardless of what a
/// `setacl` call requests: lookup, admin, create.
pub const OWNER_INVARIANT_RIGHTS: &str = "lac";

/// Like [`apply`], but re-asserts `owner`'s invariant rights
/// afterwards, so a `setacl` call naming the owner (even one issued by
/// an admin) can never strip them.
pub fn apply_preserving_owner(acl: &str, owner: &str, identifier: &str, rights: &str) -> String {
    let updated = apply(acl, identifier, rights);
    apply(&updated, owner, &format!("+{OWNER_INVARIANT_RIGHTS}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn has_right_checks_identifier_and_anyone() {
        assert!(has_right("fred lrswipkxtecda anyone l", "fred", 'r'));
        assert!(has_right("fred lrswipkxtecda anyone l", "george", 'l'));
        assert!(!has_right("fred lrswipkxtecda anyone l", "george", 'r'));
    }

    #[test]
    fn apply_replace_sets_identifier_rights() {
        let updated = apply("fred lrswipkxtecda", "jane", "lr");
        assert_eq!(updated, "fred lrswipkxtecda jane lr");
    }

    #[test]
    fn apply_add_merges_without_duplicating() {
        let updated = apply("fred lrswipkxtecda jane l", "jane", "+r");
        assert_eq!(updated, "fred lrswipkxtecda jane lr");
    }

    #[test]
    fn apply_remove_strips_rights_and_drops_empty_entry() {
        let updated = apply("fred lrswipkxtecda jane lr", "jane", "-lr");
        assert_eq!(updated, "fred lrswipkxtecda");
    }

    #[test]
    fn repeated_setacl_is_idempotent() {
        let once = apply("fred lrswipkxtecda", "jane", "lr");
        let twice = apply(&once, "jane", "lr");
        assert_eq!(once, twice);
    }

    #[test]
    fn apply_preserving_owner_restores_stripped_owner_rights() {
        let updated = apply_preserving_owner("fred lrswipkxtecda", "fred", "fred", "-lrswipkxtecda");
        assert!(has_right(&updated, "fred", 'l'));
        assert!(has_right(&updated, "fred", 'a'));
        assert!(has_right(&updated, "fred", 'c'));
    }

    #[test]
    fn apply_preserving_owner_leaves_other_identifiers_alone() {
        let updated = apply_preserving_owner("fred lrswipkxtecda", "fred", "jane", "+lr");
        assert_eq!(updated, "fred lrswipkxtecda jane lr");
    }
}
