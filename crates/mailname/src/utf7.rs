/*
 * SPDX-FileCopyrightText: 2024 A3Mailer Project
 *
 * SPDX-License-Identifier: AGPL-3.0-only OR LicenseRef-SEL
 */

//! Modified UTF-7 encode/decode for mailbox name segments, per
//! RFC 3501 §5.1.3.

/// Decodes a wire-form mailbox name segment into its Unicode form.
pub fn decode(wire: &str) -> trc::Result<String> {
    Ok(utf7_imap::decode_utf7_imap(wire.to_string()))
}

/// Encodes a Unicode mailbox name segment into its wire form.
pub fn encode(unicode: &str) -> String {
    utf7_imap::encode_utf7_imap(unicode.to_string())
}

/// Validates that `wire` is well-formed modified UTF-7. A dangling
/// shift sequence (an unterminated `&...`) is the only malformed case
/// the underlying decoder cannot recover from silently.
pub fn validate(wire: &str) -> trc::Result<()> {
    if let Some(shift_start) = wire.rfind('&') {
        if !wire[shift_start..].contains('-') {
            return Err(trc::Error::new(trc::EventType::Registry(trc::RegistryEvent::BadName))
                .ctx(trc::Key::Reason, "unterminated modified UTF-7 shift sequence".to_string())
                .caused_by(trc::location!()));
        }
    }
    decode(wire)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ascii_round_trips_unchanged() {
        assert_eq!(decode("Drafts").unwrap(), "Drafts");
        assert_eq!(encode("Drafts"), "Drafts");
    }

    #[test]
    fn validate_accepts_plain_ascii() {
        assert!(validate("Drafts").is_ok());
    }
}
