/*
 * SPDX-FileCopyrightText: 2024 A3Mailer Project
 *
 * SPDX-License-Identifier: AGPL-3.0-only OR LicenseRef-SEL
 */

//! Thin context-attaching helper over [`trc::Error`], so call sites
//! can turn a bare `std::io::Error` (or anything `Display`) into a
//! located, contextualised `trc::Error` without repeating the
//! `.map_err(...).caused_by(trc::location!())` dance everywhere.

/// Adds a lazily-built reason string to any `Result` whose error type
/// can be turned into an I/O-flavoured `trc::Error`.
pub trait ErrorContext<T> {
    fn with_context<F: FnOnce() -> String>(self, context: F) -> trc::Result<T>;
}

impl<T, E> ErrorContext<T> for Result<T, E>
where
    E: std::fmt::Display,
{
    fn with_context<F: FnOnce() -> String>(self, context: F) -> trc::Result<T> {
        self.map_err(|e| {
            trc::Error::new(trc::EventType::Store(trc::StoreEvent::IoError))
                .ctx(trc::Key::Reason, format!("{}: {e}", context()))
        })
    }
}
