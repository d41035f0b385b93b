/*
 * SPDX-FileCopyrightText: 2024 A3Mailer Project
 *
 * SPDX-License-Identifier: AGPL-3.0-only OR LicenseRef-SEL
 */

//! Mailbox name utilities: canonical-name parsing, policy checks,
//! deleted-name handling, and the per-name monotonic modseq counter.
//!
//! Every operation here is pure with respect to the registry; the
//! only side-effecting piece is [`next_modseq`], which serialises
//! updates to a small counter file with a blocking `flock`.

pub mod modseq;
pub mod parts;
pub mod policy;
pub mod utf7;

pub use modseq::next_modseq;
pub use parts::{is_deleted, same_userid, to_internal, to_parts, to_userid, user_inbox, NameParts};
pub use policy::policycheck;
