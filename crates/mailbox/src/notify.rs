/*
 * SPDX-FileCopyrightText: 2024 A3Mailer Project
 *
 * SPDX-License-Identifier: AGPL-3.0-only OR LicenseRef-SEL
 */

//! Delivery notifier (§6): a post-commit hook that pushes a compact,
//! length-prefixed, JSON-encoded mailbox-update message to a UNIX
//! datagram socket for the IDLE fan-out daemon to re-fan to clients.
//! Per §7, a failed send is logged and swallowed — the mutation that
//! triggered it has already committed.

use std::{
    os::unix::net::UnixDatagram,
    path::{Path, PathBuf},
};

use serde::Serialize;

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct MailboxUpdate {
    pub mailboxname: String,
    pub modseq: u64,
    pub uidnext: u32,
    pub uidvalidity: u32,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct NotifyMessage {
    pub user: String,
    pub service: String,
    pub session: String,
    pub mailboxes: Vec<MailboxUpdate>,
}

impl NotifyMessage {
    /// Encodes this message as a 4-byte big-endian length prefix
    /// followed by its JSON body.
    pub fn encode(&self) -> Vec<u8> {
        let body = serde_json::to_vec(self).expect("NotifyMessage always serialises");
        let mut framed = Vec::with_capacity(4 + body.len());
        framed.extend_from_slice(&(body.len() as u32).to_be_bytes());
        framed.extend_from_slice(&body);
        framed
    }

    pub fn decode(framed: &[u8]) -> trc::Result<Self> {
        if framed.len() < 4 {
            return Err(malformed("frame shorter than length prefix"));
        }
        let len = u32::from_be_bytes(framed[0..4].try_into().unwrap()) as usize;
        let body = framed.get(4..4 + len).ok_or_else(|| malformed("length prefix exceeds frame"))?;
        serde_json::from_slice(body).map_err(|e| malformed(&e.to_string()))
    }
}

fn malformed(reason: &str) -> trc::Error {
    trc::Error::new(trc::EventType::Notify(trc::NotifyEvent::SendFailed))
        .ctx(trc::Key::Reason, reason.to_string())
        .caused_by(trc::location!())
}

/// Pushes post-commit mailbox updates to the configured UNIX datagram
/// socket. A `None` socket path makes every [`Notifier::notify`] call
/// a no-op, for configurations and tests that run without the
/// fan-out daemon.
pub struct Notifier {
    socket_path: Option<PathBuf>,
}

impl Notifier {
    pub fn new(socket_path: Option<PathBuf>) -> Self {
        Notifier { socket_path }
    }

    /// Sends `message`. Failures are logged via `tracing` and
    /// swallowed: the caller's mutation has already committed.
    pub fn notify(&self, message: &NotifyMessage) {
        let Some(path) = &self.socket_path else {
            return;
        };
        if let Err(err) = self.try_send(path, message) {
            err.log();
        }
    }

    fn try_send(&self, path: &Path, message: &NotifyMessage) -> trc::Result<()> {
        let socket = UnixDatagram::unbound()?;
        socket.send_to(&message.encode(), path)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> NotifyMessage {
        NotifyMessage {
            user: "smurf".to_string(),
            service: "lmtp".to_string(),
            session: "sess-1".to_string(),
            mailboxes: vec![MailboxUpdate {
                mailboxname: "user.smurf".to_string(),
                modseq: 2,
                uidnext: 2,
                uidvalidity: 1,
            }],
        }
    }

    #[test]
    fn wire_format_round_trips() {
        let message = sample();
        let decoded = NotifyMessage::decode(&message.encode()).unwrap();
        assert_eq!(decoded, message);
    }

    #[test]
    fn notify_without_socket_is_a_silent_noop() {
        let notifier = Notifier::new(None);
        notifier.notify(&sample());
    }

    #[test]
    fn notify_delivers_to_configured_socket() {
        let dir = tempfile::tempdir().unwrap();
        let socket_path = dir.path().join("notify.sock");
        let receiver = UnixDatagram::bind(&socket_path).unwrap();
        receiver.set_read_timeout(Some(std::time::Duration::from_secs(1))).unwrap();

        let notifier = Notifier::new(Some(socket_path));
        notifier.notify(&sample());

        let mut buf = [0u8; 4096];
        let n = receiver.recv(&mut buf).unwrap();
        let decoded = NotifyMessage::decode(&buf[..n]).unwrap();
        assert_eq!(decoded, sample());
    }

    #[test]
    fn notify_to_missing_socket_does_not_panic() {
        let notifier = Notifier::new(Some(PathBuf::from("/nonexistent/dir/notify.sock")));
        notifier.notify(&sample());
    }
}
