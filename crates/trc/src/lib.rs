/*
 * SPDX-FileCopyrightText: 2024 A3Mailer Project
 *
 * SPDX-License-Identifier: AGPL-3.0-only OR LicenseRef-SEL
 */

//! Structured event and error taxonomy shared across the mailbox store.
//!
//! Every fallible operation in the workspace returns a [`Result`] whose
//! error carries an [`EventType`], a source location, and a bag of
//! context key/value pairs. The same [`Event`] can be handed to
//! `tracing` for structured logging (see [`Event::emit`]) or converted
//! into an exit code for the CLI surface.

use std::fmt;

pub mod location;
pub mod sysexits;

pub use location::Location;

/// Result alias used throughout the workspace.
pub type Result<T> = std::result::Result<T, Error>;

/// Top-level classification of an event, grouped by the subsystem that
/// raised it. Mirrors the shape of the mailbox store's components
/// rather than any single flat error code, so that the same type can
/// describe both log lines ("registry created mailbox") and errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub enum EventType {
    Store(StoreEvent),
    Registry(RegistryEvent),
    Mailbox(MailboxEvent),
    Lock(LockEvent),
    Notify(NotifyEvent),
    Cli(CliEvent),
    Server(ServerEvent),
    Config(ConfigEvent),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub enum StoreEvent {
    Opened,
    NotFound,
    Exists,
    Conflict,
    IoError,
    Corruption,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub enum RegistryEvent {
    Created,
    Deleted,
    Renamed,
    AclChanged,
    QuotaChanged,
    LookupDenied,
    Reserved,
    NotFound,
    Exists,
    PermissionDenied,
    BadName,
    BadIdentifier,
    UnknownPartition,
    NotSupported,
    QuotaExceeded,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub enum MailboxEvent {
    Opened,
    Committed,
    Aborted,
    Appended,
    Expunged,
    HeaderCorrupt,
    ActionQueued,
    ActionDrained,
    NotFound,
    Again,
    ConversationsNotOpen,
    Internal,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub enum LockEvent {
    Acquired,
    Released,
    Contended,
    ModeMismatch,
    Locked,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub enum NotifyEvent {
    Sent,
    SendFailed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub enum CliEvent {
    Started,
    Completed,
    Failed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub enum ServerEvent {
    Startup,
    Shutdown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub enum ConfigEvent {
    ParseError,
    Missing,
}

/// A context key attached to an [`Error`] or emitted [`Event`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub enum Key {
    MailboxName,
    PartitionName,
    Uid,
    Uidvalidity,
    Modseq,
    Identifier,
    Path,
    Reason,
    Elapsed,
    RetryCount,
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Key::MailboxName => "mailbox_name",
            Key::PartitionName => "partition",
            Key::Uid => "uid",
            Key::Uidvalidity => "uidvalidity",
            Key::Modseq => "modseq",
            Key::Identifier => "identifier",
            Key::Path => "path",
            Key::Reason => "reason",
            Key::Elapsed => "elapsed",
            Key::RetryCount => "retry_count",
        };
        f.write_str(s)
    }
}

/// A context value attached via [`Error::ctx`].
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub enum Value {
    String(String),
    UInt(u64),
    Int(i64),
    Bool(bool),
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::String(v.to_string())
    }
}
impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::String(v)
    }
}
impl From<u32> for Value {
    fn from(v: u32) -> Self {
        Value::UInt(v as u64)
    }
}
impl From<u64> for Value {
    fn from(v: u64) -> Self {
        Value::UInt(v)
    }
}
impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int(v)
    }
}
impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::String(s) => f.write_str(s),
            Value::UInt(v) => write!(f, "{v}"),
            Value::Int(v) => write!(f, "{v}"),
            Value::Bool(v) => write!(f, "{v}"),
        }
    }
}

/// A loggable event: a kind plus a bag of context pairs.
#[derive(Debug, Clone)]
pub struct Event<T> {
    pub inner: T,
    pub keys: Vec<(Key, Value)>,
    pub location: Option<&'static Location>,
}

impl<T> Event<T> {
    pub fn new(inner: T) -> Self {
        Self {
            inner,
            keys: Vec::new(),
            location: None,
        }
    }

    pub fn ctx(mut self, key: Key, value: impl Into<Value>) -> Self {
        self.keys.push((key, value.into()));
        self
    }

    pub fn at(mut self, location: &'static Location) -> Self {
        self.location = Some(location);
        self
    }
}

impl Event<EventType> {
    /// Emit this event through `tracing` at a severity appropriate to
    /// its kind. Registry/mailbox "happened" events log at `info` or
    /// `debug`; anything constructed as an [`Error`] logs at `warn`.
    pub fn emit(&self) {
        let fields: Vec<String> = self
            .keys
            .iter()
            .map(|(k, v)| format!("{k}={v}"))
            .collect();
        match &self.inner {
            EventType::Registry(RegistryEvent::Created)
            | EventType::Registry(RegistryEvent::Deleted)
            | EventType::Registry(RegistryEvent::Renamed)
            | EventType::Mailbox(MailboxEvent::Committed)
            | EventType::Mailbox(MailboxEvent::Appended) => {
                tracing::info!(event = ?self.inner, fields = ?fields, "{:?}", self.inner)
            }
            _ => tracing::debug!(event = ?self.inner, fields = ?fields, "{:?}", self.inner),
        }
    }
}

/// The workspace-wide error type. Wraps an [`EventType`] with context
/// and an optional source location, the way a single `trc::Error`
/// flows out of the registry, storage, and CLI layers alike.
#[derive(Debug, Clone)]
pub struct Error {
    pub event: EventType,
    pub keys: Vec<(Key, Value)>,
    pub location: Option<&'static Location>,
}

impl Error {
    pub fn new(event: EventType) -> Self {
        Self {
            event,
            keys: Vec::new(),
            location: None,
        }
    }

    pub fn ctx(mut self, key: Key, value: impl Into<Value>) -> Self {
        self.keys.push((key, value.into()));
        self
    }

    pub fn caused_by(mut self, location: &'static Location) -> Self {
        self.location = Some(location);
        self
    }

    pub fn to_event(&self) -> Event<EventType> {
        Event {
            inner: self.event,
            keys: self.keys.clone(),
            location: self.location,
        }
    }

    /// Log this error through `tracing` and return it unchanged, so it
    /// can sit inline in a `?`-propagation chain: `op().map_err(|e|
    /// e.log())?`.
    pub fn log(self) -> Self {
        self.to_event().emit();
        self
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self.event)?;
        for (k, v) in &self.keys {
            write!(f, " {k}={v}")?;
        }
        if let Some(loc) = self.location {
            write!(f, " at {loc}")?;
        }
        Ok(())
    }
}

impl std::error::Error for Error {}

impl From<EventType> for Error {
    fn from(event: EventType) -> Self {
        Error::new(event)
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::new(EventType::Store(StoreEvent::IoError)).ctx(Key::Reason, err.to_string())
    }
}

/// Adds `.caused_by(location!())` to any `Result` whose error converts
/// into [`Error`], capturing the call site the way the teacher's
/// `trc::AddContext` does.
pub trait AddContext<T> {
    fn caused_by(self, location: &'static Location) -> Result<T>;
}

impl<T, E> AddContext<T> for std::result::Result<T, E>
where
    E: Into<Error>,
{
    fn caused_by(self, location: &'static Location) -> Result<T> {
        self.map_err(|e| e.into().caused_by(location))
    }
}

/// Captures the current file/line, mirroring `trc::location!()`.
#[macro_export]
macro_rules! location {
    () => {{
        static LOCATION: $crate::Location = $crate::Location {
            file: file!(),
            line: line!(),
        };
        &LOCATION
    }};
}
