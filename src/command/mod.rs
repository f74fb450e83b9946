//! AT commands and reply handling for Sequans based cellular modules
//!
//! Raw commands are built with [`Command`]. The handful of core commands the
//! engine issues itself are typed with `atat` derives under [`control`].

pub mod control;
pub mod error;
pub mod mqtt;

use atat::atat_derive::{AtatCmd, AtatResp};
use embassy_time::Duration;
use heapless::Vec;

use crate::config::BinaryAnnouncer;
use crate::error::{Error, ProtocolError};

/// Longest command line plus data payload a single transaction can carry.
pub const MAX_CMD_LEN: usize = 1024;

/// Capacity of the reply payload collected by a single transaction.
pub const MAX_REPLY_LEN: usize = 512;

/// Applied when a command does not carry its own timeout.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

/// Longest quoted argument a completion line can be matched on.
pub const MAX_COMPLETION_ARG: usize = 64;

#[derive(Clone, AtatResp)]
pub struct NoResponse;

#[derive(Clone, AtatCmd)]
#[at_cmd("", NoResponse)]
pub struct AT;

/// How a transaction interacts with the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum CommandKind {
    /// Fire and forget. Completes as soon as the bytes are written.
    Tx,
    /// Write, then wait for a terminal status line.
    TxWait,
    /// Write nothing, wait for the completion pattern.
    Wait,
    /// Write the command line, write the data payload once the modem shows a
    /// prompt, then wait for a terminal status line.
    DataTxWait,
}

/// Which non-status lines are collected into the reply of a transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplyMatcher {
    /// Only the terminal status line is of interest.
    StatusOnly,
    /// Lines starting with the given prefix.
    Prefix(&'static [u8]),
    /// Any line no ring handler claims.
    Unclaimed,
}

/// Routing and completion rules of a command. Kept with the transaction slot
/// while the command bytes travel to the writer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommandMeta {
    pub kind: CommandKind,
    pub reply: ReplyMatcher,
    pub complete_on: Option<Completion>,
    pub binary: Option<BinaryAnnouncer>,
    pub timeout: Duration,
}

impl CommandMeta {
    /// Whether `line` belongs to the reply of this command.
    pub(crate) fn claims(&self, line: &[u8], claimed_by_ring: bool) -> bool {
        if self.completes_on(line) {
            return true;
        }
        match self.reply {
            ReplyMatcher::StatusOnly => false,
            ReplyMatcher::Prefix(prefix) => line.starts_with(prefix),
            ReplyMatcher::Unclaimed => !claimed_by_ring,
        }
    }

    pub(crate) fn completes_on(&self, line: &[u8]) -> bool {
        self.complete_on
            .map(|completion| completion.matches(line))
            .unwrap_or(false)
    }
}

/// Line that completes a transaction: a fixed prefix, optionally followed
/// by a quoted argument such as an MQTT topic.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Completion {
    prefix: &'static [u8],
    arg: [u8; MAX_COMPLETION_ARG],
    arg_len: usize,
    quoted: bool,
}

impl Completion {
    pub const fn prefix(prefix: &'static [u8]) -> Self {
        Self {
            prefix,
            arg: [0; MAX_COMPLETION_ARG],
            arg_len: 0,
            quoted: false,
        }
    }

    /// Matches `<prefix>"<arg>"` at the start of a line.
    pub fn quoted(prefix: &'static [u8], arg: &[u8]) -> Result<Self, Error> {
        if arg.len() > MAX_COMPLETION_ARG {
            return Err(Error::CommandTooLong);
        }
        let mut completion = Self::prefix(prefix);
        completion.arg[..arg.len()].copy_from_slice(arg);
        completion.arg_len = arg.len();
        completion.quoted = true;
        Ok(completion)
    }

    pub fn matches(&self, line: &[u8]) -> bool {
        let Some(rest) = line.strip_prefix(self.prefix) else {
            return false;
        };
        if !self.quoted {
            return true;
        }
        rest.strip_prefix(b"\"")
            .and_then(|rest| rest.strip_prefix(&self.arg[..self.arg_len]))
            .map(|rest| rest.starts_with(b"\""))
            .unwrap_or(false)
    }
}

/// A single AT command ready to be queued.
#[derive(Clone)]
pub struct Command {
    // Command line followed by the data payload of a `DataTxWait`.
    buf: Vec<u8, MAX_CMD_LEN>,
    at_len: usize,
    meta: CommandMeta,
}

impl Command {
    /// A `TxWait` command for the given line, without line terminator.
    pub fn new(at_cmd: &[u8]) -> Result<Self, Error> {
        let buf = Vec::from_slice(at_cmd).map_err(|_| Error::CommandTooLong)?;
        Ok(Self {
            at_len: buf.len(),
            buf,
            meta: CommandMeta {
                kind: CommandKind::TxWait,
                reply: ReplyMatcher::StatusOnly,
                complete_on: None,
                binary: None,
                timeout: DEFAULT_TIMEOUT,
            },
        })
    }

    /// A `DataTxWait` command. `data` is written once the modem prompts for it.
    pub fn with_data(at_cmd: &[u8], data: &[u8]) -> Result<Self, Error> {
        let mut cmd = Self::new(at_cmd)?.kind(CommandKind::DataTxWait);
        cmd.buf
            .extend_from_slice(data)
            .map_err(|_| Error::CommandTooLong)?;
        Ok(cmd)
    }

    /// A `Wait` transaction that completes when a line starting with
    /// `pattern` arrives.
    pub fn wait_for(pattern: &'static [u8]) -> Self {
        Self {
            buf: Vec::new(),
            at_len: 0,
            meta: CommandMeta {
                kind: CommandKind::Wait,
                reply: ReplyMatcher::StatusOnly,
                complete_on: Some(Completion::prefix(pattern)),
                binary: None,
                timeout: DEFAULT_TIMEOUT,
            },
        }
    }

    /// Serializes a typed command. Every unclaimed line becomes part of the
    /// reply so the response type can be parsed from it.
    pub fn from_atat<C: atat::AtatCmd>(cmd: &C) -> Result<Self, Error> {
        if C::MAX_LEN > MAX_CMD_LEN {
            return Err(Error::CommandTooLong);
        }
        let mut buf: Vec<u8, MAX_CMD_LEN> = Vec::new();
        buf.resize(C::MAX_LEN, 0)
            .map_err(|_| Error::CommandTooLong)?;
        let len = cmd.write(&mut buf);
        buf.truncate(len);
        while matches!(buf.last(), Some(b'\r' | b'\n')) {
            buf.pop();
        }

        Ok(Self {
            at_len: buf.len(),
            buf,
            meta: CommandMeta {
                kind: CommandKind::TxWait,
                reply: ReplyMatcher::Unclaimed,
                complete_on: None,
                binary: None,
                timeout: Duration::from_millis(C::MAX_TIMEOUT_MS as u64),
            },
        })
    }

    pub fn kind(mut self, kind: CommandKind) -> Self {
        self.meta.kind = kind;
        self
    }

    pub fn reply(mut self, matcher: ReplyMatcher) -> Self {
        self.meta.reply = matcher;
        self
    }

    /// Complete on a line starting with `pattern` instead of on `OK`.
    pub fn complete_on(mut self, pattern: &'static [u8]) -> Self {
        self.meta.complete_on = Some(Completion::prefix(pattern));
        self
    }

    /// Completes on `<prefix>"<arg>"` only, so that overlapping commands of
    /// the same kind do not complete on each other's confirmation.
    pub fn complete_on_quoted(mut self, prefix: &'static [u8], arg: &[u8]) -> Result<Self, Error> {
        self.meta.complete_on = Some(Completion::quoted(prefix, arg)?);
        Ok(self)
    }

    /// Announce a binary segment for the duration of this transaction only.
    pub fn with_binary(mut self, announcer: BinaryAnnouncer) -> Self {
        self.meta.binary = Some(announcer);
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.meta.timeout = timeout;
        self
    }

    pub fn at_cmd(&self) -> &[u8] {
        &self.buf[..self.at_len]
    }

    pub fn data(&self) -> &[u8] {
        &self.buf[self.at_len..]
    }

    pub fn meta(&self) -> &CommandMeta {
        &self.meta
    }

    /// Line terminator written after the command line. The modem answers a
    /// data command with its prompt only when the line ends in a bare LF.
    pub(crate) fn terminator(&self) -> &'static [u8] {
        match self.meta.kind {
            CommandKind::DataTxWait => b"\n",
            _ => b"\r\n",
        }
    }
}

/// Payload collected by a completed transaction.
///
/// Lines are joined with `\r\n`. Binary segments are appended verbatim.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Reply {
    payload: Vec<u8, MAX_REPLY_LEN>,
}

impl Reply {
    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    pub fn is_empty(&self) -> bool {
        self.payload.is_empty()
    }

    /// The collected lines. Binary segments with embedded line breaks are
    /// split as well, use [`Reply::payload`] for those.
    pub fn lines(&self) -> impl Iterator<Item = &[u8]> {
        self.payload
            .split(|b| *b == b'\n')
            .map(|l| l.strip_suffix(b"\r").unwrap_or(l))
            .filter(|l| !l.is_empty())
    }

    pub(crate) fn push_fragment(&mut self, fragment: &[u8]) -> Result<(), Error> {
        if !self.payload.is_empty() {
            self.payload
                .extend_from_slice(b"\r\n")
                .map_err(|_| Error::ParseOverflow)?;
        }
        self.payload
            .extend_from_slice(fragment)
            .map_err(|_| Error::ParseOverflow)
    }

    pub(crate) fn clear(&mut self) {
        self.payload.clear();
    }
}

/// Terminal status of a transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Status {
    Ok,
    Error(ProtocolError),
}

pub(crate) fn status(line: &[u8]) -> Option<Status> {
    if line == b"OK" {
        return Some(Status::Ok);
    }
    if line == b"ERROR" {
        return Some(Status::Error(ProtocolError::Generic));
    }
    if line.starts_with(b"+CME ERROR") {
        let err = core::str::from_utf8(line)
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(ProtocolError::Cme(error::CmeError::Unknown(0)));
        return Some(Status::Error(err));
    }
    None
}
