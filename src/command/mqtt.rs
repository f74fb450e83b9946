//! ### Sequans MQTT client commands
//!
//! Topics are free form strings, so these commands are built as raw lines.
//! Every command addresses client 0, the only client the module exposes.
use core::fmt::Write;

use embassy_time::Duration;
use heapless::String;

use super::{Command, CommandKind, ReplyMatcher, MAX_CMD_LEN};
use crate::config::BinaryAnnouncer;
use crate::error::Error;

pub const ON_MESSAGE: &[u8] = b"+SQNSMQTTONMESSAGE:";
pub const ON_SUBSCRIBE: &[u8] = b"+SQNSMQTTONSUBSCRIBE:0,";
pub const ON_UNSUBSCRIBE: &[u8] = b"+SQNSMQTTONUNSUBSCRIBE:0,";
pub const ON_PUBLISH: &[u8] = b"+SQNSMQTTONPUBLISH:0,";
pub const ON_CONNECT: &[u8] = b"+SQNSMQTTONCONNECT:0,";
pub const ON_DISCONNECT: &[u8] = b"+SQNSMQTTONDISCONNECT:0,";
pub const RCV_MESSAGE: &[u8] = b"+SQNSMQTTRCVMESSAGE:";

/// Broker round trips are slower than local commands.
const BROKER_TIMEOUT: Duration = Duration::from_secs(30);

type Line = String<MAX_CMD_LEN>;

fn line(args: core::fmt::Arguments) -> Result<Line, Error> {
    let mut s = Line::new();
    s.write_fmt(args).map_err(|_| Error::CommandTooLong)?;
    Ok(s)
}

/// `AT+SQNSMQTTCFG`
pub fn config(
    client_id: &str,
    user_name: &str,
    password: &str,
    tls_profile: Option<u8>,
) -> Result<Command, Error> {
    let mut s = line(format_args!(
        "AT+SQNSMQTTCFG=0,\"{}\",\"{}\",\"{}\"",
        client_id, user_name, password
    ))?;
    if let Some(profile) = tls_profile {
        write!(s, ",{}", profile).map_err(|_| Error::CommandTooLong)?;
    }
    Command::new(s.as_bytes())
}

/// `AT+SQNSMQTTCONNECT`, completes on `+SQNSMQTTONCONNECT`
pub fn connect(host: &str, port: u16, keep_alive: u16) -> Result<Command, Error> {
    let s = line(format_args!(
        "AT+SQNSMQTTCONNECT=0,\"{}\",{},{}",
        host, port, keep_alive
    ))?;
    Ok(Command::new(s.as_bytes())?
        .complete_on(ON_CONNECT)
        .timeout(BROKER_TIMEOUT))
}

/// `AT+SQNSMQTTDISCONNECT`, completes on `+SQNSMQTTONDISCONNECT`
pub fn disconnect() -> Result<Command, Error> {
    Ok(Command::new(b"AT+SQNSMQTTDISCONNECT=0")?
        .complete_on(ON_DISCONNECT)
        .timeout(BROKER_TIMEOUT))
}

/// `AT+SQNSMQTTSUBSCRIBE`, completes on `+SQNSMQTTONSUBSCRIBE` for the same
/// topic
pub fn subscribe(topic: &str, qos: u8) -> Result<Command, Error> {
    let s = line(format_args!(
        "AT+SQNSMQTTSUBSCRIBE=0,\"{}\",{}",
        topic, qos
    ))?;
    Command::new(s.as_bytes())?
        .timeout(BROKER_TIMEOUT)
        .complete_on_quoted(ON_SUBSCRIBE, topic.as_bytes())
}

/// `AT+SQNSMQTTUNSUBSCRIBE`, completes on `+SQNSMQTTONUNSUBSCRIBE`
pub fn unsubscribe(topic: &str) -> Result<Command, Error> {
    let s = line(format_args!("AT+SQNSMQTTUNSUBSCRIBE=0,\"{}\"", topic))?;
    Ok(Command::new(s.as_bytes())?
        .complete_on(ON_UNSUBSCRIBE)
        .timeout(BROKER_TIMEOUT))
}

/// `AT+SQNSMQTTPUBLISH`. The payload follows the `>` prompt.
pub fn publish(topic: &str, qos: u8, payload: &[u8]) -> Result<Command, Error> {
    let s = line(format_args!(
        "AT+SQNSMQTTPUBLISH=0,\"{}\",{},{}",
        topic,
        qos,
        payload.len()
    ))?;
    Ok(Command::with_data(s.as_bytes(), payload)?
        .kind(CommandKind::DataTxWait)
        .complete_on(ON_PUBLISH)
        .timeout(BROKER_TIMEOUT))
}

/// `AT+SQNSMQTTRCVMESSAGE`. The message of `len` bytes follows the
/// `+SQNSMQTTRCVMESSAGE` line raw.
pub fn receive(topic: &str, message_id: Option<u16>, len: usize) -> Result<Command, Error> {
    let mut s = line(format_args!("AT+SQNSMQTTRCVMESSAGE=0,\"{}\"", topic))?;
    if let Some(mid) = message_id {
        write!(s, ",{}", mid).map_err(|_| Error::CommandTooLong)?;
    }
    Ok(Command::new(s.as_bytes())?
        .reply(ReplyMatcher::Prefix(RCV_MESSAGE))
        .with_binary(BinaryAnnouncer::fixed(RCV_MESSAGE, len)))
}
