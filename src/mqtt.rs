//! MQTT client built on the transaction engine.
//!
//! Incoming messages are announced by `+SQNSMQTTONMESSAGE` rings and have to
//! be fetched explicitly. [`MqttRings`] keeps track of the announced
//! messages until they are fetched with [`Mqtt::did_ring`].
//!
//! QoS 0 messages are coalesced: only the most recent one is kept, every new
//! QoS 0 ring overwrites the previous one. QoS 1 and 2 messages are queued
//! until the table is full, later ones are dropped.

use core::cell::RefCell;
use core::str::FromStr;

use heapless::{String, Vec};

use crate::asynch::control::Control;
use crate::asynch::dispatcher::{RingError, RingHandler};
use crate::asynch::state::MAX_TOPIC_LEN;
use crate::command::mqtt::{self, ON_MESSAGE};
use crate::command::Reply;
use crate::error::{Error, ProtocolError};
use crate::fmt::LossyStr;
use crate::ingress::{Frame, FrameKind};

/// A message announced by the module and not fetched yet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MqttRing {
    pub topic: String<MAX_TOPIC_LEN>,
    pub length: usize,
    pub qos: u8,
    pub message_id: Option<u16>,
}

impl MqttRing {
    /// Parses the arguments of `+SQNSMQTTONMESSAGE:<conn>,"<topic>",<len>,<qos>[,<mid>]`.
    pub fn parse(line: &[u8]) -> Option<Self> {
        let args = core::str::from_utf8(line.strip_prefix(ON_MESSAGE)?).ok()?;
        let (_conn, rest) = args.trim_start().split_once(',')?;

        // The topic may contain commas, so it ends at the closing quote
        let rest = rest.strip_prefix('"')?;
        let (topic, rest) = rest.split_once('"')?;
        let mut fields = rest.strip_prefix(',')?.split(',').map(str::trim);

        let length = fields.next()?.parse().ok()?;
        let qos = fields.next()?.parse().ok()?;
        let message_id = match fields.next() {
            Some(mid) => Some(mid.parse().ok()?),
            None => None,
        };

        Some(Self {
            topic: String::from_str(topic).ok()?,
            length,
            qos,
            message_id,
        })
    }
}

struct Entry {
    seq: u32,
    ring: MqttRing,
}

struct RingTable<const N: usize> {
    qos0: Option<Entry>,
    queued: Vec<Entry, N>,
    seq: u32,
}

/// Ring handler for `+SQNSMQTTONMESSAGE`, holding up to `N` QoS 1/2 messages
/// plus the latest QoS 0 message.
pub struct MqttRings<const N: usize> {
    table: RefCell<RingTable<N>>,
}

impl<const N: usize> Default for MqttRings<N> {
    fn default() -> Self {
        Self::new()
    }
}

impl<const N: usize> MqttRings<N> {
    pub const fn new() -> Self {
        Self {
            table: RefCell::new(RingTable {
                qos0: None,
                queued: Vec::new(),
                seq: 0,
            }),
        }
    }

    /// Records a ring. Returns `false` if the message had to be dropped.
    pub fn push(&self, ring: MqttRing) -> bool {
        let mut table = self.table.borrow_mut();
        let seq = table.seq;
        table.seq = table.seq.wrapping_add(1);

        if ring.qos == 0 {
            if let Some(old) = &table.qos0 {
                debug!("Overwriting QoS 0 message on {}", old.ring.topic.as_str());
            }
            table.qos0 = Some(Entry { seq, ring });
            return true;
        }

        match table.queued.push(Entry { seq, ring }) {
            Ok(()) => true,
            Err(entry) => {
                warn!(
                    "No room for QoS {} message on {}, dropping it",
                    entry.ring.qos,
                    entry.ring.topic.as_str()
                );
                false
            }
        }
    }

    pub fn has_ring(&self, topic: Option<&str>) -> bool {
        let table = self.table.borrow();
        table
            .qos0
            .iter()
            .chain(table.queued.iter())
            .any(|e| topic.map_or(true, |t| e.ring.topic == t))
    }

    /// Removes and returns the oldest ring, optionally only for `topic`.
    pub fn take(&self, topic: Option<&str>) -> Option<MqttRing> {
        let mut table = self.table.borrow_mut();
        let matches = |e: &Entry| topic.map_or(true, |t| e.ring.topic == t);

        let queued = table
            .queued
            .iter()
            .enumerate()
            .filter(|(_, e)| matches(*e))
            .min_by_key(|(_, e)| e.seq)
            .map(|(i, e)| (i, e.seq));
        let qos0 = table.qos0.as_ref().filter(|e| matches(*e)).map(|e| e.seq);

        match (queued, qos0) {
            (Some((i, seq)), Some(qos0_seq)) if seq < qos0_seq => {
                Some(table.queued.remove(i).ring)
            }
            (_, Some(_)) => table.qos0.take().map(|e| e.ring),
            (Some((i, _)), None) => Some(table.queued.remove(i).ring),
            (None, None) => None,
        }
    }
}

impl<const N: usize> RingHandler for MqttRings<N> {
    fn on_ring(&self, frame: &Frame<'_>) -> Result<(), RingError> {
        if frame.kind != FrameKind::Line {
            return Ok(());
        }
        let ring = MqttRing::parse(frame.data).ok_or_else(|| {
            warn!("Malformed MQTT ring: {:?}", LossyStr(frame.data));
            RingError
        })?;
        debug!("MQTT ring on {}, {} bytes", ring.topic.as_str(), ring.length);
        if self.push(ring) {
            Ok(())
        } else {
            Err(RingError)
        }
    }
}

/// A fetched message.
#[derive(Debug)]
pub struct MqttMessage {
    pub ring: MqttRing,
    reply: Reply,
}

impl MqttMessage {
    /// The message body, following the `+SQNSMQTTRCVMESSAGE` header line.
    pub fn payload(&self) -> &[u8] {
        let raw = self.reply.payload();
        raw.windows(2)
            .position(|w| w == b"\r\n")
            .map(|i| &raw[i + 2..])
            .unwrap_or(&[])
    }
}

/// Outcome code in the last field of a `+SQNSMQTTON...` completion line.
/// Negative codes are failures reported by the broker or the module.
fn broker_result(reply: &Reply, pattern: &[u8]) -> Result<(), Error> {
    let rc = reply
        .lines()
        .find(|l| l.starts_with(pattern))
        .and_then(|l| l.rsplit(|b| *b == b',').next())
        .and_then(|f| core::str::from_utf8(f).ok())
        .and_then(|f| f.trim().parse::<i32>().ok());

    match rc {
        Some(rc) if rc < 0 => {
            warn!("MQTT request rejected with code {}", rc);
            Err(Error::Protocol(ProtocolError::Generic))
        }
        _ => Ok(()),
    }
}

/// MQTT client of the module.
pub struct Mqtt<'d, const Q: usize, const R: usize> {
    control: Control<'d, Q>,
    rings: &'static MqttRings<R>,
}

impl<'d, const Q: usize, const R: usize> Mqtt<'d, Q, R> {
    /// Hooks `rings` up to the `+SQNSMQTTONMESSAGE` notifications.
    pub fn new(control: Control<'d, Q>, rings: &'static MqttRings<R>) -> Result<Self, Error> {
        control.register_ring_handler(ON_MESSAGE, rings)?;
        Ok(Self { control, rings })
    }

    pub async fn configure(
        &self,
        client_id: &str,
        user_name: &str,
        password: &str,
        tls_profile: Option<u8>,
    ) -> Result<(), Error> {
        self.control
            .run(mqtt::config(client_id, user_name, password, tls_profile)?)
            .await
            .map(drop)
    }

    pub async fn connect(&self, host: &str, port: u16, keep_alive: u16) -> Result<(), Error> {
        let reply = self
            .control
            .run(mqtt::connect(host, port, keep_alive)?)
            .await?;
        broker_result(&reply, mqtt::ON_CONNECT)
    }

    pub async fn disconnect(&self) -> Result<(), Error> {
        self.control.run(mqtt::disconnect()?).await.map(drop)
    }

    /// Subscribes and remembers the subscription, so it can be carried
    /// across a sleep.
    pub async fn subscribe(&self, topic: &str, qos: u8) -> Result<(), Error> {
        let reply = self.control.run(mqtt::subscribe(topic, qos)?).await?;
        broker_result(&reply, mqtt::ON_SUBSCRIBE)?;
        self.control.record_subscription(topic, qos)
    }

    pub async fn unsubscribe(&self, topic: &str) -> Result<(), Error> {
        let reply = self.control.run(mqtt::unsubscribe(topic)?).await?;
        broker_result(&reply, mqtt::ON_UNSUBSCRIBE)?;
        self.control.forget_subscription(topic);
        Ok(())
    }

    pub async fn publish(&self, topic: &str, qos: u8, payload: &[u8]) -> Result<(), Error> {
        let reply = self
            .control
            .run(mqtt::publish(topic, qos, payload)?)
            .await?;
        broker_result(&reply, mqtt::ON_PUBLISH)
    }

    pub fn has_ring(&self, topic: Option<&str>) -> bool {
        self.rings.has_ring(topic)
    }

    /// Fetches the oldest announced message, optionally only for `topic`.
    ///
    /// The ring is consumed before the fetch, a failed fetch loses it.
    pub async fn did_ring(&self, topic: Option<&str>) -> Result<Option<MqttMessage>, Error> {
        let Some(ring) = self.rings.take(topic) else {
            return Ok(None);
        };

        let message_id = if ring.qos > 0 { ring.message_id } else { None };
        let reply = self
            .control
            .run(mqtt::receive(&ring.topic, message_id, ring.length)?)
            .await?;
        Ok(Some(MqttMessage { ring, reply }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ring(topic: &str, qos: u8, mid: Option<u16>) -> MqttRing {
        MqttRing {
            topic: String::from_str(topic).unwrap(),
            length: 4,
            qos,
            message_id: mid,
        }
    }

    #[test]
    fn parses_ring_lines() {
        assert_eq!(
            MqttRing::parse(b"+SQNSMQTTONMESSAGE:0,\"a,b/c\",12,1,7"),
            Some(MqttRing {
                topic: String::from_str("a,b/c").unwrap(),
                length: 12,
                qos: 1,
                message_id: Some(7),
            })
        );
        assert_eq!(
            MqttRing::parse(b"+SQNSMQTTONMESSAGE: 0,\"t\",3,0"),
            Some(ring_with_len("t", 3))
        );
        assert_eq!(MqttRing::parse(b"+SQNSMQTTONMESSAGE:0,t,3,0"), None);
        assert_eq!(MqttRing::parse(b"+SQNSRING: 1,3"), None);
    }

    fn ring_with_len(topic: &str, length: usize) -> MqttRing {
        MqttRing {
            length,
            ..ring(topic, 0, None)
        }
    }

    #[test]
    fn qos0_is_coalesced() {
        let rings = MqttRings::<2>::new();
        assert!(rings.push(ring("a", 0, None)));
        assert!(rings.push(ring("b", 0, None)));
        assert_eq!(rings.take(None).map(|r| r.topic), Some(String::from_str("b").unwrap()));
        assert_eq!(rings.take(None), None);
    }

    #[test]
    fn qos1_dropped_when_full() {
        let rings = MqttRings::<2>::new();
        assert!(rings.push(ring("a", 1, Some(1))));
        assert!(rings.push(ring("a", 1, Some(2))));
        assert!(!rings.push(ring("a", 1, Some(3))));
        // QoS 0 has its own entry
        assert!(rings.push(ring("a", 0, None)));

        assert_eq!(rings.take(None).and_then(|r| r.message_id), Some(1));
        assert_eq!(rings.take(None).and_then(|r| r.message_id), Some(2));
        assert_eq!(rings.take(None).map(|r| r.qos), Some(0));
        assert!(!rings.has_ring(None));
    }

    #[test]
    fn take_filters_by_topic() {
        let rings = MqttRings::<4>::new();
        rings.push(ring("a", 0, None));
        rings.push(ring("b", 1, Some(5)));
        assert!(rings.has_ring(Some("b")));
        assert!(!rings.has_ring(Some("c")));
        assert_eq!(rings.take(Some("b")).and_then(|r| r.message_id), Some(5));
        assert_eq!(rings.take(Some("b")), None);
        assert!(rings.has_ring(Some("a")));
    }

    #[test]
    fn handler_rejects_garbage() {
        let rings = MqttRings::<1>::new();
        assert_eq!(
            rings.on_ring(&Frame::line(b"+SQNSMQTTONMESSAGE:garbage")),
            Err(RingError)
        );
        assert_eq!(
            rings.on_ring(&Frame::line(b"+SQNSMQTTONMESSAGE:0,\"t\",3,0")),
            Ok(())
        );
        assert!(rings.has_ring(Some("t")));
    }

    #[test]
    fn message_payload_follows_header() {
        let mut reply = Reply::default();
        reply
            .push_fragment(b"+SQNSMQTTRCVMESSAGE: 0,\"t\",6,0")
            .unwrap();
        reply.push_fragment(b"ab\r\ncd").unwrap();
        let msg = MqttMessage {
            ring: ring("t", 0, None),
            reply,
        };
        assert_eq!(msg.payload(), b"ab\r\ncd");
    }

    #[test]
    fn negative_broker_code_fails() {
        let mut reply = Reply::default();
        reply
            .push_fragment(b"+SQNSMQTTONSUBSCRIBE:0,\"t\",-1")
            .unwrap();
        assert_eq!(
            broker_result(&reply, mqtt::ON_SUBSCRIBE),
            Err(Error::Protocol(ProtocolError::Generic))
        );

        let mut reply = Reply::default();
        reply.push_fragment(b"+SQNSMQTTONPUBLISH:0,3,0").unwrap();
        assert_eq!(broker_result(&reply, mqtt::ON_PUBLISH), Ok(()));
    }
}
