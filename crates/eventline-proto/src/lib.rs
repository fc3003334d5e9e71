// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Wire schema for the eventline telemetry protocol.
//!
//! This crate defines the protobuf message types shared by the client and
//! collector crates, along with the datagram codec (see [`wire`]). The
//! message types are authored directly with `prost` derives rather than
//! build-script codegen; the schema is small enough that keeping it in
//! plain Rust avoids a protoc toolchain dependency while preserving
//! identical wire behavior.
//!
//! A transmitted packet is assembled as a *concatenation* of partial
//! `Packet` encodings, each setting a disjoint subset of fields. Standard
//! protobuf merge semantics (scalars last-write-wins, repeated fields
//! append) make the concatenation decode as one fully merged message; the
//! sender exploits this to stream events into the compressor without ever
//! materializing the whole packet.

use std::time::{Duration, SystemTime, UNIX_EPOCH};

pub mod wire;

pub use flate2::Compression;

/// Wall-clock instant as seconds/nanos since the Unix epoch.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct Timestamp {
    #[prost(int64, tag = "1")]
    pub seconds: i64,
    #[prost(int32, tag = "2")]
    pub nanos: i32,
}

/// Typed key/value attribute attached to an event. Construct via the
/// typed helpers ([`Tag::string`], [`Tag::int64`], ...); the value set is
/// closed.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct Tag {
    #[prost(string, tag = "1")]
    pub key: String,
    #[prost(oneof = "tag::Value", tags = "2, 3, 4, 5, 6, 7, 8")]
    pub value: Option<tag::Value>,
}

/// Nested types in `Tag`.
pub mod tag {
    #[derive(Clone, PartialEq, ::prost::Oneof)]
    pub enum Value {
        #[prost(string, tag = "2")]
        String(String),
        #[prost(bytes, tag = "3")]
        Bytes(Vec<u8>),
        #[prost(int64, tag = "4")]
        Int64(i64),
        #[prost(double, tag = "5")]
        Double(f64),
        #[prost(bool, tag = "6")]
        Bool(bool),
        /// Elapsed time in nanoseconds.
        #[prost(int64, tag = "7")]
        DurationNs(i64),
        /// Wall-clock instant carried as nanoseconds relative to the
        /// enclosing packet's start timestamp; the collector resolves it
        /// against the clock-corrected packet start.
        #[prost(int64, tag = "8")]
        TimestampOffsetNs(i64),
    }
}

/// One telemetry occurrence inside a packet. `timestamp_offset_ns` is
/// relative to the packet's `start_timestamp`, keeping per-event cost to a
/// single varint instead of a full wall-clock encoding.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct Event {
    #[prost(string, tag = "1")]
    pub name: String,
    #[prost(string, repeated, tag = "2")]
    pub scope: Vec<String>,
    #[prost(int64, tag = "3")]
    pub timestamp_offset_ns: i64,
    #[prost(message, repeated, tag = "4")]
    pub tags: Vec<Tag>,
}

/// One wire-transmitted unit: a batch of events plus the sender's identity
/// and clock metadata.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct Packet {
    #[prost(string, tag = "1")]
    pub application: String,
    #[prost(string, tag = "2")]
    pub application_version: String,
    #[prost(string, tag = "3")]
    pub instance: String,
    #[prost(message, optional, tag = "4")]
    pub start_timestamp: Option<Timestamp>,
    /// Sender-clock nanoseconds from packet open until transmission.
    #[prost(int64, tag = "5")]
    pub send_offset_ns: i64,
    #[prost(message, repeated, tag = "6")]
    pub events: Vec<Event>,
}

impl Timestamp {
    pub fn from_system_time(t: SystemTime) -> Timestamp {
        match t.duration_since(UNIX_EPOCH) {
            Ok(d) => Timestamp {
                seconds: d.as_secs() as i64,
                nanos: d.subsec_nanos() as i32,
            },
            Err(earlier) => {
                // Pre-epoch instants round toward negative infinity so
                // nanos stays within [0, 1e9).
                let d = earlier.duration();
                let mut seconds = -(d.as_secs() as i64);
                let mut nanos = -(d.subsec_nanos() as i32);
                if nanos < 0 {
                    seconds -= 1;
                    nanos += 1_000_000_000;
                }
                Timestamp { seconds, nanos }
            }
        }
    }

    pub fn as_system_time(&self) -> SystemTime {
        let base = if self.seconds >= 0 {
            UNIX_EPOCH + Duration::from_secs(self.seconds as u64)
        } else {
            UNIX_EPOCH - Duration::from_secs(self.seconds.unsigned_abs())
        };
        if self.nanos >= 0 {
            base + Duration::from_nanos(self.nanos as u64)
        } else {
            base - Duration::from_nanos(u64::from(self.nanos.unsigned_abs()))
        }
    }
}

impl From<SystemTime> for Timestamp {
    fn from(t: SystemTime) -> Timestamp {
        Timestamp::from_system_time(t)
    }
}

/// Signed nanoseconds from `from` to `to`, saturating at the `i64` range.
pub fn signed_nanos_between(from: SystemTime, to: SystemTime) -> i64 {
    match to.duration_since(from) {
        Ok(d) => i64::try_from(d.as_nanos()).unwrap_or(i64::MAX),
        Err(earlier) => i64::try_from(earlier.duration().as_nanos())
            .map(i64::wrapping_neg)
            .unwrap_or(i64::MIN),
    }
}

/// `t` shifted by a signed nanosecond delta.
pub fn add_signed_nanos(t: SystemTime, nanos: i64) -> SystemTime {
    if nanos >= 0 {
        t + Duration::from_nanos(nanos as u64)
    } else {
        t - Duration::from_nanos(nanos.unsigned_abs())
    }
}

impl Tag {
    pub fn string(key: impl Into<String>, value: impl Into<String>) -> Tag {
        Tag {
            key: key.into(),
            value: Some(tag::Value::String(value.into())),
        }
    }

    pub fn bytes(key: impl Into<String>, value: impl Into<Vec<u8>>) -> Tag {
        Tag {
            key: key.into(),
            value: Some(tag::Value::Bytes(value.into())),
        }
    }

    pub fn int64(key: impl Into<String>, value: i64) -> Tag {
        Tag {
            key: key.into(),
            value: Some(tag::Value::Int64(value)),
        }
    }

    pub fn float64(key: impl Into<String>, value: f64) -> Tag {
        Tag {
            key: key.into(),
            value: Some(tag::Value::Double(value)),
        }
    }

    pub fn bool(key: impl Into<String>, value: bool) -> Tag {
        Tag {
            key: key.into(),
            value: Some(tag::Value::Bool(value)),
        }
    }

    pub fn duration(key: impl Into<String>, value: Duration) -> Tag {
        Tag {
            key: key.into(),
            value: Some(tag::Value::DurationNs(
                i64::try_from(value.as_nanos()).unwrap_or(i64::MAX),
            )),
        }
    }

    pub fn timestamp_offset(key: impl Into<String>, offset_ns: i64) -> Tag {
        Tag {
            key: key.into(),
            value: Some(tag::Value::TimestampOffsetNs(offset_ns)),
        }
    }

    /// `key=value` rendering used by debug handlers and log output.
    pub fn kv_string(&self) -> String {
        format!("{}={}", self.key, self.value_string())
    }

    /// Human-readable rendering of the tag value.
    pub fn value_string(&self) -> String {
        let Some(value) = &self.value else {
            return String::new();
        };
        match value {
            tag::Value::String(s) => s.clone(),
            tag::Value::Bytes(b) => b.iter().map(|byte| format!("{byte:02x}")).collect(),
            tag::Value::Int64(v) => v.to_string(),
            tag::Value::Double(v) => v.to_string(),
            tag::Value::Bool(v) => v.to_string(),
            tag::Value::DurationNs(ns) | tag::Value::TimestampOffsetNs(ns) => {
                let magnitude = Duration::from_nanos(ns.unsigned_abs());
                if *ns < 0 {
                    format!("-{magnitude:?}")
                } else {
                    format!("{magnitude:?}")
                }
            }
        }
    }
}

impl Event {
    /// Space-separated `key=value` rendering of all tags.
    pub fn tags_string(&self) -> String {
        self.tags
            .iter()
            .map(Tag::kv_string)
            .collect::<Vec<_>>()
            .join(" ")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use prost::Message;

    #[test]
    fn concatenated_encodings_merge_into_one_packet() {
        let header = Packet {
            application: "app".into(),
            application_version: "1.2.3".into(),
            instance: "host-1".into(),
            start_timestamp: Some(Timestamp {
                seconds: 1_700_000_000,
                nanos: 42,
            }),
            ..Default::default()
        };
        let first = Packet {
            events: vec![Event {
                name: "first".into(),
                scope: vec!["a".into(), "b".into()],
                timestamp_offset_ns: 10,
                tags: vec![Tag::int64("n", 1)],
            }],
            ..Default::default()
        };
        let second = Packet {
            events: vec![Event {
                name: "second".into(),
                timestamp_offset_ns: 20,
                ..Default::default()
            }],
            ..Default::default()
        };
        let trailer = Packet {
            send_offset_ns: 5_000,
            ..Default::default()
        };

        let mut concatenated = header.encode_to_vec();
        concatenated.extend(first.encode_to_vec());
        concatenated.extend(second.encode_to_vec());
        concatenated.extend(trailer.encode_to_vec());

        let merged = Packet::decode(concatenated.as_slice()).unwrap();
        assert_eq!(merged.application, "app");
        assert_eq!(merged.application_version, "1.2.3");
        assert_eq!(merged.instance, "host-1");
        assert_eq!(
            merged.start_timestamp,
            Some(Timestamp {
                seconds: 1_700_000_000,
                nanos: 42
            })
        );
        assert_eq!(merged.send_offset_ns, 5_000);
        assert_eq!(merged.events.len(), 2);
        assert_eq!(merged.events[0].name, "first");
        assert_eq!(merged.events[0].scope, vec!["a", "b"]);
        assert_eq!(merged.events[1].name, "second");
        assert_eq!(merged.events[1].timestamp_offset_ns, 20);
    }

    #[test]
    fn timestamp_round_trips_through_system_time() {
        let now = SystemTime::now();
        let ts = Timestamp::from_system_time(now);
        assert_eq!(ts.as_system_time(), now);
    }

    #[test]
    fn timestamp_handles_pre_epoch_instants() {
        let before = UNIX_EPOCH - Duration::new(3, 250);
        let ts = Timestamp::from_system_time(before);
        assert!(ts.seconds < 0);
        assert!((0..1_000_000_000).contains(&ts.nanos));
        assert_eq!(ts.as_system_time(), before);
    }

    #[test]
    fn signed_nanos_are_symmetric() {
        let a = UNIX_EPOCH + Duration::from_secs(100);
        let b = a + Duration::from_nanos(12_345);
        assert_eq!(signed_nanos_between(a, b), 12_345);
        assert_eq!(signed_nanos_between(b, a), -12_345);
        assert_eq!(add_signed_nanos(a, 12_345), b);
        assert_eq!(add_signed_nanos(b, -12_345), a);
    }

    #[test]
    fn tag_values_stringify_exhaustively() {
        assert_eq!(Tag::string("k", "v").kv_string(), "k=v");
        assert_eq!(Tag::bytes("k", vec![0xde, 0xad]).value_string(), "dead");
        assert_eq!(Tag::int64("k", -7).value_string(), "-7");
        assert_eq!(Tag::float64("k", 1.5).value_string(), "1.5");
        assert_eq!(Tag::bool("k", true).value_string(), "true");
        assert_eq!(
            Tag::duration("k", Duration::from_millis(1500)).value_string(),
            "1.5s"
        );
        assert_eq!(Tag::timestamp_offset("k", -1_000_000_000).value_string(), "-1s");
        let empty = Tag {
            key: "k".into(),
            value: None,
        };
        assert_eq!(empty.value_string(), "");
    }

    #[test]
    fn tags_string_joins_in_order() {
        let event = Event {
            name: "e".into(),
            tags: vec![Tag::string("a", "1"), Tag::bool("b", false)],
            ..Default::default()
        };
        assert_eq!(event.tags_string(), "a=1 b=false");
    }
}
