//! wispmq - MQTT v3.1/v3.1.1 client with an MQTT-SN v1.2 packet codec
//!
//! A pure client-side implementation of the MQTT publish/subscribe protocol
//! over TCP or TLS, built on tokio. The wire codecs are standalone and free
//! of I/O; the client session engine runs one reader task and one writer
//! task per connection with acknowledgement tracking, retransmission,
//! keep-alive pings, and automatic reconnection.

pub mod client;
pub mod codec;
pub mod config;
pub mod protocol;
pub mod sn;

pub use client::{Client, ClientError, ReconnectHandler, TlsError};
pub use config::{ClientConfig, ConfigError, TlsMode};
pub use protocol::{Packet, ProtocolVersion, Publish, QoS, SubscribeReturnCode};
