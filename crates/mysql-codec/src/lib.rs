//! # mysql-codec
//!
//! Packet framing for the MySQL wire protocol.
//!
//! Every MySQL message is carried in one or more frames of
//! `3-byte little-endian payload length | 1-byte sequence id | payload`.
//! This crate provides:
//!
//! - [`PacketCodec`]: a tokio-util codec that frames outgoing payloads
//!   (splitting at the 16 MiB - 1 limit) and de-frames incoming ones,
//!   tracking and verifying sequence ids.
//! - [`PacketStream`]: a higher-level wrapper over `Framed` exposing
//!   whole-payload reads and writes, with continuation-frame reassembly
//!   and the transport swap needed for the mid-handshake TLS upgrade.

#![warn(missing_docs)]
#![deny(unsafe_code)]

pub mod error;
pub mod framed;
pub mod packet_codec;

pub use error::CodecError;
pub use framed::PacketStream;
pub use packet_codec::{Packet, PacketCodec};
