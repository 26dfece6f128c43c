//! # mysql-protocol
//!
//! Wire-level payloads for the MySQL client/server protocol.
//!
//! This crate covers the payload layer only: reading and writing the
//! primitive types used by the protocol (little-endian integers,
//! length-encoded integers and strings), the initial handshake exchange,
//! authentication scrambles, and the generic OK/ERR/EOF response packets.
//! Packet framing (the 4-byte header and sequence ids) lives in
//! `mysql-codec`; connection establishment lives in `mysql-client`.

#![warn(missing_docs)]
#![deny(unsafe_code)]

pub mod auth;
pub mod constants;
pub mod error;
pub mod handshake;
pub mod packet;
pub mod response;

pub use error::ProtocolError;
pub use handshake::{HandshakeResponse, ServerHandshake, SslRequest};
pub use packet::{PacketReader, PacketWriter};
pub use response::{ErrPacket, OkPacket, PacketKind};
