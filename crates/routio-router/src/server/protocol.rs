// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Control frame encoding for the router protocol.
//!
//! Every message on the socket is one frame:
//!
//! ```text
//! +0  u32  body length (little-endian, excludes these 4 bytes)
//! +4  u8   kind
//! +5  ...  kind-specific body
//! ```
//!
//! The frame layer ([`routio_wire::FrameCodec`]) strips the length prefix;
//! this module encodes and decodes the `kind | body` part. Strings and
//! integers follow the primitive encodings of `routio-wire`.

use routio_wire::{DecodeError, MessageReader, MessageWriter};
use thiserror::Error;

/// Frame kind values on the wire.
pub mod kind {
    pub const HELLO: u8 = 1;
    pub const WELCOME: u8 = 2;
    pub const PUBLISH: u8 = 3;
    pub const PUBLISH_ACK: u8 = 4;
    pub const SUBSCRIBE: u8 = 5;
    pub const SUBSCRIBE_ACK: u8 = 6;
    pub const UNPUBLISH: u8 = 7;
    pub const UNSUBSCRIBE: u8 = 8;
    pub const WATCH: u8 = 9;
    pub const UNWATCH: u8 = 10;
    pub const DATA: u8 = 11;
    pub const PRESENCE: u8 = 12;
    pub const ERROR: u8 = 13;
    pub const PING: u8 = 14;
    pub const PONG: u8 = 15;
}

/// Error codes carried by `ERROR` frames.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ErrorCode {
    /// Channel id does not name a live channel.
    UnknownChannel = 1,
    /// Peer offered a type tag that does not match the channel's.
    TagMismatch = 2,
    /// DATA sender is not a registered publisher on the channel.
    NotPublisher = 3,
    /// Peer violated the wire protocol; always terminal for the sender.
    Malformed = 4,
    /// Admission refused (peer soft limit reached).
    Overload = 5,
}

impl ErrorCode {
    fn from_wire(raw: u8) -> Result<Self, ProtocolError> {
        match raw {
            1 => Ok(Self::UnknownChannel),
            2 => Ok(Self::TagMismatch),
            3 => Ok(Self::NotPublisher),
            4 => Ok(Self::Malformed),
            5 => Ok(Self::Overload),
            other => Err(ProtocolError::UnknownErrorCode(other)),
        }
    }
}

/// Role carried by `PRESENCE` frames.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum PresenceRole {
    Publisher = 0,
    Subscriber = 1,
}

impl PresenceRole {
    fn from_wire(raw: u8) -> Result<Self, ProtocolError> {
        match raw {
            0 => Ok(Self::Publisher),
            1 => Ok(Self::Subscriber),
            other => Err(ProtocolError::InvalidRole(other)),
        }
    }
}

/// Protocol decode failure. Always treated as `MALFORMED` for the peer.
#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("unknown frame kind {0}")]
    UnknownKind(u8),

    #[error("unknown error code {0}")]
    UnknownErrorCode(u8),

    #[error("invalid presence role {0}")]
    InvalidRole(u8),

    #[error(transparent)]
    Decode(#[from] DecodeError),
}

/// One decoded control frame.
#[derive(Debug, Clone, PartialEq)]
pub enum ControlFrame {
    Hello { peer_name: String },
    Welcome { peer_id: u32, server_version: String },
    Publish { channel: String, type_tag: String },
    PublishAck { channel_id: u32 },
    Subscribe { channel: String, type_tag: String },
    SubscribeAck { channel_id: u32 },
    Unpublish { channel_id: u32 },
    Unsubscribe { channel_id: u32 },
    Watch { channel_id: u32 },
    Unwatch { channel_id: u32 },
    Data { channel_id: u32, payload: Vec<u8> },
    Presence {
        channel_id: u32,
        peer_id: u32,
        role: PresenceRole,
        joined: bool,
    },
    Error { code: ErrorCode, text: String },
    Ping { nonce: u64 },
    Pong { nonce: u64 },
}

impl ControlFrame {
    /// Wire kind value for this frame.
    pub fn kind(&self) -> u8 {
        match self {
            Self::Hello { .. } => kind::HELLO,
            Self::Welcome { .. } => kind::WELCOME,
            Self::Publish { .. } => kind::PUBLISH,
            Self::PublishAck { .. } => kind::PUBLISH_ACK,
            Self::Subscribe { .. } => kind::SUBSCRIBE,
            Self::SubscribeAck { .. } => kind::SUBSCRIBE_ACK,
            Self::Unpublish { .. } => kind::UNPUBLISH,
            Self::Unsubscribe { .. } => kind::UNSUBSCRIBE,
            Self::Watch { .. } => kind::WATCH,
            Self::Unwatch { .. } => kind::UNWATCH,
            Self::Data { .. } => kind::DATA,
            Self::Presence { .. } => kind::PRESENCE,
            Self::Error { .. } => kind::ERROR,
            Self::Ping { .. } => kind::PING,
            Self::Pong { .. } => kind::PONG,
        }
    }

    /// Encode `kind | body` (without the outer length prefix).
    pub fn encode(&self) -> Vec<u8> {
        let mut w = MessageWriter::with_capacity(16);
        w.write_u8(self.kind());
        match self {
            Self::Hello { peer_name } => w.write_string(peer_name),
            Self::Welcome {
                peer_id,
                server_version,
            } => {
                w.write_u32(*peer_id);
                w.write_string(server_version);
            }
            Self::Publish { channel, type_tag } | Self::Subscribe { channel, type_tag } => {
                w.write_string(channel);
                w.write_string(type_tag);
            }
            Self::PublishAck { channel_id }
            | Self::SubscribeAck { channel_id }
            | Self::Unpublish { channel_id }
            | Self::Unsubscribe { channel_id }
            | Self::Watch { channel_id }
            | Self::Unwatch { channel_id } => w.write_u32(*channel_id),
            Self::Data {
                channel_id,
                payload,
            } => {
                w.write_u32(*channel_id);
                w.write_u32(payload.len() as u32);
                w.write_bytes(payload);
            }
            Self::Presence {
                channel_id,
                peer_id,
                role,
                joined,
            } => {
                w.write_u32(*channel_id);
                w.write_u32(*peer_id);
                w.write_u8(*role as u8);
                w.write_u8(u8::from(*joined));
            }
            Self::Error { code, text } => {
                w.write_u8(*code as u8);
                w.write_string(text);
            }
            Self::Ping { nonce } | Self::Pong { nonce } => w.write_u64(*nonce),
        }
        w.into_vec()
    }

    /// Decode `kind | body` produced by the frame layer.
    pub fn decode(bytes: &[u8]) -> Result<Self, ProtocolError> {
        let mut r = MessageReader::new(bytes);
        let frame_kind = r.read_u8()?;
        let frame = match frame_kind {
            kind::HELLO => Self::Hello {
                peer_name: r.read_string()?,
            },
            kind::WELCOME => Self::Welcome {
                peer_id: r.read_u32()?,
                server_version: r.read_string()?,
            },
            kind::PUBLISH => Self::Publish {
                channel: r.read_string()?,
                type_tag: r.read_string()?,
            },
            kind::PUBLISH_ACK => Self::PublishAck {
                channel_id: r.read_u32()?,
            },
            kind::SUBSCRIBE => Self::Subscribe {
                channel: r.read_string()?,
                type_tag: r.read_string()?,
            },
            kind::SUBSCRIBE_ACK => Self::SubscribeAck {
                channel_id: r.read_u32()?,
            },
            kind::UNPUBLISH => Self::Unpublish {
                channel_id: r.read_u32()?,
            },
            kind::UNSUBSCRIBE => Self::Unsubscribe {
                channel_id: r.read_u32()?,
            },
            kind::WATCH => Self::Watch {
                channel_id: r.read_u32()?,
            },
            kind::UNWATCH => Self::Unwatch {
                channel_id: r.read_u32()?,
            },
            kind::DATA => {
                let channel_id = r.read_u32()?;
                let len = r.read_u32()? as usize;
                let payload = r.read_bytes(len)?.to_vec();
                Self::Data {
                    channel_id,
                    payload,
                }
            }
            kind::PRESENCE => {
                let channel_id = r.read_u32()?;
                let peer_id = r.read_u32()?;
                let role = PresenceRole::from_wire(r.read_u8()?)?;
                let joined = r.read_bool()?;
                Self::Presence {
                    channel_id,
                    peer_id,
                    role,
                    joined,
                }
            }
            kind::ERROR => {
                let code = ErrorCode::from_wire(r.read_u8()?)?;
                let text = r.read_string()?;
                Self::Error { code, text }
            }
            kind::PING => Self::Ping {
                nonce: r.read_u64()?,
            },
            kind::PONG => Self::Pong {
                nonce: r.read_u64()?,
            },
            other => return Err(ProtocolError::UnknownKind(other)),
        };
        Ok(frame)
    }
}
