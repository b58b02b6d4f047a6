// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Wire codec for the routio message bus.
//!
//! Everything on a routio socket is little-endian with no padding. This
//! crate provides the three layers the router and generated bindings share:
//!
//! - [`MessageReader`] / [`MessageWriter`]: primitive reads and writes over
//!   a frame body (integers, floats, bools, length-prefixed strings and
//!   arrays, raw byte runs).
//! - [`Codec`]: one read/write method pair per encodable type. Composite
//!   types delegate field by field to their children.
//! - [`FrameCodec`]: incremental length-prefix frame reassembly for
//!   non-blocking stream sockets.
//!
//! Any violation of the encoding surfaces as a [`DecodeError`]; callers
//! must treat a decode failure as fatal for the peer that produced the
//! bytes.

pub mod codec;
pub mod error;
pub mod frame;

pub use codec::{Codec, MessageReader, MessageWriter};
pub use error::DecodeError;
pub use frame::{FrameCodec, FrameError, FRAME_HEADER_SIZE};
