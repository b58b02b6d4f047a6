// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Decode error taxonomy.

use thiserror::Error;

/// Error produced by any layer of the wire codec.
///
/// A `DecodeError` means the byte stream violated the encoding; the bytes
/// after the violation point cannot be trusted, so the producing peer must
/// be torn down.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    /// The buffer ended before the value it declared.
    #[error("truncated input: needed {needed} more bytes, {remaining} available")]
    Truncated {
        /// Bytes required to finish the current value.
        needed: usize,
        /// Bytes left in the buffer.
        remaining: usize,
    },

    /// A declared length exceeds the allowed maximum.
    #[error("declared length {declared} exceeds maximum {max}")]
    Overlong {
        /// Length taken from the wire.
        declared: usize,
        /// Upper bound in effect.
        max: usize,
    },

    /// A string field did not hold valid UTF-8.
    #[error("string field is not valid UTF-8")]
    InvalidUtf8,
}
