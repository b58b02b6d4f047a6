// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Length-prefix frame delimitation.
//!
//! A stream socket has no message boundaries, so every routio message is
//! carried as one self-delimited frame:
//!
//! ```text
//! +----------------+-------------------+
//! | Length (4B LE) | body              |
//! +----------------+-------------------+
//! ```
//!
//! The length field counts the body only, not the 4-byte header. The codec
//! keeps partial-read state so it can be fed from a non-blocking socket:
//! call [`FrameCodec::decode`] whenever the socket is readable, until it
//! returns `Ok(None)`.

use std::io::{self, Read};

use thiserror::Error;

use crate::error::DecodeError;

/// Frame header size (4 bytes for the body length).
pub const FRAME_HEADER_SIZE: usize = 4;

/// Default upper bound on a single frame body (64 MiB).
pub const DEFAULT_MAX_FRAME_SIZE: usize = 64 * 1024 * 1024;

/// Error surfaced while reassembling frames from a stream.
#[derive(Debug, Error)]
pub enum FrameError {
    /// The underlying socket failed or closed.
    #[error(transparent)]
    Io(#[from] io::Error),

    /// The peer violated the framing rules.
    #[error(transparent)]
    Decode(#[from] DecodeError),
}

/// Incremental length-prefix frame codec.
#[derive(Debug)]
pub struct FrameCodec {
    state: ReadState,
    buffer: Vec<u8>,
    max_size: usize,
    frames_decoded: u64,
    bytes_decoded: u64,
}

#[derive(Debug, Clone, Copy)]
enum ReadState {
    Header { bytes_read: usize },
    Body { expected: usize, bytes_read: usize },
}

impl Default for ReadState {
    fn default() -> Self {
        ReadState::Header { bytes_read: 0 }
    }
}

impl FrameCodec {
    /// Codec with the given per-frame size bound.
    pub fn new(max_size: usize) -> Self {
        Self {
            state: ReadState::default(),
            buffer: vec![0u8; FRAME_HEADER_SIZE],
            max_size,
            frames_decoded: 0,
            bytes_decoded: 0,
        }
    }

    /// Codec with the default 64 MiB bound.
    pub fn with_default_max() -> Self {
        Self::new(DEFAULT_MAX_FRAME_SIZE)
    }

    /// Upper bound on a single frame body.
    pub fn max_size(&self) -> usize {
        self.max_size
    }

    /// Frames fully decoded so far.
    pub fn frames_decoded(&self) -> u64 {
        self.frames_decoded
    }

    /// Body bytes fully decoded so far.
    pub fn bytes_decoded(&self) -> u64 {
        self.bytes_decoded
    }

    /// True while a frame is partially read.
    pub fn is_partial(&self) -> bool {
        match self.state {
            ReadState::Header { bytes_read } => bytes_read > 0,
            ReadState::Body { .. } => true,
        }
    }

    /// Prepend the length header to a body.
    pub fn encode(body: &[u8]) -> Vec<u8> {
        let mut frame = Vec::with_capacity(FRAME_HEADER_SIZE + body.len());
        Self::encode_into(body, &mut frame);
        frame
    }

    /// Append `length | body` onto an existing buffer.
    pub fn encode_into(body: &[u8], buf: &mut Vec<u8>) {
        buf.extend_from_slice(&(body.len() as u32).to_le_bytes());
        buf.extend_from_slice(body);
    }

    /// Pull bytes from `reader` until a frame completes or the socket runs
    /// dry.
    ///
    /// Returns `Ok(Some(body))` when a frame is complete, `Ok(None)` when
    /// the reader would block mid-frame. EOF and framing violations are
    /// errors; after an error the codec must not be reused for the same
    /// peer.
    pub fn decode<R: Read + ?Sized>(
        &mut self,
        reader: &mut R,
    ) -> Result<Option<Vec<u8>>, FrameError> {
        loop {
            match self.state {
                ReadState::Header { bytes_read } => {
                    match reader.read(&mut self.buffer[bytes_read..FRAME_HEADER_SIZE]) {
                        Ok(0) => {
                            return Err(io::Error::new(
                                io::ErrorKind::UnexpectedEof,
                                if bytes_read == 0 {
                                    "connection closed"
                                } else {
                                    "connection closed inside frame header"
                                },
                            )
                            .into());
                        }
                        Ok(n) => {
                            let total = bytes_read + n;
                            if total < FRAME_HEADER_SIZE {
                                self.state = ReadState::Header { bytes_read: total };
                                continue;
                            }

                            let declared = u32::from_le_bytes([
                                self.buffer[0],
                                self.buffer[1],
                                self.buffer[2],
                                self.buffer[3],
                            ]) as usize;

                            if declared > self.max_size {
                                self.state = ReadState::default();
                                return Err(DecodeError::Overlong {
                                    declared,
                                    max: self.max_size,
                                }
                                .into());
                            }

                            if declared == 0 {
                                self.frames_decoded += 1;
                                self.state = ReadState::default();
                                return Ok(Some(Vec::new()));
                            }

                            self.buffer.resize(declared, 0);
                            self.state = ReadState::Body {
                                expected: declared,
                                bytes_read: 0,
                            };
                        }
                        Err(e) if e.kind() == io::ErrorKind::WouldBlock => {
                            self.state = ReadState::Header { bytes_read };
                            return Ok(None);
                        }
                        Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                        Err(e) => return Err(e.into()),
                    }
                }

                ReadState::Body {
                    expected,
                    bytes_read,
                } => {
                    match reader.read(&mut self.buffer[bytes_read..expected]) {
                        Ok(0) => {
                            return Err(io::Error::new(
                                io::ErrorKind::UnexpectedEof,
                                "connection closed inside frame body",
                            )
                            .into());
                        }
                        Ok(n) => {
                            let total = bytes_read + n;
                            if total < expected {
                                self.state = ReadState::Body {
                                    expected,
                                    bytes_read: total,
                                };
                                continue;
                            }

                            let body = self.buffer[..expected].to_vec();
                            self.frames_decoded += 1;
                            self.bytes_decoded += expected as u64;
                            self.buffer.resize(FRAME_HEADER_SIZE, 0);
                            self.state = ReadState::default();
                            return Ok(Some(body));
                        }
                        Err(e) if e.kind() == io::ErrorKind::WouldBlock => {
                            self.state = ReadState::Body {
                                expected,
                                bytes_read,
                            };
                            return Ok(None);
                        }
                        Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                        Err(e) => return Err(e.into()),
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    /// Reader that yields its chunks one call at a time, then WouldBlock.
    struct Chunked {
        chunks: Vec<Vec<u8>>,
    }

    impl Read for Chunked {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            match self.chunks.first_mut() {
                None => Err(io::Error::from(io::ErrorKind::WouldBlock)),
                Some(chunk) => {
                    let n = chunk.len().min(buf.len());
                    buf[..n].copy_from_slice(&chunk[..n]);
                    chunk.drain(..n);
                    if chunk.is_empty() {
                        self.chunks.remove(0);
                    }
                    Ok(n)
                }
            }
        }
    }

    #[test]
    fn test_encode_layout() {
        let frame = FrameCodec::encode(b"hello");
        assert_eq!(&frame[..4], &5u32.to_le_bytes());
        assert_eq!(&frame[4..], b"hello");
    }

    #[test]
    fn test_decode_simple() {
        let mut codec = FrameCodec::new(1024);
        let mut cursor = Cursor::new(FrameCodec::encode(b"hello, world"));
        let body = codec.decode(&mut cursor).unwrap();
        assert_eq!(body, Some(b"hello, world".to_vec()));
        assert_eq!(codec.frames_decoded(), 1);
        assert_eq!(codec.bytes_decoded(), 12);
    }

    #[test]
    fn test_decode_back_to_back() {
        let mut buf = Vec::new();
        FrameCodec::encode_into(b"first", &mut buf);
        FrameCodec::encode_into(b"second", &mut buf);
        let mut cursor = Cursor::new(buf);

        let mut codec = FrameCodec::new(1024);
        assert_eq!(codec.decode(&mut cursor).unwrap(), Some(b"first".to_vec()));
        assert_eq!(codec.decode(&mut cursor).unwrap(), Some(b"second".to_vec()));
    }

    #[test]
    fn test_decode_empty_frame() {
        let mut codec = FrameCodec::new(1024);
        let mut cursor = Cursor::new(FrameCodec::encode(b""));
        assert_eq!(codec.decode(&mut cursor).unwrap(), Some(Vec::new()));
    }

    #[test]
    fn test_decode_split_across_reads() {
        let frame = FrameCodec::encode(b"split me carefully");
        let mut reader = Chunked {
            chunks: vec![
                frame[..2].to_vec(),
                frame[2..6].to_vec(),
                frame[6..10].to_vec(),
                frame[10..].to_vec(),
            ],
        };

        let mut codec = FrameCodec::new(1024);
        // The internal loop stitches all four partial reads together.
        let mut result = None;
        for _ in 0..8 {
            if let Some(body) = codec.decode(&mut reader).unwrap() {
                result = Some(body);
                break;
            }
        }
        assert_eq!(result, Some(b"split me carefully".to_vec()));
    }

    #[test]
    fn test_decode_would_block_preserves_state() {
        let frame = FrameCodec::encode(b"payload");
        let mut reader = Chunked {
            chunks: vec![frame[..5].to_vec()],
        };

        let mut codec = FrameCodec::new(1024);
        assert!(codec.decode(&mut reader).unwrap().is_none());
        assert!(codec.is_partial());

        let mut rest = Cursor::new(frame[5..].to_vec());
        assert_eq!(codec.decode(&mut rest).unwrap(), Some(b"payload".to_vec()));
        assert!(!codec.is_partial());
    }

    #[test]
    fn test_decode_oversize_rejected() {
        let mut codec = FrameCodec::new(8);
        let mut cursor = Cursor::new(FrameCodec::encode(b"far too long for the cap"));
        match codec.decode(&mut cursor) {
            Err(FrameError::Decode(DecodeError::Overlong { declared, max })) => {
                assert_eq!(declared, 24);
                assert_eq!(max, 8);
            }
            other => panic!("expected Overlong, got {:?}", other.map(|_| ())),
        }
    }

    #[test]
    fn test_decode_eof_mid_body() {
        let frame = FrameCodec::encode(b"truncated");
        let mut cursor = Cursor::new(frame[..7].to_vec());
        let mut codec = FrameCodec::new(1024);
        match codec.decode(&mut cursor) {
            Err(FrameError::Io(e)) => assert_eq!(e.kind(), io::ErrorKind::UnexpectedEof),
            other => panic!("expected EOF error, got {:?}", other.map(|_| ())),
        }
    }

    #[test]
    fn test_decode_clean_eof() {
        let mut cursor = Cursor::new(Vec::new());
        let mut codec = FrameCodec::new(1024);
        match codec.decode(&mut cursor) {
            Err(FrameError::Io(e)) => assert_eq!(e.kind(), io::ErrorKind::UnexpectedEof),
            other => panic!("expected EOF error, got {:?}", other.map(|_| ())),
        }
    }
}
