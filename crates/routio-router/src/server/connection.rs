// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Per-peer connection state.
//!
//! ```text
//!        accept()
//!   NEW ----------> GREETING --greet ok--> READY --error/eof--> CLOSING --drained--> DEAD
//!                       |                    |
//!                       +--timeout/malformed-+-----> CLOSING
//! ```
//!
//! Each connection owns its inbound frame reassembly state and an outbound
//! queue of already-framed buffers. The queue is bounded: once
//! `max_outbound_bytes` of frames are waiting, further enqueues are
//! dropped and counted rather than blocking the loop or disconnecting the
//! slow peer.

use std::collections::VecDeque;
use std::io::{self, Write};
use std::time::{Duration, Instant};

use mio::net::UnixStream;
use routio_wire::{FrameCodec, FrameError};

use super::registry::PeerId;

/// Connection lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnState {
    /// Waiting for the HELLO control frame.
    Greeting,
    /// Greeted; arbitrary control and data frames permitted.
    Ready,
    /// Refusing inbound frames; draining the outbound queue.
    Closing,
    /// Resources released; the peer id is never reused.
    Dead,
}

struct PendingPing {
    nonce: u64,
    deadline: Instant,
}

/// One connected peer.
pub struct Connection {
    stream: UnixStream,
    peer_id: PeerId,
    peer_name: Option<String>,
    state: ConnState,
    codec: FrameCodec,
    outbound: VecDeque<Vec<u8>>,
    queued_bytes: usize,
    send_offset: usize,
    max_outbound_bytes: usize,
    dropped_frames: u64,
    last_rx: Instant,
    greeting_deadline: Instant,
    pending_ping: Option<PendingPing>,
    closing_deadline: Option<Instant>,
}

impl Connection {
    /// Wrap a freshly accepted stream. The peer id is already allocated;
    /// the greeting clock starts now.
    pub fn new(
        stream: UnixStream,
        peer_id: PeerId,
        max_frame_bytes: usize,
        max_outbound_bytes: usize,
        greeting_timeout: Duration,
    ) -> Self {
        let now = Instant::now();
        Self {
            stream,
            peer_id,
            peer_name: None,
            state: ConnState::Greeting,
            codec: FrameCodec::new(max_frame_bytes),
            outbound: VecDeque::new(),
            queued_bytes: 0,
            send_offset: 0,
            max_outbound_bytes,
            dropped_frames: 0,
            last_rx: now,
            greeting_deadline: now + greeting_timeout,
            pending_ping: None,
            closing_deadline: None,
        }
    }

    /// Peer id assigned at accept time.
    pub fn peer_id(&self) -> PeerId {
        self.peer_id
    }

    /// Name declared in HELLO, if greeted.
    pub fn peer_name(&self) -> Option<&str> {
        self.peer_name.as_deref()
    }

    /// Current lifecycle state.
    pub fn state(&self) -> ConnState {
        self.state
    }

    /// Frames dropped on this connection's outbound queue.
    pub fn dropped_frames(&self) -> u64 {
        self.dropped_frames
    }

    /// Bytes currently waiting in the outbound queue.
    pub fn queued_bytes(&self) -> usize {
        self.queued_bytes
    }

    pub(crate) fn stream_mut(&mut self) -> &mut UnixStream {
        &mut self.stream
    }

    /// Record a successful greeting and enter READY.
    pub fn greet(&mut self, name: String) {
        self.peer_name = Some(name);
        self.state = ConnState::Ready;
    }

    /// Drain every complete frame currently readable from the socket.
    ///
    /// Returns the raw `kind | body` buffers in arrival order, or the
    /// error that makes this peer fatal (EOF, I/O failure, framing
    /// violation).
    pub fn read_frames(&mut self) -> Result<Vec<Vec<u8>>, FrameError> {
        let mut frames = Vec::new();
        loop {
            match self.codec.decode(&mut self.stream) {
                Ok(Some(body)) => {
                    self.last_rx = Instant::now();
                    frames.push(body);
                }
                Ok(None) => return Ok(frames),
                Err(e) => return Err(e),
            }
        }
    }

    /// Queue an already-framed buffer for sending.
    ///
    /// Returns `false` (and counts a drop) when the connection is past
    /// READY or the queue cap would be exceeded. Never blocks.
    pub fn enqueue(&mut self, frame: Vec<u8>) -> bool {
        if matches!(self.state, ConnState::Closing | ConnState::Dead) {
            self.dropped_frames += 1;
            return false;
        }
        if self.queued_bytes + frame.len() > self.max_outbound_bytes {
            self.dropped_frames += 1;
            return false;
        }
        self.queued_bytes += frame.len();
        self.outbound.push_back(frame);
        true
    }

    /// Write queued frames until the queue empties or the socket fills.
    ///
    /// Returns `Ok(true)` when the queue is empty, `Ok(false)` when the
    /// socket would block with data still pending.
    pub fn flush(&mut self) -> io::Result<bool> {
        loop {
            let front_len = match self.outbound.front() {
                Some(front) => match self.stream.write(&front[self.send_offset..]) {
                    Ok(0) => {
                        return Err(io::Error::new(
                            io::ErrorKind::WriteZero,
                            "write returned 0",
                        ))
                    }
                    Ok(n) => {
                        self.send_offset += n;
                        front.len()
                    }
                    Err(e) if e.kind() == io::ErrorKind::WouldBlock => return Ok(false),
                    Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                    Err(e) => return Err(e),
                },
                None => return Ok(true),
            };

            if self.send_offset == front_len {
                self.queued_bytes -= front_len;
                self.send_offset = 0;
                self.outbound.pop_front();
            }
        }
    }

    /// Enter CLOSING: refuse inbound frames, drain outbound until
    /// `deadline`, then the sweep marks the connection dead.
    pub fn begin_closing(&mut self, deadline: Instant) {
        if self.state != ConnState::Dead {
            self.state = ConnState::Closing;
            self.closing_deadline = Some(deadline);
        }
    }

    /// True once a closing connection has drained or overstayed its
    /// deadline.
    pub fn closing_finished(&self, now: Instant) -> bool {
        self.state == ConnState::Closing
            && (self.outbound.is_empty()
                || self.closing_deadline.map(|d| now >= d).unwrap_or(true))
    }

    /// Final state transition; the caller releases resources.
    pub fn mark_dead(&mut self) {
        self.state = ConnState::Dead;
    }

    /// True while the connection never greeted and its deadline passed.
    pub fn greeting_expired(&self, now: Instant) -> bool {
        self.state == ConnState::Greeting && now >= self.greeting_deadline
    }

    /// True when a READY connection has been idle long enough to probe and
    /// no probe is outstanding.
    pub fn needs_ping(&self, now: Instant, idle_after: Duration) -> bool {
        self.state == ConnState::Ready
            && self.pending_ping.is_none()
            && now.duration_since(self.last_rx) >= idle_after
    }

    /// Record a PING sent to this peer.
    pub fn note_ping(&mut self, nonce: u64, deadline: Instant) {
        self.pending_ping = Some(PendingPing { nonce, deadline });
    }

    /// True once an outstanding probe went unanswered past its grace
    /// period. Only meaningful while READY; a closing connection is
    /// already on its way out.
    pub fn ping_expired(&self, now: Instant) -> bool {
        self.state == ConnState::Ready
            && self
                .pending_ping
                .as_ref()
                .map(|p| now >= p.deadline)
                .unwrap_or(false)
    }

    /// Match a PONG against the outstanding probe. A stale nonce does not
    /// clear the probe.
    pub fn note_pong(&mut self, nonce: u64) -> bool {
        match &self.pending_ping {
            Some(p) if p.nonce == nonce => {
                self.pending_ping = None;
                true
            }
            _ => false,
        }
    }
}
