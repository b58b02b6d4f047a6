// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Router core: event loop and dispatch.
//!
//! ```text
//! +--------------------------------------------------------------+
//! |                         Router                               |
//! |  +--------------------------------------------------------+  |
//! |  |                     mio::Poll                          |  |
//! |  |  - Unix listener (accept new peers)                    |  |
//! |  |  - Peer streams (read/write frames)                    |  |
//! |  |  - Waker (shutdown request)                            |  |
//! |  +--------------------------------------------------------+  |
//! |                             |                                |
//! |                             v                                |
//! |  +-------------+   +---------------+   +-----------------+   |
//! |  |   Accept    |   | Dispatch      |   | Timer sweep     |   |
//! |  |  new conn   |   | control/data  |   | greet/ping/drain|   |
//! |  +-------------+   +---------------+   +-----------------+   |
//! +--------------------------------------------------------------+
//! ```
//!
//! Strictly single-threaded: every mutation of the channel registry,
//! connections, and outbound queues happens between two returns of
//! [`Router::poll_once`]. Handlers are a closed set dispatched by token
//! (listener, waker, connection) rather than open-ended callbacks.

use std::collections::HashMap;
use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use mio::net::UnixListener;
use mio::{Events, Interest, Poll, Token, Waker};
use thiserror::Error;
use tracing::{debug, info, warn};

use routio_wire::{FrameCodec, FrameError, FRAME_HEADER_SIZE};

use crate::config::{ConfigError, RouterConfig};

pub mod connection;
pub mod protocol;
pub mod registry;

pub use connection::{ConnState, Connection};
pub use protocol::{ControlFrame, ErrorCode, PresenceRole};
pub use registry::{ChannelRegistry, ChannelStats, PeerId, PresenceEvent, RegistryError};

/// Token for the Unix listener.
const LISTENER_TOKEN: Token = Token(0);

/// Token for the shutdown waker.
const WAKER_TOKEN: Token = Token(1);

/// Starting token for connections.
const CONNECTION_TOKEN_START: usize = 2;

/// Default poll timeout; timer sweeps run at this granularity.
const DEFAULT_POLL_TIMEOUT: Duration = Duration::from_millis(100);

/// Maximum events to process per poll.
const MAX_EVENTS: usize = 128;

/// Router error types.
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("bind error on {path}: {source}")]
    Bind {
        path: String,
        #[source]
        source: io::Error,
    },

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

/// Handle to stop a running router from another thread or a signal
/// bridge.
#[derive(Clone)]
pub struct RouterHandle {
    running: Arc<AtomicBool>,
    waker: Arc<Waker>,
}

impl RouterHandle {
    /// True until shutdown is requested.
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Request shutdown; the loop drains peers and exits.
    pub fn shutdown(&self) {
        self.running.store(false, Ordering::SeqCst);
        let _ = self.waker.wake();
    }
}

/// The message router: one poll loop owning all connections, the channel
/// registry, and all outbound queues.
pub struct Router {
    config: RouterConfig,
    poll: Poll,
    events: Events,
    listener: UnixListener,
    conns: HashMap<Token, Connection>,
    peer_tokens: HashMap<PeerId, Token>,
    registry: ChannelRegistry,
    next_token: usize,
    next_peer_id: PeerId,
    next_ping_nonce: u64,
    running: Arc<AtomicBool>,
    waker: Arc<Waker>,
    last_stats: Instant,
}

impl Router {
    /// Validate the configuration, bind the socket, and set up the loop.
    ///
    /// A stale socket file left by a previous run is removed first.
    pub fn bind(config: RouterConfig) -> Result<Self, ServerError> {
        config.validate()?;

        let poll = Poll::new()?;
        let waker = Arc::new(Waker::new(poll.registry(), WAKER_TOKEN)?);

        if config.socket_path.exists() {
            let _ = std::fs::remove_file(&config.socket_path);
        }
        let mut listener = UnixListener::bind(&config.socket_path).map_err(|e| {
            ServerError::Bind {
                path: config.socket_path.display().to_string(),
                source: e,
            }
        })?;
        poll.registry()
            .register(&mut listener, LISTENER_TOKEN, Interest::READABLE)?;

        info!(socket = %config.socket_path.display(), "router listening");

        Ok(Self {
            config,
            poll,
            events: Events::with_capacity(MAX_EVENTS),
            listener,
            conns: HashMap::new(),
            peer_tokens: HashMap::new(),
            registry: ChannelRegistry::new(),
            next_token: CONNECTION_TOKEN_START,
            next_peer_id: 1,
            next_ping_nonce: 1,
            running: Arc::new(AtomicBool::new(true)),
            waker,
            last_stats: Instant::now(),
        })
    }

    /// Handle for requesting shutdown.
    pub fn handle(&self) -> RouterHandle {
        RouterHandle {
            running: self.running.clone(),
            waker: self.waker.clone(),
        }
    }

    /// The channel registry (read-only introspection).
    pub fn registry(&self) -> &ChannelRegistry {
        &self.registry
    }

    /// Number of live connections.
    pub fn peer_count(&self) -> usize {
        self.conns.len()
    }

    /// Run until shutdown is requested, then drain and close.
    pub fn run(&mut self) -> Result<(), ServerError> {
        while self.poll_once(DEFAULT_POLL_TIMEOUT)? {}
        self.drain_and_close();
        info!("router stopped");
        Ok(())
    }

    /// One event-loop iteration: wait for readiness up to `timeout`, run
    /// every due callback to completion, sweep timers.
    ///
    /// Returns `false` once the loop is terminating.
    pub fn poll_once(&mut self, timeout: Duration) -> Result<bool, ServerError> {
        match self.poll.poll(&mut self.events, Some(timeout)) {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::Interrupted => return Ok(self.is_running()),
            Err(e) => return Err(e.into()),
        }

        let ready: Vec<(Token, bool, bool)> = self
            .events
            .iter()
            .map(|ev| (ev.token(), ev.is_readable(), ev.is_writable()))
            .collect();

        for (token, readable, writable) in ready {
            match token {
                LISTENER_TOKEN => self.accept_ready(),
                WAKER_TOKEN => {} // shutdown flag checked below
                token => {
                    if readable {
                        self.handle_readable(token);
                    }
                    if writable {
                        self.handle_writable(token);
                    }
                }
            }
        }

        let now = Instant::now();
        self.sweep_timers(now);
        self.stats_tick(now);

        Ok(self.is_running())
    }

    fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Accept every pending connection and allocate peer ids.
    fn accept_ready(&mut self) {
        loop {
            match self.listener.accept() {
                Ok((mut stream, _addr)) => {
                    let token = Token(self.next_token);
                    self.next_token += 1;
                    let peer_id = self.next_peer_id;
                    self.next_peer_id += 1;

                    if let Err(e) = self.poll.registry().register(
                        &mut stream,
                        token,
                        Interest::READABLE | Interest::WRITABLE,
                    ) {
                        warn!(peer_id, "failed to register connection: {e}");
                        continue;
                    }

                    let conn = Connection::new(
                        stream,
                        peer_id,
                        self.config.max_frame_bytes,
                        self.config.max_outbound_bytes,
                        self.config.greeting_timeout(),
                    );
                    self.peer_tokens.insert(peer_id, token);
                    self.conns.insert(token, conn);
                    debug!(peer_id, "accepted connection");
                }
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => break,
                Err(e) => {
                    warn!("accept error: {e}");
                    break;
                }
            }
        }
    }

    fn handle_readable(&mut self, token: Token) {
        let frames = match self.conns.get_mut(&token) {
            // CLOSING refuses new inbound frames; DEAD is gone already.
            Some(conn) if matches!(conn.state(), ConnState::Greeting | ConnState::Ready) => {
                conn.read_frames()
            }
            _ => return,
        };

        match frames {
            Ok(frames) => {
                for frame in frames {
                    self.handle_frame(token, frame);
                }
            }
            Err(FrameError::Io(e)) if e.kind() == io::ErrorKind::UnexpectedEof => {
                self.finalize(token, "peer closed");
            }
            Err(FrameError::Io(e)) => {
                self.finalize(token, &format!("read error: {e}"));
            }
            Err(FrameError::Decode(e)) => {
                self.fail_malformed(token, &e.to_string());
            }
        }
    }

    fn handle_writable(&mut self, token: Token) {
        self.try_flush(token);
    }

    /// Decode and dispatch one inbound frame.
    fn handle_frame(&mut self, token: Token, bytes: Vec<u8>) {
        // Frame size on the wire, for channel accounting.
        let frame_bytes = (FRAME_HEADER_SIZE + bytes.len()) as u64;

        let frame = match ControlFrame::decode(&bytes) {
            Ok(frame) => frame,
            Err(e) => {
                self.fail_malformed(token, &e.to_string());
                return;
            }
        };

        let (peer_id, state) = match self.conns.get(&token) {
            Some(conn) => (conn.peer_id(), conn.state()),
            None => return,
        };

        match state {
            ConnState::Greeting => self.handle_greeting(token, peer_id, frame),
            ConnState::Ready => self.handle_ready(token, peer_id, frame, bytes, frame_bytes),
            ConnState::Closing | ConnState::Dead => {}
        }
    }

    /// GREETING accepts exactly one HELLO.
    fn handle_greeting(&mut self, token: Token, peer_id: PeerId, frame: ControlFrame) {
        let ControlFrame::Hello { peer_name } = frame else {
            self.fail_malformed(token, "expected HELLO before any other frame");
            return;
        };

        if self.conns.len() > self.config.max_peers {
            warn!(peer_id, "peer limit reached, refusing HELLO");
            self.send_error(token, ErrorCode::Overload, "peer limit reached");
            self.begin_closing(token);
            return;
        }

        if let Some(conn) = self.conns.get_mut(&token) {
            conn.greet(peer_name.clone());
        }
        info!(peer_id, name = %peer_name, "peer greeted");
        self.send_to(
            token,
            &ControlFrame::Welcome {
                peer_id,
                server_version: env!("CARGO_PKG_VERSION").to_string(),
            },
        );
    }

    /// READY dispatch per control kind.
    fn handle_ready(
        &mut self,
        token: Token,
        peer_id: PeerId,
        frame: ControlFrame,
        raw: Vec<u8>,
        frame_bytes: u64,
    ) {
        match frame {
            ControlFrame::Hello { .. } => {
                self.fail_malformed(token, "duplicate HELLO");
            }

            ControlFrame::Publish { channel, type_tag } => {
                match self
                    .registry
                    .register(peer_id, &channel, &type_tag, PresenceRole::Publisher)
                {
                    Ok((channel_id, events)) => {
                        debug!(peer_id, channel = %channel, channel_id, "publisher registered");
                        self.send_to(token, &ControlFrame::PublishAck { channel_id });
                        self.emit_presence(events);
                    }
                    Err(e) => self.send_error(token, ErrorCode::TagMismatch, &e.to_string()),
                }
            }

            ControlFrame::Subscribe { channel, type_tag } => {
                match self
                    .registry
                    .register(peer_id, &channel, &type_tag, PresenceRole::Subscriber)
                {
                    Ok((channel_id, events)) => {
                        debug!(peer_id, channel = %channel, channel_id, "subscriber registered");
                        self.send_to(token, &ControlFrame::SubscribeAck { channel_id });
                        self.emit_presence(events);
                    }
                    Err(e) => self.send_error(token, ErrorCode::TagMismatch, &e.to_string()),
                }
            }

            ControlFrame::Unpublish { channel_id } => {
                let events = self
                    .registry
                    .unregister(peer_id, channel_id, PresenceRole::Publisher);
                self.emit_presence(events);
            }

            ControlFrame::Unsubscribe { channel_id } => {
                let events = self
                    .registry
                    .unregister(peer_id, channel_id, PresenceRole::Subscriber);
                self.emit_presence(events);
            }

            ControlFrame::Watch { channel_id } => {
                if let Err(e) = self.registry.watch(peer_id, channel_id) {
                    self.send_error(token, ErrorCode::UnknownChannel, &e.to_string());
                }
            }

            ControlFrame::Unwatch { channel_id } => {
                self.registry.unwatch(peer_id, channel_id);
            }

            ControlFrame::Data { channel_id, .. } => {
                match self.registry.deliver(peer_id, channel_id, frame_bytes) {
                    Ok(subscribers) => {
                        if subscribers.is_empty() {
                            return;
                        }
                        // Fan the original bytes out verbatim; only the
                        // outer length prefix is re-added.
                        let framed = FrameCodec::encode(&raw);
                        for subscriber in subscribers {
                            let Some(&sub_token) = self.peer_tokens.get(&subscriber) else {
                                continue;
                            };
                            let accepted = self
                                .conns
                                .get_mut(&sub_token)
                                .map(|c| c.enqueue(framed.clone()))
                                .unwrap_or(false);
                            if accepted {
                                self.try_flush(sub_token);
                            } else {
                                self.registry.record_drop(channel_id);
                            }
                        }
                    }
                    Err(e @ RegistryError::UnknownChannel(_)) => {
                        self.send_error(token, ErrorCode::UnknownChannel, &e.to_string());
                    }
                    Err(e @ RegistryError::NotPublisher { .. }) => {
                        self.send_error(token, ErrorCode::NotPublisher, &e.to_string());
                    }
                    Err(e) => {
                        self.send_error(token, ErrorCode::UnknownChannel, &e.to_string());
                    }
                }
            }

            ControlFrame::Ping { nonce } => {
                self.send_to(token, &ControlFrame::Pong { nonce });
            }

            ControlFrame::Pong { nonce } => {
                if let Some(conn) = self.conns.get_mut(&token) {
                    if !conn.note_pong(nonce) {
                        debug!(peer_id, nonce, "stale PONG ignored");
                    }
                }
            }

            ControlFrame::Error { code, text } => {
                warn!(peer_id, ?code, text = %text, "peer reported error");
            }

            // Server-originated kinds arriving from a client are ignored.
            ControlFrame::Welcome { .. }
            | ControlFrame::PublishAck { .. }
            | ControlFrame::SubscribeAck { .. }
            | ControlFrame::Presence { .. } => {
                debug!(peer_id, kind = frame.kind(), "unexpected frame ignored");
            }
        }
    }

    /// Encode, frame, and queue a control frame for one peer, then try an
    /// immediate flush (registrations are edge-triggered, so a later
    /// writable event only arrives after a WouldBlock).
    fn send_to(&mut self, token: Token, frame: &ControlFrame) {
        let framed = FrameCodec::encode(&frame.encode());
        let accepted = match self.conns.get_mut(&token) {
            Some(conn) => conn.enqueue(framed),
            None => return,
        };
        if accepted {
            self.try_flush(token);
        }
    }

    fn send_error(&mut self, token: Token, code: ErrorCode, text: &str) {
        debug!(?code, text, "sending error");
        self.send_to(
            token,
            &ControlFrame::Error {
                code,
                text: text.to_string(),
            },
        );
    }

    /// Deliver presence notifications to their watchers.
    fn emit_presence(&mut self, events: Vec<PresenceEvent>) {
        for event in events {
            let Some(&token) = self.peer_tokens.get(&event.watcher) else {
                continue;
            };
            self.send_to(
                token,
                &ControlFrame::Presence {
                    channel_id: event.channel_id,
                    peer_id: event.peer,
                    role: event.role,
                    joined: event.joined,
                },
            );
        }
    }

    fn try_flush(&mut self, token: Token) {
        let result = match self.conns.get_mut(&token) {
            Some(conn) => conn.flush(),
            None => return,
        };
        if let Err(e) = result {
            self.finalize(token, &format!("write error: {e}"));
        }
    }

    /// Protocol violation: advisory frame if the queue allows, then the
    /// connection is torn down.
    fn fail_malformed(&mut self, token: Token, text: &str) {
        warn!(text, "malformed frame");
        self.send_error(token, ErrorCode::Malformed, text);
        self.begin_closing(token);
    }

    fn begin_closing(&mut self, token: Token) {
        let deadline = Instant::now() + self.config.drain_timeout();
        if let Some(conn) = self.conns.get_mut(&token) {
            conn.begin_closing(deadline);
        }
        self.try_flush(token);
    }

    /// Walk deadlines: greeting timeouts, liveness probes, drained
    /// closers.
    fn sweep_timers(&mut self, now: Instant) {
        enum Action {
            Close(&'static str),
            Ping,
            Finalize,
        }

        let tokens: Vec<Token> = self.conns.keys().copied().collect();
        for token in tokens {
            let action = {
                let Some(conn) = self.conns.get(&token) else {
                    continue;
                };
                if conn.greeting_expired(now) {
                    Some(Action::Close("greeting timeout"))
                } else if conn.ping_expired(now) {
                    Some(Action::Close("liveness probe unanswered"))
                } else if conn.needs_ping(now, self.config.ping_idle()) {
                    Some(Action::Ping)
                } else if conn.closing_finished(now) {
                    Some(Action::Finalize)
                } else {
                    None
                }
            };

            match action {
                Some(Action::Close(reason)) => {
                    debug!(reason, "closing connection");
                    self.begin_closing(token);
                }
                Some(Action::Ping) => {
                    let nonce = self.next_ping_nonce;
                    self.next_ping_nonce += 1;
                    self.send_to(token, &ControlFrame::Ping { nonce });
                    if let Some(conn) = self.conns.get_mut(&token) {
                        conn.note_ping(nonce, now + self.config.pong_timeout());
                    }
                }
                Some(Action::Finalize) => self.finalize(token, "drained"),
                None => {}
            }
        }
    }

    /// Release a connection: forget the peer everywhere, notify watchers,
    /// deregister the stream. The peer id is never reused.
    fn finalize(&mut self, token: Token, reason: &str) {
        let Some(mut conn) = self.conns.remove(&token) else {
            return;
        };
        conn.mark_dead();
        let peer_id = conn.peer_id();
        let _ = self.poll.registry().deregister(conn.stream_mut());
        self.peer_tokens.remove(&peer_id);
        debug!(peer_id, reason, "connection released");

        let events = self.registry.forget_peer(peer_id);
        self.emit_presence(events);
    }

    /// Shutdown path: stop accepting, drain everyone briefly, close.
    fn drain_and_close(&mut self) {
        let deadline = Instant::now() + self.config.drain_timeout();
        let tokens: Vec<Token> = self.conns.keys().copied().collect();
        for token in tokens {
            if let Some(conn) = self.conns.get_mut(&token) {
                conn.begin_closing(deadline);
            }
            self.try_flush(token);
        }

        while !self.conns.is_empty() && Instant::now() < deadline {
            if self
                .poll
                .poll(&mut self.events, Some(Duration::from_millis(20)))
                .is_err()
            {
                break;
            }
            let writable: Vec<Token> = self
                .events
                .iter()
                .filter(|ev| ev.is_writable())
                .map(|ev| ev.token())
                .collect();
            for token in writable {
                self.try_flush(token);
            }
            let now = Instant::now();
            let finished: Vec<Token> = self
                .conns
                .iter()
                .filter(|(_, c)| c.closing_finished(now))
                .map(|(t, _)| *t)
                .collect();
            for token in finished {
                self.finalize(token, "shutdown");
            }
        }

        let tokens: Vec<Token> = self.conns.keys().copied().collect();
        for token in tokens {
            self.finalize(token, "shutdown");
        }
        let _ = std::fs::remove_file(&self.config.socket_path);
    }

    /// Periodic statistics summary, after the original daemon's per-round
    /// report.
    fn stats_tick(&mut self, now: Instant) {
        if now.duration_since(self.last_stats) < self.config.stats_interval() {
            return;
        }
        self.last_stats = now;

        let mut frames_in = 0u64;
        let mut bytes_in = 0u64;
        let mut dropped = 0u64;
        for channel in self.registry.channels() {
            let stats = channel.stats();
            frames_in += stats.frames_in;
            bytes_in += stats.bytes_in;
            dropped += stats.frames_dropped;
        }
        debug!(
            peers = self.conns.len(),
            channels = self.registry.channel_count(),
            frames_in,
            bytes_in,
            dropped,
            "daemon statistics"
        );
    }
}

impl Drop for Router {
    fn drop(&mut self) {
        let _ = std::fs::remove_file(&self.config.socket_path);
    }
}
