// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! End-to-end router scenarios against a live daemon on a temporary
//! socket.
//!
//! The router is driven deterministically from the test thread through
//! `poll_once`, so registry state can be inspected between steps.

use std::io::Write;
use std::os::unix::net::UnixStream;
use std::path::Path;
use std::time::Duration;

use routio_router::server::{ControlFrame, ErrorCode, PresenceRole, Router};
use routio_router::RouterConfig;
use routio_wire::{FrameCodec, FrameError, FRAME_HEADER_SIZE};

const TAG: &str = "6dd24e2eb2f4b16d9b3a0f34b52d1a8c";

fn test_router(tweak: impl FnOnce(&mut RouterConfig)) -> (Router, tempfile::TempDir) {
    let dir = tempfile::tempdir().expect("tempdir");
    let mut config = RouterConfig {
        socket_path: dir.path().join("routio.sock"),
        ..Default::default()
    };
    tweak(&mut config);
    let router = Router::bind(config).expect("bind router");
    (router, dir)
}

fn pump(router: &mut Router, iterations: usize) {
    for _ in 0..iterations {
        router.poll_once(Duration::from_millis(1)).expect("poll");
    }
}

struct Client {
    stream: UnixStream,
    codec: FrameCodec,
}

impl Client {
    fn connect(router: &mut Router, socket: &Path) -> Self {
        let stream = UnixStream::connect(socket).expect("connect");
        stream.set_nonblocking(true).expect("nonblocking");
        pump(router, 2);
        Self {
            stream,
            codec: FrameCodec::with_default_max(),
        }
    }

    fn send(&mut self, router: &mut Router, frame: &ControlFrame) {
        self.send_raw(router, &frame.encode());
    }

    fn send_raw(&mut self, router: &mut Router, body: &[u8]) {
        let framed = FrameCodec::encode(body);
        let mut rest = framed.as_slice();
        while !rest.is_empty() {
            match self.stream.write(rest) {
                Ok(n) => rest = &rest[n..],
                Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => pump(router, 1),
                Err(e) => panic!("client write: {e}"),
            }
        }
        pump(router, 2);
    }

    fn try_recv(&mut self) -> Option<ControlFrame> {
        match self.codec.decode(&mut self.stream) {
            Ok(Some(body)) => Some(ControlFrame::decode(&body).expect("decode frame")),
            Ok(None) => None,
            Err(e) => panic!("client read: {e}"),
        }
    }

    fn recv(&mut self, router: &mut Router) -> ControlFrame {
        for _ in 0..500 {
            if let Some(frame) = self.try_recv() {
                return frame;
            }
            pump(router, 1);
        }
        panic!("no frame arrived");
    }

    /// True once the router closed this connection.
    fn closed(&mut self, router: &mut Router) -> bool {
        for _ in 0..500 {
            match self.codec.decode(&mut self.stream) {
                Ok(Some(_)) => continue, // discard leftovers
                Ok(None) => pump(router, 1),
                Err(FrameError::Io(e))
                    if e.kind() == std::io::ErrorKind::UnexpectedEof =>
                {
                    return true;
                }
                Err(_) => return true,
            }
        }
        false
    }

    fn hello(&mut self, router: &mut Router, name: &str) -> u32 {
        self.send(
            router,
            &ControlFrame::Hello {
                peer_name: name.into(),
            },
        );
        match self.recv(router) {
            ControlFrame::Welcome { peer_id, .. } => peer_id,
            other => panic!("expected WELCOME, got {other:?}"),
        }
    }

    fn publish(&mut self, router: &mut Router, channel: &str, tag: &str) -> u32 {
        self.send(
            router,
            &ControlFrame::Publish {
                channel: channel.into(),
                type_tag: tag.into(),
            },
        );
        match self.recv(router) {
            ControlFrame::PublishAck { channel_id } => channel_id,
            other => panic!("expected PUBLISH_ACK, got {other:?}"),
        }
    }

    fn subscribe(&mut self, router: &mut Router, channel: &str, tag: &str) -> u32 {
        self.send(
            router,
            &ControlFrame::Subscribe {
                channel: channel.into(),
                type_tag: tag.into(),
            },
        );
        match self.recv(router) {
            ControlFrame::SubscribeAck { channel_id } => channel_id,
            other => panic!("expected SUBSCRIBE_ACK, got {other:?}"),
        }
    }
}

#[test]
fn test_solo_publish_before_subscribe() {
    let (mut router, dir) = test_router(|_| {});
    let socket = dir.path().join("routio.sock");

    let mut a = Client::connect(&mut router, &socket);
    assert_eq!(a.hello(&mut router, "producer"), 1);
    assert_eq!(a.publish(&mut router, "topic", TAG), 1);

    a.send(
        &mut router,
        &ControlFrame::Data {
            channel_id: 1,
            payload: b"hi".to_vec(),
        },
    );
    pump(&mut router, 5);

    // No delivery, no error.
    assert!(a.try_recv().is_none());

    // The channel's inbound byte counter saw the whole frame.
    let channel = router.registry().channel_by_name("topic").unwrap();
    let body_len: usize = 1 + 4 + 4 + 2; // kind + channel_id + payload_len + "hi"
    assert_eq!(channel.stats().frames_in, 1);
    assert_eq!(channel.stats().bytes_in, (FRAME_HEADER_SIZE + body_len) as u64);
}

#[test]
fn test_publish_subscribe_delivery() {
    let (mut router, dir) = test_router(|_| {});
    let socket = dir.path().join("routio.sock");

    let mut a = Client::connect(&mut router, &socket);
    a.hello(&mut router, "producer");
    let channel_id = a.publish(&mut router, "topic", TAG);

    let mut b = Client::connect(&mut router, &socket);
    b.hello(&mut router, "consumer");
    assert_eq!(b.subscribe(&mut router, "topic", TAG), channel_id);

    a.send(
        &mut router,
        &ControlFrame::Data {
            channel_id,
            payload: b"hi".to_vec(),
        },
    );

    assert_eq!(
        b.recv(&mut router),
        ControlFrame::Data {
            channel_id,
            payload: b"hi".to_vec(),
        }
    );
    // Exactly one delivery.
    pump(&mut router, 3);
    assert!(b.try_recv().is_none());
}

#[test]
fn test_fifo_order_per_publisher() {
    let (mut router, dir) = test_router(|_| {});
    let socket = dir.path().join("routio.sock");

    let mut a = Client::connect(&mut router, &socket);
    a.hello(&mut router, "producer");
    let channel_id = a.publish(&mut router, "topic", TAG);

    let mut b = Client::connect(&mut router, &socket);
    b.hello(&mut router, "consumer");
    b.subscribe(&mut router, "topic", TAG);

    for i in 0u8..16 {
        a.send(
            &mut router,
            &ControlFrame::Data {
                channel_id,
                payload: vec![i],
            },
        );
    }
    for i in 0u8..16 {
        match b.recv(&mut router) {
            ControlFrame::Data { payload, .. } => assert_eq!(payload, vec![i]),
            other => panic!("expected DATA, got {other:?}"),
        }
    }
}

#[test]
fn test_tag_mismatch_is_advisory() {
    let (mut router, dir) = test_router(|_| {});
    let socket = dir.path().join("routio.sock");

    let mut a = Client::connect(&mut router, &socket);
    a.hello(&mut router, "producer");
    a.publish(&mut router, "topic", TAG);

    let mut b = Client::connect(&mut router, &socket);
    let b_id = b.hello(&mut router, "consumer");
    b.send(
        &mut router,
        &ControlFrame::Subscribe {
            channel: "topic".into(),
            type_tag: "f".repeat(32),
        },
    );
    match b.recv(&mut router) {
        ControlFrame::Error { code, .. } => assert_eq!(code, ErrorCode::TagMismatch),
        other => panic!("expected ERROR, got {other:?}"),
    }

    // No subscription was recorded and the connection is intact.
    let channel = router.registry().channel_by_name("topic").unwrap();
    assert!(!channel.subscribers().contains(&b_id));
    b.send(&mut router, &ControlFrame::Ping { nonce: 42 });
    assert_eq!(b.recv(&mut router), ControlFrame::Pong { nonce: 42 });
}

#[test]
fn test_watcher_sees_presence() {
    let (mut router, dir) = test_router(|_| {});
    let socket = dir.path().join("routio.sock");

    let mut w = Client::connect(&mut router, &socket);
    w.hello(&mut router, "watcher");
    // Discover the channel id, then trade the subscription for a watch.
    let channel_id = w.subscribe(&mut router, "topic", TAG);
    w.send(&mut router, &ControlFrame::Watch { channel_id });
    w.send(&mut router, &ControlFrame::Unsubscribe { channel_id });
    pump(&mut router, 3);

    let mut a = Client::connect(&mut router, &socket);
    let a_id = a.hello(&mut router, "producer");
    a.publish(&mut router, "topic", TAG);

    assert_eq!(
        w.recv(&mut router),
        ControlFrame::Presence {
            channel_id,
            peer_id: a_id,
            role: PresenceRole::Publisher,
            joined: true,
        }
    );

    drop(a);
    assert_eq!(
        w.recv(&mut router),
        ControlFrame::Presence {
            channel_id,
            peer_id: a_id,
            role: PresenceRole::Publisher,
            joined: false,
        }
    );
}

#[test]
fn test_slow_consumer_drops_without_error() {
    let (mut router, dir) = test_router(|config| {
        config.max_outbound_bytes = 8 * 1024;
    });
    let socket = dir.path().join("routio.sock");

    let mut a = Client::connect(&mut router, &socket);
    a.hello(&mut router, "firehose");
    let channel_id = a.publish(&mut router, "bulk", TAG);

    let mut s = Client::connect(&mut router, &socket);
    s.hello(&mut router, "sleeper");
    s.subscribe(&mut router, "bulk", TAG);

    // The subscriber stops reading; the publisher keeps going.
    let payload = vec![0x5a; 1024];
    let frames = 2048;
    for _ in 0..frames {
        a.send(
            &mut router,
            &ControlFrame::Data {
                channel_id,
                payload: payload.clone(),
            },
        );
    }
    pump(&mut router, 10);

    let stats = router.registry().channel(channel_id).unwrap().stats();
    // Every frame was accepted from the publisher...
    assert_eq!(stats.frames_in, frames);
    // ...but the subscriber's queue saturated and the excess was dropped.
    assert!(stats.frames_dropped > 0, "expected drops, got none");

    // The publisher never saw an error and is still live.
    assert!(a.try_recv().is_none());
    a.send(&mut router, &ControlFrame::Ping { nonce: 7 });
    assert_eq!(a.recv(&mut router), ControlFrame::Pong { nonce: 7 });
}

#[test]
fn test_peer_ids_strictly_increasing() {
    let (mut router, dir) = test_router(|_| {});
    let socket = dir.path().join("routio.sock");

    let mut a = Client::connect(&mut router, &socket);
    assert_eq!(a.hello(&mut router, "a"), 1);
    let mut b = Client::connect(&mut router, &socket);
    assert_eq!(b.hello(&mut router, "b"), 2);

    drop(a);
    pump(&mut router, 5);

    // Ids are never reused, even after a disconnect.
    let mut c = Client::connect(&mut router, &socket);
    assert_eq!(c.hello(&mut router, "c"), 3);
}

#[test]
fn test_channel_collected_when_empty() {
    let (mut router, dir) = test_router(|_| {});
    let socket = dir.path().join("routio.sock");

    let mut a = Client::connect(&mut router, &socket);
    a.hello(&mut router, "only");
    let channel_id = a.publish(&mut router, "ephemeral", TAG);
    assert_eq!(router.registry().channel_count(), 1);

    a.send(&mut router, &ControlFrame::Unpublish { channel_id });
    pump(&mut router, 3);
    assert_eq!(router.registry().channel_count(), 0);
}

#[test]
fn test_data_on_unknown_channel() {
    let (mut router, dir) = test_router(|_| {});
    let socket = dir.path().join("routio.sock");

    let mut a = Client::connect(&mut router, &socket);
    a.hello(&mut router, "lost");
    a.send(
        &mut router,
        &ControlFrame::Data {
            channel_id: 99,
            payload: b"void".to_vec(),
        },
    );
    match a.recv(&mut router) {
        ControlFrame::Error { code, .. } => assert_eq!(code, ErrorCode::UnknownChannel),
        other => panic!("expected ERROR, got {other:?}"),
    }
}

#[test]
fn test_data_from_non_publisher() {
    let (mut router, dir) = test_router(|_| {});
    let socket = dir.path().join("routio.sock");

    let mut a = Client::connect(&mut router, &socket);
    a.hello(&mut router, "producer");
    let channel_id = a.publish(&mut router, "topic", TAG);

    let mut b = Client::connect(&mut router, &socket);
    b.hello(&mut router, "impostor");
    b.subscribe(&mut router, "topic", TAG);
    b.send(
        &mut router,
        &ControlFrame::Data {
            channel_id,
            payload: b"fake".to_vec(),
        },
    );
    match b.recv(&mut router) {
        ControlFrame::Error { code, .. } => assert_eq!(code, ErrorCode::NotPublisher),
        other => panic!("expected ERROR, got {other:?}"),
    }
    // Nothing was forwarded.
    assert_eq!(
        router
            .registry()
            .channel(channel_id)
            .unwrap()
            .stats()
            .frames_in,
        0
    );
}

#[test]
fn test_malformed_frame_is_terminal() {
    let (mut router, dir) = test_router(|_| {});
    let socket = dir.path().join("routio.sock");

    let mut a = Client::connect(&mut router, &socket);
    a.hello(&mut router, "sloppy");
    a.send_raw(&mut router, &[0xf0, 0x01, 0x02]);

    match a.recv(&mut router) {
        ControlFrame::Error { code, .. } => assert_eq!(code, ErrorCode::Malformed),
        other => panic!("expected ERROR, got {other:?}"),
    }
    assert!(a.closed(&mut router));
}

#[test]
fn test_greeting_timeout() {
    let (mut router, dir) = test_router(|config| {
        config.greeting_timeout_ms = 40;
    });
    let socket = dir.path().join("routio.sock");

    let mut quiet = Client::connect(&mut router, &socket);
    for _ in 0..10 {
        std::thread::sleep(Duration::from_millis(10));
        pump(&mut router, 1);
    }
    assert!(quiet.closed(&mut router));
}

#[test]
fn test_liveness_probe_and_disconnect() {
    let (mut router, dir) = test_router(|config| {
        config.ping_idle_ms = 40;
        config.pong_timeout_ms = 60;
    });
    let socket = dir.path().join("routio.sock");

    let mut a = Client::connect(&mut router, &socket);
    a.hello(&mut router, "idler");

    // Idle long enough to be probed; answer the probe and survive.
    let mut probed_nonce = None;
    for _ in 0..30 {
        std::thread::sleep(Duration::from_millis(5));
        pump(&mut router, 1);
        if let Some(ControlFrame::Ping { nonce }) = a.try_recv() {
            probed_nonce = Some(nonce);
            break;
        }
    }
    let nonce = probed_nonce.expect("router never probed");
    a.send(&mut router, &ControlFrame::Pong { nonce });
    pump(&mut router, 2);
    assert_eq!(router.peer_count(), 1);

    // Ignore the next probe; the router gives up after the grace period.
    for _ in 0..60 {
        std::thread::sleep(Duration::from_millis(5));
        pump(&mut router, 1);
        if router.peer_count() == 0 {
            break;
        }
    }
    assert_eq!(router.peer_count(), 0);
    assert!(a.closed(&mut router));
}

#[test]
fn test_hello_refused_over_peer_limit() {
    let (mut router, dir) = test_router(|config| {
        config.max_peers = 1;
    });
    let socket = dir.path().join("routio.sock");

    let mut a = Client::connect(&mut router, &socket);
    a.hello(&mut router, "first");

    let mut b = Client::connect(&mut router, &socket);
    b.send(
        &mut router,
        &ControlFrame::Hello {
            peer_name: "surplus".into(),
        },
    );
    match b.recv(&mut router) {
        ControlFrame::Error { code, .. } => assert_eq!(code, ErrorCode::Overload),
        other => panic!("expected ERROR, got {other:?}"),
    }
    assert!(b.closed(&mut router));

    // The first peer is unaffected.
    a.send(&mut router, &ControlFrame::Ping { nonce: 1 });
    assert_eq!(a.recv(&mut router), ControlFrame::Pong { nonce: 1 });
}
