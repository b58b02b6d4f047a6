// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! routio message router.
//!
//! An always-on daemon that multiplexes typed messages between untrusted
//! client processes on the same machine over a Unix stream socket. Clients
//! greet with `HELLO`, register as publishers, subscribers, or watchers on
//! named channels, and exchange length-prefixed data frames; the router
//! fans every published frame out to the channel's subscribers in FIFO
//! order per publisher.
//!
//! The whole router is single-threaded and cooperative: one `mio` poll
//! loop owns every connection, the channel registry, and all outbound
//! queues, so no locking is needed anywhere.
//!
//! # Quick start
//!
//! ```bash
//! # Run on the default socket (/tmp/routio.sock)
//! routio-router
//!
//! # Custom socket and verbose logging
//! routio-router --socket /run/user/1000/bus.sock --log-level debug
//! ```

pub mod config;
pub mod server;

pub use config::{ConfigError, RouterConfig};
pub use server::{Router, RouterHandle, ServerError};
