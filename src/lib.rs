// Copyright (C) 2026 tracing-scribe developers
//
// This file is part of tracing-scribe.
//
// tracing-scribe is free software: you can redistribute it and/or modify it under the terms of the
// GNU General Public License as published by the Free Software Foundation, either version 3 of the
// License, or (at your option) any later version.
//
// tracing-scribe is distributed in the hope that it will be useful, but WITHOUT ANY WARRANTY;
// without even the implied warranty of MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See
// the GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License along with tracing-scribe.  If
// not, see <http://www.gnu.org/licenses/>.

//! A [`tracing-subscriber`] [`Layer`] implementation that forwards [`tracing`] [`Event`]s to a
//! [Scribe] log collector, with an optional durable on-disk buffer for entries the collector
//! couldn't take.
//!
//! [`tracing-subscriber`]: https://docs.rs/tracing-subscriber/latest/tracing_subscriber/index.html
//! [`Layer`]: https://docs.rs/tracing-subscriber/latest/tracing_subscriber/layer/trait.Layer.html
//! [`tracing`]: https://docs.rs/tracing/0.1.35/tracing/index.html
//! [`Event`]: https://docs.rs/tracing/0.1.35/tracing/struct.Event.html
//! [Scribe]: https://github.com/facebookarchive/scribe
//!
//! # Introduction
//!
//! Each event becomes one Scribe `LogEntry`: a *category* (rendered from a `%(name)s`-style
//! template over the record's attributes, `"%(hostname)s-%(loggername)s"` by default) and a
//! newline-terminated *message*, submitted over Thrift binary protocol (framed or unframed TCP,
//! or HTTP), one entry at a time.
//!
//! Collectors go away; that is the one thing one may rely on. When a delivery attempt fails at
//! the transport level, the handler can park the entry in a durable queue: a crash-safe,
//! append-only file keyed by a strictly increasing sequence number. On the next emit it
//! drains the backlog in order *before* anything newer leaves the process, removing each entry
//! only after the collector confirmed it. Delivery is thus at-least-once and order-preserving,
//! across process restarts included. There is no background retry: the backlog moves only when
//! the application logs.
//!
//! Failed deliveries never panic the caller and never error out of the [`tracing`] machinery;
//! they are reported, once per record, through a configurable error handler.
//!
//! # Usage
//!
//! ```no_run
//! use tracing::info;
//! use tracing_scribe::layer::ScribeLayer;
//! use tracing_subscriber::layer::SubscriberExt; // Needed to get `with()`
//! use tracing_subscriber::registry::Registry;
//!
//! let layer = ScribeLayer::builder()
//!     .host("scribe.internal")
//!     .port(1463)
//!     .buffer_path("/var/spool/myapp/scribe-buffer")
//!     .build()
//!     .unwrap();
//! let subscriber = Registry::default().with(layer);
//! let _guard = tracing::subscriber::set_default(subscriber);
//!
//! info!("Hello, world!");
//! ```
//!
//! Misconfiguration (an HTTP transport without a URI, say) fails `build()` immediately;
//! nothing else ever surfaces as anything but an error-handler invocation.

pub mod category;
pub mod engine;
pub mod error;
pub mod layer;
pub mod queue;
pub mod record;
pub mod transport;
pub mod wire;
