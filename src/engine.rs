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

//! The delivery engine: drain-then-send with at-least-once, order-preserving semantics.
//!
//! [`DeliveryEngine::emit`] is the heart of the handler. For each incoming record it formats a
//! wire entry, opens a fresh transport session, and, when a durable queue is configured,
//! enqueues the new entry and then walks *every* pending record in ascending key order,
//! dequeueing each only after the collector confirmed it. A transport fault leaves everything
//! still pending on disk (the new entry included), to be drained on the next `emit`; there is no
//! background retry timer, so the backlog shrinks only when the application logs again.
//!
//! Failure classification:
//!
//! - transport faults (connect refused, reset, protocol damage) are recoverable: the entry is
//!   durably buffered (when buffering is enabled) and the error goes to the record-level error
//!   path;
//! - an explicit non-OK result code from the collector is a
//!   [`RemoteReject`](crate::error::Error::RemoteReject); the rejected record stays queued and the
//!   drain stops so ordering is preserved;
//! - durable-queue faults are surfaced on the same error path but as their own variants, since
//!   they mean the durability guarantee itself is compromised; they are never silently
//!   swallowed.
//!
//! Without a queue, a failed record is simply dropped after the error path runs: no retry is
//! possible without persistence.
//!
//! The engine is single-threaded by design; the [`Layer`](crate::layer::ScribeLayer) serializes
//! calls into it with the handler lock.

use crate::{
    category::CategoryFormatter,
    error::{Error, Result},
    queue::DurableQueue,
    record::{LogEntry, Record},
    transport::{Transport, TransportConfig},
};

use backtrace::Backtrace;

use std::path::{Path, PathBuf};

/// The orchestrator for one handler's deliveries.
pub struct DeliveryEngine {
    formatter: CategoryFormatter,
    transport: Option<Box<dyn Transport>>,
    buffer: Option<PathBuf>,
}

impl DeliveryEngine {
    pub fn new(
        formatter: CategoryFormatter,
        transport: Option<Box<dyn Transport>>,
        buffer: Option<PathBuf>,
    ) -> DeliveryEngine {
        DeliveryEngine {
            formatter,
            transport,
            buffer,
        }
    }

    /// Build an engine whose transport comes from `config`; configuration faults surface here,
    /// before any network activity.
    pub fn from_config(
        formatter: CategoryFormatter,
        config: &TransportConfig,
        buffer: Option<PathBuf>,
    ) -> Result<DeliveryEngine> {
        Ok(DeliveryEngine::new(formatter, config.build()?, buffer))
    }

    /// Replace the transport from a fresh configuration, synchronously.
    ///
    /// On a configuration fault nothing changes: the engine keeps its current transport and the
    /// caller gets the error.
    pub fn reconfigure(&mut self, config: &TransportConfig) -> Result<()> {
        self.transport = config.build()?;
        Ok(())
    }

    /// Deliver one record, draining any backlog first.
    ///
    /// The transport session and the queue handle are both opened and closed within this call,
    /// on every path.
    pub fn emit(&mut self, record: &Record) -> Result<()> {
        let transport = match self.transport.as_mut() {
            Some(transport) => transport,
            None => {
                return Err(Error::NoTransport {
                    back: Backtrace::new(),
                })
            }
        };
        let entry = self.formatter.entry(record)?;

        if let Err(err) = transport.open() {
            transport.close();
            // The entry was never part of a drain, so park it now (idempotent with respect to
            // the drain's own enqueue, which never ran).
            buffer_unsent(self.buffer.as_deref(), &entry)?;
            return Err(err);
        }
        let outcome = deliver(&mut **transport, self.buffer.as_deref(), &entry);
        transport.close();
        outcome
    }
}

fn reject(code: crate::wire::ResultCode) -> Error {
    Error::RemoteReject {
        code: code.as_i32(),
        back: Backtrace::new(),
    }
}

fn deliver(
    transport: &mut dyn Transport,
    buffer: Option<&Path>,
    entry: &LogEntry,
) -> Result<()> {
    let path = match buffer {
        None => {
            // No persistence configured: one shot, no retry.
            let code = transport.submit(entry)?;
            return if code.is_ok() { Ok(()) } else { Err(reject(code)) };
        }
        Some(path) => path,
    };
    let mut queue = DurableQueue::open(path)?;
    let outcome = drain(transport, &mut queue, entry);
    let closed = queue.close();
    outcome.and(closed)
}

/// Enqueue the new entry, then deliver the whole backlog in key order, dequeueing each record
/// only after the collector confirmed it.
fn drain(transport: &mut dyn Transport, queue: &mut DurableQueue, entry: &LogEntry) -> Result<()> {
    queue.enqueue(entry)?;
    for key in queue.keys() {
        let pending = queue.get(key)?;
        let code = transport.submit(&pending)?;
        if !code.is_ok() {
            return Err(reject(code));
        }
        queue.dequeue(key)?;
    }
    Ok(())
}

fn buffer_unsent(buffer: Option<&Path>, entry: &LogEntry) -> Result<()> {
    if let Some(path) = buffer {
        let mut queue = DurableQueue::open(path)?;
        queue.enqueue(entry)?;
        queue.close()?;
    }
    Ok(())
}
