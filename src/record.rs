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

//! Log record primitives.
//!
//! [`Record`] is the handler's view of one incoming log record: the rendered message text plus the
//! handful of named attributes the category template may reference. The [`Layer`] implementation
//! builds one from each [`tracing`] [`Event`]; tests (or alternative hosts) may build them
//! directly.
//!
//! [`Layer`]: https://docs.rs/tracing-subscriber/latest/tracing_subscriber/layer/trait.Layer.html
//! [`Event`]: https://docs.rs/tracing/0.1.35/tracing/struct.Event.html
//!
//! [`LogEntry`] is the wire-ready form: a category plus a newline-terminated message, matching the
//! `LogEntry` struct of the Scribe Thrift IDL. It is also what gets persisted in the durable
//! queue, hence the [serde] derives.
//!
//! [serde]: https://docs.rs/serde

use chrono::prelude::*;
use serde::{Deserialize, Serialize};

/// One incoming log record, as seen by the delivery engine.
#[derive(Clone, Debug)]
pub struct Record {
    /// The rendered message text; becomes the wire message body (newline-terminated)
    pub message: String,
    /// The module in which the event originated
    pub module: String,
    /// Upper-case verbosity level name ("TRACE" through "ERROR")
    pub levelname: String,
    /// The logger (in [`tracing`] terms, the target) that produced the record
    pub loggername: String,
    /// The host process' name, if it could be determined
    pub process_name: Option<String>,
    /// When the record was observed
    pub timestamp: DateTime<Utc>,
}

/// A category/message pair ready for submission to the collector.
///
/// Immutable once built. The message always ends in a newline: one is appended iff the raw
/// message does not already end with one (this includes messages that *start* with a newline
/// but do not end with one).
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogEntry {
    category: String,
    message: String,
}

impl LogEntry {
    /// Build an entry from a resolved category and a raw message, applying the newline policy.
    pub fn new<S: Into<String>>(category: S, message: &str) -> LogEntry {
        let message = if message.ends_with('\n') {
            message.to_string()
        } else {
            let mut m = String::with_capacity(message.len() + 1);
            m.push_str(message);
            m.push('\n');
            m
        };
        LogEntry {
            category: category.into(),
            message,
        }
    }
    pub fn category(&self) -> &str {
        &self.category
    }
    pub fn message(&self) -> &str {
        &self.message
    }
}
