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

//! [tracing-scribe](crate) errors

use backtrace::Backtrace;

/// [tracing-scribe](crate) error type
///
/// [tracing-scribe](crate) eschews libraries like [thiserror], [anyhow] & [Snafu] in favor of a
/// straightforward enumeration with match arms chosen on the basis of what the caller will need to
/// respond: configuration faults are raised at construction time, everything else is funnelled to
/// the handler's error path.
///
/// [thiserror]: https://docs.rs/thiserror
/// [anyhow]: https://docs.rs/anyhow
/// [Snafu]: https://docs.rs/snafu/latest/snafu
#[non_exhaustive]
pub enum Error {
    /// Invalid construction-time configuration (e.g. an HTTP transport with no URI)
    Config { detail: String, back: Backtrace },
    /// `emit` was invoked on a handler with no configured transport
    NoTransport { back: Backtrace },
    /// The category template was malformed, or referenced an unknown substitution key
    Format { detail: String, back: Backtrace },
    /// An Event had no message field
    NoMessageField { name: &'static str, back: Backtrace },
    /// Connection-level fault while opening the session or submitting an entry
    Transport {
        source: Box<dyn std::error::Error + Send + Sync + 'static>,
        back: Backtrace,
    },
    /// The collector accepted the call but returned a non-OK result code
    RemoteReject { code: i32, back: Backtrace },
    /// The durable queue's backing file could not be opened, read or written
    QueueOpen {
        path: std::path::PathBuf,
        source: Box<dyn std::error::Error + Send + Sync + 'static>,
        back: Backtrace,
    },
    /// A durable queue key was absent
    QueueKey { key: u64, back: Backtrace },
}

impl std::fmt::Display for Error {
    // `Error` is non-exhaustive so that adding variants won't be a breaking change to our
    // callers. That means the compiler won't catch us if we miss a variant here, so we
    // always include a `_` arm.
    #[allow(unreachable_patterns)]
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            Error::Config { detail, .. } => write!(f, "Invalid configuration: {}", detail),
            Error::NoTransport { .. } => write!(f, "No transport defined"),
            Error::Format { detail, .. } => {
                write!(f, "While formatting the category, got {}", detail)
            }
            Error::NoMessageField { name, .. } => write!(
                f,
                "Event '{}' had no message field, and so was not forwarded to the collector",
                name
            ),
            Error::Transport { source, .. } => write!(f, "Transport error: {}", source),
            Error::RemoteReject { code, .. } => write!(
                f,
                "The collector rejected the entry with result code {}",
                code
            ),
            Error::QueueOpen { path, source, .. } => write!(
                f,
                "While operating on the durable queue at {:?}, got {}",
                path, source
            ),
            Error::QueueKey { key, .. } => {
                write!(f, "No record with key {} in the durable queue", key)
            }
            _ => write!(f, "Other tracing-scribe error"),
        }
    }
}

impl std::fmt::Debug for Error {
    #[allow(unreachable_patterns)]
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            Error::Config { detail: _, back } => write!(f, "{}\n{:?}", self, back),
            Error::NoTransport { back } => write!(f, "{}\n{:?}", self, back),
            Error::Format { detail: _, back } => write!(f, "{}\n{:?}", self, back),
            Error::NoMessageField { name: _, back } => write!(f, "{}\n{:?}", self, back),
            Error::Transport { source: _, back } => write!(f, "{}\n{:?}", self, back),
            Error::RemoteReject { code: _, back } => write!(f, "{}\n{:?}", self, back),
            Error::QueueOpen { back, .. } => write!(f, "{}\n{:?}", self, back),
            Error::QueueKey { key: _, back } => write!(f, "{}\n{:?}", self, back),
            err => write!(f, "tracing-scribe error: {}", err),
        }
    }
}

impl std::error::Error for Error {}

pub type Result<T> = std::result::Result<T, Error>;
