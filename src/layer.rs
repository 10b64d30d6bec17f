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

//! [tracing-scribe](crate)'s [`Layer`] implementation.
//!
//! [`Layer`]: https://docs.rs/tracing-subscriber/latest/tracing_subscriber/layer/trait.Layer.html
//!
//! [`ScribeLayer`] is the host-framework face of the handler: it turns each [`tracing`] [`Event`]
//! into a [`Record`] and hands it to the [`DeliveryEngine`]. Calls into the engine are serialized
//! with an internal lock (the moral equivalent of the handler lock a logging framework would
//! hold), and no failure ever propagates out of `on_event`: every fault is routed exactly once to
//! the configured error handler, which by default writes to standard error. Re-entering the
//! subscriber from inside the layer would recurse, so the layer never logs through [`tracing`]
//! itself.
//!
//! [`Event`]: https://docs.rs/tracing/0.1.35/tracing/struct.Event.html
//!
//! Construction goes through [`ScribeLayer::builder`]; misconfiguration (an HTTP transport with
//! no URI, say) fails the build synchronously, before any network activity.

use crate::{
    category::{CategoryFormatter, HostnameSource},
    engine::DeliveryEngine,
    error::{Error, Result},
    record::Record,
    transport::{TransportConfig, TransportKind},
};

use backtrace::Backtrace;
use chrono::prelude::*;
use tracing::Event;
use tracing_subscriber::layer::Context;

use std::{
    path::PathBuf,
    sync::Mutex,
};

/// Invoked once per record whose delivery failed.
pub type ErrorHandler = Box<dyn Fn(&Error) + Send + Sync>;

fn default_error_handler(err: &Error) {
    eprintln!("tracing-scribe: {}", err);
}

fn level_name(level: &tracing::Level) -> &'static str {
    match level {
        &tracing::Level::TRACE => "TRACE",
        &tracing::Level::DEBUG => "DEBUG",
        &tracing::Level::INFO => "INFO",
        &tracing::Level::WARN => "WARN",
        &tracing::Level::ERROR => "ERROR",
    }
}

fn default_process_name() -> Option<String> {
    std::env::current_exe()
        .ok()
        .and_then(|path| path.file_name().map(|name| name.to_string_lossy().into_owned()))
}

struct MessageEventVisitor {
    message: Option<String>,
}

impl tracing::field::Visit for MessageEventVisitor {
    fn record_debug(&mut self, field: &tracing::field::Field, value: &dyn std::fmt::Debug) {
        if field.name() == "message" {
            // Only a `Debug` implementation is available, but the tracing macros pre-format the
            // message field into a `std::fmt::Arguments`, which debug-prints without enclosing
            // quotes.
            self.message = Some(format!("{:?}", value));
        }
    }
}

////////////////////////////////////////////////////////////////////////////////////////////////////
//                                       struct ScribeLayer                                       //
////////////////////////////////////////////////////////////////////////////////////////////////////

/// A [`tracing-subscriber`]-compliant [`Layer`] that forwards [`Event`]s to a Scribe collector.
///
/// [`tracing-subscriber`]: https://docs.rs/tracing-subscriber/latest/tracing_subscriber/index.html
/// [`Layer`]: https://docs.rs/tracing-subscriber/latest/tracing_subscriber/layer/trait.Layer.html
/// [`Event`]: https://docs.rs/tracing/0.1.35/tracing/struct.Event.html
pub struct ScribeLayer {
    engine: Mutex<DeliveryEngine>,
    on_error: ErrorHandler,
    process_name: Option<String>,
}

impl ScribeLayer {
    pub fn builder() -> ScribeLayerBuilder {
        ScribeLayerBuilder::default()
    }

    /// Swap in a new transport configuration; the next emit uses it.
    pub fn reconfigure(&self, config: &TransportConfig) -> Result<()> {
        self.with_engine(|engine| engine.reconfigure(config))
    }

    /// Deliver one record, absorbing any failure into the error handler.
    pub fn emit(&self, record: &Record) {
        if let Err(err) = self.with_engine(|engine| engine.emit(record)) {
            (self.on_error)(&err);
        }
    }

    fn with_engine<T>(&self, f: impl FnOnce(&mut DeliveryEngine) -> T) -> T {
        // A panic mid-emit poisons the lock; the engine reopens both its handles per attempt, so
        // carrying on with the inner value is sound.
        let mut guard = match self.engine.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        f(&mut guard)
    }
}

impl<S> tracing_subscriber::layer::Layer<S> for ScribeLayer
where
    S: tracing_core::subscriber::Subscriber,
{
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        let meta = event.metadata();
        let mut visitor = MessageEventVisitor { message: None };
        event.record(&mut visitor);
        let message = match visitor.message {
            Some(message) => message,
            None => {
                (self.on_error)(&Error::NoMessageField {
                    name: meta.name(),
                    back: Backtrace::new(),
                });
                return;
            }
        };
        let record = Record {
            message,
            module: meta
                .module_path()
                .unwrap_or_else(|| meta.target())
                .to_string(),
            levelname: level_name(meta.level()).to_string(),
            loggername: meta.target().to_string(),
            process_name: self.process_name.clone(),
            timestamp: Utc::now(),
        };
        self.emit(&record);
    }
}

////////////////////////////////////////////////////////////////////////////////////////////////////
//                                   struct ScribeLayerBuilder                                    //
////////////////////////////////////////////////////////////////////////////////////////////////////

/// Builder for [`ScribeLayer`]. Defaults: framed transport to `127.0.0.1:1463`, category
/// template `"%(hostname)s-%(loggername)s"`, no durable buffer.
pub struct ScribeLayerBuilder {
    host: String,
    port: u16,
    category: Option<String>,
    kind: Option<TransportKind>,
    uri: Option<String>,
    buffer_path: Option<PathBuf>,
    hostname: HostnameSource,
    on_error: Option<ErrorHandler>,
}

impl std::default::Default for ScribeLayerBuilder {
    fn default() -> Self {
        let config = TransportConfig::default();
        ScribeLayerBuilder {
            host: config.host,
            port: config.port,
            category: None,
            kind: config.kind,
            uri: None,
            buffer_path: None,
            hostname: HostnameSource::System,
            on_error: None,
        }
    }
}

impl ScribeLayerBuilder {
    pub fn host<S: Into<String>>(mut self, host: S) -> Self {
        self.host = host.into();
        self
    }
    pub fn port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }
    /// Category template; `%(module)s`, `%(levelname)s`, `%(loggername)s`, `%(processName)s` &
    /// `%(hostname)s` are the recognized substitutions.
    pub fn category<S: Into<String>>(mut self, template: S) -> Self {
        self.category = Some(template.into());
        self
    }
    /// `None` disables the transport entirely: every record goes to the error path.
    pub fn transport(mut self, kind: Option<TransportKind>) -> Self {
        self.kind = kind;
        self
    }
    /// Endpoint path; required iff the transport kind is [`TransportKind::Http`].
    pub fn uri<S: Into<String>>(mut self, uri: S) -> Self {
        self.uri = Some(uri.into());
        self
    }
    /// Enables the durable queue at this path.
    pub fn buffer_path<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.buffer_path = Some(path.into());
        self
    }
    pub fn hostname(mut self, hostname: HostnameSource) -> Self {
        self.hostname = hostname;
        self
    }
    pub fn error_handler<F: Fn(&Error) + Send + Sync + 'static>(mut self, handler: F) -> Self {
        self.on_error = Some(Box::new(handler));
        self
    }

    pub fn build(self) -> Result<ScribeLayer> {
        let config = TransportConfig {
            host: self.host,
            port: self.port,
            kind: self.kind,
            uri: self.uri,
        };
        let formatter = CategoryFormatter::new(self.category, self.hostname);
        let engine = DeliveryEngine::from_config(formatter, &config, self.buffer_path)?;
        Ok(ScribeLayer {
            engine: Mutex::new(engine),
            on_error: self.on_error.unwrap_or_else(|| Box::new(default_error_handler)),
            process_name: default_process_name(),
        })
    }
}

#[cfg(test)]
mod test {

    use super::*;

    use std::sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    };

    use tracing::Callsite;
    use tracing_subscriber::layer::SubscriberExt;

    #[test]
    fn test_http_without_uri_fails_the_build() {
        assert!(matches!(
            ScribeLayer::builder()
                .transport(Some(TransportKind::Http))
                .build(),
            Err(Error::Config { .. })
        ));
    }

    #[test]
    fn test_http_with_uri_builds() {
        assert!(ScribeLayer::builder()
            .transport(Some(TransportKind::Http))
            .uri("/scribe")
            .build()
            .is_ok());
    }

    #[test]
    fn test_level_names() {
        assert_eq!(level_name(&tracing::Level::TRACE), "TRACE");
        assert_eq!(level_name(&tracing::Level::ERROR), "ERROR");
    }

    struct TestCallsite {
        metadata: &'static tracing::Metadata<'static>,
    }

    impl tracing_core::callsite::Callsite for TestCallsite {
        fn set_interest(&self, _interest: tracing_core::subscriber::Interest) {}
        fn metadata(&self) -> &tracing::Metadata<'static> {
            self.metadata
        }
    }

    impl TestCallsite {
        pub const fn new(metadata: &'static tracing::Metadata<'static>) -> TestCallsite {
            TestCallsite { metadata }
        }
    }

    #[test]
    #[allow(clippy::redundant_closure_call)]
    fn test_event_without_a_message_field_routes_to_the_error_path() {
        // Non-macro replication of the logic of `event!()`, with a field set that carries no
        // `message`; the macros always supply one, but nothing requires other emitters to.
        static CALLSITE: TestCallsite = {
            static METADATA: tracing::Metadata = tracing::Metadata::new(
                "answer-only event",
                "test-target",
                tracing::Level::INFO,
                Some(file!()),
                Some(line!()),
                Some(module_path!()),
                tracing::field::FieldSet::new(
                    &["answer"],
                    tracing_core::callsite::Identifier(&CALLSITE),
                ),
                tracing_core::metadata::Kind::EVENT,
            );
            TestCallsite::new(&METADATA)
        };

        let hits = Arc::new(AtomicUsize::new(0));
        let seen = hits.clone();
        let layer = ScribeLayer::builder()
            .transport(None)
            .error_handler(move |err| {
                assert!(matches!(err, Error::NoMessageField { .. }));
                seen.fetch_add(1, Ordering::SeqCst);
            })
            .build()
            .unwrap();
        let subscriber = tracing_subscriber::registry::Registry::default().with(layer);
        tracing::subscriber::with_default(subscriber, || {
            (|value_set: tracing::field::ValueSet| {
                Event::dispatch(CALLSITE.metadata(), &value_set);
            })(tracing::valueset!(CALLSITE.metadata().fields(), answer = 42));
        });
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_disabled_transport_routes_to_error_path_once() {
        let hits = Arc::new(AtomicUsize::new(0));
        let seen = hits.clone();
        let layer = ScribeLayer::builder()
            .transport(None)
            .error_handler(move |err| {
                assert!(matches!(err, Error::NoTransport { .. }));
                seen.fetch_add(1, Ordering::SeqCst);
            })
            .build()
            .unwrap();
        let subscriber = tracing_subscriber::registry::Registry::default().with(layer);
        tracing::subscriber::with_default(subscriber, || {
            tracing::info!("hello, world");
        });
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }
}
