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

//! The collector transport layer.
//!
//! This module defines the [`Transport`] trait all session implementations must support, along
//! with the three concrete wirings a Scribe collector accepts: framed binary over TCP, buffered
//! (unframed) binary over TCP, and Thrift-over-HTTP.
//!
//! A transport is a *per-attempt session*: the delivery engine calls [`open`](Transport::open) at
//! the start of an attempt, [`submit`](Transport::submit)s one or more entries, and
//! [`close`](Transport::close)s it before returning, success or failure. Sessions are never held
//! across attempts; a fresh attempt always starts from the closed state. Any I/O fault during
//! open or submit is a [`Transport`](crate::error::Error::Transport) error, which the engine
//! treats as recoverable-by-retry.

use crate::{
    error::{Error, Result},
    record::LogEntry,
    wire::{self, ResultCode},
};

use backtrace::Backtrace;
use byteorder::{BigEndian, ReadBytesExt};
use bytes::BufMut;

use std::{
    io::{BufRead, BufReader, Write},
    net::{Shutdown, TcpStream},
};

/// Largest reply frame a collector may send us.
const MAX_REPLY_FRAME: u32 = 1 << 24;

fn transport_err(
    source: impl Into<Box<dyn std::error::Error + Send + Sync + 'static>>,
) -> Error {
    Error::Transport {
        source: source.into(),
        back: Backtrace::new(),
    }
}

////////////////////////////////////////////////////////////////////////////////////////////////////
//                                        trait Transport                                         //
////////////////////////////////////////////////////////////////////////////////////////////////////

/// Operations a collector session must support.
///
/// Implementations go through `CLOSED → open() → OPEN → submit()* → close() → CLOSED`; a failed
/// open or submit ends the attempt, and the engine will still call `close` before giving up.
/// `submit` on a session that was never opened is a transport error, not a panic.
pub trait Transport: Send {
    /// Establish the connection for one delivery attempt.
    fn open(&mut self) -> Result<()>;
    /// Submit one entry, returning the collector's result code.
    fn submit(&mut self, entry: &LogEntry) -> Result<ResultCode>;
    /// Tear the session down; best-effort, never fails.
    fn close(&mut self);
}

/// The wire-framing/protocol choice used to reach the collector.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum TransportKind {
    /// Thrift framed transport: each message prefixed with its length
    Framed,
    /// Thrift buffered transport: raw binary messages on the stream
    Unframed,
    /// Thrift messages POSTed to an HTTP endpoint
    Http,
}

/// Construction-time transport configuration.
///
/// `kind` of `None` means the handler has no transport at all; every emit then lands on the
/// error path. Validation happens in [`build`](TransportConfig::build), which is invoked at
/// handler construction (and from [`reconfigure`](crate::engine::DeliveryEngine::reconfigure)),
/// so misconfiguration surfaces before any network activity.
#[derive(Clone, Debug)]
pub struct TransportConfig {
    pub host: String,
    pub port: u16,
    pub kind: Option<TransportKind>,
    pub uri: Option<String>,
}

impl std::default::Default for TransportConfig {
    fn default() -> Self {
        TransportConfig {
            host: String::from("127.0.0.1"),
            port: 1463,
            kind: Some(TransportKind::Framed),
            uri: None,
        }
    }
}

impl TransportConfig {
    /// Validate and build the configured session, if any.
    pub fn build(&self) -> Result<Option<Box<dyn Transport>>> {
        match self.kind {
            None => Ok(None),
            Some(TransportKind::Http) => {
                let uri = self.uri.clone().ok_or_else(|| Error::Config {
                    detail: String::from("http transport with no uri"),
                    back: Backtrace::new(),
                })?;
                Ok(Some(Box::new(HttpTransport::new(
                    self.host.clone(),
                    self.port,
                    uri,
                ))))
            }
            Some(kind) => Ok(Some(Box::new(TcpTransport::new(
                self.host.clone(),
                self.port,
                kind == TransportKind::Framed,
            )))),
        }
    }
}

////////////////////////////////////////////////////////////////////////////////////////////////////
//                                     transport mechanisms                                       //
////////////////////////////////////////////////////////////////////////////////////////////////////

/// Framed or buffered Thrift binary over TCP.
pub struct TcpTransport {
    addr: String,
    framed: bool,
    stream: Option<TcpStream>,
    seq: i32,
}

impl TcpTransport {
    pub fn new(host: String, port: u16, framed: bool) -> TcpTransport {
        TcpTransport {
            addr: format!("{}:{}", host, port),
            framed,
            stream: None,
            seq: 0,
        }
    }
}

impl Transport for TcpTransport {
    fn open(&mut self) -> Result<()> {
        self.close();
        self.stream = Some(TcpStream::connect(&self.addr).map_err(transport_err)?);
        Ok(())
    }

    fn submit(&mut self, entry: &LogEntry) -> Result<ResultCode> {
        let stream = self
            .stream
            .as_mut()
            .ok_or_else(|| transport_err(String::from("submit on a closed session")))?;
        self.seq = self.seq.wrapping_add(1);
        let body = wire::encode_log_call(self.seq, std::slice::from_ref(entry));
        if self.framed {
            let mut msg = Vec::with_capacity(body.len() + 4);
            msg.put_u32(body.len() as u32);
            msg.put_slice(&body);
            stream.write_all(&msg).map_err(transport_err)?;
            stream.flush().map_err(transport_err)?;
            let len = stream.read_u32::<BigEndian>().map_err(transport_err)?;
            if len > MAX_REPLY_FRAME {
                return Err(transport_err(format!("implausible reply frame of {} bytes", len)));
            }
            let mut frame = vec![0u8; len as usize];
            std::io::Read::read_exact(stream, &mut frame).map_err(transport_err)?;
            wire::decode_log_reply(&mut &frame[..])
        } else {
            stream.write_all(&body).map_err(transport_err)?;
            stream.flush().map_err(transport_err)?;
            wire::decode_log_reply(stream)
        }
    }

    fn close(&mut self) {
        if let Some(stream) = self.stream.take() {
            let _ = stream.shutdown(Shutdown::Both);
        }
    }
}

/// Thrift binary POSTed to an HTTP endpoint, one call per request.
pub struct HttpTransport {
    host: String,
    port: u16,
    uri: String,
    stream: Option<TcpStream>,
    seq: i32,
}

impl HttpTransport {
    pub fn new(host: String, port: u16, uri: String) -> HttpTransport {
        HttpTransport {
            host,
            port,
            uri,
            stream: None,
            seq: 0,
        }
    }
}

impl Transport for HttpTransport {
    fn open(&mut self) -> Result<()> {
        self.close();
        self.stream = Some(
            TcpStream::connect((self.host.as_str(), self.port)).map_err(transport_err)?,
        );
        Ok(())
    }

    fn submit(&mut self, entry: &LogEntry) -> Result<ResultCode> {
        let stream = self
            .stream
            .as_mut()
            .ok_or_else(|| transport_err(String::from("submit on a closed session")))?;
        self.seq = self.seq.wrapping_add(1);
        let body = wire::encode_log_call(self.seq, std::slice::from_ref(entry));

        let header = format!(
            "POST {} HTTP/1.1\r\nHost: {}:{}\r\nContent-Type: application/x-thrift\r\nContent-Length: {}\r\n\r\n",
            self.uri,
            self.host,
            self.port,
            body.len()
        );
        stream.write_all(header.as_bytes()).map_err(transport_err)?;
        stream.write_all(&body).map_err(transport_err)?;
        stream.flush().map_err(transport_err)?;

        let mut reader = BufReader::new(stream.try_clone().map_err(transport_err)?);
        let mut status = String::new();
        reader.read_line(&mut status).map_err(transport_err)?;
        if status.split_whitespace().nth(1) != Some("200") {
            return Err(transport_err(format!(
                "collector answered {}",
                status.trim()
            )));
        }
        let mut content_length: Option<usize> = None;
        loop {
            let mut line = String::new();
            reader.read_line(&mut line).map_err(transport_err)?;
            let line = line.trim();
            if line.is_empty() {
                break;
            }
            if let Some(value) = line
                .split_once(':')
                .filter(|(name, _)| name.eq_ignore_ascii_case("content-length"))
                .map(|(_, value)| value)
            {
                content_length = value.trim().parse().ok();
            }
        }
        let len = content_length
            .ok_or_else(|| transport_err(String::from("reply without content-length")))?;
        if len > MAX_REPLY_FRAME as usize {
            return Err(transport_err(format!("implausible reply body of {} bytes", len)));
        }
        let mut reply = vec![0u8; len];
        std::io::Read::read_exact(&mut reader, &mut reply).map_err(transport_err)?;
        wire::decode_log_reply(&mut &reply[..])
    }

    fn close(&mut self) {
        if let Some(stream) = self.stream.take() {
            let _ = stream.shutdown(Shutdown::Both);
        }
    }
}
