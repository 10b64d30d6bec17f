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

//! Thrift binary-protocol codec for the Scribe `Log` call.
//!
//! Scribe's service surface is a single method:
//!
//! ```text
//! ResultCode Log(1: list<LogEntry> messages)       // LogEntry { 1: string category,
//!                                                  //            2: string message }
//! ```
//!
//! so rather than pull in a Thrift code generator this module hand-rolls exactly the pieces the
//! handler needs: encoding the call, and decoding the reply. Calls are written with the
//! *non-strict* (pre-versioning) message header, which every collector vintage accepts; replies
//! are accepted in either the strict or non-strict form, and unknown fields in the reply struct
//! are skipped, so newer collectors remain readable.
//!
//! Framing (length prefixes, HTTP envelopes) is the transport's concern, not this module's: the
//! encoder returns a raw message and the decoder reads one from any [`Read`].

use crate::error::{Error, Result};

use backtrace::Backtrace;
use byteorder::{BigEndian, ReadBytesExt};
use bytes::BufMut;

use std::io::Read;

const MSG_CALL: u8 = 1;
const MSG_REPLY: u8 = 2;
const MSG_EXCEPTION: u8 = 3;

const VERSION_1: u32 = 0x8001_0000;
const VERSION_MASK: u32 = 0xffff_0000;

const TTYPE_STOP: u8 = 0;
const TTYPE_BOOL: u8 = 2;
const TTYPE_BYTE: u8 = 3;
const TTYPE_DOUBLE: u8 = 4;
const TTYPE_I16: u8 = 6;
const TTYPE_I32: u8 = 8;
const TTYPE_I64: u8 = 10;
const TTYPE_STRING: u8 = 11;
const TTYPE_STRUCT: u8 = 12;
const TTYPE_MAP: u8 = 13;
const TTYPE_SET: u8 = 14;
const TTYPE_LIST: u8 = 15;

const LOG_METHOD: &str = "Log";

/// Longest string/collection the decoder will accept; collectors don't send more.
const MAX_WIRE_LEN: i32 = 1 << 24;

/// Nested containers deeper than this in a reply are treated as a protocol fault.
const MAX_SKIP_DEPTH: u32 = 32;

use crate::record::LogEntry;

////////////////////////////////////////////////////////////////////////////////////////////////////
//                                         result codes                                           //
////////////////////////////////////////////////////////////////////////////////////////////////////

/// The collector's verdict on a `Log` call.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum ResultCode {
    /// Entry accepted
    Ok,
    /// Collector is overloaded; retry the entry later
    TryLater,
    /// A code this crate doesn't know; treated as a rejection
    Unknown(i32),
}

impl ResultCode {
    pub fn as_i32(self) -> i32 {
        match self {
            ResultCode::Ok => 0,
            ResultCode::TryLater => 1,
            ResultCode::Unknown(code) => code,
        }
    }
    pub fn is_ok(self) -> bool {
        matches!(self, ResultCode::Ok)
    }
}

impl From<i32> for ResultCode {
    fn from(code: i32) -> Self {
        match code {
            0 => ResultCode::Ok,
            1 => ResultCode::TryLater,
            code => ResultCode::Unknown(code),
        }
    }
}

////////////////////////////////////////////////////////////////////////////////////////////////////
//                                           encoding                                             //
////////////////////////////////////////////////////////////////////////////////////////////////////

fn put_string(buf: &mut Vec<u8>, s: &str) {
    buf.put_i32(s.len() as i32);
    buf.put_slice(s.as_bytes());
}

/// Encode one `Log` call carrying `entries`, unframed.
pub fn encode_log_call(seq: i32, entries: &[LogEntry]) -> Vec<u8> {
    let mut buf = Vec::with_capacity(64);
    // Non-strict message header: name, type, sequence id.
    put_string(&mut buf, LOG_METHOD);
    buf.put_u8(MSG_CALL);
    buf.put_i32(seq);
    // Args struct, field 1: the list of entries.
    buf.put_u8(TTYPE_LIST);
    buf.put_i16(1);
    buf.put_u8(TTYPE_STRUCT);
    buf.put_i32(entries.len() as i32);
    for entry in entries {
        buf.put_u8(TTYPE_STRING);
        buf.put_i16(1);
        put_string(&mut buf, entry.category());
        buf.put_u8(TTYPE_STRING);
        buf.put_i16(2);
        put_string(&mut buf, entry.message());
        buf.put_u8(TTYPE_STOP);
    }
    buf.put_u8(TTYPE_STOP);
    buf
}

/// Encode a `Log` reply carrying `code`, unframed.
///
/// The handler itself never sends replies; this exists for mock collectors (in-process test
/// daemons and the like) so they can speak to the decoder's counterpart.
pub fn encode_log_reply(seq: i32, code: ResultCode) -> Vec<u8> {
    let mut buf = Vec::with_capacity(32);
    put_string(&mut buf, LOG_METHOD);
    buf.put_u8(MSG_REPLY);
    buf.put_i32(seq);
    // Result struct, field 0: the ResultCode.
    buf.put_u8(TTYPE_I32);
    buf.put_i16(0);
    buf.put_i32(code.as_i32());
    buf.put_u8(TTYPE_STOP);
    buf
}

////////////////////////////////////////////////////////////////////////////////////////////////////
//                                           decoding                                             //
////////////////////////////////////////////////////////////////////////////////////////////////////

fn protocol_err(detail: String) -> Error {
    Error::Transport {
        source: detail.into(),
        back: Backtrace::new(),
    }
}

fn io_err(err: std::io::Error) -> Error {
    Error::Transport {
        source: Box::new(err),
        back: Backtrace::new(),
    }
}

fn read_len<R: Read>(r: &mut R) -> Result<usize> {
    let len = r.read_i32::<BigEndian>().map_err(io_err)?;
    if !(0..=MAX_WIRE_LEN).contains(&len) {
        return Err(protocol_err(format!("implausible wire length {}", len)));
    }
    Ok(len as usize)
}

fn read_bytes<R: Read>(r: &mut R) -> Result<Vec<u8>> {
    let len = read_len(r)?;
    let mut buf = vec![0u8; len];
    r.read_exact(&mut buf).map_err(io_err)?;
    Ok(buf)
}

fn skip_field<R: Read>(r: &mut R, ttype: u8, depth: u32) -> Result<()> {
    if depth > MAX_SKIP_DEPTH {
        return Err(protocol_err(String::from("reply nested too deeply")));
    }
    match ttype {
        TTYPE_BOOL | TTYPE_BYTE => {
            r.read_u8().map_err(io_err)?;
        }
        TTYPE_I16 => {
            r.read_i16::<BigEndian>().map_err(io_err)?;
        }
        TTYPE_I32 => {
            r.read_i32::<BigEndian>().map_err(io_err)?;
        }
        TTYPE_I64 | TTYPE_DOUBLE => {
            r.read_i64::<BigEndian>().map_err(io_err)?;
        }
        TTYPE_STRING => {
            read_bytes(r)?;
        }
        TTYPE_STRUCT => loop {
            let ttype = r.read_u8().map_err(io_err)?;
            if ttype == TTYPE_STOP {
                break;
            }
            r.read_i16::<BigEndian>().map_err(io_err)?;
            skip_field(r, ttype, depth + 1)?;
        },
        TTYPE_LIST | TTYPE_SET => {
            let elem = r.read_u8().map_err(io_err)?;
            let count = read_len(r)?;
            for _ in 0..count {
                skip_field(r, elem, depth + 1)?;
            }
        }
        TTYPE_MAP => {
            let ktype = r.read_u8().map_err(io_err)?;
            let vtype = r.read_u8().map_err(io_err)?;
            let count = read_len(r)?;
            for _ in 0..count {
                skip_field(r, ktype, depth + 1)?;
                skip_field(r, vtype, depth + 1)?;
            }
        }
        other => {
            return Err(protocol_err(format!("unknown thrift type {}", other)));
        }
    }
    Ok(())
}

/// Decode one `Log` reply from `r`, accepting strict or non-strict message headers.
///
/// A `TApplicationException` reply, a header this decoder can't make sense of, or a reply lacking
/// the result field are all surfaced as transport errors; a well-formed reply yields the
/// collector's [`ResultCode`] whatever its value (the caller decides what non-OK means).
pub fn decode_log_reply<R: Read>(r: &mut R) -> Result<ResultCode> {
    let first = r.read_i32::<BigEndian>().map_err(io_err)?;
    let mtype = if first < 0 {
        let version = first as u32 & VERSION_MASK;
        if version != VERSION_1 {
            return Err(protocol_err(format!(
                "bad thrift version word {:#010x}",
                first as u32
            )));
        }
        let mtype = (first as u32 & 0xff) as u8;
        read_bytes(r)?; // method name
        r.read_i32::<BigEndian>().map_err(io_err)?; // sequence id
        mtype
    } else {
        if first > MAX_WIRE_LEN {
            return Err(protocol_err(format!("implausible method name length {}", first)));
        }
        let mut name = vec![0u8; first as usize];
        r.read_exact(&mut name).map_err(io_err)?;
        let mtype = r.read_u8().map_err(io_err)?;
        r.read_i32::<BigEndian>().map_err(io_err)?;
        mtype
    };

    match mtype {
        MSG_REPLY => {
            let mut code = None;
            loop {
                let ttype = r.read_u8().map_err(io_err)?;
                if ttype == TTYPE_STOP {
                    break;
                }
                let id = r.read_i16::<BigEndian>().map_err(io_err)?;
                if ttype == TTYPE_I32 && id == 0 {
                    code = Some(r.read_i32::<BigEndian>().map_err(io_err)?);
                } else {
                    skip_field(r, ttype, 0)?;
                }
            }
            code.map(ResultCode::from)
                .ok_or_else(|| protocol_err(String::from("reply carried no result code")))
        }
        MSG_EXCEPTION => {
            // TApplicationException: 1: string message, 2: i32 type.
            let mut message = String::new();
            loop {
                let ttype = r.read_u8().map_err(io_err)?;
                if ttype == TTYPE_STOP {
                    break;
                }
                let id = r.read_i16::<BigEndian>().map_err(io_err)?;
                if ttype == TTYPE_STRING && id == 1 {
                    message = String::from_utf8_lossy(&read_bytes(r)?).into_owned();
                } else {
                    skip_field(r, ttype, 0)?;
                }
            }
            Err(protocol_err(format!(
                "collector returned an exception: {}",
                if message.is_empty() {
                    "(no message)"
                } else {
                    message.as_str()
                }
            )))
        }
        other => Err(protocol_err(format!(
            "unexpected thrift message type {}",
            other
        ))),
    }
}

#[cfg(test)]
mod test {

    use super::*;

    #[test]
    fn test_encode_log_call() {
        let entry = LogEntry::new("cat", "msg");
        let buf = encode_log_call(1, std::slice::from_ref(&entry));

        let mut golden: Vec<u8> = Vec::new();
        golden.extend_from_slice(&[0, 0, 0, 3]);
        golden.extend_from_slice(b"Log");
        golden.push(MSG_CALL);
        golden.extend_from_slice(&[0, 0, 0, 1]);
        golden.push(TTYPE_LIST);
        golden.extend_from_slice(&[0, 1]);
        golden.push(TTYPE_STRUCT);
        golden.extend_from_slice(&[0, 0, 0, 1]);
        golden.push(TTYPE_STRING);
        golden.extend_from_slice(&[0, 1]);
        golden.extend_from_slice(&[0, 0, 0, 3]);
        golden.extend_from_slice(b"cat");
        golden.push(TTYPE_STRING);
        golden.extend_from_slice(&[0, 2]);
        golden.extend_from_slice(&[0, 0, 0, 4]);
        golden.extend_from_slice(b"msg\n");
        golden.push(TTYPE_STOP);
        golden.push(TTYPE_STOP);

        assert_eq!(buf, golden);
    }

    #[test]
    fn test_reply_round_trip() {
        for code in [ResultCode::Ok, ResultCode::TryLater, ResultCode::Unknown(7)] {
            let buf = encode_log_reply(42, code);
            assert_eq!(decode_log_reply(&mut &buf[..]).unwrap(), code);
        }
    }

    #[test]
    fn test_strict_reply_header() {
        let mut buf: Vec<u8> = Vec::new();
        buf.put_u32(VERSION_1 | MSG_REPLY as u32);
        put_string(&mut buf, LOG_METHOD);
        buf.put_i32(42);
        buf.put_u8(TTYPE_I32);
        buf.put_i16(0);
        buf.put_i32(0);
        buf.put_u8(TTYPE_STOP);
        assert_eq!(decode_log_reply(&mut &buf[..]).unwrap(), ResultCode::Ok);
    }

    #[test]
    fn test_reply_skips_unknown_fields() {
        let mut buf: Vec<u8> = Vec::new();
        put_string(&mut buf, LOG_METHOD);
        buf.put_u8(MSG_REPLY);
        buf.put_i32(1);
        // An extra string field the decoder has never heard of.
        buf.put_u8(TTYPE_STRING);
        buf.put_i16(5);
        put_string(&mut buf, "surprise");
        buf.put_u8(TTYPE_I32);
        buf.put_i16(0);
        buf.put_i32(1);
        buf.put_u8(TTYPE_STOP);
        assert_eq!(
            decode_log_reply(&mut &buf[..]).unwrap(),
            ResultCode::TryLater
        );
    }

    #[test]
    fn test_exception_reply_is_an_error() {
        let mut buf: Vec<u8> = Vec::new();
        put_string(&mut buf, LOG_METHOD);
        buf.put_u8(MSG_EXCEPTION);
        buf.put_i32(1);
        buf.put_u8(TTYPE_STRING);
        buf.put_i16(1);
        put_string(&mut buf, "unknown method");
        buf.put_u8(TTYPE_I32);
        buf.put_i16(2);
        buf.put_i32(1);
        buf.put_u8(TTYPE_STOP);
        let err = decode_log_reply(&mut &buf[..]).unwrap_err();
        assert!(format!("{}", err).contains("unknown method"));
    }

    #[test]
    fn test_bad_version_word() {
        let mut buf: Vec<u8> = Vec::new();
        buf.put_u32(0xdead_0000 | MSG_REPLY as u32);
        assert!(decode_log_reply(&mut &buf[..]).is_err());
    }

    #[test]
    fn test_truncated_reply() {
        let buf = encode_log_reply(1, ResultCode::Ok);
        assert!(decode_log_reply(&mut &buf[..buf.len() - 3]).is_err());
    }
}
