//! Line protocol codec
//!
//! ## Requests
//! ```text
//! get|gets|lease-get <key>*\r\n
//! <mode> <key> <flags> <exptime> <bytes> [noreply]\r\n<data>\r\n
//! cas <key> <flags> <exptime> <bytes> <cas> [noreply]\r\n<data>\r\n
//! lease-set <key> <token> <flags> <exptime> <bytes>\r\n<data>\r\n
//! delete <key> [<exptime>] [noreply]\r\n
//! touch <key> <exptime> [noreply]\r\n
//! incr|decr <key> <delta> [noreply]\r\n
//! ```
//!
//! ## Replies
//! Sentinel lines (`END`, `STORED`, ...) or data lines
//! (`VALUE`, `LVALUE`, `META`, `STAT`, a bare number).

use bytes::{BufMut, Bytes, BytesMut};

use super::{ByteSource, Command, LineReply, ResponseRecord};
use crate::error::{McError, Result};

/// Line terminator
pub const CRLF: &[u8] = b"\r\n";

// =============================================================================
// Encoding
// =============================================================================

/// Encode a command to bytes
///
/// Storage commands carry their value block and trailing CRLF.
pub fn encode_line_command(command: &Command) -> Result<Bytes> {
    let mut buf = BytesMut::with_capacity(64);

    match command {
        Command::Get { keys } => put_retrieval(&mut buf, "get", keys)?,
        Command::Gets { keys } => put_retrieval(&mut buf, "gets", keys)?,
        Command::LeaseGet { keys } => put_retrieval(&mut buf, "lease-get", keys)?,
        Command::Metaget { key } => {
            check_key(key)?;
            put_line(&mut buf, &format!("metaget {}", key));
        }
        Command::LeaseSet {
            key,
            value,
            token,
            options,
        } => {
            check_key(key)?;
            put_line(
                &mut buf,
                &format!(
                    "lease-set {} {} {} {} {}{}",
                    key,
                    token,
                    options.flags,
                    options.exptime,
                    value.len(),
                    noreply_suffix(options.noreply)
                ),
            );
            put_block(&mut buf, value);
        }
        Command::Store {
            mode,
            key,
            value,
            options,
        } => {
            check_key(key)?;
            put_line(
                &mut buf,
                &format!(
                    "{} {} {} {} {}{}",
                    mode.as_str(),
                    key,
                    options.flags,
                    options.exptime,
                    value.len(),
                    noreply_suffix(options.noreply)
                ),
            );
            put_block(&mut buf, value);
        }
        Command::Cas {
            key,
            value,
            cas,
            options,
        } => {
            check_key(key)?;
            put_line(
                &mut buf,
                &format!(
                    "cas {} {} {} {} {}{}",
                    key,
                    options.flags,
                    options.exptime,
                    value.len(),
                    cas,
                    noreply_suffix(options.noreply)
                ),
            );
            put_block(&mut buf, value);
        }
        Command::Delete {
            key,
            exptime,
            noreply,
        } => {
            check_key(key)?;
            let exptime = exptime.map(|e| format!(" {}", e)).unwrap_or_default();
            put_line(
                &mut buf,
                &format!("delete {}{}{}", key, exptime, noreply_suffix(*noreply)),
            );
        }
        Command::Touch {
            key,
            exptime,
            noreply,
        } => {
            check_key(key)?;
            put_line(
                &mut buf,
                &format!("touch {} {}{}", key, exptime, noreply_suffix(*noreply)),
            );
        }
        Command::Arith {
            op,
            key,
            delta,
            noreply,
        } => {
            check_key(key)?;
            put_line(
                &mut buf,
                &format!("{} {} {}{}", op.as_str(), key, delta, noreply_suffix(*noreply)),
            );
        }
        Command::Stats { group } => match group {
            Some(group) => put_line(&mut buf, &format!("stats {}", group)),
            None => put_line(&mut buf, "stats"),
        },
        Command::FlushAll { delay } => match delay {
            Some(delay) => put_line(&mut buf, &format!("flush_all {}", delay)),
            None => put_line(&mut buf, "flush_all"),
        },
        Command::Version => put_line(&mut buf, "version"),
        Command::Shutdown => put_line(&mut buf, "shutdown"),
        Command::Raw(bytes) => buf.put_slice(bytes),
    }

    Ok(buf.freeze())
}

fn put_retrieval(buf: &mut BytesMut, verb: &str, keys: &[String]) -> Result<()> {
    if keys.is_empty() {
        return Err(McError::InvalidArgument(format!("{} needs at least one key", verb)));
    }
    for key in keys {
        check_key(key)?;
    }
    put_line(buf, &format!("{} {}", verb, keys.join(" ")));
    Ok(())
}

fn put_line(buf: &mut BytesMut, line: &str) {
    buf.put_slice(line.as_bytes());
    buf.put_slice(CRLF);
}

fn put_block(buf: &mut BytesMut, value: &[u8]) {
    buf.put_slice(value);
    buf.put_slice(CRLF);
}

fn noreply_suffix(noreply: bool) -> &'static str {
    if noreply {
        " noreply"
    } else {
        ""
    }
}

/// Keys may not contain anything that would break the line framing
pub fn check_key(key: &str) -> Result<()> {
    if key.is_empty() {
        return Err(McError::InvalidArgument("empty key".to_string()));
    }
    if key.bytes().any(|b| b.is_ascii_whitespace() || b.is_ascii_control()) {
        return Err(McError::InvalidArgument(format!(
            "key {:?} contains whitespace or control characters",
            key
        )));
    }
    Ok(())
}

// =============================================================================
// Decoding
// =============================================================================

/// Strip the trailing `\r\n` (or bare `\n`)
pub fn trim_line(raw: &[u8]) -> &[u8] {
    let raw = raw.strip_suffix(b"\n").unwrap_or(raw);
    raw.strip_suffix(b"\r").unwrap_or(raw)
}

/// Read one line and insist it is complete
pub fn read_reply_line<S: ByteSource + ?Sized>(source: &mut S) -> Result<String> {
    let raw = source.read_line()?;
    if raw.is_empty() {
        return Err(McError::Framing(
            "connection closed while awaiting a reply".to_string(),
        ));
    }
    if raw.last() != Some(&b'\n') {
        return Err(McError::Framing(format!(
            "truncated reply line ({} bytes, no terminator)",
            raw.len()
        )));
    }
    String::from_utf8(trim_line(&raw).to_vec())
        .map_err(|_| McError::Framing("reply line is not valid UTF-8".to_string()))
}

/// Decode one logical reply
///
/// `VALUE`/`LVALUE` lines consume their payload and its CRLF.
pub fn decode_line_response<S: ByteSource + ?Sized>(source: &mut S) -> Result<LineReply> {
    let line = read_reply_line(source)?;
    parse_reply_line(source, &line)
}

/// Decode a line that was already read
pub fn parse_reply_line<S: ByteSource + ?Sized>(source: &mut S, line: &str) -> Result<LineReply> {
    let reply = match line {
        "END" => LineReply::End,
        "STORED" => LineReply::Stored,
        "NOT_STORED" => LineReply::NotStored,
        "STALE_STORED" => LineReply::StaleStored,
        "EXISTS" => LineReply::Exists,
        "NOT_FOUND" => LineReply::NotFound,
        "DELETED" => LineReply::Deleted,
        "TOUCHED" => LineReply::Touched,
        "OK" => LineReply::Ok,
        "ERROR" => LineReply::Error,
        _ => {
            if let Some(msg) = strip_word(line, "CLIENT_ERROR") {
                LineReply::ClientError(msg.to_string())
            } else if let Some(msg) = strip_word(line, "SERVER_ERROR") {
                LineReply::ServerError(msg.to_string())
            } else if strip_word(line, "ERROR").is_some() {
                LineReply::Error
            } else if let Some(version) = line.strip_prefix("VERSION ") {
                LineReply::Version(version.to_string())
            } else if line.starts_with("VALUE ") {
                LineReply::Value(decode_value(source, line)?)
            } else if line.starts_with("LVALUE ") {
                LineReply::Value(decode_lease_value(source, line)?)
            } else if line.starts_with("META ") {
                LineReply::Meta(parse_meta(line))
            } else if let Some(rest) = line.strip_prefix("STAT ") {
                let (name, value) = rest.split_once(' ').unwrap_or((rest, ""));
                LineReply::Stat {
                    name: name.to_string(),
                    value: value.to_string(),
                }
            } else if !line.is_empty() && line.bytes().all(|b| b.is_ascii_digit()) {
                LineReply::Numeric(parse_num(line, "numeric reply")?)
            } else {
                return Err(McError::Protocol(format!(
                    "unrecognized reply line {:?}",
                    line
                )));
            }
        }
    };
    Ok(reply)
}

/// `word` alone or followed by a space; returns the message part
fn strip_word<'a>(line: &'a str, word: &str) -> Option<&'a str> {
    let rest = line.strip_prefix(word)?;
    if rest.is_empty() {
        Some("")
    } else {
        rest.strip_prefix(' ').map(str::trim)
    }
}

/// `VALUE <key> <flags> <bytes> [<cas>]`
fn decode_value<S: ByteSource + ?Sized>(source: &mut S, line: &str) -> Result<ResponseRecord> {
    let parts: Vec<&str> = line.split_ascii_whitespace().collect();
    if parts.len() != 4 && parts.len() != 5 {
        return Err(McError::Framing(format!("malformed VALUE line {:?}", line)));
    }

    let key = parts[1];
    let flags = parse_num::<u32>(parts[2], "VALUE flags")?;
    let len = parse_num::<usize>(parts[3], "VALUE length")?;
    let value = read_payload(source, key, len)?;

    let record = ResponseRecord::new(key, flags, value);
    match parts.get(4) {
        Some(cas) => Ok(record.with_cas(parse_num(cas, "VALUE cas")?)),
        None => Ok(record),
    }
}

/// `LVALUE <key> <token> <flags> <bytes>`
fn decode_lease_value<S: ByteSource + ?Sized>(
    source: &mut S,
    line: &str,
) -> Result<ResponseRecord> {
    let parts: Vec<&str> = line.split_ascii_whitespace().collect();
    if parts.len() != 5 {
        return Err(McError::Framing(format!("malformed LVALUE line {:?}", line)));
    }

    let key = parts[1];
    let token = parse_num::<u64>(parts[2], "LVALUE token")?;
    let flags = parse_num::<u32>(parts[3], "LVALUE flags")?;
    let len = parse_num::<usize>(parts[4], "LVALUE length")?;
    let value = read_payload(source, key, len)?;

    Ok(ResponseRecord::new(key, flags, value).with_lease_token(token))
}

/// Payload plus its CRLF; the CRLF is checked and dropped
fn read_payload<S: ByteSource + ?Sized>(source: &mut S, key: &str, len: usize) -> Result<Bytes> {
    let total = len.checked_add(CRLF.len()).ok_or_else(|| {
        McError::Framing(format!("payload length {} for {:?} is out of range", len, key))
    })?;
    let mut block = source.read_exact(total)?;
    if &block[len..] != CRLF {
        return Err(McError::Framing(format!(
            "payload for {:?} is not {} bytes followed by CRLF",
            key, len
        )));
    }
    block.truncate(len);
    Ok(Bytes::from(block))
}

/// `META <key> age: 0; exptime: 0; from: 127.0.0.1; is_transient: 0`
fn parse_meta(line: &str) -> Vec<(String, String)> {
    let words: Vec<&str> = line.split_ascii_whitespace().collect();
    words
        .get(2..)
        .unwrap_or_default()
        .chunks_exact(2)
        .map(|pair| {
            (
                pair[0].trim_end_matches(':').to_string(),
                pair[1].trim_end_matches(';').to_string(),
            )
        })
        .collect()
}

fn parse_num<T: std::str::FromStr>(text: &str, what: &str) -> Result<T> {
    text.parse()
        .map_err(|_| McError::Framing(format!("invalid {}: {:?}", what, text)))
}
