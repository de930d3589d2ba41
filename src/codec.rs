//! Line-oriented encoding of the data that flows between map and reduce.
//!
//! Each intermediate line carries one key and all of the values a map task
//! emitted for it:
//!
//! ```text
//! <key> <value> <value> ...\n
//! ```
//!
//! The line is split on the first space into the key and the remainder, and
//! the remainder is split on single spaces into values. To keep that framing
//! lossless every token (key or value) is escaped:
//!
//! | raw          | escaped |
//! |--------------|---------|
//! | `\`          | `\\`    |
//! | space        | `\s`    |
//! | newline      | `\n`    |
//! | carriage ret | `\r`    |
//! | tab          | `\t`    |
//! | empty token  | `\0`    |
//!
//! A key with no values is written without a trailing space. The final
//! reduce output (`mr-out-P`) holds `key value` lines; only the key is
//! escaped there, so ordinary words read as plain text.

use bytes::{BufMut, Bytes, BytesMut};

use crate::error::{Error, Result};

/// Prefix shared by every file the job writes.
pub const FILE_PREFIX: &str = "mr-out";

/// The stem under which map attempt `map_task_id` writes its partitions.
pub fn map_output_prefix(map_task_id: u64) -> String {
    format!("{FILE_PREFIX}-{map_task_id}")
}

/// `mr-out-M-P`: partition `P` of the map attempt with stem `prefix`.
pub fn intermediate_name(prefix: &str, partition: u32) -> String {
    format!("{prefix}-{partition}")
}

/// `mr-out-P`: the final output of reduce partition `P`.
pub fn output_name(partition: u32) -> String {
    format!("{FILE_PREFIX}-{partition}")
}

fn escape_into(buf: &mut BytesMut, token: &str) {
    if token.is_empty() {
        buf.put_slice(b"\\0");
        return;
    }
    for c in token.chars() {
        match c {
            '\\' => buf.put_slice(b"\\\\"),
            ' ' => buf.put_slice(b"\\s"),
            '\n' => buf.put_slice(b"\\n"),
            '\r' => buf.put_slice(b"\\r"),
            '\t' => buf.put_slice(b"\\t"),
            c => {
                let mut tmp = [0u8; 4];
                buf.put_slice(c.encode_utf8(&mut tmp).as_bytes());
            }
        }
    }
}

fn unescape(token: &str) -> Result<String> {
    if token == "\\0" {
        return Ok(String::new());
    }
    if token.is_empty() {
        return Err(Error::Codec("empty token".into()));
    }
    let mut out = String::with_capacity(token.len());
    let mut chars = token.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('\\') => out.push('\\'),
            Some('s') => out.push(' '),
            Some('n') => out.push('\n'),
            Some('r') => out.push('\r'),
            Some('t') => out.push('\t'),
            Some(other) => {
                return Err(Error::Codec(format!("unknown escape `\\{other}` in {token:?}")))
            }
            None => return Err(Error::Codec(format!("dangling escape in {token:?}"))),
        }
    }
    Ok(out)
}

/// Appends one intermediate line for `key` and its `values`.
pub fn encode_line<'a, I>(buf: &mut BytesMut, key: &str, values: I)
where
    I: IntoIterator<Item = &'a str>,
{
    escape_into(buf, key);
    for value in values {
        buf.put_u8(b' ');
        escape_into(buf, value);
    }
    buf.put_u8(b'\n');
}

/// Decodes a single intermediate line (without its newline).
pub fn decode_line(line: &str) -> Result<(String, Vec<String>)> {
    match line.split_once(' ') {
        Some((key, rest)) => {
            let values = rest.split(' ').map(unescape).collect::<Result<Vec<_>>>()?;
            Ok((unescape(key)?, values))
        }
        None => Ok((unescape(line)?, Vec::new())),
    }
}

/// Decodes a whole intermediate file. Blank lines are skipped.
pub fn decode(buf: &[u8]) -> Result<Vec<(String, Vec<String>)>> {
    let text = std::str::from_utf8(buf).map_err(|e| Error::Codec(e.to_string()))?;
    text.split('\n')
        .filter(|line| !line.is_empty())
        .map(decode_line)
        .collect()
}

/// Appends one final output line, `key value`. The key is escaped like an
/// intermediate token so that the first space always ends it; the value is
/// written as is.
pub fn encode_output_line(buf: &mut BytesMut, key: &str, value: &str) {
    escape_into(buf, key);
    buf.put_u8(b' ');
    buf.put_slice(value.as_bytes());
    buf.put_u8(b'\n');
}

/// Splits a final output file back into `(key, value)` pairs.
pub fn decode_output(buf: &Bytes) -> Result<Vec<(String, String)>> {
    String::from_utf8_lossy(buf)
        .lines()
        .filter(|line| !line.is_empty())
        .map(|line| match line.split_once(' ') {
            Some((k, v)) => Ok((unescape(k)?, v.to_string())),
            None => Ok((unescape(line)?, String::new())),
        })
        .collect()
}
