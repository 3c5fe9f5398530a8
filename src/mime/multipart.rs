//! Lossless multipart envelope.
//!
//! Every byte of the input lands in exactly one retained segment (preamble,
//! delimiter lines, header blocks, bodies, close delimiter + epilogue), so
//! writing the envelope back reproduces the input unless a body was
//! replaced.

use crate::error::{MediatorError, Result};
use std::io::Write;
use tracing::debug;

/// A parsed header line (continuations unfolded).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Header {
    pub name: String,
    pub value: String,
}

/// One body part with its framing retained.
#[derive(Clone, Debug)]
pub struct BodyPart {
    /// Line break before the delimiter, the delimiter line and its line end.
    delimiter: Vec<u8>,
    /// Header lines plus the terminating blank line, verbatim.
    raw_headers: Vec<u8>,
    headers: Vec<Header>,
    body: Vec<u8>,
}

impl BodyPart {
    pub fn headers(&self) -> &[Header] {
        &self.headers
    }

    /// All values for `name`, compared case-insensitively, in order.
    pub fn header_values(&self, name: &str) -> Vec<&str> {
        self.headers
            .iter()
            .filter(|h| h.name.eq_ignore_ascii_case(name))
            .map(|h| h.value.as_str())
            .collect()
    }

    /// First value for `name`.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|h| h.name.eq_ignore_ascii_case(name))
            .map(|h| h.value.as_str())
    }

    pub fn content_type(&self) -> Option<&str> {
        self.header("Content-Type")
    }

    /// Raw (still transfer-encoded) body bytes.
    pub fn body(&self) -> &[u8] {
        &self.body
    }

    pub fn raw_headers(&self) -> &[u8] {
        &self.raw_headers
    }
}

/// A multipart message split into retained segments.
#[derive(Clone, Debug)]
pub struct Multipart {
    boundary: String,
    preamble: Vec<u8>,
    parts: Vec<BodyPart>,
    /// Close delimiter and epilogue. Empty when the input had no close delimiter.
    closing: Vec<u8>,
}

/// Where a delimiter line sits in the input.
struct Delimiter {
    /// Start of the segment (line break before the dashes, clamped to `from`).
    start: usize,
    /// Index just past the delimiter line.
    end: usize,
    is_close: bool,
}

impl Multipart {
    /// Split `data` on `boundary`.
    pub fn parse(data: &[u8], boundary: &str) -> Result<Self> {
        if boundary.is_empty() {
            return Err(MediatorError::MalformedMultipart("empty boundary".into()));
        }
        let dash = dash_boundary(boundary);

        let first = find_delimiter(data, &dash, 0).ok_or_else(|| {
            MediatorError::MalformedMultipart(format!("boundary {boundary:?} not found"))
        })?;
        let preamble = data[..first.start].to_vec();

        let mut parts = Vec::new();
        let mut closing = Vec::new();
        let mut current = first;

        loop {
            if current.is_close {
                closing = data[current.start..].to_vec();
                break;
            }

            let header_start = current.end;
            let body_start = end_of_headers(data, header_start)?;
            let raw_headers = data[header_start..body_start].to_vec();
            let headers = parse_headers(&raw_headers);

            let next = find_delimiter(data, &dash, body_start);
            let body_end = next.as_ref().map_or(data.len(), |d| d.start);

            parts.push(BodyPart {
                delimiter: data[current.start..current.end].to_vec(),
                raw_headers,
                headers,
                body: data[body_start..body_end].to_vec(),
            });

            match next {
                Some(delimiter) => current = delimiter,
                None => {
                    debug!(boundary, "multipart message has no close delimiter");
                    break;
                }
            }
        }

        if parts.is_empty() {
            return Err(MediatorError::MalformedMultipart("no body parts".into()));
        }

        Ok(Self {
            boundary: boundary.to_string(),
            preamble,
            parts,
            closing,
        })
    }

    pub fn boundary(&self) -> &str {
        &self.boundary
    }

    pub fn parts(&self) -> &[BodyPart] {
        &self.parts
    }

    /// Replace the raw body of part `index`, keeping its headers and framing.
    pub fn set_body(&mut self, index: usize, body: Vec<u8>) -> Result<()> {
        if contains_delimiter(&body, &dash_boundary(&self.boundary)) {
            return Err(MediatorError::BoundaryCollision);
        }
        let part = self.parts.get_mut(index).ok_or_else(|| {
            MediatorError::MalformedMultipart(format!("no body part at index {index}"))
        })?;
        let line_break: &[u8] = if part.raw_headers.ends_with(b"\r\n") {
            b"\r\n"
        } else {
            b"\n"
        };
        let has_content = !body.is_empty();
        part.body = body;

        // An empty body may share the header block's blank line with the next
        // delimiter. Content placed there needs a line break of its own.
        let following = match self.parts.get_mut(index + 1) {
            Some(next) => &mut next.delimiter,
            None => &mut self.closing,
        };
        if has_content && !following.is_empty() && !starts_with_line_break(following) {
            following.splice(0..0, line_break.iter().copied());
        }
        Ok(())
    }

    pub fn write_to<W: Write>(&self, out: &mut W) -> std::io::Result<()> {
        out.write_all(&self.preamble)?;
        for part in &self.parts {
            out.write_all(&part.delimiter)?;
            out.write_all(&part.raw_headers)?;
            out.write_all(&part.body)?;
        }
        out.write_all(&self.closing)
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.encoded_len());
        // Writing into a Vec cannot fail
        let _ = self.write_to(&mut out);
        out
    }

    fn encoded_len(&self) -> usize {
        self.preamble.len()
            + self
                .parts
                .iter()
                .map(|p| p.delimiter.len() + p.raw_headers.len() + p.body.len())
                .sum::<usize>()
            + self.closing.len()
    }
}

/// Extract a parameter (e.g. `boundary`) from a Content-Type value.
pub fn content_type_param(content_type: &str, name: &str) -> Option<String> {
    split_params(content_type)
        .into_iter()
        .skip(1)
        .find_map(|param| {
            let (key, value) = param.split_once('=')?;
            if !key.trim().eq_ignore_ascii_case(name) {
                return None;
            }
            let value = value.trim();
            let unquoted = value
                .strip_prefix('"')
                .and_then(|v| v.strip_suffix('"'))
                .unwrap_or(value);
            Some(unquoted.to_string())
        })
}

/// Split on `;` outside double quotes.
fn split_params(value: &str) -> Vec<&str> {
    let mut out = Vec::new();
    let mut in_quotes = false;
    let mut start = 0;
    for (i, c) in value.char_indices() {
        match c {
            '"' => in_quotes = !in_quotes,
            ';' if !in_quotes => {
                out.push(&value[start..i]);
                start = i + 1;
            }
            _ => {}
        }
    }
    out.push(&value[start..]);
    out
}

fn dash_boundary(boundary: &str) -> Vec<u8> {
    let mut dash = b"--".to_vec();
    dash.extend_from_slice(boundary.as_bytes());
    dash
}

fn starts_with_line_break(segment: &[u8]) -> bool {
    segment.starts_with(b"\n") || segment.starts_with(b"\r\n")
}

/// Whether `body` contains a line starting with the dash boundary.
fn contains_delimiter(body: &[u8], dash: &[u8]) -> bool {
    if body.starts_with(dash) {
        return true;
    }
    body.iter()
        .enumerate()
        .any(|(i, &b)| b == b'\n' && body[i + 1..].starts_with(dash))
}

/// Find the next delimiter line at or after `from`.
fn find_delimiter(data: &[u8], dash: &[u8], from: usize) -> Option<Delimiter> {
    let mut i = from;
    while i + dash.len() <= data.len() {
        let at_line_start = i == 0 || data[i - 1] == b'\n';
        if at_line_start && data[i..].starts_with(dash) {
            let after = i + dash.len();
            let is_close = data[after..].starts_with(b"--");

            let line_end = data[after..]
                .iter()
                .position(|&b| b == b'\n')
                .map_or(data.len(), |p| after + p + 1);

            // Only transport padding may follow an open delimiter
            let padding_ok = data[after..line_end]
                .iter()
                .all(|&b| matches!(b, b' ' | b'\t' | b'\r' | b'\n'));

            if is_close || padding_ok {
                let mut start = i;
                if i > 0 {
                    start -= 1;
                    if start > 0 && data[start - 1] == b'\r' {
                        start -= 1;
                    }
                }
                return Some(Delimiter {
                    start: start.max(from),
                    end: line_end,
                    is_close,
                });
            }
        }
        i += 1;
    }
    None
}

/// Index just past the blank line ending the header block at `start`.
fn end_of_headers(data: &[u8], start: usize) -> Result<usize> {
    let mut pos = start;
    loop {
        if data[pos..].starts_with(b"\r\n") {
            return Ok(pos + 2);
        }
        if data[pos..].starts_with(b"\n") {
            return Ok(pos + 1);
        }
        match data[pos..].iter().position(|&b| b == b'\n') {
            Some(offset) => pos += offset + 1,
            None => {
                return Err(MediatorError::MalformedMultipart(
                    "unterminated part headers".into(),
                ))
            }
        }
    }
}

fn parse_headers(raw: &[u8]) -> Vec<Header> {
    let text = String::from_utf8_lossy(raw);
    let mut headers: Vec<Header> = Vec::new();

    for line in text.split('\n') {
        let line = line.strip_suffix('\r').unwrap_or(line);
        if line.is_empty() {
            break;
        }
        if line.starts_with(' ') || line.starts_with('\t') {
            if let Some(last) = headers.last_mut() {
                last.value.push(' ');
                last.value.push_str(line.trim());
            }
            continue;
        }
        if let Some((name, value)) = line.split_once(':') {
            headers.push(Header {
                name: name.trim().to_string(),
                value: value.trim().to_string(),
            });
        }
    }
    headers
}
