use crate::http::request::{Method, Phase, RequestState};
use bytes::BytesMut;
use std::fmt;

/// A request that cannot be understood. Always answered with a redirect,
/// the connection stays open.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    InvalidRequestLine,
    InvalidMethod,
    InvalidHeader,
    MissingBoundary,
    BoundaryMismatch,
    InvalidFilename,
    Unsupported,
}

impl fmt::Display for ProtocolError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let msg = match self {
            ProtocolError::InvalidRequestLine => "malformed request line",
            ProtocolError::InvalidMethod => "unknown request method",
            ProtocolError::InvalidHeader => "malformed header line",
            ProtocolError::MissingBoundary => "multipart body without boundary",
            ProtocolError::BoundaryMismatch => "multipart body does not open with its boundary",
            ProtocolError::InvalidFilename => "upload filename missing or not a flat name",
            ProtocolError::Unsupported => "unsupported request shape",
        };
        f.write_str(msg)
    }
}

impl std::error::Error for ProtocolError {}

/// Where the request head parser stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeadProgress {
    /// The request line or headers are still incomplete.
    NeedMore,
    /// Headers are done; the request is in its body phase.
    Ready,
}

/// Result of scanning upload content for the closing delimiter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContentScan {
    /// The first `n` bytes are file content and can be written out.
    Store(usize),
    /// The buffer starts with the closing delimiter.
    Closing,
    /// The buffer starts with what may become the closing delimiter.
    NeedMore,
}

/// Splits one CRLF-terminated line off the front of `buf`, without the CRLF.
pub fn take_line(buf: &mut BytesMut) -> Option<BytesMut> {
    let end = find_crlf(buf)?;
    let mut line = buf.split_to(end + 2);
    line.truncate(end);
    Some(line)
}

fn find_crlf(buf: &[u8]) -> Option<usize> {
    buf.windows(2).position(|w| w == b"\r\n")
}

/// Runs the INIT and HEAD phases against whatever `req.pending` holds.
pub fn parse_head(req: &mut RequestState) -> Result<HeadProgress, ProtocolError> {
    if req.phase == Phase::Init {
        let Some(line) = take_line(&mut req.pending) else {
            return Ok(HeadProgress::NeedMore);
        };
        let (method, resource, version) = parse_request_line(&line)?;
        req.method = Some(method);
        req.resource = resource;
        req.version = version;
        req.phase.advance(Phase::Head);
    }

    if req.phase == Phase::Head {
        while let Some(line) = take_line(&mut req.pending) {
            if line.is_empty() {
                req.phase.advance(Phase::Body);
                return Ok(HeadProgress::Ready);
            }
            let (key, value) = parse_header_line(&line)?;
            apply_header(req, key, value);
        }
        return Ok(HeadProgress::NeedMore);
    }

    Ok(HeadProgress::Ready)
}

pub fn parse_request_line(line: &[u8]) -> Result<(Method, String, String), ProtocolError> {
    let line = std::str::from_utf8(line).map_err(|_| ProtocolError::InvalidRequestLine)?;
    let mut parts = line.split_whitespace();

    let method = parts.next().ok_or(ProtocolError::InvalidRequestLine)?;
    let resource = parts.next().ok_or(ProtocolError::InvalidRequestLine)?;
    let version = parts.next().ok_or(ProtocolError::InvalidRequestLine)?;

    let method = Method::from_str(method).ok_or(ProtocolError::InvalidMethod)?;
    Ok((method, resource.to_string(), version.to_string()))
}

pub fn parse_header_line(line: &[u8]) -> Result<(String, String), ProtocolError> {
    let line = std::str::from_utf8(line).map_err(|_| ProtocolError::InvalidHeader)?;
    let (key, value) = line.split_once(':').ok_or(ProtocolError::InvalidHeader)?;
    let key = key.trim();
    if key.is_empty() {
        return Err(ProtocolError::InvalidHeader);
    }
    Ok((key.to_string(), value.trim().to_string()))
}

/// Splits `type; key=value` into the base type and its parameter.
pub fn split_content_type(value: &str) -> (&str, Option<(&str, &str)>) {
    match value.split_once(';') {
        Some((base, param)) => {
            let param = param
                .trim()
                .split_once('=')
                .map(|(k, v)| (k.trim(), v.trim().trim_matches('"')));
            (base.trim(), param)
        }
        None => (value, None),
    }
}

fn apply_header(req: &mut RequestState, key: String, value: String) {
    if key.eq_ignore_ascii_case("Content-Type") {
        let (base, param) = split_content_type(&value);
        if let Some((k, v)) = param {
            req.headers.insert(k.to_string(), v.to_string());
        }
        req.headers.insert("Content-Type".to_string(), base.to_string());
        return;
    }
    if key.eq_ignore_ascii_case("Content-Length") {
        req.content_length = value.parse().ok();
    }
    req.headers.insert(key, value);
}

/// Pulls the `filename` parameter out of a part header line, whitespace removed.
pub fn extract_filename(line: &[u8]) -> Option<String> {
    const KEY: &[u8] = b"filename=";
    let start = line.windows(KEY.len()).position(|w| w == KEY)? + KEY.len();
    let rest = &line[start..];

    let raw = match rest.first() {
        Some(b'"') => {
            let rest = &rest[1..];
            let end = rest.iter().position(|&b| b == b'"').unwrap_or(rest.len());
            &rest[..end]
        }
        _ => {
            let end = rest.iter().position(|&b| b == b';').unwrap_or(rest.len());
            &rest[..end]
        }
    };

    let name: String = String::from_utf8_lossy(raw)
        .chars()
        .filter(|c| !c.is_whitespace())
        .collect();
    Some(name)
}

/// True when `name` addresses a file directly inside the serving directory.
pub fn is_flat_name(name: &str) -> bool {
    !name.is_empty()
        && name != "."
        && name != ".."
        && !name.contains(['/', '\\', '\0'])
}

/// `\r\n--BOUNDARY--\r\n`
pub fn closing_delimiter(boundary: &str) -> Vec<u8> {
    let mut delim = Vec::with_capacity(boundary.len() + 8);
    delim.extend_from_slice(b"\r\n--");
    delim.extend_from_slice(boundary.as_bytes());
    delim.extend_from_slice(b"--\r\n");
    delim
}

/// Decides how much of `buf` is settled file content.
///
/// Bytes before the first `\r` are always content. A `\r` that starts the
/// full closing delimiter ends the content; one that could still grow into
/// it holds the rest back until more bytes arrive.
pub fn scan_content(buf: &[u8], closing: &[u8]) -> ContentScan {
    if buf.is_empty() {
        return ContentScan::NeedMore;
    }
    let Some(cr) = buf.iter().position(|&b| b == b'\r') else {
        return ContentScan::Store(buf.len());
    };

    let tail = &buf[cr..];
    let candidate = if tail.len() >= closing.len() {
        &tail[..closing.len()] == closing
    } else {
        closing.starts_with(tail)
    };

    if candidate {
        return match (cr, tail.len() >= closing.len()) {
            (0, true) => ContentScan::Closing,
            (0, false) => ContentScan::NeedMore,
            _ => ContentScan::Store(cr),
        };
    }

    match buf[cr + 1..].iter().position(|&b| b == b'\r') {
        Some(next) => ContentScan::Store(cr + 1 + next),
        None => ContentScan::Store(buf.len()),
    }
}
