//! Multipart upload sub-machine.
//!
//! Runs inside the BODY phase of a multipart POST and streams the single
//! uploaded part into the serving directory:
//!
//! ```text
//! Begin ──"--boundary"──▶ Head ──blank line──▶ Content ──closing──▶ Complete
//! ```

use crate::http::parser::{
    ContentScan, ProtocolError, closing_delimiter, extract_filename, is_flat_name, scan_content,
    take_line,
};
use crate::http::request::{RequestState, UploadPhase};
use bytes::Buf;
use std::fmt;
use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::path::Path;
use tracing::{debug, info};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UploadProgress {
    NeedMore,
    Done,
}

#[derive(Debug)]
pub enum UploadError {
    Protocol(ProtocolError),
    Storage(io::Error),
}

impl fmt::Display for UploadError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UploadError::Protocol(e) => write!(f, "{}", e),
            UploadError::Storage(e) => write!(f, "storing upload failed: {}", e),
        }
    }
}

impl std::error::Error for UploadError {}

impl From<ProtocolError> for UploadError {
    fn from(e: ProtocolError) -> Self {
        UploadError::Protocol(e)
    }
}

impl From<io::Error> for UploadError {
    fn from(e: io::Error) -> Self {
        UploadError::Storage(e)
    }
}

/// Feeds `req.pending` through the upload phases as far as it goes.
pub fn advance(req: &mut RequestState, serve_dir: &Path) -> Result<UploadProgress, UploadError> {
    let boundary = req
        .boundary()
        .ok_or(ProtocolError::MissingBoundary)?
        .to_string();

    if req.upload == UploadPhase::Begin {
        let Some(line) = take_line(&mut req.pending) else {
            return Ok(UploadProgress::NeedMore);
        };
        if line.len() != boundary.len() + 2
            || !line.starts_with(b"--")
            || &line[2..] != boundary.as_bytes()
        {
            return Err(ProtocolError::BoundaryMismatch.into());
        }
        req.advance_upload(UploadPhase::Head);
        debug!(boundary = %boundary, "multipart opening boundary found");
    }

    let mut fresh = false;
    if req.upload == UploadPhase::Head {
        while let Some(line) = take_line(&mut req.pending) {
            if line.is_empty() {
                if !is_flat_name(&req.upload_target) {
                    return Err(ProtocolError::InvalidFilename.into());
                }
                req.advance_upload(UploadPhase::Content);
                fresh = true;
                break;
            }
            if let Some(name) = extract_filename(&line) {
                debug!(filename = %name, "multipart part names its file");
                req.upload_target = name;
            }
        }
        if req.upload == UploadPhase::Head {
            return Ok(UploadProgress::NeedMore);
        }
    }

    if req.upload == UploadPhase::Content {
        let path = serve_dir.join(&req.upload_target);
        let mut file = open_target(&path, fresh)?;
        if fresh {
            info!(path = %path.display(), "receiving upload");
        }

        let closing = closing_delimiter(&boundary);
        loop {
            match scan_content(&req.pending, &closing) {
                ContentScan::Store(n) => {
                    file.write_all(&req.pending[..n])?;
                    req.pending.advance(n);
                }
                ContentScan::Closing => {
                    req.pending.advance(closing.len());
                    req.advance_upload(UploadPhase::Complete);
                    info!(path = %path.display(), "upload stored");
                    break;
                }
                ContentScan::NeedMore => return Ok(UploadProgress::NeedMore),
            }
        }
    }

    Ok(UploadProgress::Done)
}

/// The first write of an upload replaces any older file of the same name;
/// later chunks append.
fn open_target(path: &Path, fresh: bool) -> io::Result<File> {
    let mut opts = OpenOptions::new();
    opts.create(true);
    if fresh {
        opts.write(true).truncate(true);
    } else {
        opts.append(true);
    }
    opts.open(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::request::Phase;

    fn scratch_dir(tag: &str) -> std::path::PathBuf {
        let dir = std::env::temp_dir()
            .join(format!("fileserver-mp-{}-{}", tag, std::process::id()));
        let _ = std::fs::remove_dir_all(&dir);
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    fn multipart_request() -> RequestState {
        let mut req = RequestState::new();
        req.phase = Phase::Body;
        req.headers
            .insert("Content-Type".to_string(), "multipart/form-data".to_string());
        req.headers.insert("boundary".to_string(), "XyZ".to_string());
        req
    }

    #[test]
    fn upload_arriving_in_pieces() {
        let dir = scratch_dir("pieces");
        let mut req = multipart_request();

        req.pending.extend_from_slice(b"--XyZ\r\nContent-Disposition: form-data; ");
        assert_eq!(advance(&mut req, &dir).unwrap(), UploadProgress::NeedMore);
        assert_eq!(req.upload_phase(), UploadPhase::Head);

        req.pending
            .extend_from_slice(b"name=\"f\"; filename=\"a.bin\"\r\n\r\nfirst\r\nsec");
        assert_eq!(advance(&mut req, &dir).unwrap(), UploadProgress::NeedMore);
        assert_eq!(req.upload_phase(), UploadPhase::Content);

        req.pending.extend_from_slice(b"ond\r\n--XyZ--\r\n");
        assert_eq!(advance(&mut req, &dir).unwrap(), UploadProgress::Done);
        assert_eq!(req.upload_phase(), UploadPhase::Complete);
        assert!(req.pending.is_empty());

        let stored = std::fs::read(dir.join("a.bin")).unwrap();
        assert_eq!(stored, b"first\r\nsecond");
    }

    #[test]
    fn wrong_opening_boundary_is_rejected() {
        let dir = scratch_dir("mismatch");
        let mut req = multipart_request();
        req.pending.extend_from_slice(b"--Other\r\n");

        let err = advance(&mut req, &dir).unwrap_err();
        assert!(matches!(err, UploadError::Protocol(ProtocolError::BoundaryMismatch)));
        assert_eq!(std::fs::read_dir(&dir).unwrap().count(), 0);
    }

    #[test]
    fn path_like_filename_is_rejected() {
        let dir = scratch_dir("traversal");
        let mut req = multipart_request();
        req.pending.extend_from_slice(
            b"--XyZ\r\nContent-Disposition: form-data; filename=\"../x\"\r\n\r\n",
        );

        let err = advance(&mut req, &dir).unwrap_err();
        assert!(matches!(err, UploadError::Protocol(ProtocolError::InvalidFilename)));
    }
}
