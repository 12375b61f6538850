use crate::http::parser::is_flat_name;
use crate::http::request::Phase;
use crate::listing::ServeRoot;
use std::fs::File;
use std::io;
use tracing::{debug, info, warn};

/// Target the request side hands over when it only wants the client
/// sent back to the listing.
pub const REDIRECT_TARGET: &str = "/redirect";

const HTTP_VERSION: &str = "HTTP/1.1";

/// HTTP status codes the server answers with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusCode {
    /// 200 OK
    Ok,
    /// 302 Moved Temporarily
    Found,
}

impl StatusCode {
    /// ```
    /// # use fileserver::http::response::StatusCode;
    /// assert_eq!(StatusCode::Found.as_u16(), 302);
    /// ```
    pub fn as_u16(&self) -> u16 {
        match self {
            StatusCode::Ok => 200,
            StatusCode::Found => 302,
        }
    }

    pub fn reason_phrase(&self) -> &'static str {
        match self {
            StatusCode::Ok => "OK",
            StatusCode::Found => "Moved Temporarily",
        }
    }
}

/// What a response target asks for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Route {
    /// `/`
    Listing,
    /// `/downl/<name>`
    Download(String),
    /// `/del/<name>`
    Delete(String),
    /// `/put/<name>`
    Store(String),
    /// Anything else, including [`REDIRECT_TARGET`].
    Redirect,
}

impl Route {
    /// Splits `/op/name` and maps the operation. Targets without a usable
    /// flat file name fall back to a redirect.
    pub fn classify(target: &str) -> Route {
        if target == "/" {
            return Route::Listing;
        }
        let Some((op, name)) = target
            .strip_prefix('/')
            .and_then(|rest| rest.split_once('/'))
        else {
            return Route::Redirect;
        };
        if !is_flat_name(name) {
            return Route::Redirect;
        }
        match op {
            "downl" => Route::Download(name.to_string()),
            "del" => Route::Delete(name.to_string()),
            "put" => Route::Store(name.to_string()),
            _ => Route::Redirect,
        }
    }
}

/// Message body of a prepared response.
#[derive(Debug)]
pub enum Body {
    Html(Vec<u8>),
    /// An open file streamed with sendfile. Closed when the response is dropped.
    File { file: File, len: u64 },
    Empty,
}

impl Body {
    pub fn len(&self) -> u64 {
        match self {
            Body::Html(bytes) => bytes.len() as u64,
            Body::File { len, .. } => *len,
            Body::Empty => 0,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Outcome of preparing a response from its target.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Setup {
    Ready,
    /// The target could not be served as asked; start over with this target.
    Reroute(&'static str),
}

/// Status line plus headers, emitted in insertion order.
pub struct ResponseHead {
    status: StatusCode,
    headers: Vec<(&'static str, String)>,
}

impl ResponseHead {
    pub fn new(status: StatusCode) -> Self {
        Self {
            status,
            headers: Vec::with_capacity(5),
        }
    }

    pub fn header(mut self, key: &'static str, value: impl Into<String>) -> Self {
        self.headers.push((key, value.into()));
        self
    }

    /// Serializes the head, always closing with `Connection: keep-alive`
    /// and the blank separator line.
    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(128);
        buf.extend_from_slice(
            format!(
                "{} {} {}\r\n",
                HTTP_VERSION,
                self.status.as_u16(),
                self.status.reason_phrase()
            )
            .as_bytes(),
        );
        for (k, v) in &self.headers {
            buf.extend_from_slice(k.as_bytes());
            buf.extend_from_slice(b": ");
            buf.extend_from_slice(v.as_bytes());
            buf.extend_from_slice(b"\r\n");
        }
        buf.extend_from_slice(b"Connection: keep-alive\r\n\r\n");
        buf
    }
}

const HTML_TYPE: &str = "text/html;charset=UTF-8";
const FILE_TYPE: &str = "application/octet-stream";

/// Partially sent response for one connection.
///
/// `sent` counts bytes of the current segment (head, then body) already
/// written, and never exceeds that segment's length.
#[derive(Debug)]
pub struct ResponseState {
    pub(crate) phase: Phase,
    pub target: String,
    pub(crate) pre_body: Vec<u8>,
    pub(crate) body: Body,
    pub(crate) sent: usize,
}

impl ResponseState {
    pub fn new(target: impl Into<String>) -> Self {
        Self {
            phase: Phase::Init,
            target: target.into(),
            pre_body: Vec::new(),
            body: Body::Empty,
            sent: 0,
        }
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn pre_body(&self) -> &[u8] {
        &self.pre_body
    }

    pub fn body(&self) -> &Body {
        &self.body
    }

    pub fn sent(&self) -> usize {
        self.sent
    }

    /// Classifies the target and builds the head and body.
    ///
    /// `put_body` is only called for a PUT-store target and yields the bytes
    /// the request side has buffered so far.
    pub fn setup(&mut self, root: &ServeRoot, put_body: impl FnOnce() -> Vec<u8>) -> Setup {
        debug_assert_eq!(self.phase, Phase::Init);

        let route = Route::classify(&self.target);
        debug!(resource = %self.target, route = ?route, "preparing response");

        let (head, body) = match route {
            Route::Listing => {
                let html = root.render_listing().into_bytes();
                let head = ResponseHead::new(StatusCode::Ok)
                    .header("Content-Length", html.len().to_string())
                    .header("Content-Type", HTML_TYPE);
                (head, Body::Html(html))
            }
            Route::Download(name) => match open_for_download(root, &name) {
                Ok((file, len)) => {
                    info!(file = %name, bytes = len, "serving download");
                    let head = ResponseHead::new(StatusCode::Ok)
                        .header("Content-Length", len.to_string())
                        .header("Content-Type", FILE_TYPE)
                        .header("Content-Range", format!("0-{}", len.saturating_sub(1)));
                    (head, Body::File { file, len })
                }
                Err(e) => {
                    warn!(file = %name, error = %e, "download unavailable, redirecting");
                    return Setup::Reroute(REDIRECT_TARGET);
                }
            },
            Route::Delete(name) => {
                match std::fs::remove_file(root.file(&name)) {
                    Ok(()) => info!(file = %name, "file deleted"),
                    Err(e) => warn!(file = %name, error = %e, "delete failed"),
                }
                return Setup::Reroute("/");
            }
            Route::Store(name) => match std::fs::write(root.file(&name), put_body()) {
                Ok(()) => {
                    info!(file = %name, "PUT body stored");
                    let head = ResponseHead::new(StatusCode::Ok)
                        .header("Content-Length", "0")
                        .header("Content-Type", HTML_TYPE);
                    (head, Body::Empty)
                }
                Err(e) => {
                    warn!(file = %name, error = %e, "PUT store failed, redirecting");
                    return Setup::Reroute(REDIRECT_TARGET);
                }
            },
            Route::Redirect => {
                let head = ResponseHead::new(StatusCode::Found)
                    .header("Content-Length", "0")
                    .header("Content-Type", HTML_TYPE)
                    .header("Location", "/");
                (head, Body::Empty)
            }
        };

        self.pre_body = head.encode();
        self.body = body;
        self.sent = 0;
        self.phase.advance(Phase::Head);
        Setup::Ready
    }
}

fn open_for_download(root: &ServeRoot, name: &str) -> io::Result<(File, u64)> {
    let file = File::open(root.file(name))?;
    let meta = file.metadata()?;
    if !meta.is_file() {
        return Err(io::Error::new(io::ErrorKind::InvalidInput, "not a regular file"));
    }
    Ok((file, meta.len()))
}
