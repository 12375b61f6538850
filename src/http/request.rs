use bytes::BytesMut;
use std::collections::HashMap;

/// Processing phase shared by request and response state.
///
/// Phases only move forward: `Init < Head < Body < {Complete, Error}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Init,
    Head,
    Body,
    Complete,
    Error,
}

impl Phase {
    pub fn rank(self) -> u8 {
        match self {
            Phase::Init => 0,
            Phase::Head => 1,
            Phase::Body => 2,
            Phase::Complete | Phase::Error => 3,
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, Phase::Complete | Phase::Error)
    }

    /// Moves `self` to `next`, refusing to go backwards or leave a terminal
    /// phase. Returns whether the phase changed.
    pub(crate) fn advance(&mut self, next: Phase) -> bool {
        if self.is_terminal() || next.rank() < self.rank() || next == *self {
            return false;
        }
        *self = next;
        true
    }
}

/// Progress through a multipart upload body.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum UploadPhase {
    /// Waiting for the opening `--boundary` line.
    Begin,
    /// Reading part headers.
    Head,
    /// Streaming part content to disk.
    Content,
    Complete,
}

/// HTTP request methods.
///
/// The server acts on GET, POST and PUT. Other methods are parsed but
/// answered with a redirect to the listing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    /// GET - Retrieve a listing or file
    GET,
    /// POST - Upload a multipart form
    POST,
    /// PUT - Store the raw body
    PUT,
    DELETE,
    HEAD,
    OPTIONS,
    PATCH,
}

impl Method {
    /// Parses an HTTP method from a string.
    ///
    /// ```
    /// # use fileserver::http::request::Method;
    /// assert_eq!(Method::from_str("PUT"), Some(Method::PUT));
    /// assert_eq!(Method::from_str("put"), None);
    /// ```
    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "GET" => Some(Method::GET),
            "POST" => Some(Method::POST),
            "PUT" => Some(Method::PUT),
            "DELETE" => Some(Method::DELETE),
            "HEAD" => Some(Method::HEAD),
            "OPTIONS" => Some(Method::OPTIONS),
            "PATCH" => Some(Method::PATCH),
            _ => None,
        }
    }
}

/// Partially received request for one connection.
///
/// Lives in the connection store between Readable events. `pending` only
/// ever holds bytes that no parse step has consumed yet.
#[derive(Debug)]
pub struct RequestState {
    pub(crate) phase: Phase,
    pub method: Option<Method>,
    pub resource: String,
    pub version: String,
    /// Header fields keyed by name. A multipart Content-Type also contributes
    /// a `boundary` entry.
    pub headers: HashMap<String, String>,
    pub content_length: Option<u64>,
    pub pending: BytesMut,
    pub(crate) upload: UploadPhase,
    pub upload_target: String,
}

impl Default for RequestState {
    fn default() -> Self {
        Self {
            phase: Phase::Init,
            method: None,
            resource: String::new(),
            version: String::new(),
            headers: HashMap::new(),
            content_length: None,
            pending: BytesMut::with_capacity(4096),
            upload: UploadPhase::Begin,
            upload_target: String::new(),
        }
    }
}

impl RequestState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn upload_phase(&self) -> UploadPhase {
        self.upload
    }

    /// Steps the upload sub-machine forward. Returns whether it moved.
    pub(crate) fn advance_upload(&mut self, next: UploadPhase) -> bool {
        if next <= self.upload {
            return false;
        }
        self.upload = next;
        true
    }

    /// Looks up a header ignoring ASCII case.
    pub fn header(&self, key: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(key))
            .map(|(_, v)| v.as_str())
    }

    /// The boundary token lifted out of a multipart Content-Type, if any.
    pub fn boundary(&self) -> Option<&str> {
        self.header("boundary").filter(|b| !b.is_empty())
    }

    pub fn is_multipart(&self) -> bool {
        self.header("Content-Type")
            .map(|v| v.eq_ignore_ascii_case("multipart/form-data"))
            .unwrap_or(false)
    }
}
