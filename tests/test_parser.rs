use bytes::BytesMut;
use fileserver::http::parser::{
    ContentScan, HeadProgress, ProtocolError, closing_delimiter, extract_filename, is_flat_name,
    parse_head, parse_header_line, parse_request_line, scan_content, take_line,
};
use fileserver::http::request::{Method, Phase, RequestState};

fn feed(req: &mut RequestState, bytes: &[u8]) -> Result<HeadProgress, ProtocolError> {
    req.pending.extend_from_slice(bytes);
    parse_head(req)
}

#[test]
fn test_parse_simple_get_request() {
    let mut req = RequestState::new();
    let progress = feed(&mut req, b"GET / HTTP/1.1\r\nHost: example.com\r\n\r\n").unwrap();

    assert_eq!(progress, HeadProgress::Ready);
    assert_eq!(req.method, Some(Method::GET));
    assert_eq!(req.resource, "/");
    assert_eq!(req.version, "HTTP/1.1");
    assert_eq!(req.header("host"), Some("example.com"));
    assert_eq!(req.phase(), Phase::Body);
    assert!(req.pending.is_empty());
}

#[test]
fn test_parse_head_across_many_reads() {
    let mut req = RequestState::new();
    let raw = b"GET /downl/a.txt HTTP/1.1\r\nHost: localhost\r\nAccept: */*\r\n\r\n";

    let mut progress = HeadProgress::NeedMore;
    for byte in raw.iter() {
        progress = feed(&mut req, std::slice::from_ref(byte)).unwrap();
        if progress == HeadProgress::Ready {
            break;
        }
    }

    assert_eq!(progress, HeadProgress::Ready);
    assert_eq!(req.resource, "/downl/a.txt");
    assert_eq!(req.header("Accept"), Some("*/*"));
}

#[test]
fn test_request_line_moves_to_head_before_headers_end() {
    let mut req = RequestState::new();
    let progress = feed(&mut req, b"POST / HTTP/1.1\r\nContent-Ty").unwrap();

    assert_eq!(progress, HeadProgress::NeedMore);
    assert_eq!(req.phase(), Phase::Head);
    assert_eq!(&req.pending[..], b"Content-Ty");
}

#[test]
fn test_body_bytes_stay_buffered() {
    let mut req = RequestState::new();
    feed(&mut req, b"PUT /put/x HTTP/1.1\r\nContent-Length: 5\r\n\r\nhello").unwrap();

    assert_eq!(req.content_length, Some(5));
    assert_eq!(&req.pending[..], b"hello");
}

#[test]
fn test_multipart_content_type_exposes_boundary() {
    let mut req = RequestState::new();
    feed(
        &mut req,
        b"POST / HTTP/1.1\r\nContent-Type: multipart/form-data; boundary=----abc123\r\n\r\n",
    )
    .unwrap();

    assert!(req.is_multipart());
    assert_eq!(req.boundary(), Some("----abc123"));
    assert_eq!(req.header("Content-Type"), Some("multipart/form-data"));
}

#[test]
fn test_parse_invalid_method() {
    assert_eq!(
        parse_request_line(b"BREW /pot HTTP/1.1"),
        Err(ProtocolError::InvalidMethod)
    );
}

#[test]
fn test_parse_truncated_request_line() {
    assert_eq!(
        parse_request_line(b"GET /"),
        Err(ProtocolError::InvalidRequestLine)
    );
}

#[test]
fn test_parse_header_without_colon() {
    assert_eq!(
        parse_header_line(b"NoColonHere"),
        Err(ProtocolError::InvalidHeader)
    );
}

#[test]
fn test_header_value_is_trimmed() {
    let (key, value) = parse_header_line(b"X-Test:   spaced value  ").unwrap();
    assert_eq!(key, "X-Test");
    assert_eq!(value, "spaced value");
}

#[test]
fn test_take_line_handles_empty_line() {
    let mut buf = BytesMut::from(&b"\r\nrest"[..]);
    let line = take_line(&mut buf).unwrap();
    assert!(line.is_empty());
    assert_eq!(&buf[..], b"rest");
}

#[test]
fn test_extract_filename_quoted() {
    let line = br#"Content-Disposition: form-data; name="file"; filename="report 2024.pdf""#;
    assert_eq!(extract_filename(line), Some("report2024.pdf".to_string()));
}

#[test]
fn test_extract_filename_missing() {
    assert_eq!(extract_filename(b"Content-Disposition: form-data; name=\"x\""), None);
}

#[test]
fn test_flat_names() {
    assert!(is_flat_name("notes.txt"));
    assert!(!is_flat_name(""));
    assert!(!is_flat_name(".."));
    assert!(!is_flat_name("a/b"));
    assert!(!is_flat_name("a\\b"));
}

#[test]
fn test_scan_content_in_pieces() {
    let closing = closing_delimiter("XYZ");
    assert_eq!(closing, b"\r\n--XYZ--\r\n".to_vec());

    assert_eq!(scan_content(b"abc\r\n--X", &closing), ContentScan::Store(3));
    assert_eq!(scan_content(b"\r\n--X", &closing), ContentScan::NeedMore);
    assert_eq!(scan_content(b"\r\n--XYZ--\r\n", &closing), ContentScan::Closing);
    assert_eq!(scan_content(b"\r\nline two", &closing), ContentScan::Store(10));
}
