use crate::http::request::Phase;
use crate::http::response::{Body, ResponseState};
use crate::server::socket;
use std::io;
use std::os::fd::{AsRawFd, RawFd};

/// Where a send pass left the response.
#[derive(Debug)]
pub enum Flush {
    /// The socket stopped accepting bytes; wait for the next write readiness.
    Paused,
    /// Head and body are fully transmitted.
    Finished,
    Failed(io::Error),
}

/// Sends as much of `resp` as the socket takes without blocking.
///
/// The head goes out first; once it is complete `sent` is reset and the
/// body follows, either buffered or through sendfile for file bodies.
pub fn flush(fd: RawFd, resp: &mut ResponseState) -> Flush {
    loop {
        let step = match resp.phase {
            Phase::Head => socket::send(fd, &resp.pre_body[resp.sent..]),
            Phase::Body => {
                let total = resp.body.len();
                if resp.sent as u64 >= total {
                    resp.phase.advance(Phase::Complete);
                    continue;
                }
                let remaining = (total - resp.sent as u64) as usize;
                match &resp.body {
                    Body::Html(bytes) => socket::send(fd, &bytes[resp.sent..]),
                    Body::File { file, .. } => {
                        socket::sendfile(fd, file.as_raw_fd(), resp.sent as u64, remaining)
                    }
                    Body::Empty => unreachable!("empty body has nothing remaining"),
                }
            }
            Phase::Complete => return Flush::Finished,
            Phase::Init | Phase::Error => {
                return Flush::Failed(io::Error::other("response is not ready to send"));
            }
        };

        match step {
            Ok(0) => {
                resp.phase.advance(Phase::Error);
                return Flush::Failed(io::Error::new(
                    io::ErrorKind::WriteZero,
                    "peer stopped accepting data",
                ));
            }
            Ok(n) => {
                resp.sent += n;
                if resp.phase == Phase::Head && resp.sent >= resp.pre_body.len() {
                    resp.phase.advance(Phase::Body);
                    resp.sent = 0;
                }
            }
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => return Flush::Paused,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => {
                resp.phase.advance(Phase::Error);
                return Flush::Failed(e);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::response::Setup;
    use crate::listing::ServeRoot;
    use std::io::Read;
    use std::net::{TcpListener, TcpStream};
    use std::thread;
    use std::time::Duration;

    fn connected_pair() -> (TcpStream, TcpStream) {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let client = TcpStream::connect(listener.local_addr().unwrap()).unwrap();
        let (server, _) = listener.accept().unwrap();
        (server, client)
    }

    #[test]
    fn paused_file_body_resumes_from_offset() {
        let dir = std::env::temp_dir()
            .join(format!("fileserver-writer-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let payload: Vec<u8> = (0..16_000_000u32).map(|i| (i % 253) as u8).collect();
        std::fs::write(dir.join("big.bin"), &payload).unwrap();

        let root = ServeRoot::new(&dir, "unused.html");
        let mut resp = ResponseState::new("/downl/big.bin");
        assert_eq!(resp.setup(&root, Vec::new), Setup::Ready);
        let head_len = resp.pre_body().len();
        let total = head_len + payload.len();

        let (server, mut client) = connected_pair();
        server.set_nonblocking(true).unwrap();
        let fd = server.as_raw_fd();

        // Nobody reads yet, so the socket fills up partway through the body.
        assert!(matches!(flush(fd, &mut resp), Flush::Paused));
        assert_eq!(resp.phase(), Phase::Body);
        let mut last = resp.sent();
        assert!(last > 0);
        assert!((last as u64) < resp.body().len());

        let reader = thread::spawn(move || {
            let mut received = vec![0u8; total];
            client.read_exact(&mut received).unwrap();
            received
        });

        loop {
            match flush(fd, &mut resp) {
                Flush::Paused => {
                    assert_eq!(resp.phase(), Phase::Body);
                    assert!(resp.sent() >= last);
                    last = resp.sent();
                    thread::sleep(Duration::from_millis(1));
                }
                Flush::Finished => break,
                Flush::Failed(e) => panic!("send failed: {}", e),
            }
        }
        assert_eq!(resp.phase(), Phase::Complete);
        assert_eq!(resp.sent() as u64, resp.body().len());

        let received = reader.join().unwrap();
        assert!(received[head_len..] == payload[..]);
        let _ = std::fs::remove_dir_all(dir);
    }

    #[test]
    fn html_body_is_sent_after_head() {
        let dir = std::env::temp_dir()
            .join(format!("fileserver-writer-html-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let root = ServeRoot::new(&dir, "unused.html");
        let mut resp = ResponseState::new("/");
        assert_eq!(resp.setup(&root, Vec::new), Setup::Ready);
        let expected_len = resp.pre_body().len() + resp.body().len() as usize;

        let (server, mut client) = connected_pair();
        server.set_nonblocking(true).unwrap();
        assert!(matches!(flush(server.as_raw_fd(), &mut resp), Flush::Finished));

        let mut received = vec![0u8; expected_len];
        client.read_exact(&mut received).unwrap();
        assert!(received.starts_with(b"HTTP/1.1 200 OK\r\n"));
        let _ = std::fs::remove_dir_all(dir);
    }
}
