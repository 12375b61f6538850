use crate::http::multipart::{self, UploadProgress};
use crate::http::parser::{HeadProgress, ProtocolError, parse_head};
use crate::http::request::{Method, Phase, RequestState};
use crate::http::response::{REDIRECT_TARGET, ResponseState, Setup};
use crate::http::writer::{Flush, flush};
use crate::listing::ServeRoot;
use crate::server::poller::Interest;
use crate::server::socket::{self, Shutdown};
use crate::server::store::ConnectionStore;
use std::io;
use std::os::fd::RawFd;
use tracing::{debug, info, warn};

const RECV_CHUNK: usize = 2048;

/// What the caller must do with the fd once a step has returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Next {
    Arm(Interest),
    Close(Shutdown),
}

/// Shared pieces a protocol step works against.
pub struct Context<'a> {
    pub store: &'a ConnectionStore,
    pub root: &'a ServeRoot,
}

/// Outcome of running the parse ladder over the buffered bytes.
#[derive(Debug, PartialEq, Eq)]
enum Drive {
    /// More bytes are needed.
    Pending,
    /// A response target is known. The request may still be in its body phase.
    Respond(String),
}

/// Reads everything the socket holds and advances the request state machine.
pub fn on_readable(fd: RawFd, ctx: &Context<'_>) -> Next {
    let mut req = ctx.store.take_request(fd);
    let mut chunk = [0u8; RECV_CHUNK];

    let paused = loop {
        match socket::recv(fd, &mut chunk) {
            Ok(0) => {
                info!(fd, "client closed the connection");
                req.phase.advance(Phase::Error);
                break false;
            }
            Ok(n) => req.pending.extend_from_slice(&chunk[..n]),
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => break true,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => {
                warn!(fd, error = %e, "receive failed");
                req.phase.advance(Phase::Error);
                break false;
            }
        }

        if let Drive::Respond(target) = drive(fd, &mut req, ctx.root) {
            ctx.store.set_response_target(fd, &target);
            break false;
        }
    };

    match req.phase() {
        Phase::Error => {
            ctx.store.forget(fd);
            Next::Close(Shutdown::Both)
        }
        Phase::Complete => {
            debug!(fd, "request fully absorbed");
            Next::Arm(Interest::ReadWrite)
        }
        _ => {
            ctx.store.put_request(fd, req);
            if paused && !ctx.store.has_response(fd) {
                Next::Arm(Interest::Read)
            } else {
                Next::Arm(Interest::ReadWrite)
            }
        }
    }
}

fn drive(fd: RawFd, req: &mut RequestState, root: &ServeRoot) -> Drive {
    let was_init = req.phase == Phase::Init;
    match parse_head(req) {
        Ok(HeadProgress::NeedMore) => {
            if was_init && req.phase == Phase::Head {
                debug!(fd, method = ?req.method, resource = %req.resource, "request line parsed");
            }
            return Drive::Pending;
        }
        Ok(HeadProgress::Ready) => {}
        Err(e) => return redirect(fd, req, e),
    }

    match req.method {
        Some(Method::GET) => {
            req.phase.advance(Phase::Complete);
            info!(fd, resource = %req.resource, "GET");
            Drive::Respond(req.resource.clone())
        }
        Some(Method::POST) if req.is_multipart() => match multipart::advance(req, root.dir()) {
            Ok(UploadProgress::NeedMore) => Drive::Pending,
            Ok(UploadProgress::Done) => {
                req.phase.advance(Phase::Complete);
                info!(fd, file = %req.upload_target, "POST upload finished");
                Drive::Respond(REDIRECT_TARGET.to_string())
            }
            Err(e) => {
                warn!(fd, error = %e, "upload abandoned");
                req.phase.advance(Phase::Complete);
                Drive::Respond(REDIRECT_TARGET.to_string())
            }
        },
        Some(Method::PUT) => {
            debug!(fd, resource = %req.resource, bytes = req.pending.len(), "PUT body buffered");
            Drive::Respond(req.resource.clone())
        }
        _ => redirect(fd, req, ProtocolError::Unsupported),
    }
}

fn redirect(fd: RawFd, req: &mut RequestState, err: ProtocolError) -> Drive {
    warn!(fd, error = %err, "answering with a redirect");
    req.phase.advance(Phase::Complete);
    Drive::Respond(REDIRECT_TARGET.to_string())
}

/// Prepares the pending response on first entry, then sends what the socket accepts.
pub fn on_writable(fd: RawFd, ctx: &Context<'_>) -> Next {
    let Some(mut resp) = ctx.store.take_response(fd) else {
        debug!(fd, "writable with no response pending");
        return Next::Arm(Interest::Read);
    };

    if resp.phase() == Phase::Init {
        if let Setup::Reroute(target) = resp.setup(ctx.root, || ctx.store.request_body(fd)) {
            resp = ResponseState::new(target);
            let second = resp.setup(ctx.root, Vec::new);
            debug_assert_eq!(second, Setup::Ready, "fallback targets always prepare");
        }
    }

    match flush(fd, &mut resp) {
        Flush::Paused => {
            ctx.store.put_response(fd, resp);
            Next::Arm(Interest::ReadWrite)
        }
        Flush::Finished => {
            info!(fd, resource = %resp.target, "response sent");
            Next::Arm(Interest::Read)
        }
        Flush::Failed(e) => {
            warn!(fd, resource = %resp.target, error = %e, "send failed, closing");
            drop(resp);
            ctx.store.forget(fd);
            Next::Close(Shutdown::Write)
        }
    }
}
