//! Minimal asynchronous HTTP fetch pipeline.
//!
//! Deliberately not a general HTTP client: it speaks `HTTP/1.0` `GET` with
//! `Connection: close` against a single controlled origin. Headers are
//! discarded unparsed and end-of-body is signalled solely by the peer
//! closing the connection: no redirects, no chunked encoding, no
//! keep-alive.
//!
//! Pipeline stages, each a suspension point and each cancellable:
//!
//! 1. resolve `host:port` into an ordered candidate list,
//! 2. connect, advancing to the next candidate on failure,
//! 3. write the fixed request,
//! 4. read past the header/body separator, then read until close.
//!
//! Callers distinguish success from failure only by presence of the result
//! buffer; failure details are logged here, once, categorized per stage.
//! Cancellation is logged as such and never as an I/O failure.

use std::net::SocketAddr;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{lookup_host, TcpStream};
use tokio_util::sync::CancellationToken;

/// Result of a fetch: the body buffer, or absence.
pub type FetchResult = Option<Vec<u8>>;

const HEADER_SEPARATOR: &[u8] = b"\r\n\r\n";
const READ_CHUNK: usize = 4096;

/// Fetch `http://host:port/path`, returning the response body.
pub async fn fetch(host: &str, port: u16, path: &str, cancel: &CancellationToken) -> FetchResult {
    let resolved = tokio::select! {
        () = cancel.cancelled() => {
            tracing::debug!("fetch: aborted");
            return None;
        }
        resolved = lookup_host((host, port)) => resolved,
    };

    let candidates: Vec<SocketAddr> = match resolved {
        Ok(addrs) => addrs.collect(),
        Err(e) => {
            tracing::warn!("fetch: unable to resolve {host}:{port}: {e}");
            return None;
        }
    };

    fetch_endpoints(&candidates, host, path, cancel).await
}

/// Fetch from an already-resolved, ordered candidate list.
///
/// Tries each endpoint in order and fails only once all are exhausted; an
/// empty list fails immediately.
pub async fn fetch_endpoints(
    candidates: &[SocketAddr],
    host: &str,
    path: &str,
    cancel: &CancellationToken,
) -> FetchResult {
    let mut stream = None;
    for addr in candidates {
        let connected = tokio::select! {
            () = cancel.cancelled() => {
                tracing::debug!("fetch: aborted");
                return None;
            }
            connected = TcpStream::connect(addr) => connected,
        };
        match connected {
            Ok(s) => {
                stream = Some(s);
                break;
            }
            Err(e) => {
                tracing::warn!("fetch: unable to connect to {addr}: {e}; trying next endpoint");
            }
        }
    }
    let Some(stream) = stream else {
        tracing::warn!("fetch: no endpoint for {host} accepted the connection");
        return None;
    };

    tokio::select! {
        () = cancel.cancelled() => {
            tracing::debug!("fetch: aborted");
            None
        }
        body = transfer(stream, host, path) => body,
    }
}

/// Write the request and read the response body.
async fn transfer(mut stream: TcpStream, host: &str, path: &str) -> FetchResult {
    let request = format!("GET {path} HTTP/1.0\r\nHost: {host}\r\nConnection: close\r\n\r\n");
    if let Err(e) = stream.write_all(request.as_bytes()).await {
        tracing::warn!("fetch: unable to write request: {e}");
        return None;
    }

    // Headers: read until the separator shows up, then discard them.
    let mut buf = Vec::new();
    let body_start = loop {
        if let Some(pos) = find_separator(&buf) {
            break pos + HEADER_SEPARATOR.len();
        }
        let mut chunk = [0u8; READ_CHUNK];
        match stream.read(&mut chunk).await {
            Ok(0) => {
                tracing::warn!("fetch: unexpected EOF before end of headers");
                return None;
            }
            Ok(n) => buf.extend_from_slice(&chunk[..n]),
            Err(e) => {
                tracing::warn!("fetch: unable to read from socket: {e}");
                return None;
            }
        }
    };

    // Body: whatever followed the separator, then read until close.
    let mut body = buf.split_off(body_start);
    loop {
        let mut chunk = [0u8; READ_CHUNK];
        match stream.read(&mut chunk).await {
            Ok(0) => return Some(body),
            Ok(n) => body.extend_from_slice(&chunk[..n]),
            Err(e) => {
                tracing::warn!("fetch: unable to read from socket: {e}");
                return None;
            }
        }
    }
}

fn find_separator(buf: &[u8]) -> Option<usize> {
    buf.windows(HEADER_SEPARATOR.len())
        .position(|w| w == HEADER_SEPARATOR)
}
