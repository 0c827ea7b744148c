//! # Wire
//!
//! httparse-backed request reading and plain-text response writing for the HTTP stub

use std::io::{self, Read, Write};

const MAX_HEADERS: usize = 32;
const READ_CHUNK: usize = 4096;

/// One fully read inbound request: request line plus drained body
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct StubRequest {
    pub method: String,
    pub path: String,
    pub body: Vec<u8>,
}

struct Head {
    method: String,
    path: String,
    offset: usize,
    content_length: usize,
}

/// Read one request from the stream. The body is always drained up to the declared
/// content length, even when the request will be answered with an error, so the
/// connection never leaks unread bytes.
pub(crate) fn read_request<R: Read>(reader: &mut R) -> io::Result<StubRequest> {
    let mut buffer: Vec<u8> = Vec::new();
    let mut chunk = [0u8; READ_CHUNK];
    loop {
        let head = {
            let mut headers = [httparse::EMPTY_HEADER; MAX_HEADERS];
            let mut request = httparse::Request::new(&mut headers);
            match request.parse(&buffer) {
                Ok(httparse::Status::Complete(offset)) => {
                    let content_length = request
                        .headers
                        .iter()
                        .find(|header| header.name.eq_ignore_ascii_case("content-length"))
                        .and_then(|header| std::str::from_utf8(header.value).ok())
                        .and_then(|value| value.trim().parse::<usize>().ok())
                        .unwrap_or(0);
                    Some(Head {
                        method: request.method.unwrap_or_default().to_string(),
                        path: request.path.unwrap_or_default().to_string(),
                        offset,
                        content_length,
                    })
                }
                Ok(httparse::Status::Partial) => None,
                Err(err) => return Err(io::Error::new(io::ErrorKind::InvalidData, err)),
            }
        };
        match head {
            Some(head) => {
                let mut body = buffer[head.offset..].to_vec();
                while body.len() < head.content_length {
                    let n = reader.read(&mut chunk)?;
                    if n == 0 {
                        break;
                    }
                    body.extend_from_slice(&chunk[..n]);
                }
                body.truncate(head.content_length);
                trace!("HTTP IN: {} {} ({} body bytes)", head.method, head.path, body.len());
                return Ok(StubRequest {
                    method: head.method,
                    path: head.path,
                    body,
                });
            }
            None => {
                let n = reader.read(&mut chunk)?;
                if n == 0 {
                    return Err(io::Error::new(
                        io::ErrorKind::UnexpectedEof,
                        "connection closed mid-request",
                    ));
                }
                buffer.extend_from_slice(&chunk[..n]);
            }
        }
    }
}

/// Write a complete HTTP/1.1 response and flush. Every connection is closed after one
/// request/response cycle.
pub(crate) fn write_response<W: Write>(
    writer: &mut W,
    status: u16,
    reason: &str,
    mime_type: &str,
    body: &[u8],
) -> io::Result<()> {
    trace!("HTTP OUT: {status} {reason} ({} body bytes)", body.len());
    let mut response = format!(
        "HTTP/1.1 {status} {reason}\r\nContent-Type: {mime_type}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
        body.len()
    )
    .into_bytes();
    response.extend_from_slice(body);
    writer.write_all(&response)?;
    writer.flush()
}

/// Standard reason phrase for the few codes the stub emits on its own
pub(crate) fn reason_phrase(status: u16) -> &'static str {
    match status {
        200 => "OK",
        201 => "Created",
        204 => "No Content",
        400 => "Bad Request",
        404 => "Not Found",
        405 => "Method Not Allowed",
        500 => "Internal Server Error",
        _ => "Stub",
    }
}
