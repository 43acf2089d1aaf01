use crate::error::WireError;
use crate::headers::Headers;
use bytes::Bytes;
use std::io::{self, BufRead, Read, Write};

/// Cap on the request line plus header block. Exceeding it is a parse
/// error distinct from "connection closed before headers".
pub const MAX_HEADER_BYTES: usize = 64 * 1024;

/// A parsed HTTP/1.1 request.
#[derive(Debug, Clone)]
pub struct Request {
    pub method: String,
    pub path: String,
    pub version: String,
    pub headers: Headers,
    pub body: Bytes,
}

impl Request {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name)
    }

    /// Forward-proxy target parsed from the `Host` header: `host[:port]`,
    /// default port 80. Missing or malformed `Host` yields `None` and the
    /// request is treated as unparseable by the proxy.
    pub fn target(&self) -> Option<(String, u16)> {
        let host = self.headers.get("Host")?.trim();
        let (name, port) = match host.split_once(':') {
            Some((name, port)) => (name, port.parse::<u16>().ok()?),
            None => (host, 80),
        };
        if name.is_empty() {
            return None;
        }
        Some((name.to_string(), port))
    }

    /// Serialize the request back to wire bytes, headers verbatim in
    /// their original order. Used by the proxy to forward upstream.
    pub fn write_wire(&self, out: &mut impl Write) -> io::Result<()> {
        let mut head = format!("{} {} {}\r\n", self.method, self.path, self.version);
        for (k, v) in self.headers.iter() {
            head.push_str(k);
            head.push_str(": ");
            head.push_str(v);
            head.push_str("\r\n");
        }
        head.push_str("\r\n");

        out.write_all(head.as_bytes())?;
        if !self.body.is_empty() {
            out.write_all(&self.body)?;
        }
        out.flush()
    }
}

/// An HTTP/1.1 response to be serialized.
#[derive(Debug, Clone)]
pub struct Response {
    pub status: u16,
    pub reason: String,
    pub headers: Headers,
    pub body: Bytes,
}

impl Response {
    pub fn new(status: u16, reason: &str) -> Self {
        Self {
            status,
            reason: reason.to_string(),
            headers: Headers::new(),
            body: Bytes::new(),
        }
    }

    fn with_text(status: u16, reason: &str, content_type: &str, body: impl Into<Bytes>) -> Self {
        let mut resp = Self::new(status, reason);
        resp.headers.set("Content-Type", content_type);
        resp.body = body.into();
        resp
    }

    pub fn ok_text(body: impl Into<String>) -> Self {
        Self::with_text(200, "OK", "text/plain; charset=utf-8", body.into())
    }

    pub fn ok_json(body: impl Into<String>) -> Self {
        Self::with_text(200, "OK", "application/json; charset=utf-8", body.into())
    }

    pub fn ok_bytes(body: impl Into<Bytes>) -> Self {
        Self::with_text(200, "OK", "application/octet-stream", body.into())
    }

    pub fn not_found() -> Self {
        Self::with_text(404, "Not Found", "text/plain; charset=utf-8", "Not Found")
    }

    pub fn bad_request(msg: impl Into<String>) -> Self {
        Self::with_text(400, "Bad Request", "text/plain; charset=utf-8", msg.into())
    }

    pub fn too_many_requests(msg: impl Into<String>) -> Self {
        Self::with_text(
            429,
            "Too Many Requests",
            "text/plain; charset=utf-8",
            msg.into(),
        )
    }

    pub fn internal_error(msg: impl Into<String>) -> Self {
        Self::with_text(
            500,
            "Internal Server Error",
            "text/plain; charset=utf-8",
            msg.into(),
        )
    }

    pub fn bad_gateway(msg: impl Into<String>) -> Self {
        Self::with_text(502, "Bad Gateway", "text/plain; charset=utf-8", msg.into())
    }

    pub fn gateway_timeout(msg: impl Into<String>) -> Self {
        Self::with_text(
            504,
            "Gateway Timeout",
            "text/plain; charset=utf-8",
            msg.into(),
        )
    }
}

/// Parse one request from a buffered stream.
///
/// Reads the request line and header block line by line until an empty
/// line, tolerating both CRLF and bare-LF endings. The cumulative head
/// is capped at [`MAX_HEADER_BYTES`]. A body is read only when
/// `Content-Length` parses as a positive integer, accumulating partial
/// reads until the declared length is satisfied or the stream ends.
pub fn read_request(r: &mut impl BufRead) -> Result<Request, WireError> {
    let mut head_bytes = 0usize;

    let start_line = match read_line(r, &mut head_bytes)? {
        Some(line) => line,
        None => return Err(WireError::ConnectionClosed),
    };
    if start_line.is_empty() {
        return Err(WireError::Malformed);
    }

    let mut parts = start_line.splitn(3, ' ');
    let (method, path, version) = match (parts.next(), parts.next(), parts.next()) {
        (Some(m), Some(p), Some(v)) if !m.is_empty() && !p.is_empty() && !v.is_empty() => {
            (m.trim().to_string(), p.trim().to_string(), v.trim().to_string())
        }
        _ => return Err(WireError::Malformed),
    };

    let mut headers = Headers::new();
    loop {
        let line = match read_line(r, &mut head_bytes)? {
            Some(line) => line,
            None => break, // EOF ends the header block
        };
        if line.is_empty() {
            break;
        }
        // First colon splits key and value; lines without one are ignored
        if let Some((key, value)) = line.split_once(':') {
            if !key.trim().is_empty() {
                headers.set(key.trim(), value.trim());
            }
        }
    }

    // Parse failure or absence of Content-Length means an empty body
    let declared = headers
        .get("Content-Length")
        .and_then(|v| v.trim().parse::<usize>().ok())
        .unwrap_or(0);

    let body = if declared > 0 {
        // The declared length is untrusted input and is never allocated
        // up front; the buffer grows only with bytes that actually
        // arrive, stopping at the declared length or end-of-data.
        let mut buf = Vec::new();
        r.take(declared as u64).read_to_end(&mut buf)?;
        Bytes::from(buf)
    } else {
        Bytes::new()
    };

    Ok(Request {
        method,
        path,
        version,
        headers,
        body,
    })
}

/// Read one header line, stripped of its terminator. `None` on EOF.
///
/// The cumulative cap is enforced chunk by chunk while the line is
/// read, so a line that never terminates can buffer at most
/// [`MAX_HEADER_BYTES`] before it is rejected.
fn read_line(r: &mut impl BufRead, head_bytes: &mut usize) -> Result<Option<String>, WireError> {
    let mut raw = Vec::new();
    loop {
        let available = r.fill_buf()?;
        if available.is_empty() {
            if raw.is_empty() {
                return Ok(None);
            }
            break; // EOF ends a final unterminated line
        }
        let (take, complete) = match available.iter().position(|&b| b == b'\n') {
            Some(pos) => (pos + 1, true),
            None => (available.len(), false),
        };
        *head_bytes += take;
        if *head_bytes > MAX_HEADER_BYTES {
            return Err(WireError::HeadersTooLarge);
        }
        raw.extend_from_slice(&available[..take]);
        r.consume(take);
        if complete {
            break;
        }
    }
    while matches!(raw.last(), Some(b'\n') | Some(b'\r')) {
        raw.pop();
    }
    Ok(Some(String::from_utf8_lossy(&raw).into_owned()))
}

/// Serialize a response to wire bytes.
///
/// Emits the status line, an RFC 1123 `Date` header when requested, a
/// `Server` identification header, `Connection: close` and a freshly
/// computed `Content-Length` — the caller's own Content-Length and
/// Connection headers are never trusted and are skipped. The remaining
/// headers follow in their given order, then a blank line and the body.
pub fn serialize_response(resp: &Response, server: &str, date_header: bool) -> Vec<u8> {
    let mut head = format!("HTTP/1.1 {} {}\r\n", resp.status, resp.reason);
    if date_header {
        let date = chrono::Utc::now().format("%a, %d %b %Y %H:%M:%S GMT");
        head.push_str(&format!("Date: {date}\r\n"));
    }
    head.push_str(&format!("Server: {server}\r\n"));
    head.push_str("Connection: close\r\n");
    head.push_str(&format!("Content-Length: {}\r\n", resp.body.len()));
    for (k, v) in resp.headers.iter() {
        if k.eq_ignore_ascii_case("Content-Length") || k.eq_ignore_ascii_case("Connection") {
            continue;
        }
        head.push_str(&format!("{k}: {v}\r\n"));
    }
    head.push_str("\r\n");

    let mut out = head.into_bytes();
    out.extend_from_slice(&resp.body);
    out
}

/// Serialize and write a response, flushing the stream.
pub fn write_response(
    w: &mut impl Write,
    resp: &Response,
    server: &str,
    date_header: bool,
) -> io::Result<()> {
    w.write_all(&serialize_response(resp, server, date_header))?;
    w.flush()
}
