//! Response assembly: status lines, headers, and the plain-text error
//! body format from `spec.md` §7 (`<status> <reason>\n`).

pub fn reason_phrase(status: u16) -> &'static str {
    match status {
        200 => "OK",
        201 => "Created",
        400 => "Bad Request",
        403 => "Forbidden",
        404 => "Not Found",
        410 => "Gone",
        413 => "Payload Too Large",
        500 => "Internal Server Error",
        _ => "Error",
    }
}

pub struct Response {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
}

impl Response {
    pub fn new(status: u16) -> Self {
        Response { status, headers: Vec::new(), body: Vec::new() }
    }

    pub fn header(mut self, name: &str, value: impl Into<String>) -> Self {
        self.headers.push((name.to_string(), value.into()));
        self
    }

    pub fn body(mut self, body: Vec<u8>) -> Self {
        self.body = body;
        self
    }

    pub fn plain_error(status: u16, detail: &str) -> Self {
        let body = format!("{status} {}\n", detail).into_bytes();
        Response::new(status).header("Content-Type", "text/plain; charset=utf-8").body(body)
    }

    /// Serializes the full response (status line, headers,
    /// `Content-Length`, blank line, body) as bytes ready to write to
    /// the connection.
    pub fn into_bytes(self) -> Vec<u8> {
        let mut out = Vec::with_capacity(128 + self.body.len());
        out.extend_from_slice(format!("HTTP/1.1 {} {}\r\n", self.status, reason_phrase(self.status)).as_bytes());
        for (k, v) in &self.headers {
            out.extend_from_slice(format!("{k}: {v}\r\n").as_bytes());
        }
        out.extend_from_slice(format!("Content-Length: {}\r\n", self.body.len()).as_bytes());
        out.extend_from_slice(b"Connection: keep-alive\r\n\r\n");
        out.extend_from_slice(&self.body);
        out
    }

    /// Serializes the status line and headers for a chunked response;
    /// the caller writes `Transfer-Encoding: chunked`-framed chunks
    /// afterward via `write_chunk`/`write_final_chunk`.
    pub fn into_chunked_head(mut self) -> Vec<u8> {
        self.headers.push(("Transfer-Encoding".into(), "chunked".into()));
        self.headers.push(("Cache-Control".into(), "no-store".into()));
        self.headers.push(("Vary".into(), "*".into()));
        let mut out = Vec::with_capacity(128);
        out.extend_from_slice(format!("HTTP/1.1 {} {}\r\n", self.status, reason_phrase(self.status)).as_bytes());
        for (k, v) in &self.headers {
            out.extend_from_slice(format!("{k}: {v}\r\n").as_bytes());
        }
        out.extend_from_slice(b"Connection: keep-alive\r\n\r\n");
        out
    }
}

/// Frames `data` as one HTTP chunk. An empty `data` is a valid
/// zero-length chunk used as a keepalive, matching `/sln/query`'s tail
/// mode (`spec.md` §8 scenario 5: "the connection receives a CRLF
/// keepalive").
pub fn write_chunk(data: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(data.len() + 8);
    out.extend_from_slice(format!("{:x}\r\n", data.len()).as_bytes());
    out.extend_from_slice(data);
    out.extend_from_slice(b"\r\n");
    out
}

pub fn write_final_chunk() -> Vec<u8> {
    b"0\r\n\r\n".to_vec()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_error_has_expected_shape() {
        let resp = Response::plain_error(403, "permission denied");
        assert_eq!(resp.status, 403);
        assert_eq!(resp.body, b"403 permission denied\n");
    }

    #[test]
    fn chunk_framing_matches_hex_length_prefix() {
        let chunk = write_chunk(b"hello");
        assert_eq!(chunk, b"5\r\nhello\r\n");
    }

    #[test]
    fn empty_chunk_is_valid_keepalive() {
        assert_eq!(write_chunk(b""), b"0\r\n\r\n");
    }
}
