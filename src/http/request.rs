//! Minimal HTTP/1.1 request framing: request line, headers, and a
//! `Content-Length`-bounded body. Grounded in `main.rs`'s own hand-rolled
//! line-oriented reader (`read_line_bytes`, `trim_header_line`) rather
//! than pulling in a full HTTP crate the teacher never depended on.

use crate::error::{SlnError, SlnResult};
use tokio::io::{AsyncBufReadExt, AsyncReadExt, BufReader};
use tokio::net::TcpStream;

/// Request bodies above this size are rejected with 413 before they are
/// read into memory.
pub const MAX_BODY_SIZE: usize = 64 * 1024 * 1024;
/// `/sln/auth` bodies are capped much lower per `spec.md` §6.
pub const MAX_AUTH_BODY_SIZE: usize = 1023;

pub struct ParsedRequest {
    pub method: String,
    pub path: String,
    pub query: String,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
}

impl ParsedRequest {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    pub fn cookie(&self, name: &str) -> Option<String> {
        let raw = self.header("cookie")?;
        for part in raw.split(';') {
            let part = part.trim();
            if let Some((k, v)) = part.split_once('=') {
                if k == name {
                    return Some(v.to_string());
                }
            }
        }
        None
    }
}

/// Reads one request off `stream`. Returns `Ok(None)` on a clean
/// connection close before any bytes arrive (the normal end of a
/// keep-alive loop).
pub async fn read_request(stream: &mut TcpStream) -> SlnResult<Option<ParsedRequest>> {
    let mut reader = BufReader::new(stream);
    let mut line = String::new();
    let n = reader.read_line(&mut line).await?;
    if n == 0 {
        return Ok(None);
    }
    let trimmed = line.trim_end_matches(['\r', '\n']);
    if trimmed.is_empty() {
        return Ok(None);
    }

    let mut parts = trimmed.split(' ');
    let method = parts.next().ok_or_else(|| SlnError::Einval("missing method".into()))?;
    let target = parts.next().ok_or_else(|| SlnError::Einval("missing request target".into()))?;
    let _version = parts.next().ok_or_else(|| SlnError::Einval("missing HTTP version".into()))?;

    let (path, query) = match target.split_once('?') {
        Some((p, q)) => (p.to_string(), q.to_string()),
        None => (target.to_string(), String::new()),
    };

    let mut headers = Vec::new();
    loop {
        let mut header_line = String::new();
        let n = reader.read_line(&mut header_line).await?;
        if n == 0 {
            break;
        }
        let header_line = header_line.trim_end_matches(['\r', '\n']);
        if header_line.is_empty() {
            break;
        }
        if let Some((name, value)) = header_line.split_once(':') {
            headers.push((name.trim().to_string(), value.trim().to_string()));
        }
    }

    let content_length = headers
        .iter()
        .find(|(k, _)| k.eq_ignore_ascii_case("content-length"))
        .and_then(|(_, v)| v.parse::<usize>().ok())
        .unwrap_or(0);

    let limit = if path == "/sln/auth" { MAX_AUTH_BODY_SIZE } else { MAX_BODY_SIZE };
    if content_length > limit {
        return Err(SlnError::Einval(format!("request body of {content_length} bytes exceeds limit")));
    }

    let mut body = vec![0u8; content_length];
    if content_length > 0 {
        reader.read_exact(&mut body).await?;
    }

    Ok(Some(ParsedRequest { method: method.to_string(), path, query, headers, body }))
}

/// Decodes `application/x-www-form-urlencoded` bodies into key/value
/// pairs. Unknown `%XX` sequences and `+` are handled; anything else
/// passes through verbatim rather than failing the whole parse.
pub fn parse_form_urlencoded(body: &[u8]) -> Vec<(String, String)> {
    let text = String::from_utf8_lossy(body);
    text.split('&')
        .filter(|pair| !pair.is_empty())
        .filter_map(|pair| {
            let (k, v) = pair.split_once('=').unwrap_or((pair, ""));
            Some((percent_decode(k), percent_decode(v)))
        })
        .collect()
}

pub fn percent_decode(s: &str) -> String {
    let bytes = s.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'+' => {
                out.push(b' ');
                i += 1;
            }
            b'%' if i + 2 < bytes.len() => {
                let hex = std::str::from_utf8(&bytes[i + 1..i + 3]).ok();
                match hex.and_then(|h| u8::from_str_radix(h, 16).ok()) {
                    Some(byte) => {
                        out.push(byte);
                        i += 3;
                    }
                    None => {
                        out.push(bytes[i]);
                        i += 1;
                    }
                }
            }
            b => {
                out.push(b);
                i += 1;
            }
        }
    }
    String::from_utf8_lossy(&out).into_owned()
}
