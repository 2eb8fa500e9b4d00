/*!
 * Request-File Client
 *
 * Reads human-readable request lines (`READ k`, `GET k`, `PUT k v`), sends
 * each one to the server over a single connection, and prints every answer
 * next to the line that produced it.
 */

use crate::protocol::{encode_request, frame_len, ERROR_ENDINGS, HEADER_LEN, MAX_MESSAGE_LEN};
use anyhow::{Context, Result};
use std::fs::File;
use std::io::{self, BufRead, BufReader, Read, Write};
use std::net::TcpStream;
use std::path::Path;

/// Turn one request-file line into a wire request
///
/// Returns `None` for lines the server should never see: fewer than two
/// fields, a READ/GET with extra fields, a PUT without a value, a command
/// token that does not map to a 3-letter code, or a request too long for the
/// 3-digit header. Unknown 3-letter tokens are forwarded as-is.
pub fn build_request(line: &str) -> Option<String> {
    let (token, rest) = line.trim().split_once(' ')?;
    let code = match token {
        "READ" => "REA",
        "GET" => "GET",
        "PUT" => "PUT",
        t if t.len() == 3 => t,
        _ => return None,
    };

    let request = if code == "PUT" {
        let (key, value) = rest.split_once(' ')?;
        encode_request(code, key, Some(value))
    } else {
        if rest.contains(' ') {
            return None;
        }
        encode_request(code, rest, None)
    };

    (request.len() <= MAX_MESSAGE_LEN).then_some(request)
}

/// Read one response off the connection
///
/// Success responses are read up to their declared length. ERROR responses
/// may carry the fixed `024` header whatever their size, so they are read
/// until they end in one of the known reasons.
pub fn read_response<R: Read>(conn: &mut R) -> io::Result<String> {
    let mut buf = Vec::with_capacity(128);
    let mut tmp = [0u8; 1024];
    loop {
        let n = conn.read(&mut tmp)?;
        if n == 0 {
            return Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                "server closed the connection",
            ));
        }
        buf.extend_from_slice(&tmp[..n]);
        if response_complete(&buf) {
            return Ok(String::from_utf8_lossy(&buf).into_owned());
        }
    }
}

fn response_complete(buf: &[u8]) -> bool {
    let marker = HEADER_LEN + 1..HEADER_LEN + 4;
    if buf.get(marker) == Some(&b"ERR"[..]) {
        return ERROR_ENDINGS.iter().any(|e| buf.ends_with(e.as_bytes()));
    }
    // An unusable header will not get any better by waiting.
    !matches!(frame_len(buf), Ok(None))
}

/// Send every line of `requests` over `conn` and print the outcomes to `out`
pub fn run_requests<C, B, W>(conn: &mut C, requests: B, out: &mut W) -> Result<()>
where
    C: Read + Write,
    B: BufRead,
    W: Write,
{
    for line in requests.lines() {
        let line = line.context("reading request file")?;
        let line = line.trim();
        let Some(request) = build_request(line) else {
            writeln!(out, "Invalid request: {}", line)?;
            continue;
        };

        log::trace!("sending {:?}", request);
        conn.write_all(request.as_bytes()).context("sending request")?;
        let response = read_response(conn).context("reading response")?;
        writeln!(out, "{}: {}", line, response)?;
    }
    Ok(())
}

/// Connect to `host:port` and replay the request file at `path`
pub fn run(host: &str, port: u16, path: &Path) -> Result<()> {
    let file = File::open(path).with_context(|| format!("opening {}", path.display()))?;
    let mut conn = TcpStream::connect((host, port))
        .with_context(|| format!("connecting to {}:{}", host, port))?;
    conn.set_nodelay(true).ok();
    log::debug!("connected to {}:{}", host, port);

    let stdout = io::stdout();
    run_requests(&mut conn, BufReader::new(file), &mut stdout.lock())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builds_wire_requests() {
        assert_eq!(build_request("READ a").as_deref(), Some("009 REA a"));
        assert_eq!(build_request("GET key").as_deref(), Some("011 GET key"));
        assert_eq!(build_request("PUT k v").as_deref(), Some("011 PUT k v"));
        assert_eq!(
            build_request("PUT k hello world").as_deref(),
            Some("021 PUT k hello world")
        );
        assert_eq!(build_request("  READ a \n").as_deref(), Some("009 REA a"));
        assert_eq!(build_request("ABC a").as_deref(), Some("009 ABC a"));
    }

    #[test]
    fn rejects_bad_lines() {
        assert_eq!(build_request(""), None);
        assert_eq!(build_request("READ"), None);
        assert_eq!(build_request("READ a b"), None);
        assert_eq!(build_request("PUT k"), None);
        assert_eq!(build_request("DELETE a"), None);
        assert_eq!(build_request("PU a"), None);
        let long = format!("PUT k {}", "x".repeat(MAX_MESSAGE_LEN));
        assert_eq!(build_request(&long), None);
    }

    #[test]
    fn response_completion() {
        assert!(!response_complete(b"01"));
        assert!(!response_complete(b"019 OK (a, 1)"));
        assert!(response_complete(b"019 OK (a, 1) added"));
        assert!(response_complete(b"024 ERR averyveryverylongkey does not exist"));
        assert!(!response_complete(b"024 ERR averyveryverylo"));
        assert!(!response_complete(b"024 ERR a does not"));
        assert!(response_complete(b"024 ERR invalid command"));
        assert!(response_complete(b"garbage"));
    }

    #[test]
    fn reads_a_response_split_across_reads() {
        struct Chunks(Vec<&'static [u8]>);
        impl Read for Chunks {
            fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
                if self.0.is_empty() {
                    return Ok(0);
                }
                let c = self.0.remove(0);
                buf[..c.len()].copy_from_slice(c);
                Ok(c.len())
            }
        }

        let mut conn = Chunks(vec![&b"019 OK"[..], &b" (a, 1)"[..], &b" added"[..]]);
        assert_eq!(read_response(&mut conn).unwrap(), "019 OK (a, 1) added");

        let mut conn = Chunks(vec![
            &b"024 ERR averyveryverylo"[..],
            &b"ngkey does not exist"[..],
            &b"019 OK (a, 1) added"[..],
        ]);
        assert_eq!(
            read_response(&mut conn).unwrap(),
            "024 ERR averyveryverylongkey does not exist"
        );
        assert_eq!(read_response(&mut conn).unwrap(), "019 OK (a, 1) added");

        let mut closed = Chunks(vec![&b"019 OK"[..]]);
        let err = read_response(&mut closed).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::UnexpectedEof);
    }
}
