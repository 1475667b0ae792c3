//! Parsing of raw HTTP response text as printed by `curl -i`.

use std::collections::BTreeMap;

use super::error::CheckError;

/// Structured view of one raw HTTP response
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedResponse {
    pub status: Result<u16, CheckError>,
    pub headers: BTreeMap<String, String>,
    pub body: String,
}

impl ParsedResponse {
    /// Status code, or `None` when the status line could not be parsed
    pub fn status_code(&self) -> Option<u16> {
        self.status.as_ref().ok().copied()
    }
}

/// Split `raw` into status code, headers and body.
pub fn parse_response(raw: &str) -> ParsedResponse {
    let (head, body) = split_head_body(raw);
    let mut lines = split_lines(head);

    let status = parse_status_line(lines.next().unwrap_or_default());

    let mut headers = BTreeMap::new();
    for line in lines {
        if let Some((key, value)) = line.split_once(':') {
            headers.insert(key.trim().to_string(), value.trim().to_string());
        }
    }

    ParsedResponse { status, headers, body: body.to_string() }
}

/// Split on the first blank line, accepting `\n` and `\r\n` line endings.
fn split_head_body(raw: &str) -> (&str, &str) {
    let bytes = raw.as_bytes();
    let mut i = 0;

    while i < bytes.len() {
        if bytes[i] == b'\n' {
            let mut j = i + 1;
            if bytes.get(j) == Some(&b'\r') {
                j += 1;
            }
            if bytes.get(j) == Some(&b'\n') {
                let head_end = if i > 0 && bytes[i - 1] == b'\r' { i - 1 } else { i };
                return (&raw[..head_end], &raw[j + 1..]);
            }
        }
        i += 1;
    }

    (raw, "")
}

fn split_lines(head: &str) -> impl Iterator<Item = &str> {
    head.split('\n').map(|line| line.strip_suffix('\r').unwrap_or(line))
}

fn parse_status_line(line: &str) -> Result<u16, CheckError> {
    let token = line
        .split_whitespace()
        .nth(1)
        .ok_or_else(|| CheckError::MalformedResponse(format!("no status code in {line:?}")))?;

    token
        .parse::<u16>()
        .map_err(|_| CheckError::MalformedResponse(format!("invalid status code {token:?}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_crlf_response() {
        let raw = "HTTP/1.1 200 OK\r\nContent-Type: text/plain\r\nX-Id: 42\r\n\r\nhello\r\nworld";
        let parsed = parse_response(raw);

        assert_eq!(parsed.status_code(), Some(200));
        assert_eq!(parsed.headers.get("Content-Type").map(String::as_str), Some("text/plain"));
        assert_eq!(parsed.headers.get("X-Id").map(String::as_str), Some("42"));
        assert_eq!(parsed.body, "hello\r\nworld");
    }

    #[test]
    fn test_parse_lf_response() {
        let raw = "HTTP/2 404\nserver: nginx\n\n{\"error\": \"not found\"}\n";
        let parsed = parse_response(raw);

        assert_eq!(parsed.status_code(), Some(404));
        assert_eq!(parsed.headers.get("server").map(String::as_str), Some("nginx"));
        assert_eq!(parsed.body, "{\"error\": \"not found\"}\n");
    }

    #[test]
    fn test_body_split_only_on_first_blank_line() {
        let raw = "HTTP/1.1 200 OK\r\n\r\nfirst\r\n\r\nsecond";
        assert_eq!(parse_response(raw).body, "first\r\n\r\nsecond");
    }

    #[test]
    fn test_no_blank_line_means_empty_body() {
        let parsed = parse_response("HTTP/1.1 204 No Content\r\nDate: today");

        assert_eq!(parsed.status_code(), Some(204));
        assert_eq!(parsed.headers.len(), 1);
        assert_eq!(parsed.body, "");
    }

    #[test]
    fn test_header_trimming_and_case() {
        let raw = "HTTP/1.1 200 OK\r\n  X-Mixed-Case  :   Some Value With: Colon  \r\nno colon here\r\n\r\n";
        let parsed = parse_response(raw);

        assert_eq!(parsed.headers.len(), 1);
        assert_eq!(
            parsed.headers.get("X-Mixed-Case").map(String::as_str),
            Some("Some Value With: Colon")
        );
    }

    #[test]
    fn test_duplicate_header_last_wins() {
        let raw = "HTTP/1.1 200 OK\r\nSet-Cookie: a=1\r\nSet-Cookie: b=2\r\n\r\n";
        let parsed = parse_response(raw);

        assert_eq!(parsed.headers.get("Set-Cookie").map(String::as_str), Some("b=2"));
    }

    #[test]
    fn test_malformed_status_line() {
        let parsed = parse_response("garbage\r\n\r\nbody");
        assert!(matches!(parsed.status, Err(CheckError::MalformedResponse(_))));
        assert_eq!(parsed.status_code(), None);
        assert_eq!(parsed.body, "body");

        let parsed = parse_response("HTTP/1.1 abc OK\r\n\r\n");
        assert_eq!(parsed.status_code(), None);

        assert_eq!(parse_response("").status_code(), None);
    }
}
