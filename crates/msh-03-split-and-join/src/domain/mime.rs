//! # MIME multipart/related codec
//!
//! A rejoined source message is the original AS4 wire message: a
//! `multipart/related` body whose first part is the SOAP envelope and whose
//! further parts are payload attachments referenced by `Content-ID`.
//!
//! Parsing is byte-oriented; bodies are never decoded as text.

use super::errors::SplitAndJoinError;
use serde::{Deserialize, Serialize};

const CRLF: &[u8] = b"\r\n";

/// One MIME body part.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MimePart {
    /// Header names are kept as sent; lookups are case-insensitive.
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
}

impl MimePart {
    pub fn new(content_type: &str, body: Vec<u8>) -> Self {
        Self {
            headers: vec![("Content-Type".to_string(), content_type.to_string())],
            body,
        }
    }

    pub fn with_content_id(mut self, content_id: &str) -> Self {
        self.headers
            .push(("Content-ID".to_string(), format!("<{}>", content_id)));
        self
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    pub fn content_type(&self) -> Option<&str> {
        self.header("Content-Type")
    }

    /// `Content-ID` without the angle brackets.
    pub fn content_id(&self) -> Option<&str> {
        self.header("Content-ID")
            .map(|id| id.trim().trim_start_matches('<').trim_end_matches('>'))
    }
}

/// A parsed AS4 wire message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceMessage {
    /// Top-level `multipart/related` content type.
    pub content_type: String,
    /// SOAP envelope (first part).
    pub envelope: MimePart,
    pub attachments: Vec<MimePart>,
}

impl SourceMessage {
    /// Serialize as `multipart/related` with the given boundary.
    ///
    /// Returns the top-level content type and the body bytes.
    pub fn to_mime(envelope: &MimePart, attachments: &[MimePart], boundary: &str) -> (String, Vec<u8>) {
        let envelope_type = envelope
            .content_type()
            .unwrap_or("application/soap+xml")
            .split(';')
            .next()
            .unwrap_or("application/soap+xml")
            .trim()
            .to_string();
        let content_type = format!(
            "multipart/related; type=\"{}\"; boundary=\"{}\"",
            envelope_type, boundary
        );

        let mut body = Vec::new();
        for part in std::iter::once(envelope).chain(attachments) {
            body.extend_from_slice(b"--");
            body.extend_from_slice(boundary.as_bytes());
            body.extend_from_slice(CRLF);
            for (name, value) in &part.headers {
                body.extend_from_slice(format!("{}: {}", name, value).as_bytes());
                body.extend_from_slice(CRLF);
            }
            body.extend_from_slice(CRLF);
            body.extend_from_slice(&part.body);
            body.extend_from_slice(CRLF);
        }
        body.extend_from_slice(b"--");
        body.extend_from_slice(boundary.as_bytes());
        body.extend_from_slice(b"--");
        body.extend_from_slice(CRLF);
        (content_type, body)
    }

    /// Parse a `multipart/related` body.
    ///
    /// # Errors
    /// `MalformedSourceMessage` when the content type is not multipart, has no
    /// boundary, the body has no closing delimiter or no parts, or a part has
    /// no header terminator.
    pub fn parse(content_type: &str, body: &[u8]) -> Result<Self, SplitAndJoinError> {
        let malformed = |reason: &str| SplitAndJoinError::MalformedSourceMessage {
            reason: reason.to_string(),
        };

        if !content_type
            .trim_start()
            .to_ascii_lowercase()
            .starts_with("multipart/related")
        {
            return Err(malformed("content type is not multipart/related"));
        }
        let boundary = parameter(content_type, "boundary").ok_or_else(|| malformed("missing boundary"))?;
        if boundary.is_empty() {
            return Err(malformed("empty boundary"));
        }

        let delimiter = [b"--".as_slice(), boundary.as_bytes()].concat();
        let mut cursor = find(body, &delimiter, 0).ok_or_else(|| malformed("no opening delimiter"))?;

        let mut parts = Vec::new();
        loop {
            cursor += delimiter.len();
            if body[cursor..].starts_with(b"--") {
                break;
            }
            cursor = skip_line_break(body, cursor).ok_or_else(|| malformed("bad delimiter line"))?;

            let next = find(body, &delimiter, cursor).ok_or_else(|| malformed("missing closing delimiter"))?;
            // The line break before a delimiter belongs to the delimiter.
            let mut end = next;
            if end >= cursor + 2 && &body[end - 2..end] == CRLF {
                end -= 2;
            } else if end > cursor && body[end - 1] == b'\n' {
                end -= 1;
            }
            parts.push(parse_part(&body[cursor..end])?);
            cursor = next;
        }

        let mut parts = parts.into_iter();
        let envelope = parts.next().ok_or_else(|| malformed("no parts"))?;
        Ok(Self {
            content_type: content_type.to_string(),
            envelope,
            attachments: parts.collect(),
        })
    }

    pub fn attachment(&self, content_id: &str) -> Option<&MimePart> {
        self.attachments
            .iter()
            .find(|p| p.content_id() == Some(content_id))
    }
}

fn parse_part(raw: &[u8]) -> Result<MimePart, SplitAndJoinError> {
    let (header_end, body_start) = find(raw, b"\r\n\r\n", 0)
        .map(|i| (i, i + 4))
        .or_else(|| find(raw, b"\n\n", 0).map(|i| (i, i + 2)))
        .or_else(|| {
            // Part without headers starts with an empty line.
            if raw.starts_with(CRLF) {
                Some((0, 2))
            } else {
                None
            }
        })
        .ok_or_else(|| SplitAndJoinError::MalformedSourceMessage {
            reason: "part without header terminator".to_string(),
        })?;

    let header_text = String::from_utf8_lossy(&raw[..header_end]);
    let mut headers = Vec::new();
    for line in header_text.lines() {
        if line.trim().is_empty() {
            continue;
        }
        let (name, value) = line.split_once(':').ok_or_else(|| {
            SplitAndJoinError::MalformedSourceMessage {
                reason: format!("bad header line {:?}", line),
            }
        })?;
        headers.push((name.trim().to_string(), value.trim().to_string()));
    }

    Ok(MimePart {
        headers,
        body: raw[body_start..].to_vec(),
    })
}

/// Value of a `; name=value` content-type parameter, quotes removed.
fn parameter(content_type: &str, name: &str) -> Option<String> {
    content_type.split(';').skip(1).find_map(|param| {
        let (key, value) = param.split_once('=')?;
        if key.trim().eq_ignore_ascii_case(name) {
            Some(value.trim().trim_matches('"').to_string())
        } else {
            None
        }
    })
}

fn find(haystack: &[u8], needle: &[u8], from: usize) -> Option<usize> {
    if needle.is_empty() || from > haystack.len() {
        return None;
    }
    haystack[from..]
        .windows(needle.len())
        .position(|w| w == needle)
        .map(|i| i + from)
}

fn skip_line_break(body: &[u8], at: usize) -> Option<usize> {
    // Transport padding before the line break is allowed.
    let mut i = at;
    while i < body.len() && (body[i] == b' ' || body[i] == b'\t') {
        i += 1;
    }
    if body[i..].starts_with(CRLF) {
        Some(i + 2)
    } else if body[i..].starts_with(b"\n") {
        Some(i + 1)
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn envelope() -> MimePart {
        MimePart::new(
            "application/soap+xml; charset=UTF-8",
            b"<env:Envelope><env:Header/><env:Body/></env:Envelope>".to_vec(),
        )
    }

    #[test]
    fn test_parse_envelope_and_binary_attachment() {
        let attachment = MimePart::new("application/octet-stream", vec![0, 13, 10, 45, 45, 255])
            .with_content_id("payload@msh");
        let (content_type, body) =
            SourceMessage::to_mime(&envelope(), &[attachment.clone()], "MIMEBoundary_abc");

        let parsed = SourceMessage::parse(&content_type, &body).unwrap();
        assert_eq!(parsed.envelope.body, envelope().body);
        assert_eq!(parsed.attachments.len(), 1);
        assert_eq!(parsed.attachment("payload@msh").unwrap().body, attachment.body);
        assert!(content_type.contains("type=\"application/soap+xml\""));
    }

    #[test]
    fn test_parse_tolerates_bare_newlines() {
        let body = b"--b1\nContent-Type: text/xml\n\n<a/>\n--b1\nContent-ID: <x>\n\nhello\n--b1--\n";
        let parsed = SourceMessage::parse("multipart/related; boundary=b1", body).unwrap();
        assert_eq!(parsed.envelope.body, b"<a/>".to_vec());
        assert_eq!(parsed.attachments[0].content_id(), Some("x"));
        assert_eq!(parsed.attachments[0].body, b"hello".to_vec());
    }

    #[test]
    fn test_rejects_malformed_input() {
        let (content_type, body) = SourceMessage::to_mime(&envelope(), &[], "b2");

        assert!(matches!(
            SourceMessage::parse("application/xml", &body),
            Err(SplitAndJoinError::MalformedSourceMessage { .. })
        ));
        assert!(SourceMessage::parse("multipart/related", &body).is_err());

        let truncated = &body[..body.len() - 8];
        assert!(SourceMessage::parse(&content_type, truncated).is_err());
        assert!(SourceMessage::parse(&content_type, b"not mime at all").is_err());
    }
}
