//! Session protocol
//!
//! Every message is framed as a header block followed by a JSON body:
//! - `Content-Length: N` header line (other headers are ignored)
//! - a blank line
//! - N bytes of JSON
//!
//! Requests carry a `command` field; responses are flat JSON objects whose
//! shape depends on the command.

use crate::query::SearchOutcome;
use serde::{Deserialize, Serialize};
use std::io::{self, BufRead, Read, Write};
use thiserror::Error;

/// Upper bound on a single message body
pub const MAX_MESSAGE_SIZE: usize = 100 * 1024 * 1024;

const CONTENT_LENGTH: &str = "content-length";

/// Commands this daemon understands
const COMMANDS: &[&str] = &["search", "apply_changes", "shutdown"];

/// A decoded client request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "command", rename_all = "snake_case")]
pub enum Request {
    Search {
        pattern: String,
        /// Signed so that negative values reach validation instead of
        /// failing as a type error
        #[serde(default)]
        max_results: Option<i64>,
    },
    ApplyChanges {
        changes: String,
    },
    Shutdown,
}

/// Request decoding failures, reported to the client as `{error}`
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ProtocolError {
    #[error("Invalid JSON: {0}")]
    InvalidJson(String),

    #[error("Missing command")]
    MissingCommand,

    #[error("Unknown command: {0}")]
    UnknownCommand(String),

    #[error("Invalid {command} request: {message}")]
    InvalidRequest { command: String, message: String },
}

impl Request {
    /// Decode a message body
    pub fn from_slice(body: &[u8]) -> Result<Self, ProtocolError> {
        let value: serde_json::Value = serde_json::from_slice(body)
            .map_err(|err| ProtocolError::InvalidJson(err.to_string()))?;

        let command = match value.get("command") {
            Some(serde_json::Value::String(command)) => command.clone(),
            Some(other) => return Err(ProtocolError::UnknownCommand(other.to_string())),
            None => return Err(ProtocolError::MissingCommand),
        };
        if !COMMANDS.contains(&command.as_str()) {
            return Err(ProtocolError::UnknownCommand(command));
        }

        serde_json::from_value(value).map_err(|err| ProtocolError::InvalidRequest {
            command,
            message: err.to_string(),
        })
    }
}

/// Sent once, before any request is read
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InitializedResponse {
    pub status: String,
    pub files_indexed: usize,
    pub project_path: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchResponse {
    pub status: String,
    pub total_matches: usize,
    pub returned_matches: usize,
    pub matches: Vec<FileMatches>,
}

/// Hits for one file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileMatches {
    pub file: String,
    pub matches: Vec<MatchData>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatchData {
    pub start: usize,
    pub end: usize,
    pub line: u32,
    pub context: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageResponse {
    pub status: String,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusResponse {
    pub status: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}

/// Response to the client; serialized without a variant tag
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Response {
    Initialized(InitializedResponse),
    Search(SearchResponse),
    Message(MessageResponse),
    Status(StatusResponse),
    Error(ErrorResponse),
}

impl Response {
    pub fn initialized(files_indexed: usize, project_path: impl Into<String>) -> Self {
        Response::Initialized(InitializedResponse {
            status: "initialized".to_string(),
            files_indexed,
            project_path: project_path.into(),
        })
    }

    pub fn search(outcome: &SearchOutcome) -> Self {
        let matches = outcome
            .by_file()
            .into_iter()
            .map(|(file, hits)| FileMatches {
                file: file.to_string(),
                matches: hits
                    .into_iter()
                    .map(|hit| MatchData {
                        start: hit.start,
                        end: hit.end,
                        line: hit.line,
                        context: hit.context.clone(),
                    })
                    .collect(),
            })
            .collect();

        Response::Search(SearchResponse {
            status: "success".to_string(),
            total_matches: outcome.total_matches,
            returned_matches: outcome.returned_matches(),
            matches,
        })
    }

    pub fn applied() -> Self {
        Response::Message(MessageResponse {
            status: "success".to_string(),
            message: "Changes applied successfully".to_string(),
        })
    }

    pub fn shutdown() -> Self {
        Response::Status(StatusResponse {
            status: "shutdown".to_string(),
        })
    }

    pub fn error(message: impl std::fmt::Display) -> Self {
        Response::Error(ErrorResponse {
            error: message.to_string(),
        })
    }
}

/// Write a message with its `Content-Length` header
pub fn write_message<W: Write>(writer: &mut W, msg: &impl Serialize) -> io::Result<()> {
    let json = serde_json::to_vec(msg).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;

    write!(writer, "Content-Length: {}\n\n", json.len())?;
    writer.write_all(&json)?;
    writer.flush()?;

    Ok(())
}

/// Read one message body.
///
/// Returns `Ok(None)` on end of stream before a header starts. A header
/// block without a length yields an empty body. Header lines may end with
/// `\r\n`.
pub fn read_message<R: BufRead>(reader: &mut R) -> io::Result<Option<Vec<u8>>> {
    read_message_limited(reader, MAX_MESSAGE_SIZE)
}

/// [`read_message`] with an explicit body limit. An oversized body is
/// consumed before the error is returned so the next frame still lines up.
fn read_message_limited<R: BufRead>(
    reader: &mut R,
    max_size: usize,
) -> io::Result<Option<Vec<u8>>> {
    let mut content_length: Option<usize> = None;
    let mut saw_header = false;
    let mut line = Vec::new();

    loop {
        line.clear();
        if reader.read_until(b'\n', &mut line)? == 0 {
            if saw_header {
                return Err(io::Error::new(
                    io::ErrorKind::UnexpectedEof,
                    "Stream closed inside a message header",
                ));
            }
            return Ok(None);
        }

        let text = String::from_utf8_lossy(&line);
        let text = text.trim();
        if text.is_empty() {
            if saw_header {
                break;
            }
            // Stray blank line between messages
            continue;
        }
        saw_header = true;

        if let Some((name, value)) = text.split_once(':')
            && name.trim().eq_ignore_ascii_case(CONTENT_LENGTH)
        {
            let len = value.trim().parse::<usize>().map_err(|_| {
                io::Error::new(io::ErrorKind::InvalidData, format!("Invalid Content-Length: {value}"))
            })?;
            content_length = Some(len);
        }
    }

    let len = content_length.unwrap_or(0);
    // Sanity check on the body size before allocating
    if len > max_size {
        io::copy(&mut reader.by_ref().take(len as u64), &mut io::sink())?;
        return Err(io::Error::new(io::ErrorKind::InvalidData, "Message too large"));
    }

    let mut buf = vec![0u8; len];
    reader.read_exact(&mut buf)?;
    Ok(Some(buf))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::SearchHit;
    use std::io::Cursor;

    #[test]
    fn test_roundtrip_frame() {
        let mut buf = Vec::new();
        write_message(&mut buf, &Response::shutdown()).unwrap();
        assert!(buf.starts_with(b"Content-Length: 21\n\n"));

        let mut cursor = Cursor::new(buf);
        let body = read_message(&mut cursor).unwrap().unwrap();
        let decoded: Response = serde_json::from_slice(&body).unwrap();
        assert_eq!(decoded, Response::shutdown());
        assert!(read_message(&mut cursor).unwrap().is_none());
    }

    #[test]
    fn test_read_crlf_and_extra_headers() {
        let body = br#"{"command":"shutdown"}"#;
        let mut input = format!(
            "Content-Type: application/json\r\ncontent-length: {}\r\n\r\n",
            body.len()
        )
        .into_bytes();
        input.extend_from_slice(body);

        let mut cursor = Cursor::new(input);
        let read = read_message(&mut cursor).unwrap().unwrap();
        assert_eq!(read, body.to_vec());
    }

    #[test]
    fn test_read_consecutive_messages() {
        let mut buf = Vec::new();
        write_message(&mut buf, &serde_json::json!({"command": "search", "pattern": "a"})).unwrap();
        write_message(&mut buf, &serde_json::json!({"command": "shutdown"})).unwrap();

        let mut cursor = Cursor::new(buf);
        let first = read_message(&mut cursor).unwrap().unwrap();
        let second = read_message(&mut cursor).unwrap().unwrap();
        assert!(matches!(Request::from_slice(&first), Ok(Request::Search { .. })));
        assert_eq!(Request::from_slice(&second), Ok(Request::Shutdown));
    }

    #[test]
    fn test_read_rejects_oversized_and_truncated() {
        let mut cursor = Cursor::new(format!("Content-Length: {}\n\n", MAX_MESSAGE_SIZE + 1));
        assert!(read_message(&mut cursor).is_err());

        let mut cursor = Cursor::new(b"Content-Length: 10\n\n{}".to_vec());
        assert!(read_message(&mut cursor).is_err());

        let mut cursor = Cursor::new(b"Content-Length: x\n\n".to_vec());
        assert!(read_message(&mut cursor).is_err());
    }

    #[test]
    fn test_oversized_body_is_skipped() {
        let mut input = b"Content-Length: 12\n\n".to_vec();
        input.extend_from_slice(&[b'x'; 12]);
        write_message(&mut input, &serde_json::json!({"command": "shutdown"})).unwrap();

        let mut cursor = Cursor::new(input);
        let err = read_message_limited(&mut cursor, 8).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidData);

        // The following frame is still readable
        let body = read_message_limited(&mut cursor, 8 * 1024).unwrap().unwrap();
        assert_eq!(Request::from_slice(&body), Ok(Request::Shutdown));
        assert!(read_message_limited(&mut cursor, 8 * 1024).unwrap().is_none());
    }

    #[test]
    fn test_decode_requests() {
        assert_eq!(
            Request::from_slice(br#"{"command":"search","pattern":"myFunction","max_results":10}"#),
            Ok(Request::Search {
                pattern: "myFunction".to_string(),
                max_results: Some(10),
            })
        );
        assert_eq!(
            Request::from_slice(br#"{"command":"search","pattern":"x"}"#),
            Ok(Request::Search {
                pattern: "x".to_string(),
                max_results: None,
            })
        );
        assert_eq!(
            Request::from_slice(br#"{"command":"apply_changes","changes":"..."}"#),
            Ok(Request::ApplyChanges {
                changes: "...".to_string()
            })
        );
        assert_eq!(Request::from_slice(br#"{"command":"shutdown"}"#), Ok(Request::Shutdown));
    }

    #[test]
    fn test_decode_errors() {
        assert!(matches!(
            Request::from_slice(b"{not json"),
            Err(ProtocolError::InvalidJson(_))
        ));
        assert_eq!(
            Request::from_slice(br#"{"pattern":"x"}"#),
            Err(ProtocolError::MissingCommand)
        );
        assert_eq!(
            Request::from_slice(br#"{"command":"index"}"#),
            Err(ProtocolError::UnknownCommand("index".to_string()))
        );
        assert!(matches!(
            Request::from_slice(br#"{"command":"search"}"#),
            Err(ProtocolError::InvalidRequest { .. })
        ));
        assert!(matches!(
            Request::from_slice(br#"{"command":"search","pattern":"x","max_results":"ten"}"#),
            Err(ProtocolError::InvalidRequest { .. })
        ));
    }

    #[test]
    fn test_response_shapes() {
        let outcome = SearchOutcome {
            version: 3,
            total_matches: 2,
            hits: vec![
                SearchHit {
                    file: "src/app.js".to_string(),
                    start: 9,
                    end: 19,
                    line: 1,
                    context: "function myFunction() {".to_string(),
                },
                SearchHit {
                    file: "src/app.js".to_string(),
                    start: 40,
                    end: 50,
                    line: 2,
                    context: "myFunction();".to_string(),
                },
            ],
            cached: false,
        };

        let json = serde_json::to_value(Response::search(&outcome)).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "status": "success",
                "total_matches": 2,
                "returned_matches": 2,
                "matches": [{
                    "file": "src/app.js",
                    "matches": [
                        {"start": 9, "end": 19, "line": 1, "context": "function myFunction() {"},
                        {"start": 40, "end": 50, "line": 2, "context": "myFunction();"}
                    ]
                }]
            })
        );

        assert_eq!(
            serde_json::to_value(Response::initialized(4, "/tmp/p")).unwrap(),
            serde_json::json!({"status": "initialized", "files_indexed": 4, "project_path": "/tmp/p"})
        );
        assert_eq!(
            serde_json::to_value(Response::applied()).unwrap(),
            serde_json::json!({"status": "success", "message": "Changes applied successfully"})
        );
        assert_eq!(
            serde_json::to_value(Response::error("boom")).unwrap(),
            serde_json::json!({"error": "boom"})
        );
    }
}
