//! Bridge wire protocol
//!
//! Newline-delimited JSON between the test process and the remote context.
//! Every request line carries an id and one [`Command`]; the remote context
//! answers with exactly one [`Response`] line for that id. Unsolicited
//! [`Event`] lines may be interleaved at any point.
//!
//! ```text
//! -> {"id":3,"command":{"op":"read_file","path":"Welcome.md","mode":"cached"}}
//! <- {"event":"console","data":{"level":"info","message":"indexed 4 files"}}
//! <- {"id":3,"ok":true,"value":"This is your new *vault*.\n"}
//! ```

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Event announcing that the remote context accepts requests
pub const EVENT_READY: &str = "ready";

/// Event emitted when a background indexing pass finishes
pub const EVENT_RESOLVED: &str = "resolved";

/// Event carrying forwarded console output
pub const EVENT_CONSOLE: &str = "console";

/// The closed set of operations the remote context knows how to run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Command {
    /// Liveness check, answers with the agent version
    Ping,

    /// Return `value` unchanged
    Echo { value: Value },

    /// Look a path up in the content index
    ResolveFile { path: String },

    /// Resolve a path and read its content
    ReadFile {
        path: String,
        #[serde(default)]
        mode: ReadMode,
    },

    /// First destination for a wiki-style link target
    ResolveLink {
        linkpath: String,
        #[serde(default)]
        source_path: String,
    },

    /// Every file in the content index
    ListFiles,

    /// Link destinations the indexer resolved for `path`, with counts
    ResolvedLinks { path: String },

    /// Wait for the indexer's completion signal, bounded by `timeout_ms`
    WaitForIndexing {
        timeout_ms: u64,
        #[serde(default)]
        accept_settled: bool,
    },
}

impl Command {
    /// Short operation name used in logs
    pub fn op(&self) -> &'static str {
        match self {
            Command::Ping => "ping",
            Command::Echo { .. } => "echo",
            Command::ResolveFile { .. } => "resolve_file",
            Command::ReadFile { .. } => "read_file",
            Command::ResolveLink { .. } => "resolve_link",
            Command::ListFiles => "list_files",
            Command::ResolvedLinks { .. } => "resolved_links",
            Command::WaitForIndexing { .. } => "wait_for_indexing",
        }
    }
}

/// How `read_file` obtains content
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReadMode {
    /// Served from the application's content cache when present
    #[default]
    Cached,
    /// Always re-read from the underlying store
    Authoritative,
}

/// One bridge request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Request {
    pub id: u64,
    pub command: Command,
}

/// Failure class reported by the remote context
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    NotFound,
    Timeout,
    Failed,
    BadRequest,
}

/// Error half of an execution result
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemoteError {
    pub code: ErrorCode,
    pub message: String,
}

impl RemoteError {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::NotFound, message)
    }

    pub fn failed(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::Failed, message)
    }
}

impl std::fmt::Display for RemoteError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}: {}", self.code, self.message)
    }
}

/// Outcome of running one command in the remote context
pub type ExecutionResult = std::result::Result<Value, RemoteError>;

/// One bridge response, `{ id, ok: true, value }` or `{ id, ok: false, error }`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Response {
    pub id: u64,
    pub ok: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<RemoteError>,
}

impl Response {
    pub fn from_result(id: u64, result: ExecutionResult) -> Self {
        match result {
            Ok(value) => Self {
                id,
                ok: true,
                value: Some(value),
                error: None,
            },
            Err(error) => Self {
                id,
                ok: false,
                value: None,
                error: Some(error),
            },
        }
    }

    pub fn into_result(self) -> ExecutionResult {
        if self.ok {
            // `"value": null` deserializes as None
            Ok(self.value.unwrap_or(Value::Null))
        } else {
            Err(self
                .error
                .unwrap_or_else(|| RemoteError::failed("remote reported failure without detail")))
        }
    }
}

/// Unsolicited notification from the remote context
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    pub event: String,
    #[serde(default)]
    pub data: Value,
}

impl Event {
    pub fn new(event: impl Into<String>, data: Value) -> Self {
        Self {
            event: event.into(),
            data,
        }
    }
}

/// Any line the remote context may write
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Frame {
    Response(Response),
    Event(Event),
}

/// File metadata as exposed by the application
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileStat {
    /// Creation time, ms since epoch
    pub ctime: i64,
    /// Modification time, ms since epoch
    pub mtime: i64,
    pub size: u64,
}

/// A resolved file in the vault's content index
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileHandle {
    /// Vault-relative path with `/` separators
    pub path: String,
    /// File name including extension
    pub name: String,
    /// File name without extension
    pub basename: String,
    pub extension: String,
    pub stat: FileStat,
}

impl FileHandle {
    /// Build a handle from a vault-relative path
    pub fn new(path: impl Into<String>, stat: FileStat) -> Self {
        let path = path.into();
        let name = path.rsplit('/').next().unwrap_or(&path).to_string();
        let (basename, extension) = match name.rfind('.') {
            Some(idx) if idx > 0 => (name[..idx].to_string(), name[idx + 1..].to_string()),
            _ => (name.clone(), String::new()),
        };
        Self {
            path,
            name,
            basename,
            extension,
            stat,
        }
    }

    /// Folder portion of the path, empty for the vault root
    pub fn parent(&self) -> &str {
        match self.path.rfind('/') {
            Some(idx) => &self.path[..idx],
            None => "",
        }
    }

    pub fn is_markdown(&self) -> bool {
        self.extension.eq_ignore_ascii_case("md")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_request_serialization() {
        let req = Request {
            id: 7,
            command: Command::ReadFile {
                path: "Welcome.md".to_string(),
                mode: ReadMode::Authoritative,
            },
        };

        let json = serde_json::to_string(&req).unwrap();
        assert!(json.contains("\"op\":\"read_file\""));
        assert!(json.contains("\"mode\":\"authoritative\""));
    }

    #[test]
    fn test_read_mode_defaults_to_cached() {
        let json = r#"{"id": 1, "command": {"op": "read_file", "path": "a.md"}}"#;
        let req: Request = serde_json::from_str(json).unwrap();
        assert_eq!(
            req.command,
            Command::ReadFile {
                path: "a.md".to_string(),
                mode: ReadMode::Cached
            }
        );
    }

    #[test]
    fn test_unknown_op_is_rejected() {
        let json = r#"{"id": 1, "command": {"op": "eval", "source": "() => 1"}}"#;
        assert!(serde_json::from_str::<Request>(json).is_err());
    }

    #[test]
    fn test_null_value_is_ok() {
        let json = r#"{"id": 2, "ok": true, "value": null}"#;
        let response: Response = serde_json::from_str(json).unwrap();
        assert_eq!(response.into_result(), Ok(Value::Null));
    }

    #[test]
    fn test_error_response_parsing() {
        let json = r#"{"id": 2, "ok": false, "error": {"code": "not_found", "message": "missing.md"}}"#;
        let response: Response = serde_json::from_str(json).unwrap();
        let err = response.into_result().unwrap_err();
        assert_eq!(err.code, ErrorCode::NotFound);
        assert_eq!(err.message, "missing.md");
    }

    #[test]
    fn test_frame_distinguishes_events() {
        let frame: Frame =
            serde_json::from_str(r#"{"event": "ready", "data": {"version": "0.1.0"}}"#).unwrap();
        match frame {
            Frame::Event(ev) => assert_eq!(ev.event, EVENT_READY),
            other => panic!("expected event, got {:?}", other),
        }

        let response: Frame = serde_json::from_str(r#"{"id": 4, "ok": true, "value": [1, 2]}"#).unwrap();
        match response {
            Frame::Response(r) => assert_eq!(r.into_result(), Ok(json!([1, 2]))),
            other => panic!("expected response, got {:?}", other),
        }
    }

    #[test]
    fn test_file_handle_names() {
        let file = FileHandle::new("notes/daily/2024-01-01.md", FileStat::default());
        assert_eq!(file.name, "2024-01-01.md");
        assert_eq!(file.basename, "2024-01-01");
        assert_eq!(file.extension, "md");
        assert_eq!(file.parent(), "notes/daily");
        assert!(file.is_markdown());

        let dotless = FileHandle::new("LICENSE", FileStat::default());
        assert_eq!(dotless.basename, "LICENSE");
        assert_eq!(dotless.extension, "");
        assert_eq!(dotless.parent(), "");
    }
}
