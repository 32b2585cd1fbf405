use serde_json::{Value, json};

/// Failure of a single tool call.
///
/// Every variant is reported back to the MCP client as a tool result with
/// `isError: true`; none of them terminate the server.
#[derive(Debug, thiserror::Error)]
pub enum ToolError {
    #[error("You must call set_credentials(base_url, username, password) first.")]
    NotConfigured,

    #[error("Error: {status}")]
    Status { status: u16, body: String },

    #[error("File not found: {path}")]
    FileNotFound { path: String },

    #[error("Failed to read file {path}: {source}")]
    FileRead {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to reach API Gateway: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("Invalid gateway URL '{url}': {source}")]
    InvalidUrl {
        url: String,
        #[source]
        source: url::ParseError,
    },

    #[error("Invalid arguments for '{tool}': {message}")]
    InvalidArguments { tool: String, message: String },

    #[error("Failed to encode request body: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("Unknown tool '{0}'")]
    UnknownTool(String),
}

impl ToolError {
    pub fn code(&self) -> &'static str {
        match self {
            ToolError::NotConfigured => "credentials_not_set",
            ToolError::Status { .. } => "gateway_status",
            ToolError::FileNotFound { .. } => "file_not_found",
            ToolError::FileRead { .. } => "file_read_failed",
            ToolError::Transport(_) => "connection_error",
            ToolError::InvalidUrl { .. } => "invalid_url",
            ToolError::InvalidArguments { .. } => "validation_failed",
            ToolError::Encode(_) => "encode_failed",
            ToolError::UnknownTool(_) => "unknown_tool",
        }
    }

    /// Structured payload handed back to the caller.
    ///
    /// Gateway status errors and missing upload files keep the flat
    /// `error`/`details` shape clients of the gateway tools already parse.
    pub fn to_value(&self) -> Value {
        match self {
            ToolError::Status { body, .. } => json!({
                "error": self.to_string(),
                "details": body,
            }),
            ToolError::FileNotFound { .. } => json!({
                "error": self.to_string(),
            }),
            _ => json!({
                "error": self.code(),
                "message": self.to_string(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_error_renders_status_and_raw_body() {
        let err = ToolError::Status {
            status: 404,
            body: "not found".to_string(),
        };
        assert_eq!(
            err.to_value(),
            json!({ "error": "Error: 404", "details": "not found" })
        );
    }

    #[test]
    fn not_configured_points_at_set_credentials() {
        let payload = ToolError::NotConfigured.to_value();
        assert_eq!(payload["error"], "credentials_not_set");
        assert!(
            payload["message"]
                .as_str()
                .unwrap()
                .contains("set_credentials")
        );
    }

    #[test]
    fn file_not_found_names_the_path() {
        let err = ToolError::FileNotFound {
            path: "/tmp/missing.json".to_string(),
        };
        assert_eq!(
            err.to_value(),
            json!({ "error": "File not found: /tmp/missing.json" })
        );
    }

    #[test]
    fn invalid_url_keeps_parse_error_as_source() {
        use std::error::Error as _;

        let source = url::Url::parse("/apis").expect_err("relative URL has no base");
        let err = ToolError::InvalidUrl {
            url: "/apis".to_string(),
            source,
        };
        assert_eq!(err.code(), "invalid_url");
        assert!(err.source().is_some());
        assert!(err.to_string().starts_with("Invalid gateway URL '/apis'"));
    }

    #[test]
    fn invalid_arguments_use_validation_failed_code() {
        let err = ToolError::InvalidArguments {
            tool: "get_api_details".to_string(),
            message: "missing field `api_id`".to_string(),
        };
        let payload = err.to_value();
        assert_eq!(payload["error"], "validation_failed");
        assert!(payload["message"].as_str().unwrap().contains("api_id"));
    }
}
