//! Cargo JSON message format
//!
//! The `cargo --message-format=json` wire shapes the Verifier pipeline and
//! the error parser both parse diagnostics out of.

use serde::{Deserialize, Serialize};

/// Cargo JSON message format
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "reason")]
#[allow(clippy::large_enum_variant)]
pub enum CargoMessage {
    /// Compiler diagnostic message
    #[serde(rename = "compiler-message")]
    CompilerMessage {
        message: DiagnosticMessage,
        target: Option<Target>,
    },

    /// Compiler artifact produced
    #[serde(rename = "compiler-artifact")]
    CompilerArtifact { target: Target },

    /// Build script output
    #[serde(rename = "build-script-executed")]
    BuildScriptExecuted { package_id: String },

    /// Build finished
    #[serde(rename = "build-finished")]
    BuildFinished { success: bool },

    /// Unknown message type (catch-all)
    #[serde(other)]
    Other,
}

impl CargoMessage {
    /// Check if this is an error message
    pub fn is_error(&self) -> bool {
        matches!(
            self,
            CargoMessage::CompilerMessage { message, .. } if message.level == "error"
        )
    }

    /// Check if this is a warning message
    pub fn is_warning(&self) -> bool {
        matches!(
            self,
            CargoMessage::CompilerMessage { message, .. } if message.level == "warning"
        )
    }

    /// Get the diagnostic message if this is a compiler message
    pub fn as_diagnostic(&self) -> Option<&DiagnosticMessage> {
        match self {
            CargoMessage::CompilerMessage { message, .. } => Some(message),
            _ => None,
        }
    }
}

/// Compiler diagnostic message
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiagnosticMessage {
    /// Message text
    pub message: String,
    /// Error code (e.g., "E0308")
    pub code: Option<ErrorCode>,
    /// Severity level ("error", "warning", "note")
    pub level: String,
    /// Source spans where the error occurred
    #[serde(default)]
    pub spans: Vec<Span>,
    /// Child diagnostics (notes, helps, suggestions)
    #[serde(default)]
    pub children: Vec<DiagnosticMessage>,
    /// Rendered message (human-readable format)
    pub rendered: Option<String>,
}

impl DiagnosticMessage {
    /// Get the error code string
    pub fn error_code(&self) -> Option<&str> {
        self.code.as_ref().map(|c| c.code.as_str())
    }

    /// Get the primary span
    pub fn primary_span(&self) -> Option<&Span> {
        self.spans.iter().find(|s| s.is_primary)
    }

    /// Extract suggested replacement if available
    pub fn suggested_replacement(&self) -> Option<&str> {
        for span in &self.spans {
            if let Some(replacement) = &span.suggested_replacement {
                return Some(replacement);
            }
        }
        for child in &self.children {
            if let Some(replacement) = child.suggested_replacement() {
                return Some(replacement);
            }
        }
        None
    }
}

/// Error code with explanation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorCode {
    /// Error code (e.g., "E0308")
    pub code: String,
    /// Explanation URL or text
    pub explanation: Option<String>,
}

/// Source span indicating where in the code the error occurred
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Span {
    /// File path
    pub file_name: String,
    /// Starting byte offset
    pub byte_start: usize,
    /// Ending byte offset
    pub byte_end: usize,
    /// Starting line number (1-indexed)
    pub line_start: usize,
    /// Ending line number
    pub line_end: usize,
    /// Starting column (1-indexed)
    pub column_start: usize,
    /// Ending column
    pub column_end: usize,
    /// Whether this is the primary span
    #[serde(default)]
    pub is_primary: bool,
    /// Text content at this span
    #[serde(default)]
    pub text: Vec<SpanText>,
    /// Label for this span
    pub label: Option<String>,
    /// Suggested replacement text
    pub suggested_replacement: Option<String>,
    /// Suggestion applicability
    pub suggestion_applicability: Option<String>,
}

/// Text content within a span
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpanText {
    /// The source text
    pub text: String,
    /// Highlight start within text
    pub highlight_start: usize,
    /// Highlight end within text
    pub highlight_end: usize,
}

/// Cargo target (crate/binary/test)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Target {
    /// Crate name
    pub name: String,
    /// Kind (lib, bin, test, etc.)
    #[serde(default)]
    pub kind: Vec<String>,
    /// Source path
    pub src_path: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_error_message() {
        let json = r#"{
            "reason": "compiler-message",
            "message": {
                "message": "mismatched types",
                "code": {"code": "E0308", "explanation": null},
                "level": "error",
                "spans": [{
                    "file_name": "src/main.rs",
                    "byte_start": 100,
                    "byte_end": 110,
                    "line_start": 5,
                    "line_end": 5,
                    "column_start": 10,
                    "column_end": 20,
                    "is_primary": true,
                    "text": [{"text": "let x: i32 = \"hello\";", "highlight_start": 10, "highlight_end": 17}],
                    "label": "expected `i32`, found `&str`",
                    "suggested_replacement": null,
                    "suggestion_applicability": null
                }],
                "children": [],
                "rendered": "error[E0308]: mismatched types\n --> src/main.rs:5:10"
            },
            "target": {"name": "test", "kind": ["lib"], "src_path": "src/lib.rs"}
        }"#;

        let msg: CargoMessage = serde_json::from_str(json).unwrap();
        assert!(msg.is_error());
        assert!(!msg.is_warning());

        let diag = msg.as_diagnostic().unwrap();
        assert_eq!(diag.error_code(), Some("E0308"));
    }
}
