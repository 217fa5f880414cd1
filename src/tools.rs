//! Stateless text tools.
//!
//! Each function validates its input and reports problems as a
//! [`ToolError`] suitable for an inline message.
use base64::{engine::general_purpose::STANDARD, Engine as _};
use pulldown_cmark::{html, Options, Parser};
use serde::Serialize;
use serde_json::{ser::PrettyFormatter, Serializer, Value};
use sha2::{Digest, Sha256};

use crate::ToolError;

fn parse_json(input: &str) -> Result<Value, ToolError> {
    serde_json::from_str(input).map_err(|e| ToolError::InvalidJson {
        line: e.line(),
        column: e.column(),
        message: e.to_string(),
    })
}

/// Pretty-prints JSON with `indent` spaces per level.
pub fn format_json(input: &str, indent: usize) -> Result<String, ToolError> {
    let value = parse_json(input)?;
    let indent = " ".repeat(indent);
    let mut out = Vec::new();
    let mut serializer =
        Serializer::with_formatter(&mut out, PrettyFormatter::with_indent(indent.as_bytes()));
    value
        .serialize(&mut serializer)
        .map_err(|e| ToolError::InvalidJson {
            line: 0,
            column: 0,
            message: e.to_string(),
        })?;
    String::from_utf8(out).map_err(|_| ToolError::InvalidUtf8)
}

/// Removes all insignificant whitespace from JSON.
pub fn minify_json(input: &str) -> Result<String, ToolError> {
    Ok(parse_json(input)?.to_string())
}

pub fn base64_encode(input: &str) -> String {
    STANDARD.encode(input.as_bytes())
}

/// Decodes standard Base64 into UTF-8 text. Surrounding whitespace is ignored.
pub fn base64_decode(input: &str) -> Result<String, ToolError> {
    let bytes = STANDARD
        .decode(input.trim())
        .map_err(|e| ToolError::InvalidBase64(e.to_string()))?;
    String::from_utf8(bytes).map_err(|_| ToolError::InvalidUtf8)
}

/// Lowercase hex SHA-256 digest.
pub fn sha256_hex(input: &str) -> String {
    let digest = Sha256::digest(input.as_bytes());
    digest.iter().map(|b| format!("{:02x}", b)).collect()
}

/// Renders markdown (with tables and strikethrough) to HTML.
pub fn markdown_to_html(input: &str) -> String {
    let mut options = Options::empty();
    options.insert(Options::ENABLE_TABLES);
    options.insert(Options::ENABLE_STRIKETHROUGH);
    options.insert(Options::ENABLE_TASKLISTS);

    let parser = Parser::new_ext(input, options);
    let mut out = String::with_capacity(input.len() * 3 / 2);
    html::push_html(&mut out, parser);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn formats_and_minifies_json() {
        assert_eq!(
            format_json(r#"{"a":[1,2]}"#, 2).unwrap(),
            "{\n  \"a\": [\n    1,\n    2\n  ]\n}"
        );
        assert_eq!(minify_json("{ \"a\" : 1 }").unwrap(), r#"{"a":1}"#);
    }

    #[test]
    fn invalid_json_reports_position() {
        let err = minify_json("{\n  \"a\": }").unwrap_err();
        assert!(matches!(err, ToolError::InvalidJson { line: 2, .. }));
    }

    #[test]
    fn base64_round_trip_and_errors() {
        assert_eq!(base64_encode("hello"), "aGVsbG8=");
        assert_eq!(base64_decode(" aGVsbG8=\n").unwrap(), "hello");
        assert!(matches!(
            base64_decode("not base64!"),
            Err(ToolError::InvalidBase64(_))
        ));
        assert_eq!(base64_decode("/w=="), Err(ToolError::InvalidUtf8));
    }

    #[test]
    fn sha256_of_empty_string() {
        assert_eq!(
            sha256_hex(""),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }

    #[test]
    fn renders_markdown() {
        assert_eq!(
            markdown_to_html("# Title\n\n~~old~~"),
            "<h1>Title</h1>\n<p><del>old</del></p>\n"
        );
    }
}
