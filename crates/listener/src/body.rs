//! Request body decoding.
//!
//! Providers deliver either a JSON body or a form-encoded body whose `payload`
//! field holds the JSON document. Bitbucket's form payloads contain raw
//! newlines inside string values, so those are decoded leniently.

use std::fmt::Write as _;

use deploy::DeployError;
use serde_json::Value;

/// Decodes a webhook body.
///
/// Returns `Ok(None)` when the body is neither JSON nor a form with a
/// `payload` field.
pub fn decode_body(content_type: Option<&str>, body: &[u8]) -> Result<Option<Value>, DeployError> {
    let media_type = content_type
        .and_then(|ct| ct.split(';').next())
        .map(|mt| mt.trim().to_ascii_lowercase())
        .unwrap_or_default();

    if media_type == "application/json" || media_type.ends_with("+json") {
        return serde_json::from_slice(body)
            .map(Some)
            .map_err(|e| DeployError::malformed(format!("invalid JSON body: {e}")));
    }

    let Some(payload) = url::form_urlencoded::parse(body)
        .find(|(key, _)| key == "payload")
        .map(|(_, value)| value.into_owned())
    else {
        return Ok(None);
    };

    parse_lenient(&payload)
        .map(Some)
        .map_err(|e| DeployError::malformed(format!("invalid JSON in payload field: {e}")))
}

/// Parses JSON that may contain raw control characters inside string literals.
///
/// Control characters inside strings are escaped before parsing; everything
/// outside strings is left for the parser to judge.
pub fn parse_lenient(text: &str) -> Result<Value, serde_json::Error> {
    let mut escaped_text = String::with_capacity(text.len());
    let mut in_string = false;
    let mut after_backslash = false;

    for ch in text.chars() {
        if !in_string {
            if ch == '"' {
                in_string = true;
            }
            escaped_text.push(ch);
            continue;
        }
        if after_backslash {
            after_backslash = false;
            escaped_text.push(ch);
            continue;
        }
        match ch {
            '\\' => {
                after_backslash = true;
                escaped_text.push(ch);
            }
            '"' => {
                in_string = false;
                escaped_text.push(ch);
            }
            '\n' => escaped_text.push_str("\\n"),
            '\r' => escaped_text.push_str("\\r"),
            '\t' => escaped_text.push_str("\\t"),
            c if c.is_control() && (c as u32) < 0x20 => {
                let _ = write!(escaped_text, "\\u{:04x}", c as u32);
            }
            c => escaped_text.push(c),
        }
    }

    serde_json::from_str(&escaped_text)
}
