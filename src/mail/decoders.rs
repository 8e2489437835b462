use anyhow::{Context, Result};
use base64::{Engine as _, engine::general_purpose};

use crate::domain::message::MessageContent;
use crate::mail::payload::{MessagePart, RawMessage};

/// Gmail hands out URL-safe base64; map it onto the standard alphabet.
pub fn normalize_base64(data: &str) -> String {
    data.replace('-', "+").replace('_', "/")
}

/// Decode a Gmail body blob into UTF-8 text.
pub fn decode_body_data(data: &str) -> Result<String> {
    let normalized = normalize_base64(data);
    // Gmail sometimes strips the padding; restore it before a strict decode.
    let trimmed = normalized.trim_end_matches('=');
    let padded = match trimmed.len() % 4 {
        2 => format!("{trimmed}=="),
        3 => format!("{trimmed}="),
        _ => trimmed.to_string(),
    };
    let bytes = general_purpose::STANDARD
        .decode(padded.as_bytes())
        .context("invalid base64 in message body")?;
    String::from_utf8(bytes).context("message body is not valid UTF-8")
}

/// First header named exactly `Subject`.
pub fn extract_subject(payload: &MessagePart) -> Option<String> {
    payload
        .headers
        .iter()
        .find(|h| h.name == "Subject")
        .map(|h| h.value.clone())
}

/// Concatenate the `text/plain` parts of a multipart payload, or decode the
/// single body of a flat one. Neither present yields an empty body.
pub fn extract_body(payload: &MessagePart) -> Result<String> {
    if let Some(parts) = &payload.parts {
        let mut body = String::new();
        for part in parts.iter().filter(|p| p.mime_type == "text/plain") {
            if let Some(data) = part.body.as_ref().and_then(|b| b.data.as_deref()) {
                body.push_str(&decode_body_data(data)?);
            }
        }
        return Ok(body);
    }

    match payload.body.as_ref().and_then(|b| b.data.as_deref()) {
        Some(data) => decode_body_data(data),
        None => Ok(String::new()),
    }
}

pub fn extract_content(msg: &RawMessage) -> Result<MessageContent> {
    let empty = MessagePart::default();
    let payload = msg.payload.as_ref().unwrap_or(&empty);
    Ok(MessageContent {
        subject: extract_subject(payload),
        body: extract_body(payload).with_context(|| format!("message {}", msg.id))?,
    })
}
