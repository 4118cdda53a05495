use crate::error::RecordError;
use serde_json::Value;

/// U+FFFD stands in for custom (channel) emoji, which carry no portable text.
pub const CUSTOM_EMOJI_PLACEHOLDER: char = '\u{FFFD}';

/// Flatten the `rawMessage` run list into plain text.
///
/// - `{"text": "..."}` contributes its text
/// - `{"emoji": {...}}` contributes U+FFFD for custom emoji, otherwise its `emojiId`
/// - any other run kind is an error
pub fn flatten_runs(raw: &Value) -> Result<String, RecordError> {
    let runs = raw.as_array().ok_or_else(|| RecordError::malformed("rawMessage"))?;
    let mut out = String::new();
    for run in runs {
        let obj = run.as_object().ok_or_else(|| RecordError::malformed("rawMessage"))?;
        let (kind, payload) = obj.iter().next().ok_or_else(|| RecordError::malformed("rawMessage"))?;
        match kind.as_str() {
            "text" => {
                let s = payload.as_str().ok_or_else(|| RecordError::malformed("rawMessage.text"))?;
                out.push_str(s);
            }
            "emoji" => {
                if payload.get("isCustomEmoji").is_some() {
                    out.push(CUSTOM_EMOJI_PLACEHOLDER);
                } else {
                    let id = payload
                        .get("emojiId")
                        .and_then(|v| v.as_str())
                        .ok_or_else(|| RecordError::malformed("rawMessage.emoji.emojiId"))?;
                    out.push_str(id);
                }
            }
            other => return Err(RecordError::UnknownRun(other.to_string())),
        }
    }
    Ok(out)
}
