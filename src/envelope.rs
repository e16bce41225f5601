//! In-band helper envelopes.
//!
//! A helper child embeds its structured reply in stdout between a line
//! containing exactly [`JSON_START`] and one containing exactly
//! [`JSON_END`]; everything outside the markers is free-form human
//! output. Several envelopes may appear; only the last completed one
//! counts.

use serde::Deserialize;

/// Opening marker line.
pub const JSON_START: &str = "JSON_START";
/// Closing marker line.
pub const JSON_END: &str = "JSON_END";

/// Why a helper's stdout yielded no usable payload.
#[derive(Debug, thiserror::Error)]
pub enum HelperError {
    #[error("no envelope found in helper output")]
    Empty,
    #[error("helper envelope is not decodable: {0}")]
    Invalid(#[source] serde_json::Error),
}

impl HelperError {
    /// The outcome kind this failure maps to.
    pub fn verdict(&self) -> crate::Verdict {
        match self {
            HelperError::Empty => crate::Verdict::HelperReturnEmpty,
            HelperError::Invalid(_) => crate::Verdict::HelperReturnInvalid,
        }
    }
}

/// Walks `lines` (already stripped of their terminator) and returns the
/// body of the last completed envelope, re-joined with newlines.
pub fn extract_block<I, S>(lines: I) -> Option<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut inside = false;
    let mut current: Vec<String> = Vec::new();
    let mut last = None;
    for line in lines {
        let line = line.as_ref();
        if !inside {
            if line == JSON_START {
                inside = true;
                current.clear();
            }
        } else if line == JSON_END {
            inside = false;
            last = Some(current.join("\n"));
        } else {
            current.push(line.to_string());
        }
    }
    last
}

/// Decodes the last envelope in `lines` as JSON.
pub fn decode_payload<I, S>(lines: I) -> Result<serde_json::Value, HelperError>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let block = extract_block(lines).ok_or(HelperError::Empty)?;
    serde_json::from_str(&block).map_err(HelperError::Invalid)
}

/// The agreed shape of a helper reply.
#[derive(Debug, Clone, Deserialize)]
pub struct HelperReply {
    pub error_code: String,
    #[serde(default)]
    pub value: serde_json::Value,
    #[serde(default)]
    pub error_message: String,
}

impl HelperReply {
    /// Extracts and projects the last envelope in `lines`.
    pub fn from_lines<I, S>(lines: I) -> Result<HelperReply, HelperError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let block = extract_block(lines).ok_or(HelperError::Empty)?;
        serde_json::from_str(&block).map_err(HelperError::Invalid)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_markers_means_no_block() {
        assert!(extract_block(["free", "text"]).is_none());
        assert!(matches!(
            decode_payload(["free", "text"]),
            Err(HelperError::Empty)
        ));
    }

    #[test]
    fn unterminated_envelope_does_not_count() {
        assert!(extract_block(["JSON_START", "{\"a\":1}"]).is_none());
    }

    #[test]
    fn block_body_is_rejoined_with_newlines() {
        let block = extract_block(["JSON_START", "{", "\"a\": 1", "}", "JSON_END"]).unwrap();
        assert_eq!(block, "{\n\"a\": 1\n}");
    }

    #[test]
    fn the_last_completed_block_wins() {
        let lines = [
            "JSON_START",
            "{\"first\": true}",
            "JSON_END",
            "noise",
            "JSON_START",
            "{\"second\": true}",
            "JSON_END",
        ];
        let value = decode_payload(lines).unwrap();
        assert_eq!(value, serde_json::json!({"second": true}));
    }

    #[test]
    fn garbage_payload_reports_the_decoder_error() {
        let err = decode_payload(["JSON_START", "not json", "JSON_END"]).unwrap_err();
        assert!(matches!(err, HelperError::Invalid(_)));
        assert_eq!(err.verdict(), crate::Verdict::HelperReturnInvalid);
    }

    #[test]
    fn reply_projection_reads_the_agreed_fields() {
        let lines = [
            "JSON_START",
            "{\"error_code\":\"OK\",\"value\":1,\"error_message\":\"\"}",
            "JSON_END",
        ];
        let reply = HelperReply::from_lines(lines).unwrap();
        assert_eq!(reply.error_code, "OK");
        assert_eq!(reply.value, serde_json::json!(1));
        assert_eq!(reply.error_message, "");
    }

    #[test]
    fn missing_optional_fields_default() {
        let reply =
            HelperReply::from_lines(["JSON_START", "{\"error_code\":\"KO\"}", "JSON_END"]).unwrap();
        assert_eq!(reply.error_code, "KO");
        assert!(reply.value.is_null());
        assert_eq!(reply.error_message, "");
    }
}
