//! Helpers for reading structured JSON out of free-form model output.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer};

/// Strips markdown code fences that models like to wrap JSON in.
pub fn clean_json_response(text: &str) -> String {
    text.replace("```json", "").replace("```", "").trim().to_string()
}

/// Cleans `raw` and deserializes it into `T`.
pub fn parse_model_json<T: DeserializeOwned>(raw: &str) -> Result<T, serde_json::Error> {
    serde_json::from_str(&clean_json_response(raw))
}

/// Returns at most `max_chars` characters of `text`, never splitting a code point.
pub fn excerpt(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((byte_index, _)) => &text[..byte_index],
        None => text,
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum StringOrList {
    One(String),
    Many(Vec<String>),
}

/// Accepts either a string or a list of strings (joined with a space).
pub fn string_or_joined<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match StringOrList::deserialize(deserializer)? {
        StringOrList::One(s) => s,
        StringOrList::Many(parts) => parts.join(" "),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Deserialize)]
    struct Sample {
        #[serde(deserialize_with = "string_or_joined")]
        body: String,
    }

    #[test]
    fn strips_code_fences() {
        let raw = "```json\n{\"body\": \"hi\"}\n```\n";
        assert_eq!(clean_json_response(raw), "{\"body\": \"hi\"}");
    }

    #[test]
    fn joins_list_valued_strings() {
        let sample: Sample = parse_model_json(r#"{"body": ["first", "second"]}"#).unwrap();
        assert_eq!(sample.body, "first second");
    }

    #[test]
    fn excerpt_respects_char_boundaries() {
        assert_eq!(excerpt("héllo", 2), "hé");
        assert_eq!(excerpt("abc", 10), "abc");
    }
}
