use crate::{Parser, Result};

/// [`Parser`] that writes compact JSON text.
#[derive(Debug, Default, Clone, Copy)]
pub struct JsonParser;

impl Parser for JsonParser {
    fn to_text(&self, value: &serde_json::Value) -> Result<String> {
        Ok(serde_json::to_string(value)?)
    }

    fn from_text(&self, text: &str) -> Result<serde_json::Value> {
        Ok(serde_json::from_str(text)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Error;
    use serde_json::json;

    #[test]
    fn test_json_text() {
        let parser = JsonParser;
        let value = json!({"a": [1, 2.5, "x"]});
        let text = parser.to_text(&value).unwrap();
        assert_eq!(text, r#"{"a":[1,2.5,"x"]}"#);
        assert_eq!(parser.from_text(&text).unwrap(), value);
        assert!(matches!(parser.from_text("{oops"), Err(Error::Serialization(_))));
    }
}
