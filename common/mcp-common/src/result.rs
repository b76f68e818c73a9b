//! Result helpers for tool responses
//!
//! Handlers report their output as a single text content block:
//! `{"content":[{"type":"text","text":"..."}]}`.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One content block of a result
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Content {
    #[serde(rename = "type")]
    pub content_type: String,
    pub text: String,
}

impl Content {
    /// A block of `type: "text"`
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            content_type: "text".to_string(),
            text: text.into(),
        }
    }
}

/// The `result` member produced by content-returning methods
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContentResult {
    pub content: Vec<Content>,
}

impl ContentResult {
    /// Text of the first block, if any
    ///
    /// Mostly useful for clients and tests reading a result back:
    ///
    /// ```rust,ignore
    /// let result: ContentResult = serde_json::from_value(response.result().cloned()?)?;
    /// let rows: Value = serde_json::from_str(result.first_text().unwrap_or("[]"))?;
    /// ```
    pub fn first_text(&self) -> Option<&str> {
        self.content.first().map(|c| c.text.as_str())
    }
}

/// Create a result whose only block is pretty-printed JSON of `data`
///
/// This replaces the common pattern:
/// ```rust,ignore
/// let text = serde_json::to_string_pretty(&rows)?;
/// let result = json!({"content": [{"type": "text", "text": text}]});
/// ```
///
/// With simply:
/// ```rust,ignore
/// json_content(&rows)?
/// ```
///
/// # Arguments
///
/// * `data` - Any type that implements `Serialize`, including slices
///
/// # Returns
///
/// * `Ok(Value)` holding `{"content":[{"type":"text","text":<pretty JSON>}]}`
/// * `Err(serde_json::Error)` if `data` fails to serialize
///
/// # Example
///
/// ```rust,ignore
/// use mcp_common::{json_content, Response};
///
/// async fn list_tables(&self, id: i64) -> Response {
///     let rows = self.gateway.execute(&statement).await?;
///     Response::from_result(id, json_content(&rows))
/// }
/// ```
pub fn json_content<T: Serialize + ?Sized>(data: &T) -> Result<Value, serde_json::Error> {
    let text = serde_json::to_string_pretty(data)?;
    Ok(text_content(text))
}

/// Create a result whose only block is plain text
///
/// For handlers that report a message rather than structured data.
///
/// # Arguments
///
/// * `text` - Any type that can be converted to a `String`
///
/// # Returns
///
/// The `result` value, ready for [`Response::success`](crate::Response::success).
///
/// # Example
///
/// ```rust,ignore
/// use mcp_common::{text_content, Response};
///
/// let response = Response::success(id, text_content("schema refreshed"));
/// ```
pub fn text_content(text: impl Into<String>) -> Value {
    let result = ContentResult {
        content: vec![Content::text(text)],
    };
    // A struct of strings always serializes.
    serde_json::to_value(result).unwrap_or(Value::Null)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Serialize;

    #[derive(Serialize)]
    struct TestData {
        name: String,
        value: i32,
    }

    #[test]
    fn test_json_content() {
        let data = vec![TestData {
            name: "test".to_string(),
            value: 42,
        }];
        let value = json_content(&data).unwrap();
        let result: ContentResult = serde_json::from_value(value).unwrap();
        assert_eq!(result.content.len(), 1);
        assert_eq!(result.content[0].content_type, "text");

        let parsed: Value = serde_json::from_str(result.first_text().unwrap()).unwrap();
        assert_eq!(parsed[0]["value"], 42);
    }

    #[test]
    fn test_text_content() {
        let value = text_content("hello world");
        assert_eq!(value["content"][0]["type"], "text");
        assert_eq!(value["content"][0]["text"], "hello world");
    }
}
