//! Render result shapes.

use axum::http::StatusCode;
use serde_json::Value;

use crate::render::RenderError;

/// A validated render result.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RenderOutput {
    /// Bare HTML; served as 200 `text/html`.
    Html(String),
    /// HTML with an explicit status and extra headers.
    Document {
        html: String,
        status: StatusCode,
        headers: Vec<(String, String)>,
    },
}

impl RenderOutput {
    /// Accept a string, or an object whose `html` is a string.
    pub fn from_value(value: Value) -> Result<Self, RenderError> {
        match value {
            Value::String(html) => Ok(RenderOutput::Html(html)),
            Value::Object(mut map) => {
                let html = match map.remove("html") {
                    Some(Value::String(html)) => html,
                    _ => return Err(RenderError::InvalidResult("object")),
                };
                let status = parse_status(map.remove("statusCode"))?;
                let headers = match map.remove("headers") {
                    Some(Value::Object(headers)) => headers
                        .into_iter()
                        .map(|(name, value)| match value {
                            Value::String(value) => (name, value),
                            other => (name, other.to_string()),
                        })
                        .collect(),
                    _ => Vec::new(),
                };
                Ok(RenderOutput::Document {
                    html,
                    status,
                    headers,
                })
            }
            other => Err(RenderError::InvalidResult(type_name(&other))),
        }
    }

    pub fn html(&self) -> &str {
        match self {
            RenderOutput::Html(html) | RenderOutput::Document { html, .. } => html,
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            RenderOutput::Html(_) => StatusCode::OK,
            RenderOutput::Document { status, .. } => *status,
        }
    }
}

/// Missing, null, false and zero all mean 200.
fn parse_status(value: Option<Value>) -> Result<StatusCode, RenderError> {
    let code = match value {
        None | Some(Value::Null) | Some(Value::Bool(false)) => return Ok(StatusCode::OK),
        Some(Value::Number(n)) => n
            .as_u64()
            .ok_or_else(|| RenderError::InvalidStatus(n.to_string()))?,
        Some(Value::String(s)) if s.is_empty() => return Ok(StatusCode::OK),
        Some(Value::String(s)) => s
            .trim()
            .parse::<u64>()
            .map_err(|_| RenderError::InvalidStatus(s.clone()))?,
        Some(other) => return Err(RenderError::InvalidStatus(other.to_string())),
    };
    if code == 0 {
        return Ok(StatusCode::OK);
    }
    u16::try_from(code)
        .ok()
        .and_then(|code| StatusCode::from_u16(code).ok())
        .ok_or_else(|| RenderError::InvalidStatus(code.to_string()))
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_string_result() {
        let output = RenderOutput::from_value(json!("<html></html>")).unwrap();
        assert_eq!(output, RenderOutput::Html("<html></html>".into()));
        assert_eq!(output.status(), StatusCode::OK);
    }

    #[test]
    fn test_structured_result() {
        let output = RenderOutput::from_value(json!({
            "html": "<p>x</p>",
            "statusCode": 201,
            "headers": { "x-test": "1", "x-count": 2 }
        }))
        .unwrap();

        assert_eq!(output.html(), "<p>x</p>");
        assert_eq!(output.status(), StatusCode::CREATED);
        let RenderOutput::Document { headers, .. } = output else {
            panic!("expected document");
        };
        assert!(headers.contains(&("x-test".into(), "1".into())));
        assert!(headers.contains(&("x-count".into(), "2".into())));
    }

    #[test]
    fn test_status_defaults() {
        for status in [json!(null), json!(0), json!(false), json!("")] {
            let output =
                RenderOutput::from_value(json!({ "html": "", "statusCode": status })).unwrap();
            assert_eq!(output.status(), StatusCode::OK);
        }
        let output = RenderOutput::from_value(json!({ "html": "" })).unwrap();
        assert_eq!(output.status(), StatusCode::OK);
    }

    #[test]
    fn test_invalid_shapes() {
        assert!(matches!(
            RenderOutput::from_value(json!(42)),
            Err(RenderError::InvalidResult("number"))
        ));
        assert!(matches!(
            RenderOutput::from_value(json!(null)),
            Err(RenderError::InvalidResult("null"))
        ));
        assert!(matches!(
            RenderOutput::from_value(json!({ "body": "<p></p>" })),
            Err(RenderError::InvalidResult("object"))
        ));
        assert!(matches!(
            RenderOutput::from_value(json!({ "html": "", "statusCode": 70000 })),
            Err(RenderError::InvalidStatus(_))
        ));
    }
}
