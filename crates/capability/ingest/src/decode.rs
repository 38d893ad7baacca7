//! 外部设备 payload 解码

use domain::RawValue;
use serde_json::Value;

/// payload 解码错误（产出 quality=error 读数，不中断监听）。
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum DecodeError {
    #[error("payload is not utf-8")]
    Utf8,
    #[error("not a number or boolean: {0}")]
    NotScalar(String),
    #[error("invalid json: {0}")]
    Json(String),
    #[error("missing key `{0}`")]
    MissingKey(String),
}

/// 解码规则
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DecodeRule {
    /// `24.5` / `true` / `false`
    PlainText,
    /// JSON 字段路径（`data.humidity` → ["data", "humidity"]）
    JsonPath(Vec<String>),
}

impl DecodeRule {
    pub fn from_json_key(json_key: Option<&str>) -> Self {
        match json_key {
            Some(key) => DecodeRule::JsonPath(key.split('.').map(str::to_string).collect()),
            None => DecodeRule::PlainText,
        }
    }
}

/// 解码结果：值与 payload 携带的采集时间（如有）。
#[derive(Debug, Clone, PartialEq)]
pub struct Decoded {
    pub value: RawValue,
    pub ts_ms: Option<i64>,
}

const TIMESTAMP_KEYS: [&str; 3] = ["ts", "ts_ms", "timestamp"];

pub fn decode_payload(payload: &[u8], rule: &DecodeRule) -> Result<Decoded, DecodeError> {
    let text = std::str::from_utf8(payload).map_err(|_| DecodeError::Utf8)?;
    match rule {
        DecodeRule::PlainText => Ok(Decoded {
            value: parse_scalar(text)?,
            ts_ms: None,
        }),
        DecodeRule::JsonPath(path) => {
            let document: Value =
                serde_json::from_str(text).map_err(|err| DecodeError::Json(err.to_string()))?;
            let mut node = &document;
            for key in path {
                node = node
                    .get(key)
                    .ok_or_else(|| DecodeError::MissingKey(path.join(".")))?;
            }
            Ok(Decoded {
                value: json_scalar(node)?,
                ts_ms: timestamp_of(&document),
            })
        }
    }
}

fn parse_scalar(text: &str) -> Result<RawValue, DecodeError> {
    let text = text.trim();
    match text.to_ascii_lowercase().as_str() {
        "true" => return Ok(RawValue::Bool(true)),
        "false" => return Ok(RawValue::Bool(false)),
        _ => {}
    }
    if let Ok(value) = text.parse::<i64>() {
        return Ok(RawValue::Integer(value));
    }
    text.parse::<f64>()
        .map(RawValue::Number)
        .map_err(|_| DecodeError::NotScalar(truncate(text)))
}

fn json_scalar(node: &Value) -> Result<RawValue, DecodeError> {
    match node {
        Value::Bool(value) => Ok(RawValue::Bool(*value)),
        Value::Number(number) => match number.as_i64() {
            Some(value) => Ok(RawValue::Integer(value)),
            None => number
                .as_f64()
                .map(RawValue::Number)
                .ok_or_else(|| DecodeError::NotScalar(number.to_string())),
        },
        Value::String(text) => parse_scalar(text),
        other => Err(DecodeError::NotScalar(truncate(&other.to_string()))),
    }
}

fn timestamp_of(document: &Value) -> Option<i64> {
    TIMESTAMP_KEYS
        .iter()
        .find_map(|key| document.get(*key).and_then(Value::as_i64))
        .filter(|ts| *ts > 0)
}

fn truncate(text: &str) -> String {
    text.chars().take(64).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_text_scalars() {
        let rule = DecodeRule::PlainText;
        assert_eq!(
            decode_payload(b" 24.5\n", &rule).unwrap().value,
            RawValue::Number(24.5)
        );
        assert_eq!(decode_payload(b"17", &rule).unwrap().value, RawValue::Integer(17));
        assert_eq!(decode_payload(b"TRUE", &rule).unwrap().value, RawValue::Bool(true));
        assert!(matches!(
            decode_payload(b"warm", &rule),
            Err(DecodeError::NotScalar(_))
        ));
        assert_eq!(decode_payload(&[0xff, 0xfe], &rule), Err(DecodeError::Utf8));
    }

    #[test]
    fn nested_json_key_and_timestamp() {
        let rule = DecodeRule::from_json_key(Some("data.humidity"));
        let decoded =
            decode_payload(br#"{"ts": 1700000000000, "data": {"humidity": 41.5}}"#, &rule).unwrap();
        assert_eq!(decoded.value, RawValue::Number(41.5));
        assert_eq!(decoded.ts_ms, Some(1_700_000_000_000));

        let decoded = decode_payload(br#"{"data": {"humidity": "40"}}"#, &rule).unwrap();
        assert_eq!(decoded.value, RawValue::Integer(40));
        assert_eq!(decoded.ts_ms, None);
    }

    #[test]
    fn json_failures_are_typed() {
        let rule = DecodeRule::from_json_key(Some("val"));
        assert_eq!(
            decode_payload(br#"{"other": 1}"#, &rule),
            Err(DecodeError::MissingKey("val".to_string()))
        );
        assert!(matches!(decode_payload(b"{oops", &rule), Err(DecodeError::Json(_))));
        assert!(matches!(
            decode_payload(br#"{"val": [1, 2]}"#, &rule),
            Err(DecodeError::NotScalar(_))
        ));
    }
}
