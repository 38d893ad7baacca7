//! 点位连接配置读取辅助

use crate::error::ConfigError;
use domain::{SourceKind, Tag};
use serde_json::{Map, Value};

/// 按字段名（含别名）读取 `connection_config`，错误信息带上字段名。
pub(crate) struct ConfigReader<'a> {
    kind: SourceKind,
    map: &'a Map<String, Value>,
}

impl<'a> ConfigReader<'a> {
    pub(crate) fn new(tag: &'a Tag) -> Self {
        Self {
            kind: tag.source_kind,
            map: &tag.connection_config,
        }
    }

    fn lookup(&self, names: &[&'static str]) -> Option<(&'static str, &'a Value)> {
        names.iter().find_map(|name| match self.map.get(*name) {
            Some(Value::Null) | None => None,
            Some(value) => Some((*name, value)),
        })
    }

    pub(crate) fn missing(&self, field: &str) -> ConfigError {
        ConfigError::MissingField {
            kind: self.kind,
            field: field.to_string(),
        }
    }

    pub(crate) fn invalid(&self, field: &str, reason: impl Into<String>) -> ConfigError {
        ConfigError::InvalidField {
            kind: self.kind,
            field: field.to_string(),
            reason: reason.into(),
        }
    }

    pub(crate) fn optional_str(&self, names: &[&'static str]) -> Result<Option<&'a str>, ConfigError> {
        match self.lookup(names) {
            None => Ok(None),
            Some((_, Value::String(value))) if value.trim().is_empty() => Ok(None),
            Some((_, Value::String(value))) => Ok(Some(value.trim())),
            Some((name, _)) => Err(self.invalid(name, "expected string")),
        }
    }

    pub(crate) fn required_str(&self, names: &[&'static str]) -> Result<&'a str, ConfigError> {
        self.optional_str(names)?
            .ok_or_else(|| self.missing(names[0]))
    }

    /// 数值字段，接受数字或数字字符串。
    pub(crate) fn optional_f64(&self, names: &[&'static str]) -> Result<Option<f64>, ConfigError> {
        let Some((name, value)) = self.lookup(names) else {
            return Ok(None);
        };
        let parsed = match value {
            Value::Number(number) => number.as_f64(),
            Value::String(text) => text.trim().parse::<f64>().ok(),
            _ => None,
        };
        match parsed {
            Some(number) if number.is_finite() => Ok(Some(number)),
            _ => Err(self.invalid(name, "expected number")),
        }
    }

    pub(crate) fn f64_or(&self, names: &[&'static str], default: f64) -> Result<f64, ConfigError> {
        Ok(self.optional_f64(names)?.unwrap_or(default))
    }

    /// 整数字段，限定在 [min, max] 内。
    pub(crate) fn optional_int(
        &self,
        names: &[&'static str],
        min: i64,
        max: i64,
    ) -> Result<Option<i64>, ConfigError> {
        let Some((name, value)) = self.lookup(names) else {
            return Ok(None);
        };
        let parsed = match value {
            Value::Number(number) => number.as_i64().or_else(|| {
                number
                    .as_f64()
                    .filter(|v| v.fract() == 0.0)
                    .map(|v| v as i64)
            }),
            Value::String(text) => text.trim().parse::<i64>().ok(),
            _ => None,
        };
        match parsed {
            Some(number) if (min..=max).contains(&number) => Ok(Some(number)),
            Some(number) => Err(self.invalid(
                name,
                format!("{} out of range {}..={}", number, min, max),
            )),
            None => Err(self.invalid(name, "expected integer")),
        }
    }

    pub(crate) fn required_int(
        &self,
        names: &[&'static str],
        min: i64,
        max: i64,
    ) -> Result<i64, ConfigError> {
        self.optional_int(names, min, max)?
            .ok_or_else(|| self.missing(names[0]))
    }
}
