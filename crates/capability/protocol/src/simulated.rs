//! 仿真信号源
//!
//! 无传输；值由经过时间与波形参数决定，始终落在 [min, max] 内。

use crate::conn_config::ConfigReader;
use crate::error::ConfigError;
use domain::{RawReading, RawValue, Tag, TagId, now_epoch_ms};
use rand::Rng;
use std::f64::consts::TAU;
use std::str::FromStr;
use std::time::Duration;
use tokio::time::Instant;

/// 仿真波形
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Waveform {
    Sine,
    Ramp,
    Random,
    Static,
}

impl FromStr for Waveform {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "sine" | "sin" => Ok(Waveform::Sine),
            "ramp" | "sawtooth" => Ok(Waveform::Ramp),
            "random" => Ok(Waveform::Random),
            "static" | "constant" => Ok(Waveform::Static),
            other => Err(format!("unknown waveform: {}", other)),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SimulatedConfig {
    pub waveform: Waveform,
    pub min: f64,
    pub max: f64,
    pub period: Duration,
    /// static 波形的输出值
    pub value: f64,
}

impl SimulatedConfig {
    pub fn from_tag(tag: &Tag) -> Result<Self, ConfigError> {
        let reader = ConfigReader::new(tag);
        let waveform = match reader.optional_str(&["signal_type", "waveform"])? {
            Some(name) => name
                .parse::<Waveform>()
                .map_err(|reason| reader.invalid("signal_type", reason))?,
            None => Waveform::Sine,
        };
        let min = reader.f64_or(&["min"], 0.0)?;
        let max = reader.f64_or(&["max"], 100.0)?;
        if min > max {
            return Err(reader.invalid("min", format!("min {} greater than max {}", min, max)));
        }
        if !(max - min).is_finite() {
            return Err(reader.invalid("max", format!("range [{}, {}] is not representable", min, max)));
        }
        let period_ms = reader.optional_int(&["period_ms"], 1, i64::MAX)?.unwrap_or(10_000);
        let value = reader.f64_or(&["value"], min)?;
        if waveform == Waveform::Static && !(min..=max).contains(&value) {
            return Err(reader.invalid("value", format!("{} outside [{}, {}]", value, min, max)));
        }
        Ok(Self {
            waveform,
            min,
            max,
            period: Duration::from_millis(period_ms as u64),
            value,
        })
    }

    /// 经过 `elapsed` 后的信号值。
    pub fn sample_at(&self, elapsed: Duration) -> f64 {
        let span = self.max - self.min;
        let period = self.period.as_secs_f64();
        let phase = (elapsed.as_secs_f64() % period) / period;
        let value = match self.waveform {
            Waveform::Sine => self.min + span * (0.5 + 0.5 * (TAU * phase).sin()),
            Waveform::Ramp => self.min + span * phase,
            Waveform::Random => {
                if span == 0.0 {
                    self.min
                } else {
                    rand::thread_rng().gen_range(self.min..=self.max)
                }
            }
            Waveform::Static => self.value,
        };
        value.clamp(self.min, self.max)
    }
}

pub struct SimulatedBridge {
    tag_id: TagId,
    config: SimulatedConfig,
    started: Instant,
}

impl SimulatedBridge {
    pub fn new(tag_id: TagId, config: SimulatedConfig) -> Self {
        Self {
            tag_id,
            config,
            started: Instant::now(),
        }
    }

    pub fn tag_id(&self) -> TagId {
        self.tag_id
    }

    pub fn config(&self) -> &SimulatedConfig {
        &self.config
    }

    pub fn read(&self) -> RawReading {
        let value = self.config.sample_at(self.started.elapsed());
        RawReading::good(self.tag_id, now_epoch_ms(), RawValue::Number(value))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use domain::SourceKind;
    use serde_json::json;

    fn config(value: serde_json::Value) -> Result<SimulatedConfig, ConfigError> {
        let tag = Tag::new(1, "Demo_Sinewave", SourceKind::Simulated).with_config(value);
        SimulatedConfig::from_tag(&tag)
    }

    #[test]
    fn sine_stays_in_range_and_repeats_each_period() {
        let cfg = config(json!({"signal_type": "sine", "min": 0, "max": 100, "period_ms": 4000}))
            .unwrap();
        for step in 0..200 {
            let value = cfg.sample_at(Duration::from_millis(step * 37));
            assert!((0.0..=100.0).contains(&value), "value {} out of range", value);
        }
        assert!((cfg.sample_at(Duration::ZERO) - 50.0).abs() < 1e-9);
        assert!((cfg.sample_at(Duration::from_millis(1000)) - 100.0).abs() < 1e-9);
        assert!((cfg.sample_at(Duration::from_millis(3000)) - 0.0).abs() < 1e-9);
        let a = cfg.sample_at(Duration::from_millis(1234));
        let b = cfg.sample_at(Duration::from_millis(1234 + 4000));
        assert!((a - b).abs() < 1e-9);
    }

    #[test]
    fn ramp_and_random_are_bounded() {
        let ramp = config(json!({"waveform": "ramp", "min": 10, "max": 20, "period_ms": 1000}))
            .unwrap();
        assert!((ramp.sample_at(Duration::from_millis(500)) - 15.0).abs() < 1e-9);

        let random = config(json!({"signal_type": "random", "min": -5, "max": 5})).unwrap();
        for _ in 0..100 {
            let value = random.sample_at(Duration::from_millis(10));
            assert!((-5.0..=5.0).contains(&value));
        }
    }

    #[test]
    fn defaults_and_static_value() {
        let cfg = config(json!({})).unwrap();
        assert_eq!(cfg.waveform, Waveform::Sine);
        assert_eq!((cfg.min, cfg.max), (0.0, 100.0));
        assert_eq!(cfg.period, Duration::from_secs(10));

        let cfg = config(json!({"signal_type": "static", "value": 42})).unwrap();
        assert_eq!(cfg.sample_at(Duration::from_secs(99)), 42.0);
    }

    #[test]
    fn invalid_configuration_names_the_field() {
        let err = config(json!({"min": 10, "max": 1})).unwrap_err();
        assert_eq!(err.field(), Some("min"));
        let err = config(json!({"signal_type": "square"})).unwrap_err();
        assert_eq!(err.field(), Some("signal_type"));
        let err = config(json!({"period_ms": 0})).unwrap_err();
        assert_eq!(err.field(), Some("period_ms"));
    }

    #[test]
    fn overflowing_range_is_rejected() {
        for waveform in ["random", "sine", "ramp"] {
            let err = config(json!({"signal_type": waveform, "min": -1e308, "max": 1e308}))
                .unwrap_err();
            assert_eq!(err.field(), Some("max"));
        }
        let wide = config(json!({"signal_type": "random", "min": -1e300, "max": 1e300})).unwrap();
        assert!(wide.sample_at(Duration::from_millis(10)).is_finite());
    }
}
