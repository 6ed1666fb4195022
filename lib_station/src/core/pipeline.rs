//! # Ingest Pipeline
//!
//! Decode, check plausibility, fan out. The caller only learns about a
//! `DecodeError`; a record that fails a plausibility rule is logged and
//! dropped, and per-publisher failures stay inside the dispatcher.

use std::sync::Arc;

use thiserror::Error;
use tracing::error;

use crate::core::dispatcher::Dispatcher;
use crate::record::{DecodeError, Decoder, RawObservation, Record, Value};

/// Why a record was held back from the publishers.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum Implausible {
    #[error("field '{0}' is required for the plausibility check but missing")]
    Missing(&'static str),

    #[error("field '{0}' is required for the plausibility check but has no data")]
    NoData(&'static str),

    #[error("field '{field}' value {value} outside [{min}, {max}]")]
    OutOfRange {
        field: &'static str,
        value: f64,
        min: f64,
        max: f64,
    },
}

/// An inclusive range a numeric field must fall in.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PlausibilityRule {
    pub output_key: &'static str,
    pub min: f64,
    pub max: f64,
}

impl PlausibilityRule {
    pub const fn new(output_key: &'static str, min: f64, max: f64) -> Self {
        Self { output_key, min, max }
    }

    /// Rules for the station: stations report nonsense indoor readings when
    /// the indoor sensor is resetting.
    pub fn station_defaults() -> Vec<Self> {
        vec![Self::new("indoor_temperature_celsius", -50.0, 80.0)]
    }

    pub fn check(&self, record: &Record) -> Result<(), Implausible> {
        let value = match record.get(self.output_key) {
            None => return Err(Implausible::Missing(self.output_key)),
            Some(Value::Null) => return Err(Implausible::NoData(self.output_key)),
            Some(value) => value,
        };
        let Some(number) = value.as_f64() else {
            return Err(Implausible::NoData(self.output_key));
        };
        if !(self.min..=self.max).contains(&number) {
            return Err(Implausible::OutOfRange {
                field: self.output_key,
                value: number,
                min: self.min,
                max: self.max,
            });
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum IngestOutcome {
    /// The record reached the dispatcher; `delivered` publishers accepted it.
    Published { delivered: usize },
    /// The record failed a plausibility rule and was dropped.
    Dropped(Implausible),
}

pub struct Pipeline {
    decoder: Decoder,
    dispatcher: Arc<Dispatcher>,
    rules: Vec<PlausibilityRule>,
}

impl Pipeline {
    pub fn new(decoder: Decoder, dispatcher: Arc<Dispatcher>, rules: Vec<PlausibilityRule>) -> Self {
        Self {
            decoder,
            dispatcher,
            rules,
        }
    }

    pub fn dispatcher(&self) -> &Arc<Dispatcher> {
        &self.dispatcher
    }

    pub fn decoder(&self) -> &Decoder {
        &self.decoder
    }

    pub fn ingest<R: RawObservation + ?Sized>(&self, raw: &R) -> Result<IngestOutcome, DecodeError> {
        let record = self.decoder.decode(raw)?;

        for rule in &self.rules {
            if let Err(reason) = rule.check(&record) {
                error!(
                    timestamp = %record.timestamp(),
                    reason = %reason,
                    "Implausible observation, skipping"
                );
                return Ok(IngestOutcome::Dropped(reason));
            }
        }

        let delivered = self.dispatcher.publish_all(&record);
        Ok(IngestOutcome::Published { delivered })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::registry::SchemaRegistry;
    use crate::publishers::JsonDebugPublisher;

    fn pipeline(rules: Vec<PlausibilityRule>) -> Pipeline {
        let registry = Arc::new(SchemaRegistry::station().unwrap());
        let mut dispatcher = Dispatcher::new();
        dispatcher.register(Box::new(JsonDebugPublisher::new(registry.clone(), std::io::sink())));
        Pipeline::new(Decoder::new(registry), Arc::new(dispatcher), rules)
    }

    #[test]
    fn test_plausible_record_is_published() {
        let outcome = pipeline(PlausibilityRule::station_defaults())
            .ingest(&[("ID", "ST1"), ("dateutc", "2024-01-01 00:00:00"), ("indoortempf", "68")][..])
            .unwrap();
        assert_eq!(outcome, IngestOutcome::Published { delivered: 1 });
    }

    #[test]
    fn test_out_of_range_indoor_temperature_is_dropped() {
        // 212 F is 100 C.
        let outcome = pipeline(PlausibilityRule::station_defaults())
            .ingest(&[("ID", "ST1"), ("dateutc", "2024-01-01 00:00:00"), ("indoortempf", "212")][..])
            .unwrap();
        assert!(matches!(
            outcome,
            IngestOutcome::Dropped(Implausible::OutOfRange { field: "indoor_temperature_celsius", .. })
        ));
    }

    #[test]
    fn test_missing_indoor_temperature_is_dropped() {
        let outcome = pipeline(PlausibilityRule::station_defaults())
            .ingest(&[("ID", "ST1"), ("dateutc", "2024-01-01 00:00:00")][..])
            .unwrap();
        assert_eq!(outcome, IngestOutcome::Dropped(Implausible::Missing("indoor_temperature_celsius")));
    }

    #[test]
    fn test_no_rules_publishes_everything() {
        let outcome = pipeline(Vec::new())
            .ingest(&[("ID", "ST1"), ("dateutc", "2024-01-01 00:00:00")][..])
            .unwrap();
        assert_eq!(outcome, IngestOutcome::Published { delivered: 1 });
    }

    #[test]
    fn test_decode_error_reaches_caller() {
        let err = pipeline(Vec::new()).ingest(&[("ID", "ST1")][..]).unwrap_err();
        assert_eq!(err.field(), "observation_time");
    }
}
