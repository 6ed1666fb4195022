use std::io::{self, Stdout, Write};
use std::sync::{Arc, Mutex};

use crate::core::registry::SchemaRegistry;
use crate::encoders::PointEncoder;
use crate::publishers::{CloseError, PublishError, Publisher};
use crate::record::Record;

/// Writes `INFLUX DEBUG: <line protocol>` for every record.
pub struct InfluxDebugPublisher<W = Stdout> {
    registry: Arc<SchemaRegistry>,
    encoder: PointEncoder,
    out: Mutex<W>,
}

impl InfluxDebugPublisher<Stdout> {
    pub fn stdout(registry: Arc<SchemaRegistry>, measurement: &str) -> Self {
        Self::new(registry, measurement, io::stdout())
    }
}

impl<W: Write + Send> InfluxDebugPublisher<W> {
    pub fn new(registry: Arc<SchemaRegistry>, measurement: &str, out: W) -> Self {
        Self {
            registry,
            encoder: PointEncoder::new(measurement),
            out: Mutex::new(out),
        }
    }

    pub fn into_inner(self) -> W {
        match self.out.into_inner() {
            Ok(out) => out,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

impl<W: Write + Send> Publisher for InfluxDebugPublisher<W> {
    fn name(&self) -> &str {
        "influx-debug"
    }

    fn publish(&self, record: &Record) -> Result<(), PublishError> {
        let line = self.encoder.encode(record, &self.registry).to_line_protocol()?;
        let mut out = self.out.lock().map_err(|_| PublishError::Closed)?;
        writeln!(out, "INFLUX DEBUG: {}", line)?;
        Ok(())
    }

    fn close(&self) -> Result<(), CloseError> {
        if let Ok(mut out) = self.out.lock() {
            out.flush()?;
        }
        Ok(())
    }
}
