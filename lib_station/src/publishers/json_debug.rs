use std::io::{self, Stdout, Write};
use std::sync::{Arc, Mutex};

use crate::core::registry::SchemaRegistry;
use crate::encoders::JsonEncoder;
use crate::publishers::{CloseError, PublishError, Publisher};
use crate::record::Record;

/// Writes `JSON DEBUG: <document>` for every record.
pub struct JsonDebugPublisher<W = Stdout> {
    registry: Arc<SchemaRegistry>,
    out: Mutex<W>,
}

impl JsonDebugPublisher<Stdout> {
    pub fn stdout(registry: Arc<SchemaRegistry>) -> Self {
        Self::new(registry, io::stdout())
    }
}

impl<W: Write + Send> JsonDebugPublisher<W> {
    pub fn new(registry: Arc<SchemaRegistry>, out: W) -> Self {
        Self {
            registry,
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

impl<W: Write + Send> Publisher for JsonDebugPublisher<W> {
    fn name(&self) -> &str {
        "json-debug"
    }

    fn publish(&self, record: &Record) -> Result<(), PublishError> {
        let document = JsonEncoder::encode(record, &self.registry)?;
        let mut out = self.out.lock().map_err(|_| PublishError::Closed)?;
        writeln!(out, "JSON DEBUG: {}", document)?;
        Ok(())
    }

    fn close(&self) -> Result<(), CloseError> {
        if let Ok(mut out) = self.out.lock() {
            out.flush()?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::Decoder;

    #[test]
    fn test_prints_prefixed_document() {
        let registry = Arc::new(SchemaRegistry::station().unwrap());
        let record = Decoder::new(registry.clone())
            .decode(&[("ID", "ST1"), ("dateutc", "2024-01-01 00:00:00"), ("tempf", "32")][..])
            .unwrap();

        let publisher = JsonDebugPublisher::new(registry, Vec::new());
        publisher.publish(&record).unwrap();
        publisher.close().unwrap();

        let text = String::from_utf8(publisher.into_inner()).unwrap();
        assert!(text.starts_with(r#"JSON DEBUG: {"station_id":"ST1","#));
        assert!(text.ends_with("}\n"));
    }
}
