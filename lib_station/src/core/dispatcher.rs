//! # Publisher Fan-out
//!
//! The `Dispatcher` forwards every decoded `Record` to each registered
//! publisher, in registration order. Sinks are isolated from each other: a
//! failing publisher is logged and skipped, and the remaining ones still see
//! the record. Closing works the same way, every publisher is closed and all
//! failures are collected.
//!
//! The set of publishers is fixed before the dispatcher is shared, so the hot
//! path takes no locks.

use thiserror::Error;
use tracing::{debug, error, info};

use crate::publishers::{CloseError, Publisher};
use crate::record::Record;

/// Every publisher that failed to close, with its error.
#[derive(Debug, Error)]
#[error("{} publisher(s) failed to close: {}", .failures.len(), summary(.failures))]
pub struct CloseAllError {
    pub failures: Vec<(String, CloseError)>,
}

fn summary(failures: &[(String, CloseError)]) -> String {
    failures
        .iter()
        .map(|(name, e)| format!("{name}: {e}"))
        .collect::<Vec<_>>()
        .join("; ")
}

#[derive(Default)]
pub struct Dispatcher {
    publishers: Vec<Box<dyn Publisher>>,
}

impl Dispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a publisher at the end of the fan-out order.
    pub fn register(&mut self, publisher: Box<dyn Publisher>) {
        info!(publisher = publisher.name(), "Publisher registered");
        self.publishers.push(publisher);
    }

    pub fn len(&self) -> usize {
        self.publishers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.publishers.is_empty()
    }

    /// Names in fan-out order.
    pub fn names(&self) -> Vec<&str> {
        self.publishers.iter().map(|p| p.name()).collect()
    }

    /// Hands the record to every publisher. Returns how many accepted it.
    pub fn publish_all(&self, record: &Record) -> usize {
        let mut delivered = 0;
        for publisher in &self.publishers {
            match publisher.publish(record) {
                Ok(()) => delivered += 1,
                Err(e) => error!(publisher = publisher.name(), error = %e, "Failed to publish record"),
            }
        }
        debug!(delivered, total = self.publishers.len(), "Record dispatched");
        delivered
    }

    /// Closes every publisher, even after failures.
    pub fn close_all(&self) -> Result<(), CloseAllError> {
        let mut failures = Vec::new();
        for publisher in &self.publishers {
            match publisher.close() {
                Ok(()) => debug!(publisher = publisher.name(), "Publisher closed"),
                Err(e) => {
                    error!(publisher = publisher.name(), error = %e, "Failed to close publisher");
                    failures.push((publisher.name().to_string(), e));
                }
            }
        }

        if failures.is_empty() {
            Ok(())
        } else {
            Err(CloseAllError { failures })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::registry::SchemaRegistry;
    use crate::publishers::PublishError;
    use crate::record::Decoder;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};

    #[derive(Default)]
    struct Counters {
        seen: AtomicUsize,
        closed: AtomicUsize,
    }

    struct FakeSink {
        name: &'static str,
        fail: bool,
        counters: Arc<Counters>,
        order: Arc<Mutex<Vec<&'static str>>>,
    }

    impl Publisher for FakeSink {
        fn name(&self) -> &str {
            self.name
        }

        fn publish(&self, _record: &Record) -> Result<(), PublishError> {
            self.order.lock().unwrap().push(self.name);
            if self.fail {
                return Err(PublishError::Closed);
            }
            self.counters.seen.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        fn close(&self) -> Result<(), CloseError> {
            self.counters.closed.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                return Err(CloseError::Writer("boom".into()));
            }
            Ok(())
        }
    }

    fn setup() -> (Dispatcher, Vec<Arc<Counters>>, Arc<Mutex<Vec<&'static str>>>) {
        let order = Arc::new(Mutex::new(Vec::new()));
        let mut dispatcher = Dispatcher::new();
        let mut counters = Vec::new();
        for (name, fail) in [("first", false), ("second", true), ("third", false)] {
            let c = Arc::new(Counters::default());
            counters.push(c.clone());
            dispatcher.register(Box::new(FakeSink {
                name,
                fail,
                counters: c,
                order: order.clone(),
            }));
        }
        (dispatcher, counters, order)
    }

    fn record() -> Record {
        let registry = Arc::new(SchemaRegistry::station().unwrap());
        Decoder::new(registry)
            .decode(&[("ID", "ST1"), ("dateutc", "2024-01-01 00:00:00")][..])
            .unwrap()
    }

    #[test]
    fn test_failing_sink_does_not_stop_others() {
        let (dispatcher, counters, order) = setup();
        let record = record();

        for _ in 0..3 {
            assert_eq!(dispatcher.publish_all(&record), 2);
        }

        assert_eq!(counters[0].seen.load(Ordering::SeqCst), 3);
        assert_eq!(counters[1].seen.load(Ordering::SeqCst), 0);
        assert_eq!(counters[2].seen.load(Ordering::SeqCst), 3);
        assert_eq!(&order.lock().unwrap()[..3], &["first", "second", "third"]);
    }

    #[test]
    fn test_close_all_closes_everything_and_collects_errors() {
        let (dispatcher, counters, _) = setup();

        let err = dispatcher.close_all().unwrap_err();

        assert!(counters.iter().all(|c| c.closed.load(Ordering::SeqCst) == 1));
        assert_eq!(err.failures.len(), 1);
        assert_eq!(err.failures[0].0, "second");
        assert_eq!(err.to_string(), "1 publisher(s) failed to close: second: background writer failed: boom");
    }

    #[test]
    fn test_names_in_registration_order() {
        let (dispatcher, _, _) = setup();
        assert_eq!(dispatcher.names(), vec!["first", "second", "third"]);
        assert!(Dispatcher::new().close_all().is_ok());
    }
}
