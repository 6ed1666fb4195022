//! # InfluxDB Publisher
//!
//! `publish` renders the point as one Line Protocol line and queues it for a
//! background writer task. The writer collects lines into batches (flushed on
//! size or on a timer) and sends each batch through a [`LineWriter`]. Network
//! failures are logged by the writer and never reach the request path.
//!
//! `close` stops the queue; the writer flushes what is left and exits, so the
//! caller awaits the returned `JoinHandle` to know the data is out.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::core::registry::SchemaRegistry;
use crate::encoders::PointEncoder;
use crate::publishers::{CloseError, PublishError, Publisher};
use crate::record::Record;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum WriteError {
    #[error("invalid write endpoint '{0}'")]
    InvalidEndpoint(String),

    #[error("write request failed: {0}")]
    Request(String),

    #[error("write rejected with status {status}: {body}")]
    Status { status: u16, body: String },
}

/// Destination of a newline-separated batch of Line Protocol lines.
pub trait LineWriter: Send + Sync + 'static {
    fn write(&self, body: String) -> impl Future<Output = Result<(), WriteError>> + Send;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WriterSettings {
    /// Lines per request.
    pub batch_size: usize,
    /// Pending lines are sent at least this often.
    pub flush_interval: Duration,
    /// Lines that may wait for the writer before `publish` starts failing.
    pub queue_capacity: usize,
}

impl Default for WriterSettings {
    fn default() -> Self {
        Self {
            batch_size: 5000,
            flush_interval: Duration::from_secs(1),
            queue_capacity: 10_000,
        }
    }
}

pub struct InfluxPublisher {
    registry: Arc<SchemaRegistry>,
    encoder: PointEncoder,
    queue: mpsc::Sender<String>,
    closed: CancellationToken,
}

impl InfluxPublisher {
    /// Starts the writer task and returns the publisher with the task handle.
    pub fn spawn<W: LineWriter>(
        registry: Arc<SchemaRegistry>,
        measurement: &str,
        writer: W,
        settings: WriterSettings,
    ) -> (Self, JoinHandle<()>) {
        let (tx, rx) = mpsc::channel(settings.queue_capacity.max(1));
        let closed = CancellationToken::new();
        let task = tokio::spawn(run_writer(rx, closed.clone(), writer, settings));
        let publisher = Self {
            registry,
            encoder: PointEncoder::new(measurement),
            queue: tx,
            closed,
        };
        (publisher, task)
    }
}

impl Publisher for InfluxPublisher {
    fn name(&self) -> &str {
        "influx"
    }

    fn publish(&self, record: &Record) -> Result<(), PublishError> {
        if self.closed.is_cancelled() {
            return Err(PublishError::Closed);
        }
        let line = self.encoder.encode(record, &self.registry).to_line_protocol()?;

        self.queue.try_send(line).map_err(|e| match e {
            TrySendError::Full(_) => PublishError::Backlog,
            TrySendError::Closed(_) => PublishError::Closed,
        })
    }

    fn close(&self) -> Result<(), CloseError> {
        self.closed.cancel();
        Ok(())
    }
}

async fn run_writer<W: LineWriter>(
    mut rx: mpsc::Receiver<String>,
    closed: CancellationToken,
    writer: W,
    settings: WriterSettings,
) {
    let batch_size = settings.batch_size.max(1);
    let mut batch: Vec<String> = Vec::with_capacity(batch_size);
    let interval = settings.flush_interval;
    let mut ticker = tokio::time::interval_at(Instant::now() + interval, interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            biased;

            line = rx.recv() => match line {
                Some(line) => {
                    batch.push(line);
                    if batch.len() >= batch_size {
                        flush(&writer, &mut batch).await;
                    }
                }
                None => break,
            },
            _ = closed.cancelled() => {
                // Take what was queued before the close, then stop.
                rx.close();
                while let Some(line) = rx.recv().await {
                    batch.push(line);
                    if batch.len() >= batch_size {
                        flush(&writer, &mut batch).await;
                    }
                }
                break;
            }
            _ = ticker.tick() => flush(&writer, &mut batch).await,
        }
    }

    flush(&writer, &mut batch).await;

    info!("Influx writer stopped");
}

async fn flush<W: LineWriter>(writer: &W, batch: &mut Vec<String>) {
    if batch.is_empty() {
        return;
    }
    let lines = batch.len();
    let body = batch.join("\n");
    batch.clear();

    match writer.write(body).await {
        Ok(()) => debug!(lines, "Wrote batch to InfluxDB"),
        Err(e) => error!(lines, error = %e, "Failed to write batch to InfluxDB"),
    }
}

#[cfg(feature = "influx")]
pub use http::{HttpLineWriter, InfluxConnection};

#[cfg(feature = "influx")]
mod http {
    use reqwest::header::{AUTHORIZATION, CONTENT_TYPE};
    use reqwest_middleware::{ClientBuilder, ClientWithMiddleware};
    use reqwest_retry::{policies::ExponentialBackoff, RetryTransientMiddleware};
    use url::Url;

    use super::{LineWriter, WriteError};

    /// Where and as whom to write.
    #[derive(Debug, Clone, PartialEq, Eq)]
    pub struct InfluxConnection {
        /// Base address, e.g. `http://localhost:8086`.
        pub addr: String,
        /// API token, or `user:password` against 1.8 compatibility endpoints.
        pub token: String,
        pub org: String,
        pub bucket: String,
    }

    /// Posts batches to `/api/v2/write` with second precision.
    pub struct HttpLineWriter {
        client: ClientWithMiddleware,
        url: Url,
        auth: String,
    }

    impl HttpLineWriter {
        pub fn new(connection: &InfluxConnection) -> Result<Self, WriteError> {
            let mut url =
                Url::parse(&connection.addr).map_err(|_| WriteError::InvalidEndpoint(connection.addr.clone()))?;
            url.path_segments_mut()
                .map_err(|_| WriteError::InvalidEndpoint(connection.addr.clone()))?
                .pop_if_empty()
                .extend(["api", "v2", "write"]);
            url.query_pairs_mut()
                .append_pair("org", &connection.org)
                .append_pair("bucket", &connection.bucket)
                .append_pair("precision", "s");

            let retry_policy = ExponentialBackoff::builder().build_with_max_retries(3);
            let client = ClientBuilder::new(reqwest::Client::new())
                .with(RetryTransientMiddleware::new_with_policy(retry_policy))
                .build();

            Ok(Self {
                client,
                url,
                auth: format!("Token {}", connection.token),
            })
        }

        pub fn url(&self) -> &Url {
            &self.url
        }
    }

    impl LineWriter for HttpLineWriter {
        async fn write(&self, body: String) -> Result<(), WriteError> {
            let response = self
                .client
                .post(self.url.clone())
                .header(AUTHORIZATION, &self.auth)
                .header(CONTENT_TYPE, "text/plain; charset=utf-8")
                .body(body)
                .send()
                .await
                .map_err(|e| WriteError::Request(e.to_string()))?;

            let status = response.status();
            if !status.is_success() {
                let body = response.text().await.unwrap_or_default();
                return Err(WriteError::Status {
                    status: status.as_u16(),
                    body,
                });
            }
            Ok(())
        }
    }

}
