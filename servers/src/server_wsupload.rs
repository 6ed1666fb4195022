//! # Weather Station Upload Server
//!
//! Receives the station's periodic `GET /api/v1/observe` uploads, decodes them
//! against the station schema and fans every observation out to the enabled
//! publishers (JSON debug, InfluxDB, Line Protocol debug, MQTT). With MQTT
//! enabled, a background task keeps the broker connection alive and maintains
//! the Home Assistant discovery configuration.
//!
//! On Ctrl-C or SIGTERM the HTTP server stops accepting and drains, then every
//! publisher is closed, and the background writers and broker task are given a
//! bounded time to finish. Closing the MQTT publisher is what stops the broker
//! task, so uploads still draining keep their broker connection.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

mod wsupload_logic;
use wsupload_logic::{config, logger, routes};

use lib_station::publishers::{
    HttpLineWriter, InfluxDebugPublisher, InfluxPublisher, JsonDebugPublisher, MqttPublisher, mqtt_transport,
};
use lib_station::{BrokerManager, Decoder, DiscoveryEncoder, Dispatcher, Pipeline, PlausibilityRule, SchemaRegistry};

const WRITER_SHUTDOWN_LIMIT: Duration = Duration::from_secs(10);

#[tokio::main]
async fn main() -> Result<()> {
    let config = config::load_config()?;
    let settings = config::Settings::resolve(config)?;
    let _log_guard = logger::setup_logging(settings.log_dir.as_deref(), &settings.log_level, settings.log_json)?;

    if settings.password_generated {
        warn!(password = %settings.station_password, "No station password configured, generated a random one");
    }

    let registry = Arc::new(SchemaRegistry::station().context("Invalid station schema")?);

    let mut dispatcher = Dispatcher::new();
    let mut writers = Vec::new();
    let mut broker = None;
    let mut clearer: Option<Arc<dyn routes::DeviceClearer>> = None;

    if settings.json_debug {
        dispatcher.register(Box::new(JsonDebugPublisher::stdout(registry.clone())));
    }

    if let Some(connection) = &settings.influx {
        let writer = HttpLineWriter::new(connection).context("Invalid InfluxDB address")?;
        info!(url = %writer.url(), "InfluxDB publisher enabled");
        let (publisher, task) =
            InfluxPublisher::spawn(registry.clone(), &settings.influx_measurement, writer, settings.writer.clone());
        dispatcher.register(Box::new(publisher));
        writers.push(task);
    }

    if settings.influx_debug {
        dispatcher.register(Box::new(InfluxDebugPublisher::stdout(
            registry.clone(),
            &settings.influx_measurement,
        )));
    }

    if let Some(mqtt) = &settings.mqtt {
        let (client, events) = mqtt_transport::connect(&mqtt.connect).context("Invalid MQTT configuration")?;
        info!(broker = %mqtt.connect.broker, client_id = %mqtt.connect.client_id, "MQTT publisher enabled");

        let encoder = DiscoveryEncoder::new(mqtt.discovery.clone());
        let cancel = CancellationToken::new();
        let handle = BrokerManager::new(
            client.clone(),
            events,
            encoder.clone(),
            registry.clone(),
            mqtt.broker.clone(),
            cancel.clone(),
        )
        .spawn();

        dispatcher.register(Box::new(MqttPublisher::new(
            registry.clone(),
            client.clone(),
            mqtt.state_topic.clone(),
            mqtt.qos,
            cancel,
        )));
        clearer = Some(Arc::new(routes::BrokerClearer {
            client,
            encoder,
            registry: registry.clone(),
            qos: mqtt.broker.discovery_qos,
        }));
        broker = Some((handle, mqtt.broker.disconnect_grace));
    }

    if dispatcher.is_empty() {
        warn!("No publishers enabled, observations will be discarded");
    }

    let rules = if settings.plausibility_check {
        PlausibilityRule::station_defaults()
    } else {
        Vec::new()
    };
    let dispatcher = Arc::new(dispatcher);
    let pipeline = Arc::new(Pipeline::new(Decoder::new(registry.clone()), dispatcher.clone(), rules));

    let app = routes::router(routes::AppState {
        pipeline,
        station_password: Arc::from(settings.station_password.as_str()),
        clearer,
    });

    let listener = tokio::net::TcpListener::bind(settings.listen_addr)
        .await
        .with_context(|| format!("Failed to bind {}", settings.listen_addr))?;
    info!("Starting HTTP server on http://{}", settings.listen_addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(wait_for_signal())
        .await?;

    if let Err(e) = dispatcher.close_all() {
        error!(error = %e, "Failed to close publishers");
    }

    for task in writers {
        match tokio::time::timeout(WRITER_SHUTDOWN_LIMIT, task).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => error!(error = %e, "InfluxDB writer failed"),
            Err(_) => warn!("InfluxDB writer did not finish in time"),
        }
    }

    if let Some((handle, grace)) = broker {
        if tokio::time::timeout(grace + Duration::from_secs(1), handle.join()).await.is_err() {
            warn!("Broker task did not stop in time");
        }
    }

    info!("Shutdown complete.");
    Ok(())
}

async fn wait_for_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "Failed to listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut term_signal) => {
                term_signal.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Ctrl-C received, initiating shutdown."),
        _ = terminate => info!("SIGTERM received, initiating shutdown."),
    }
}
