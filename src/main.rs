use std::net::SocketAddr;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

use boing_sentryd::alerts::AlertService;
use boing_sentryd::config::Settings;
use boing_sentryd::detectors::attack_signature::AttackSignatureDetector;
use boing_sentryd::detectors::blacklist::BlacklistDetector;
use boing_sentryd::detectors::error_rate::ErrorRateDetector;
use boing_sentryd::detectors::rate_limit::RateLimitDetector;
use boing_sentryd::detectors::statistical::StatisticalDetector;
use boing_sentryd::detectors::Detector;
use boing_sentryd::engine::DetectionEngine;
use boing_sentryd::live_bus::LiveBus;
use boing_sentryd::ml::{MlDetector, MlEngine};
use boing_sentryd::routes::{build_router, AppState};
use boing_sentryd::metrics;
use boing_sentryd::store::Store;
use boing_sentryd::window::WindowStore;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config_path =
        std::env::var("BOING_CONFIG").unwrap_or_else(|_| "config/default".to_string());
    let settings = Settings::load(&config_path)?;

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(&settings.logging.level)),
        )
        .with_target(false)
        .with_thread_ids(true)
        .with_line_number(true)
        .init();

    info!("starting boing-sentryd");

    let store = Store::connect(&settings.database).await?;

    let windows = WindowStore::new();
    let ml_engine = MlEngine::new(store.clone(), detector_setting(&settings, "ml_anomaly").contamination.unwrap_or(0.1));

    for api_id in store.list_active_api_ids().await.unwrap_or_default() {
        ml_engine.warm_start(api_id).await.ok();
    }

    // Disabled detectors are left out of the pipeline entirely, rather than
    // built and short-circuited at evaluation time, so a disabled detector
    // costs nothing on the ingest path.
    let mut detectors: Vec<Box<dyn Detector>> = Vec::new();

    if detector_setting(&settings, "rate_limit").enabled {
        detectors.push(Box::new(RateLimitDetector::new(
            windows.clone(),
            detector_setting(&settings, "rate_limit").threshold.unwrap_or(100.0) as u32,
            detector_setting(&settings, "rate_limit").window_seconds.unwrap_or(60),
            detector_setting(&settings, "rate_limit").severity_weight,
        )));
    }
    if detector_setting(&settings, "ip_blacklist").enabled {
        detectors.push(Box::new(BlacklistDetector::new(
            store.clone(),
            detector_setting(&settings, "ip_blacklist").severity_weight,
        )));
    }
    if detector_setting(&settings, "attack_signature").enabled {
        detectors.push(Box::new(AttackSignatureDetector::new(
            detector_setting(&settings, "attack_signature").severity_weight,
        )));
    }
    if detector_setting(&settings, "error_rate").enabled {
        detectors.push(Box::new(ErrorRateDetector::new(
            store.clone(),
            detector_setting(&settings, "error_rate").threshold.unwrap_or(0.5),
            detector_setting(&settings, "error_rate").window_seconds.unwrap_or(300),
            detector_setting(&settings, "error_rate").severity_weight,
            10,
        )));
    }
    if detector_setting(&settings, "latency_spike").enabled {
        detectors.push(Box::new(StatisticalDetector::new(
            store.clone(),
            detector_setting(&settings, "latency_spike").z_score_threshold.unwrap_or(3.0),
            detector_setting(&settings, "latency_spike").severity_weight,
        )));
    }
    if detector_setting(&settings, "ml_anomaly").enabled {
        detectors.push(Box::new(MlDetector::new(
            ml_engine.clone(),
            detector_setting(&settings, "ml_anomaly").severity_weight,
        )));
    }

    let alert_service = Arc::new(AlertService::new(
        store.clone(),
        &settings.alerts,
        settings.smtp.clone(),
        settings.webhook.clone(),
    ));

    let live_bus = LiveBus::new();

    let engine = Arc::new(DetectionEngine::new(
        detectors,
        store.clone(),
        alert_service,
        live_bus.clone(),
        settings.alerts.high_severity_threshold,
        settings.alerts.medium_severity_threshold,
    ));

    spawn_window_sweeper(
        windows.clone(),
        detector_setting(&settings, "rate_limit").window_seconds.unwrap_or(60),
    );
    spawn_ml_retrain_loop(
        ml_engine.clone(),
        store.clone(),
        settings.alerts.ml_retrain_interval_hours.max(1) as u64,
    );

    if settings.metrics.enabled {
        let metrics_addr: SocketAddr = format!("{}:{}", settings.api.host, settings.api.metrics_port).parse()?;
        metrics::install(metrics_addr)?;
    }

    let state = AppState {
        store,
        engine,
        live_bus,
    };

    let app = build_router(state, &settings);

    let addr: SocketAddr = format!("{}:{}", settings.api.host, settings.api.port).parse()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(%addr, "listening");
    axum::serve(listener, app).await?;

    Ok(())
}

fn detector_setting<'a>(
    settings: &'a Settings,
    name: &str,
) -> &'a boing_sentryd::config::DetectorSettings {
    settings
        .detectors
        .get(name)
        .unwrap_or_else(|| panic!("missing detector config for '{name}'"))
}

fn spawn_window_sweeper(windows: WindowStore, window_seconds: i64) {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(std::time::Duration::from_secs(300));
        loop {
            interval.tick().await;
            windows.sweep(chrono::Utc::now(), window_seconds);
        }
    });
}

fn spawn_ml_retrain_loop(ml_engine: MlEngine, store: Store, interval_hours: u64) {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(std::time::Duration::from_secs(interval_hours * 3600));
        loop {
            interval.tick().await;
            let api_ids = store.list_active_api_ids().await.unwrap_or_default();
            ml_engine.retrain_tick(&api_ids);
        }
    });
}
