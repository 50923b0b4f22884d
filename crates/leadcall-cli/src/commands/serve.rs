use crate::config::Settings;
use leadcall_core::{LeadService, Notifier, SharedSecret, SubscriberRegistry};
use leadcall_http::{HttpServeError, HttpServerConfig};
use leadcall_telegram::{BotApi, Poller, PollerConfig, TelegramNotifier, UpdateRouter};
use std::process;
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{info, warn};

pub fn run(settings: Settings) {
    eprintln!("leadcall serve");
    eprintln!("  bind: {}", settings.bind);
    eprintln!("  api base: {}", settings.api_base);
    eprintln!("  poll timeout: {}s", settings.poll_timeout_secs);
    eprintln!("  routes:");
    eprintln!("    POST /submit");
    eprintln!("    GET /healthz");
    eprintln!("    GET /lead?id=<lead_id>");

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .unwrap_or_else(|e| {
            eprintln!("error: failed to create tokio runtime: {e}");
            process::exit(1);
        });

    runtime.block_on(async move {
        if let Err(e) = run_async(settings).await {
            eprintln!("error: leadcall serve failed: {e}");
            process::exit(1);
        }
    });
}

async fn run_async(settings: Settings) -> Result<(), String> {
    let api = BotApi::new(&settings.api_base, &settings.bot_token).map_err(|e| e.to_string())?;
    let notifier: Arc<dyn Notifier> = Arc::new(TelegramNotifier::new(api.clone()));
    let registry = SubscriberRegistry::new(SharedSecret::new(&settings.admin_password));
    let service = LeadService::new(registry, notifier);

    let listener = leadcall_http::bind(&HttpServerConfig {
        bind: settings.bind,
    })
    .await
    .map_err(|e| e.to_string())?;

    let (stop_tx, stop_rx) = watch::channel(false);
    let stop_tx = Arc::new(stop_tx);
    let on_signal = Arc::clone(&stop_tx);
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => info!("shutdown requested"),
            Err(err) => warn!(%err, "failed to listen for ctrl-c; stopping"),
        }
        let _ = on_signal.send(true);
    });

    let poller = Poller::new(
        api,
        UpdateRouter::new(service.clone()),
        PollerConfig {
            timeout_secs: settings.poll_timeout_secs,
            ..PollerConfig::default()
        },
    );
    let poller = tokio::spawn(poller.run(stopped(stop_rx.clone())));

    let served = leadcall_http::serve_intake(listener, service, stopped(stop_rx)).await;
    wind_down(served, poller, &stop_tx).await
}

/// The intake endpoint has returned: stop the poller too and report how
/// intake ended.
async fn wind_down(
    served: Result<(), HttpServeError>,
    poller: JoinHandle<()>,
    stop: &watch::Sender<bool>,
) -> Result<(), String> {
    if let Err(err) = &served {
        warn!(%err, "intake endpoint failed; stopping poller");
    }
    let _ = stop.send(true);
    if let Err(err) = poller.await {
        warn!(%err, "poller task failed");
    }
    served.map_err(|e| e.to_string())
}

async fn stopped(mut rx: watch::Receiver<bool>) {
    while !*rx.borrow_and_update() {
        if rx.changed().await.is_err() {
            return;
        }
    }
}
