use std::sync::Arc;

use tenantline::calls::SessionRegistry;
use tenantline::channels::{ChannelAdapter, EmailAdapter, SmsAdapter, VoiceAdapter};
use tenantline::config::{CommsConfig, SmtpConfig, TwilioConfig};
use tenantline::inbound::{CommsRouteState, InboundNormalizer, comms_routes};
use tenantline::router::ChannelRouter;
use tenantline::store::{CommsStore, LibSqlBackend};
use tower_http::cors::CorsLayer;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Install rustls crypto provider before any TLS usage
    rustls::crypto::ring::default_provider()
        .install_default()
        .expect("Failed to install rustls crypto provider");

    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let config = CommsConfig::from_env()?;

    eprintln!("📞 Tenantline v{}", env!("CARGO_PKG_VERSION"));
    eprintln!("   Send API:      http://{}/api/communications/send", config.bind_addr);
    eprintln!("   Voice webhook: http://{}/webhooks/voice/gather", config.bind_addr);
    eprintln!("   Email webhook: http://{}/webhooks/email/inbound", config.bind_addr);

    // ── Database ─────────────────────────────────────────────────────
    let db_path = std::env::var("TENANTLINE_DB_PATH")
        .unwrap_or_else(|_| "./data/tenantline.db".to_string());
    let store: Arc<dyn CommsStore> = Arc::new(
        LibSqlBackend::new_local(std::path::Path::new(&db_path))
            .await
            .unwrap_or_else(|e| {
                eprintln!("Error: failed to open database at {db_path}: {e}");
                std::process::exit(1);
            }),
    );
    eprintln!("   Database: {db_path}");

    // ── Channel adapters ─────────────────────────────────────────────
    // Each transport is built only when its provider is configured; the
    // router skips unconfigured channels during fallback.
    let sessions = Arc::new(SessionRegistry::new());
    let mut adapters: Vec<Arc<dyn ChannelAdapter>> = Vec::new();

    if let Some(twilio) = TwilioConfig::from_env() {
        adapters.push(Arc::new(SmsAdapter::new(twilio.clone())));
        adapters.push(Arc::new(VoiceAdapter::new(twilio, Arc::clone(&sessions))));
        eprintln!("   Channels: sms, voice enabled");
    } else {
        eprintln!("   Channels: sms, voice disabled (TWILIO_ACCOUNT_SID not set)");
    }

    if let Some(smtp) = SmtpConfig::from_env() {
        adapters.push(Arc::new(EmailAdapter::new(smtp)));
        eprintln!("   Channels: email enabled");
    } else {
        eprintln!("   Channels: email disabled (SMTP_HOST not set)");
    }

    // ── Router + HTTP server ─────────────────────────────────────────
    let router = Arc::new(ChannelRouter::new(adapters, Arc::clone(&store), &config));
    let normalizer = Arc::new(InboundNormalizer::new(Arc::clone(&store)));

    let app = comms_routes(CommsRouteState {
        router,
        sessions,
        normalizer,
        store,
    })
    .layer(CorsLayer::permissive());

    let listener = tokio::net::TcpListener::bind(&config.bind_addr).await?;
    tracing::info!(addr = %config.bind_addr, "Listening");
    axum::serve(listener, app).await?;

    Ok(())
}
