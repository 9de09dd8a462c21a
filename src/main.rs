use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use sharepoint_gateway::auth::bearer;
use sharepoint_gateway::auth::obo::OboExchanger;
use sharepoint_gateway::auth::DelegatedAuthService;
use sharepoint_gateway::config::{self, set_or_missing, Config};
use sharepoint_gateway::graph::HttpGraphClientFactory;
use sharepoint_gateway::{app, cli, AppState};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    use opentelemetry::KeyValue;
    use opentelemetry_sdk::{trace as sdktrace, Resource};

    // Export spans over OTLP only when a collector is configured.
    let telemetry_layer = if std::env::var("OTEL_EXPORTER_OTLP_ENDPOINT").is_ok() {
        let tracer = opentelemetry_otlp::new_pipeline()
            .tracing()
            .with_exporter(opentelemetry_otlp::new_exporter().tonic())
            .with_trace_config(sdktrace::config().with_resource(Resource::new(vec![
                KeyValue::new("service.name", "sharepoint-gateway"),
            ])))
            .install_batch(opentelemetry_sdk::runtime::Tokio)
            .context("failed to install OpenTelemetry tracer")?;
        Some(tracing_opentelemetry::layer().with_tracer(tracer))
    } else {
        None
    };

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG")
                .unwrap_or_else(|_| "sharepoint_gateway=debug,tower_http=debug".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .with(telemetry_layer)
        .init();

    let cfg = config::load()?;
    let args = cli::Cli::parse();

    let result = match args.command {
        Some(cli::Commands::Serve { port }) => {
            let port = port.unwrap_or(cfg.port);
            run_server(cfg, port).await
        }
        Some(cli::Commands::CheckConfig) => check_config(&cfg),
        Some(cli::Commands::DecodeToken { token }) => decode_token(&token),
        None => {
            let port = cfg.port;
            run_server(cfg, port).await
        }
    };

    if let Err(ref e) = result {
        eprintln!("Error: {:?}", e);
    }
    result
}

async fn run_server(cfg: Config, port: u16) -> anyhow::Result<()> {
    log_identity_config(&cfg);
    if !cfg.azure_ad.is_complete() {
        tracing::warn!(
            missing = %cfg.azure_ad.missing_fields().join(", "),
            "Identity configuration incomplete; data requests will fail until it is set"
        );
    }

    // One pooled client for both the authority and Graph. No retry policy:
    // a failed exchange or Graph call surfaces to the caller as-is.
    let http = reqwest::Client::builder()
        .connect_timeout(cfg.outbound_timeout().min(Duration::from_secs(10)))
        .timeout(cfg.outbound_timeout())
        .build()
        .context("failed to build HTTP client")?;

    let exchanger = OboExchanger::new(http.clone(), Arc::new(cfg.azure_ad.clone()));
    let graph = HttpGraphClientFactory::new(http, cfg.graph_base_url.clone());

    let state = Arc::new(AppState {
        auth: DelegatedAuthService::new(Arc::new(exchanger), Arc::new(graph)),
        config: cfg,
    });

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {}", addr))?;
    tracing::info!("SharePoint gateway listening on {}", addr);
    axum::serve(listener, app(state)).await?;

    Ok(())
}

fn log_identity_config(cfg: &Config) {
    let ad = &cfg.azure_ad;
    tracing::info!(
        client_id = set_or_missing(&ad.client_id),
        tenant_id = set_or_missing(&ad.tenant_id),
        client_secret = set_or_missing(&ad.client_secret),
        authority = %ad.authority(),
        scopes = %ad.scopes.join(" "),
        graph_base_url = %cfg.graph_base_url,
        "Identity configuration"
    );
}

fn check_config(cfg: &Config) -> anyhow::Result<()> {
    let ad = &cfg.azure_ad;
    println!("AZUREAD_CLIENT_ID      {}", set_or_missing(&ad.client_id));
    println!("AZUREAD_TENANT_ID      {}", set_or_missing(&ad.tenant_id));
    println!("AZUREAD_CLIENT_SECRET  {}", set_or_missing(&ad.client_secret));
    println!("authority              {}", ad.authority());
    println!("scopes                 {}", ad.scopes.join(" "));
    println!("graph                  {}", cfg.graph_base_url);

    if !ad.is_complete() {
        anyhow::bail!(
            "identity configuration incomplete (missing: {})",
            ad.missing_fields().join(", ")
        );
    }
    Ok(())
}

fn decode_token(raw: &str) -> anyhow::Result<()> {
    let raw = raw.trim();
    let token = raw
        .get(..7)
        .filter(|p| p.eq_ignore_ascii_case("Bearer "))
        .map(|_| &raw[7..])
        .unwrap_or(raw);
    let claims = bearer::parse_claims(token.trim())?;
    println!("{}", serde_json::to_string_pretty(&claims)?);
    Ok(())
}
