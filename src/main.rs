use axum::http::header::AUTHORIZATION;
use axum::routing::get;
use axum_prometheus::PrometheusMetricLayer;
use std::sync::Arc;
use tower_http::sensitive_headers::SetSensitiveRequestHeadersLayer;
use tower_http::trace::TraceLayer;
use tracing::{error, info};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use verbatim::auth::{HttpTokenValidator, StaticTokenValidator, TokenValidator};
use verbatim::util::env::parse_strings_from_var;

#[tokio::main]
async fn main() -> std::io::Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "verbatim=debug,tower_http=debug,axum::rejection=trace".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    if verbatim::check_env_vars() {
        error!("Some environment variables are missing!");
    }

    let bind_addr = dotenvy::var("BIND_ADDR").unwrap_or_else(|_| "0.0.0.0:8000".to_string());
    info!("Starting Verbatim on {}", bind_addr);

    let auth_backend = dotenvy::var("AUTH_BACKEND").unwrap_or_else(|_| "remote".to_string());
    let validator: Arc<dyn TokenValidator> = match auth_backend.as_str() {
        "remote" => Arc::new(HttpTokenValidator::new(
            dotenvy::var("AUTH_SERVICE_URL").expect("AUTH_SERVICE_URL is required"),
        )),
        // Dev-only backend with a fixed token set, e.g. `["tok1:user1"]`.
        "static" => {
            let validator = StaticTokenValidator::new();
            for entry in parse_strings_from_var("AUTH_STATIC_TOKENS").unwrap_or_default() {
                if let Some((token, user_id)) = entry.split_once(':') {
                    validator.insert(token, user_id);
                }
            }
            Arc::new(validator)
        }
        _ => panic!("Invalid auth backend specified. Aborting startup!"),
    };

    let verbatim_config = verbatim::app_setup(validator);

    let (prometheus_layer, metric_handle) = PrometheusMetricLayer::pair();

    let app = verbatim::app_config(verbatim_config)
        .route("/metrics", get(|| async move { metric_handle.render() }))
        .layer(prometheus_layer)
        .layer(SetSensitiveRequestHeadersLayer::new(std::iter::once(
            AUTHORIZATION,
        )))
        .layer(TraceLayer::new_for_http());

    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    axum::serve(listener, app).await
}
