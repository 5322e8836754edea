use std::sync::Arc;
use std::time::Duration;

use axum::{Extension, Router};
use tracing::info;

use crate::auth::TokenValidator;
use crate::queue::socket::{ActiveSockets, SocketLimits};
use crate::scheduler::Scheduler;
use crate::util::env::parse_var;

pub mod auth;
pub mod models;
pub mod queue;
pub mod routes;
pub mod scheduler;
pub mod util;

#[derive(Clone)]
pub struct VerbatimConfig {
    pub active_sockets: Arc<ActiveSockets>,
    pub scheduler: Arc<Scheduler>,
}

pub fn app_setup(validator: Arc<dyn TokenValidator>) -> VerbatimConfig {
    let limits = SocketLimits {
        max_per_user: parse_var("WS_MAX_CONNECTIONS_PER_USER"),
        max_total: parse_var("WS_MAX_CONNECTIONS"),
    };
    let auth_timeout = Duration::from_secs(parse_var("AUTH_TIMEOUT_SECS").unwrap_or(5));

    let active_sockets = Arc::new(ActiveSockets::new(validator, limits, auth_timeout));

    let mut scheduler = Scheduler::new();

    // Idle connections are swept on an interval; 0 disables the sweep.
    let sweep_interval = parse_var("WS_IDLE_SWEEP_INTERVAL_SECS").unwrap_or(60);
    if sweep_interval > 0 {
        let idle_timeout =
            Duration::from_secs(parse_var("WS_IDLE_TIMEOUT_SECS").unwrap_or(300));
        let sockets_ref = active_sockets.clone();
        scheduler.run(Duration::from_secs(sweep_interval), move || {
            let sockets_ref = sockets_ref.clone();
            async move {
                let evicted = sockets_ref.sweep_idle(idle_timeout);
                if evicted > 0 {
                    info!(evicted, "Swept idle socket connections");
                }
            }
        });
    }

    VerbatimConfig {
        active_sockets,
        scheduler: Arc::new(scheduler),
    }
}

pub fn app_config(config: VerbatimConfig) -> Router {
    routes::root_config().layer(Extension(config.active_sockets.clone()))
}

// This is so that env vars not used immediately don't panic at runtime
pub fn check_env_vars() -> bool {
    let mut failed = false;

    fn check_var<T: std::str::FromStr>(var: &'static str) -> bool {
        let check = parse_var::<T>(var).is_none();
        if check {
            tracing::warn!(
                "Variable `{}` missing in dotenv or not of type `{}`",
                var,
                std::any::type_name::<T>()
            );
        }
        check
    }

    failed |= check_var::<String>("BIND_ADDR");
    failed |= check_var::<String>("ADMIN_KEY");

    let auth_backend =
        dotenvy::var("AUTH_BACKEND").unwrap_or_else(|_| "remote".to_string());
    if auth_backend == "remote" {
        failed |= check_var::<String>("AUTH_SERVICE_URL");
    }

    failed
}
