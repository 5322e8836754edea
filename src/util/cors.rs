use std::time::Duration;
use tower_http::cors::{CorsLayer, MaxAge};

pub fn default_cors() -> CorsLayer {
    CorsLayer::very_permissive().max_age(MaxAge::exact(Duration::from_secs(3600)))
}
