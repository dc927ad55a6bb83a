// Cross-origin policy for the gallery API.
//
// Guests open the gallery from arbitrary devices and hosts, so any origin is
// allowed unless `GALLERY_CORS_ORIGINS` narrows it to a comma-separated list.

use std::time::Duration;

use axum::http::{header, HeaderName, HeaderValue, Method};
use tower_http::cors::{AllowOrigin, CorsLayer};

const PREFLIGHT_MAX_AGE: Duration = Duration::from_secs(60 * 60);

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CorsPolicy {
    /// Any origin, never with credentials.
    AnyOrigin,
    /// Exactly these origins.
    Origins(Vec<HeaderValue>),
}

impl CorsPolicy {
    /// `None`, blank or `*` means any origin. Entries that are not valid
    /// header values are dropped.
    pub fn from_setting(setting: Option<&str>) -> Self {
        let Some(list) = setting.map(str::trim).filter(|list| !list.is_empty() && *list != "*")
        else {
            return Self::AnyOrigin;
        };
        Self::Origins(
            list.split(',')
                .map(str::trim)
                .filter(|origin| !origin.is_empty())
                .filter_map(|origin| HeaderValue::from_str(origin).ok())
                .collect(),
        )
    }

    pub fn into_layer(self) -> CorsLayer {
        let allow_origin = match self {
            Self::AnyOrigin => AllowOrigin::any(),
            Self::Origins(origins) => AllowOrigin::list(origins),
        };
        let request_id = HeaderName::from_static("x-request-id");

        CorsLayer::new()
            .allow_origin(allow_origin)
            .allow_methods([Method::GET, Method::POST, Method::DELETE, Method::OPTIONS])
            .allow_headers([header::CONTENT_TYPE, request_id.clone()])
            .expose_headers([request_id])
            .max_age(PREFLIGHT_MAX_AGE)
    }
}

pub fn cors_layer(setting: Option<&str>) -> CorsLayer {
    CorsPolicy::from_setting(setting).into_layer()
}
