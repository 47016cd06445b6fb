use std::num::NonZeroU32;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use governor::{DefaultDirectRateLimiter, Quota, RateLimiter};

use crate::core::config::{AppPaths, ConfigService, Settings};
use crate::rag::{ComponentFactory, HostedComponents, RagPipeline};

pub mod error;

use error::InitializationError;

/// Application state shared across all routes.
///
/// The pipeline itself is built lazily on the first question, so the server
/// starts (and reports status) even when credentials are missing.
pub struct AppState {
    pub paths: Arc<AppPaths>,
    pub settings: Arc<Settings>,
    pub pipeline: Arc<RagPipeline>,
    pub query_limiter: Arc<DefaultDirectRateLimiter>,
    pub started_at: DateTime<Utc>,
}

impl AppState {
    /// Loads configuration and wires the hosted components.
    pub async fn initialize() -> Result<Arc<Self>, InitializationError> {
        let paths = Arc::new(AppPaths::new());
        let config = ConfigService::new(paths.clone());
        let settings = Arc::new(
            config
                .load_settings()
                .map_err(|e| InitializationError::Config(e.into()))?,
        );

        let factory = Arc::new(HostedComponents::new(settings.clone(), paths.clone()));
        Self::assemble(paths, settings, factory)
    }

    /// Builds state around an arbitrary component factory.
    pub fn assemble(
        paths: Arc<AppPaths>,
        settings: Arc<Settings>,
        factory: Arc<dyn ComponentFactory>,
    ) -> Result<Arc<Self>, InitializationError> {
        let pipeline = Arc::new(
            RagPipeline::new(settings.clone(), factory)
                .map_err(|e| InitializationError::Pipeline(e.into()))?,
        );

        let per_minute = NonZeroU32::new(settings.server.chatbot_requests_per_minute)
            .unwrap_or(NonZeroU32::MIN);
        let query_limiter = Arc::new(RateLimiter::direct(Quota::per_minute(per_minute)));

        Ok(Arc::new(AppState {
            paths,
            settings,
            pipeline,
            query_limiter,
            started_at: Utc::now(),
        }))
    }

    pub fn uptime_secs(&self) -> i64 {
        (Utc::now() - self.started_at).num_seconds().max(0)
    }
}
