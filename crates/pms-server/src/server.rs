use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::{Router, extract::DefaultBodyLimit, middleware};
use pms_api::{ApiError, ApiResult};
use pms_auth::{JwtService, RefreshTokenStore, TokenProvider};
use pms_cache::{Handler, Mediator, Pipeline, Request, TieredCache, build_cache};
use pms_db_memory::{InMemoryProjectStore, seed::seed_if_empty};
use pms_storage::DynProjectStore;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tower_http::{compression::CompressionLayer, cors::CorsLayer, trace::TraceLayer};

use crate::{config::AppConfig, middleware as app_middleware, operations::AppServices, routes};

const REFRESH_TOKEN_SWEEP_INTERVAL: Duration = Duration::from_secs(60);

/// Shared state handed to every route.
#[derive(Clone)]
pub struct AppState {
    pub mediator: Arc<Mediator<AppServices>>,
    pub tokens: Arc<TokenProvider>,
    pub cache: Arc<TieredCache>,
    /// Fires once the server has stopped accepting requests.
    pub shutdown: CancellationToken,
    pub slow_request: Duration,
}

impl AppState {
    /// Wires storage, the cache tiers, and token issuance from `cfg`.
    pub async fn build(cfg: &AppConfig, shutdown: CancellationToken) -> anyhow::Result<Self> {
        let store: DynProjectStore = Arc::new(InMemoryProjectStore::new());
        if cfg.storage.seed {
            let seeded = seed_if_empty(&store).await?;
            tracing::info!(projects = seeded, "sample data seeded");
        }

        let jwt = JwtService::new(&cfg.auth)?;
        let tokens = Arc::new(TokenProvider::new(jwt, RefreshTokenStore::default()));

        let cache = Arc::new(build_cache(&cfg.redis, &cfg.cache, shutdown.clone()).await);
        tracing::info!(mode = cache.mode(), enabled = cache.is_enabled(), "cache initialized");

        let services = AppServices::new(store, Arc::clone(&tokens));
        let mediator = Arc::new(Mediator::new(services, Pipeline::new(Arc::clone(&cache))));

        Ok(Self {
            mediator,
            tokens,
            cache,
            shutdown,
            slow_request: Duration::from_millis(cfg.server.slow_request_ms),
        })
    }

    /// Dispatches `request` through the cache pipeline. In-flight requests
    /// are cancelled when the server shuts down.
    pub async fn send<R>(&self, request: R) -> ApiResult<R::Response>
    where
        R: Request,
        AppServices: Handler<R>,
        <AppServices as Handler<R>>::Error: Into<ApiError>,
    {
        let cancel = self.shutdown.child_token();
        Ok(self.mediator.send(request, &cancel).await?)
    }
}

pub fn router(state: AppState, body_limit: usize) -> Router {
    routes::api_routes(state.clone())
        // Middleware stack (order: request id -> trace -> compression/cors -> timing)
        .layer(middleware::from_fn_with_state(state.clone(), app_middleware::request_timing))
        .layer(CorsLayer::permissive())
        .layer(CompressionLayer::new())
        .layer(
            TraceLayer::new_for_http().make_span_with(|req: &axum::http::Request<_>| {
                let req_id = req
                    .extensions()
                    .get::<axum::http::HeaderValue>()
                    .and_then(|v| v.to_str().ok())
                    .unwrap_or("")
                    .to_string();
                tracing::info_span!(
                    "http.request",
                    http.method = %req.method(),
                    http.target = %req.uri(),
                    request_id = %req_id
                )
            }),
        )
        .layer(middleware::from_fn(app_middleware::request_id))
        .layer(DefaultBodyLimit::max(body_limit))
        .with_state(state)
}

/// Builds the full application for `cfg`.
pub async fn build_app(cfg: &AppConfig, shutdown: CancellationToken) -> anyhow::Result<(Router, AppState)> {
    let state = AppState::build(cfg, shutdown).await?;
    Ok((router(state.clone(), cfg.server.body_limit_bytes), state))
}

pub struct PmsServer {
    addr: SocketAddr,
    app: Router,
    state: AppState,
}

pub struct ServerBuilder {
    addr: SocketAddr,
    config: AppConfig,
}

impl Default for ServerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl ServerBuilder {
    pub fn new() -> Self {
        let cfg = AppConfig::default();
        Self {
            addr: cfg.addr(),
            config: cfg,
        }
    }

    pub fn with_addr(mut self, addr: SocketAddr) -> Self {
        self.addr = addr;
        self
    }

    pub fn with_config(mut self, cfg: AppConfig) -> Self {
        self.addr = cfg.addr();
        self.config = cfg;
        self
    }

    pub async fn build(self) -> anyhow::Result<PmsServer> {
        let (app, state) = build_app(&self.config, CancellationToken::new()).await?;
        Ok(PmsServer {
            addr: self.addr,
            app,
            state,
        })
    }
}

impl PmsServer {
    pub async fn run(self) -> anyhow::Result<()> {
        let shutdown = self.state.shutdown.clone();
        let cleanup = self.state.cache.start_cleanup_task(shutdown.clone());
        let sweeper = spawn_refresh_token_sweeper(Arc::clone(&self.state.tokens), shutdown.clone());

        let listener = tokio::net::TcpListener::bind(self.addr).await?;
        tracing::info!("listening on {}", self.addr);
        let served = axum::serve(listener, self.app)
            .with_graceful_shutdown(shutdown_signal())
            .await;

        // Stops background tasks and the invalidation listener.
        shutdown.cancel();
        if let Some(handle) = cleanup {
            let _ = handle.await;
        }
        let _ = sweeper.await;
        tracing::info!("server stopped");

        served?;
        Ok(())
    }
}

fn spawn_refresh_token_sweeper(tokens: Arc<TokenProvider>, shutdown: CancellationToken) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(REFRESH_TOKEN_SWEEP_INTERVAL);
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = interval.tick() => {
                    let removed = tokens.refresh_tokens().cleanup_expired();
                    if removed > 0 {
                        tracing::debug!(removed, "expired refresh tokens removed");
                    }
                }
            }
        }
    })
}

async fn shutdown_signal() {
    let ctrl_c = async {
        let _ = tokio::signal::ctrl_c().await;
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::warn!(error = %e, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    tracing::info!("shutdown signal received");
}
