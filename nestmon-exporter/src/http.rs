//! HTTP server answering Prometheus scrapes.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::Router;
use axum::extract::State;
use axum::http::{HeaderValue, StatusCode, header};
use axum::response::{IntoResponse, Response};
use tokio::net::TcpListener;
use tokio::sync::{Semaphore, watch};
use tower_http::trace::TraceLayer;
use tracing::{info, trace};

use crate::aggregator::SharedAggregator;

/// Content type of the text exposition format.
pub const CONTENT_TYPE: &str = "text/plain; version=0.0.4; charset=utf-8";

/// Application state shared across handlers.
#[derive(Clone)]
struct AppState {
    aggregator: SharedAggregator,
    limiter: Arc<Semaphore>,
}

/// Create the HTTP router. Every path and method is a scrape.
fn create_router(aggregator: SharedAggregator, limiter: Arc<Semaphore>) -> Router {
    let state = AppState {
        aggregator,
        limiter,
    };

    Router::new()
        .fallback(scrape_handler)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Handler for scrapes.
///
/// The permit is held for the whole aggregation and released when it drops,
/// including when the client goes away and the handler future is cancelled.
async fn scrape_handler(State(state): State<AppState>) -> Response {
    let _permit = match state.limiter.acquire().await {
        Ok(permit) => permit,
        Err(_) => {
            return (StatusCode::SERVICE_UNAVAILABLE, "exporter is shutting down\n").into_response();
        }
    };
    trace!(
        available = state.limiter.available_permits(),
        "Scrape slot acquired"
    );

    let body = state.aggregator.collect().await;

    (
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, HeaderValue::from_static(CONTENT_TYPE)),
            (header::CONTENT_LENGTH, HeaderValue::from(body.len())),
        ],
        body,
    )
        .into_response()
}

/// HTTP server configuration.
pub struct HttpServer {
    aggregator: SharedAggregator,
    listen_addr: SocketAddr,
    limiter: Arc<Semaphore>,
}

impl HttpServer {
    /// Create a new HTTP server handling at most `max_concurrency` scrapes at a time.
    pub fn new(aggregator: SharedAggregator, listen_addr: SocketAddr, max_concurrency: usize) -> Self {
        Self {
            aggregator,
            listen_addr,
            limiter: Arc::new(Semaphore::new(max_concurrency)),
        }
    }

    /// Scrape slots currently free.
    #[cfg(test)]
    fn available_slots(&self) -> usize {
        self.limiter.available_permits()
    }

    /// Bind the configured address and serve until the shutdown signal is received.
    pub async fn run(self, shutdown: watch::Receiver<bool>) -> anyhow::Result<()> {
        let listener = TcpListener::bind(self.listen_addr)
            .await
            .map_err(|e| anyhow::anyhow!("Failed to bind to {}: {}", self.listen_addr, e))?;

        self.serve(listener, shutdown).await
    }

    /// Serve scrapes on an already bound listener until the shutdown signal is received.
    pub async fn serve(
        self,
        listener: TcpListener,
        mut shutdown: watch::Receiver<bool>,
    ) -> anyhow::Result<()> {
        let addr = listener.local_addr()?;
        let router = create_router(self.aggregator, self.limiter.clone());

        info!(
            addr = %addr,
            max_concurrency = self.limiter.available_permits(),
            "HTTP server listening"
        );

        axum::serve(listener, router)
            .with_graceful_shutdown(async move {
                // Wait for shutdown signal
                loop {
                    if shutdown.changed().await.is_err() {
                        break;
                    }
                    if *shutdown.borrow() {
                        break;
                    }
                }
                info!("HTTP server shutting down");
            })
            .await
            .map_err(|e| anyhow::anyhow!("HTTP server error: {}", e))?;

        info!("HTTP server stopped");
        Ok(())
    }
}
