//! HTTP server wiring: the shared read handle into the ledger, plus the
//! OpenAPI-documented router and Swagger UI, mirroring the teacher's
//! axum + utoipa setup.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use utoipa::OpenApi;
use utoipa_axum::router::OpenApiRouter;
use utoipa_swagger_ui::SwaggerUi;

use crate::ledger::Ledger;
use crate::scorer::Scorer;
use crate::tracing::prelude::*;

#[derive(Clone)]
pub struct SharedState {
    pub ledger: Arc<Ledger>,
    /// `None` when the (optional) DarwinX scorer is disabled.
    pub scorer: Option<Arc<Scorer>>,
}

#[derive(OpenApi)]
#[openapi(tags((name = "health"), (name = "stats"), (name = "miners"), (name = "scorer")))]
struct ApiDoc;

/// Serve the stats API until `shutdown` is cancelled.
pub async fn serve(listen: &str, state: SharedState, shutdown: CancellationToken) -> anyhow::Result<()> {
    let (router, api) = OpenApiRouter::with_openapi(ApiDoc::openapi())
        .merge(super::v0::routes())
        .with_state(state)
        .split_for_parts();

    let router = router.merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", api));

    let listener = tokio::net::TcpListener::bind(listen).await?;
    info!(%listen, "stats API listening");

    axum::serve(listener, router)
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await?;

    Ok(())
}
