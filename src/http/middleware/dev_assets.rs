//! Passes dev asset requests through the dev server's middleware chain.

use axum::body::Body;
use axum::extract::State;
use axum::http::{Request, StatusCode};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};

use crate::bridge::{buffer_request, forward, is_dev_asset, Forwarded};
use crate::http::server::AppState;
use crate::observability::metrics::{self, Outcome};

/// Forward asset-looking requests into the dev chain.
///
/// A finished response is returned as is. A request the chain passes on
/// continues to the SSR handler with its body intact.
pub async fn dev_assets(
    State(state): State<AppState>,
    request: Request<Body>,
    next: Next,
) -> Response {
    let Some(dev) = state.source.dev() else {
        return next.run(request).await;
    };
    if !is_dev_asset(request.uri()) {
        return next.run(request).await;
    }

    let (parts, body) = match buffer_request(request, state.body_limit).await {
        Ok(buffered) => buffered,
        Err(e) => {
            tracing::warn!(error = %e, "Rejected dev asset request body");
            metrics::record_bridge(StatusCode::PAYLOAD_TOO_LARGE.as_u16());
            return (StatusCode::PAYLOAD_TOO_LARGE, e.to_string()).into_response();
        }
    };

    let chain = dev.middlewares();
    match forward(chain.as_ref(), &parts, body.clone()).await {
        Ok(Forwarded::Handled(response)) => {
            metrics::record_ssr(Outcome::Asset);
            metrics::record_bridge(response.status().as_u16());
            response
        }
        Ok(Forwarded::Fallthrough) => {
            metrics::record_ssr(Outcome::Fallthrough);
            next.run(Request::from_parts(parts, Body::from(body))).await
        }
        Err(e) => {
            tracing::error!(path = %parts.uri.path(), error = %e, "Dev middleware failed");
            metrics::record_bridge(StatusCode::BAD_GATEWAY.as_u16());
            (StatusCode::BAD_GATEWAY, e.to_string()).into_response()
        }
    }
}
