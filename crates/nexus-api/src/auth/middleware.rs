use crate::constants::PROVISIONING_SECRET_HEADER;
use crate::error::HttpAppError;
use axum::{
    extract::{Request, State},
    middleware::Next,
    response::{IntoResponse, Response},
};
use nexus_core::AppError;
use std::sync::Arc;
use subtle::ConstantTimeEq;

#[derive(Clone)]
pub struct AuthState {
    pub provisioning_secret: String,
}

fn secure_compare(a: &str, b: &str) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.as_bytes().ct_eq(b.as_bytes()).into()
}

pub async fn provisioning_auth_middleware(
    State(auth_state): State<Arc<AuthState>>,
    request: Request,
    next: Next,
) -> Response {
    let provided = request
        .headers()
        .get(PROVISIONING_SECRET_HEADER)
        .and_then(|h| h.to_str().ok());

    match provided {
        None => {
            tracing::debug!(path = %request.uri().path(), "Missing provisioning secret");
            HttpAppError(AppError::Unauthorized(format!(
                "Missing {} header",
                PROVISIONING_SECRET_HEADER
            )))
            .into_response()
        }
        Some(secret) if !secure_compare(secret, &auth_state.provisioning_secret) => {
            tracing::warn!(path = %request.uri().path(), "Invalid provisioning secret");
            HttpAppError(AppError::Unauthorized(
                "Invalid provisioning secret".to_string(),
            ))
            .into_response()
        }
        Some(_) => next.run(request).await,
    }
}
