use axum::{
    Json, Router,
    extract::State,
    http::StatusCode,
    routing::get,
};
use domain::{ActiveAccountReply, ErrorReply, SelectActiveReply, SelectActiveRequest};

use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new().route(
        "/terminal/active-account",
        get(active_account).post(select_active_account),
    )
}

async fn select_active_account(
    State(state): State<AppState>,
    Json(payload): Json<SelectActiveRequest>,
) -> Result<Json<SelectActiveReply>, (StatusCode, Json<ErrorReply>)> {
    match state.accounts.set_active(&payload.account_id).await {
        Ok(active_account_id) => {
            tracing::info!(account_id = %active_account_id, "active account selected");
            Ok(Json(SelectActiveReply::new(active_account_id)))
        }
        Err(err) => Err((
            StatusCode::BAD_REQUEST,
            Json(ErrorReply::new(err.to_string())),
        )),
    }
}

/// Reconciled read: a selection whose account stopped sending heartbeats
/// is dropped here, so the UI sees `null` instead of a stale id.
async fn active_account(State(state): State<AppState>) -> Json<ActiveAccountReply> {
    Json(ActiveAccountReply {
        active_account_id: state.accounts.active_reconciled().await,
    })
}
