use axum::{
    Json, Router,
    body::Bytes,
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{delete, get, post},
};
use domain::{DisconnectReply, ErrorReply, HeartbeatAck, StatusReport};
use serde::Deserialize;
use serde_json::{Map, Value};

use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/terminal/heartbeat", post(ingest_heartbeat))
        .route("/terminal/account", get(account_info))
        .route("/terminal/account/:account_id", delete(disconnect_account))
        .route("/terminal/status", get(connection_status))
}

/// Terminal-side push. Anything wrong with the payload comes back as a
/// 200 with `{status: "error"}` so the sender's next heartbeat is not
/// disturbed by transport errors.
async fn ingest_heartbeat(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<Json<HeartbeatAck>, Json<ErrorReply>> {
    let (login, fields) = parse_heartbeat(&body).map_err(|message| {
        tracing::warn!(%message, "rejected heartbeat payload");
        Json(ErrorReply::new(message))
    })?;

    match state.accounts.ingest(&login, fields).await {
        Ok(receipt) => {
            tracing::info!(
                account_id = %receipt.account_id,
                fields = receipt.fields_updated.len(),
                "heartbeat stored"
            );
            Ok(Json(HeartbeatAck::new(
                receipt.account_id,
                receipt.fields_updated,
            )))
        }
        Err(err) => Err(Json(ErrorReply::new(err.to_string()))),
    }
}

#[derive(Debug, Deserialize)]
struct AccountQuery {
    account_id: Option<String>,
}

async fn account_info(
    State(state): State<AppState>,
    Query(query): Query<AccountQuery>,
) -> Result<Json<Value>, Json<ErrorReply>> {
    match state.accounts.snapshot(query.account_id.as_deref()).await {
        Ok(snapshot) => Ok(Json(Value::Object(snapshot.fields))),
        Err(err) => Err(Json(ErrorReply::new(err.to_string()))),
    }
}

async fn connection_status(State(state): State<AppState>) -> Json<StatusReport> {
    Json(state.accounts.status().await)
}

async fn disconnect_account(
    State(state): State<AppState>,
    Path(account_id): Path<String>,
) -> Result<Json<DisconnectReply>, StatusCode> {
    if state.accounts.remove(&account_id).await {
        tracing::info!(%account_id, "account disconnected");
        Ok(Json(DisconnectReply::new(account_id)))
    } else {
        Err(StatusCode::NOT_FOUND)
    }
}

/// Splits the heartbeat body into the sender's login and the opaque field
/// set. The terminal's transport pads the JSON with trailing NUL bytes and
/// whitespace; strip those before parsing.
fn parse_heartbeat(body: &[u8]) -> Result<(String, Map<String, Value>), String> {
    let trimmed = trim_transport_padding(body);
    if trimmed.is_empty() {
        return Err("empty heartbeat payload".to_string());
    }

    let value: Value = serde_json::from_slice(trimmed)
        .map_err(|err| format!("malformed heartbeat payload: {err}"))?;
    let Value::Object(mut fields) = value else {
        return Err("heartbeat payload must be a JSON object".to_string());
    };

    // MQL5 serializes the login sometimes as a string, sometimes as a
    // number. An absent login falls through to MissingIdentifier.
    let login = match fields.remove("login") {
        Some(Value::String(login)) => login,
        Some(Value::Number(login)) => login.to_string(),
        Some(_) | None => String::new(),
    };

    Ok((login, fields))
}

fn trim_transport_padding(body: &[u8]) -> &[u8] {
    let end = body
        .iter()
        .rposition(|b| *b != 0 && !b.is_ascii_whitespace())
        .map(|pos| pos + 1)
        .unwrap_or(0);
    &body[..end]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn padding_is_stripped_before_parsing() {
        let (login, fields) =
            parse_heartbeat(b"{\"login\": \"42\", \"balance\": 1}\0\0 \n").expect("parse");
        assert_eq!(login, "42");
        assert_eq!(fields.len(), 1);
    }

    #[test]
    fn numeric_login_is_accepted() {
        let (login, _) = parse_heartbeat(b"{\"login\": 270716956}").expect("parse");
        assert_eq!(login, "270716956");
    }

    #[test]
    fn empty_body_is_rejected() {
        assert!(parse_heartbeat(b"").is_err());
        assert!(parse_heartbeat(b"\0\0\0").is_err());
    }

    #[test]
    fn non_object_payload_is_rejected() {
        assert!(parse_heartbeat(b"[1, 2]").is_err());
        assert!(parse_heartbeat(b"\"login\"").is_err());
    }
}
