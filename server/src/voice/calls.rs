//! Call log endpoints used by the surrounding application once a call reaches
//! a terminal state. The relay itself never writes call history.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use std::collections::BTreeMap;
use uuid::Uuid;

use crate::db::models::{CallKind, CallRecord, CallStatus, CallUpdate};
use crate::push::PushNotification;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogCallRequest {
    pub caller_id: Option<String>,
    pub caller_name: Option<String>,
    pub receiver_id: Option<String>,
    pub call_type: Option<CallKind>,
    pub status: Option<CallStatus>,
    pub duration: Option<i64>,
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
}

/// POST /api/calls: persist a call record and notify the receiver's device.
pub async fn log_call(
    State(state): State<AppState>,
    Json(body): Json<LogCallRequest>,
) -> Result<(StatusCode, Json<CallRecord>), StatusCode> {
    let caller_id = body
        .caller_id
        .filter(|id| !id.is_empty())
        .ok_or(StatusCode::BAD_REQUEST)?;
    let receiver_id = body
        .receiver_id
        .filter(|id| !id.is_empty())
        .ok_or(StatusCode::BAD_REQUEST)?;

    if Uuid::parse_str(&receiver_id).is_err() {
        tracing::warn!(receiver_id = %receiver_id, "Invalid receiverId format, expected UUID");
        return Err(StatusCode::BAD_REQUEST);
    }

    let record = CallRecord {
        id: Uuid::new_v4(),
        caller_id,
        receiver_id,
        call_type: body.call_type.unwrap_or_default(),
        status: body.status.unwrap_or_default(),
        duration: body.duration.unwrap_or(0),
        start_time: Some(body.start_time.unwrap_or_else(Utc::now)),
        end_time: body.end_time,
    };

    state.call_log.persist_call_record(&record).await?;

    tracing::info!(
        call_id = %record.id,
        caller_id = %record.caller_id,
        receiver_id = %record.receiver_id,
        status = record.status.as_str(),
        "Call logged"
    );

    spawn_incoming_call_push(&state, &record, body.caller_name);

    Ok((StatusCode::CREATED, Json(record)))
}

/// PATCH /api/calls/{id}: update status, duration or end time.
pub async fn update_call(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(update): Json<CallUpdate>,
) -> Result<Json<CallRecord>, StatusCode> {
    let record = state
        .call_log
        .update_call_record(id, &update)
        .await?
        .ok_or(StatusCode::NOT_FOUND)?;

    Ok(Json(record))
}

fn spawn_incoming_call_push(state: &AppState, record: &CallRecord, caller_name: Option<String>) {
    let directory = state.directory.clone();
    let push = state.push.clone();
    let receiver_id = record.receiver_id.clone();
    let caller_name = caller_name
        .filter(|name| !name.is_empty())
        .unwrap_or_else(|| "Someone".to_string());
    let kind = record.call_type.as_str();

    let notification = PushNotification {
        title: format!("Incoming {kind} call"),
        body: format!("{caller_name} is calling you..."),
        data: BTreeMap::from([
            ("type".to_string(), "CALL".to_string()),
            ("callId".to_string(), record.id.to_string()),
            ("callerId".to_string(), record.caller_id.clone()),
            ("callerName".to_string(), caller_name),
            ("callType".to_string(), kind.to_string()),
        ]),
    };

    tokio::spawn(async move {
        let token = match directory.push_token(&receiver_id).await {
            Ok(Some(token)) => token,
            Ok(None) => {
                tracing::debug!(receiver_id = %receiver_id, "No push token for call receiver");
                return;
            }
            Err(e) => {
                tracing::warn!(receiver_id = %receiver_id, error = %e, "Push token lookup failed");
                return;
            }
        };

        if let Err(e) = push.send_push(&token, &notification).await {
            tracing::warn!(receiver_id = %receiver_id, error = %e, "Failed to send call notification");
        }
    });
}
