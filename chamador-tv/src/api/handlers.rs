//! HTTP request handlers
//!
//! Admin operations write to the store; the TV engine picks the changes up
//! through the feed. Calling and recalling write an announce trigger, so the
//! spoken announcement never depends on the history log.

use crate::api::server::AppContext;
use crate::settings::{ConfigResolver, OperatingConfig};
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use chamador_common::events::DisplayState;
use chamador_common::model::{ActiveSlot, AnnounceTrigger, CallEvent, NewCall};
use chrono::{DateTime, Local, Utc};
use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};
use uuid::Uuid;

/// Calls returned by `GET /api/calls` when no limit is given
const DEFAULT_LIST_LIMIT: usize = 20;
/// Window searched for the last call to recall
const RECALL_SEARCH_LIMIT: usize = 50;
/// Name used for a sound check without one
const DEFAULT_TEST_NAME: &str = "Teste de som";

// ============================================================================
// Request/Response Types
// ============================================================================

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    status: String,
    module: String,
    version: String,
}

#[derive(Debug, Serialize)]
pub struct StatusResponse {
    status: String,
}

#[derive(Debug, Deserialize)]
pub struct CallRequest {
    #[serde(default)]
    name: String,
    #[serde(default)]
    room: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CallResponse {
    call: CallEvent,
    trigger: AnnounceTrigger,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RecallResponse {
    slot: Option<ActiveSlot>,
    trigger: AnnounceTrigger,
}

#[derive(Debug, Deserialize)]
pub struct ListQuery {
    limit: Option<usize>,
}

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ClearScope {
    Today,
    All,
}

#[derive(Debug, Deserialize)]
pub struct ClearRequest {
    scope: ClearScope,
}

#[derive(Debug, Serialize)]
pub struct ClearResponse {
    removed: u64,
}

#[derive(Debug, Deserialize, Default)]
pub struct TestRequest {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    room: Option<String>,
}

type ApiError = (StatusCode, Json<StatusResponse>);

fn api_error(status: StatusCode, message: impl Into<String>) -> ApiError {
    (
        status,
        Json(StatusResponse {
            status: format!("error: {}", message.into()),
        }),
    )
}

fn store_error(e: chamador_common::Error) -> ApiError {
    match e {
        chamador_common::Error::InvalidInput(msg) => api_error(StatusCode::BAD_REQUEST, msg),
        chamador_common::Error::NotFound(msg) => api_error(StatusCode::NOT_FOUND, msg),
        other => {
            error!("Store operation failed: {}", other);
            api_error(StatusCode::INTERNAL_SERVER_ERROR, other.to_string())
        }
    }
}

// ============================================================================
// Health Endpoint
// ============================================================================

/// GET /health - Health check endpoint
pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        module: "chamador_tv".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

// ============================================================================
// Call Endpoints
// ============================================================================

/// POST /api/calls - Call a patient now
///
/// Records the call, occupies the room, and writes a trigger that also
/// lifts any idle override.
pub async fn call_now(
    State(ctx): State<AppContext>,
    Json(req): Json<CallRequest>,
) -> Result<(StatusCode, Json<CallResponse>), ApiError> {
    let name = req.name.trim();
    let room = req.room.trim();
    if name.is_empty() {
        return Err(api_error(StatusCode::BAD_REQUEST, "name is required"));
    }

    let call = ctx
        .store
        .append_call(NewCall::call(name, room))
        .await
        .map_err(store_error)?;
    ctx.store
        .set_active_slot(name, room)
        .await
        .map_err(store_error)?;
    let trigger = ctx
        .store
        .write_trigger(name, room, Some(false))
        .await
        .map_err(store_error)?;

    info!("Called {} to room '{}'", name, room);
    Ok((StatusCode::CREATED, Json(CallResponse { call, trigger })))
}

/// GET /api/calls - Recent calls, newest first (tests included)
pub async fn list_calls(
    State(ctx): State<AppContext>,
    Query(query): Query<ListQuery>,
) -> Result<Json<Vec<CallEvent>>, ApiError> {
    let limit = query.limit.unwrap_or(DEFAULT_LIST_LIMIT).min(200);
    ctx.store
        .recent_calls(limit)
        .await
        .map(Json)
        .map_err(store_error)
}

/// POST /api/calls/recall-last - Announce the most recent call again
pub async fn recall_last(
    State(ctx): State<AppContext>,
) -> Result<Json<RecallResponse>, ApiError> {
    let calls = ctx
        .store
        .recent_calls(RECALL_SEARCH_LIMIT)
        .await
        .map_err(store_error)?;
    let Some(last) = calls.into_iter().find(|c| !c.is_test && !c.name.trim().is_empty()) else {
        return Err(api_error(StatusCode::NOT_FOUND, "no call to recall"));
    };

    let slot = ctx
        .store
        .ping_active_slot(&last.name, &last.room)
        .await
        .map_err(store_error)?;
    let trigger = ctx
        .store
        .write_trigger(&last.name, &last.room, None)
        .await
        .map_err(store_error)?;

    info!("Recalled {} to room '{}'", last.name, last.room);
    Ok(Json(RecallResponse { slot, trigger }))
}

/// POST /api/calls/clear - Clear today's (or all) history and force the logo
pub async fn clear_calls(
    State(ctx): State<AppContext>,
    Json(req): Json<ClearRequest>,
) -> Result<Json<ClearResponse>, ApiError> {
    let since = match req.scope {
        ClearScope::All => None,
        ClearScope::Today => Some(local_midnight(ctx.tv.clock.now())),
    };

    let removed = ctx
        .store
        .delete_calls(since)
        .await
        .map_err(store_error)?;
    ctx.store
        .write_trigger("", "", Some(true))
        .await
        .map_err(store_error)?;

    info!("History cleared ({:?}): {} calls removed", req.scope, removed);
    Ok(Json(ClearResponse { removed }))
}

/// Start of the local day containing `now`
fn local_midnight(now: DateTime<Utc>) -> DateTime<Utc> {
    let local = now.with_timezone(&Local);
    local
        .date_naive()
        .and_hms_opt(0, 0, 0)
        .and_then(|midnight| midnight.and_local_timezone(Local).earliest())
        .map(|midnight| midnight.with_timezone(&Utc))
        .unwrap_or(now)
}

// ============================================================================
// Room Endpoints
// ============================================================================

/// GET /api/rooms - Occupied rooms in natural order
pub async fn list_rooms(
    State(ctx): State<AppContext>,
) -> Result<Json<Vec<ActiveSlot>>, ApiError> {
    ctx.store.active_slots().await.map(Json).map_err(store_error)
}

/// POST /api/rooms/:room/recall - Announce a room's patient again
pub async fn recall_room(
    State(ctx): State<AppContext>,
    Path(room): Path<String>,
) -> Result<Json<RecallResponse>, ApiError> {
    let Some(slot) = ctx.store.active_slot(&room).await.map_err(store_error)? else {
        return Err(api_error(
            StatusCode::NOT_FOUND,
            format!("room '{}' has no active call", room),
        ));
    };

    let slot = ctx
        .store
        .ping_active_slot(&slot.name, &slot.room)
        .await
        .map_err(store_error)?;
    let (name, room) = slot
        .as_ref()
        .map(|s| (s.name.clone(), s.room.clone()))
        .unwrap_or_default();
    let trigger = ctx
        .store
        .write_trigger(&name, &room, None)
        .await
        .map_err(store_error)?;

    info!("Recalled room '{}' ({})", room, name);
    Ok(Json(RecallResponse { slot, trigger }))
}

/// DELETE /api/rooms/:room - Patient attended; free the room
pub async fn attend_room(
    State(ctx): State<AppContext>,
    Path(room): Path<String>,
) -> Result<StatusCode, ApiError> {
    if ctx
        .store
        .remove_active_slot(&room)
        .await
        .map_err(store_error)?
    {
        info!("Room '{}' attended", room);
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(api_error(
            StatusCode::NOT_FOUND,
            format!("room '{}' has no active call", room),
        ))
    }
}

// ============================================================================
// Sound Check
// ============================================================================

/// POST /api/announce/test - Record a test call (spoken, never displayed)
pub async fn announce_test(
    State(ctx): State<AppContext>,
    body: Option<Json<TestRequest>>,
) -> Result<(StatusCode, Json<CallEvent>), ApiError> {
    let req = body.map(|Json(r)| r).unwrap_or_default();
    let name = req
        .name
        .as_deref()
        .map(str::trim)
        .filter(|n| !n.is_empty())
        .unwrap_or(DEFAULT_TEST_NAME);
    let room = req.room.as_deref().map(str::trim).unwrap_or("");

    let call = ctx
        .store
        .append_call(NewCall::test(name, room))
        .await
        .map_err(store_error)?;

    if !ctx.tv.config.get().announce_tests {
        warn!("Test call recorded, but test announcements are disabled");
    }
    Ok((StatusCode::CREATED, Json(call)))
}

// ============================================================================
// Configuration
// ============================================================================

/// GET /api/config - Resolved operating configuration
pub async fn get_config(
    State(ctx): State<AppContext>,
) -> Result<Json<OperatingConfig>, ApiError> {
    let snapshot = ctx.store.config_snapshot().await.map_err(store_error)?;
    Ok(Json(ConfigResolver::resolve(&snapshot)))
}

/// PUT /api/config - Merge fields into the configuration record in use
///
/// Patches the primary record when it exists, otherwise the fallback record
/// the resolver is reading, so its other settings survive the edit.
pub async fn put_config(
    State(ctx): State<AppContext>,
    Json(patch): Json<serde_json::Value>,
) -> Result<Json<OperatingConfig>, ApiError> {
    let current = ctx.store.config_snapshot().await.map_err(store_error)?;
    let target = current.resolved_id().to_string();
    ctx.store
        .put_config(&target, patch)
        .await
        .map_err(store_error)?;
    let snapshot = ctx.store.config_snapshot().await.map_err(store_error)?;
    Ok(Json(ConfigResolver::resolve(&snapshot)))
}

// ============================================================================
// Display and Page Speech
// ============================================================================

/// GET /api/display - Current display state
pub async fn get_display(State(ctx): State<AppContext>) -> Json<DisplayState> {
    Json(ctx.tv.display.current())
}

/// POST /api/speech/:utterance_id/done - Page finished speaking
pub async fn speech_done(
    State(ctx): State<AppContext>,
    Path(utterance_id): Path<Uuid>,
) -> StatusCode {
    if ctx.page_speech.complete(utterance_id) {
        StatusCode::NO_CONTENT
    } else {
        StatusCode::NOT_FOUND
    }
}
