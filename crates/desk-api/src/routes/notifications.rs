//! # Notifications
//!
//! The caller's inbox. Notifications are created as side effects of
//! assignments and decisions; callers can only read and acknowledge their
//! own.

use axum::extract::rejection::QueryRejection;
use axum::extract::{Path, Query, State};
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::Utc;
use desk_core::{paginate, Page, PageRequest};
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;

use crate::auth::CallerIdentity;
use crate::error::AppError;
use crate::extractors::{extract_query, OrgContext};
use crate::records::NotificationRecord;
use crate::state::{not_found, AppState};

#[derive(Debug, Default, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct NotificationQuery {
    #[serde(default)]
    pub unread_only: bool,
    pub limit: Option<usize>,
    pub offset: Option<usize>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct UnreadCount {
    pub count: usize,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct MarkedRead {
    pub updated: usize,
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/v1/notifications", get(list_notifications))
        .route("/v1/notifications/unread-count", get(unread_count))
        .route("/v1/notifications/read-all", post(mark_all_read))
        .route("/v1/notifications/{id}/read", post(mark_read))
}

fn inbox(state: &AppState, org: Uuid, user: Uuid, unread_only: bool) -> Vec<NotificationRecord> {
    let mut items = state
        .notifications
        .filter_scoped(org, |n| n.user_id == user && (!unread_only || !n.read));
    items.reverse();
    items
}

/// GET /v1/notifications: The caller's notifications, newest first.
#[utoipa::path(
    get,
    path = "/v1/notifications",
    params(NotificationQuery),
    responses(
        (status = 200, description = "Page of notifications", body = serde_json::Value),
        (status = 400, description = "Token not bound to a user", body = crate::error::ErrorBody),
    ),
    tag = "notifications"
)]
pub async fn list_notifications(
    State(state): State<AppState>,
    OrgContext(org): OrgContext,
    caller: CallerIdentity,
    query: Result<Query<NotificationQuery>, QueryRejection>,
) -> Result<Json<Page<NotificationRecord>>, AppError> {
    let q = extract_query(query)?;
    let user = caller.require_user()?;
    let items = inbox(&state, org, user, q.unread_only);
    Ok(Json(paginate(items, &PageRequest::new(q.limit, q.offset))))
}

/// GET /v1/notifications/unread-count
#[utoipa::path(
    get,
    path = "/v1/notifications/unread-count",
    responses(
        (status = 200, description = "Unread notifications", body = UnreadCount),
        (status = 400, description = "Token not bound to a user", body = crate::error::ErrorBody),
    ),
    tag = "notifications"
)]
pub async fn unread_count(
    State(state): State<AppState>,
    OrgContext(org): OrgContext,
    caller: CallerIdentity,
) -> Result<Json<UnreadCount>, AppError> {
    let user = caller.require_user()?;
    Ok(Json(UnreadCount {
        count: inbox(&state, org, user, true).len(),
    }))
}

/// POST /v1/notifications/{id}/read: Mark one notification read.
#[utoipa::path(
    post,
    path = "/v1/notifications/{id}/read",
    params(("id" = Uuid, Path, description = "Notification ID")),
    responses(
        (status = 200, description = "Notification read", body = NotificationRecord),
        (status = 404, description = "Not found", body = crate::error::ErrorBody),
    ),
    tag = "notifications"
)]
pub async fn mark_read(
    State(state): State<AppState>,
    OrgContext(org): OrgContext,
    caller: CallerIdentity,
    Path(id): Path<Uuid>,
) -> Result<Json<NotificationRecord>, AppError> {
    let user = caller.require_user()?;
    let record = state.notifications.mutate(org, id, |n| {
        if n.user_id != user {
            return Err(not_found::<NotificationRecord>(id));
        }
        if !n.read {
            let now = Utc::now();
            n.read = true;
            n.read_at = Some(now);
            n.updated_at = now;
        }
        Ok(n.clone())
    })?;
    state.persist(&record, "read", caller.user_id).await?;
    Ok(Json(record))
}

/// POST /v1/notifications/read-all: Mark every unread notification read.
#[utoipa::path(
    post,
    path = "/v1/notifications/read-all",
    responses(
        (status = 200, description = "Notifications marked", body = MarkedRead),
        (status = 400, description = "Token not bound to a user", body = crate::error::ErrorBody),
    ),
    tag = "notifications"
)]
pub async fn mark_all_read(
    State(state): State<AppState>,
    OrgContext(org): OrgContext,
    caller: CallerIdentity,
) -> Result<Json<MarkedRead>, AppError> {
    let user = caller.require_user()?;
    let now = Utc::now();
    let mut updated = 0;
    for unread in inbox(&state, org, user, true) {
        let record = state.notifications.mutate(org, unread.id, |n| {
            n.read = true;
            n.read_at = Some(now);
            n.updated_at = now;
            Ok(n.clone())
        })?;
        state.persist(&record, "read", caller.user_id).await?;
        updated += 1;
    }
    Ok(Json(MarkedRead { updated }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::records::NotificationKind;

    #[tokio::test]
    async fn inbox_is_per_user_and_newest_first() {
        let state = AppState::new();
        let org = Uuid::new_v4();
        let alice = Uuid::new_v4();
        let bob = Uuid::new_v4();
        state
            .notify(org, alice, NotificationKind::TaskAssigned, "first".into(), None)
            .await;
        state
            .notify(org, bob, NotificationKind::TaskAssigned, "other".into(), None)
            .await;
        state
            .notify(org, alice, NotificationKind::IncidentAssigned, "second".into(), None)
            .await;

        let items = inbox(&state, org, alice, false);
        assert_eq!(items.len(), 2);
        assert!(items.iter().all(|n| n.user_id == alice));
        assert!(items[0].created_at >= items[1].created_at);
    }

    #[tokio::test]
    async fn unread_filter_skips_read_items() {
        let state = AppState::new();
        let org = Uuid::new_v4();
        let user = Uuid::new_v4();
        state
            .notify(org, user, NotificationKind::LeaveApproved, "approved".into(), None)
            .await;
        let id = inbox(&state, org, user, true)[0].id;
        state
            .notifications
            .mutate(org, id, |n| {
                n.read = true;
                Ok(())
            })
            .unwrap();
        assert!(inbox(&state, org, user, true).is_empty());
        assert_eq!(inbox(&state, org, user, false).len(), 1);
    }
}
