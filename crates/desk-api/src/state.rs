//! # Application State
//!
//! Shared state for the Axum application, passed to all route handlers via
//! the `State` extractor.
//!
//! Every collection lives in an in-memory [`Store`]. When a database pool is
//! configured, mutations are written through to Postgres and an audit event
//! is appended; at startup [`AppState::hydrate_from_db`] reloads the stores.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use desk_core::{TicketKind, TicketNumber};
use metrics_exporter_prometheus::PrometheusHandle;
use parking_lot::{Mutex, RwLock};
use sqlx::PgPool;
use uuid::Uuid;

use crate::config::AppConfig;
use crate::db;
use crate::error::AppError;
use crate::records::{
    CatalogItemRecord, ChangeRecord, CommentRecord, Document, IncidentRecord, LeaveRequestRecord,
    NotificationKind, NotificationRecord, ProblemRecord, ProjectRecord, ReleaseRecord,
    SlaPolicyRecord, SprintRecord, TaskRecord, TeamRecord, UserRecord, WorkflowInstanceRecord,
    WorkflowRecord,
};

// -- Generic In-Memory Store --------------------------------------------------

/// Thread-safe, cloneable in-memory key-value store.
///
/// The lock is `parking_lot` and never held across `.await` points.
#[derive(Debug)]
pub struct Store<T: Clone + Send + Sync> {
    data: Arc<RwLock<HashMap<Uuid, T>>>,
}

impl<T: Clone + Send + Sync> Clone for Store<T> {
    fn clone(&self) -> Self {
        Self {
            data: Arc::clone(&self.data),
        }
    }
}

impl<T: Clone + Send + Sync> Store<T> {
    pub fn new() -> Self {
        Self {
            data: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Insert a record, returning the previous value if the key existed.
    pub fn insert(&self, id: Uuid, value: T) -> Option<T> {
        self.data.write().insert(id, value)
    }

    pub fn get(&self, id: &Uuid) -> Option<T> {
        self.data.read().get(id).cloned()
    }

    pub fn list(&self) -> Vec<T> {
        self.data.read().values().cloned().collect()
    }

    pub fn remove(&self, id: &Uuid) -> Option<T> {
        self.data.write().remove(id)
    }
}

impl<T: Clone + Send + Sync> Default for Store<T> {
    fn default() -> Self {
        Self::new()
    }
}

/// Not-found error for a record of type `T`.
pub fn not_found<T: Document>(id: Uuid) -> AppError {
    AppError::NotFound(format!("{} {id} not found", T::KIND))
}

/// Organization-scoped access. A record owned by another organization is
/// indistinguishable from a missing one.
impl<T: Document> Store<T> {
    pub fn get_scoped(&self, org: Uuid, id: &Uuid) -> Option<T> {
        self.data
            .read()
            .get(id)
            .filter(|r| r.org_id() == org)
            .cloned()
    }

    /// Fetch a record or fail with 404.
    pub fn require(&self, org: Uuid, id: Uuid) -> Result<T, AppError> {
        self.get_scoped(org, &id).ok_or_else(|| not_found::<T>(id))
    }

    /// The organization's records matching `pred`, oldest first.
    pub fn filter_scoped(&self, org: Uuid, pred: impl Fn(&T) -> bool) -> Vec<T> {
        let mut out: Vec<T> = self
            .data
            .read()
            .values()
            .filter(|r| r.org_id() == org && pred(r))
            .cloned()
            .collect();
        out.sort_by(|a, b| {
            a.created_at()
                .cmp(&b.created_at())
                .then_with(|| a.id().cmp(&b.id()))
        });
        out
    }

    pub fn list_scoped(&self, org: Uuid) -> Vec<T> {
        self.filter_scoped(org, |_| true)
    }

    /// Insert keyed by the record's own id.
    pub fn put(&self, record: T) -> Option<T> {
        self.insert(record.id(), record)
    }

    /// Insert unless a record of the same organization `clashes`, checked
    /// under the same write lock. Returns whether the record was inserted.
    pub fn put_unless(&self, record: T, clashes: impl Fn(&T) -> bool) -> bool {
        let mut guard = self.data.write();
        let org = record.org_id();
        if guard.values().any(|r| r.org_id() == org && clashes(r)) {
            return false;
        }
        guard.insert(record.id(), record);
        true
    }

    /// Update a record under the write lock; a missing or foreign record
    /// is a 404 and an `Err` from `f` is returned as-is.
    pub fn mutate<R>(
        &self,
        org: Uuid,
        id: Uuid,
        f: impl FnOnce(&mut T) -> Result<R, AppError>,
    ) -> Result<R, AppError> {
        let mut guard = self.data.write();
        match guard.get_mut(&id) {
            Some(record) if record.org_id() == org => f(record),
            _ => Err(not_found::<T>(id)),
        }
    }

    /// Like [`Store::mutate`], but `f` also sees the organization's other
    /// records, read under the same write lock. Checks that span records
    /// (one active sprint, a column's WIP limit) cannot race a concurrent
    /// writer.
    pub fn mutate_among<R>(
        &self,
        org: Uuid,
        id: Uuid,
        f: impl FnOnce(&mut T, &[&T]) -> Result<R, AppError>,
    ) -> Result<R, AppError> {
        let mut guard = self.data.write();
        let mut record = match guard.remove(&id) {
            Some(record) if record.org_id() == org => record,
            Some(foreign) => {
                guard.insert(id, foreign);
                return Err(not_found::<T>(id));
            }
            None => return Err(not_found::<T>(id)),
        };
        let peers: Vec<&T> = guard.values().filter(|r| r.org_id() == org).collect();
        let result = f(&mut record, &peers);
        drop(peers);
        guard.insert(id, record);
        result
    }
}

// -- Application State --------------------------------------------------------

/// Shared application state.
#[derive(Debug, Clone)]
pub struct AppState {
    // -- Directory --
    pub users: Store<UserRecord>,
    pub teams: Store<TeamRecord>,

    // -- Project management --
    pub projects: Store<ProjectRecord>,
    pub sprints: Store<SprintRecord>,
    pub tasks: Store<TaskRecord>,
    pub comments: Store<CommentRecord>,

    // -- Service management --
    pub incidents: Store<IncidentRecord>,
    pub problems: Store<ProblemRecord>,
    pub changes: Store<ChangeRecord>,
    pub releases: Store<ReleaseRecord>,
    pub sla_policies: Store<SlaPolicyRecord>,
    pub catalog: Store<CatalogItemRecord>,

    // -- Workflows --
    pub workflows: Store<WorkflowRecord>,
    pub workflow_instances: Store<WorkflowInstanceRecord>,

    // -- People --
    pub leave_requests: Store<LeaveRequestRecord>,
    pub notifications: Store<NotificationRecord>,

    /// Last ticket sequence issued per organization and ticket kind.
    pub ticket_sequences: Arc<Mutex<HashMap<(Uuid, TicketKind), u64>>>,

    /// PostgreSQL connection pool. `None` runs in-memory only.
    pub db_pool: Option<PgPool>,

    /// Renders `/metrics` when a Prometheus recorder is installed.
    pub metrics: Option<PrometheusHandle>,

    pub config: AppConfig,
}

impl AppState {
    /// Create application state with default configuration and no database.
    pub fn new() -> Self {
        Self::with_config(AppConfig::default(), None)
    }

    pub fn with_config(config: AppConfig, db_pool: Option<PgPool>) -> Self {
        Self {
            users: Store::new(),
            teams: Store::new(),
            projects: Store::new(),
            sprints: Store::new(),
            tasks: Store::new(),
            comments: Store::new(),
            incidents: Store::new(),
            problems: Store::new(),
            changes: Store::new(),
            releases: Store::new(),
            sla_policies: Store::new(),
            catalog: Store::new(),
            workflows: Store::new(),
            workflow_instances: Store::new(),
            leave_requests: Store::new(),
            notifications: Store::new(),
            ticket_sequences: Arc::new(Mutex::new(HashMap::new())),
            db_pool,
            metrics: None,
            config,
        }
    }

    /// Attach the Prometheus handle used by `/metrics`.
    pub fn with_metrics(mut self, handle: PrometheusHandle) -> Self {
        self.metrics = Some(handle);
        self
    }

    /// Allocate the next ticket number for `kind` in `org`.
    pub fn next_ticket_number(&self, org: Uuid, kind: TicketKind) -> TicketNumber {
        let mut sequences = self.ticket_sequences.lock();
        let next = sequences.entry((org, kind)).or_insert(0);
        *next += 1;
        TicketNumber::new(kind, *next)
    }

    fn observe_ticket_number(&self, org: Uuid, number: TicketNumber) {
        let mut sequences = self.ticket_sequences.lock();
        let seen = sequences.entry((org, number.kind())).or_insert(0);
        *seen = (*seen).max(number.sequence());
    }

    /// Write a record through to the database and append an audit event.
    ///
    /// The in-memory store must already hold the new value. A database
    /// failure is surfaced as 500 because the record would otherwise be
    /// lost on restart.
    pub async fn persist<T: Document>(
        &self,
        record: &T,
        action: &str,
        actor: Option<Uuid>,
    ) -> Result<(), AppError> {
        let Some(pool) = &self.db_pool else {
            return Ok(());
        };
        if let Err(e) = db::documents::upsert(pool, record).await {
            tracing::error!(collection = T::COLLECTION, id = %record.id(), error = %e, "failed to persist record");
            return Err(AppError::Internal(format!(
                "{} {} updated in memory but database persist failed",
                T::KIND,
                record.id()
            )));
        }
        self.audit::<T>(pool, record.id(), action, actor).await
    }

    /// Delete a record's persisted document and audit the removal.
    pub async fn persist_removal<T: Document>(
        &self,
        id: Uuid,
        actor: Option<Uuid>,
    ) -> Result<(), AppError> {
        let Some(pool) = &self.db_pool else {
            return Ok(());
        };
        if let Err(e) = db::documents::delete(pool, T::COLLECTION, id).await {
            tracing::error!(collection = T::COLLECTION, %id, error = %e, "failed to delete record");
            return Err(AppError::Internal(format!(
                "{} {id} removed in memory but database delete failed",
                T::KIND
            )));
        }
        self.audit::<T>(pool, id, "delete", actor).await
    }

    async fn audit<T: Document>(
        &self,
        pool: &PgPool,
        id: Uuid,
        action: &str,
        actor: Option<Uuid>,
    ) -> Result<(), AppError> {
        let event = db::audit::AuditEvent {
            event_type: format!("{}.{action}", T::COLLECTION),
            actor: actor.map(|a| a.to_string()),
            resource_type: T::COLLECTION.to_string(),
            resource_id: id,
            action: action.to_string(),
            metadata: serde_json::Value::Null,
        };
        db::audit::append(pool, event).await.map(|_| ()).map_err(|e| {
            tracing::error!(collection = T::COLLECTION, %id, error = %e, "failed to append audit event");
            AppError::Internal("audit append failed".into())
        })
    }

    /// Store and persist a notification for `user_id`.
    ///
    /// Delivery problems are logged, never surfaced: the action that
    /// triggered the notification has already succeeded.
    pub async fn notify(
        &self,
        org: Uuid,
        user_id: Uuid,
        kind: NotificationKind,
        title: String,
        link: Option<String>,
    ) {
        let now = Utc::now();
        let record = NotificationRecord {
            id: Uuid::new_v4(),
            org_id: org,
            user_id,
            kind,
            title,
            body: None,
            link,
            read: false,
            read_at: None,
            created_at: now,
            updated_at: now,
        };
        self.notifications.put(record.clone());
        tracing::debug!(%user_id, kind = ?kind, "notification created");
        if let Err(e) = self.persist(&record, "create", None).await {
            tracing::warn!(notification_id = %record.id, error = %e, "notification not persisted");
        }
    }

    /// Ping the database, if one is configured.
    pub async fn ready(&self) -> Result<(), AppError> {
        match &self.db_pool {
            Some(pool) => sqlx::query("SELECT 1")
                .execute(pool)
                .await
                .map(|_| ())
                .map_err(|e| AppError::ServiceUnavailable(format!("database unreachable: {e}"))),
            None => Ok(()),
        }
    }

    /// Hydrate in-memory stores from the database.
    ///
    /// Called once on startup. Ticket sequences resume after the highest
    /// persisted number per organization and kind.
    pub async fn hydrate_from_db(&self) -> Result<(), String> {
        let Some(pool) = &self.db_pool else {
            return Ok(());
        };

        async fn load<T: Document>(pool: &PgPool, store: &Store<T>) -> Result<usize, String> {
            let records = db::documents::load_all::<T>(pool)
                .await
                .map_err(|e| format!("failed to load {}: {e}", T::COLLECTION))?;
            let count = records.len();
            for record in records {
                store.put(record);
            }
            Ok(count)
        }

        let users = load(pool, &self.users).await?;
        let teams = load(pool, &self.teams).await?;
        let projects = load(pool, &self.projects).await?;
        let sprints = load(pool, &self.sprints).await?;
        let tasks = load(pool, &self.tasks).await?;
        let comments = load(pool, &self.comments).await?;
        let incidents = load(pool, &self.incidents).await?;
        let problems = load(pool, &self.problems).await?;
        let changes = load(pool, &self.changes).await?;
        let releases = load(pool, &self.releases).await?;
        let sla_policies = load(pool, &self.sla_policies).await?;
        let catalog = load(pool, &self.catalog).await?;
        let workflows = load(pool, &self.workflows).await?;
        let workflow_instances = load(pool, &self.workflow_instances).await?;
        let leave_requests = load(pool, &self.leave_requests).await?;
        let notifications = load(pool, &self.notifications).await?;

        for r in self.incidents.list() {
            self.observe_ticket_number(r.org_id, r.number);
        }
        for r in self.problems.list() {
            self.observe_ticket_number(r.org_id, r.number);
        }
        for r in self.changes.list() {
            self.observe_ticket_number(r.org_id, r.number);
        }
        for r in self.releases.list() {
            self.observe_ticket_number(r.org_id, r.number);
        }

        tracing::info!(
            users,
            teams,
            projects,
            sprints,
            tasks,
            comments,
            incidents,
            problems,
            changes,
            releases,
            sla_policies,
            catalog,
            workflows,
            workflow_instances,
            leave_requests,
            notifications,
            "Hydrated in-memory stores from database"
        );

        Ok(())
    }
}

impl Default for AppState {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{DateTime, Duration};

    fn team(org: Uuid, name: &str, created_at: DateTime<Utc>) -> TeamRecord {
        TeamRecord {
            id: Uuid::new_v4(),
            org_id: org,
            name: name.into(),
            description: None,
            lead_id: None,
            member_ids: Vec::new(),
            created_at,
            updated_at: created_at,
        }
    }

    // -- Store ---------------------------------------------------------------

    #[test]
    fn store_insert_and_get_roundtrip() {
        let store: Store<TeamRecord> = Store::new();
        let t = team(Uuid::new_v4(), "Ops", Utc::now());
        assert!(store.insert(t.id, t.clone()).is_none());
        assert_eq!(store.get(&t.id).unwrap().name, "Ops");
        assert_eq!(store.list().len(), 1);
    }

    #[test]
    fn store_remove() {
        let store: Store<TeamRecord> = Store::new();
        let t = team(Uuid::new_v4(), "Ops", Utc::now());
        store.put(t.clone());
        assert!(store.remove(&t.id).is_some());
        assert!(store.get(&t.id).is_none());
    }

    #[test]
    fn store_clone_shares_underlying_data() {
        let a: Store<TeamRecord> = Store::new();
        let b = a.clone();
        a.put(team(Uuid::new_v4(), "Ops", Utc::now()));
        assert_eq!(b.list().len(), 1);
    }

    #[test]
    fn scoped_reads_hide_other_organizations() {
        let store: Store<TeamRecord> = Store::new();
        let (org_a, org_b) = (Uuid::new_v4(), Uuid::new_v4());
        let t = team(org_a, "Ops", Utc::now());
        store.put(t.clone());
        assert!(store.get_scoped(org_a, &t.id).is_some());
        assert!(store.get_scoped(org_b, &t.id).is_none());
        assert!(matches!(store.require(org_b, t.id), Err(AppError::NotFound(_))));
        assert!(store.list_scoped(org_b).is_empty());
    }

    #[test]
    fn scoped_lists_are_oldest_first() {
        let store: Store<TeamRecord> = Store::new();
        let org = Uuid::new_v4();
        let now = Utc::now();
        store.put(team(org, "second", now));
        store.put(team(org, "first", now - Duration::hours(1)));
        let names: Vec<String> = store.list_scoped(org).into_iter().map(|t| t.name).collect();
        assert_eq!(names, ["first", "second"]);
    }

    #[test]
    fn mutate_rejects_foreign_records() {
        let store: Store<TeamRecord> = Store::new();
        let t = team(Uuid::new_v4(), "Ops", Utc::now());
        store.put(t.clone());
        let result = store.mutate(Uuid::new_v4(), t.id, |r| {
            r.name = "hijacked".into();
            Ok(())
        });
        assert!(matches!(result, Err(AppError::NotFound(_))));
        assert_eq!(store.get(&t.id).unwrap().name, "Ops");
    }

    #[test]
    fn mutate_among_sees_same_org_peers_only() {
        let store: Store<TeamRecord> = Store::new();
        let org = Uuid::new_v4();
        let ops = team(org, "Ops", Utc::now());
        store.put(ops.clone());
        store.put(team(org, "SRE", Utc::now()));
        store.put(team(Uuid::new_v4(), "SRE", Utc::now()));

        let clash = store.mutate_among(org, ops.id, |t, peers| {
            assert_eq!(peers.len(), 1);
            if peers.iter().any(|p| p.name == "SRE") {
                return Err(AppError::Conflict("name taken".into()));
            }
            t.name = "SRE".into();
            Ok(())
        });
        assert!(matches!(clash, Err(AppError::Conflict(_))));
        assert_eq!(store.get(&ops.id).unwrap().name, "Ops");

        let renamed = store.mutate_among(org, ops.id, |t, _| {
            t.name = "Platform".into();
            Ok(t.clone())
        });
        assert_eq!(renamed.unwrap().name, "Platform");
        assert_eq!(store.list_scoped(org).len(), 2);
    }

    #[test]
    fn mutate_among_rejects_foreign_records() {
        let store: Store<TeamRecord> = Store::new();
        let t = team(Uuid::new_v4(), "Ops", Utc::now());
        store.put(t.clone());
        let result = store.mutate_among(Uuid::new_v4(), t.id, |_, _| Ok(()));
        assert!(matches!(result, Err(AppError::NotFound(_))));
        assert!(store.get(&t.id).is_some());
    }

    // -- AppState ------------------------------------------------------------

    #[test]
    fn ticket_numbers_are_per_org_and_kind() {
        let state = AppState::new();
        let (a, b) = (Uuid::new_v4(), Uuid::new_v4());
        assert_eq!(state.next_ticket_number(a, TicketKind::Incident).to_string(), "INC-000001");
        assert_eq!(state.next_ticket_number(a, TicketKind::Incident).to_string(), "INC-000002");
        assert_eq!(state.next_ticket_number(a, TicketKind::Change).to_string(), "CHG-000001");
        assert_eq!(state.next_ticket_number(b, TicketKind::Incident).to_string(), "INC-000001");
    }

    #[test]
    fn observed_numbers_advance_sequence() {
        let state = AppState::new();
        let org = Uuid::new_v4();
        state.observe_ticket_number(org, TicketNumber::new(TicketKind::Problem, 41));
        assert_eq!(state.next_ticket_number(org, TicketKind::Problem).sequence(), 42);
    }

    #[tokio::test]
    async fn notify_stores_unread_notification() {
        let state = AppState::new();
        let (org, user) = (Uuid::new_v4(), Uuid::new_v4());
        state
            .notify(org, user, NotificationKind::TaskAssigned, "OPS-1 assigned to you".into(), None)
            .await;
        let list = state.notifications.list_scoped(org);
        assert_eq!(list.len(), 1);
        assert_eq!(list[0].user_id, user);
        assert!(!list[0].read);
    }

    #[tokio::test]
    async fn persistence_is_noop_without_database() {
        let state = AppState::new();
        let t = team(Uuid::new_v4(), "Ops", Utc::now());
        assert!(state.persist(&t, "create", None).await.is_ok());
        assert!(state.persist_removal::<TeamRecord>(t.id, None).await.is_ok());
        assert!(state.ready().await.is_ok());
    }
}
