//! Backend port for project, activity and KPI rows.
//!
//! The reconciliation code never talks to a backend directly: `main` builds
//! a store and an [`UpdateBus`] and hands them down.
use crate::error::StoreError;
use crate::types::{Activity, KpiRecord, Project, ProjectExportRow, ProjectStatus};
use chrono::NaiveDateTime;
use std::sync::mpsc::{self, Receiver, Sender};
use tracing::{info, warn};

pub const PROJECTS_TABLE: &str = "projects";

/// Status write-back for one project.
#[derive(Debug, Clone, PartialEq)]
pub struct StatusUpdate {
    pub full_code: String,
    pub status: ProjectStatus,
    pub updated_at: NaiveDateTime,
}

impl StatusUpdate {
    pub fn label(&self) -> &'static str {
        self.status.label()
    }
}

pub trait ProjectStore {
    fn fetch_projects(&self) -> Result<Vec<Project>, StoreError>;

    fn fetch_activities(&self) -> Result<Vec<Activity>, StoreError>;

    fn fetch_kpis(&self) -> Result<Vec<KpiRecord>, StoreError>;

    /// Persist a status; last write wins.
    fn update_project_status(&mut self, update: &StatusUpdate) -> Result<(), StoreError>;

    /// Re-establish the backend connection after a [`StoreError::Connection`].
    fn reconnect(&mut self) -> Result<(), StoreError> {
        Ok(())
    }
}

/// Rows of all three tables, read with independent fetches.
#[derive(Debug, Clone, Default)]
pub struct Snapshot {
    pub projects: Vec<Project>,
    pub activities: Vec<Activity>,
    pub kpis: Vec<KpiRecord>,
}

/// Run `fetch`; on a connection failure reconnect and send it once more.
fn with_reconnect<S, T>(
    store: &mut S,
    what: &str,
    fetch: impl Fn(&S) -> Result<T, StoreError>,
) -> Result<T, StoreError>
where
    S: ProjectStore + ?Sized,
{
    match fetch(&*store) {
        Err(e) if e.is_connection() => {
            warn!(table = what, error = %e, "fetch failed, reconnecting once");
            store.reconnect()?;
            fetch(&*store)
        }
        other => other,
    }
}

pub fn load_snapshot<S: ProjectStore + ?Sized>(store: &mut S) -> Result<Snapshot, StoreError> {
    let projects = with_reconnect(store, PROJECTS_TABLE, |s| s.fetch_projects())?;
    let activities = with_reconnect(store, "activities", |s| s.fetch_activities())?;
    let kpis = with_reconnect(store, "kpis", |s| s.fetch_kpis())?;
    info!(
        projects = projects.len(),
        activities = activities.len(),
        kpis = kpis.len(),
        "snapshot loaded"
    );
    Ok(Snapshot {
        projects,
        activities,
        kpis,
    })
}

/// Store backed by rows held in memory, typically filled from CSV exports.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    projects: Vec<Project>,
    activities: Vec<Activity>,
    kpis: Vec<KpiRecord>,
}

impl MemoryStore {
    pub fn new(projects: Vec<Project>, activities: Vec<Activity>, kpis: Vec<KpiRecord>) -> Self {
        Self {
            projects,
            activities,
            kpis,
        }
    }

    pub fn projects(&self) -> &[Project] {
        &self.projects
    }

    /// Project table in export shape, including reconciled statuses.
    pub fn export_projects(&self) -> Vec<ProjectExportRow> {
        self.projects
            .iter()
            .map(|p| ProjectExportRow {
                project_code: p.code.clone(),
                project_sub_code: p.sub_code.clone(),
                project_full_code: p.full_code.clone(),
                project_name: p.name.clone(),
                project_status: p.status.map(|s| s.as_str().to_string()).unwrap_or_default(),
                project_status_label: p.status_label.clone().unwrap_or_default(),
                completion_date: p
                    .completion_date
                    .map(|d| d.format("%Y-%m-%d").to_string())
                    .unwrap_or_default(),
                contract_amount: p.contract_amount,
                updated_at: p
                    .updated_at
                    .map(|d| d.format("%Y-%m-%dT%H:%M:%S").to_string())
                    .unwrap_or_default(),
            })
            .collect()
    }
}

impl ProjectStore for MemoryStore {
    fn fetch_projects(&self) -> Result<Vec<Project>, StoreError> {
        Ok(self.projects.clone())
    }

    fn fetch_activities(&self) -> Result<Vec<Activity>, StoreError> {
        Ok(self.activities.clone())
    }

    fn fetch_kpis(&self) -> Result<Vec<KpiRecord>, StoreError> {
        Ok(self.kpis.clone())
    }

    fn update_project_status(&mut self, update: &StatusUpdate) -> Result<(), StoreError> {
        let project = self
            .projects
            .iter_mut()
            .find(|p| p.full_code.eq_ignore_ascii_case(&update.full_code))
            .ok_or_else(|| StoreError::ProjectNotFound(update.full_code.clone()))?;
        project.status = Some(update.status);
        project.status_label = Some(update.label().to_string());
        project.updated_at = Some(update.updated_at);
        Ok(())
    }
}

/// "Database updated" notification.
#[derive(Debug, Clone, PartialEq)]
pub struct DatabaseUpdated {
    pub table_name: String,
    pub timestamp: NaiveDateTime,
}

/// Broadcasts [`DatabaseUpdated`] to every live subscriber.
#[derive(Debug, Default)]
pub struct UpdateBus {
    subscribers: Vec<Sender<DatabaseUpdated>>,
}

impl UpdateBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&mut self) -> Receiver<DatabaseUpdated> {
        let (tx, rx) = mpsc::channel();
        self.subscribers.push(tx);
        rx
    }

    /// Deliver to all subscribers, forgetting the ones that hung up.
    pub fn publish(&mut self, event: DatabaseUpdated) {
        self.subscribers.retain(|tx| tx.send(event.clone()).is_ok());
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.len()
    }
}
