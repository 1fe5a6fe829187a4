//! Project lifecycle status derived from KPI totals and dates.
use crate::codes::belongs_to;
use crate::error::StoreError;
use crate::store::{DatabaseUpdated, ProjectStore, StatusUpdate, UpdateBus, PROJECTS_TABLE};
use crate::types::{ActivityTiming, KpiRecord, Project, ProjectStatus};
use chrono::{NaiveDate, NaiveDateTime};
use tracing::{debug, info, warn};

/// Everything the classifier looks at, already reduced from the KPI rows.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct StatusInputs {
    pub total_planned_qty: f64,
    pub total_actual_qty: f64,
    pub has_pre_commencement_actual: bool,
    pub has_post_commencement_actual: bool,
    pub completion_is_today: bool,
}

impl StatusInputs {
    /// Sum every KPI of `project` regardless of date.
    pub fn collect(project: &Project, kpis: &[KpiRecord], today: NaiveDate) -> Self {
        let mut inputs = StatusInputs {
            completion_is_today: project.completion_date == Some(today),
            ..Default::default()
        };
        for kpi in kpis.iter().filter(|k| belongs_to(&k.codes, project)) {
            if kpi.is_planned() {
                inputs.total_planned_qty += kpi.quantity;
            } else if kpi.is_actual() {
                inputs.total_actual_qty += kpi.quantity;
                match kpi.timing {
                    ActivityTiming::PreCommencement => inputs.has_pre_commencement_actual = true,
                    ActivityTiming::PostCommencement => inputs.has_post_commencement_actual = true,
                    ActivityTiming::Unspecified => {}
                }
            }
        }
        inputs
    }
}

/// First matching rule wins:
///
/// 1. a stored `on-hold` / `cancelled` is kept;
/// 2. planned > 0 and actual ≥ planned → `contract-completed`;
/// 3. completion date is today and actual < planned → `completed-duration`;
/// 4. any post-commencement actual → `on-going`;
/// 5. any pre-commencement actual → `site-preparation`;
/// 6. otherwise `upcoming`.
pub fn classify(current: Option<ProjectStatus>, inputs: &StatusInputs) -> ProjectStatus {
    if let Some(status) = current.filter(ProjectStatus::is_sticky) {
        return status;
    }
    let planned = inputs.total_planned_qty;
    let actual = inputs.total_actual_qty;
    if planned > 0.0 && actual >= planned {
        ProjectStatus::ContractCompleted
    } else if inputs.completion_is_today && actual < planned {
        ProjectStatus::CompletedDuration
    } else if inputs.has_post_commencement_actual {
        ProjectStatus::OnGoing
    } else if inputs.has_pre_commencement_actual {
        ProjectStatus::SitePreparation
    } else {
        ProjectStatus::Upcoming
    }
}

#[derive(Debug)]
pub struct StatusOutcome {
    pub full_code: String,
    pub previous: Option<ProjectStatus>,
    pub status: ProjectStatus,
    /// `None` when the stored status was already current.
    pub write_back: Option<Result<(), StoreError>>,
}

impl StatusOutcome {
    pub fn changed(&self) -> bool {
        self.previous != Some(self.status)
    }
}

/// Classify `project` and persist the result when it differs from the
/// stored status. A successful write publishes a [`DatabaseUpdated`].
pub fn reconcile_status<S: ProjectStore + ?Sized>(
    store: &mut S,
    bus: &mut UpdateBus,
    project: &Project,
    kpis: &[KpiRecord],
    now: NaiveDateTime,
) -> StatusOutcome {
    let inputs = StatusInputs::collect(project, kpis, now.date());
    let status = classify(project.status, &inputs);
    debug!(project = %project.full_code, ?inputs, %status, "classified project");

    let write_back = (project.status != Some(status)).then(|| {
        let update = StatusUpdate {
            full_code: project.full_code.clone(),
            status,
            updated_at: now,
        };
        let result = store.update_project_status(&update);
        if result.is_ok() {
            bus.publish(DatabaseUpdated {
                table_name: PROJECTS_TABLE.to_string(),
                timestamp: now,
            });
        }
        result
    });

    StatusOutcome {
        full_code: project.full_code.clone(),
        previous: project.status,
        status,
        write_back,
    }
}

/// Reconcile every project. Failed write-backs are logged and left for the
/// next run; the computed status is still returned.
pub fn reconcile_all<S: ProjectStore + ?Sized>(
    store: &mut S,
    bus: &mut UpdateBus,
    projects: &[Project],
    kpis: &[KpiRecord],
    now: NaiveDateTime,
) -> Vec<StatusOutcome> {
    let outcomes: Vec<StatusOutcome> = projects
        .iter()
        .map(|p| reconcile_status(store, bus, p, kpis, now))
        .collect();
    let mut written = 0usize;
    for outcome in &outcomes {
        match &outcome.write_back {
            Some(Ok(())) => written += 1,
            Some(Err(e)) => warn!(
                project = %outcome.full_code,
                status = %outcome.status,
                error = %e,
                "status write-back failed"
            ),
            None => {}
        }
    }
    info!(projects = outcomes.len(), written, "project statuses reconciled");
    outcomes
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codes::build_full_code;
    use crate::store::MemoryStore;
    use crate::types::{InputType, RecordCodes};

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 6, 15).unwrap()
    }

    fn now() -> NaiveDateTime {
        today().and_hms_opt(9, 30, 0).unwrap()
    }

    fn project(full: &str, status: Option<ProjectStatus>) -> Project {
        Project {
            code: full.into(),
            sub_code: String::new(),
            full_code: build_full_code(full, ""),
            name: "Clinic".into(),
            status,
            status_label: None,
            completion_date: None,
            contract_amount: 0.0,
            updated_at: None,
        }
    }

    fn kpi(full: &str, input: InputType, qty: f64, timing: ActivityTiming) -> KpiRecord {
        KpiRecord {
            id: String::new(),
            codes: RecordCodes {
                full_code: full.into(),
                ..Default::default()
            },
            input_type: Some(input),
            activity_name: "Excavation".into(),
            quantity: qty,
            value: 0.0,
            date: None,
            target_date: None,
            activity_date: None,
            actual_date: None,
            created_at: None,
            zone: None,
            timing,
        }
    }

    fn inputs(planned: f64, actual: f64) -> StatusInputs {
        StatusInputs {
            total_planned_qty: planned,
            total_actual_qty: actual,
            ..Default::default()
        }
    }

    #[test]
    fn full_delivery_is_contract_completed_regardless_of_timing() {
        let mut i = inputs(100.0, 100.0);
        assert_eq!(classify(None, &i), ProjectStatus::ContractCompleted);
        i.has_pre_commencement_actual = true;
        i.has_post_commencement_actual = true;
        i.completion_is_today = true;
        assert_eq!(classify(Some(ProjectStatus::OnGoing), &i), ProjectStatus::ContractCompleted);
    }

    #[test]
    fn manual_states_are_sticky() {
        let i = inputs(100.0, 150.0);
        assert_eq!(classify(Some(ProjectStatus::OnHold), &i), ProjectStatus::OnHold);
        assert_eq!(classify(Some(ProjectStatus::Cancelled), &i), ProjectStatus::Cancelled);
    }

    #[test]
    fn completion_today_with_shortfall_is_completed_duration() {
        let mut i = inputs(100.0, 40.0);
        i.completion_is_today = true;
        i.has_post_commencement_actual = true;
        assert_eq!(classify(None, &i), ProjectStatus::CompletedDuration);
    }

    #[test]
    fn timing_flags_pick_on_going_then_site_preparation() {
        let mut i = inputs(100.0, 10.0);
        i.has_pre_commencement_actual = true;
        assert_eq!(classify(None, &i), ProjectStatus::SitePreparation);
        i.has_post_commencement_actual = true;
        assert_eq!(classify(None, &i), ProjectStatus::OnGoing);
    }

    #[test]
    fn nothing_recorded_is_upcoming() {
        assert_eq!(classify(None, &StatusInputs::default()), ProjectStatus::Upcoming);
        let mut i = StatusInputs::default();
        i.completion_is_today = true;
        assert_eq!(classify(Some(ProjectStatus::OnGoing), &i), ProjectStatus::Upcoming);
    }

    #[test]
    fn classifier_is_total() {
        let quantities = [0.0, 1.0, 50.0, 100.0, 150.0];
        let flags = [false, true];
        let stored = [None]
            .into_iter()
            .chain(ProjectStatus::ALL.into_iter().map(Some));
        for current in stored {
            for planned in quantities {
                for actual in quantities {
                    for pre in flags {
                        for post in flags {
                            for today in flags {
                                let i = StatusInputs {
                                    total_planned_qty: planned,
                                    total_actual_qty: actual,
                                    has_pre_commencement_actual: pre,
                                    has_post_commencement_actual: post,
                                    completion_is_today: today,
                                };
                                let status = classify(current, &i);
                                assert!(ProjectStatus::ALL.contains(&status));
                                if let Some(c) = current.filter(ProjectStatus::is_sticky) {
                                    assert_eq!(status, c);
                                }
                            }
                        }
                    }
                }
            }
        }
    }

    #[test]
    fn inputs_only_count_the_projects_own_kpis() {
        let mut p = project("P7", None);
        p.completion_date = Some(today());
        let kpis = vec![
            kpi("P7", InputType::Planned, 100.0, ActivityTiming::Unspecified),
            kpi("P7", InputType::Actual, 30.0, ActivityTiming::PreCommencement),
            kpi("P8", InputType::Actual, 500.0, ActivityTiming::PostCommencement),
        ];
        let i = StatusInputs::collect(&p, &kpis, today());
        assert_eq!(i.total_planned_qty, 100.0);
        assert_eq!(i.total_actual_qty, 30.0);
        assert!(i.has_pre_commencement_actual);
        assert!(!i.has_post_commencement_actual);
        assert!(i.completion_is_today);
    }

    #[test]
    fn changed_status_is_written_back_and_announced() {
        let p = project("P7", Some(ProjectStatus::Upcoming));
        let mut store = MemoryStore::new(vec![p.clone()], vec![], vec![]);
        let mut bus = UpdateBus::new();
        let rx = bus.subscribe();
        let kpis = vec![kpi("P7", InputType::Actual, 3.0, ActivityTiming::PostCommencement)];

        let outcome = reconcile_status(&mut store, &mut bus, &p, &kpis, now());
        assert_eq!(outcome.status, ProjectStatus::OnGoing);
        assert!(outcome.changed());
        assert!(matches!(outcome.write_back, Some(Ok(()))));
        assert_eq!(store.projects()[0].status, Some(ProjectStatus::OnGoing));
        assert_eq!(store.projects()[0].status_label.as_deref(), Some("On Going"));

        let event = rx.try_recv().unwrap();
        assert_eq!(event.table_name, "projects");
        assert_eq!(event.timestamp, now());
    }

    #[test]
    fn unchanged_status_is_not_written() {
        let p = project("P7", Some(ProjectStatus::Upcoming));
        let mut store = MemoryStore::new(vec![p.clone()], vec![], vec![]);
        let mut bus = UpdateBus::new();
        let rx = bus.subscribe();
        let outcome = reconcile_status(&mut store, &mut bus, &p, &[], now());
        assert!(!outcome.changed());
        assert!(outcome.write_back.is_none());
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn failed_write_back_still_reports_computed_status() {
        let p = project("P7", None);
        // Store does not know the project, so the write fails.
        let mut store = MemoryStore::default();
        let mut bus = UpdateBus::new();
        let rx = bus.subscribe();
        let outcomes = reconcile_all(&mut store, &mut bus, &[p], &[], now());
        assert_eq!(outcomes.len(), 1);
        assert_eq!(outcomes[0].status, ProjectStatus::Upcoming);
        assert!(matches!(outcomes[0].write_back, Some(Err(StoreError::ProjectNotFound(_)))));
        assert!(rx.try_recv().is_err());
    }
}
