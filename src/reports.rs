use crate::aggregate::{kpi_date, Aggregator, PendingQuantities};
use crate::codes::belongs_to;
use crate::status::{classify, StatusInputs};
use crate::store::Snapshot;
use crate::types::{
    ActivityProgressRow, KpiTimelineRow, Project, ProjectSummaryRow, RecordCodes, SummaryStats,
};
use crate::util::{format_number, percent_of};
use chrono::NaiveDate;
use std::collections::{BTreeMap, HashMap};

const UNDATED: &str = "undated";

fn sorted_projects(projects: &[Project]) -> Vec<&Project> {
    let mut sorted: Vec<&Project> = projects.iter().collect();
    sorted.sort_by(|a, b| a.full_code.cmp(&b.full_code));
    sorted
}

/// Report 1: one line per project with money, progress and derived status.
pub fn generate_project_summary(
    snapshot: &Snapshot,
    today: NaiveDate,
    pending: &PendingQuantities,
) -> Vec<ProjectSummaryRow> {
    let agg = Aggregator::new(&snapshot.kpis, today).with_pending(pending);
    sorted_projects(&snapshot.projects)
        .into_iter()
        .map(|project| {
            let progress = agg.project_progress(project, &snapshot.activities);
            let inputs = StatusInputs::collect(project, &snapshot.kpis, today);
            let status = classify(project.status, &inputs);
            ProjectSummaryRow {
                full_code: project.full_code.clone(),
                name: project.name.clone(),
                activities: progress.activities.len(),
                budget: format_number(progress.budget, 2),
                earned: format_number(progress.earned, 2),
                planned: format_number(progress.planned_value, 2),
                progress_pct: format_number(progress.progress_pct, 2),
                status: status.label().to_string(),
            }
        })
        .collect()
}

/// Report 2: done/planned/total per BOQ activity.
pub fn generate_activity_progress(
    snapshot: &Snapshot,
    today: NaiveDate,
    pending: &PendingQuantities,
) -> Vec<ActivityProgressRow> {
    let agg = Aggregator::new(&snapshot.kpis, today).with_pending(pending);
    let mut rows = Vec::new();
    for project in sorted_projects(&snapshot.projects) {
        let progress = agg.project_progress(project, &snapshot.activities);
        let mut lines: Vec<ActivityProgressRow> = progress
            .activities
            .iter()
            .map(|a| ActivityProgressRow {
                full_code: project.full_code.clone(),
                activity: a.activity.name.clone(),
                zone: a.activity.zone.clone().unwrap_or_default(),
                unit: a.summary.unit.clone(),
                total: format_number(a.summary.total, 2),
                planned: format_number(a.summary.planned, 2),
                done: format_number(a.summary.done, 2),
                progress_pct: format_number(a.value.progress_pct, 2),
                remaining: format_number(a.value.remaining, 2),
            })
            .collect();
        lines.sort_by(|a, b| a.activity.cmp(&b.activity).then_with(|| a.zone.cmp(&b.zone)));
        rows.extend(lines);
    }
    rows
}

/// Report 3: monthly planned vs. actual quantities per project, up to the
/// end of yesterday. KPIs without a date are grouped under `undated`.
pub fn generate_kpi_timeline(snapshot: &Snapshot, today: NaiveDate) -> Vec<KpiTimelineRow> {
    let cutoff = Aggregator::new(&snapshot.kpis, today).cutoff();
    let mut rows = Vec::new();
    for project in sorted_projects(&snapshot.projects) {
        let mut months: BTreeMap<String, (f64, f64)> = BTreeMap::new();
        for kpi in snapshot.kpis.iter().filter(|k| belongs_to(&k.codes, project)) {
            let date = kpi_date(kpi);
            if date.is_some_and(|d| d > cutoff) {
                continue;
            }
            let month = date
                .map(|d| d.format("%Y-%m").to_string())
                .unwrap_or_else(|| UNDATED.to_string());
            let entry = months.entry(month).or_insert((0.0, 0.0));
            if kpi.is_planned() {
                entry.0 += kpi.quantity;
            } else if kpi.is_actual() {
                entry.1 += kpi.quantity;
            }
        }

        let total_planned: f64 = months.values().map(|(p, _)| p).sum();
        let mut cumulative_actual = 0.0;
        for (month, (planned, actual)) in months {
            cumulative_actual += actual;
            rows.push(KpiTimelineRow {
                full_code: project.full_code.clone(),
                month,
                planned_qty: format_number(planned, 2),
                actual_qty: format_number(actual, 2),
                variance: format_number(actual - planned, 2),
                cumulative_pct: format_number(percent_of(cumulative_actual, total_planned), 2),
            });
        }
    }
    rows
}

pub fn generate_summary(
    snapshot: &Snapshot,
    today: NaiveDate,
    pending: &PendingQuantities,
) -> SummaryStats {
    let agg = Aggregator::new(&snapshot.kpis, today).with_pending(pending);
    let mut total_budget = 0.0;
    let mut total_earned = 0.0;
    let mut status_counts: BTreeMap<String, usize> = BTreeMap::new();
    for project in &snapshot.projects {
        let progress = agg.project_progress(project, &snapshot.activities);
        total_budget += progress.budget;
        total_earned += progress.earned;
        let inputs = StatusInputs::collect(project, &snapshot.kpis, today);
        let status = classify(project.status, &inputs);
        *status_counts.entry(status.as_str().to_string()).or_default() += 1;
    }

    let owned = |codes: &RecordCodes| snapshot.projects.iter().any(|p| belongs_to(codes, p));
    let unmatched_activities = snapshot.activities.iter().filter(|a| !owned(&a.codes)).count();
    let unmatched_kpis = snapshot.kpis.iter().filter(|k| !owned(&k.codes)).count();

    SummaryStats {
        as_of: today.format("%Y-%m-%d").to_string(),
        total_projects: snapshot.projects.len(),
        total_activities: snapshot.activities.len(),
        total_kpis: snapshot.kpis.len(),
        unmatched_activities,
        unmatched_kpis,
        total_budget,
        total_earned,
        overall_progress_pct: percent_of(total_earned, total_budget),
        status_counts,
    }
}

/// Activities per project full code, for quick lookups in the CLI.
pub fn activity_counts(snapshot: &Snapshot) -> HashMap<String, usize> {
    snapshot
        .projects
        .iter()
        .map(|p| {
            let n = snapshot.activities.iter().filter(|a| belongs_to(&a.codes, p)).count();
            (p.full_code.clone(), n)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codes::build_full_code;
    use crate::types::{Activity, ActivityTiming, InputType, KpiRecord, ProjectStatus};
    use chrono::NaiveDateTime;

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 4, 2).unwrap()
    }

    fn day(y: i32, m: u32, d: u32) -> Option<NaiveDateTime> {
        NaiveDate::from_ymd_opt(y, m, d).unwrap().and_hms_opt(8, 0, 0)
    }

    fn project(code: &str, sub: &str, name: &str) -> Project {
        Project {
            code: code.into(),
            sub_code: sub.into(),
            full_code: build_full_code(code, sub),
            name: name.into(),
            status: None,
            status_label: None,
            completion_date: None,
            contract_amount: 0.0,
            updated_at: None,
        }
    }

    fn full(code: &str) -> RecordCodes {
        RecordCodes {
            full_code: code.into(),
            ..Default::default()
        }
    }

    fn activity(code: &str, name: &str) -> Activity {
        Activity {
            id: format!("{code}-{name}"),
            codes: full(code),
            name: name.into(),
            unit: "m2".into(),
            zone: None,
            total_units: 200.0,
            planned_units: 0.0,
            actual_units: 0.0,
            rate: 10.0,
            total_value: 0.0,
        }
    }

    fn kpi(code: &str, input: InputType, qty: f64, when: Option<NaiveDateTime>) -> KpiRecord {
        KpiRecord {
            id: String::new(),
            codes: full(code),
            input_type: Some(input),
            activity_name: "Tiling".into(),
            quantity: qty,
            value: 0.0,
            date: when,
            target_date: None,
            activity_date: None,
            actual_date: when,
            created_at: None,
            zone: None,
            timing: ActivityTiming::PostCommencement,
        }
    }

    fn snapshot() -> Snapshot {
        Snapshot {
            projects: vec![
                project("P5066", "I2", "South"),
                project("P5066", "I1", "North"),
            ],
            activities: vec![
                activity("P5066-I1", "Tiling"),
                activity("P5066-I2", "Tiling"),
                activity("P9999", "Tiling"),
            ],
            kpis: vec![
                kpi("P5066-I1", InputType::Planned, 100.0, day(2024, 2, 10)),
                kpi("P5066-I1", InputType::Actual, 40.0, day(2024, 2, 20)),
                kpi("P5066-I1", InputType::Actual, 60.0, day(2024, 3, 5)),
                kpi("P5066-I1", InputType::Actual, 99.0, day(2024, 4, 2)),
                kpi("P5066-I1", InputType::Actual, 5.0, None),
                kpi("P0000", InputType::Actual, 1.0, None),
            ],
        }
    }

    #[test]
    fn project_summary_is_sorted_and_isolates_siblings() {
        let rows = generate_project_summary(&snapshot(), today(), &PendingQuantities::new());
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].full_code, "P5066-I1");
        assert_eq!(rows[0].activities, 1);
        assert_eq!(rows[0].earned, "1,050.00");
        assert_eq!(rows[0].budget, "2,000.00");
        assert_eq!(rows[0].progress_pct, "52.50");
        assert_eq!(rows[0].status, "Contract Completed");
        assert_eq!(rows[1].full_code, "P5066-I2");
        assert_eq!(rows[1].earned, "0.00");
        assert_eq!(rows[1].status, "Upcoming");
    }

    #[test]
    fn activity_report_includes_pending_quantities() {
        let snap = snapshot();
        let mut pending = PendingQuantities::new();
        pending.set("P5066-I2-Tiling", 20.0);
        let rows = generate_activity_progress(&snap, today(), &pending);
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].done, "105.00");
        assert_eq!(rows[1].full_code, "P5066-I2");
        assert_eq!(rows[1].done, "20.00");
        assert_eq!(rows[1].progress_pct, "10.00");
    }

    #[test]
    fn timeline_buckets_by_month_and_skips_today() {
        let rows = generate_kpi_timeline(&snapshot(), today());
        let north: Vec<_> = rows.iter().filter(|r| r.full_code == "P5066-I1").collect();
        let months: Vec<&str> = north.iter().map(|r| r.month.as_str()).collect();
        assert_eq!(months, vec!["2024-02", "2024-03", "undated"]);
        assert_eq!(north[0].variance, "-60.00");
        assert_eq!(north[0].cumulative_pct, "40.00");
        assert_eq!(north[1].cumulative_pct, "100.00");
        assert!(rows.iter().all(|r| r.full_code != "P5066-I2"));
    }

    #[test]
    fn summary_counts_orphans_and_statuses() {
        let mut snap = snapshot();
        snap.projects[0].status = Some(ProjectStatus::OnHold);
        let summary = generate_summary(&snap, today(), &PendingQuantities::new());
        assert_eq!(summary.total_projects, 2);
        assert_eq!(summary.unmatched_activities, 1);
        assert_eq!(summary.unmatched_kpis, 1);
        assert_eq!(summary.total_budget, 4000.0);
        assert_eq!(summary.status_counts.get("on-hold"), Some(&1));
        assert_eq!(summary.status_counts.get("contract-completed"), Some(&1));
        assert_eq!(summary.as_of, "2024-04-02");
    }

    #[test]
    fn activity_counts_by_project() {
        let counts = activity_counts(&snapshot());
        assert_eq!(counts["P5066-I1"], 1);
        assert_eq!(counts["P5066-I2"], 1);
    }
}
