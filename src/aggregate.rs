//! Planned vs. actual quantities and the money figures derived from them.
use crate::codes::belongs_to;
use crate::types::{Activity, KpiRecord, Project, QuantitySummary, WorkValue};
use crate::util::{first_nonzero, first_some, percent_of};
use crate::zones::zone_compatible;
use chrono::{Duration, NaiveDate, NaiveDateTime};
use std::collections::HashMap;
use tracing::debug;

type DateField = fn(&KpiRecord) -> Option<NaiveDateTime>;

fn date_field(k: &KpiRecord) -> Option<NaiveDateTime> {
    k.date
}
fn target_date_field(k: &KpiRecord) -> Option<NaiveDateTime> {
    k.target_date
}
fn activity_date_field(k: &KpiRecord) -> Option<NaiveDateTime> {
    k.activity_date
}
fn actual_date_field(k: &KpiRecord) -> Option<NaiveDateTime> {
    k.actual_date
}
fn created_at_field(k: &KpiRecord) -> Option<NaiveDateTime> {
    k.created_at
}

/// Where a Planned KPI takes its date from, highest priority first.
pub const PLANNED_DATE_FIELDS: [DateField; 4] = [
    date_field,
    target_date_field,
    activity_date_field,
    created_at_field,
];

/// Where an Actual KPI takes its date from, highest priority first.
pub const ACTUAL_DATE_FIELDS: [DateField; 3] =
    [actual_date_field, activity_date_field, created_at_field];

pub fn planned_date(kpi: &KpiRecord) -> Option<NaiveDateTime> {
    first_some(kpi, &PLANNED_DATE_FIELDS)
}

pub fn actual_date(kpi: &KpiRecord) -> Option<NaiveDateTime> {
    first_some(kpi, &ACTUAL_DATE_FIELDS)
}

/// Date a KPI counts on, according to its input type.
pub fn kpi_date(kpi: &KpiRecord) -> Option<NaiveDateTime> {
    if kpi.is_actual() {
        actual_date(kpi)
    } else {
        planned_date(kpi)
    }
}

/// Last instant that still counts as history: yesterday 23:59:59.999.
/// Entries made today are not due yet.
pub fn until_yesterday(today: NaiveDate) -> NaiveDateTime {
    let yesterday = today - Duration::days(1);
    yesterday
        .and_hms_milli_opt(23, 59, 59, 999)
        .unwrap_or_else(|| yesterday.and_time(chrono::NaiveTime::MIN))
}

/// Quantities typed in the current session but not saved yet, per activity id.
#[derive(Debug, Clone, Default)]
pub struct PendingQuantities {
    by_activity: HashMap<String, f64>,
}

impl PendingQuantities {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&mut self, activity_id: &str, quantity: f64) {
        if quantity.is_finite() {
            self.by_activity.insert(activity_id.to_string(), quantity);
        }
    }

    pub fn get(&self, activity_id: &str) -> f64 {
        self.by_activity.get(activity_id).copied().unwrap_or(0.0)
    }

    pub fn clear(&mut self) {
        self.by_activity.clear();
    }

    pub fn is_empty(&self) -> bool {
        self.by_activity.is_empty()
    }
}

/// Whether `kpi` records progress against `activity` of `project`: same
/// project, same activity name (case-insensitive) and compatible zones.
pub fn kpi_matches_activity(kpi: &KpiRecord, activity: &Activity, project: &Project) -> bool {
    belongs_to(&kpi.codes, project)
        && kpi
            .activity_name
            .trim()
            .eq_ignore_ascii_case(activity.name.trim())
        && zone_compatible(
            kpi.zone.as_deref(),
            activity.zone.as_deref(),
            &project.full_code,
            &project.code,
        )
}

/// Raw KPI sums for one activity up to the cutoff.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct KpiSums {
    pub planned_qty: f64,
    pub actual_qty: f64,
    pub planned_value: f64,
    pub actual_value: f64,
}

#[derive(Debug, Clone)]
pub struct ActivityProgress<'a> {
    pub activity: &'a Activity,
    pub summary: QuantitySummary,
    pub value: WorkValue,
}

#[derive(Debug, Clone)]
pub struct ProjectProgress<'a> {
    pub activities: Vec<ActivityProgress<'a>>,
    pub budget: f64,
    pub earned: f64,
    pub planned_value: f64,
    pub progress_pct: f64,
}

/// Sums KPI rows for activities as of a given day.
pub struct Aggregator<'a> {
    kpis: &'a [KpiRecord],
    cutoff: NaiveDateTime,
    pending: Option<&'a PendingQuantities>,
}

impl<'a> Aggregator<'a> {
    pub fn new(kpis: &'a [KpiRecord], today: NaiveDate) -> Self {
        Self {
            kpis,
            cutoff: until_yesterday(today),
            pending: None,
        }
    }

    pub fn with_pending(mut self, pending: &'a PendingQuantities) -> Self {
        self.pending = Some(pending);
        self
    }

    pub fn cutoff(&self) -> NaiveDateTime {
        self.cutoff
    }

    /// KPIs without a usable date are counted ("fail open").
    fn is_due(&self, date: Option<NaiveDateTime>) -> bool {
        date.map_or(true, |d| d <= self.cutoff)
    }

    pub fn kpi_sums(&self, project: &Project, activity: &Activity) -> KpiSums {
        self.sum_kpis(
            self.kpis
                .iter()
                .filter(|k| kpi_matches_activity(k, activity, project)),
        )
    }

    fn sum_kpis<'k>(&self, kpis: impl Iterator<Item = &'k KpiRecord>) -> KpiSums {
        let mut sums = KpiSums::default();
        for kpi in kpis {
            if kpi.is_planned() && self.is_due(planned_date(kpi)) {
                sums.planned_qty += kpi.quantity;
                sums.planned_value += kpi.value;
            } else if kpi.is_actual() && self.is_due(actual_date(kpi)) {
                sums.actual_qty += kpi.quantity;
                sums.actual_value += kpi.value;
            }
        }
        sums
    }

    pub fn summarize(&self, project: &Project, activity: &Activity) -> QuantitySummary {
        self.summary_from(activity, &self.kpi_sums(project, activity))
    }

    fn summary_from(&self, activity: &Activity, sums: &KpiSums) -> QuantitySummary {
        let total = first_nonzero(&[activity.total_units, activity.planned_units]);
        let planned = first_nonzero(&[sums.planned_qty, activity.planned_units]);
        let pending = self.pending.map_or(0.0, |p| p.get(&activity.id));
        let done = first_nonzero(&[sums.actual_qty, activity.actual_units]) + pending;
        QuantitySummary {
            done,
            total,
            planned,
            unit: activity.unit.clone(),
        }
    }

    pub fn activity_progress<'b>(
        &self,
        project: &Project,
        activity: &'b Activity,
    ) -> ActivityProgress<'b> {
        self.progress_from(activity, self.kpi_sums(project, activity))
    }

    fn progress_from<'b>(&self, activity: &'b Activity, sums: KpiSums) -> ActivityProgress<'b> {
        let summary = self.summary_from(activity, &sums);
        let value = work_value(activity, &summary, &sums);
        ActivityProgress {
            activity,
            summary,
            value,
        }
    }

    /// Progress of every activity in `activities` that belongs to `project`.
    ///
    /// A KPI is credited to the first of the project's activities it matches,
    /// so duplicated BOQ lines never count the same entry twice.
    pub fn project_progress<'b>(
        &self,
        project: &Project,
        activities: &'b [Activity],
    ) -> ProjectProgress<'b> {
        let owned: Vec<&'b Activity> = activities
            .iter()
            .filter(|a| belongs_to(&a.codes, project))
            .collect();
        let mut claimed: Vec<Vec<&KpiRecord>> = vec![Vec::new(); owned.len()];
        for kpi in self.kpis {
            if let Some(i) = owned
                .iter()
                .position(|a| kpi_matches_activity(kpi, a, project))
            {
                claimed[i].push(kpi);
            }
        }
        let rows: Vec<ActivityProgress<'b>> = owned
            .into_iter()
            .zip(claimed)
            .map(|(a, kpis)| self.progress_from(a, self.sum_kpis(kpis.into_iter())))
            .collect();

        let budget: f64 = rows.iter().map(|r| r.value.budget).sum();
        let earned: f64 = rows.iter().map(|r| r.value.earned).sum();
        let planned_value: f64 = rows.iter().map(|r| r.value.planned).sum();
        let progress_pct = if budget > 0.0 {
            percent_of(earned, budget)
        } else {
            let weight: f64 = rows.iter().map(|r| r.summary.total).sum();
            if weight > 0.0 {
                rows.iter()
                    .map(|r| r.value.progress_pct * r.summary.total)
                    .sum::<f64>()
                    / weight
            } else {
                0.0
            }
        };
        debug!(
            project = %project.full_code,
            activities = rows.len(),
            budget,
            earned,
            progress_pct,
            "aggregated project progress"
        );
        ProjectProgress {
            activities: rows,
            budget,
            earned,
            planned_value,
            progress_pct,
        }
    }
}

/// Percentages and money for one activity.
///
/// Unit rate falls back from `rate` to `total_value / total`. Earned and
/// planned values prefer the KPI `value` sums and fall back to quantity ×
/// rate.
pub fn work_value(activity: &Activity, summary: &QuantitySummary, sums: &KpiSums) -> WorkValue {
    let derived_rate = if summary.total > 0.0 {
        activity.total_value / summary.total
    } else {
        0.0
    };
    let rate = first_nonzero(&[activity.rate, derived_rate]);
    let budget = first_nonzero(&[activity.total_value, summary.total * rate]);
    let earned = first_nonzero(&[sums.actual_value, summary.done * rate]);
    let planned = first_nonzero(&[sums.planned_value, summary.planned * rate]);
    WorkValue {
        progress_pct: percent_of(summary.done, summary.total),
        rate,
        budget,
        earned,
        planned,
        remaining: (budget - earned).max(0.0),
    }
}
