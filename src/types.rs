use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use tabled::Tabled;

// Raw rows as they come out of the dashboard exports. Every column exists
// under a snake_case and a "Title Case" spelling; `raw` optionally holds a
// JSON object with more of the same fields.

#[derive(Debug, Default, Clone, Deserialize)]
pub struct RawProjectRow {
    #[serde(rename = "project_code", alias = "Project Code", default)]
    pub project_code: Option<String>,
    #[serde(rename = "project_sub_code", alias = "Project Sub Code", default)]
    pub project_sub_code: Option<String>,
    #[serde(rename = "project_full_code", alias = "Project Full Code", default)]
    pub project_full_code: Option<String>,
    #[serde(rename = "project_name", alias = "Project Name", default)]
    pub project_name: Option<String>,
    #[serde(rename = "project_status", alias = "Project Status", default)]
    pub project_status: Option<String>,
    #[serde(rename = "completion_date", alias = "Completion Date", default)]
    pub completion_date: Option<String>,
    #[serde(rename = "contract_amount", alias = "Contract Amount", default)]
    pub contract_amount: Option<String>,
    #[serde(default)]
    pub raw: Option<String>,
}

#[derive(Debug, Default, Clone, Deserialize)]
pub struct RawActivityRow {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(rename = "project_code", alias = "Project Code", default)]
    pub project_code: Option<String>,
    #[serde(rename = "project_sub_code", alias = "Project Sub Code", default)]
    pub project_sub_code: Option<String>,
    #[serde(rename = "project_full_code", alias = "Project Full Code", default)]
    pub project_full_code: Option<String>,
    #[serde(rename = "activity_name", alias = "Activity Name", default)]
    pub activity_name: Option<String>,
    #[serde(rename = "unit", alias = "Unit", default)]
    pub unit: Option<String>,
    #[serde(rename = "zone_ref", alias = "Zone Ref", default)]
    pub zone_ref: Option<String>,
    #[serde(rename = "zone_number", alias = "Zone Number", default)]
    pub zone_number: Option<String>,
    #[serde(rename = "total_units", alias = "Total Units", default)]
    pub total_units: Option<String>,
    #[serde(rename = "planned_units", alias = "Planned Units", default)]
    pub planned_units: Option<String>,
    #[serde(rename = "actual_units", alias = "Actual Units", default)]
    pub actual_units: Option<String>,
    #[serde(rename = "rate", alias = "Rate", default)]
    pub rate: Option<String>,
    #[serde(rename = "total_value", alias = "Total Value", default)]
    pub total_value: Option<String>,
    #[serde(default)]
    pub raw: Option<String>,
}

#[derive(Debug, Default, Clone, Deserialize)]
pub struct RawKpiRow {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(rename = "project_code", alias = "Project Code", default)]
    pub project_code: Option<String>,
    #[serde(rename = "project_sub_code", alias = "Project Sub Code", default)]
    pub project_sub_code: Option<String>,
    #[serde(rename = "project_full_code", alias = "Project Full Code", default)]
    pub project_full_code: Option<String>,
    #[serde(rename = "input_type", alias = "Input Type", default)]
    pub input_type: Option<String>,
    #[serde(rename = "activity_name", alias = "Activity Name", default)]
    pub activity_name: Option<String>,
    #[serde(rename = "quantity", alias = "Quantity", default)]
    pub quantity: Option<String>,
    #[serde(rename = "value", alias = "Value", default)]
    pub value: Option<String>,
    #[serde(rename = "date", alias = "Date", default)]
    pub date: Option<String>,
    #[serde(rename = "target_date", alias = "Target Date", default)]
    pub target_date: Option<String>,
    #[serde(rename = "activity_date", alias = "Activity Date", default)]
    pub activity_date: Option<String>,
    #[serde(rename = "actual_date", alias = "Actual Date", default)]
    pub actual_date: Option<String>,
    #[serde(default)]
    pub created_at: Option<String>,
    #[serde(rename = "zone", alias = "Zone", default)]
    pub zone: Option<String>,
    #[serde(rename = "activity_timing", alias = "Activity Timing", default)]
    pub activity_timing: Option<String>,
    #[serde(default)]
    pub raw: Option<String>,
}

/// Project identifiers exactly as a child row (or project) carried them,
/// trimmed. `full_code` is empty when the row had none.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecordCodes {
    pub code: String,
    pub sub_code: String,
    pub full_code: String,
}

#[derive(Debug, Clone)]
pub struct Project {
    pub code: String,
    pub sub_code: String,
    /// Canonical full code: the stored one, or built from code + sub-code.
    pub full_code: String,
    pub name: String,
    pub status: Option<ProjectStatus>,
    pub status_label: Option<String>,
    pub completion_date: Option<NaiveDate>,
    pub contract_amount: f64,
    pub updated_at: Option<NaiveDateTime>,
}

impl Project {
    pub fn has_sub_code(&self) -> bool {
        !self.sub_code.is_empty()
    }
}

#[derive(Debug, Clone)]
pub struct Activity {
    pub id: String,
    pub codes: RecordCodes,
    pub name: String,
    pub unit: String,
    pub zone: Option<String>,
    pub total_units: f64,
    pub planned_units: f64,
    pub actual_units: f64,
    pub rate: f64,
    pub total_value: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum InputType {
    Planned,
    Actual,
}

impl FromStr for InputType {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "planned" | "plan" => Ok(InputType::Planned),
            "actual" => Ok(InputType::Actual),
            _ => Err(()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ActivityTiming {
    PreCommencement,
    PostCommencement,
    #[default]
    Unspecified,
}

impl ActivityTiming {
    pub fn parse(s: &str) -> Self {
        let norm: String = s
            .trim()
            .to_ascii_lowercase()
            .chars()
            .filter(|c| c.is_ascii_alphanumeric())
            .collect();
        match norm.as_str() {
            "precommencement" => ActivityTiming::PreCommencement,
            "postcommencement" => ActivityTiming::PostCommencement,
            _ => ActivityTiming::Unspecified,
        }
    }
}

#[derive(Debug, Clone)]
pub struct KpiRecord {
    pub id: String,
    pub codes: RecordCodes,
    pub input_type: Option<InputType>,
    pub activity_name: String,
    pub quantity: f64,
    pub value: f64,
    pub date: Option<NaiveDateTime>,
    pub target_date: Option<NaiveDateTime>,
    pub activity_date: Option<NaiveDateTime>,
    pub actual_date: Option<NaiveDateTime>,
    pub created_at: Option<NaiveDateTime>,
    pub zone: Option<String>,
    pub timing: ActivityTiming,
}

impl KpiRecord {
    pub fn is_planned(&self) -> bool {
        self.input_type == Some(InputType::Planned)
    }

    pub fn is_actual(&self) -> bool {
        self.input_type == Some(InputType::Actual)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProjectStatus {
    Upcoming,
    SitePreparation,
    OnGoing,
    CompletedDuration,
    ContractCompleted,
    OnHold,
    Cancelled,
}

impl ProjectStatus {
    pub const ALL: [ProjectStatus; 7] = [
        ProjectStatus::Upcoming,
        ProjectStatus::SitePreparation,
        ProjectStatus::OnGoing,
        ProjectStatus::CompletedDuration,
        ProjectStatus::ContractCompleted,
        ProjectStatus::OnHold,
        ProjectStatus::Cancelled,
    ];

    /// Normalized value stored in `project_status`.
    pub fn as_str(&self) -> &'static str {
        match self {
            ProjectStatus::Upcoming => "upcoming",
            ProjectStatus::SitePreparation => "site-preparation",
            ProjectStatus::OnGoing => "on-going",
            ProjectStatus::CompletedDuration => "completed-duration",
            ProjectStatus::ContractCompleted => "contract-completed",
            ProjectStatus::OnHold => "on-hold",
            ProjectStatus::Cancelled => "cancelled",
        }
    }

    /// Display label stored next to the normalized value.
    pub fn label(&self) -> &'static str {
        match self {
            ProjectStatus::Upcoming => "Upcoming",
            ProjectStatus::SitePreparation => "Site Preparation",
            ProjectStatus::OnGoing => "On Going",
            ProjectStatus::CompletedDuration => "Completed Duration",
            ProjectStatus::ContractCompleted => "Contract Completed",
            ProjectStatus::OnHold => "On Hold",
            ProjectStatus::Cancelled => "Cancelled",
        }
    }

    /// Manually set states that reconciliation never overrides.
    pub fn is_sticky(&self) -> bool {
        matches!(self, ProjectStatus::OnHold | ProjectStatus::Cancelled)
    }
}

impl fmt::Display for ProjectStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProjectStatus {
    type Err = ();

    /// Accepts both the normalized value and the display label, with any
    /// mix of spaces, dashes and underscores.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let norm: String = s
            .trim()
            .to_ascii_lowercase()
            .chars()
            .filter(|c| c.is_ascii_alphanumeric())
            .collect();
        match norm.as_str() {
            "upcoming" => Ok(ProjectStatus::Upcoming),
            "sitepreparation" => Ok(ProjectStatus::SitePreparation),
            "ongoing" => Ok(ProjectStatus::OnGoing),
            "completedduration" => Ok(ProjectStatus::CompletedDuration),
            "contractcompleted" => Ok(ProjectStatus::ContractCompleted),
            "onhold" => Ok(ProjectStatus::OnHold),
            "cancelled" | "canceled" => Ok(ProjectStatus::Cancelled),
            _ => Err(()),
        }
    }
}

/// Done / total / planned quantities for one activity.
#[derive(Debug, Clone, PartialEq)]
pub struct QuantitySummary {
    pub done: f64,
    pub total: f64,
    pub planned: f64,
    pub unit: String,
}

/// Monetary and percentage figures derived from a [`QuantitySummary`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WorkValue {
    pub progress_pct: f64,
    pub rate: f64,
    pub budget: f64,
    pub earned: f64,
    pub planned: f64,
    pub remaining: f64,
}

// Project lines written back by the status reconciliation.
#[derive(Debug, Serialize, Clone)]
pub struct ProjectExportRow {
    pub project_code: String,
    pub project_sub_code: String,
    pub project_full_code: String,
    pub project_name: String,
    pub project_status: String,
    pub project_status_label: String,
    pub completion_date: String,
    pub contract_amount: f64,
    pub updated_at: String,
}

#[derive(Debug, Serialize, Tabled, Clone)]
pub struct ProjectSummaryRow {
    #[serde(rename = "ProjectFullCode")]
    #[tabled(rename = "ProjectFullCode")]
    pub full_code: String,
    #[serde(rename = "ProjectName")]
    #[tabled(rename = "ProjectName")]
    pub name: String,
    #[serde(rename = "Activities")]
    #[tabled(rename = "Activities")]
    pub activities: usize,
    #[serde(rename = "Budget")]
    #[tabled(rename = "Budget")]
    pub budget: String,
    #[serde(rename = "EarnedValue")]
    #[tabled(rename = "EarnedValue")]
    pub earned: String,
    #[serde(rename = "PlannedValue")]
    #[tabled(rename = "PlannedValue")]
    pub planned: String,
    #[serde(rename = "ProgressPct")]
    #[tabled(rename = "ProgressPct")]
    pub progress_pct: String,
    #[serde(rename = "Status")]
    #[tabled(rename = "Status")]
    pub status: String,
}

#[derive(Debug, Serialize, Tabled, Clone)]
pub struct ActivityProgressRow {
    #[serde(rename = "ProjectFullCode")]
    #[tabled(rename = "ProjectFullCode")]
    pub full_code: String,
    #[serde(rename = "Activity")]
    #[tabled(rename = "Activity")]
    pub activity: String,
    #[serde(rename = "Zone")]
    #[tabled(rename = "Zone")]
    pub zone: String,
    #[serde(rename = "Unit")]
    #[tabled(rename = "Unit")]
    pub unit: String,
    #[serde(rename = "Total")]
    #[tabled(rename = "Total")]
    pub total: String,
    #[serde(rename = "Planned")]
    #[tabled(rename = "Planned")]
    pub planned: String,
    #[serde(rename = "Done")]
    #[tabled(rename = "Done")]
    pub done: String,
    #[serde(rename = "ProgressPct")]
    #[tabled(rename = "ProgressPct")]
    pub progress_pct: String,
    #[serde(rename = "Remaining")]
    #[tabled(rename = "Remaining")]
    pub remaining: String,
}

#[derive(Debug, Serialize, Tabled, Clone)]
pub struct KpiTimelineRow {
    #[serde(rename = "ProjectFullCode")]
    #[tabled(rename = "ProjectFullCode")]
    pub full_code: String,
    #[serde(rename = "Month")]
    #[tabled(rename = "Month")]
    pub month: String,
    #[serde(rename = "PlannedQty")]
    #[tabled(rename = "PlannedQty")]
    pub planned_qty: String,
    #[serde(rename = "ActualQty")]
    #[tabled(rename = "ActualQty")]
    pub actual_qty: String,
    #[serde(rename = "Variance")]
    #[tabled(rename = "Variance")]
    pub variance: String,
    #[serde(rename = "CumulativeActualPct")]
    #[tabled(rename = "CumulativeActualPct")]
    pub cumulative_pct: String,
}

#[derive(Debug, Serialize)]
pub struct SummaryStats {
    pub as_of: String,
    pub total_projects: usize,
    pub total_activities: usize,
    pub total_kpis: usize,
    pub unmatched_activities: usize,
    pub unmatched_kpis: usize,
    pub total_budget: f64,
    pub total_earned: f64,
    pub overall_progress_pct: f64,
    pub status_counts: std::collections::BTreeMap<String, usize>,
}
