// Ingestion of the dashboard exports.
//
// Raw rows are collapsed into the strict record types here: column
// spellings, the nested `raw` JSON object, number and date coercion and the
// "no zone" placeholders are all resolved before any matching runs.
use crate::codes::project_full_code;
use crate::dates::parse_date_opt;
use crate::error::LoadError;
use crate::store::MemoryStore;
use crate::types::{
    Activity, ActivityTiming, InputType, KpiRecord, Project, ProjectStatus, RawActivityRow,
    RawKpiRow, RawProjectRow, RecordCodes,
};
use crate::util::{clean_text, to_number};
use crate::zones::normalize_zone;
use csv::ReaderBuilder;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use std::io::Read;
use std::path::Path;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Default, PartialEq)]
pub struct LoadReport {
    pub projects: usize,
    pub activities: usize,
    pub kpis: usize,
    pub parse_errors: usize,
    pub skipped_projects: usize,
    pub undated_kpis: usize,
    pub untyped_kpis: usize,
}

/// Fields found in a row's `raw` JSON column, keyed by any spelling.
#[derive(Debug, Default)]
struct RawFields(Map<String, Value>);

impl RawFields {
    fn parse(raw: Option<&str>) -> Self {
        let Some(text) = raw.map(str::trim).filter(|t| !t.is_empty()) else {
            return Self::default();
        };
        match serde_json::from_str::<Value>(text) {
            Ok(Value::Object(map)) => Self(map),
            Ok(_) => Self::default(),
            Err(e) => {
                debug!(error = %e, "ignoring unreadable raw column");
                Self::default()
            }
        }
    }

    fn get(&self, keys: &[&str]) -> Option<String> {
        keys.iter().find_map(|k| match self.0.get(*k)? {
            Value::String(s) => clean_text(Some(s)),
            Value::Number(n) => Some(n.to_string()),
            _ => None,
        })
    }
}

/// Top-level value first, then the same field inside `raw`.
fn pick(top: &Option<String>, raw: &RawFields, keys: &[&str]) -> Option<String> {
    clean_text(top.as_deref()).or_else(|| raw.get(keys))
}

const CODE: [&str; 2] = ["project_code", "Project Code"];
const SUB_CODE: [&str; 2] = ["project_sub_code", "Project Sub Code"];
const FULL_CODE: [&str; 2] = ["project_full_code", "Project Full Code"];

fn record_codes(
    code: &Option<String>,
    sub_code: &Option<String>,
    full_code: &Option<String>,
    raw: &RawFields,
) -> RecordCodes {
    RecordCodes {
        code: pick(code, raw, &CODE).unwrap_or_default(),
        sub_code: pick(sub_code, raw, &SUB_CODE).unwrap_or_default(),
        full_code: pick(full_code, raw, &FULL_CODE).unwrap_or_default(),
    }
}

/// `None` when the row has no project code at all.
pub fn normalize_project(row: &RawProjectRow) -> Option<Project> {
    let raw = RawFields::parse(row.raw.as_deref());
    let codes = record_codes(&row.project_code, &row.project_sub_code, &row.project_full_code, &raw);
    if codes.code.is_empty() {
        return None;
    }
    let status = pick(&row.project_status, &raw, &["project_status", "Project Status"])
        .and_then(|s| s.parse::<ProjectStatus>().ok());
    let completion = pick(&row.completion_date, &raw, &["completion_date", "Completion Date"]);
    let amount = pick(&row.contract_amount, &raw, &["contract_amount", "Contract Amount"]);
    Some(Project {
        full_code: project_full_code(&codes),
        code: codes.code,
        sub_code: codes.sub_code,
        name: pick(&row.project_name, &raw, &["project_name", "Project Name"]).unwrap_or_default(),
        status,
        status_label: status.map(|s| s.label().to_string()),
        completion_date: parse_date_opt(completion.as_deref()).map(|d| d.date()),
        contract_amount: to_number(amount.as_deref()),
        updated_at: None,
    })
}

pub fn normalize_activity(row: &RawActivityRow, index: usize) -> Activity {
    let raw = RawFields::parse(row.raw.as_deref());
    let num = |top: &Option<String>, keys: &[&str]| to_number(pick(top, &raw, keys).as_deref());
    // A placeholder zone ref ("0", "Enabling Division") defers to the zone number.
    let zone = normalize_zone(pick(&row.zone_ref, &raw, &["zone_ref", "Zone Ref", "Zone"]).as_deref())
        .or_else(|| {
            normalize_zone(pick(&row.zone_number, &raw, &["zone_number", "Zone Number"]).as_deref())
        });
    Activity {
        id: clean_text(row.id.as_deref()).unwrap_or_else(|| format!("activity-{}", index + 1)),
        codes: record_codes(&row.project_code, &row.project_sub_code, &row.project_full_code, &raw),
        name: pick(&row.activity_name, &raw, &["activity_name", "Activity Name", "Activity"])
            .unwrap_or_default(),
        unit: pick(&row.unit, &raw, &["unit", "Unit"]).unwrap_or_default(),
        zone,
        total_units: num(&row.total_units, &["total_units", "Total Units"]),
        planned_units: num(&row.planned_units, &["planned_units", "Planned Units"]),
        actual_units: num(&row.actual_units, &["actual_units", "Actual Units"]),
        rate: num(&row.rate, &["rate", "Rate"]),
        total_value: num(&row.total_value, &["total_value", "Total Value"]),
    }
}

pub fn normalize_kpi(row: &RawKpiRow, index: usize) -> KpiRecord {
    let raw = RawFields::parse(row.raw.as_deref());
    let date = |top: &Option<String>, keys: &[&str]| parse_date_opt(pick(top, &raw, keys).as_deref());
    KpiRecord {
        id: clean_text(row.id.as_deref()).unwrap_or_else(|| format!("kpi-{}", index + 1)),
        codes: record_codes(&row.project_code, &row.project_sub_code, &row.project_full_code, &raw),
        input_type: pick(&row.input_type, &raw, &["input_type", "Input Type"])
            .and_then(|s| s.parse::<InputType>().ok()),
        activity_name: pick(&row.activity_name, &raw, &["activity_name", "Activity Name", "Activity"])
            .unwrap_or_default(),
        quantity: to_number(pick(&row.quantity, &raw, &["quantity", "Quantity"]).as_deref()),
        value: to_number(pick(&row.value, &raw, &["value", "Value"]).as_deref()),
        date: date(&row.date, &["date", "Date"]),
        target_date: date(&row.target_date, &["target_date", "Target Date"]),
        activity_date: date(&row.activity_date, &["activity_date", "Activity Date"]),
        actual_date: date(&row.actual_date, &["actual_date", "Actual Date"]),
        created_at: date(&row.created_at, &["created_at"]),
        zone: normalize_zone(pick(&row.zone, &raw, &["zone", "Zone"]).as_deref()),
        timing: pick(&row.activity_timing, &raw, &["activity_timing", "Activity Timing"])
            .map(|s| ActivityTiming::parse(&s))
            .unwrap_or_default(),
    }
}

/// Deserialize every row of a CSV stream, counting (and skipping) the rows
/// that do not fit `T`.
pub fn read_rows<T, R>(reader: R, label: &str) -> Result<(Vec<T>, usize), LoadError>
where
    T: DeserializeOwned,
    R: Read,
{
    let mut rdr = ReaderBuilder::new().flexible(true).from_reader(reader);
    let mut rows = Vec::new();
    let mut errors = 0usize;
    for result in rdr.deserialize::<T>() {
        match result {
            Ok(row) => rows.push(row),
            Err(e) if e.is_io_error() => {
                return Err(LoadError::Csv {
                    path: label.to_string(),
                    source: e,
                })
            }
            Err(e) => {
                errors += 1;
                debug!(file = label, error = %e, "skipping malformed row");
            }
        }
    }
    Ok((rows, errors))
}

fn read_file<T: DeserializeOwned>(path: &Path) -> Result<(Vec<T>, usize), LoadError> {
    let label = path.display().to_string();
    let file = std::fs::File::open(path).map_err(|source| LoadError::Io {
        path: label.clone(),
        source,
    })?;
    read_rows(file, &label)
}

/// Load the three exports into a [`MemoryStore`].
pub fn load_store(
    projects_path: &Path,
    activities_path: &Path,
    kpis_path: &Path,
) -> Result<(MemoryStore, LoadReport), LoadError> {
    let mut report = LoadReport::default();

    let (raw_projects, errors) = read_file::<RawProjectRow>(projects_path)?;
    report.parse_errors += errors;
    let mut projects = Vec::with_capacity(raw_projects.len());
    for row in &raw_projects {
        match normalize_project(row) {
            Some(p) => projects.push(p),
            None => report.skipped_projects += 1,
        }
    }

    let (raw_activities, errors) = read_file::<RawActivityRow>(activities_path)?;
    report.parse_errors += errors;
    let activities: Vec<Activity> = raw_activities
        .iter()
        .enumerate()
        .map(|(i, row)| normalize_activity(row, i))
        .collect();

    let (raw_kpis, errors) = read_file::<RawKpiRow>(kpis_path)?;
    report.parse_errors += errors;
    let kpis: Vec<KpiRecord> = raw_kpis
        .iter()
        .enumerate()
        .map(|(i, row)| normalize_kpi(row, i))
        .collect();

    report.undated_kpis = kpis
        .iter()
        .filter(|k| crate::aggregate::kpi_date(k).is_none())
        .count();
    report.untyped_kpis = kpis.iter().filter(|k| k.input_type.is_none()).count();
    report.projects = projects.len();
    report.activities = activities.len();
    report.kpis = kpis.len();

    if report.skipped_projects > 0 {
        warn!(skipped = report.skipped_projects, "projects without a project code were skipped");
    }
    info!(
        projects = report.projects,
        activities = report.activities,
        kpis = report.kpis,
        parse_errors = report.parse_errors,
        "exports loaded"
    );
    Ok((MemoryStore::new(projects, activities, kpis), report))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::ProjectStore;
    use chrono::NaiveDate;
    use std::fs;

    #[test]
    fn title_case_headers_and_raw_json_are_collapsed() {
        let csv = "\
Project Code,Project Sub Code,Activity Name,Zone Ref,Total Units,Rate,raw
P5066,I1,Piling,P5066-I1 - Block A,\"1,200\",15.5,
,,Rebar,,,,\"{\"\"Project Code\"\": \"\"P5066\"\", \"\"project_sub_code\"\": \"\"I2\"\", \"\"Total Units\"\": 40}\"
";
        let (rows, errors) = read_rows::<RawActivityRow, _>(csv.as_bytes(), "activities").unwrap();
        assert_eq!(errors, 0);
        let a = normalize_activity(&rows[0], 0);
        assert_eq!(a.codes.code, "P5066");
        assert_eq!(a.codes.sub_code, "I1");
        assert_eq!(a.zone.as_deref(), Some("P5066-I1 - Block A"));
        assert_eq!(a.total_units, 1200.0);
        assert_eq!(a.rate, 15.5);
        assert_eq!(a.id, "activity-1");

        let b = normalize_activity(&rows[1], 1);
        assert_eq!(b.codes.code, "P5066");
        assert_eq!(b.codes.sub_code, "I2");
        assert_eq!(b.total_units, 40.0);
        assert_eq!(b.zone, None);
    }

    #[test]
    fn placeholder_zone_ref_falls_back_to_zone_number() {
        let row = RawActivityRow {
            activity_name: Some("Paving".into()),
            zone_ref: Some("0".into()),
            zone_number: Some("Z2".into()),
            ..Default::default()
        };
        assert_eq!(normalize_activity(&row, 0).zone.as_deref(), Some("Z2"));

        let row = RawActivityRow {
            zone_ref: Some("Enabling Division".into()),
            raw: Some(r#"{"Zone Number": "Z3"}"#.into()),
            ..Default::default()
        };
        assert_eq!(normalize_activity(&row, 0).zone.as_deref(), Some("Z3"));

        let row = RawActivityRow {
            zone_ref: Some("Block A".into()),
            zone_number: Some("Z2".into()),
            ..Default::default()
        };
        assert_eq!(normalize_activity(&row, 0).zone.as_deref(), Some("Block A"));
    }

    #[test]
    fn top_level_values_win_over_raw() {
        let row = RawKpiRow {
            project_full_code: Some("P1-A".into()),
            quantity: Some("5".into()),
            raw: Some(r#"{"Project Full Code": "P1-B", "Quantity": "9", "Input Type": "Actual"}"#.into()),
            ..Default::default()
        };
        let k = normalize_kpi(&row, 0);
        assert_eq!(k.codes.full_code, "P1-A");
        assert_eq!(k.quantity, 5.0);
        assert_eq!(k.input_type, Some(InputType::Actual));
    }

    #[test]
    fn kpi_fields_are_coerced() {
        let row = RawKpiRow {
            input_type: Some(" planned ".into()),
            quantity: Some("1,500.25".into()),
            value: Some("n/a".into()),
            target_date: Some("23-Feb-24".into()),
            zone: Some("Enabling Division".into()),
            activity_timing: Some("Post-Commencement".into()),
            raw: Some("not json".into()),
            ..Default::default()
        };
        let k = normalize_kpi(&row, 4);
        assert_eq!(k.id, "kpi-5");
        assert_eq!(k.input_type, Some(InputType::Planned));
        assert_eq!(k.quantity, 1500.25);
        assert_eq!(k.value, 0.0);
        assert_eq!(
            k.target_date.map(|d| d.date()),
            NaiveDate::from_ymd_opt(2024, 2, 23)
        );
        assert_eq!(k.zone, None);
        assert_eq!(k.timing, ActivityTiming::PostCommencement);
    }

    #[test]
    fn projects_get_canonical_full_codes_and_statuses() {
        let row = RawProjectRow {
            project_code: Some(" P5066 ".into()),
            project_sub_code: Some("-I1".into()),
            project_status: Some("On Hold".into()),
            completion_date: Some("30/06/2024".into()),
            contract_amount: Some("2,500,000".into()),
            ..Default::default()
        };
        let p = normalize_project(&row).unwrap();
        assert_eq!(p.full_code, "P5066-I1");
        assert_eq!(p.status, Some(ProjectStatus::OnHold));
        assert_eq!(p.status_label.as_deref(), Some("On Hold"));
        assert_eq!(p.completion_date, NaiveDate::from_ymd_opt(2024, 6, 30));
        assert_eq!(p.contract_amount, 2_500_000.0);

        assert!(normalize_project(&RawProjectRow::default()).is_none());
    }

    #[test]
    fn loads_all_three_exports_from_disk() {
        let dir = tempfile::tempdir().unwrap();
        let projects = dir.path().join("projects.csv");
        let activities = dir.path().join("activities.csv");
        let kpis = dir.path().join("kpis.csv");
        fs::write(
            &projects,
            "project_code,project_sub_code,project_name\nP5066,I1,North\nP5066,I2,South\n,,Orphan\n",
        )
        .unwrap();
        fs::write(
            &activities,
            "id,project_full_code,activity_name,unit,total_units\na1,P5066-I1,Piling,m,100\n",
        )
        .unwrap();
        fs::write(
            &kpis,
            "Project Full Code,Input Type,Activity Name,Quantity,Actual Date\nP5066-I1,Actual,Piling,10,2024-01-05\nP5066-I1,Bogus,Piling,1,\n",
        )
        .unwrap();

        let (store, report) = load_store(&projects, &activities, &kpis).unwrap();
        assert_eq!(report.projects, 2);
        assert_eq!(report.skipped_projects, 1);
        assert_eq!(report.activities, 1);
        assert_eq!(report.kpis, 2);
        assert_eq!(report.untyped_kpis, 1);
        assert_eq!(report.undated_kpis, 1);
        assert_eq!(store.fetch_projects().unwrap()[1].full_code, "P5066-I2");
        assert_eq!(store.fetch_activities().unwrap()[0].id, "a1");
    }

    #[test]
    fn missing_file_is_an_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("nope.csv");
        let err = load_store(&missing, &missing, &missing).unwrap_err();
        assert!(matches!(err, LoadError::Io { .. }));
    }
}
