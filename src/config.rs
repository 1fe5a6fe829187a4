use crate::dates::parse_date;
use chrono::{Local, NaiveDate, NaiveDateTime};
use serde::Deserialize;
use std::path::{Path, PathBuf};

const CONFIG_FILE: &str = "site_progress";
const ENV_PREFIX: &str = "SITE_PROGRESS";

#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    pub data: DataSettings,
    pub output: OutputSettings,
    /// Pins "today" (any format the date parser understands).
    #[serde(default)]
    pub as_of: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DataSettings {
    pub projects: PathBuf,
    pub activities: PathBuf,
    pub kpis: PathBuf,
}

#[derive(Debug, Clone, Deserialize)]
pub struct OutputSettings {
    pub dir: PathBuf,
    pub preview_rows: usize,
}

impl Settings {
    /// Reference "now": the pinned `as_of` date at the current time of day,
    /// or the local clock.
    pub fn now(&self) -> NaiveDateTime {
        let local = Local::now().naive_local();
        match self.as_of.as_deref().and_then(parse_date) {
            Some(pinned) => pinned.date().and_time(local.time()),
            None => local,
        }
    }

    pub fn today(&self) -> NaiveDate {
        self.now().date()
    }

    pub fn output_path(&self, file_name: &str) -> PathBuf {
        self.output.dir.join(file_name)
    }
}

/// Defaults, then `site_progress.{toml,yaml,json}` if present, then
/// `SITE_PROGRESS_*` variables (`__` separates nested keys).
pub fn read_config() -> Result<Settings, config::ConfigError> {
    build(None)
}

/// Same layering with an explicit settings file.
pub fn read_config_from(path: &Path) -> Result<Settings, config::ConfigError> {
    build(Some(path))
}

fn build(file: Option<&Path>) -> Result<Settings, config::ConfigError> {
    let file_source = match file {
        Some(path) => config::File::from(path).required(true),
        None => config::File::with_name(CONFIG_FILE).required(false),
    };
    let settings = config::Config::builder()
        .set_default("data.projects", "projects.csv")?
        .set_default("data.activities", "activities.csv")?
        .set_default("data.kpis", "kpis.csv")?
        .set_default("output.dir", ".")?
        .set_default("output.preview_rows", 3i64)?
        .add_source(file_source)
        .add_source(
            config::Environment::with_prefix(ENV_PREFIX)
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        )
        .build()?;

    settings.try_deserialize::<Settings>()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn file_values_override_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.toml");
        fs::write(
            &path,
            "as_of = \"2024-03-10\"\n[data]\nkpis = \"exports/kpi.csv\"\n[output]\npreview_rows = 5\n",
        )
        .unwrap();

        let settings = read_config_from(&path).unwrap();
        assert_eq!(settings.data.kpis, PathBuf::from("exports/kpi.csv"));
        assert_eq!(settings.data.projects, PathBuf::from("projects.csv"));
        assert_eq!(settings.output.preview_rows, 5);
        assert_eq!(settings.today(), NaiveDate::from_ymd_opt(2024, 3, 10).unwrap());
        assert_eq!(settings.output_path("summary.json"), PathBuf::from("./summary.json"));
    }

    #[test]
    fn unparseable_as_of_falls_back_to_clock() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.toml");
        fs::write(&path, "as_of = \"someday\"\n").unwrap();
        let settings = read_config_from(&path).unwrap();
        assert_eq!(settings.today(), Local::now().date_naive());
    }

    #[test]
    fn missing_explicit_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        assert!(read_config_from(&dir.path().join("absent.toml")).is_err());
    }
}
