use crate::classify::DebugFilter;
use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize, Serializer};
use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use time::macros::format_description;
use time::Date;

pub const FILENAME: &str = "convotally.toml";

/// Overrides `auth_token` from the config file when set.
pub const AUTH_TOKEN_ENV: &str = "CONVOTALLY_AUTH_TOKEN";

const DEFAULT_BASE_URL: &str = "https://api.voiceflow.com/v2/transcripts";

// ===================================================================
// DateRange
// ===================================================================

/// Inclusive `start..=end` calendar date range for a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DateRange {
    pub start: Date,
    pub end: Date,
}

fn date_label(d: Date) -> String {
    format!("{:04}-{:02}-{:02}", d.year(), u8::from(d.month()), d.day())
}

/// Parse a `YYYY-MM-DD` date.
pub fn parse_date(s: &str) -> Result<Date> {
    Date::parse(s.trim(), format_description!("[year]-[month]-[day]"))
        .with_context(|| format!("invalid date {s:?} (expected YYYY-MM-DD)"))
}

impl DateRange {
    pub fn new(start: Date, end: Date) -> Result<Self> {
        if start > end {
            bail!(
                "start date {} is after end date {}",
                date_label(start),
                date_label(end)
            );
        }
        Ok(Self { start, end })
    }

    pub fn parse(start: &str, end: &str) -> Result<Self> {
        Self::new(parse_date(start)?, parse_date(end)?)
    }

    pub fn start_label(&self) -> String {
        date_label(self.start)
    }

    pub fn end_label(&self) -> String {
        date_label(self.end)
    }
}

impl fmt::Display for DateRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} - {}", self.start_label(), self.end_label())
    }
}

impl Serialize for DateRange {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        #[derive(Serialize)]
        struct Labels {
            start: String,
            end: String,
        }
        Labels {
            start: self.start_label(),
            end: self.end_label(),
        }
        .serialize(serializer)
    }
}

// ===================================================================
// Report template
// ===================================================================

/// Report text template: either an inline minijinja string or a path to a
/// template file (relative to the config file's directory).
///
/// ```toml
/// [report]
/// template = { inline = "{{ title }}: {{ total_categorizations }}" }
///
/// # or
///
/// [report]
/// template = { file = "report.tmpl" }
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "snake_case")]
pub enum ReportTemplate {
    Inline(String),
    File(String),
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ReportSettings {
    /// Defaults to `REPORT [<start> - <end>]`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub template: Option<ReportTemplate>,
}

// ===================================================================
// Config
// ===================================================================

/// Run configuration, read from `convotally.toml`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// API key sent verbatim in the `Authorization` header.
    #[serde(default)]
    pub auth_token: String,

    pub project_id: String,

    /// `YYYY-MM-DD`
    pub start_date: String,

    /// `YYYY-MM-DD`
    pub end_date: String,

    /// Where transcripts and reports are written. Defaults to
    /// `"<start_date> to <end_date>"`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_directory: Option<String>,

    /// Category names to count, in report tiebreak order.
    #[serde(default)]
    pub categories: Vec<String>,

    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Max concurrent transcript fetches.
    #[serde(default = "default_workers")]
    pub workers: usize,

    /// Per-request timeout.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    #[serde(default)]
    pub classifier: DebugFilter,

    #[serde(default)]
    pub report: ReportSettings,

    /// Directory the config was loaded from; template files resolve
    /// against it.
    #[serde(skip)]
    pub base_dir: PathBuf,
}

fn default_base_url() -> String {
    DEFAULT_BASE_URL.into()
}

fn default_workers() -> usize {
    4
}

fn default_timeout_secs() -> u64 {
    30
}

impl Default for Config {
    fn default() -> Self {
        Self {
            auth_token: String::new(),
            project_id: String::new(),
            start_date: "2024-07-14".into(),
            end_date: "2024-08-07".into(),
            output_directory: None,
            categories: Vec::new(),
            base_url: default_base_url(),
            workers: default_workers(),
            timeout_secs: default_timeout_secs(),
            classifier: DebugFilter::default(),
            report: ReportSettings::default(),
            base_dir: PathBuf::new(),
        }
    }
}

impl Config {
    /// Parse a config file without validating it, so command-line
    /// overrides can be applied first. `CONVOTALLY_AUTH_TOKEN`, when set,
    /// replaces `auth_token`.
    pub fn read(path: &Path) -> Result<Self> {
        let contents = match fs::read_to_string(path) {
            Ok(c) => c,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                bail!(
                    "config file {} not found (run `convotally init` to create one)",
                    path.display()
                )
            }
            Err(e) => return Err(e).with_context(|| format!("reading {}", path.display())),
        };
        let mut config: Config = toml::from_str(&contents)
            .with_context(|| format!("parsing {}", path.display()))?;
        if let Ok(token) = std::env::var(AUTH_TOKEN_ENV) {
            config.auth_token = token;
        }
        config.base_dir = path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_default();
        Ok(config)
    }

    /// Write a starter config to `path`. Refuses to overwrite.
    pub fn write_default(path: &Path) -> Result<()> {
        if path.exists() {
            bail!("{} already exists", path.display());
        }
        let config = Config {
            project_id: "[INSERT PROJECT ID]".into(),
            auth_token: "[INSERT API KEY]".into(),
            categories: vec!["Greeting".into(), "Billing".into()],
            ..Default::default()
        };
        let toml_str =
            toml::to_string_pretty(&config).context("serializing default config")?;
        fs::write(path, toml_str).with_context(|| format!("writing {}", path.display()))
    }

    /// Structural checks that don't need the network.
    pub fn validate(&self) -> Result<()> {
        self.date_range()?;
        if self.project_id.trim().is_empty() {
            bail!("project_id is empty");
        }
        if self.workers == 0 {
            bail!("workers must be at least 1");
        }
        if let Some(name) = self.categories.iter().find(|c| c.trim().is_empty()) {
            bail!("category names must not be empty (got {name:?})");
        }
        Ok(())
    }

    pub fn date_range(&self) -> Result<DateRange> {
        DateRange::parse(&self.start_date, &self.end_date)
    }

    pub fn output_dir(&self) -> PathBuf {
        match &self.output_directory {
            Some(dir) => self.base_dir.join(dir),
            None => self
                .base_dir
                .join(format!("{} to {}", self.start_date, self.end_date)),
        }
    }

    pub fn report_title(&self, range: &DateRange) -> String {
        self.report
            .title
            .clone()
            .unwrap_or_else(|| crate::report::default_title(range))
    }

    /// Resolve the report template to its source text.
    pub fn load_report_template(&self) -> Result<String> {
        match &self.report.template {
            None => Ok(crate::report::DEFAULT_TEMPLATE.to_string()),
            Some(ReportTemplate::Inline(s)) => Ok(s.clone()),
            Some(ReportTemplate::File(rel)) => {
                let path = self.base_dir.join(rel);
                fs::read_to_string(&path)
                    .with_context(|| format!("reading template {}", path.display()))
            }
        }
    }
}
