use crate::config::DateRange;
use crate::tally::CategoryTally;
use anyhow::{Context, Result};
use minijinja::{context, Environment};
use serde::Serialize;

/// Built-in plain-text report layout. Overridable via `[report] template`.
pub const DEFAULT_TEMPLATE: &str = "\
{{ title }}

Total human messages: {{ human_count }}

{% for row in rows -%}
{{ row.name }}: {{ row.count }} ({{ row.percent }})
{% endfor %}
Total categorizations: {{ total_categorizations }}
";

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CategoryRow {
    pub name: String,
    pub count: u64,
    /// Share of all categorizations, in `0.0..=1.0`. Zero when nothing was
    /// categorized.
    pub percentage: f64,
}

/// The per-run analytics result handed to writers.
#[derive(Debug, Clone, Serialize)]
pub struct ReportModel {
    pub title: String,
    pub date_range: DateRange,
    pub human_count: u64,
    pub total_categorizations: u64,
    /// Sorted by count, descending; ties keep configured order.
    pub rows: Vec<CategoryRow>,
}

/// Title used when the config doesn't set one.
pub fn default_title(range: &DateRange) -> String {
    format!("REPORT [{range}]")
}

/// Row shape exposed to templates, with a pre-formatted percentage.
#[derive(Serialize)]
struct RowView<'a> {
    name: &'a str,
    count: u64,
    percent: String,
}

impl ReportModel {
    pub fn aggregate(
        title: String,
        date_range: DateRange,
        human_count: u64,
        tally: &CategoryTally,
    ) -> Self {
        let total = tally.total();
        let mut rows: Vec<CategoryRow> = tally
            .iter()
            .map(|(name, count)| CategoryRow {
                name: name.to_string(),
                count,
                percentage: if total == 0 {
                    0.0
                } else {
                    count as f64 / total as f64
                },
            })
            .collect();
        // sort_by is stable, so equal counts stay in configured order.
        rows.sort_by(|a, b| b.count.cmp(&a.count));

        Self {
            title,
            date_range,
            human_count,
            total_categorizations: total,
            rows,
        }
    }

    /// Render the report through a minijinja template.
    ///
    /// Available variables: `title`, `start_date`, `end_date`,
    /// `human_count`, `total_categorizations`, and `rows` (each with
    /// `name`, `count`, `percent`).
    pub fn render(&self, template: &str) -> Result<String> {
        let env = Environment::new();
        let tmpl = env
            .template_from_str(template)
            .context("parsing report template")?;
        let rows: Vec<RowView> = self
            .rows
            .iter()
            .map(|r| RowView {
                name: &r.name,
                count: r.count,
                percent: format!("{:.1}%", r.percentage * 100.0),
            })
            .collect();
        tmpl.render(context! {
            title => &self.title,
            start_date => self.date_range.start_label(),
            end_date => self.date_range.end_label(),
            human_count => self.human_count,
            total_categorizations => self.total_categorizations,
            rows => rows,
        })
        .context("rendering report template")
    }
}
