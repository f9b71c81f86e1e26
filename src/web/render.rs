//! HTML fragments for the dashboard. Everything user-supplied goes through
//! [`escape`] before it is spliced into markup.

use crate::data::{ColumnSummary, PredictionResult, SensorTable, REQUIRED_FEATURES};
use crate::error::ClientError;

const PAGE_TEMPLATE: &str = include_str!("../../static/dashboard.html");
const PREVIEW_ROWS: usize = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Upload,
    Manual,
}

impl Mode {
    pub fn parse(raw: Option<&str>) -> Self {
        match raw {
            Some("manual") => Mode::Manual,
            _ => Mode::Upload,
        }
    }
}

pub fn escape(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for ch in raw.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(ch),
        }
    }
    out
}

pub fn page(mode: Mode, content: &str, model_line: &str) -> String {
    PAGE_TEMPLATE
        .replace("{{sidebar}}", &sidebar(mode, model_line))
        .replace("{{content}}", content)
}

fn sidebar(mode: Mode, model_line: &str) -> String {
    let option = |target: Mode, href: &str, label: &str| {
        let class = if target == mode { "option active" } else { "option" };
        format!(r#"<a class="{class}" href="{href}">{label}</a>"#)
    };

    format!(
        r#"<h2>⚙️ Options</h2>
<p class="caption">Input Method</p>
{}
{}
<p class="model-line">{}</p>"#,
        option(Mode::Upload, "/?mode=upload", "Upload Log File"),
        option(Mode::Manual, "/?mode=manual", "Manual Sensor Input"),
        escape(model_line)
    )
}

pub fn upload_panel(engine_id: i64) -> String {
    format!(
        r#"<div class="info">CSV must contain these {count} columns:<br><br>{columns}</div>
<form method="post" action="/upload" enctype="multipart/form-data">
  <label>Engine ID <input type="number" name="engine_id" min="1" step="1" value="{engine_id}" required></label>
  <label>Upload Sensor Log (CSV or TXT) <input type="file" name="file" accept=".csv,.txt" required></label>
  <button type="submit">Predict RUL 🚀</button>
</form>"#,
        count = REQUIRED_FEATURES.len(),
        columns = REQUIRED_FEATURES.join(", "),
    )
}

pub fn manual_panel(engine_id: i64, values: &[f64]) -> String {
    let mut columns = vec![String::new(), String::new(), String::new()];
    for (idx, feature) in REQUIRED_FEATURES.iter().enumerate() {
        let value = values.get(idx).copied().unwrap_or(0.0);
        columns[idx % 3].push_str(&format!(
            r#"<label>{feature} <input type="number" name="{feature}" step="0.001" value="{value:.3}"></label>"#
        ));
    }

    format!(
        r#"<div class="info">Enter all feature values manually.</div>
<form method="post" action="/manual">
  <label>Engine ID <input type="number" name="engine_id" min="1" step="1" value="{engine_id}" required></label>
  <div class="grid"><div>{}</div><div>{}</div><div>{}</div></div>
  <button type="submit">Predict RUL 🚀</button>
</form>"#,
        columns[0], columns[1], columns[2]
    )
}

pub fn preview(file_name: &str, table: &SensorTable) -> String {
    let header: String = table
        .columns()
        .iter()
        .map(|c| format!("<th>{}</th>", escape(c)))
        .collect();
    let body: String = table
        .head(PREVIEW_ROWS)
        .iter()
        .map(|row| {
            let cells: String = row.iter().map(|v| format!("<td>{}</td>", v)).collect();
            format!("<tr>{}</tr>", cells)
        })
        .collect();

    format!(
        r#"<h3>{} ({} rows)</h3>
<div class="dataframe"><table><thead><tr>{}</tr></thead><tbody>{}</tbody></table></div>
{}"#,
        escape(file_name),
        table.len(),
        header,
        body,
        summary(&table.summarize(&REQUIRED_FEATURES))
    )
}

fn summary(columns: &[ColumnSummary]) -> String {
    if columns.is_empty() {
        return String::new();
    }

    let rows: String = columns
        .iter()
        .map(|c| {
            format!(
                "<tr><td>{}</td><td>{:.3}</td><td>{:.3}</td><td>{:.3}</td><td>{:.3}</td></tr>",
                escape(&c.name),
                c.mean,
                c.std_dev,
                c.min,
                c.max
            )
        })
        .collect();

    format!(
        r#"<details><summary>Feature summary</summary>
<div class="dataframe"><table><thead><tr><th>feature</th><th>mean</th><th>std</th><th>min</th><th>max</th></tr></thead><tbody>{}</tbody></table></div>
</details>"#,
        rows
    )
}

pub fn outcome(result: &Result<PredictionResult, ClientError>) -> String {
    match result {
        Ok(prediction) => success(prediction.predicted_rul),
        Err(e) => failure(&e.to_string()),
    }
}

pub fn success(rul: f64) -> String {
    format!(
        r#"<div class="success">✅ Predicted RUL: {:.2} cycles</div>"#,
        rul
    )
}

pub fn failure(detail: &str) -> String {
    format!(r#"<div class="error">❌ API Error: {}</div>"#, escape(detail))
}

pub fn warning(message: &str) -> String {
    format!(r#"<div class="warning">{}</div>"#, escape(message))
}
