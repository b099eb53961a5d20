/*!
 * Terminal output for the `rsconnect` binary
 *
 * Status lines, deployment tables and size formatting. Library code logs
 * through `tracing` and never prints.
 */

use std::fmt::Display;
use std::time::Duration;

use comfy_table::{presets, Attribute, Cell, Color, ContentArrangement, Table};
use console::style;
use rsconnect_core_manifest::{AppMode, ManifestDiff};

use crate::api::TaskState;
use crate::core::manifest_builder::ContentFile;
use crate::deploy::DeploymentResult;
use crate::error::RsconnectError;
use crate::metadata::{AppRecord, TaskRecord};

/// Kind of a one-line status message
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    Success,
    Info,
    Warning,
    Error,
}

impl Status {
    fn icon(self) -> &'static str {
        match self {
            Status::Success => "✓",
            Status::Info => "ℹ",
            Status::Warning => "⚠",
            Status::Error => "✗",
        }
    }

    /// `text` in this status's color
    pub fn paint<D: Display>(self, text: D) -> String {
        let styled = style(text);
        match self {
            Status::Success => styled.green(),
            Status::Info => styled.cyan(),
            Status::Warning => styled.yellow(),
            Status::Error => styled.red(),
        }
        .to_string()
    }

    /// Icon followed by the message
    pub fn line(self, message: &str) -> String {
        format!("{} {}", self.paint(self.icon()), message)
    }
}

pub fn print_success(message: &str) {
    println!("{}", Status::Success.line(message));
}

pub fn print_info(message: &str) {
    println!("{}", Status::Info.line(message));
}

pub fn print_warning(message: &str) {
    eprintln!("{}", Status::Warning.line(message));
}

/// Error line plus one dimmed line per hint line
pub fn print_error(message: &str, hint: Option<&str>) {
    eprintln!("\n{}", Status::Error.line(&format!("Error: {}", message)));
    for line in hint.into_iter().flat_map(str::lines) {
        eprintln!("  {}", style(format!("→ {}", line)).dim());
    }
    eprintln!();
}

/// Icon and colored label for a task state
pub fn task_state_label(state: TaskState) -> String {
    match state {
        TaskState::Pending => style(format!("○ {}", state)).dim().to_string(),
        TaskState::Running => Status::Info.paint(format!("◐ {}", state)),
        TaskState::Success => Status::Success.paint(format!("✓ {}", state)),
        TaskState::Error => Status::Error.paint(format!("✗ {}", state)),
        TaskState::Aborted => Status::Warning.paint(format!("⊘ {}", state)),
    }
}

pub fn section_header(title: &str) {
    println!("\n{}", style(title).cyan().bold());
}

/// `+`, `-` and `~` lines for a manifest about to be replaced
pub fn manifest_diff_lines(diff: &ManifestDiff) -> Vec<String> {
    let marked = |status: Status, mark: &str, paths: &[String]| {
        paths
            .iter()
            .map(|path| format!("{} {}", status.paint(mark), path))
            .collect::<Vec<_>>()
    };
    let mut lines = marked(Status::Success, "+", &diff.added);
    lines.extend(marked(Status::Error, "-", &diff.removed));
    lines.extend(marked(Status::Warning, "~", &diff.changed));
    if diff.metadata_changed {
        lines.push(format!("{} metadata", Status::Warning.paint("~")));
    }
    lines
}

fn bordered_table(header: &[&str]) -> Table {
    let mut table = Table::new();
    table
        .load_preset(presets::UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(
            header
                .iter()
                .map(|title| Cell::new(title).add_attribute(Attribute::Bold)),
        );
    table
}

/// Borderless label/value table
pub fn key_value_table(items: &[(&str, String)]) -> Table {
    let mut table = Table::new();
    table
        .load_preset(presets::UTF8_NO_BORDERS)
        .set_content_arrangement(ContentArrangement::Dynamic);
    for (key, value) in items {
        table.add_row(vec![
            Cell::new(key).fg(Color::Cyan),
            Cell::new(value).add_attribute(Attribute::Bold),
        ]);
    }
    table
}

/// Bundle payload files with their sizes and checksums
pub fn file_table(files: &[ContentFile]) -> Table {
    let mut table = bordered_table(&["Path", "Size", "MD5"]);
    for file in files {
        table.add_row(vec![
            Cell::new(&file.path),
            Cell::new(format_bytes(file.size)),
            Cell::new(&file.checksum).fg(Color::DarkGrey),
        ]);
    }
    table
}

/// Summary printed after a deployment finishes
pub fn deployment_summary_table(result: &DeploymentResult) -> Table {
    let mut items = vec![
        ("Status", task_state_label(result.status)),
        ("Task", result.task_id.clone()),
    ];
    if let Some(url) = &result.content_url {
        items.push(("Content URL", url.clone()));
    }
    if let Some(url) = &result.dashboard_url {
        items.push(("Dashboard", url.clone()));
    }
    items.push(("Elapsed", format_elapsed(result.elapsed)));
    items.push(("Polls", result.polls.to_string()));
    key_value_table(&items)
}

/// One row per directory of a `deploy-many` run, failures included
pub fn batch_results_table<'a, I>(rows: I) -> Table
where
    I: IntoIterator<Item = (String, &'a Result<DeploymentResult, RsconnectError>)>,
{
    let mut table = bordered_table(&["Directory", "Status", "URL or error"]);
    for (directory, result) in rows {
        match result {
            Ok(done) => table.add_row(vec![
                directory,
                task_state_label(done.status),
                done.content_url.clone().unwrap_or_default(),
            ]),
            Err(e) => table.add_row(vec![directory, Status::Error.paint("FAILED"), e.to_string()]),
        };
    }
    table
}

/// Saved deployment of a content directory, with its last known task
pub fn deployment_record_table(record: &AppRecord, task: Option<&TaskRecord>) -> Table {
    let kind = AppMode::from_name(&record.app_mode)
        .map(|mode| mode.description().to_string())
        .unwrap_or_else(|_| record.app_mode.clone());
    let mut items = vec![
        ("Server URL", record.server_url.clone()),
        ("App URL", record.app_url.clone()),
        ("App ID", record.app_id.clone()),
        ("App GUID", record.app_guid.clone()),
        ("Title", record.title.clone().unwrap_or_default()),
        ("Filename", record.filename.clone()),
        ("Type", kind),
    ];
    if let Some(task) = task {
        items.push(("Last task", format!("{} {}", task.task_id, task_state_label(task.state))));
        items.push(("Updated", task.updated_at.clone()));
    }
    key_value_table(&items)
}

/// Binary-prefixed size, whole bytes below 1 KiB
pub fn format_bytes(bytes: u64) -> String {
    const UNITS: [&str; 5] = ["KiB", "MiB", "GiB", "TiB", "PiB"];
    if bytes < 1024 {
        return format!("{} B", bytes);
    }
    let mut value = bytes as f64 / 1024.0;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    format!("{:.1} {}", value, UNITS[unit])
}

pub fn format_elapsed(elapsed: Duration) -> String {
    let secs = elapsed.as_secs();
    match secs {
        0 => format!("{}ms", elapsed.as_millis()),
        1..=59 => format!("{:.1}s", elapsed.as_secs_f64()),
        60..=3599 => format!("{}m {}s", secs / 60, secs % 60),
        _ => format!("{}h {}m", secs / 3600, secs % 3600 / 60),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record() -> AppRecord {
        AppRecord {
            server_url: "https://connect.example.com".to_string(),
            filename: "/srv/content/api".to_string(),
            app_url: "https://connect.example.com/content/g-1/".to_string(),
            app_id: "17".to_string(),
            app_guid: "g-1".to_string(),
            title: Some("Sales API".to_string()),
            app_mode: "python-api".to_string(),
            app_store_version: 1,
        }
    }

    #[test]
    fn test_format_bytes() {
        assert_eq!(format_bytes(0), "0 B");
        assert_eq!(format_bytes(1023), "1023 B");
        assert_eq!(format_bytes(1536), "1.5 KiB");
        assert_eq!(format_bytes(3 * 1024 * 1024), "3.0 MiB");
    }

    #[test]
    fn test_format_elapsed() {
        assert_eq!(format_elapsed(Duration::from_millis(250)), "250ms");
        assert_eq!(format_elapsed(Duration::from_millis(12_500)), "12.5s");
        assert_eq!(format_elapsed(Duration::from_secs(65)), "1m 5s");
        assert_eq!(format_elapsed(Duration::from_secs(3665)), "1h 1m");
    }

    #[test]
    fn test_summary_lists_urls() {
        let result = DeploymentResult {
            status: TaskState::Success,
            task_id: "task-1".to_string(),
            content_guid: Some("guid-1".to_string()),
            content_url: Some("https://connect.example.com/content/guid-1/".to_string()),
            dashboard_url: None,
            error: None,
            elapsed: Duration::from_secs(12),
            polls: 6,
            log_excerpt: Vec::new(),
        };
        let rendered = deployment_summary_table(&result).to_string();
        assert!(rendered.contains("https://connect.example.com/content/guid-1/"));
        assert!(rendered.contains("task-1"));
        assert!(!rendered.contains("Dashboard"));
    }

    #[test]
    fn test_batch_table_keeps_failures() {
        let failed: Result<DeploymentResult, RsconnectError> =
            Err(RsconnectError::Config("no server".to_string()));
        let rendered = batch_results_table(vec![("site-b".to_string(), &failed)]).to_string();
        assert!(rendered.contains("site-b"));
        assert!(rendered.contains("FAILED"));
        assert!(rendered.contains("no server"));
    }

    #[test]
    fn test_record_table_names_mode_and_task() {
        let task = TaskRecord {
            server_url: "https://connect.example.com".to_string(),
            task_id: "t-3".to_string(),
            state: TaskState::Error,
            updated_at: "2026-10-19T10:00:00+00:00".to_string(),
        };
        let rendered = deployment_record_table(&record(), Some(&task)).to_string();
        assert!(rendered.contains("Python API"));
        assert!(rendered.contains("Sales API"));
        assert!(rendered.contains("t-3"));
        assert!(rendered.contains("ERROR"));

        let bare = deployment_record_table(&record(), None).to_string();
        assert!(!bare.contains("Last task"));
    }

    #[test]
    fn test_unknown_mode_is_shown_raw() {
        let mut record = record();
        record.app_mode = "mystery-mode".to_string();
        let rendered = deployment_record_table(&record, None).to_string();
        assert!(rendered.contains("mystery-mode"));
    }

    #[test]
    fn test_manifest_diff_lines() {
        let diff = ManifestDiff {
            added: vec!["new.py".to_string()],
            removed: vec!["old.py".to_string()],
            changed: Vec::new(),
            metadata_changed: true,
        };
        let lines = manifest_diff_lines(&diff);
        assert_eq!(lines.len(), 3);
        assert!(lines[0].contains("new.py"));
        assert!(lines[1].contains("old.py"));
        assert!(lines[2].ends_with("metadata"));
    }
}
