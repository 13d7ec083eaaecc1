//! Backup documents: `{tasks, stats, exportDate, version}`.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, instrument};

use crate::error::{Error, Result};
use crate::stats::Stats;
use crate::task::Task;

pub const EXPORT_VERSION: &str = "v4";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportDocument {
    pub tasks: Vec<Task>,
    #[serde(default)]
    pub stats: Stats,
    #[serde(default = "default_export_date")]
    pub export_date: DateTime<Utc>,
    #[serde(default = "default_version")]
    pub version: String,
}

fn default_export_date() -> DateTime<Utc> {
    DateTime::<Utc>::default()
}

fn default_version() -> String {
    EXPORT_VERSION.to_string()
}

impl ExportDocument {
    pub fn new(tasks: &[Task], stats: Stats, now: DateTime<Utc>) -> Self {
        Self {
            tasks: tasks.to_vec(),
            stats,
            export_date: now,
            version: EXPORT_VERSION.to_string(),
        }
    }

    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self)
            .map_err(|err| Error::persistence(format!("failed encoding export: {err}")))
    }
}

pub fn default_file_name(today: NaiveDate) -> String {
    format!("edf-scheduler-backup-{}.json", today.format("%Y-%m-%d"))
}

/// Parses an import document. Fails without side effects when the text is
/// not JSON, is not an object, or has no `tasks` array.
#[instrument(skip(raw), fields(bytes = raw.len()))]
pub fn parse_import(raw: &str) -> Result<ExportDocument> {
    let value: Value = serde_json::from_str(raw.trim())
        .map_err(|err| Error::ImportFormat(format!("not valid JSON: {err}")))?;

    let Some(object) = value.as_object() else {
        return Err(Error::ImportFormat("expected a JSON object".into()));
    };
    match object.get("tasks") {
        Some(Value::Array(_)) => {}
        Some(_) => return Err(Error::ImportFormat("`tasks` must be an array".into())),
        None => return Err(Error::ImportFormat("missing `tasks`".into())),
    }
    if object.get("stats").is_some_and(Value::is_null) {
        let mut object = object.clone();
        object.remove("stats");
        return decode_document(Value::Object(object));
    }

    decode_document(value)
}

fn decode_document(value: Value) -> Result<ExportDocument> {
    let doc: ExportDocument = serde_json::from_value(value)
        .map_err(|err| Error::ImportFormat(format!("invalid document: {err}")))?;
    debug!(tasks = doc.tasks.len(), version = %doc.version, "parsed import document");
    Ok(doc)
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;
    use crate::task::Interval;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 9, 12, 0, 0).single().expect("valid now")
    }

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).expect("valid date")
    }

    #[test]
    fn export_then_import_preserves_state() {
        let tasks = vec![
            Task::new_fixed(1, "Pay rent".into(), date(2024, 1, 10), now()),
            Task::new_recurring(2, "Stretch".into(), Interval::Weekly, date(2024, 1, 9), now()),
        ];
        let stats = Stats {
            completed_on_time: 3,
            deleted_or_expired: 1,
            total_finished: 4,
        };

        let raw = ExportDocument::new(&tasks, stats, now()).to_json().expect("export");
        let doc = parse_import(&raw).expect("import");

        assert_eq!(doc.tasks, tasks);
        assert_eq!(doc.stats, stats);
        assert_eq!(doc.version, EXPORT_VERSION);
        assert_eq!(
            serde_json::to_string(&doc.tasks).expect("encode"),
            serde_json::to_string(&tasks).expect("encode")
        );
    }

    #[test]
    fn missing_stats_default_to_zero() {
        let doc = parse_import(r#"{"tasks":[]}"#).expect("import");
        assert_eq!(doc.stats, Stats::default());

        let doc = parse_import(r#"{"tasks":[],"stats":null}"#).expect("import");
        assert_eq!(doc.stats, Stats::default());
    }

    #[test]
    fn rejects_malformed_documents() {
        for raw in ["not json", "[]", r#"{"stats":{}}"#, r#"{"tasks":{}}"#, r#"{"tasks":[{"id":1}]}"#] {
            assert!(
                matches!(parse_import(raw), Err(Error::ImportFormat(_))),
                "expected import error for {raw}"
            );
        }
    }

    #[test]
    fn backup_file_name_uses_date() {
        assert_eq!(default_file_name(date(2024, 1, 9)), "edf-scheduler-backup-2024-01-09.json");
    }
}
