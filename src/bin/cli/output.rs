//! Output formatting for CLI operations.

use serde_json::json;

use jarpatch::{Patch, Record, RecordKey, RecordType, ReplayReport};

/// Trait for output formatting
pub trait OutputFormatter {
    /// Formats the identifiers of a record type
    fn format_keys(&self, record_type: RecordType, keys: &[String]) -> String;

    /// Formats a single record
    fn format_record(&self, key: &RecordKey, record: &Record) -> String;

    /// Formats a freshly logged patch
    fn format_patch(&self, patch: &Patch) -> String;

    /// Formats a completed restore
    fn format_restored(&self, what: &str) -> String;

    /// Formats replay results
    fn format_replay(&self, report: &ReplayReport) -> String;

    /// Formats the patch log
    fn format_log(&self, patches: &[Patch]) -> String;
}

/// Human-readable output formatter
pub struct HumanFormatter;

impl OutputFormatter for HumanFormatter {
    fn format_keys(&self, record_type: RecordType, keys: &[String]) -> String {
        let mut output = String::new();
        output.push_str(&format!("{} records:\n", record_type));
        output.push_str(&"-".repeat(40));
        output.push('\n');
        for key in keys {
            output.push_str(&format!("  {}\n", key));
        }
        output.push_str(&"-".repeat(40));
        output.push('\n');
        output.push_str(&format!("{} records\n", keys.len()));
        output
    }

    fn format_record(&self, key: &RecordKey, record: &Record) -> String {
        let body = serde_json::to_string_pretty(record).unwrap_or_else(|_| "{}".to_string());
        format!("{}\n{}\n", key, body)
    }

    fn format_patch(&self, patch: &Patch) -> String {
        format!(
            "Saved {}:{}\n  Patch: {}\n  Base:  {}\n  Hash:  {}\n",
            patch.target.record_type,
            patch.target.key,
            patch.id,
            patch.target.base_hash,
            patch.hash
        )
    }

    fn format_restored(&self, what: &str) -> String {
        format!("Restored {}\n", what)
    }

    fn format_replay(&self, report: &ReplayReport) -> String {
        let mut output = String::new();
        output.push_str(&format!(
            "Applied {} of {} patches\n",
            report.applied,
            report.total()
        ));
        if !report.conflicts.is_empty() {
            output.push_str(&format!("{} conflicts:\n", report.conflicts.len()));
            for conflict in &report.conflicts {
                output.push_str(&format!("  {}\n", conflict));
            }
        }
        output
    }

    fn format_log(&self, patches: &[Patch]) -> String {
        let mut output = String::new();
        output.push_str(&format!("{:<28} {:<24} {}\n", "Created", "Target", "Hash"));
        output.push_str(&"-".repeat(70));
        output.push('\n');
        for patch in patches {
            let target = format!("{}:{}", patch.target.record_type, patch.target.key);
            let hash = patch.hash.digest();
            output.push_str(&format!(
                "{:<28} {:<24} {}\n",
                patch.created.format("%Y-%m-%d %H:%M:%S%.6f"),
                target,
                &hash[..hash.len().min(12)]
            ));
        }
        output.push_str(&"-".repeat(70));
        output.push('\n');
        output.push_str(&format!("{} patches\n", patches.len()));
        output
    }
}

/// JSON output formatter
pub struct JsonFormatter;

impl OutputFormatter for JsonFormatter {
    fn format_keys(&self, record_type: RecordType, keys: &[String]) -> String {
        let obj = json!({
            "type": record_type.name(),
            "keys": keys,
        });
        serde_json::to_string_pretty(&obj).unwrap_or_else(|_| "{}".to_string())
    }

    fn format_record(&self, _key: &RecordKey, record: &Record) -> String {
        serde_json::to_string_pretty(record).unwrap_or_else(|_| "{}".to_string())
    }

    fn format_patch(&self, patch: &Patch) -> String {
        serde_json::to_string_pretty(patch).unwrap_or_else(|_| "{}".to_string())
    }

    fn format_restored(&self, what: &str) -> String {
        let obj = json!({ "restored": what });
        serde_json::to_string_pretty(&obj).unwrap_or_else(|_| "{}".to_string())
    }

    fn format_replay(&self, report: &ReplayReport) -> String {
        let obj = json!({
            "success": report.is_clean(),
            "applied": report.applied,
            "conflicts": report.conflicts.iter().map(|c| json!({
                "patch_id": c.patch_id,
                "key": c.key,
                "error": c.error.to_string(),
            })).collect::<Vec<_>>(),
        });
        serde_json::to_string_pretty(&obj).unwrap_or_else(|_| "{}".to_string())
    }

    fn format_log(&self, patches: &[Patch]) -> String {
        serde_json::to_string_pretty(patches).unwrap_or_else(|_| "[]".to_string())
    }
}

/// Creates the appropriate formatter based on output format
pub fn create_formatter(format: super::OutputFormat) -> Box<dyn OutputFormatter> {
    match format {
        super::OutputFormat::Human => Box::new(HumanFormatter),
        super::OutputFormat::Json => Box::new(JsonFormatter),
    }
}
