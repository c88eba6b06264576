pub mod migrate;
pub mod review;
pub mod status;

use anyhow::{Context, Result};
use serde::Serialize;
use std::fs;
use std::path::Path;

#[derive(Debug, Clone, Serialize)]
pub struct CommandReport {
    pub command: String,
    pub ok: bool,
    pub details: Vec<String>,
    pub issues: Vec<String>,
}

impl CommandReport {
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            ok: true,
            details: Vec::new(),
            issues: Vec::new(),
        }
    }

    pub fn detail(&mut self, text: impl Into<String>) {
        self.details.push(text.into());
    }

    pub fn issue(&mut self, text: impl Into<String>) {
        self.ok = false;
        self.issues.push(text.into());
    }

    pub fn render(&self) -> String {
        let mut out = format!(
            "{}: {}\n",
            self.command,
            if self.ok { "ok" } else { "failed" }
        );
        for detail in &self.details {
            out.push_str(&format!("  {detail}\n"));
        }
        for issue in &self.issues {
            out.push_str(&format!("  issue: {issue}\n"));
        }
        out
    }
}

/// Pretty JSON on stdout, mirrored to `report_path` when given.
pub fn write_dump(value: &impl Serialize, report_path: Option<&Path>) -> Result<()> {
    let rendered = serde_json::to_string_pretty(value)?;
    println!("{rendered}");
    if let Some(path) = report_path {
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent)
                .with_context(|| format!("failed to create {}", parent.display()))?;
        }
        fs::write(path, format!("{rendered}\n"))
            .with_context(|| format!("failed to write {}", path.display()))?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn issue_flips_ok_and_renders() {
        let mut report = CommandReport::new("review");
        report.detail("items=3");
        report.issue("index unreachable");
        assert!(!report.ok);
        let text = report.render();
        assert!(text.starts_with("review: failed\n"));
        assert!(text.contains("  items=3\n"));
        assert!(text.contains("  issue: index unreachable\n"));
    }

    #[test]
    fn dump_is_mirrored_to_report_file() {
        let tmp = tempfile::tempdir().expect("tempdir");
        let path = tmp.path().join("out").join("report.json");
        write_dump(&serde_json::json!({"a": 1}), Some(&path)).expect("dump");
        let raw = fs::read_to_string(&path).expect("read");
        let back: serde_json::Value = serde_json::from_str(&raw).expect("json");
        assert_eq!(back["a"], 1);
    }
}
