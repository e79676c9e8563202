//! Shared test infrastructure for integration tests.

use serde_json::Value;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::{Command, Output};
use tempfile::TempDir;

/// A scratch directory holding a catalogue, a config and a snapshot store.
pub struct Workspace {
    dir: TempDir,
}

/// Exit status and captured streams of one `rulesync` run.
#[derive(Debug)]
pub struct Run {
    pub success: bool,
    pub stdout: String,
    pub stderr: String,
}

impl From<Output> for Run {
    fn from(output: Output) -> Self {
        Self {
            success: output.status.success(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        }
    }
}

impl Default for Workspace {
    fn default() -> Self {
        Self::new()
    }
}

impl Workspace {
    pub fn new() -> Self {
        Self {
            dir: tempfile::tempdir().expect("tempdir"),
        }
    }

    pub fn path(&self, name: &str) -> PathBuf {
        self.dir.path().join(name)
    }

    pub fn write_json(&self, name: &str, value: &Value) -> PathBuf {
        let path = self.path(name);
        let text = serde_json::to_string_pretty(value).expect("serialize fixture");
        fs::write(&path, text).expect("write fixture");
        path
    }

    pub fn read_json(&self, name: &str) -> Value {
        read_json(&self.path(name))
    }

    /// Run the binary with `args`, from inside the workspace.
    pub fn run(&self, args: &[&str]) -> Run {
        Command::new(env!("CARGO_BIN_EXE_rulesync"))
            .args(args)
            .current_dir(self.dir.path())
            .env("RUST_LOG", "warn")
            .output()
            .expect("spawn rulesync")
            .into()
    }
}

pub fn read_json(path: &Path) -> Value {
    let text = fs::read_to_string(path).expect("read json");
    serde_json::from_str(&text).expect("parse json")
}

/// The stored row of table `title` whose `key_field` title equals `key`.
pub fn store_row<'a>(store: &'a mut Value, title: &str, key_field: &str, key: &str) -> &'a mut Value {
    store["tables"]
        .as_array_mut()
        .expect("tables")
        .iter_mut()
        .find(|table| table["title"] == title)
        .expect("table")["rows"]
        .as_array_mut()
        .expect("rows")
        .iter_mut()
        .find(|row| row["fields"][key_field]["title"] == key)
        .expect("row")
}

pub fn sample_catalog() -> Value {
    serde_json::json!({
        "version": 1,
        "cards": [
            {"id": "cardA", "name": "Card A", "bank": "Acme", "rewardModules": ["offerX"]}
        ],
        "categories": {
            "dining": {"label": "Dining", "order": 1}
        },
        "modules": {
            "offerX": {
                "type": "category",
                "desc": "Dining bonus",
                "rate": 4,
                "match": ["dining"],
                "valid_from": "2026-01-01",
                "valid_to": "2026-03-31",
                "promo_end": "2026-03-31"
            }
        },
        "campaigns": [
            {
                "id": "spring",
                "name": "Spring",
                "cards": ["cardA"],
                "period_policy": {
                    "mode": "composite",
                    "windows": [
                        {"id": "a", "startDate": "2026-01-01", "endDate": "2026-01-31"},
                        {"id": "b", "startDate": "2026-03-01", "endDate": "2026-03-31"}
                    ]
                },
                "sections": [{"type": "progress", "label": "Spend"}]
            }
        ]
    })
}
