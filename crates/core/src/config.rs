use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use serde_json::{Map, Value};
use tracing::debug;

use crate::error::{Error, Result};
use crate::types::ConsolidateOptions;

pub const DEFAULT_CONFIG_PATH: &str = "System/Configuration/script_consolidation_config.json";

/// Hierarchical key/value store addressed by dotted paths (`paths.lib_dir`),
/// backed by a JSON document on disk.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ConfigStore {
    path: Option<PathBuf>,
    root: Map<String, Value>,
}

impl ConfigStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads `path`; a missing file yields an empty store bound to that path.
    pub fn load(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let raw = match fs::read_to_string(&path) {
            Ok(raw) => raw,
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                debug!(path = %path.display(), "config file does not exist");
                return Ok(Self {
                    path: Some(path),
                    root: Map::new(),
                });
            }
            Err(err) => return Err(Error::read(path, err)),
        };

        let value: Value = serde_json::from_str(&raw).map_err(|e| Error::json(&path, e))?;
        let Value::Object(root) = value else {
            return Err(Error::config(format!(
                "{} must contain a JSON object",
                path.display()
            )));
        };
        debug!(path = %path.display(), keys = root.len(), "loaded configuration");
        Ok(Self {
            path: Some(path),
            root,
        })
    }

    pub fn save(&self) -> Result<()> {
        let Some(path) = self.path.as_ref() else {
            return Err(Error::config("config store has no backing file"));
        };
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent).map_err(|e| Error::write(parent, e))?;
        }
        let json = serde_json::to_string_pretty(&Value::Object(self.root.clone()))
            .map_err(|e| Error::json(path, e))?;
        fs::write(path, json).map_err(|e| Error::write(path, e))
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn get(&self, key_path: &str) -> Option<&Value> {
        let mut parts = key_path.split('.');
        let mut current = self.root.get(parts.next()?)?;
        for part in parts {
            current = current.as_object()?.get(part)?;
        }
        Some(current)
    }

    pub fn get_str(&self, key_path: &str) -> Option<&str> {
        self.get(key_path)?.as_str()
    }

    pub fn get_f64(&self, key_path: &str) -> Option<f64> {
        self.get(key_path)?.as_f64()
    }

    pub fn get_u64(&self, key_path: &str) -> Option<u64> {
        self.get(key_path)?.as_u64()
    }

    /// Sets `key_path`, creating intermediate objects and replacing any
    /// non-object value standing in the way.
    pub fn set(&mut self, key_path: &str, value: Value) {
        let parts: Vec<&str> = key_path.split('.').collect();
        let Some((last, parents)) = parts.split_last() else {
            return;
        };

        let mut current = &mut self.root;
        for part in parents {
            let slot = current
                .entry((*part).to_string())
                .or_insert_with(|| Value::Object(Map::new()));
            if !slot.is_object() {
                *slot = Value::Object(Map::new());
            }
            let Value::Object(next) = slot else {
                unreachable!("slot was just made an object");
            };
            current = next;
        }
        current.insert((*last).to_string(), value);
    }

    pub fn delete(&mut self, key_path: &str) -> bool {
        let parts: Vec<&str> = key_path.split('.').collect();
        let Some((last, parents)) = parts.split_last() else {
            return false;
        };

        let mut current = &mut self.root;
        for part in parents {
            match current.get_mut(*part) {
                Some(Value::Object(next)) => current = next,
                _ => return false,
            }
        }
        current.remove(*last).is_some()
    }

    /// Deep merge: objects merge key by key, every other value replaces.
    pub fn merge(&mut self, other: &Value) {
        if let Value::Object(incoming) = other {
            merge_objects(&mut self.root, incoming);
        }
    }

    pub fn to_options(&self, root: impl Into<PathBuf>) -> Result<ConsolidateOptions> {
        let mut options = ConsolidateOptions::with_root(root);

        let path_keys: [(&str, &mut PathBuf); 8] = [
            ("paths.registry", &mut options.registry_path),
            ("paths.plan", &mut options.plan_path),
            ("paths.results", &mut options.results_path),
            ("paths.report", &mut options.report_path),
            ("paths.backups", &mut options.backup_dir),
            ("paths.lib_dir", &mut options.lib_dir),
            ("paths.log_file", &mut options.log_path),
            ("paths.incidents", &mut options.incident_dir),
        ];
        for (key, slot) in path_keys {
            if let Some(value) = self.get(key) {
                let raw = value
                    .as_str()
                    .ok_or_else(|| Error::config(format!("{key} must be a string")))?;
                *slot = PathBuf::from(raw);
            }
        }

        if let Some(value) = self.get("discovery.roots") {
            let roots = value
                .as_array()
                .ok_or_else(|| Error::config("discovery.roots must be an array"))?;
            for root in roots {
                let raw = root
                    .as_str()
                    .ok_or_else(|| Error::config("discovery.roots entries must be strings"))?;
                options.discover_roots.push(PathBuf::from(raw));
            }
        }
        if let Some(value) = self.get("discovery.ignore_dirs") {
            let dirs = value
                .as_array()
                .ok_or_else(|| Error::config("discovery.ignore_dirs must be an array"))?;
            options
                .ignore_dirs
                .extend(dirs.iter().filter_map(Value::as_str).map(str::to_string));
        }
        if let Some(value) = self.get("discovery.max_file_size") {
            options.max_file_size = if value.is_null() {
                None
            } else {
                Some(value.as_u64().ok_or_else(|| {
                    Error::config("discovery.max_file_size must be a non-negative integer")
                })?)
            };
        }

        if let Some(value) = self.get_u64("thresholds.min_shared_functions") {
            options.min_shared_functions = usize::try_from(value.max(1)).unwrap_or(usize::MAX);
        }
        let score_keys: [(&str, &mut f64); 3] = [
            ("thresholds.min_combined_score", &mut options.min_combined_score),
            ("thresholds.merge", &mut options.merge_threshold),
            ("thresholds.high_benefit", &mut options.high_benefit_threshold),
        ];
        for (key, slot) in score_keys {
            if let Some(value) = self.get(key) {
                let score = value
                    .as_f64()
                    .filter(|v| v.is_finite() && (0.0..=1.0).contains(v))
                    .ok_or_else(|| Error::config(format!("{key} must be a number in 0..1")))?;
                *slot = score;
            }
        }

        // Mirrors the `script_types` list of older configuration files.
        if let Some(Value::Array(types)) = self.get("script_types") {
            for entry in types {
                let (Some(ext), Some(pattern)) = (
                    entry.get("extension").and_then(Value::as_str),
                    entry.get("import_pattern").and_then(Value::as_str),
                ) else {
                    continue;
                };
                options
                    .import_patterns
                    .insert(ext.to_string(), pattern.to_string());
            }
        }

        Ok(options)
    }
}

fn merge_objects(target: &mut Map<String, Value>, incoming: &Map<String, Value>) {
    for (key, value) in incoming {
        match (target.get_mut(key), value) {
            (Some(Value::Object(existing)), Value::Object(nested)) => {
                merge_objects(existing, nested);
            }
            _ => {
                target.insert(key.clone(), value.clone());
            }
        }
    }
}
