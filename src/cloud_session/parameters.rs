//! Parameter store
//!
//! Local cache of remote parameters, per scope. Requested values arrive
//! through twin updates (absorbed by the dispatcher before callbacks
//! run); reported values are what the agent last acknowledged back to
//! the cloud. In development mode, application-scope defaults are seeded
//! from a JSON file instead of the cloud twin.

use crate::error::{Error, Result};
use crate::param_dispatch::{ParameterScope, TwinUpdate};
use serde_json::Value;
use std::collections::HashMap;
use std::path::Path;
use std::sync::RwLock;
use tracing::{debug, info};

type ScopedKey = (ParameterScope, String);

#[derive(Default)]
pub struct ParameterStore {
    requested: RwLock<HashMap<ScopedKey, Value>>,
    reported: RwLock<HashMap<ScopedKey, Value>>,
}

impl ParameterStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply a parsed twin update to the requested map
    pub fn absorb(&self, scope: ParameterScope, update: &TwinUpdate) {
        let mut requested = self.requested.write().expect("parameter store lock");
        for (name, value) in &update.requested {
            debug!(scope = ?scope, name = %name, value = %value, "Parameter requested");
            requested.insert((scope, name.clone()), value.clone());
        }
    }

    /// Seed application-scope values from a parameter definition file.
    ///
    /// Accepts either a flat `{name: value}` map or the packaged form
    /// `{"parameters": {name: {"default": value, ..}}}`.
    pub fn load_application_parameters(&self, path: &Path) -> Result<usize> {
        let raw = std::fs::read_to_string(path).map_err(|e| {
            Error::Config(format!("parameter file {}: {}", path.display(), e))
        })?;
        let value: Value = serde_json::from_str(&raw)
            .map_err(|e| Error::Config(format!("parameter file {}: {}", path.display(), e)))?;
        let object = value.as_object().ok_or_else(|| {
            Error::Config(format!("parameter file {} is not an object", path.display()))
        })?;

        let mut loaded = 0;
        let mut requested = self.requested.write().expect("parameter store lock");
        if let Some(definitions) = object.get("parameters").and_then(|p| p.as_object()) {
            for (name, definition) in definitions {
                let default = definition.get("default").cloned().unwrap_or(Value::Null);
                requested.insert((ParameterScope::Application, name.clone()), default);
                loaded += 1;
            }
        } else {
            for (name, val) in object {
                requested.insert((ParameterScope::Application, name.clone()), val.clone());
                loaded += 1;
            }
        }

        info!(path = %path.display(), loaded = loaded, "Application parameters loaded");
        Ok(loaded)
    }

    pub fn get_bool(&self, name: &str, scope: ParameterScope, default: bool) -> bool {
        self.requested_value(name, scope)
            .and_then(|v| v.as_bool())
            .unwrap_or(default)
    }

    pub fn get_i64(&self, name: &str, scope: ParameterScope, default: i64) -> i64 {
        self.requested_value(name, scope)
            .and_then(|v| v.as_i64().or_else(|| v.as_f64().map(|f| f as i64)))
            .unwrap_or(default)
    }

    pub fn get_f64(&self, name: &str, scope: ParameterScope, default: f64) -> f64 {
        self.requested_value(name, scope)
            .and_then(|v| v.as_f64())
            .unwrap_or(default)
    }

    pub fn get_string(&self, name: &str, scope: ParameterScope, default: &str) -> String {
        self.requested_value(name, scope)
            .and_then(|v| v.as_str().map(|s| s.to_string()))
            .unwrap_or_else(|| default.to_string())
    }

    /// Record what the agent acknowledged back to the cloud
    pub fn record_reported(&self, name: &str, scope: ParameterScope, value: Value) {
        let mut reported = self.reported.write().expect("parameter store lock");
        reported.insert((scope, name.to_string()), value);
    }

    pub fn reported_value(&self, name: &str, scope: ParameterScope) -> Option<Value> {
        self.reported
            .read()
            .expect("parameter store lock")
            .get(&(scope, name.to_string()))
            .cloned()
    }

    fn requested_value(&self, name: &str, scope: ParameterScope) -> Option<Value> {
        self.requested
            .read()
            .expect("parameter store lock")
            .get(&(scope, name.to_string()))
            .cloned()
    }
}
