//! Agent configuration and shared context
//!
//! All shared handles live in one explicit context struct; callbacks and
//! loops receive clones of its `Arc` fields instead of reaching for
//! globals.

use crate::camera::OpenParameters;
use crate::cloud_session::{CloudSession, ParameterStore};
use crate::error::{Error, Result};
use crate::frame_loop::{LoopSettings, SharedCamera};
use crate::param_dispatch::DispatchTable;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::AtomicBool;
use std::sync::{Arc, RwLock};

/// Agent configuration, environment-driven
#[derive(Debug, Clone)]
pub struct AgentConfig {
    /// MQTT broker host
    pub mqtt_host: String,
    /// MQTT broker port
    pub mqtt_port: u16,
    /// Device identity on the cloud platform
    pub device_id: String,
    /// Application identity under the device
    pub application_id: String,
    /// Human-readable application name
    pub application_name: String,
    /// Broker password; absent means development mode
    pub application_token: Option<String>,
    /// Application parameter defaults, used in development mode
    pub parameters_file: PathBuf,
}

impl AgentConfig {
    /// Build the configuration. If `CAMLINK_ENV_FILE` points at a JSON
    /// map (the settings file the platform mounts next to the app), its
    /// entries are exported into the environment first.
    pub fn load() -> Result<Self> {
        if let Ok(path) = std::env::var("CAMLINK_ENV_FILE") {
            let entries = read_env_file(Path::new(&path))?;
            for (key, value) in entries {
                std::env::set_var(&key, &value);
            }
        }
        Ok(Self::from_env())
    }

    pub fn from_env() -> Self {
        Self {
            mqtt_host: std::env::var("CAMLINK_MQTT_HOST")
                .unwrap_or_else(|_| "localhost".to_string()),
            mqtt_port: std::env::var("CAMLINK_MQTT_PORT")
                .ok()
                .and_then(|p| p.parse().ok())
                .unwrap_or(1883),
            device_id: std::env::var("CAMLINK_DEVICE_ID")
                .unwrap_or_else(|_| "dev-local".to_string()),
            application_id: std::env::var("CAMLINK_APPLICATION_ID")
                .unwrap_or_else(|_| "app-local".to_string()),
            application_name: std::env::var("CAMLINK_APPLICATION_NAME")
                .unwrap_or_else(|_| "camlink_agent".to_string()),
            application_token: std::env::var("CAMLINK_APPLICATION_TOKEN").ok(),
            parameters_file: std::env::var("CAMLINK_PARAMETERS_FILE")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from("parameters.json")),
        }
    }

    /// Development mode: no token, parameter defaults come from the file
    pub fn development_mode(&self) -> bool {
        self.application_token.is_none()
    }
}

/// Read the platform settings file: a flat JSON map of env entries
fn read_env_file(path: &Path) -> Result<HashMap<String, String>> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| Error::Config(format!("env file {}: {}", path.display(), e)))?;
    let map: HashMap<String, serde_json::Value> = serde_json::from_str(&raw)
        .map_err(|e| Error::Config(format!("env file {}: {}", path.display(), e)))?;

    let mut entries = HashMap::new();
    for (key, value) in map {
        let value = match value {
            serde_json::Value::String(s) => s,
            other => other.to_string(),
        };
        entries.insert(key, value);
    }
    Ok(entries)
}

/// Shared handles passed to the loop and the parameter callbacks
#[derive(Clone)]
pub struct AgentContext {
    pub config: AgentConfig,
    pub session: CloudSession,
    pub params: Arc<ParameterStore>,
    pub dispatch: Arc<DispatchTable>,
    pub camera: SharedCamera,
    pub loop_settings: Arc<RwLock<LoopSettings>>,
    pub open_params: Arc<RwLock<OpenParameters>>,
    pub reopen_requested: Arc<AtomicBool>,
}
