//! Dispatch message types
//!
//! Inbound twin and function payloads are parsed into tagged types
//! before any callback runs. The cloud publishes parameter changes as a
//! flat JSON object with dotted `parameters.requested.<name>` keys;
//! nothing else in the payload is interpreted.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// Scope a remote parameter lives in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParameterScope {
    /// Device twin, shared by every application on the device
    Device,
    /// Application twin, private to one application
    Application,
}

/// What causes a registered callback to fire
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallbackTrigger {
    /// A requested-parameter key matching the remote name arrived
    OnParameterUpdate,
    /// A function-call message naming the registration arrived
    OnRemoteCall,
}

/// Parsed twin-update message
#[derive(Debug, Clone, Default)]
pub struct TwinUpdate {
    /// Requested parameter values, keyed by bare parameter name
    pub requested: BTreeMap<String, Value>,
}

impl TwinUpdate {
    const REQUESTED_PREFIX: &'static str = "parameters.requested.";

    /// Decode a twin payload. Dotted keys are the wire form; a nested
    /// `{"parameters": {"requested": {..}}}` object is accepted too.
    pub fn parse(payload: &[u8]) -> Result<Self> {
        let value: Value = serde_json::from_slice(payload)
            .map_err(|e| Error::MalformedMessage(format!("twin update is not JSON: {}", e)))?;
        let object = value
            .as_object()
            .ok_or_else(|| Error::MalformedMessage("twin update is not an object".to_string()))?;

        let mut requested = BTreeMap::new();
        for (key, val) in object {
            if let Some(name) = key.strip_prefix(Self::REQUESTED_PREFIX) {
                if !name.is_empty() {
                    requested.insert(name.to_string(), val.clone());
                }
            }
        }
        if let Some(nested) = object
            .get("parameters")
            .and_then(|p| p.get("requested"))
            .and_then(|r| r.as_object())
        {
            for (name, val) in nested {
                requested.insert(name.clone(), val.clone());
            }
        }

        Ok(Self { requested })
    }
}

/// Remote function call request
#[derive(Debug, Clone, Deserialize)]
pub struct FunctionCall {
    pub name: String,
    /// Caller-chosen correlation id, echoed back as `call_id`
    pub id: Value,
    #[serde(default)]
    pub parameters: Value,
}

impl FunctionCall {
    pub fn parse(payload: &[u8]) -> Result<Self> {
        serde_json::from_slice(payload)
            .map_err(|e| Error::MalformedMessage(format!("function call: {}", e)))
    }
}

/// Reply envelope published to the functions/out topic
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FunctionResponse {
    pub name: String,
    pub call_id: Value,
    pub status: i32,
    pub result: Value,
}

/// What a callback receives. `status` and `result` are written by the
/// callback and copied into the reply envelope for remote calls.
#[derive(Debug, Clone)]
pub struct FunctionEvent {
    pub name: String,
    pub call_id: Option<Value>,
    pub parameters: Value,
    pub status: i32,
    pub result: Value,
}

impl FunctionEvent {
    pub(crate) fn parameter_update(name: &str, value: Value) -> Self {
        Self {
            name: name.to_string(),
            call_id: None,
            parameters: value,
            status: 0,
            result: Value::Null,
        }
    }

    pub(crate) fn remote_call(call: &FunctionCall) -> Self {
        Self {
            name: call.name.clone(),
            call_id: Some(call.id.clone()),
            parameters: call.parameters.clone(),
            status: 0,
            result: Value::Null,
        }
    }
}
