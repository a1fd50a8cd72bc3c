//! Cloud topic scheme
//!
//! All topics are derived once from `(device_id, application_id)`.
//! Parameter updates arrive on the twin topics (device scope, or
//! application scope under `/apps/{id}`), remote calls on `functions/in`
//! with replies published to `functions/out`.

use crate::param_dispatch::ParameterScope;

/// Topic set for one device/application pair
#[derive(Debug, Clone)]
pub struct TopicSet {
    device_id: String,
    application_id: String,
}

impl TopicSet {
    pub fn new(device_id: impl Into<String>, application_id: impl Into<String>) -> Self {
        Self {
            device_id: device_id.into(),
            application_id: application_id.into(),
        }
    }

    pub fn logs(&self) -> String {
        format!("/v1/devices/{}/logs", self.device_id)
    }

    pub fn telemetry(&self) -> String {
        format!("/v1/devices/{}/telemetry", self.device_id)
    }

    pub fn video_events(&self) -> String {
        format!("/v1/devices/{}/video_events", self.device_id)
    }

    /// Twin topic carrying requested/reported parameter patches
    pub fn twin_update(&self, scope: ParameterScope) -> String {
        match scope {
            ParameterScope::Device => format!("/v1/devices/{}/twin/update", self.device_id),
            ParameterScope::Application => format!(
                "/v1/devices/{}/apps/{}/twin/update",
                self.device_id, self.application_id
            ),
        }
    }

    pub fn functions_in(&self) -> String {
        format!(
            "/v1/devices/{}/apps/{}/functions/in",
            self.device_id, self.application_id
        )
    }

    pub fn functions_out(&self) -> String {
        format!(
            "/v1/devices/{}/apps/{}/functions/out",
            self.device_id, self.application_id
        )
    }

    pub fn stream(&self, stream_name: &str) -> String {
        format!("/v1/devices/{}/streams/{}", self.device_id, stream_name)
    }

    pub fn device_id(&self) -> &str {
        &self.device_id
    }

    pub fn application_id(&self) -> &str {
        &self.application_id
    }
}
