//! camlink-agent
//!
//! Edge agent linking a stereo camera to a cloud device-management
//! platform over MQTT.
//!
//! ## Components
//!
//! 1. MqttLink - broker connection; one publisher task owns the client
//! 2. DispatchTable - remote parameter / function callback dispatch
//! 3. CloudSession - lifecycle, logs, telemetry, video events, frames
//! 4. ParameterStore - local cache of requested/reported parameters
//! 5. FrameLoop - grab loop with event grouping and telemetry gating
//! 6. CameraDevice - opaque vendor seam (simulated implementation in-tree)
//!
//! ## Design principles
//!
//! - No global mutable state: one context struct, cloned handles
//! - Inbound payloads parsed into tagged types before any callback runs
//! - All cloud emission serialized through one owning task

pub mod camera;
pub mod cloud_session;
pub mod error;
pub mod frame_loop;
pub mod mqtt_link;
pub mod param_dispatch;
pub mod state;

pub use error::{Error, Result};
pub use state::{AgentConfig, AgentContext};
