//! camlink-agent entry point
//!
//! Wires the broker link, dispatch table, cloud session and frame loop
//! together, registers the remote parameter callbacks, and runs until
//! the camera fails or a shutdown is requested.

use camlink_agent::camera::{
    sim::{DetectionWindow, SimScript, SimulatedCamera},
    CameraDevice, OpenParameters, Resolution, VideoSetting,
};
use camlink_agent::cloud_session::{CloudSession, LogLevel, ParameterStore};
use camlink_agent::frame_loop::{FrameLoop, LoopSettings};
use camlink_agent::mqtt_link::{LinkHandle, MqttLink, TopicSet};
use camlink_agent::param_dispatch::{self, CallbackTrigger, DispatchTable, ParameterScope};
use camlink_agent::state::{AgentConfig, AgentContext};
use serde_json::json;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Clone, Copy)]
enum SettingKind {
    Bool,
    Int,
}

/// Device-scope video setting: read the requested value, apply it under
/// the camera lock, acknowledge it back to the twin.
fn register_setting_callback(
    context: &AgentContext,
    link: &LinkHandle,
    name: &'static str,
    setting: VideoSetting,
    kind: SettingKind,
) -> camlink_agent::Result<()> {
    let camera = context.camera.clone();
    let session = context.session.clone();
    let topic = context.dispatch.subscribe(
        name,
        CallbackTrigger::OnParameterUpdate,
        ParameterScope::Device,
        Arc::new(move |_event| {
            let applied = {
                let mut camera = camera.lock().expect("camera lock");
                let current = camera.get_setting(setting).unwrap_or(0);
                let wanted = match kind {
                    SettingKind::Bool => {
                        session.get_parameter_bool(name, ParameterScope::Device, current != 0)
                            as i32
                    }
                    SettingKind::Int => {
                        session.get_parameter_i64(name, ParameterScope::Device, current as i64)
                            as i32
                    }
                };
                match camera.set_setting(setting, wanted) {
                    Ok(()) => Some(wanted),
                    Err(e) => {
                        let _ = session.send_log(
                            format!("Failed to apply {}: {}", name, e),
                            LogLevel::Warning,
                        );
                        None
                    }
                }
            };
            if let Some(value) = applied {
                let reported = match kind {
                    SettingKind::Bool => json!(value != 0),
                    SettingKind::Int => json!(value),
                };
                let _ = session.report_parameter(name, ParameterScope::Device, reported);
            }
        }),
    );
    link.subscribe(topic)
}

fn register_callbacks(context: &AgentContext, link: &LinkHandle) -> camlink_agent::Result<()> {
    register_setting_callback(context, link, "led_status", VideoSetting::LedStatus, SettingKind::Bool)?;
    register_setting_callback(context, link, "camera_gamma", VideoSetting::Gamma, SettingKind::Int)?;
    register_setting_callback(context, link, "camera_gain", VideoSetting::Gain, SettingKind::Int)?;
    register_setting_callback(context, link, "camera_exposure", VideoSetting::Exposure, SettingKind::Int)?;
    register_setting_callback(
        context,
        link,
        "camera_auto_exposure",
        VideoSetting::AutoExposure,
        SettingKind::Bool,
    )?;

    // Init parameters force a reopen; the loop performs it between grabs
    for name in ["camera_resolution", "camera_fps", "camera_image_flip"] {
        let session = context.session.clone();
        let open_params = context.open_params.clone();
        let reopen = context.reopen_requested.clone();
        let topic = context.dispatch.subscribe(
            name,
            CallbackTrigger::OnParameterUpdate,
            ParameterScope::Device,
            Arc::new(move |_event| {
                let mut params = open_params.write().expect("open params lock");
                let resolution_str = session.get_parameter_string(
                    "camera_resolution",
                    ParameterScope::Device,
                    params.resolution.as_str(),
                );
                if let Some(resolution) = Resolution::parse(&resolution_str) {
                    params.resolution = resolution;
                }
                params.fps = session.get_parameter_i64(
                    "camera_fps",
                    ParameterScope::Device,
                    params.fps as i64,
                ) as u32;
                params.image_flip = session.get_parameter_bool(
                    "camera_image_flip",
                    ParameterScope::Device,
                    params.image_flip,
                );
                drop(params);

                reopen.store(true, Ordering::SeqCst);
                let _ = session.send_log(
                    "Init parameters update, re-opening the camera",
                    LogLevel::Info,
                );
            }),
        );
        link.subscribe(topic)?;
    }

    // Application parameters steering the loop
    for name in [
        "record_video_event",
        "frames_between_events",
        "record_telemetry",
        "telemetry_frequency",
        "draw_boxes",
    ] {
        let session = context.session.clone();
        let params = context.params.clone();
        let loop_settings = context.loop_settings.clone();
        let topic = context.dispatch.subscribe(
            name,
            CallbackTrigger::OnParameterUpdate,
            ParameterScope::Application,
            Arc::new(move |event| {
                let mut settings = loop_settings.write().expect("loop settings lock");
                *settings = LoopSettings::from_store(&params);
                drop(settings);
                let _ = session.send_log(
                    format!("Application parameter {} modified", event.name),
                    LogLevel::Info,
                );
            }),
        );
        link.subscribe(topic)?;
    }

    // Local side stream toggle
    {
        let camera = context.camera.clone();
        let session = context.session.clone();
        let topic = context.dispatch.subscribe(
            "local_stream",
            CallbackTrigger::OnParameterUpdate,
            ParameterScope::Application,
            Arc::new(move |_event| {
                let enabled =
                    session.get_parameter_bool("local_stream", ParameterScope::Application, false);
                let mut camera = camera.lock().expect("camera lock");
                if let Err(e) = camera.set_streaming(enabled) {
                    let _ = session.send_log(
                        format!("Local stream toggle failed: {}", e),
                        LogLevel::Warning,
                    );
                }
            }),
        );
        link.subscribe(topic)?;
    }

    // Remote function: add two integers, reply through the envelope
    {
        let session = context.session.clone();
        let topic = context.dispatch.subscribe(
            "compute_sum",
            CallbackTrigger::OnRemoteCall,
            ParameterScope::Application,
            Arc::new(move |event| {
                let a = event.parameters.get("num1").and_then(|v| v.as_i64());
                let b = event.parameters.get("num2").and_then(|v| v.as_i64());
                match (a, b) {
                    (Some(a), Some(b)) => {
                        let sum = a + b;
                        event.status = 0;
                        event.result = json!({"success": true, "sum": sum});
                        let _ = session.send_log(
                            format!("Addition called: {} + {} = {}", a, b, sum),
                            LogLevel::Info,
                        );
                    }
                    _ => {
                        event.status = 1;
                        event.result = json!({"success": false});
                    }
                }
            }),
        );
        link.subscribe(topic)?;
    }

    Ok(())
}

/// Scripted activity for the simulated device: a visitor around frame
/// 150, a pair around frame 750, one more later.
fn demo_script() -> SimScript {
    SimScript {
        windows: vec![
            DetectionWindow { from_frame: 150, to_frame: 300, count: 1 },
            DetectionWindow { from_frame: 750, to_frame: 900, count: 2 },
            DetectionWindow { from_frame: 1350, to_frame: 1500, count: 1 },
        ],
        fail_at_frame: None,
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present
    dotenvy::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "camlink_agent=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting camlink-agent v{}", env!("CARGO_PKG_VERSION"));

    let config = AgentConfig::load()?;
    tracing::info!(
        mqtt_host = %config.mqtt_host,
        mqtt_port = config.mqtt_port,
        device_id = %config.device_id,
        application_id = %config.application_id,
        development_mode = config.development_mode(),
        "Configuration loaded"
    );

    let topics = TopicSet::new(config.device_id.clone(), config.application_id.clone());
    let params = Arc::new(ParameterStore::new());

    let (link, inbound) = MqttLink::connect(&config).await?;
    let dispatch = Arc::new(DispatchTable::new(topics.clone(), params.clone(), link.clone()));
    tokio::spawn(param_dispatch::pump(inbound, dispatch.clone()));

    let session = CloudSession::connect(&config.application_name, link.clone(), topics, params.clone())?;

    // Development mode seeds application parameters from the local file
    if config.development_mode() {
        let loaded = session.load_application_parameters(&config.parameters_file)?;
        tracing::info!(loaded = loaded, "Development-mode parameters loaded");
    }

    // Open and register the camera
    let open_params = OpenParameters::default();
    let mut camera: Box<dyn CameraDevice> = Box::new(SimulatedCamera::new(40_012_345, demo_script()));
    if let Err(e) = camera.open(&open_params) {
        session.send_log(format!("Camera initialization error: {}", e), LogLevel::Error)?;
        anyhow::bail!("camera initialization failed: {}", e);
    }
    session.register_camera(&camera.info())?;

    let context = AgentContext {
        config: config.clone(),
        session: session.clone(),
        params: params.clone(),
        dispatch: dispatch.clone(),
        camera: Arc::new(Mutex::new(camera)),
        loop_settings: Arc::new(RwLock::new(LoopSettings::from_store(&params))),
        open_params: Arc::new(RwLock::new(open_params)),
        reopen_requested: Arc::new(AtomicBool::new(false)),
    };

    register_callbacks(&context, &link)?;
    tracing::info!("Remote parameter callbacks registered");

    let frame_loop = FrameLoop::new(
        context.camera.clone(),
        session.clone(),
        context.loop_settings.clone(),
        context.open_params.clone(),
        context.reopen_requested.clone(),
    );

    tokio::select! {
        result = frame_loop.run() => {
            if let Err(e) = result {
                tracing::error!(error = %e, "Frame loop ended");
            }
        }
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("Shutdown requested");
            let mut camera = context.camera.lock().expect("camera lock");
            camera.close();
        }
    }

    session.disconnect()?;
    Ok(())
}
