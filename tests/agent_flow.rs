//! End-to-end loop and dispatch flow against the simulated camera,
//! with a detached link capturing everything the agent would publish.

use camlink_agent::camera::{
    sim::{DetectionWindow, SimScript, SimulatedCamera},
    CameraDevice, OpenParameters,
};
use camlink_agent::cloud_session::{CloudSession, ParameterStore};
use camlink_agent::frame_loop::{FrameLoop, LoopSettings};
use camlink_agent::mqtt_link::{InboundMessage, LinkCommand, LinkHandle, TopicSet};
use camlink_agent::param_dispatch::{self, CallbackTrigger, DispatchTable, ParameterScope};
use serde_json::{json, Value};
use std::sync::atomic::AtomicBool;
use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration;
use tokio::sync::mpsc;

struct Captured {
    by_topic: Vec<(String, Value)>,
}

impl Captured {
    fn drain(rx: &mut mpsc::UnboundedReceiver<LinkCommand>) -> Self {
        let mut by_topic = Vec::new();
        while let Ok(cmd) = rx.try_recv() {
            if let LinkCommand::Publish { topic, payload } = cmd {
                let body: Value = serde_json::from_slice(&payload).unwrap();
                by_topic.push((topic, body));
            }
        }
        Self { by_topic }
    }

    fn on_topic(&self, topic: &str) -> Vec<&Value> {
        self.by_topic
            .iter()
            .filter(|(t, _)| t == topic)
            .map(|(_, v)| v)
            .collect()
    }
}

fn camera_with(script: SimScript) -> Box<dyn CameraDevice> {
    let mut camera = SimulatedCamera::new(7001, script);
    camera.open(&OpenParameters::default()).unwrap();
    Box::new(camera)
}

#[tokio::test]
async fn loop_emits_events_telemetry_and_frames_until_grab_fails() {
    let (link, mut rx) = LinkHandle::detached();
    let topics = TopicSet::new("dev-t", "app-t");
    let params = Arc::new(ParameterStore::new());
    let session =
        CloudSession::connect("flow_test", link, topics, params.clone()).unwrap();

    // Two activity windows separated by eight empty frames, then the
    // device disappears at frame 16.
    let camera = camera_with(SimScript {
        windows: vec![
            DetectionWindow { from_frame: 0, to_frame: 3, count: 1 },
            DetectionWindow { from_frame: 12, to_frame: 14, count: 1 },
        ],
        fail_at_frame: Some(16),
    });
    session.register_camera(&camera.info()).unwrap();

    let settings = LoopSettings {
        record_video_event: true,
        frames_between_events: 5,
        event_update_interval_s: 10.0,
        record_telemetry: true,
        telemetry_frequency_s: 0.1,
        draw_boxes: false,
    };

    let frame_loop = FrameLoop::new(
        Arc::new(Mutex::new(camera)),
        session.clone(),
        Arc::new(RwLock::new(settings)),
        Arc::new(RwLock::new(OpenParameters::default())),
        Arc::new(AtomicBool::new(false)),
    )
    .with_frame_interval(Duration::ZERO);

    let result = frame_loop.run().await;
    assert!(result.is_err(), "loop must end with the device error");

    let captured = Captured::drain(&mut rx);

    // All sixteen grabbed frames were forwarded
    let frames = captured.on_topic("/v1/devices/dev-t/streams/main");
    assert_eq!(frames.len(), 16);
    assert_eq!(frames[0]["detection_count"], json!(1));
    assert_eq!(frames[5]["detection_count"], json!(0));

    // The eight-frame gap exceeds the threshold of five, so the second
    // window opens a fresh event with a different reference
    let events = captured.on_topic("/v1/devices/dev-t/video_events");
    assert_eq!(events.len(), 2);
    assert_eq!(events[0]["kind"], json!("start"));
    assert_eq!(events[1]["kind"], json!("start"));
    let first_ref = events[0]["reference"].as_str().unwrap();
    let second_ref = events[1]["reference"].as_str().unwrap();
    assert!(first_ref.starts_with("evt-"));
    assert_ne!(first_ref, second_ref);

    // 30 fps frames, 0.1 s gate: frames 4, 8 and 12 carry telemetry
    let telemetry = captured.on_topic("/v1/devices/dev-t/telemetry");
    assert_eq!(telemetry.len(), 3);
    for record in &telemetry {
        assert_eq!(record["label"], json!("object_detection"));
        assert!(record["payload"]["number_of_detections"].is_number());
    }

    // Grab failure is reported through the cloud log path
    let logs = captured.on_topic("/v1/devices/dev-t/logs");
    assert!(logs
        .iter()
        .any(|l| l["message"].as_str().unwrap().contains("Grab failed")));
    assert!(logs
        .iter()
        .any(|l| l["message"].as_str().unwrap().contains("reboot")));
}

#[tokio::test]
async fn event_reference_survives_short_gaps() {
    let (link, mut rx) = LinkHandle::detached();
    let topics = TopicSet::new("dev-t", "app-t");
    let params = Arc::new(ParameterStore::new());
    let session = CloudSession::connect("gap_test", link, topics, params).unwrap();

    // Two empty frames between windows, below the threshold of five
    let camera = camera_with(SimScript {
        windows: vec![
            DetectionWindow { from_frame: 0, to_frame: 2, count: 1 },
            DetectionWindow { from_frame: 5, to_frame: 7, count: 2 },
        ],
        fail_at_frame: Some(10),
    });
    session.register_camera(&camera.info()).unwrap();

    let settings = LoopSettings {
        record_video_event: true,
        frames_between_events: 5,
        event_update_interval_s: 10.0,
        record_telemetry: false,
        telemetry_frequency_s: 10.0,
        draw_boxes: false,
    };

    let frame_loop = FrameLoop::new(
        Arc::new(Mutex::new(camera)),
        session,
        Arc::new(RwLock::new(settings)),
        Arc::new(RwLock::new(OpenParameters::default())),
        Arc::new(AtomicBool::new(false)),
    )
    .with_frame_interval(Duration::ZERO);

    let _ = frame_loop.run().await;
    let captured = Captured::drain(&mut rx);

    // One event only: the gap never closed it
    let events = captured.on_topic("/v1/devices/dev-t/video_events");
    assert_eq!(events.len(), 1);
    assert_eq!(events[0]["kind"], json!("start"));

    // Telemetry disabled: nothing on that topic
    assert!(captured.on_topic("/v1/devices/dev-t/telemetry").is_empty());
}

#[tokio::test]
async fn twin_update_through_pump_reconfigures_the_loop() {
    let (link, _rx) = LinkHandle::detached();
    let topics = TopicSet::new("dev-t", "app-t");
    let params = Arc::new(ParameterStore::new());
    let dispatch = Arc::new(DispatchTable::new(topics.clone(), params.clone(), link));

    let loop_settings = Arc::new(RwLock::new(LoopSettings::default()));
    {
        let params = params.clone();
        let loop_settings = loop_settings.clone();
        dispatch.subscribe(
            "telemetry_frequency",
            CallbackTrigger::OnParameterUpdate,
            ParameterScope::Application,
            Arc::new(move |_event| {
                let mut settings = loop_settings.write().unwrap();
                *settings = LoopSettings::from_store(&params);
            }),
        );
    }

    let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();
    let pump = tokio::spawn(param_dispatch::pump(inbound_rx, dispatch));

    // A malformed message first: dropped, the pump keeps going
    inbound_tx
        .send(InboundMessage {
            topic: topics.twin_update(ParameterScope::Application),
            payload: b"{broken".to_vec(),
        })
        .unwrap();
    inbound_tx
        .send(InboundMessage {
            topic: topics.twin_update(ParameterScope::Application),
            payload: json!({"parameters.requested.telemetry_frequency": 2.5})
                .to_string()
                .into_bytes(),
        })
        .unwrap();
    drop(inbound_tx);
    pump.await.unwrap();

    assert_eq!(loop_settings.read().unwrap().telemetry_frequency_s, 2.5);
}

#[tokio::test]
async fn secondary_stream_pushes_until_its_camera_fails() {
    let (link, mut rx) = LinkHandle::detached();
    let topics = TopicSet::new("dev-t", "app-t");
    let params = Arc::new(ParameterStore::new());
    let session = CloudSession::connect("multi_test", link, topics, params).unwrap();

    let secondary = camera_with(SimScript {
        windows: vec![],
        fail_at_frame: Some(4),
    });

    FrameLoop::spawn_secondary(secondary, "7001".to_string(), session, Duration::ZERO)
        .await
        .unwrap();

    let captured = Captured::drain(&mut rx);
    let frames = captured.on_topic("/v1/devices/dev-t/streams/7001");
    assert_eq!(frames.len(), 4);
    let logs = captured.on_topic("/v1/devices/dev-t/logs");
    assert!(logs
        .iter()
        .any(|l| l["message"].as_str().unwrap().contains("Secondary stream")));
}
