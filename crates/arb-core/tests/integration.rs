//! Integration tests driving a whole session through the command interface:
//! command → frame → cloud poll → event, against the simulated provider.

use approx::assert_relative_eq;
use arb_core::{
    ArError, ArSession, Command, EventDispatcher, Pose, Quaternion, RecordingChannel,
    SessionConfig, SimulatedProvider, SimulationConfig, TrackingState, decode, encode,
};
use proptest::prelude::*;
use serde_json::json;

struct Harness {
    session: ArSession<SimulatedProvider>,
    channel: RecordingChannel,
}

impl Harness {
    fn new(sim: SimulationConfig) -> Self {
        let channel = RecordingChannel::new();
        let provider = SimulatedProvider::new(sim);
        let mut session =
            ArSession::new(provider, EventDispatcher::new(Box::new(channel.clone())));
        session.init(SessionConfig::default()).unwrap();
        Self { session, channel }
    }

    fn cloud() -> Self {
        let mut h = Self::new(SimulationConfig {
            cloud_latency_frames: 2,
            ..SimulationConfig::default()
        });
        h.session.enable_cloud_mode().unwrap();
        h
    }

    fn call(&mut self, method: &str, args: serde_json::Value) -> arb_core::Result<serde_json::Value> {
        let command = Command::parse(method, args)?;
        self.session.execute(command)
    }

    fn frames(&mut self, n: u32) {
        self.call("advanceFrames", json!({ "count": n })).unwrap();
    }
}

fn identity_matrix() -> Vec<f64> {
    encode(&Pose::identity()).to_vec()
}

/// Test 1: upload of "A" reports the remote id and leaves the local pose alone.
#[test]
fn host_anchor_reports_upload() {
    let mut h = Harness::cloud();
    h.session.provider_mut().set_next_cloud_id("abc123");

    let created = h
        .call("createAnchor", json!({"name": "A", "transformation": identity_matrix()}))
        .unwrap();
    assert_eq!(created, json!(true));
    let accepted = h.call("hostAnchor", json!({"name": "A", "ttlSeconds": 60})).unwrap();
    assert_eq!(accepted, json!(true));

    h.frames(3);

    let messages = h.channel.messages();
    assert_eq!(messages.len(), 1);
    let uploaded = &messages[0];
    assert_eq!(uploaded.method, "onCloudAnchorUploaded");
    assert_eq!(uploaded.args["name"], "A");
    assert_eq!(uploaded.args["cloudanchorid"], "abc123");

    let pose = h.session.anchor_pose("A").unwrap();
    assert!(pose.approx_eq(&Pose::identity(), 1e-12));
}

/// Test 2: resolve → download event → host names it "B" → pose is queryable.
#[test]
fn resolve_and_register_downloaded_anchor() {
    let mut h = Harness::cloud();
    let remote = Pose::new(
        [0.25, -0.5, -2.0],
        Quaternion::from_axis_angle([0.0, 1.0, 0.0], 0.7),
    );
    h.session.provider_mut().seed_cloud_anchor("abc123", remote);

    let started = h.call("resolveAnchor", json!({"cloudAnchorId": "abc123"})).unwrap();
    assert!(started.is_null());
    h.frames(3);

    let messages = h.channel.take();
    assert_eq!(messages.len(), 1);
    let download = &messages[0];
    assert_eq!(download.method, "onAnchorDownloadSuccess");
    assert_eq!(download.args["cloudanchorid"], "abc123");
    let temp_name = download.args["tempName"].as_str().unwrap().to_string();
    let matrix: Vec<f64> = serde_json::from_value(download.args["transformation"].clone()).unwrap();
    let announced = decode(&matrix).unwrap();
    assert!(announced.approx_eq(&remote, 1e-9));

    h.call(
        "registerDownloadedAnchor",
        json!({"tempName": temp_name, "name": "B"}),
    )
    .unwrap();

    let pose = h.call("getAnchorPose", json!({"name": "B"})).unwrap();
    let pose = decode(&serde_json::from_value::<Vec<f64>>(pose).unwrap()).unwrap();
    assert!(pose.approx_eq(&remote, 1e-9));
    // Placeholder is gone
    assert_eq!(
        h.call("getAnchorPose", json!({"name": temp_name}))
            .unwrap_err()
            .kind(),
        "NotFound"
    );
    assert!(h.session.registry().cloud_record(&temp_name).is_none());
}

/// Test 3: host rejects the downloaded anchor; it is released and reported.
#[test]
fn rejected_download_is_released() {
    let mut h = Harness::cloud();
    h.session
        .provider_mut()
        .seed_cloud_anchor("abc123", Pose::identity());
    h.call("resolveAnchor", json!({"cloudAnchorId": "abc123"})).unwrap();
    h.frames(3);
    let temp_name = h.channel.take()[0].args["tempName"]
        .as_str()
        .unwrap()
        .to_string();

    h.call(
        "registerDownloadedAnchor",
        json!({"tempName": temp_name, "error": "no room"}),
    )
    .unwrap();
    let messages = h.channel.messages();
    assert_eq!(messages[0].method, "onError");
    assert!(
        messages[0].args[0]
            .as_str()
            .unwrap()
            .starts_with("Error while registering downloaded anchor")
    );
    assert_eq!(h.session.provider().live_anchor_count(), 0);
}

/// Test 4: duplicate names fail and leave the first anchor untouched.
#[test]
fn duplicate_anchor_name() {
    let mut h = Harness::new(SimulationConfig::default());
    let first = encode(&Pose::from_position([1.0, 2.0, 3.0])).to_vec();
    h.call("createAnchor", json!({"name": "A", "transformation": first}))
        .unwrap();
    let err = h
        .call("createAnchor", json!({"name": "A", "transformation": identity_matrix()}))
        .unwrap_err();
    assert_eq!(err, ArError::DuplicateName("A".into()));
    assert_eq!(h.session.anchor_pose("A").unwrap().position, [1.0, 2.0, 3.0]);
}

/// Test 5: removing an unknown anchor succeeds quietly.
#[test]
fn remove_unknown_anchor_is_noop() {
    let mut h = Harness::new(SimulationConfig::default());
    assert_eq!(
        h.call("removeAnchor", json!({"name": "nobody"})).unwrap(),
        serde_json::Value::Null
    );
    assert!(h.channel.messages().is_empty());
}

/// Test 6: a second upload of the same anchor while the first is running.
#[test]
fn double_host_rejected_while_in_flight() {
    let mut h = Harness::cloud();
    h.call("createAnchor", json!({"name": "A", "transformation": identity_matrix()}))
        .unwrap();
    h.call("hostAnchor", json!({"name": "A"})).unwrap();
    let err = h.call("hostAnchor", json!({"name": "A"})).unwrap_err();
    assert_eq!(err.kind(), "OperationAlreadyInFlight");

    // Once it finishes the anchor can be hosted again
    h.frames(3);
    h.call("hostAnchor", json!({"name": "A"})).unwrap();
}

/// Test 7: one failing upload does not disturb another anchor's upload.
#[test]
fn failure_is_isolated_to_one_anchor() {
    let mut h = Harness::cloud();
    for name in ["A", "B"] {
        h.call("createAnchor", json!({"name": name, "transformation": identity_matrix()}))
            .unwrap();
    }
    h.session
        .provider_mut()
        .fail_next_cloud_task(arb_core::CloudError::ServiceUnavailable);
    h.call("hostAnchor", json!({"name": "A"})).unwrap();
    h.call("hostAnchor", json!({"name": "B"})).unwrap();
    h.frames(3);

    let mut methods = h.channel.methods();
    methods.sort();
    assert_eq!(methods, vec!["onCloudAnchorUploaded", "onError"]);
    assert!(h.session.registry().contains("A"));
    assert!(h.session.registry().cloud_record("A").unwrap().state.is_error());
}

/// Test 8: a face stopping in frame N is gone after frame N; others stay.
#[test]
fn stopped_face_leaves_known_set() {
    let mut h = Harness::new(SimulationConfig::default());
    h.call("loadMesh", json!({"textureBytes": "iVBORw0KGgo="})).unwrap();
    let kept = h.session.provider_mut().add_face(Pose::from_position([0.0, 0.0, -0.5]));
    let lost = h.session.provider_mut().add_face(Pose::from_position([0.3, 0.0, -0.5]));

    let report = h.session.advance().unwrap().unwrap();
    assert_eq!(report.entities.faces.inserted, vec![kept, lost]);

    h.session.provider_mut().stop_face(lost);
    let report = h.session.advance().unwrap().unwrap();
    assert_eq!(report.entities.faces.removed, vec![lost]);
    assert!(!h.session.entities().faces.contains(lost));
    assert!(h.session.entities().faces.contains(kept));

    let report = h.session.advance().unwrap().unwrap();
    assert!(report.entities.faces.is_empty());
    assert_eq!(h.session.entities().faces.ids(), vec![kept]);
}

/// Test 9: an anchor that stays STOPPED past the grace window is dropped.
#[test]
fn stale_anchor_expires() {
    let mut h = Harness::new(SimulationConfig {
        stopped_grace_frames: 2,
        ..SimulationConfig::default()
    });
    h.call("createAnchor", json!({"name": "A", "transformation": identity_matrix()}))
        .unwrap();
    let handle = h.session.registry().handle_of("A").unwrap();
    h.session
        .provider_mut()
        .set_anchor_tracking(handle, TrackingState::Stopped);

    let mut expired = Vec::new();
    for _ in 0..4 {
        expired.extend(h.session.advance().unwrap().unwrap().expired);
    }
    assert_eq!(expired, vec!["A".to_string()]);
    assert!(!h.session.registry().contains("A"));
}

/// An upload still running when its anchor expires is abandoned, so a new
/// anchor under the same name hosts cleanly.
#[test]
fn expired_anchor_upload_is_cancelled() {
    let mut h = Harness::new(SimulationConfig {
        cloud_latency_frames: 10,
        stopped_grace_frames: 1,
        ..SimulationConfig::default()
    });
    h.session.enable_cloud_mode().unwrap();
    h.call("createAnchor", json!({"name": "A", "transformation": identity_matrix()}))
        .unwrap();
    h.call("hostAnchor", json!({"name": "A"})).unwrap();
    let handle = h.session.registry().handle_of("A").unwrap();
    h.session
        .provider_mut()
        .set_anchor_tracking(handle, TrackingState::Stopped);
    h.frames(4);
    assert!(!h.session.registry().contains("A"));
    assert_eq!(h.session.coordinator().in_flight(), 0);

    let moved = encode(&Pose::from_position([5.0, 5.0, 5.0])).to_vec();
    h.call("createAnchor", json!({"name": "A", "transformation": moved}))
        .unwrap();
    h.call("hostAnchor", json!({"name": "A"})).unwrap();
    assert_eq!(h.session.coordinator().in_flight(), 1);
    h.frames(12);

    let uploads: Vec<_> = h
        .channel
        .messages()
        .into_iter()
        .filter(|m| m.method == "onCloudAnchorUploaded")
        .collect();
    assert_eq!(uploads.len(), 1);
    assert_eq!(uploads[0].args["name"], "A");
    let record = h.session.registry().cloud_record("A").unwrap();
    assert_eq!(
        record.cloud_anchor_id.as_deref(),
        uploads[0].args["cloudanchorid"].as_str()
    );
    assert_eq!(h.session.anchor_pose("A").unwrap().position, [5.0, 5.0, 5.0]);
}

/// Placeholder names cannot be claimed by the host, so an anchor and an
/// in-flight resolve never share a cloud record.
#[test]
fn placeholder_names_are_reserved() {
    let mut h = Harness::cloud();
    let reserved = json!({"name": "resolve-1", "transformation": identity_matrix()});
    let err = h.call("createAnchor", reserved).unwrap_err();
    assert_eq!(err.kind(), "InvalidCommand");

    h.session.provider_mut().seed_cloud_anchor("abc123", Pose::identity());
    h.call("createAnchor", json!({"name": "A", "transformation": identity_matrix()}))
        .unwrap();
    h.call("resolveAnchor", json!({"cloudAnchorId": "abc123"}))
        .unwrap();
    h.call("hostAnchor", json!({"name": "A"})).unwrap();
    assert_eq!(h.session.coordinator().in_flight(), 2);

    h.frames(3);
    let mut methods = h.channel.methods();
    methods.sort();
    assert_eq!(methods, vec!["onAnchorDownloadSuccess", "onCloudAnchorUploaded"]);
}

/// Test 10: dispose releases everything and later commands fail.
#[test]
fn dispose_then_commands_fail() {
    let mut h = Harness::cloud();
    h.call("createAnchor", json!({"name": "A", "transformation": identity_matrix()}))
        .unwrap();
    h.call("dispose", serde_json::Value::Null).unwrap();
    assert_eq!(h.session.provider().live_anchor_count(), 0);
    assert_eq!(
        h.call("getAnchorPose", json!({"name": "A"})).unwrap_err(),
        ArError::Disposed
    );
    assert_eq!(
        h.call("advanceFrames", json!({"count": 1})).unwrap_err(),
        ArError::Disposed
    );
}

proptest! {
    /// Anchors created from a wire matrix report the same pose back.
    #[test]
    fn created_anchor_pose_round_trips(
        x in -100.0f64..100.0, y in -100.0f64..100.0, z in -100.0f64..100.0,
        ax in -1.0f64..1.0, ay in -1.0f64..1.0, az in 0.1f64..1.0,
        angle in -3.1f64..3.1,
    ) {
        let pose = Pose::new([x, y, z], Quaternion::from_axis_angle([ax, ay, az], angle));
        let mut h = Harness::new(SimulationConfig::default());
        h.session.create_anchor(&encode(&pose), "A").unwrap();
        let decoded = h.session.anchor_pose("A").unwrap();
        prop_assert_eq!(decoded.position, pose.position);
        prop_assert!(decoded.rotation.same_rotation(pose.rotation, 1e-9));
        assert_relative_eq!(decoded.rotation.norm(), 1.0, epsilon = 1e-12);
    }
}
