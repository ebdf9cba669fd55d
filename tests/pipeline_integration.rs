//! UDP datagrams in, joint targets out: receiver -> store -> control loop.

use std::{
    collections::HashMap,
    net::UdpSocket,
    sync::Arc,
    thread,
    time::{Duration, Instant},
};

use vmc_bridge::capture::{PoseStore, VmcReceiver};
use vmc_bridge::config::BridgeConfig;
use vmc_bridge::control::{ControlLoop, RigDescriptor};
use vmc_bridge::kinematics::retarget::{L_ELBOW, L_PITCH, L_YAW, R_ELBOW, R_PITCH, R_YAW};
use vmc_bridge::wire::osc::{OscArg, encode_bundle, encode_message};
use vmc_bridge::wire::vmc::{BONE_POS, ROOT_POS};

fn bone(name: &str, p: [f32; 3]) -> Vec<u8> {
    let mut args = vec![OscArg::Str(name.into())];
    args.extend([p[0], p[1], p[2], 0.0, 0.0, 0.0, 1.0].map(OscArg::Float));
    encode_message(BONE_POS, &args)
}

/// T-pose arms in the performer's Y-up frame.
fn t_pose_frame() -> Vec<u8> {
    let mut root = vec![OscArg::Str("root".into())];
    root.extend([0.0f32, 0.0, 0.0, 0.0, 0.0, 0.0, 1.0].map(OscArg::Float));
    encode_bundle(&[
        encode_message(ROOT_POS, &root),
        bone("Hips", [0.0, 1.0, 0.0]),
        bone("LeftUpperArm", [0.2, 1.4, 0.0]),
        bone("LeftLowerArm", [0.5, 1.4, 0.0]),
        bone("LeftHand", [0.75, 1.4, 0.0]),
        bone("RightUpperArm", [-0.2, 1.4, 0.0]),
        bone("RightLowerArm", [-0.5, 1.35, 0.05]),
        bone("RightHand", [-0.6, 1.15, 0.2]),
        // not a humanoid bone, dropped by the receiver
        bone("J_Sec_Hair1", [0.0, 1.7, 0.0]),
    ])
}

fn wait_for<F: Fn() -> bool>(cond: F) -> bool {
    let deadline = Instant::now() + Duration::from_secs(2);
    while Instant::now() < deadline {
        if cond() {
            return true;
        }
        thread::sleep(Duration::from_millis(5));
    }
    false
}

#[test]
fn udp_frame_drives_both_arms() {
    let store = Arc::new(PoseStore::new());
    let mut receiver = VmcReceiver::new(store.clone());
    let addr = receiver.start("127.0.0.1", 0).expect("bind");

    let sender = UdpSocket::bind("127.0.0.1:0").expect("sender");
    sender.send_to(&t_pose_frame(), addr).expect("send");
    assert!(wait_for(|| store.read().map(|s| s.bones.len() == 7).unwrap_or(false)));

    let status = receiver.diagnostics();
    assert_eq!(status.total_packets, 1);
    assert_eq!(status.rejected_bones, 1);
    assert_eq!(status.bone_count, 7);

    let cfg = BridgeConfig::default();
    let mut control = ControlLoop::from_config(&cfg);
    let rig = RigDescriptor::dual_arm("integration");
    let mut out: HashMap<String, f32> = HashMap::new();
    let snapshot = store.read();
    let report = control.tick(snapshot.as_deref(), &rig, &mut |joint: &str, v: f32| {
        out.insert(joint.to_string(), v);
    });

    assert_eq!(report.bones, 7);
    assert_eq!(report.emitted, 6);
    for joint in [L_YAW, L_PITCH, L_ELBOW, R_YAW, R_PITCH, R_ELBOW] {
        let v = out.get(joint).copied().unwrap_or(f32::NAN);
        assert!(v.is_finite(), "{} = {}", joint, v);
    }
    assert_eq!(control.ik_diagnostics().solves, 2);

    receiver.stop();
    assert!(store.read().map(|s| s.is_empty()).unwrap_or(false));
}

#[test]
fn control_loop_keeps_last_targets_when_capture_stops() {
    let store = Arc::new(PoseStore::new());
    let mut receiver = VmcReceiver::new(store.clone());
    let addr = receiver.start("127.0.0.1", 0).expect("bind");
    let sender = UdpSocket::bind("127.0.0.1:0").expect("sender");
    sender.send_to(&t_pose_frame(), addr).expect("send");
    assert!(wait_for(|| store.read().map(|s| !s.is_empty()).unwrap_or(false)));

    let mut control = ControlLoop::from_config(&BridgeConfig::default());
    let rig = RigDescriptor::dual_arm("integration");
    let mut seen = 0usize;
    let snapshot = store.read();
    control.tick(snapshot.as_deref(), &rig, &mut |_: &str, _: f32| seen += 1);
    assert_eq!(seen, 6);

    receiver.stop();
    // no bones and no overrides: nothing new is emitted
    let mut after = 0usize;
    let empty = store.read();
    let report = control.tick(empty.as_deref(), &rig, &mut |_: &str, _: f32| after += 1);
    assert_eq!(report.emitted, 0);
    assert_eq!(after, 0);
}
