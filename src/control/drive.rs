//! drive.rs
//! One control cycle: snapshot -> robot space -> solvers -> bus -> sink.
//! - runs on the host's tick thread; never blocks
//! - retargeting pushes at RETARGET priority, IK at KINEMATICS priority
//! - resolve_and_apply runs every tick, even without bones, so manual
//!   overrides keep flowing

use std::time::{Duration, Instant};

use log::{info, warn};

use crate::capture::pose::BoneSnapshot;
use crate::config::BridgeConfig;
use crate::control::bus::{JointControlBus, JointSink, Priority};
use crate::control::rig::{Capability, RigDescriptor};
use crate::kinematics::{ArmIkSource, ArmRetargeter, CoordinateMapper, IkDiagnostics};

const EMPTY_LOG_INTERVAL: Duration = Duration::from_secs(1);

pub const RETARGET_SOURCE: &str = "retarget";
pub const IK_SOURCE: &str = "ik";

/// What one tick did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TickReport {
    pub bones: usize,
    pub retarget_commands: usize,
    pub ik_commands: usize,
    pub emitted: usize,
}

pub struct ControlLoop {
    mapper: CoordinateMapper,
    retargeter: ArmRetargeter,
    ik: ArmIkSource,
    bus: JointControlBus,
    last_empty_log: Option<Instant>,
    ticks: u64,
}

impl ControlLoop {
    pub fn new(
        mapper: CoordinateMapper,
        retargeter: ArmRetargeter,
        ik: ArmIkSource,
        bus: JointControlBus,
    ) -> Self {
        Self {
            mapper,
            retargeter,
            ik,
            bus,
            last_empty_log: None,
            ticks: 0,
        }
    }

    pub fn from_config(cfg: &BridgeConfig) -> Self {
        Self::new(
            CoordinateMapper::new(&cfg.mapper),
            ArmRetargeter::new(&cfg.retarget),
            ArmIkSource::new(cfg.ik.clone()),
            JointControlBus::new(cfg.bus.alpha),
        )
    }

    pub fn tick<S: JointSink + ?Sized>(
        &mut self,
        snapshot: Option<&BoneSnapshot>,
        rig: &RigDescriptor,
        sink: &mut S,
    ) -> TickReport {
        self.ticks += 1;
        let mut report = TickReport::default();

        match snapshot.filter(|s| !s.is_empty()) {
            Some(snap) => {
                let bones = self.mapper.map_bones(&snap.bones);
                report.bones = bones.len();

                let rt = self.retargeter.commands(&bones);
                report.retarget_commands = rt.len();
                self.bus.push(RETARGET_SOURCE, Priority::RETARGET, rt);

                let ik = self.ik.commands(&bones);
                report.ik_commands = ik.len();
                self.bus.push(IK_SOURCE, Priority::KINEMATICS, ik);
            }
            None => self.log_empty(),
        }

        report.emitted = self.bus.resolve_and_apply(&rig.joints, sink);
        report
    }

    fn log_empty(&mut self) {
        let now = Instant::now();
        let due = self
            .last_empty_log
            .is_none_or(|t| now.duration_since(t) >= EMPTY_LOG_INTERVAL);
        if due {
            warn!("[ControlLoop] no bones in capture snapshot (tick {})", self.ticks);
            self.last_empty_log = Some(now);
        }
    }

    /// Controller restart: drops smoothing and warm-start state and, for rigs
    /// that support it, asks the host to re-seat physics.
    pub fn restart<S: JointSink + ?Sized>(&mut self, rig: &RigDescriptor, sink: &mut S) {
        self.bus.reset();
        self.ik.reset();
        if rig.has(Capability::ResettablePhysics) {
            sink.reset_physics();
        }
        info!("[ControlLoop] restarted for rig '{}'", rig.name);
    }

    pub fn bus(&self) -> &JointControlBus {
        &self.bus
    }

    /// Operator surface: manual overrides go through here.
    pub fn bus_mut(&mut self) -> &mut JointControlBus {
        &mut self.bus
    }

    pub fn ik_diagnostics(&self) -> IkDiagnostics {
        self.ik.diagnostics()
    }

    pub fn ticks(&self) -> u64 {
        self.ticks
    }
}
