//! bus.rs
//! Per-cycle arbitration of joint commands.
//!
//! Sources push whole command maps with a numeric priority during a cycle;
//! `resolve_and_apply` then picks one target per rig joint (manual override
//! first, else the highest-priority source that names the joint), clamps it to
//! the joint's limits, smooths it with an EMA and hands it to the sink. Source
//! buffers never outlive the cycle; manual overrides and EMA state do.

use std::collections::HashMap;
use std::f32::consts::PI;

use log::debug;

use crate::control::rig::RigJoint;

/// joint name -> radians
pub type JointCommands = HashMap<String, f32>;

/// Tie-break order among source buffers; larger wins. Manual overrides sit
/// above every buffer regardless of these values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Priority(pub i32);

impl Priority {
    pub const MANUAL: Priority = Priority(100);
    pub const KINEMATICS: Priority = Priority(50);
    pub const RETARGET: Priority = Priority(10);
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct JointLimit {
    pub lower: f32,
    pub upper: f32,
}

impl JointLimit {
    pub const FULL: JointLimit = JointLimit { lower: -PI, upper: PI };

    pub fn new(lower: f32, upper: f32) -> Self {
        Self { lower, upper }
    }

    /// Absent, inverted or non-finite limits become ±180°.
    pub fn effective(limit: Option<&JointLimit>) -> JointLimit {
        match limit {
            Some(l) if l.lower.is_finite() && l.upper.is_finite() && l.upper > l.lower => *l,
            _ => Self::FULL,
        }
    }

    pub fn clamp(&self, value: f32) -> f32 {
        value.clamp(self.lower, self.upper)
    }
}

/// Consumer of resolved joint angles. Called inside the resolve step, so it
/// must not block.
pub trait JointSink {
    fn apply(&mut self, joint: &str, radians: f32);

    /// Hook for rigs that declare resettable physics.
    fn reset_physics(&mut self) {}
}

impl<F: FnMut(&str, f32)> JointSink for F {
    fn apply(&mut self, joint: &str, radians: f32) {
        self(joint, radians)
    }
}

#[derive(Debug, Clone)]
struct SourceBuffer {
    source: String,
    priority: Priority,
    commands: JointCommands,
}

pub struct JointControlBus {
    alpha: f32,
    manual: HashMap<String, f32>,
    sources: Vec<SourceBuffer>,
    ema: HashMap<String, f32>,
}

impl JointControlBus {
    /// `alpha` is clamped into (0, 1]; 1 disables smoothing.
    pub fn new(alpha: f32) -> Self {
        let alpha = if alpha.is_finite() { alpha.clamp(f32::EPSILON, 1.0) } else { 1.0 };
        Self {
            alpha,
            manual: HashMap::new(),
            sources: Vec::new(),
            ema: HashMap::new(),
        }
    }

    pub fn alpha(&self) -> f32 {
        self.alpha
    }

    /// Queues a source buffer for this cycle. Empty maps are ignored; repeat
    /// pushes from one source are kept separately.
    pub fn push(&mut self, source: &str, priority: Priority, commands: JointCommands) {
        if commands.is_empty() {
            return;
        }
        self.sources.push(SourceBuffer {
            source: source.to_string(),
            priority,
            commands,
        });
    }

    /// `Some` sets, `None` clears.
    pub fn set_manual(&mut self, joint: &str, value: Option<f32>) {
        match value {
            Some(v) => {
                self.manual.insert(joint.to_string(), v);
            }
            None => {
                self.manual.remove(joint);
            }
        }
    }

    pub fn clear_manual_all(&mut self) {
        self.manual.clear();
    }

    pub fn manual(&self, joint: &str) -> Option<f32> {
        self.manual.get(joint).copied()
    }

    pub fn smoothed(&self, joint: &str) -> Option<f32> {
        self.ema.get(joint).copied()
    }

    pub fn pending_sources(&self) -> usize {
        self.sources.len()
    }

    /// Controller restart: drops EMA state and this cycle's buffers. Manual
    /// overrides survive.
    pub fn reset(&mut self) {
        self.ema.clear();
        self.sources.clear();
    }

    fn target_for(&self, joint: &str) -> Option<f32> {
        self.manual
            .get(joint)
            .copied()
            .filter(|v| v.is_finite())
            .or_else(|| {
                self.sources
                    .iter()
                    .filter_map(|s| s.commands.get(joint).copied())
                    .find(|v| v.is_finite())
            })
    }

    fn sort_sources(&mut self) {
        // stable: equal priorities keep push order
        self.sources.sort_by(|a, b| b.priority.cmp(&a.priority));
    }

    /// Clamped, unsmoothed targets for this cycle without consuming it.
    pub fn resolve_targets(&mut self, joints: &[RigJoint]) -> Vec<(String, f32)> {
        self.sort_sources();
        joints
            .iter()
            .filter_map(|j| {
                let target = self.target_for(&j.name)?;
                Some((j.name.clone(), JointLimit::effective(j.limit.as_ref()).clamp(target)))
            })
            .collect()
    }

    /// The single output point. Returns how many joints were emitted.
    pub fn resolve_and_apply<S: JointSink + ?Sized>(&mut self, joints: &[RigJoint], sink: &mut S) -> usize {
        self.sort_sources();

        let mut emitted = 0;
        for joint in joints {
            let Some(target) = self.target_for(&joint.name) else {
                continue;
            };
            let target = JointLimit::effective(joint.limit.as_ref()).clamp(target);

            let value = match self.ema.get(&joint.name) {
                Some(prev) => prev + (target - prev) * self.alpha,
                None => target,
            };
            self.ema.insert(joint.name.clone(), value);

            sink.apply(&joint.name, value);
            emitted += 1;
        }

        if !self.sources.is_empty() {
            debug!(
                "[JointBus] resolved {} joints from {:?}",
                emitted,
                self.sources.iter().map(|s| s.source.as_str()).collect::<Vec<_>>()
            );
        }
        self.sources.clear();
        emitted
    }
}
