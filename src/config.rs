//! config.rs
//! Typed settings for every stage of the bridge.
//!
//! Each section is `serde`-deserializable with per-field defaults, so a TOML
//! file only needs the keys it overrides. The library takes these structs by
//! value; only the binary reads files.

use std::collections::HashMap;
use std::f64::consts::PI;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ReceiverConfig {
    /// Interface to bind; `""` or `"0.0.0.0"` for all.
    pub bind_address: String,
    pub port: u16,
    pub recv_buffer_bytes: usize,
}

impl Default for ReceiverConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0".to_string(),
            port: crate::capture::receiver::DEFAULT_PORT,
            recv_buffer_bytes: crate::capture::receiver::DEFAULT_RECV_BUFFER,
        }
    }
}

/// Capture-space to robot-space conversion settings.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct MapperConfig {
    /// Uniform position scale, applied after the basis change.
    pub scale: f32,
    /// Left-handed Y-up to right-handed Z-up.
    pub apply_coord_transform: bool,
    pub position_offset: [f32; 3],
    /// World-frame rotation offset, xyzw.
    pub rotation_offset: [f32; 4],
}

impl Default for MapperConfig {
    fn default() -> Self {
        Self {
            scale: 1.0,
            apply_coord_transform: true,
            position_offset: [0.0; 3],
            rotation_offset: [0.0, 0.0, 0.0, 1.0],
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RetargetConfig {
    pub elbow_sign_left: f32,
    pub elbow_sign_right: f32,
}

impl Default for RetargetConfig {
    fn default() -> Self {
        Self {
            elbow_sign_left: 1.0,
            elbow_sign_right: 1.0,
        }
    }
}

/// Damped-least-squares solver tuning.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct IkConfig {
    pub max_iters: usize,
    /// λ in (JᵀJ + λ²I).
    pub damping: f64,
    /// Central-difference step for the Jacobian (radians).
    pub fd_step: f64,
    /// Squared positional error treated as converged.
    pub tolerance_sq: f64,
    /// Estimated links shorter than this use `fallback_link_length`.
    pub min_link_length: f64,
    pub fallback_link_length: f64,
    /// |det| below this counts as a near-singular step.
    pub singular_det: f64,
    /// |Δq| above this counts as a large step.
    pub step_warn: f64,
}

impl Default for IkConfig {
    fn default() -> Self {
        Self {
            max_iters: 10,
            damping: 1e-3,
            fd_step: 1e-4,
            tolerance_sq: 1e-6,
            min_link_length: 1e-4,
            fallback_link_length: 0.25,
            singular_det: 1e-9,
            step_warn: PI,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct BusConfig {
    /// EMA factor in (0, 1]; 1 disables smoothing.
    pub alpha: f32,
}

impl Default for BusConfig {
    fn default() -> Self {
        Self { alpha: 0.30 }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct DispatchConfig {
    pub enabled: bool,
    pub host: String,
    pub port: u16,
    /// One request per period at most.
    pub period_ms: u64,
    pub delta_threshold: f32,
    pub queue_capacity: usize,
    /// Consecutive failures before the link is marked down.
    pub max_failures: u32,
    pub request_timeout_ms: u64,
    pub probe_timeout_ms: u64,
    pub probe_interval_ms: u64,
    /// Warnings per unknown joint name before going quiet.
    pub unknown_warn_limit: u32,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            host: "localhost".to_string(),
            port: 8080,
            period_ms: 20,
            delta_threshold: 0.01,
            queue_capacity: 256,
            max_failures: 10,
            request_timeout_ms: 100,
            probe_timeout_ms: 500,
            probe_interval_ms: 1_000,
            unknown_warn_limit: 3,
        }
    }
}

impl DispatchConfig {
    pub fn period(&self) -> Duration {
        Duration::from_millis(self.period_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    pub fn probe_timeout(&self) -> Duration {
        Duration::from_millis(self.probe_timeout_ms)
    }

    pub fn probe_interval(&self) -> Duration {
        Duration::from_millis(self.probe_interval_ms)
    }
}

/// Whole-process settings read by the `vmc_bridge` binary.
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct BridgeConfig {
    pub control: ControlSection,
    pub receiver: ReceiverConfig,
    pub mapper: MapperConfig,
    pub retarget: RetargetConfig,
    pub ik: IkConfig,
    pub bus: BusConfig,
    pub dispatch: DispatchConfig,
    /// Rig joint name -> remote joint name.
    pub aliases: HashMap<String, String>,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ControlSection {
    pub tick_hz: u32,
    /// 0 runs until interrupted.
    pub run_secs: u64,
}

impl Default for ControlSection {
    fn default() -> Self {
        Self {
            tick_hz: 50,
            run_secs: 0,
        }
    }
}

impl BridgeConfig {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path)?;
        Self::from_toml(&text)
    }

    pub fn from_toml(text: &str) -> Result<Self, ConfigError> {
        let cfg: BridgeConfig = toml::from_str(text)?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |msg: String| Err(ConfigError::Invalid(msg));

        if !(self.bus.alpha > 0.0 && self.bus.alpha <= 1.0) {
            return invalid(format!("bus.alpha must be in (0, 1], got {}", self.bus.alpha));
        }
        if self.control.tick_hz == 0 {
            return invalid("control.tick_hz must be positive".into());
        }
        if !self.mapper.scale.is_finite() || self.mapper.scale == 0.0 {
            return invalid(format!("mapper.scale must be finite and non-zero, got {}", self.mapper.scale));
        }
        if self.ik.fd_step <= 0.0 || self.ik.damping < 0.0 {
            return invalid("ik.fd_step must be positive and ik.damping non-negative".into());
        }
        if self.dispatch.period_ms == 0 || self.dispatch.queue_capacity == 0 {
            return invalid("dispatch.period_ms and dispatch.queue_capacity must be positive".into());
        }
        if self.dispatch.max_failures == 0 {
            return invalid("dispatch.max_failures must be positive".into());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_file_yields_defaults() {
        let cfg = BridgeConfig::from_toml("").expect("defaults");
        assert_eq!(cfg, BridgeConfig::default());
        assert_eq!(cfg.receiver.port, 39539);
        assert_eq!(cfg.dispatch.period_ms, 20);
        assert_eq!(cfg.ik.max_iters, 10);
    }

    #[test]
    fn partial_sections_override_only_given_keys() {
        let cfg = BridgeConfig::from_toml(
            r#"
            [control]
            tick_hz = 60

            [bus]
            alpha = 0.5

            [dispatch]
            enabled = true
            host = "10.0.0.2"

            [aliases]
            left_elbow_joint = "l_el"
            "#,
        )
        .expect("parse");
        assert_eq!(cfg.control.tick_hz, 60);
        assert_eq!(cfg.bus.alpha, 0.5);
        assert!(cfg.dispatch.enabled);
        assert_eq!(cfg.dispatch.host, "10.0.0.2");
        assert_eq!(cfg.dispatch.port, 8080);
        assert_eq!(cfg.aliases.get("left_elbow_joint").map(String::as_str), Some("l_el"));
    }

    #[test]
    fn out_of_range_alpha_is_rejected() {
        let err = BridgeConfig::from_toml("[bus]\nalpha = 0.0\n");
        assert!(matches!(err, Err(ConfigError::Invalid(_))));
        let err = BridgeConfig::from_toml("[bus]\nalpha = 1.5\n");
        assert!(matches!(err, Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn bad_toml_is_a_parse_error() {
        assert!(matches!(BridgeConfig::from_toml("[bus\n"), Err(ConfigError::Parse(_))));
    }

    #[test]
    fn sample_file_parses_and_aliases_every_arm_joint() {
        let cfg = BridgeConfig::from_toml(include_str!("../config/bridge.toml")).expect("sample config");
        assert!(cfg.dispatch.enabled);
        assert_eq!(cfg.aliases.len(), 6);
        let (joints, unresolved) = crate::remote::JointMap::darwin_op().with_aliases(&cfg.aliases);
        assert!(unresolved.is_empty());
        assert_eq!(joints.motor_index("right_elbow_joint"), Some(4));
    }
}
