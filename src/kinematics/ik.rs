//! ik.rs
//! Damped-least-squares position IK for a 3-DoF arm.
//!
//! Chain: shoulder yaw (Z), shoulder pitch (Y), elbow flex (Y). Both links lie
//! along the local +X axis at zero angles. The solver is stateless; callers
//! warm-start it with the previous frame's answer. It always returns a
//! best-effort result and reports degenerate steps through counters.
//!
//! Math runs in f64 internally so the central-difference Jacobian keeps its
//! precision at small steps.

use log::debug;
use nalgebra::{Matrix3, Rotation3, Vector3};

use crate::config::IkConfig;

/// Solver output. Angles in radians: `[yaw, pitch, elbow]`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct IkSolution {
    pub yaw: f32,
    pub pitch: f32,
    pub elbow: f32,
    /// Update steps applied.
    pub iterations: usize,
    pub converged: bool,
    /// Squared distance from wrist to target at the returned angles.
    pub residual_sq: f64,
    /// Steps whose normal matrix had |det| below the configured threshold.
    pub singular_steps: u32,
    /// Steps whose |Δq| exceeded the configured warning size.
    pub large_steps: u32,
}

impl IkSolution {
    pub fn angles(&self) -> [f32; 3] {
        [self.yaw, self.pitch, self.elbow]
    }
}

/// Wrist position for joint angles `q = [yaw, pitch, elbow]`.
pub fn forward(shoulder: &Vector3<f64>, q: &Vector3<f64>, link1: f64, link2: f64) -> Vector3<f64> {
    let r = Rotation3::from_axis_angle(&Vector3::z_axis(), q[0])
        * Rotation3::from_axis_angle(&Vector3::y_axis(), q[1]);
    let re = r * Rotation3::from_axis_angle(&Vector3::y_axis(), q[2]);
    elbow_position(shoulder, q, link1) + re * Vector3::new(link2, 0.0, 0.0)
}

/// Elbow position for joint angles `q`.
pub fn elbow_position(shoulder: &Vector3<f64>, q: &Vector3<f64>, link1: f64) -> Vector3<f64> {
    let r = Rotation3::from_axis_angle(&Vector3::z_axis(), q[0])
        * Rotation3::from_axis_angle(&Vector3::y_axis(), q[1]);
    shoulder + r * Vector3::new(link1, 0.0, 0.0)
}

pub fn determinant3(m: &Matrix3<f64>) -> f64 {
    m[(0, 0)] * (m[(1, 1)] * m[(2, 2)] - m[(1, 2)] * m[(2, 1)])
        - m[(0, 1)] * (m[(1, 0)] * m[(2, 2)] - m[(1, 2)] * m[(2, 0)])
        + m[(0, 2)] * (m[(1, 0)] * m[(2, 1)] - m[(1, 1)] * m[(2, 0)])
}

/// Transpose of the cofactor matrix.
#[rustfmt::skip]
pub fn adjugate3(m: &Matrix3<f64>) -> Matrix3<f64> {
    let (a00, a01, a02) = (m[(0, 0)], m[(0, 1)], m[(0, 2)]);
    let (a10, a11, a12) = (m[(1, 0)], m[(1, 1)], m[(1, 2)]);
    let (a20, a21, a22) = (m[(2, 0)], m[(2, 1)], m[(2, 2)]);
    Matrix3::new(
        a11 * a22 - a12 * a21, a02 * a21 - a01 * a22, a01 * a12 - a02 * a11,
        a12 * a20 - a10 * a22, a00 * a22 - a02 * a20, a02 * a10 - a00 * a12,
        a10 * a21 - a11 * a20, a01 * a20 - a00 * a21, a00 * a11 - a01 * a10,
    )
}

/// Central-difference Jacobian of the wrist position.
fn jacobian(shoulder: &Vector3<f64>, q: &Vector3<f64>, link1: f64, link2: f64, h: f64) -> Matrix3<f64> {
    let mut j = Matrix3::zeros();
    for i in 0..3 {
        let mut plus = *q;
        let mut minus = *q;
        plus[i] += h;
        minus[i] -= h;
        let d = (forward(shoulder, &plus, link1, link2) - forward(shoulder, &minus, link1, link2)) / (2.0 * h);
        j.set_column(i, &d);
    }
    j
}

/// Contract form: explicit iteration count and damping, remaining tuning at
/// defaults.
pub fn solve(
    shoulder: &Vector3<f32>,
    target: &Vector3<f32>,
    initial: [f32; 3],
    link1: f32,
    link2: f32,
    max_iters: usize,
    damping: f64,
) -> IkSolution {
    let cfg = IkConfig {
        max_iters,
        damping,
        ..IkConfig::default()
    };
    solve_with(shoulder, target, initial, link1, link2, &cfg)
}

pub fn solve_with(
    shoulder: &Vector3<f32>,
    target: &Vector3<f32>,
    initial: [f32; 3],
    link1: f32,
    link2: f32,
    cfg: &IkConfig,
) -> IkSolution {
    let s: Vector3<f64> = shoulder.cast();
    let t: Vector3<f64> = target.cast();
    let (l1, l2) = (link1 as f64, link2 as f64);
    let mut q = Vector3::new(initial[0] as f64, initial[1] as f64, initial[2] as f64);

    let mut out = IkSolution {
        yaw: initial[0],
        pitch: initial[1],
        elbow: initial[2],
        iterations: 0,
        converged: false,
        residual_sq: f64::INFINITY,
        singular_steps: 0,
        large_steps: 0,
    };

    let inputs_finite = s.iter().chain(t.iter()).chain(q.iter()).all(|v| v.is_finite())
        && l1.is_finite()
        && l2.is_finite();
    if !inputs_finite {
        return out;
    }

    let damping_sq = cfg.damping * cfg.damping;
    for _ in 0..cfg.max_iters {
        let err = t - forward(&s, &q, l1, l2);
        if err.norm_squared() < cfg.tolerance_sq {
            break;
        }

        let j = jacobian(&s, &q, l1, l2, cfg.fd_step);
        let jt = j.transpose();
        let a = jt * j + Matrix3::identity() * damping_sq;
        let det = determinant3(&a);

        if !det.is_finite() || det == 0.0 {
            out.singular_steps += 1;
            debug!("[ArmIk] singular normal matrix (det={}), stopping at iteration {}", det, out.iterations);
            break;
        }
        if det.abs() < cfg.singular_det {
            out.singular_steps += 1;
        }

        let dq = adjugate3(&a) * (jt * err) / det;
        if dq.norm() > cfg.step_warn {
            out.large_steps += 1;
            debug!("[ArmIk] large step |dq|={:.3} at det={:.3e}", dq.norm(), det);
        }
        q += dq;
        out.iterations += 1;
    }

    let residual_sq = (t - forward(&s, &q, l1, l2)).norm_squared();
    out.yaw = q[0] as f32;
    out.pitch = q[1] as f32;
    out.elbow = q[2] as f32;
    out.residual_sq = residual_sq;
    out.converged = residual_sq < cfg.tolerance_sq;
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fully_extended_arm_converges_to_zero() {
        let shoulder = Vector3::new(0.1f32, -0.2, 1.3);
        let target = shoulder + Vector3::new(0.3 + 0.25, 0.0, 0.0);
        let sol = solve(&shoulder, &target, [0.0; 3], 0.3, 0.25, 10, 1e-3);
        assert!(sol.converged);
        assert!(sol.residual_sq.sqrt() < 1e-3);
        for a in sol.angles() {
            assert!(a.abs() < 1e-3, "{:?}", sol);
        }
    }

    #[test]
    fn fully_extended_arm_converges_from_a_cold_start() {
        let shoulder = Vector3::new(0.1f32, -0.2, 1.3);
        let target = shoulder + Vector3::new(0.3 + 0.25, 0.0, 0.0);
        let sol = solve(&shoulder, &target, [0.2, 0.15, 0.3], 0.3, 0.25, 10, 1e-3);
        assert!(sol.converged, "{:?}", sol);
        assert!(sol.iterations > 1 && sol.iterations < 10, "{:?}", sol);
        assert!(sol.residual_sq.sqrt() < 1e-3);
        assert!(sol.yaw.abs() < 1e-3, "{:?}", sol);
    }

    #[test]
    fn reaches_a_bent_pose_from_a_cold_start() {
        let shoulder = Vector3::<f64>::zeros();
        let truth = Vector3::new(0.3, -0.2, 0.5);
        let target = forward(&shoulder, &truth, 0.3, 0.25);

        let sol = solve(&Vector3::zeros(), &target.cast(), [0.0, 0.0, 0.1], 0.3, 0.25, 10, 1e-3);
        assert!(sol.converged, "{:?}", sol);
        assert!(sol.iterations > 1, "{:?}", sol);
        for (got, want) in sol.angles().iter().zip(truth.iter()) {
            assert!((*got as f64 - want).abs() < 0.02, "{:?}", sol);
        }
    }

    #[test]
    fn reaches_a_bent_pose_from_a_nearby_guess() {
        let shoulder = Vector3::<f64>::zeros();
        let truth = Vector3::new(0.3, -0.2, 0.5);
        let target = forward(&shoulder, &truth, 0.3, 0.25);

        let sol = solve(
            &Vector3::zeros(),
            &target.cast(),
            [0.2, -0.1, 0.3],
            0.3,
            0.25,
            20,
            1e-3,
        );
        assert!(sol.residual_sq.sqrt() < 1e-3, "{:?}", sol);
        assert!(sol.iterations > 0);
    }

    #[test]
    fn adjugate_over_det_inverts() {
        let m = Matrix3::new(4.0, 1.0, 0.5, 1.0, 3.0, 0.2, 0.5, 0.2, 2.0);
        let inv = adjugate3(&m) / determinant3(&m);
        let id = inv * m;
        assert!((id - Matrix3::identity()).norm() < 1e-12);
        assert!((determinant3(&m) - m.determinant()).abs() < 1e-12);
    }

    #[test]
    fn undamped_extended_start_is_flagged_singular() {
        // pitch and elbow columns are parallel when the arm is straight
        let cfg = IkConfig {
            damping: 0.0,
            ..IkConfig::default()
        };
        let sol = solve_with(
            &Vector3::zeros(),
            &Vector3::new(0.3, 0.2, 0.1),
            [0.0; 3],
            0.3,
            0.25,
            &cfg,
        );
        assert!(sol.singular_steps >= 1, "{:?}", sol);
    }

    #[test]
    fn non_finite_input_returns_the_guess() {
        let sol = solve(
            &Vector3::new(f32::NAN, 0.0, 0.0),
            &Vector3::zeros(),
            [0.1, 0.2, 0.3],
            0.3,
            0.25,
            10,
            1e-3,
        );
        assert_eq!(sol.angles(), [0.1, 0.2, 0.3]);
        assert!(!sol.converged);
        assert_eq!(sol.iterations, 0);
    }

    #[test]
    fn zero_iterations_returns_guess_with_residual() {
        let sol = solve(&Vector3::zeros(), &Vector3::new(0.0, 0.5, 0.0), [0.0; 3], 0.3, 0.25, 0, 1e-3);
        assert_eq!(sol.angles(), [0.0; 3]);
        assert!(!sol.converged);
        assert!(sol.residual_sq > 0.0);
    }
}
