//! # vmc_bridge entry point
//! Standalone host for the bridge: receiver -> control loop -> dispatcher.
//!
//! ## Usage
//! `vmc_bridge [config.toml]`. Without a path all defaults apply (listen on
//! UDP 39539, dispatcher disabled, dual-arm rig).
//!
//! ## Loop
//! - **Tick:** fixed rate (`control.tick_hz`), spin-sleep paced like every
//!   periodic task in this crate.
//! - **Sink:** the HTTP dispatcher when `dispatch.enabled`, otherwise a
//!   debug-log sink so the pipeline can be watched without a simulator.
//! - **Report:** receiver, IK and dispatcher counters every 5 s.
//! - **Exit:** Ctrl-C, or after `control.run_secs` when non-zero.

use std::{
    path::Path,
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
    thread,
    time::{Duration, Instant},
};

use log::{debug, error, info, warn};
use spin_sleep::{SpinSleeper, SpinStrategy};

use vmc_bridge::{
    BridgeConfig, ControlLoop, Dispatcher, JointMap, JointSink, PoseStore, RigDescriptor, VmcReceiver,
};

const REPORT_INTERVAL: Duration = Duration::from_secs(5);

/// Stand-in sink when no remote controller is configured.
struct LogSink;

impl JointSink for LogSink {
    fn apply(&mut self, joint: &str, radians: f32) {
        debug!("[LogSink] {} = {:.4}", joint, radians);
    }
}

fn main() {
    env_logger::init();

    let cfg = match std::env::args().nth(1) {
        Some(path) => match BridgeConfig::load(Path::new(&path)) {
            Ok(cfg) => {
                info!("[Main] config loaded from {}", path);
                cfg
            }
            Err(e) => {
                error!("[Main] {}: {}", path, e);
                std::process::exit(2);
            }
        },
        None => {
            info!("[Main] no config given, using defaults");
            BridgeConfig::default()
        }
    };

    if let Err(e) = run(cfg) {
        error!("[Main] {}", e);
        std::process::exit(1);
    }
}

fn run(cfg: BridgeConfig) -> Result<(), Box<dyn std::error::Error>> {
    info!("=== VMC BRIDGE START ===");
    let running = Arc::new(AtomicBool::new(true));
    spawn_ctrl_c_watcher(running.clone())?;

    let store = Arc::new(PoseStore::new());
    let mut receiver = VmcReceiver::new(store.clone()).with_recv_buffer_size(cfg.receiver.recv_buffer_bytes);
    receiver.start(&cfg.receiver.bind_address, cfg.receiver.port)?;

    let mut dispatcher = if cfg.dispatch.enabled {
        let (joints, unresolved) = JointMap::darwin_op().with_aliases(&cfg.aliases);
        for alias in unresolved {
            warn!("[Main] alias '{}' points at an unknown joint, ignored", alias);
        }
        Some(Dispatcher::start(cfg.dispatch.clone(), joints)?)
    } else {
        info!("[Main] dispatcher disabled, joint targets go to the debug log");
        None
    };

    let rig = RigDescriptor::dual_arm("vmc_bridge");
    let mut control = ControlLoop::from_config(&cfg);
    let mut log_sink = LogSink;
    match dispatcher.as_mut() {
        Some(d) => control.restart(&rig, d),
        None => control.restart(&rig, &mut log_sink),
    }

    let period = Duration::from_secs_f64(1.0 / cfg.control.tick_hz as f64);
    let sleeper = SpinSleeper::new(100_000).with_spin_strategy(SpinStrategy::YieldThread);
    let run_for = (cfg.control.run_secs > 0).then(|| Duration::from_secs(cfg.control.run_secs));

    let start = Instant::now();
    let mut next_deadline = Instant::now() + period;
    let mut last_report = Instant::now();
    let mut emitted_total = 0u64;

    while running.load(Ordering::Relaxed) {
        if run_for.is_some_and(|d| start.elapsed() >= d) {
            info!("[Main] run time of {} s reached", cfg.control.run_secs);
            break;
        }

        let now = Instant::now();
        if now < next_deadline {
            sleeper.sleep(next_deadline - now);
        }
        next_deadline += period;

        let snapshot = store.read();
        let report = match dispatcher.as_mut() {
            Some(d) => control.tick(snapshot.as_deref(), &rig, d),
            None => control.tick(snapshot.as_deref(), &rig, &mut log_sink),
        };
        emitted_total += report.emitted as u64;

        if last_report.elapsed() >= REPORT_INTERVAL {
            last_report = Instant::now();
            report_status(&receiver, &control, dispatcher.as_ref(), emitted_total);
        }
    }

    info!("[Main] shutting down");
    if let Some(mut d) = dispatcher.take() {
        d.log_stats();
        d.shutdown();
    }
    receiver.stop();
    info!("=== VMC BRIDGE FINISHED ({} ticks) ===", control.ticks());
    Ok(())
}

fn report_status(receiver: &VmcReceiver, control: &ControlLoop, dispatcher: Option<&Dispatcher>, emitted: u64) {
    let rx = receiver.diagnostics();
    info!(
        "[Main] receiver: running={} packets={} vmc={} unknown={} decode_failures={} bones={} last_packet_ms={:?}",
        rx.running,
        rx.total_packets,
        rx.vmc_messages,
        rx.unknown_addresses,
        rx.decode_failures,
        rx.bone_count,
        rx.millis_since_last_packet()
    );
    if let Some(err) = receiver.last_error() {
        warn!("[Main] receiver stopped on error: {}", err);
    }

    let ik = control.ik_diagnostics();
    info!(
        "[Main] control: ticks={} emitted={} ik solves={} converged={} singular_steps={}",
        control.ticks(),
        emitted,
        ik.solves,
        ik.converged,
        ik.singular_steps
    );

    if let Some(d) = dispatcher {
        let st = d.stats();
        info!(
            "[Main] dispatch: {} {} sent={} failed={} queued={} queue={} suppressed={}",
            d.remote_address(),
            if d.is_connected() { "up" } else { "down" },
            st.sent,
            st.failed,
            st.queued,
            st.queue_len,
            st.suppressed
        );
    }
}

/// Flips `running` on Ctrl-C from a small dedicated runtime.
fn spawn_ctrl_c_watcher(running: Arc<AtomicBool>) -> std::io::Result<()> {
    let rt = tokio::runtime::Builder::new_current_thread().enable_all().build()?;
    thread::Builder::new().name("ctrl-c".to_string()).spawn(move || {
        rt.block_on(async {
            match tokio::signal::ctrl_c().await {
                Ok(()) => {
                    info!("[Main] Ctrl-C received");
                    running.store(false, Ordering::Relaxed);
                }
                Err(e) => warn!("[Main] cannot listen for Ctrl-C: {}", e),
            }
        });
    })?;
    Ok(())
}
