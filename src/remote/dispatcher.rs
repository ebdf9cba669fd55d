//! dispatcher.rs
//! Rate-limited joint command forwarding to the simulator's HTTP controller.
//! - callers: set_joint() never blocks (name lookup, delta check, clamp, push)
//! - timer thread: pops at most one command per period (50 req/s at 20 ms)
//! - worker thread: single-threaded tokio runtime issuing the GETs in order
//! - link health: consecutive failures mark the link down; probes bring it back
//! - every command carries the destination generation it was queued for, so
//!   nothing queued for an old address reaches or affects a new one
//! - delta history is tagged the same way; entries from an older generation
//!   never suppress a send

use std::{
    sync::{
        Arc,
        atomic::{AtomicBool, AtomicU64, Ordering},
    },
    thread::{self, JoinHandle},
    time::Instant,
};

use crossbeam_queue::ArrayQueue;
use dashmap::DashMap;
use log::{debug, error, info, warn};
use parking_lot::{Mutex, RwLock};
use spin_sleep::{SpinSleeper, SpinStrategy};
use thread_priority::{ThreadBuilderExt, ThreadPriority};
use tokio::sync::mpsc;

use crate::config::DispatchConfig;
use crate::control::bus::{JointCommands, JointSink};
use crate::error::DispatchError;
use crate::remote::http::{self, GET_STATS_PATH};
use crate::remote::joint_map::JointMap;
use crate::utils::metrics::{DispatchStats, DispatchStatsSnapshot};

/// A clamp counts only when it moved the value by more than this.
const CLAMP_EPSILON: f32 = 0.001;
/// Send failures are logged on every Nth occurrence once past the threshold.
const FAILURE_LOG_EVERY: u64 = 50;

#[derive(Debug, Clone, Copy)]
struct Command {
    index: u32,
    value: f32,
    generation: u64,
}

enum Job {
    Send(Command),
    Probe { generation: u64 },
}

#[derive(Debug, Clone)]
struct Destination {
    host: String,
    port: u16,
    generation: u64,
}

struct Shared {
    cfg: DispatchConfig,
    joints: JointMap,
    destination: RwLock<Destination>,
    client: reqwest::Client,
    queue: ArrayQueue<Command>,
    /// joint -> (generation, last queued value)
    last_sent: DashMap<String, (u64, f32)>,
    unknown_warnings: DashMap<String, u32>,
    stats: DispatchStats,
    connected: AtomicBool,
    running: AtomicBool,
    probe_pending: AtomicBool,
    last_probe: Mutex<Option<Instant>>,
    generation: AtomicU64,
}

impl Shared {
    fn generation(&self) -> u64 {
        self.generation.load(Ordering::Acquire)
    }

    fn failures(&self) -> u64 {
        self.stats.consecutive_failures.load(Ordering::Relaxed)
    }

    fn link_down(&self) -> bool {
        self.failures() >= self.cfg.max_failures as u64
    }

    fn mark_success(&self, via: &str) {
        self.stats.consecutive_failures.store(0, Ordering::Relaxed);
        if !self.connected.swap(true, Ordering::AcqRel) {
            let dest = self.destination.read();
            info!("[Dispatcher] connected to {}:{} ({})", dest.host, dest.port, via);
        }
    }

    fn mark_failure(&self, err: &DispatchError) {
        DispatchStats::bump(&self.stats.failed);
        let failures = DispatchStats::bump(&self.stats.consecutive_failures);
        let max = self.cfg.max_failures as u64;
        if failures == max {
            self.connected.store(false, Ordering::Release);
            error!("[Dispatcher] connection lost after {} consecutive failures: {}", max, err);
        } else if failures % FAILURE_LOG_EVERY == 0 {
            warn!("[Dispatcher] send failing ({} consecutive): {}", failures, err);
        } else {
            debug!("[Dispatcher] send failed: {}", err);
        }
    }
}

pub struct Dispatcher {
    shared: Arc<Shared>,
    jobs: Option<mpsc::Sender<Job>>,
    timer: Option<JoinHandle<()>>,
    worker: Option<JoinHandle<()>>,
}

impl Dispatcher {
    /// Spawns the timer and worker threads and queues an initial probe.
    pub fn start(cfg: DispatchConfig, joints: JointMap) -> Result<Self, DispatchError> {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()?;
        let client = http::client()?;

        let shared = Arc::new(Shared {
            client,
            queue: ArrayQueue::new(cfg.queue_capacity.max(1)),
            destination: RwLock::new(Destination {
                host: cfg.host.clone(),
                port: cfg.port,
                generation: 0,
            }),
            cfg,
            joints,
            last_sent: DashMap::new(),
            unknown_warnings: DashMap::new(),
            stats: DispatchStats::default(),
            connected: AtomicBool::new(false),
            running: AtomicBool::new(true),
            probe_pending: AtomicBool::new(false),
            last_probe: Mutex::new(None),
            generation: AtomicU64::new(0),
        });

        let (tx, rx) = mpsc::channel::<Job>(shared.cfg.queue_capacity.max(1));

        let worker = {
            let shared = shared.clone();
            thread::Builder::new()
                .name("dispatch-worker".to_string())
                .spawn(move || runtime.block_on(worker_loop(shared, rx)))?
        };

        let timer = {
            let shared = shared.clone();
            let tx = tx.clone();
            thread::Builder::new()
                .name("dispatch-timer".to_string())
                .spawn_with_priority(ThreadPriority::Max, move |_| timer_loop(shared, tx))?
        };

        let dispatcher = Self {
            shared,
            jobs: Some(tx),
            timer: Some(timer),
            worker: Some(worker),
        };
        dispatcher.request_probe();
        info!(
            "[Dispatcher] started for {} ({} joints, period {} ms)",
            dispatcher.remote_address(),
            dispatcher.shared.joints.len(),
            dispatcher.shared.cfg.period_ms
        );
        Ok(dispatcher)
    }

    /// Non-blocking. Unknown names and sub-threshold changes are dropped.
    pub fn set_joint(&self, joint: &str, radians: f32) {
        let s = &self.shared;
        let Some(mapping) = s.joints.get(joint) else {
            self.warn_unknown(joint);
            return;
        };
        if !radians.is_finite() {
            debug!("[Dispatcher] non-finite value for {} dropped", joint);
            return;
        }

        // read once: a reconnect racing this call leaves at most a stale entry
        let generation = s.generation();
        let last = s
            .last_sent
            .get(joint)
            .and_then(|e| (e.0 == generation).then_some(e.1));
        if let Some(last) = last {
            if (radians - last).abs() < s.cfg.delta_threshold {
                DispatchStats::bump(&s.stats.delta_skipped);
                return;
            }
        }

        let clamped = mapping.clamp(radians);
        if (clamped - radians).abs() > CLAMP_EPSILON {
            DispatchStats::bump(&s.stats.range_clamped);
        }

        let cmd = Command {
            index: mapping.index,
            value: clamped,
            generation,
        };
        match s.queue.push(cmd) {
            Ok(()) => {
                s.last_sent
                    .entry(joint.to_string())
                    .and_modify(|e| {
                        if e.0 <= generation {
                            *e = (generation, clamped);
                        }
                    })
                    .or_insert((generation, clamped));
                DispatchStats::bump(&s.stats.queued);
            }
            Err(_) => {
                DispatchStats::bump(&s.stats.queue_full);
            }
        }
    }

    pub fn set_joints(&self, joints: &JointCommands) {
        for (name, value) in joints {
            self.set_joint(name, *value);
        }
    }

    fn warn_unknown(&self, joint: &str) {
        let limit = self.shared.cfg.unknown_warn_limit;
        let mut count = self.shared.unknown_warnings.entry(joint.to_string()).or_insert(0);
        if *count < limit {
            *count += 1;
            warn!("[Dispatcher] unknown joint: {} (warning {} of {})", joint, *count, limit);
        }
    }

    /// Points the dispatcher at a new controller. Queue, delta memory and
    /// failure count are reset; anything already in flight is discarded.
    pub fn reconnect(&self, host: &str, port: u16) {
        let s = &self.shared;
        {
            let mut dest = s.destination.write();
            dest.host = host.to_string();
            dest.port = port;
            dest.generation += 1;
            s.generation.store(dest.generation, Ordering::Release);
        }
        while s.queue.pop().is_some() {}
        s.last_sent.clear();
        s.stats.consecutive_failures.store(0, Ordering::Relaxed);
        s.connected.store(false, Ordering::Release);
        *s.last_probe.lock() = None;
        // a probe still pending for the old address must not block this one
        s.probe_pending.store(false, Ordering::Release);
        info!("[Dispatcher] reconnecting to {}:{}", host, port);
        self.request_probe();
    }

    fn request_probe(&self) {
        if let Some(tx) = &self.jobs {
            queue_probe(&self.shared, tx);
        }
    }

    pub fn is_connected(&self) -> bool {
        self.shared.connected.load(Ordering::Acquire)
    }

    pub fn remote_address(&self) -> String {
        let dest = self.shared.destination.read();
        format!("{}:{}", dest.host, dest.port)
    }

    pub fn supported_joints(&self) -> Vec<String> {
        self.shared.joints.supported_joints()
    }

    pub fn motor_index(&self, joint: &str) -> Option<u32> {
        self.shared.joints.motor_index(joint)
    }

    pub fn stats(&self) -> DispatchStatsSnapshot {
        self.shared.stats.snapshot(self.shared.queue.len())
    }

    /// Remote `get_stats` body. Blocks the caller for at most the probe
    /// timeout; not for use on the control-loop thread.
    pub fn fetch_remote_stats(&self) -> Result<serde_json::Value, DispatchError> {
        let dest = self.shared.destination.read().clone();
        let resp = http::get_blocking(&dest.host, dest.port, GET_STATS_PATH, self.shared.cfg.probe_timeout())?;
        if !resp.is_ok() {
            return Err(DispatchError::BadStatus(resp.status));
        }
        Ok(serde_json::from_str(&resp.body)?)
    }

    pub fn log_stats(&self) {
        let st = self.stats();
        info!("[Dispatcher] === stats ===");
        info!(
            "[Dispatcher]   target: {} {}",
            self.remote_address(),
            if self.is_connected() { "connected" } else { "disconnected" }
        );
        info!("[Dispatcher]   queued: {} | sent: {} | failed: {}", st.queued, st.sent, st.failed);
        info!(
            "[Dispatcher]   delta skipped: {} | range clamped: {} | queue full: {}",
            st.delta_skipped, st.range_clamped, st.queue_full
        );
        info!(
            "[Dispatcher]   suppressed: {} | stale: {} | queue: {} | failures: {}",
            st.suppressed, st.stale_dropped, st.queue_len, st.consecutive_failures
        );
        match self.fetch_remote_stats() {
            Ok(v) => info!("[Dispatcher]   server: {}", v),
            Err(e) => info!("[Dispatcher]   server: unavailable ({})", e),
        }
    }

    /// Stops the timer (bounded by one period), closes the worker channel and
    /// discards anything still queued. Idempotent.
    pub fn shutdown(&mut self) {
        if !self.shared.running.swap(false, Ordering::AcqRel) {
            return;
        }
        info!("[Dispatcher] shutting down");

        if let Some(timer) = self.timer.take() {
            if timer.join().is_err() {
                error!("[Dispatcher] timer thread panicked");
            }
        }
        self.jobs = None;
        if let Some(worker) = self.worker.take() {
            if worker.join().is_err() {
                error!("[Dispatcher] worker thread panicked");
            }
        }

        let mut discarded = 0usize;
        while self.shared.queue.pop().is_some() {
            discarded += 1;
        }
        info!("[Dispatcher] shutdown complete ({} queued commands discarded)", discarded);
    }
}

impl Drop for Dispatcher {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl JointSink for Dispatcher {
    fn apply(&mut self, joint: &str, radians: f32) {
        self.set_joint(joint, radians);
    }
}

fn queue_probe(shared: &Shared, tx: &mpsc::Sender<Job>) {
    if shared.probe_pending.swap(true, Ordering::AcqRel) {
        return;
    }
    *shared.last_probe.lock() = Some(Instant::now());
    let job = Job::Probe {
        generation: shared.generation(),
    };
    if tx.try_send(job).is_err() {
        shared.probe_pending.store(false, Ordering::Release);
    }
}

fn probe_due(shared: &Shared) -> bool {
    match *shared.last_probe.lock() {
        Some(t) => t.elapsed() >= shared.cfg.probe_interval(),
        None => true,
    }
}

// ============================================================================
// Timer: fixed-period release, at most one command per tick
// ============================================================================

fn timer_loop(shared: Arc<Shared>, tx: mpsc::Sender<Job>) {
    let period = shared.cfg.period();
    let sleeper = SpinSleeper::new(100_000).with_spin_strategy(SpinStrategy::YieldThread);
    let mut next_deadline = Instant::now() + period;

    while shared.running.load(Ordering::Acquire) {
        let now = Instant::now();
        if now < next_deadline {
            sleeper.sleep(next_deadline - now);
        }
        next_deadline += period;
        // a long stall must not turn into a burst of catch-up sends
        let now = Instant::now();
        if next_deadline < now {
            next_deadline = now + period;
        }

        if !shared.running.load(Ordering::Acquire) {
            break;
        }

        if shared.link_down() && probe_due(&shared) {
            queue_probe(&shared, &tx);
        }

        let Some(cmd) = shared.queue.pop() else {
            continue;
        };
        if cmd.generation != shared.generation() {
            DispatchStats::bump(&shared.stats.stale_dropped);
            continue;
        }
        if shared.link_down() {
            DispatchStats::bump(&shared.stats.suppressed);
            continue;
        }
        if let Err(e) = tx.try_send(Job::Send(cmd)) {
            // worker backed up behind slow requests
            DispatchStats::bump(&shared.stats.queue_full);
            debug!("[Dispatcher] worker busy, command dropped: {}", e);
        }
    }
    debug!("[Dispatcher] timer exited");
}

// ============================================================================
// Worker: one request at a time, in dequeue order
// ============================================================================

async fn worker_loop(shared: Arc<Shared>, mut rx: mpsc::Receiver<Job>) {
    while let Some(job) = rx.recv().await {
        if !shared.running.load(Ordering::Acquire) {
            break;
        }
        match job {
            Job::Send(cmd) => send_command(&shared, cmd).await,
            Job::Probe { generation } => probe(&shared, generation).await,
        }
    }
    debug!("[Dispatcher] worker exited");
}

async fn send_command(shared: &Shared, cmd: Command) {
    let dest = shared.destination.read().clone();
    if cmd.generation != dest.generation {
        DispatchStats::bump(&shared.stats.stale_dropped);
        return;
    }

    let path = http::set_joint_path(cmd.index, cmd.value);
    let result = http::get(&shared.client, &dest.host, dest.port, &path, shared.cfg.request_timeout()).await;

    // destination changed mid-flight: result belongs to nobody
    if shared.generation() != dest.generation {
        return;
    }
    match result {
        Ok(resp) if resp.is_ok() => {
            DispatchStats::bump(&shared.stats.sent);
            shared.mark_success("send");
        }
        Ok(resp) => shared.mark_failure(&DispatchError::BadStatus(resp.status)),
        Err(e) => shared.mark_failure(&e),
    }
}

async fn probe(shared: &Shared, generation: u64) {
    let dest = shared.destination.read().clone();
    // only the current generation's job may clear the pending flag
    if dest.generation != generation {
        return;
    }
    shared.probe_pending.store(false, Ordering::Release);

    let result = http::get(&shared.client, &dest.host, dest.port, GET_STATS_PATH, shared.cfg.probe_timeout()).await;
    if shared.generation() != generation {
        return;
    }
    match result {
        Ok(resp) if resp.is_ok() => shared.mark_success("probe"),
        Ok(resp) => {
            shared.connected.store(false, Ordering::Release);
            warn!("[Dispatcher] probe of {}:{} returned HTTP {}", dest.host, dest.port, resp.status);
        }
        Err(e) => {
            shared.connected.store(false, Ordering::Release);
            if shared.link_down() {
                debug!("[Dispatcher] probe of {}:{} failed: {}", dest.host, dest.port, e);
            } else {
                error!("[Dispatcher] cannot reach {}:{}: {}", dest.host, dest.port, e);
            }
        }
    }
}
