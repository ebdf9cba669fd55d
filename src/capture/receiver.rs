//! receiver.rs
//! UDP listener feeding the pose store.
//! - one socket, one background thread, started and stopped explicitly
//! - each datagram is decoded and applied to the store as one commit
//! - stop() unblocks the pending recv by shutting the socket down, not by polling
//! - transport errors end the listener only; the status surface reports them

use std::{
    io::ErrorKind,
    net::{IpAddr, Ipv4Addr, Ipv6Addr, Shutdown, SocketAddr, ToSocketAddrs, UdpSocket},
    sync::Arc,
    thread::{self, JoinHandle},
};

use log::{debug, error, info, warn};
use parking_lot::Mutex;
use socket2::{Domain, Protocol, SockRef, Socket, Type};

use crate::capture::bones::is_standard_bone;
use crate::capture::pose::BoneSnapshot;
use crate::capture::pose_store::PoseStore;
use crate::error::{ReceiverError, Result};
use crate::utils::metrics::{ReceiverDiagnostics, ReceiverStatus};
use crate::wire::osc;
use crate::wire::vmc::{VmcEvent, is_vmc_address};

pub const DEFAULT_PORT: u16 = 39539;
pub const DEFAULT_RECV_BUFFER: usize = 1024 * 1024;
const MAX_DATAGRAM: usize = 65_536;

pub struct VmcReceiver {
    store: Arc<PoseStore>,
    diag: Arc<ReceiverDiagnostics>,
    last_error: Arc<Mutex<Option<String>>>,
    recv_buffer_bytes: usize,
    socket: Option<UdpSocket>,
    local_addr: Option<SocketAddr>,
    handle: Option<JoinHandle<()>>,
}

impl VmcReceiver {
    pub fn new(store: Arc<PoseStore>) -> Self {
        Self {
            store,
            diag: Arc::new(ReceiverDiagnostics::new()),
            last_error: Arc::new(Mutex::new(None)),
            recv_buffer_bytes: DEFAULT_RECV_BUFFER,
            socket: None,
            local_addr: None,
            handle: None,
        }
    }

    pub fn with_recv_buffer_size(mut self, bytes: usize) -> Self {
        self.recv_buffer_bytes = bytes;
        self
    }

    /// Binds and spawns the receive thread. A no-op returning the current
    /// address when already running. `""` and `"0.0.0.0"` mean all interfaces.
    pub fn start(&mut self, address: &str, port: u16) -> Result<SocketAddr> {
        if self.diag.is_running() {
            if let Some(addr) = self.local_addr {
                debug!("[VmcReceiver] start ignored, already listening on {}", addr);
                return Ok(addr);
            }
        }
        // a listener that died on a transport error still has a thread to reap
        self.reap();

        let addr = resolve_bind_address(address, port)?;
        let socket = bind_socket(addr, self.recv_buffer_bytes)?;
        let local = socket.local_addr()?;
        let thread_socket = socket.try_clone()?;

        *self.last_error.lock() = None;
        self.diag.set_running(true);

        let store = self.store.clone();
        let diag = self.diag.clone();
        let last_error = self.last_error.clone();
        let spawned = thread::Builder::new()
            .name("vmc-receiver".to_string())
            .spawn(move || receive_loop(thread_socket, &store, &diag, &last_error));

        let handle = match spawned {
            Ok(h) => h,
            Err(e) => {
                self.diag.set_running(false);
                return Err(ReceiverError::Io(e));
            }
        };

        self.socket = Some(socket);
        self.local_addr = Some(local);
        self.handle = Some(handle);
        info!("[VmcReceiver] listening on {}", local);
        Ok(local)
    }

    /// Closes the socket, joins the thread and clears all pose state.
    pub fn stop(&mut self) {
        let was_running = self.diag.is_running();
        self.diag.set_running(false);

        if let Some(socket) = self.socket.take() {
            if let Some(addr) = self.local_addr {
                wake(addr);
            }
            if let Err(e) = SockRef::from(&socket).shutdown(Shutdown::Both) {
                // unconnected UDP reports ENOTCONN but still wakes the reader
                debug!("[VmcReceiver] shutdown: {}", e);
            }
        }
        self.reap();
        self.local_addr = None;

        self.store.clear();
        self.diag.clear_recent();
        if was_running {
            info!("[VmcReceiver] stopped");
        }
    }

    fn reap(&mut self) {
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                error!("[VmcReceiver] receive thread panicked");
            }
        }
        self.socket = None;
    }

    pub fn is_running(&self) -> bool {
        self.diag.is_running()
    }

    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.local_addr.filter(|_| self.is_running())
    }

    pub fn diagnostics(&self) -> ReceiverStatus {
        self.diag.snapshot()
    }

    /// Transport error that ended the last run, if any.
    pub fn last_error(&self) -> Option<String> {
        self.last_error.lock().clone()
    }

    pub fn snapshot(&self) -> Option<Arc<BoneSnapshot>> {
        self.store.read()
    }

    pub fn store(&self) -> &Arc<PoseStore> {
        &self.store
    }
}

impl Drop for VmcReceiver {
    fn drop(&mut self) {
        if self.handle.is_some() {
            self.stop();
        }
    }
}

fn resolve_bind_address(address: &str, port: u16) -> Result<SocketAddr> {
    let address = address.trim();
    if address.is_empty() || address == "0.0.0.0" {
        return Ok(SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), port));
    }
    if let Ok(ip) = address.parse::<IpAddr>() {
        return Ok(SocketAddr::new(ip, port));
    }
    (address, port)
        .to_socket_addrs()
        .ok()
        .and_then(|mut it| it.next())
        .ok_or_else(|| ReceiverError::InvalidAddress(address.to_string()))
}

fn bind_socket(addr: SocketAddr, recv_buffer_bytes: usize) -> Result<UdpSocket> {
    // no SO_REUSEADDR: a port already in use must fail here, not share datagrams
    let socket = Socket::new(Domain::for_address(addr), Type::DGRAM, Some(Protocol::UDP))?;
    if let Err(e) = socket.set_recv_buffer_size(recv_buffer_bytes) {
        warn!("[VmcReceiver] could not set receive buffer to {} bytes: {}", recv_buffer_bytes, e);
    }
    socket
        .bind(&addr.into())
        .map_err(|source| ReceiverError::Bind { addr, source })?;
    Ok(socket.into())
}

/// Sends an empty datagram at the listener so a blocked recv returns.
fn wake(addr: SocketAddr) {
    let target = match addr.ip() {
        IpAddr::V4(ip) if ip.is_unspecified() => SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), addr.port()),
        IpAddr::V6(ip) if ip.is_unspecified() => SocketAddr::new(IpAddr::V6(Ipv6Addr::LOCALHOST), addr.port()),
        _ => addr,
    };
    let local: SocketAddr = if target.is_ipv4() {
        (Ipv4Addr::UNSPECIFIED, 0).into()
    } else {
        (Ipv6Addr::UNSPECIFIED, 0).into()
    };
    if let Ok(s) = UdpSocket::bind(local) {
        let _ = s.send_to(&[], target);
    }
}

fn receive_loop(
    socket: UdpSocket,
    store: &PoseStore,
    diag: &ReceiverDiagnostics,
    last_error: &Mutex<Option<String>>,
) {
    let mut buf = vec![0u8; MAX_DATAGRAM];

    while diag.is_running() {
        match socket.recv_from(&mut buf) {
            // wake-up datagram or shutdown
            Ok((0, _)) => continue,
            Ok((n, _from)) => {
                ingest(&buf[..n], store, diag);
            }
            Err(_) if !diag.is_running() => break,
            Err(e) => match e.kind() {
                ErrorKind::Interrupted
                | ErrorKind::WouldBlock
                | ErrorKind::TimedOut
                | ErrorKind::ConnectionReset => continue,
                _ => {
                    error!("[VmcReceiver] receive failed, listener stopping: {}", e);
                    *last_error.lock() = Some(e.to_string());
                    diag.set_running(false);
                    break;
                }
            },
        }
    }
    debug!("[VmcReceiver] receive loop exited");
}

/// Applies one datagram to the store as a single commit. Returns the number
/// of decoded messages.
pub fn ingest(datagram: &[u8], store: &PoseStore, diag: &ReceiverDiagnostics) -> usize {
    diag.record_packet();

    let (messages, failures) = osc::decode_counted(datagram);
    if failures > 0 {
        diag.record_decode_failures(failures);
        debug!("[VmcReceiver] {} element(s) failed to decode", failures);
    }
    if messages.is_empty() {
        return 0;
    }

    let bone_count = store.write(|w| {
        for msg in &messages {
            diag.record_message(&msg.address, is_vmc_address(&msg.address));
            match VmcEvent::from_message(msg) {
                VmcEvent::Root(t) => w.set_root(t.position, t.rotation),
                VmcEvent::Bone { name, transform } => {
                    if is_standard_bone(&name) {
                        w.set_bone(&name, transform.position, transform.rotation);
                    } else {
                        diag.record_rejected_bone();
                        debug!("[VmcReceiver] rejected bone {:?}", name);
                    }
                }
                VmcEvent::BlendValue { name, value } => w.set_blend(&name, value),
                VmcEvent::BlendApply => w.apply_blends(),
                VmcEvent::Other => diag.record_unknown_address(),
            }
        }
        w.bone_count()
    });
    diag.set_bone_count(bone_count);
    messages.len()
}
