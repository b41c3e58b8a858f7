//! # Virtualization Client
//!
//! Per-module connections to the virtualization server and the blocking
//! request/reply exchange every command goes through.
//!
//! ## Connection States
//!
//! ```text
//!                 connect                reply, handle != 0
//! Disconnected ──────────▶ Connecting ──────────────────────▶ Connected
//!      ▲                       │                                  │
//!      └───────────────────────┴──────────────────────────────────┘
//!          handle == 0 / transport error            teardown
//! ```
//!
//! The primary module (the host controller) additionally owns the
//! transport: its `init` brings the transport up and its `teardown` takes
//! it down. A module that is already connected keeps its handle when
//! connected again.

use alloc::sync::Arc;
use core::sync::atomic::{AtomicBool, Ordering};

use hashbrown::HashMap;
use kiln_core::{Error, ModuleId, Result, TransportErrorCode};
use spin::Mutex;

use crate::modules::ModuleMap;
use crate::protocol::{VirtReply, VirtRequest, WireMsg, MSG_SIZE, REGRDWR_ARRAY_SIZE};
use crate::transport::{QueueConfig, Transport};

// =============================================================================
// CONFIGURATION
// =============================================================================

/// Virtualization client configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VirtConfig {
    /// Transport queue layout
    pub queue: QueueConfig,
    /// Register operations per read round trip; writes carry half
    pub regrdwr_capacity: usize,
    /// Module that owns the transport
    pub primary_module: ModuleId,
}

impl Default for VirtConfig {
    fn default() -> Self {
        Self {
            queue: QueueConfig::default(),
            regrdwr_capacity: REGRDWR_ARRAY_SIZE,
            primary_module: ModuleId::HOST,
        }
    }
}

impl VirtConfig {
    /// Check the configuration
    ///
    /// The capacity can be lowered below the payload size but never raised,
    /// and a write round trip must carry at least one pair.
    pub fn is_valid(&self) -> bool {
        (2..=REGRDWR_ARRAY_SIZE).contains(&self.regrdwr_capacity) && self.queue.is_valid()
    }
}

// =============================================================================
// CONNECTIONS
// =============================================================================

/// Connection state of one module
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnState {
    /// No handle
    Disconnected,
    /// CONNECT in flight
    Connecting,
    /// Holding a remote handle
    Connected,
}

/// Connection of one module to the server
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VirtConnection {
    module: ModuleId,
    handle: u64,
    state: ConnState,
}

impl VirtConnection {
    fn new(module: ModuleId) -> Self {
        Self {
            module,
            handle: 0,
            state: ConnState::Disconnected,
        }
    }

    /// Local module id
    pub fn module(&self) -> ModuleId {
        self.module
    }

    /// Remote handle, 0 unless connected
    pub fn handle(&self) -> u64 {
        self.handle
    }

    /// Connection state
    pub fn state(&self) -> ConnState {
        self.state
    }

    /// Check for a usable handle
    pub fn is_connected(&self) -> bool {
        self.state == ConnState::Connected && self.handle != 0
    }
}

// =============================================================================
// CLIENT
// =============================================================================

/// Client side of the virtualization protocol
pub struct VirtClient {
    transport: Arc<dyn Transport>,
    config: VirtConfig,
    pub(crate) modules: ModuleMap,
    connections: Mutex<HashMap<ModuleId, VirtConnection>>,
    /// Set between a successful primary `init` and its unwind or teardown
    transport_up: AtomicBool,
}

impl VirtClient {
    /// Create a client over `transport`
    pub fn new(transport: Arc<dyn Transport>, config: VirtConfig, modules: ModuleMap) -> Result<Self> {
        if !config.is_valid() {
            log::error!(
                "kiln: bad virtualization config (regrdwr capacity {})",
                config.regrdwr_capacity
            );
            return Err(Error::InvalidParameter);
        }

        Ok(Self {
            transport,
            config,
            modules,
            connections: Mutex::new(HashMap::new()),
            transport_up: AtomicBool::new(false),
        })
    }

    /// Client configuration
    pub fn config(&self) -> &VirtConfig {
        &self.config
    }

    /// Module translation table
    pub fn modules(&self) -> &ModuleMap {
        &self.modules
    }

    // =========================================================================
    // EXCHANGE
    // =========================================================================

    /// Send one request and block for its reply
    ///
    /// The transport's reply buffer is released exactly once whenever the
    /// exchange itself succeeded. Replies longer than a message are
    /// accepted and their tail is ignored.
    pub fn send_receive(&self, request: &VirtRequest<'_>) -> Result<VirtReply> {
        let msg = request.encode()?;
        let reply = self.transport.exchange(msg.as_bytes())?;

        let parsed = WireMsg::from_bytes(&reply.data);
        let len = reply.data.len();
        self.transport.release(reply.token);

        let Some(reply_msg) = parsed else {
            log::warn!("kiln: short reply ({} of {} bytes)", len, MSG_SIZE);
            return Err(TransportErrorCode::ShortReply.into());
        };

        if len > MSG_SIZE {
            log::warn!("kiln: oversized reply ({} bytes), tail ignored", len);
        }

        VirtReply::decode(request.cmd(), &reply_msg)
    }

    // =========================================================================
    // CONNECT
    // =========================================================================

    /// Connect `module` to the server and return its remote handle
    ///
    /// A module that is already connected returns its current handle
    /// without a round trip.
    pub fn connect(&self, module: ModuleId) -> Result<u64> {
        let remote = self.modules.translate(module)?;

        {
            let mut connections = self.connections.lock();
            let conn = connections
                .entry(module)
                .or_insert_with(|| VirtConnection::new(module));
            if conn.is_connected() {
                return Ok(conn.handle);
            }
            conn.state = ConnState::Connecting;
            conn.handle = 0;
        }

        let handle = match self.send_receive(&VirtRequest::Connect { module: remote }) {
            Ok(VirtReply::Connect { handle }) if handle != 0 => handle,
            Ok(_) => {
                log::error!("kiln: server refused module {}", module);
                self.set_state(module, ConnState::Disconnected, 0);
                return Err(Error::ConnectionFailed);
            },
            Err(err) => {
                log::error!("kiln: connect of module {} failed: {}", module, err);
                self.set_state(module, ConnState::Disconnected, 0);
                return Err(err);
            },
        };

        self.set_state(module, ConnState::Connected, handle);
        log::debug!("kiln: module {} connected, handle {:#x}", module, handle);
        Ok(handle)
    }

    /// Bring up the connection of `module`
    ///
    /// The primary module first brings up the transport and takes it down
    /// again if connecting fails.
    pub fn init(&self, module: ModuleId) -> Result<u64> {
        let primary = module == self.config.primary_module;

        if primary && !self.transport_up.load(Ordering::SeqCst) {
            if let Err(code) = self.transport.init(&self.config.queue) {
                log::error!("kiln: failed to init comm interface: {:?}", code);
                return Err(code.into());
            }
            self.transport_up.store(true, Ordering::SeqCst);
            log::info!("kiln: transport up");
        }

        match self.connect(module) {
            Ok(handle) => Ok(handle),
            Err(_) => {
                log::error!("kiln: failed to connect to server node");
                if primary {
                    self.connections.lock().remove(&module);
                    self.take_transport_down();
                }
                Err(Error::ConnectionFailed)
            },
        }
    }

    /// Drop the connection of `module`
    ///
    /// Local state is cleared even if the server cannot be told. The
    /// primary module also takes the transport down if its `init`
    /// brought it up and nothing has taken it down since.
    pub fn teardown(&self, module: ModuleId) {
        let conn = self.connections.lock().remove(&module);

        if let Some(conn) = conn.filter(VirtConnection::is_connected) {
            let request = VirtRequest::Disconnect {
                handle: conn.handle,
            };
            if let Err(err) = self.send_receive(&request) {
                log::warn!("kiln: disconnect of module {} failed: {}", module, err);
            }
        }

        if module == self.config.primary_module {
            self.take_transport_down();
        }
    }

    fn take_transport_down(&self) {
        if self.transport_up.swap(false, Ordering::SeqCst) {
            self.transport.teardown(&self.config.queue);
            log::info!("kiln: transport down");
        }
    }

    /// Connection record of `module`
    pub fn connection(&self, module: ModuleId) -> Option<VirtConnection> {
        self.connections.lock().get(&module).copied()
    }

    /// Remote handle of a connected module
    pub fn handle(&self, module: ModuleId) -> Result<u64> {
        self.connection(module)
            .filter(VirtConnection::is_connected)
            .map(|conn| conn.handle)
            .ok_or(Error::ConnectionFailed)
    }

    fn set_state(&self, module: ModuleId, state: ConnState, handle: u64) {
        let mut connections = self.connections.lock();
        let conn = connections
            .entry(module)
            .or_insert_with(|| VirtConnection::new(module));
        conn.state = state;
        conn.handle = handle;
    }
}

impl core::fmt::Debug for VirtClient {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("VirtClient")
            .field("config", &self.config)
            .field("modules", &self.modules.len())
            .field("connections", &self.connections.lock().len())
            .finish_non_exhaustive()
    }
}

static_assertions::assert_impl_all!(VirtClient: Send, Sync);
