//! In-memory transport standing in for the server, for unit tests.

use alloc::sync::Arc;
use alloc::vec::Vec;
use core::sync::atomic::{AtomicBool, AtomicI32, AtomicIsize, AtomicU32, AtomicU64, Ordering};

use hashbrown::HashMap;
use kiln_core::TransportErrorCode;
use spin::Mutex;

use crate::client::{VirtClient, VirtConfig};
use crate::modules::ModuleMap;
use crate::protocol::{ConnectParams, RegRdWrParams, VirtCmd, WireMsg, MSG_SIZE};
use crate::transport::{QueueConfig, ReplyBuffer, ReplyToken, Transport, TransportResult};

/// Transport that answers like a server backed by a register file
///
/// Reads of registers never written return the inverted offset.
#[derive(Debug, Default)]
pub struct MockTransport {
    pub inits: AtomicU32,
    pub teardowns: AtomicU32,
    pub released: AtomicU32,
    pub fail_init: AtomicBool,
    pub fail_exchange: AtomicBool,
    /// Answer CONNECT with a zero handle
    pub refuse_connect: AtomicBool,
    /// Status put in every reply
    pub remote_status: AtomicI32,
    /// Bytes added to (or removed from) every reply
    pub reply_len_delta: AtomicIsize,
    pub requests: Mutex<Vec<WireMsg>>,
    pub registers: Mutex<HashMap<u32, u32>>,
    next_handle: AtomicU64,
    next_token: AtomicU64,
}

impl MockTransport {
    pub const FIRST_HANDLE: u64 = 0x1000;

    pub fn exchanges(&self) -> usize {
        self.requests.lock().len()
    }

    /// Every REGRDWR round trip sent so far
    pub fn rounds(&self) -> Vec<RegRdWrParams> {
        self.requests
            .lock()
            .iter()
            .filter(|msg| msg.header.cmd == VirtCmd::RegRdWr as u32)
            .map(|msg| msg.params::<RegRdWrParams>())
            .collect()
    }

    fn answer(&self, msg: &WireMsg) -> WireMsg {
        let mut reply = *msg;
        reply.header.ret = self.remote_status.load(Ordering::SeqCst);

        match VirtCmd::from_raw(msg.header.cmd) {
            Some(VirtCmd::Connect) => {
                let mut params = msg.params::<ConnectParams>();
                params.handle = if self.refuse_connect.load(Ordering::SeqCst) {
                    0
                } else {
                    Self::FIRST_HANDLE + self.next_handle.fetch_add(1, Ordering::SeqCst)
                };
                reply.set_params(&params);
            },
            Some(VirtCmd::RegRdWr) => {
                let mut params = msg.params::<RegRdWrParams>();
                let count = params.count as usize;
                let mut registers = self.registers.lock();

                if params.write != 0 {
                    for pair in params.regs[..count * 2].chunks_exact(2) {
                        registers.insert(pair[0], pair[1]);
                    }
                } else {
                    for reg in &mut params.regs[..count] {
                        *reg = registers.get(&*reg).copied().unwrap_or(!*reg);
                    }
                }
                reply.set_params(&params);
            },
            Some(VirtCmd::Disconnect) | None => {},
        }

        reply
    }
}

impl Transport for MockTransport {
    fn init(&self, _config: &QueueConfig) -> TransportResult<()> {
        self.inits.fetch_add(1, Ordering::SeqCst);
        if self.fail_init.load(Ordering::SeqCst) {
            return Err(TransportErrorCode::InitFailed);
        }
        Ok(())
    }

    fn teardown(&self, _config: &QueueConfig) {
        self.teardowns.fetch_add(1, Ordering::SeqCst);
    }

    fn exchange(&self, request: &[u8]) -> TransportResult<ReplyBuffer> {
        let msg = WireMsg::from_bytes(request).ok_or(TransportErrorCode::SendFailed)?;
        self.requests.lock().push(msg);

        if self.fail_exchange.load(Ordering::SeqCst) {
            return Err(TransportErrorCode::SendFailed);
        }

        let mut data = self.answer(&msg).as_bytes().to_vec();
        let delta = self.reply_len_delta.load(Ordering::SeqCst);
        if delta < 0 {
            data.truncate(MSG_SIZE - delta.unsigned_abs());
        } else {
            data.resize(MSG_SIZE + delta as usize, 0xEE);
        }

        Ok(ReplyBuffer {
            token: ReplyToken(self.next_token.fetch_add(1, Ordering::SeqCst)),
            data,
        })
    }

    fn release(&self, _token: ReplyToken) {
        self.released.fetch_add(1, Ordering::SeqCst);
    }
}

/// Client over a fresh mock transport with the default module map
pub fn test_client(config: VirtConfig) -> (VirtClient, Arc<MockTransport>) {
    let transport = Arc::new(MockTransport::default());
    let client = VirtClient::new(transport.clone(), config, ModuleMap::with_defaults())
        .expect("valid config");
    (client, transport)
}
