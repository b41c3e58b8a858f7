//! Mock collaborators for unit-testing the channel pool.

use alloc::sync::Arc;
use alloc::vec::Vec;
use core::sync::atomic::{AtomicBool, AtomicI32, AtomicU32, Ordering};

use kiln_core::{
    ChannelId, CondvarWaiter, EngineCaps, EngineOps, Error, HostInfo, JobDesc, PowerControl,
    Result, SyncptId, SyncptTable,
};
use spin::Mutex;
use std::sync::Barrier;

use crate::pool::{ChannelPool, PoolBackend, PoolConfig};

/// A call made on the test engine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineCall {
    Init(ChannelId),
    Stop(ChannelId),
    LowerPriority(ChannelId),
    GatherFilter(ChannelId),
    Submit(ChannelId, u32),
}

/// Holds a teardown inside `stop_stream` until the test lets it go
#[derive(Debug)]
pub struct StopGate {
    pub entered: Barrier,
    pub resume: Barrier,
}

impl StopGate {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            entered: Barrier::new(2),
            resume: Barrier::new(2),
        })
    }
}

/// Engine backend that records every call
#[derive(Debug, Default)]
pub struct TestEngine {
    pub caps: EngineCaps,
    /// Fail `init_channel` for this raw channel id
    pub fail_init: Option<u32>,
    /// Stall every `stop_stream` on this gate
    pub stall: Option<Arc<StopGate>>,
    pub calls: Mutex<Vec<EngineCall>>,
}

impl TestEngine {
    pub fn calls(&self) -> Vec<EngineCall> {
        self.calls.lock().clone()
    }

    pub fn count(&self, f: impl Fn(&EngineCall) -> bool) -> usize {
        self.calls.lock().iter().filter(|c| f(c)).count()
    }
}

impl EngineOps for TestEngine {
    fn caps(&self) -> EngineCaps {
        self.caps
    }

    fn init_channel(&self, channel: ChannelId) -> Result<()> {
        self.calls.lock().push(EngineCall::Init(channel));
        if self.fail_init == Some(channel.raw()) {
            return Err(Error::ResourceExhausted);
        }
        Ok(())
    }

    fn stop_stream(&self, channel: ChannelId) {
        self.calls.lock().push(EngineCall::Stop(channel));
        if let Some(gate) = &self.stall {
            gate.entered.wait();
            gate.resume.wait();
        }
    }

    fn lower_priority(&self, channel: ChannelId) {
        self.calls.lock().push(EngineCall::LowerPriority(channel));
    }

    fn init_gather_filter(&self, channel: ChannelId) {
        self.calls.lock().push(EngineCall::GatherFilter(channel));
    }

    fn submit(&self, channel: ChannelId, job: &JobDesc) -> Result<u32> {
        self.calls.lock().push(EngineCall::Submit(channel, job.num_cmdbufs));
        Ok(job.syncpt_incrs)
    }
}

/// Power control with a switchable failure and an active-request counter
#[derive(Debug, Default)]
pub struct TestPower {
    pub fail: AtomicBool,
    pub active: AtomicI32,
    pub requests: AtomicU32,
}

impl PowerControl for TestPower {
    fn request_active(&self) -> Result<()> {
        self.requests.fetch_add(1, Ordering::SeqCst);
        if self.fail.load(Ordering::SeqCst) {
            return Err(Error::PowerFailed);
        }
        self.active.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn release_active(&self) {
        self.active.fetch_sub(1, Ordering::SeqCst);
    }
}

/// A call made on the syncpoint table
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncptCall {
    MarkUnused(SyncptId),
    PutRef(SyncptId),
}

#[derive(Debug, Default)]
pub struct TestSyncpts {
    pub calls: Mutex<Vec<SyncptCall>>,
}

impl TestSyncpts {
    pub fn calls(&self) -> Vec<SyncptCall> {
        self.calls.lock().clone()
    }
}

impl SyncptTable for TestSyncpts {
    fn mark_unused(&self, id: SyncptId) {
        self.calls.lock().push(SyncptCall::MarkUnused(id));
    }

    fn put_ref(&self, id: SyncptId) {
        self.calls.lock().push(SyncptCall::PutRef(id));
    }
}

/// Every collaborator of a test pool
#[derive(Debug, Clone)]
pub struct TestBackend {
    pub engine: Arc<TestEngine>,
    pub power: Arc<TestPower>,
    pub syncpts: Arc<TestSyncpts>,
    pub waiter: Arc<CondvarWaiter>,
}

impl TestBackend {
    pub fn new(engine: TestEngine) -> Self {
        Self {
            engine: Arc::new(engine),
            power: Arc::new(TestPower::default()),
            syncpts: Arc::new(TestSyncpts::default()),
            waiter: Arc::new(CondvarWaiter::new()),
        }
    }

    pub fn backend(&self) -> PoolBackend {
        PoolBackend {
            engine: self.engine.clone(),
            power: self.power.clone(),
            syncpts: self.syncpts.clone(),
            waiter: self.waiter.clone(),
        }
    }
}

/// Pool of `count` channels starting at id 8
pub fn test_pool(count: u32, config: PoolConfig) -> (ChannelPool, TestBackend) {
    let backend = TestBackend::new(TestEngine::default());
    let pool = ChannelPool::new(HostInfo::new(count, 8, 64), config, backend.backend())
        .expect("pool creation");
    (pool, backend)
}

pub fn syncpt(id: u32) -> SyncptId {
    SyncptId::new(id).expect("nonzero syncpoint")
}
