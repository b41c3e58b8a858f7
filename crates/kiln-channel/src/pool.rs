//! # Channel Pool
//!
//! Fixed set of hardware channel slots shared by every client device of
//! the host.
//!
//! One pool-wide lock serializes the allocation bitmap and every slot's
//! identifier, refcount and bindings. Collaborator calls that touch
//! hardware are made with the lock dropped.

use alloc::sync::Arc;
use alloc::vec::Vec;
use core::time::Duration;

use kiln_core::{
    ChannelId, ClientTag, DeviceData, EngineCaps, EngineOps, Error, HostInfo, JobDesc,
    PowerControl, Result, SlotWaiter, SyncptId, SyncptTable,
};
use spin::Mutex;

use crate::bitmap::AllocBitmap;
use crate::lifecycle::{self, DetachedSlot, ReleaseOutcome};
use crate::slot::{ChannelHandle, ChannelSlot, SlotFlags, SlotStatus};

// =============================================================================
// CONFIGURATION
// =============================================================================

/// Channel pool configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolConfig {
    /// How long `acquire` waits for a free slot, `None` for forever
    pub acquire_timeout: Option<Duration>,
}

impl PoolConfig {
    /// Default acquire timeout
    pub const DEFAULT_ACQUIRE_TIMEOUT: Duration = Duration::from_secs(5);

    /// Wait at most `timeout` for a free slot
    pub const fn bounded(timeout: Duration) -> Self {
        Self {
            acquire_timeout: Some(timeout),
        }
    }

    /// Wait for a free slot forever
    pub const fn unbounded() -> Self {
        Self {
            acquire_timeout: None,
        }
    }
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self::bounded(Self::DEFAULT_ACQUIRE_TIMEOUT)
    }
}

/// Collaborators the pool drives
#[derive(Clone)]
pub struct PoolBackend {
    /// Per-chip channel hooks
    pub engine: Arc<dyn EngineOps>,
    /// Host power control
    pub power: Arc<dyn PowerControl>,
    /// Shared syncpoint table
    pub syncpts: Arc<dyn SyncptTable>,
    /// Wakeup channel for blocked acquirers
    pub waiter: Arc<dyn SlotWaiter>,
}

impl core::fmt::Debug for PoolBackend {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("PoolBackend")
            .field("engine_caps", &self.engine.caps())
            .finish_non_exhaustive()
    }
}

// =============================================================================
// CHANNEL POOL
// =============================================================================

/// Lock-protected pool state
#[derive(Debug)]
pub(crate) struct PoolState {
    pub(crate) slots: Vec<ChannelSlot>,
    pub(crate) allocated: AllocBitmap,
}

/// Pool of hardware channel slots
pub struct ChannelPool {
    host: HostInfo,
    config: PoolConfig,
    pub(crate) state: Mutex<PoolState>,
    pub(crate) engine: Arc<dyn EngineOps>,
    pub(crate) power: Arc<dyn PowerControl>,
    pub(crate) syncpts: Arc<dyn SyncptTable>,
    pub(crate) waiter: Arc<dyn SlotWaiter>,
}

impl ChannelPool {
    /// Create the pool and initialize every slot's hardware
    ///
    /// Slots initialized before a failing one are not rolled back; the
    /// caller drops the whole pool.
    pub fn new(host: HostInfo, config: PoolConfig, backend: PoolBackend) -> Result<Self> {
        if !host.is_valid() {
            log::error!(
                "kiln: bad channel geometry (base {}, count {}, limit {})",
                host.ch_base,
                host.nb_channels,
                host.ch_limit
            );
            return Err(Error::InvalidParameter);
        }

        let count = host.nb_channels as usize;
        let mut slots = Vec::with_capacity(count);

        for index in 0..count {
            let id = host.id_from_index(index);

            if let Err(err) = backend.engine.init_channel(id) {
                log::error!("kiln: failed to init channel {}: {}", id, err);
                return Err(Error::AllocationFailed);
            }

            slots.push(ChannelSlot::new(id));
        }

        log::info!("kiln: {} channels from id {}", count, host.ch_base);

        Ok(Self {
            host,
            config,
            state: Mutex::new(PoolState {
                slots,
                allocated: AllocBitmap::new(count),
            }),
            engine: backend.engine,
            power: backend.power,
            syncpts: backend.syncpts,
            waiter: backend.waiter,
        })
    }

    /// Channel geometry
    pub fn host(&self) -> &HostInfo {
        &self.host
    }

    /// Pool configuration
    pub fn config(&self) -> &PoolConfig {
        &self.config
    }

    /// Number of slots
    pub fn nb_channels(&self) -> usize {
        self.host.nb_channels as usize
    }

    // =========================================================================
    // MAP / UNMAP
    // =========================================================================

    /// Map a channel for `identifier` on behalf of `device`
    ///
    /// A live channel already tagged with `identifier` is shared: its
    /// refcount is raised and no new slot is consumed. Otherwise the first
    /// free slot is taken. With every slot taken the caller blocks until a
    /// release frees one or the configured timeout elapses.
    pub fn acquire(&self, device: &Arc<DeviceData>, identifier: ClientTag) -> Result<ChannelHandle> {
        // A deadline past the clock's range waits forever
        let deadline = self
            .config
            .acquire_timeout
            .and_then(|timeout| self.waiter.now().checked_add(timeout));

        loop {
            let seen = {
                let mut state = self.state.lock();

                if let Some(handle) = Self::share_locked(&mut state, identifier) {
                    return Ok(handle);
                }

                if let Some(index) = state.allocated.find_first_zero() {
                    state.allocated.set(index);

                    let slot = &mut state.slots[index];
                    slot.generation = slot.generation.wrapping_add(1);
                    slot.device = Some(Arc::clone(device));
                    slot.identifier = Some(identifier);
                    slot.refcount = 1;

                    log::debug!("kiln: channel {} mapped to {}", slot.id, device.name);
                    return Ok(slot.handle(index));
                }

                // Sampled under the lock so a release cannot slip in unseen
                self.waiter.epoch()
            };

            let timeout = match deadline {
                None => None,
                Some(deadline) => {
                    let now = self.waiter.now();
                    if now >= deadline {
                        log::warn!("kiln: no free channel for {}", device.name);
                        return Err(Error::Timeout);
                    }
                    Some(deadline - now)
                },
            };

            self.waiter.wait(seen, timeout);
        }
    }

    fn share_locked(state: &mut PoolState, identifier: ClientTag) -> Option<ChannelHandle> {
        let index = state
            .slots
            .iter()
            .position(|s| s.identifier == Some(identifier) && s.is_live())?;

        let slot = &mut state.slots[index];
        slot.refcount += 1;
        Some(slot.handle(index))
    }

    /// Take one more reference on a live channel
    pub fn get_channel(&self, handle: &ChannelHandle) -> Result<()> {
        let mut state = self.state.lock();
        let slot = Self::live_slot_mut(&mut state, handle)?;
        slot.refcount += 1;
        Ok(())
    }

    /// Drop `count` references
    ///
    /// Dropping the last reference tears the slot down before returning.
    /// A count larger than the refcount changes nothing.
    pub fn release(&self, handle: &ChannelHandle, count: u32) -> Result<ReleaseOutcome> {
        let detached = {
            let mut state = self.state.lock();
            let slot = Self::slot_mut(&mut state, handle)?;

            if count > slot.refcount {
                log::warn!(
                    "kiln: channel {} refcount underflow (release {} of {})",
                    slot.id,
                    count,
                    slot.refcount
                );
                return Ok(ReleaseOutcome::Underflow {
                    requested: count,
                    available: slot.refcount,
                });
            }

            if count == 0 || slot.refcount > count {
                slot.refcount -= count;
                return Ok(ReleaseOutcome::Released {
                    remaining: slot.refcount,
                });
            }

            slot.refcount = 0;
            DetachedSlot {
                index: handle.index,
                id: slot.id,
                device: slot.device.clone(),
                syncpts: core::mem::take(&mut slot.syncpts),
                client_managed_syncpt: slot.client_managed_syncpt.take(),
            }
        };

        Ok(ReleaseOutcome::TornDown(lifecycle::unmap(self, detached)))
    }

    /// Forget `identifier` without releasing the channel
    ///
    /// Returns whether a slot carried the tag.
    pub fn remove_identifier(&self, identifier: ClientTag) -> bool {
        let mut state = self.state.lock();

        match state
            .slots
            .iter_mut()
            .find(|s| s.identifier == Some(identifier))
        {
            Some(slot) => {
                slot.identifier = None;
                true
            },
            None => false,
        }
    }

    /// Find the live channel tagged with `identifier`
    pub fn find(&self, identifier: ClientTag) -> Option<ChannelHandle> {
        let state = self.state.lock();
        state
            .slots
            .iter()
            .enumerate()
            .find(|(_, s)| s.identifier == Some(identifier) && s.is_live())
            .map(|(index, s)| s.handle(index))
    }

    /// Look up the current allocation of a channel by hardware id
    pub fn handle_for(&self, id: ChannelId) -> Option<ChannelHandle> {
        let index = self.host.index_from_id(id)?;
        let state = self.state.lock();
        state.slots.get(index).map(|slot| slot.handle(index))
    }

    // =========================================================================
    // SYNCPOINTS
    // =========================================================================

    /// Bind a syncpoint to a live channel
    pub fn bind_syncpt(&self, handle: &ChannelHandle, id: SyncptId) -> Result<()> {
        let mut state = self.state.lock();
        let slot = Self::live_slot_mut(&mut state, handle)?;

        if slot.syncpts.contains(&id) {
            return Ok(());
        }
        slot.syncpts
            .try_push(id)
            .map_err(|_| Error::ResourceExhausted)
    }

    /// Set the client-managed syncpoint of a live channel
    pub fn set_client_managed_syncpt(&self, handle: &ChannelHandle, id: SyncptId) -> Result<()> {
        let mut state = self.state.lock();
        let slot = Self::live_slot_mut(&mut state, handle)?;
        slot.client_managed_syncpt = Some(id);
        Ok(())
    }

    // =========================================================================
    // ENGINE PASSTHROUGH
    // =========================================================================

    /// Submit a job on a live channel
    pub fn submit(&self, handle: &ChannelHandle, job: &JobDesc) -> Result<u32> {
        let id = {
            let mut state = self.state.lock();
            Self::live_slot_mut(&mut state, handle)?.id
        };

        self.engine.submit(id, job)
    }

    /// Program the gather filter of a live channel
    pub fn init_gather_filter(&self, handle: &ChannelHandle) -> Result<()> {
        let id = {
            let mut state = self.state.lock();
            Self::live_slot_mut(&mut state, handle)?.id
        };

        if self.engine.caps().contains(EngineCaps::GATHER_FILTER) {
            self.engine.init_gather_filter(id);
        }
        Ok(())
    }

    /// Stop the command stream of every mapped channel
    pub fn suspend(&self) {
        for id in self.bound_channels() {
            self.engine.stop_stream(id);
        }
    }

    fn bound_channels(&self) -> Vec<ChannelId> {
        let state = self.state.lock();
        state
            .slots
            .iter()
            .filter(|s| s.device.is_some())
            .map(|s| s.id)
            .collect()
    }

    // =========================================================================
    // OBSERVATION
    // =========================================================================

    /// Snapshot of one slot
    pub fn slot_status(&self, handle: &ChannelHandle) -> Result<SlotStatus> {
        let mut state = self.state.lock();
        let allocated = state.allocated.test(handle.index);
        Ok(Self::slot_mut(&mut state, handle)?.status(allocated))
    }

    /// Number of allocated slots
    pub fn allocated_count(&self) -> usize {
        self.state.lock().allocated.count_ones()
    }

    /// Handles of slots whose last teardown leaked resources
    pub fn degraded(&self) -> Vec<ChannelHandle> {
        let state = self.state.lock();
        state
            .slots
            .iter()
            .enumerate()
            .filter(|(_, s)| s.flags.contains(SlotFlags::DEGRADED))
            .map(|(index, s)| s.handle(index))
            .collect()
    }

    /// Acknowledge a degraded slot
    pub fn clear_degraded(&self, handle: &ChannelHandle) -> Result<()> {
        let mut state = self.state.lock();
        Self::slot_mut(&mut state, handle)?
            .flags
            .remove(SlotFlags::DEGRADED);
        Ok(())
    }

    // =========================================================================
    // DETACH
    // =========================================================================

    /// Stop every mapped channel and free the slot list
    pub fn shutdown(self) {
        let mapped = self.bound_channels();
        if !mapped.is_empty() {
            log::warn!("kiln: {} channels still mapped at detach", mapped.len());
        }
        for id in mapped {
            self.engine.stop_stream(id);
        }

        log::info!("kiln: channel list freed");
    }

    // =========================================================================
    // HELPERS
    // =========================================================================

    fn slot_mut<'a>(state: &'a mut PoolState, handle: &ChannelHandle) -> Result<&'a mut ChannelSlot> {
        match state.slots.get_mut(handle.index) {
            Some(slot) if slot.id == handle.id && slot.generation == handle.generation => Ok(slot),
            _ => Err(Error::NotFound),
        }
    }

    fn live_slot_mut<'a>(
        state: &'a mut PoolState,
        handle: &ChannelHandle,
    ) -> Result<&'a mut ChannelSlot> {
        let slot = Self::slot_mut(state, handle)?;
        if slot.is_live() {
            Ok(slot)
        } else {
            Err(Error::NotFound)
        }
    }
}

impl core::fmt::Debug for ChannelPool {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("ChannelPool")
            .field("host", &self.host)
            .field("config", &self.config)
            .field("allocated", &self.allocated_count())
            .finish_non_exhaustive()
    }
}

static_assertions::assert_impl_all!(ChannelPool: Send, Sync);
static_assertions::assert_impl_all!(ChannelHandle: Send, Sync, Copy);

#[cfg(all(test, feature = "std"))]
mod tests {
    use super::*;
    use crate::test_helpers::*;
    use kiln_core::{ModuleId, ResourcePolicy};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::thread;

    fn device(name: &'static str) -> Arc<DeviceData> {
        Arc::new(DeviceData::new(name, ModuleId::VIC, ResourcePolicy::PerChannel))
    }

    #[test]
    fn test_init_assigns_sequential_ids() {
        let (pool, backend) = test_pool(3, PoolConfig::default());
        assert_eq!(pool.nb_channels(), 3);
        assert_eq!(
            backend.engine.calls(),
            [8, 9, 10].map(|id| EngineCall::Init(ChannelId::new(id)))
        );
        assert_eq!(pool.allocated_count(), 0);
    }

    #[test]
    fn test_init_failure_reports_allocation_error() {
        let backend = TestBackend::new(TestEngine {
            fail_init: Some(9),
            ..TestEngine::default()
        });
        let err = ChannelPool::new(HostInfo::new(3, 8, 64), PoolConfig::default(), backend.backend())
            .unwrap_err();
        assert_eq!(err, Error::AllocationFailed);
    }

    #[test]
    fn test_bad_geometry_rejected() {
        let backend = TestBackend::new(TestEngine::default());
        let err = ChannelPool::new(HostInfo::new(4, 6, 8), PoolConfig::default(), backend.backend())
            .unwrap_err();
        assert_eq!(err, Error::InvalidParameter);
        assert!(backend.engine.calls().is_empty());
    }

    #[test]
    fn test_acquire_binds_first_free_slot() {
        let (pool, _backend) = test_pool(2, PoolConfig::default());
        let vic = device("vic");

        let a = pool.acquire(&vic, ClientTag::new(1)).unwrap();
        let b = pool.acquire(&vic, ClientTag::new(2)).unwrap();
        assert_eq!(a.id(), ChannelId::new(8));
        assert_eq!(b.id(), ChannelId::new(9));

        let status = pool.slot_status(&a).unwrap();
        assert!(status.allocated);
        assert_eq!(status.refcount, 1);
        assert_eq!(status.identifier, Some(ClientTag::new(1)));
        assert_eq!(status.device, Some("vic"));
    }

    #[test]
    fn test_same_identifier_shares_slot() {
        let (pool, _backend) = test_pool(2, PoolConfig::default());
        let vic = device("vic");

        let first = pool.acquire(&vic, ClientTag::new(7)).unwrap();
        let second = pool.acquire(&vic, ClientTag::new(7)).unwrap();

        assert_eq!(first, second);
        assert_eq!(pool.allocated_count(), 1);
        assert_eq!(pool.slot_status(&first).unwrap().refcount, 2);
        assert_eq!(pool.find(ClientTag::new(7)), Some(first));
    }

    #[test]
    fn test_release_to_zero_frees_slot() {
        let (pool, backend) = test_pool(1, PoolConfig::default());
        let vic = device("vic");

        let handle = pool.acquire(&vic, ClientTag::new(1)).unwrap();
        pool.get_channel(&handle).unwrap();

        let outcome = pool.release(&handle, 1).unwrap();
        assert_eq!(outcome, ReleaseOutcome::Released { remaining: 1 });
        assert_eq!(backend.engine.count(|c| matches!(c, EngineCall::Stop(_))), 0);

        let outcome = pool.release(&handle, 1).unwrap();
        assert!(outcome.is_torn_down());
        assert_eq!(backend.engine.count(|c| matches!(c, EngineCall::Stop(_))), 1);
        assert_eq!(pool.allocated_count(), 0);

        let status = pool.slot_status(&handle).unwrap();
        assert!(!status.allocated);
        assert_eq!(status.identifier, None);
        assert_eq!(status.device, None);

        // The freed slot is handed out again
        let again = pool.acquire(&vic, ClientTag::new(2)).unwrap();
        assert_eq!(again.id(), handle.id());
        assert_ne!(again.generation(), handle.generation());
    }

    #[test]
    fn test_release_with_count_tears_down_once() {
        let (pool, backend) = test_pool(1, PoolConfig::default());
        let vic = device("vic");

        let handle = pool.acquire(&vic, ClientTag::new(1)).unwrap();
        pool.acquire(&vic, ClientTag::new(1)).unwrap();
        pool.acquire(&vic, ClientTag::new(1)).unwrap();

        assert!(pool.release(&handle, 3).unwrap().is_torn_down());
        assert_eq!(backend.power.requests.load(Ordering::SeqCst), 1);
        assert_eq!(backend.engine.count(|c| matches!(c, EngineCall::Stop(_))), 1);
    }

    #[test]
    fn test_release_underflow_is_ignored() {
        let (pool, backend) = test_pool(1, PoolConfig::default());
        let vic = device("vic");

        let handle = pool.acquire(&vic, ClientTag::new(1)).unwrap();
        let outcome = pool.release(&handle, 2).unwrap();

        assert_eq!(
            outcome,
            ReleaseOutcome::Underflow {
                requested: 2,
                available: 1
            }
        );
        assert_eq!(pool.slot_status(&handle).unwrap().refcount, 1);
        assert_eq!(backend.power.requests.load(Ordering::SeqCst), 0);

        assert!(pool.release(&handle, 1).unwrap().is_torn_down());
        assert!(matches!(
            pool.release(&handle, 1).unwrap(),
            ReleaseOutcome::Underflow { available: 0, .. }
        ));
        assert_eq!(backend.power.requests.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_remove_identifier_keeps_channel() {
        let (pool, _backend) = test_pool(2, PoolConfig::default());
        let vic = device("vic");

        let handle = pool.acquire(&vic, ClientTag::new(5)).unwrap();
        assert!(pool.remove_identifier(ClientTag::new(5)));
        assert!(!pool.remove_identifier(ClientTag::new(5)));

        let status = pool.slot_status(&handle).unwrap();
        assert!(status.allocated);
        assert_eq!(status.refcount, 1);
        assert_eq!(status.identifier, None);

        // The tag no longer aliases: a new slot is consumed
        let other = pool.acquire(&vic, ClientTag::new(5)).unwrap();
        assert_ne!(other, handle);
        assert_eq!(pool.allocated_count(), 2);
    }

    #[test]
    fn test_exhausted_pool_times_out() {
        let (pool, _backend) = test_pool(1, PoolConfig::bounded(Duration::from_millis(20)));
        let vic = device("vic");

        pool.acquire(&vic, ClientTag::new(1)).unwrap();
        assert_eq!(pool.acquire(&vic, ClientTag::new(2)), Err(Error::Timeout));
    }

    #[test]
    fn test_blocked_acquire_wakes_on_release() {
        let (pool, _backend) = test_pool(1, PoolConfig::bounded(Duration::from_secs(10)));
        let pool = Arc::new(pool);
        let vic = device("vic");

        let held = pool.acquire(&vic, ClientTag::new(1)).unwrap();

        let waiter_pool = Arc::clone(&pool);
        let waiter_dev = Arc::clone(&vic);
        let blocked = thread::spawn(move || waiter_pool.acquire(&waiter_dev, ClientTag::new(2)));

        thread::sleep(Duration::from_millis(20));
        assert!(pool.release(&held, 1).unwrap().is_torn_down());

        let handle = blocked.join().unwrap().unwrap();
        assert_eq!(handle.id(), held.id());
        assert_eq!(
            pool.slot_status(&handle).unwrap().identifier,
            Some(ClientTag::new(2))
        );
    }

    #[test]
    fn test_concurrent_allocations_never_exceed_pool() {
        const SLOTS: u32 = 3;
        let (pool, _backend) = test_pool(SLOTS, PoolConfig::unbounded());
        let pool = Arc::new(pool);
        let live = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));

        let workers: Vec<_> = (0..8u64)
            .map(|worker| {
                let pool = Arc::clone(&pool);
                let live = Arc::clone(&live);
                let peak = Arc::clone(&peak);
                thread::spawn(move || {
                    let dev = device("worker");
                    for round in 0..50u64 {
                        let tag = ClientTag::new(worker * 1000 + round);
                        let handle = pool.acquire(&dev, tag).unwrap();

                        let now = live.fetch_add(1, Ordering::SeqCst) + 1;
                        peak.fetch_max(now, Ordering::SeqCst);
                        assert!(pool.allocated_count() <= SLOTS as usize);

                        live.fetch_sub(1, Ordering::SeqCst);
                        assert!(pool.release(&handle, 1).unwrap().is_torn_down());
                    }
                })
            })
            .collect();

        for worker in workers {
            worker.join().unwrap();
        }

        assert!(peak.load(Ordering::SeqCst) <= SLOTS as usize);
        assert_eq!(pool.allocated_count(), 0);
    }

    #[test]
    fn test_bind_syncpt_bounded() {
        let (pool, _backend) = test_pool(1, PoolConfig::default());
        let handle = pool.acquire(&device("vic"), ClientTag::new(1)).unwrap();

        for id in 1..=crate::slot::MAX_SYNCPTS as u32 {
            pool.bind_syncpt(&handle, syncpt(id)).unwrap();
        }
        // Rebinding is a no-op
        pool.bind_syncpt(&handle, syncpt(1)).unwrap();
        assert_eq!(
            pool.bind_syncpt(&handle, syncpt(100)),
            Err(Error::ResourceExhausted)
        );
        assert_eq!(pool.slot_status(&handle).unwrap().syncpts, crate::slot::MAX_SYNCPTS);
    }

    #[test]
    fn test_dead_channel_rejects_operations() {
        let (pool, _backend) = test_pool(1, PoolConfig::default());
        let handle = pool.acquire(&device("vic"), ClientTag::new(1)).unwrap();
        pool.release(&handle, 1).unwrap();

        assert_eq!(pool.get_channel(&handle), Err(Error::NotFound));
        assert_eq!(pool.bind_syncpt(&handle, syncpt(3)), Err(Error::NotFound));
        assert_eq!(pool.submit(&handle, &JobDesc::default()), Err(Error::NotFound));
        assert_eq!(pool.find(ClientTag::new(1)), None);
    }

    #[test]
    fn test_submit_and_gather_filter_delegate() {
        let backend = TestBackend::new(TestEngine {
            caps: EngineCaps::GATHER_FILTER,
            ..TestEngine::default()
        });
        let pool =
            ChannelPool::new(HostInfo::new(1, 0, 4), PoolConfig::default(), backend.backend()).unwrap();
        let handle = pool.acquire(&device("isp"), ClientTag::new(1)).unwrap();

        let job = JobDesc {
            num_cmdbufs: 2,
            syncpt_incrs: 4,
            ..JobDesc::default()
        };
        assert_eq!(pool.submit(&handle, &job), Ok(4));
        pool.init_gather_filter(&handle).unwrap();

        let calls = backend.engine.calls();
        assert!(calls.contains(&EngineCall::Submit(ChannelId::new(0), 2)));
        assert!(calls.contains(&EngineCall::GatherFilter(ChannelId::new(0))));
    }

    #[test]
    fn test_suspend_stops_mapped_channels_only() {
        let (pool, backend) = test_pool(3, PoolConfig::default());
        let a = pool.acquire(&device("vi"), ClientTag::new(1)).unwrap();
        let b = pool.acquire(&device("vi"), ClientTag::new(2)).unwrap();
        pool.release(&b, 1).unwrap();

        pool.suspend();

        let stops: Vec<_> = backend
            .engine
            .calls()
            .into_iter()
            .filter(|c| matches!(c, EngineCall::Stop(_)))
            .collect();
        // One stop from b's teardown, one from suspend for a
        assert_eq!(stops, [EngineCall::Stop(b.id()), EngineCall::Stop(a.id())]);
        assert_eq!(pool.slot_status(&a).unwrap().refcount, 1);
    }

    #[test]
    fn test_stale_handle_rejected_after_reuse() {
        let (pool, backend) = test_pool(1, PoolConfig::default());
        let vic = device("vic");

        let stale = pool.acquire(&vic, ClientTag::new(1)).unwrap();
        assert!(pool.release(&stale, 1).unwrap().is_torn_down());

        let current = pool.acquire(&vic, ClientTag::new(2)).unwrap();
        assert_eq!(current.index(), stale.index());

        assert_eq!(pool.release(&stale, 1), Err(Error::NotFound));
        assert_eq!(pool.get_channel(&stale), Err(Error::NotFound));
        assert_eq!(pool.slot_status(&stale), Err(Error::NotFound));

        let status = pool.slot_status(&current).unwrap();
        assert!(status.allocated);
        assert_eq!(status.refcount, 1);
        assert_eq!(status.identifier, Some(ClientTag::new(2)));
        assert_eq!(backend.engine.count(|c| matches!(c, EngineCall::Stop(_))), 1);
    }

    #[test]
    fn test_huge_timeout_waits_without_overflow() {
        let (pool, _backend) = test_pool(1, PoolConfig::bounded(Duration::MAX));
        let handle = pool.acquire(&device("vic"), ClientTag::new(1)).unwrap();
        assert_eq!(handle.id(), ChannelId::new(8));
    }

    #[test]
    fn test_underflow_reports_error_value() {
        let (pool, _backend) = test_pool(1, PoolConfig::default());
        let handle = pool.acquire(&device("vic"), ClientTag::new(1)).unwrap();

        let outcome = pool.release(&handle, 5).unwrap();
        assert_eq!(outcome.error(), Some(Error::RefcountUnderflow));
        assert_eq!(pool.release(&handle, 1).unwrap().error(), None);
    }

    #[test]
    fn test_handle_for_id() {
        let (pool, _backend) = test_pool(2, PoolConfig::default());
        let handle = pool.handle_for(ChannelId::new(9)).unwrap();
        assert_eq!(handle.index(), 1);

        let mapped = pool.acquire(&device("vic"), ClientTag::new(1)).unwrap();
        assert_eq!(pool.handle_for(mapped.id()), Some(mapped));
        assert!(pool.handle_for(ChannelId::new(10)).is_none());
    }
}
