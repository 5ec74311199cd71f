//! Edge tracing for instrumented code.
//!
//! Instrumented call sites cannot be handed a context object, so they report
//! edges through a fixed entry point ([`record_edge`], or the unmangled
//! [`fuzzbridge_record_edge`] symbol for non-Rust instrumentation). That entry
//! point writes into whatever coverage map is currently installed in a single
//! process-wide slot.
//!
//! The slot has exactly one owner at a time: a [`TraceCollector`] guard. Bridge
//! sessions, standalone runs and lifecycle scaffolds each install one for their
//! duration and the guard clears the slot when dropped. All of them are sequenced
//! on the harness thread, so the slot uses relaxed atomics and no lock.
//!
//! The transition id for edge `cur` reached after edge `prev` is
//! `cur ^ (prev >> 1)`, so the counter for `(0, a)` is at `a` and `a -> b`
//! lands on a different counter than `b -> a`.

use crate::coverage::{CoverageMap, MAP_SIZE};
use crate::error::BridgeError;
use std::marker::PhantomData;
use std::ptr::{self, NonNull};
use std::sync::atomic::{AtomicPtr, AtomicU32, Ordering};

/// Cursor value meaning "no previous edge".
pub const NO_PREVIOUS_EDGE: u32 = 0;

static COVERAGE_TARGET: AtomicPtr<u8> = AtomicPtr::new(ptr::null_mut());
static PREV_LOCATION: AtomicU32 = AtomicU32::new(NO_PREVIOUS_EDGE);

/// Map index of the transition from `prev` to `edge_id`.
#[inline]
pub fn transition_index(prev: u32, edge_id: u32) -> usize {
    (edge_id ^ (prev >> 1)) as usize % MAP_SIZE
}

/// Records that control flow reached `edge_id`.
///
/// Does nothing while no coverage target is installed.
#[inline]
pub fn record_edge(edge_id: u32) {
    let target = COVERAGE_TARGET.load(Ordering::Relaxed);
    if target.is_null() {
        return;
    }
    let index = transition_index(PREV_LOCATION.load(Ordering::Relaxed), edge_id);
    // SAFETY: a non-null slot always points at MAP_SIZE bytes kept alive and
    // exclusively borrowed by the installed TraceCollector, and index < MAP_SIZE.
    unsafe {
        let counter = target.add(index);
        *counter = (*counter).saturating_add(1);
    }
    PREV_LOCATION.store(edge_id, Ordering::Relaxed);
}

/// C ABI entry point for instrumentation that cannot call Rust functions directly.
#[unsafe(no_mangle)]
pub extern "C" fn fuzzbridge_record_edge(edge_id: u32) {
    record_edge(edge_id);
}

/// Forgets the previous edge, so the next edge is recorded as `(0, edge)`.
#[inline]
pub fn reset() {
    PREV_LOCATION.store(NO_PREVIOUS_EDGE, Ordering::Relaxed);
}

/// Whether a coverage target is currently installed.
pub fn is_installed() -> bool {
    !COVERAGE_TARGET.load(Ordering::Relaxed).is_null()
}

/// The id of the last recorded edge, or [`NO_PREVIOUS_EDGE`].
pub fn prev_location() -> u32 {
    PREV_LOCATION.load(Ordering::Relaxed)
}

/// Owner of the process-wide coverage slot.
///
/// Only handed out by reference inside [`TraceCollector::scoped`], so the slot
/// can never outlive the map it points at: the guard is dropped when the scope
/// returns or unwinds, uninstalling the map and resetting the cursor.
#[derive(Debug)]
pub struct TraceCollector<'a> {
    target: NonNull<u8>,
    _map: PhantomData<&'a mut [u8; MAP_SIZE]>,
}

impl<'a> TraceCollector<'a> {
    /// Runs `f` with `map` installed as the process-wide coverage target.
    ///
    /// The cursor starts at [`NO_PREVIOUS_EDGE`]. Fails with
    /// [`BridgeError::TargetInstalled`] if another collector is live, in which
    /// case `f` does not run.
    pub fn scoped<R, F>(map: CoverageMap<'a>, f: F) -> Result<R, BridgeError>
    where
        F: FnOnce(&TraceCollector<'a>) -> R,
    {
        let collector = Self::install(map)?;
        Ok(f(&collector))
    }

    fn install(mut map: CoverageMap<'a>) -> Result<Self, BridgeError> {
        let raw = map.as_mut_ptr().cast::<u8>();
        let target = NonNull::new(raw).ok_or(BridgeError::TargetInstalled)?;
        COVERAGE_TARGET
            .compare_exchange(
                ptr::null_mut(),
                raw,
                Ordering::Relaxed,
                Ordering::Relaxed,
            )
            .map_err(|_| BridgeError::TargetInstalled)?;
        reset();
        tracing::trace!(map = ?raw, "installed coverage target");
        Ok(Self {
            target,
            _map: PhantomData,
        })
    }

    pub fn reset(&self) {
        reset();
    }

    pub fn record_edge(&self, edge_id: u32) {
        record_edge(edge_id);
    }

    /// Current hit count at `index` of the installed map.
    pub fn hits(&self, index: usize) -> u8 {
        // SAFETY: the target is live for 'a and index is wrapped into the map.
        unsafe { *self.target.as_ptr().add(index % MAP_SIZE) }
    }

    /// Number of non-zero counters in the installed map.
    pub fn count_hit_edges(&self) -> usize {
        (0..MAP_SIZE).filter(|&i| self.hits(i) != 0).count()
    }
}

impl Drop for TraceCollector<'_> {
    fn drop(&mut self) {
        COVERAGE_TARGET.store(ptr::null_mut(), Ordering::Relaxed);
        reset();
        tracing::trace!("uninstalled coverage target");
    }
}

/// Serializes tests that touch the process-wide slot.
#[cfg(test)]
pub(crate) fn slot_test_lock() -> std::sync::MutexGuard<'static, ()> {
    static LOCK: std::sync::Mutex<()> = std::sync::Mutex::new(());
    LOCK.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
