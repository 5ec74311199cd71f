use crate::error::BridgeError;

/// Number of edge counters in a coverage map. Both sides of the shared segment
/// are built with this value; the engine copies exactly this many bytes out.
pub const MAP_SIZE: usize = 1 << 16;

/// A bounds-checked view over `MAP_SIZE` hit counters.
///
/// The backing storage is either a process-private buffer (standalone runs,
/// lifecycle scaffolds) or the head of the shared segment mapped from the engine.
#[derive(Debug)]
pub struct CoverageMap<'a> {
    counters: &'a mut [u8; MAP_SIZE],
}

impl<'a> CoverageMap<'a> {
    /// Wraps `buf` as a coverage map. `buf` must be exactly `MAP_SIZE` bytes.
    pub fn new(buf: &'a mut [u8]) -> Result<Self, BridgeError> {
        let actual = buf.len();
        let counters: &'a mut [u8; MAP_SIZE] =
            buf.try_into().map_err(|_| BridgeError::MapSizeMismatch {
                expected: MAP_SIZE,
                actual,
            })?;
        Ok(Self { counters })
    }

    /// Hit count recorded for `index`, wrapped into the map.
    pub fn hits(&self, index: usize) -> u8 {
        self.counters[index % MAP_SIZE]
    }

    /// Increments the counter at `index`, clamping at `u8::MAX`.
    #[inline]
    pub fn hit(&mut self, index: usize) {
        let slot = &mut self.counters[index % MAP_SIZE];
        *slot = slot.saturating_add(1);
    }

    /// Zeroes every counter.
    pub fn clear(&mut self) {
        self.counters.fill(0);
    }

    /// Number of counters that are non-zero.
    pub fn count_hit_edges(&self) -> usize {
        self.counters.iter().filter(|&&c| c != 0).count()
    }

    pub fn as_slice(&self) -> &[u8] {
        self.counters.as_slice()
    }

    pub(crate) fn as_mut_ptr(&mut self) -> *mut [u8; MAP_SIZE] {
        &mut *self.counters as *mut [u8; MAP_SIZE]
    }
}

/// A heap-allocated coverage buffer for runs with no engine attached.
#[derive(Debug)]
pub struct PrivateCoverage {
    buf: Box<[u8; MAP_SIZE]>,
}

impl PrivateCoverage {
    pub fn new() -> Self {
        Self {
            buf: Box::new([0u8; MAP_SIZE]),
        }
    }

    /// Borrows the buffer as a `CoverageMap`.
    pub fn map(&mut self) -> CoverageMap<'_> {
        CoverageMap {
            counters: &mut self.buf,
        }
    }

    pub fn as_slice(&self) -> &[u8] {
        self.buf.as_slice()
    }
}

impl Default for PrivateCoverage {
    fn default() -> Self {
        Self::new()
    }
}
