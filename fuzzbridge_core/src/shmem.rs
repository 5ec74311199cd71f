//! The shared segment the engine creates for each harness process.
//!
//! ```text
//! 0                 MAP_SIZE                         MAP_SIZE + DEFAULT_BUFFER_SIZE
//! ├─ coverage counters ─┼─ payload of the current test case ──────────────┤
//! ```
//!
//! The engine zeroes the counters and copies the next test case into the payload
//! area before announcing its length on the control pipe.

use crate::coverage::{CoverageMap, MAP_SIZE};
use crate::error::BridgeError;
use std::fs::OpenOptions;
use std::marker::PhantomData;
use std::os::unix::io::AsRawFd;
use std::path::{Path, PathBuf};
use std::ptr::NonNull;

/// Size of the payload area following the coverage map.
pub const DEFAULT_BUFFER_SIZE: usize = 1 << 24;

/// Total bytes mapped per session.
pub const REGION_SIZE: usize = MAP_SIZE + DEFAULT_BUFFER_SIZE;

/// A read/write mapping of the engine's shared segment. Unmapped on drop.
#[derive(Debug)]
pub struct SharedRegion {
    base: NonNull<u8>,
    path: PathBuf,
}

impl SharedRegion {
    /// Maps an existing segment. The segment must be at least `REGION_SIZE` bytes.
    pub fn open(path: &Path) -> Result<Self, BridgeError> {
        let file = OpenOptions::new().read(true).write(true).open(path)?;
        let actual = file.metadata()?.len();
        if actual < REGION_SIZE as u64 {
            return Err(BridgeError::SegmentTooSmall {
                path: path.to_path_buf(),
                actual,
                expected: REGION_SIZE,
            });
        }
        let region = Self::map(&file, path)?;
        tracing::info!(size = REGION_SIZE, path = %path.display(), "opened shared segment");
        Ok(region)
    }

    /// Creates (or truncates) a zeroed segment of `REGION_SIZE` bytes and maps it.
    ///
    /// This is the engine's side of the layout; harnesses only ever `open`.
    pub fn create(path: &Path) -> Result<Self, BridgeError> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(path)?;
        file.set_len(REGION_SIZE as u64)?;
        let region = Self::map(&file, path)?;
        tracing::info!(size = REGION_SIZE, path = %path.display(), "created shared segment");
        Ok(region)
    }

    fn map(file: &std::fs::File, path: &Path) -> Result<Self, BridgeError> {
        use libc::{MAP_FAILED, MAP_SHARED, PROT_READ, PROT_WRITE, mmap};

        let ptr = unsafe {
            mmap(
                std::ptr::null_mut(),
                REGION_SIZE,
                PROT_READ | PROT_WRITE,
                MAP_SHARED,
                file.as_raw_fd(),
                0,
            )
        };
        if ptr == MAP_FAILED {
            return Err(BridgeError::Io(std::io::Error::last_os_error()));
        }
        // The mapping outlives the descriptor; the file closes when the caller drops it.
        let base = NonNull::new(ptr.cast::<u8>())
            .ok_or_else(|| BridgeError::Io(std::io::Error::other("mmap returned null")))?;
        Ok(Self {
            base,
            path: path.to_path_buf(),
        })
    }

    /// Splits the mapping into the coverage map and the payload area.
    pub fn split(&mut self) -> (CoverageMap<'_>, PayloadBuffer<'_>) {
        // SAFETY: the mapping spans REGION_SIZE bytes; the two halves do not
        // overlap and both borrow `self` mutably for their lifetime.
        let counters = unsafe { std::slice::from_raw_parts_mut(self.base.as_ptr(), MAP_SIZE) };
        let payload_base = unsafe { self.base.add(MAP_SIZE) };
        let coverage = CoverageMap::new(counters)
            .unwrap_or_else(|_| unreachable!("coverage half is exactly MAP_SIZE"));
        (
            coverage,
            PayloadBuffer {
                base: payload_base,
                _region: PhantomData,
            },
        )
    }

    /// The whole payload area, for the engine side to fill in.
    pub fn payload_mut(&mut self) -> &mut [u8] {
        // SAFETY: see `split`.
        unsafe {
            std::slice::from_raw_parts_mut(self.base.add(MAP_SIZE).as_ptr(), DEFAULT_BUFFER_SIZE)
        }
    }

    /// The coverage counters, for the engine side to read back.
    pub fn counters(&self) -> &[u8] {
        // SAFETY: see `split`.
        unsafe { std::slice::from_raw_parts(self.base.as_ptr(), MAP_SIZE) }
    }
}

impl Drop for SharedRegion {
    fn drop(&mut self) {
        let rc = unsafe { libc::munmap(self.base.as_ptr().cast::<libc::c_void>(), REGION_SIZE) };
        if rc != 0 {
            let e = std::io::Error::last_os_error();
            tracing::error!(error = %e, path = %self.path.display(), "munmap failed for shared segment");
        } else {
            tracing::debug!(path = %self.path.display(), "unmapped shared segment");
        }
    }
}

/// The payload area of a mapped segment.
///
/// The engine rewrites it between executions, so views are only handed out for
/// the duration of a single borrow.
#[derive(Debug)]
pub struct PayloadBuffer<'a> {
    base: NonNull<u8>,
    _region: PhantomData<&'a mut [u8]>,
}

impl PayloadBuffer<'_> {
    /// Zero-copy view of the first `len` payload bytes.
    ///
    /// `len` comes off the wire as a signed 32-bit value and is validated
    /// against the payload area before any pointer arithmetic.
    pub fn view(&self, len: i32) -> Result<&[u8], BridgeError> {
        let len = usize::try_from(len).map_err(|_| BridgeError::InvalidLength(len))?;
        if len > DEFAULT_BUFFER_SIZE {
            return Err(BridgeError::InvalidLength(len as i32));
        }
        // SAFETY: len is within the payload area, which lives as long as 'a.
        Ok(unsafe { std::slice::from_raw_parts(self.base.as_ptr(), len) })
    }
}
