//! Pool of memory-mapped capture buffers and their ownership.

use tracing::{debug, info};

use crate::device::DeviceSession;
use crate::error::{CaptureError, Result};
use crate::traits::{CaptureDriver, Ioctl};

/// Who may touch a buffer region right now.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Ownership {
    /// Queued to the driver; the kernel may be writing into it.
    Driver,
    /// Held by the application; contents are stable.
    Application,
}

/// One mapped region backing a hardware buffer slot.
#[derive(Debug)]
pub struct BufferRegion<R> {
    slot: u32,
    mapping: R,
    owner: Ownership,
}

impl<R: AsRef<[u8]>> BufferRegion<R> {
    /// Stable slot index of this region.
    pub const fn slot(&self) -> u32 {
        self.slot
    }

    /// Mapped length in bytes.
    pub fn len(&self) -> usize {
        self.mapping.as_ref().len()
    }

    /// Whether the mapping is zero-length.
    pub fn is_empty(&self) -> bool {
        self.mapping.as_ref().is_empty()
    }

    /// Base address of the mapping. Only meaningful as an identity.
    pub fn base_address(&self) -> *const u8 {
        self.mapping.as_ref().as_ptr()
    }

    /// Current owner of the region.
    pub const fn ownership(&self) -> Ownership {
        self.owner
    }
}

/// Fixed set of mapped regions, indexed by slot.
///
/// Regions are created together by [`DeviceSession::allocate_buffers`] and
/// live until [`BufferPool::teardown`]. All regions start application-owned,
/// since nothing has been queued yet.
#[derive(Debug)]
pub struct BufferPool<R> {
    regions: Vec<BufferRegion<R>>,
}

impl<R: AsRef<[u8]>> BufferPool<R> {
    pub(crate) fn new(mappings: Vec<R>) -> Self {
        let regions = mappings
            .into_iter()
            .zip(0u32..)
            .map(|(mapping, slot)| BufferRegion {
                slot,
                mapping,
                owner: Ownership::Application,
            })
            .collect();
        Self { regions }
    }

    /// Number of slots in the pool.
    pub fn len(&self) -> usize {
        self.regions.len()
    }

    /// Whether the pool has no slots.
    pub fn is_empty(&self) -> bool {
        self.regions.is_empty()
    }

    /// Look up a region by slot.
    pub fn region(&self, slot: u32) -> Result<&BufferRegion<R>> {
        self.regions
            .get(slot as usize)
            .ok_or(CaptureError::InvalidSlot {
                slot,
                count: self.regions.len(),
            })
    }

    /// Iterate over all regions in slot order.
    pub fn regions(&self) -> impl Iterator<Item = &BufferRegion<R>> {
        self.regions.iter()
    }

    /// Number of slots currently owned by the driver.
    pub fn driver_owned(&self) -> usize {
        self.count(Ownership::Driver)
    }

    /// Number of slots currently owned by the application.
    pub fn application_owned(&self) -> usize {
        self.count(Ownership::Application)
    }

    fn count(&self, owner: Ownership) -> usize {
        self.regions.iter().filter(|r| r.owner == owner).count()
    }

    pub(crate) fn mark_driver_owned(&mut self, slot: u32) -> Result<()> {
        self.set_owner(slot, Ownership::Driver)
    }

    pub(crate) fn mark_application_owned(&mut self, slot: u32) -> Result<()> {
        self.set_owner(slot, Ownership::Application)
    }

    fn set_owner(&mut self, slot: u32, owner: Ownership) -> Result<()> {
        let count = self.regions.len();
        let region = self
            .regions
            .get_mut(slot as usize)
            .ok_or(CaptureError::InvalidSlot { slot, count })?;
        region.owner = owner;
        Ok(())
    }

    /// Contents of an application-owned slot.
    pub(crate) fn bytes(&self, slot: u32) -> Result<&[u8]> {
        let region = self.region(slot)?;
        match region.owner {
            Ownership::Application => Ok(region.mapping.as_ref()),
            Ownership::Driver => Err(CaptureError::SlotNotReadable(slot)),
        }
    }

    /// Unmap every region and release the kernel-side allocation.
    ///
    /// Streaming must already be off. The pool is consumed, so no region
    /// outlives this call.
    pub fn teardown<D>(self, session: &mut DeviceSession<D>) -> Result<()>
    where
        D: CaptureDriver<Region = R>,
    {
        let count = self.regions.len();
        drop(self.regions);
        debug!(count, "unmapped buffer regions");

        session
            .driver_mut()
            .request_buffers(0)
            .map_err(|source| CaptureError::Device {
                op: Ioctl::RequestBuffers,
                source,
            })?;
        info!(count, "released capture buffers");
        Ok(())
    }
}
