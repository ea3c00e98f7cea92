//! Host-visible device buffer objects
//!
//! A buffer object is device-owned memory with a host-visible map. The
//! host view becomes coherent with the kernel's view only at an explicit
//! [`BufferObject::sync`]; exclusive access during kernel runs is the
//! caller's responsibility (the driver serializes through its buffer
//! locks).

use crate::device::Device;
use crate::error::{Result, XrtError};

/// Direction of a coherence barrier
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncDirection {
    /// Make host writes visible to the kernel
    ToDevice,
    /// Make kernel writes visible to the host
    FromDevice,
}

/// Device-resident buffer with a host-visible map
#[derive(Debug)]
pub struct BufferObject {
    device: Device,
    data: Vec<u8>,
    to_device_syncs: u64,
    from_device_syncs: u64,
}

impl BufferObject {
    /// Allocate a zero-filled buffer object on the given device
    ///
    /// # Errors
    ///
    /// Returns an error for a zero-byte allocation.
    pub fn allocate(device: &Device, size_bytes: usize) -> Result<Self> {
        if size_bytes == 0 {
            return Err(XrtError::EmptyAllocation {
                index: device.index(),
            });
        }
        tracing::debug!(
            "Device {}: allocated {size_bytes}-byte buffer object",
            device.index()
        );
        Ok(Self {
            device: device.clone(),
            data: vec![0u8; size_bytes],
            to_device_syncs: 0,
            from_device_syncs: 0,
        })
    }

    /// Host view of the mapped region
    #[must_use]
    pub fn map(&self) -> &[u8] {
        &self.data
    }

    /// Mutable host view of the mapped region
    pub fn map_mut(&mut self) -> &mut [u8] {
        &mut self.data
    }

    /// Coherence barrier between the host view and the kernel's view
    ///
    /// The emulated map is always coherent; the barrier is counted so
    /// callers can assert the protocol was followed.
    pub fn sync(&mut self, direction: SyncDirection) {
        match direction {
            SyncDirection::ToDevice => self.to_device_syncs += 1,
            SyncDirection::FromDevice => self.from_device_syncs += 1,
        }
        tracing::trace!(
            "Device {}: buffer sync {direction:?} ({} bytes)",
            self.device.index(),
            self.data.len()
        );
    }

    /// Size of the mapped region in bytes
    #[must_use]
    pub fn size(&self) -> usize {
        self.data.len()
    }

    /// Device this buffer lives on
    #[must_use]
    pub const fn device(&self) -> &Device {
        &self.device
    }

    /// Barrier counts as (to-device, from-device)
    #[must_use]
    pub const fn sync_counts(&self) -> (u64, u64) {
        (self.to_device_syncs, self.from_device_syncs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_allocation_is_zero_filled() {
        let dev = Device::open(0).unwrap();
        let bo = BufferObject::allocate(&dev, 64).unwrap();
        assert_eq!(bo.size(), 64);
        assert!(bo.map().iter().all(|&b| b == 0));
    }

    #[test]
    fn test_zero_byte_allocation_rejected() {
        let dev = Device::open(0).unwrap();
        assert!(matches!(
            BufferObject::allocate(&dev, 0),
            Err(XrtError::EmptyAllocation { .. })
        ));
    }

    #[test]
    fn test_sync_counting() {
        let dev = Device::open(0).unwrap();
        let mut bo = BufferObject::allocate(&dev, 16).unwrap();
        bo.sync(SyncDirection::ToDevice);
        bo.sync(SyncDirection::ToDevice);
        bo.sync(SyncDirection::FromDevice);
        assert_eq!(bo.sync_counts(), (2, 1));
    }
}
