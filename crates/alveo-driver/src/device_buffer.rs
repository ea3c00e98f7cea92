//! Device input and output buffers
//!
//! A device buffer pairs a host-resident ring with a mapped device
//! buffer object and the kernel that consumes or produces it:
//!
//! - [`DeviceInputBuffer`]: ring -> map -> sync-to-device -> kernel run.
//! - [`DeviceOutputBuffer`]: kernel run -> sync-from-device -> map ->
//!   ring, with full rings drained into a long-term archive.
//!
//! Each buffer serializes its device work behind one lock, so kernel
//! runs on a given buffer never overlap and parts reach the kernel in
//! ring order.

use crate::error::{DriverError, Result};
use crate::ring::{RingBuffer, RingMode, SizeSpecifier};
use alveo_quant::Shape;
use alveo_xrt::{BufferObject, CommandState, Device, Kernel, SyncDirection};
use bytes::Bytes;
use parking_lot::Mutex;

/// Default kernel wait timeout for output reads, in milliseconds
const DEFAULT_EXECUTE_TIMEOUT_MS: u64 = 1000;

/// Device allocation unit for a mapped region of `part_bytes`
///
/// Mapped regions are page-aligned power-of-two allocations of at least
/// one 4 KiB page.
#[must_use]
pub fn device_allocation_size(part_bytes: usize) -> usize {
    part_bytes.next_power_of_two().max(4096)
}

struct MappedKernel {
    bo: BufferObject,
    kernel: Kernel,
}

impl std::fmt::Debug for MappedKernel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MappedKernel")
            .field("kernel", &self.kernel.name())
            .field("map_bytes", &self.bo.size())
            .finish()
    }
}

/// Host-side staging buffer feeding one input DMA kernel
#[derive(Debug)]
pub struct DeviceInputBuffer {
    name: String,
    shape_packed: Shape,
    part_bytes: usize,
    ring: RingBuffer,
    run: Mutex<MappedKernel>,
}

impl DeviceInputBuffer {
    /// Create the buffer and its mapped device allocation
    ///
    /// # Errors
    ///
    /// Returns an error for an empty packed shape, a zero ring length, or
    /// a failed device allocation.
    pub fn new(
        name: &str,
        device: &Device,
        kernel: Kernel,
        shape_packed: Shape,
        ring_parts: usize,
        mode: RingMode,
    ) -> Result<Self> {
        let part_bytes = shape_packed.total_elements();
        if part_bytes == 0 {
            return Err(DriverError::config(format!(
                "input buffer {name}: packed shape {shape_packed} has no elements"
            )));
        }
        let map_bytes = device_allocation_size(part_bytes);
        tracing::info!(
            "Initializing input buffer {name} (shape packed {shape_packed}, map size {map_bytes})"
        );
        Ok(Self {
            name: name.to_string(),
            shape_packed,
            part_bytes,
            ring: RingBuffer::new(ring_parts, part_bytes, mode)?,
            run: Mutex::new(MappedKernel {
                bo: BufferObject::allocate(device, map_bytes)?,
                kernel,
            }),
        })
    }

    /// Buffer (= kernel) name
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Packed shape of one sample
    #[must_use]
    pub const fn packed_shape(&self) -> &Shape {
        &self.shape_packed
    }

    /// Bytes per part
    #[must_use]
    pub const fn part_bytes(&self) -> usize {
        self.part_bytes
    }

    /// Stage already-packed parts into the ring
    ///
    /// Accepts whole parts only; failure semantics follow the ring's
    /// concurrency variant (`Ok(false)` on backpressure when
    /// single-threaded, blocking when multi-threaded).
    ///
    /// # Errors
    ///
    /// Propagates ring length/capacity errors.
    pub fn store(&self, data: &[u8]) -> Result<bool> {
        self.ring.store(data)
    }

    /// Move one part to the device and execute the kernel on it
    ///
    /// Exclusive per buffer: the internal lock serializes concurrent
    /// callers, so runs never overlap and parts execute in ring order.
    /// Returns `Ok(false)` when no part was available (single-threaded
    /// ring).
    ///
    /// # Errors
    ///
    /// Returns an error when the kernel run terminates in a non-success
    /// state.
    pub fn run(&self) -> Result<bool> {
        let mut guard = self.run.lock();
        let MappedKernel { bo, kernel } = &mut *guard;

        if !self.ring.read_one(&mut bo.map_mut()[..self.part_bytes])? {
            tracing::debug!("Input buffer {}: nothing to execute", self.name);
            return Ok(false);
        }
        bo.sync(SyncDirection::ToDevice);
        let state = kernel.start(bo, 1).wait();
        if state.is_success() {
            Ok(true)
        } else {
            Err(DriverError::Runtime { state })
        }
    }

    /// Query a buffer dimension (forwards to the ring)
    #[must_use]
    pub fn size(&self, spec: SizeSpecifier) -> usize {
        self.ring.size(spec)
    }

    /// Snapshot of the part-sized prefix of the host-visible map
    ///
    /// Diagnostic readback for verifying what the last `run` handed to
    /// the device.
    #[must_use]
    pub fn map_contents(&self) -> Vec<u8> {
        self.run.lock().bo.map()[..self.part_bytes].to_vec()
    }

    /// Barrier counts of the mapped region as (to-device, from-device)
    #[must_use]
    pub fn sync_counts(&self) -> (u64, u64) {
        self.run.lock().bo.sync_counts()
    }
}

struct OutputState {
    bo: BufferObject,
    kernel: Kernel,
    archive: Vec<Vec<u8>>,
    timeout_ms: u64,
}

/// Host-side harvesting buffer fed by one output DMA kernel
#[derive(Debug)]
pub struct DeviceOutputBuffer {
    name: String,
    shape_packed: Shape,
    part_bytes: usize,
    ring: RingBuffer,
    io: Mutex<OutputState>,
}

impl std::fmt::Debug for OutputState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OutputState")
            .field("kernel", &self.kernel.name())
            .field("archived_parts", &self.archive.len())
            .field("timeout_ms", &self.timeout_ms)
            .finish()
    }
}

impl DeviceOutputBuffer {
    /// Create the buffer and its mapped device allocation
    ///
    /// # Errors
    ///
    /// Returns an error for an empty packed shape, a zero ring length, or
    /// a failed device allocation.
    pub fn new(
        name: &str,
        device: &Device,
        kernel: Kernel,
        shape_packed: Shape,
        ring_parts: usize,
        mode: RingMode,
    ) -> Result<Self> {
        let part_bytes = shape_packed.total_elements();
        if part_bytes == 0 {
            return Err(DriverError::config(format!(
                "output buffer {name}: packed shape {shape_packed} has no elements"
            )));
        }
        let map_bytes = device_allocation_size(part_bytes);
        tracing::info!(
            "Initializing output buffer {name} (shape packed {shape_packed}, map size {map_bytes})"
        );
        Ok(Self {
            name: name.to_string(),
            shape_packed,
            part_bytes,
            ring: RingBuffer::new(ring_parts, part_bytes, mode)?,
            io: Mutex::new(OutputState {
                bo: BufferObject::allocate(device, map_bytes)?,
                kernel,
                archive: Vec::new(),
                timeout_ms: DEFAULT_EXECUTE_TIMEOUT_MS,
            }),
        })
    }

    /// Buffer (= kernel) name
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Packed shape of one sample
    #[must_use]
    pub const fn packed_shape(&self) -> &Shape {
        &self.shape_packed
    }

    /// Bytes per part
    #[must_use]
    pub const fn part_bytes(&self) -> usize {
        self.part_bytes
    }

    /// Harvest `samples` results from the kernel
    ///
    /// Per sample, under the buffer lock: run the kernel, wait up to the
    /// execute timeout, sync the map back and append it to the ring as
    /// one part, draining the ring into the archive whenever it fills.
    /// ERROR/ABORT abort the loop immediately; the terminal state of the
    /// last run is returned (`samples == 0` yields
    /// [`CommandState::Error`]).
    ///
    /// # Errors
    ///
    /// Propagates ring failures; kernel states are returned, not raised.
    pub fn read(&self, samples: u32) -> Result<CommandState> {
        tracing::debug!("Output buffer {}: reading {samples} samples", self.name);
        let mut guard = self.io.lock();
        let mut last = CommandState::Error;

        for _ in 0..samples {
            let OutputState {
                bo,
                kernel,
                timeout_ms,
                ..
            } = &mut *guard;
            last = kernel.start(bo, 1).wait_timeout(*timeout_ms);
            if matches!(last, CommandState::Error | CommandState::Abort) {
                return Ok(last);
            }
            bo.sync(SyncDirection::FromDevice);
            let part = bo.map()[..self.part_bytes].to_vec();
            self.ring.store(&part)?;
            if self.ring.full() {
                self.drain_into(&mut guard.archive)?;
            }
        }
        Ok(last)
    }

    /// Drain any buffered parts into the archive immediately
    ///
    /// Runs automatically when the ring fills during [`read`]; callers
    /// use it to force partial batches into the archive.
    ///
    /// # Errors
    ///
    /// Propagates ring failures.
    ///
    /// [`read`]: Self::read
    pub fn archive_valid(&self) -> Result<()> {
        tracing::debug!("Output buffer {}: archiving buffered parts", self.name);
        let mut guard = self.io.lock();
        self.drain_into(&mut guard.archive)
    }

    /// Take the archive as per-sample parts, clearing it
    #[must_use]
    pub fn retrieve_archive(&self) -> Vec<Vec<u8>> {
        std::mem::take(&mut self.io.lock().archive)
    }

    /// Take the archive as one flat byte payload, clearing it
    #[must_use]
    pub fn retrieve_archive_flat(&self) -> Bytes {
        let parts = self.retrieve_archive();
        Bytes::from(parts.concat())
    }

    /// Drop all archived parts
    pub fn clear_archive(&self) {
        self.io.lock().archive.clear();
    }

    /// Number of parts currently archived
    #[must_use]
    pub fn archived_parts(&self) -> usize {
        self.io.lock().archive.len()
    }

    /// Kernel wait timeout in milliseconds
    #[must_use]
    pub fn execute_timeout_ms(&self) -> u64 {
        self.io.lock().timeout_ms
    }

    /// Set the kernel wait timeout in milliseconds
    pub fn set_execute_timeout_ms(&self, timeout_ms: u64) {
        self.io.lock().timeout_ms = timeout_ms;
    }

    /// Query a buffer dimension (forwards to the ring)
    #[must_use]
    pub fn size(&self, spec: SizeSpecifier) -> usize {
        self.ring.size(spec)
    }

    /// Snapshot of the part-sized prefix of the host-visible map
    #[must_use]
    pub fn map_contents(&self) -> Vec<u8> {
        self.io.lock().bo.map()[..self.part_bytes].to_vec()
    }

    fn drain_into(&self, archive: &mut Vec<Vec<u8>>) -> Result<()> {
        let buffered = self.ring.size(SizeSpecifier::PartCount);
        archive.reserve(buffered);
        let mut part = vec![0u8; self.part_bytes];
        for _ in 0..buffered {
            self.ring.read_one(&mut part)?;
            archive.push(part.clone());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alveo_xrt::{Kernel, KernelAccess, Uuid};
    use std::path::PathBuf;

    fn loaded_device(index: u32, tag: &str) -> (Device, Uuid) {
        let path: PathBuf =
            std::env::temp_dir().join(format!("alveo-dbuf-{}-{tag}.xclbin", std::process::id()));
        std::fs::write(&path, b"device-buffer-test-image").unwrap();
        let dev = Device::open(index).unwrap();
        let uuid = dev.load_xclbin(&path).unwrap();
        (dev, uuid)
    }

    fn input_buffer(dev: &Device, uuid: &Uuid, parts: usize) -> DeviceInputBuffer {
        let kernel = Kernel::open(dev, uuid, "idma0", KernelAccess::Shared).unwrap();
        DeviceInputBuffer::new(
            "idma0",
            dev,
            kernel,
            Shape::new(vec![1, 4]),
            parts,
            RingMode::SingleThreaded,
        )
        .unwrap()
    }

    fn output_buffer(dev: &Device, uuid: &Uuid, parts: usize) -> DeviceOutputBuffer {
        let kernel = Kernel::open(dev, uuid, "odma0", KernelAccess::Exclusive).unwrap();
        DeviceOutputBuffer::new(
            "odma0",
            dev,
            kernel,
            Shape::new(vec![1, 4]),
            parts,
            RingMode::SingleThreaded,
        )
        .unwrap()
    }

    #[test]
    fn test_allocation_size_rounding() {
        assert_eq!(device_allocation_size(1), 4096);
        assert_eq!(device_allocation_size(4096), 4096);
        assert_eq!(device_allocation_size(4097), 8192);
        assert_eq!(device_allocation_size(6000), 8192);
    }

    #[test]
    fn test_input_store_run_moves_part_to_device() {
        let (dev, uuid) = loaded_device(0, "in-run");
        let buf = input_buffer(&dev, &uuid, 4);

        assert!(buf.store(&[0x12, 0x34, 0x56, 0x78]).unwrap());
        assert_eq!(buf.size(SizeSpecifier::PartCount), 1);
        assert!(buf.run().unwrap());

        assert_eq!(buf.size(SizeSpecifier::PartCount), 0);
        assert_eq!(buf.map_contents(), vec![0x12, 0x34, 0x56, 0x78]);
        assert_eq!(buf.sync_counts().0, 1);
        assert_eq!(dev.pending_samples(), 1);
    }

    #[test]
    fn test_input_run_without_data() {
        let (dev, uuid) = loaded_device(1, "in-empty");
        let buf = input_buffer(&dev, &uuid, 4);
        assert!(!buf.run().unwrap());
        assert_eq!(dev.pending_samples(), 0);
    }

    #[test]
    fn test_input_runs_preserve_fifo_order() {
        let (dev, uuid) = loaded_device(2, "in-fifo");
        let buf = input_buffer(&dev, &uuid, 4);
        buf.store(&[1, 1, 1, 1]).unwrap();
        buf.store(&[2, 2, 2, 2]).unwrap();
        assert!(buf.run().unwrap());
        assert!(buf.run().unwrap());

        // parts reached the device pipeline in store order
        assert_eq!(dev.pending_samples(), 2);
        let odma = Kernel::open(&dev, &uuid, "odma0", KernelAccess::Exclusive).unwrap();
        let mut bo = BufferObject::allocate(&dev, 4).unwrap();
        assert!(odma.start(&mut bo, 1).wait().is_success());
        assert_eq!(bo.map(), &[1, 1, 1, 1]);
        assert!(odma.start(&mut bo, 1).wait().is_success());
        assert_eq!(bo.map(), &[2, 2, 2, 2]);
    }

    #[test]
    fn test_output_read_and_archive_on_full() {
        let (dev, uuid) = loaded_device(3, "out-full");
        let input = input_buffer(&dev, &uuid, 8);
        let output = output_buffer(&dev, &uuid, 2);

        for v in 1..=4u8 {
            input.store(&[v; 4]).unwrap();
            assert!(input.run().unwrap());
        }

        // the two-part ring fills twice and drains into the archive both times
        let state = output.read(4).unwrap();
        assert_eq!(state, CommandState::Completed);
        assert_eq!(output.archived_parts(), 4);
        assert_eq!(output.size(SizeSpecifier::PartCount), 0);

        let parts = output.retrieve_archive();
        assert_eq!(parts, vec![vec![1; 4], vec![2; 4], vec![3; 4], vec![4; 4]]);
        assert_eq!(output.archived_parts(), 0);
    }

    #[test]
    fn test_output_partial_batch_needs_force() {
        let (dev, uuid) = loaded_device(4, "out-partial");
        let input = input_buffer(&dev, &uuid, 8);
        let output = output_buffer(&dev, &uuid, 4);

        input.store(&[7; 4]).unwrap();
        assert!(input.run().unwrap());
        assert_eq!(output.read(1).unwrap(), CommandState::Completed);

        // one part sits in the ring, none archived yet
        assert_eq!(output.size(SizeSpecifier::PartCount), 1);
        assert_eq!(output.archived_parts(), 0);

        output.archive_valid().unwrap();
        assert_eq!(output.archived_parts(), 1);
        assert_eq!(output.retrieve_archive_flat().as_ref(), &[7u8; 4]);
    }

    #[test]
    fn test_output_zero_samples_is_error_state() {
        let (dev, uuid) = loaded_device(5, "out-zero");
        let output = output_buffer(&dev, &uuid, 2);
        assert_eq!(output.read(0).unwrap(), CommandState::Error);
    }

    #[test]
    fn test_output_timeout_keeps_reading() {
        let (dev, uuid) = loaded_device(6, "out-timeout");
        let output = output_buffer(&dev, &uuid, 4);

        // drained pipeline: the run times out but the loop still saves the
        // (stale, zeroed) map and reports the final state
        assert_eq!(output.read(1).unwrap(), CommandState::Timeout);
        assert_eq!(output.size(SizeSpecifier::PartCount), 1);
        assert_eq!(output.ring.peek(0).unwrap(), vec![0u8; 4]);
    }

    #[test]
    fn test_timeout_is_configurable() {
        let (dev, uuid) = loaded_device(7, "out-timeout-cfg");
        let output = output_buffer(&dev, &uuid, 2);
        assert_eq!(output.execute_timeout_ms(), 1000);
        output.set_execute_timeout_ms(250);
        assert_eq!(output.execute_timeout_ms(), 250);
    }
}
