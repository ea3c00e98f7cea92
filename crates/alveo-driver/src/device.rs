//! Per-FPGA device handler
//!
//! One handler owns one opened device: the loaded bitstream UUID and the
//! name-indexed directories of input and output buffers built from the
//! configuration entry. All store/run/read/retrieve traffic dispatches
//! through the handler by kernel name.

use crate::config::DeviceConfig;
use crate::device_buffer::{DeviceInputBuffer, DeviceOutputBuffer};
use crate::error::{DriverError, Result};
use crate::ring::{RingMode, SizeSpecifier};
use alveo_xrt::{CommandState, Device, Kernel, KernelAccess, Uuid};
use bytes::Bytes;
use std::collections::HashMap;

/// Buffer direction selector
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Io {
    /// Input (host to device) buffers
    Input,
    /// Output (device to host) buffers
    Output,
}

/// One FPGA: device handle, loaded bitstream and its kernel buffers
#[derive(Debug)]
pub struct DeviceHandler {
    xrt_device_index: u32,
    device: Device,
    uuid: Uuid,
    inputs: HashMap<String, DeviceInputBuffer>,
    outputs: HashMap<String, DeviceOutputBuffer>,
}

impl DeviceHandler {
    /// Validate the configuration entry, open the device and build the
    /// buffer directories
    ///
    /// Input kernels are opened with shared access, output kernels with
    /// exclusive access. Every buffer gets a ring of `ring_parts` parts
    /// in the given mode.
    ///
    /// # Errors
    ///
    /// Returns a configuration error before any device I/O when the
    /// entry is malformed, and runtime errors when the bitstream or a
    /// kernel cannot be loaded.
    pub fn new(config: &DeviceConfig, ring_parts: usize, mode: RingMode) -> Result<Self> {
        config.validate()?;

        let index = config.xrt_device_index;
        tracing::info!("Setting up device {index}: loading {}", config.xclbin.display());
        let device = Device::open(index)?;
        let uuid = device.load_xclbin(&config.xclbin)?;

        let mut inputs = HashMap::with_capacity(config.idmas.len());
        for descriptor in &config.idmas {
            let kernel = Kernel::open(&device, &uuid, &descriptor.kernel_name, KernelAccess::Shared)?;
            let buffer = DeviceInputBuffer::new(
                &descriptor.kernel_name,
                &device,
                kernel,
                descriptor.packed(),
                ring_parts,
                mode,
            )?;
            if inputs.insert(descriptor.kernel_name.clone(), buffer).is_some() {
                return Err(DriverError::config(format!(
                    "device {index}: duplicate input kernel {:?}",
                    descriptor.kernel_name
                )));
            }
        }

        let mut outputs = HashMap::with_capacity(config.odmas.len());
        for descriptor in &config.odmas {
            let kernel =
                Kernel::open(&device, &uuid, &descriptor.kernel_name, KernelAccess::Exclusive)?;
            let buffer = DeviceOutputBuffer::new(
                &descriptor.kernel_name,
                &device,
                kernel,
                descriptor.packed(),
                ring_parts,
                mode,
            )?;
            if outputs.insert(descriptor.kernel_name.clone(), buffer).is_some() {
                return Err(DriverError::config(format!(
                    "device {index}: duplicate output kernel {:?}",
                    descriptor.kernel_name
                )));
            }
        }

        #[cfg(debug_assertions)]
        {
            log_bucket_collisions(index, "input", inputs.keys());
            log_bucket_collisions(index, "output", outputs.keys());
        }

        tracing::info!(
            "Finished setting up device {index} ({} inputs, {} outputs)",
            inputs.len(),
            outputs.len()
        );
        Ok(Self {
            xrt_device_index: index,
            device,
            uuid,
            inputs,
            outputs,
        })
    }

    /// Runtime index of this device
    #[must_use]
    pub const fn device_index(&self) -> u32 {
        self.xrt_device_index
    }

    /// Underlying device handle
    #[must_use]
    pub const fn device(&self) -> &Device {
        &self.device
    }

    /// UUID of the loaded bitstream
    #[must_use]
    pub const fn uuid(&self) -> &Uuid {
        &self.uuid
    }

    /// Whether a buffer of the given direction exists under this name
    #[must_use]
    pub fn contains_buffer(&self, kernel_name: &str, io: Io) -> bool {
        match io {
            Io::Input => self.inputs.contains_key(kernel_name),
            Io::Output => self.outputs.contains_key(kernel_name),
        }
    }

    /// Configured input kernel names, sorted
    #[must_use]
    pub fn input_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.inputs.keys().cloned().collect();
        names.sort();
        names
    }

    /// Configured output kernel names, sorted
    #[must_use]
    pub fn output_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.outputs.keys().cloned().collect();
        names.sort();
        names
    }

    /// Input buffer by kernel name
    ///
    /// # Errors
    ///
    /// Returns a lookup error listing the configured input names.
    pub fn input_buffer(&self, kernel_name: &str) -> Result<&DeviceInputBuffer> {
        self.inputs.get(kernel_name).ok_or_else(|| {
            DriverError::unknown_kernel(kernel_name, self.inputs.keys())
        })
    }

    /// Output buffer by kernel name
    ///
    /// # Errors
    ///
    /// Returns a lookup error listing the configured output names.
    pub fn output_buffer(&self, kernel_name: &str) -> Result<&DeviceOutputBuffer> {
        self.outputs.get(kernel_name).ok_or_else(|| {
            DriverError::unknown_kernel(kernel_name, self.outputs.keys())
        })
    }

    /// Stage packed parts into the named input buffer
    ///
    /// # Errors
    ///
    /// Returns a lookup error for unknown names; otherwise the input
    /// buffer's store semantics apply.
    pub fn store(&self, data: &[u8], kernel_name: &str) -> Result<bool> {
        self.input_buffer(kernel_name)?.store(data)
    }

    /// Execute one staged part on the named input kernel
    ///
    /// # Errors
    ///
    /// Returns a lookup error for unknown names; otherwise the input
    /// buffer's run semantics apply.
    pub fn run(&self, kernel_name: &str) -> Result<bool> {
        self.input_buffer(kernel_name)?.run()
    }

    /// Harvest `samples` results from the named output kernel
    ///
    /// # Errors
    ///
    /// Returns a lookup error for unknown names; otherwise the output
    /// buffer's read semantics apply.
    pub fn read(&self, kernel_name: &str, samples: u32) -> Result<CommandState> {
        self.output_buffer(kernel_name)?.read(samples)
    }

    /// Take the named output buffer's archive as per-sample parts
    ///
    /// With `force_archive`, buffered ring parts are drained into the
    /// archive first so partial batches are returned too.
    ///
    /// # Errors
    ///
    /// Returns a lookup error for unknown names.
    pub fn retrieve(&self, kernel_name: &str, force_archive: bool) -> Result<Vec<Vec<u8>>> {
        let buffer = self.output_buffer(kernel_name)?;
        if force_archive {
            buffer.archive_valid()?;
        }
        Ok(buffer.retrieve_archive())
    }

    /// Flat-payload variant of [`retrieve`](Self::retrieve)
    ///
    /// # Errors
    ///
    /// Returns a lookup error for unknown names.
    pub fn retrieve_flat(&self, kernel_name: &str, force_archive: bool) -> Result<Bytes> {
        let buffer = self.output_buffer(kernel_name)?;
        if force_archive {
            buffer.archive_valid()?;
        }
        Ok(buffer.retrieve_archive_flat())
    }

    /// Query a buffer dimension by kernel name (either direction)
    ///
    /// # Errors
    ///
    /// Returns a lookup error listing all configured names when the name
    /// matches neither directory.
    pub fn size(&self, spec: SizeSpecifier, kernel_name: &str) -> Result<usize> {
        if let Some(buffer) = self.inputs.get(kernel_name) {
            return Ok(buffer.size(spec));
        }
        if let Some(buffer) = self.outputs.get(kernel_name) {
            return Ok(buffer.size(spec));
        }
        Err(DriverError::unknown_kernel(
            kernel_name,
            self.inputs.keys().chain(self.outputs.keys()),
        ))
    }
}

/// Report hash-bucket collisions in a buffer directory
///
/// Purely diagnostic: lookups stay amortized O(1) either way, but a
/// colliding name set is worth knowing about on the hot path.
#[cfg(debug_assertions)]
#[allow(clippy::cast_possible_truncation)]
fn log_bucket_collisions<'a>(
    device_index: u32,
    direction: &str,
    names: impl Iterator<Item = &'a String>,
) {
    use std::collections::hash_map::RandomState;
    use std::hash::BuildHasher;

    let names: Vec<&String> = names.collect();
    let buckets = names.len().next_power_of_two().max(1);
    let hasher = RandomState::new();
    let mut seen = vec![0u32; buckets];
    for name in &names {
        let slot = (hasher.hash_one(name) as usize) % buckets;
        seen[slot] += 1;
        if seen[slot] > 1 {
            tracing::warn!(
                "Device {device_index}: hash collision in the {direction} buffer directory \
                 on {name:?}; lookups for this bucket are no longer constant time"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::BufferDescriptor;
    use std::path::PathBuf;

    fn temp_xclbin(tag: &str) -> PathBuf {
        let path =
            std::env::temp_dir().join(format!("alveo-handler-{}-{tag}.xclbin", std::process::id()));
        std::fs::write(&path, b"handler-test-image").unwrap();
        path
    }

    fn config(tag: &str) -> DeviceConfig {
        DeviceConfig {
            xclbin: temp_xclbin(tag),
            xrt_device_index: 0,
            idmas: vec![BufferDescriptor::new("idma0", vec![1, 4, 2])],
            odmas: vec![BufferDescriptor::new("odma0", vec![1, 4, 2])],
        }
    }

    #[test]
    fn test_construction_installs_buffers() {
        let handler = DeviceHandler::new(&config("install"), 4, RingMode::SingleThreaded).unwrap();
        assert!(handler.contains_buffer("idma0", Io::Input));
        assert!(handler.contains_buffer("odma0", Io::Output));
        assert!(!handler.contains_buffer("idma0", Io::Output));
        assert_eq!(handler.input_names(), vec!["idma0".to_string()]);
        assert_eq!(
            handler.size(SizeSpecifier::ElementsPerPart, "idma0").unwrap(),
            8
        );
        assert_eq!(handler.size(SizeSpecifier::Elements, "odma0").unwrap(), 32);
    }

    #[test]
    fn test_validation_runs_before_device_io() {
        let mut bad = config("preval");
        bad.idmas.clear();
        assert!(matches!(
            DeviceHandler::new(&bad, 4, RingMode::SingleThreaded),
            Err(DriverError::Config { .. })
        ));
    }

    #[test]
    fn test_duplicate_kernel_name_rejected() {
        let mut bad = config("dup");
        bad.idmas.push(BufferDescriptor::new("idma0", vec![2, 2]));
        assert!(matches!(
            DeviceHandler::new(&bad, 4, RingMode::SingleThreaded),
            Err(DriverError::Config { .. })
        ));
    }

    #[test]
    fn test_unknown_name_lists_alternatives() {
        let handler = DeviceHandler::new(&config("unknown"), 4, RingMode::SingleThreaded).unwrap();
        let err = handler.store(&[0u8; 8], "nope").unwrap_err();
        let message = err.to_string();
        assert!(message.contains("nope"));
        assert!(message.contains("idma0"));

        assert!(handler.read("idma0", 1).is_err());
        assert!(handler.size(SizeSpecifier::PartSize, "missing").is_err());
    }

    #[test]
    fn test_store_run_read_retrieve_cycle() {
        let handler = DeviceHandler::new(&config("cycle"), 4, RingMode::SingleThreaded).unwrap();
        assert!(handler.store(&[5u8; 8], "idma0").unwrap());
        assert!(handler.run("idma0").unwrap());
        assert!(handler.read("odma0", 1).unwrap().is_success());

        let parts = handler.retrieve("odma0", true).unwrap();
        assert_eq!(parts, vec![vec![5u8; 8]]);
        // archive was consumed
        assert!(handler.retrieve("odma0", false).unwrap().is_empty());
    }
}
