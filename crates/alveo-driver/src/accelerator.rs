//! Multi-device accelerator
//!
//! The accelerator owns one [`DeviceHandler`] per configuration entry and
//! routes every operation by `(device index, kernel name)`. For hot
//! store paths, [`Accelerator::store_factory`] resolves the name lookup
//! once and hands back a bound store closure.

use crate::config::Config;
use crate::device::DeviceHandler;
use crate::device_buffer::DeviceInputBuffer;
use crate::error::{DriverError, Result};
use crate::ring::{RingMode, SizeSpecifier};
use alveo_xrt::CommandState;
use bytes::Bytes;

/// Collection of device handlers managed as one compute resource
#[derive(Debug)]
pub struct Accelerator {
    devices: Vec<DeviceHandler>,
}

impl Accelerator {
    /// Construct one handler per configured device
    ///
    /// # Errors
    ///
    /// Fails when any device entry fails validation or setup.
    pub fn new(config: &Config, ring_parts: usize, mode: RingMode) -> Result<Self> {
        let devices = config
            .devices
            .iter()
            .map(|entry| DeviceHandler::new(entry, ring_parts, mode))
            .collect::<Result<Vec<_>>>()?;
        tracing::info!("Accelerator ready with {} device(s)", devices.len());
        Ok(Self { devices })
    }

    /// Number of devices
    #[must_use]
    pub const fn device_count(&self) -> usize {
        self.devices.len()
    }

    /// Whether a handler exists for the runtime index
    #[must_use]
    pub fn contains_device(&self, device_index: u32) -> bool {
        self.devices
            .iter()
            .any(|d| d.device_index() == device_index)
    }

    /// Handler for a runtime index
    ///
    /// # Errors
    ///
    /// Returns a lookup error for an unknown index.
    pub fn device_handler(&self, device_index: u32) -> Result<&DeviceHandler> {
        self.devices
            .iter()
            .find(|d| d.device_index() == device_index)
            .ok_or(DriverError::UnknownDevice {
                index: device_index,
                count: self.devices.len(),
            })
    }

    /// Iterate over the device handlers
    pub fn handlers(&self) -> impl Iterator<Item = &DeviceHandler> {
        self.devices.iter()
    }

    /// Stage packed parts into an input buffer
    ///
    /// # Errors
    ///
    /// Lookup errors for unknown device/kernel; ring semantics otherwise.
    pub fn store(&self, data: &[u8], device_index: u32, kernel_name: &str) -> Result<bool> {
        self.device_handler(device_index)?.store(data, kernel_name)
    }

    /// Execute one staged part on an input kernel
    ///
    /// # Errors
    ///
    /// Lookup errors for unknown device/kernel; run semantics otherwise.
    pub fn run(&self, device_index: u32, kernel_name: &str) -> Result<bool> {
        self.device_handler(device_index)?.run(kernel_name)
    }

    /// Harvest results from an output kernel
    ///
    /// # Errors
    ///
    /// Lookup errors for unknown device/kernel; read semantics otherwise.
    pub fn read(
        &self,
        device_index: u32,
        kernel_name: &str,
        samples: u32,
    ) -> Result<CommandState> {
        self.device_handler(device_index)?.read(kernel_name, samples)
    }

    /// Take an output buffer's archive as per-sample parts
    ///
    /// # Errors
    ///
    /// Lookup errors for unknown device/kernel.
    pub fn retrieve(
        &self,
        device_index: u32,
        kernel_name: &str,
        force_archive: bool,
    ) -> Result<Vec<Vec<u8>>> {
        self.device_handler(device_index)?
            .retrieve(kernel_name, force_archive)
    }

    /// Take an output buffer's archive as one flat payload
    ///
    /// # Errors
    ///
    /// Lookup errors for unknown device/kernel.
    pub fn retrieve_flat(
        &self,
        device_index: u32,
        kernel_name: &str,
        force_archive: bool,
    ) -> Result<Bytes> {
        self.device_handler(device_index)?
            .retrieve_flat(kernel_name, force_archive)
    }

    /// Query a buffer dimension
    ///
    /// # Errors
    ///
    /// Lookup errors for unknown device/kernel.
    pub fn size(
        &self,
        spec: SizeSpecifier,
        device_index: u32,
        kernel_name: &str,
    ) -> Result<usize> {
        self.device_handler(device_index)?.size(spec, kernel_name)
    }

    /// Resolve an input buffer once and return a bound store handle
    ///
    /// The handle skips device and kernel lookup on every call, which
    /// matters on hot store paths. The borrow ties the handle to this
    /// accelerator, so it cannot outlive or dangle past the handler it
    /// is bound to.
    ///
    /// # Errors
    ///
    /// Lookup errors for unknown device/kernel.
    pub fn store_factory(
        &self,
        device_index: u32,
        kernel_name: &str,
    ) -> Result<UncheckedStore<'_>> {
        let buffer = self
            .device_handler(device_index)?
            .input_buffer(kernel_name)?;
        Ok(UncheckedStore { buffer })
    }
}

/// Store handle bound to one input buffer, bypassing name lookup
#[derive(Debug, Clone, Copy)]
pub struct UncheckedStore<'a> {
    buffer: &'a DeviceInputBuffer,
}

impl UncheckedStore<'_> {
    /// Stage packed parts into the bound buffer
    ///
    /// # Errors
    ///
    /// Ring length/capacity errors as for a checked store.
    pub fn store(&self, data: &[u8]) -> Result<bool> {
        self.buffer.store(data)
    }

    /// Name of the bound kernel buffer
    #[must_use]
    pub fn kernel_name(&self) -> &str {
        self.buffer.name()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{BufferDescriptor, DeviceConfig};
    use std::path::PathBuf;

    fn temp_xclbin(tag: &str) -> PathBuf {
        let path =
            std::env::temp_dir().join(format!("alveo-accel-{}-{tag}.xclbin", std::process::id()));
        std::fs::write(&path, b"accelerator-test-image").unwrap();
        path
    }

    fn two_device_config(tag: &str) -> Config {
        let device = |index: u32| DeviceConfig {
            xclbin: temp_xclbin(&format!("{tag}-{index}")),
            xrt_device_index: index,
            idmas: vec![BufferDescriptor::new("idma0", vec![2, 2])],
            odmas: vec![BufferDescriptor::new("odma0", vec![2, 2])],
        };
        Config {
            devices: vec![device(0), device(1)],
        }
    }

    #[test]
    fn test_routing_by_device_index() {
        let accel =
            Accelerator::new(&two_device_config("route"), 4, RingMode::SingleThreaded).unwrap();
        assert_eq!(accel.device_count(), 2);
        assert!(accel.contains_device(1));
        assert!(!accel.contains_device(2));

        assert!(accel.store(&[1u8; 4], 1, "idma0").unwrap());
        assert!(accel.run(1, "idma0").unwrap());
        assert!(accel.read(1, "odma0", 1).unwrap().is_success());
        assert_eq!(accel.retrieve(1, "odma0", true).unwrap(), vec![vec![1u8; 4]]);

        // device 0 was untouched
        assert!(accel.retrieve(0, "odma0", true).unwrap().is_empty());
    }

    #[test]
    fn test_unknown_device_is_an_error() {
        let accel =
            Accelerator::new(&two_device_config("baddev"), 4, RingMode::SingleThreaded).unwrap();
        assert!(matches!(
            accel.run(9, "idma0"),
            Err(DriverError::UnknownDevice { index: 9, count: 2 })
        ));
    }

    #[test]
    fn test_store_factory_binds_buffer() {
        let accel =
            Accelerator::new(&two_device_config("factory"), 4, RingMode::SingleThreaded).unwrap();
        let store = accel.store_factory(0, "idma0").unwrap();
        assert_eq!(store.kernel_name(), "idma0");
        assert!(store.store(&[3u8; 4]).unwrap());
        assert_eq!(
            accel.size(SizeSpecifier::PartCount, 0, "idma0").unwrap(),
            1
        );
        assert!(accel.store_factory(0, "missing").is_err());
        assert!(accel.store_factory(5, "idma0").is_err());
    }
}
