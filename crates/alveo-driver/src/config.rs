//! Driver configuration records
//!
//! A configuration describes the accelerator the driver is asked to run:
//! per device, the bitstream to load, the runtime device index and the
//! input/output DMA kernels with their shapes. The on-disk form is the
//! JSON the dataflow compiler emits next to the bitstream; every device
//! handler re-validates its own entry before touching the device, so a
//! broken configuration fails fast with a structured error.

use crate::error::{DriverError, Result};
use alveo_quant::Shape;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Description of one DMA kernel buffer
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BufferDescriptor {
    /// Kernel name, e.g. `StreamingDataflowPartition_0:{idma0}`
    #[serde(rename = "kernelName")]
    pub kernel_name: String,

    /// Per-sample shape in transport bytes
    #[serde(rename = "packedShape")]
    pub packed_shape: Vec<usize>,

    /// Logical tensor shape of the network boundary, when known
    #[serde(rename = "normalShape", default)]
    pub normal_shape: Option<Vec<usize>>,

    /// Folded (parallelism-reshaped) form, when known
    ///
    /// Required for typed inference: its innermost dimension is the
    /// codec's group size.
    #[serde(rename = "foldedShape", default)]
    pub folded_shape: Option<Vec<usize>>,
}

impl BufferDescriptor {
    /// Create a descriptor from a name and packed shape
    pub fn new(kernel_name: impl Into<String>, packed_shape: Vec<usize>) -> Self {
        Self {
            kernel_name: kernel_name.into(),
            packed_shape,
            normal_shape: None,
            folded_shape: None,
        }
    }

    /// Attach the folded shape (enables typed inference on this buffer)
    #[must_use]
    pub fn with_folded_shape(mut self, folded_shape: Vec<usize>) -> Self {
        self.folded_shape = Some(folded_shape);
        self
    }

    /// Packed shape as a [`Shape`]
    #[must_use]
    pub fn packed(&self) -> Shape {
        Shape::new(self.packed_shape.clone())
    }

    /// Bytes of one packed sample
    #[must_use]
    pub fn part_bytes(&self) -> usize {
        self.packed_shape.iter().product()
    }

    fn validate(&self, direction: &str) -> Result<()> {
        if self.kernel_name.is_empty() {
            return Err(DriverError::config(format!(
                "{direction} descriptor has an empty kernel name"
            )));
        }
        if self.packed_shape.is_empty() {
            return Err(DriverError::config(format!(
                "{direction} kernel {:?} has an empty packed shape",
                self.kernel_name
            )));
        }
        if self.packed_shape.contains(&0) {
            return Err(DriverError::config(format!(
                "{direction} kernel {:?} has a zero dimension in its packed shape",
                self.kernel_name
            )));
        }
        Ok(())
    }
}

/// Description of one FPGA device
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceConfig {
    /// Path to the bitstream image
    #[serde(rename = "xclbinPath")]
    pub xclbin: PathBuf,

    /// Runtime index the device enumerates at
    #[serde(rename = "xrtDeviceIndex")]
    pub xrt_device_index: u32,

    /// Input DMA kernels
    pub idmas: Vec<BufferDescriptor>,

    /// Output DMA kernels
    pub odmas: Vec<BufferDescriptor>,
}

impl DeviceConfig {
    /// Check the entry without touching the device
    ///
    /// # Errors
    ///
    /// Returns a configuration error for an empty or missing bitstream
    /// path, empty kernel lists, or malformed descriptors.
    pub fn validate(&self) -> Result<()> {
        if self.xclbin.as_os_str().is_empty() {
            return Err(DriverError::config(format!(
                "device {}: empty bitstream path",
                self.xrt_device_index
            )));
        }
        if !self.xclbin.is_file() {
            return Err(DriverError::config(format!(
                "device {}: bitstream {} is not a regular file",
                self.xrt_device_index,
                self.xclbin.display()
            )));
        }
        if self.idmas.is_empty() {
            return Err(DriverError::config(format!(
                "device {}: empty input kernel list",
                self.xrt_device_index
            )));
        }
        if self.odmas.is_empty() {
            return Err(DriverError::config(format!(
                "device {}: empty output kernel list",
                self.xrt_device_index
            )));
        }
        for descriptor in &self.idmas {
            descriptor.validate("input")?;
        }
        for descriptor in &self.odmas {
            descriptor.validate("output")?;
        }
        Ok(())
    }
}

/// A validated accelerator description
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Config {
    /// One entry per FPGA
    pub devices: Vec<DeviceConfig>,
}

impl Config {
    /// Parse a configuration from its JSON file
    ///
    /// # Errors
    ///
    /// Returns an error when the file is unreadable, fails to parse, or
    /// fails validation.
    pub fn from_path(path: &Path) -> Result<Self> {
        tracing::info!("Loading configuration from {}", path.display());
        let text = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&text)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate every device entry
    ///
    /// # Errors
    ///
    /// Returns the first configuration error encountered.
    pub fn validate(&self) -> Result<()> {
        if self.devices.is_empty() {
            return Err(DriverError::config("no devices configured"));
        }
        let mut indices: Vec<u32> = self.devices.iter().map(|d| d.xrt_device_index).collect();
        indices.sort_unstable();
        indices.dedup();
        if indices.len() != self.devices.len() {
            return Err(DriverError::config("duplicate xrt device indices"));
        }
        for device in &self.devices {
            device.validate()?;
        }
        Ok(())
    }

    /// Device entry for a runtime index
    ///
    /// # Errors
    ///
    /// Returns a lookup error for an unknown index.
    pub fn device(&self, xrt_device_index: u32) -> Result<&DeviceConfig> {
        self.devices
            .iter()
            .find(|d| d.xrt_device_index == xrt_device_index)
            .ok_or(DriverError::UnknownDevice {
                index: xrt_device_index,
                count: self.devices.len(),
            })
    }

    /// Input descriptor for a (device, kernel) pair
    ///
    /// # Errors
    ///
    /// Returns a lookup error for an unknown device or kernel name.
    pub fn input_descriptor(&self, device: u32, kernel_name: &str) -> Result<&BufferDescriptor> {
        let entry = self.device(device)?;
        entry
            .idmas
            .iter()
            .find(|d| d.kernel_name == kernel_name)
            .ok_or_else(|| {
                DriverError::unknown_kernel(kernel_name, entry.idmas.iter().map(|d| &d.kernel_name))
            })
    }

    /// Output descriptor for a (device, kernel) pair
    ///
    /// # Errors
    ///
    /// Returns a lookup error for an unknown device or kernel name.
    pub fn output_descriptor(&self, device: u32, kernel_name: &str) -> Result<&BufferDescriptor> {
        let entry = self.device(device)?;
        entry
            .odmas
            .iter()
            .find(|d| d.kernel_name == kernel_name)
            .ok_or_else(|| {
                DriverError::unknown_kernel(kernel_name, entry.odmas.iter().map(|d| &d.kernel_name))
            })
    }
}
