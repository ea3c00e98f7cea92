//! Typed driver façade
//!
//! The [`Driver`] is the application entry point: it owns the
//! accelerator, knows the quantized datatypes at the network's input and
//! output boundaries, and combines the codec with the device pipeline —
//! pack, store, run, read, unpack. Callers that already hold packed
//! bytes use the raw path and skip the codec.

use crate::accelerator::Accelerator;
use crate::config::Config;
use crate::error::{DriverError, Result};
use crate::ring::{RingMode, SizeSpecifier};
use alveo_quant::QuantType;
use bytes::Bytes;
use std::path::Path;

/// Default routing and batching applied by the no-argument inference calls
#[derive(Debug, Clone)]
pub struct InferenceDefaults {
    /// Device index of the default input kernel
    pub input_device: u32,
    /// Default input kernel name
    pub input_kernel: String,
    /// Device index of the default output kernel
    pub output_device: u32,
    /// Default output kernel name
    pub output_kernel: String,
    /// Samples harvested per inference
    pub samples: u32,
    /// Whether partial batches are forced into the archive
    pub force_archive: bool,
}

/// Typed entry point combining codec and accelerator
#[derive(Debug)]
pub struct Driver {
    accelerator: Accelerator,
    config: Config,
    input_type: QuantType,
    output_type: QuantType,
    defaults: Option<InferenceDefaults>,
}

impl Driver {
    /// Build a driver from a validated in-memory configuration
    ///
    /// `input_type` and `output_type` are the quantized datatypes at the
    /// network boundaries; `ring_parts` sizes every host ring in parts.
    ///
    /// # Errors
    ///
    /// Fails when the configuration is invalid or device setup fails.
    pub fn new(
        config: Config,
        input_type: QuantType,
        output_type: QuantType,
        ring_parts: usize,
        mode: RingMode,
    ) -> Result<Self> {
        config.validate()?;
        let accelerator = Accelerator::new(&config, ring_parts, mode)?;
        Ok(Self {
            accelerator,
            config,
            input_type,
            output_type,
            defaults: None,
        })
    }

    /// Build a driver from a configuration file
    ///
    /// # Errors
    ///
    /// Fails when the file is unreadable or invalid, or device setup
    /// fails.
    pub fn from_config_path(
        path: &Path,
        input_type: QuantType,
        output_type: QuantType,
        ring_parts: usize,
        mode: RingMode,
    ) -> Result<Self> {
        let config = Config::from_path(path)?;
        Self::new(config, input_type, output_type, ring_parts, mode)
    }

    /// Attach default routing for the no-argument inference calls
    #[must_use]
    pub fn with_defaults(mut self, defaults: InferenceDefaults) -> Self {
        self.defaults = Some(defaults);
        self
    }

    /// The validated configuration
    #[must_use]
    pub const fn config(&self) -> &Config {
        &self.config
    }

    /// The underlying accelerator
    #[must_use]
    pub const fn accelerator(&self) -> &Accelerator {
        &self.accelerator
    }

    /// Input datatype at the network boundary
    #[must_use]
    pub const fn input_type(&self) -> QuantType {
        self.input_type
    }

    /// Output datatype at the network boundary
    #[must_use]
    pub const fn output_type(&self) -> QuantType {
        self.output_type
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
        self.accelerator.size(spec, device_index, kernel_name)
    }

    /// Raw inference: already-packed bytes in, flat archive bytes out
    ///
    /// Stores the packed sample through the resolved-once store handle,
    /// executes the input kernel, harvests `samples` results and returns
    /// the flattened archive.
    ///
    /// # Errors
    ///
    /// Lookup errors for unknown routes; a backpressure error when the
    /// sample was not accepted or nothing was staged to run; a runtime
    /// error when the final kernel state is not a success state.
    #[allow(clippy::too_many_arguments)]
    pub fn infer_raw(
        &self,
        data: &[u8],
        input_device: u32,
        input_kernel: &str,
        output_device: u32,
        output_kernel: &str,
        samples: u32,
        force_archive: bool,
    ) -> Result<Bytes> {
        tracing::debug!("Starting inference (raw data, {} bytes)", data.len());
        self.execute_raw(
            data,
            input_device,
            input_kernel,
            output_device,
            output_kernel,
            samples,
        )?;
        self.accelerator
            .retrieve_flat(output_device, output_kernel, force_archive)
    }

    /// Raw inference returning per-sample chunks instead of a flat payload
    ///
    /// # Errors
    ///
    /// As for [`infer_raw`](Self::infer_raw).
    #[allow(clippy::too_many_arguments)]
    pub fn infer_raw_batched(
        &self,
        data: &[u8],
        input_device: u32,
        input_kernel: &str,
        output_device: u32,
        output_kernel: &str,
        samples: u32,
        force_archive: bool,
    ) -> Result<Vec<Vec<u8>>> {
        tracing::debug!("Starting inference (raw data, batched return)");
        self.execute_raw(
            data,
            input_device,
            input_kernel,
            output_device,
            output_kernel,
            samples,
        )?;
        self.accelerator
            .retrieve(output_device, output_kernel, force_archive)
    }

    /// Typed inference over an explicit route
    ///
    /// `values` are integer-equivalents of the input datatype; the result
    /// is unpacked into integer-equivalents of the output datatype. The
    /// folded shapes of the routed descriptors provide the codec group
    /// sizes.
    ///
    /// # Errors
    ///
    /// Codec errors for out-of-domain or mis-shaped values, plus every
    /// failure mode of [`infer_raw`](Self::infer_raw). A configuration
    /// error is raised when a routed descriptor carries no folded shape.
    #[allow(clippy::too_many_arguments)]
    pub fn infer_synchronous_on(
        &self,
        values: &[i64],
        input_device: u32,
        input_kernel: &str,
        output_device: u32,
        output_kernel: &str,
        samples: u32,
        force_archive: bool,
    ) -> Result<Vec<i64>> {
        let input_fold = self.folded_innermost(input_device, input_kernel, true)?;
        let packed = alveo_quant::pack(self.input_type, values, input_fold)?;
        let result = self.infer_raw(
            &packed,
            input_device,
            input_kernel,
            output_device,
            output_kernel,
            samples,
            force_archive,
        )?;
        let output_fold = self.folded_innermost(output_device, output_kernel, false)?;
        Ok(alveo_quant::unpack(self.output_type, &result, output_fold)?)
    }

    /// Typed inference over the configured default route
    ///
    /// # Errors
    ///
    /// A configuration error when no defaults were attached; otherwise as
    /// for [`infer_synchronous_on`](Self::infer_synchronous_on).
    pub fn infer_synchronous(&self, values: &[i64]) -> Result<Vec<i64>> {
        let d = self.defaults()?;
        self.infer_synchronous_on(
            values,
            d.input_device,
            &d.input_kernel,
            d.output_device,
            &d.output_kernel,
            d.samples,
            d.force_archive,
        )
    }

    /// Typed inference with the output scaled to logical values
    ///
    /// Integer outputs come back as whole `f64`s; fixed-point outputs are
    /// scaled by `2^-f`.
    ///
    /// # Errors
    ///
    /// As for [`infer_synchronous`](Self::infer_synchronous).
    pub fn infer_synchronous_scaled(&self, values: &[i64]) -> Result<Vec<f64>> {
        let d = self.defaults()?;
        let input_fold = self.folded_innermost(d.input_device, &d.input_kernel, true)?;
        let packed = alveo_quant::pack(self.input_type, values, input_fold)?;
        let result = self.infer_raw(
            &packed,
            d.input_device,
            &d.input_kernel,
            d.output_device,
            &d.output_kernel,
            d.samples,
            d.force_archive,
        )?;
        let output_fold = self.folded_innermost(d.output_device, &d.output_kernel, false)?;
        Ok(alveo_quant::unpack_scaled(
            self.output_type,
            &result,
            output_fold,
        )?)
    }

    fn defaults(&self) -> Result<&InferenceDefaults> {
        self.defaults
            .as_ref()
            .ok_or_else(|| DriverError::config("no default inference route configured"))
    }

    fn folded_innermost(&self, device: u32, kernel: &str, input: bool) -> Result<usize> {
        let descriptor = if input {
            self.config.input_descriptor(device, kernel)?
        } else {
            self.config.output_descriptor(device, kernel)?
        };
        let folded = descriptor.folded_shape.as_ref().ok_or_else(|| {
            DriverError::config(format!(
                "kernel {kernel:?} has no folded shape; typed inference needs one"
            ))
        })?;
        folded.last().copied().filter(|&k| k > 0).ok_or_else(|| {
            DriverError::config(format!("kernel {kernel:?} has an empty folded shape"))
        })
    }

    fn execute_raw(
        &self,
        data: &[u8],
        input_device: u32,
        input_kernel: &str,
        output_device: u32,
        output_kernel: &str,
        samples: u32,
    ) -> Result<()> {
        let store = self.accelerator.store_factory(input_device, input_kernel)?;
        let stored = store.store(data)?;
        let ran = self.accelerator.run(input_device, input_kernel)?;
        if !(stored && ran) {
            return Err(DriverError::Backpressure { stored, ran });
        }

        tracing::debug!("Reading out buffers");
        let state = self
            .accelerator
            .read(output_device, output_kernel, samples)?;
        if state.is_success() {
            Ok(())
        } else {
            Err(DriverError::Runtime { state })
        }
    }
}
