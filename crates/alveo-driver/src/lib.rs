//! Host-side inference driver for quantized dataflow accelerators.
//!
//! Moves batches of quantized tensor samples from host memory into
//! on-device kernel buffers, triggers dataflow kernel execution, harvests
//! the results and hands them back unpacked. The application thinks in
//! logical tensors of a quantized datatype; the accelerator consumes and
//! produces tightly bit-packed byte streams across fixed-size DMA
//! kernels — this crate is the bridge.
//!
//! # Architecture
//!
//! ```text
//! Driver (typed façade, pack/unpack)
//!   └── Accelerator (routes by device index)
//!         └── DeviceHandler (one FPGA, kernel-name directories)
//!               ├── DeviceInputBuffer   ring -> map -> sync -> kernel run
//!               └── DeviceOutputBuffer  kernel run -> sync -> ring -> archive
//! ```
//!
//! # Quick start
//!
//! ```no_run
//! use alveo_driver::prelude::*;
//! use alveo_quant::QuantType;
//!
//! # fn main() -> alveo_driver::Result<()> {
//! let driver = Driver::from_config_path(
//!     "design.json".as_ref(),
//!     QuantType::SignedInt { bits: 4 },
//!     QuantType::SignedInt { bits: 4 },
//!     16,
//!     RingMode::SingleThreaded,
//! )?;
//!
//! let result = driver.infer_raw(&[0x12, 0x34], 0, "idma0", 0, "odma0", 1, true)?;
//! println!("{} result bytes", result.len());
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all, clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::must_use_candidate)]
#![allow(clippy::doc_markdown)]

mod accelerator;
mod config;
mod device;
mod device_buffer;
mod driver;
mod error;
mod ring;

pub use accelerator::{Accelerator, UncheckedStore};
pub use config::{BufferDescriptor, Config, DeviceConfig};
pub use device::{DeviceHandler, Io};
pub use device_buffer::{device_allocation_size, DeviceInputBuffer, DeviceOutputBuffer};
pub use driver::{Driver, InferenceDefaults};
pub use error::{DriverError, Result};
pub use ring::{CancellationToken, RingBuffer, RingMode, SizeSpecifier};

pub use alveo_xrt::CommandState;

/// Commonly used types.
pub mod prelude {
    pub use crate::{
        Accelerator, BufferDescriptor, CancellationToken, Config, DeviceConfig, DeviceHandler,
        Driver, DriverError, InferenceDefaults, Io, Result, RingBuffer, RingMode, SizeSpecifier,
    };
}
