//! Opaque accelerator-runtime handles for dataflow FPGAs.
//!
//! The driver above this crate treats the vendor runtime as four opaque
//! handles — [`Device`], [`Kernel`], [`BufferObject`], [`Run`] — plus the
//! [`Uuid`] of the loaded bitstream and the [`CommandState`] a finished
//! kernel run reports. This crate implements that surface over a
//! process-local software-emulated accelerator, so everything built on it
//! runs in CI without hardware.
//!
//! # Emulated dataflow
//!
//! Each device owns a FIFO of sample payloads. Starting a run on a
//! kernel opened [`KernelAccess::Shared`] (the input direction) pushes a
//! copy of the buffer-object contents; starting a run on an
//! [`KernelAccess::Exclusive`] kernel pops the oldest payload into the
//! buffer object, or reports [`CommandState::Timeout`] when the pipeline
//! is drained. Per-device FIFO ordering therefore holds by construction.
//!
//! # Quick start
//!
//! ```no_run
//! use alveo_xrt::{BufferObject, Device, Kernel, KernelAccess};
//!
//! # fn main() -> alveo_xrt::Result<()> {
//! let device = Device::open(0)?;
//! let uuid = device.load_xclbin("design.xclbin".as_ref())?;
//! let kernel = Kernel::open(&device, &uuid, "idma0", KernelAccess::Shared)?;
//! let mut bo = BufferObject::allocate(&device, 4096)?;
//!
//! bo.map_mut()[..2].copy_from_slice(&[0x12, 0x34]);
//! bo.sync(alveo_xrt::SyncDirection::ToDevice);
//! let state = kernel.start(&mut bo, 1).wait();
//! assert!(state.is_success());
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all, clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::must_use_candidate)]

mod buffer;
mod device;
mod error;
mod kernel;

pub use buffer::{BufferObject, SyncDirection};
pub use device::{Device, Uuid};
pub use error::{Result, XrtError};
pub use kernel::{CommandState, Kernel, KernelAccess, Run};
