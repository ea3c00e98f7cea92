//! Kernel handles, access modes and kernel-run completion states

use crate::buffer::BufferObject;
use crate::device::{Device, Uuid};
use crate::error::Result;

/// Compute-unit access mode requested when opening a kernel
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KernelAccess {
    /// Several handles may address the kernel (input DMA engines)
    Shared,
    /// Single owner (output DMA engines)
    Exclusive,
}

/// Terminal state reported by a finished kernel run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandState {
    /// Run finished normally
    Completed,
    /// Wait elapsed before completion; the pipeline drained early
    Timeout,
    /// No work was queued; whatever data was retrieved stands
    New,
    /// Run failed
    Error,
    /// Run was aborted
    Abort,
}

impl CommandState {
    /// Whether the state counts as a successful completion
    ///
    /// `Timeout` and `New` both mean "no more data", not failure.
    #[must_use]
    pub const fn is_success(self) -> bool {
        matches!(self, Self::Completed | Self::Timeout | Self::New)
    }
}

impl std::fmt::Display for CommandState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Completed => "COMPLETED",
            Self::Timeout => "TIMEOUT",
            Self::New => "NEW",
            Self::Error => "ERROR",
            Self::Abort => "ABORT",
        };
        write!(f, "{name}")
    }
}

/// Handle to one named kernel in the loaded bitstream
#[derive(Debug, Clone)]
pub struct Kernel {
    device: Device,
    name: String,
    access: KernelAccess,
}

impl Kernel {
    /// Open a kernel by name against the loaded bitstream UUID
    ///
    /// # Errors
    ///
    /// Returns an error if no bitstream is loaded or the UUID does not
    /// match the loaded image.
    pub fn open(device: &Device, uuid: &Uuid, name: &str, access: KernelAccess) -> Result<Self> {
        device.verify_uuid(uuid, name)?;
        tracing::debug!(
            "Device {}: opened kernel {name} ({access:?})",
            device.index()
        );
        Ok(Self {
            device: device.clone(),
            name: name.to_string(),
            access,
        })
    }

    /// Kernel name
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Access mode the kernel was opened with
    #[must_use]
    pub const fn access(&self) -> KernelAccess {
        self.access
    }

    /// Submit a kernel run over the given buffer object
    ///
    /// The emulated device completes the run at submission: a `Shared`
    /// kernel pushes the buffer contents into the device pipeline, an
    /// `Exclusive` kernel pops the oldest payload into the buffer (or
    /// times out on an empty pipeline). The returned [`Run`] reports the
    /// recorded state from `wait`, preserving the submit/wait shape of
    /// the vendor API.
    pub fn start(&self, bo: &mut BufferObject, batch: u32) -> Run {
        let state = match self.access {
            KernelAccess::Shared => {
                self.device.push_sample(bo.map().to_vec());
                CommandState::Completed
            }
            KernelAccess::Exclusive => match self.device.pop_sample() {
                Some(payload) => {
                    let map = bo.map_mut();
                    let n = payload.len().min(map.len());
                    map[..n].copy_from_slice(&payload[..n]);
                    map[n..].fill(0);
                    CommandState::Completed
                }
                None => CommandState::Timeout,
            },
        };
        tracing::trace!(
            "Device {}: kernel {} run (batch {batch}) -> {state}",
            self.device.index(),
            self.name
        );
        Run {
            kernel: self.name.clone(),
            state,
        }
    }
}

/// Handle to one in-flight kernel run
#[derive(Debug)]
pub struct Run {
    kernel: String,
    state: CommandState,
}

impl Run {
    /// Block until the run reaches a terminal state
    #[must_use]
    pub fn wait(&self) -> CommandState {
        self.state
    }

    /// Block up to `timeout_ms` for a terminal state
    #[must_use]
    pub fn wait_timeout(&self, timeout_ms: u64) -> CommandState {
        let _ = timeout_ms;
        self.state
    }

    /// Last observed state without waiting
    #[must_use]
    pub fn state(&self) -> CommandState {
        self.state
    }

    /// Kernel this run belongs to
    #[must_use]
    pub fn kernel(&self) -> &str {
        &self.kernel
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn loaded_device(index: u32, tag: &str) -> (Device, Uuid) {
        let path: PathBuf =
            std::env::temp_dir().join(format!("alveo-xrt-kern-{}-{tag}", std::process::id()));
        std::fs::write(&path, b"kernel-test-image").unwrap();
        let dev = Device::open(index).unwrap();
        let uuid = dev.load_xclbin(&path).unwrap();
        (dev, uuid)
    }

    #[test]
    fn test_open_requires_loaded_image() {
        let dev = Device::open(0).unwrap();
        let uuid = Uuid::from_image(b"something");
        assert!(Kernel::open(&dev, &uuid, "idma0", KernelAccess::Shared).is_err());
    }

    #[test]
    fn test_open_rejects_stale_uuid() {
        let (dev, _uuid) = loaded_device(0, "stale");
        let wrong = Uuid::from_image(b"a different image");
        assert!(Kernel::open(&dev, &wrong, "idma0", KernelAccess::Shared).is_err());
    }

    #[test]
    fn test_loopback_through_pipeline() {
        let (dev, uuid) = loaded_device(1, "loop");
        let idma = Kernel::open(&dev, &uuid, "idma0", KernelAccess::Shared).unwrap();
        let odma = Kernel::open(&dev, &uuid, "odma0", KernelAccess::Exclusive).unwrap();

        let mut in_bo = BufferObject::allocate(&dev, 8).unwrap();
        let mut out_bo = BufferObject::allocate(&dev, 8).unwrap();
        in_bo.map_mut().copy_from_slice(&[1, 2, 3, 4, 5, 6, 7, 8]);

        assert_eq!(idma.start(&mut in_bo, 1).wait(), CommandState::Completed);
        assert_eq!(odma.start(&mut out_bo, 1).wait(), CommandState::Completed);
        assert_eq!(out_bo.map(), &[1, 2, 3, 4, 5, 6, 7, 8]);
    }

    #[test]
    fn test_output_timeout_on_drained_pipeline() {
        let (dev, uuid) = loaded_device(2, "timeout");
        let odma = Kernel::open(&dev, &uuid, "odma0", KernelAccess::Exclusive).unwrap();
        let mut out_bo = BufferObject::allocate(&dev, 4).unwrap();
        out_bo.map_mut().copy_from_slice(&[9, 9, 9, 9]);

        let state = odma.start(&mut out_bo, 1).wait_timeout(10);
        assert_eq!(state, CommandState::Timeout);
        // a timed-out run leaves the map untouched
        assert_eq!(out_bo.map(), &[9, 9, 9, 9]);
    }

    #[test]
    fn test_fifo_ordering() {
        let (dev, uuid) = loaded_device(3, "fifo");
        let idma = Kernel::open(&dev, &uuid, "idma0", KernelAccess::Shared).unwrap();
        let odma = Kernel::open(&dev, &uuid, "odma0", KernelAccess::Exclusive).unwrap();

        let mut bo = BufferObject::allocate(&dev, 1).unwrap();
        for v in [10u8, 20, 30] {
            bo.map_mut()[0] = v;
            assert!(idma.start(&mut bo, 1).wait().is_success());
        }

        let mut out = BufferObject::allocate(&dev, 1).unwrap();
        for expected in [10u8, 20, 30] {
            assert_eq!(odma.start(&mut out, 1).wait(), CommandState::Completed);
            assert_eq!(out.map()[0], expected);
        }
    }
}
