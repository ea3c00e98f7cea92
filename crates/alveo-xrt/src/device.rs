//! Device handle, bitstream loading and the emulated sample pipeline

use crate::error::{Result, XrtError};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Identity of a loaded bitstream image
///
/// Derived from the image contents, so reloading the same file on any
/// device yields the same UUID.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Uuid([u8; 16]);

impl Uuid {
    /// Derive the UUID of a bitstream image from its raw bytes
    #[must_use]
    pub fn from_image(image: &[u8]) -> Self {
        // FNV-1a over the contents, twice with different offset bases,
        // gives a stable 128-bit identity for the emulated runtime.
        let mut bytes = [0u8; 16];
        bytes[..8].copy_from_slice(&fnv1a(image, 0xcbf2_9ce4_8422_2325).to_le_bytes());
        bytes[8..].copy_from_slice(&fnv1a(image, 0x6c62_272e_07bb_0142).to_le_bytes());
        Self(bytes)
    }

    /// Raw 16-byte identity
    #[must_use]
    pub const fn as_bytes(&self) -> &[u8; 16] {
        &self.0
    }
}

impl std::fmt::Display for Uuid {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        for (i, byte) in self.0.iter().enumerate() {
            if matches!(i, 4 | 6 | 8 | 10) {
                write!(f, "-")?;
            }
            write!(f, "{byte:02x}")?;
        }
        Ok(())
    }
}

fn fnv1a(data: &[u8], basis: u64) -> u64 {
    let mut hash = basis;
    for &byte in data {
        hash ^= u64::from(byte);
        hash = hash.wrapping_mul(0x0000_0100_0000_01b3);
    }
    hash
}

/// Handle to one accelerator device
///
/// Cheap to clone; all clones address the same device state. The emulated
/// registry admits any index, mirroring a host with the device present.
#[derive(Debug, Clone)]
pub struct Device {
    state: Arc<DeviceState>,
}

#[derive(Debug)]
struct DeviceState {
    index: u32,
    image: Mutex<Option<LoadedImage>>,
    stream: Mutex<VecDeque<Vec<u8>>>,
}

#[derive(Debug)]
struct LoadedImage {
    uuid: Uuid,
    path: PathBuf,
}

impl Device {
    /// Open the device at the given runtime index
    ///
    /// # Errors
    ///
    /// The emulated runtime cannot fail to open; the `Result` mirrors the
    /// vendor API so callers propagate uniformly.
    pub fn open(index: u32) -> Result<Self> {
        tracing::info!("Opening device {index}");
        Ok(Self {
            state: Arc::new(DeviceState {
                index,
                image: Mutex::new(None),
                stream: Mutex::new(VecDeque::new()),
            }),
        })
    }

    /// Get device index
    #[must_use]
    pub fn index(&self) -> u32 {
        self.state.index
    }

    /// Load a bitstream image and return its UUID
    ///
    /// The path must name an existing, non-empty regular file. Loading
    /// discards any samples still queued in the device pipeline.
    ///
    /// # Errors
    ///
    /// Returns an error if the file is missing, empty, or unreadable.
    pub fn load_xclbin(&self, path: &Path) -> Result<Uuid> {
        if !path.is_file() {
            return Err(XrtError::BitstreamNotFound {
                path: path.to_path_buf(),
            });
        }
        let image = std::fs::read(path)?;
        if image.is_empty() {
            return Err(XrtError::BitstreamEmpty {
                path: path.to_path_buf(),
            });
        }

        let uuid = Uuid::from_image(&image);
        tracing::info!(
            "Device {}: loaded bitstream {} ({} bytes, uuid {uuid})",
            self.state.index,
            path.display(),
            image.len()
        );

        *self.state.image.lock() = Some(LoadedImage {
            uuid,
            path: path.to_path_buf(),
        });
        self.state.stream.lock().clear();
        Ok(uuid)
    }

    /// UUID of the currently loaded image, if any
    #[must_use]
    pub fn loaded_uuid(&self) -> Option<Uuid> {
        self.state.image.lock().as_ref().map(|img| img.uuid)
    }

    /// Path of the currently loaded image, if any
    #[must_use]
    pub fn loaded_path(&self) -> Option<PathBuf> {
        self.state.image.lock().as_ref().map(|img| img.path.clone())
    }

    /// Number of samples waiting in the emulated pipeline
    #[must_use]
    pub fn pending_samples(&self) -> usize {
        self.state.stream.lock().len()
    }

    /// Check a caller-presented UUID against the loaded image
    pub(crate) fn verify_uuid(&self, uuid: &Uuid, kernel: &str) -> Result<()> {
        let guard = self.state.image.lock();
        let Some(image) = guard.as_ref() else {
            return Err(XrtError::NoBitstreamLoaded {
                index: self.state.index,
            });
        };
        if image.uuid != *uuid {
            return Err(XrtError::UuidMismatch {
                kernel: kernel.to_string(),
                requested: *uuid,
                loaded: image.uuid,
            });
        }
        Ok(())
    }

    pub(crate) fn push_sample(&self, payload: Vec<u8>) {
        self.state.stream.lock().push_back(payload);
    }

    pub(crate) fn pop_sample(&self) -> Option<Vec<u8>> {
        self.state.stream.lock().pop_front()
    }
}
