//! Error types for runtime operations

use crate::Uuid;
use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for runtime operations
pub type Result<T> = std::result::Result<T, XrtError>;

/// Errors that can occur while talking to the accelerator runtime
#[derive(Debug, Error)]
pub enum XrtError {
    /// Bitstream file missing or not a regular file
    #[error("Bitstream not found: {path}")]
    BitstreamNotFound {
        /// Path that was checked
        path: PathBuf,
    },

    /// Bitstream file exists but is empty
    #[error("Bitstream file is empty: {path}")]
    BitstreamEmpty {
        /// Path that was checked
        path: PathBuf,
    },

    /// Kernel opened before a bitstream was loaded
    #[error("Device {index} has no bitstream loaded")]
    NoBitstreamLoaded {
        /// Device index
        index: u32,
    },

    /// Kernel opened against a UUID that is not the loaded image
    #[error("Kernel {kernel}: UUID {requested} does not match loaded image {loaded}")]
    UuidMismatch {
        /// Kernel name
        kernel: String,
        /// UUID the caller presented
        requested: Uuid,
        /// UUID of the image actually loaded
        loaded: Uuid,
    },

    /// Zero-byte buffer allocation
    #[error("Cannot allocate a zero-byte buffer object on device {index}")]
    EmptyAllocation {
        /// Device index
        index: u32,
    },

    /// I/O error while reading the bitstream
    #[error("I/O error: {source}")]
    Io {
        /// Underlying I/O error
        #[from]
        source: std::io::Error,
    },
}
