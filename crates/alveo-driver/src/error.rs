//! Error types for driver operations

use alveo_xrt::CommandState;
use thiserror::Error;

/// Result type alias for driver operations
pub type Result<T> = std::result::Result<T, DriverError>;

/// Errors that can occur while driving the accelerator
#[derive(Debug, Error)]
pub enum DriverError {
    /// Invalid or incomplete configuration
    #[error("Configuration error: {reason}")]
    Config {
        /// What was wrong
        reason: String,
    },

    /// Configuration file could not be parsed
    #[error("Configuration parse error: {source}")]
    ConfigParse {
        /// Underlying JSON error
        #[from]
        source: serde_json::Error,
    },

    /// Device index not present in the accelerator
    #[error("Unknown device index {index} (have {count} devices)")]
    UnknownDevice {
        /// Requested index
        index: u32,
        /// Number of configured devices
        count: usize,
    },

    /// Kernel buffer name not present on the device
    #[error("Unknown kernel buffer {name:?}; available: [{}]", available.join(", "))]
    UnknownKernel {
        /// Requested name
        name: String,
        /// Names that are configured, sorted
        available: Vec<String>,
    },

    /// Byte count is not a multiple of the part size
    #[error("{bytes} bytes is not a multiple of the {part_bytes}-byte part size")]
    Length {
        /// Bytes supplied
        bytes: usize,
        /// Part size in bytes
        part_bytes: usize,
    },

    /// Byte count exceeds the ring capacity
    #[error("{bytes} bytes exceeds the {capacity_bytes}-byte ring capacity")]
    Capacity {
        /// Bytes supplied
        bytes: usize,
        /// Total ring capacity in bytes
        capacity_bytes: usize,
    },

    /// Input sample was rejected before any kernel ran
    #[error("Input rejected (stored: {stored}, ran: {ran}); retry after draining the pipeline")]
    Backpressure {
        /// Whether the ring accepted the bytes
        stored: bool,
        /// Whether a part was available to execute
        ran: bool,
    },

    /// Kernel run finished in a non-success state
    #[error("Kernel run finished in state {state}")]
    Runtime {
        /// Terminal state that was reported
        state: CommandState,
    },

    /// Codec failure during pack or unpack
    #[error(transparent)]
    Quant(#[from] alveo_quant::QuantError),

    /// Runtime-layer failure
    #[error(transparent)]
    Xrt(#[from] alveo_xrt::XrtError),

    /// I/O error reading the configuration
    #[error("I/O error: {source}")]
    Io {
        /// Underlying I/O error
        #[from]
        source: std::io::Error,
    },
}

impl DriverError {
    /// Create a configuration error
    pub fn config(reason: impl Into<String>) -> Self {
        Self::Config {
            reason: reason.into(),
        }
    }

    /// Create an unknown-kernel error listing the configured names
    pub fn unknown_kernel<'a>(
        name: impl Into<String>,
        configured: impl IntoIterator<Item = &'a String>,
    ) -> Self {
        let mut available: Vec<String> = configured.into_iter().cloned().collect();
        available.sort();
        Self::UnknownKernel {
            name: name.into(),
            available,
        }
    }
}
