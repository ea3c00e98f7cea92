//! Error types for codec operations

use crate::QuantType;
use thiserror::Error;

/// Result type alias for codec operations
pub type Result<T> = std::result::Result<T, QuantError>;

/// Errors that can occur while packing or unpacking quantized values
#[derive(Debug, Clone, PartialEq, Error)]
pub enum QuantError {
    /// A value is outside the representable range of the datatype
    #[error("Value {value} at index {index} is outside the domain of {dtype}")]
    Domain {
        /// Offending value
        value: i64,
        /// Position in the input sequence
        index: usize,
        /// Datatype the value was checked against
        dtype: QuantType,
    },

    /// The input element count is not a multiple of the folded innermost dimension
    #[error("{elements} elements cannot be grouped into rows of {innermost}")]
    Shape {
        /// Number of logical values supplied
        elements: usize,
        /// Folded innermost dimension
        innermost: usize,
    },

    /// The packed byte count is not a multiple of the packed group width
    #[error("{bytes} bytes is not a multiple of the {group_bytes}-byte packed group")]
    Length {
        /// Number of bytes supplied
        bytes: usize,
        /// Packed width of one group
        group_bytes: usize,
    },

    /// The datatype is not carried by the requested codec entry point
    /// (float32 has no integer codec; `pack_bytes` only takes byte-wide
    /// types)
    #[error("No codec for {dtype} on this entry point")]
    Unsupported {
        /// Datatype that was requested
        dtype: QuantType,
    },
}
