//! Quantized datatype descriptors and the bit-packing codec.
//!
//! Dataflow accelerator kernels consume and produce tightly bit-packed byte
//! streams: a logical tensor of, say, signed 4-bit integers is folded so
//! that its innermost dimension is transferred as `ceil(inner * 4 / 8)`
//! bytes per row. This crate owns the two sides of that contract:
//!
//! - [`QuantType`] describes a quantized numeric type (signedness,
//!   bit-width, range, integer/fixed-point, domain check).
//! - [`pack`] / [`unpack`] are the invertible transformation between
//!   logical values and the byte-accurate packed layout.
//!
//! # Wire layout
//!
//! For every group of `K` consecutive logical values (the folded innermost
//! dimension), the b-bit representations are concatenated into a bit
//! stream least-significant-value-first, least-significant-bit-first, and
//! emitted LSB-first into bytes, zero-padded to `ceil(K*b/8)` bytes before
//! the next group begins. Padding never spans group boundaries, so the
//! layout is host-endianness independent.
//!
//! ```
//! use alveo_quant::{pack, unpack, QuantType};
//!
//! let dt = QuantType::UnsignedInt { bits: 2 };
//! let packed = pack(dt, &[0, 1, 2, 3, 3, 2, 1, 0], 4).unwrap();
//! assert_eq!(packed, vec![0xE4, 0x1B]);
//! assert_eq!(unpack(dt, &packed, 4).unwrap(), vec![0, 1, 2, 3, 3, 2, 1, 0]);
//! ```

#![warn(missing_docs)]
#![warn(clippy::all, clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::must_use_candidate)]

mod dtype;
mod error;
mod packing;
mod shape;

pub use dtype::QuantType;
pub use error::{QuantError, Result};
pub use packing::{pack, pack_bytes, packed_group_bytes, unpack, unpack_scaled};
pub use shape::Shape;
