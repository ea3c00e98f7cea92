//! Quantized datatype descriptors
//!
//! One tagged enum covers the finite set of datatypes a compiled dataflow
//! graph can use at its DMA boundaries. All attributes are resolvable from
//! the variant alone, so descriptors are `Copy` and comparable by variant
//! identity.

/// A quantized numeric type as seen at a kernel's DMA boundary
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QuantType {
    /// Two's-complement signed integer of the given bit-width
    SignedInt {
        /// Bit-width (1..=64)
        bits: u32,
    },

    /// Unsigned integer of the given bit-width
    UnsignedInt {
        /// Bit-width (1..=64)
        bits: u32,
    },

    /// Signed fixed-point: `bits` total, `int_bits` integer bits, the rest
    /// fractional. A logical value is the stored integer scaled by
    /// `2^-(bits - int_bits)`.
    Fixed {
        /// Total bit-width
        bits: u32,
        /// Integer bits (including sign)
        int_bits: u32,
    },

    /// IEEE-754 single precision (byte-transparent on the wire)
    Float32,

    /// One-bit bipolar type with domain {-1, +1}, packed as -1 -> 0, +1 -> 1
    Bipolar,

    /// Two-bit ternary type with domain {-1, 0, +1}
    Ternary,
}

impl QuantType {
    /// Bit-width of one logical value on the wire
    #[must_use]
    pub const fn bit_width(self) -> u32 {
        match self {
            Self::SignedInt { bits } | Self::UnsignedInt { bits } | Self::Fixed { bits, .. } => {
                bits
            }
            Self::Float32 => 32,
            Self::Bipolar => 1,
            Self::Ternary => 2,
        }
    }

    /// Whether the domain contains negative values
    #[must_use]
    pub const fn is_signed(self) -> bool {
        !matches!(self, Self::UnsignedInt { .. })
    }

    /// Whether this is an integer type (bipolar and ternary included)
    #[must_use]
    pub const fn is_integer(self) -> bool {
        !matches!(self, Self::Fixed { .. } | Self::Float32)
    }

    /// Whether this is a fixed-point type
    #[must_use]
    pub const fn is_fixed_point(self) -> bool {
        matches!(self, Self::Fixed { .. })
    }

    /// Fractional bits (non-zero only for fixed-point)
    #[must_use]
    pub const fn fractional_bits(self) -> u32 {
        match self {
            Self::Fixed { bits, int_bits } => bits - int_bits,
            _ => 0,
        }
    }

    /// Scale factor applied to the stored integer (`2^-f`, 1.0 for integers)
    #[must_use]
    pub fn scale(self) -> f64 {
        (-f64::from(self.fractional_bits())).exp2()
    }

    /// Smallest logical value
    #[must_use]
    pub fn min(self) -> f64 {
        match self {
            Self::SignedInt { bits } => -(f64::from(bits - 1).exp2()),
            Self::UnsignedInt { .. } => 0.0,
            Self::Fixed { bits, .. } => -(f64::from(bits - 1).exp2()) * self.scale(),
            Self::Float32 => f64::from(f32::MIN),
            Self::Bipolar | Self::Ternary => -1.0,
        }
    }

    /// Largest logical value
    #[must_use]
    pub fn max(self) -> f64 {
        match self {
            Self::SignedInt { bits } => f64::from(bits - 1).exp2() - 1.0,
            Self::UnsignedInt { bits } => f64::from(bits).exp2() - 1.0,
            Self::Fixed { bits, .. } => (f64::from(bits - 1).exp2() - 1.0) * self.scale(),
            Self::Float32 => f64::from(f32::MAX),
            Self::Bipolar | Self::Ternary => 1.0,
        }
    }

    /// Test whether an integer-equivalent value is representable
    ///
    /// For fixed-point the check is on the stored (unscaled) integer. For
    /// bipolar the domain is exactly {-1, +1}.
    #[must_use]
    pub const fn admits(self, value: i64) -> bool {
        match self {
            Self::SignedInt { bits } | Self::Fixed { bits, .. } => {
                if bits >= 64 {
                    true
                } else {
                    let half = 1i64 << (bits - 1);
                    value >= -half && value < half
                }
            }
            Self::UnsignedInt { bits } => {
                if bits >= 64 {
                    value >= 0
                } else {
                    value >= 0 && value < (1i64 << bits)
                }
            }
            Self::Float32 => true,
            Self::Bipolar => value == -1 || value == 1,
            Self::Ternary => value >= -1 && value <= 1,
        }
    }

    /// Test whether a logical (scaled) value lies inside [min, max]
    #[must_use]
    pub fn admits_f64(self, value: f64) -> bool {
        match self {
            Self::Bipolar => value == -1.0 || value == 1.0,
            _ => value >= self.min() && value <= self.max(),
        }
    }

    /// Number of distinct values the datatype can represent
    ///
    /// `2^b` for integer and fixed-point types; bipolar and ternary
    /// enumerate their restricted domains (2 and 3). Returned as `f64`
    /// so 64-bit widths stay representable.
    #[must_use]
    pub fn possible_values(self) -> f64 {
        match self {
            Self::SignedInt { bits } | Self::UnsignedInt { bits } | Self::Fixed { bits, .. } => {
                f64::from(bits).exp2()
            }
            Self::Float32 => f64::from(u32::MAX) + 1.0,
            Self::Bipolar => 2.0,
            Self::Ternary => 3.0,
        }
    }

    /// Number of host words of `word_bits` needed to hold one logical value
    ///
    /// 1 when the datatype fits a word, otherwise `ceil(bit_width / word_bits)`
    /// (e.g. an INT14 needs 2 bytes of u8 storage).
    #[must_use]
    pub const fn required_host_elements(self, word_bits: u32) -> usize {
        let bits = self.bit_width();
        if bits <= word_bits {
            1
        } else {
            bits.div_ceil(word_bits) as usize
        }
    }
}

impl std::fmt::Display for QuantType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::SignedInt { bits } => write!(f, "INT{bits}"),
            Self::UnsignedInt { bits } => write!(f, "UINT{bits}"),
            Self::Fixed { bits, int_bits } => write!(f, "FIXED<{bits},{int_bits}>"),
            Self::Float32 => write!(f, "FLOAT32"),
            Self::Bipolar => write!(f, "BIPOLAR"),
            Self::Ternary => write!(f, "TERNARY"),
        }
    }
}
