//! Tensor shapes and their packed derivations

use crate::QuantType;

/// Tensor shape (ordered positive dimensions)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Shape {
    /// Dimensions, outermost first (e.g. [batch, height, width, channels])
    pub dims: Vec<usize>,
}

impl Shape {
    /// Create new shape
    pub const fn new(dims: Vec<usize>) -> Self {
        Self { dims }
    }

    /// Get total number of elements
    #[must_use]
    pub fn total_elements(&self) -> usize {
        self.dims.iter().product()
    }

    /// Get number of dimensions
    #[must_use]
    pub const fn rank(&self) -> usize {
        self.dims.len()
    }

    /// Get the innermost dimension (0 for an empty shape)
    #[must_use]
    pub fn innermost(&self) -> usize {
        self.dims.last().copied().unwrap_or(0)
    }

    /// Derive the packed shape for a folded shape of the given datatype
    ///
    /// The innermost dimension is replaced by its packed byte width
    /// `ceil(innermost * bit_width / 8)`; outer dimensions are unchanged.
    #[must_use]
    pub fn packed(&self, dtype: QuantType) -> Self {
        let mut dims = self.dims.clone();
        if let Some(last) = dims.last_mut() {
            *last = crate::packed_group_bytes(*last, dtype.bit_width());
        }
        Self { dims }
    }
}

impl std::fmt::Display for Shape {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[")?;
        for (i, dim) in self.dims.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{dim}")?;
        }
        write!(f, "]")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_shape_total_elements() {
        let shape = Shape::new(vec![1, 4, 2]);
        assert_eq!(shape.total_elements(), 8);
    }

    #[test]
    fn test_shape_innermost() {
        assert_eq!(Shape::new(vec![1, 4, 2]).innermost(), 2);
        assert_eq!(Shape::new(vec![]).innermost(), 0);
    }

    #[test]
    fn test_shape_packed() {
        // 10 int4 values per row pack into 5 bytes
        let folded = Shape::new(vec![1, 2, 10]);
        let packed = folded.packed(QuantType::SignedInt { bits: 4 });
        assert_eq!(packed, Shape::new(vec![1, 2, 5]));

        // 3 int3 values per row pack into 2 bytes (padded)
        let folded = Shape::new(vec![4, 3]);
        let packed = folded.packed(QuantType::UnsignedInt { bits: 3 });
        assert_eq!(packed, Shape::new(vec![4, 2]));
    }

    #[test]
    fn test_shape_display() {
        let shape = Shape::new(vec![1, 224, 3]);
        assert_eq!(format!("{shape}"), "[1, 224, 3]");
    }
}
