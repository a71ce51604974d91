//! Array and tensor containers.
//!
//! Dense numeric data moves as raw element bytes plus shape metadata, so
//! an image or point cloud crosses the wire without per-element encoding.
//! The Python binding maps both onto `numpy.ndarray`.

use serde::{Deserialize, Serialize};

/// Element type of an [`Array`] or [`Tensor`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Element {
    /// Unsigned 8-bit integer.
    U8,
    /// Signed 16-bit integer.
    I16,
    /// Signed 32-bit integer.
    I32,
    /// 32-bit float.
    F32,
    /// 64-bit float.
    F64,
}

impl Element {
    /// Size of one element in bytes.
    pub fn size(&self) -> usize {
        match self {
            Element::U8 => 1,
            Element::I16 => 2,
            Element::I32 | Element::F32 => 4,
            Element::F64 => 8,
        }
    }
}

/// One-dimensional dense array of elements.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Array {
    /// Element type of the data.
    pub element: Element,
    /// Raw element bytes, little-endian.
    #[serde(with = "serde_bytes")]
    pub data: Vec<u8>,
}

impl Array {
    /// Create an array over raw element bytes.
    pub fn new(element: Element, data: Vec<u8>) -> Self {
        Self { element, data }
    }

    /// Number of elements.
    pub fn len(&self) -> usize {
        self.data.len() / self.element.size()
    }

    /// True when the array holds no elements.
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

impl Default for Array {
    fn default() -> Self {
        Self::new(Element::U8, Vec::new())
    }
}

/// N-dimensional dense tensor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tensor {
    /// Element type of the data.
    pub element: Element,
    /// Dimension sizes, outermost first.
    pub shape: Vec<u32>,
    /// Raw element bytes in row-major order, little-endian.
    #[serde(with = "serde_bytes")]
    pub data: Vec<u8>,
}

impl Tensor {
    /// Create a tensor over raw element bytes.
    ///
    /// Returns `None` if `data` does not match `shape` × element size.
    pub fn new(element: Element, shape: Vec<u32>, data: Vec<u8>) -> Option<Self> {
        let elements: usize = shape.iter().map(|&d| d as usize).product();
        if elements * element.size() != data.len() {
            return None;
        }
        Some(Self {
            element,
            shape,
            data,
        })
    }

    /// Total number of elements.
    pub fn len(&self) -> usize {
        self.shape.iter().map(|&d| d as usize).product()
    }

    /// True when any dimension is zero.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for Tensor {
    fn default() -> Self {
        Self {
            element: Element::U8,
            shape: vec![0],
            data: Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::PayloadCodec;

    #[test]
    fn test_array_len() {
        let arr = Array::new(Element::F32, vec![0u8; 16]);
        assert_eq!(arr.len(), 4);
        assert!(!arr.is_empty());
        assert!(Array::default().is_empty());
    }

    #[test]
    fn test_tensor_shape_checked() {
        assert!(Tensor::new(Element::U8, vec![2, 3], vec![0u8; 6]).is_some());
        assert!(Tensor::new(Element::F32, vec![2, 3], vec![0u8; 24]).is_some());
        assert!(Tensor::new(Element::F32, vec![2, 3], vec![0u8; 6]).is_none());
    }

    #[test]
    fn test_tensor_roundtrip() {
        let t = Tensor::new(Element::I16, vec![2, 2], vec![1, 0, 2, 0, 3, 0, 4, 0]).unwrap();
        let encoded = PayloadCodec::encode(&t).unwrap();
        let decoded: Tensor = PayloadCodec::decode(&encoded).unwrap();
        assert_eq!(decoded, t);
    }

    #[test]
    fn test_tensor_data_uses_binary_format() {
        let t = Tensor::new(Element::U8, vec![4], vec![1, 2, 3, 4]).unwrap();
        let encoded = PayloadCodec::encode(&t).unwrap();

        // serde_bytes must yield msgpack bin (0xc4), not an int array.
        assert!(encoded.contains(&0xc4), "expected bin8 marker in {encoded:?}");
    }
}
