use serde::{Deserialize, Serialize};

use crate::errors::PoolgenError::InvalidGeometry;
use crate::errors::Result;

/// Shapes and window parameters of a 2D pooling, in NHWC order.
///
/// Filter extents already include dilation, i.e. they are the span of the
/// window rather than the kernel size.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PoolingGeometry {
    pub in_shape: Vec<i64>,
    pub out_shape: Vec<i64>,
    pub stride_height: i64,
    pub stride_width: i64,
    pub dilation_height: i64,
    pub dilation_width: i64,
    pub pad_top: i64,
    pub pad_left: i64,
    pub effective_filter_height: i64,
    pub effective_filter_width: i64,
}

impl PoolingGeometry {
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json).map_err(|e| InvalidGeometry(e.to_string()))
    }

    pub fn in_height(&self) -> Result<i64> {
        self.in_dim(1)
    }

    pub fn in_width(&self) -> Result<i64> {
        self.in_dim(2)
    }

    fn in_dim(&self, axis: usize) -> Result<i64> {
        self.in_shape.get(axis).copied().ok_or_else(|| {
            InvalidGeometry(format!("input shape {:?} has no axis {}", self.in_shape, axis))
        })
    }

    pub(crate) fn check_rank(&self) -> Result<()> {
        for (name, shape) in [("input", &self.in_shape), ("output", &self.out_shape)] {
            if shape.len() != 4 {
                return Err(InvalidGeometry(format!(
                    "{} shape {:?} must have rank 4",
                    name, shape
                )));
            }
        }
        Ok(())
    }

    pub(crate) fn check_window(&self) -> Result<()> {
        if self.effective_filter_height <= 0 || self.effective_filter_width <= 0 {
            return Err(InvalidGeometry(format!(
                "empty pooling window {}x{}",
                self.effective_filter_height, self.effective_filter_width
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::PoolingGeometry;
    use crate::errors::PoolgenError;

    #[test]
    fn load_from_json() {
        let geometry = PoolingGeometry::from_json(
            r#"{
                "in_shape": [1, 4, 4, 1],
                "out_shape": [1, 2, 2, 1],
                "stride_height": 2,
                "stride_width": 2,
                "dilation_height": 1,
                "dilation_width": 1,
                "pad_top": 0,
                "pad_left": 0,
                "effective_filter_height": 2,
                "effective_filter_width": 2
            }"#,
        )
        .unwrap();
        assert_eq!(geometry.in_height().unwrap(), 4);
        assert_eq!(geometry.in_width().unwrap(), 4);
        assert_eq!(geometry.out_shape, vec![1, 2, 2, 1]);
        geometry.check_rank().unwrap();
    }

    #[test]
    fn short_input_shape() {
        let geometry = PoolingGeometry::from_json(
            r#"{
                "in_shape": [4],
                "out_shape": [1, 2, 2, 1],
                "stride_height": 2,
                "stride_width": 2,
                "dilation_height": 1,
                "dilation_width": 1,
                "pad_top": 0,
                "pad_left": 0,
                "effective_filter_height": 2,
                "effective_filter_width": 2
            }"#,
        )
        .unwrap();
        assert!(matches!(geometry.in_width(), Err(PoolgenError::InvalidGeometry(_))));
        assert!(matches!(geometry.check_rank(), Err(PoolgenError::InvalidGeometry(_))));
    }

    #[test]
    fn malformed_json() {
        let res = PoolingGeometry::from_json(r#"{"in_shape": [1, 2]}"#);
        assert!(matches!(res, Err(PoolgenError::InvalidGeometry(_))));
    }
}
