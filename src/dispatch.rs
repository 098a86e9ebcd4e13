use serde::{Deserialize, Serialize};

use crate::errors::PoolgenError::InvalidGeometry;
use crate::errors::Result;
use crate::utils::{array_product, ceil_div};

/// Output elements covered by one workgroup along each dispatch axis. Each
/// invocation still computes exactly one output element.
pub const DEFAULT_TILE_SIZE: [u32; 3] = [2, 2, 1];

/// Which logical output dimensions are folded into each of the three dispatch
/// axes. Dimensions inside a group are listed outermost first.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DispatchLayout {
    pub x: Vec<usize>,
    pub y: Vec<usize>,
    pub z: Vec<usize>,
}

impl DispatchLayout {
    pub fn new(x: Vec<usize>, y: Vec<usize>, z: Vec<usize>) -> Self {
        Self { x, y, z }
    }

    /// Rows on x, columns on y, batch and channel folded on z.
    pub fn pool2d() -> Self {
        Self::new(vec![1], vec![2], vec![0, 3])
    }

    pub fn groups(&self) -> [&[usize]; 3] {
        [self.x.as_slice(), self.y.as_slice(), self.z.as_slice()]
    }

    /// Every dimension below `rank` must appear in exactly one group.
    pub fn validate(&self, rank: usize) -> Result<()> {
        let mut seen = vec![false; rank];
        for (axis, group) in self.groups().iter().enumerate() {
            for &d in group.iter() {
                if d >= rank {
                    return Err(InvalidGeometry(format!(
                        "dispatch axis {} references dimension {} of a rank {} output",
                        axis, d, rank
                    )));
                }
                if seen[d] {
                    return Err(InvalidGeometry(format!(
                        "dimension {} is dispatched more than once",
                        d
                    )));
                }
                seen[d] = true;
            }
        }
        if let Some(missing) = seen.iter().position(|s| !s) {
            return Err(InvalidGeometry(format!(
                "dimension {} is not covered by any dispatch axis",
                missing
            )));
        }
        Ok(())
    }
}

impl Default for DispatchLayout {
    fn default() -> Self {
        Self::pool2d()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DispatchPlan {
    pub layout: DispatchLayout,
    pub tile_size: [u32; 3],
    pub dispatch: [u32; 3],
}

impl DispatchPlan {
    pub fn new(layout: DispatchLayout, tile_size: [u32; 3], out_shape: &[i64]) -> Result<Self> {
        let dispatch = compute_dispatch(&layout, out_shape, tile_size)?;
        log::trace!(
            "dispatch plan for {:?}: layout {:?}, tile {:?}, dispatch {:?}",
            out_shape,
            layout,
            tile_size,
            dispatch
        );
        Ok(Self {
            layout,
            tile_size,
            dispatch,
        })
    }

    pub fn num_invocations(&self) -> u64 {
        self.dispatch
            .iter()
            .zip(self.tile_size.iter())
            .map(|(d, t)| *d as u64 * *t as u64)
            .product()
    }
}

/// Number of workgroups per axis: the product of the output sizes grouped on
/// that axis, divided by the tile size and rounded up.
pub fn compute_dispatch(
    layout: &DispatchLayout,
    out_shape: &[i64],
    tile_size: [u32; 3],
) -> Result<[u32; 3]> {
    layout.validate(out_shape.len())?;

    let mut dispatch = [0u32; 3];
    for (axis, group) in layout.groups().iter().enumerate() {
        let dims: Vec<i64> = group.iter().map(|&d| out_shape[d]).collect();
        let n = array_product(&dims).map_err(|_| {
            InvalidGeometry(format!("dispatch axis {} has no dimensions", axis))
        })?;
        if n <= 0 {
            return Err(InvalidGeometry(format!(
                "dispatch axis {} covers zero output elements ({:?})",
                axis, dims
            )));
        }
        if tile_size[axis] == 0 {
            return Err(InvalidGeometry(format!("tile size of axis {} is zero", axis)));
        }
        dispatch[axis] = u32::try_from(ceil_div(n, tile_size[axis] as i64)).map_err(|_| {
            InvalidGeometry(format!(
                "dispatch axis {} needs more than {} workgroups ({:?})",
                axis,
                u32::MAX,
                dims
            ))
        })?;
    }
    Ok(dispatch)
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::errors::PoolgenError;

    #[test]
    fn pool2d_dispatch() {
        let dispatch =
            compute_dispatch(&DispatchLayout::pool2d(), &[2, 5, 3, 7], DEFAULT_TILE_SIZE).unwrap();
        assert_eq!(dispatch, [3, 2, 14]);
    }

    #[test]
    fn covers_every_output() {
        let shapes: [[i64; 4]; 5] = [
            [1, 1, 1, 1],
            [1, 2, 2, 1],
            [3, 7, 5, 2],
            [2, 16, 9, 3],
            [4, 1, 13, 8],
        ];
        let tile: u64 = DEFAULT_TILE_SIZE.iter().map(|t| *t as u64).product();
        for shape in shapes {
            let d = compute_dispatch(&DispatchLayout::pool2d(), &shape, DEFAULT_TILE_SIZE).unwrap();
            let covered: u64 = d.iter().map(|v| *v as u64).product::<u64>() * tile;
            let numel: i64 = shape.iter().product();
            assert!(covered >= numel as u64, "{:?} -> {:?}", shape, d);
        }
    }

    #[test]
    fn empty_group_is_rejected() {
        let layout = DispatchLayout::new(vec![1, 2], vec![], vec![0, 3]);
        let res = compute_dispatch(&layout, &[1, 2, 2, 1], DEFAULT_TILE_SIZE);
        assert!(matches!(res, Err(PoolgenError::InvalidGeometry(_))));
    }

    #[test]
    fn zero_extent_is_rejected() {
        let res = compute_dispatch(&DispatchLayout::pool2d(), &[0, 2, 2, 1], DEFAULT_TILE_SIZE);
        assert!(matches!(res, Err(PoolgenError::InvalidGeometry(_))));
    }

    #[test]
    fn oversized_axis_is_rejected() {
        let res = compute_dispatch(&DispatchLayout::pool2d(), &[1, 1 << 33, 1, 1], DEFAULT_TILE_SIZE);
        assert!(matches!(res, Err(PoolgenError::InvalidGeometry(_))));
        // largest extent that still fits
        let n = 2 * u32::MAX as i64;
        let d = compute_dispatch(&DispatchLayout::pool2d(), &[1, n, 1, 1], DEFAULT_TILE_SIZE).unwrap();
        assert_eq!(d, [u32::MAX, 1, 1]);
    }

    #[test]
    fn layout_must_partition_dimensions() {
        assert!(DispatchLayout::pool2d().validate(4).is_ok());
        assert!(DispatchLayout::new(vec![1], vec![2], vec![0]).validate(4).is_err());
        assert!(DispatchLayout::new(vec![1], vec![1], vec![0, 3]).validate(4).is_err());
        assert!(DispatchLayout::new(vec![1], vec![2], vec![0, 4]).validate(4).is_err());
    }

    #[test]
    fn plan_counts_invocations() {
        let plan =
            DispatchPlan::new(DispatchLayout::pool2d(), DEFAULT_TILE_SIZE, &[1, 3, 3, 2]).unwrap();
        assert_eq!(plan.dispatch, [2, 2, 2]);
        assert_eq!(plan.num_invocations(), 32);
    }
}
