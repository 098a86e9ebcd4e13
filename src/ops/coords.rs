use crate::dispatch::DispatchLayout;
use crate::errors::Result;
use crate::ir::{Expr, Function, Stmt, Type};

pub const OUTPUT_COORDS_FN: &str = "getOutputCoords";

/// Row-major strides of `shape` restricted to the dimensions of `group`,
/// spelled as products of `shape` components. The last dimension's stride is
/// 1 and is omitted.
pub fn symbolic_strides(group: &[usize], shape: &Expr) -> Vec<Expr> {
    (0..group.len().saturating_sub(1))
        .map(|j| {
            group[j + 1..]
                .iter()
                .map(|&d| shape.clone().component(d))
                .reduce(|acc, e| acc * e)
                .unwrap_or(Expr::Int(1))
        })
        .collect()
}

/// Builds `getOutputCoords()`, which recovers the logical output coordinate
/// of the running invocation from the invocation id components `ids`.
///
/// A group holding a single dimension takes its id component as is. A group
/// holding several dimensions is a mixed-radix number over the group's sizes:
/// each dimension but the last is the running index divided by its stride,
/// after which `dim * stride` is subtracted; the last dimension is what
/// remains. Coordinates are returned in logical dimension order.
pub fn output_coords_fn(
    layout: &DispatchLayout,
    rank: usize,
    ids: [Expr; 3],
    shape: &Expr,
) -> Result<Function> {
    layout.validate(rank)?;
    let coords_ty = Type::coords(rank)?;

    let mut body = vec![];
    for (axis, (group, id)) in layout.groups().iter().zip(ids).enumerate() {
        match group {
            [] => continue,
            [d] => body.push(Stmt::let_(&dim_name(*d), Type::Int, id)),
            _ => {
                let index = format!("index{}", axis);
                body.push(Stmt::var(&index, Type::Int, id));

                let strides = symbolic_strides(group, shape);
                for (&d, stride) in group.iter().zip(strides) {
                    let dim = dim_name(d);
                    body.push(Stmt::let_(
                        &dim,
                        Type::Int,
                        Expr::Var(index.clone()) / stride.clone(),
                    ));
                    body.push(Stmt::assign(
                        &index,
                        Expr::Var(index.clone()) - Expr::Var(dim) * stride,
                    ));
                }
                let last = group[group.len() - 1];
                body.push(Stmt::let_(&dim_name(last), Type::Int, Expr::Var(index)));
            }
        }
    }

    let ret = match coords_ty {
        Type::Int => Expr::Var(dim_name(0)),
        ty => Expr::Construct(ty, (0..rank).map(|d| Expr::Var(dim_name(d))).collect()),
    };
    body.push(Stmt::Return(Some(ret)));

    Ok(Function {
        name: OUTPUT_COORDS_FN.to_string(),
        params: vec![],
        ret: coords_ty,
        body,
    })
}

fn dim_name(d: usize) -> String {
    format!("d{}", d)
}

/// Invocation id components in dispatch-axis order.
pub fn invocation_ids() -> [Expr; 3] {
    [
        Expr::InvocationId(0),
        Expr::InvocationId(1),
        Expr::InvocationId(2),
    ]
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::eval::{Evaluator, Value};
    use crate::ir::ShaderModule;
    use crate::printer::{Dialect, ShaderPrinter};
    use crate::utils::{flat_index, shape_to_strides};

    fn coords_module(layout: &DispatchLayout, rank: usize) -> ShaderModule {
        let f = output_coords_fn(layout, rank, invocation_ids(), &Expr::uniform("outShape"))
            .unwrap();
        ShaderModule { functions: vec![f] }
    }

    /// Invocation id that should decode to `coords`.
    fn encode(layout: &DispatchLayout, shape: &[i64], coords: &[i64]) -> [i64; 3] {
        let mut ids = [0; 3];
        for (axis, group) in layout.groups().iter().enumerate() {
            let sizes: Vec<i64> = group.iter().map(|&d| shape[d]).collect();
            let sub: Vec<i64> = group.iter().map(|&d| coords[d]).collect();
            ids[axis] = flat_index(&sub, &sizes);
        }
        ids
    }

    fn unflatten(mut flat: i64, shape: &[i64]) -> Vec<i64> {
        shape_to_strides(shape)
            .iter()
            .map(|s| {
                let c = flat / s;
                flat -= c * s;
                c
            })
            .collect()
    }

    fn check_round_trip(layout: &DispatchLayout, shape: &[i64]) {
        let m = coords_module(layout, shape.len());
        let mut ev = Evaluator::new(&m, 0);
        ev.bind_uniform("outShape", Value::IVec(shape.to_vec()));
        let numel: i64 = shape.iter().product();
        for flat in 0..numel {
            let coords = unflatten(flat, shape);
            let ids = encode(layout, shape, &coords);
            let decoded = match ev.invoke(OUTPUT_COORDS_FN, ids).unwrap() {
                Some(Value::IVec(v)) => v,
                Some(Value::Int(v)) => vec![v],
                other => panic!("unexpected {:?}", other),
            };
            assert_eq!(flat_index(&decoded, shape), flat, "{:?} -> {:?}", ids, decoded);
        }
    }

    #[test]
    fn pool2d_round_trip() {
        check_round_trip(&DispatchLayout::pool2d(), &[2, 3, 4, 5]);
        check_round_trip(&DispatchLayout::pool2d(), &[3, 1, 2, 7]);
    }

    #[test]
    fn other_layouts_round_trip() {
        check_round_trip(
            &DispatchLayout::new(vec![3], vec![2], vec![0, 1]),
            &[2, 3, 4, 5],
        );
        check_round_trip(
            &DispatchLayout::new(vec![0, 1, 2], vec![3], vec![]),
            &[2, 3, 4, 5],
        );
        check_round_trip(&DispatchLayout::new(vec![0, 1], vec![], vec![]), &[4, 3]);
        check_round_trip(&DispatchLayout::new(vec![0], vec![], vec![]), &[9]);
    }

    #[test]
    fn emitted_glsl() {
        let m = coords_module(&DispatchLayout::pool2d(), 4);
        let src = Dialect::Glsl.printer().module(&m);
        assert_eq!(
            src,
            "ivec4 getOutputCoords() {
    int d1 = int(gl_GlobalInvocationID.x);
    int d2 = int(gl_GlobalInvocationID.y);
    int index2 = int(gl_GlobalInvocationID.z);
    int d0 = index2 / outShape.w;
    index2 = index2 - d0 * outShape.w;
    int d3 = index2;
    return ivec4(d0, d1, d2, d3);
}
"
        );
    }

    #[test]
    fn three_dim_group_strides() {
        let p = Dialect::Wgsl.printer();
        let strides = symbolic_strides(&[0, 2, 3], &Expr::uniform("outShape"));
        let printed: Vec<String> = strides.iter().map(|s| p.expr(s)).collect();
        assert_eq!(
            printed,
            vec!["uniforms.outShape.z * uniforms.outShape.w", "uniforms.outShape.w"]
        );
    }
}
