//! CPU reference evaluator for [`ShaderModule`]s.
//!
//! Runs every invocation of a dispatch grid sequentially, with the same
//! builtins the module prelude provides on the GPU (`getFlatIndex`,
//! `setOutput`, `max`). Writes and calls are counted so tests can check that a
//! dispatch covers each output element exactly once.

use std::collections::HashMap;

use crate::errors::PoolgenError::Evaluation;
use crate::errors::Result;
use crate::ir::{BinOp, Expr, ShaderModule, Stmt, Type, FLAT_INDEX_FN, MAX_FN, SET_OUTPUT_FN};
use crate::utils::flat_index;

#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Int(i64),
    Float(f32),
    Bool(bool),
    IVec(Vec<i64>),
}

impl Value {
    fn as_int(&self) -> Result<i64> {
        match self {
            Value::Int(v) => Ok(*v),
            other => Err(Evaluation(format!("expected int, found {:?}", other))),
        }
    }

    fn as_float(&self) -> Result<f32> {
        match self {
            Value::Float(v) => Ok(*v),
            other => Err(Evaluation(format!("expected float, found {:?}", other))),
        }
    }

    fn as_bool(&self) -> Result<bool> {
        match self {
            Value::Bool(v) => Ok(*v),
            other => Err(Evaluation(format!("expected bool, found {:?}", other))),
        }
    }

    fn as_ivec(&self) -> Result<&[i64]> {
        match self {
            Value::IVec(v) => Ok(v.as_slice()),
            other => Err(Evaluation(format!("expected ivec, found {:?}", other))),
        }
    }
}

enum Flow {
    Normal,
    Continue,
    Return(Option<Value>),
}

/// Local variables of one function call, innermost block last.
struct Frame {
    scopes: Vec<HashMap<String, Value>>,
}

impl Frame {
    fn new() -> Self {
        Self {
            scopes: vec![HashMap::new()],
        }
    }

    fn declare(&mut self, name: &str, value: Value) {
        if let Some(scope) = self.scopes.last_mut() {
            scope.insert(name.to_string(), value);
        }
    }

    fn lookup(&self, name: &str) -> Option<&Value> {
        self.scopes.iter().rev().find_map(|s| s.get(name))
    }

    fn assign(&mut self, name: &str, value: Value) -> Result<()> {
        match self.scopes.iter_mut().rev().find_map(|s| s.get_mut(name)) {
            Some(slot) => {
                *slot = value;
                Ok(())
            }
            None => Err(Evaluation(format!("assignment to undeclared `{}`", name))),
        }
    }
}

pub struct Evaluator<'a> {
    module: &'a ShaderModule,
    buffers: HashMap<String, &'a [f32]>,
    uniforms: HashMap<String, Value>,
    output: Vec<f32>,
    writes: Vec<u32>,
    calls: HashMap<String, usize>,
    invocation: [i64; 3],
}

impl<'a> Evaluator<'a> {
    pub fn new(module: &'a ShaderModule, output_len: usize) -> Self {
        Self {
            module,
            buffers: HashMap::new(),
            uniforms: HashMap::new(),
            output: vec![0.0; output_len],
            writes: vec![0; output_len],
            calls: HashMap::new(),
            invocation: [0; 3],
        }
    }

    pub fn bind_buffer(&mut self, name: &str, data: &'a [f32]) -> &mut Self {
        self.buffers.insert(name.to_string(), data);
        self
    }

    pub fn bind_uniform(&mut self, name: &str, value: Value) -> &mut Self {
        self.uniforms.insert(name.to_string(), value);
        self
    }

    /// Calls `entry` once per invocation of `dispatch` workgroups of
    /// `workgroup_size` invocations each.
    pub fn run(&mut self, entry: &str, dispatch: [u32; 3], workgroup_size: [u32; 3]) -> Result<()> {
        let extent: Vec<i64> = dispatch
            .iter()
            .zip(workgroup_size.iter())
            .map(|(d, w)| *d as i64 * *w as i64)
            .collect();
        for z in 0..extent[2] {
            for y in 0..extent[1] {
                for x in 0..extent[0] {
                    self.invoke(entry, [x, y, z])?;
                }
            }
        }
        Ok(())
    }

    /// Runs a single invocation of an argument-less function.
    pub fn invoke(&mut self, entry: &str, invocation: [i64; 3]) -> Result<Option<Value>> {
        self.invocation = invocation;
        self.call(entry, vec![])
    }

    pub fn output(&self) -> &[f32] {
        &self.output
    }

    pub fn into_output(self) -> Vec<f32> {
        self.output
    }

    /// Number of `setOutput` calls per output element.
    pub fn writes(&self) -> &[u32] {
        &self.writes
    }

    pub fn call_count(&self, name: &str) -> usize {
        self.calls.get(name).copied().unwrap_or(0)
    }

    fn call(&mut self, name: &str, args: Vec<Value>) -> Result<Option<Value>> {
        *self.calls.entry(name.to_string()).or_insert(0) += 1;
        match name {
            MAX_FN => self.builtin_max(&args).map(Some),
            FLAT_INDEX_FN => {
                let (coords, shape) = match args.as_slice() {
                    [Value::Int(c), Value::Int(_)] => (vec![*c], vec![1]),
                    [c, s] => (c.as_ivec()?.to_vec(), s.as_ivec()?.to_vec()),
                    _ => return Err(Evaluation(format!("{} takes 2 arguments", name))),
                };
                Ok(Some(Value::Int(flat_index(&coords, &shape))))
            }
            SET_OUTPUT_FN => {
                let [index, value] = args.as_slice() else {
                    return Err(Evaluation(format!("{} takes 2 arguments", name)));
                };
                let (index, value) = (index.as_int()?, value.as_float()?);
                if index < 0 || index as usize >= self.output.len() {
                    return Err(Evaluation(format!(
                        "write to index {} of an output of length {} (invocation {:?})",
                        index,
                        self.output.len(),
                        self.invocation
                    )));
                }
                self.output[index as usize] = value;
                self.writes[index as usize] += 1;
                Ok(None)
            }
            _ => self.call_user(name, args),
        }
    }

    fn builtin_max(&self, args: &[Value]) -> Result<Value> {
        match args {
            [Value::Float(a), Value::Float(b)] => Ok(Value::Float(if a > b { *a } else { *b })),
            [Value::Int(a), Value::Int(b)] => Ok(Value::Int(*a.max(b))),
            _ => Err(Evaluation(format!("max of {:?}", args))),
        }
    }

    fn call_user(&mut self, name: &str, args: Vec<Value>) -> Result<Option<Value>> {
        let module = self.module;
        let f = module
            .function(name)
            .ok_or_else(|| Evaluation(format!("unknown function `{}`", name)))?;
        if f.params.len() != args.len() {
            return Err(Evaluation(format!(
                "`{}` takes {} arguments, {} given",
                name,
                f.params.len(),
                args.len()
            )));
        }
        let mut frame = Frame::new();
        for (param, arg) in f.params.iter().zip(args) {
            frame.declare(&param.name, arg);
        }
        match self.exec_block(&f.body, &mut frame)? {
            Flow::Return(value) => Ok(value),
            Flow::Normal if f.ret == Type::Void => Ok(None),
            Flow::Normal => Err(Evaluation(format!("`{}` ended without a return", name))),
            Flow::Continue => Err(Evaluation(format!("`continue` outside a loop in `{}`", name))),
        }
    }

    fn exec_block(&mut self, body: &[Stmt], frame: &mut Frame) -> Result<Flow> {
        frame.scopes.push(HashMap::new());
        let mut flow = Flow::Normal;
        for stmt in body {
            flow = self.exec(stmt, frame)?;
            if !matches!(flow, Flow::Normal) {
                break;
            }
        }
        frame.scopes.pop();
        Ok(flow)
    }

    fn exec(&mut self, stmt: &Stmt, frame: &mut Frame) -> Result<Flow> {
        match stmt {
            Stmt::Let { name, value, .. } | Stmt::Var { name, value, .. } => {
                let v = self.eval(value, frame)?;
                frame.declare(name, v);
            }
            Stmt::Assign { name, value } => {
                let v = self.eval(value, frame)?;
                frame.assign(name, v)?;
            }
            Stmt::If { cond, body } => {
                if self.eval(cond, frame)?.as_bool()? {
                    return self.exec_block(body, frame);
                }
            }
            Stmt::For {
                var,
                start,
                end,
                step,
                body,
            } => {
                let start = self.eval(start, frame)?;
                frame.scopes.push(HashMap::new());
                frame.declare(var, start);
                let flow = self.exec_loop(var, end, step, body, frame);
                frame.scopes.pop();
                return flow;
            }
            Stmt::Continue => return Ok(Flow::Continue),
            Stmt::Return(value) => {
                let v = match value {
                    Some(e) => Some(self.eval(e, frame)?),
                    None => None,
                };
                return Ok(Flow::Return(v));
            }
            Stmt::Expr(e) => {
                self.eval_call_or_expr(e, frame)?;
            }
        }
        Ok(Flow::Normal)
    }

    fn exec_loop(
        &mut self,
        var: &str,
        end: &Expr,
        step: &Expr,
        body: &[Stmt],
        frame: &mut Frame,
    ) -> Result<Flow> {
        loop {
            let i = frame
                .lookup(var)
                .ok_or_else(|| Evaluation(format!("loop variable `{}` vanished", var)))?
                .as_int()?;
            if i >= self.eval(end, frame)?.as_int()? {
                return Ok(Flow::Normal);
            }
            if let Flow::Return(v) = self.exec_block(body, frame)? {
                return Ok(Flow::Return(v));
            }
            let step = self.eval(step, frame)?.as_int()?;
            if step <= 0 {
                return Err(Evaluation(format!("loop over `{}` has step {}", var, step)));
            }
            frame.assign(var, Value::Int(i + step))?;
        }
    }

    /// Statement-level calls may return nothing.
    fn eval_call_or_expr(&mut self, e: &Expr, frame: &mut Frame) -> Result<Option<Value>> {
        match e {
            Expr::Call(name, args) => {
                let args = self.eval_args(args, frame)?;
                self.call(name, args)
            }
            _ => self.eval(e, frame).map(Some),
        }
    }

    fn eval_args(&mut self, args: &[Expr], frame: &mut Frame) -> Result<Vec<Value>> {
        args.iter().map(|a| self.eval(a, frame)).collect()
    }

    fn eval(&mut self, e: &Expr, frame: &mut Frame) -> Result<Value> {
        match e {
            Expr::Int(v) => Ok(Value::Int(*v)),
            Expr::Float(v) => Ok(Value::Float(*v)),
            Expr::Var(name) => frame
                .lookup(name)
                .cloned()
                .ok_or_else(|| Evaluation(format!("undeclared variable `{}`", name))),
            Expr::Uniform(name) => self
                .uniforms
                .get(name)
                .cloned()
                .ok_or_else(|| Evaluation(format!("unbound uniform `{}`", name))),
            Expr::InvocationId(axis) => self
                .invocation
                .get(*axis)
                .map(|v| Value::Int(*v))
                .ok_or_else(|| Evaluation(format!("invocation id axis {}", axis))),
            Expr::Component(base, i) => {
                let base = self.eval(base, frame)?;
                let v = base.as_ivec()?;
                v.get(*i)
                    .map(|c| Value::Int(*c))
                    .ok_or_else(|| Evaluation(format!("component {} of {:?}", i, v)))
            }
            Expr::Binary(op, lhs, rhs) => self.eval_binary(*op, lhs, rhs, frame),
            Expr::Call(name, args) => {
                let args = self.eval_args(args, frame)?;
                self.call(name, args)?
                    .ok_or_else(|| Evaluation(format!("`{}` returns no value", name)))
            }
            Expr::Construct(ty, args) => {
                let args = self.eval_args(args, frame)?;
                match (ty, args.as_slice()) {
                    (Type::IVec(n), _) if args.len() == *n as usize => Ok(Value::IVec(
                        args.iter().map(|a| a.as_int()).collect::<Result<Vec<_>>>()?,
                    )),
                    (Type::Int, [Value::Float(v)]) => Ok(Value::Int(*v as i64)),
                    (Type::Int, [Value::Int(v)]) => Ok(Value::Int(*v)),
                    (Type::Float, [Value::Int(v)]) => Ok(Value::Float(*v as f32)),
                    (Type::Float, [Value::Float(v)]) => Ok(Value::Float(*v)),
                    _ => Err(Evaluation(format!("cannot construct {:?} from {:?}", ty, args))),
                }
            }
            Expr::Load(buffer, index) => {
                let index = self.eval(index, frame)?.as_int()?;
                let data = self
                    .buffers
                    .get(buffer)
                    .ok_or_else(|| Evaluation(format!("unbound buffer `{}`", buffer)))?;
                if index < 0 || index as usize >= data.len() {
                    return Err(Evaluation(format!(
                        "read of {}[{}] past length {} (invocation {:?})",
                        buffer,
                        index,
                        data.len(),
                        self.invocation
                    )));
                }
                Ok(Value::Float(data[index as usize]))
            }
        }
    }

    fn eval_binary(&mut self, op: BinOp, lhs: &Expr, rhs: &Expr, frame: &mut Frame) -> Result<Value> {
        let l = self.eval(lhs, frame)?;
        match op {
            BinOp::And if !l.as_bool()? => return Ok(Value::Bool(false)),
            BinOp::Or if l.as_bool()? => return Ok(Value::Bool(true)),
            BinOp::And | BinOp::Or => return Ok(Value::Bool(self.eval(rhs, frame)?.as_bool()?)),
            _ => {}
        }
        let r = self.eval(rhs, frame)?;
        match (l, r) {
            (Value::Int(a), Value::Int(b)) => match op {
                BinOp::Add => Ok(Value::Int(a + b)),
                BinOp::Sub => Ok(Value::Int(a - b)),
                BinOp::Mul => Ok(Value::Int(a * b)),
                BinOp::Div if b == 0 => Err(Evaluation("integer division by zero".into())),
                BinOp::Div => Ok(Value::Int(a / b)),
                BinOp::Lt => Ok(Value::Bool(a < b)),
                BinOp::Ge => Ok(Value::Bool(a >= b)),
                BinOp::And | BinOp::Or => unreachable!(),
            },
            (Value::Float(a), Value::Float(b)) => match op {
                BinOp::Add => Ok(Value::Float(a + b)),
                BinOp::Sub => Ok(Value::Float(a - b)),
                BinOp::Mul => Ok(Value::Float(a * b)),
                BinOp::Div => Ok(Value::Float(a / b)),
                BinOp::Lt => Ok(Value::Bool(a < b)),
                BinOp::Ge => Ok(Value::Bool(a >= b)),
                BinOp::And | BinOp::Or => unreachable!(),
            },
            (l, r) => Err(Evaluation(format!(
                "operands {:?} {} {:?}",
                l,
                op.symbol(),
                r
            ))),
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::ir::{Function, Param};

    fn module() -> ShaderModule {
        // Writes the sum of x[i] for i in 0..n step 2 to output[id.x].
        ShaderModule {
            functions: vec![
                Function {
                    name: "sumEven".into(),
                    params: vec![Param::new("n", Type::Int)],
                    ret: Type::Float,
                    body: vec![
                        Stmt::var("acc", Type::Float, Expr::Float(0.0)),
                        Stmt::For {
                            var: "i".into(),
                            start: Expr::Int(0),
                            end: Expr::var("n"),
                            step: Expr::Int(2),
                            body: vec![Stmt::assign(
                                "acc",
                                Expr::var("acc") + Expr::load("x", Expr::var("i")),
                            )],
                        },
                        Stmt::Return(Some(Expr::var("acc"))),
                    ],
                },
                Function {
                    name: "main".into(),
                    params: vec![],
                    ret: Type::Void,
                    body: vec![
                        Stmt::If {
                            cond: Expr::InvocationId(0).ge(Expr::Int(2)),
                            body: vec![Stmt::Return(None)],
                        },
                        Stmt::Expr(Expr::call(
                            SET_OUTPUT_FN,
                            vec![
                                Expr::InvocationId(0),
                                Expr::call("sumEven", vec![Expr::Int(5)]),
                            ],
                        )),
                    ],
                },
            ],
        }
    }

    #[test]
    fn runs_grid() {
        let m = module();
        let x = [1.0, 10.0, 2.0, 20.0, 3.0];
        let mut ev = Evaluator::new(&m, 2);
        ev.bind_buffer("x", &x);
        ev.run("main", [2, 1, 1], [2, 1, 1]).unwrap();
        assert_eq!(ev.output(), &[6.0, 6.0]);
        assert_eq!(ev.writes(), &[1, 1]);
        assert_eq!(ev.call_count("main"), 4);
        assert_eq!(ev.call_count("sumEven"), 2);
    }

    #[test]
    fn out_of_range_read_is_reported() {
        let m = module();
        let x = [1.0, 2.0];
        let mut ev = Evaluator::new(&m, 2);
        ev.bind_buffer("x", &x);
        let res = ev.invoke("main", [0, 0, 0]);
        assert!(matches!(res, Err(Evaluation(_))));
    }

    #[test]
    fn flat_index_builtin() {
        let m = ShaderModule::default();
        let mut ev = Evaluator::new(&m, 0);
        let idx = ev
            .call(
                FLAT_INDEX_FN,
                vec![Value::IVec(vec![1, 1, 2, 0]), Value::IVec(vec![2, 3, 4, 1])],
            )
            .unwrap();
        assert_eq!(idx, Some(Value::Int(12 + 4 + 2)));
    }
}
