//! Tree-walking evaluator.
//!
//! An interpreter is bound to one [`Namespace`]. Module-level assignments go
//! to that namespace, or to a private stage when the interpreter was created
//! with [`Interpreter::staged`], so a program that fails half-way leaves the
//! namespace untouched. Function calls push a frame of locals; names resolve
//! through the current frame, then the stage, then the namespace, then the
//! builtins.

use super::builtins;
use super::error::{ScriptError, ScriptResult};
use super::methods;
use super::namespace::Namespace;
use super::native::{Args, CallContext};
use super::values::{Closure, Dict, Value, MAX_SEQUENCE_LEN};
use crate::ast::{
    BinaryOp, BoolOp, CompareOp, Expr, FunctionDef, Literal, Program, Stmt, StmtKind, Target,
    UnaryOp,
};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

pub const DEFAULT_MAX_CALL_DEPTH: usize = 64;

/// Bounds on a single execution.
#[derive(Debug, Clone)]
pub struct ExecutionLimits {
    pub max_call_depth: usize,
    pub deadline: Option<Instant>,
    pub cancel: Option<Arc<AtomicBool>>,
}

impl Default for ExecutionLimits {
    fn default() -> Self {
        ExecutionLimits {
            max_call_depth: DEFAULT_MAX_CALL_DEPTH,
            deadline: None,
            cancel: None,
        }
    }
}

impl ExecutionLimits {
    pub fn with_max_call_depth(mut self, depth: usize) -> Self {
        self.max_call_depth = depth;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.deadline = Some(Instant::now() + timeout);
        self
    }

    pub fn with_cancel_flag(mut self, flag: Arc<AtomicBool>) -> Self {
        self.cancel = Some(flag);
        self
    }
}

enum Flow {
    Normal,
    Break,
    Continue,
    Return(Value),
}

struct Frame {
    locals: HashMap<String, Value>,
}

pub struct Interpreter {
    namespace: Arc<Namespace>,
    stage: Option<HashMap<String, Value>>,
    frames: Vec<Frame>,
    limits: ExecutionLimits,
    output: Vec<String>,
}

impl Interpreter {
    pub fn new(namespace: Arc<Namespace>, limits: ExecutionLimits) -> Self {
        Interpreter {
            namespace,
            stage: None,
            frames: Vec::new(),
            limits,
            output: Vec::new(),
        }
    }

    /// An interpreter whose module-level writes are buffered until
    /// [`Interpreter::take_stage`].
    pub fn staged(namespace: Arc<Namespace>, limits: ExecutionLimits) -> Self {
        let mut interpreter = Self::new(namespace, limits);
        interpreter.stage = Some(HashMap::new());
        interpreter
    }

    pub fn namespace(&self) -> &Arc<Namespace> {
        &self.namespace
    }

    /// Execute a whole program at module level.
    pub fn exec_module(&mut self, program: &Program) -> ScriptResult<()> {
        match self.exec_block(&program.body)? {
            Flow::Normal => Ok(()),
            Flow::Break => Err(ScriptError::MisplacedControlFlow("break", "loop")),
            Flow::Continue => Err(ScriptError::MisplacedControlFlow("continue", "loop")),
            Flow::Return(_) => Err(ScriptError::MisplacedControlFlow("return", "function")),
        }
    }

    /// Buffered module-level bindings, leaving the stage empty.
    pub fn take_stage(&mut self) -> HashMap<String, Value> {
        self.stage.as_mut().map(std::mem::take).unwrap_or_default()
    }

    /// Lines printed so far.
    pub fn take_output(&mut self) -> Vec<String> {
        std::mem::take(&mut self.output)
    }

    /// Module-level lookup, as seen by code running in this interpreter.
    pub fn global(&self, name: &str) -> Option<Value> {
        if let Some(value) = self.stage.as_ref().and_then(|stage| stage.get(name)) {
            return Some(value.clone());
        }
        self.namespace.get(name)
    }

    /// Call any callable value.
    pub fn call_function(
        &mut self,
        callee: &Value,
        args: Vec<Value>,
        kwargs: Vec<(String, Value)>,
    ) -> ScriptResult<Value> {
        match callee {
            Value::Function(closure) => self.call_closure(closure, args, kwargs),
            Value::Builtin(builtin) => (builtin.func)(
                self,
                Args {
                    positional: args,
                    keyword: kwargs,
                },
            ),
            other => Err(ScriptError::type_error(format!(
                "'{}' object is not callable",
                other.type_name()
            ))),
        }
    }

    fn check_limits(&self) -> ScriptResult<()> {
        if let Some(flag) = &self.limits.cancel {
            if flag.load(Ordering::Relaxed) {
                return Err(ScriptError::Cancelled);
            }
        }
        if let Some(deadline) = self.limits.deadline {
            if Instant::now() >= deadline {
                return Err(ScriptError::DeadlineExceeded);
            }
        }
        Ok(())
    }

    fn lookup(&self, name: &str) -> Option<Value> {
        if let Some(frame) = self.frames.last() {
            if let Some(value) = frame.locals.get(name) {
                return Some(value.clone());
            }
        }
        self.global(name).or_else(|| builtins::lookup(name))
    }

    fn bind(&mut self, name: &str, value: Value) {
        if let Some(frame) = self.frames.last_mut() {
            frame.locals.insert(name.to_string(), value);
        } else if let Some(stage) = self.stage.as_mut() {
            stage.insert(name.to_string(), value);
        } else {
            self.namespace.define(name, value);
        }
    }

    fn exec_block(&mut self, body: &[Stmt]) -> ScriptResult<Flow> {
        for stmt in body {
            self.check_limits()?;
            let flow = self
                .exec_stmt(stmt)
                .map_err(|err| err.at_line(stmt.line))?;
            if !matches!(flow, Flow::Normal) {
                return Ok(flow);
            }
        }
        Ok(Flow::Normal)
    }

    fn exec_stmt(&mut self, stmt: &Stmt) -> ScriptResult<Flow> {
        match &stmt.kind {
            StmtKind::Import { module, alias } => {
                let handle = self
                    .namespace
                    .resolve_module(module)
                    .ok_or_else(|| ScriptError::ImportError(format!("no module named '{}'", module)))?;
                let bound = alias
                    .clone()
                    .unwrap_or_else(|| module.split('.').next().unwrap_or(module).to_string());
                self.bind(&bound, Value::Module(handle));
            }
            StmtKind::FromImport {
                module,
                names,
                wildcard,
            } => {
                let handle = self
                    .namespace
                    .resolve_module(module)
                    .ok_or_else(|| ScriptError::ImportError(format!("no module named '{}'", module)))?;
                if *wildcard {
                    for (name, value) in &handle.members {
                        self.bind(name, value.clone());
                    }
                }
                for item in names {
                    let value = handle.get(&item.name).cloned().ok_or_else(|| {
                        ScriptError::ImportError(format!(
                            "cannot import name '{}' from '{}'",
                            item.name, module
                        ))
                    })?;
                    self.bind(item.local_name(), value);
                }
            }
            StmtKind::Def(def) => {
                let closure = self.make_closure(def)?;
                self.bind(&def.name, Value::Function(Arc::new(closure)));
            }
            StmtKind::Return(value) => {
                if self.frames.is_empty() {
                    return Err(ScriptError::MisplacedControlFlow("return", "function"));
                }
                let value = match value {
                    Some(expr) => self.eval(expr)?,
                    None => Value::None,
                };
                return Ok(Flow::Return(value));
            }
            StmtKind::If { branches, orelse } => {
                for (condition, body) in branches {
                    if self.eval(condition)?.is_truthy() {
                        return self.exec_block(body);
                    }
                }
                return self.exec_block(orelse);
            }
            StmtKind::For {
                targets,
                iter,
                body,
            } => {
                let items = self.eval(iter)?.iterate()?;
                for item in items {
                    self.check_limits()?;
                    self.bind_loop_targets(targets, item)?;
                    match self.exec_block(body)? {
                        Flow::Break => break,
                        Flow::Continue | Flow::Normal => {}
                        flow @ Flow::Return(_) => return Ok(flow),
                    }
                }
            }
            StmtKind::While { condition, body } => loop {
                self.check_limits()?;
                if !self.eval(condition)?.is_truthy() {
                    break;
                }
                match self.exec_block(body)? {
                    Flow::Break => break,
                    Flow::Continue | Flow::Normal => {}
                    flow @ Flow::Return(_) => return Ok(flow),
                }
            },
            StmtKind::Break => return Ok(Flow::Break),
            StmtKind::Continue => return Ok(Flow::Continue),
            StmtKind::Pass => {}
            StmtKind::Assign { target, value } => {
                let value = self.eval(value)?;
                self.assign(target, value)?;
            }
            StmtKind::AugAssign { target, op, value } => {
                let current = self.read_target(target)?;
                let rhs = self.eval(value)?;
                let updated = binary_op(*op, &current, &rhs)?;
                self.assign(target, updated)?;
            }
            StmtKind::Expr(expr) => {
                self.eval(expr)?;
            }
        }
        Ok(Flow::Normal)
    }

    fn make_closure(&mut self, def: &Arc<FunctionDef>) -> ScriptResult<Closure> {
        let mut defaults = Vec::with_capacity(def.params.len());
        for param in &def.params {
            defaults.push(match &param.default {
                Some(expr) => Some(self.eval(expr)?),
                None => None,
            });
        }
        let mut closure = Closure::new(def.clone(), defaults, &self.namespace);
        if let Some(frame) = self.frames.last() {
            closure.captured = frame.locals.clone();
            closure.nested = true;
        }
        Ok(closure)
    }

    fn bind_loop_targets(&mut self, targets: &[String], item: Value) -> ScriptResult<()> {
        if let [single] = targets {
            self.bind(single, item);
            return Ok(());
        }
        let parts = match item {
            Value::List(parts) => parts,
            other => {
                return Err(ScriptError::type_error(format!(
                    "cannot unpack non-sequence {}",
                    other.type_name()
                )))
            }
        };
        if parts.len() != targets.len() {
            return Err(ScriptError::value_error(format!(
                "expected {} values to unpack, got {}",
                targets.len(),
                parts.len()
            )));
        }
        for (name, value) in targets.iter().zip(parts) {
            self.bind(name, value);
        }
        Ok(())
    }

    fn read_target(&mut self, target: &Target) -> ScriptResult<Value> {
        let mut current = self
            .lookup(&target.name)
            .ok_or_else(|| ScriptError::NameError(target.name.clone()))?;
        for index in &target.indices {
            let key = self.eval(index)?;
            current = index_value(&current, &key)?;
        }
        Ok(current)
    }

    fn assign(&mut self, target: &Target, value: Value) -> ScriptResult<()> {
        if target.indices.is_empty() {
            self.bind(&target.name, value);
            return Ok(());
        }
        let mut keys = Vec::with_capacity(target.indices.len());
        for index in &target.indices {
            keys.push(self.eval(index)?);
        }
        let mut container = self
            .lookup(&target.name)
            .ok_or_else(|| ScriptError::NameError(target.name.clone()))?;
        store_path(&mut container, &keys, value)?;
        self.bind(&target.name, container);
        Ok(())
    }

    fn call_closure(
        &mut self,
        closure: &Arc<Closure>,
        args: Vec<Value>,
        kwargs: Vec<(String, Value)>,
    ) -> ScriptResult<Value> {
        let belongs_here = closure
            .globals
            .upgrade()
            .map(|ns| Arc::ptr_eq(&ns, &self.namespace))
            .unwrap_or(false);
        if !belongs_here {
            return Err(ScriptError::host(format!(
                "function '{}' belongs to a different namespace",
                closure.name()
            )));
        }
        if self.frames.len() >= self.limits.max_call_depth {
            return Err(ScriptError::CallDepthExceeded(self.limits.max_call_depth));
        }

        let locals = bind_parameters(closure, args, kwargs)?;
        self.frames.push(Frame { locals });
        let result = self.exec_block(&closure.def.body);
        self.frames.pop();

        match result? {
            Flow::Return(value) => Ok(value),
            Flow::Normal => Ok(Value::None),
            Flow::Break => Err(ScriptError::MisplacedControlFlow("break", "loop")),
            Flow::Continue => Err(ScriptError::MisplacedControlFlow("continue", "loop")),
        }
    }

    fn eval(&mut self, expr: &Expr) -> ScriptResult<Value> {
        match expr {
            Expr::Literal(literal) => Ok(match literal {
                Literal::None => Value::None,
                Literal::Bool(b) => Value::Bool(*b),
                Literal::Int(i) => Value::Int(*i),
                Literal::Float(f) => Value::Float(*f),
                Literal::Str(s) => Value::Str(s.clone()),
            }),
            Expr::Name(name) => self
                .lookup(name)
                .ok_or_else(|| ScriptError::NameError(name.clone())),
            Expr::List(items) => {
                let mut out = Vec::with_capacity(items.len());
                for item in items {
                    out.push(self.eval(item)?);
                }
                Ok(Value::List(out))
            }
            Expr::Dict(entries) => {
                let mut out = Dict::with_capacity(entries.len());
                for (key, value) in entries {
                    let key = match self.eval(key)? {
                        Value::Str(k) => k,
                        other => {
                            return Err(ScriptError::type_error(format!(
                                "dict keys must be str, not {}",
                                other.type_name()
                            )))
                        }
                    };
                    let value = self.eval(value)?;
                    out.insert(key, value);
                }
                Ok(Value::Dict(out))
            }
            Expr::Attribute { value, attr } => match self.eval(value)? {
                Value::Module(module) => module.get(attr).cloned().ok_or_else(|| {
                    ScriptError::AttributeError(format!(
                        "module '{}' has no attribute '{}'",
                        module.name, attr
                    ))
                }),
                other => Err(ScriptError::AttributeError(format!(
                    "'{}' object has no attribute '{}'",
                    other.type_name(),
                    attr
                ))),
            },
            Expr::Index { value, index } => {
                let container = self.eval(value)?;
                let key = self.eval(index)?;
                index_value(&container, &key)
            }
            Expr::Call {
                func, args, kwargs, ..
            } => self.eval_call(func, args, kwargs),
            Expr::Unary { op, operand } => {
                let value = self.eval(operand)?;
                match op {
                    UnaryOp::Not => Ok(Value::Bool(!value.is_truthy())),
                    UnaryOp::Neg => match value {
                        Value::Float(f) => Ok(Value::Float(-f)),
                        other => match other.as_int() {
                            Some(i) => i.checked_neg().map(Value::Int).ok_or(ScriptError::Overflow),
                            None => Err(ScriptError::type_error(format!(
                                "bad operand type for unary -: '{}'",
                                other.type_name()
                            ))),
                        },
                    },
                }
            }
            Expr::Binary { op, left, right } => {
                let left = self.eval(left)?;
                let right = self.eval(right)?;
                binary_op(*op, &left, &right)
            }
            Expr::Compare { left, ops } => {
                let mut current = self.eval(left)?;
                for (op, right) in ops {
                    let right = self.eval(right)?;
                    if !compare_op(*op, &current, &right)? {
                        return Ok(Value::Bool(false));
                    }
                    current = right;
                }
                Ok(Value::Bool(true))
            }
            Expr::BoolOp { op, values } => {
                let mut last = Value::None;
                for value in values {
                    last = self.eval(value)?;
                    let truthy = last.is_truthy();
                    match op {
                        BoolOp::And if !truthy => return Ok(last),
                        BoolOp::Or if truthy => return Ok(last),
                        _ => {}
                    }
                }
                Ok(last)
            }
        }
    }

    fn eval_call(
        &mut self,
        func: &Expr,
        args: &[Expr],
        kwargs: &[(String, Expr)],
    ) -> ScriptResult<Value> {
        // Method calls on strings, lists and dicts never produce a bound
        // method value; dispatch directly on the receiver.
        let (callee, receiver) = match func {
            Expr::Attribute { value, attr } => match self.eval(value)? {
                Value::Module(module) => {
                    let member = module.get(attr).cloned().ok_or_else(|| {
                        ScriptError::AttributeError(format!(
                            "module '{}' has no attribute '{}'",
                            module.name, attr
                        ))
                    })?;
                    (Some(member), None)
                }
                receiver => (None, Some((receiver, attr.as_str()))),
            },
            other => (Some(self.eval(other)?), None),
        };

        let mut positional = Vec::with_capacity(args.len());
        for arg in args {
            positional.push(self.eval(arg)?);
        }
        let mut keyword = Vec::with_capacity(kwargs.len());
        for (name, value) in kwargs {
            keyword.push((name.clone(), self.eval(value)?));
        }

        match (callee, receiver) {
            (Some(callee), _) => self.call_function(&callee, positional, keyword),
            (None, Some((receiver, method))) => methods::call_method(
                &receiver,
                method,
                Args {
                    positional,
                    keyword,
                },
            ),
            (None, None) => Err(ScriptError::type_error("nothing to call")),
        }
    }
}

impl CallContext for Interpreter {
    fn call(&mut self, callee: &Value, args: Vec<Value>) -> ScriptResult<Value> {
        self.call_function(callee, args, Vec::new())
    }

    fn print(&mut self, line: String) {
        self.output.push(line);
    }
}

fn bind_parameters(
    closure: &Closure,
    args: Vec<Value>,
    kwargs: Vec<(String, Value)>,
) -> ScriptResult<HashMap<String, Value>> {
    let def = &closure.def;
    let name = &def.name;
    if args.len() > def.params.len() {
        return Err(ScriptError::type_error(format!(
            "{}() takes {} positional argument(s) but {} were given",
            name,
            def.params.len(),
            args.len()
        )));
    }

    let mut slots: Vec<Option<Value>> = vec![None; def.params.len()];
    for (slot, value) in slots.iter_mut().zip(args) {
        *slot = Some(value);
    }
    for (key, value) in kwargs {
        let position = def
            .params
            .iter()
            .position(|p| p.name == key)
            .ok_or_else(|| {
                ScriptError::type_error(format!(
                    "{}() got an unexpected keyword argument '{}'",
                    name, key
                ))
            })?;
        if slots[position].is_some() {
            return Err(ScriptError::type_error(format!(
                "{}() got multiple values for argument '{}'",
                name, key
            )));
        }
        slots[position] = Some(value);
    }

    let mut locals = closure.captured.clone();
    if closure.nested {
        // Nested functions reach themselves through their frame, not globals.
        locals.insert(
            name.clone(),
            Value::Function(Arc::new(Closure {
                def: closure.def.clone(),
                defaults: closure.defaults.clone(),
                globals: closure.globals.clone(),
                captured: closure.captured.clone(),
                nested: true,
            })),
        );
    }
    for ((param, slot), default) in def.params.iter().zip(slots).zip(&closure.defaults) {
        let value = match (slot, default) {
            (Some(value), _) => value,
            (None, Some(default)) => default.clone(),
            (None, None) => {
                return Err(ScriptError::type_error(format!(
                    "{}() missing required argument: '{}'",
                    name, param.name
                )))
            }
        };
        locals.insert(param.name.clone(), value);
    }
    Ok(locals)
}

fn normalize_index(index: i64, len: usize) -> Option<usize> {
    let len = len as i64;
    let idx = if index < 0 { index + len } else { index };
    if (0..len).contains(&idx) {
        Some(idx as usize)
    } else {
        None
    }
}

pub(crate) fn index_value(container: &Value, key: &Value) -> ScriptResult<Value> {
    match container {
        Value::List(items) => {
            let i = key.as_int().ok_or_else(|| {
                ScriptError::type_error(format!(
                    "list indices must be integers, not {}",
                    key.type_name()
                ))
            })?;
            normalize_index(i, items.len())
                .map(|i| items[i].clone())
                .ok_or_else(|| ScriptError::IndexError("list index out of range".into()))
        }
        Value::Str(s) => {
            let i = key.as_int().ok_or_else(|| {
                ScriptError::type_error(format!(
                    "string indices must be integers, not {}",
                    key.type_name()
                ))
            })?;
            let count = s.chars().count();
            normalize_index(i, count)
                .and_then(|i| s.chars().nth(i))
                .map(|c| Value::Str(c.to_string()))
                .ok_or_else(|| ScriptError::IndexError("string index out of range".into()))
        }
        Value::Dict(map) => {
            let k = key.as_str().ok_or_else(|| {
                ScriptError::KeyError(key.repr())
            })?;
            map.get(k)
                .cloned()
                .ok_or_else(|| ScriptError::KeyError(key.repr()))
        }
        other => Err(ScriptError::type_error(format!(
            "'{}' object is not subscriptable",
            other.type_name()
        ))),
    }
}

/// Write `value` at `container[keys[0]][keys[1]]...`.
fn store_path(container: &mut Value, keys: &[Value], value: Value) -> ScriptResult<()> {
    let Some((key, rest)) = keys.split_first() else {
        *container = value;
        return Ok(());
    };
    match container {
        Value::List(items) => {
            let i = key.as_int().ok_or_else(|| {
                ScriptError::type_error(format!(
                    "list indices must be integers, not {}",
                    key.type_name()
                ))
            })?;
            let len = items.len();
            let slot = normalize_index(i, len)
                .and_then(|i| items.get_mut(i))
                .ok_or_else(|| ScriptError::IndexError("list assignment index out of range".into()))?;
            store_path(slot, rest, value)
        }
        Value::Dict(map) => {
            let k = match key {
                Value::Str(k) => k.clone(),
                other => {
                    return Err(ScriptError::type_error(format!(
                        "dict keys must be str, not {}",
                        other.type_name()
                    )))
                }
            };
            if rest.is_empty() {
                map.insert(k, value);
                Ok(())
            } else {
                let slot = map
                    .get_mut(&k)
                    .ok_or_else(|| ScriptError::KeyError(key.repr()))?;
                store_path(slot, rest, value)
            }
        }
        other => Err(ScriptError::type_error(format!(
            "'{}' object does not support item assignment",
            other.type_name()
        ))),
    }
}

fn unsupported(op: &str, left: &Value, right: &Value) -> ScriptError {
    ScriptError::type_error(format!(
        "unsupported operand type(s) for {}: '{}' and '{}'",
        op,
        left.type_name(),
        right.type_name()
    ))
}

fn repeat<T: Clone>(items: &[T], count: i64) -> ScriptResult<Vec<T>> {
    let count = usize::try_from(count.max(0)).unwrap_or(0);
    if items.len().saturating_mul(count) > MAX_SEQUENCE_LEN {
        return Err(ScriptError::value_error("repeated sequence is too large"));
    }
    let mut out = Vec::with_capacity(items.len() * count);
    for _ in 0..count {
        out.extend_from_slice(items);
    }
    Ok(out)
}

fn floor_div(a: i64, b: i64) -> ScriptResult<i64> {
    if b == 0 {
        return Err(ScriptError::ZeroDivision);
    }
    let q = a.checked_div(b).ok_or(ScriptError::Overflow)?;
    if (a % b != 0) && ((a < 0) != (b < 0)) {
        Ok(q - 1)
    } else {
        Ok(q)
    }
}

fn floor_mod(a: i64, b: i64) -> ScriptResult<i64> {
    if b == 0 {
        return Err(ScriptError::ZeroDivision);
    }
    let r = a.checked_rem(b).ok_or(ScriptError::Overflow)?;
    if r != 0 && ((r < 0) != (b < 0)) {
        Ok(r + b)
    } else {
        Ok(r)
    }
}

pub(crate) fn binary_op(op: BinaryOp, left: &Value, right: &Value) -> ScriptResult<Value> {
    let symbol = op.symbol();
    match (op, left, right) {
        (BinaryOp::Add, Value::Str(a), Value::Str(b)) => {
            if a.len() + b.len() > MAX_SEQUENCE_LEN {
                return Err(ScriptError::value_error("resulting string is too large"));
            }
            Ok(Value::Str(format!("{}{}", a, b)))
        }
        (BinaryOp::Add, Value::List(a), Value::List(b)) => {
            if a.len() + b.len() > MAX_SEQUENCE_LEN {
                return Err(ScriptError::value_error("resulting list is too large"));
            }
            let mut out = a.clone();
            out.extend(b.iter().cloned());
            Ok(Value::List(out))
        }
        (BinaryOp::Mul, Value::Str(s), n) | (BinaryOp::Mul, n, Value::Str(s))
            if matches!(n, Value::Int(_) | Value::Bool(_)) =>
        {
            let chars: Vec<char> = s.chars().collect();
            let repeated = repeat(&chars, n.as_int().unwrap_or(0))?;
            Ok(Value::Str(repeated.into_iter().collect()))
        }
        (BinaryOp::Mul, Value::List(items), n) | (BinaryOp::Mul, n, Value::List(items))
            if matches!(n, Value::Int(_) | Value::Bool(_)) =>
        {
            Ok(Value::List(repeat(items, n.as_int().unwrap_or(0))?))
        }
        _ => {
            let both_int = matches!(
                (left, right),
                (Value::Int(_) | Value::Bool(_), Value::Int(_) | Value::Bool(_))
            );
            if both_int {
                let (a, b) = (left.as_int().unwrap_or(0), right.as_int().unwrap_or(0));
                return match op {
                    BinaryOp::Add => a.checked_add(b).map(Value::Int).ok_or(ScriptError::Overflow),
                    BinaryOp::Sub => a.checked_sub(b).map(Value::Int).ok_or(ScriptError::Overflow),
                    BinaryOp::Mul => a.checked_mul(b).map(Value::Int).ok_or(ScriptError::Overflow),
                    BinaryOp::Div => {
                        if b == 0 {
                            Err(ScriptError::ZeroDivision)
                        } else {
                            Ok(Value::Float(a as f64 / b as f64))
                        }
                    }
                    BinaryOp::FloorDiv => floor_div(a, b).map(Value::Int),
                    BinaryOp::Mod => floor_mod(a, b).map(Value::Int),
                };
            }
            let (a, b) = match (left.as_f64(), right.as_f64()) {
                (Some(a), Some(b)) => (a, b),
                _ => return Err(unsupported(symbol, left, right)),
            };
            match op {
                BinaryOp::Add => Ok(Value::Float(a + b)),
                BinaryOp::Sub => Ok(Value::Float(a - b)),
                BinaryOp::Mul => Ok(Value::Float(a * b)),
                BinaryOp::Div | BinaryOp::FloorDiv | BinaryOp::Mod if b == 0.0 => {
                    Err(ScriptError::ZeroDivision)
                }
                BinaryOp::Div => Ok(Value::Float(a / b)),
                BinaryOp::FloorDiv => Ok(Value::Float((a / b).floor())),
                BinaryOp::Mod => Ok(Value::Float(a - b * (a / b).floor())),
            }
        }
    }
}

fn compare_op(op: CompareOp, left: &Value, right: &Value) -> ScriptResult<bool> {
    use std::cmp::Ordering as Cmp;
    Ok(match op {
        CompareOp::Eq => left == right,
        CompareOp::NotEq => left != right,
        CompareOp::Lt => left.compare(right)? == Cmp::Less,
        CompareOp::LtE => left.compare(right)? != Cmp::Greater,
        CompareOp::Gt => left.compare(right)? == Cmp::Greater,
        CompareOp::GtE => left.compare(right)? != Cmp::Less,
        CompareOp::In => right.contains(left)?,
        CompareOp::NotIn => !right.contains(left)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_floor_division_rounds_toward_negative_infinity() {
        assert_eq!(floor_div(7, 2).unwrap(), 3);
        assert_eq!(floor_div(-7, 2).unwrap(), -4);
        assert_eq!(floor_mod(-7, 2).unwrap(), 1);
        assert_eq!(floor_mod(7, -2).unwrap(), -1);
        assert!(matches!(floor_div(1, 0), Err(ScriptError::ZeroDivision)));
        assert!(matches!(floor_div(i64::MIN, -1), Err(ScriptError::Overflow)));
    }

    #[test]
    fn test_store_path_updates_nested_values() {
        let mut value = Value::from_json(&serde_json::json!({"a": [1, {"b": 2}]}));
        store_path(
            &mut value,
            &[Value::from("a"), Value::Int(-1), Value::from("b")],
            Value::Int(3),
        )
        .unwrap();
        assert_eq!(value.to_json().unwrap(), serde_json::json!({"a": [1, {"b": 3}]}));
    }
}
