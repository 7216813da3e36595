// Wed Oct 14 2026 - Alex

use crate::interp::ast::{BinaryOp, DeclarationKind, Expression, FunctionDef, Statement, StatementKind, UnaryOp};
use crate::interp::engine::InterpEngine;
use crate::interp::handle::InterpContext;
use crate::interp::scope::{Scope, ScopeRef, ScopeStorage};
use crate::interp::value::{
    array_index, lookup_data, number_to_string, Callable, ObjectCell, ObjectClass, ObjectRef, Property, Value,
    MAX_CONVERSION_DEPTH,
};
use crate::scripting::context::ScriptFunction;
use crate::scripting::value::to_int32;
use std::cmp::Ordering;
use std::sync::atomic::Ordering as AtomicOrdering;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Array writes further than this past the end become named properties.
pub(crate) const MAX_ARRAY_GAP: usize = 1 << 20;

/// Approximate address of the current native stack top.
#[inline(never)]
pub(crate) fn stack_address() -> usize {
    let marker = 0u8;
    std::hint::black_box(&marker) as *const u8 as usize
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ThrowKind {
    Script,
    /// Abort and execution-limit unwinding; `catch` cannot intercept it.
    Abort,
}

pub(crate) struct Thrown {
    pub value: Value,
    pub kind: ThrowKind,
    pub line: i32,
    pub file: Arc<str>,
    pub backtrace: Vec<String>,
}

pub(crate) type Flow<T> = Result<T, Box<Thrown>>;

pub(crate) enum Completion {
    Normal(Option<Value>),
    Return(Value),
    Break,
    Continue,
}

pub(crate) struct Frame {
    pub function: String,
    pub file: Arc<str>,
    pub line: i32,
}

/// Execution state of one function body or top-level program.
pub(crate) struct Activation {
    pub scope: ScopeRef,
    pub var_scope: ScopeRef,
    pub this: Value,
    pub file: Arc<str>,
}

enum Reference {
    Binding(String),
    Property(Value, String),
}

pub(crate) struct FrameGuard<'a>(&'a InterpEngine);

impl Drop for FrameGuard<'_> {
    fn drop(&mut self) {
        self.0.call_stack.lock().pop();
    }
}

struct DepthGuard<'a>(&'a InterpEngine);

impl Drop for DepthGuard<'_> {
    fn drop(&mut self) {
        self.0.call_depth.fetch_sub(1, AtomicOrdering::SeqCst);
    }
}

impl InterpEngine {
    // Stack bookkeeping

    pub(crate) fn push_frame(&self, function: &str, file: &Arc<str>, line: i32) -> FrameGuard<'_> {
        self.call_stack.lock().push(Frame {
            function: function.to_string(),
            file: file.clone(),
            line,
        });
        FrameGuard(self)
    }

    /// `function@file:line` entries, innermost first.
    pub(crate) fn backtrace(&self) -> Vec<String> {
        self.call_stack
            .lock()
            .iter()
            .rev()
            .map(|frame| format!("{}@{}:{}", frame.function, frame.file, frame.line))
            .collect()
    }

    pub(crate) fn current_location(&self) -> (Arc<str>, i32) {
        match self.call_stack.lock().last() {
            Some(frame) => (frame.file.clone(), frame.line),
            None => (Arc::from(""), -1),
        }
    }

    /// Script recursion runs on the native stack; stop it before the thread
    /// runs out.
    fn check_stack(&self) -> Flow<()> {
        let base = self.stack_base.load(AtomicOrdering::Relaxed);
        if base != 0 && base.abs_diff(stack_address()) > self.config.max_stack_size {
            return self.throw_error("RangeError", "Maximum call stack size exceeded");
        }
        Ok(())
    }

    fn tick(&self, line: i32) -> Flow<()> {
        if let Some(frame) = self.call_stack.lock().last_mut() {
            frame.line = line;
        }
        if self.abort_requested.load(AtomicOrdering::SeqCst) {
            return Err(self.abort("Evaluation aborted"));
        }
        let steps = self.steps.fetch_add(1, AtomicOrdering::Relaxed) + 1;
        let limit = self.config.execution_limit;
        if limit > 0 && steps > limit {
            return Err(self.abort("Execution limit exceeded"));
        }
        self.maybe_process_events();
        Ok(())
    }

    fn maybe_process_events(&self) {
        let interval = self.process_events_interval.load(AtomicOrdering::Relaxed);
        if interval == 0 {
            return;
        }
        let due = {
            let mut last = self.last_process_events.lock();
            if last.elapsed() >= Duration::from_millis(interval) {
                *last = Instant::now();
                true
            } else {
                false
            }
        };
        if due {
            let hook = self.process_events_hook.read().clone();
            if let Some(hook) = hook {
                hook();
            }
        }
    }

    // Errors

    pub(crate) fn error_object(&self, name: &str, message: &str) -> ObjectRef {
        let realm = self.realm();
        let prototype = realm
            .as_ref()
            .map(|r| r.error_prototypes.get(name).unwrap_or(&r.error_prototype).clone());
        let known = realm.as_ref().map(|r| r.error_prototypes.contains_key(name)).unwrap_or(false);
        let error = ObjectCell::new(ObjectClass::Error, prototype);
        let (file, line) = self.current_location();
        if !known {
            error.define("name", Value::string(name));
        }
        error.define("message", Value::string(message));
        error.define("fileName", Value::String(file));
        error.define("lineNumber", Value::Number(line as f64));
        error.define("stack", Value::string(&self.backtrace().join("\n")));
        error
    }

    pub(crate) fn throw_error<T>(&self, name: &str, message: impl Into<String>) -> Flow<T> {
        let error = self.error_object(name, &message.into());
        Err(self.throw_value(Value::Object(error)))
    }

    pub(crate) fn throw_value(&self, value: Value) -> Box<Thrown> {
        let (file, line) = self.current_location();
        Box::new(Thrown {
            value,
            kind: ThrowKind::Script,
            line,
            file,
            backtrace: self.backtrace(),
        })
    }

    fn abort(&self, message: &str) -> Box<Thrown> {
        let mut thrown = self.throw_value(Value::Object(self.error_object("AbortError", message)));
        thrown.kind = ThrowKind::Abort;
        thrown
    }

    // Allocation

    pub(crate) fn alloc(&self, class: ObjectClass) -> ObjectRef {
        let prototype = self.realm().map(|realm| match class {
            ObjectClass::Array(_) => realm.array_prototype.clone(),
            ObjectClass::Function(_) => realm.function_prototype.clone(),
            ObjectClass::Error => realm.error_prototype.clone(),
            _ => realm.object_prototype.clone(),
        });
        ObjectCell::new(class, prototype)
    }

    pub(crate) fn alloc_array(&self, items: Vec<Value>) -> ObjectRef {
        self.alloc(ObjectClass::Array(items))
    }

    pub(crate) fn alloc_native(&self, function: ScriptFunction, name: &str, length: i32) -> ObjectRef {
        let object = self.alloc(ObjectClass::Function(Callable::Native {
            function,
            name: name.to_string(),
        }));
        object.define("length", Value::Number(length.max(0) as f64));
        object.define("name", Value::string(name));
        object
    }

    pub(crate) fn create_function(&self, def: &Arc<FunctionDef>, env: &ScopeRef, file: &Arc<str>) -> Value {
        let prototype = self.alloc(ObjectClass::Ordinary);
        let function = self.alloc(ObjectClass::Function(Callable::Script {
            def: def.clone(),
            env: env.clone(),
            file: file.clone(),
        }));
        {
            let mut data = function.lock();
            data.properties.insert("prototype".to_string(), Property::Data(Value::Object(prototype)));
            data.properties.insert("length".to_string(), Property::Data(Value::Number(def.params.len() as f64)));
            let name = def.name.clone().unwrap_or_default();
            data.properties.insert("name".to_string(), Property::Data(Value::string(&name)));
        }
        Value::Object(function)
    }

    pub(crate) fn global_value(&self) -> Value {
        self.realm()
            .map(|realm| Value::Object(realm.global.clone()))
            .unwrap_or(Value::Undefined)
    }

    // Statements

    pub(crate) fn hoist(&self, body: &[Statement], act: &Activation) -> Flow<()> {
        for statement in body {
            self.hoist_statement(statement, act)?;
        }
        Ok(())
    }

    fn hoist_statement(&self, statement: &Statement, act: &Activation) -> Flow<()> {
        match &statement.kind {
            StatementKind::Declaration { kind: DeclarationKind::Var, declarations } => {
                for (name, _) in declarations {
                    self.declare_var(name, act)?;
                }
            }
            StatementKind::Function(def) => {
                if let Some(name) = &def.name {
                    let function = self.create_function(def, &act.scope, &act.file);
                    self.bind(name, function, act)?;
                }
            }
            StatementKind::If { then_branch, else_branch, .. } => {
                self.hoist_statement(then_branch, act)?;
                if let Some(branch) = else_branch {
                    self.hoist_statement(branch, act)?;
                }
            }
            StatementKind::While { body, .. } => self.hoist_statement(body, act)?,
            StatementKind::For { init, body, .. } => {
                if let Some(init) = init {
                    self.hoist_statement(init, act)?;
                }
                self.hoist_statement(body, act)?;
            }
            StatementKind::ForIn { declared, name, body, .. } => {
                if *declared {
                    self.declare_var(name, act)?;
                }
                self.hoist_statement(body, act)?;
            }
            StatementKind::Try { block, catch_block, finally_block, .. } => {
                self.hoist(block, act)?;
                if let Some(block) = catch_block {
                    self.hoist(block, act)?;
                }
                if let Some(block) = finally_block {
                    self.hoist(block, act)?;
                }
            }
            StatementKind::Block(body) => self.hoist(body, act)?,
            _ => {}
        }
        Ok(())
    }

    fn declare_var(&self, name: &str, act: &Activation) -> Flow<()> {
        match act.var_scope.storage() {
            ScopeStorage::Declarative(_) => {
                if !act.var_scope.has_own(name) {
                    act.var_scope.set_own(name, Value::Undefined);
                }
            }
            ScopeStorage::Object(global) => {
                if !self.has_property(global, name) {
                    global.define(name, Value::Undefined);
                }
            }
        }
        Ok(())
    }

    /// Create or overwrite a binding in the activation's variable scope.
    fn bind(&self, name: &str, value: Value, act: &Activation) -> Flow<()> {
        match act.var_scope.storage() {
            ScopeStorage::Declarative(_) => {
                act.var_scope.set_own(name, value);
                Ok(())
            }
            ScopeStorage::Object(global) => self.put_property(global, name, value),
        }
    }

    fn lookup(&self, name: &str, act: &Activation) -> Flow<Option<Value>> {
        let mut current = Some(act.scope.clone());
        while let Some(scope) = current {
            match scope.storage() {
                ScopeStorage::Declarative(_) => {
                    if let Some(value) = scope.get_own(name) {
                        return Ok(Some(value));
                    }
                }
                ScopeStorage::Object(object) => {
                    if self.has_property(object, name) {
                        let receiver = Value::Object(object.clone());
                        return self.get_property(object, name, &receiver).map(Some);
                    }
                }
            }
            current = scope.parent().cloned();
        }
        Ok(None)
    }

    fn assign(&self, name: &str, value: Value, act: &Activation) -> Flow<()> {
        let mut current = Some(act.scope.clone());
        while let Some(scope) = current {
            let found = match scope.storage() {
                ScopeStorage::Declarative(_) => scope.has_own(name),
                ScopeStorage::Object(object) => self.has_property(object, name),
            };
            if found {
                if scope.is_constant(name) {
                    return self.throw_error("TypeError", "Assignment to constant variable.");
                }
                return match scope.storage() {
                    ScopeStorage::Declarative(_) => {
                        scope.set_own(name, value);
                        Ok(())
                    }
                    ScopeStorage::Object(object) => self.put_property(object, name, value),
                };
            }
            current = scope.parent().cloned();
        }
        match self.realm() {
            Some(realm) => self.put_property(&realm.global, name, value),
            None => Ok(()),
        }
    }

    pub(crate) fn exec_block(&self, body: &[Statement], act: &Activation) -> Flow<Completion> {
        let mut last = None;
        for statement in body {
            match self.exec(statement, act)? {
                Completion::Normal(Some(value)) => last = Some(value),
                Completion::Normal(None) => {}
                abrupt => return Ok(abrupt),
            }
        }
        Ok(Completion::Normal(last))
    }

    fn exec(&self, statement: &Statement, act: &Activation) -> Flow<Completion> {
        self.tick(statement.line)?;
        self.check_stack()?;
        match &statement.kind {
            StatementKind::Declaration { kind, declarations } => {
                for (name, init) in declarations {
                    match init {
                        Some(init) => {
                            let value = self.eval(init, act)?;
                            self.bind(name, value, act)?;
                        }
                        None if *kind != DeclarationKind::Var => self.bind(name, Value::Undefined, act)?,
                        None => {}
                    }
                    if *kind == DeclarationKind::Const {
                        act.var_scope.mark_constant(name);
                    }
                }
                Ok(Completion::Normal(None))
            }
            StatementKind::Function(_) | StatementKind::Empty => Ok(Completion::Normal(None)),
            StatementKind::Expression(expression) => Ok(Completion::Normal(Some(self.eval(expression, act)?))),
            StatementKind::If { condition, then_branch, else_branch } => {
                if self.eval(condition, act)?.to_boolean() {
                    self.exec(then_branch, act)
                } else if let Some(branch) = else_branch {
                    self.exec(branch, act)
                } else {
                    Ok(Completion::Normal(None))
                }
            }
            StatementKind::While { condition, body } => {
                let mut last = None;
                while self.eval(condition, act)?.to_boolean() {
                    match self.exec(body, act)? {
                        Completion::Break => break,
                        Completion::Normal(value) => last = value.or(last),
                        Completion::Continue => {}
                        done @ Completion::Return(_) => return Ok(done),
                    }
                }
                Ok(Completion::Normal(last))
            }
            StatementKind::For { init, condition, update, body } => {
                if let Some(init) = init {
                    self.exec(init, act)?;
                }
                let mut last = None;
                loop {
                    if let Some(condition) = condition {
                        if !self.eval(condition, act)?.to_boolean() {
                            break;
                        }
                    }
                    match self.exec(body, act)? {
                        Completion::Break => break,
                        Completion::Normal(value) => last = value.or(last),
                        Completion::Continue => {}
                        done @ Completion::Return(_) => return Ok(done),
                    }
                    if let Some(update) = update {
                        self.eval(update, act)?;
                        self.tick(statement.line)?;
                    }
                }
                Ok(Completion::Normal(last))
            }
            StatementKind::ForIn { declared, name, object, body } => {
                let target = self.eval(object, act)?;
                let keys = match target.as_object() {
                    Some(object) => self.own_keys(object),
                    None => Vec::new(),
                };
                let mut last = None;
                for key in keys {
                    if *declared {
                        self.bind(name, Value::string(&key), act)?;
                    } else {
                        self.assign(name, Value::string(&key), act)?;
                    }
                    match self.exec(body, act)? {
                        Completion::Break => break,
                        Completion::Normal(value) => last = value.or(last),
                        Completion::Continue => {}
                        done @ Completion::Return(_) => return Ok(done),
                    }
                }
                Ok(Completion::Normal(last))
            }
            StatementKind::Return(value) => {
                let value = match value {
                    Some(value) => self.eval(value, act)?,
                    None => Value::Undefined,
                };
                Ok(Completion::Return(value))
            }
            StatementKind::Break => Ok(Completion::Break),
            StatementKind::Continue => Ok(Completion::Continue),
            StatementKind::Throw(value) => {
                let value = self.eval(value, act)?;
                Err(self.throw_value(value))
            }
            StatementKind::Try { block, catch_param, catch_block, finally_block } => {
                let mut result = self.exec_block(block, act);
                if let (Err(thrown), Some(catch_block)) = (&result, catch_block) {
                    if thrown.kind == ThrowKind::Script {
                        let scope = Scope::declarative(Some(act.scope.clone()));
                        if let Some(param) = catch_param {
                            scope.set_own(param, thrown.value.clone());
                        }
                        let catch_act = Activation {
                            scope,
                            var_scope: act.var_scope.clone(),
                            this: act.this.clone(),
                            file: act.file.clone(),
                        };
                        result = self.exec_block(catch_block, &catch_act);
                    }
                }
                if let Some(finally_block) = finally_block {
                    match self.exec_block(finally_block, act)? {
                        Completion::Normal(_) => {}
                        abrupt => return Ok(abrupt),
                    }
                }
                result
            }
            StatementKind::Block(body) => self.exec_block(body, act),
        }
    }

    // Expressions

    fn eval(&self, expression: &Expression, act: &Activation) -> Flow<Value> {
        self.check_stack()?;
        match expression {
            Expression::Number(n) => Ok(Value::Number(*n)),
            Expression::String(s) => Ok(Value::string(s)),
            Expression::Bool(b) => Ok(Value::Bool(*b)),
            Expression::Null => Ok(Value::Null),
            Expression::This => Ok(act.this.clone()),
            Expression::Identifier(name) => match self.lookup(name, act)? {
                Some(value) => Ok(value),
                None if name == "undefined" => Ok(Value::Undefined),
                None if name == "NaN" => Ok(Value::Number(f64::NAN)),
                None if name == "Infinity" => Ok(Value::Number(f64::INFINITY)),
                None => self.throw_error("ReferenceError", format!("{} is not defined", name)),
            },
            Expression::Array(items) => {
                let mut values = Vec::with_capacity(items.len());
                for item in items {
                    values.push(self.eval(item, act)?);
                }
                Ok(Value::Object(self.alloc_array(values)))
            }
            Expression::Object(entries) => {
                let object = self.alloc(ObjectClass::Ordinary);
                for (key, value) in entries {
                    let value = self.eval(value, act)?;
                    object.define(key, value);
                }
                Ok(Value::Object(object))
            }
            Expression::Function(def) => Ok(self.create_function(def, &act.scope, &act.file)),
            Expression::Unary { op, operand } => self.eval_unary(*op, operand, act),
            Expression::Update { increment, prefix, target } => {
                let reference = self.reference(target, act)?;
                let old = self.get_reference(&reference, act)?.to_number();
                let new = if *increment { old + 1.0 } else { old - 1.0 };
                self.put_reference(&reference, Value::Number(new), act)?;
                Ok(Value::Number(if *prefix { new } else { old }))
            }
            Expression::Binary { .. } => self.eval_binary_chain(expression, act),
            Expression::Logical { and, left, right } => {
                let left = self.eval(left, act)?;
                if left.to_boolean() == *and {
                    self.eval(right, act)
                } else {
                    Ok(left)
                }
            }
            Expression::Conditional { condition, then_value, else_value } => {
                if self.eval(condition, act)?.to_boolean() {
                    self.eval(then_value, act)
                } else {
                    self.eval(else_value, act)
                }
            }
            Expression::Assign { op, target, value } => {
                let reference = self.reference(target, act)?;
                let value = match op {
                    None => self.eval(value, act)?,
                    Some(op) => {
                        let current = self.get_reference(&reference, act)?;
                        let rhs = self.eval(value, act)?;
                        self.binary(*op, &current, &rhs)?
                    }
                };
                self.put_reference(&reference, value.clone(), act)?;
                Ok(value)
            }
            Expression::Call { callee, args } => {
                let (function, this) = match callee.as_ref() {
                    Expression::Member { object, property } => {
                        let base = self.eval(object, act)?;
                        (self.get(&base, property)?, base)
                    }
                    Expression::Index { object, index } => {
                        let base = self.eval(object, act)?;
                        let key = property_key(&self.eval(index, act)?);
                        (self.get(&base, &key)?, base)
                    }
                    other => (self.eval(other, act)?, Value::Undefined),
                };
                let args = self.eval_args(args, act)?;
                if !function.is_callable() {
                    return self.throw_error("TypeError", format!("{} is not a function", describe(callee)));
                }
                self.call_function(&function, this, args)
            }
            Expression::New { callee, args } => {
                let constructor = self.eval(callee, act)?;
                let args = self.eval_args(args, act)?;
                if !constructor.is_callable() {
                    return self.throw_error("TypeError", format!("{} is not a constructor", describe(callee)));
                }
                self.construct(&constructor, args)
            }
            Expression::Member { object, property } => {
                let base = self.eval(object, act)?;
                self.get(&base, property)
            }
            Expression::Index { object, index } => {
                let base = self.eval(object, act)?;
                let key = property_key(&self.eval(index, act)?);
                self.get(&base, &key)
            }
            Expression::Sequence(expressions) => {
                let mut last = Value::Undefined;
                for expression in expressions {
                    last = self.eval(expression, act)?;
                }
                Ok(last)
            }
        }
    }

    /// Folds `a + b + c ...` left to right without recursing down the left
    /// spine.
    fn eval_binary_chain(&self, expression: &Expression, act: &Activation) -> Flow<Value> {
        let mut operands = Vec::new();
        let mut current = expression;
        while let Expression::Binary { op, left, right } = current {
            operands.push((*op, right.as_ref()));
            current = left.as_ref();
        }
        let mut value = self.eval(current, act)?;
        for (op, right) in operands.into_iter().rev() {
            let right = self.eval(right, act)?;
            value = self.binary(op, &value, &right)?;
        }
        Ok(value)
    }

    fn eval_args(&self, args: &[Expression], act: &Activation) -> Flow<Vec<Value>> {
        args.iter().map(|arg| self.eval(arg, act)).collect()
    }

    fn eval_unary(&self, op: UnaryOp, operand: &Expression, act: &Activation) -> Flow<Value> {
        match op {
            UnaryOp::Typeof => {
                let value = match operand {
                    Expression::Identifier(name) => self.lookup(name, act)?.unwrap_or(Value::Undefined),
                    other => self.eval(other, act)?,
                };
                Ok(Value::string(value.type_of()))
            }
            UnaryOp::Delete => match operand {
                Expression::Member { object, property } => {
                    let base = self.eval(object, act)?;
                    Ok(Value::Bool(base.as_object().map(|o| delete_property(o, property)).unwrap_or(true)))
                }
                Expression::Index { object, index } => {
                    let base = self.eval(object, act)?;
                    let key = property_key(&self.eval(index, act)?);
                    Ok(Value::Bool(base.as_object().map(|o| delete_property(o, &key)).unwrap_or(true)))
                }
                Expression::Identifier(_) => Ok(Value::Bool(false)),
                other => {
                    self.eval(other, act)?;
                    Ok(Value::Bool(true))
                }
            },
            UnaryOp::Void => {
                self.eval(operand, act)?;
                Ok(Value::Undefined)
            }
            UnaryOp::Neg => Ok(Value::Number(-self.eval(operand, act)?.to_number())),
            UnaryOp::Plus => Ok(Value::Number(self.eval(operand, act)?.to_number())),
            UnaryOp::Not => Ok(Value::Bool(!self.eval(operand, act)?.to_boolean())),
            UnaryOp::BitNot => Ok(Value::Number(!to_int32(self.eval(operand, act)?.to_number()) as f64)),
        }
    }

    fn binary(&self, op: BinaryOp, left: &Value, right: &Value) -> Flow<Value> {
        let number = |f: fn(f64, f64) -> f64| Ok(Value::Number(f(left.to_number(), right.to_number())));
        let int = |f: fn(i32, i32) -> i32| {
            Ok(Value::Number(f(to_int32(left.to_number()), to_int32(right.to_number())) as f64))
        };
        match op {
            BinaryOp::Add => {
                let (l, r) = (left.to_primitive(), right.to_primitive());
                if matches!(l, Value::String(_)) || matches!(r, Value::String(_)) {
                    let mut joined = l.to_display();
                    joined.push_str(&r.to_display());
                    Ok(Value::string(&joined))
                } else {
                    Ok(Value::Number(l.to_number() + r.to_number()))
                }
            }
            BinaryOp::Sub => number(|a, b| a - b),
            BinaryOp::Mul => number(|a, b| a * b),
            BinaryOp::Div => number(|a, b| a / b),
            BinaryOp::Mod => number(|a, b| a % b),
            BinaryOp::Eq => Ok(Value::Bool(left.loose_equals(right))),
            BinaryOp::Ne => Ok(Value::Bool(!left.loose_equals(right))),
            BinaryOp::StrictEq => Ok(Value::Bool(left.strict_equals(right))),
            BinaryOp::StrictNe => Ok(Value::Bool(!left.strict_equals(right))),
            BinaryOp::Lt => Ok(Value::Bool(compare(left, right) == Some(Ordering::Less))),
            BinaryOp::Gt => Ok(Value::Bool(compare(left, right) == Some(Ordering::Greater))),
            BinaryOp::Le => Ok(Value::Bool(matches!(compare(left, right), Some(Ordering::Less | Ordering::Equal)))),
            BinaryOp::Ge => Ok(Value::Bool(matches!(
                compare(left, right),
                Some(Ordering::Greater | Ordering::Equal)
            ))),
            BinaryOp::BitAnd => int(|a, b| a & b),
            BinaryOp::BitOr => int(|a, b| a | b),
            BinaryOp::BitXor => int(|a, b| a ^ b),
            BinaryOp::Shl => int(|a, b| a.wrapping_shl(b as u32 & 31)),
            BinaryOp::Shr => int(|a, b| a.wrapping_shr(b as u32 & 31)),
            BinaryOp::UShr => {
                let a = to_int32(left.to_number()) as u32;
                let b = to_int32(right.to_number()) as u32 & 31;
                Ok(Value::Number((a >> b) as f64))
            }
            BinaryOp::In => match right.as_object() {
                Some(object) => Ok(Value::Bool(self.has_property(object, &property_key(left)))),
                None => self.throw_error("TypeError", "Cannot use 'in' operator to search in a non-object"),
            },
            BinaryOp::Instanceof => {
                let constructor = match right.as_object() {
                    Some(object) if object.is_callable() => object,
                    _ => return self.throw_error("TypeError", "Right-hand side of 'instanceof' is not callable"),
                };
                let prototype = match lookup_data(constructor, "prototype") {
                    Some(Value::Object(prototype)) => prototype,
                    _ => return Ok(Value::Bool(false)),
                };
                let mut current = left.as_object().and_then(|o| o.prototype());
                let mut hops = 0;
                while let Some(object) = current {
                    if Arc::ptr_eq(&object, &prototype) {
                        return Ok(Value::Bool(true));
                    }
                    hops += 1;
                    if hops > MAX_CONVERSION_DEPTH {
                        break;
                    }
                    current = object.prototype();
                }
                Ok(Value::Bool(false))
            }
        }
    }

    fn reference(&self, target: &Expression, act: &Activation) -> Flow<Reference> {
        match target {
            Expression::Identifier(name) => Ok(Reference::Binding(name.clone())),
            Expression::Member { object, property } => Ok(Reference::Property(self.eval(object, act)?, property.clone())),
            Expression::Index { object, index } => {
                let base = self.eval(object, act)?;
                let key = property_key(&self.eval(index, act)?);
                Ok(Reference::Property(base, key))
            }
            _ => self.throw_error("ReferenceError", "Invalid assignment target"),
        }
    }

    fn get_reference(&self, reference: &Reference, act: &Activation) -> Flow<Value> {
        match reference {
            Reference::Binding(name) => match self.lookup(name, act)? {
                Some(value) => Ok(value),
                None => self.throw_error("ReferenceError", format!("{} is not defined", name)),
            },
            Reference::Property(base, key) => self.get(base, key),
        }
    }

    fn put_reference(&self, reference: &Reference, value: Value, act: &Activation) -> Flow<()> {
        match reference {
            Reference::Binding(name) => self.assign(name, value, act),
            Reference::Property(base, key) => self.put(base, key, value),
        }
    }

    // Properties

    pub(crate) fn get(&self, base: &Value, key: &str) -> Flow<Value> {
        match base {
            Value::Undefined | Value::Null => self.throw_error(
                "TypeError",
                format!("Cannot read property '{}' of {}", key, base.to_display()),
            ),
            Value::String(s) => {
                if key == "length" {
                    return Ok(Value::Number(s.encode_utf16().count() as f64));
                }
                if let Some(index) = array_index(key) {
                    return Ok(s
                        .chars()
                        .nth(index)
                        .map(|c| Value::string(&c.to_string()))
                        .unwrap_or(Value::Undefined));
                }
                match self.realm() {
                    Some(realm) => self.get_property(&realm.string_prototype, key, base),
                    None => Ok(Value::Undefined),
                }
            }
            Value::Number(_) => match self.realm() {
                Some(realm) => self.get_property(&realm.number_prototype, key, base),
                None => Ok(Value::Undefined),
            },
            Value::Bool(_) => match self.realm() {
                Some(realm) => self.get_property(&realm.object_prototype, key, base),
                None => Ok(Value::Undefined),
            },
            Value::Object(object) => self.get_property(object, key, base),
        }
    }

    pub(crate) fn get_property(&self, object: &ObjectRef, key: &str, receiver: &Value) -> Flow<Value> {
        enum Step {
            Found(Value),
            Getter(Option<Value>),
            Next(Option<ObjectRef>, Option<crate::interp::value::HostBinding>),
        }
        let mut current = object.clone();
        let mut hops = 0;
        loop {
            let step = {
                let data = current.lock();
                let special = match &data.class {
                    ObjectClass::Array(items) if key == "length" => Some(Value::Number(items.len() as f64)),
                    ObjectClass::Array(items) => {
                        array_index(key).map(|i| items.get(i).cloned().unwrap_or(Value::Undefined))
                    }
                    ObjectClass::ArrayBuffer(bytes) if key == "byteLength" => Some(Value::Number(bytes.len() as f64)),
                    _ => None,
                };
                match (special, data.properties.get(key)) {
                    (Some(value), _) => Step::Found(value),
                    (None, Some(Property::Data(value))) => Step::Found(value.clone()),
                    (None, Some(Property::Accessor { getter, .. })) => Step::Getter(getter.clone()),
                    (None, None) => {
                        let binding = match &data.class {
                            ObjectClass::Host(binding) => Some(binding.clone()),
                            _ => None,
                        };
                        Step::Next(data.prototype.clone(), binding)
                    }
                }
            };
            match step {
                Step::Found(value) => return Ok(value),
                Step::Getter(Some(getter)) => return self.call_function(&getter, receiver.clone(), Vec::new()),
                Step::Getter(None) => return Ok(Value::Undefined),
                Step::Next(prototype, binding) => {
                    if let Some(binding) = binding {
                        if let Some(value) = self.host_get(&current, &binding, key) {
                            return Ok(value);
                        }
                    }
                    hops += 1;
                    match prototype {
                        Some(prototype) if hops <= MAX_CONVERSION_DEPTH => current = prototype,
                        _ => return Ok(Value::Undefined),
                    }
                }
            }
        }
    }

    pub(crate) fn put(&self, base: &Value, key: &str, value: Value) -> Flow<()> {
        match base {
            Value::Undefined | Value::Null => self.throw_error(
                "TypeError",
                format!("Cannot set property '{}' of {}", key, base.to_display()),
            ),
            Value::Object(object) => self.put_property(object, key, value),
            _ => Ok(()),
        }
    }

    pub(crate) fn put_property(&self, object: &ObjectRef, key: &str, value: Value) -> Flow<()> {
        enum Step {
            Done,
            BadLength,
            Setter(Option<Value>),
            Host(crate::interp::value::HostBinding),
            Inherit(Option<ObjectRef>),
        }
        let step = {
            let mut data = object.lock();
            let mut step = None;
            if let ObjectClass::Array(items) = &mut data.class {
                if key == "length" {
                    let n = value.to_number();
                    step = Some(if n >= 0.0 && n.fract() == 0.0 && n as usize <= items.len() + MAX_ARRAY_GAP {
                        items.resize(n as usize, Value::Undefined);
                        Step::Done
                    } else {
                        Step::BadLength
                    });
                } else if let Some(index) = array_index(key) {
                    if index < items.len() {
                        items[index] = value.clone();
                        step = Some(Step::Done);
                    } else if index <= items.len() + MAX_ARRAY_GAP {
                        items.resize(index + 1, Value::Undefined);
                        items[index] = value.clone();
                        step = Some(Step::Done);
                    }
                }
            }
            match step {
                Some(step) => step,
                None => {
                    let binding = match &data.class {
                        ObjectClass::Host(binding) => Some(binding.clone()),
                        _ => None,
                    };
                    match (binding, data.properties.get_mut(key)) {
                        (_, Some(Property::Data(slot))) => {
                            *slot = value.clone();
                            Step::Done
                        }
                        (_, Some(Property::Accessor { setter, .. })) => Step::Setter(setter.clone()),
                        (Some(binding), None) => Step::Host(binding),
                        (None, None) => Step::Inherit(data.prototype.clone()),
                    }
                }
            }
        };
        match step {
            Step::Done => Ok(()),
            Step::BadLength => self.throw_error("RangeError", "Invalid array length"),
            Step::Setter(Some(setter)) => self.call_function(&setter, Value::Object(object.clone()), vec![value]).map(|_| ()),
            Step::Setter(None) => Ok(()),
            Step::Host(binding) => {
                if !self.host_put(&binding, key, &value) {
                    object.define(key, value);
                }
                Ok(())
            }
            Step::Inherit(prototype) => {
                if let Some(setter) = find_setter(prototype, key) {
                    if let Some(setter) = setter {
                        self.call_function(&setter, Value::Object(object.clone()), vec![value])?;
                    }
                    return Ok(());
                }
                object.define(key, value);
                Ok(())
            }
        }
    }

    pub(crate) fn has_property(&self, object: &ObjectRef, key: &str) -> bool {
        let mut current = Some(object.clone());
        let mut hops = 0;
        while let Some(cell) = current {
            let (found, binding, prototype) = {
                let data = cell.lock();
                let found = data.properties.contains_key(key)
                    || match &data.class {
                        ObjectClass::Array(items) => {
                            key == "length" || array_index(key).map(|i| i < items.len()).unwrap_or(false)
                        }
                        ObjectClass::ArrayBuffer(_) => key == "byteLength",
                        _ => false,
                    };
                let binding = match &data.class {
                    ObjectClass::Host(binding) => Some(binding.clone()),
                    _ => None,
                };
                (found, binding, data.prototype.clone())
            };
            if found || binding.map(|b| self.host_has(&b, key)).unwrap_or(false) {
                return true;
            }
            hops += 1;
            if hops > MAX_CONVERSION_DEPTH {
                return false;
            }
            current = prototype;
        }
        false
    }

    /// Enumerable own keys in insertion order; array indices first.
    pub(crate) fn own_keys(&self, object: &ObjectRef) -> Vec<String> {
        let (mut keys, binding) = {
            let data = object.lock();
            let mut keys: Vec<String> = match &data.class {
                ObjectClass::Array(items) => (0..items.len()).map(|i| i.to_string()).collect(),
                _ => Vec::new(),
            };
            let hidden: &[&str] = match &data.class {
                ObjectClass::Function(_) => &["prototype", "length", "name"],
                ObjectClass::Error => &["fileName", "lineNumber", "stack"],
                _ => &[],
            };
            keys.extend(data.properties.keys().filter(|k| !hidden.contains(&k.as_str())).cloned());
            let binding = match &data.class {
                ObjectClass::Host(binding) => Some(binding.clone()),
                _ => None,
            };
            (keys, binding)
        };
        if let Some(binding) = binding {
            let mut host_keys = self.host_keys(&binding);
            host_keys.retain(|k| !keys.contains(k));
            host_keys.append(&mut keys);
            keys = host_keys;
        }
        keys
    }

    // Calls

    pub(crate) fn call_function(&self, callee: &Value, this: Value, args: Vec<Value>) -> Flow<Value> {
        let callable = match callee.as_object().and_then(|object| object.callable()) {
            Some(callable) => callable,
            None => return self.throw_error("TypeError", format!("{} is not a function", callee.to_display())),
        };
        let _depth = self.enter_call()?;
        match callable {
            Callable::Script { def, env, file } => self.call_script(&def, &env, &file, this, args),
            Callable::Native { function, name } => self.call_native(&function, &name, callee, this, args),
            Callable::HostMethod { wrapper, method } => self.invoke_host_method(&wrapper, &method, args),
        }
    }

    fn enter_call(&self) -> Flow<DepthGuard<'_>> {
        let depth = self.call_depth.fetch_add(1, AtomicOrdering::SeqCst) + 1;
        let guard = DepthGuard(self);
        if depth > self.config.max_call_depth {
            return self.throw_error("RangeError", "Maximum call stack size exceeded");
        }
        self.check_stack()?;
        Ok(guard)
    }

    fn call_script(
        &self,
        def: &Arc<FunctionDef>,
        env: &ScopeRef,
        file: &Arc<str>,
        this: Value,
        args: Vec<Value>,
    ) -> Flow<Value> {
        let scope = Scope::declarative(Some(env.clone()));
        for (index, param) in def.params.iter().enumerate() {
            scope.set_own(param, args.get(index).cloned().unwrap_or(Value::Undefined));
        }
        if !scope.has_own("arguments") {
            scope.set_own("arguments", Value::Object(self.alloc_array(args)));
        }
        let this = if this.is_nullish() { self.global_value() } else { this };
        let _frame = self.push_frame(def.name.as_deref().unwrap_or("<anonymous>"), file, def.line);
        let act = Activation {
            scope: scope.clone(),
            var_scope: scope,
            this,
            file: file.clone(),
        };
        self.hoist(&def.body, &act)?;
        match self.exec_block(&def.body, &act)? {
            Completion::Return(value) => Ok(value),
            _ => Ok(Value::Undefined),
        }
    }

    fn call_native(
        &self,
        function: &ScriptFunction,
        name: &str,
        callee: &Value,
        this: Value,
        args: Vec<Value>,
    ) -> Flow<Value> {
        let engine = match self.self_ref.upgrade() {
            Some(engine) => engine,
            None => return Ok(Value::Undefined),
        };
        let (file, line) = self.current_location();
        let backtrace = self.backtrace();
        let _frame = self.push_frame(name, &file, line);
        let context = InterpContext::new(engine.clone(), this, callee.clone(), args, file, line, backtrace);
        let before = self.exceptions.pending_id();
        let result = function(&context, engine.as_ref());
        if let Some(thrown) = context.take_thrown() {
            return Err(self.throw_value(thrown));
        }
        self.check_raised(before)?;
        Ok(self.import(&result))
    }

    /// Turn an exception raised through the engine API during a native call
    /// into a script throw.
    pub(crate) fn check_raised(&self, before: Option<u64>) -> Flow<()> {
        let after = self.exceptions.pending_id();
        if after.is_none() || after == before {
            return Ok(());
        }
        match self.exceptions.take() {
            Some(captured) => Err(Box::new(Thrown {
                value: self.import(&captured.value),
                kind: if captured.name == "AbortError" { ThrowKind::Abort } else { ThrowKind::Script },
                line: captured.line_number,
                file: Arc::from(captured.file_name.as_str()),
                backtrace: captured.backtrace,
            })),
            None => Ok(()),
        }
    }

    pub(crate) fn construct(&self, callee: &Value, args: Vec<Value>) -> Flow<Value> {
        let constructor = match callee.as_object() {
            Some(object) => object,
            None => return self.throw_error("TypeError", format!("{} is not a constructor", callee.to_display())),
        };
        match constructor.callable() {
            Some(Callable::Script { .. }) | Some(Callable::Native { .. }) => {}
            _ => return self.throw_error("TypeError", format!("{} is not a constructor", callee.to_display())),
        }
        let prototype = match lookup_data(constructor, "prototype") {
            Some(Value::Object(prototype)) => Some(prototype),
            _ => self.realm().map(|realm| realm.object_prototype.clone()),
        };
        let instance = ObjectCell::new(ObjectClass::Ordinary, prototype);
        let result = self.call_function(callee, Value::Object(instance.clone()), args)?;
        match result {
            Value::Object(_) => Ok(result),
            _ => Ok(Value::Object(instance)),
        }
    }
}

fn find_setter(mut current: Option<ObjectRef>, key: &str) -> Option<Option<Value>> {
    let mut hops = 0;
    while let Some(object) = current {
        let data = object.lock();
        match data.properties.get(key) {
            Some(Property::Accessor { setter, .. }) => return Some(setter.clone()),
            Some(Property::Data(_)) => return None,
            None => {}
        }
        hops += 1;
        if hops > MAX_CONVERSION_DEPTH {
            return None;
        }
        current = data.prototype.clone();
    }
    None
}

fn delete_property(object: &ObjectRef, key: &str) -> bool {
    let mut data = object.lock();
    if let ObjectClass::Array(items) = &mut data.class {
        if let Some(index) = array_index(key) {
            if let Some(slot) = items.get_mut(index) {
                *slot = Value::Undefined;
            }
            return true;
        }
    }
    data.properties.shift_remove(key);
    true
}

fn compare(left: &Value, right: &Value) -> Option<Ordering> {
    let (l, r) = (left.to_primitive(), right.to_primitive());
    match (&l, &r) {
        (Value::String(a), Value::String(b)) => Some(a.as_ref().cmp(b.as_ref())),
        _ => l.to_number().partial_cmp(&r.to_number()),
    }
}

pub(crate) fn property_key(value: &Value) -> String {
    match value {
        Value::Number(n) => number_to_string(*n),
        other => other.to_display(),
    }
}

fn describe(expression: &Expression) -> String {
    match expression {
        Expression::Identifier(name) => name.clone(),
        Expression::Member { object, property } => format!("{}.{}", describe(object), property),
        Expression::This => "this".to_string(),
        Expression::Index { object, .. } => format!("{}[...]", describe(object)),
        Expression::Call { callee, .. } => format!("{}(...)", describe(callee)),
        _ => "expression".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EngineConfig;
    use crate::scripting::engine::ScriptEngine;

    fn eval(source: &str) -> String {
        let engine = InterpEngine::new(EngineConfig::default());
        let value = engine.evaluate(source, "eval.js");
        value.to_string()
    }

    #[test]
    fn test_arithmetic_and_strings() {
        assert_eq!(eval("1 + 2 * 3"), "7");
        assert_eq!(eval("'a' + 1 + 2"), "a12");
        assert_eq!(eval("7 % 3"), "1");
        assert_eq!(eval("-7 >> 1"), "-4");
        assert_eq!(eval("-1 >>> 28"), "15");
        assert_eq!(eval("'abc'.length"), "3");
        assert_eq!(eval("[1, 2] + ''"), "1,2");
    }

    #[test]
    fn test_closures_and_recursion() {
        let source = "
            function counter() { var n = 0; return function() { n += 1; return n; }; }
            var next = counter();
            next(); next();
            function fib(n) { return n < 2 ? n : fib(n - 1) + fib(n - 2); }
            next() + ':' + fib(10)
        ";
        assert_eq!(eval(source), "3:55");
    }

    #[test]
    fn test_control_flow() {
        let source = "
            var out = [];
            for (var i = 0; i < 6; i++) {
                if (i == 1) continue;
                if (i == 4) break;
                out.push(i);
            }
            var j = 0;
            while (true) { j++; if (j > 2) break; }
            var keys = '';
            for (var k in { a: 1, b: 2 }) keys += k;
            out.join('-') + '|' + j + '|' + keys
        ";
        assert_eq!(eval(source), "0-2-3|3|ab");
    }

    #[test]
    fn test_try_catch_finally() {
        let source = "
            var log = [];
            function f() {
                try { throw new RangeError('x'); }
                catch (e) { log.push(e.name); return 'caught'; }
                finally { log.push('finally'); }
            }
            f() + ':' + log.join(',')
        ";
        assert_eq!(eval(source), "caught:RangeError,finally");
    }

    #[test]
    fn test_constructors_and_instanceof() {
        let source = "
            function Point(x, y) { this.x = x; this.y = y; }
            var p = new Point(1, 2);
            var e = new TypeError('t');
            [p.x + p.y, p instanceof Point, e instanceof TypeError, e instanceof Error, typeof Point].join(',')
        ";
        assert_eq!(eval(source), "3,true,true,true,function");
    }

    #[test]
    fn test_const_reassignment_throws() {
        let engine = InterpEngine::new(EngineConfig::default());
        engine.evaluate("const fixed = 1; fixed = 2;", "const.js");
        let report = engine.uncaught_exception_report().unwrap();
        assert_eq!(report.name, "TypeError");
        assert_eq!(report.line_number, 1);
    }

    #[test]
    fn test_reference_error_and_typeof() {
        assert_eq!(eval("typeof missing"), "undefined");
        let engine = InterpEngine::new(EngineConfig::default());
        engine.evaluate("\nmissing + 1", "ref.js");
        let report = engine.uncaught_exception_report().unwrap();
        assert_eq!(report.name, "ReferenceError");
        assert_eq!(report.message, "missing is not defined");
        assert_eq!(report.line_number, 2);
        assert_eq!(report.file_name, "ref.js");
    }

    #[test]
    fn test_call_depth_limit() {
        let engine = InterpEngine::new(EngineConfig::default().with_max_call_depth(16));
        engine.evaluate("function down(n) { return down(n + 1); } down(0);", "deep.js");
        let report = engine.uncaught_exception_report().unwrap();
        assert_eq!(report.name, "RangeError");
    }

    #[test]
    fn test_deep_recursion_fails_on_a_default_thread() {
        let outcome = std::thread::spawn(|| {
            let engine = InterpEngine::new(EngineConfig::default().with_max_call_depth(1_000_000));
            let source = "function f(n) { if (n == 0) return 0; return f(n - 1) + 1; } f(100000)";
            engine.evaluate(source, "recurse.js");
            let name = engine.uncaught_exception_report().map(|report| report.name);
            let shallow = engine.evaluate("f(20)", "shallow.js").to_int32();
            (name, shallow)
        })
        .join()
        .unwrap();
        assert_eq!(outcome, (Some("RangeError".to_string()), 20));
    }

    #[test]
    fn test_stack_exhaustion_is_catchable() {
        let source = "
            function down() { return down(); }
            var message;
            try { down(); } catch (e) { message = e.message; }
            message
        ";
        let engine = InterpEngine::new(EngineConfig::default().with_max_call_depth(1_000_000));
        let result = engine.evaluate(source, "catch.js");
        assert_eq!(result.to_string(), "Maximum call stack size exceeded");
    }

    #[test]
    fn test_long_operator_chain() {
        let source = vec!["1"; 900].join(" + ");
        assert_eq!(eval(&source), "900");
        assert_eq!(eval("10 - 3 - 2"), "5");
        assert_eq!(eval("'x' + 1 + 2 * 3"), "x16");
    }

    #[test]
    fn test_deeply_nested_source_is_a_syntax_error() {
        let engine = InterpEngine::new(EngineConfig::default());
        let source = format!("{}1{}", "(".repeat(50_000), ")".repeat(50_000));
        engine.evaluate(&source, "nested.js");
        assert!(engine.uncaught_exception_report().unwrap().is_syntax_error());
        let chain = vec!["1"; 100_000].join("+");
        engine.evaluate(&chain, "chain.js");
        assert!(engine.uncaught_exception_report().unwrap().is_syntax_error());
    }

    #[test]
    fn test_execution_limit_is_uncatchable() {
        let engine = InterpEngine::new(EngineConfig::default().with_execution_limit(1000));
        engine.evaluate("var caught = false; try { while (true) {} } catch (e) { caught = true; }", "spin.js");
        let report = engine.uncaught_exception_report().unwrap();
        assert!(report.is_abort());
        assert!(!engine.global_object().property("caught").to_bool());
    }
}
