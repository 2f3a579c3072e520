use std::collections::BTreeMap;

use rhai::serde::{from_dynamic, to_dynamic};
use rhai::{Dynamic, Engine, Scope, AST};
use serde_json::Value;

use super::{ErrorKind, Result};

/// Runtime context handed to a compiled program.
///
/// Values are plain JSON documents keyed by the well-known names the planner
/// populates: `job`, `region`, `regions`, `region_namespace` and
/// `region_nodepool`. The evaluator sees each entry as a scope variable.
#[derive(Clone, Debug, Default)]
pub struct Context {
    entries: BTreeMap<String, Value>,
}

impl Context {
    pub fn new() -> Context {
        Context::default()
    }

    pub fn set(mut self, key: &str, value: Value) -> Context {
        self.entries.insert(key.to_string(), value);
        self
    }

    fn scope(&self) -> Result<Scope<'static>> {
        let mut scope = Scope::new();
        for (key, value) in &self.entries {
            let dynamic: Dynamic =
                to_dynamic(value).map_err(|e| ErrorKind::ExpressionRun(e.to_string()))?;
            scope.push_dynamic(key.clone(), dynamic);
        }
        Ok(scope)
    }
}

/// A compiled expression.
///
/// Compilation catches syntax errors at entity-create time; the result shape
/// (boolean or slice) is enforced when the program runs.
#[derive(Clone, Debug)]
pub struct Program {
    ast: AST,
}

impl Program {
    fn eval(&self, ctx: &Context) -> Result<Dynamic> {
        let engine = Engine::new();
        let mut scope = ctx.scope()?;
        engine
            .eval_ast_with_scope::<Dynamic>(&mut scope, &self.ast)
            .map_err(|e| ErrorKind::ExpressionRun(e.to_string()).into())
    }

    pub fn eval_bool(&self, ctx: &Context) -> Result<bool> {
        let result = self.eval(ctx)?;
        result
            .as_bool()
            .map_err(|actual| ErrorKind::ExpressionType("bool", actual.to_string()).into())
    }

    pub fn eval_slice(&self, ctx: &Context) -> Result<Vec<Value>> {
        let result = self.eval(ctx)?;
        let array = result
            .into_array()
            .map_err(|actual| ErrorKind::ExpressionType("slice", actual.to_string()))?;

        let mut out = Vec::with_capacity(array.len());
        for item in &array {
            let value: Value =
                from_dynamic(item).map_err(|e| ErrorKind::ExpressionRun(e.to_string()))?;
            out.push(value);
        }
        Ok(out)
    }
}

fn compile(src: &str) -> Result<Program> {
    debug!("compiling expression: {}", src);
    let engine = Engine::new();
    let ast = engine
        .compile(src)
        .map_err(|e| ErrorKind::ExpressionCompile(e.to_string()))?;
    Ok(Program { ast })
}

/// Compile a program expected to yield a boolean at run time.
pub fn compile_bool(src: &str) -> Result<Program> {
    compile(src)
}

/// Compile a program expected to yield an ordered sequence at run time.
pub fn compile_slice(src: &str) -> Result<Program> {
    compile(src)
}
