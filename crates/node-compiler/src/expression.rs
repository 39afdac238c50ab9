//! Expression stage for scripting nodes
//!
//! Expression text is compiled with an embedded, sandboxed rhai engine.
//! The upstream item is bound as `it`. A node's output type is inferred by
//! evaluating the expression once against a representative value of its
//! input type, unless the node declares `outputType` explicitly. Type
//! mismatches in that evaluation are compile errors; failures that depend
//! on the value (division by zero, an index out of range) are left for
//! runtime, and a map expression's output type falls back to `json`.
//! Everything
//! rhai-specific stays inside this module; the rest of the compiler only
//! sees [`ScriptEngine::compile`] and [`CompiledScript`].

use std::sync::Arc;

use futures::{future, StreamExt};
use rhai::{Dynamic, Engine, EvalAltResult, Scope, AST};

use crate::config::ScriptLimits;
use crate::context::{Item, ItemStream};
use crate::descriptor::ScriptMode;
use crate::error::OperatorError;
use crate::types::DataType;

/// Name the upstream item is bound to inside expressions
pub const ITEM_VARIABLE: &str = "it";

/// Sandboxed expression compiler shared by every scripting node of a compile
pub struct ScriptEngine {
    engine: Arc<Engine>,
}

impl ScriptEngine {
    /// Create an engine with the given safety limits
    pub fn new(limits: &ScriptLimits) -> Self {
        let mut engine = Engine::new();
        Self::configure_engine(&mut engine, limits);
        Self {
            engine: Arc::new(engine),
        }
    }

    fn configure_engine(engine: &mut Engine, limits: &ScriptLimits) {
        // Set safety limits
        engine.set_max_expr_depths(limits.max_expr_depth, limits.max_expr_depth);
        engine.set_max_call_levels(limits.max_call_levels);
        engine.set_max_operations(limits.max_operations);
        engine.set_max_string_size(limits.max_string_size);
        engine.set_max_array_size(limits.max_array_size);
        engine.set_max_map_size(limits.max_map_size);

        engine.set_strict_variables(true);

        engine.register_fn("to_float", |x: i64| x as f64);
        engine.register_fn("clamp", |x: f64, lo: f64, hi: f64| x.clamp(lo, hi));
        engine.register_fn("clamp", |x: i64, lo: i64, hi: i64| x.clamp(lo, hi));
    }

    /// Compile `source` against items of type `input`
    ///
    /// Errors are human-readable messages for the compile report.
    pub fn compile(
        &self,
        source: &str,
        mode: ScriptMode,
        input: &DataType,
        declared: Option<&DataType>,
    ) -> Result<CompiledScript, String> {
        let mut scope = Scope::new();
        scope.push_dynamic(ITEM_VARIABLE, Dynamic::UNIT);
        let ast = self
            .engine
            .compile_expression_with_scope(&scope, source)
            .map_err(|e| format!("parse error: {}", e))?;

        let mut script = CompiledScript {
            engine: self.engine.clone(),
            ast: Arc::new(ast),
            source: source.to_string(),
            mode,
            output_type: input.clone(),
        };

        if let (ScriptMode::Map, Some(declared)) = (mode, declared) {
            script.output_type = declared.clone();
            return Ok(script);
        }

        let probed = match script.eval(&input.sample_value()) {
            Ok(value) => value,
            Err(e) if is_type_error(&e) => {
                return Err(format!("evaluating against a sample {}: {}", input, e));
            }
            Err(e) => {
                log::debug!(
                    "Expression `{}` failed on a sample {} ({}); leaving it untyped",
                    source,
                    input,
                    e
                );
                if mode == ScriptMode::Map {
                    script.output_type = DataType::Json;
                }
                return Ok(script);
            }
        };

        match mode {
            ScriptMode::Map => script.output_type = infer_type(&probed),
            ScriptMode::Filter if probed.is_bool() => {}
            ScriptMode::Filter => {
                return Err(format!(
                    "a condition must produce bool, found {}",
                    infer_type(&probed)
                ));
            }
        }
        Ok(script)
    }
}

/// A parsed and typed expression, ready to run
pub struct CompiledScript {
    engine: Arc<Engine>,
    ast: Arc<AST>,
    source: String,
    mode: ScriptMode,
    output_type: DataType,
}

impl CompiledScript {
    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn mode(&self) -> ScriptMode {
        self.mode
    }

    pub fn output_type(&self) -> &DataType {
        &self.output_type
    }

    fn eval(&self, item: &Item) -> Result<Dynamic, Box<rhai::EvalAltResult>> {
        let mut scope = Scope::new();
        scope.push_dynamic(ITEM_VARIABLE, rhai::serde::to_dynamic(item)?);
        self.engine.eval_ast_with_scope::<Dynamic>(&mut scope, &self.ast)
    }

    /// Evaluate against one item, checking the result against the output type
    pub fn evaluate(&self, item: &Item) -> Result<Item, OperatorError> {
        let result = self
            .eval(item)
            .map_err(|e| OperatorError::with_source(format!("expression `{}` failed", self.source), e))?;
        let value: Item = rhai::serde::from_dynamic(&result)
            .map_err(|e| OperatorError::with_source("expression result is not representable", e))?;
        if !self.output_type.admits(&value) {
            return Err(OperatorError::new(format!(
                "expression `{}` produced {} where {} was expected",
                self.source, value, self.output_type
            )));
        }
        Ok(value)
    }

    /// Evaluate a condition against one item
    pub fn test(&self, item: &Item) -> Result<bool, OperatorError> {
        let result = self
            .eval(item)
            .map_err(|e| OperatorError::with_source(format!("condition `{}` failed", self.source), e))?;
        result.as_bool().map_err(|found| {
            OperatorError::new(format!(
                "condition `{}` produced {} instead of bool",
                self.source, found
            ))
        })
    }

    /// Apply the script to a stream according to its mode
    pub(crate) fn apply(self: Arc<Self>, input: ItemStream) -> ItemStream {
        match self.mode {
            ScriptMode::Map => input
                .map(move |item| item.and_then(|value| self.evaluate(&value)))
                .boxed(),
            ScriptMode::Filter => input
                .filter_map(move |item| {
                    let out = match item {
                        Ok(value) => match self.test(&value) {
                            Ok(true) => Some(Ok(value)),
                            Ok(false) => None,
                            Err(e) => Some(Err(e)),
                        },
                        Err(e) => Some(Err(e)),
                    };
                    future::ready(out)
                })
                .boxed(),
        }
    }
}

/// Errors that any value of the input type would hit
fn is_type_error(error: &EvalAltResult) -> bool {
    matches!(
        error,
        EvalAltResult::ErrorFunctionNotFound(..)
            | EvalAltResult::ErrorMismatchDataType(..)
            | EvalAltResult::ErrorMismatchOutputType(..)
    )
}

/// The data type of a probe result
fn infer_type(value: &Dynamic) -> DataType {
    if value.is_unit() {
        DataType::Unit
    } else if value.is_bool() {
        DataType::Bool
    } else if value.is_int() {
        DataType::Int
    } else if value.is_float() {
        DataType::Float
    } else if value.is_string() || value.is_char() {
        DataType::Text
    } else if value.is_array() {
        let items: Vec<DataType> = value
            .clone()
            .into_array()
            .map(|array| array.iter().map(infer_type).collect())
            .unwrap_or_default();
        match items.first() {
            None => DataType::list(DataType::Json),
            Some(first) if items.iter().all(|t| t == first) => DataType::list(first.clone()),
            Some(_) => DataType::Tuple(items),
        }
    } else {
        DataType::Json
    }
}
