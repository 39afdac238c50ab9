//! Data types flowing through edges, and the signature patterns operators
//! declare against them.
//!
//! Operators describe the shapes they accept with [`TypePattern`]s that may
//! contain generic variables. Binding a [`Signature`] against the concrete
//! types arriving on a node's inputs yields the node's output type plus a
//! cost used to rank overloads.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// The type of the items carried by an edge
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub enum DataType {
    /// Signal-only items with no payload
    Unit,
    Bool,
    /// 64-bit signed integer
    Int,
    /// 64-bit float
    Float,
    /// UTF-8 text
    Text,
    /// Arbitrary JSON; every type is assignable to it
    Json,
    /// Homogeneous list
    List(Box<DataType>),
    /// Fixed-size heterogeneous tuple (carried as a JSON array)
    Tuple(Vec<DataType>),
}

impl DataType {
    pub fn list(item: DataType) -> Self {
        Self::List(Box::new(item))
    }

    pub fn tuple(items: impl IntoIterator<Item = DataType>) -> Self {
        Self::Tuple(items.into_iter().collect())
    }

    pub fn is_numeric(&self) -> bool {
        matches!(self, Self::Int | Self::Float)
    }

    /// Check whether a value of this type can flow into a port of `target` type
    pub fn is_assignable_to(&self, target: &DataType) -> bool {
        self.conversion_cost(target).is_some()
    }

    /// Cost of using this type where `target` is expected
    ///
    /// `0` for identity, `2` for numeric widening, `3` for erasure to json.
    pub(crate) fn conversion_cost(&self, target: &DataType) -> Option<u32> {
        if self == target {
            return Some(0);
        }
        match (self, target) {
            (_, DataType::Json) => Some(3),
            (DataType::Int, DataType::Float) => Some(2),
            (DataType::List(a), DataType::List(b)) => a.conversion_cost(b),
            (DataType::Tuple(a), DataType::Tuple(b)) if a.len() == b.len() => a
                .iter()
                .zip(b)
                .map(|(x, y)| x.conversion_cost(y))
                .sum(),
            _ => None,
        }
    }

    /// A representative value of this type, used to probe expressions
    pub fn sample_value(&self) -> serde_json::Value {
        use serde_json::json;
        match self {
            DataType::Unit => serde_json::Value::Null,
            DataType::Bool => json!(true),
            DataType::Int => json!(1),
            DataType::Float => json!(1.5),
            DataType::Text => json!("sample"),
            DataType::Json => json!({}),
            DataType::List(item) => json!([item.sample_value()]),
            DataType::Tuple(items) => {
                serde_json::Value::Array(items.iter().map(|t| t.sample_value()).collect())
            }
        }
    }

    /// Check whether a runtime value conforms to this type
    pub fn admits(&self, value: &serde_json::Value) -> bool {
        use serde_json::Value;
        match (self, value) {
            (DataType::Json, _) => true,
            (DataType::Unit, Value::Null) => true,
            (DataType::Bool, Value::Bool(_)) => true,
            (DataType::Int, Value::Number(n)) => n.is_i64() || n.is_u64(),
            (DataType::Float, Value::Number(_)) => true,
            (DataType::Text, Value::String(_)) => true,
            (DataType::List(item), Value::Array(values)) => values.iter().all(|v| item.admits(v)),
            (DataType::Tuple(items), Value::Array(values)) => {
                items.len() == values.len() && items.iter().zip(values).all(|(t, v)| t.admits(v))
            }
            _ => false,
        }
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DataType::Unit => write!(f, "unit"),
            DataType::Bool => write!(f, "bool"),
            DataType::Int => write!(f, "int"),
            DataType::Float => write!(f, "float"),
            DataType::Text => write!(f, "text"),
            DataType::Json => write!(f, "json"),
            DataType::List(item) => write!(f, "list<{}>", item),
            DataType::Tuple(items) => {
                write!(f, "(")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", item)?;
                }
                write!(f, ")")
            }
        }
    }
}

/// Error parsing a textual type
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Invalid type '{input}': {message}")]
pub struct ParseTypeError {
    pub input: String,
    pub message: String,
}

impl FromStr for DataType {
    type Err = ParseTypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut parser = TypeParser {
            input: s,
            pos: 0,
            depth: 0,
        };
        let ty = parser.parse_type()?;
        parser.skip_ws();
        if parser.pos != s.len() {
            return Err(parser.error("trailing characters"));
        }
        Ok(ty)
    }
}

impl From<DataType> for String {
    fn from(ty: DataType) -> Self {
        ty.to_string()
    }
}

impl TryFrom<String> for DataType {
    type Error = ParseTypeError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

/// Deepest `list<..>` / tuple nesting a type name may have
const MAX_TYPE_DEPTH: usize = 64;

struct TypeParser<'a> {
    input: &'a str,
    pos: usize,
    depth: usize,
}

impl<'a> TypeParser<'a> {
    fn error(&self, message: &str) -> ParseTypeError {
        ParseTypeError {
            input: self.input.to_string(),
            message: format!("{} at offset {}", message, self.pos),
        }
    }

    fn skip_ws(&mut self) {
        let rest = &self.input[self.pos..];
        self.pos += rest.len() - rest.trim_start().len();
    }

    fn eat(&mut self, c: char) -> bool {
        self.skip_ws();
        if self.input[self.pos..].starts_with(c) {
            self.pos += c.len_utf8();
            true
        } else {
            false
        }
    }

    fn ident(&mut self) -> &'a str {
        self.skip_ws();
        let input = self.input;
        let rest = &input[self.pos..];
        let len = rest
            .find(|c: char| !c.is_ascii_alphanumeric() && c != '_')
            .unwrap_or(rest.len());
        self.pos += len;
        &rest[..len]
    }

    fn parse_type(&mut self) -> Result<DataType, ParseTypeError> {
        if self.depth >= MAX_TYPE_DEPTH {
            return Err(self.error("type nesting too deep"));
        }
        self.depth += 1;
        let parsed = self.parse_shape();
        self.depth -= 1;
        parsed
    }

    fn parse_shape(&mut self) -> Result<DataType, ParseTypeError> {
        if self.eat('(') {
            let mut items = Vec::new();
            if !self.eat(')') {
                loop {
                    items.push(self.parse_type()?);
                    if self.eat(')') {
                        break;
                    }
                    if !self.eat(',') {
                        return Err(self.error("expected ',' or ')'"));
                    }
                }
            }
            return Ok(DataType::Tuple(items));
        }

        match self.ident() {
            "unit" => Ok(DataType::Unit),
            "bool" => Ok(DataType::Bool),
            "int" => Ok(DataType::Int),
            "float" => Ok(DataType::Float),
            "text" => Ok(DataType::Text),
            "json" => Ok(DataType::Json),
            "list" => {
                if !self.eat('<') {
                    return Err(self.error("expected '<' after list"));
                }
                let item = self.parse_type()?;
                if !self.eat('>') {
                    return Err(self.error("expected '>'"));
                }
                Ok(DataType::list(item))
            }
            "" => Err(self.error("expected a type")),
            other => Err(self.error(&format!("unknown type '{}'", other))),
        }
    }
}

/// A shape an operator accepts or produces, possibly generic
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum TypePattern {
    /// A concrete type; accepts anything assignable to it
    Exact(DataType),
    /// A generic variable bound to the first type it meets
    Var(&'static str),
    /// A generic variable restricted to `int` or `float`
    Numeric(&'static str),
    List(Box<TypePattern>),
    Tuple(Vec<TypePattern>),
}

impl TypePattern {
    pub fn list(item: TypePattern) -> Self {
        Self::List(Box::new(item))
    }

    /// Bind this pattern against a concrete type, extending `bindings`
    ///
    /// Returns the cost of the match, or `None` when the type does not fit.
    fn bind(&self, actual: &DataType, bindings: &mut TypeBindings) -> Option<u32> {
        match self {
            TypePattern::Exact(expected) => actual.conversion_cost(expected),
            TypePattern::Numeric(_) if !actual.is_numeric() => None,
            TypePattern::Var(name) | TypePattern::Numeric(name) => match bindings.get(name) {
                Some(bound) => actual.conversion_cost(bound),
                None => {
                    bindings.insert(name, actual.clone());
                    Some(1)
                }
            },
            TypePattern::List(item) => match actual {
                DataType::List(actual_item) => item.bind(actual_item, bindings),
                _ => None,
            },
            TypePattern::Tuple(items) => match actual {
                DataType::Tuple(actual_items) if actual_items.len() == items.len() => items
                    .iter()
                    .zip(actual_items)
                    .map(|(p, t)| p.bind(t, bindings))
                    .sum(),
                _ => None,
            },
        }
    }

    /// Replace variables with their bound types
    fn substitute(&self, bindings: &TypeBindings) -> Option<DataType> {
        match self {
            TypePattern::Exact(ty) => Some(ty.clone()),
            TypePattern::Var(name) | TypePattern::Numeric(name) => bindings.get(name).cloned(),
            TypePattern::List(item) => item.substitute(bindings).map(DataType::list),
            TypePattern::Tuple(items) => items
                .iter()
                .map(|p| p.substitute(bindings))
                .collect::<Option<Vec<_>>>()
                .map(DataType::Tuple),
        }
    }
}

impl From<DataType> for TypePattern {
    fn from(ty: DataType) -> Self {
        TypePattern::Exact(ty)
    }
}

impl fmt::Display for TypePattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TypePattern::Exact(ty) => write!(f, "{}", ty),
            TypePattern::Var(name) => write!(f, "{}", name),
            TypePattern::Numeric(name) => write!(f, "{}: number", name),
            TypePattern::List(item) => write!(f, "list<{}>", item),
            TypePattern::Tuple(items) => {
                let parts: Vec<String> = items.iter().map(|p| p.to_string()).collect();
                write!(f, "({})", parts.join(", "))
            }
        }
    }
}

/// Generic variable bindings, ordered for deterministic output
pub type TypeBindings = BTreeMap<&'static str, DataType>;

/// Input arity of a signature
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Arity {
    /// One pattern per input position
    Fixed(Vec<TypePattern>),
    /// Any number of inputs (at least `min`) matching the same pattern
    Variadic { item: TypePattern, min: usize },
}

/// A successful signature binding
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Binding {
    pub output: DataType,
    pub bindings: TypeBindings,
    /// Lower is more specific
    pub cost: u32,
}

/// The type-level contract of one operation
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Signature {
    pub inputs: Arity,
    pub output: TypePattern,
}

impl Signature {
    /// `() -> output`
    pub fn source(output: impl Into<TypePattern>) -> Self {
        Self {
            inputs: Arity::Fixed(Vec::new()),
            output: output.into(),
        }
    }

    /// `(input) -> output`
    pub fn unary(input: impl Into<TypePattern>, output: impl Into<TypePattern>) -> Self {
        Self {
            inputs: Arity::Fixed(vec![input.into()]),
            output: output.into(),
        }
    }

    /// `(inputs...) -> output` with a fixed number of positions
    pub fn fixed(inputs: Vec<TypePattern>, output: impl Into<TypePattern>) -> Self {
        Self {
            inputs: Arity::Fixed(inputs),
            output: output.into(),
        }
    }

    /// `(item, item, ...) -> output` with at least `min` inputs
    pub fn variadic(item: impl Into<TypePattern>, min: usize, output: impl Into<TypePattern>) -> Self {
        Self {
            inputs: Arity::Variadic {
                item: item.into(),
                min,
            },
            output: output.into(),
        }
    }

    pub fn accepts_arity(&self, count: usize) -> bool {
        match &self.inputs {
            Arity::Fixed(patterns) => patterns.len() == count,
            Arity::Variadic { min, .. } => count >= *min,
        }
    }

    /// Bind this signature against the concrete input types
    pub fn bind(&self, inputs: &[DataType]) -> Option<Binding> {
        if !self.accepts_arity(inputs.len()) {
            return None;
        }
        let mut bindings = TypeBindings::new();
        let mut cost = 0;
        for (index, actual) in inputs.iter().enumerate() {
            let pattern = match &self.inputs {
                Arity::Fixed(patterns) => &patterns[index],
                Arity::Variadic { item, .. } => item,
            };
            cost += pattern.bind(actual, &mut bindings)?;
        }
        let output = self.output.substitute(&bindings)?;
        Some(Binding {
            output,
            bindings,
            cost,
        })
    }
}

impl fmt::Display for Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.inputs {
            Arity::Fixed(patterns) => {
                let parts: Vec<String> = patterns.iter().map(|p| p.to_string()).collect();
                write!(f, "({}) -> {}", parts.join(", "), self.output)
            }
            Arity::Variadic { item, .. } => write!(f, "({}...) -> {}", item, self.output),
        }
    }
}
