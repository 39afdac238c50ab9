//! Scale Operator
//!
//! Multiplies numeric items by a constant factor.

use futures::StreamExt;
use node_compiler::{
    DataType, Operation, OperatorDefinition, OperatorDescriptor, OperatorError, OperatorRole,
    Signature,
};
use serde::{Deserialize, Serialize};
use serde_json::json;

use super::{expect_f64, expect_i64};

/// Configuration for the scale operator
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScaleConfig {
    /// Multiplier; must be integral when scaling ints
    pub factor: f64,
}

impl Default for ScaleConfig {
    fn default() -> Self {
        Self { factor: 2.0 }
    }
}

impl ScaleConfig {
    fn int_factor(&self) -> Result<i64, OperatorError> {
        if self.factor.fract() != 0.0 || !self.factor.is_finite() {
            return Err(OperatorError::new(format!(
                "factor {} cannot scale ints",
                self.factor
            )));
        }
        Ok(self.factor as i64)
    }
}

/// Scale Operator
///
/// Two overloads: `(int) -> int` and `(float) -> float`. Int streams pick
/// the int overload; scaling ints by a fractional factor needs an explicit
/// conversion upstream.
pub struct ScaleOperator;

impl ScaleOperator {
    pub const ID: &'static str = "scale";
}

impl OperatorDefinition for ScaleOperator {
    fn descriptor() -> OperatorDescriptor {
        OperatorDescriptor::new(Self::ID, OperatorRole::Transform)
            .with_label("Scale")
            .with_description("Multiplies each number by `factor`")
            .with_operation(Operation::transform(
                "scale-int",
                Signature::unary(DataType::Int, DataType::Int),
                |input, ctx| {
                    let config: ScaleConfig = crate::read_config(ctx.config(), Self::ID)?;
                    let factor = config.int_factor()?;
                    Ok(input
                        .map(move |item| {
                            let value = expect_i64(&item?)?;
                            value
                                .checked_mul(factor)
                                .map(|scaled| json!(scaled))
                                .ok_or_else(|| {
                                    OperatorError::new(format!("{} * {} overflows", value, factor))
                                })
                        })
                        .boxed())
                },
            ))
            .with_operation(Operation::transform(
                "scale-float",
                Signature::unary(DataType::Float, DataType::Float),
                |input, ctx| {
                    let config: ScaleConfig = crate::read_config(ctx.config(), Self::ID)?;
                    let factor = config.factor;
                    Ok(input
                        .map(move |item| Ok::<_, OperatorError>(json!(expect_f64(&item?)? * factor)))
                        .boxed())
                },
            ))
    }
}

inventory::submit!(node_compiler::OperatorFn(ScaleOperator::descriptor));

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{compile, linear, run};
    use node_compiler::CompileError;

    #[test]
    fn test_int_factor() {
        assert_eq!(ScaleConfig::default().int_factor().unwrap(), 2);
        assert_eq!(ScaleConfig { factor: -3.0 }.int_factor().unwrap(), -3);
        assert!(ScaleConfig { factor: 0.5 }.int_factor().is_err());
        assert!(ScaleConfig { factor: f64::NAN }.int_factor().is_err());
    }

    #[test]
    fn test_overload_follows_input_type() {
        let mut graph = linear("range", "scale");
        graph.set_config("src", "count", json!(1));
        let described = compile(&graph).unwrap().describe();
        assert!(described.contains("scale::scale-int (int) -> int"), "{}", described);

        let mut graph = linear("values", "scale");
        graph.set_config("src", "items", json!([0.5]));
        let described = compile(&graph).unwrap().describe();
        assert!(described.contains("scale::scale-float (float) -> float"), "{}", described);
    }

    #[test]
    fn test_text_is_rejected() {
        let mut graph = linear("values", "scale");
        graph.set_config("src", "items", json!(["a"]));
        let err = compile(&graph).unwrap_err();
        assert!(matches!(
            &err.errors()[0],
            CompileError::TypeMismatch { node_id, .. } if node_id == "op"
        ));
    }

    #[tokio::test]
    async fn test_scales_ints_and_floats() {
        let mut graph = linear("range", "scale");
        graph.set_config("src", "count", json!(3));
        graph.set_config("op", "factor", json!(10));
        let (_, items) = run(&graph).await;
        assert_eq!(items, vec![json!(0), json!(10), json!(20)]);

        let mut graph = linear("values", "scale");
        graph.set_config("src", "items", json!([1.5, 2.5]));
        let (_, items) = run(&graph).await;
        assert_eq!(items, vec![json!(3.0), json!(5.0)]);
    }

    #[tokio::test]
    async fn test_fractional_factor_on_ints_fails() {
        let mut graph = linear("range", "scale");
        graph.set_config("op", "factor", json!(0.5));
        let (outcome, items) = run(&graph).await;
        let err = outcome.unwrap_err();
        assert_eq!(err.originating_node_id, "op");
        assert_eq!(err.inner_message, "factor 0.5 cannot scale ints");
        assert!(items.is_empty());
    }
}
