//! Range Operator
//!
//! Emits a run of consecutive integers and completes.

use futures::{stream, StreamExt};
use node_compiler::{
    DataType, Operation, OperatorDefinition, OperatorDescriptor, OperatorError, OperatorRole,
    Signature,
};
use serde::{Deserialize, Serialize};
use serde_json::json;

/// Configuration for the range operator
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct RangeConfig {
    /// First value emitted
    pub start: i64,
    /// Number of values emitted
    pub count: u64,
    /// Distance between consecutive values
    pub step: i64,
}

impl Default for RangeConfig {
    fn default() -> Self {
        Self {
            start: 0,
            count: 10,
            step: 1,
        }
    }
}

impl RangeConfig {
    /// The `index`-th value, or `None` on overflow
    fn value_at(&self, index: u64) -> Option<i64> {
        let offset = i64::try_from(index).ok()?.checked_mul(self.step)?;
        self.start.checked_add(offset)
    }
}

/// Range Operator
///
/// `() -> int`. Emits `start, start + step, ...` until `count` values have
/// been produced. Values are generated lazily, so large counts cost nothing
/// up front.
pub struct RangeOperator;

impl RangeOperator {
    pub const ID: &'static str = "range";
}

impl OperatorDefinition for RangeOperator {
    fn descriptor() -> OperatorDescriptor {
        OperatorDescriptor::new(Self::ID, OperatorRole::Source)
            .with_label("Range")
            .with_description("Emits `count` consecutive integers starting at `start`")
            .with_operation(Operation::source(
                "range",
                Signature::source(DataType::Int),
                |ctx| {
                    let config: RangeConfig = crate::read_config(ctx.config(), Self::ID)?;
                    log::debug!(
                        "RangeOperator {}: emitting {} values from {}",
                        ctx.node_id(),
                        config.count,
                        config.start
                    );
                    Ok(stream::iter(0..config.count)
                        .map(move |index| {
                            config
                                .value_at(index)
                                .map(|value| json!(value))
                                .ok_or_else(|| OperatorError::new("range overflowed i64"))
                        })
                        .boxed())
                },
            ))
    }
}

inventory::submit!(node_compiler::OperatorFn(RangeOperator::descriptor));
