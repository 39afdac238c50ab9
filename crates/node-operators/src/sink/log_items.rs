//! Log Operator
//!
//! Writes every item to the `log` facade and passes it on.

use std::str::FromStr;

use futures::StreamExt;
use node_compiler::{Operation, OperatorDefinition, OperatorDescriptor, OperatorError, OperatorRole};
use serde::{Deserialize, Serialize};

use crate::transform::passthrough;

/// Configuration for the log operator
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    /// Level items are logged at (`error` through `trace`)
    pub level: String,
    /// Prefix for each line; the node id when absent
    pub label: Option<String>,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            label: None,
        }
    }
}

pub struct LogOperator;

impl LogOperator {
    pub const ID: &'static str = "log";
}

impl OperatorDefinition for LogOperator {
    fn descriptor() -> OperatorDescriptor {
        OperatorDescriptor::new(Self::ID, OperatorRole::Sink)
            .with_label("Log")
            .with_description("Logs each item and passes it through")
            .with_operation(Operation::transform("log", passthrough(), |input, ctx| {
                let config: LogConfig = crate::read_config(ctx.config(), Self::ID)?;
                let level = log::Level::from_str(&config.level)
                    .map_err(|_| OperatorError::new(format!("invalid log level '{}'", config.level)))?;
                let label = config.label.unwrap_or_else(|| ctx.node_id().to_string());
                Ok(input
                    .map(move |item| {
                        if let Ok(value) = &item {
                            log::log!(target: "node_operators::log", level, "[{}] {}", label, value);
                        }
                        item
                    })
                    .boxed())
            }))
    }
}

inventory::submit!(node_compiler::OperatorFn(LogOperator::descriptor));
