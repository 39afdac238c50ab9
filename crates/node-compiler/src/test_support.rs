//! Small operator set shared by the unit tests

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures::stream::{self, StreamExt};
use parking_lot::Mutex;
use serde_json::{json, Value};

use crate::descriptor::{Operation, OperatorDescriptor, OperatorRole, ScriptMode};
use crate::error::OperatorError;
use crate::graph::NodeConfig;
use crate::registry::{OperatorRegistry, RegistryBuilder};
use crate::types::{DataType, Signature, TypePattern};

/// Extension key of the shared item buffer filled by `collect`
pub const COLLECTOR: &str = "collector";
/// Extension key of the counter bumped when a `tracked` source is released
pub const RELEASES: &str = "releases";

/// Extension key of the list `tracked` sources append their id to on release
pub const RELEASE_LOG: &str = "release_log";

pub type Collected = Arc<Mutex<Vec<Value>>>;
pub type ReleaseLog = Arc<Mutex<Vec<String>>>;

pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn config_values(config: &NodeConfig, default: Value) -> Result<Vec<Value>, OperatorError> {
    match config.get("values").cloned().unwrap_or(default) {
        Value::Array(items) => Ok(items),
        other => Err(OperatorError::new(format!("'values' must be an array, got {}", other))),
    }
}

fn same() -> Signature {
    Signature::unary(TypePattern::Var("T"), TypePattern::Var("T"))
}

pub fn test_registry() -> OperatorRegistry {
    test_builder().build()
}

pub fn test_builder() -> RegistryBuilder {
    let descriptors = vec![
        OperatorDescriptor::new("numbers", OperatorRole::Source).with_operation(Operation::from_iter(
            "numbers",
            Signature::source(DataType::Int),
            |config| config_values(config, json!([1, 2, 3])),
        )),
        OperatorDescriptor::new("words", OperatorRole::Source).with_operation(Operation::from_iter(
            "words",
            Signature::source(DataType::Text),
            |config| config_values(config, json!(["a", "b"])),
        )),
        OperatorDescriptor::new("typed", OperatorRole::Source)
            .with_typing(|_, config| {
                config
                    .get_str("itemType")
                    .unwrap_or("json")
                    .parse::<DataType>()
                    .map_err(|e| e.to_string())
            })
            .with_operation(Operation::from_iter(
                "typed",
                Signature::source(DataType::Json),
                |config| match config.get("items") {
                    Some(Value::Array(items)) => Ok(items.clone()),
                    _ => Ok(Vec::new()),
                },
            )),
        OperatorDescriptor::new("double", OperatorRole::Transform).with_operation(Operation::map(
            "double",
            Signature::unary(DataType::Int, DataType::Int),
            |item, _| {
                item.as_i64()
                    .map(|n| json!(n * 2))
                    .ok_or_else(|| OperatorError::new(format!("not an int: {}", item)))
            },
        )),
        OperatorDescriptor::new("scale", OperatorRole::Transform)
            .with_operation(Operation::map(
                "scale-int",
                Signature::unary(DataType::Int, DataType::Int),
                |item, config| {
                    let factor = config.get_i64("factor").unwrap_or(2);
                    Ok(json!(item.as_i64().unwrap_or_default() * factor))
                },
            ))
            .with_operation(Operation::map(
                "scale-float",
                Signature::unary(DataType::Float, DataType::Float),
                |item, config| {
                    let factor = config.get_f64("factor").unwrap_or(2.0);
                    Ok(json!(item.as_f64().unwrap_or_default() * factor))
                },
            )),
        OperatorDescriptor::new("merge", OperatorRole::Combinator).with_operation(
            Operation::combinator(
                "merge",
                Signature::variadic(TypePattern::Var("T"), 1, TypePattern::Var("T")),
                |inputs, _| Ok(stream::select_all(inputs).boxed()),
            ),
        ),
        OperatorDescriptor::new("pair", OperatorRole::Combinator)
            .with_ports(2)
            .with_operation(Operation::combinator(
                "pair",
                Signature::fixed(
                    vec![TypePattern::Var("T"), TypePattern::Var("U")],
                    TypePattern::Tuple(vec![TypePattern::Var("T"), TypePattern::Var("U")]),
                ),
                |mut inputs, _| {
                    let right = inputs.pop().ok_or_else(|| OperatorError::new("missing input"))?;
                    let left = inputs.pop().ok_or_else(|| OperatorError::new("missing input"))?;
                    Ok(left
                        .zip(right)
                        .map(|(l, r)| -> Result<Value, OperatorError> {
                            let (l, r) = (l?, r?);
                            Ok(json!([l, r]))
                        })
                        .boxed())
                },
            )),
        OperatorDescriptor::new("collect", OperatorRole::Sink).with_operation(Operation::transform(
            "collect",
            same(),
            |input, ctx| {
                let key = ctx.config().get_str("collector").unwrap_or(COLLECTOR);
                let buffer = ctx.extensions().handle::<Collected>(key, "collector")?;
                Ok(input
                    .map(move |item| {
                        if let Ok(value) = &item {
                            buffer.lock().push(value.clone());
                        }
                        item
                    })
                    .boxed())
            },
        )),
        OperatorDescriptor::script("expression", ScriptMode::Map),
        OperatorDescriptor::script("condition", ScriptMode::Filter),
        OperatorDescriptor::new("fail", OperatorRole::Transform).with_operation(Operation::map(
            "fail",
            same(),
            |item, config| match config.get("value") {
                Some(bad) if *bad == item => Err(OperatorError::new(format!("refusing {}", item))),
                _ => Ok(item),
            },
        )),
        OperatorDescriptor::new("explode", OperatorRole::Transform).with_operation(Operation::map(
            "explode",
            same(),
            |item, config| {
                if config.get("value") == Some(&item) {
                    panic!("exploded on {}", item);
                }
                Ok(item)
            },
        )),
        OperatorDescriptor::new("tracked", OperatorRole::Source).with_operation(Operation::source(
            "tracked",
            Signature::source(DataType::Int),
            |ctx| {
                let counter = ctx.extensions().get::<Arc<AtomicUsize>>(RELEASES).cloned();
                let order = ctx.extensions().get::<ReleaseLog>(RELEASE_LOG).cloned();
                let node_id = ctx.node_id().to_string();
                ctx.on_release(move || {
                    if let Some(counter) = counter {
                        counter.fetch_add(1, Ordering::SeqCst);
                    }
                    if let Some(order) = order {
                        order.lock().push(node_id);
                    }
                });
                let values = config_values(ctx.config(), json!([1, 2, 3]))?;
                Ok(stream::iter(values.into_iter().map(Ok)).boxed())
            },
        )),
        OperatorDescriptor::new("ticker", OperatorRole::Source).with_operation(Operation::push_source(
            "ticker",
            Signature::source(DataType::Int),
            |emitter, config| {
                let limit = config.get_i64("count");
                let mut tick = 0;
                while limit.map_or(true, |limit| tick < limit) {
                    if !emitter.emit(json!(tick)) {
                        break;
                    }
                    tick += 1;
                    std::thread::sleep(Duration::from_millis(2));
                }
                Ok(())
            },
        )),
        OperatorDescriptor::new("ambiguous", OperatorRole::Transform)
            .with_operation(Operation::map("first", same(), |item, _| Ok(item)))
            .with_operation(Operation::map("second", same(), |item, _| Ok(item))),
        OperatorDescriptor::new("loose", OperatorRole::Transform)
            .with_typing(|_, _| Ok(DataType::Json))
            .with_operation(Operation::map(
                "loose-int",
                Signature::unary(DataType::Int, DataType::Json),
                |item, _| Ok(item),
            )),
    ];

    descriptors
        .into_iter()
        .try_fold(RegistryBuilder::new(), RegistryBuilder::register)
        .expect("test operators are valid")
}
