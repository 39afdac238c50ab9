//! Host objects handed to operators at activation
//!
//! Graph config is plain JSON, so anything live (a collector buffer, a
//! device handle, a client) travels separately: the host registers it by
//! name in an [`OperatorExtensions`] map attached to the compiled pipeline,
//! and operators look it up through
//! [`OperationContext::extensions`](crate::OperationContext::extensions).
//!
//! ```ignore
//! let collected = Arc::new(Mutex::new(Vec::<Item>::new()));
//! let pipeline = builder
//!     .compile(&graph)?
//!     .with_extensions(OperatorExtensions::new().with("samples", collected.clone()));
//!
//! // In an operation body, clone the handle once per activation:
//! let samples = ctx.extensions().handle::<Arc<Mutex<Vec<Item>>>>("samples", "sample buffer")?;
//! ```

use std::any::Any;
use std::collections::HashMap;

use crate::error::OperatorError;

/// Named runtime objects shared with every node of a pipeline
#[derive(Default)]
pub struct OperatorExtensions {
    objects: HashMap<String, Box<dyn Any + Send + Sync>>,
}

impl OperatorExtensions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `value` under `name`, replacing any previous object
    pub fn set<T: Send + Sync + 'static>(&mut self, name: &str, value: T) {
        self.objects.insert(name.to_string(), Box::new(value));
    }

    pub fn with<T: Send + Sync + 'static>(mut self, name: &str, value: T) -> Self {
        self.set(name, value);
        self
    }

    /// The object registered under `name`, if it has type `T`
    pub fn get<T: Send + Sync + 'static>(&self, name: &str) -> Option<&T> {
        self.objects.get(name).and_then(|value| value.downcast_ref())
    }

    /// Clone of a shared handle an operator cannot run without
    ///
    /// `what` names the object in the activation error, e.g. `"collector"`.
    pub fn handle<T: Clone + Send + Sync + 'static>(
        &self,
        name: &str,
        what: &str,
    ) -> Result<T, OperatorError> {
        self.get::<T>(name)
            .cloned()
            .ok_or_else(|| OperatorError::new(format!("no {} '{}' installed", what, name)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use serde_json::{json, Value};
    use std::sync::Arc;

    type Buffer = Arc<Mutex<Vec<Value>>>;

    #[test]
    fn test_handles_share_state_with_the_host() {
        let buffer: Buffer = Arc::new(Mutex::new(Vec::new()));
        let extensions = OperatorExtensions::new().with("out", buffer.clone());

        let handle = extensions.handle::<Buffer>("out", "buffer").unwrap();
        handle.lock().push(json!(1));
        assert_eq!(*buffer.lock(), vec![json!(1)]);
    }

    #[test]
    fn test_missing_or_mistyped_handle() {
        let mut extensions = OperatorExtensions::new();
        extensions.set("out", 42u32);

        let err = extensions.handle::<Buffer>("out", "buffer").unwrap_err();
        assert_eq!(err.message(), "no buffer 'out' installed");
        assert!(extensions.handle::<Buffer>("other", "buffer").is_err());
        assert_eq!(extensions.get::<u32>("out"), Some(&42));
    }
}
