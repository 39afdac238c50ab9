//! Operator registry
//!
//! Maps operator ids to their descriptors. A registry is assembled with a
//! [`RegistryBuilder`] during start-up and frozen into an immutable
//! [`OperatorRegistry`]; compilation only ever reads it.
//!
//! # Usage
//!
//! ```ignore
//! use node_compiler::{OperatorRegistry, RegistryBuilder};
//!
//! let registry = RegistryBuilder::new()
//!     .with_builtins()?          // everything submitted via `inventory`
//!     .register(MyOperator::descriptor())?
//!     .build();
//!
//! node_compiler::install_global(registry)?;
//! ```

use std::collections::HashMap;
use std::sync::Arc;

use once_cell::sync::OnceCell;

use crate::descriptor::{OperatorDescriptor, OperatorFn, OperatorRole};
use crate::error::RegistryError;

/// Mutable registry used during the initialization phase
#[derive(Default)]
pub struct RegistryBuilder {
    entries: HashMap<String, Arc<OperatorDescriptor>>,
    order: Vec<String>,
}

impl RegistryBuilder {
    /// Create a new empty builder
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an operator descriptor
    pub fn register(mut self, descriptor: OperatorDescriptor) -> Result<Self, RegistryError> {
        self.insert(descriptor)?;
        Ok(self)
    }

    fn insert(&mut self, descriptor: OperatorDescriptor) -> Result<(), RegistryError> {
        if self.entries.contains_key(&descriptor.id) {
            return Err(RegistryError::Duplicate(descriptor.id));
        }
        descriptor.validate()?;
        log::debug!("Registered operator '{}' ({})", descriptor.id, descriptor.role);
        self.order.push(descriptor.id.clone());
        self.entries.insert(descriptor.id.clone(), Arc::new(descriptor));
        Ok(())
    }

    /// Register every descriptor submitted through `inventory`
    ///
    /// Descriptors are registered sorted by id so the result does not
    /// depend on link order.
    pub fn with_builtins(mut self) -> Result<Self, RegistryError> {
        let mut descriptors: Vec<OperatorDescriptor> =
            inventory::iter::<OperatorFn>().map(|f| (f.0)()).collect();
        descriptors.sort_by(|a, b| a.id.cmp(&b.id));
        for descriptor in descriptors {
            self.insert(descriptor)?;
        }
        Ok(self)
    }

    /// Merge another builder into this one
    ///
    /// Fails on the first id both builders define.
    pub fn merge(mut self, other: RegistryBuilder) -> Result<Self, RegistryError> {
        let RegistryBuilder { mut entries, order } = other;
        for id in order {
            if let Some(descriptor) = entries.remove(&id) {
                if self.entries.contains_key(&id) {
                    return Err(RegistryError::Duplicate(id));
                }
                self.order.push(id.clone());
                self.entries.insert(id, descriptor);
            }
        }
        Ok(self)
    }

    /// Freeze into an immutable registry
    pub fn build(self) -> OperatorRegistry {
        OperatorRegistry {
            entries: self.entries,
            order: self.order,
        }
    }
}

/// Immutable operator registry
///
/// Read-only after construction; safe to share across threads without
/// locking.
pub struct OperatorRegistry {
    entries: HashMap<String, Arc<OperatorDescriptor>>,
    order: Vec<String>,
}

impl OperatorRegistry {
    /// Look up an operator by id
    pub fn lookup(&self, id: &str) -> Result<Arc<OperatorDescriptor>, RegistryError> {
        self.entries
            .get(id)
            .cloned()
            .ok_or_else(|| RegistryError::NotFound(id.to_string()))
    }

    /// Check if an operator is registered
    pub fn contains(&self, id: &str) -> bool {
        self.entries.contains_key(id)
    }

    /// Registered ids, in registration order
    pub fn operator_ids(&self) -> Vec<&str> {
        self.order.iter().map(String::as_str).collect()
    }

    /// Descriptors of one role, in registration order
    pub fn descriptors_by_role(&self, role: OperatorRole) -> Vec<Arc<OperatorDescriptor>> {
        self.order
            .iter()
            .filter_map(|id| self.entries.get(id))
            .filter(|d| d.role == role)
            .cloned()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

static GLOBAL: OnceCell<Arc<OperatorRegistry>> = OnceCell::new();

/// Install the process-wide registry
///
/// Can only happen once; later calls fail with
/// [`RegistryError::AlreadyInstalled`].
pub fn install_global(registry: OperatorRegistry) -> Result<Arc<OperatorRegistry>, RegistryError> {
    let registry = Arc::new(registry);
    GLOBAL
        .set(registry.clone())
        .map_err(|_| RegistryError::AlreadyInstalled)?;
    log::info!("Installed global operator registry with {} operators", registry.len());
    Ok(registry)
}

/// The process-wide registry, if one has been installed
pub fn global() -> Option<Arc<OperatorRegistry>> {
    GLOBAL.get().cloned()
}
