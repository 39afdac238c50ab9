//! Registry and extensions setup for host applications.
//!
//! Hosts call [`builtin_registry`] at startup to freeze every operator of
//! this crate into an [`OperatorRegistry`], and [`setup_extensions`] to
//! install the runtime objects the built-in sinks look up. This keeps host
//! crates from having to know the extension keys.

use node_compiler::{OperatorExtensions, OperatorRegistry, RegistryBuilder, RegistryError};

use crate::sink::{Collector, DEFAULT_COLLECTOR};

/// Build a registry holding every built-in operator
///
/// # Example
///
/// ```ignore
/// let registry = node_operators::builtin_registry()?;
/// node_compiler::install_global(registry)?;
/// ```
pub fn builtin_registry() -> Result<OperatorRegistry, RegistryError> {
    let registry = RegistryBuilder::new().with_builtins()?.build();
    log::info!("Built-in registry ready with {} operators", registry.len());
    Ok(registry)
}

/// Install the default collector used by `collect` nodes
///
/// Returns a handle sharing the collector's buffer.
pub fn setup_extensions(extensions: &mut OperatorExtensions) -> Collector {
    install_collector(extensions, DEFAULT_COLLECTOR)
}

/// Install a named collector, for `collect` nodes configured with
/// `"collector": name`
///
/// An existing collector under the same name is kept and shared.
pub fn install_collector(extensions: &mut OperatorExtensions, name: &str) -> Collector {
    if let Some(existing) = extensions.get::<Collector>(name) {
        return existing.clone();
    }
    let collector = Collector::new();
    extensions.set(name, collector.clone());
    log::debug!("Installed collector '{}'", name);
    collector
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_setup_installs_default_collector() {
        let mut extensions = OperatorExtensions::new();
        let collector = setup_extensions(&mut extensions);

        extensions
            .get::<Collector>(DEFAULT_COLLECTOR)
            .unwrap()
            .push(json!(1));
        assert_eq!(collector.items(), vec![json!(1)]);
    }

    #[test]
    fn test_install_collector_reuses_existing() {
        let mut extensions = OperatorExtensions::new();
        let first = install_collector(&mut extensions, "evens");
        first.push(json!(2));
        let second = install_collector(&mut extensions, "evens");
        assert_eq!(second.len(), 1);
    }
}
