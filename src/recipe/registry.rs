//! Recipe registry
//!
//! Maps recipe names to handlers and their options behind a single
//! reader/writer lock. Lookups clone the handler `Arc` out before the lock is
//! released, so no lock is ever held across a handler invocation.
//!
//! Registering while a batch is running is allowed: only tasks whose lookup
//! happens after the registration observe the new handler.

use std::collections::HashMap;

use parking_lot::RwLock;
use thiserror::Error;
use tracing::debug;

use super::{RecipeOptions, RecipeRef};

/// Errors related to recipe registration
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RegistryError {
    /// Recipe names must be non-empty
    #[error("recipe name cannot be empty")]
    EmptyName,

    /// Strict registration found an existing recipe with this name
    #[error("recipe '{0}' is already registered")]
    AlreadyRegistered(String),
}

/// A handler together with its registration options
#[derive(Clone)]
pub struct RecipeEntry {
    /// The recipe handler
    pub handler: RecipeRef,
    /// Options supplied at registration
    pub options: RecipeOptions,
}

impl std::fmt::Debug for RecipeEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RecipeEntry")
            .field("handler", &"dyn Recipe")
            .field("options", &self.options)
            .finish()
    }
}

/// Thread-safe registry of recipes
#[derive(Default)]
pub struct RecipeRegistry {
    recipes: RwLock<HashMap<String, RecipeEntry>>,
}

impl RecipeRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a recipe, replacing any existing recipe of the same name
    pub fn register(
        &self,
        name: impl Into<String>,
        handler: RecipeRef,
        options: RecipeOptions,
    ) -> Result<(), RegistryError> {
        let name = validate_name(name.into())?;

        let replaced = self
            .recipes
            .write()
            .insert(name.clone(), RecipeEntry { handler, options })
            .is_some();

        debug!(recipe = %name, replaced, "Registered recipe");
        Ok(())
    }

    /// Register a recipe, failing if the name is already taken.
    ///
    /// The registry is left untouched on failure.
    pub fn register_strict(
        &self,
        name: impl Into<String>,
        handler: RecipeRef,
        options: RecipeOptions,
    ) -> Result<(), RegistryError> {
        let name = validate_name(name.into())?;

        let mut recipes = self.recipes.write();
        if recipes.contains_key(&name) {
            return Err(RegistryError::AlreadyRegistered(name));
        }
        recipes.insert(name.clone(), RecipeEntry { handler, options });
        drop(recipes);

        debug!(recipe = %name, "Registered recipe (strict)");
        Ok(())
    }

    /// Look up a recipe by name
    pub fn lookup(&self, name: &str) -> Option<RecipeEntry> {
        self.recipes.read().get(name).cloned()
    }

    /// Check whether a recipe is registered
    pub fn contains(&self, name: &str) -> bool {
        self.recipes.read().contains_key(name)
    }

    /// List registered recipe names, sorted
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.recipes.read().keys().cloned().collect();
        names.sort();
        names
    }

    /// Number of registered recipes
    pub fn len(&self) -> usize {
        self.recipes.read().len()
    }

    /// Whether no recipe is registered
    pub fn is_empty(&self) -> bool {
        self.recipes.read().is_empty()
    }
}

impl std::fmt::Debug for RecipeRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RecipeRegistry")
            .field("recipes", &self.names())
            .finish()
    }
}

fn validate_name(name: String) -> Result<String, RegistryError> {
    if name.is_empty() {
        return Err(RegistryError::EmptyName);
    }
    Ok(name)
}
