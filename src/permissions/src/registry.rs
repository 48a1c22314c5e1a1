//! Permission type registry
//!
//! Maps permission type names to host callbacks. Registration order is kept
//! because it is visible through [`TypeRegistry::valid_keys`].

use crate::callback::TypeCallback;
use crate::error::{PermissionError, Result};
use crate::types::{is_numeric_key, is_reserved, RESERVED_KEYS};
use indexmap::IndexMap;
use std::fmt;
use tracing::debug;

/// Name → callback registry for permission types
#[derive(Clone, Default)]
pub struct TypeRegistry {
    types: IndexMap<String, TypeCallback>,
}

impl TypeRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new permission type
    ///
    /// # Errors
    ///
    /// - `InvalidArgumentValue` if the name is empty, reserved or numeric
    /// - `PermissionTypeAlreadyExists` if the name is taken
    pub fn add(&mut self, name: &str, callback: TypeCallback) -> Result<()> {
        validate_name(name)?;
        if self.exists(name) {
            return Err(PermissionError::PermissionTypeAlreadyExists(name.to_string()));
        }

        self.types.insert(name.to_string(), callback);
        debug!("Registered permission type '{}'", name);
        Ok(())
    }

    /// Unregister a permission type
    pub fn remove(&mut self, name: &str) -> Result<()> {
        require_name(name)?;
        if self.types.shift_remove(name).is_none() {
            return Err(PermissionError::PermissionTypeNotRegistered(name.to_string()));
        }

        debug!("Removed permission type '{}'", name);
        Ok(())
    }

    /// Whether a permission type is registered
    pub fn exists(&self, name: &str) -> bool {
        self.types.contains_key(name)
    }

    /// Callback of a registered permission type
    pub fn get_callback(&self, name: &str) -> Result<TypeCallback> {
        require_name(name)?;
        self.types
            .get(name)
            .cloned()
            .ok_or_else(|| PermissionError::PermissionTypeNotRegistered(name.to_string()))
    }

    /// Swap the callback of a registered type, keeping its position
    pub fn set_callback(&mut self, name: &str, callback: TypeCallback) -> Result<()> {
        require_name(name)?;
        match self.types.get_mut(name) {
            Some(slot) => {
                *slot = callback;
                debug!("Replaced callback of permission type '{}'", name);
                Ok(())
            }
            None => Err(PermissionError::PermissionTypeNotRegistered(name.to_string())),
        }
    }

    /// Replace every registration at once
    ///
    /// All entries are validated before any is applied; on error the registry
    /// is left untouched.
    pub fn replace_all<I, S>(&mut self, types: I) -> Result<()>
    where
        I: IntoIterator<Item = (S, TypeCallback)>,
        S: Into<String>,
    {
        let mut staged: IndexMap<String, TypeCallback> = IndexMap::new();
        for (name, callback) in types {
            let name = name.into();
            validate_name(&name)?;
            if staged.contains_key(&name) {
                return Err(PermissionError::InvalidArgumentValue(format!(
                    "The type \"{}\" is listed more than once",
                    name
                )));
            }
            staged.insert(name, callback);
        }

        debug!("Replaced permission types: {} registered", staged.len());
        self.types = staged;
        Ok(())
    }

    /// Copy of every registration, in registration order
    pub fn get_all(&self) -> IndexMap<String, TypeCallback> {
        self.types.clone()
    }

    /// Registered names, in registration order
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.types.keys().map(String::as_str)
    }

    /// Every key a permission tree may contain: reserved keys, then types
    pub fn valid_keys(&self) -> Vec<String> {
        RESERVED_KEYS
            .iter()
            .map(|key| key.to_string())
            .chain(self.names().map(str::to_string))
            .collect()
    }

    /// Number of registered types
    pub fn len(&self) -> usize {
        self.types.len()
    }

    /// Whether no type is registered
    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }
}

impl fmt::Debug for TypeRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TypeRegistry")
            .field("types", &self.names().collect::<Vec<_>>())
            .finish()
    }
}

fn require_name(name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(PermissionError::InvalidArgumentValue(
            "The name parameter cannot be empty.".to_string(),
        ));
    }
    Ok(())
}

fn validate_name(name: &str) -> Result<()> {
    require_name(name)?;
    if is_reserved(name) {
        return Err(PermissionError::InvalidArgumentValue(format!(
            "The name \"{}\" is illegal. It cannot be one of the following values: {}",
            name,
            RESERVED_KEYS.join(",")
        )));
    }
    // Numeric keys are unwrapped as array indices and could never select the type
    if is_numeric_key(name) {
        return Err(PermissionError::InvalidArgumentValue(format!(
            "The name \"{}\" is illegal. Permission type names cannot be numeric",
            name
        )));
    }
    Ok(())
}
