//! Model property registry.
//!
//! The coordinator never owns model definitions; it only asks a
//! [`PropertyRegistry`] for the id field and the semantic kind of each
//! property so that adapters can decide how to transcode values.
//! [`ModelRegistry`] is a plain in-memory implementation.

use std::collections::HashMap;

/// Semantic type of a model property.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PropertyKind {
    Text,
    Number,
    Boolean,
    Date,
    /// Structured or otherwise unknown values.
    Opaque,
}

/// Describes a single model property.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PropertyDescriptor {
    pub kind: PropertyKind,
}

impl PropertyDescriptor {
    pub fn new(kind: PropertyKind) -> Self {
        Self { kind }
    }
}

/// Read-only lookup of model properties.
pub trait PropertyRegistry: Send + Sync + std::fmt::Debug {
    /// Returns the descriptor for `field` on `model`, if the field is declared.
    fn property(&self, model: &str, field: &str) -> Option<PropertyDescriptor>;

    /// Returns the declared property names of `model`, in declaration order.
    fn properties(&self, model: &str) -> Vec<String>;

    /// Returns the name of the identifier field of `model`.
    fn id_name(&self, model: &str) -> String;

    /// Returns the kind of the identifier of `model`.
    ///
    /// Defaults to [`PropertyKind::Number`] when the id property is not declared.
    fn id_kind(&self, model: &str) -> PropertyKind {
        self.property(model, &self.id_name(model))
            .map(|descriptor| descriptor.kind)
            .unwrap_or(PropertyKind::Number)
    }
}

/// Definition of one model: its id field and declared properties.
#[derive(Debug, Clone)]
pub struct ModelDefinition {
    name: String,
    id_name: String,
    properties: Vec<(String, PropertyDescriptor)>,
}

impl ModelDefinition {
    /// Starts a definition for `name` with an `id` identifier field.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            id_name: "id".to_string(),
            properties: Vec::new(),
        }
    }

    /// Renames the identifier field.
    pub fn id_name(mut self, id_name: impl Into<String>) -> Self {
        self.id_name = id_name.into();
        self
    }

    /// Declares a property. Redeclaring a property replaces its kind.
    pub fn property(mut self, field: impl Into<String>, kind: PropertyKind) -> Self {
        let field = field.into();
        let descriptor = PropertyDescriptor::new(kind);

        match self.properties.iter_mut().find(|(name, _)| *name == field) {
            Some((_, existing)) => *existing = descriptor,
            None => self.properties.push((field, descriptor)),
        }

        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

/// In-memory [`PropertyRegistry`].
///
/// Unknown models resolve to an `id` identifier field and no declared
/// properties, so every value of theirs is transcoded as opaque.
#[derive(Debug, Clone, Default)]
pub struct ModelRegistry {
    models: HashMap<String, ModelDefinition>,
}

impl ModelRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers (or replaces) a model definition.
    pub fn define(mut self, definition: ModelDefinition) -> Self {
        self.models.insert(definition.name.clone(), definition);
        self
    }

    pub fn model(&self, name: &str) -> Option<&ModelDefinition> {
        self.models.get(name)
    }
}

impl PropertyRegistry for ModelRegistry {
    fn property(&self, model: &str, field: &str) -> Option<PropertyDescriptor> {
        self.models
            .get(model)?
            .properties
            .iter()
            .find(|(name, _)| name == field)
            .map(|(_, descriptor)| *descriptor)
    }

    fn properties(&self, model: &str) -> Vec<String> {
        self.models
            .get(model)
            .map(|definition| {
                definition
                    .properties
                    .iter()
                    .map(|(name, _)| name.clone())
                    .collect()
            })
            .unwrap_or_default()
    }

    fn id_name(&self, model: &str) -> String {
        self.models
            .get(model)
            .map(|definition| definition.id_name.clone())
            .unwrap_or_else(|| "id".to_string())
    }
}
