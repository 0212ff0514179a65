//! JSON backed models with explicit per-field setters.

use std::{
    collections::HashMap,
    rc::Rc,
    sync::atomic::{AtomicU64, Ordering},
};

use serde_json::{Map, Value};
use shared::domain::{ResourceId, HREF_FIELDS, IDENTITY_FIELDS};

use crate::error::{Result, ViewError};

static NEXT_CID: AtomicU64 = AtomicU64::new(1);

pub type Setter = Rc<dyn Fn(&mut Map<String, Value>, Value) -> Result<()>>;

/// Field name to setter mapping. Fields without a setter are stored as given.
#[derive(Clone, Default)]
pub struct FieldSetters {
    setters: HashMap<String, Setter>,
}

impl FieldSetters {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with<F>(mut self, field: &str, setter: F) -> Self
    where
        F: Fn(&mut Map<String, Value>, Value) -> Result<()> + 'static,
    {
        self.setters.insert(field.to_string(), Rc::new(setter));
        self
    }

    pub fn get(&self, field: &str) -> Option<&Setter> {
        self.setters.get(field)
    }
}

/// Setter that parses form text into a JSON number; blank clears the field.
pub fn numeric_setter(field: &'static str) -> impl Fn(&mut Map<String, Value>, Value) -> Result<()> {
    move |attributes, value| {
        let parsed = match value {
            Value::String(text) if text.trim().is_empty() => Value::Null,
            Value::String(text) => {
                let number: f64 = text
                    .trim()
                    .parse()
                    .map_err(|_| ViewError::Data(format!("`{field}` expects a number, got `{text}`")))?;
                serde_json::Number::from_f64(number)
                    .map(Value::Number)
                    .ok_or_else(|| ViewError::Data(format!("`{field}` is not finite")))?
            }
            other => other,
        };
        attributes.insert(field.to_string(), parsed);
        Ok(())
    }
}

/// Setter that turns an empty string into `null`.
pub fn nullable_setter(field: &'static str) -> impl Fn(&mut Map<String, Value>, Value) -> Result<()> {
    move |attributes, value| {
        let value = match value {
            Value::String(text) if text.is_empty() => Value::Null,
            other => other,
        };
        attributes.insert(field.to_string(), value);
        Ok(())
    }
}

#[derive(Clone)]
pub struct Model {
    cid: u64,
    attributes: Map<String, Value>,
    setters: FieldSetters,
}

impl std::fmt::Debug for Model {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Model")
            .field("cid", &self.cid)
            .field("attributes", &self.attributes)
            .finish()
    }
}

impl Default for Model {
    fn default() -> Self {
        Self::new(FieldSetters::default())
    }
}

impl Model {
    pub fn new(setters: FieldSetters) -> Self {
        Self {
            cid: NEXT_CID.fetch_add(1, Ordering::Relaxed),
            attributes: Map::new(),
            setters,
        }
    }

    /// Builds a model from a server record. Non-object values are rejected.
    pub fn from_value(value: Value, setters: FieldSetters) -> Result<Self> {
        match value {
            Value::Object(attributes) => Ok(Self {
                attributes,
                ..Self::new(setters)
            }),
            other => Err(ViewError::Data(format!("expected a JSON object, got {other}"))),
        }
    }

    /// Client side id, stable for the lifetime of the model.
    pub fn cid(&self) -> u64 {
        self.cid
    }

    pub fn get(&self, field: &str) -> Option<&Value> {
        self.attributes.get(field)
    }

    pub fn get_str(&self, field: &str) -> Option<&str> {
        self.get(field).and_then(Value::as_str)
    }

    /// Assigns `field` through its registered setter, or verbatim.
    pub fn set_field(&mut self, field: &str, value: Value) -> Result<()> {
        match self.setters.get(field).cloned() {
            Some(setter) => setter(&mut self.attributes, value),
            None => {
                self.attributes.insert(field.to_string(), value);
                Ok(())
            }
        }
    }

    /// Replaces all attributes with a fresh server record.
    pub fn replace(&mut self, value: Value) -> Result<()> {
        match value {
            Value::Object(attributes) => {
                self.attributes = attributes;
                Ok(())
            }
            other => Err(ViewError::Data(format!("expected a JSON object, got {other}"))),
        }
    }

    pub fn id(&self) -> Option<ResourceId> {
        IDENTITY_FIELDS
            .iter()
            .find_map(|field| match self.attributes.get(*field)? {
                Value::String(text) if !text.is_empty() => Some(ResourceId::from(text.as_str())),
                Value::Number(number) => Some(ResourceId::from(number.to_string().as_str())),
                _ => None,
            })
    }

    pub fn href(&self) -> Option<&str> {
        HREF_FIELDS
            .iter()
            .find_map(|field| self.attributes.get(*field).and_then(Value::as_str))
    }

    pub fn is_new(&self) -> bool {
        self.id().is_none() && self.href().is_none()
    }

    pub fn to_json(&self) -> Value {
        Value::Object(self.attributes.clone())
    }
}

/// Ordered list of models.
#[derive(Debug, Clone, Default)]
pub struct Collection {
    models: Vec<Model>,
}

impl Collection {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_records(records: Vec<Value>, setters: &FieldSetters) -> Result<Self> {
        let models = records
            .into_iter()
            .map(|record| Model::from_value(record, setters.clone()))
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { models })
    }

    pub fn len(&self) -> usize {
        self.models.len()
    }

    pub fn is_empty(&self) -> bool {
        self.models.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Model> {
        self.models.iter()
    }

    pub fn push(&mut self, model: Model) {
        self.models.push(model);
    }

    pub fn get_by_cid(&self, cid: u64) -> Option<&Model> {
        self.models.iter().find(|model| model.cid() == cid)
    }

    pub fn get_by_id(&self, id: &ResourceId) -> Option<&Model> {
        self.models.iter().find(|model| model.id().as_ref() == Some(id))
    }

    pub fn remove_by_cid(&mut self, cid: u64) -> Option<Model> {
        let index = self.models.iter().position(|model| model.cid() == cid)?;
        Some(self.models.remove(index))
    }

    pub fn to_json(&self) -> Value {
        Value::Array(self.models.iter().map(Model::to_json).collect())
    }
}
