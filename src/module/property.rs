//! Module properties: named, typed, observable values.
//!
//! Writes from any thread replace a value whole and fire the module's
//! property-changed condition. The module thread collects the changed names
//! with [`PropertyGroup::take_changed`].

use crate::error::{KernelError, Result};
use crate::sync::{lock, Condition};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Mutex;

/// A property value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PropertyValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
}

impl PropertyValue {
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            PropertyValue::Bool(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            PropertyValue::Int(v) => Some(*v),
            _ => None,
        }
    }

    /// Float value; integers widen.
    pub fn as_float(&self) -> Option<f64> {
        match self {
            PropertyValue::Float(v) => Some(*v),
            PropertyValue::Int(v) => Some(*v as f64),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            PropertyValue::String(v) => Some(v),
            _ => None,
        }
    }

    pub fn kind_name(&self) -> &'static str {
        match self {
            PropertyValue::Bool(_) => "bool",
            PropertyValue::Int(_) => "int",
            PropertyValue::Float(_) => "float",
            PropertyValue::String(_) => "string",
        }
    }
}

impl fmt::Display for PropertyValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PropertyValue::Bool(v) => write!(f, "{}", v),
            PropertyValue::Int(v) => write!(f, "{}", v),
            PropertyValue::Float(v) => write!(f, "{}", v),
            PropertyValue::String(v) => write!(f, "{:?}", v),
        }
    }
}

impl From<bool> for PropertyValue {
    fn from(v: bool) -> Self {
        PropertyValue::Bool(v)
    }
}

impl From<i64> for PropertyValue {
    fn from(v: i64) -> Self {
        PropertyValue::Int(v)
    }
}

impl From<i32> for PropertyValue {
    fn from(v: i32) -> Self {
        PropertyValue::Int(v as i64)
    }
}

impl From<f64> for PropertyValue {
    fn from(v: f64) -> Self {
        PropertyValue::Float(v)
    }
}

impl From<&str> for PropertyValue {
    fn from(v: &str) -> Self {
        PropertyValue::String(v.to_string())
    }
}

impl From<String> for PropertyValue {
    fn from(v: String) -> Self {
        PropertyValue::String(v)
    }
}

/// Restriction on the values a property accepts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Constraint {
    /// Inclusive numeric range.
    Range { min: f64, max: f64 },
    /// Non-empty string.
    NotEmpty,
    /// One of a fixed set of strings.
    OneOf(Vec<String>),
}

impl Constraint {
    fn check(&self, value: &PropertyValue) -> std::result::Result<(), String> {
        match self {
            Constraint::Range { min, max } => match value.as_float() {
                Some(v) if v >= *min && v <= *max => Ok(()),
                Some(v) => Err(format!("{} is outside [{}, {}]", v, min, max)),
                None => Err("not a number".to_string()),
            },
            Constraint::NotEmpty => match value.as_str() {
                Some(s) if !s.trim().is_empty() => Ok(()),
                _ => Err("must not be empty".to_string()),
            },
            Constraint::OneOf(options) => match value.as_str() {
                Some(s) if options.iter().any(|o| o == s) => Ok(()),
                _ => Err(format!("must be one of {}", options.join(", "))),
            },
        }
    }
}

/// Declaration of a property.
#[derive(Debug, Clone, PartialEq)]
pub struct PropertySpec {
    pub name: String,
    pub description: String,
    pub default: PropertyValue,
    pub constraint: Option<Constraint>,
}

impl PropertySpec {
    pub fn new(name: impl Into<String>, default: impl Into<PropertyValue>) -> Self {
        Self {
            name: name.into(),
            description: String::new(),
            default: default.into(),
            constraint: None,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_constraint(mut self, constraint: Constraint) -> Self {
        self.constraint = Some(constraint);
        self
    }

    /// Check `value` against the declared kind and constraint, widening ints
    /// for float properties.
    pub fn validate(&self, value: PropertyValue) -> Result<PropertyValue> {
        let value = match (&self.default, value) {
            (PropertyValue::Float(_), PropertyValue::Int(i)) => PropertyValue::Float(i as f64),
            (_, value) => value,
        };
        if std::mem::discriminant(&self.default) != std::mem::discriminant(&value) {
            return Err(KernelError::PropertyType {
                property: self.name.clone(),
                expected: self.default.kind_name(),
                actual: value.kind_name(),
            });
        }
        if let Some(constraint) = &self.constraint {
            constraint
                .check(&value)
                .map_err(|reason| KernelError::PropertyRejected {
                    property: self.name.clone(),
                    reason,
                })?;
        }
        Ok(value)
    }
}

struct Entry {
    spec: PropertySpec,
    value: PropertyValue,
}

#[derive(Default)]
struct GroupState {
    entries: Vec<Entry>,
    changed: Vec<String>,
}

/// The properties of one module, in declaration order.
pub struct PropertyGroup {
    module: String,
    state: Mutex<GroupState>,
    changed: Condition,
}

impl PropertyGroup {
    pub fn new(module: impl Into<String>) -> Self {
        Self {
            module: module.into(),
            state: Mutex::new(GroupState::default()),
            changed: Condition::new(),
        }
    }

    /// Fired whenever a property is written with notification.
    pub fn condition(&self) -> &Condition {
        &self.changed
    }

    pub fn declare(&self, spec: PropertySpec) -> Result<()> {
        let mut state = lock(&self.state);
        if state.entries.iter().any(|e| e.spec.name == spec.name) {
            return Err(KernelError::InvalidState {
                module: self.module.clone(),
                message: format!("property \"{}\" declared twice", spec.name),
            });
        }
        let value = spec.default.clone();
        state.entries.push(Entry { spec, value });
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<PropertyValue> {
        lock(&self.state)
            .entries
            .iter()
            .find(|e| e.spec.name == name)
            .map(|e| e.value.clone())
    }

    pub fn spec(&self, name: &str) -> Option<PropertySpec> {
        lock(&self.state)
            .entries
            .iter()
            .find(|e| e.spec.name == name)
            .map(|e| e.spec.clone())
    }

    /// Snapshot of all values in declaration order.
    pub fn values(&self) -> Vec<(String, PropertyValue)> {
        lock(&self.state)
            .entries
            .iter()
            .map(|e| (e.spec.name.clone(), e.value.clone()))
            .collect()
    }

    /// Write a property and wake the module. Returns whether the value changed.
    pub fn set(&self, name: &str, value: PropertyValue) -> Result<bool> {
        self.write(name, value, true)
    }

    /// Write without waking the module. Used by the module for its own
    /// properties.
    pub(crate) fn set_quiet(&self, name: &str, value: PropertyValue) -> Result<bool> {
        self.write(name, value, false)
    }

    fn write(&self, name: &str, value: PropertyValue, notify: bool) -> Result<bool> {
        {
            let mut state = lock(&self.state);
            let entry = state
                .entries
                .iter_mut()
                .find(|e| e.spec.name == name)
                .ok_or_else(|| KernelError::UnknownProperty {
                    module: self.module.clone(),
                    property: name.to_string(),
                })?;
            let value = entry.spec.validate(value)?;
            if entry.value == value {
                return Ok(false);
            }
            entry.value = value;
            if notify && !state.changed.iter().any(|n| n == name) {
                state.changed.push(name.to_string());
            }
        }
        if notify {
            self.changed.notify();
        }
        Ok(true)
    }

    /// Names and current values of properties changed since the last call,
    /// in order of first change.
    pub fn take_changed(&self) -> Vec<(String, PropertyValue)> {
        let mut state = lock(&self.state);
        let names = std::mem::take(&mut state.changed);
        names
            .into_iter()
            .filter_map(|name| {
                let value = state
                    .entries
                    .iter()
                    .find(|e| e.spec.name == name)?
                    .value
                    .clone();
                Some((name, value))
            })
            .collect()
    }

    pub fn len(&self) -> usize {
        lock(&self.state).entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
