pub mod scope;

pub use scope::{MapScope, OverlayScope, VariableScope};

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Declared shape of a process variable.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum VariableFormat {
    #[default]
    Scalar,
    /// Structured value whose fields are also exposed as `name.field` variables.
    Record,
    List {
        component: Box<VariableFormat>,
    },
}

impl VariableFormat {
    pub fn is_container(&self) -> bool {
        matches!(self, VariableFormat::List { .. })
    }

    pub fn component(&self) -> Option<&VariableFormat> {
        match self {
            VariableFormat::List { component } => Some(component),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct VariableDefinition {
    pub name: String,
    #[serde(default)]
    pub format: VariableFormat,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<Value>,
}

impl VariableDefinition {
    pub fn new(name: &str, format: VariableFormat) -> Self {
        Self {
            name: name.to_string(),
            format,
            default: None,
        }
    }

    pub fn with_default(mut self, value: impl Into<Value>) -> Self {
        self.default = Some(value.into());
        self
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Usage {
    Read,
    Write,
    /// Instances are linked through the positions of a list variable.
    MultiinstanceLink,
}

/// Maps a node-level variable onto a per-instance variable.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct VariableMapping {
    pub name: String,
    pub mapped_name: String,
    #[serde(default)]
    pub usage: Vec<Usage>,
}

impl VariableMapping {
    pub fn new(name: &str, mapped_name: &str, usage: &[Usage]) -> Self {
        Self {
            name: name.to_string(),
            mapped_name: mapped_name.to_string(),
            usage: usage.to_vec(),
        }
    }

    pub fn is_link_by_variable(&self) -> bool {
        self.usage.contains(&Usage::MultiinstanceLink)
    }

    pub fn is_writable(&self) -> bool {
        self.usage.contains(&Usage::Write)
    }
}

/// Expands a record value into its component variables (`name.field`),
/// descending into nested records.
pub fn decompose(name: &str, value: &Value) -> Vec<(String, Value)> {
    let mut out = Vec::new();
    if let Value::Object(fields) = value {
        for (field, field_value) in fields {
            let full_name = format!("{}.{}", name, field);
            if field_value.is_object() {
                out.extend(decompose(&full_name, field_value));
            }
            out.push((full_name, field_value.clone()));
        }
    }
    out
}
