use super::MultiTaskNode;
use crate::error::MultiTaskError;
use crate::executor::Executor;
use crate::runtime::context::ExecutionContext;
use crate::variables::{OverlayScope, VariableFormat, VariableMapping, VariableScope, decompose};
use anyhow::Result;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

/// One task to create for a node activation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum InstanceDescriptor {
    /// A distinct executor identity taken from the discriminator.
    Executor { identity: Value },
    /// A discriminator position together with the per-instance bindings built for it.
    Indexed {
        index: usize,
        item: Value,
        bindings: HashMap<String, Value>,
    },
}

/// The resolved fan-out of one activation.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct InstanceSet {
    pub descriptors: Vec<InstanceDescriptor>,
    /// Length of the discriminator data source before deduplication or filtering.
    pub source_len: usize,
    /// Positions whose condition evaluated to false.
    #[serde(default)]
    pub excluded: Vec<usize>,
    /// Instances are linked through list positions rather than executor identities.
    pub by_variable: bool,
}

impl InstanceSet {
    pub fn len(&self) -> usize {
        self.descriptors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.descriptors.is_empty()
    }

    /// Size that writable list mappings are grown to.
    pub fn container_size(&self) -> usize {
        if self.by_variable { self.source_len } else { self.descriptors.len() }
    }

    pub fn identities(&self) -> Vec<&Value> {
        self.descriptors
            .iter()
            .filter_map(|d| match d {
                InstanceDescriptor::Executor { identity } => Some(identity),
                InstanceDescriptor::Indexed { .. } => None,
            })
            .collect()
    }
}

impl MultiTaskNode {
    /// Computes the instance set for an activation from the node-level scope.
    pub async fn compute_instances(
        &self,
        ctx: &ExecutionContext,
        scope: &Arc<dyn VariableScope>,
    ) -> Result<InstanceSet> {
        let data = self.resolve_data_source(scope.as_ref()).await?;
        if self.links_by_variable() {
            self.indexed_instances(ctx, scope, data)
        } else {
            Ok(executor_instances(data))
        }
    }

    async fn resolve_data_source(&self, scope: &dyn VariableScope) -> Result<Vec<Value>> {
        let name = &self.discriminator_variable;
        let value = scope
            .resolve(name)
            .ok_or_else(|| MultiTaskError::VariableNotFound(name.clone()))?;

        match value {
            Value::Array(items) => Ok(items),
            Value::Null => Ok(Vec::new()),
            single if self.links_by_variable() => Ok(vec![single]),
            single => match self.services.directory.resolve_executor(&single).await? {
                Some(Executor::Group(group)) => {
                    let members = self.services.directory.group_members(group.id).await?;
                    debug!(node = %self.node_id, group = %group.name, members = members.len(), "Discriminator group expanded");
                    Ok(members.into_iter().map(|a| Value::String(a.name)).collect())
                }
                _ => Ok(vec![single]),
            },
        }
    }

    fn indexed_instances(
        &self,
        ctx: &ExecutionContext,
        scope: &Arc<dyn VariableScope>,
        data: Vec<Value>,
    ) -> Result<InstanceSet> {
        let mut sources = Vec::with_capacity(self.mappings.len());
        for mapping in &self.mappings {
            sources.push(self.mapped_list(ctx, scope.as_ref(), mapping)?);
        }

        let mut descriptors = Vec::new();
        let mut excluded = Vec::new();
        for (index, item) in data.iter().enumerate() {
            let mut bindings = HashMap::new();
            bindings.insert("index".to_string(), json!(index));
            for (mapping, items, component) in &sources {
                let Some(value) = items.get(index) else { continue };
                let structured = match component {
                    Some(format) => matches!(format, VariableFormat::Record),
                    None => value.is_object(),
                };
                if structured {
                    bindings.extend(decompose(&mapping.mapped_name, value));
                }
                bindings.insert(mapping.mapped_name.clone(), value.clone());
            }

            if let Some(condition) = &self.condition {
                let mut probe = OverlayScope::with_bindings(bindings.clone(), scope.clone());
                probe.add("item", item.clone());
                probe.add("index", json!(index));
                let keep = self
                    .services
                    .conditions
                    .evaluate(condition, &probe)
                    .map_err(|e| MultiTaskError::Condition {
                        expression: condition.clone(),
                        message: e.to_string(),
                    })?;
                if !keep {
                    excluded.push(index);
                    continue;
                }
            }

            descriptors.push(InstanceDescriptor::Indexed { index, item: item.clone(), bindings });
        }

        if !excluded.is_empty() {
            debug!(node = %self.node_id, ?excluded, "Ignored indexes");
        }

        Ok(InstanceSet {
            descriptors,
            source_len: data.len(),
            excluded,
            by_variable: true,
        })
    }

    /// List value behind a mapping, plus the declared format of its elements.
    fn mapped_list<'m>(
        &self,
        ctx: &ExecutionContext,
        scope: &dyn VariableScope,
        mapping: &'m VariableMapping,
    ) -> Result<(&'m VariableMapping, Vec<Value>, Option<VariableFormat>)> {
        let declared = ctx.definition.variable(&mapping.name);
        let items = match scope.resolve(&mapping.name) {
            Some(Value::Array(items)) => items,
            Some(Value::Null) => Vec::new(),
            None if declared.is_some() => Vec::new(),
            None => return Err(MultiTaskError::VariableNotFound(mapping.name.clone()).into()),
            Some(_) => return Err(MultiTaskError::NotAList(mapping.name.clone()).into()),
        };
        let component = declared.and_then(|d| d.format.component()).cloned();
        Ok((mapping, items, component))
    }
}

/// Distinct identities in first-occurrence order.
fn executor_instances(data: Vec<Value>) -> InstanceSet {
    let source_len = data.len();
    let mut distinct: Vec<Value> = Vec::with_capacity(source_len);
    for identity in data {
        if !distinct.contains(&identity) {
            distinct.push(identity);
        }
    }
    InstanceSet {
        descriptors: distinct
            .into_iter()
            .map(|identity| InstanceDescriptor::Executor { identity })
            .collect(),
        source_len,
        excluded: Vec::new(),
        by_variable: false,
    }
}
