use crate::dsl::{Edge, Node, NodeType, ProcessDefinition};
use crate::runtime::blueprint::{Blueprint, BlueprintNode, NodeIndex};
use std::collections::HashMap;
use anyhow::{Result, anyhow};
use serde_json::json;

pub struct Compiler {
    id_map: HashMap<String, NodeIndex>,
}

impl Compiler {
    pub fn new() -> Self {
        Self {
            id_map: HashMap::new(),
        }
    }

    pub fn compile(&mut self, definition: ProcessDefinition) -> Result<Blueprint> {
        self.id_map.clear();

        // 1. Pass 1: Indexing
        for (idx, node) in definition.nodes.iter().enumerate() {
            if self.id_map.insert(node.id.clone(), idx).is_some() {
                return Err(anyhow!("Duplicate node ID: {}", node.id));
            }
        }

        for swimlane in &definition.swimlanes {
            if definition.swimlanes.iter().filter(|s| s.name == swimlane.name).count() > 1 {
                return Err(anyhow!("Duplicate swimlane: {}", swimlane.name));
            }
        }

        // 2. Pass 2: Transform
        let mut adjacency: HashMap<String, Vec<&Edge>> = HashMap::new();
        for edge in &definition.edges {
            if !self.id_map.contains_key(&edge.source) {
                return Err(anyhow!("Source node not found: {}", edge.source));
            }
            adjacency.entry(edge.source.clone()).or_default().push(edge);
        }

        let mut blueprint_nodes = Vec::with_capacity(definition.nodes.len());
        for node in &definition.nodes {
            blueprint_nodes.push(self.transform_node(node, &adjacency)?);
        }

        // 3. Start Node
        let start_node_id = definition.nodes.iter()
            .find(|n| matches!(n.kind, NodeType::Start))
            .map(|n| n.id.clone())
            .ok_or_else(|| anyhow!("Start node not found"))?;
        let start_index = self.resolve_target(&start_node_id)?;

        Ok(Blueprint {
            id: definition.id,
            name: definition.name,
            nodes: blueprint_nodes,
            start_index,
            variables: definition.variables,
            swimlanes: definition.swimlanes,
        })
    }

    fn transform_node(&self, node: &Node, adjacency: &HashMap<String, Vec<&Edge>>) -> Result<BlueprintNode> {
        let edges = adjacency.get(&node.id).map(|v| v.as_slice()).unwrap_or(&[]);
        if edges.len() > 1 {
            return Err(anyhow!("Node '{}' has {} outgoing edges, expected at most one", node.id, edges.len()));
        }
        let next = edges.first().map(|e| self.resolve_target(&e.target)).transpose()?;

        match &node.kind {
            NodeType::Start => Ok(BlueprintNode {
                id: node.id.clone(),
                kind: "start".to_string(),
                params: json!({ "next": next }),
            }),
            NodeType::End => Ok(BlueprintNode {
                id: node.id.clone(),
                kind: "end".to_string(),
                params: json!({}),
            }),
            NodeType::MultiTask(spec) => {
                // Combine node config with the resolved jump target
                let mut params = serde_json::to_value(spec)?;
                if let Some(obj) = params.as_object_mut() {
                    obj.insert("next".to_string(), json!(next));
                }
                Ok(BlueprintNode {
                    id: node.id.clone(),
                    kind: "multi_task".to_string(),
                    params,
                })
            }
        }
    }

    fn resolve_target(&self, target_id: &str) -> Result<NodeIndex> {
        self.id_map.get(target_id)
            .cloned()
            .ok_or_else(|| anyhow!("Target node not found: {}", target_id))
    }
}

impl Default for Compiler {
    fn default() -> Self {
        Self::new()
    }
}
