use crate::dsl::{
    CreationMode, DiscriminatorSpec, Edge, MultiTaskSpec, Node, NodeType, ProcessDefinition,
    SynchronizationMode,
};
use crate::runtime::blueprint::SwimlaneDefinition;
use crate::runtime::task::TaskDefinition;
use crate::variables::{Usage, VariableDefinition, VariableMapping};

pub struct ProcessBuilder {
    id: String,
    name: String,
    variables: Vec<VariableDefinition>,
    swimlanes: Vec<SwimlaneDefinition>,
    pub nodes: Vec<Node>, // Public for manual manipulation in tests
    edges: Vec<Edge>,
}

impl ProcessBuilder {
    pub fn new(id: &str) -> Self {
        Self {
            id: id.to_string(),
            name: id.to_string(),
            variables: Vec::new(),
            swimlanes: Vec::new(),
            nodes: Vec::new(),
            edges: Vec::new(),
        }
    }

    pub fn name(mut self, name: &str) -> Self {
        self.name = name.to_string();
        self
    }

    pub fn variable(mut self, definition: VariableDefinition) -> Self {
        self.variables.push(definition);
        self
    }

    pub fn swimlane(mut self, name: &str, initializer: Option<&str>) -> Self {
        self.swimlanes.push(SwimlaneDefinition {
            name: name.to_string(),
            initializer: initializer.map(|s| s.to_string()),
        });
        self
    }

    pub fn start(mut self, id: &str) -> Self {
        self.nodes.push(Node {
            id: id.to_string(),
            kind: NodeType::Start,
        });
        self
    }

    pub fn end(mut self, id: &str) -> Self {
        self.nodes.push(Node {
            id: id.to_string(),
            kind: NodeType::End,
        });
        self
    }

    pub fn multi_task(self, id: &str, task_name: &str) -> MultiTaskBuilder {
        MultiTaskBuilder {
            process_builder: self,
            id: id.to_string(),
            spec: MultiTaskSpec {
                task: TaskDefinition::new(task_name),
                creation_mode: None,
                synchronization_mode: None,
                discriminator: DiscriminatorSpec::default(),
                mappings: Vec::new(),
                is_async: false,
            },
        }
    }

    pub fn connect(mut self, source: &str, target: &str) -> Self {
        self.edges.push(Edge {
            source: source.to_string(),
            target: target.to_string(),
        });
        self
    }

    pub fn build(self) -> ProcessDefinition {
        ProcessDefinition {
            id: self.id,
            name: self.name,
            variables: self.variables,
            swimlanes: self.swimlanes,
            nodes: self.nodes,
            edges: self.edges,
        }
    }
}

pub struct MultiTaskBuilder {
    process_builder: ProcessBuilder,
    id: String,
    spec: MultiTaskSpec,
}

impl MultiTaskBuilder {
    pub fn swimlane(mut self, swimlane: &str) -> Self {
        self.spec.task.swimlane = Some(swimlane.to_string());
        self
    }

    pub fn creation_mode(mut self, mode: CreationMode) -> Self {
        self.spec.creation_mode = Some(mode);
        self
    }

    pub fn synchronization(mut self, mode: SynchronizationMode) -> Self {
        self.spec.synchronization_mode = Some(mode);
        self
    }

    pub fn discriminator(mut self, variable: &str, usage: &[Usage]) -> Self {
        self.spec.discriminator.variable = Some(variable.to_string());
        self.spec.discriminator.usage = usage.to_vec();
        self
    }

    pub fn condition(mut self, condition: &str) -> Self {
        self.spec.discriminator.condition = Some(condition.to_string());
        self
    }

    pub fn mapping(mut self, name: &str, mapped_name: &str, usage: &[Usage]) -> Self {
        self.spec.mappings.push(VariableMapping::new(name, mapped_name, usage));
        self
    }

    pub fn asynchronous(mut self) -> Self {
        self.spec.is_async = true;
        self
    }

    pub fn build(mut self) -> ProcessBuilder {
        self.process_builder.nodes.push(Node {
            id: self.id,
            kind: NodeType::MultiTask(self.spec),
        });
        self.process_builder
    }
}
