use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;

/// Name to value bindings visible to a node or a task instance.
pub trait VariableScope: Send + Sync {
    fn resolve(&self, name: &str) -> Option<Value>;

    /// Bindings held by this scope itself, without anything inherited.
    fn own_bindings(&self) -> HashMap<String, Value>;

    /// Every visible binding. Own bindings shadow inherited ones.
    fn bindings(&self) -> HashMap<String, Value>;
}

#[derive(Debug, Clone, Default)]
pub struct MapScope {
    values: HashMap<String, Value>,
}

impl MapScope {
    pub fn new(values: HashMap<String, Value>) -> Self {
        Self { values }
    }
}

impl VariableScope for MapScope {
    fn resolve(&self, name: &str) -> Option<Value> {
        self.values.get(name).cloned()
    }

    fn own_bindings(&self) -> HashMap<String, Value> {
        self.values.clone()
    }

    fn bindings(&self) -> HashMap<String, Value> {
        self.values.clone()
    }
}

/// Resolves names in its own overlay first, then in the parent scope.
#[derive(Clone)]
pub struct OverlayScope {
    overlay: HashMap<String, Value>,
    parent: Arc<dyn VariableScope>,
}

impl OverlayScope {
    pub fn new(parent: Arc<dyn VariableScope>) -> Self {
        Self {
            overlay: HashMap::new(),
            parent,
        }
    }

    pub fn with_bindings(bindings: HashMap<String, Value>, parent: Arc<dyn VariableScope>) -> Self {
        Self {
            overlay: bindings,
            parent,
        }
    }

    pub fn add(&mut self, name: impl Into<String>, value: Value) {
        self.overlay.insert(name.into(), value);
    }
}

impl VariableScope for OverlayScope {
    fn resolve(&self, name: &str) -> Option<Value> {
        self.overlay
            .get(name)
            .cloned()
            .or_else(|| self.parent.resolve(name))
    }

    fn own_bindings(&self) -> HashMap<String, Value> {
        self.overlay.clone()
    }

    fn bindings(&self) -> HashMap<String, Value> {
        let mut all = self.parent.bindings();
        all.extend(self.overlay.iter().map(|(k, v)| (k.clone(), v.clone())));
        all
    }
}

impl std::fmt::Debug for OverlayScope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OverlayScope")
            .field("overlay", &self.overlay)
            .finish_non_exhaustive()
    }
}
