use serde_json::Value;

use bullseye_core_types::TargetId;
use bullseye_dom_port::ElementHandle;

/// One node of the bullseye. May or may not map to a DOM element.
#[derive(Clone, Debug)]
pub struct Target {
    pub id: TargetId,
    /// Weak reference into the host document; the engine never owns it.
    pub element: Option<ElementHandle>,
    /// Value extracted by a collector step, if any.
    pub value: Option<Value>,
    /// Index among sibling elements at collection time.
    pub index: Option<usize>,
    pub children: Vec<Target>,
    pub correct: bool,
}

impl Target {
    pub fn new() -> Self {
        Self {
            id: TargetId::new(),
            element: None,
            value: None,
            index: None,
            children: Vec::new(),
            correct: false,
        }
    }

    pub fn with_element(element: ElementHandle, index: usize) -> Self {
        let mut target = Self::new();
        target.element = Some(element);
        target.index = Some(index);
        target
    }

    pub fn has_children(&self) -> bool {
        !self.children.is_empty()
    }

    pub fn has_value(&self) -> bool {
        self.value.is_some()
    }

    pub fn has_grandchildren(&self) -> bool {
        self.children.iter().any(Target::has_children)
    }
}

impl Default for Target {
    fn default() -> Self {
        Self::new()
    }
}

/// Which nodes of the bullseye an operation may act on.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Tier {
    /// Exactly the root.
    Top,
    /// Nodes with no children after the previous collection step.
    Bottom,
    /// Nodes with children, none of which have children themselves.
    /// Count-style aggregates look one level up from the leaves.
    NextToBottom,
}

/// The tree of selection results. Exactly one root Target is current at
/// any time; a root-level collector replaces it wholesale.
#[derive(Clone, Debug, Default)]
pub struct Bullseye {
    root: Option<Target>,
}

impl Bullseye {
    pub fn new() -> Self {
        Self { root: None }
    }

    /// Discard the current tree and start a fresh root.
    pub fn replace_root(&mut self) -> TargetId {
        let root = Target::new();
        let id = root.id.clone();
        self.root = Some(root);
        id
    }

    pub fn root(&self) -> Option<&Target> {
        self.root.as_ref()
    }

    pub fn root_mut(&mut self) -> Option<&mut Target> {
        self.root.as_mut()
    }

    pub fn root_id(&self) -> Option<TargetId> {
        self.root.as_ref().map(|t| t.id.clone())
    }

    /// Depth-first pre-order visit of every node.
    pub fn visit<F: FnMut(&Target)>(&self, mut f: F) {
        if let Some(root) = &self.root {
            Self::visit_node(root, &mut f);
        }
    }

    fn visit_node<F: FnMut(&Target)>(node: &Target, f: &mut F) {
        f(node);
        for child in &node.children {
            Self::visit_node(child, f);
        }
    }

    /// Ids of every node a `tier`-scoped operation may act on, pre-order.
    pub fn tier_ids(&self, tier: Tier) -> Vec<TargetId> {
        let mut ids = Vec::new();
        match tier {
            Tier::Top => {
                if let Some(root) = &self.root {
                    ids.push(root.id.clone());
                }
            }
            Tier::Bottom => self.visit(|t| {
                if !t.has_children() {
                    ids.push(t.id.clone());
                }
            }),
            Tier::NextToBottom => self.visit(|t| {
                if t.has_children() && !t.has_grandchildren() {
                    ids.push(t.id.clone());
                }
            }),
        }
        ids
    }

    pub fn get(&self, id: &TargetId) -> Option<&Target> {
        self.root.as_ref().and_then(|root| Self::find(root, id))
    }

    pub fn get_mut(&mut self, id: &TargetId) -> Option<&mut Target> {
        self.root.as_mut().and_then(|root| Self::find_mut(root, id))
    }

    fn find<'a>(node: &'a Target, id: &TargetId) -> Option<&'a Target> {
        if node.id == *id {
            return Some(node);
        }
        node.children.iter().find_map(|child| Self::find(child, id))
    }

    fn find_mut<'a>(node: &'a mut Target, id: &TargetId) -> Option<&'a mut Target> {
        if node.id == *id {
            return Some(node);
        }
        node.children
            .iter_mut()
            .find_map(|child| Self::find_mut(child, id))
    }

    pub fn element_of(&self, id: &TargetId) -> Option<ElementHandle> {
        self.get(id).and_then(|t| t.element)
    }

    pub fn set_value(&mut self, id: &TargetId, value: Value) -> bool {
        match self.get_mut(id) {
            Some(target) => {
                target.value = Some(value);
                true
            }
            None => false,
        }
    }

    pub fn add_child(&mut self, parent: &TargetId, child: Target) -> Option<TargetId> {
        let id = child.id.clone();
        match self.get_mut(parent) {
            Some(target) => {
                target.children.push(child);
                Some(id)
            }
            None => None,
        }
    }

    pub fn mark_correct(&mut self, id: &TargetId, correct: bool) {
        if let Some(target) = self.get_mut(id) {
            target.correct = correct;
        }
    }

    /// Pre-order child counts; two runs against an unchanged document
    /// must produce the same shape.
    pub fn shape(&self) -> Vec<usize> {
        let mut shape = Vec::new();
        self.visit(|t| shape.push(t.children.len()));
        shape
    }
}
