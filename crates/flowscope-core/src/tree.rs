//! Workflow activity tree model.
//!
//! This module provides the arena-backed data model for flowscope:
//! - [`WorkflowTree`]: arena owning all nodes, variables, and arguments
//! - [`Node`]: a unit in the hierarchical workflow tree
//! - [`Variable`] / [`Argument`]: named, typed storage declarations
//! - [`LocationRef`]: handle over either kind of storage location
//!
//! Ownership and reachability relations are plain ID fields into the arena,
//! never owning references. A node's `owner` chain always forms a tree; the
//! construction API rejects attachments that would violate that.
//!
//! # Public vs. implementation children
//!
//! A node carries two ordered child collections. `children` is the public
//! surface; `implementation_children` holds internally-generated structure
//! that is owned by the node but is not part of its public surface. The two
//! collections never mix for sibling computations: implementation children
//! are siblings only of each other.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

// ============================================================================
// ID Types
// ============================================================================

/// Unique identifier for a node within a tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, PartialOrd, Ord)]
pub struct NodeId(pub u32);

impl NodeId {
    /// Create a new node ID.
    pub fn new(id: u32) -> Self {
        NodeId(id)
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "node_{}", self.0)
    }
}

/// Unique identifier for a variable declaration within a tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, PartialOrd, Ord)]
pub struct VariableId(pub u32);

impl VariableId {
    /// Create a new variable ID.
    pub fn new(id: u32) -> Self {
        VariableId(id)
    }
}

impl fmt::Display for VariableId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "var_{}", self.0)
    }
}

/// Unique identifier for an argument declaration within a tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, PartialOrd, Ord)]
pub struct ArgumentId(pub u32);

impl ArgumentId {
    /// Create a new argument ID.
    pub fn new(id: u32) -> Self {
        ArgumentId(id)
    }
}

impl fmt::Display for ArgumentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "arg_{}", self.0)
    }
}

// ============================================================================
// Value Types
// ============================================================================

/// Static type of a storage location.
///
/// flowscope expressions operate over the four value types; `Object` carries
/// an opaque named type that locations may declare but expressions cannot
/// compute with.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DataType {
    /// UTF-8 text.
    String,
    /// 64-bit signed integer.
    I64,
    /// 64-bit float.
    F64,
    /// Boolean.
    Bool,
    /// Opaque named object type (e.g., a host-defined record).
    Object(String),
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DataType::String => write!(f, "string"),
            DataType::I64 => write!(f, "i64"),
            DataType::F64 => write!(f, "f64"),
            DataType::Bool => write!(f, "bool"),
            DataType::Object(name) => write!(f, "{name}"),
        }
    }
}

/// Direction of data flow for an argument.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArgumentDirection {
    /// Value flows into the owning node.
    In,
    /// Value flows out of the owning node.
    Out,
    /// Value flows both ways.
    InOut,
}

// ============================================================================
// Node Kinds and Scope Policy
// ============================================================================

/// Kind of node in the workflow tree.
///
/// This enum is `#[non_exhaustive]` and carries a `Custom` variant so that
/// late-bound node shapes (shapes only known through a runtime capability
/// query) participate in resolution exactly like the statically-known kinds.
/// Nothing in scope resolution matches on `NodeKind`; behavior is driven
/// entirely by [`ScopePolicy`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[non_exhaustive]
pub enum NodeKind {
    /// Root workflow definition carrying the workflow's own arguments.
    Definition,
    /// Sequential composite; data flows left-to-right among children.
    Sequence,
    /// Branch construct with mutually exclusive bodies (e.g., then/else).
    Branch,
    /// One body of a branch construct; a scope layer of its own.
    BranchBody,
    /// Leaf step with no scope semantics of its own.
    Action,
    /// Late-bound node shape identified by a host-defined tag.
    Custom(String),
}

/// Capability set driving scope resolution, independent of [`NodeKind`].
///
/// The resolver is polymorphic over this policy: unknown node shapes simply
/// contribute whatever their policy exposes, and never crash resolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScopePolicy {
    /// The node's own arguments are in scope for its subtree (true for a
    /// workflow definition or a branch body, which bind data for the code
    /// they wrap).
    pub exposes_arguments_to_body: bool,
    /// Data flows left-to-right among this node's children, making earlier
    /// siblings' arguments reachable from later ones. False for branch
    /// constructs whose children are mutually exclusive bodies.
    pub sequential_flow: bool,
}

impl ScopePolicy {
    /// Default policy for a node kind.
    pub fn for_kind(kind: &NodeKind) -> Self {
        match kind {
            NodeKind::Definition | NodeKind::BranchBody => ScopePolicy {
                exposes_arguments_to_body: true,
                sequential_flow: true,
            },
            NodeKind::Branch => ScopePolicy {
                exposes_arguments_to_body: false,
                sequential_flow: false,
            },
            NodeKind::Sequence | NodeKind::Action | NodeKind::Custom(_) => ScopePolicy {
                exposes_arguments_to_body: false,
                sequential_flow: true,
            },
        }
    }
}

// ============================================================================
// Declarations
// ============================================================================

/// A declared local variable.
///
/// Created when its owning node is constructed or deserialized; immutable
/// thereafter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Variable {
    /// Unique identifier for this variable.
    pub variable_id: VariableId,
    /// Declared name.
    pub name: String,
    /// Static type.
    pub data_type: DataType,
    /// Node declaring this variable.
    pub owner: NodeId,
}

/// A declared argument.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Argument {
    /// Unique identifier for this argument.
    pub argument_id: ArgumentId,
    /// Declared name.
    pub name: String,
    /// Static type.
    pub data_type: DataType,
    /// Direction of data flow.
    pub direction: ArgumentDirection,
    /// Node declaring this argument.
    pub owner: NodeId,
    /// Expression text the argument is already wired to, if any. A bound
    /// argument has a fixed value source and is typically excluded from
    /// "locations still needing a value" queries by the caller's predicate.
    pub bound_expression: Option<String>,
}

impl Argument {
    /// Whether this argument already has a fixed value source.
    pub fn is_bound(&self) -> bool {
        self.bound_expression
            .as_deref()
            .is_some_and(|expr| !expr.is_empty())
    }
}

/// A node (activity) in the workflow tree.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Node {
    /// Unique identifier for this node.
    pub node_id: NodeId,
    /// Display name for messages and logs.
    pub display_name: String,
    /// Kind tag; informational only as far as scope resolution goes.
    pub kind: NodeKind,
    /// Capability set driving scope resolution.
    pub policy: ScopePolicy,
    /// Owning node (None at the tree root).
    pub owner: Option<NodeId>,
    /// Public child nodes, in declaration order.
    pub children: Vec<NodeId>,
    /// Implementation child nodes, in declaration order.
    pub implementation_children: Vec<NodeId>,
    /// Declared variables, in declaration order.
    pub variables: Vec<VariableId>,
    /// Arguments surfaced by this node, in declaration order. Contains the
    /// node's own declarations plus any arguments promoted from nodes inside
    /// its subtree.
    pub arguments: Vec<ArgumentId>,
}

// ============================================================================
// Location References
// ============================================================================

/// Handle over either kind of storage location.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LocationRef {
    /// A declared variable.
    Variable(VariableId),
    /// A declared argument.
    Argument(ArgumentId),
}

/// Borrowed view of a storage location, handed to caller predicates.
#[derive(Debug, Clone, Copy)]
pub enum LocationView<'a> {
    /// A declared variable.
    Variable(&'a Variable),
    /// A declared argument.
    Argument(&'a Argument),
}

impl LocationView<'_> {
    /// Declared name of the location.
    pub fn name(&self) -> &str {
        match self {
            LocationView::Variable(var) => &var.name,
            LocationView::Argument(arg) => &arg.name,
        }
    }

    /// Static type of the location.
    pub fn data_type(&self) -> &DataType {
        match self {
            LocationView::Variable(var) => &var.data_type,
            LocationView::Argument(arg) => &arg.data_type,
        }
    }

    /// Node declaring the location.
    pub fn owner(&self) -> NodeId {
        match self {
            LocationView::Variable(var) => var.owner,
            LocationView::Argument(arg) => arg.owner,
        }
    }
}

// ============================================================================
// Errors
// ============================================================================

/// Errors from structural mutation of a [`WorkflowTree`].
///
/// These cover misuse the construction API can detect and report. Dangling
/// IDs are contract violations and fail fast by panicking instead.
#[derive(Debug, Error)]
pub enum TreeError {
    /// The child is already attached to an owner.
    #[error("{child} is already owned by {owner}")]
    AlreadyOwned { child: NodeId, owner: NodeId },

    /// The attachment would make the owner relation cyclic.
    #[error("attaching {child} under {parent} would create an ownership cycle")]
    OwnershipCycle { child: NodeId, parent: NodeId },

    /// The argument already has a bound expression.
    #[error("{argument} is already bound")]
    AlreadyBound { argument: ArgumentId },

    /// Promotion target is not inside the wrapper's subtree.
    #[error("{argument} is owned outside the subtree of {wrapper}")]
    NotInSubtree { argument: ArgumentId, wrapper: NodeId },

    /// The wrapper already surfaces this argument.
    #[error("{argument} is already surfaced by {wrapper}")]
    AlreadyPromoted { argument: ArgumentId, wrapper: NodeId },
}

// ============================================================================
// WorkflowTree
// ============================================================================

/// Arena owning every node, variable, and argument of one workflow tree.
///
/// All cross-references are IDs into the arena's vectors. Accessors index
/// directly and panic on a dangling ID, which only a caller-side bug can
/// produce.
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkflowTree {
    nodes: Vec<Node>,
    variables: Vec<Variable>,
    arguments: Vec<Argument>,
}

impl WorkflowTree {
    /// Create an empty tree.
    pub fn new() -> Self {
        WorkflowTree::default()
    }

    /// Add an unattached node with the default policy for its kind.
    pub fn add_node(&mut self, display_name: impl Into<String>, kind: NodeKind) -> NodeId {
        let policy = ScopePolicy::for_kind(&kind);
        self.add_node_with_policy(display_name, kind, policy)
    }

    /// Add an unattached node with an explicit scope policy.
    ///
    /// Late-bound shapes (`NodeKind::Custom`) use this to state their
    /// capability set directly.
    pub fn add_node_with_policy(
        &mut self,
        display_name: impl Into<String>,
        kind: NodeKind,
        policy: ScopePolicy,
    ) -> NodeId {
        let node_id = NodeId::new(self.nodes.len() as u32);
        self.nodes.push(Node {
            node_id,
            display_name: display_name.into(),
            kind,
            policy,
            owner: None,
            children: Vec::new(),
            implementation_children: Vec::new(),
            variables: Vec::new(),
            arguments: Vec::new(),
        });
        node_id
    }

    /// Look up a node. Panics on a dangling ID.
    pub fn node(&self, id: NodeId) -> &Node {
        &self.nodes[id.0 as usize]
    }

    /// Look up a variable. Panics on a dangling ID.
    pub fn variable(&self, id: VariableId) -> &Variable {
        &self.variables[id.0 as usize]
    }

    /// Look up an argument. Panics on a dangling ID.
    pub fn argument(&self, id: ArgumentId) -> &Argument {
        &self.arguments[id.0 as usize]
    }

    /// Number of nodes in the arena.
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Attach `child` to the end of `parent`'s public children.
    pub fn attach_child(&mut self, parent: NodeId, child: NodeId) -> Result<(), TreeError> {
        self.attach(parent, child, false)
    }

    /// Attach `child` to the end of `parent`'s implementation children.
    pub fn attach_implementation_child(
        &mut self,
        parent: NodeId,
        child: NodeId,
    ) -> Result<(), TreeError> {
        self.attach(parent, child, true)
    }

    fn attach(&mut self, parent: NodeId, child: NodeId, implementation: bool) -> Result<(), TreeError> {
        if let Some(owner) = self.node(child).owner {
            return Err(TreeError::AlreadyOwned { child, owner });
        }
        // Walking up from `parent` must not meet `child`, or the owner
        // relation would stop being a tree.
        if parent == child || self.is_descendant_of(parent, child) {
            return Err(TreeError::OwnershipCycle { child, parent });
        }
        if implementation {
            self.nodes[parent.0 as usize].implementation_children.push(child);
        } else {
            self.nodes[parent.0 as usize].children.push(child);
        }
        self.nodes[child.0 as usize].owner = Some(parent);
        Ok(())
    }

    /// Whether `node` sits somewhere under `ancestor` (strictly below it).
    pub fn is_descendant_of(&self, node: NodeId, ancestor: NodeId) -> bool {
        let mut current = self.node(node).owner;
        while let Some(owner) = current {
            if owner == ancestor {
                return true;
            }
            current = self.node(owner).owner;
        }
        false
    }

    /// Declare a variable on `owner`.
    pub fn declare_variable(
        &mut self,
        owner: NodeId,
        name: impl Into<String>,
        data_type: DataType,
    ) -> VariableId {
        let variable_id = VariableId::new(self.variables.len() as u32);
        self.variables.push(Variable {
            variable_id,
            name: name.into(),
            data_type,
            owner,
        });
        self.nodes[owner.0 as usize].variables.push(variable_id);
        variable_id
    }

    /// Declare an argument on `owner`.
    pub fn declare_argument(
        &mut self,
        owner: NodeId,
        name: impl Into<String>,
        data_type: DataType,
        direction: ArgumentDirection,
    ) -> ArgumentId {
        let argument_id = ArgumentId::new(self.arguments.len() as u32);
        self.arguments.push(Argument {
            argument_id,
            name: name.into(),
            data_type,
            direction,
            owner,
            bound_expression: None,
        });
        self.nodes[owner.0 as usize].arguments.push(argument_id);
        argument_id
    }

    /// Wire an argument to a fixed expression text.
    pub fn bind_argument(
        &mut self,
        argument: ArgumentId,
        expression: impl Into<String>,
    ) -> Result<(), TreeError> {
        if self.argument(argument).is_bound() {
            return Err(TreeError::AlreadyBound { argument });
        }
        self.arguments[argument.0 as usize].bound_expression = Some(expression.into());
        Ok(())
    }

    /// Surface an argument declared inside `wrapper`'s subtree on `wrapper`
    /// itself (argument promotion).
    ///
    /// Sibling reachability inspects a node's surfaced arguments only, so
    /// promotion is the one way an inner node's argument becomes reachable
    /// through the wrapper.
    pub fn promote_argument(
        &mut self,
        wrapper: NodeId,
        argument: ArgumentId,
    ) -> Result<(), TreeError> {
        let declared_on = self.argument(argument).owner;
        if declared_on != wrapper && !self.is_descendant_of(declared_on, wrapper) {
            return Err(TreeError::NotInSubtree { argument, wrapper });
        }
        if self.node(wrapper).arguments.contains(&argument) {
            return Err(TreeError::AlreadyPromoted { argument, wrapper });
        }
        self.nodes[wrapper.0 as usize].arguments.push(argument);
        Ok(())
    }

    /// Borrowed view of a location for predicate evaluation.
    pub fn location(&self, location: LocationRef) -> LocationView<'_> {
        match location {
            LocationRef::Variable(id) => LocationView::Variable(self.variable(id)),
            LocationRef::Argument(id) => LocationView::Argument(self.argument(id)),
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    mod construction {
        use super::*;

        #[test]
        fn attach_and_walk_owner_chain() {
            let mut tree = WorkflowTree::new();
            let root = tree.add_node("Main", NodeKind::Definition);
            let seq = tree.add_node("Sequence", NodeKind::Sequence);
            let step = tree.add_node("Step", NodeKind::Action);

            tree.attach_implementation_child(root, seq).unwrap();
            tree.attach_child(seq, step).unwrap();

            assert_eq!(tree.node(step).owner, Some(seq));
            assert_eq!(tree.node(seq).owner, Some(root));
            assert!(tree.node(root).owner.is_none());
            assert!(tree.is_descendant_of(step, root));
            assert!(!tree.is_descendant_of(root, step));
        }

        #[test]
        fn reattaching_owned_node_is_rejected() {
            let mut tree = WorkflowTree::new();
            let a = tree.add_node("A", NodeKind::Sequence);
            let b = tree.add_node("B", NodeKind::Sequence);
            let child = tree.add_node("C", NodeKind::Action);

            tree.attach_child(a, child).unwrap();
            let err = tree.attach_child(b, child).unwrap_err();
            assert!(matches!(err, TreeError::AlreadyOwned { owner, .. } if owner == a));
        }

        #[test]
        fn ownership_cycle_is_rejected() {
            let mut tree = WorkflowTree::new();
            let a = tree.add_node("A", NodeKind::Sequence);
            let b = tree.add_node("B", NodeKind::Sequence);

            tree.attach_child(a, b).unwrap();
            let err = tree.attach_child(b, a).unwrap_err();
            assert!(matches!(err, TreeError::OwnershipCycle { .. }));

            let err = tree.attach_child(a, a).unwrap_err();
            assert!(matches!(err, TreeError::OwnershipCycle { .. }));
        }

        #[test]
        fn implementation_children_stay_separate() {
            let mut tree = WorkflowTree::new();
            let root = tree.add_node("Root", NodeKind::Definition);
            let public = tree.add_node("Public", NodeKind::Action);
            let internal = tree.add_node("Internal", NodeKind::Action);

            tree.attach_child(root, public).unwrap();
            tree.attach_implementation_child(root, internal).unwrap();

            assert_eq!(tree.node(root).children, vec![public]);
            assert_eq!(tree.node(root).implementation_children, vec![internal]);
        }
    }

    mod declarations {
        use super::*;

        #[test]
        fn declaration_order_is_preserved() {
            let mut tree = WorkflowTree::new();
            let seq = tree.add_node("Sequence", NodeKind::Sequence);
            let v1 = tree.declare_variable(seq, "first", DataType::String);
            let v2 = tree.declare_variable(seq, "second", DataType::I64);

            assert_eq!(tree.node(seq).variables, vec![v1, v2]);
            assert_eq!(tree.variable(v1).name, "first");
            assert_eq!(tree.variable(v2).data_type, DataType::I64);
        }

        #[test]
        fn bound_argument_reports_bound() {
            let mut tree = WorkflowTree::new();
            let step = tree.add_node("Step", NodeKind::Action);
            let arg = tree.declare_argument(step, "to", DataType::String, ArgumentDirection::Out);

            assert!(!tree.argument(arg).is_bound());
            tree.bind_argument(arg, "[result]").unwrap();
            assert!(tree.argument(arg).is_bound());

            let err = tree.bind_argument(arg, "[other]").unwrap_err();
            assert!(matches!(err, TreeError::AlreadyBound { .. }));
        }

        #[test]
        fn promotion_requires_subtree_membership() {
            let mut tree = WorkflowTree::new();
            let wrapper = tree.add_node("Wrapper", NodeKind::Sequence);
            let inner = tree.add_node("Inner", NodeKind::Action);
            let outside = tree.add_node("Outside", NodeKind::Action);
            tree.attach_child(wrapper, inner).unwrap();

            let inner_arg =
                tree.declare_argument(inner, "result", DataType::String, ArgumentDirection::Out);
            let outside_arg =
                tree.declare_argument(outside, "result", DataType::String, ArgumentDirection::Out);

            tree.promote_argument(wrapper, inner_arg).unwrap();
            assert!(tree.node(wrapper).arguments.contains(&inner_arg));

            let err = tree.promote_argument(wrapper, outside_arg).unwrap_err();
            assert!(matches!(err, TreeError::NotInSubtree { .. }));

            let err = tree.promote_argument(wrapper, inner_arg).unwrap_err();
            assert!(matches!(err, TreeError::AlreadyPromoted { .. }));
        }
    }

    mod policy {
        use super::*;

        #[test]
        fn default_policies_match_kinds() {
            let branch = ScopePolicy::for_kind(&NodeKind::Branch);
            assert!(!branch.sequential_flow);
            assert!(!branch.exposes_arguments_to_body);

            let body = ScopePolicy::for_kind(&NodeKind::BranchBody);
            assert!(body.sequential_flow);
            assert!(body.exposes_arguments_to_body);

            let seq = ScopePolicy::for_kind(&NodeKind::Sequence);
            assert!(seq.sequential_flow);
            assert!(!seq.exposes_arguments_to_body);
        }

        #[test]
        fn custom_kind_takes_explicit_policy() {
            let mut tree = WorkflowTree::new();
            let scope = tree.add_node_with_policy(
                "GScope",
                NodeKind::Custom("g_scope".to_string()),
                ScopePolicy {
                    exposes_arguments_to_body: true,
                    sequential_flow: false,
                },
            );
            assert!(tree.node(scope).policy.exposes_arguments_to_body);
            assert!(!tree.node(scope).policy.sequential_flow);
        }
    }

    mod serialization {
        use super::*;

        #[test]
        fn tree_round_trips_through_json() {
            let mut tree = WorkflowTree::new();
            let root = tree.add_node("Main", NodeKind::Definition);
            let seq = tree.add_node("Body", NodeKind::Sequence);
            tree.attach_implementation_child(root, seq).unwrap();
            tree.declare_variable(seq, "v1", DataType::String);
            tree.declare_argument(root, "input", DataType::String, ArgumentDirection::In);

            let json = serde_json::to_string(&tree).unwrap();
            let back: WorkflowTree = serde_json::from_str(&json).unwrap();
            assert_eq!(tree, back);
        }
    }
}
