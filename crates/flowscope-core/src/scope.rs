//! Scope resolution: which locations are visible from a node.
//!
//! [`resolve_visible_locations`] walks the ownership chain from a start node
//! outward to the root, collecting two ordered sets:
//!
//! - **locals**: variables of each enclosing scope, plus the scope's own
//!   arguments when its policy exposes them to its body, innermost scope
//!   first and in declaration order within a scope;
//! - **reachable arguments**: arguments surfaced by earlier siblings of the
//!   walk boundary inside sequential-flow scopes, because workflow data flows
//!   left-to-right there.
//!
//! Filtering is entirely caller-driven: a type-compatibility predicate sees
//! every candidate location, and an eligibility predicate additionally gates
//! reachable arguments (the usual caller excludes `In`-direction and
//! already-bound arguments). The resolver stays agnostic to why a caller
//! filters.
//!
//! Resolution is a pure, synchronous, read-only walk. It never fails: no
//! visible location is a legal answer. The tree must be quiescent for the
//! duration of the call.

use std::collections::HashSet;

use tracing::trace;

use crate::tree::{Argument, ArgumentId, LocationRef, LocationView, NodeId, WorkflowTree};

// ============================================================================
// Result Types
// ============================================================================

/// An argument of an earlier sibling construct, visible for data-flow
/// purposes from a later point in the same scope.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub struct ReachableArgument {
    /// The reachable argument.
    pub argument: ArgumentId,
    /// The node declaring the argument (not necessarily the sibling it was
    /// reached through, when the sibling surfaced a promoted argument).
    pub owner: NodeId,
    /// The scope whose child ordering made the argument reachable.
    pub reached_through: NodeId,
}

/// Everything visible from a start node, in resolution order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VisibleLocations {
    /// Compatible locals, innermost scope first, declaration order within a
    /// scope.
    pub locals: Vec<LocationRef>,
    /// Compatible and eligible reachable arguments, by scope (innermost
    /// first), then sibling position, then declaration order.
    pub reachable_arguments: Vec<ReachableArgument>,
}

// ============================================================================
// Resolution
// ============================================================================

/// Resolve the locations visible from `start`.
///
/// `is_compatible` filters every candidate location; `is_eligible_argument`
/// additionally filters reachable arguments. Each location appears at most
/// once across the whole result; the first discovery wins.
///
/// # Panics
///
/// Panics if the tree's owner relation is internally inconsistent (a node
/// whose recorded owner does not list it as a child). That is a contract
/// violation by whoever built the tree, not a reportable condition.
pub fn resolve_visible_locations<C, E>(
    tree: &WorkflowTree,
    start: NodeId,
    mut is_compatible: C,
    mut is_eligible_argument: E,
) -> VisibleLocations
where
    C: FnMut(&LocationView<'_>) -> bool,
    E: FnMut(&Argument) -> bool,
{
    let mut locals = Vec::new();
    let mut reachable_arguments = Vec::new();
    let mut seen: HashSet<LocationRef> = HashSet::new();

    let mut boundary = start;
    let mut current = tree.node(start).owner;

    while let Some(scope_id) = current {
        let scope = tree.node(scope_id);

        // Locals step: the scope's variables, then its own arguments when the
        // policy puts them in scope for the body.
        for &variable_id in &scope.variables {
            let variable = tree.variable(variable_id);
            let location = LocationRef::Variable(variable_id);
            if is_compatible(&LocationView::Variable(variable)) && seen.insert(location) {
                locals.push(location);
            }
        }
        if scope.policy.exposes_arguments_to_body {
            for &argument_id in &scope.arguments {
                let argument = tree.argument(argument_id);
                let location = LocationRef::Argument(argument_id);
                if is_compatible(&LocationView::Argument(argument)) && seen.insert(location) {
                    locals.push(location);
                }
            }
        }

        // Reachable-arguments step: earlier siblings of the boundary, within
        // the collection the boundary belongs to, surface their arguments
        // when data flows left-to-right through this scope.
        if scope.policy.sequential_flow {
            for &sibling_id in earlier_siblings(tree, scope_id, boundary) {
                let sibling = tree.node(sibling_id);
                for &argument_id in &sibling.arguments {
                    let argument = tree.argument(argument_id);
                    let location = LocationRef::Argument(argument_id);
                    if is_compatible(&LocationView::Argument(argument))
                        && is_eligible_argument(argument)
                        && seen.insert(location)
                    {
                        reachable_arguments.push(ReachableArgument {
                            argument: argument_id,
                            owner: argument.owner,
                            reached_through: scope_id,
                        });
                    }
                }
            }
        }

        trace!(
            scope = %scope_id,
            locals = locals.len(),
            reachable = reachable_arguments.len(),
            "visited scope layer"
        );

        boundary = scope_id;
        current = scope.owner;
    }

    VisibleLocations {
        locals,
        reachable_arguments,
    }
}

/// The siblings preceding `boundary` in its own collection under `scope`.
///
/// Public and implementation children never mix: a boundary sitting in the
/// implementation collection has no public siblings, and vice versa.
fn earlier_siblings<'t>(tree: &'t WorkflowTree, scope: NodeId, boundary: NodeId) -> &'t [NodeId] {
    let node = tree.node(scope);
    if let Some(position) = node.children.iter().position(|&id| id == boundary) {
        return &node.children[..position];
    }
    if let Some(position) = node
        .implementation_children
        .iter()
        .position(|&id| id == boundary)
    {
        return &node.implementation_children[..position];
    }
    panic!("{boundary} is not a child of its recorded owner {scope}");
}

// ============================================================================
// Tests
// ============================================================================
