//! Core model for flowscope.
//!
//! This crate provides the language-agnostic half of flowscope:
//! - Arena-backed workflow activity tree (nodes, variables, arguments)
//! - Location references shared by variables and arguments
//! - Scope resolution with reachable-argument tracking

pub mod scope;
pub mod tree;

pub use scope::{resolve_visible_locations, ReachableArgument, VisibleLocations};
pub use tree::{
    Argument, ArgumentDirection, ArgumentId, DataType, LocationRef, LocationView, Node, NodeId,
    NodeKind, ScopePolicy, TreeError, Variable, VariableId, WorkflowTree,
};
