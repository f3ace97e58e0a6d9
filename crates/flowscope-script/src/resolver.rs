//! Unit references and the function namespace table.
//!
//! A compile references units by name. A [`UnitResolver`] turns each name
//! into [`UnitMetadata`] describing the namespaces and function signatures
//! the unit provides; the resolved metadata is flattened into one
//! [`FunctionTable`] the analyzer looks calls up in. An unresolvable
//! reference degrades to a warning, so a compile against a missing unit
//! still reports every other problem it can find.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use flowscope_core::DataType;

use crate::diagnostics::{codes, Diagnostic};

/// Signature of one provided function.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FnSig {
    pub params: Vec<DataType>,
    pub ret: DataType,
}

impl FnSig {
    pub fn new(params: Vec<DataType>, ret: DataType) -> Self {
        FnSig { params, ret }
    }
}

/// What one referenced unit provides, keyed namespace then function name.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnitMetadata {
    pub name: String,
    pub namespaces: BTreeMap<String, BTreeMap<String, FnSig>>,
}

/// Maps unit names to their metadata.
pub trait UnitResolver {
    fn resolve(&self, unit_name: &str) -> Option<UnitMetadata>;
}

/// Name of the built-in unit every environment can reference.
pub const BUILTINS_UNIT: &str = "flowscope.builtins";

/// Resolver that knows only [`BUILTINS_UNIT`].
#[derive(Debug, Default, Clone, Copy)]
pub struct BuiltinResolver;

impl UnitResolver for BuiltinResolver {
    fn resolve(&self, unit_name: &str) -> Option<UnitMetadata> {
        (unit_name == BUILTINS_UNIT).then(builtin_metadata)
    }
}

/// The `Text`, `Math` and `Convert` namespaces of the built-in unit.
pub fn builtin_metadata() -> UnitMetadata {
    use DataType::{Bool, F64, I64, String as Str};

    let mut namespaces: BTreeMap<String, BTreeMap<String, FnSig>> = BTreeMap::new();

    let text = namespaces.entry("Text".to_string()).or_default();
    text.insert("Len".to_string(), FnSig::new(vec![Str], I64));
    text.insert("Upper".to_string(), FnSig::new(vec![Str], Str));
    text.insert("Lower".to_string(), FnSig::new(vec![Str], Str));
    text.insert("Trim".to_string(), FnSig::new(vec![Str], Str));
    text.insert("Contains".to_string(), FnSig::new(vec![Str, Str], Bool));

    let math = namespaces.entry("Math".to_string()).or_default();
    math.insert("Abs".to_string(), FnSig::new(vec![F64], F64));
    math.insert("Min".to_string(), FnSig::new(vec![F64, F64], F64));
    math.insert("Max".to_string(), FnSig::new(vec![F64, F64], F64));
    math.insert("Floor".to_string(), FnSig::new(vec![F64], F64));

    let convert = namespaces.entry("Convert".to_string()).or_default();
    convert.insert("ToText".to_string(), FnSig::new(vec![F64], Str));
    convert.insert("ToNumber".to_string(), FnSig::new(vec![Str], F64));

    UnitMetadata {
        name: BUILTINS_UNIT.to_string(),
        namespaces,
    }
}

// ============================================================================
// Function table
// ============================================================================

/// Flattened view of every namespace the referenced units provide.
#[derive(Debug, Clone, Default)]
pub struct FunctionTable {
    namespaces: BTreeMap<String, BTreeMap<String, FnSig>>,
}

impl FunctionTable {
    /// Resolve each referenced unit and merge its namespaces. Units that do
    /// not resolve produce a warning and contribute nothing. When two units
    /// provide the same function name in the same namespace, the later
    /// reference wins.
    pub fn from_references(
        resolver: &dyn UnitResolver,
        referenced_units: &[String],
    ) -> (Self, Vec<Diagnostic>) {
        let mut table = FunctionTable::default();
        let mut diagnostics = Vec::new();
        for unit in referenced_units {
            match resolver.resolve(unit) {
                Some(metadata) => {
                    for (namespace, functions) in metadata.namespaces {
                        table
                            .namespaces
                            .entry(namespace)
                            .or_default()
                            .extend(functions);
                    }
                }
                None => diagnostics.push(Diagnostic::warning(
                    codes::UNKNOWN_UNIT,
                    format!("referenced unit '{unit}' could not be resolved"),
                )),
            }
        }
        (table, diagnostics)
    }

    /// Warn for each imported namespace no referenced unit provides.
    pub fn check_imports(&self, imported_namespaces: &[String]) -> Vec<Diagnostic> {
        imported_namespaces
            .iter()
            .filter(|namespace| !self.namespaces.contains_key(*namespace))
            .map(|namespace| {
                Diagnostic::warning(
                    codes::UNKNOWN_NAMESPACE,
                    format!("imported namespace '{namespace}' is not provided by any referenced unit"),
                )
            })
            .collect()
    }

    pub fn lookup_qualified(&self, namespace: &str, name: &str) -> Option<&FnSig> {
        self.namespaces.get(namespace)?.get(name)
    }

    /// Search the imported namespaces, in order, for an unqualified name.
    /// The first namespace that provides the name wins.
    pub fn lookup_imported<'a>(
        &'a self,
        imported_namespaces: &'a [String],
        name: &str,
    ) -> Option<(&'a str, &'a FnSig)> {
        imported_namespaces.iter().find_map(|namespace| {
            let functions = self.namespaces.get(namespace)?;
            functions.get(name).map(|sig| (namespace.as_str(), sig))
        })
    }
}
