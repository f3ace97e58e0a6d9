//! Loading emitted images into the process-wide registry.
//!
//! Loaded images are keyed by content hash and never unloaded; loading the
//! same bytes twice yields the same [`LoadedImage`]. The registry only
//! grows, matching the lifetime of compiled code in the host process.

use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, OnceLock};
use thiserror::Error;
use tracing::debug;

use flowscope_core::DataType;

use crate::emit::{UnitImage, IMAGE_FORMAT_VERSION};
use crate::eval::{run_ops, EvalError, LocationLookup, Value};

/// Image bytes that do not load.
#[derive(Debug, Error)]
pub enum LoadError {
    #[error("image does not decode: {0}")]
    Malformed(String),
    #[error("image format {found} is not supported (current is {IMAGE_FORMAT_VERSION})")]
    UnsupportedFormat { found: u32 },
}

static REGISTRY: OnceLock<Mutex<HashMap<String, Arc<LoadedImage>>>> = OnceLock::new();

fn registry() -> &'static Mutex<HashMap<String, Arc<LoadedImage>>> {
    REGISTRY.get_or_init(|| Mutex::new(HashMap::new()))
}

/// Load image bytes into the registry.
///
/// Idempotent: bytes with a hash already present return the cached image.
pub fn load_image(bytes: &[u8]) -> Result<Arc<LoadedImage>, LoadError> {
    let hash = hex::encode(Sha256::digest(bytes));
    {
        let cache = registry().lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        if let Some(image) = cache.get(&hash) {
            debug!(%hash, "image already loaded");
            return Ok(Arc::clone(image));
        }
    }

    let image: UnitImage =
        serde_json::from_slice(bytes).map_err(|err| LoadError::Malformed(err.to_string()))?;
    if image.format != IMAGE_FORMAT_VERSION {
        return Err(LoadError::UnsupportedFormat {
            found: image.format,
        });
    }
    let loaded = Arc::new(LoadedImage {
        hash: hash.clone(),
        image,
    });

    let mut cache = registry().lock().unwrap_or_else(|poisoned| poisoned.into_inner());
    // A concurrent load of identical bytes may have won the race; keep the
    // first entry so equal hashes always alias one image.
    let entry = cache.entry(hash.clone()).or_insert_with(|| {
        debug!(%hash, units = loaded.image.units.len(), "image loaded");
        Arc::clone(&loaded)
    });
    Ok(Arc::clone(entry))
}

/// One loaded image: the decoded units plus their content hash.
#[derive(Debug)]
pub struct LoadedImage {
    hash: String,
    image: UnitImage,
}

impl LoadedImage {
    /// Hex SHA-256 of the image bytes; the registry key.
    pub fn content_hash(&self) -> &str {
        &self.hash
    }

    /// Names of the units the image carries, in emission order.
    pub fn unit_names(&self) -> impl Iterator<Item = &str> {
        self.image.units.iter().map(|unit| unit.name.as_str())
    }

    /// Extract a unit by name.
    pub fn nested_type(self: &Arc<Self>, name: &str) -> Option<LoadedType> {
        let unit_index = self
            .image
            .units
            .iter()
            .position(|unit| unit.name == name)?;
        Some(LoadedType {
            image: Arc::clone(self),
            unit_index,
        })
    }
}

/// A unit extracted from a loaded image, ready to invoke.
#[derive(Debug, Clone)]
pub struct LoadedType {
    image: Arc<LoadedImage>,
    unit_index: usize,
}

impl LoadedType {
    pub fn name(&self) -> &str {
        &self.image.image.units[self.unit_index].name
    }

    /// The signature of a member, if it exists.
    pub fn member_signature(&self, member: &str) -> Option<(&[(String, DataType)], &DataType)> {
        let member = self.image.image.units[self.unit_index]
            .members
            .iter()
            .find(|m| m.name == member)?;
        Some((&member.params, &member.return_type))
    }

    /// Invoke a member with the given arguments.
    ///
    /// Argument types must match the member signature exactly; callers widen
    /// integers themselves where they mean to pass `f64`.
    pub fn invoke(&self, member: &str, args: &[Value]) -> Result<Value, EvalError> {
        let unit = &self.image.image.units[self.unit_index];
        let member_def = unit
            .members
            .iter()
            .find(|m| m.name == member)
            .ok_or_else(|| EvalError::MissingMember {
                name: format!("{}.{member}", unit.name),
            })?;
        if args.len() != member_def.params.len() {
            return Err(EvalError::Arity {
                name: format!("{}.{member}", unit.name),
                expected: member_def.params.len(),
                actual: args.len(),
            });
        }
        for (index, (arg, (_, want))) in args.iter().zip(&member_def.params).enumerate() {
            if arg.data_type() != *want {
                return Err(EvalError::ArgumentType {
                    name: format!("{}.{member}", unit.name),
                    index,
                    expected: want.clone(),
                    actual: arg.data_type(),
                });
            }
        }
        run_ops(&member_def.ops, args, &NoLocations)
    }
}

/// Unit members close over parameters only, never ambient locations.
struct NoLocations;

impl LocationLookup for NoLocations {
    fn value_of(&self, _name: &str) -> Option<Value> {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::emit::{ImageMember, ImageUnit, Op};

    fn image_bytes(unit_name: &str) -> Vec<u8> {
        let image = UnitImage {
            format: IMAGE_FORMAT_VERSION,
            units: vec![ImageUnit {
                name: unit_name.to_string(),
                members: vec![ImageMember {
                    name: "Double".to_string(),
                    params: vec![("n".to_string(), DataType::I64)],
                    return_type: DataType::I64,
                    ops: vec![Op::LoadParam(0), Op::PushI64(2), Op::Mul],
                }],
            }],
        };
        serde_json::to_vec(&image).unwrap()
    }

    #[test]
    fn loading_twice_aliases_one_image() {
        let bytes = image_bytes("ALIAS_TEST");
        let first = load_image(&bytes).unwrap();
        let second = load_image(&bytes).unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(first.content_hash(), second.content_hash());
    }

    #[test]
    fn extracted_type_invokes_members() {
        let loaded = load_image(&image_bytes("INVOKE_TEST")).unwrap();
        let ty = loaded.nested_type("INVOKE_TEST").unwrap();
        assert_eq!(ty.name(), "INVOKE_TEST");
        assert_eq!(
            ty.invoke("Double", &[Value::I64(21)]),
            Ok(Value::I64(42))
        );
        assert!(loaded.nested_type("OTHER").is_none());
    }

    #[test]
    fn invoke_checks_member_name_arity_and_types() {
        let loaded = load_image(&image_bytes("CHECKS_TEST")).unwrap();
        let ty = loaded.nested_type("CHECKS_TEST").unwrap();

        assert!(matches!(
            ty.invoke("Missing", &[]),
            Err(EvalError::MissingMember { .. })
        ));
        assert!(matches!(
            ty.invoke("Double", &[]),
            Err(EvalError::Arity {
                expected: 1,
                actual: 0,
                ..
            })
        ));
        assert!(matches!(
            ty.invoke("Double", &[Value::Bool(true)]),
            Err(EvalError::ArgumentType { index: 0, .. })
        ));
    }

    #[test]
    fn malformed_and_future_format_bytes_are_rejected() {
        assert!(matches!(
            load_image(b"not an image"),
            Err(LoadError::Malformed(_))
        ));

        let image = UnitImage {
            format: IMAGE_FORMAT_VERSION + 1,
            units: Vec::new(),
        };
        let bytes = serde_json::to_vec(&image).unwrap();
        assert!(matches!(
            load_image(&bytes),
            Err(LoadError::UnsupportedFormat { .. })
        ));
    }
}
