//! JSON-patch validation and application with protected-field enforcement.
//!
//! Paths are RFC 6901 JSON pointers. Validation is per effect: one bad
//! operation fails the whole operation list before anything is applied.

use serde_json::Value;
use worldloom_core::{EffectError, EntityType, PatchOp, PatchOpKind};

/// Prefixes no patch may ever touch, shared by every entity type.
const PROTECTED_PREFIXES: [&str; 7] = [
    "/id",
    "/createdAt",
    "/updatedAt",
    "/version",
    "/deletedAt",
    "/archivedAt",
    "/campaignId",
];

/// Relationship keys protected per entity type, on top of the shared set.
/// Matches the entity shells: settlements point at their kingdom and
/// location, structures at their settlement.
fn relationship_prefixes(entity_type: EntityType) -> &'static [&'static str] {
    match entity_type {
        EntityType::Settlement => &["/kingdomId", "/locationId"],
        EntityType::Structure => &["/settlementId"],
        _ => &[],
    }
}

/// Allow-list prefixes a patch path must start with.
fn allowed_prefixes(entity_type: EntityType) -> &'static [&'static str] {
    match entity_type {
        EntityType::Encounter | EntityType::Event => &["/variables/", "/state/"],
        _ => &["/variables/"],
    }
}

/// Whether `path` equals or sits under `prefix` in pointer terms.
fn under(path: &str, prefix: &str) -> bool {
    path == prefix || path.starts_with(&format!("{prefix}/"))
}

fn check_path(entity_type: EntityType, path: &str) -> Result<(), EffectError> {
    for prefix in PROTECTED_PREFIXES
        .iter()
        .chain(relationship_prefixes(entity_type))
    {
        if under(path, prefix) {
            return Err(EffectError::ProtectedPath {
                path: path.to_string(),
            });
        }
    }
    if !allowed_prefixes(entity_type)
        .iter()
        .any(|prefix| path.starts_with(prefix))
    {
        return Err(EffectError::PathNotAllowed {
            entity_type,
            path: path.to_string(),
        });
    }
    Ok(())
}

/// Validate an operation list against the entity type's path rules.
pub fn validate_ops(entity_type: EntityType, ops: &[PatchOp]) -> Result<(), EffectError> {
    for op in ops {
        check_path(entity_type, &op.path)?;
        match op.op {
            PatchOpKind::Add | PatchOpKind::Replace | PatchOpKind::Test => {
                if op.value.is_none() {
                    return Err(EffectError::MissingField {
                        op: op.op,
                        field: "value",
                    });
                }
            }
            PatchOpKind::Copy | PatchOpKind::Move => {
                let Some(from) = &op.from else {
                    return Err(EffectError::MissingField {
                        op: op.op,
                        field: "from",
                    });
                };
                check_path(entity_type, from)?;
            }
            PatchOpKind::Remove => {}
        }
    }
    Ok(())
}

/// Apply a validated operation list to a document.
///
/// Returns the distinct pointer paths the list references, in first-use
/// order; these become the `affected_fields` of the execution record.
pub fn apply_ops(document: &mut Value, ops: &[PatchOp]) -> Result<Vec<String>, EffectError> {
    let mut affected = Vec::new();
    let touch = |path: &str, affected: &mut Vec<String>| {
        if !affected.iter().any(|p| p == path) {
            affected.push(path.to_string());
        }
    };

    for op in ops {
        match op.op {
            PatchOpKind::Add => {
                let value = require_value(op)?;
                add(document, &op.path, value)?;
            }
            PatchOpKind::Replace => {
                let value = require_value(op)?;
                let target =
                    document
                        .pointer_mut(&op.path)
                        .ok_or_else(|| EffectError::PathNotFound {
                            path: op.path.clone(),
                        })?;
                *target = value;
            }
            PatchOpKind::Remove => {
                remove(document, &op.path)?;
            }
            PatchOpKind::Test => {
                let expected = require_value(op)?;
                if document.pointer(&op.path) != Some(&expected) {
                    return Err(EffectError::TestFailed {
                        path: op.path.clone(),
                    });
                }
            }
            PatchOpKind::Copy => {
                let from = require_from(op)?;
                let value = document
                    .pointer(from)
                    .cloned()
                    .ok_or_else(|| EffectError::PathNotFound {
                        path: from.to_string(),
                    })?;
                add(document, &op.path, value)?;
                touch(from, &mut affected);
            }
            PatchOpKind::Move => {
                let from = require_from(op)?;
                let value = remove(document, from)?;
                add(document, &op.path, value)?;
                touch(from, &mut affected);
            }
        }
        touch(&op.path, &mut affected);
    }
    Ok(affected)
}

fn require_value(op: &PatchOp) -> Result<Value, EffectError> {
    op.value.clone().ok_or(EffectError::MissingField {
        op: op.op,
        field: "value",
    })
}

fn require_from(op: &PatchOp) -> Result<&str, EffectError> {
    op.from.as_deref().ok_or(EffectError::MissingField {
        op: op.op,
        field: "from",
    })
}

/// RFC 6901 token unescaping: `~1` is `/`, `~0` is `~`.
fn unescape(token: &str) -> String {
    token.replace("~1", "/").replace("~0", "~")
}

fn split_parent(path: &str) -> Result<(&str, String), EffectError> {
    let split_at = path.rfind('/').ok_or_else(|| EffectError::PathNotFound {
        path: path.to_string(),
    })?;
    Ok((&path[..split_at], unescape(&path[split_at + 1..])))
}

fn add(document: &mut Value, path: &str, value: Value) -> Result<(), EffectError> {
    let (parent_path, token) = split_parent(path)?;
    let parent = document
        .pointer_mut(parent_path)
        .ok_or_else(|| EffectError::PathNotFound {
            path: parent_path.to_string(),
        })?;

    match parent {
        Value::Object(map) => {
            map.insert(token, value);
            Ok(())
        }
        Value::Array(array) => {
            if token == "-" {
                array.push(value);
                return Ok(());
            }
            let index: usize = token.parse().map_err(|_| EffectError::PathNotFound {
                path: path.to_string(),
            })?;
            if index > array.len() {
                return Err(EffectError::PathNotFound {
                    path: path.to_string(),
                });
            }
            array.insert(index, value);
            Ok(())
        }
        _ => Err(EffectError::PathNotFound {
            path: parent_path.to_string(),
        }),
    }
}

fn remove(document: &mut Value, path: &str) -> Result<Value, EffectError> {
    let (parent_path, token) = split_parent(path)?;
    let parent = document
        .pointer_mut(parent_path)
        .ok_or_else(|| EffectError::PathNotFound {
            path: parent_path.to_string(),
        })?;

    match parent {
        Value::Object(map) => map.remove(&token).ok_or_else(|| EffectError::PathNotFound {
            path: path.to_string(),
        }),
        Value::Array(array) => {
            let index: usize = token.parse().map_err(|_| EffectError::PathNotFound {
                path: path.to_string(),
            })?;
            if index >= array.len() {
                return Err(EffectError::PathNotFound {
                    path: path.to_string(),
                });
            }
            Ok(array.remove(index))
        }
        _ => Err(EffectError::PathNotFound {
            path: parent_path.to_string(),
        }),
    }
}

// ============================================================================
// TESTS
// ============================================================================
