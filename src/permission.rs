//! Permission Evaluator (C7): checks whether a credential's permission
//! map allows a given action key.
//!
//! A pure function over `&HashMap<String, bool>` — no I/O, fully
//! unit-testable, matching the Design Notes' "typed errors / explicit
//! predicate" philosophy. `spec.md`'s "Permission idempotence"
//! property (depends only on the normalized action key) is trivial to
//! state against this shape.

use std::collections::HashMap;

/// Normalize an action key: trim, lower-case, replace `-` with `_`.
#[must_use]
pub fn normalize(action: &str) -> String {
    action.trim().to_lowercase().replace('-', "_")
}

/// Decide whether `action` is allowed under `permission_map`.
///
/// Decision table (first match wins):
/// 1. Map absent/empty → allow.
/// 2. `*`, `all`, or `__all__` mapped to `true` → allow.
/// 3. Normalized action → explicit `true`/`false`.
/// 4. Hyphenated variant of the normalized action → explicit
///    `true`/`false`.
/// 5. Otherwise → deny.
#[must_use]
pub fn is_allowed(permission_map: Option<&HashMap<String, bool>>, action: &str) -> bool {
    let Some(map) = permission_map else {
        return true;
    };
    if map.is_empty() {
        return true;
    }

    for wildcard in ["*", "all", "__all__"] {
        if map.get(wildcard) == Some(&true) {
            return true;
        }
    }

    let normalized = normalize(action);
    if let Some(&allowed) = map.get(&normalized) {
        return allowed;
    }

    let hyphenated = normalized.replace('_', "-");
    if let Some(&allowed) = map.get(&hyphenated) {
        return allowed;
    }

    false
}
