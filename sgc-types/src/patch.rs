//! JSON merge patch (RFC 7386).
//!
//! Queued visit mutations are merge patches over the entity payload. The
//! same function applies a mutation locally, on the server, and when the
//! reconciler replays pending mutations over a fresh server payload.

use serde_json::Value;

/// Applies `patch` to `target` in place.
///
/// Object members are merged recursively, `null` removes a member, and any
/// non-object patch replaces the target wholesale.
pub fn merge_patch(target: &mut Value, patch: &Value) {
    let Value::Object(patch_map) = patch else {
        *target = patch.clone();
        return;
    };

    if !target.is_object() {
        *target = Value::Object(serde_json::Map::new());
    }

    if let Value::Object(target_map) = target {
        for (key, value) in patch_map {
            if value.is_null() {
                target_map.remove(key);
            } else {
                let entry = target_map.entry(key.clone()).or_insert(Value::Null);
                merge_patch(entry, value);
            }
        }
    }
}

/// Folds a sequence of patches over `base`, in order.
pub fn apply_all<'a>(base: &Value, patches: impl IntoIterator<Item = &'a Value>) -> Value {
    let mut out = base.clone();
    for patch in patches {
        merge_patch(&mut out, patch);
    }
    out
}
