// SPDX-License-Identifier: MIT OR Apache-2.0
//! Pure deep-merge of a state diff into current state (design §4.11):
//! recursive object merge; arrays and scalars are replaced by key, never
//! concatenated.

use serde_json::Value;

/// Merge `diff` into `state`, returning a new value. Objects merge
/// key-by-key recursively; any non-object value in `diff` (including
/// arrays) replaces the corresponding value in `state` outright.
pub fn deep_merge(state: &Value, diff: &Value) -> Value {
    match (state, diff) {
        (Value::Object(base), Value::Object(patch)) => {
            let mut merged = base.clone();
            for (key, patch_value) in patch {
                let next = match merged.get(key) {
                    Some(base_value) => deep_merge(base_value, patch_value),
                    None => patch_value.clone(),
                };
                merged.insert(key.clone(), next);
            }
            Value::Object(merged)
        }
        _ => diff.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn merges_nested_objects() {
        let state = json!({"a": {"x": 1, "y": 2}, "b": 3});
        let diff = json!({"a": {"y": 20}});
        let merged = deep_merge(&state, &diff);
        assert_eq!(merged, json!({"a": {"x": 1, "y": 20}, "b": 3}));
    }

    #[test]
    fn arrays_are_replaced_not_concatenated() {
        let state = json!({"items": [1, 2, 3]});
        let diff = json!({"items": [9]});
        let merged = deep_merge(&state, &diff);
        assert_eq!(merged, json!({"items": [9]}));
    }

    #[test]
    fn scalars_are_replaced() {
        let state = json!({"count": 1});
        let diff = json!({"count": 2});
        assert_eq!(deep_merge(&state, &diff), json!({"count": 2}));
    }

    #[test]
    fn new_keys_are_added() {
        let state = json!({"a": 1});
        let diff = json!({"b": 2});
        assert_eq!(deep_merge(&state, &diff), json!({"a": 1, "b": 2}));
    }

    #[test]
    fn is_pure_and_does_not_mutate_inputs() {
        let state = json!({"a": 1});
        let diff = json!({"a": 2});
        let _ = deep_merge(&state, &diff);
        assert_eq!(state, json!({"a": 1}));
    }
}
