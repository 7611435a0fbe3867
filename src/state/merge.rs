// ABOUTME: RFC-7396-style diff merge for cached server and group state
// ABOUTME: Null deletes, nested objects merge one level deep, arrays replace

use serde_json::Value;

/// Apply `diff` onto `target`.
///
/// Rules, applied to the top-level object and recursively exactly one level
/// deep: `null` at a key deletes it; an object value at a key whose existing
/// value is also an object merges; any other value replaces. Arrays are
/// leaves. A non-object diff replaces `target` wholesale.
pub fn merge_diff(target: &mut Value, diff: Value) {
    merge_depth(target, diff, 1);
}

fn merge_depth(target: &mut Value, diff: Value, remaining: u8) {
    let diff_map = match diff {
        Value::Object(map) => map,
        other => {
            *target = other;
            return;
        }
    };

    if !target.is_object() {
        *target = Value::Object(diff_map);
        return;
    }

    let target_map = target.as_object_mut().unwrap();
    for (key, value) in diff_map {
        if value.is_null() {
            target_map.remove(&key);
        } else if remaining > 0
            && value.is_object()
            && target_map.get(&key).is_some_and(Value::is_object)
        {
            merge_depth(target_map.get_mut(&key).unwrap(), value, remaining - 1);
        } else {
            target_map.insert(key, value);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_null_deletes_key() {
        let mut state = json!({"a": 1, "b": 2});
        merge_diff(&mut state, json!({"a": null}));
        assert_eq!(state, json!({"b": 2}));
    }

    #[test]
    fn test_nested_object_merges_one_level() {
        let mut state = json!({"controller": {"volume": 50, "muted": false}});
        merge_diff(&mut state, json!({"controller": {"volume": 80}}));
        assert_eq!(state, json!({"controller": {"volume": 80, "muted": false}}));
    }

    #[test]
    fn test_deep_objects_replace() {
        let mut state = json!({"a": {"b": {"x": 1, "y": 2}}});
        merge_diff(&mut state, json!({"a": {"b": {"x": 3}}}));
        // Two levels down: replaced, not merged.
        assert_eq!(state, json!({"a": {"b": {"x": 3}}}));
    }

    #[test]
    fn test_arrays_are_leaves() {
        let mut state = json!({"commands": ["play", "pause"]});
        merge_diff(&mut state, json!({"commands": ["stop"]}));
        assert_eq!(state, json!({"commands": ["stop"]}));
    }

    #[test]
    fn test_empty_diff_is_identity() {
        let mut state = json!({"a": 1, "b": {"c": 2}});
        let before = state.clone();
        merge_diff(&mut state, json!({}));
        assert_eq!(state, before);
    }

    #[test]
    fn test_leaf_diff_is_idempotent() {
        let diff = json!({"a": 7, "b": null, "c": "x"});
        let mut once = json!({"a": 1, "b": 2, "d": 4});
        merge_diff(&mut once, diff.clone());
        let mut twice = once.clone();
        merge_diff(&mut twice, diff);
        assert_eq!(once, twice);
    }
}
