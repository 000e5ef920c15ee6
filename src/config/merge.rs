//! Configuration layer merging
//!
//! Tables merge key by key, everything else (arrays included) is replaced by
//! the later layer.

use serde_json::Value;

/// Merge `overlay` into `base` in place.
pub fn merge_into(base: &mut Value, overlay: Value) {
    match (base, overlay) {
        (Value::Object(base_map), Value::Object(overlay_map)) => {
            for (key, value) in overlay_map {
                match base_map.get_mut(&key) {
                    Some(existing) => merge_into(existing, value),
                    None => {
                        base_map.insert(key, value);
                    }
                }
            }
        }
        (slot, overlay) => *slot = overlay,
    }
}

/// Merge layers in order; later layers take precedence.
pub fn merge_layers(layers: impl IntoIterator<Item = Value>) -> Value {
    let mut merged = Value::Null;
    for layer in layers {
        merge_into(&mut merged, layer);
    }
    merged
}
