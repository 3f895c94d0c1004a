//! Dotted-path field access against [`serde_json::Value`].
//!
//! Role templates (`group.{ID}.read`) and the event envelope's flattened
//! value map both need a uniform "read field by dotted name" contract
//! against whatever shape an endpoint's input or output happens to be.
//! Rather than generating an accessor per input type, every endpoint value
//! in this runtime is a `serde_json::Value`, so one small walker covers
//! both uses.

use std::collections::HashMap;

use serde_json::Value;

/// Look up a dotted path (`"Group.OrgPtr.Name"`) inside a JSON value.
/// Object keys are matched case-sensitively; array indices are accepted as
/// numeric path segments.
pub fn get_path<'a>(value: &'a Value, path: &str) -> Option<&'a Value> {
    path.split('.').try_fold(value, |current, segment| match current {
        Value::Object(map) => map.get(segment),
        Value::Array(items) => segment.parse::<usize>().ok().and_then(|i| items.get(i)),
        _ => None,
    })
}

/// Render a `Value` as a plain string for substitution/flattening purposes.
fn scalar_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

/// Substitute every `{Path}` placeholder in `template` with the value found
/// at that dotted path inside `input`. Returns `None` if any placeholder
/// cannot be resolved, matching the source's "missing path variable" role
/// template failure mode.
///
/// ```ignore
/// resolve_template("group.{ID}.read", &json!({"ID": 123})) == Some("group.123.read".into())
/// ```
pub fn resolve_template(template: &str, input: &Value) -> Option<String> {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;
    while let Some(start) = rest.find('{') {
        let end = rest[start..].find('}')?;
        out.push_str(&rest[..start]);
        let path = &rest[start + 1..start + end];
        let resolved = get_path(input, path)?;
        out.push_str(&scalar_string(resolved));
        rest = &rest[start + end + 1..];
    }
    out.push_str(rest);
    Some(out)
}

/// Flatten a JSON value into a dotted-path string map, the shape the event
/// envelope's `Values` field uses on the wire. Nested objects contribute
/// `Parent.Child` keys; arrays contribute one entry per element under the
/// same key (e.g. repeated `Tags` values).
pub fn flatten(value: &Value) -> HashMap<String, Vec<String>> {
    let mut out = HashMap::new();
    flatten_into("", value, &mut out);
    out
}

fn flatten_into(prefix: &str, value: &Value, out: &mut HashMap<String, Vec<String>>) {
    match value {
        Value::Object(map) => {
            for (key, val) in map {
                let full_key = if prefix.is_empty() { key.clone() } else { format!("{prefix}.{key}") };
                flatten_into(&full_key, val, out);
            }
        }
        Value::Array(items) => {
            for item in items {
                out.entry(prefix.to_string()).or_default().push(scalar_string(item));
            }
        }
        Value::Null if prefix.is_empty() => {}
        other => {
            out.entry(prefix.to_string()).or_default().push(scalar_string(other));
        }
    }
}

/// The inverse of [`flatten`]: rebuild a nested JSON object from a
/// dotted-path string map, the shape an event handler's fresh input takes
/// when reconstituted from a published event's `Values` field. Leaves are
/// always strings (or a string array for a repeated key) — there is no
/// generated struct to coerce them back to a richer type, matching how
/// `flatten` renders every scalar as its string form on the way out.
pub fn unflatten(values: &HashMap<String, Vec<String>>) -> Value {
    let mut root = Value::Object(serde_json::Map::new());
    for (path, items) in values {
        if path.is_empty() {
            continue;
        }
        let value = match items.as_slice() {
            [] => Value::Null,
            [single] => Value::String(single.clone()),
            many => Value::Array(many.iter().cloned().map(Value::String).collect()),
        };
        set_path(&mut root, path, value);
    }
    root
}

fn set_path(root: &mut Value, path: &str, value: Value) {
    let segments: Vec<&str> = path.split('.').collect();
    let mut current = root;
    for (i, segment) in segments.iter().enumerate() {
        if !current.is_object() {
            *current = Value::Object(serde_json::Map::new());
        }
        let map = current.as_object_mut().expect("just normalized to an object above");
        if i == segments.len() - 1 {
            map.insert((*segment).to_string(), value);
            return;
        }
        current = map.entry((*segment).to_string()).or_insert_with(|| Value::Object(serde_json::Map::new()));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn resolves_nested_path() {
        let input = json!({"Group": {"OrgPtr": {"Name": "acme"}}});
        assert_eq!(get_path(&input, "Group.OrgPtr.Name").unwrap(), "acme");
    }

    #[test]
    fn resolve_template_substitutes_path_variables() {
        let input = json!({"ID": 123});
        assert_eq!(resolve_template("group.{ID}.read", &input).unwrap(), "group.123.read");
    }

    #[test]
    fn resolve_template_fails_on_unresolved_placeholder() {
        let input = json!({});
        assert!(resolve_template("group.{ID}.read", &input).is_none());
    }

    #[test]
    fn flatten_produces_dotted_keys_for_nested_fields() {
        let value = json!({"ContactInfo": {"Email": "a@b.com"}, "Text": "HI"});
        let flat = flatten(&value);
        assert_eq!(flat.get("ContactInfo.Email").unwrap(), &vec!["a@b.com".to_string()]);
        assert_eq!(flat.get("Text").unwrap(), &vec!["HI".to_string()]);
    }

    #[test]
    fn unflatten_rebuilds_nested_objects_from_dotted_keys() {
        let value = json!({"ContactInfo": {"Email": "a@b.com"}, "Text": "HI"});
        let rebuilt = unflatten(&flatten(&value));
        assert_eq!(rebuilt, json!({"ContactInfo": {"Email": "a@b.com"}, "Text": "HI"}));
    }

    #[test]
    fn unflatten_renders_a_repeated_key_as_an_array() {
        let mut values = HashMap::new();
        values.insert("Tags".to_string(), vec!["a".to_string(), "b".to_string()]);
        assert_eq!(unflatten(&values), json!({"Tags": ["a", "b"]}));
    }
}
