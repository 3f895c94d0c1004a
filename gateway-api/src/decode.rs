//! Lenient path → query → body input decoding into a `serde_json::Value`.
//!
//! Each source overrides the previous one field-by-field; unknown fields
//! from any source are kept rather than rejected — only a body that isn't
//! valid JSON (for verbs that carry one) is a decode error, surfaced as
//! `bad-request`. Path and query values are flat strings, but a field name
//! can still be dotted (`ContactInfo.Email`) to target a nested struct, so
//! both are run through the same dotted-path expansion the event gateway
//! uses for its published values before the body is merged on top.

use std::collections::HashMap;

use gateway_core::{unflatten, GatewayError};
use serde_json::Value;

/// Build the endpoint's input value from path captures, the raw query
/// string, and an optional request body. `body` is only consulted for
/// verbs that carry one (the caller decides whether to pass `None`).
pub fn decode_input(
    path_captures: &[(&str, &str)],
    query: &str,
    body: Option<&[u8]>,
) -> Result<Value, GatewayError> {
    let mut flat: HashMap<String, Vec<String>> = HashMap::new();

    for (name, value) in path_captures {
        flat.insert((*name).to_string(), vec![(*value).to_string()]);
    }

    for (key, value) in form_urlencoded::parse(query.as_bytes()) {
        flat.insert(key.into_owned(), vec![value.into_owned()]);
    }

    let Value::Object(mut fields) = unflatten(&flat) else {
        unreachable!("unflatten always builds a JSON object")
    };

    if let Some(body) = body {
        if !body.is_empty() {
            let parsed: Value = serde_json::from_slice(body)
                .map_err(|err| GatewayError::BadRequest(format!("invalid request body: {err}")))?;
            match parsed {
                Value::Object(body_fields) => fields.extend(body_fields),
                other => return Ok(other),
            }
        }
    }

    Ok(Value::Object(fields))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn path_captures_seed_the_input() {
        let value = decode_input(&[("ID", "42")], "", None).unwrap();
        assert_eq!(value, json!({"ID": "42"}));
    }

    #[test]
    fn query_overrides_path_and_body_overrides_query() {
        let body = br#"{"ID":"from-body","Extra":1}"#;
        let value = decode_input(&[("ID", "from-path")], "ID=from-query", Some(body)).unwrap();
        assert_eq!(value["ID"], "from-body");
        assert_eq!(value["Extra"], 1);
    }

    #[test]
    fn invalid_json_body_is_a_bad_request() {
        let err = decode_input(&[], "", Some(b"{not json")).unwrap_err();
        assert!(matches!(err, GatewayError::BadRequest(_)));
    }

    #[test]
    fn unknown_fields_are_tolerated() {
        let body = br#"{"Unexpected":"field"}"#;
        let value = decode_input(&[], "", Some(body)).unwrap();
        assert_eq!(value["Unexpected"], "field");
    }

    #[test]
    fn a_dotted_query_field_is_expanded_into_a_nested_struct() {
        let value = decode_input(&[], "ContactInfo.Email=a%40b.com", None).unwrap();
        assert_eq!(value, json!({"ContactInfo": {"Email": "a@b.com"}}));
    }

    #[test]
    fn a_dotted_path_capture_is_expanded_into_a_nested_struct() {
        let value = decode_input(&[("Group.ID", "42")], "", None).unwrap();
        assert_eq!(value, json!({"Group": {"ID": "42"}}));
    }
}
