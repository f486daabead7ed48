//! Upgrade for the pre-1.0 OTLP JSON shape still emitted by old SDKs:
//! `instrumentationLibrarySpans` instead of `scopeSpans`, and attribute
//! values wrapped as `{"Value":{"StringValue":...}}`.

use serde_json::{Map, Value, json};

/// A payload is legacy when any resource-spans entry still carries the
/// old group name.
pub fn is_legacy_payload(value: &Value) -> bool {
    value
        .get("resourceSpans")
        .and_then(Value::as_array)
        .is_some_and(|groups| {
            groups
                .iter()
                .any(|g| g.get("instrumentationLibrarySpans").is_some())
        })
}

/// Rewrite a legacy payload in place so the tolerant OTLP JSON decoder
/// accepts it: rename the span groups, unwrap wrapped values, ensure a
/// scope object, and carry the resource's service name onto each span.
pub fn upgrade_legacy_payload(value: &mut Value) {
    let Some(groups) = value
        .get_mut("resourceSpans")
        .and_then(Value::as_array_mut)
    else {
        return;
    };

    for group in groups {
        let Some(group_map) = group.as_object_mut() else {
            continue;
        };
        if let Some(old) = group_map.remove("instrumentationLibrarySpans") {
            group_map.insert("scopeSpans".to_string(), old);
        }

        rewrite_legacy_values(group);

        let Some(group_map) = group.as_object_mut() else {
            continue;
        };
        let service_name = group_map
            .get("resource")
            .and_then(|resource| resource_service_name(resource));

        let Some(scope_spans) = group_map.get_mut("scopeSpans").and_then(Value::as_array_mut)
        else {
            continue;
        };
        for entry in scope_spans {
            let Some(entry_map) = entry.as_object_mut() else {
                continue;
            };
            // Legacy groups have no scope; the resource's service name
            // stands in so service lookups keep working for old SDKs.
            if !entry_map.contains_key("scope") {
                let scope = match &service_name {
                    Some(name) => json!({ "name": name }),
                    None => json!({}),
                };
                entry_map.insert("scope".to_string(), scope);
            }

            if let Some(name) = &service_name
                && let Some(spans) = entry_map.get_mut("spans").and_then(Value::as_array_mut)
            {
                for span in spans {
                    if let Some(span_map) = span.as_object_mut() {
                        span_map.insert("serviceName".to_string(), Value::String(name.clone()));
                    }
                }
            }
        }
    }
}

/// Depth-first rewrite of every `{"Value":{"XValue":...}}` wrapper into
/// the modern `{xValue: ...}` form. Int values become strings on the
/// way through, matching protojson's int64 encoding.
fn rewrite_legacy_values(value: &mut Value) {
    match value {
        Value::Object(map) => {
            if let Some(rewritten) = unwrap_legacy_value(map) {
                *value = rewritten;
            } else {
                for child in map.values_mut() {
                    rewrite_legacy_values(child);
                }
            }
        }
        Value::Array(items) => {
            for item in items {
                rewrite_legacy_values(item);
            }
        }
        _ => {}
    }
}

fn unwrap_legacy_value(map: &Map<String, Value>) -> Option<Value> {
    let inner = map.get("Value")?.as_object()?;

    if let Some(v) = inner.get("StringValue") {
        return Some(json!({ "stringValue": v.clone() }));
    }
    if let Some(v) = inner.get("IntValue") {
        let as_string = match v {
            Value::Number(n) => Value::String(n.to_string()),
            other => other.clone(),
        };
        return Some(json!({ "intValue": as_string }));
    }
    if let Some(v) = inner.get("BoolValue") {
        return Some(json!({ "boolValue": v.clone() }));
    }
    if let Some(v) = inner.get("DoubleValue") {
        return Some(json!({ "doubleValue": v.clone() }));
    }

    None
}

fn resource_service_name(resource: &Value) -> Option<String> {
    let attrs = resource.get("attributes")?.as_array()?;
    for attr in attrs {
        if attr.get("key").and_then(Value::as_str) == Some("service.name")
            && let Some(name) = attr
                .get("value")
                .and_then(|v| v.get("stringValue"))
                .and_then(Value::as_str)
        {
            return Some(name.to_string());
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use spanlight_testkit::legacy_payload;

    use super::*;

    #[test]
    fn detects_legacy_group_name() {
        assert!(is_legacy_payload(&legacy_payload()));
        assert!(!is_legacy_payload(&json!({ "resourceSpans": [] })));
        assert!(!is_legacy_payload(&json!({})));
    }

    #[test]
    fn renames_groups_and_unwraps_values() {
        let mut payload = legacy_payload();
        upgrade_legacy_payload(&mut payload);

        let group = &payload["resourceSpans"][0];
        assert!(group.get("instrumentationLibrarySpans").is_none());
        assert!(group.get("scopeSpans").is_some());

        let attr = &group["resource"]["attributes"][0];
        assert_eq!(attr["value"]["stringValue"], "legacy-svc");
    }

    #[test]
    fn missing_scope_takes_the_service_name() {
        let mut payload = legacy_payload();
        upgrade_legacy_payload(&mut payload);

        let entry = &payload["resourceSpans"][0]["scopeSpans"][0];
        assert_eq!(entry["scope"]["name"], "legacy-svc");
        assert_eq!(entry["spans"][0]["serviceName"], "legacy-svc");
    }

    #[test]
    fn rewrite_recurses_into_nested_structures() {
        let mut value = json!({
            "attributes": [
                { "key": "a", "value": { "Value": { "StringValue": "foo" } } },
                { "key": "n", "value": { "Value": { "IntValue": 7 } } },
                { "key": "d", "value": { "Value": { "DoubleValue": 1.5 } } },
                { "key": "b", "value": { "Value": { "BoolValue": true } } }
            ]
        });
        rewrite_legacy_values(&mut value);

        let attrs = value["attributes"].as_array().unwrap();
        assert_eq!(attrs[0]["value"], json!({ "stringValue": "foo" }));
        assert_eq!(attrs[1]["value"], json!({ "intValue": "7" }));
        assert_eq!(attrs[2]["value"], json!({ "doubleValue": 1.5 }));
        assert_eq!(attrs[3]["value"], json!({ "boolValue": true }));
    }

    #[test]
    fn modern_values_pass_through_untouched() {
        let mut value = json!({ "value": { "stringValue": "ok" } });
        let before = value.clone();
        rewrite_legacy_values(&mut value);
        assert_eq!(value, before);
    }
}
