//! Field lookup and operator evaluation.
//!
//! Shared by the trigger matcher (clauses against event payloads) and the
//! `condition` step (dotted `contact.<field>` / `context.<field>` paths).

use crate::model::{Operator, Subject};

/// Follow a dotted path through a JSON value.
pub fn lookup_path<'a>(root: &'a serde_json::Value, path: &str) -> Option<&'a serde_json::Value> {
    let mut current = root;
    for segment in path.split('.') {
        current = current.get(segment)?;
    }
    Some(current)
}

/// Resolve a `condition` step field against the bound subject and the
/// execution context. Unprefixed paths read from the context.
pub fn resolve_field(
    field: &str,
    subject: Option<&Subject>,
    context: &serde_json::Value,
) -> Option<serde_json::Value> {
    if let Some(rest) = field.strip_prefix("contact.") {
        return subject.and_then(|s| s.field(rest));
    }
    let path = field.strip_prefix("context.").unwrap_or(field);
    lookup_path(context, path).cloned()
}

/// Evaluate `actual <operator> expected`.
///
/// The numeric operators degrade to false on non-numeric input; a missing
/// field is empty, unequal, and contains nothing.
pub fn evaluate(
    operator: Operator,
    actual: Option<&serde_json::Value>,
    expected: &serde_json::Value,
) -> bool {
    match operator {
        Operator::Equals => actual.map(|a| loose_eq(a, expected)).unwrap_or(false),
        Operator::NotEquals => !actual.map(|a| loose_eq(a, expected)).unwrap_or(false),
        Operator::Contains => actual.map(|a| contains(a, expected)).unwrap_or(false),
        Operator::NotContains => !actual.map(|a| contains(a, expected)).unwrap_or(false),
        Operator::IsEmpty => actual.map(is_empty).unwrap_or(true),
        Operator::IsNotEmpty => !actual.map(is_empty).unwrap_or(true),
        Operator::GreaterThan => numeric_cmp(actual, expected)
            .map(|ordering| ordering == std::cmp::Ordering::Greater)
            .unwrap_or(false),
        Operator::LessThan => numeric_cmp(actual, expected)
            .map(|ordering| ordering == std::cmp::Ordering::Less)
            .unwrap_or(false),
    }
}

/// Equality tolerant of number/string representation differences
/// (`50 == 50.0`, `"50" == 50`), since step configs are hand-authored JSON.
fn loose_eq(a: &serde_json::Value, b: &serde_json::Value) -> bool {
    if a == b {
        return true;
    }
    if let (Some(x), Some(y)) = (as_f64(a), as_f64(b)) {
        return x == y;
    }
    match (scalar_string(a), scalar_string(b)) {
        (Some(x), Some(y)) => x == y,
        _ => false,
    }
}

fn contains(haystack: &serde_json::Value, needle: &serde_json::Value) -> bool {
    match haystack {
        serde_json::Value::String(s) => scalar_string(needle)
            .map(|n| s.contains(&n))
            .unwrap_or(false),
        serde_json::Value::Array(items) => items.iter().any(|item| loose_eq(item, needle)),
        _ => false,
    }
}

fn is_empty(value: &serde_json::Value) -> bool {
    match value {
        serde_json::Value::Null => true,
        serde_json::Value::String(s) => s.is_empty(),
        serde_json::Value::Array(items) => items.is_empty(),
        serde_json::Value::Object(map) => map.is_empty(),
        _ => false,
    }
}

fn numeric_cmp(
    actual: Option<&serde_json::Value>,
    expected: &serde_json::Value,
) -> Option<std::cmp::Ordering> {
    let a = as_f64(actual?)?;
    let b = as_f64(expected)?;
    a.partial_cmp(&b)
}

fn as_f64(value: &serde_json::Value) -> Option<f64> {
    match value {
        serde_json::Value::Number(n) => n.as_f64(),
        serde_json::Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn scalar_string(value: &serde_json::Value) -> Option<String> {
    match value {
        serde_json::Value::String(s) => Some(s.clone()),
        serde_json::Value::Number(n) => Some(n.to_string()),
        serde_json::Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    #[test]
    fn test_lookup_path() {
        let root = serde_json::json!({"a": {"b": {"c": 7}}});
        assert_eq!(lookup_path(&root, "a.b.c"), Some(&serde_json::json!(7)));
        assert_eq!(lookup_path(&root, "a.b"), Some(&serde_json::json!({"c": 7})));
        assert!(lookup_path(&root, "a.x").is_none());
    }

    #[test]
    fn test_equals_and_not_equals() {
        let fifty = serde_json::json!(50);
        assert!(evaluate(Operator::Equals, Some(&fifty), &serde_json::json!(50)));
        assert!(evaluate(Operator::Equals, Some(&fifty), &serde_json::json!(50.0)));
        assert!(evaluate(Operator::Equals, Some(&fifty), &serde_json::json!("50")));
        assert!(!evaluate(Operator::Equals, Some(&serde_json::json!(10)), &serde_json::json!(50)));
        assert!(evaluate(Operator::NotEquals, Some(&fifty), &serde_json::json!(49)));
        assert!(!evaluate(Operator::Equals, None, &serde_json::json!(50)));
        assert!(evaluate(Operator::NotEquals, None, &serde_json::json!(50)));
    }

    #[test]
    fn test_contains() {
        let text = serde_json::json!("enterprise plan");
        assert!(evaluate(Operator::Contains, Some(&text), &serde_json::json!("plan")));
        assert!(!evaluate(Operator::Contains, Some(&text), &serde_json::json!("trial")));

        let tags = serde_json::json!(["vip", "beta"]);
        assert!(evaluate(Operator::Contains, Some(&tags), &serde_json::json!("vip")));
        assert!(evaluate(Operator::NotContains, Some(&tags), &serde_json::json!("churned")));
    }

    #[test]
    fn test_emptiness() {
        assert!(evaluate(Operator::IsEmpty, None, &serde_json::Value::Null));
        assert!(evaluate(Operator::IsEmpty, Some(&serde_json::json!("")), &serde_json::Value::Null));
        assert!(evaluate(Operator::IsEmpty, Some(&serde_json::json!([])), &serde_json::Value::Null));
        assert!(!evaluate(Operator::IsEmpty, Some(&serde_json::json!(0)), &serde_json::Value::Null));
        assert!(evaluate(
            Operator::IsNotEmpty,
            Some(&serde_json::json!("x")),
            &serde_json::Value::Null
        ));
    }

    #[test]
    fn test_numeric_operators_degrade_on_non_numeric() {
        let score = serde_json::json!(75);
        assert!(evaluate(Operator::GreaterThan, Some(&score), &serde_json::json!(50)));
        assert!(evaluate(Operator::LessThan, Some(&score), &serde_json::json!(100)));
        // Non-numeric input is false, not an error.
        assert!(!evaluate(
            Operator::GreaterThan,
            Some(&serde_json::json!("high")),
            &serde_json::json!(50)
        ));
        assert!(!evaluate(Operator::LessThan, None, &serde_json::json!(50)));
    }

    #[test]
    fn test_resolve_field_scopes() {
        let mut subject = Subject::new(Uuid::new_v4());
        subject.email = Some("ada@example.com".to_string());
        subject
            .attributes
            .insert("emailOpened".to_string(), serde_json::json!(true));

        let context = serde_json::json!({"score": 50, "eventData": {"plan": "pro"}});

        assert_eq!(
            resolve_field("contact.email", Some(&subject), &context),
            Some(serde_json::json!("ada@example.com"))
        );
        assert_eq!(
            resolve_field("contact.emailOpened", Some(&subject), &context),
            Some(serde_json::json!(true))
        );
        assert_eq!(
            resolve_field("context.score", Some(&subject), &context),
            Some(serde_json::json!(50))
        );
        assert_eq!(
            resolve_field("eventData.plan", Some(&subject), &context),
            Some(serde_json::json!("pro"))
        );
        assert_eq!(resolve_field("contact.email", None, &context), None);
    }
}
