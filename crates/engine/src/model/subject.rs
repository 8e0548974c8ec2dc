//! Subjects: the contacts executions act upon.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A flat contact record with addressable fields.
///
/// The fixed columns cover what every tenant has; everything else lives in
/// the free-form `attributes` map (e.g. `emailOpened`, `leadScore`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Subject {
    pub id: Uuid,
    pub tenant_id: Uuid,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub first_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_name: Option<String>,
    #[serde(default)]
    pub attributes: serde_json::Map<String, serde_json::Value>,
    pub updated_at: DateTime<Utc>,
}

impl Subject {
    /// Create an empty subject for a tenant.
    pub fn new(tenant_id: Uuid) -> Self {
        Self {
            id: Uuid::new_v4(),
            tenant_id,
            email: None,
            phone: None,
            first_name: None,
            last_name: None,
            attributes: serde_json::Map::new(),
            updated_at: Utc::now(),
        }
    }

    /// Read a field by name: fixed columns first, then attributes.
    pub fn field(&self, name: &str) -> Option<serde_json::Value> {
        match name {
            "email" => self.email.clone().map(serde_json::Value::String),
            "phone" => self.phone.clone().map(serde_json::Value::String),
            "first_name" => self.first_name.clone().map(serde_json::Value::String),
            "last_name" => self.last_name.clone().map(serde_json::Value::String),
            other => self.attributes.get(other).cloned(),
        }
    }

    /// Apply one field update. Returns false for fields this record cannot
    /// express (identity and timestamps are not settable); such keys are
    /// silently skipped by `update_crm`.
    pub fn apply_field(&mut self, name: &str, value: &serde_json::Value) -> bool {
        fn as_opt_string(value: &serde_json::Value) -> Option<Option<String>> {
            match value {
                serde_json::Value::Null => Some(None),
                serde_json::Value::String(s) => Some(Some(s.clone())),
                _ => None,
            }
        }

        match name {
            "id" | "tenant_id" | "updated_at" => false,
            "email" => match as_opt_string(value) {
                Some(v) => {
                    self.email = v;
                    true
                }
                None => false,
            },
            "phone" => match as_opt_string(value) {
                Some(v) => {
                    self.phone = v;
                    true
                }
                None => false,
            },
            "first_name" => match as_opt_string(value) {
                Some(v) => {
                    self.first_name = v;
                    true
                }
                None => false,
            },
            "last_name" => match as_opt_string(value) {
                Some(v) => {
                    self.last_name = v;
                    true
                }
                None => false,
            },
            other => {
                // Dotted form targets attributes explicitly; bare names land
                // there as custom attributes.
                let key = other.strip_prefix("attributes.").unwrap_or(other);
                if key.is_empty() {
                    return false;
                }
                self.attributes.insert(key.to_string(), value.clone());
                true
            }
        }
    }

    /// Flatten into a JSON object for template rendering and condition
    /// evaluation (`contact.<field>` paths).
    pub fn as_context(&self) -> serde_json::Value {
        let mut map = serde_json::Map::new();
        map.insert("id".to_string(), serde_json::json!(self.id.to_string()));
        if let Some(email) = &self.email {
            map.insert("email".to_string(), serde_json::json!(email));
        }
        if let Some(phone) = &self.phone {
            map.insert("phone".to_string(), serde_json::json!(phone));
        }
        if let Some(first_name) = &self.first_name {
            map.insert("first_name".to_string(), serde_json::json!(first_name));
        }
        if let Some(last_name) = &self.last_name {
            map.insert("last_name".to_string(), serde_json::json!(last_name));
        }
        for (key, value) in &self.attributes {
            map.entry(key.clone()).or_insert_with(|| value.clone());
        }
        serde_json::Value::Object(map)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn subject() -> Subject {
        let mut s = Subject::new(Uuid::new_v4());
        s.email = Some("ada@example.com".to_string());
        s.first_name = Some("Ada".to_string());
        s.attributes
            .insert("emailOpened".to_string(), serde_json::json!(true));
        s
    }

    #[test]
    fn test_field_lookup() {
        let s = subject();
        assert_eq!(s.field("email"), Some(serde_json::json!("ada@example.com")));
        assert_eq!(s.field("emailOpened"), Some(serde_json::json!(true)));
        assert_eq!(s.field("phone"), None);
        assert_eq!(s.field("missing"), None);
    }

    #[test]
    fn test_apply_known_fields() {
        let mut s = subject();
        assert!(s.apply_field("phone", &serde_json::json!("+15550100")));
        assert!(s.apply_field("email", &serde_json::Value::Null));
        assert_eq!(s.phone.as_deref(), Some("+15550100"));
        assert!(s.email.is_none());
    }

    #[test]
    fn test_apply_protected_fields_is_rejected() {
        let mut s = subject();
        assert!(!s.apply_field("id", &serde_json::json!("override")));
        assert!(!s.apply_field("tenant_id", &serde_json::json!("override")));
        // Non-string value for a string column is skipped, not coerced.
        assert!(!s.apply_field("email", &serde_json::json!(42)));
    }

    #[test]
    fn test_apply_custom_attribute() {
        let mut s = subject();
        assert!(s.apply_field("leadScore", &serde_json::json!(80)));
        assert!(s.apply_field("attributes.segment", &serde_json::json!("smb")));
        assert_eq!(s.attributes.get("leadScore"), Some(&serde_json::json!(80)));
        assert_eq!(s.attributes.get("segment"), Some(&serde_json::json!("smb")));
    }

    #[test]
    fn test_as_context_prefers_fixed_columns() {
        let mut s = subject();
        // An attribute that collides with a fixed column must not shadow it.
        s.attributes
            .insert("email".to_string(), serde_json::json!("shadow@example.com"));

        let context = s.as_context();
        assert_eq!(
            context.get("email").unwrap().as_str().unwrap(),
            "ada@example.com"
        );
        assert_eq!(context.get("emailOpened"), Some(&serde_json::json!(true)));
    }
}
