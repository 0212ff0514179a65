use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::domain::ResourceKind;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoginResponse {
    #[serde(default)]
    pub fullname: String,
    #[serde(default)]
    pub href: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogoutResponse {
    #[serde(default)]
    pub detail: String,
}

/// Endpoint directory published at the API root.
///
/// The backend nests endpoints as `collection.items.<group>.<name>`; this
/// flattens that shape into `group -> name -> url`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RootApi {
    pub version: String,
    pub href: String,
    pub groups: BTreeMap<String, BTreeMap<String, String>>,
    #[serde(default)]
    pub queries: BTreeMap<String, String>,
}

impl RootApi {
    pub fn from_value(value: &Value) -> Option<Self> {
        let collection = value.get("collection")?.as_object()?;
        let mut root = RootApi {
            version: string_field(collection.get("version")),
            href: string_field(collection.get("href")),
            ..RootApi::default()
        };

        if let Some(items) = collection.get("items").and_then(Value::as_object) {
            for (group, endpoints) in items {
                let Some(endpoints) = endpoints.as_object() else {
                    continue;
                };
                let entry = root.groups.entry(group.clone()).or_default();
                for (name, url) in endpoints {
                    if let Some(url) = url.as_str() {
                        entry.insert(name.clone(), url.to_string());
                    }
                }
            }
        }

        if let Some(queries) = collection.get("queries").and_then(Value::as_object) {
            for (name, url) in queries {
                if let Some(url) = url.as_str() {
                    root.queries.insert(name.clone(), url.to_string());
                }
            }
        }

        Some(root)
    }

    pub fn endpoint(&self, group: &str, name: &str) -> Option<&str> {
        self.groups.get(group)?.get(name).map(String::as_str)
    }

    pub fn resource_endpoint(&self, kind: ResourceKind) -> Option<&str> {
        let (group, name) = kind.root_endpoint();
        self.endpoint(group, name)
    }
}

fn string_field(value: Option<&Value>) -> String {
    value
        .and_then(Value::as_str)
        .map(str::to_string)
        .unwrap_or_default()
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldChoice {
    pub value: String,
    pub display_name: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldMeta {
    #[serde(default, rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub required: bool,
    #[serde(default)]
    pub read_only: bool,
    #[serde(default)]
    pub label: String,
    #[serde(default)]
    pub choices: Vec<FieldChoice>,
}

/// Field metadata advertised by an `OPTIONS` request on a collection.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceMeta {
    pub name: String,
    pub fields: BTreeMap<String, FieldMeta>,
}

impl ResourceMeta {
    /// Reads `actions.POST` into per-field metadata.
    pub fn from_value(value: &Value) -> Self {
        let name = string_field(value.get("name"));
        let fields = value
            .pointer("/actions/POST")
            .and_then(Value::as_object)
            .map(|post| {
                post.iter()
                    .filter_map(|(field, meta)| {
                        serde_json::from_value::<FieldMeta>(meta.clone())
                            .ok()
                            .map(|meta| (field.clone(), meta))
                    })
                    .collect()
            })
            .unwrap_or_default();
        Self { name, fields }
    }

    /// `value -> display_name` for a choice field.
    pub fn choices(&self, field: &str) -> BTreeMap<String, String> {
        self.fields
            .get(field)
            .map(|meta| {
                meta.choices
                    .iter()
                    .map(|choice| (choice.value.clone(), choice.display_name.clone()))
                    .collect()
            })
            .unwrap_or_default()
    }
}

/// List responses are either bare arrays or paginated envelopes.
pub fn list_records(value: Value) -> Vec<Value> {
    match value {
        Value::Array(records) => records,
        Value::Object(mut envelope) => match envelope.remove("results") {
            Some(Value::Array(records)) => records,
            _ => Vec::new(),
        },
        _ => Vec::new(),
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn root_document() -> Value {
        json!({
            "collection": {
                "version": "1.0",
                "href": "http://api.test/api/",
                "items": {
                    "accounts": {
                        "users": "http://api.test/api/accounts/users/",
                        "user-groups": "http://api.test/api/accounts/groups/"
                    },
                    "projects": {"projects": "http://api.test/api/projects/"}
                },
                "queries": {}
            }
        })
    }

    #[test]
    fn flattens_root_collection_items() {
        let root = RootApi::from_value(&root_document()).expect("root");
        assert_eq!(root.version, "1.0");
        assert_eq!(root.href, "http://api.test/api/");
        assert_eq!(
            root.endpoint("accounts", "user-groups"),
            Some("http://api.test/api/accounts/groups/")
        );
        assert_eq!(
            root.resource_endpoint(ResourceKind::Projects),
            Some("http://api.test/api/projects/")
        );
        assert_eq!(root.resource_endpoint(ResourceKind::Invoices), None);
    }

    #[test]
    fn root_without_collection_is_rejected() {
        assert!(RootApi::from_value(&json!({"detail": "nope"})).is_none());
    }

    #[test]
    fn meta_reads_post_actions_and_choices() {
        let meta = ResourceMeta::from_value(&json!({
            "name": "Project List",
            "actions": {"POST": {
                "name": {"type": "string", "required": true, "read_only": false, "label": "Name"},
                "public": {"type": "choice", "label": "Public", "choices": [
                    {"value": "true", "display_name": "Yes"},
                    {"value": "false", "display_name": "No"}
                ]}
            }}
        }));

        assert_eq!(meta.name, "Project List");
        assert!(meta.fields["name"].required);
        assert_eq!(meta.choices("public").get("true").map(String::as_str), Some("Yes"));
        assert!(meta.choices("name").is_empty());
    }

    #[test]
    fn list_records_accepts_arrays_and_pages() {
        assert_eq!(list_records(json!([{"id": 1}])).len(), 1);
        assert_eq!(
            list_records(json!({"count": 2, "results": [{"id": 1}, {"id": 2}]})).len(),
            2
        );
        assert!(list_records(json!({"detail": "x"})).is_empty());
    }
}
