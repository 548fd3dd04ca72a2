//! Schemaless Kubernetes resources and their canonical identity
//!
//! Resources emitted by flights are opaque documents. The engine only ever
//! reads the identifying subset (`apiVersion`, `kind`, `metadata.name`,
//! `metadata.namespace`) and writes the two managed labels; everything else
//! passes through untouched.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{CoreError, Result};

/// Label identifying objects managed by this tool.
pub const MANAGED_BY_LABEL: &str = "app.kubernetes.io/managed-by";

/// Label carrying the owning release name on every applied object.
pub const RELEASE_LABEL: &str = "airlift.io/release";

/// A single Kubernetes API object as emitted by a flight.
///
/// The body is an opaque JSON tree; accessors cover only the fields the
/// engine needs to identify and address the object.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Resource(Value);

impl Resource {
    /// Wrap a parsed document, validating the identifying fields.
    pub fn from_value(value: Value) -> Result<Self> {
        if !value.is_object() {
            return Err(CoreError::InvalidResource {
                message: format!("expected an object, got: {}", type_name(&value)),
            });
        }

        let resource = Self(value);

        if resource.api_version().is_empty() || resource.kind().is_empty() {
            return Err(CoreError::InvalidResource {
                message: "resource missing apiVersion or kind".to_string(),
            });
        }
        if resource.name().is_empty() {
            return Err(CoreError::InvalidResource {
                message: format!(
                    "{}/{} resource missing metadata.name",
                    resource.api_version(),
                    resource.kind()
                ),
            });
        }

        Ok(resource)
    }

    pub fn as_value(&self) -> &Value {
        &self.0
    }

    pub fn into_value(self) -> Value {
        self.0
    }

    pub fn api_version(&self) -> &str {
        self.0["apiVersion"].as_str().unwrap_or_default()
    }

    /// API group; empty string for the core group.
    pub fn group(&self) -> &str {
        match self.api_version().rsplit_once('/') {
            Some((group, _)) => group,
            None => "",
        }
    }

    pub fn version(&self) -> &str {
        match self.api_version().rsplit_once('/') {
            Some((_, version)) => version,
            None => self.api_version(),
        }
    }

    pub fn kind(&self) -> &str {
        self.0["kind"].as_str().unwrap_or_default()
    }

    pub fn name(&self) -> &str {
        self.0["metadata"]["name"].as_str().unwrap_or_default()
    }

    pub fn namespace(&self) -> Option<&str> {
        self.0["metadata"]["namespace"]
            .as_str()
            .filter(|ns| !ns.is_empty())
    }

    pub fn set_namespace(&mut self, namespace: &str) {
        self.metadata_mut()
            .insert("namespace".to_string(), Value::String(namespace.to_string()));
    }

    /// Set a label, creating `metadata.labels` if absent. Existing labels
    /// are preserved.
    pub fn set_label(&mut self, key: &str, value: &str) {
        let labels = self
            .metadata_mut()
            .entry("labels")
            .or_insert_with(|| Value::Object(Default::default()));
        if let Some(labels) = labels.as_object_mut() {
            labels.insert(key.to_string(), Value::String(value.to_string()));
        }
    }

    pub fn label(&self, key: &str) -> Option<&str> {
        self.0["metadata"]["labels"][key].as_str()
    }

    /// The canonical identifier used for equality, ownership, and orphan
    /// computation: `<namespace|_>.<group|core>.<version>.<kind>.<name>`,
    /// lower-cased. Stable across runs.
    pub fn canonical_name(&self) -> String {
        let namespace = self.namespace().unwrap_or("_");
        let group = match self.group() {
            "" => "core",
            group => group,
        };
        format!(
            "{}.{}.{}.{}.{}",
            namespace,
            group,
            self.version(),
            self.kind(),
            self.name()
        )
        .to_lowercase()
    }

    fn metadata_mut(&mut self) -> &mut serde_json::Map<String, Value> {
        let object = self.0.as_object_mut().expect("resource body is an object");
        object
            .entry("metadata")
            .or_insert_with(|| Value::Object(Default::default()))
            .as_object_mut()
            .expect("metadata is an object")
    }
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// Stamp the managed-by and release labels on every resource, preserving
/// any labels the flight author set.
pub fn inject_managed_metadata(resources: &mut [Resource], release: &str) {
    for resource in resources {
        resource.set_label(MANAGED_BY_LABEL, crate::TOOL);
        resource.set_label(RELEASE_LABEL, release);
    }
}

/// Sort lexicographically by canonical name. History is stored in this
/// order so that "no change" comparisons are stable.
pub fn sort_by_canonical(resources: &mut [Resource]) {
    resources.sort_by_key(|resource| resource.canonical_name());
}

pub fn canonical_name_list(resources: &[Resource]) -> Vec<String> {
    resources
        .iter()
        .map(|resource| resource.canonical_name())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn deployment(name: &str, namespace: Option<&str>) -> Resource {
        let mut value = json!({
            "apiVersion": "apps/v1",
            "kind": "Deployment",
            "metadata": {"name": name},
        });
        if let Some(ns) = namespace {
            value["metadata"]["namespace"] = json!(ns);
        }
        Resource::from_value(value).unwrap()
    }

    #[test]
    fn test_canonical_name_is_lowercase() {
        let resource = Resource::from_value(json!({
            "apiVersion": "apps/v1",
            "kind": "Deployment",
            "metadata": {"name": "Sample-App", "namespace": "Default"},
        }))
        .unwrap();

        assert_eq!(
            resource.canonical_name(),
            "default.apps.v1.deployment.sample-app"
        );
    }

    #[test]
    fn test_canonical_name_placeholders() {
        let resource = Resource::from_value(json!({
            "apiVersion": "v1",
            "kind": "Namespace",
            "metadata": {"name": "test-ns"},
        }))
        .unwrap();

        // Empty group becomes "core", missing namespace becomes "_".
        assert_eq!(resource.canonical_name(), "_.core.v1.namespace.test-ns");
    }

    #[test]
    fn test_group_version_split() {
        let resource = deployment("app", None);
        assert_eq!(resource.group(), "apps");
        assert_eq!(resource.version(), "v1");

        let core = Resource::from_value(json!({
            "apiVersion": "v1",
            "kind": "ConfigMap",
            "metadata": {"name": "cfg"},
        }))
        .unwrap();
        assert_eq!(core.group(), "");
        assert_eq!(core.version(), "v1");
    }

    #[test]
    fn test_from_value_rejects_missing_identity() {
        assert!(Resource::from_value(json!({"kind": "Deployment"})).is_err());
        assert!(Resource::from_value(json!({
            "apiVersion": "v1",
            "kind": "ConfigMap",
            "metadata": {},
        }))
        .is_err());
        assert!(Resource::from_value(json!("not an object")).is_err());
    }

    #[test]
    fn test_set_namespace() {
        let mut resource = deployment("app", None);
        assert_eq!(resource.namespace(), None);
        resource.set_namespace("staging");
        assert_eq!(resource.namespace(), Some("staging"));
    }

    #[test]
    fn test_inject_managed_metadata_preserves_user_labels() {
        let mut resources = vec![Resource::from_value(json!({
            "apiVersion": "v1",
            "kind": "ConfigMap",
            "metadata": {"name": "cfg", "labels": {"team": "platform"}},
        }))
        .unwrap()];

        inject_managed_metadata(&mut resources, "foo");

        let resource = &resources[0];
        assert_eq!(resource.label("team"), Some("platform"));
        assert_eq!(resource.label(MANAGED_BY_LABEL), Some(crate::TOOL));
        assert_eq!(resource.label(RELEASE_LABEL), Some("foo"));
    }

    #[test]
    fn test_inject_is_idempotent() {
        let mut resources = vec![deployment("app", Some("default"))];
        inject_managed_metadata(&mut resources, "foo");
        let once = resources.clone();
        inject_managed_metadata(&mut resources, "foo");
        assert_eq!(resources, once);
    }

    #[test]
    fn test_sort_by_canonical() {
        let mut resources = vec![
            deployment("zeta", Some("default")),
            deployment("alpha", Some("default")),
        ];
        sort_by_canonical(&mut resources);
        assert_eq!(resources[0].name(), "alpha");
        assert_eq!(resources[1].name(), "zeta");
    }
}
