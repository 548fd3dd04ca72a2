//! Parsing of flight output into an ordered resource list
//!
//! A flight writes exactly one of the following to stdout: a single object,
//! a JSON/YAML array of objects, or a `---`-separated multi-document stream.
//! All three normalize to an ordered `Vec<Resource>` preserving the author's
//! order. JSON parses as a subset of YAML, so one decoder covers both.

use std::collections::BTreeMap;

use serde::Deserialize;
use serde_json::Value;

use crate::error::{CoreError, Result};
use crate::resource::Resource;

/// Parse raw flight output into resources.
///
/// Null and empty documents are skipped; a stream that yields no resources
/// at all is rejected so that an accidentally-empty flight cannot silently
/// orphan a whole release.
pub fn parse_resources(input: &[u8]) -> Result<Vec<Resource>> {
    let mut resources = Vec::new();

    for (index, document) in serde_yaml::Deserializer::from_slice(input).enumerate() {
        let in_document = |err: CoreError| CoreError::Document {
            index,
            message: err.to_string(),
        };

        let value = Value::deserialize(document)
            .map_err(|err| in_document(CoreError::YamlParse(err)))?;
        match value {
            Value::Null => continue,
            Value::Array(items) => {
                for item in items {
                    resources.push(Resource::from_value(item).map_err(in_document)?);
                }
            }
            value @ Value::Object(_) => {
                resources.push(Resource::from_value(value).map_err(in_document)?)
            }
            other => {
                return Err(in_document(CoreError::InvalidResource {
                    message: format!("expected an object or list of objects, got: {}", other),
                }));
            }
        }
    }

    if resources.is_empty() {
        return Err(CoreError::EmptyManifest);
    }

    Ok(resources)
}

/// View a resource list as a map keyed by canonical name.
///
/// BTreeMap ordering makes the rendered YAML stable, which keeps diffs
/// between revisions meaningful.
pub fn canonical_object_map(resources: &[Resource]) -> BTreeMap<String, &Value> {
    resources
        .iter()
        .map(|resource| (resource.canonical_name(), resource.as_value()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_single_document() {
        let input = b"apiVersion: v1\nkind: ConfigMap\nmetadata:\n  name: cfg\n";
        let resources = parse_resources(input).unwrap();
        assert_eq!(resources.len(), 1);
        assert_eq!(resources[0].kind(), "ConfigMap");
    }

    #[test]
    fn test_parse_json_array() {
        let input = br#"[
            {"apiVersion": "v1", "kind": "ConfigMap", "metadata": {"name": "a"}},
            {"apiVersion": "v1", "kind": "Secret", "metadata": {"name": "b"}}
        ]"#;
        let resources = parse_resources(input).unwrap();
        assert_eq!(resources.len(), 2);
        assert_eq!(resources[0].name(), "a");
        assert_eq!(resources[1].name(), "b");
    }

    #[test]
    fn test_parse_multi_document_stream() {
        let input = b"\
apiVersion: v1
kind: ConfigMap
metadata:
  name: first
---
apiVersion: apps/v1
kind: Deployment
metadata:
  name: second
";
        let resources = parse_resources(input).unwrap();
        assert_eq!(resources.len(), 2);
        // Author order is preserved.
        assert_eq!(resources[0].name(), "first");
        assert_eq!(resources[1].name(), "second");
    }

    #[test]
    fn test_parse_skips_empty_documents() {
        let input = b"---\n---\napiVersion: v1\nkind: ConfigMap\nmetadata:\n  name: cfg\n---\n";
        let resources = parse_resources(input).unwrap();
        assert_eq!(resources.len(), 1);
    }

    #[test]
    fn test_parse_empty_output_is_rejected() {
        assert!(matches!(parse_resources(b""), Err(CoreError::EmptyManifest)));
        assert!(matches!(
            parse_resources(b"---\n"),
            Err(CoreError::EmptyManifest)
        ));
    }

    #[test]
    fn test_parse_scalar_is_rejected() {
        assert!(parse_resources(b"42\n").is_err());
    }

    #[test]
    fn test_parse_reports_document_errors() {
        let input = b"apiVersion: v1\nkind: ConfigMap\n";
        let err = parse_resources(input).unwrap_err();
        assert!(err.to_string().contains("metadata.name"));
    }

    #[test]
    fn test_parse_names_the_failing_document() {
        let input = b"\
apiVersion: v1
kind: ConfigMap
metadata:
  name: good
---
kind: Broken
";
        let err = parse_resources(input).unwrap_err();
        assert!(err.to_string().contains("document 1"));
    }

    #[test]
    fn test_roundtrip_through_serialization() {
        let input = br#"{"apiVersion": "apps/v1", "kind": "Deployment", "metadata": {"name": "app", "namespace": "default"}, "spec": {"replicas": 3}}"#;
        let resources = parse_resources(input).unwrap();
        let serialized = serde_json::to_vec(&resources).unwrap();
        let reparsed = parse_resources(&serialized).unwrap();
        assert_eq!(resources, reparsed);
    }

    #[test]
    fn test_canonical_object_map_sorted() {
        let input = b"\
apiVersion: v1
kind: ConfigMap
metadata:
  name: zeta
---
apiVersion: v1
kind: ConfigMap
metadata:
  name: alpha
";
        let resources = parse_resources(input).unwrap();
        let map = canonical_object_map(&resources);
        let keys: Vec<&String> = map.keys().collect();
        assert_eq!(keys.len(), 2);
        assert!(keys[0] < keys[1]);
    }
}
