//! Revision store: release history persisted in the cluster
//!
//! Each revision is one Secret in the system namespace. Labels make the
//! history listable by release (and across releases) without a secondary
//! index; annotations carry the metadata; the body holds the serialized
//! resource list. Activation is a single-writer timestamp on the revision
//! itself - the active revision is the one with the greatest `active-at`.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use k8s_openapi::ByteString;
use k8s_openapi::api::core::v1::Secret;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use kube::api::{Api, DeleteParams, ListParams, Patch, PatchParams, PostParams};

use airlift_core::{MultiError, Resource, Revision, Revisions, Source, resource::RELEASE_LABEL};

use crate::error::{KubeError, Result};

/// Namespace where revision secrets and the ownership mapping live.
pub const DEFAULT_SYSTEM_NAMESPACE: &str = "kube-system";

/// Label distinguishing airlift's own objects from user resources.
pub const KIND_LABEL: &str = "airlift.io/kind";

const KIND_REVISION: &str = "revision";
const SECRET_TYPE: &str = "airlift.io/revision.v1";
const KEY_RESOURCES: &str = "resources";

const ANNOTATION_CREATED_AT: &str = "airlift.io/created-at";
const ANNOTATION_ACTIVE_AT: &str = "airlift.io/active-at";
const ANNOTATION_SOURCE_REF: &str = "airlift.io/source-ref";
const ANNOTATION_SOURCE_CHECKSUM: &str = "airlift.io/source-checksum";
const ANNOTATION_RESOURCE_COUNT: &str = "airlift.io/resource-count";

/// Per-release revision history backed by Secrets.
pub struct RevisionStore {
    api: Api<Secret>,
}

impl RevisionStore {
    pub fn new(client: &kube::Client, namespace: &str) -> Self {
        Self {
            api: Api::namespaced(client.clone(), namespace),
        }
    }

    /// Load one release's history, ordered by creation time. A release with
    /// no revisions yields an empty history, not an error.
    pub async fn get_revisions(&self, release: &str) -> Result<Revisions> {
        let selector = format!("{KIND_LABEL}={KIND_REVISION},{RELEASE_LABEL}={release}");
        let secrets = self
            .api
            .list(&ListParams::default().labels(&selector))
            .await?;

        let mut history = secrets
            .items
            .iter()
            .map(parse_secret)
            .collect::<Result<Vec<_>>>()?;
        history.sort_by_key(|revision| revision.created_at);

        Ok(Revisions {
            release: release.to_string(),
            history,
        })
    }

    /// Load every release's history, grouped by release and sorted by name.
    pub async fn get_all_revisions(&self) -> Result<Vec<Revisions>> {
        let selector = format!("{KIND_LABEL}={KIND_REVISION}");
        let secrets = self
            .api
            .list(&ListParams::default().labels(&selector))
            .await?;

        collect_revisions(&secrets.items)
    }

    /// Persist a new revision for a release.
    pub async fn create_revision(&self, release: &str, revision: &Revision) -> Result<()> {
        let secret = build_secret(release, revision)?;
        self.api.create(&PostParams::default(), &secret).await?;
        Ok(())
    }

    /// Re-stamp a revision's activation time to now, making it the active
    /// revision of its release.
    pub async fn mark_active(&self, revision_name: &str) -> Result<DateTime<Utc>> {
        let now = Utc::now();
        let patch = serde_json::json!({
            "metadata": {
                "annotations": {ANNOTATION_ACTIVE_AT: now.to_rfc3339()},
            },
        });
        self.api
            .patch(revision_name, &PatchParams::default(), &Patch::Merge(&patch))
            .await?;
        Ok(now)
    }

    /// Delete every revision object of a release. Objects already gone are
    /// fine; other failures are collected and reported together.
    pub async fn delete_revisions(&self, revisions: &Revisions) -> Result<()> {
        let mut failures = Vec::new();
        for revision in &revisions.history {
            match self.api.delete(&revision.name, &DeleteParams::default()).await {
                Ok(_) => {}
                Err(kube::Error::Api(resp)) if resp.code == 404 => {}
                Err(err) => failures.push(format!("{}: {}", revision.name, err)),
            }
        }
        match MultiError::from_errors("failed to delete revision(s)", failures) {
            Some(errors) => Err(errors.into()),
            None => Ok(()),
        }
    }
}

/// Group revision secrets into per-release histories.
fn collect_revisions(secrets: &[Secret]) -> Result<Vec<Revisions>> {
    let mut groups: BTreeMap<String, Vec<Revision>> = BTreeMap::new();

    for secret in secrets {
        let release = secret
            .metadata
            .labels
            .as_ref()
            .and_then(|labels| labels.get(RELEASE_LABEL))
            .ok_or_else(|| {
                KubeError::Storage(format!(
                    "revision secret {:?} missing release label",
                    secret.metadata.name.as_deref().unwrap_or("unnamed")
                ))
            })?;
        groups
            .entry(release.clone())
            .or_default()
            .push(parse_secret(secret)?);
    }

    Ok(groups
        .into_iter()
        .map(|(release, mut history)| {
            history.sort_by_key(|revision| revision.created_at);
            Revisions { release, history }
        })
        .collect())
}

fn build_secret(release: &str, revision: &Revision) -> Result<Secret> {
    let mut labels = BTreeMap::new();
    labels.insert(KIND_LABEL.to_string(), KIND_REVISION.to_string());
    labels.insert(RELEASE_LABEL.to_string(), release.to_string());

    let mut annotations = BTreeMap::new();
    annotations.insert(
        ANNOTATION_CREATED_AT.to_string(),
        revision.created_at.to_rfc3339(),
    );
    annotations.insert(
        ANNOTATION_ACTIVE_AT.to_string(),
        revision.active_at.to_rfc3339(),
    );
    annotations.insert(
        ANNOTATION_SOURCE_REF.to_string(),
        revision.source.ref_.clone(),
    );
    annotations.insert(
        ANNOTATION_SOURCE_CHECKSUM.to_string(),
        revision.source.checksum.clone(),
    );
    annotations.insert(
        ANNOTATION_RESOURCE_COUNT.to_string(),
        revision.resource_count().to_string(),
    );

    let mut data = BTreeMap::new();
    data.insert(
        KEY_RESOURCES.to_string(),
        ByteString(serde_json::to_vec(&revision.resources)?),
    );

    Ok(Secret {
        metadata: ObjectMeta {
            name: Some(revision.name.clone()),
            labels: Some(labels),
            annotations: Some(annotations),
            ..Default::default()
        },
        type_: Some(SECRET_TYPE.to_string()),
        data: Some(data),
        ..Default::default()
    })
}

fn parse_secret(secret: &Secret) -> Result<Revision> {
    let name = secret
        .metadata
        .name
        .clone()
        .ok_or_else(|| KubeError::Storage("revision secret has no name".to_string()))?;

    let annotation = |key: &str| -> Result<&String> {
        secret
            .metadata
            .annotations
            .as_ref()
            .and_then(|annotations| annotations.get(key))
            .ok_or_else(|| {
                KubeError::Storage(format!("revision secret {name:?} missing annotation {key}"))
            })
    };

    let created_at = parse_timestamp(&name, annotation(ANNOTATION_CREATED_AT)?)?;
    let active_at = parse_timestamp(&name, annotation(ANNOTATION_ACTIVE_AT)?)?;
    let source = Source {
        ref_: annotation(ANNOTATION_SOURCE_REF)?.clone(),
        checksum: annotation(ANNOTATION_SOURCE_CHECKSUM)?.clone(),
    };

    let resources: Vec<Resource> = secret
        .data
        .as_ref()
        .and_then(|data| data.get(KEY_RESOURCES))
        .map(|bytes| serde_json::from_slice(&bytes.0))
        .transpose()?
        .ok_or_else(|| {
            KubeError::Storage(format!("revision secret {name:?} missing resources body"))
        })?;

    Ok(Revision {
        name,
        source,
        created_at,
        active_at,
        resources,
    })
}

fn parse_timestamp(name: &str, value: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|timestamp| timestamp.with_timezone(&Utc))
        .map_err(|err| {
            KubeError::Storage(format!(
                "revision secret {name:?} has an invalid timestamp {value:?}: {err}"
            ))
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn revision(release: &str, names: &[&str]) -> Revision {
        let resources = names
            .iter()
            .map(|name| {
                Resource::from_value(json!({
                    "apiVersion": "v1",
                    "kind": "ConfigMap",
                    "metadata": {"name": name, "namespace": "default"},
                }))
                .unwrap()
            })
            .collect();
        Revision::new(
            release,
            Source {
                ref_: "flight.wasm".to_string(),
                checksum: "abc123".to_string(),
            },
            resources,
        )
    }

    #[test]
    fn test_secret_roundtrip() {
        let original = revision("foo", &["cfg-a", "cfg-b"]);
        let secret = build_secret("foo", &original).unwrap();

        assert_eq!(secret.metadata.name.as_deref(), Some(original.name.as_str()));
        let labels = secret.metadata.labels.as_ref().unwrap();
        assert_eq!(labels.get(KIND_LABEL).unwrap(), KIND_REVISION);
        assert_eq!(labels.get(RELEASE_LABEL).unwrap(), "foo");

        let annotations = secret.metadata.annotations.as_ref().unwrap();
        assert_eq!(annotations.get(ANNOTATION_RESOURCE_COUNT).unwrap(), "2");
        assert_eq!(annotations.get(ANNOTATION_SOURCE_REF).unwrap(), "flight.wasm");

        let parsed = parse_secret(&secret).unwrap();
        assert_eq!(parsed, original);
    }

    #[test]
    fn test_parse_rejects_missing_annotations() {
        let original = revision("foo", &["cfg"]);
        let mut secret = build_secret("foo", &original).unwrap();
        secret
            .metadata
            .annotations
            .as_mut()
            .unwrap()
            .remove(ANNOTATION_CREATED_AT);

        let err = parse_secret(&secret).unwrap_err();
        assert!(err.to_string().contains(ANNOTATION_CREATED_AT));
    }

    #[test]
    fn test_parse_rejects_missing_body() {
        let original = revision("foo", &["cfg"]);
        let mut secret = build_secret("foo", &original).unwrap();
        secret.data = None;

        assert!(parse_secret(&secret).is_err());
    }

    #[test]
    fn test_collect_revisions_groups_and_orders() {
        let mut first = revision("alpha", &["cfg"]);
        let mut second = revision("alpha", &["cfg"]);
        let third = revision("beta", &["cfg"]);

        let base = Utc::now();
        first.created_at = base - chrono::Duration::minutes(10);
        second.created_at = base;

        // Build in shuffled order; grouping must sort by creation time.
        let secrets = vec![
            build_secret("alpha", &second).unwrap(),
            build_secret("beta", &third).unwrap(),
            build_secret("alpha", &first).unwrap(),
        ];

        let all = collect_revisions(&secrets).unwrap();
        assert_eq!(all.len(), 2);
        assert_eq!(all[0].release, "alpha");
        assert_eq!(all[0].history.len(), 2);
        assert_eq!(all[0].history[0].name, first.name);
        assert_eq!(all[1].release, "beta");
    }

    #[test]
    fn test_collect_revisions_requires_release_label() {
        let original = revision("foo", &["cfg"]);
        let mut secret = build_secret("foo", &original).unwrap();
        secret
            .metadata
            .labels
            .as_mut()
            .unwrap()
            .remove(RELEASE_LABEL);

        assert!(collect_revisions(&[secret]).is_err());
    }
}
