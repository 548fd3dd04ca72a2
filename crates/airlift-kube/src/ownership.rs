//! Ownership registry: the global resource -> release mapping
//!
//! One ConfigMap maps every managed resource's canonical name to the
//! release that owns it. Takeoff validates against the mapping before any
//! server write, so two releases can never fight over a resource. The map
//! is never cached across operations; every update is a read-modify-write
//! with retry on conflict, letting the cluster serialize concurrent
//! writers.

use std::collections::BTreeMap;

use k8s_openapi::api::core::v1::ConfigMap;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use kube::api::{Api, PostParams};

use airlift_core::{MultiError, Resource, canonical_name_list};

use crate::error::{KubeError, Result};
use crate::revisions::KIND_LABEL;

/// Well-known name of the mapping object.
pub const MAPPING_NAME: &str = "airlift-resource-release-mapping";

const KIND_MAPPING: &str = "resource-mapping";

/// Attempts before giving up on a contended update.
const UPDATE_ATTEMPTS: usize = 5;

pub struct OwnershipRegistry {
    api: Api<ConfigMap>,
}

impl OwnershipRegistry {
    pub fn new(client: &kube::Client, namespace: &str) -> Self {
        Self {
            api: Api::namespaced(client.clone(), namespace),
        }
    }

    /// Read the whole mapping. A missing object is an empty map.
    pub async fn get(&self) -> Result<BTreeMap<String, String>> {
        Ok(self
            .api
            .get_opt(MAPPING_NAME)
            .await?
            .and_then(|config_map| config_map.data)
            .unwrap_or_default())
    }

    /// Fail if any of the resources is currently owned by another release.
    /// Runs before any server write; reports every conflict at once.
    pub async fn validate(&self, release: &str, resources: &[Resource]) -> Result<()> {
        let mapping = self.get().await?;
        match conflicts(&mapping, release, &canonical_name_list(resources)) {
            Some(errors) => Err(KubeError::OwnershipConflict(errors)),
            None => Ok(()),
        }
    }

    /// Add and remove entries for a release in one read-modify-write.
    /// Conflicting writers retry against the fresh state; the object is
    /// created on first use.
    pub async fn update(
        &self,
        release: &str,
        to_add: &[String],
        to_remove: &[String],
    ) -> Result<()> {
        if to_add.is_empty() && to_remove.is_empty() {
            return Ok(());
        }

        let mut last_conflict = None;

        for _ in 0..UPDATE_ATTEMPTS {
            match self.api.get_opt(MAPPING_NAME).await? {
                None => {
                    let mut data = BTreeMap::new();
                    apply_changes(&mut data, release, to_add, to_remove);
                    let config_map = build_mapping(data);
                    match self.api.create(&PostParams::default(), &config_map).await {
                        Ok(_) => return Ok(()),
                        // Another writer created it first; retry as an update.
                        Err(kube::Error::Api(resp)) if resp.code == 409 => {
                            last_conflict = Some(KubeError::Api(kube::Error::Api(resp)));
                            continue;
                        }
                        Err(err) => return Err(err.into()),
                    }
                }
                Some(mut config_map) => {
                    let data = config_map.data.get_or_insert_with(BTreeMap::new);
                    apply_changes(data, release, to_add, to_remove);
                    match self
                        .api
                        .replace(MAPPING_NAME, &PostParams::default(), &config_map)
                        .await
                    {
                        Ok(_) => return Ok(()),
                        Err(kube::Error::Api(resp)) if resp.code == 409 => {
                            tracing::warn!("resource release mapping conflicted, retrying");
                            last_conflict = Some(KubeError::Api(kube::Error::Api(resp)));
                            continue;
                        }
                        Err(err) => return Err(err.into()),
                    }
                }
            }
        }

        Err(last_conflict.unwrap_or_else(|| {
            KubeError::Storage("resource release mapping update kept conflicting".to_string())
        }))
    }
}

/// Collect conflicts in input order: every resource mapped to a different
/// release produces one message.
fn conflicts(
    mapping: &BTreeMap<String, String>,
    release: &str,
    names: &[String],
) -> Option<MultiError> {
    let errors = names
        .iter()
        .filter_map(|name| match mapping.get(name) {
            Some(owner) if owner != release => Some(format!(
                "resource {name:?} is owned by release {owner:?}"
            )),
            _ => None,
        })
        .collect();
    MultiError::from_errors("conflict(s)", errors)
}

fn apply_changes(
    data: &mut BTreeMap<String, String>,
    release: &str,
    to_add: &[String],
    to_remove: &[String],
) {
    for name in to_remove {
        data.remove(name);
    }
    for name in to_add {
        data.insert(name.clone(), release.to_string());
    }
}

fn build_mapping(data: BTreeMap<String, String>) -> ConfigMap {
    let mut labels = BTreeMap::new();
    labels.insert(KIND_LABEL.to_string(), KIND_MAPPING.to_string());

    ConfigMap {
        metadata: ObjectMeta {
            name: Some(MAPPING_NAME.to_string()),
            labels: Some(labels),
            ..Default::default()
        },
        data: Some(data),
        ..Default::default()
    }
}

/// Invert the mapping into release -> resources for inspection output.
pub fn by_release(mapping: &BTreeMap<String, String>) -> BTreeMap<String, Vec<String>> {
    let mut inverted: BTreeMap<String, Vec<String>> = BTreeMap::new();
    for (resource, release) in mapping {
        inverted
            .entry(release.clone())
            .or_default()
            .push(resource.clone());
    }
    inverted
}
