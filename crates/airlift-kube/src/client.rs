//! Cluster gateway: discovery, server-side apply, deletes, readiness waits
//!
//! All writes go through Server-Side Apply with the `airlift` field manager.
//! Batch applies are two-phase: a dry-run pass over every resource acts as
//! an atomic admission check, so nothing is written unless the whole set is
//! accepted.

use std::time::Duration;

use futures::StreamExt;
use k8s_openapi::api::core::v1::Namespace;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use kube::api::{Api, DeleteParams, DynamicObject, Patch, PatchParams, PostParams};
use kube::core::GroupVersionKind;
use kube::discovery::{ApiCapabilities, ApiResource, Discovery, Scope};
use tokio::sync::RwLock;

use airlift_core::{MultiError, Resource, TOOL};

use crate::error::{KubeError, Result};
use crate::readiness;

/// Options for a single server-side apply.
#[derive(Debug, Clone, Copy, Default)]
pub struct ApplyOpts {
    pub dry_run: bool,
    /// Take ownership of fields held by other field managers. Never honored
    /// during dry-run.
    pub force_conflicts: bool,
}

/// Options for a batched apply.
#[derive(Debug, Clone, Copy, Default)]
pub struct ApplyManyOpts {
    pub skip_dry_run: bool,
    pub force_conflicts: bool,
}

/// Options for readiness waits.
#[derive(Debug, Clone, Copy)]
pub struct WaitOpts {
    pub timeout: Duration,
    pub poll: Duration,
}

impl Default for WaitOpts {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(120),
            poll: Duration::from_secs(2),
        }
    }
}

/// Gateway to the cluster's dynamic API.
pub struct ClusterClient {
    client: kube::Client,
    discovery: RwLock<Discovery>,
}

impl ClusterClient {
    /// Connect using the default kubeconfig resolution and run an initial
    /// discovery pass.
    pub async fn new() -> Result<Self> {
        let client = kube::Client::try_default().await?;
        Self::with_client(client).await
    }

    pub async fn with_client(client: kube::Client) -> Result<Self> {
        let discovery = Discovery::new(client.clone()).run().await?;
        Ok(Self {
            client,
            discovery: RwLock::new(discovery),
        })
    }

    pub fn kube_client(&self) -> &kube::Client {
        &self.client
    }

    /// Resolve a resource's group/version/kind to the server's resource
    /// name and scope.
    ///
    /// A miss refreshes the discovery cache once before failing: the CRD
    /// that serves this kind may have been created after the initial pass.
    pub async fn lookup(&self, resource: &Resource) -> Result<(ApiResource, ApiCapabilities)> {
        let gvk = GroupVersionKind {
            group: resource.group().to_string(),
            version: resource.version().to_string(),
            kind: resource.kind().to_string(),
        };

        if let Some(found) = self.discovery.read().await.resolve_gvk(&gvk) {
            return Ok(found);
        }

        self.refresh_discovery().await?;

        self.discovery
            .read()
            .await
            .resolve_gvk(&gvk)
            .ok_or_else(|| KubeError::UnknownResourceType {
                api_version: resource.api_version().to_string(),
                kind: resource.kind().to_string(),
            })
    }

    async fn refresh_discovery(&self) -> Result<()> {
        tracing::debug!("refreshing discovery cache after lookup miss");
        let fresh = Discovery::new(self.client.clone()).run().await?;
        *self.discovery.write().await = fresh;
        Ok(())
    }

    async fn api_for(&self, resource: &Resource) -> Result<Api<DynamicObject>> {
        let (api_resource, capabilities) = self.lookup(resource).await?;
        let api = if capabilities.scope == Scope::Namespaced {
            let namespace = resource.namespace().unwrap_or("default");
            Api::namespaced_with(self.client.clone(), namespace, &api_resource)
        } else {
            Api::all_with(self.client.clone(), &api_resource)
        };
        Ok(api)
    }

    /// Server-side apply one resource.
    pub async fn apply(&self, resource: &Resource, opts: ApplyOpts) -> Result<()> {
        let api = self.api_for(resource).await?;

        let mut params = PatchParams::apply(TOOL);
        params.dry_run = opts.dry_run;
        params.force = opts.force_conflicts && !opts.dry_run;

        api.patch(resource.name(), &params, &Patch::Apply(resource.as_value()))
            .await?;
        Ok(())
    }

    /// Apply a whole resource set.
    ///
    /// Phase one dry-runs every resource; phase two performs the real
    /// applies and starts only if phase one produced no errors. Each phase
    /// runs a bounded work pool sized to the host CPU count and reports its
    /// failures together, in input order.
    pub async fn apply_many(&self, resources: &[Resource], opts: ApplyManyOpts) -> Result<()> {
        if !opts.skip_dry_run {
            self.apply_phase(resources, ApplyOpts { dry_run: true, force_conflicts: false }, "dry run")
                .await?;
        }
        self.apply_phase(
            resources,
            ApplyOpts {
                dry_run: false,
                force_conflicts: opts.force_conflicts,
            },
            "apply",
        )
        .await
    }

    async fn apply_phase(
        &self,
        resources: &[Resource],
        opts: ApplyOpts,
        label: &str,
    ) -> Result<()> {
        let failures: Vec<String> = futures::stream::iter(resources.iter().map(|resource| {
            async move {
                match self.apply(resource, opts).await {
                    Ok(()) => None,
                    Err(err) => Some(format!("{}: {}", resource.canonical_name(), err)),
                }
            }
        }))
        .buffered(worker_count())
        .filter_map(|failure| async move { failure })
        .collect()
        .await;

        match MultiError::from_errors(label, failures) {
            Some(errors) => Err(errors.into()),
            None => Ok(()),
        }
    }

    /// Delete a resource by name. Returns false when it was already gone.
    pub async fn delete(&self, resource: &Resource) -> Result<bool> {
        let api = self.api_for(resource).await?;
        match api.delete(resource.name(), &DeleteParams::default()).await {
            Ok(_) => Ok(true),
            Err(kube::Error::Api(resp)) if resp.code == 404 => Ok(false),
            Err(err) => Err(err.into()),
        }
    }

    /// Fetch a resource's live state; `None` when it does not exist.
    pub async fn get(&self, resource: &Resource) -> Result<Option<Resource>> {
        let api = self.api_for(resource).await?;
        match api.get_opt(resource.name()).await? {
            Some(object) => {
                let value = serde_json::to_value(&object)?;
                Ok(Some(Resource::from_value(value).map_err(|err| {
                    KubeError::Storage(format!(
                        "cluster returned an unidentifiable object for {}: {}",
                        resource.canonical_name(),
                        err
                    ))
                })?))
            }
            None => Ok(None),
        }
    }

    /// Create the namespace if it does not exist, then wait for it to be
    /// Active so applies into it do not race its creation.
    pub async fn ensure_namespace(&self, name: &str) -> Result<()> {
        let api: Api<Namespace> = Api::all(self.client.clone());

        if api.get_opt(name).await?.is_none() {
            let namespace = Namespace {
                metadata: ObjectMeta {
                    name: Some(name.to_string()),
                    ..Default::default()
                },
                ..Default::default()
            };
            match api.create(&PostParams::default(), &namespace).await {
                Ok(_) => {}
                // Lost a create race; the namespace exists now.
                Err(kube::Error::Api(resp)) if resp.code == 409 => {}
                Err(err) => return Err(err.into()),
            }
        }

        self.wait_ready(&namespace_resource(name), WaitOpts::default())
            .await
    }

    /// Poll a resource until it reports ready or the timeout elapses.
    pub async fn wait_ready(&self, resource: &Resource, opts: WaitOpts) -> Result<()> {
        let deadline = tokio::time::Instant::now() + opts.timeout;
        self.wait_ready_until(resource, deadline, opts.poll).await
    }

    /// Wait for every resource concurrently under one shared deadline. The
    /// first failure cancels the remaining waits and is returned; its
    /// message names the resource that never became ready.
    pub async fn wait_ready_many(&self, resources: &[Resource], opts: WaitOpts) -> Result<()> {
        let deadline = tokio::time::Instant::now() + opts.timeout;
        futures::future::try_join_all(
            resources
                .iter()
                .map(|resource| self.wait_ready_until(resource, deadline, opts.poll)),
        )
        .await
        .map(drop)
    }

    async fn wait_ready_until(
        &self,
        resource: &Resource,
        deadline: tokio::time::Instant,
        poll: Duration,
    ) -> Result<()> {
        loop {
            if let Some(state) = self.get(resource).await? {
                if readiness::is_ready(&state) {
                    return Ok(());
                }
            }

            if tokio::time::Instant::now() >= deadline {
                return Err(KubeError::ReadyTimeout {
                    resource: resource.canonical_name(),
                });
            }
            tokio::time::sleep_until(std::cmp::min(
                deadline,
                tokio::time::Instant::now() + poll,
            ))
            .await;
        }
    }
}

fn worker_count() -> usize {
    std::thread::available_parallelism()
        .map(|count| count.get())
        .unwrap_or(4)
}

pub(crate) fn namespace_resource(name: &str) -> Resource {
    Resource::from_value(serde_json::json!({
        "apiVersion": "v1",
        "kind": "Namespace",
        "metadata": {"name": name},
    }))
    .expect("namespace literal is a valid resource")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_worker_count_is_positive() {
        assert!(worker_count() >= 1);
    }

    #[test]
    fn test_namespace_resource_identity() {
        let resource = namespace_resource("test-ns");
        assert_eq!(resource.kind(), "Namespace");
        assert_eq!(resource.canonical_name(), "_.core.v1.namespace.test-ns");
    }

}
