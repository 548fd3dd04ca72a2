//! The release reconciler
//!
//! Every user-visible operation is a single-shot transaction orchestrated
//! here: `takeoff` (apply), `descent` (rollback), `mayday` (delete),
//! `turbulence` (drift), `blackbox` (inspect). Step ordering is part of the
//! contract - in particular, resources are always deleted from the cluster
//! before they are removed from the ownership registry, so a partial
//! failure never leaves the registry pointing at objects the engine
//! believes it owns while the cluster has already dropped them.

use std::collections::BTreeMap;
use std::collections::HashSet;
use std::path::Path;
use std::time::Duration;

use kube::discovery::Scope;
use tokio_util::sync::CancellationToken;

use airlift_core::{
    MultiError, Resource, Revision, Revisions, Source, canonical_name_list,
    canonical_object_map, inject_managed_metadata, parse_resources, sort_by_canonical,
};
use airlift_wasm::{ExecuteParams, FlightBinary, execute, load_flight};

use crate::client::{ApplyManyOpts, ApplyOpts, ClusterClient, WaitOpts};
use crate::diff::{self, NamedDocument};
use crate::error::{KubeError, Result};
use crate::output::Output;
use crate::ownership::{self, OwnershipRegistry};
use crate::revisions::{DEFAULT_SYSTEM_NAMESPACE, RevisionStore};

/// How to evaluate a flight: where the wasm comes from and what it sees.
#[derive(Debug, Clone, Default)]
pub struct FlightSpec {
    /// Path or URL of the flight binary.
    pub source: String,

    /// Bytes piped to the flight's stdin, if any.
    pub input: Option<Vec<u8>>,

    /// Arguments forwarded as `argv[1..]`.
    pub args: Vec<String>,

    /// Preferred namespace for resources that do not declare one.
    pub namespace: String,
}

#[derive(Debug, Clone, Default)]
pub struct TakeoffParams {
    pub release: String,
    pub flight: FlightSpec,

    /// Export rendered resources instead of applying: a directory path, or
    /// `-` for stdout.
    pub out: Option<String>,

    pub skip_dry_run: bool,
    pub force_conflicts: bool,
    pub create_crds: bool,
    pub create_namespaces: bool,

    /// Show the diff against the active revision and stop.
    pub diff_only: bool,
    pub context: usize,
    pub color: bool,

    /// Wait for the release to become ready after applying.
    pub wait: Option<Duration>,
    pub poll: Duration,
}

#[derive(Debug, Clone)]
pub struct DescentParams {
    pub release: String,

    /// 1-based position in the release's history.
    pub revision_id: usize,

    pub wait: Option<Duration>,
    pub poll: Duration,
}

#[derive(Debug, Clone)]
pub struct TurbulenceParams {
    pub release: String,

    /// Restrict the comparison to declared state, hiding server-added
    /// fields. Implied by `fix`.
    pub conflict_only: bool,

    /// Re-apply the expected state over any drift.
    pub fix: bool,

    pub context: usize,
    pub color: bool,
}

#[derive(Debug, Clone, Default)]
pub struct BlackboxParams {
    pub release: Option<String>,
    pub revision_id: Option<usize>,
    pub diff_revision_id: Option<usize>,

    /// Print the release -> resources ownership view instead.
    pub mapping: bool,

    pub context: usize,
}

/// Orchestrates the flight executor, cluster gateway, revision store, and
/// ownership registry.
pub struct Reconciler {
    client: ClusterClient,
    revisions: RevisionStore,
    ownership: OwnershipRegistry,
    output: Output,
}

impl Reconciler {
    /// Connect with default kubeconfig resolution, persisting state in the
    /// default system namespace.
    pub async fn new() -> Result<Self> {
        let client = ClusterClient::new().await?;
        Ok(Self::assemble(client, DEFAULT_SYSTEM_NAMESPACE, Output::stdio()))
    }

    pub async fn with_client(
        kube_client: kube::Client,
        system_namespace: &str,
        output: Output,
    ) -> Result<Self> {
        let client = ClusterClient::with_client(kube_client).await?;
        Ok(Self::assemble(client, system_namespace, output))
    }

    fn assemble(client: ClusterClient, system_namespace: &str, output: Output) -> Self {
        let revisions = RevisionStore::new(client.kube_client(), system_namespace);
        let ownership = OwnershipRegistry::new(client.kube_client(), system_namespace);
        Self {
            client,
            revisions,
            ownership,
            output,
        }
    }

    /// Apply a release: evaluate the flight and reconcile the cluster to
    /// its output.
    pub async fn takeoff(&self, params: TakeoffParams, cancel: &CancellationToken) -> Result<()> {
        let (stdout, binary) = evaluate_flight(&params.release, &params.flight, cancel).await?;

        let resources = parse_resources(&stdout)?;
        let (dependencies, mut resources) = split_dependencies(resources);

        if params.create_crds || params.create_namespaces {
            self.apply_dependencies(&dependencies, &params).await?;
        }

        let preferred = preferred_namespace(&params.flight.namespace);
        for resource in &mut resources {
            match self.client.lookup(resource).await {
                Ok((_, capabilities)) => {
                    if capabilities.scope == Scope::Namespaced && resource.namespace().is_none() {
                        resource.set_namespace(preferred);
                    }
                }
                // Custom resources may precede their CRD; the server will
                // adjudicate at apply time.
                Err(KubeError::UnknownResourceType { .. }) => continue,
                Err(err) => return Err(err),
            }
        }

        inject_managed_metadata(&mut resources, &params.release);

        if let Some(out) = params.out.as_deref() {
            return self.export(out, &params.release, &resources);
        }

        let revisions = self.revisions.get_revisions(&params.release).await?;
        let previous = revisions.active_resources();

        if params.diff_only {
            let current = diff::yaml_document("current", &canonical_object_map(previous))?;
            let next = diff::yaml_document("next", &canonical_object_map(&resources))?;
            return self.print_diff(&current, &next, params.context, params.color);
        }

        let mut next_sorted = resources.clone();
        sort_by_canonical(&mut next_sorted);
        if previous == next_sorted.as_slice() {
            return Err(KubeError::warning(
                "resources are the same as previous revision: skipping takeoff",
            ));
        }

        self.ownership.validate(&params.release, &resources).await?;

        self.client.ensure_namespace(preferred).await?;

        self.client
            .apply_many(
                &resources,
                ApplyManyOpts {
                    skip_dry_run: params.skip_dry_run,
                    force_conflicts: params.force_conflicts,
                },
            )
            .await?;

        let revision = Revision::new(
            &params.release,
            Source {
                ref_: binary.ref_.clone(),
                checksum: binary.checksum.clone(),
            },
            resources.clone(),
        );
        self.revisions
            .create_revision(&params.release, &revision)
            .await?;

        let removed = self.remove_orphans(previous, &resources).await?;

        self.ownership
            .update(
                &params.release,
                &canonical_name_list(&resources),
                &canonical_name_list(&removed),
            )
            .await?;

        if let Some(wait) = params.wait {
            self.client
                .wait_ready_many(
                    &resources,
                    WaitOpts {
                        timeout: wait,
                        poll: params.poll,
                    },
                )
                .await
                .map_err(|err| KubeError::ReleaseNotReady(Box::new(err)))?;
        }

        Ok(())
    }

    /// Roll a release back to an earlier revision.
    ///
    /// Rollback targets were admitted when they were first applied, so the
    /// dry-run phase is skipped.
    pub async fn descent(&self, params: DescentParams) -> Result<()> {
        let revisions = self.revisions.get_revisions(&params.release).await?;
        if revisions.is_empty() {
            return Err(KubeError::ReleaseNotFound {
                release: params.release.clone(),
            });
        }

        let target = revisions
            .get(params.revision_id)
            .ok_or_else(|| KubeError::RevisionNotFound {
                release: params.release.clone(),
                id: params.revision_id,
                count: revisions.len(),
            })?;

        self.ownership
            .validate(&params.release, &target.resources)
            .await?;

        let previous = revisions.active_resources();

        self.client
            .apply_many(
                &target.resources,
                ApplyManyOpts {
                    skip_dry_run: true,
                    force_conflicts: false,
                },
            )
            .await?;

        self.revisions.mark_active(&target.name).await?;

        let removed = self.remove_orphans(previous, &target.resources).await?;

        self.ownership
            .update(
                &params.release,
                &canonical_name_list(&target.resources),
                &canonical_name_list(&removed),
            )
            .await?;

        if let Some(wait) = params.wait {
            self.client
                .wait_ready_many(
                    &target.resources,
                    WaitOpts {
                        timeout: wait,
                        poll: params.poll,
                    },
                )
                .await
                .map_err(|err| KubeError::ReleaseNotReady(Box::new(err)))?;
        }

        Ok(())
    }

    /// Delete a release: its resources, its ownership entries, and its
    /// entire revision history.
    pub async fn mayday(&self, release: &str) -> Result<()> {
        let revisions = self.revisions.get_revisions(release).await?;
        if revisions.is_empty() {
            return Err(KubeError::warning(format!(
                "release {release:?} has no revision history: nothing to delete"
            )));
        }

        let removed = self.remove_orphans(revisions.active_resources(), &[]).await?;

        self.ownership
            .update(release, &[], &canonical_name_list(&removed))
            .await?;

        self.revisions.delete_revisions(&revisions).await?;

        Ok(())
    }

    /// Compare a release's declared state against the live cluster, and
    /// optionally force it back into shape.
    pub async fn turbulence(&self, params: TurbulenceParams) -> Result<()> {
        let revisions = self.revisions.get_revisions(&params.release).await?;
        if revisions.is_empty() {
            return Err(KubeError::ReleaseNotFound {
                release: params.release.clone(),
            });
        }
        let expected = revisions.active_resources();

        let mut expected_map = BTreeMap::new();
        let mut actual_map = BTreeMap::new();
        for resource in expected {
            let canonical = resource.canonical_name();
            expected_map.insert(canonical.clone(), resource.as_value().clone());

            if let Some(live) = self.client.get(resource).await? {
                let value = if params.conflict_only {
                    diff::prune_undeclared(live.as_value(), resource.as_value())
                } else {
                    live.into_value()
                };
                actual_map.insert(canonical, value);
            }
        }

        if params.fix {
            let mut fixed = 0;
            for resource in expected {
                let canonical = resource.canonical_name();
                if actual_map.get(&canonical) == Some(resource.as_value()) {
                    continue;
                }
                self.client
                    .apply(
                        resource,
                        ApplyOpts {
                            dry_run: false,
                            force_conflicts: true,
                        },
                    )
                    .await?;
                self.output.write_err(&format!("fixed: {canonical}\n"))?;
                fixed += 1;
            }
            if fixed == 0 {
                return Err(KubeError::warning("no turbulence detected"));
            }
            return Ok(());
        }

        let expected_doc = diff::yaml_document("expected", &expected_map)?;
        let actual_doc = diff::yaml_document("actual", &actual_map)?;
        let rendered = diff::unified(&expected_doc, &actual_doc, params.context);
        if rendered.is_empty() {
            return Err(KubeError::warning("no turbulence detected"));
        }
        self.print_diff(&expected_doc, &actual_doc, params.context, params.color)
    }

    /// Read-only inspection of persisted state.
    pub async fn blackbox(&self, params: BlackboxParams) -> Result<()> {
        if params.mapping {
            let mapping = self.ownership.get().await?;
            let rendered = serde_yaml::to_string(&ownership::by_release(&mapping))?;
            return Ok(self.output.write_out(&rendered)?);
        }

        let release = match params.release.as_deref() {
            None => {
                let all = self.revisions.get_all_revisions().await?;
                return Ok(self.output.write_out(&render_release_table(&all))?);
            }
            Some(release) => release,
        };

        let revisions = self.revisions.get_revisions(release).await?;
        if revisions.is_empty() {
            return Err(KubeError::ReleaseNotFound {
                release: release.to_string(),
            });
        }

        let id = match params.revision_id {
            None => {
                return Ok(self
                    .output
                    .write_out(&render_revision_table(&revisions))?);
            }
            Some(id) => id,
        };

        let revision = revisions.get(id).ok_or_else(|| KubeError::RevisionNotFound {
            release: release.to_string(),
            id,
            count: revisions.len(),
        })?;

        let diff_id = match params.diff_revision_id {
            None => {
                let rendered =
                    serde_yaml::to_string(&canonical_object_map(&revision.resources))?;
                return Ok(self.output.write_out(&rendered)?);
            }
            Some(diff_id) => diff_id,
        };

        let other = revisions
            .get(diff_id)
            .ok_or_else(|| KubeError::RevisionNotFound {
                release: release.to_string(),
                id: diff_id,
                count: revisions.len(),
            })?;

        let left = diff::yaml_document(
            format!("revision {id}"),
            &canonical_object_map(&revision.resources),
        )?;
        let right = diff::yaml_document(
            format!("revision {diff_id}"),
            &canonical_object_map(&other.resources),
        )?;
        self.print_diff(&left, &right, params.context, true)
    }

    /// Pre-create CRDs and Namespaces, each subset applied and waited on
    /// independently and in parallel.
    async fn apply_dependencies(
        &self,
        dependencies: &FlightDependencies,
        params: &TakeoffParams,
    ) -> Result<()> {
        let opts = ApplyManyOpts {
            skip_dry_run: params.skip_dry_run,
            force_conflicts: params.force_conflicts,
        };

        let crds = async {
            if params.create_crds && !dependencies.crds.is_empty() {
                self.client.apply_many(&dependencies.crds, opts).await?;
                self.client
                    .wait_ready_many(&dependencies.crds, WaitOpts::default())
                    .await?;
            }
            Ok::<(), KubeError>(())
        };
        let namespaces = async {
            if params.create_namespaces && !dependencies.namespaces.is_empty() {
                self.client
                    .apply_many(&dependencies.namespaces, opts)
                    .await?;
                self.client
                    .wait_ready_many(&dependencies.namespaces, WaitOpts::default())
                    .await?;
            }
            Ok::<(), KubeError>(())
        };

        let (crds_outcome, namespaces_outcome) = tokio::join!(crds, namespaces);

        let failures: Vec<String> = [
            crds_outcome
                .err()
                .map(|err| format!("failed to create CRDs: {err}")),
            namespaces_outcome
                .err()
                .map(|err| format!("failed to create namespaces: {err}")),
        ]
        .into_iter()
        .flatten()
        .collect();

        match MultiError::from_errors("failed to apply flight dependencies", failures) {
            Some(errors) => Err(errors.into()),
            None => Ok(()),
        }
    }

    /// Delete everything in `previous` that is absent from `next`, by
    /// canonical name. Failures are collected and the sweep continues;
    /// the removed list only reaches the caller when the sweep is clean,
    /// so the ownership registry is never updated past a failed delete.
    async fn remove_orphans(
        &self,
        previous: &[Resource],
        next: &[Resource],
    ) -> Result<Vec<Resource>> {
        let mut removed = Vec::new();
        let mut failures = Vec::new();

        for resource in orphaned(previous, next) {
            match self.client.delete(resource).await {
                // Already gone counts as removed: the cluster reached the
                // state the sweep wanted.
                Ok(_) => removed.push(resource.clone()),
                Err(err) => failures.push(format!(
                    "failed to delete {}: {}",
                    resource.canonical_name(),
                    err
                )),
            }
        }

        match MultiError::from_errors("orphan removal", failures) {
            Some(errors) => Err(errors.into()),
            None => Ok(removed),
        }
    }

    fn export(&self, out: &str, release: &str, resources: &[Resource]) -> Result<()> {
        if out == "-" {
            let rendered = serde_yaml::to_string(&canonical_object_map(resources))?;
            return Ok(self.output.write_out(&rendered)?);
        }

        let root = Path::new(out).join(release);
        if root.exists() {
            std::fs::remove_dir_all(&root)?;
        }
        std::fs::create_dir_all(&root)?;

        let mut failures = Vec::new();
        for resource in resources {
            let path = root.join(format!("{}.yaml", resource.canonical_name()));
            let outcome = serde_yaml::to_string(resource.as_value())
                .map_err(KubeError::from)
                .and_then(|rendered| Ok(std::fs::write(&path, rendered)?));
            if let Err(err) = outcome {
                failures.push(format!("{}: {}", resource.canonical_name(), err));
            }
        }

        match MultiError::from_errors("failed to write resource(s)", failures) {
            Some(errors) => Err(errors.into()),
            None => Ok(()),
        }
    }

    fn print_diff(
        &self,
        expected: &NamedDocument,
        actual: &NamedDocument,
        context: usize,
        color: bool,
    ) -> Result<()> {
        let rendered = if color {
            diff::unified_colorized(expected, actual, context)
        } else {
            diff::unified(expected, actual, context)
        };
        Ok(self.output.write_out(&rendered)?)
    }
}

/// Evaluate a flight without touching the cluster: load the wasm, run it
/// with the release name as `argv[0]` and `RELEASE`/`NAMESPACE` in the
/// environment, and return its stdout along with the loaded binary.
pub async fn evaluate_flight(
    release: &str,
    flight: &FlightSpec,
    cancel: &CancellationToken,
) -> Result<(Vec<u8>, FlightBinary)> {
    let binary = load_flight(&flight.source).await?;

    let env = vec![
        ("RELEASE".to_string(), release.to_string()),
        (
            "NAMESPACE".to_string(),
            preferred_namespace(&flight.namespace).to_string(),
        ),
    ];

    let stdout = execute(
        ExecuteParams {
            wasm: &binary.bytes,
            release,
            args: &flight.args,
            env: &env,
            stdin: flight.input.clone(),
        },
        cancel,
    )
    .await?;

    Ok((stdout, binary))
}

/// Namespace and CustomResourceDefinition objects split out of a flight's
/// output for pre-creation.
#[derive(Debug, Default)]
pub(crate) struct FlightDependencies {
    pub namespaces: Vec<Resource>,
    pub crds: Vec<Resource>,
}

pub(crate) fn split_dependencies(
    resources: Vec<Resource>,
) -> (FlightDependencies, Vec<Resource>) {
    let mut dependencies = FlightDependencies::default();
    let mut core = Vec::new();

    for resource in resources {
        match (resource.group(), resource.kind()) {
            ("", "Namespace") => dependencies.namespaces.push(resource),
            ("apiextensions.k8s.io", "CustomResourceDefinition") => {
                dependencies.crds.push(resource)
            }
            _ => core.push(resource),
        }
    }

    (dependencies, core)
}

/// Resources in `previous` whose canonical name is absent from `next`.
fn orphaned<'a>(previous: &'a [Resource], next: &[Resource]) -> Vec<&'a Resource> {
    let keep: HashSet<String> = next
        .iter()
        .map(|resource| resource.canonical_name())
        .collect();
    previous
        .iter()
        .filter(|resource| !keep.contains(&resource.canonical_name()))
        .collect()
}

fn preferred_namespace(namespace: &str) -> &str {
    if namespace.is_empty() {
        "default"
    } else {
        namespace
    }
}

fn render_release_table(all: &[Revisions]) -> String {
    let mut table = format!("{:<32} {:>9} {:>6}\n", "RELEASE", "REVISIONS", "ACTIVE");
    for revisions in all {
        table.push_str(&format!(
            "{:<32} {:>9} {:>6}\n",
            revisions.release,
            revisions.len(),
            revisions
                .active_id()
                .map(|id| id.to_string())
                .unwrap_or_else(|| "-".to_string()),
        ));
    }
    table
}

fn render_revision_table(revisions: &Revisions) -> String {
    let active_id = revisions.active_id();
    let mut table = format!(
        "{:<4} {:<6} {:>9} {:<32} {:<40} {:<25}\n",
        "ID", "ACTIVE", "RESOURCES", "SOURCE", "CHECKSUM", "CREATED AT"
    );
    for (index, revision) in revisions.history.iter().enumerate() {
        let id = index + 1;
        table.push_str(&format!(
            "{:<4} {:<6} {:>9} {:<32} {:<40} {:<25}\n",
            id,
            if Some(id) == active_id { "*" } else { "" },
            revision.resource_count(),
            revision.source.ref_,
            revision.source.checksum,
            revision.created_at.format("%Y-%m-%d %H:%M:%S"),
        ));
    }
    table
}
