//! Resource readiness rules
//!
//! Readiness is kind-specific and defined purely by reading `status` from
//! live state. Kinds without a rule are treated as ready, so waiting on a
//! release never hangs on resources that have no meaningful status.

use airlift_core::Resource;

/// Check whether a live resource has reached its ready state.
pub fn is_ready(resource: &Resource) -> bool {
    match (resource.group(), resource.kind()) {
        ("", "Namespace") => {
            resource.as_value()["status"]["phase"].as_str() == Some("Active")
        }
        ("", "Pod") => meets_conditions(resource, &["Available"]),
        ("apps", "Deployment") => {
            meets_conditions(resource, &["Available"])
                && equal_status_counts(
                    resource,
                    &[
                        "replicas",
                        "availableReplicas",
                        "readyReplicas",
                        "updatedReplicas",
                    ],
                )
        }
        ("apps", "ReplicaSet") | ("apps", "StatefulSet") => equal_status_counts(
            resource,
            &[
                "replicas",
                "availableReplicas",
                "readyReplicas",
                "updatedReplicas",
            ],
        ),
        ("apps", "DaemonSet") => equal_status_counts(
            resource,
            &[
                "currentNumberScheduled",
                "desiredNumberScheduled",
                "updatedNumberScheduled",
                "numberAvailable",
                "numberReady",
            ],
        ),
        ("apiextensions.k8s.io", "CustomResourceDefinition") => {
            meets_conditions(resource, &["Established"])
        }
        _ => true,
    }
}

/// True when every named condition in `status.conditions` has status "True".
fn meets_conditions(resource: &Resource, wanted: &[&str]) -> bool {
    let conditions = match resource.as_value()["status"]["conditions"].as_array() {
        Some(conditions) => conditions,
        None => return false,
    };

    wanted.iter().all(|name| {
        conditions.iter().any(|condition| {
            condition["type"].as_str() == Some(name)
                && condition["status"].as_str() == Some("True")
        })
    })
}

/// True when every named `status` counter holds the same value. Missing
/// counters read as zero, matching a resource that has not scaled up yet.
fn equal_status_counts(resource: &Resource, keys: &[&str]) -> bool {
    let status = &resource.as_value()["status"];
    let mut values = keys
        .iter()
        .map(|key| status[key].as_i64().unwrap_or_default());

    match values.next() {
        Some(first) => values.all(|value| value == first),
        None => true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn resource(value: serde_json::Value) -> Resource {
        Resource::from_value(value).unwrap()
    }

    #[test]
    fn test_namespace_readiness() {
        let active = resource(json!({
            "apiVersion": "v1",
            "kind": "Namespace",
            "metadata": {"name": "test-ns"},
            "status": {"phase": "Active"},
        }));
        assert!(is_ready(&active));

        let terminating = resource(json!({
            "apiVersion": "v1",
            "kind": "Namespace",
            "metadata": {"name": "test-ns"},
            "status": {"phase": "Terminating"},
        }));
        assert!(!is_ready(&terminating));
    }

    #[test]
    fn test_deployment_requires_condition_and_counts() {
        let ready = resource(json!({
            "apiVersion": "apps/v1",
            "kind": "Deployment",
            "metadata": {"name": "app", "namespace": "default"},
            "status": {
                "conditions": [{"type": "Available", "status": "True"}],
                "replicas": 3,
                "availableReplicas": 3,
                "readyReplicas": 3,
                "updatedReplicas": 3,
            },
        }));
        assert!(is_ready(&ready));

        let rolling = resource(json!({
            "apiVersion": "apps/v1",
            "kind": "Deployment",
            "metadata": {"name": "app", "namespace": "default"},
            "status": {
                "conditions": [{"type": "Available", "status": "True"}],
                "replicas": 3,
                "availableReplicas": 2,
                "readyReplicas": 3,
                "updatedReplicas": 3,
            },
        }));
        assert!(!is_ready(&rolling));

        let unavailable = resource(json!({
            "apiVersion": "apps/v1",
            "kind": "Deployment",
            "metadata": {"name": "app", "namespace": "default"},
            "status": {
                "conditions": [{"type": "Available", "status": "False"}],
                "replicas": 1,
                "availableReplicas": 1,
                "readyReplicas": 1,
                "updatedReplicas": 1,
            },
        }));
        assert!(!is_ready(&unavailable));
    }

    #[test]
    fn test_statefulset_count_equality() {
        let ready = resource(json!({
            "apiVersion": "apps/v1",
            "kind": "StatefulSet",
            "metadata": {"name": "db", "namespace": "default"},
            "status": {
                "replicas": 2,
                "availableReplicas": 2,
                "readyReplicas": 2,
                "updatedReplicas": 2,
            },
        }));
        assert!(is_ready(&ready));
    }

    #[test]
    fn test_daemonset_scheduled_counts() {
        let lagging = resource(json!({
            "apiVersion": "apps/v1",
            "kind": "DaemonSet",
            "metadata": {"name": "agent", "namespace": "kube-system"},
            "status": {
                "currentNumberScheduled": 3,
                "desiredNumberScheduled": 3,
                "updatedNumberScheduled": 3,
                "numberAvailable": 2,
                "numberReady": 3,
            },
        }));
        assert!(!is_ready(&lagging));
    }

    #[test]
    fn test_crd_established() {
        let established = resource(json!({
            "apiVersion": "apiextensions.k8s.io/v1",
            "kind": "CustomResourceDefinition",
            "metadata": {"name": "widgets.example.com"},
            "status": {
                "conditions": [
                    {"type": "NamesAccepted", "status": "True"},
                    {"type": "Established", "status": "True"},
                ],
            },
        }));
        assert!(is_ready(&established));

        let pending = resource(json!({
            "apiVersion": "apiextensions.k8s.io/v1",
            "kind": "CustomResourceDefinition",
            "metadata": {"name": "widgets.example.com"},
            "status": {"conditions": []},
        }));
        assert!(!is_ready(&pending));
    }

    #[test]
    fn test_unknown_kinds_are_ready() {
        let config_map = resource(json!({
            "apiVersion": "v1",
            "kind": "ConfigMap",
            "metadata": {"name": "cfg", "namespace": "default"},
        }));
        assert!(is_ready(&config_map));

        let custom = resource(json!({
            "apiVersion": "example.com/v1",
            "kind": "Widget",
            "metadata": {"name": "w", "namespace": "default"},
        }));
        assert!(is_ready(&custom));
    }
}
