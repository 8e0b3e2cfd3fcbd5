//! Statically typed tables for the built-in Kubernetes kinds.

use std::sync::Arc;

use k8s_openapi::api::apps::v1::{DaemonSet, Deployment, ReplicaSet, StatefulSet};
use k8s_openapi::api::batch::v1::{CronJob, Job};
use k8s_openapi::api::core::v1::{
    ConfigMap, Endpoints, LimitRange, Namespace, Node, PersistentVolume, PersistentVolumeClaim, Pod, ReplicationController,
    ResourceQuota, Secret, Service, ServiceAccount,
};
use k8s_openapi::api::discovery::v1::EndpointSlice;
use k8s_openapi::api::networking::v1::{Ingress, NetworkPolicy};
use k8s_openapi::api::policy::v1::PodDisruptionBudget;
use k8s_openapi::api::rbac::v1::{ClusterRole, ClusterRoleBinding, Role, RoleBinding};
use k8s_openapi::apiextensions_apiserver::pkg::apis::apiextensions::v1::CustomResourceDefinition;
use kubetab_core::columns::{object_common_columns, Column, ColumnType};
use kubetab_kubehub::typed::{ClusterScoped, Namespaced, Scope, TypedResource, TypedSource};
use kubetab_kubehub::{ClientFlavor, TableDefinition, TableMap};

use ColumnType::{Bool, Int, Json, Timestamp};

fn c(name: &str, ty: ColumnType, pointer: &str, description: &str) -> Column {
    Column::new(name, ty, pointer, description)
}

fn text(name: &str, pointer: &str, description: &str) -> Column {
    c(name, ColumnType::String, pointer, description)
}

fn table<K, S>(name: &str, description: &str, flavor: ClientFlavor, extra: Vec<Column>) -> TableDefinition
where
    K: TypedResource,
    S: Scope<K>,
{
    let mut columns = object_common_columns();
    columns.extend(extra);
    TableDefinition::new(name, description, columns, Arc::new(TypedSource::<K, S>::new(flavor)))
}

fn ns<K>(name: &str, description: &str, extra: Vec<Column>) -> TableDefinition
where
    K: TypedResource,
    Namespaced: Scope<K>,
{
    table::<K, Namespaced>(name, description, ClientFlavor::Typed, extra)
}

fn cluster<K>(name: &str, description: &str, extra: Vec<Column>) -> TableDefinition
where
    K: TypedResource,
    ClusterScoped: Scope<K>,
{
    table::<K, ClusterScoped>(name, description, ClientFlavor::Typed, extra)
}

fn spec_status(spec: &str, status: &str) -> Vec<Column> {
    vec![c("spec", Json, "/spec", spec), c("status", Json, "/status", status)]
}

fn rbac_role_columns() -> Vec<Column> {
    vec![c("rules", Json, "/rules", "List of the PolicyRules for this role.")]
}

fn rbac_binding_columns() -> Vec<Column> {
    vec![
        text("role_name", "/roleRef/name", "Name of the role being referenced."),
        text("role_kind", "/roleRef/kind", "Kind of the role being referenced."),
        c("subjects", Json, "/subjects", "List of references to the objects the role applies to."),
    ]
}

fn cronjob_columns() -> Vec<Column> {
    vec![
        c("failed_jobs_history_limit", Int, "/spec/failedJobsHistoryLimit", "The number of failed finished jobs to retain. Value must be non-negative integer."),
        text("schedule", "/spec/schedule", "The schedule in Cron format."),
        c("starting_deadline_seconds", Int, "/spec/startingDeadlineSeconds", "Optional deadline in seconds for starting the job if it misses scheduledtime for any reason."),
        c("successful_jobs_history_limit", Int, "/spec/successfulJobsHistoryLimit", "The number of successful finished jobs to retain. Value must be non-negative integer."),
        c("suspend", Bool, "/spec/suspend", "This flag tells the controller to suspend subsequent executions, it does not apply to already started executions. Defaults to false."),
        c("concurrency_policy", Json, "/spec/concurrencyPolicy", "Specifies how to treat concurrent executions of a Job."),
        c("job_template", Json, "/spec/jobTemplate", "Specifies the job that will be created when executing a CronJob."),
        c("last_schedule_time", Timestamp, "/status/lastScheduleTime", "Information when was the last time the job was successfully scheduled."),
        c("last_successful_time", Timestamp, "/status/lastSuccessfulTime", "Information when was the last time the job successfully completed."),
        c("active", Json, "/status/active", "A list of pointers to currently running jobs."),
    ]
}

fn workload_columns(kind: &str) -> Vec<Column> {
    vec![
        c("replicas", Int, "/spec/replicas", &format!("The number of desired pods for the {}.", kind)),
        c("ready_replicas", Int, "/status/readyReplicas", "The number of pods with a Ready condition."),
        c("available_replicas", Int, "/status/availableReplicas", "The number of available pods."),
        c("selector", Json, "/spec/selector", "Label query over pods that should match the replica count."),
        c("template", Json, "/spec/template", "Pod template used to create new pods."),
        c("conditions", Json, "/status/conditions", "The latest available observations of the object's current state."),
    ]
}

fn pod_columns() -> Vec<Column> {
    vec![
        text("node_name", "/spec/nodeName", "Name of the node the pod is scheduled onto."),
        text("phase", "/status/phase", "The phase of a Pod is a high-level summary of where the Pod is in its lifecycle."),
        text("pod_ip", "/status/podIP", "IP address allocated to the pod."),
        text("host_ip", "/status/hostIP", "IP address of the host to which the pod is assigned."),
        text("service_account_name", "/spec/serviceAccountName", "Name of the ServiceAccount to use to run this pod."),
        text("restart_policy", "/spec/restartPolicy", "Restart policy for all containers within the pod."),
        text("qos_class", "/status/qosClass", "The Quality of Service class assigned to the pod."),
        c("start_time", Timestamp, "/status/startTime", "Time at which the pod was acknowledged by the kubelet."),
        c("containers", Json, "/spec/containers", "List of containers belonging to the pod."),
        c("init_containers", Json, "/spec/initContainers", "List of initialization containers belonging to the pod."),
        c("volumes", Json, "/spec/volumes", "List of volumes that can be mounted by containers belonging to the pod."),
        c("container_statuses", Json, "/status/containerStatuses", "Status of each container in the pod."),
        c("conditions", Json, "/status/conditions", "Current service state of the pod."),
    ]
}

fn service_columns() -> Vec<Column> {
    vec![
        text("type", "/spec/type", "How the service is exposed."),
        text("cluster_ip", "/spec/clusterIP", "IP address of the service, usually assigned randomly."),
        c("cluster_ips", Json, "/spec/clusterIPs", "IP addresses assigned to this service."),
        c("ports", Json, "/spec/ports", "The list of ports that are exposed by this service."),
        c("selector", Json, "/spec/selector", "Route service traffic to pods with label keys and values matching this selector."),
        text("session_affinity", "/spec/sessionAffinity", "Supports ClientIP and None."),
        c("load_balancer_ingress", Json, "/status/loadBalancer/ingress", "Ingress points for the load-balancer."),
    ]
}

fn node_columns() -> Vec<Column> {
    vec![
        text("pod_cidr", "/spec/podCIDR", "Pod IP range assigned to the node."),
        text("provider_id", "/spec/providerID", "ID of the node assigned by the cloud provider."),
        c("unschedulable", Bool, "/spec/unschedulable", "Controls node schedulability of new pods."),
        c("taints", Json, "/spec/taints", "Taints applied to the node."),
        c("capacity", Json, "/status/capacity", "Total resources of the node."),
        c("allocatable", Json, "/status/allocatable", "Resources of the node available for scheduling."),
        c("addresses", Json, "/status/addresses", "List of addresses reachable to the node."),
        c("conditions", Json, "/status/conditions", "Current observed node conditions."),
        c("node_info", Json, "/status/nodeInfo", "General information about the node."),
    ]
}

fn volume_columns() -> Vec<Column> {
    vec![
        text("storage_class", "/spec/storageClassName", "Name of the StorageClass."),
        c("access_modes", Json, "/spec/accessModes", "Ways the volume can be mounted."),
        text("volume_mode", "/spec/volumeMode", "Whether the volume is formatted with a filesystem or used as a raw block device."),
        text("phase", "/status/phase", "Current phase of the volume."),
        c("capacity", Json, "/spec/capacity", "Description of the volume's resources and capacity."),
        c("claim_ref", Json, "/spec/claimRef", "Binding to a PersistentVolumeClaim."),
        text("persistent_volume_reclaim_policy", "/spec/persistentVolumeReclaimPolicy", "What happens to the volume when released from its claim."),
    ]
}

fn claim_columns() -> Vec<Column> {
    vec![
        text("volume_name", "/spec/volumeName", "Binding reference to the PersistentVolume backing this claim."),
        text("storage_class", "/spec/storageClassName", "Name of the StorageClass required by the claim."),
        c("access_modes", Json, "/spec/accessModes", "The desired access modes the volume should have."),
        c("resources", Json, "/spec/resources", "The minimum resources the volume should have."),
        text("phase", "/status/phase", "The current phase of the claim."),
        c("capacity", Json, "/status/capacity", "The actual resources of the underlying volume."),
    ]
}

fn job_columns() -> Vec<Column> {
    vec![
        c("parallelism", Int, "/spec/parallelism", "Maximum desired number of pods the job should run at any given time."),
        c("completions", Int, "/spec/completions", "Desired number of successfully finished pods."),
        c("backoff_limit", Int, "/spec/backoffLimit", "Number of retries before marking this job failed."),
        c("active_deadline_seconds", Int, "/spec/activeDeadlineSeconds", "Duration in seconds relative to the start time that the job may be active."),
        c("active", Int, "/status/active", "The number of actively running pods."),
        c("succeeded", Int, "/status/succeeded", "The number of pods which reached phase Succeeded."),
        c("failed", Int, "/status/failed", "The number of pods which reached phase Failed."),
        c("start_time", Timestamp, "/status/startTime", "Time when the job was acknowledged by the job controller."),
        c("completion_time", Timestamp, "/status/completionTime", "Time when the job was completed."),
        c("conditions", Json, "/status/conditions", "The latest available observations of the job's current state."),
    ]
}

fn pdb_columns() -> Vec<Column> {
    vec![
        c("min_available", Json, "/spec/minAvailable", "Pods that must still be available after the eviction."),
        c("max_unavailable", Json, "/spec/maxUnavailable", "Pods that can be unavailable after the eviction."),
        c("selector", Json, "/spec/selector", "Label query over pods whose evictions are managed by the budget."),
        c("current_healthy", Int, "/status/currentHealthy", "Current number of healthy pods."),
        c("desired_healthy", Int, "/status/desiredHealthy", "Minimum desired number of healthy pods."),
        c("disruptions_allowed", Int, "/status/disruptionsAllowed", "Number of pod disruptions that are currently allowed."),
        c("expected_pods", Int, "/status/expectedPods", "Total number of pods counted by this disruption budget."),
    ]
}

/// Every built-in table, keyed by name.
pub fn builtin_tables() -> TableMap {
    let mut t = TableMap::new();
    t.extend([
        cluster::<ClusterRole>("kubernetes_cluster_role", "ClusterRole contains rules that represent a set of permissions.", {
            let mut cols = rbac_role_columns();
            cols.push(c("aggregation_rule", Json, "/aggregationRule", "Describes how to build the rules for this cluster role."));
            cols
        }),
        cluster::<ClusterRoleBinding>(
            "kubernetes_cluster_role_binding",
            "A ClusterRoleBinding grants the permissions defined in a role to a user or set of users.",
            rbac_binding_columns(),
        ),
        ns::<ConfigMap>("kubernetes_config_map", "Config Map can be used to store fine-grained information like individual properties or coarse-grained information like entire config files or JSON blobs.", vec![
            c("immutable", Bool, "/immutable", "If set to true, ensures that data stored in the ConfigMap cannot be updated."),
            c("data", Json, "/data", "Contains the configuration data."),
            c("binary_data", Json, "/binaryData", "Contains the binary configuration data."),
        ]),
        ns::<CronJob>("kubernetes_cronjob", "Cron jobs are useful for creating periodic and recurring tasks, like running backups or sending emails.", cronjob_columns()),
        ns::<DaemonSet>("kubernetes_daemonset", "A DaemonSet ensures that all (or some) Nodes run a copy of a Pod.", vec![
            c("desired_number_scheduled", Int, "/status/desiredNumberScheduled", "The total number of nodes that should be running the daemon pod."),
            c("current_number_scheduled", Int, "/status/currentNumberScheduled", "The number of nodes running at least one daemon pod that are supposed to."),
            c("number_ready", Int, "/status/numberReady", "The number of nodes running the daemon pod with a Ready condition."),
            c("number_available", Int, "/status/numberAvailable", "The number of nodes running the daemon pod and available."),
            c("selector", Json, "/spec/selector", "Label query over pods managed by the daemon set."),
            c("template", Json, "/spec/template", "Pod template used to create new pods."),
            c("update_strategy", Json, "/spec/updateStrategy", "Strategy used to replace existing daemon pods."),
        ]),
        ns::<Deployment>("kubernetes_deployment", "Kubernetes Deployment enables declarative updates for Pods and ReplicaSets.", {
            let mut cols = workload_columns("deployment");
            cols.push(c("paused", Bool, "/spec/paused", "Indicates that the deployment is paused."));
            cols.push(c("strategy", Json, "/spec/strategy", "The deployment strategy to use to replace existing pods."));
            cols.push(c("updated_replicas", Int, "/status/updatedReplicas", "Number of pods targeted by this deployment with the desired template spec."));
            cols
        }),
        ns::<Endpoints>("kubernetes_endpoint", "Set of addresses and ports that comprise a service.", vec![c(
            "subsets",
            Json,
            "/subsets",
            "List of addresses and ports that comprise a service.",
        )]),
        ns::<EndpointSlice>("kubernetes_endpoint_slice", "EndpointSlice represents a subset of the endpoints that implement a service.", vec![
            text("address_type", "/addressType", "Type of address carried by this EndpointSlice."),
            c("endpoints", Json, "/endpoints", "List of unique endpoints in this slice."),
            c("ports", Json, "/ports", "List of network ports exposed by each endpoint in this slice."),
        ]),
        ns::<Ingress>("kubernetes_ingress", "Ingress exposes HTTP and HTTPS routes from outside the cluster to services within the cluster.", vec![
            text("ingress_class_name", "/spec/ingressClassName", "Name of the IngressClass cluster resource."),
            c("default_backend", Json, "/spec/defaultBackend", "Backend that handles requests matching no rule."),
            c("tls", Json, "/spec/tls", "TLS configuration."),
            c("rules", Json, "/spec/rules", "List of host rules used to configure the Ingress."),
            c("load_balancer", Json, "/status/loadBalancer/ingress", "Ingress points for the load-balancer."),
        ]),
        ns::<Job>("kubernetes_job", "A Job creates one or more Pods and will continue to retry execution of the Pods until a specified number of them successfully terminate.", job_columns()),
        ns::<LimitRange>("kubernetes_limit_range", "Kubernetes Limit Range enforces resource usage limits per pod or container in a namespace.", vec![c(
            "spec_limits",
            Json,
            "/spec/limits",
            "List of limit range items that are enforced.",
        )]),
        cluster::<Namespace>("kubernetes_namespace", "Kubernetes Namespace provides a scope for Names.", vec![
            text("phase", "/status/phase", "The current lifecycle phase of the namespace."),
            c("spec_finalizers", Json, "/spec/finalizers", "Finalizers is an opaque list of values that must be empty to permanently remove object from storage."),
            c("conditions", Json, "/status/conditions", "The latest available observations of the namespace's current state."),
        ]),
        ns::<NetworkPolicy>("kubernetes_network_policy", "Network policy specifiy how pods are allowed to communicate with each other and with other network endpoints.", vec![
            c("pod_selector", Json, "/spec/podSelector", "Selects the pods to which this NetworkPolicy object applies."),
            c("ingress", Json, "/spec/ingress", "List of ingress rules to be applied to the selected pods."),
            c("egress", Json, "/spec/egress", "List of egress rules to be applied to the selected pods."),
            c("policy_types", Json, "/spec/policyTypes", "List of rule types that the NetworkPolicy relates to."),
        ]),
        cluster::<Node>("kubernetes_node", "Kubernetes Node is a worker node in Kubernetes.", node_columns()),
        cluster::<PersistentVolume>("kubernetes_persistent_volume", "A PersistentVolume (PV) is a piece of storage in the cluster.", volume_columns()),
        ns::<PersistentVolumeClaim>("kubernetes_persistent_volume_claim", "A PersistentVolumeClaim (PVC) is a request for storage by a user.", claim_columns()),
        ns::<Pod>("kubernetes_pod", "Kubernetes Pod is a collection of containers that can run on a host.", pod_columns()),
        ns::<PodDisruptionBudget>("kubernetes_pod_disruption_budget", "A Pod Disruption Budget limits the number of Pods of a replicated application that are down simultaneously from voluntary disruptions.", pdb_columns()),
        ns::<ReplicaSet>("kubernetes_replicaset", "Kubernetes replica set ensures a specified number of pod replicas are running at any given time.", {
            let mut cols = workload_columns("replica set");
            cols.push(c("fully_labeled_replicas", Int, "/status/fullyLabeledReplicas", "The number of pods that have labels matching the labels of the pod template."));
            cols
        }),
        ns::<ReplicationController>("kubernetes_replication_controller", "A Replication Controller makes sure that a pod or homogeneous set of pods is always up and available.", workload_columns("replication controller")),
        ns::<ResourceQuota>("kubernetes_resource_quota", "Kubernetes Resource Quota provides constraints that limit aggregate resource consumption per namespace.", vec![
            c("spec_hard", Json, "/spec/hard", "The set of desired hard limits for each named resource."),
            c("spec_scopes", Json, "/spec/scopes", "A collection of filters that must match each object tracked by a quota."),
            c("status_hard", Json, "/status/hard", "The set of enforced hard limits for each named resource."),
            c("status_used", Json, "/status/used", "The current observed total usage of the resource in the namespace."),
        ]),
        ns::<Role>("kubernetes_role", "Role contains rules that represent a set of permissions.", rbac_role_columns()),
        ns::<RoleBinding>("kubernetes_role_binding", "A role binding grants the permissions defined in a role to a user or set of users.", rbac_binding_columns()),
        ns::<Secret>("kubernetes_secret", "Secrets can be used to store sensitive information either as individual properties or coarse-grained entries like entire files or JSON blobs.", vec![
            text("type", "/type", "Used to facilitate programmatic handling of secret data."),
            c("immutable", Bool, "/immutable", "If set to true, ensures that data stored in the Secret cannot be updated."),
            c("data", Json, "/data", "Contains the secret data."),
            c("string_data", Json, "/stringData", "Write-only convenience field for non-binary secret data."),
        ]),
        ns::<Service>("kubernetes_service", "A service provides an abstract way to expose an application running on a set of Pods as a network service.", service_columns()),
        ns::<ServiceAccount>("kubernetes_service_account", "A service account provides an identity for processes that run in a Pod.", vec![
            c("automount_service_account_token", Bool, "/automountServiceAccountToken", "Indicates whether pods running as this service account should have an API token automatically mounted."),
            c("image_pull_secrets", Json, "/imagePullSecrets", "List of references to secrets in the same namespace to use for pulling images."),
            c("secrets", Json, "/secrets", "List of the secrets in the same namespace that pods running using this ServiceAccount are allowed to use."),
        ]),
        ns::<StatefulSet>("kubernetes_stateful_set", "A statefulSet is the workload API object used to manage stateful applications.", {
            let mut cols = workload_columns("stateful set");
            cols.push(text("service_name", "/spec/serviceName", "The name of the service that governs this StatefulSet."));
            cols.push(text("pod_management_policy", "/spec/podManagementPolicy", "Controls how pods are created during initial scale up."));
            cols.push(c("volume_claim_templates", Json, "/spec/volumeClaimTemplates", "List of claims that pods are allowed to reference."));
            cols
        }),
        table::<CustomResourceDefinition, ClusterScoped>(
            "kubernetes_custom_resource_definition",
            "Kubernetes Custom Resource Definition.",
            ClientFlavor::Crd,
            spec_status(
                "Spec describes how the user wants the resources to appear.",
                "Status indicates the actual state of the CustomResourceDefinition.",
            ),
        ),
    ]);
    t
}
