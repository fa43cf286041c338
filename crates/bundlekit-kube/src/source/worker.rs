//! Unpack pod protocol shared by pod-mediated sources
//!
//! Content that needs more than cluster read access to fetch is extracted by
//! a short-lived pod. The pod prints the bundle as a payload envelope (see
//! [`bundlekit_core::envelope`]) on its log stream and exits.
//!
//! ## Lifecycle
//!
//! Every call first ensures the pod matches the bundle (create-or-recreate),
//! then maps what the cluster reports to a result:
//!
//! | Observed                       | Outcome                              |
//! |--------------------------------|--------------------------------------|
//! | created, recreated or deleting | `Pending`                            |
//! | phase `Pending`                | `Pending`, with image pull problems  |
//! | phase `Running`                | `Unpacking`                          |
//! | phase `Succeeded`              | `Unpacked`, content read from logs   |
//! | phase `Failed`                 | error with the logs, pod deleted     |
//! | anything else                  | error, pod deleted                   |
//!
//! A succeeded pod is kept so later calls re-read the same content.

use bundlekit_core::envelope;
use k8s_openapi::api::core::v1::{Container, Pod, PodSpec};
use kube::Resource;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, info, warn};

use super::UnpackResult;
use crate::cluster::Cluster;
use crate::crd::{Bundle, BundleSource, OWNER_KIND_LABEL, OWNER_NAME_LABEL};
use crate::error::{KubeError, Result};

const REASON_ERR_IMAGE_PULL: &str = "ErrImagePull";
const REASON_IMAGE_PULL_BACKOFF: &str = "ImagePullBackOff";

/// Strategy-specific part of an unpack pod
pub trait WorkerTemplate: Send + Sync {
    /// Shape the pod spec for a bundle
    ///
    /// Called on a copy of the live pod when one exists, so fields left
    /// untouched keep whatever the API server defaulted them to.
    fn apply(&self, bundle: &Bundle, spec: &mut PodSpec) -> Result<()>;

    /// Source reported for content unpacked by a succeeded pod
    fn resolved_source(&self, bundle: &Bundle, pod: &Pod) -> Result<BundleSource>;
}

/// What ensuring the unpack pod did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnsureOutcome {
    /// No pod existed and one was created
    Created,
    /// The pod differed from the template and was recreated
    Updated,
    /// The pod already matched the template
    Unchanged,
}

/// Name of the unpack pod for a bundle
pub fn pod_name(provisioner_name: &str, bundle_name: &str) -> String {
    format!("{}-unpack-bundle-{}", provisioner_name, bundle_name)
}

/// Ensure a pod spec has exactly one main container and return it
pub fn single_container(spec: &mut PodSpec) -> &mut Container {
    if spec.containers.len() != 1 {
        spec.containers = vec![Container::default()];
    }
    &mut spec.containers[0]
}

/// Drives unpack pods for one provisioner
pub struct UnpackWorker {
    cluster: Arc<dyn Cluster>,
    provisioner_name: String,
    namespace: String,
}

impl UnpackWorker {
    pub fn new(
        cluster: Arc<dyn Cluster>,
        provisioner_name: impl Into<String>,
        namespace: impl Into<String>,
    ) -> Self {
        Self {
            cluster,
            provisioner_name: provisioner_name.into(),
            namespace: namespace.into(),
        }
    }

    /// Namespace unpack pods live in
    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// Name of the unpack pod for a bundle
    pub fn pod_name(&self, bundle: &Bundle) -> Result<String> {
        let bundle_name = bundle
            .metadata
            .name
            .as_deref()
            .ok_or_else(|| KubeError::InvalidBundle("bundle has no name".to_string()))?;
        Ok(pod_name(&self.provisioner_name, bundle_name))
    }

    /// Make one pass of the unpack protocol
    pub async fn unpack(&self, bundle: &Bundle, template: &dyn WorkerTemplate) -> Result<UnpackResult> {
        let (outcome, pod) = self.ensure_pod(bundle, template).await?;
        let name = pod.metadata.name.clone().unwrap_or_default();

        if pod.metadata.deletion_timestamp.is_some() {
            debug!(pod = %name, "Unpack pod is being deleted");
            return Ok(UnpackResult::pending("waiting for previous unpack pod to be deleted"));
        }
        if outcome != EnsureOutcome::Unchanged {
            info!(pod = %name, outcome = ?outcome, "Unpack pod scheduled");
            return Ok(UnpackResult::pending("waiting for unpack pod to start"));
        }

        let phase = pod
            .status
            .as_ref()
            .and_then(|s| s.phase.clone())
            .unwrap_or_default();
        debug!(pod = %name, phase = %phase, "Observed unpack pod");

        match phase.as_str() {
            "Pending" => Ok(pending_image_result(&pod)),
            "Running" => Ok(UnpackResult::unpacking()),
            "Succeeded" => self.succeeded(bundle, &pod, template).await,
            "Failed" => Err(self.failed(&pod).await),
            _ => {
                self.delete_quietly(&name).await;
                Err(KubeError::UnexpectedPodPhase { phase })
            }
        }
    }

    /// Create the unpack pod, or recreate it when it no longer matches
    ///
    /// A create that loses a race against a concurrent create counts as
    /// created; the winner's pod is derived from the same bundle.
    pub async fn ensure_pod(
        &self,
        bundle: &Bundle,
        template: &dyn WorkerTemplate,
    ) -> Result<(EnsureOutcome, Pod)> {
        let name = self.pod_name(bundle)?;

        match self.cluster.get_pod(&self.namespace, &name).await? {
            None => {
                let desired = self.desired_pod(bundle, template, Pod::default())?;
                let pod = self.create(desired).await?;
                Ok((EnsureOutcome::Created, pod))
            }
            Some(existing) => {
                let desired = self.desired_pod(bundle, template, existing.clone())?;
                if desired == existing {
                    return Ok((EnsureOutcome::Unchanged, existing));
                }

                debug!(pod = %name, "Unpack pod is out of date, recreating");
                self.cluster.delete_pod(&self.namespace, &name).await?;
                let pod = self.create(desired).await?;
                Ok((EnsureOutcome::Updated, pod))
            }
        }
    }

    async fn create(&self, pod: Pod) -> Result<Pod> {
        match self.cluster.create_pod(&pod).await {
            Ok(created) => Ok(created),
            Err(e) if e.is_conflict() => Ok(pod),
            Err(e) => Err(e),
        }
    }

    fn desired_pod(&self, bundle: &Bundle, template: &dyn WorkerTemplate, mut pod: Pod) -> Result<Pod> {
        let name = self.pod_name(bundle)?;
        let bundle_name = bundle.metadata.name.clone().unwrap_or_default();
        let owner = bundle.controller_owner_ref(&()).ok_or_else(|| {
            KubeError::InvalidBundle(format!("bundle {} has no uid", bundle_name))
        })?;

        pod.metadata.name = Some(name);
        pod.metadata.namespace = Some(self.namespace.clone());
        pod.metadata.labels = Some(BTreeMap::from([
            (OWNER_KIND_LABEL.to_string(), Bundle::kind(&()).to_string()),
            (OWNER_NAME_LABEL.to_string(), bundle_name),
        ]));
        pod.metadata.owner_references = Some(vec![owner]);

        let spec = pod.spec.get_or_insert_with(PodSpec::default);
        spec.automount_service_account_token = Some(false);
        spec.restart_policy = Some("Never".to_string());
        template.apply(bundle, spec)?;

        Ok(pod)
    }

    async fn succeeded(
        &self,
        bundle: &Bundle,
        pod: &Pod,
        template: &dyn WorkerTemplate,
    ) -> Result<UnpackResult> {
        let name = pod.metadata.name.clone().unwrap_or_default();
        let logs = self.cluster.pod_logs(&self.namespace, &name).await?;

        let content = match envelope::decode(&logs) {
            Ok(content) => content,
            Err(e) => {
                warn!(pod = %name, error = %e, "Unpack pod produced an invalid payload");
                self.delete_quietly(&name).await;
                return Err(KubeError::BundleContents(e));
            }
        };

        let resolved_source = template.resolved_source(bundle, pod)?;
        debug!(pod = %name, files = content.len(), "Unpacked bundle from pod logs");
        Ok(UnpackResult::unpacked(content, resolved_source))
    }

    async fn failed(&self, pod: &Pod) -> KubeError {
        let name = pod.metadata.name.clone().unwrap_or_default();
        let logs = match self.cluster.pod_logs(&self.namespace, &name).await {
            Ok(logs) => logs,
            Err(e) => return KubeError::FailedPodLogs(Box::new(e)),
        };

        self.delete_quietly(&name).await;
        KubeError::UnpackFailed {
            logs: String::from_utf8_lossy(&logs).into_owned(),
        }
    }

    /// Delete the pod so the next pass starts over; failures are only logged
    async fn delete_quietly(&self, name: &str) {
        if let Err(e) = self.cluster.delete_pod(&self.namespace, name).await {
            warn!(pod = %name, error = %e, "Failed to delete unpack pod");
        }
    }
}

/// Pending result naming any image pull problems
fn pending_image_result(pod: &Pod) -> UnpackResult {
    let messages: Vec<String> = pod
        .status
        .iter()
        .flat_map(|s| {
            s.init_container_statuses
                .iter()
                .flatten()
                .chain(s.container_statuses.iter().flatten())
        })
        .filter_map(|cs| cs.state.as_ref()?.waiting.as_ref())
        .filter(|w| {
            matches!(
                w.reason.as_deref(),
                Some(REASON_ERR_IMAGE_PULL) | Some(REASON_IMAGE_PULL_BACKOFF)
            )
        })
        .map(|w| w.message.clone().unwrap_or_default())
        .collect();

    if messages.is_empty() {
        UnpackResult::pending("unpack pod is pending")
    } else {
        UnpackResult::pending(format!("waiting on image pull: {}", messages.join("; ")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cluster::MockCluster;
    use crate::source::UnpackState;
    use crate::source::testutil::bundle;
    use bundlekit_core::BundleFs;

    const NS: &str = "workers";
    const POD: &str = "prov-unpack-bundle-b";

    struct TestTemplate {
        image: String,
    }

    impl WorkerTemplate for TestTemplate {
        fn apply(&self, _bundle: &Bundle, spec: &mut PodSpec) -> Result<()> {
            let container = single_container(spec);
            container.name = "bundle".to_string();
            container.image = Some(self.image.clone());
            container.command = Some(vec!["/extract".to_string()]);
            Ok(())
        }

        fn resolved_source(&self, bundle: &Bundle, _pod: &Pod) -> Result<BundleSource> {
            Ok(bundle.spec.source.clone())
        }
    }

    fn template() -> TestTemplate {
        TestTemplate {
            image: "extract:v1".to_string(),
        }
    }

    fn worker(cluster: &MockCluster) -> UnpackWorker {
        UnpackWorker::new(Arc::new(cluster.clone()), "prov", NS)
    }

    fn test_bundle() -> Bundle {
        bundle("b", BundleSource::persistent_volume_claim("claim"))
    }

    fn payload() -> (BundleFs, String) {
        let mut fs = BundleFs::new();
        fs.insert("manifests/a.yaml", "kind: X").unwrap();
        let encoded = envelope::encode(&fs).unwrap();
        (fs, format!("{}\n", encoded))
    }

    /// Create the pod through one pass, then return the worker
    async fn scheduled(cluster: &MockCluster) -> UnpackWorker {
        let worker = worker(cluster);
        let result = worker.unpack(&test_bundle(), &template()).await.unwrap();
        assert_eq!(result.state, UnpackState::Pending);
        worker
    }

    #[test]
    fn test_pod_name() {
        assert_eq!(
            pod_name("core-bundlekit-io-plain", "my-bundle"),
            "core-bundlekit-io-plain-unpack-bundle-my-bundle"
        );
    }

    #[tokio::test]
    async fn test_absent_pod_is_created() {
        let cluster = MockCluster::new();
        let result = worker(&cluster).unpack(&test_bundle(), &template()).await.unwrap();

        assert_eq!(result.state, UnpackState::Pending);
        assert!(result.content.is_none());

        let pod = cluster.pod(NS, POD).unwrap();
        let labels = pod.metadata.labels.unwrap();
        assert_eq!(labels[OWNER_KIND_LABEL], "Bundle");
        assert_eq!(labels[OWNER_NAME_LABEL], "b");

        let owners = pod.metadata.owner_references.unwrap();
        assert_eq!(owners.len(), 1);
        assert_eq!(owners[0].uid, "uid-b");
        assert_eq!(owners[0].controller, Some(true));

        let spec = pod.spec.unwrap();
        assert_eq!(spec.restart_policy.as_deref(), Some("Never"));
        assert_eq!(spec.automount_service_account_token, Some(false));
        assert_eq!(spec.containers.len(), 1);
    }

    #[tokio::test]
    async fn test_pending_generic() {
        let cluster = MockCluster::new();
        let worker = scheduled(&cluster).await;

        let result = worker.unpack(&test_bundle(), &template()).await.unwrap();
        assert_eq!(result.state, UnpackState::Pending);
        assert_eq!(result.message, "unpack pod is pending");
        assert_eq!(cluster.operation_counts().pod_creates, 1);
    }

    #[tokio::test]
    async fn test_pending_image_pull() {
        let cluster = MockCluster::new();
        let worker = scheduled(&cluster).await;
        cluster.set_container_waiting(NS, POD, "bundle", "ErrImagePull", "manifest unknown");
        cluster.set_container_waiting(NS, POD, "sidecar", "ImagePullBackOff", "back-off pulling");
        cluster.set_container_waiting(NS, POD, "other", "ContainerCreating", "ignored");

        let result = worker.unpack(&test_bundle(), &template()).await.unwrap();
        assert_eq!(result.state, UnpackState::Pending);
        insta::assert_snapshot!(result.message, @"waiting on image pull: manifest unknown; back-off pulling");
    }

    #[tokio::test]
    async fn test_running_is_unpacking() {
        let cluster = MockCluster::new();
        let worker = scheduled(&cluster).await;
        cluster.set_pod_phase(NS, POD, "Running");

        let result = worker.unpack(&test_bundle(), &template()).await.unwrap();
        assert_eq!(result.state, UnpackState::Unpacking);
        assert!(result.content.is_none());
    }

    #[tokio::test]
    async fn test_succeeded_is_idempotent() {
        let cluster = MockCluster::new();
        let worker = scheduled(&cluster).await;
        let (expected, logs) = payload();
        cluster.set_pod_phase(NS, POD, "Succeeded");
        cluster.set_pod_logs(NS, POD, logs);

        let first = worker.unpack(&test_bundle(), &template()).await.unwrap();
        let second = worker.unpack(&test_bundle(), &template()).await.unwrap();

        assert_eq!(first.state, UnpackState::Unpacked);
        assert_eq!(first.content.as_ref(), Some(&expected));
        assert_eq!(first.content, second.content);
        assert_eq!(first.resolved_source, Some(test_bundle().spec.source));
        assert_eq!(cluster.pod_count(), 1);
        assert_eq!(cluster.operation_counts().pod_deletes, 0);
    }

    #[tokio::test]
    async fn test_succeeded_with_bad_payload_deletes_pod() {
        let cluster = MockCluster::new();
        let worker = scheduled(&cluster).await;
        cluster.set_pod_phase(NS, POD, "Succeeded");
        cluster.set_pod_logs(NS, POD, "not json");

        let err = worker.unpack(&test_bundle(), &template()).await.unwrap_err();
        assert!(err.to_string().starts_with("get bundle contents: invalid unpack payload: parse bundle data"));
        assert_eq!(cluster.pod_count(), 0);
    }

    #[tokio::test]
    async fn test_failed_deletes_pod_and_reports_logs() {
        let cluster = MockCluster::new();
        let worker = scheduled(&cluster).await;
        cluster.set_pod_phase(NS, POD, "Failed");
        cluster.set_pod_logs(NS, POD, "extract: permission denied");

        let err = worker.unpack(&test_bundle(), &template()).await.unwrap_err();
        assert!(err.to_string().contains("extract: permission denied"));
        insta::assert_snapshot!(err.to_string(), @"unpack failed: extract: permission denied");
        assert_eq!(cluster.pod_count(), 0);

        // next pass starts over
        let result = worker.unpack(&test_bundle(), &template()).await.unwrap();
        assert_eq!(result.state, UnpackState::Pending);
        assert_eq!(cluster.pod_count(), 1);
    }

    #[tokio::test]
    async fn test_failed_log_read_keeps_pod() {
        let cluster = MockCluster::new();
        let worker = scheduled(&cluster).await;
        cluster.set_pod_phase(NS, POD, "Failed");
        cluster.fail_pod_logs(NS, POD, "connection reset");

        let err = worker.unpack(&test_bundle(), &template()).await.unwrap_err();
        assert!(matches!(err, KubeError::FailedPodLogs(_)));
        assert!(err.to_string().contains("connection reset"));
        assert_eq!(cluster.pod_count(), 1);
    }

    #[tokio::test]
    async fn test_unknown_phase_deletes_pod() {
        let cluster = MockCluster::new();
        let worker = scheduled(&cluster).await;
        cluster.set_pod_phase(NS, POD, "Unknown");

        let err = worker.unpack(&test_bundle(), &template()).await.unwrap_err();
        insta::assert_snapshot!(err.to_string(), @"unexpected pod phase: Unknown");
        assert_eq!(cluster.pod_count(), 0);
    }

    #[tokio::test]
    async fn test_deleting_pod_is_pending() {
        let cluster = MockCluster::new();
        let worker = scheduled(&cluster).await;
        cluster.set_pod_phase(NS, POD, "Succeeded");
        cluster.set_pod_deleting(NS, POD);

        let result = worker.unpack(&test_bundle(), &template()).await.unwrap();
        assert_eq!(result.state, UnpackState::Pending);
        assert_eq!(cluster.operation_counts().log_reads, 0);
    }

    #[tokio::test]
    async fn test_changed_template_recreates_pod() {
        let cluster = MockCluster::new();
        let worker = scheduled(&cluster).await;
        cluster.set_pod_phase(NS, POD, "Running");

        let newer = TestTemplate {
            image: "extract:v2".to_string(),
        };
        let (outcome, _) = worker.ensure_pod(&test_bundle(), &newer).await.unwrap();
        assert_eq!(outcome, EnsureOutcome::Updated);

        let pod = cluster.pod(NS, POD).unwrap();
        assert_eq!(pod.spec.unwrap().containers[0].image.as_deref(), Some("extract:v2"));
        assert_eq!(cluster.pod_count(), 1);
        assert_eq!(cluster.operation_counts().pod_deletes, 1);

        let (outcome, _) = worker.ensure_pod(&test_bundle(), &newer).await.unwrap();
        assert_eq!(outcome, EnsureOutcome::Unchanged);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_passes_create_one_pod() {
        let cluster = MockCluster::new();
        let worker = Arc::new(worker(&cluster));

        let mut tasks = tokio::task::JoinSet::new();
        for _ in 0..16 {
            let worker = worker.clone();
            tasks.spawn(async move { worker.unpack(&test_bundle(), &template()).await });
        }
        while let Some(result) = tasks.join_next().await {
            let result = result.unwrap().unwrap();
            assert_eq!(result.state, UnpackState::Pending);
        }

        assert_eq!(cluster.pod_count(), 1);
        assert_eq!(cluster.operation_counts().pod_deletes, 0);
    }

    #[tokio::test]
    async fn test_bundle_without_uid() {
        let cluster = MockCluster::new();
        let mut b = test_bundle();
        b.metadata.uid = None;

        let err = worker(&cluster).unpack(&b, &template()).await.unwrap_err();
        assert!(matches!(err, KubeError::InvalidBundle(_)));
        assert_eq!(cluster.pod_count(), 0);
    }
}
