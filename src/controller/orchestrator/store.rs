//! Object store seams used by the reconciler
//!
//! Production implementations talk to the API server through `kube::Api`.
//! The in-memory implementations under `#[cfg(test)]` keep objects in maps
//! and record every write so tests can assert on them without a cluster.

use crate::crd::{RolloutOrchestrator, RolloutOrchestratorStatus, StagePodAutoscaler, REVISION_LABEL_KEY};
use async_trait::async_trait;
use k8s_openapi::api::core::v1::Pod;
use kube::api::{Api, DeleteParams, ListParams, Patch, PatchParams, PostParams};
use kube::ResourceExt;
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Kubernetes API error: {0}")]
    Kube(#[from] kube::Error),

    #[error("Write to {kind} {name} rejected: resource version conflict")]
    Conflict { kind: &'static str, name: String },

    #[error("Object store unavailable: {0}")]
    Unavailable(String),

    #[error("{kind} is missing metadata.{field}")]
    MissingMetadata {
        kind: &'static str,
        field: &'static str,
    },
}

/// Reads and writes StagePodAutoscalers
#[async_trait]
pub trait AutoscalerStore: Send + Sync {
    /// Fetch by name; a missing object is `Ok(None)`
    async fn get(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<Option<StagePodAutoscaler>, StoreError>;

    async fn create(&self, spa: &StagePodAutoscaler) -> Result<StagePodAutoscaler, StoreError>;

    /// Full update of an existing object
    async fn replace(&self, spa: &StagePodAutoscaler) -> Result<StagePodAutoscaler, StoreError>;
}

/// Lists and force-deletes the pods backing a revision
#[async_trait]
pub trait PodStore: Send + Sync {
    async fn list_revision_pods(&self, namespace: &str, revision: &str)
        -> Result<Vec<Pod>, StoreError>;

    /// Delete with a zero grace period
    async fn force_delete(&self, namespace: &str, name: &str) -> Result<(), StoreError>;
}

/// Writes the RolloutOrchestrator status subresource
#[async_trait]
pub trait OrchestratorStore: Send + Sync {
    /// Replace the status, conditional on `resource_version` when given
    ///
    /// A write based on an outdated copy of the object fails with
    /// `StoreError::Conflict`.
    async fn patch_status(
        &self,
        namespace: &str,
        name: &str,
        resource_version: Option<&str>,
        status: &RolloutOrchestratorStatus,
    ) -> Result<(), StoreError>;
}

fn namespace_of(spa: &StagePodAutoscaler) -> Result<String, StoreError> {
    spa.namespace().ok_or(StoreError::MissingMetadata {
        kind: "StagePodAutoscaler",
        field: "namespace",
    })
}

fn name_of(spa: &StagePodAutoscaler) -> Result<String, StoreError> {
    spa.metadata.name.clone().ok_or(StoreError::MissingMetadata {
        kind: "StagePodAutoscaler",
        field: "name",
    })
}

pub struct KubeAutoscalerStore {
    client: kube::Client,
}

impl KubeAutoscalerStore {
    pub fn new(client: kube::Client) -> Self {
        Self { client }
    }

    fn api(&self, namespace: &str) -> Api<StagePodAutoscaler> {
        Api::namespaced(self.client.clone(), namespace)
    }
}

#[async_trait]
impl AutoscalerStore for KubeAutoscalerStore {
    async fn get(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<Option<StagePodAutoscaler>, StoreError> {
        match self.api(namespace).get(name).await {
            Ok(spa) => Ok(Some(spa)),
            Err(kube::Error::Api(err)) if err.code == 404 => {
                debug!(stage_pod_autoscaler = name, namespace = namespace, "StagePodAutoscaler not found");
                Ok(None)
            }
            Err(e) => Err(StoreError::Kube(e)),
        }
    }

    async fn create(&self, spa: &StagePodAutoscaler) -> Result<StagePodAutoscaler, StoreError> {
        let namespace = namespace_of(spa)?;
        Ok(self
            .api(&namespace)
            .create(&PostParams::default(), spa)
            .await?)
    }

    async fn replace(&self, spa: &StagePodAutoscaler) -> Result<StagePodAutoscaler, StoreError> {
        let namespace = namespace_of(spa)?;
        let name = name_of(spa)?;
        match self
            .api(&namespace)
            .replace(&name, &PostParams::default(), spa)
            .await
        {
            Ok(updated) => Ok(updated),
            Err(kube::Error::Api(err)) if err.code == 409 => Err(StoreError::Conflict {
                kind: "StagePodAutoscaler",
                name,
            }),
            Err(e) => Err(StoreError::Kube(e)),
        }
    }
}

pub struct KubePodStore {
    client: kube::Client,
}

impl KubePodStore {
    pub fn new(client: kube::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl PodStore for KubePodStore {
    async fn list_revision_pods(
        &self,
        namespace: &str,
        revision: &str,
    ) -> Result<Vec<Pod>, StoreError> {
        let pods: Api<Pod> = Api::namespaced(self.client.clone(), namespace);
        let params = ListParams::default().labels(&format!("{}={}", REVISION_LABEL_KEY, revision));
        Ok(pods.list(&params).await?.items)
    }

    async fn force_delete(&self, namespace: &str, name: &str) -> Result<(), StoreError> {
        let pods: Api<Pod> = Api::namespaced(self.client.clone(), namespace);
        let params = DeleteParams {
            grace_period_seconds: Some(0),
            ..DeleteParams::default()
        };
        match pods.delete(name, &params).await {
            Ok(_) => Ok(()),
            // Already gone
            Err(kube::Error::Api(err)) if err.code == 404 => Ok(()),
            Err(e) => Err(StoreError::Kube(e)),
        }
    }
}

pub struct KubeOrchestratorStore {
    client: kube::Client,
}

impl KubeOrchestratorStore {
    pub fn new(client: kube::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl OrchestratorStore for KubeOrchestratorStore {
    async fn patch_status(
        &self,
        namespace: &str,
        name: &str,
        resource_version: Option<&str>,
        status: &RolloutOrchestratorStatus,
    ) -> Result<(), StoreError> {
        let api: Api<RolloutOrchestrator> = Api::namespaced(self.client.clone(), namespace);
        let body = status_patch(resource_version, status);
        match api
            .patch_status(name, &PatchParams::default(), &Patch::Merge(&body))
            .await
        {
            Ok(_) => Ok(()),
            Err(kube::Error::Api(err)) if err.code == 409 => Err(StoreError::Conflict {
                kind: "RolloutOrchestrator",
                name: name.to_string(),
            }),
            Err(e) => Err(StoreError::Kube(e)),
        }
    }
}

/// Merge patch body for the status subresource
///
/// With a resource version the API server applies it only if the object has
/// not changed since it was read.
pub fn status_patch(
    resource_version: Option<&str>,
    status: &RolloutOrchestratorStatus,
) -> serde_json::Value {
    match resource_version {
        Some(version) => serde_json::json!({
            "metadata": { "resourceVersion": version },
            "status": status,
        }),
        None => serde_json::json!({ "status": status }),
    }
}

#[cfg(test)]
pub use mock::{MockAutoscalerStore, MockOrchestratorStore, MockPodStore};

#[cfg(test)]
#[allow(clippy::expect_used)]
mod mock {
    use super::*;
    use crate::crd::StagePodAutoscalerStatus;
    use std::collections::BTreeMap;
    use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
    use std::sync::Mutex;

    type Key = (String, String);

    fn key(namespace: &str, name: &str) -> Key {
        (namespace.to_string(), name.to_string())
    }

    /// StagePodAutoscalers kept in a map
    ///
    /// `replace` keeps the stored status, matching an API server where status
    /// lives in a subresource.
    #[derive(Default)]
    pub struct MockAutoscalerStore {
        objects: Mutex<BTreeMap<Key, StagePodAutoscaler>>,
        created: Mutex<Vec<StagePodAutoscaler>>,
        replaced: Mutex<Vec<StagePodAutoscaler>>,
        fail_reads: AtomicBool,
        fail_writes: AtomicBool,
    }

    impl MockAutoscalerStore {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn insert(&self, spa: StagePodAutoscaler) {
            let k = key(
                spa.metadata.namespace.as_deref().unwrap_or_default(),
                spa.metadata.name.as_deref().unwrap_or_default(),
            );
            self.objects.lock().expect("lock").insert(k, spa);
        }

        /// Simulate the autoscaler reporting observed scale
        pub fn set_status(&self, namespace: &str, name: &str, status: StagePodAutoscalerStatus) {
            let mut objects = self.objects.lock().expect("lock");
            let spa = objects
                .get_mut(&key(namespace, name))
                .expect("set_status on missing StagePodAutoscaler");
            spa.status = Some(status);
        }

        pub fn stored(&self, namespace: &str, name: &str) -> Option<StagePodAutoscaler> {
            self.objects
                .lock()
                .expect("lock")
                .get(&key(namespace, name))
                .cloned()
        }

        pub fn created(&self) -> Vec<StagePodAutoscaler> {
            self.created.lock().expect("lock").clone()
        }

        pub fn replaced(&self) -> Vec<StagePodAutoscaler> {
            self.replaced.lock().expect("lock").clone()
        }

        pub fn write_count(&self) -> usize {
            self.created.lock().expect("lock").len() + self.replaced.lock().expect("lock").len()
        }

        pub fn fail_reads(&self, fail: bool) {
            self.fail_reads.store(fail, Ordering::SeqCst);
        }

        pub fn fail_writes(&self, fail: bool) {
            self.fail_writes.store(fail, Ordering::SeqCst);
        }
    }

    #[async_trait]
    impl AutoscalerStore for MockAutoscalerStore {
        async fn get(
            &self,
            namespace: &str,
            name: &str,
        ) -> Result<Option<StagePodAutoscaler>, StoreError> {
            if self.fail_reads.load(Ordering::SeqCst) {
                return Err(StoreError::Unavailable("injected read failure".to_string()));
            }
            Ok(self.stored(namespace, name))
        }

        async fn create(&self, spa: &StagePodAutoscaler) -> Result<StagePodAutoscaler, StoreError> {
            if self.fail_writes.load(Ordering::SeqCst) {
                return Err(StoreError::Unavailable("injected write failure".to_string()));
            }
            let k = key(&namespace_of(spa)?, &name_of(spa)?);
            let mut objects = self.objects.lock().expect("lock");
            if objects.contains_key(&k) {
                return Err(StoreError::Conflict {
                    kind: "StagePodAutoscaler",
                    name: k.1,
                });
            }
            objects.insert(k, spa.clone());
            self.created.lock().expect("lock").push(spa.clone());
            Ok(spa.clone())
        }

        async fn replace(&self, spa: &StagePodAutoscaler) -> Result<StagePodAutoscaler, StoreError> {
            if self.fail_writes.load(Ordering::SeqCst) {
                return Err(StoreError::Unavailable("injected write failure".to_string()));
            }
            let k = key(&namespace_of(spa)?, &name_of(spa)?);
            let mut objects = self.objects.lock().expect("lock");
            let Some(existing) = objects.get_mut(&k) else {
                return Err(StoreError::Unavailable(format!("{} does not exist", k.1)));
            };
            let mut updated = spa.clone();
            updated.status = existing.status.clone();
            *existing = updated.clone();
            self.replaced.lock().expect("lock").push(spa.clone());
            Ok(updated)
        }
    }

    /// Pods kept in a list, filtered by the revision label on read
    #[derive(Default)]
    pub struct MockPodStore {
        pods: Mutex<Vec<Pod>>,
        deleted: Mutex<Vec<String>>,
        fail_list: AtomicBool,
        fail_delete: AtomicBool,
    }

    impl MockPodStore {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn insert(&self, pod: Pod) {
            self.pods.lock().expect("lock").push(pod);
        }

        pub fn deleted(&self) -> Vec<String> {
            self.deleted.lock().expect("lock").clone()
        }

        pub fn fail_list(&self, fail: bool) {
            self.fail_list.store(fail, Ordering::SeqCst);
        }

        pub fn fail_delete(&self, fail: bool) {
            self.fail_delete.store(fail, Ordering::SeqCst);
        }
    }

    #[async_trait]
    impl PodStore for MockPodStore {
        async fn list_revision_pods(
            &self,
            namespace: &str,
            revision: &str,
        ) -> Result<Vec<Pod>, StoreError> {
            if self.fail_list.load(Ordering::SeqCst) {
                return Err(StoreError::Unavailable("injected list failure".to_string()));
            }
            Ok(self
                .pods
                .lock()
                .expect("lock")
                .iter()
                .filter(|pod| pod.metadata.namespace.as_deref() == Some(namespace))
                .filter(|pod| {
                    pod.labels().get(REVISION_LABEL_KEY).map(String::as_str) == Some(revision)
                })
                .cloned()
                .collect())
        }

        async fn force_delete(&self, namespace: &str, name: &str) -> Result<(), StoreError> {
            if self.fail_delete.load(Ordering::SeqCst) {
                return Err(StoreError::Unavailable("injected delete failure".to_string()));
            }
            self.pods.lock().expect("lock").retain(|pod| {
                !(pod.metadata.namespace.as_deref() == Some(namespace)
                    && pod.metadata.name.as_deref() == Some(name))
            });
            self.deleted.lock().expect("lock").push(name.to_string());
            Ok(())
        }
    }

    /// Records every status patch and versions the stored object
    ///
    /// Starts at resource version "1"; every accepted patch bumps it. A patch
    /// carrying any other version is rejected as a conflict.
    pub struct MockOrchestratorStore {
        patches: Mutex<Vec<(String, RolloutOrchestratorStatus)>>,
        version: AtomicU64,
        fail: AtomicBool,
    }

    impl Default for MockOrchestratorStore {
        fn default() -> Self {
            Self {
                patches: Mutex::default(),
                version: AtomicU64::new(1),
                fail: AtomicBool::default(),
            }
        }
    }

    impl MockOrchestratorStore {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn patches(&self) -> Vec<(String, RolloutOrchestratorStatus)> {
            self.patches.lock().expect("lock").clone()
        }

        pub fn last_status(&self) -> Option<RolloutOrchestratorStatus> {
            self.patches
                .lock()
                .expect("lock")
                .last()
                .map(|(_, status)| status.clone())
        }

        pub fn resource_version(&self) -> String {
            self.version.load(Ordering::SeqCst).to_string()
        }

        pub fn fail(&self, fail: bool) {
            self.fail.store(fail, Ordering::SeqCst);
        }
    }

    #[async_trait]
    impl OrchestratorStore for MockOrchestratorStore {
        async fn patch_status(
            &self,
            _namespace: &str,
            name: &str,
            resource_version: Option<&str>,
            status: &RolloutOrchestratorStatus,
        ) -> Result<(), StoreError> {
            if self.fail.load(Ordering::SeqCst) {
                return Err(StoreError::Unavailable("injected patch failure".to_string()));
            }
            let mut patches = self.patches.lock().expect("lock");
            if let Some(expected) = resource_version {
                if expected != self.resource_version() {
                    return Err(StoreError::Conflict {
                        kind: "RolloutOrchestrator",
                        name: name.to_string(),
                    });
                }
            }
            self.version.fetch_add(1, Ordering::SeqCst);
            patches.push((name.to_string(), status.clone()));
            Ok(())
        }
    }
}
