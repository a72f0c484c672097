use std::collections::BTreeMap;

use anyhow::{Context, Result};
use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::core::v1::Pod;
use kube::Api;
use kube::api::ListParams;
use kube::config::{KubeConfigOptions, Kubeconfig};

use kubemerge_types::{ContainerInfo, ContextInfo, PodInfo, PodStatus};

/// Pod annotation naming the container `kubectl logs` reads by default
const DEFAULT_CONTAINER_ANNOTATION: &str = "kubectl.kubernetes.io/default-container";

/// Kubernetes client wrapper
pub struct KubeClient {
    kubeconfig: Kubeconfig,
    current_context: Option<String>,
}

impl KubeClient {
    /// Create a new KubeClient by loading the kubeconfig
    pub fn new() -> Result<Self> {
        let kubeconfig =
            Kubeconfig::read().context("Failed to read kubeconfig. Is kubectl configured?")?;

        let current_context = kubeconfig.current_context.clone();

        Ok(Self {
            kubeconfig,
            current_context,
        })
    }

    /// Get all available contexts from kubeconfig
    pub fn get_contexts(&self) -> Vec<ContextInfo> {
        self.kubeconfig
            .contexts
            .iter()
            .map(|ctx| {
                ContextInfo::new(
                    ctx.name.clone(),
                    ctx.context.as_ref().and_then(|c| c.namespace.clone()),
                )
            })
            .collect()
    }

    /// Get the current context name
    pub fn current_context(&self) -> Option<&str> {
        self.current_context.as_deref()
    }

    /// Default namespace configured for a context, if any
    pub fn context_namespace(&self, context_name: &str) -> Option<String> {
        self.get_contexts()
            .into_iter()
            .find(|c| c.name == context_name)
            .and_then(|c| c.namespace)
    }

    /// Create a kube::Client for a specific context
    pub async fn client_for_context(&self, context_name: &str) -> Result<kube::Client> {
        if !self.kubeconfig.contexts.iter().any(|c| c.name == context_name) {
            anyhow::bail!("Context '{}' not found in kubeconfig", context_name);
        }

        let config = kube::Config::from_custom_kubeconfig(
            self.kubeconfig.clone(),
            &KubeConfigOptions {
                context: Some(context_name.to_string()),
                ..Default::default()
            },
        )
        .await
        .context(format!(
            "Failed to create config for context: {}",
            context_name
        ))?;

        tracing::debug!("Connecting to cluster {} (context {})", config.cluster_url, context_name);

        kube::Client::try_from(config).context(format!(
            "Failed to create client for context: {}",
            context_name
        ))
    }

    /// Resolve the label selector of a deployment
    pub async fn deployment_selector(
        &self,
        client: &kube::Client,
        namespace: &str,
        name: &str,
    ) -> Result<String> {
        let deployments: Api<Deployment> = Api::namespaced(client.clone(), namespace);
        let deploy = deployments.get(name).await.context(format!(
            "Failed to get deployment '{}' in namespace '{}'",
            name, namespace
        ))?;

        let labels = deploy
            .spec
            .and_then(|spec| spec.selector.match_labels)
            .unwrap_or_default();

        if labels.is_empty() {
            anyhow::bail!("Deployment '{}' has no matchLabels selector", name);
        }

        Ok(selector_from_labels(&labels))
    }

    /// Fetch pods matching a label selector (empty selector lists all pods)
    pub async fn get_pods(
        &self,
        client: &kube::Client,
        namespace: &str,
        label_selector: &str,
    ) -> Result<Vec<PodInfo>> {
        let pods: Api<Pod> = Api::namespaced(client.clone(), namespace);

        let mut params = ListParams::default();
        if !label_selector.is_empty() {
            params = params.labels(label_selector);
        }

        let list = pods.list(&params).await.context(format!(
            "Failed to list pods in namespace {} (selector '{}')",
            namespace, label_selector
        ))?;

        let mut infos: Vec<PodInfo> = list
            .items
            .into_iter()
            .map(Self::pod_to_info)
            .collect();
        infos.sort_by(|a, b| a.name.cmp(&b.name));

        tracing::debug!(
            "Found {} pods: {}",
            infos.len(),
            infos.iter().map(|p| p.name.as_str()).collect::<Vec<_>>().join(", ")
        );

        Ok(infos)
    }

    /// Convert a k8s Pod to PodInfo
    fn pod_to_info(pod: Pod) -> PodInfo {
        let default_container = pod
            .metadata
            .annotations
            .as_ref()
            .and_then(|a| a.get(DEFAULT_CONTAINER_ANNOTATION))
            .cloned();
        let mut info = PodInfo::new(pod.metadata.name.unwrap_or_default());

        info.status = pod
            .status
            .and_then(|status| status.phase)
            .as_deref()
            .map(PodStatus::from)
            .unwrap_or(PodStatus::Unknown);

        if let Some(spec) = pod.spec {
            info.containers = spec
                .containers
                .into_iter()
                .map(|c| ContainerInfo::new(c.name))
                .collect();
        }

        // kubectl reads the annotated container when none is given
        if let Some(name) = default_container {
            if let Some(pos) = info.containers.iter().position(|c| c.name == name) {
                let container = info.containers.remove(pos);
                info.containers.insert(0, container);
            }
        }

        info
    }
}

/// Build a `k=v,k2=v2` label selector
pub fn selector_from_labels(labels: &BTreeMap<String, String>) -> String {
    labels
        .iter()
        .map(|(k, v)| format!("{}={}", k, v))
        .collect::<Vec<_>>()
        .join(",")
}
