use k8s_openapi::api::core::v1::Pod;
use kube::api::ListParams;
use kube::config::{KubeConfigOptions, Kubeconfig};
use kube::{Api, Client};

use crate::error::SourceError;
use crate::types::PodPlacement;

/// Where the control-plane credentials come from. Injected into the placement
/// source instead of loading ambient config implicitly.
#[derive(Debug, Clone)]
pub enum CredentialSource {
    /// Read a kubeconfig file from an explicit path.
    KubeconfigFile(String),
    /// In-cluster service account, falling back to the default kubeconfig
    /// chain when running outside a cluster.
    InClusterAmbient,
    /// Connect to `server` authenticating with a bearer token.
    ExplicitToken { server: String, token: String },
}

impl CredentialSource {
    pub fn from_config(cluster_config_path: Option<&str>) -> Self {
        match cluster_config_path {
            Some(path) => CredentialSource::KubeconfigFile(path.to_string()),
            None => CredentialSource::InClusterAmbient,
        }
    }

    pub async fn client(&self) -> anyhow::Result<Client> {
        match self {
            CredentialSource::KubeconfigFile(path) => {
                let kubeconfig = Kubeconfig::read_from(path)?;
                let config =
                    kube::Config::from_custom_kubeconfig(kubeconfig, &KubeConfigOptions::default())
                        .await?;
                Ok(Client::try_from(config)?)
            }
            CredentialSource::InClusterAmbient => Ok(Client::try_default().await?),
            CredentialSource::ExplicitToken { server, token } => {
                let kubeconfig = token_kubeconfig(server, token)?;
                let config =
                    kube::Config::from_custom_kubeconfig(kubeconfig, &KubeConfigOptions::default())
                        .await?;
                Ok(Client::try_from(config)?)
            }
        }
    }
}

/// Build a single-context kubeconfig carrying only a server URL and a bearer
/// token. Going through the kubeconfig shape keeps one construction path for
/// all credential variants.
fn token_kubeconfig(server: &str, token: &str) -> anyhow::Result<Kubeconfig> {
    let value = serde_json::json!({
        "apiVersion": "v1",
        "kind": "Config",
        "clusters": [{"name": "default", "cluster": {"server": server}}],
        "users": [{"name": "default", "user": {"token": token}}],
        "contexts": [{"name": "default", "context": {"cluster": "default", "user": "default"}}],
        "current-context": "default",
    });
    Ok(serde_json::from_value(value)?)
}

/// A control plane that can enumerate every pod with its node assignment.
pub trait PlacementSource {
    fn list_placements(
        &self,
    ) -> impl std::future::Future<Output = Result<Vec<PodPlacement>, SourceError>> + Send;
}

const PAGE_SIZE: u32 = 500;

/// Lists pods across all namespaces through the Kubernetes API, one page at a
/// time. A failure on a page after the first surfaces the pods already read.
#[derive(Clone)]
pub struct KubePlacementSource {
    client: Client,
}

impl KubePlacementSource {
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

impl PlacementSource for KubePlacementSource {
    async fn list_placements(&self) -> Result<Vec<PodPlacement>, SourceError> {
        let pod_api: Api<Pod> = Api::all(self.client.clone());
        let mut placements = Vec::new();
        let mut continue_token: Option<String> = None;

        loop {
            let mut lp = ListParams::default().limit(PAGE_SIZE);
            if let Some(token) = &continue_token {
                lp = lp.continue_token(token);
            }

            let page = match pod_api.list(&lp).await {
                Ok(page) => page,
                Err(e) if placements.is_empty() => {
                    return Err(SourceError::Unavailable(e.to_string()));
                }
                Err(e) => {
                    return Err(SourceError::PartialListing {
                        placements,
                        reason: e.to_string(),
                    });
                }
            };

            continue_token = page.metadata.continue_.clone().filter(|t| !t.is_empty());
            placements.extend(page.items.iter().filter_map(placement_from_pod));

            if continue_token.is_none() {
                return Ok(placements);
            }
        }
    }
}

/// Map one pod object to its placement. Pods missing a name or namespace
/// (never produced by a real API server) are skipped; a missing node
/// assignment is kept as `None`.
pub fn placement_from_pod(pod: &Pod) -> Option<PodPlacement> {
    let pod_name = pod.metadata.name.clone()?;
    let namespace = pod.metadata.namespace.clone()?;
    let node_name = pod.spec.as_ref().and_then(|s| s.node_name.clone());
    Some(PodPlacement {
        pod_name,
        namespace,
        node_name,
    })
}
