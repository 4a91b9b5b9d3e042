//! Client construction and k8s-openapi -> snapshot conversion.

use anyhow::{Context, Result};
use k8s_openapi::api::core::v1::{Pod, ReplicationController, Service};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use rcview_core::{ControllerSnapshot, LabelMap, PodPhase, PodSnapshot, ServiceSnapshot};
use tracing::debug;

/// Build a client from kubeconfig, using `context` when given.
pub async fn build_client(context: Option<&str>) -> Result<kube::Client> {
    match context {
        Some(ctx) => {
            debug!(context = %ctx, "using kubeconfig context");
            let kubeconfig = kube::config::Kubeconfig::read().context("reading kubeconfig")?;
            let opts = kube::config::KubeConfigOptions { context: Some(ctx.to_string()), ..Default::default() };
            let config = kube::Config::from_custom_kubeconfig(kubeconfig, &opts)
                .await
                .with_context(|| format!("loading kubeconfig context '{}'", ctx))?;
            kube::Client::try_from(config).with_context(|| format!("building client for context '{}'", ctx))
        }
        None => {
            debug!("using default kubeconfig context");
            kube::Client::try_default().await.context("building default client")
        }
    }
}

fn meta_parts(meta: &ObjectMeta) -> (String, Option<String>, LabelMap) {
    (meta.name.clone().unwrap_or_default(), meta.namespace.clone(), meta.labels.clone().unwrap_or_default())
}

/// `spec.replicas` defaults to 1 when unset, matching the API server default.
pub fn controller_snapshot(rc: &ReplicationController) -> ControllerSnapshot {
    let (name, namespace, labels) = meta_parts(&rc.metadata);
    let spec = rc.spec.as_ref();
    ControllerSnapshot {
        name,
        namespace,
        desired_replicas: spec.and_then(|s| s.replicas).unwrap_or(1),
        current_replicas: rc.status.as_ref().map(|s| s.replicas).unwrap_or(0),
        labels,
        selector: spec.and_then(|s| s.selector.clone()).unwrap_or_default(),
    }
}

pub fn service_snapshot(svc: &Service) -> ServiceSnapshot {
    let (name, namespace, labels) = meta_parts(&svc.metadata);
    ServiceSnapshot {
        name,
        namespace,
        labels,
        selector: svc.spec.as_ref().and_then(|s| s.selector.clone()).unwrap_or_default(),
    }
}

pub fn pod_snapshot(pod: &Pod) -> PodSnapshot {
    let (name, namespace, labels) = meta_parts(&pod.metadata);
    let phase = PodPhase::parse(pod.status.as_ref().and_then(|s| s.phase.as_deref()));
    PodSnapshot { name, namespace, labels, phase }
}
