//! rcview kubehub: the cluster data source.
//!
//! [`ClusterSource`] is the seam the ops layer depends on. [`KubeSource`] implements it with
//! kube-rs list calls; [`MockSource`] is an in-memory stand-in that records every call.

#![forbid(unsafe_code)]

use std::fmt;
use std::sync::Mutex;
use std::time::Instant;

use anyhow::{anyhow, Result};
use k8s_openapi::api::core::v1::{Pod, ReplicationController, Service};
use kube::{api::{Api, ListParams}, Client};
use metrics::{counter, histogram};
use rcview_core::{ControllerSnapshot, LabelMap, LabelSelector, PodSnapshot, ServiceSnapshot};
use tracing::debug;

mod convert;

pub use convert::{build_client, controller_snapshot, pod_snapshot, service_snapshot};

/// Object kinds the data source can list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ObjectKind {
    Controller,
    Service,
    Pod,
}

impl fmt::Display for ObjectKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.resource())
    }
}

impl ObjectKind {
    pub fn resource(&self) -> &'static str {
        match self {
            ObjectKind::Controller => "replicationcontrollers",
            ObjectKind::Service => "services",
            ObjectKind::Pod => "pods",
        }
    }
}

/// Read-only access to controllers, services and pods of one namespace.
///
/// Implementations must treat the selector as an AND of its requirements; an empty selector
/// lists everything in the namespace.
#[async_trait::async_trait]
pub trait ClusterSource: Send + Sync {
    async fn list_controllers(&self, namespace: &str, selector: &LabelSelector) -> Result<Vec<ControllerSnapshot>>;
    async fn list_services(&self, namespace: &str, selector: &LabelSelector) -> Result<Vec<ServiceSnapshot>>;
    async fn list_pods(&self, namespace: &str, selector: &LabelSelector) -> Result<Vec<PodSnapshot>>;
}

// ----------------- kube-rs implementation -----------------

pub struct KubeSource {
    client: Client,
}

impl KubeSource {
    pub fn new(client: Client) -> Self { Self { client } }

    /// Connect using the given kubeconfig context, or the default one.
    pub async fn connect(context: Option<&str>) -> Result<Self> {
        Ok(Self::new(build_client(context).await?))
    }

    async fn list<K, T>(&self, kind: ObjectKind, namespace: &str, selector: &LabelSelector, map: fn(&K) -> T) -> Result<Vec<T>>
    where
        K: kube::Resource<Scope = k8s_openapi::NamespaceResourceScope> + Clone + fmt::Debug + serde::de::DeserializeOwned,
        <K as kube::Resource>::DynamicType: Default,
    {
        let t0 = Instant::now();
        let api: Api<K> = Api::namespaced(self.client.clone(), namespace);
        let lp = list_params(selector);
        counter!("source_list_total", 1u64, "kind" => kind.resource());
        let list = api.list(&lp).await?;
        let out: Vec<T> = list.items.iter().map(map).collect();
        histogram!("source_list_ms", t0.elapsed().as_secs_f64() * 1000.0, "kind" => kind.resource());
        debug!(kind = %kind, ns = %namespace, selector = %selector, count = out.len(), took_ms = %t0.elapsed().as_millis(), "list ok");
        Ok(out)
    }
}

#[async_trait::async_trait]
impl ClusterSource for KubeSource {
    async fn list_controllers(&self, namespace: &str, selector: &LabelSelector) -> Result<Vec<ControllerSnapshot>> {
        self.list::<ReplicationController, _>(ObjectKind::Controller, namespace, selector, controller_snapshot).await
    }

    async fn list_services(&self, namespace: &str, selector: &LabelSelector) -> Result<Vec<ServiceSnapshot>> {
        self.list::<Service, _>(ObjectKind::Service, namespace, selector, service_snapshot).await
    }

    async fn list_pods(&self, namespace: &str, selector: &LabelSelector) -> Result<Vec<PodSnapshot>> {
        self.list::<Pod, _>(ObjectKind::Pod, namespace, selector, pod_snapshot).await
    }
}

/// Empty selectors are left off the request so the server lists everything.
pub fn list_params(selector: &LabelSelector) -> ListParams {
    let lp = ListParams::default();
    if selector.is_empty() { lp } else { lp.labels(&selector.to_string()) }
}

// ----------------- Mock implementation -----------------

/// One recorded data source call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceCall {
    pub verb: &'static str,
    pub kind: ObjectKind,
    pub namespace: String,
    /// Selector rendered in label-selector syntax.
    pub selector: String,
}

/// Simple in-memory source for tests. Filters by namespace and selector like the API server
/// does and records each call in order.
#[derive(Default)]
pub struct MockSource {
    pub controllers: Vec<ControllerSnapshot>,
    pub services: Vec<ServiceSnapshot>,
    pub pods: Vec<PodSnapshot>,
    /// Fail every list of this kind.
    pub fail_on: Option<ObjectKind>,
    calls: Mutex<Vec<SourceCall>>,
}

impl MockSource {
    pub fn new() -> Self { Self::default() }

    pub fn calls(&self) -> Vec<SourceCall> {
        self.calls.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    fn record(&self, kind: ObjectKind, namespace: &str, selector: &LabelSelector) -> Result<()> {
        self.calls.lock().unwrap_or_else(|e| e.into_inner()).push(SourceCall {
            verb: "list",
            kind,
            namespace: namespace.to_string(),
            selector: selector.to_string(),
        });
        match self.fail_on {
            Some(k) if k == kind => Err(anyhow!("mock: listing {} failed", kind)),
            _ => Ok(()),
        }
    }

    fn select<T: Clone>(items: &[T], namespace: &str, selector: &LabelSelector, meta: fn(&T) -> (Option<&str>, &LabelMap)) -> Vec<T> {
        items
            .iter()
            .filter(|it| {
                let (ns, labels) = meta(it);
                ns == Some(namespace) && selector.matches(labels)
            })
            .cloned()
            .collect()
    }
}

#[async_trait::async_trait]
impl ClusterSource for MockSource {
    async fn list_controllers(&self, namespace: &str, selector: &LabelSelector) -> Result<Vec<ControllerSnapshot>> {
        self.record(ObjectKind::Controller, namespace, selector)?;
        Ok(Self::select(&self.controllers, namespace, selector, |c| (c.namespace.as_deref(), &c.labels)))
    }

    async fn list_services(&self, namespace: &str, selector: &LabelSelector) -> Result<Vec<ServiceSnapshot>> {
        self.record(ObjectKind::Service, namespace, selector)?;
        Ok(Self::select(&self.services, namespace, selector, |s| (s.namespace.as_deref(), &s.labels)))
    }

    async fn list_pods(&self, namespace: &str, selector: &LabelSelector) -> Result<Vec<PodSnapshot>> {
        self.record(ObjectKind::Pod, namespace, selector)?;
        Ok(Self::select(&self.pods, namespace, selector, |p| (p.namespace.as_deref(), &p.labels)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rcview_core::to_selector;

    fn labels(pairs: &[(&str, &str)]) -> LabelMap {
        pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()
    }

    #[test]
    fn list_params_omit_empty_selector() {
        assert_eq!(list_params(&LabelSelector::everything()).label_selector, None);
        let sel = to_selector(&labels(&[("app", "test"), ("tier", "web")])).unwrap();
        assert_eq!(list_params(&sel).label_selector.as_deref(), Some("app=test,tier=web"));
    }

    #[tokio::test]
    async fn mock_filters_by_namespace_and_labels() {
        let mut src = MockSource::new();
        src.services = vec![
            ServiceSnapshot { name: "a".into(), namespace: Some("ns".into()), labels: labels(&[("app", "test")]), ..Default::default() },
            ServiceSnapshot { name: "b".into(), namespace: Some("ns".into()), labels: labels(&[("app", "other")]), ..Default::default() },
            ServiceSnapshot { name: "c".into(), namespace: Some("elsewhere".into()), labels: labels(&[("app", "test")]), ..Default::default() },
        ];
        let sel = to_selector(&labels(&[("app", "test")])).unwrap();
        let got = src.list_services("ns", &sel).await.unwrap();
        assert_eq!(got.iter().map(|s| s.name.as_str()).collect::<Vec<_>>(), vec!["a"]);
        let all = src.list_services("ns", &LabelSelector::everything()).await.unwrap();
        assert_eq!(all.len(), 2);
        let calls = src.calls();
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[0], SourceCall { verb: "list", kind: ObjectKind::Service, namespace: "ns".into(), selector: "app=test".into() });
        assert_eq!(calls[1].selector, "");
    }

    #[tokio::test]
    async fn mock_injected_failure_is_recorded() {
        let src = MockSource { fail_on: Some(ObjectKind::Pod), ..Default::default() };
        let err = src.list_pods("ns", &LabelSelector::everything()).await.unwrap_err();
        assert_eq!(err.to_string(), "mock: listing pods failed");
        assert_eq!(src.calls().len(), 1);
        assert!(src.list_controllers("ns", &LabelSelector::everything()).await.unwrap().is_empty());
    }
}
