//! rcview ops: one-shot computations over a [`ClusterSource`].
//!
//! Nothing here keeps state between calls or retries; errors from the source are returned as-is.

#![forbid(unsafe_code)]

use std::collections::HashSet;
use std::time::Instant;

use anyhow::Result;
use metrics::{counter, histogram};
use rcview_core::{pod_info, to_selector, LabelMap, LabelSelector, PodInfo, ServiceSnapshot};
use rcview_kubehub::ClusterSource;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

/// Services that may be deleted together with the controllers matched by `selector`.
///
/// Always issues exactly two list calls: controllers first, then services.
///
/// Policy: when controllers match, services are listed with the selector of the *first*
/// controller only. Controllers sharing a deletion selector are expected to share one service
/// selector; this is not verified, and a mismatch among siblings is only logged. When no
/// controller matches, services are listed by `selector` itself, since a service can outlive
/// its controllers.
///
/// The service list is returned verbatim (see [`distinct_by_selector`]).
pub async fn services_for_deletion(source: &dyn ClusterSource, selector: &LabelSelector, namespace: &str) -> Result<Vec<ServiceSnapshot>> {
    let t0 = Instant::now();
    let controllers = source.list_controllers(namespace, selector).await?;
    let services = match controllers.first() {
        Some(first) => {
            if controllers.iter().skip(1).any(|c| c.selector != first.selector) {
                warn!(ns = %namespace, first = %first.name, count = controllers.len(), "controllers disagree on selector; using the first one");
            }
            if first.selector.is_empty() {
                warn!(ns = %namespace, first = %first.name, "first controller has no selector; every service in the namespace is a candidate");
            }
            let derived = to_selector(&first.selector)?;
            source.list_services(namespace, &derived).await?
        }
        None => source.list_services(namespace, selector).await?,
    };
    counter!("deletion_resolutions_total", 1u64);
    histogram!("deletion_candidates_services", services.len() as f64);
    histogram!("deletion_candidates_ms", t0.elapsed().as_secs_f64() * 1000.0);
    info!(ns = %namespace, selector = %selector, controllers = controllers.len(), services = services.len(), "deletion candidates resolved");
    Ok(services)
}

/// Keep the first service of each distinct selector map, preserving order.
pub fn distinct_by_selector(services: Vec<ServiceSnapshot>) -> Vec<ServiceSnapshot> {
    let mut seen: HashSet<LabelMap> = HashSet::new();
    services.into_iter().filter(|s| seen.insert(s.selector.clone())).collect()
}

/// Pod-info summary of one controller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ControllerReport {
    pub name: String,
    pub namespace: Option<String>,
    pub selector: LabelMap,
    pub pod_info: PodInfo,
}

/// Summaries for every controller matched by `selector`.
///
/// Pods are listed per controller with the controller's own selector. A controller without a
/// selector gets zero phase counts instead of a namespace-wide pod listing.
pub async fn controller_reports(source: &dyn ClusterSource, selector: &LabelSelector, namespace: &str) -> Result<Vec<ControllerReport>> {
    let controllers = source.list_controllers(namespace, selector).await?;
    let mut out = Vec::with_capacity(controllers.len());
    for c in controllers {
        let info = if c.selector.is_empty() {
            warn!(ns = %namespace, controller = %c.name, "controller has no selector; skipping pod listing");
            pod_info(&c, std::iter::empty())
        } else {
            let pod_sel = to_selector(&c.selector)?;
            let pods = source.list_pods(namespace, &pod_sel).await?;
            pod_info(&c, pods.iter().map(|p| &p.phase))
        };
        out.push(ControllerReport { name: c.name, namespace: c.namespace, selector: c.selector, pod_info: info });
    }
    info!(ns = %namespace, selector = %selector, controllers = out.len(), "controller reports ready");
    Ok(out)
}
