//! rcview core types: label selectors, workload snapshots and pod-info summaries.
//!
//! Everything in this crate is pure and synchronous; talking to a cluster is the job of
//! `rcview-kubehub`.

#![forbid(unsafe_code)]

pub mod labels;
pub mod podinfo;

pub use labels::{parse_label_map, to_selector, LabelSelector, Operator, Requirement, SelectorError};
pub use podinfo::{pod_info, ControllerSnapshot, PodInfo, PodPhase, PodSnapshot, ServiceSnapshot};

/// Plain label map as carried by controllers and services (`spec.selector`).
pub type LabelMap = std::collections::BTreeMap<String, String>;

pub mod prelude {
    pub use super::{
        pod_info, to_selector, ControllerSnapshot, LabelMap, LabelSelector, Operator, PodInfo,
        PodPhase, PodSnapshot, Requirement, SelectorError, ServiceSnapshot,
    };
}
