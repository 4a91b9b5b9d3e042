//! Controller/pod/service snapshots and the pod-info summary.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::LabelMap;

/// Pod lifecycle phase (`status.phase`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PodPhase {
    Running,
    Pending,
    Failed,
    Succeeded,
    Unknown,
    Other(String),
}

impl PodPhase {
    /// Missing phase is reported as `Unknown`, like kubectl does.
    pub fn parse(phase: Option<&str>) -> Self {
        match phase {
            Some("Running") => PodPhase::Running,
            Some("Pending") => PodPhase::Pending,
            Some("Failed") => PodPhase::Failed,
            Some("Succeeded") => PodPhase::Succeeded,
            Some("Unknown") | None => PodPhase::Unknown,
            Some(other) => PodPhase::Other(other.to_string()),
        }
    }
}

impl From<&str> for PodPhase {
    fn from(s: &str) -> Self { Self::parse(Some(s)) }
}

impl fmt::Display for PodPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PodPhase::Running => f.write_str("Running"),
            PodPhase::Pending => f.write_str("Pending"),
            PodPhase::Failed => f.write_str("Failed"),
            PodPhase::Succeeded => f.write_str("Succeeded"),
            PodPhase::Unknown => f.write_str("Unknown"),
            PodPhase::Other(s) => f.write_str(s),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PodSnapshot {
    pub name: String,
    pub namespace: Option<String>,
    pub labels: LabelMap,
    pub phase: PodPhase,
}

/// Replica counts and selector of a workload controller.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ControllerSnapshot {
    pub name: String,
    pub namespace: Option<String>,
    /// `spec.replicas`
    pub desired_replicas: i32,
    /// `status.replicas`
    pub current_replicas: i32,
    /// `metadata.labels`
    pub labels: LabelMap,
    /// `spec.selector`
    pub selector: LabelMap,
}

/// Services compare equal for deduplication when their selector maps are equal; see
/// [`ServiceSnapshot::same_selector`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceSnapshot {
    pub name: String,
    pub namespace: Option<String>,
    pub labels: LabelMap,
    pub selector: LabelMap,
}

impl ServiceSnapshot {
    pub fn same_selector(&self, other: &ServiceSnapshot) -> bool { self.selector == other.selector }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PodInfo {
    /// Replicas observed by the controller.
    pub current: i32,
    /// Replicas requested in the controller spec.
    pub desired: i32,
    pub running: usize,
    pub pending: usize,
    pub failed: usize,
}

/// Summarise pod phases for `controller`.
///
/// Replica counts are copied from the controller as-is. Phases other than Running, Pending and
/// Failed are not counted. The caller decides which pods belong to the controller.
pub fn pod_info<'a, I>(controller: &ControllerSnapshot, phases: I) -> PodInfo
where
    I: IntoIterator<Item = &'a PodPhase>,
{
    let mut info = PodInfo { current: controller.current_replicas, desired: controller.desired_replicas, ..PodInfo::default() };
    for phase in phases {
        match phase {
            PodPhase::Running => info.running += 1,
            PodPhase::Pending => info.pending += 1,
            PodPhase::Failed => info.failed += 1,
            _ => {}
        }
    }
    info
}
