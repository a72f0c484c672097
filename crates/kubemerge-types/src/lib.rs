//! Shared types for kubemerge
//!
//! This crate contains data structures used across multiple kubemerge crates.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::time::Duration;

// ============================================================================
// Kubernetes Resource Types
// ============================================================================

/// Kubernetes context information
#[derive(Clone, Debug)]
pub struct ContextInfo {
    pub name: String,
    pub namespace: Option<String>,
}

impl ContextInfo {
    pub fn new(name: String, namespace: Option<String>) -> Self {
        Self { name, namespace }
    }
}

/// Pod information
#[derive(Clone, Debug)]
pub struct PodInfo {
    pub name: String,
    pub status: PodStatus,
    /// Containers in log-default order: the annotated default first, then
    /// declaration order
    pub containers: Vec<ContainerInfo>,
}

impl PodInfo {
    pub fn new(name: String) -> Self {
        Self {
            name,
            status: PodStatus::Unknown,
            containers: Vec::new(),
        }
    }

    /// Whether the pod is in a phase that still has a log stream to follow
    pub fn is_running(&self) -> bool {
        self.status == PodStatus::Running
    }

    /// Container whose logs are read when none is requested
    pub fn default_container(&self) -> Option<&str> {
        self.containers.first().map(|c| c.name.as_str())
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PodStatus {
    Pending,
    Running,
    Succeeded,
    Failed,
    Unknown,
}

impl From<&str> for PodStatus {
    fn from(s: &str) -> Self {
        match s {
            "Pending" => Self::Pending,
            "Running" => Self::Running,
            "Succeeded" => Self::Succeeded,
            "Failed" => Self::Failed,
            _ => Self::Unknown,
        }
    }
}

#[derive(Clone, Debug)]
pub struct ContainerInfo {
    pub name: String,
}

impl ContainerInfo {
    pub fn new(name: String) -> Self {
        Self { name }
    }
}

// ============================================================================
// Log Types
// ============================================================================

/// Lower bound for historical reads
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LogSince {
    /// Entries newer than this long before the read starts
    Ago(Duration),
    /// Entries at or after this instant
    Time(DateTime<Utc>),
}

impl LogSince {
    /// Resolve to an absolute instant relative to `now`
    pub fn lower_bound(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        match self {
            Self::Ago(ago) => chrono::Duration::from_std(*ago)
                .ok()
                .and_then(|ago| now.checked_sub_signed(ago))
                .unwrap_or(DateTime::<Utc>::MIN_UTC),
            Self::Time(time) => *time,
        }
    }
}

/// A single timestamped log line from one source
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct LogEntry {
    /// Timestamp reported by the source
    pub timestamp: DateTime<Utc>,

    /// Line content after the timestamp
    pub message: String,
}

impl LogEntry {
    pub fn new(timestamp: DateTime<Utc>, message: impl Into<String>) -> Self {
        Self {
            timestamp,
            message: message.into(),
        }
    }
}

/// Identity of one log source and the prefix its lines are rendered with
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SourceInfo {
    pub id: String,
    pub display_prefix: String,
}

impl SourceInfo {
    /// Source whose prefix is just `"<id>:"`
    pub fn new(id: impl Into<String>) -> Self {
        let id = id.into();
        let display_prefix = format!("{}:", id);
        Self { id, display_prefix }
    }

    pub fn with_prefix(id: impl Into<String>, display_prefix: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            display_prefix: display_prefix.into(),
        }
    }
}
