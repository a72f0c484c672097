//! Kubernetes client for kubemerge
//!
//! This crate provides Kubernetes API integration for resolving contexts
//! and discovering the pods whose logs get merged.

mod client;

pub use client::{KubeClient, selector_from_labels};

// Re-export types that are used in our public API
pub use kubemerge_types::{ContainerInfo, ContextInfo, PodInfo, PodStatus};
