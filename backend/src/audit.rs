//! Ordered audit log entries for privacy workflows.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationKind {
    Encryption,
    ZkProof,
    Compression,
    Validation,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationStatus {
    Success,
    /// Completed, but with a simulated artifact standing in for a real one.
    Degraded,
    Failed,
    /// Not attempted because an upstream step failed or the caller opted out.
    Skipped,
}

impl OperationStatus {
    /// Whether the step produced a usable artifact.
    pub fn completed(&self) -> bool {
        matches!(self, OperationStatus::Success | OperationStatus::Degraded)
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PrivacyOperation {
    #[serde(rename = "type")]
    pub kind: OperationKind,
    pub service: String,
    pub status: OperationStatus,
    pub metadata: Value,
    pub recorded_at: DateTime<Utc>,
}

impl PrivacyOperation {
    pub fn new(kind: OperationKind, service: &str, status: OperationStatus, metadata: Value) -> Self {
        Self {
            kind,
            service: service.to_string(),
            status,
            metadata,
            recorded_at: Utc::now(),
        }
    }
}
