//! Compact commitments to encrypted payloads.
//!
//! A commitment records how large the payload was, how large its compressed footprint is, and
//! binds both to a Merkle root and a deterministic account address through a Poseidon digest.

use crate::errors::{BackendError, PrivacyError, Result};
use crate::record::EncryptedPayload;
use async_trait::async_trait;
use base64::Engine;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;
use zk_proofs::digest::{digest_parts, fr_to_hex, merkle_root};

pub const DEFAULT_MAX_COMPRESSION_RATIO: u32 = 50;

/// Leaf size for the locally computed Merkle root.
const MERKLE_LEAF_SIZE: usize = 32;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompressionEstimate {
    pub original_size: u64,
    pub compressed_size: u64,
    pub savings: u64,
    pub ratio: u32,
}

/// Who produced the commitment.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum CommitmentSource {
    Backend { proof_b64: String },
    /// Computed locally; not anchored anywhere and not authoritative.
    Simulated { reason: String },
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompressedCommitment {
    pub record_id: Uuid,
    pub original_size: u64,
    pub compressed_size: u64,
    pub achieved_ratio: u32,
    pub merkle_root: String,
    pub account_address: String,
    /// Poseidon digest binding the root and account to both sizes.
    pub integrity_proof: String,
    pub source: CommitmentSource,
    pub created_at: DateTime<Utc>,
}

impl CompressedCommitment {
    pub fn is_simulated(&self) -> bool {
        matches!(self.source, CommitmentSource::Simulated { .. })
    }

    /// The non-authoritative marker carried by simulated commitments.
    pub fn error(&self) -> Option<&str> {
        match &self.source {
            CommitmentSource::Simulated { reason } => Some(reason),
            CommitmentSource::Backend { .. } => None,
        }
    }
}

#[derive(Clone, Debug)]
pub struct CompressionOptions {
    pub record_id: Uuid,
    pub ratio: u32,
}

#[derive(Clone, Debug)]
pub struct BackendCompression {
    pub account: String,
    pub proof: Vec<u8>,
    pub merkle_root: String,
}

/// External state-compression service.
#[async_trait]
pub trait CompressionBackend: Send + Sync {
    async fn compress(
        &self,
        payload: &EncryptedPayload,
        options: &CompressionOptions,
    ) -> std::result::Result<BackendCompression, BackendError>;
}

pub struct CompressionService {
    backend: Option<Arc<dyn CompressionBackend>>,
    max_ratio: u32,
}

impl CompressionService {
    pub fn new(backend: Option<Arc<dyn CompressionBackend>>, max_ratio: u32) -> Self {
        Self {
            backend,
            max_ratio: max_ratio.max(1),
        }
    }

    pub fn max_ratio(&self) -> u32 {
        self.max_ratio
    }

    fn effective_ratio(&self, ratio: u32) -> u32 {
        ratio.clamp(1, self.max_ratio)
    }

    /// Expected footprint of `size` bytes at `ratio`, clamped to `[1, max_ratio]`.
    pub fn estimate(&self, size: u64, ratio: u32) -> CompressionEstimate {
        let ratio = self.effective_ratio(ratio);
        let compressed_size = size.div_ceil(ratio as u64);
        CompressionEstimate {
            original_size: size,
            compressed_size,
            savings: size - compressed_size,
            ratio,
        }
    }

    pub async fn compress(
        &self,
        record_id: Uuid,
        payload: &EncryptedPayload,
        requested_ratio: u32,
    ) -> Result<CompressedCommitment> {
        if requested_ratio == 0 {
            return Err(PrivacyError::Validation("compression ratio must be at least 1".to_string()));
        }
        if payload.ciphertext.is_empty() {
            return Err(PrivacyError::Validation("cannot compress an empty payload".to_string()));
        }

        let estimate = self.estimate(payload.size(), requested_ratio);
        let achieved_ratio = estimate.ratio;
        let account_address = account_address(record_id, payload, achieved_ratio);

        let options = CompressionOptions { record_id, ratio: achieved_ratio };
        let (merkle_root, account_address, source) = match self.compress_with_backend(payload, &options).await {
            Ok(out) => {
                let proof_b64 = base64::engine::general_purpose::STANDARD.encode(&out.proof);
                (out.merkle_root, out.account, CommitmentSource::Backend { proof_b64 })
            }
            Err(e) => {
                tracing::warn!(%record_id, error = %e, "compression backend unavailable, using simulated commitment");
                let ciphertext = payload.ciphertext.clone();
                let root = tokio::task::spawn_blocking(move || merkle_root(&ciphertext, MERKLE_LEAF_SIZE))
                    .await
                    .map_err(|e| {
                        tracing::error!(error = %e, "merkle root task failed");
                        PrivacyError::Internal
                    })?;
                let reason = format!("simulated commitment, not authoritative: {}", PrivacyError::from(e));
                (fr_to_hex(&root), account_address, CommitmentSource::Simulated { reason })
            }
        };

        let integrity_proof = integrity_digest(
            &merkle_root,
            &account_address,
            estimate.original_size,
            estimate.compressed_size,
            achieved_ratio,
        );

        tracing::info!(
            %record_id,
            original_size = estimate.original_size,
            compressed_size = estimate.compressed_size,
            achieved_ratio,
            "payload compressed"
        );

        Ok(CompressedCommitment {
            record_id,
            original_size: estimate.original_size,
            compressed_size: estimate.compressed_size,
            achieved_ratio,
            merkle_root,
            account_address,
            integrity_proof,
            source,
            created_at: Utc::now(),
        })
    }

    async fn compress_with_backend(
        &self,
        payload: &EncryptedPayload,
        options: &CompressionOptions,
    ) -> std::result::Result<BackendCompression, BackendError> {
        let backend = self.backend.as_ref().ok_or(BackendError::NotConfigured)?;
        backend.compress(payload, options).await
    }

    /// Recompute the expected size and integrity digest of a commitment.
    pub fn verify(&self, commitment: &CompressedCommitment) -> bool {
        let ratio = commitment.achieved_ratio;
        if ratio < 1 || ratio > self.max_ratio {
            return false;
        }

        let expected = commitment.original_size.div_ceil(ratio as u64);
        if commitment.compressed_size != expected || commitment.compressed_size > commitment.original_size {
            return false;
        }

        let digest = integrity_digest(
            &commitment.merkle_root,
            &commitment.account_address,
            commitment.original_size,
            commitment.compressed_size,
            ratio,
        );
        digest == commitment.integrity_proof
    }
}

/// Deterministic address derived from payload metadata only.
fn account_address(record_id: Uuid, payload: &EncryptedPayload, ratio: u32) -> String {
    let content_id = payload.content_id.as_deref().unwrap_or_default();
    let digest = digest_parts(&[
        record_id.as_bytes(),
        content_id.as_bytes(),
        payload.metadata_hash.as_bytes(),
        &payload.size().to_le_bytes(),
        &ratio.to_le_bytes(),
    ]);
    fr_to_hex(&digest)
}

fn integrity_digest(root: &str, account: &str, original_size: u64, compressed_size: u64, ratio: u32) -> String {
    let digest = digest_parts(&[
        root.as_bytes(),
        account.as_bytes(),
        &original_size.to_le_bytes(),
        &compressed_size.to_le_bytes(),
        &ratio.to_le_bytes(),
    ]);
    fr_to_hex(&digest)
}
