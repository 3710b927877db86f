use crate::access::AccessControlService;
use crate::compression::CompressionService;
use crate::config::{Config, ProverMode};
use crate::orchestrator::PrivacyOrchestrator;
use crate::proof::{Groth16Prover, ProofService, ProverBackend};
use crate::registry::{StaticValidatorRegistry, ValidatorRegistry};
use crate::store::{RecordStore, SessionStore};
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub orchestrator: Arc<PrivacyOrchestrator>,
}

impl AppState {
    pub fn new(config: Config, orchestrator: PrivacyOrchestrator) -> Self {
        Self {
            config: Arc::new(config),
            orchestrator: Arc::new(orchestrator),
        }
    }

    /// Wire the services the way the binary runs them.
    ///
    /// Compression has no backend and runs in simulated mode.
    pub fn from_config(config: Config, sessions: Arc<dyn SessionStore>, records: Arc<dyn RecordStore>) -> Self {
        let prover: Option<Arc<dyn ProverBackend>> = match config.prover {
            ProverMode::Groth16 => Some(Arc::new(Groth16Prover::new(Some(config.keys_dir())))),
            ProverMode::Disabled => None,
        };
        let registry: Arc<dyn ValidatorRegistry> = Arc::new(StaticValidatorRegistry::new(config.validators.clone()));

        let orchestrator = PrivacyOrchestrator::new(
            ProofService::new(prover),
            CompressionService::new(None, config.max_compression_ratio),
            AccessControlService::new(sessions, registry, config.access_policy()),
            records,
        );

        Self::new(config, orchestrator)
    }
}
