//! Records, votes and sessions survive a restart on the SQLite stores.

mod common;

use common::*;
use privacy_backend::db::{self, Db, SqliteRecordStore, SqliteSessionStore};
use privacy_backend::identity::RequesterId;
use privacy_backend::orchestrator::{PrivacyOrchestrator, SubmissionOptions, ValidationInputs, ValidationStatus, Vote};
use privacy_backend::record::ProofParameters;
use privacy_backend::session::SessionStatus;
use std::path::Path;
use std::sync::Arc;

async fn open(path: &Path) -> (Db, PrivacyOrchestrator) {
    let db = db::connect(&format!("sqlite://{}?mode=rwc", path.display()), 1).await.unwrap();
    db::init_schema(&db).await.unwrap();
    let orchestrator = orchestrator_over(
        Arc::new(SqliteSessionStore::new(db.clone())),
        Arc::new(SqliteRecordStore::new(db.clone())),
    );
    (db, orchestrator)
}

#[tokio::test]
async fn record_ledger_survives_restart() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("ledger.db");

    let record = record();
    let record_id = record.id;
    let (db, orchestrator) = open(&path).await;

    orchestrator.submit_with_privacy(record.clone(), SubmissionOptions::default()).await.unwrap();
    for validator in validators(5) {
        let inputs = ValidationInputs {
            vote: Vote::Approve,
            facts: facts(),
            proof_params: ProofParameters::default(),
            compression_ratio: 10,
        };
        orchestrator.validate_with_privacy(&validator, record_id, inputs).await.unwrap();
    }

    let stats = orchestrator.record_stats(record_id).await.unwrap();
    let research = orchestrator
        .request_research_access(&RequesterId::new("researcher-7"), record_id, JUSTIFICATION, &stats, None)
        .await
        .unwrap();
    let session = research.session;
    for member in &session.committee {
        orchestrator.access().approve(session.id, &member.validator, "share").await.unwrap();
    }
    assert_eq!(orchestrator.privacy_score(record_id).await.unwrap().score, 100);
    let before = orchestrator.record_state(record_id).await.unwrap();

    drop(orchestrator);
    db.close().await;

    let (_db, reopened) = open(&path).await;
    let after = reopened.record_state(record_id).await.unwrap();
    assert_eq!(after.version, before.version);
    assert_eq!(after.version, 5);
    assert_eq!(after.tally, before.tally);
    assert_eq!(after.tally.status, ValidationStatus::Approved);
    assert_eq!(after.votes, before.votes);
    assert_eq!(after.operations.len(), before.operations.len());
    assert_eq!(after.record.commitment, before.record.commitment);

    assert_eq!(reopened.record_stats(record_id).await.unwrap().proofs_on_file, stats.proofs_on_file);
    assert_eq!(reopened.access().get_session(session.id).await.unwrap().status, SessionStatus::Approved);
    assert_eq!(reopened.privacy_score(record_id).await.unwrap().score, 100);

    let err = reopened.submit_with_privacy(record, SubmissionOptions::default()).await.unwrap_err();
    assert!(matches!(err, privacy_backend::errors::PrivacyError::Validation(_)));
}
