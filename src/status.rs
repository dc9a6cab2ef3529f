//! Lifecycle state machine driven by signature events.
//!
//! The transition function is pure and independent of the rule table: it
//! maps (current status, signature event, manifest snapshot) to the next
//! status. Guards are evaluated in order, first match wins; no match means
//! the signature event is invalid for the current status.
use crate::error::WorkflowError;
use crate::manifest::{AcceptanceStatus, Manifest, ManifestType, OperationCode};
use crate::signature::SignatureStage;

#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, Copy, Eq, PartialEq)]
pub enum ManifestStatus {
    #[n(0)]
    Initial,
    #[n(1)]
    SignedByProducer,
    #[n(2)]
    SignedByWorker,
    #[n(3)]
    Sent,
    #[n(4)]
    Processed,
    /// Waste is parked under a partial operation code, awaiting a child
    /// manifest to move it on.
    #[n(5)]
    AwaitingChild,
    #[n(6)]
    Refused,
    /// Reached only through an accepted cancellation revision, never
    /// through a signature event.
    #[n(7)]
    Canceled,
}

impl ManifestStatus {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            ManifestStatus::Processed
                | ManifestStatus::AwaitingChild
                | ManifestStatus::Refused
                | ManifestStatus::Canceled
        )
    }
}

pub struct SignatureEvent<'a> {
    pub stage: SignatureStage,
    pub manifest: &'a Manifest,
}

/// Compute the status a signature event moves the manifest into.
pub fn transition(
    status: ManifestStatus,
    event: SignatureEvent<'_>,
) -> Result<ManifestStatus, WorkflowError> {
    use ManifestStatus::*;
    use SignatureStage::*;

    let m = event.manifest;
    let next = match (status, event.stage) {
        (Initial, Emission) => SignedByProducer,
        // the declarant either is a private individual or paper-signed the
        // form, so emission never happens electronically
        (Initial, Work) if m.emitter_is_private_individual || m.emitter_paper_signature => {
            SignedByWorker
        }
        (Initial, Operation) if matches!(m.manifest_type, ManifestType::OnSiteCollection) => {
            match m.destination_operation_code {
                Some(code) if code.is_partial() => AwaitingChild,
                Some(_) => Processed,
                None => {
                    return Err(WorkflowError::InvalidTransition {
                        status,
                        stage: event.stage,
                    });
                }
            }
        }
        (SignedByProducer, Work) => SignedByWorker,
        (SignedByProducer, Transport)
            if matches!(
                m.manifest_type,
                ManifestType::Grouping | ManifestType::Reshipment
            ) =>
        {
            Sent
        }
        (SignedByWorker, Transport) => Sent,
        (Sent, Operation) => {
            if m.destination_acceptance_status == Some(AcceptanceStatus::Refused) {
                Refused
            } else if partial_continuation(m) {
                AwaitingChild
            } else {
                Processed
            }
        }
        _ => {
            return Err(WorkflowError::InvalidTransition {
                status,
                stage: event.stage,
            });
        }
    };

    tracing::debug!(manifest = %m.id, ?status, stage = ?event.stage, ?next, "status transition");
    Ok(next)
}

fn partial_continuation(m: &Manifest) -> bool {
    matches!(
        m.manifest_type,
        ManifestType::Grouping | ManifestType::Reshipment
    ) && m
        .destination_operation_code
        .is_some_and(OperationCode::is_partial)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn manifest(manifest_type: ManifestType) -> Manifest {
        Manifest::new("manifest_status".into(), manifest_type)
    }

    #[test]
    fn standard_flow_reaches_processed() {
        let mut m = manifest(ManifestType::StandardCollection);

        let status = transition(
            ManifestStatus::Initial,
            SignatureEvent { stage: SignatureStage::Emission, manifest: &m },
        )
        .unwrap();
        assert_eq!(status, ManifestStatus::SignedByProducer);

        let status = transition(
            status,
            SignatureEvent { stage: SignatureStage::Work, manifest: &m },
        )
        .unwrap();
        assert_eq!(status, ManifestStatus::SignedByWorker);

        let status = transition(
            status,
            SignatureEvent { stage: SignatureStage::Transport, manifest: &m },
        )
        .unwrap();
        assert_eq!(status, ManifestStatus::Sent);

        m.destination_operation_code = Some(OperationCode::R5);
        m.destination_acceptance_status = Some(AcceptanceStatus::Accepted);
        let status = transition(
            status,
            SignatureEvent { stage: SignatureStage::Operation, manifest: &m },
        )
        .unwrap();
        assert_eq!(status, ManifestStatus::Processed);
    }

    #[test]
    fn work_from_initial_needs_paper_or_private_individual() {
        let mut m = manifest(ManifestType::StandardCollection);

        let event = SignatureEvent { stage: SignatureStage::Work, manifest: &m };
        assert!(transition(ManifestStatus::Initial, event).is_err());

        m.emitter_paper_signature = true;
        let event = SignatureEvent { stage: SignatureStage::Work, manifest: &m };
        assert_eq!(
            transition(ManifestStatus::Initial, event).unwrap(),
            ManifestStatus::SignedByWorker
        );
    }

    #[test]
    fn grouping_skips_work_stage() {
        let m = manifest(ManifestType::Grouping);

        let status = transition(
            ManifestStatus::SignedByProducer,
            SignatureEvent { stage: SignatureStage::Transport, manifest: &m },
        )
        .unwrap();
        assert_eq!(status, ManifestStatus::Sent);
    }

    #[test]
    fn standard_collection_cannot_skip_work() {
        let m = manifest(ManifestType::StandardCollection);
        let event = SignatureEvent { stage: SignatureStage::Transport, manifest: &m };
        assert!(transition(ManifestStatus::SignedByProducer, event).is_err());
    }

    #[test]
    fn on_site_collection_processes_from_initial() {
        let mut m = manifest(ManifestType::OnSiteCollection);
        m.destination_operation_code = Some(OperationCode::R5);

        let status = transition(
            ManifestStatus::Initial,
            SignatureEvent { stage: SignatureStage::Operation, manifest: &m },
        )
        .unwrap();
        assert_eq!(status, ManifestStatus::Processed);

        m.destination_operation_code = Some(OperationCode::D15);
        let status = transition(
            ManifestStatus::Initial,
            SignatureEvent { stage: SignatureStage::Operation, manifest: &m },
        )
        .unwrap();
        assert_eq!(status, ManifestStatus::AwaitingChild);
    }

    #[test]
    fn refused_reception_refuses_the_manifest() {
        let mut m = manifest(ManifestType::StandardCollection);
        m.destination_acceptance_status = Some(AcceptanceStatus::Refused);
        m.destination_operation_code = Some(OperationCode::D9);

        let status = transition(
            ManifestStatus::Sent,
            SignatureEvent { stage: SignatureStage::Operation, manifest: &m },
        )
        .unwrap();
        assert_eq!(status, ManifestStatus::Refused);
    }

    #[test]
    fn partial_code_on_grouping_awaits_child() {
        let mut m = manifest(ManifestType::Grouping);
        m.destination_acceptance_status = Some(AcceptanceStatus::Accepted);
        m.destination_operation_code = Some(OperationCode::R13);

        let status = transition(
            ManifestStatus::Sent,
            SignatureEvent { stage: SignatureStage::Operation, manifest: &m },
        )
        .unwrap();
        assert_eq!(status, ManifestStatus::AwaitingChild);

        m.destination_operation_code = Some(OperationCode::R5);
        let status = transition(
            ManifestStatus::Sent,
            SignatureEvent { stage: SignatureStage::Operation, manifest: &m },
        )
        .unwrap();
        assert_eq!(status, ManifestStatus::Processed);
    }
}
