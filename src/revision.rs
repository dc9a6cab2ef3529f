//! Revision workflow: post-seal amendments under multi-party consensus.
//!
//! Once a manifest has advanced past direct editing, a concerned party may
//! propose a field-level patch (or a cancellation). Every other concerned
//! party holds one approval; the request settles `Accepted` only when all
//! of them accept, and settles `Refused` the moment any one refuses.
use crate::error::WorkflowError;
use crate::manifest::{Manifest, OperationCode, Packaging, TimeStamp};
use crate::status::ManifestStatus;
use chrono::Utc;

#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, Copy, Eq, PartialEq)]
pub enum RevisionStatus {
    #[n(0)]
    Pending,
    #[n(1)]
    Accepted,
    #[n(2)]
    Refused,
}

#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, Copy, Eq, PartialEq)]
pub enum ApprovalStatus {
    #[n(0)]
    Pending,
    #[n(1)]
    Accepted,
    #[n(2)]
    Refused,
    #[n(3)]
    Canceled,
}

#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum ApprovalDecision {
    Accepted,
    Refused,
}

/// One concerned party's pending or settled vote on a revision.
#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, PartialEq)]
pub struct Approval {
    #[n(0)]
    pub approver_siret: String,
    #[n(1)]
    pub status: ApprovalStatus,
    #[n(2)]
    pub comment: Option<String>,
}

/// The amendable subset of manifest fields. Revisions amend facts, never
/// signatures or status.
#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, Default, PartialEq)]
pub struct RevisionPatch {
    #[n(0)]
    pub waste_code: Option<String>,
    #[n(1)]
    pub waste_description: Option<String>,
    #[n(2)]
    pub packagings: Option<Vec<Packaging>>,
    #[n(3)]
    pub emitter_pickup_address: Option<String>,
    #[n(4)]
    pub destination_cap: Option<String>,
    #[n(5)]
    pub destination_operation_code: Option<OperationCode>,
    #[n(6)]
    pub destination_reception_weight: Option<u64>,
    #[n(7)]
    pub broker_company_name: Option<String>,
    #[n(8)]
    pub broker_company_siret: Option<String>,
}

impl RevisionPatch {
    pub fn is_empty(&self) -> bool {
        self == &RevisionPatch::default()
    }

    /// Write the present keys onto the manifest, leaving the rest alone.
    pub fn apply_to(&self, manifest: &mut Manifest) {
        if let Some(v) = &self.waste_code {
            manifest.waste_code = Some(v.clone());
        }
        if let Some(v) = &self.waste_description {
            manifest.waste_description = Some(v.clone());
        }
        if let Some(v) = &self.packagings {
            manifest.packagings = v.clone();
        }
        if let Some(v) = &self.emitter_pickup_address {
            manifest.emitter_pickup_address = Some(v.clone());
        }
        if let Some(v) = &self.destination_cap {
            manifest.destination_cap = Some(v.clone());
        }
        if let Some(v) = self.destination_operation_code {
            manifest.destination_operation_code = Some(v);
        }
        if let Some(v) = self.destination_reception_weight {
            manifest.destination_reception_weight = Some(v);
        }
        if let Some(v) = &self.broker_company_name {
            manifest.broker_company_name = Some(v.clone());
        }
        if let Some(v) = &self.broker_company_siret {
            manifest.broker_company_siret = Some(v.clone());
        }
    }
}

/// Outcome of resolving one approval.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum RevisionOutcome {
    StillPending,
    Accepted,
    Refused,
}

#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, PartialEq)]
pub struct RevisionRequest {
    #[n(0)]
    pub id: String,
    #[n(1)]
    pub manifest_id: String,
    #[n(2)]
    pub author_siret: String,
    #[n(3)]
    pub comment: String,
    #[n(4)]
    pub is_cancellation: bool,
    #[n(5)]
    pub patch: RevisionPatch,
    /// sha256 of the CBOR-encoded patch, recorded for audit.
    #[n(6)]
    pub patch_hash: String,
    #[n(7)]
    pub status: RevisionStatus,
    #[n(8)]
    pub approvals: Vec<Approval>,
    #[n(9)]
    pub created_at: TimeStamp<Utc>,
}

/// The parties whose agreement a revision needs: emitter, destination and
/// worker, wherever those blocks carry a SIRET.
pub fn concerned_parties(manifest: &Manifest) -> Vec<String> {
    let mut parties = Vec::new();
    for siret in [
        manifest.emitter_company_siret.as_ref(),
        manifest.destination_company_siret.as_ref(),
        manifest.worker_company_siret.as_ref(),
    ]
    .into_iter()
    .flatten()
    {
        if !parties.contains(siret) {
            parties.push(siret.clone());
        }
    }
    parties
}

impl RevisionRequest {
    /// Propose an amendment (or a cancellation) against a sealed manifest.
    pub fn propose(
        id: String,
        manifest: &Manifest,
        author_siret: &str,
        patch: RevisionPatch,
        is_cancellation: bool,
        comment: String,
    ) -> Result<Self, WorkflowError> {
        if manifest.is_deleted {
            return Err(WorkflowError::RevisionConflict(
                "cannot revise a deleted manifest".into(),
            ));
        }
        match manifest.status {
            ManifestStatus::Initial => {
                return Err(WorkflowError::RevisionConflict(
                    "manifest is still editable directly, no revision needed".into(),
                ));
            }
            ManifestStatus::Refused | ManifestStatus::Canceled => {
                return Err(WorkflowError::RevisionConflict(format!(
                    "cannot revise a manifest in status {:?}",
                    manifest.status
                )));
            }
            _ => {}
        }
        if patch.is_empty() && !is_cancellation {
            return Err(WorkflowError::RevisionConflict(
                "revision carries no change".into(),
            ));
        }
        if is_cancellation && !patch.is_empty() {
            return Err(WorkflowError::RevisionConflict(
                "a cancellation request cannot also amend fields".into(),
            ));
        }
        if is_cancellation
            && (manifest.operation_signature.is_some()
                || manifest.destination_reception_date.is_some())
        {
            return Err(WorkflowError::RevisionConflict(
                "waste was received at the final destination, cancellation is no longer possible"
                    .into(),
            ));
        }

        let parties = concerned_parties(manifest);
        if !parties.iter().any(|siret| siret.as_str() == author_siret) {
            return Err(WorkflowError::Unauthorized);
        }
        let approvals: Vec<Approval> = parties
            .into_iter()
            .filter(|siret| siret.as_str() != author_siret)
            .map(|approver_siret| Approval {
                approver_siret,
                status: ApprovalStatus::Pending,
                comment: None,
            })
            .collect();
        if approvals.is_empty() {
            return Err(WorkflowError::RevisionConflict(
                "manifest has no other concerned party to approve the revision".into(),
            ));
        }

        let patch_hash = sha256::digest(minicbor::to_vec(&patch).unwrap_or_default());
        tracing::debug!(manifest = %manifest.id, revision = %id, approvers = approvals.len(), "revision proposed");

        Ok(Self {
            id,
            manifest_id: manifest.id.clone(),
            author_siret: author_siret.to_string(),
            comment,
            is_cancellation,
            patch,
            patch_hash,
            status: RevisionStatus::Pending,
            approvals,
            created_at: TimeStamp::new(),
        })
    }

    /// Settle one party's approval. A refusal settles the whole request and
    /// cascades every remaining pending approval to `Canceled`; the last
    /// acceptance settles the request `Accepted`.
    pub fn resolve_approval(
        &mut self,
        approver_siret: &str,
        decision: ApprovalDecision,
        comment: Option<String>,
    ) -> Result<RevisionOutcome, WorkflowError> {
        if self.status != RevisionStatus::Pending {
            return Err(WorkflowError::RevisionConflict(format!(
                "revision {} is already settled as {:?}",
                self.id, self.status
            )));
        }

        let approval = self
            .approvals
            .iter_mut()
            .find(|a| a.approver_siret == approver_siret)
            .ok_or(WorkflowError::Unauthorized)?;
        if approval.status != ApprovalStatus::Pending {
            return Err(WorkflowError::RevisionConflict(format!(
                "approval of {approver_siret} is already settled"
            )));
        }

        match decision {
            ApprovalDecision::Refused => {
                approval.status = ApprovalStatus::Refused;
                approval.comment = comment;
                for other in &mut self.approvals {
                    if other.status == ApprovalStatus::Pending {
                        other.status = ApprovalStatus::Canceled;
                    }
                }
                self.status = RevisionStatus::Refused;
                tracing::debug!(revision = %self.id, refused_by = approver_siret, "revision refused");
                Ok(RevisionOutcome::Refused)
            }
            ApprovalDecision::Accepted => {
                approval.status = ApprovalStatus::Accepted;
                approval.comment = comment;
                let remaining = self
                    .approvals
                    .iter()
                    .filter(|a| a.status == ApprovalStatus::Pending)
                    .count();
                if remaining == 0 {
                    self.status = RevisionStatus::Accepted;
                    tracing::debug!(revision = %self.id, "revision accepted by all parties");
                    Ok(RevisionOutcome::Accepted)
                } else {
                    Ok(RevisionOutcome::StillPending)
                }
            }
        }
    }

    /// Apply an accepted revision onto its manifest: either the field
    /// patch, or the cancellation.
    pub fn apply_to(&self, manifest: &mut Manifest) {
        if self.is_cancellation {
            manifest.status = ManifestStatus::Canceled;
        } else {
            self.patch.apply_to(manifest);
        }
    }

    pub fn serialize_with_hash(&self) -> anyhow::Result<(String, Vec<u8>)> {
        let cbor = minicbor::to_vec(self)?;
        let hash = sha256::digest(&cbor);

        Ok((hash, cbor))
    }
}
