//! Service layer API for manifest workflow operations
use crate::error::WorkflowError;
use crate::manifest::{Manifest, ManifestPatch, ManifestType};
use crate::registry::CompanyRegistry;
use crate::revision::{ApprovalDecision, RevisionOutcome, RevisionPatch, RevisionRequest, RevisionStatus};
use crate::rules::{self, FieldId, Role};
use crate::signature::{self, Signature, SignatureStage};
use crate::status::{self, ManifestStatus, SignatureEvent};
use crate::utils;
use crate::validation::{self, ValidationContext};
use sled::Batch;
use std::collections::BTreeSet;
use std::sync::Arc;

pub struct ManifestService {
    instance: Arc<sled::Db>,
    registry: Arc<dyn CompanyRegistry + Send + Sync>,
}

// every mutation reloads the persisted snapshot, validates against it and
// saves through compare_and_swap on the exact bytes read, so a concurrent
// writer surfaces as a conflict instead of a silent lost update
impl ManifestService {
    pub fn new(
        instance: Arc<sled::Db>,
        registry: Arc<dyn CompanyRegistry + Send + Sync>,
    ) -> Self {
        Self { instance, registry }
    }

    fn pending_marker_key(manifest_id: &str) -> String {
        format!("pending_revision/{manifest_id}")
    }

    fn load_manifest_raw(&self, manifest_id: &str) -> anyhow::Result<(Manifest, sled::IVec)> {
        let bytes = self
            .instance
            .get(manifest_id.as_bytes())?
            .ok_or_else(|| WorkflowError::NotFound(manifest_id.to_string()))?;
        let manifest: Manifest = minicbor::decode(&bytes)?;
        Ok((manifest, bytes))
    }

    fn load_revision_raw(&self, revision_id: &str) -> anyhow::Result<(RevisionRequest, sled::IVec)> {
        let bytes = self
            .instance
            .get(revision_id.as_bytes())?
            .ok_or_else(|| WorkflowError::NotFound(revision_id.to_string()))?;
        let request: RevisionRequest = minicbor::decode(&bytes)?;
        Ok((request, bytes))
    }

    fn save_manifest_cas(&self, manifest: &Manifest, old_bytes: &sled::IVec) -> anyhow::Result<()> {
        let new_bytes = minicbor::to_vec(manifest)?;
        self.instance
            .compare_and_swap(
                manifest.id.as_bytes(),
                Some(old_bytes.as_ref()),
                Some(new_bytes),
            )?
            .map_err(|_| WorkflowError::ConcurrentUpdate(manifest.id.clone()))?;
        Ok(())
    }

    pub fn manifest(&self, manifest_id: &str) -> anyhow::Result<Manifest> {
        Ok(self.load_manifest_raw(manifest_id)?.0)
    }

    pub fn revision(&self, revision_id: &str) -> anyhow::Result<RevisionRequest> {
        Ok(self.load_revision_raw(revision_id)?.0)
    }

    pub fn pending_revision(&self, manifest_id: &str) -> anyhow::Result<Option<RevisionRequest>> {
        let marker = self
            .instance
            .get(Self::pending_marker_key(manifest_id).as_bytes())?;
        match marker {
            Some(id_bytes) => {
                let revision_id = String::from_utf8(id_bytes.to_vec())?;
                Ok(Some(self.revision(&revision_id)?))
            }
            None => Ok(None),
        }
    }

    /// The fields the caller may no longer edit, for form rendering.
    pub fn sealed_fields(&self, manifest_id: &str, caller: Role) -> anyhow::Result<BTreeSet<FieldId>> {
        let (manifest, _) = self.load_manifest_raw(manifest_id)?;
        let stages = signature::stages_to_check(&manifest, None);
        Ok(rules::sealed_fields(&manifest, caller, &stages))
    }

    /// Validate and persist a new draft manifest.
    pub fn create_manifest(
        &self,
        manifest_type: ManifestType,
        patch: ManifestPatch,
        caller: Role,
    ) -> anyhow::Result<Manifest> {
        let id = utils::new_uuid_to_bech32("manifest_")?;
        let base = Manifest::new(id, manifest_type);

        let ctx = ValidationContext {
            target_stage: None,
            caller,
            registry: self.registry.as_ref(),
        };
        let manifest =
            validation::validate(&base, &patch, &ctx).map_err(WorkflowError::Validation)?;

        self.instance
            .insert(manifest.id.as_bytes(), minicbor::to_vec(&manifest)?)?;
        tracing::debug!(manifest = %manifest.id, ?manifest_type, "manifest created");

        Ok(manifest)
    }

    /// Validate a partial update against the persisted snapshot and save it.
    pub fn update_manifest(
        &self,
        manifest_id: &str,
        patch: ManifestPatch,
        caller: Role,
    ) -> anyhow::Result<Manifest> {
        let (current, old_bytes) = self.load_manifest_raw(manifest_id)?;

        let ctx = ValidationContext {
            target_stage: None,
            caller,
            registry: self.registry.as_ref(),
        };
        let manifest =
            validation::validate(&current, &patch, &ctx).map_err(WorkflowError::Validation)?;

        self.save_manifest_cas(&manifest, &old_bytes)?;
        Ok(manifest)
    }

    /// Apply a signature: authorize, validate at the target stage, fill the
    /// slot, move the status and persist.
    pub fn sign_manifest(
        &self,
        manifest_id: &str,
        stage: SignatureStage,
        author: String,
        caller: Role,
    ) -> anyhow::Result<Manifest> {
        // authorization comes before any validation work
        if signing_role(stage) != caller {
            return Err(WorkflowError::Unauthorized.into());
        }

        let (current, old_bytes) = self.load_manifest_raw(manifest_id)?;
        if current.signature(stage).is_some() {
            return Err(WorkflowError::AlreadySigned { stage }.into());
        }

        let ctx = ValidationContext {
            target_stage: Some(stage),
            caller,
            registry: self.registry.as_ref(),
        };
        let mut manifest = validation::validate(&current, &ManifestPatch::default(), &ctx)
            .map_err(WorkflowError::Validation)?;

        let next_status = status::transition(
            manifest.status,
            SignatureEvent {
                stage,
                manifest: &manifest,
            },
        )?;

        manifest.set_signature(stage, Signature::new(author));
        manifest.status = next_status;
        if next_status == ManifestStatus::Refused {
            // a refusal severs the forwarding link and detaches everything
            // grouped into this manifest
            manifest.forwarded_id = None;
            manifest.grouped_ids.clear();
        }

        self.save_manifest_cas(&manifest, &old_bytes)?;
        tracing::debug!(manifest = %manifest.id, ?stage, status = ?manifest.status, "manifest signed");

        Ok(manifest)
    }

    /// Open a revision request against a sealed manifest. The pending
    /// marker key is claimed atomically, so at most one request can be
    /// outstanding per manifest.
    pub fn propose_revision(
        &self,
        manifest_id: &str,
        author_siret: &str,
        patch: RevisionPatch,
        is_cancellation: bool,
        comment: String,
    ) -> anyhow::Result<RevisionRequest> {
        let (manifest, _) = self.load_manifest_raw(manifest_id)?;

        let id = utils::new_uuid_to_bech32("revision_")?;
        let request = RevisionRequest::propose(
            id,
            &manifest,
            author_siret,
            patch,
            is_cancellation,
            comment,
        )?;

        let marker_key = Self::pending_marker_key(manifest_id);
        self.instance
            .compare_and_swap(
                marker_key.as_bytes(),
                None as Option<&[u8]>,
                Some(request.id.as_bytes()),
            )?
            .map_err(|_| {
                WorkflowError::RevisionConflict(format!(
                    "a revision is already pending for manifest {manifest_id}"
                ))
            })?;

        self.instance
            .insert(request.id.as_bytes(), minicbor::to_vec(&request)?)?;

        Ok(request)
    }

    /// Settle one approval. The compare-and-swap on the request record is
    /// the atomic decrement-and-check: two concurrent closing approvals
    /// cannot both believe they settled the request.
    pub fn resolve_approval(
        &self,
        revision_id: &str,
        approver_siret: &str,
        decision: ApprovalDecision,
        comment: Option<String>,
    ) -> anyhow::Result<RevisionRequest> {
        let (mut request, old_bytes) = self.load_revision_raw(revision_id)?;
        let outcome = request.resolve_approval(approver_siret, decision, comment)?;

        self.instance
            .compare_and_swap(
                request.id.as_bytes(),
                Some(old_bytes.as_ref()),
                Some(minicbor::to_vec(&request)?),
            )?
            .map_err(|_| WorkflowError::ConcurrentUpdate(request.id.clone()))?;

        match outcome {
            RevisionOutcome::StillPending => {}
            RevisionOutcome::Accepted => {
                let (mut manifest, manifest_bytes) = self.load_manifest_raw(&request.manifest_id)?;
                request.apply_to(&mut manifest);
                self.save_manifest_cas(&manifest, &manifest_bytes)?;
                self.instance
                    .remove(Self::pending_marker_key(&request.manifest_id).as_bytes())?;
            }
            RevisionOutcome::Refused => {
                self.instance
                    .remove(Self::pending_marker_key(&request.manifest_id).as_bytes())?;
            }
        }

        Ok(request)
    }

    /// Withdraw a still-pending revision request. Removes the request and
    /// its approvals with no effect on the manifest.
    pub fn cancel_revision(&self, revision_id: &str) -> anyhow::Result<()> {
        let (request, _) = self.load_revision_raw(revision_id)?;
        if request.status != RevisionStatus::Pending {
            return Err(WorkflowError::RevisionConflict(format!(
                "revision {} is already settled as {:?}",
                request.id, request.status
            ))
            .into());
        }

        let mut batch = Batch::default();
        batch.remove(request.id.as_bytes());
        batch.remove(Self::pending_marker_key(&request.manifest_id).as_bytes());
        self.instance.apply_batch(batch)?;

        Ok(())
    }
}

/// Which caller role applies each signature stage.
fn signing_role(stage: SignatureStage) -> Role {
    match stage {
        SignatureStage::Emission => Role::Emitter,
        SignatureStage::Work => Role::Worker,
        SignatureStage::Transport => Role::Transporter,
        SignatureStage::Operation => Role::Destination,
    }
}
