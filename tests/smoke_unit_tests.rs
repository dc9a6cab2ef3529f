//! Smoke screen unit tests for the manifest workflow components
//!
//! These tests span the codebase in isolation from integration scenarios
//! and generally cover the happy path plus the documented edge cases.

use waste_manifest::diff;
use waste_manifest::error::Issue;
use waste_manifest::manifest::{
    AcceptanceStatus, Manifest, ManifestPatch, ManifestType, OperationCode,
};
use waste_manifest::registry::{CompanyInfo, CompanyProfile, StaticRegistry};
use waste_manifest::rules::{FieldId, Role};
use waste_manifest::signature::{self, Signature, SignatureStage};
use waste_manifest::status::{self, ManifestStatus, SignatureEvent};
use waste_manifest::utils::{is_valid_siret, new_uuid_to_bech32};
use waste_manifest::validation::{self, ValidationContext};

// UTILS MODULE TESTS
#[cfg(test)]
mod utils_tests {
    use super::*;

    /// Minted ids are bech32 strings carrying the requested prefix
    #[test]
    fn generates_valid_bech32_with_hrp() {
        let result = new_uuid_to_bech32("manifest_");
        assert!(result.is_ok());

        let encoded = result.unwrap();
        assert!(encoded.starts_with("manifest_1"));
        assert!(encoded.len() > 10); // UUID should produce substantial output
    }

    #[test]
    fn handles_empty_hrp() {
        // Empty string should fail
        let result = new_uuid_to_bech32("");
        assert!(result.is_err());
    }

    #[test]
    fn generates_unique_ids() {
        let id1 = new_uuid_to_bech32("manifest_").unwrap();
        let id2 = new_uuid_to_bech32("manifest_").unwrap();
        let id3 = new_uuid_to_bech32("revision_").unwrap();

        assert_ne!(id1, id2);
        assert_ne!(id2, id3);
        assert_ne!(id1, id3);
    }

    #[test]
    fn siret_format_check() {
        assert!(is_valid_siret("11111111111111"));
        assert!(!is_valid_siret("1111111111111")); // 13 digits
        assert!(!is_valid_siret("1111111111111a"));
        assert!(!is_valid_siret(""));
    }
}

// SIGNATURE LEDGER TESTS
#[cfg(test)]
mod ledger_tests {
    use super::*;

    /// A transport signature while emission and work are empty closes both
    /// earlier stages retroactively
    #[test]
    fn transport_signature_closes_skipped_stages() {
        let mut m = Manifest::new("manifest_ledger".into(), ManifestType::Grouping);
        m.set_signature(SignatureStage::Transport, Signature::new("A. Driver".into()));

        assert!(!m.is_awaiting(SignatureStage::Emission));
        assert!(!m.is_awaiting(SignatureStage::Work));
        assert!(!m.is_awaiting(SignatureStage::Transport));
        assert!(m.is_awaiting(SignatureStage::Operation));
    }

    #[test]
    fn untouched_manifest_awaits_every_stage() {
        let m = Manifest::new("manifest_ledger".into(), ManifestType::StandardCollection);
        for stage in SignatureStage::ALL {
            assert!(m.is_awaiting(stage));
        }
    }

    #[test]
    fn ancestors_cover_the_whole_hierarchy_from_operation() {
        assert_eq!(SignatureStage::Operation.ancestors().len(), 4);
        assert_eq!(
            *SignatureStage::Operation.ancestors().last().unwrap(),
            SignatureStage::Emission
        );
    }
}

// DIFF ENGINE TESTS
#[cfg(test)]
mod diff_tests {
    use super::*;

    fn manifest_with_emitter() -> Manifest {
        let mut m = Manifest::new("manifest_diff".into(), ManifestType::StandardCollection);
        m.emitter_company_name = Some("Demolition SA".into());
        m.waste_code = Some("17 06 05*".into());
        m
    }

    /// Submitting the exact current values yields an empty set
    #[test]
    fn identical_submission_is_empty() {
        let m = manifest_with_emitter();
        let patch = ManifestPatch {
            emitter_company_name: m.emitter_company_name.clone(),
            waste_code: m.waste_code.clone(),
            ..Default::default()
        };
        assert!(diff::updated_fields(&m, &patch).is_empty());
    }

    /// Changing exactly one field reports exactly that field
    #[test]
    fn single_change_is_minimal() {
        let m = manifest_with_emitter();
        let patch = ManifestPatch {
            emitter_company_name: m.emitter_company_name.clone(),
            waste_code: Some("17 05 04".into()),
            ..Default::default()
        };
        let updated = diff::updated_fields(&m, &patch);
        assert_eq!(updated.into_iter().collect::<Vec<_>>(), vec![FieldId::WasteCode]);
    }
}

// VALIDATION ENGINE TESTS
#[cfg(test)]
mod validation_tests {
    use super::*;

    fn registry() -> StaticRegistry {
        StaticRegistry::new().with_company(CompanyInfo {
            siret: "55555555555555".into(),
            name: "Toiture Pro".into(),
            profiles: vec![CompanyProfile::Worker],
            transport_receipt: None,
        })
    }

    /// Unchanged emitter name plus a new worker name passes with only the
    /// worker field counted as updated, even though emission is signed:
    /// worker identity stays editable until the work signature
    #[test]
    fn resubmitted_sealed_value_with_new_worker_name() {
        let mut m = Manifest::new("manifest_val".into(), ManifestType::StandardCollection);
        m.emitter_company_name = Some("Demolition SA".into());
        m.emitter_company_siret = Some("11111111111111".into());
        m.emitter_pickup_address = Some("4 rue des Carrieres, Lyon".into());
        m.worker_company_siret = Some("55555555555555".into());
        m.destination_company_name = Some("Recytech".into());
        m.destination_company_siret = Some("44444444444444".into());
        m.waste_code = Some("17 06 05*".into());
        m.waste_description = Some("asbestos roofing sheets".into());
        m.weight_kg = Some(1850);
        m.set_signature(SignatureStage::Emission, Signature::new("E. Producer".into()));

        let patch = ManifestPatch {
            emitter_company_name: Some("Demolition SA".into()),
            worker_company_name: Some("Toiture Pro".into()),
            ..Default::default()
        };

        assert_eq!(
            diff::updated_fields(&m, &patch).into_iter().collect::<Vec<_>>(),
            vec![FieldId::WorkerCompanyName]
        );

        let reg = registry();
        let ctx = ValidationContext {
            target_stage: None,
            caller: Role::Worker,
            registry: &reg,
        };
        let validated = validation::validate(&m, &patch, &ctx).unwrap();
        assert_eq!(validated.worker_company_name.as_deref(), Some("Toiture Pro"));
    }

    /// An on-site collection cannot declare a transporter
    #[test]
    fn on_site_collection_rejects_transporter() {
        let m = Manifest::new("manifest_val".into(), ManifestType::OnSiteCollection);
        let patch = ManifestPatch {
            transporter_company_siret: Some("33333333333333".into()),
            ..Default::default()
        };

        let reg = registry();
        let ctx = ValidationContext {
            target_stage: None,
            caller: Role::Emitter,
            registry: &reg,
        };
        let issues = validation::validate(&m, &patch, &ctx).unwrap_err();
        assert!(issues.iter().any(|i| matches!(
            i,
            Issue::StructuralInvariant { message, .. }
                if message.contains("cannot declare a transporter")
        )));
    }

    /// Grouping and reshipment links are mutually exclusive
    #[test]
    fn grouping_and_forwarding_links_conflict() {
        let mut m = Manifest::new("manifest_val".into(), ManifestType::Grouping);
        m.grouped_ids = vec!["manifest_a".into()];
        let patch = ManifestPatch {
            forwarded_id: Some("manifest_b".into()),
            ..Default::default()
        };

        let reg = registry();
        let ctx = ValidationContext {
            target_stage: None,
            caller: Role::Emitter,
            registry: &reg,
        };
        let issues = validation::validate(&m, &patch, &ctx).unwrap_err();
        assert!(issues.iter().any(|i| i.path() == "forwardedId"));
    }
}

// STATE MACHINE TESTS
#[cfg(test)]
mod status_tests {
    use super::*;

    /// A transport signature on a grouping manifest whose operation code is
    /// partial parks the manifest; a final code processes it
    #[test]
    fn grouping_operation_branches_on_code() {
        let mut m = Manifest::new("manifest_status".into(), ManifestType::Grouping);
        m.destination_acceptance_status = Some(AcceptanceStatus::Accepted);

        m.destination_operation_code = Some(OperationCode::D15);
        let next = status::transition(
            ManifestStatus::Sent,
            SignatureEvent { stage: SignatureStage::Operation, manifest: &m },
        )
        .unwrap();
        assert_eq!(next, ManifestStatus::AwaitingChild);

        m.destination_operation_code = Some(OperationCode::D5);
        let next = status::transition(
            ManifestStatus::Sent,
            SignatureEvent { stage: SignatureStage::Operation, manifest: &m },
        )
        .unwrap();
        assert_eq!(next, ManifestStatus::Processed);
    }

    /// No guard match means the signature event is invalid
    #[test]
    fn unmatched_event_is_an_invalid_transition() {
        let m = Manifest::new("manifest_status".into(), ManifestType::StandardCollection);
        let result = status::transition(
            ManifestStatus::Processed,
            SignatureEvent { stage: SignatureStage::Emission, manifest: &m },
        );
        assert!(result.is_err());
    }
}

// SEALED FIELDS QUERY TESTS
#[cfg(test)]
mod sealing_tests {
    use super::*;

    /// A field sealed from emission stays sealed once a later signature
    /// exists, even with the earlier stages skipped
    #[test]
    fn sealing_is_monotonic_across_skipped_stages() {
        let mut m = Manifest::new("manifest_seal".into(), ManifestType::Grouping);
        m.set_signature(SignatureStage::Transport, Signature::new("A. Driver".into()));

        let stages = signature::stages_to_check(&m, None);
        assert_eq!(stages.len(), 3);

        let sealed = waste_manifest::rules::sealed_fields(&m, Role::Emitter, &stages);
        assert!(sealed.contains(&FieldId::WasteCode));
        assert!(sealed.contains(&FieldId::TransporterCompanySiret));
        assert!(!sealed.contains(&FieldId::DestinationOperationCode));
    }
}
