//! Static field rule table: from which stage a field is sealed, from which
//! stage it is mandatory, and any structural checks tied to it.
//!
//! Rules are pure data, built once per lookup from an exhaustive `match` so
//! the compiler proves every field has one. They are the single source of
//! truth for both "can I write this?" and "must this be present?".
use crate::error::Issue;
use crate::manifest::{Manifest, ManifestType};
use crate::signature::SignatureStage;
use std::collections::BTreeSet;

/// The caller's relationship to the manifest. Seal predicates may depend
/// on who is asking: a party that already signed sees its fields sealed
/// even where a downstream party could still edit them.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum Role {
    Emitter,
    Worker,
    Transporter,
    Destination,
    Broker,
    Intermediary,
}

/// One identifier per domain field governed by the rule table.
#[derive(Debug, Clone, Copy, Eq, PartialEq, PartialOrd, Ord, Hash)]
pub enum FieldId {
    EmitterCompanyName,
    EmitterCompanySiret,
    EmitterPickupAddress,
    EmitterIsPrivateIndividual,
    EmitterPaperSignature,
    WorkerDisabled,
    WorkerCompanyName,
    WorkerCompanySiret,
    TransporterCompanyName,
    TransporterCompanySiret,
    TransporterReceipt,
    TransporterPlates,
    DestinationCompanyName,
    DestinationCompanySiret,
    DestinationCap,
    DestinationOperationCode,
    DestinationReceptionWeight,
    DestinationReceptionDate,
    DestinationAcceptanceStatus,
    BrokerCompanyName,
    BrokerCompanySiret,
    WasteCode,
    WasteDescription,
    WasteSealNumbers,
    Packagings,
    WeightKg,
    GroupedIds,
    ForwardedId,
    IntermediarySirets,
}

pub type SealPredicate = fn(&Manifest, Role) -> bool;
pub type RequirePredicate = fn(&Manifest) -> bool;
pub type StructuralCheck = fn(&Manifest) -> Option<String>;

/// Declarative rule for one field. `sealed_from` is the earliest stage
/// whose signature locks the field; `required_from` the earliest stage at
/// which it must be present. Predicates refine both per manifest content
/// and, for sealing, per caller role.
pub struct FieldRule {
    pub sealed_from: SignatureStage,
    pub seal_when: Option<SealPredicate>,
    pub required_from: Option<SignatureStage>,
    pub require_when: Option<RequirePredicate>,
    pub check: Option<StructuralCheck>,
    pub label: &'static str,
    pub hint: Option<&'static str>,
}

fn not_private_individual(m: &Manifest) -> bool {
    !m.emitter_is_private_individual
}

fn worker_expected(m: &Manifest) -> bool {
    !m.worker_disabled && matches!(m.manifest_type, ManifestType::StandardCollection)
}

fn transporter_expected(m: &Manifest) -> bool {
    !matches!(m.manifest_type, ManifestType::OnSiteCollection)
}

fn not_on_site(m: &Manifest) -> bool {
    !matches!(m.manifest_type, ManifestType::OnSiteCollection)
}

fn is_grouping(m: &Manifest) -> bool {
    matches!(m.manifest_type, ManifestType::Grouping)
}

fn is_reshipment(m: &Manifest) -> bool {
    matches!(m.manifest_type, ManifestType::Reshipment)
}

// The emitter attested to the waste conditioning when signing emission;
// any other party keeps edit rights until the work stage is closed.
fn sealed_for_author_or_after_work(m: &Manifest, role: Role) -> bool {
    role == Role::Emitter || !m.is_awaiting(SignatureStage::Work)
}

fn packaging_quantities_positive(m: &Manifest) -> Option<String> {
    if m.packagings.iter().any(|p| p.quantity == 0) {
        return Some("every packaging line must have a quantity of at least one".to_string());
    }
    None
}

impl FieldId {
    /// Every field in the table. Kept in declaration order; `rule()` being
    /// an exhaustive match guarantees none of them lacks a rule.
    pub const ALL: [FieldId; 29] = [
        FieldId::EmitterCompanyName,
        FieldId::EmitterCompanySiret,
        FieldId::EmitterPickupAddress,
        FieldId::EmitterIsPrivateIndividual,
        FieldId::EmitterPaperSignature,
        FieldId::WorkerDisabled,
        FieldId::WorkerCompanyName,
        FieldId::WorkerCompanySiret,
        FieldId::TransporterCompanyName,
        FieldId::TransporterCompanySiret,
        FieldId::TransporterReceipt,
        FieldId::TransporterPlates,
        FieldId::DestinationCompanyName,
        FieldId::DestinationCompanySiret,
        FieldId::DestinationCap,
        FieldId::DestinationOperationCode,
        FieldId::DestinationReceptionWeight,
        FieldId::DestinationReceptionDate,
        FieldId::DestinationAcceptanceStatus,
        FieldId::BrokerCompanyName,
        FieldId::BrokerCompanySiret,
        FieldId::WasteCode,
        FieldId::WasteDescription,
        FieldId::WasteSealNumbers,
        FieldId::Packagings,
        FieldId::WeightKg,
        FieldId::GroupedIds,
        FieldId::ForwardedId,
        FieldId::IntermediarySirets,
    ];

    pub fn rule(self) -> FieldRule {
        use SignatureStage::*;

        match self {
            FieldId::EmitterCompanyName => FieldRule {
                sealed_from: Emission,
                seal_when: None,
                required_from: Some(Emission),
                require_when: None,
                check: None,
                label: "emitter company name",
                hint: None,
            },
            FieldId::EmitterCompanySiret => FieldRule {
                sealed_from: Emission,
                seal_when: None,
                required_from: Some(Emission),
                require_when: Some(not_private_individual),
                check: None,
                label: "emitter SIRET",
                hint: None,
            },
            FieldId::EmitterPickupAddress => FieldRule {
                sealed_from: Emission,
                seal_when: None,
                required_from: Some(Emission),
                require_when: Some(not_on_site),
                check: None,
                label: "pickup address",
                hint: None,
            },
            FieldId::EmitterIsPrivateIndividual => FieldRule {
                sealed_from: Emission,
                seal_when: None,
                required_from: None,
                require_when: None,
                check: None,
                label: "private individual flag",
                hint: None,
            },
            // set by the worker when the declarant signed the paper form
            FieldId::EmitterPaperSignature => FieldRule {
                sealed_from: Work,
                seal_when: None,
                required_from: None,
                require_when: None,
                check: None,
                label: "emitter paper signature flag",
                hint: None,
            },
            FieldId::WorkerDisabled => FieldRule {
                sealed_from: Emission,
                seal_when: None,
                required_from: None,
                require_when: None,
                check: None,
                label: "no-worker flag",
                hint: None,
            },
            // the worker may still correct its own identity after the
            // emitter signed, up to the work signature
            FieldId::WorkerCompanyName => FieldRule {
                sealed_from: Work,
                seal_when: None,
                required_from: Some(Emission),
                require_when: Some(worker_expected),
                check: None,
                label: "worker company name",
                hint: None,
            },
            FieldId::WorkerCompanySiret => FieldRule {
                sealed_from: Work,
                seal_when: None,
                required_from: Some(Emission),
                require_when: Some(worker_expected),
                check: None,
                label: "worker SIRET",
                hint: None,
            },
            FieldId::TransporterCompanyName => FieldRule {
                sealed_from: Transport,
                seal_when: None,
                required_from: Some(Transport),
                require_when: Some(transporter_expected),
                check: None,
                label: "transporter company name",
                hint: None,
            },
            FieldId::TransporterCompanySiret => FieldRule {
                sealed_from: Transport,
                seal_when: None,
                required_from: Some(Transport),
                require_when: Some(transporter_expected),
                check: None,
                label: "transporter SIRET",
                hint: None,
            },
            FieldId::TransporterReceipt => FieldRule {
                sealed_from: Transport,
                seal_when: None,
                required_from: None,
                require_when: None,
                check: None,
                label: "transport receipt number",
                hint: None,
            },
            FieldId::TransporterPlates => FieldRule {
                sealed_from: Transport,
                seal_when: None,
                required_from: Some(Transport),
                require_when: Some(transporter_expected),
                check: None,
                label: "transporter license plates",
                hint: None,
            },
            FieldId::DestinationCompanyName => FieldRule {
                sealed_from: Emission,
                seal_when: None,
                required_from: Some(Emission),
                require_when: None,
                check: None,
                label: "destination company name",
                hint: None,
            },
            FieldId::DestinationCompanySiret => FieldRule {
                sealed_from: Emission,
                seal_when: None,
                required_from: Some(Emission),
                require_when: None,
                check: None,
                label: "destination SIRET",
                hint: None,
            },
            FieldId::DestinationCap => FieldRule {
                sealed_from: Emission,
                seal_when: None,
                required_from: None,
                require_when: None,
                check: None,
                label: "CAP number",
                hint: None,
            },
            FieldId::DestinationOperationCode => FieldRule {
                sealed_from: Operation,
                seal_when: None,
                required_from: Some(Operation),
                require_when: None,
                check: None,
                label: "operation code",
                hint: None,
            },
            FieldId::DestinationReceptionWeight => FieldRule {
                sealed_from: Operation,
                seal_when: None,
                required_from: Some(Operation),
                require_when: None,
                check: None,
                label: "reception weight",
                hint: Some(" (in kilograms)"),
            },
            FieldId::DestinationReceptionDate => FieldRule {
                sealed_from: Operation,
                seal_when: None,
                required_from: Some(Operation),
                require_when: None,
                check: None,
                label: "reception date",
                hint: None,
            },
            FieldId::DestinationAcceptanceStatus => FieldRule {
                sealed_from: Operation,
                seal_when: None,
                required_from: Some(Operation),
                require_when: None,
                check: None,
                label: "acceptance status",
                hint: None,
            },
            FieldId::BrokerCompanyName => FieldRule {
                sealed_from: Emission,
                seal_when: None,
                required_from: None,
                require_when: None,
                check: None,
                label: "broker company name",
                hint: None,
            },
            FieldId::BrokerCompanySiret => FieldRule {
                sealed_from: Emission,
                seal_when: None,
                required_from: None,
                require_when: None,
                check: None,
                label: "broker SIRET",
                hint: None,
            },
            FieldId::WasteCode => FieldRule {
                sealed_from: Emission,
                seal_when: None,
                required_from: Some(Emission),
                require_when: None,
                check: None,
                label: "waste code",
                hint: None,
            },
            FieldId::WasteDescription => FieldRule {
                sealed_from: Emission,
                seal_when: None,
                required_from: Some(Emission),
                require_when: None,
                check: None,
                label: "waste description",
                hint: None,
            },
            FieldId::WasteSealNumbers => FieldRule {
                sealed_from: Emission,
                seal_when: Some(sealed_for_author_or_after_work),
                required_from: None,
                require_when: None,
                check: None,
                label: "seal numbers",
                hint: None,
            },
            FieldId::Packagings => FieldRule {
                sealed_from: Emission,
                seal_when: Some(sealed_for_author_or_after_work),
                required_from: Some(Work),
                require_when: Some(worker_expected),
                check: Some(packaging_quantities_positive),
                label: "packaging list",
                hint: None,
            },
            FieldId::WeightKg => FieldRule {
                sealed_from: Emission,
                seal_when: None,
                required_from: Some(Emission),
                require_when: None,
                check: None,
                label: "estimated weight",
                hint: Some(" (in kilograms)"),
            },
            FieldId::GroupedIds => FieldRule {
                sealed_from: Emission,
                seal_when: None,
                required_from: Some(Emission),
                require_when: Some(is_grouping),
                check: None,
                label: "grouped manifests",
                hint: None,
            },
            FieldId::ForwardedId => FieldRule {
                sealed_from: Emission,
                seal_when: None,
                required_from: Some(Emission),
                require_when: Some(is_reshipment),
                check: None,
                label: "forwarded manifest",
                hint: None,
            },
            FieldId::IntermediarySirets => FieldRule {
                sealed_from: Emission,
                seal_when: None,
                required_from: None,
                require_when: None,
                check: None,
                label: "intermediaries",
                hint: None,
            },
        }
    }

    pub fn label(self) -> &'static str {
        self.rule().label
    }

    pub fn hint(self) -> &'static str {
        self.rule().hint.unwrap_or("")
    }

    /// Stable path used in issue payloads.
    pub fn path(self) -> &'static str {
        match self {
            FieldId::EmitterCompanyName => "emitterCompanyName",
            FieldId::EmitterCompanySiret => "emitterCompanySiret",
            FieldId::EmitterPickupAddress => "emitterPickupAddress",
            FieldId::EmitterIsPrivateIndividual => "emitterIsPrivateIndividual",
            FieldId::EmitterPaperSignature => "emitterPaperSignature",
            FieldId::WorkerDisabled => "workerDisabled",
            FieldId::WorkerCompanyName => "workerCompanyName",
            FieldId::WorkerCompanySiret => "workerCompanySiret",
            FieldId::TransporterCompanyName => "transporterCompanyName",
            FieldId::TransporterCompanySiret => "transporterCompanySiret",
            FieldId::TransporterReceipt => "transporterReceipt",
            FieldId::TransporterPlates => "transporterPlates",
            FieldId::DestinationCompanyName => "destinationCompanyName",
            FieldId::DestinationCompanySiret => "destinationCompanySiret",
            FieldId::DestinationCap => "destinationCap",
            FieldId::DestinationOperationCode => "destinationOperationCode",
            FieldId::DestinationReceptionWeight => "destinationReceptionWeight",
            FieldId::DestinationReceptionDate => "destinationReceptionDate",
            FieldId::DestinationAcceptanceStatus => "destinationAcceptanceStatus",
            FieldId::BrokerCompanyName => "brokerCompanyName",
            FieldId::BrokerCompanySiret => "brokerCompanySiret",
            FieldId::WasteCode => "wasteCode",
            FieldId::WasteDescription => "wasteDescription",
            FieldId::WasteSealNumbers => "wasteSealNumbers",
            FieldId::Packagings => "packagings",
            FieldId::WeightKg => "weightKg",
            FieldId::GroupedIds => "groupedIds",
            FieldId::ForwardedId => "forwardedId",
            FieldId::IntermediarySirets => "intermediarySirets",
        }
    }

    /// Whether the field holds a value on the manifest. Booleans always
    /// do; an empty list counts as absent.
    pub fn is_present(self, m: &Manifest) -> bool {
        match self {
            FieldId::EmitterCompanyName => m.emitter_company_name.is_some(),
            FieldId::EmitterCompanySiret => m.emitter_company_siret.is_some(),
            FieldId::EmitterPickupAddress => m.emitter_pickup_address.is_some(),
            FieldId::EmitterIsPrivateIndividual => true,
            FieldId::EmitterPaperSignature => true,
            FieldId::WorkerDisabled => true,
            FieldId::WorkerCompanyName => m.worker_company_name.is_some(),
            FieldId::WorkerCompanySiret => m.worker_company_siret.is_some(),
            FieldId::TransporterCompanyName => m.transporter_company_name.is_some(),
            FieldId::TransporterCompanySiret => m.transporter_company_siret.is_some(),
            FieldId::TransporterReceipt => m.transporter_receipt.is_some(),
            FieldId::TransporterPlates => !m.transporter_plates.is_empty(),
            FieldId::DestinationCompanyName => m.destination_company_name.is_some(),
            FieldId::DestinationCompanySiret => m.destination_company_siret.is_some(),
            FieldId::DestinationCap => m.destination_cap.is_some(),
            FieldId::DestinationOperationCode => m.destination_operation_code.is_some(),
            FieldId::DestinationReceptionWeight => m.destination_reception_weight.is_some(),
            FieldId::DestinationReceptionDate => m.destination_reception_date.is_some(),
            FieldId::DestinationAcceptanceStatus => m.destination_acceptance_status.is_some(),
            FieldId::BrokerCompanyName => m.broker_company_name.is_some(),
            FieldId::BrokerCompanySiret => m.broker_company_siret.is_some(),
            FieldId::WasteCode => m.waste_code.is_some(),
            FieldId::WasteDescription => m.waste_description.is_some(),
            FieldId::WasteSealNumbers => !m.waste_seal_numbers.is_empty(),
            FieldId::Packagings => !m.packagings.is_empty(),
            FieldId::WeightKg => m.weight_kg.is_some(),
            FieldId::GroupedIds => !m.grouped_ids.is_empty(),
            FieldId::ForwardedId => m.forwarded_id.is_some(),
            FieldId::IntermediarySirets => !m.intermediary_sirets.is_empty(),
        }
    }

    fn is_sealed(self, m: &Manifest, caller: Role, stages: &[SignatureStage]) -> bool {
        let rule = self.rule();
        stages.contains(&rule.sealed_from) && rule.seal_when.is_none_or(|p| p(m, caller))
    }

    fn is_required(self, m: &Manifest, stages: &[SignatureStage]) -> bool {
        let rule = self.rule();
        let Some(required_from) = rule.required_from else {
            return false;
        };
        stages.contains(&required_from) && rule.require_when.is_none_or(|p| p(m))
    }
}

/// Evaluate every rule against one validation pass.
///
/// Sealing is checked against the updated-fields set, never against mere
/// presence in the payload: re-submitting an unchanged value is not a
/// violation.
pub fn evaluate(
    manifest: &Manifest,
    caller: Role,
    updated_fields: &BTreeSet<FieldId>,
    stages_to_check: &[SignatureStage],
) -> Vec<Issue> {
    let mut issues = Vec::new();

    for field in FieldId::ALL {
        if field.is_sealed(manifest, caller, stages_to_check) && updated_fields.contains(&field) {
            issues.push(Issue::SealedField { field });
        }

        if field.is_required(manifest, stages_to_check) {
            if !field.is_present(manifest) {
                issues.push(Issue::RequiredField { field });
            }
            if let Some(check) = field.rule().check {
                if let Some(message) = check(manifest) {
                    issues.push(Issue::StructuralInvariant {
                        path: field.path(),
                        message,
                        fatal: false,
                    });
                }
            }
        }
    }

    issues
}

/// The set of fields the caller may no longer write. Used by the
/// surrounding layer to render read-only form fields.
pub fn sealed_fields(
    manifest: &Manifest,
    caller: Role,
    stages_to_check: &[SignatureStage],
) -> BTreeSet<FieldId> {
    FieldId::ALL
        .into_iter()
        .filter(|field| field.is_sealed(manifest, caller, stages_to_check))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::manifest::{Manifest, ManifestType, Packaging};
    use crate::signature::{Signature, SignatureStage};

    fn manifest() -> Manifest {
        Manifest::new("manifest_rules".into(), ManifestType::StandardCollection)
    }

    #[test]
    fn all_fields_are_listed_once() {
        let unique: BTreeSet<FieldId> = FieldId::ALL.into_iter().collect();
        assert_eq!(unique.len(), FieldId::ALL.len());
    }

    #[test]
    fn nothing_is_sealed_on_a_draft() {
        let m = manifest();
        assert!(sealed_fields(&m, Role::Emitter, &[]).is_empty());
    }

    #[test]
    fn emission_signature_seals_emitter_fields() {
        let mut m = manifest();
        m.set_signature(SignatureStage::Emission, Signature::new("E. Producer".into()));

        let sealed = sealed_fields(&m, Role::Worker, &[SignatureStage::Emission]);
        assert!(sealed.contains(&FieldId::EmitterCompanyName));
        assert!(sealed.contains(&FieldId::WasteCode));
        assert!(!sealed.contains(&FieldId::TransporterCompanySiret));
    }

    #[test]
    fn packagings_stay_editable_for_worker_until_work_signed() {
        let mut m = manifest();
        m.set_signature(SignatureStage::Emission, Signature::new("E. Producer".into()));
        let stages = [SignatureStage::Emission];

        // the emitter attested to the conditioning, the worker did not yet
        assert!(sealed_fields(&m, Role::Emitter, &stages).contains(&FieldId::Packagings));
        assert!(!sealed_fields(&m, Role::Worker, &stages).contains(&FieldId::Packagings));

        m.set_signature(SignatureStage::Work, Signature::new("W. Roofer".into()));
        let stages = [SignatureStage::Work, SignatureStage::Emission];
        assert!(sealed_fields(&m, Role::Worker, &stages).contains(&FieldId::Packagings));
    }

    #[test]
    fn siret_not_required_for_private_individual() {
        let mut m = manifest();
        m.emitter_is_private_individual = true;
        m.emitter_company_name = Some("Mme Dupont".into());

        let issues = evaluate(&m, Role::Emitter, &BTreeSet::new(), &[SignatureStage::Emission]);
        assert!(
            !issues
                .iter()
                .any(|i| matches!(i, Issue::RequiredField { field: FieldId::EmitterCompanySiret }))
        );
    }

    #[test]
    fn packaging_quantity_check_runs_when_required() {
        let mut m = manifest();
        m.packagings = vec![Packaging {
            kind: "PALETTE".into(),
            quantity: 0,
        }];

        let issues = evaluate(
            &m,
            Role::Worker,
            &BTreeSet::new(),
            &[SignatureStage::Work, SignatureStage::Emission],
        );
        assert!(issues.iter().any(|i| {
            matches!(i, Issue::StructuralInvariant { path, .. } if *path == "packagings")
        }));
    }
}
