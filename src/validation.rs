//! Validation engine: one pass over a submitted change-set.
//!
//! Pipeline order matters: structural invariants run first and their fatal
//! subset short-circuits the pass, so no registry call is ever spent on a
//! structurally invalid manifest. Everything else accumulates into one
//! issue list so a caller sees every problem in a single round trip.
use crate::diff;
use crate::error::Issue;
use crate::manifest::{Manifest, ManifestPatch, ManifestType};
use crate::registry::{CompanyProfile, CompanyRegistry};
use crate::rules::{self, FieldId, Role};
use crate::signature::{self, SignatureStage};
use crate::utils;

pub struct ValidationContext<'a> {
    /// The stage about to be signed, or `None` for a draft edit.
    pub target_stage: Option<SignatureStage>,
    pub caller: Role,
    pub registry: &'a dyn CompanyRegistry,
}

/// Validate a change-set against the persisted snapshot (or a fresh draft)
/// and return the candidate manifest with defaults and auto-completions
/// applied, or every issue found.
pub fn validate(
    base: &Manifest,
    patch: &ManifestPatch,
    ctx: &ValidationContext<'_>,
) -> Result<Manifest, Vec<Issue>> {
    let mut candidate = base.clone();
    patch.apply_to(&mut candidate);

    let mut issues = structural_invariants(&candidate);
    if issues.iter().any(Issue::is_fatal) {
        tracing::warn!(manifest = %candidate.id, "fatal structural issue, aborting pass");
        return Err(issues);
    }

    let updated_fields = diff::updated_fields(base, patch);
    let stages = signature::stages_to_check(&candidate, ctx.target_stage);

    issues.extend(rules::evaluate(
        &candidate,
        ctx.caller,
        &updated_fields,
        &stages,
    ));

    let sealed = rules::sealed_fields(&candidate, ctx.caller, &stages);
    issues.extend(verify_parties(&mut candidate, ctx, &sealed));

    if issues.is_empty() {
        tracing::debug!(manifest = %candidate.id, updated = updated_fields.len(), "validation passed");
        Ok(candidate)
    } else {
        tracing::debug!(manifest = %candidate.id, issues = issues.len(), "validation failed");
        Err(issues)
    }
}

/// Cross-field business rules, independent of any signature stage.
fn structural_invariants(m: &Manifest) -> Vec<Issue> {
    let mut issues = Vec::new();

    if !m.grouped_ids.is_empty() && m.forwarded_id.is_some() {
        issues.push(Issue::StructuralInvariant {
            path: "forwardedId",
            message: "cannot declare both a grouping link and a reshipment link".into(),
            fatal: false,
        });
    }
    if matches!(m.manifest_type, ManifestType::Grouping) && m.grouped_ids.is_empty() {
        issues.push(Issue::StructuralInvariant {
            path: "groupedIds",
            message: "a grouping manifest must reference at least one prior manifest".into(),
            fatal: true,
        });
    }
    if matches!(m.manifest_type, ManifestType::Reshipment) && m.forwarded_id.is_none() {
        issues.push(Issue::StructuralInvariant {
            path: "forwardedId",
            message: "a reshipment manifest must reference the manifest it forwards".into(),
            fatal: true,
        });
    }
    if m.emitter_is_private_individual && m.emitter_company_siret.is_some() {
        issues.push(Issue::StructuralInvariant {
            path: "emitterCompanySiret",
            message: "a private-individual emitter cannot carry a SIRET".into(),
            fatal: false,
        });
    }
    if matches!(m.manifest_type, ManifestType::OnSiteCollection)
        && (m.transporter_company_siret.is_some() || m.transporter_company_name.is_some())
    {
        issues.push(Issue::StructuralInvariant {
            path: "transporterCompanySiret",
            message: "cannot declare a transporter for this manifest type".into(),
            fatal: false,
        });
    }

    let siret_fields = [
        (FieldId::EmitterCompanySiret, m.emitter_company_siret.as_deref()),
        (FieldId::WorkerCompanySiret, m.worker_company_siret.as_deref()),
        (
            FieldId::TransporterCompanySiret,
            m.transporter_company_siret.as_deref(),
        ),
        (
            FieldId::DestinationCompanySiret,
            m.destination_company_siret.as_deref(),
        ),
        (FieldId::BrokerCompanySiret, m.broker_company_siret.as_deref()),
    ];
    for (field, siret) in siret_fields {
        if siret.is_some_and(|s| !utils::is_valid_siret(s)) {
            issues.push(Issue::StructuralInvariant {
                path: field.path(),
                message: format!("{} must be a 14-digit SIRET", field.label()),
                fatal: false,
            });
        }
    }

    issues
}

/// Check every referenced party against the registry, skipping fields
/// already sealed for the caller: historical data is not re-validated
/// against current registry rules. Also fills the transport receipt from
/// the registry while the transporter block is still unsealed.
fn verify_parties(
    candidate: &mut Manifest,
    ctx: &ValidationContext<'_>,
    sealed: &std::collections::BTreeSet<FieldId>,
) -> Vec<Issue> {
    let mut issues = Vec::new();

    let party_checks: [(FieldId, Option<String>, CompanyProfile); 5] = [
        (
            FieldId::EmitterCompanySiret,
            candidate.emitter_company_siret.clone(),
            CompanyProfile::WasteProducer,
        ),
        (
            FieldId::WorkerCompanySiret,
            candidate.worker_company_siret.clone(),
            CompanyProfile::Worker,
        ),
        (
            FieldId::TransporterCompanySiret,
            candidate.transporter_company_siret.clone(),
            CompanyProfile::Transporter,
        ),
        (
            FieldId::DestinationCompanySiret,
            candidate.destination_company_siret.clone(),
            CompanyProfile::WasteProcessor,
        ),
        (
            FieldId::BrokerCompanySiret,
            candidate.broker_company_siret.clone(),
            CompanyProfile::Broker,
        ),
    ];

    for (field, siret, profile) in party_checks {
        let Some(siret) = siret else { continue };
        if sealed.contains(&field) {
            continue;
        }
        match lookup(ctx, field, &siret, profile) {
            Ok(info) => {
                if field == FieldId::TransporterCompanySiret
                    && !sealed.contains(&FieldId::TransporterReceipt)
                    && candidate.transporter_receipt.is_none()
                {
                    candidate.transporter_receipt = info.transport_receipt.clone();
                }
            }
            Err(issue) => issues.push(issue),
        }
    }

    if !sealed.contains(&FieldId::IntermediarySirets) {
        for siret in candidate.intermediary_sirets.clone() {
            if let Err(issue) = lookup(
                ctx,
                FieldId::IntermediarySirets,
                &siret,
                CompanyProfile::Intermediary,
            ) {
                issues.push(issue);
            }
        }
    }

    issues
}

fn lookup(
    ctx: &ValidationContext<'_>,
    field: FieldId,
    siret: &str,
    profile: CompanyProfile,
) -> Result<crate::registry::CompanyInfo, Issue> {
    match ctx.registry.find_company(siret) {
        Err(err) => Err(Issue::ExternalVerification {
            field,
            reason: err.to_string(),
        }),
        Ok(None) => Err(Issue::ExternalVerification {
            field,
            reason: format!("no company registered under {siret}"),
        }),
        Ok(Some(info)) => {
            if info.has_profile(profile) {
                Ok(info)
            } else {
                Err(Issue::ExternalVerification {
                    field,
                    reason: format!("{siret} is not registered as a {}", profile.label()),
                })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::{CompanyInfo, RegistryError, StaticRegistry};

    struct DownRegistry;

    impl CompanyRegistry for DownRegistry {
        fn find_company(&self, _: &str) -> Result<Option<CompanyInfo>, RegistryError> {
            Err(RegistryError::Timeout)
        }
    }

    #[test]
    fn registry_timeout_is_a_verification_failure() {
        let mut base = Manifest::new("manifest_val".into(), ManifestType::StandardCollection);
        base.transporter_company_siret = Some("22222222222222".into());

        let ctx = ValidationContext {
            target_stage: None,
            caller: Role::Transporter,
            registry: &DownRegistry,
        };
        let issues = validate(&base, &ManifestPatch::default(), &ctx).unwrap_err();

        assert!(issues.iter().any(|i| matches!(
            i,
            Issue::ExternalVerification { field: FieldId::TransporterCompanySiret, .. }
        )));
    }

    #[test]
    fn fatal_structural_issue_short_circuits_before_lookups() {
        let base = Manifest::new("manifest_val".into(), ManifestType::Grouping);
        // the registry would time out, but the fatal grouping issue must
        // keep the pass from ever reaching it
        let ctx = ValidationContext {
            target_stage: None,
            caller: Role::Emitter,
            registry: &DownRegistry,
        };

        let issues = validate(&base, &ManifestPatch::default(), &ctx).unwrap_err();
        assert_eq!(issues.len(), 1);
        assert!(issues[0].is_fatal());
    }

    #[test]
    fn receipt_auto_completes_from_registry() {
        let registry = StaticRegistry::new().with_company(CompanyInfo {
            siret: "33333333333333".into(),
            name: "Transports Durand".into(),
            profiles: vec![CompanyProfile::Transporter],
            transport_receipt: Some("REC-2025-118".into()),
        });
        let base = Manifest::new("manifest_val".into(), ManifestType::StandardCollection);
        let patch = ManifestPatch {
            transporter_company_siret: Some("33333333333333".into()),
            ..Default::default()
        };
        let ctx = ValidationContext {
            target_stage: None,
            caller: Role::Transporter,
            registry: &registry,
        };

        let candidate = validate(&base, &patch, &ctx).unwrap();
        assert_eq!(candidate.transporter_receipt.as_deref(), Some("REC-2025-118"));
    }
}
