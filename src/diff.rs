//! Diff engine: which submitted fields actually change the manifest.
//!
//! Only keys present in the patch are considered, so a partial update
//! never reports omitted fields. Re-submitting a full unchanged form
//! therefore yields an empty set, which is what keeps sealed-field
//! checking tolerant of the resubmit-everything client pattern.
use crate::manifest::{Manifest, ManifestPatch};
use crate::rules::FieldId;
use std::collections::BTreeSet;

fn scalar_changed<T: PartialEq>(current: &Option<T>, submitted: &Option<T>) -> bool {
    match submitted {
        Some(value) => current.as_ref() != Some(value),
        None => false,
    }
}

fn flag_changed(current: bool, submitted: Option<bool>) -> bool {
    submitted.is_some_and(|value| value != current)
}

fn list_changed<T: PartialEq>(current: &[T], submitted: &Option<Vec<T>>) -> bool {
    submitted.as_ref().is_some_and(|value| current != value)
}

// Related-manifest and intermediary references are identifier sets: order
// and duplication carry no meaning.
fn id_set_changed(current: &[String], submitted: &Option<Vec<String>>) -> bool {
    submitted.as_ref().is_some_and(|value| {
        let current: BTreeSet<&String> = current.iter().collect();
        let submitted: BTreeSet<&String> = value.iter().collect();
        current != submitted
    })
}

/// The subset of submitted fields whose value differs from the persisted
/// snapshot. Transient, recomputed per validation pass, never persisted.
pub fn updated_fields(current: &Manifest, patch: &ManifestPatch) -> BTreeSet<FieldId> {
    let mut updated = BTreeSet::new();
    let mut mark = |changed: bool, field: FieldId| {
        if changed {
            updated.insert(field);
        }
    };

    mark(
        scalar_changed(&current.emitter_company_name, &patch.emitter_company_name),
        FieldId::EmitterCompanyName,
    );
    mark(
        scalar_changed(&current.emitter_company_siret, &patch.emitter_company_siret),
        FieldId::EmitterCompanySiret,
    );
    mark(
        scalar_changed(&current.emitter_pickup_address, &patch.emitter_pickup_address),
        FieldId::EmitterPickupAddress,
    );
    mark(
        flag_changed(
            current.emitter_is_private_individual,
            patch.emitter_is_private_individual,
        ),
        FieldId::EmitterIsPrivateIndividual,
    );
    mark(
        flag_changed(current.emitter_paper_signature, patch.emitter_paper_signature),
        FieldId::EmitterPaperSignature,
    );
    mark(
        flag_changed(current.worker_disabled, patch.worker_disabled),
        FieldId::WorkerDisabled,
    );
    mark(
        scalar_changed(&current.worker_company_name, &patch.worker_company_name),
        FieldId::WorkerCompanyName,
    );
    mark(
        scalar_changed(&current.worker_company_siret, &patch.worker_company_siret),
        FieldId::WorkerCompanySiret,
    );
    mark(
        scalar_changed(
            &current.transporter_company_name,
            &patch.transporter_company_name,
        ),
        FieldId::TransporterCompanyName,
    );
    mark(
        scalar_changed(
            &current.transporter_company_siret,
            &patch.transporter_company_siret,
        ),
        FieldId::TransporterCompanySiret,
    );
    mark(
        scalar_changed(&current.transporter_receipt, &patch.transporter_receipt),
        FieldId::TransporterReceipt,
    );
    mark(
        list_changed(&current.transporter_plates, &patch.transporter_plates),
        FieldId::TransporterPlates,
    );
    mark(
        scalar_changed(
            &current.destination_company_name,
            &patch.destination_company_name,
        ),
        FieldId::DestinationCompanyName,
    );
    mark(
        scalar_changed(
            &current.destination_company_siret,
            &patch.destination_company_siret,
        ),
        FieldId::DestinationCompanySiret,
    );
    mark(
        scalar_changed(&current.destination_cap, &patch.destination_cap),
        FieldId::DestinationCap,
    );
    mark(
        scalar_changed(
            &current.destination_operation_code,
            &patch.destination_operation_code,
        ),
        FieldId::DestinationOperationCode,
    );
    mark(
        scalar_changed(
            &current.destination_reception_weight,
            &patch.destination_reception_weight,
        ),
        FieldId::DestinationReceptionWeight,
    );
    mark(
        scalar_changed(
            &current.destination_reception_date,
            &patch.destination_reception_date,
        ),
        FieldId::DestinationReceptionDate,
    );
    mark(
        scalar_changed(
            &current.destination_acceptance_status,
            &patch.destination_acceptance_status,
        ),
        FieldId::DestinationAcceptanceStatus,
    );
    mark(
        scalar_changed(&current.broker_company_name, &patch.broker_company_name),
        FieldId::BrokerCompanyName,
    );
    mark(
        scalar_changed(&current.broker_company_siret, &patch.broker_company_siret),
        FieldId::BrokerCompanySiret,
    );
    mark(
        scalar_changed(&current.waste_code, &patch.waste_code),
        FieldId::WasteCode,
    );
    mark(
        scalar_changed(&current.waste_description, &patch.waste_description),
        FieldId::WasteDescription,
    );
    mark(
        list_changed(&current.waste_seal_numbers, &patch.waste_seal_numbers),
        FieldId::WasteSealNumbers,
    );
    mark(
        list_changed(&current.packagings, &patch.packagings),
        FieldId::Packagings,
    );
    mark(
        scalar_changed(&current.weight_kg, &patch.weight_kg),
        FieldId::WeightKg,
    );
    mark(
        id_set_changed(&current.grouped_ids, &patch.grouped_ids),
        FieldId::GroupedIds,
    );
    mark(
        scalar_changed(&current.forwarded_id, &patch.forwarded_id),
        FieldId::ForwardedId,
    );
    mark(
        id_set_changed(&current.intermediary_sirets, &patch.intermediary_sirets),
        FieldId::IntermediarySirets,
    );

    updated
}
