//! Walks a standard collection manifest through its full lifecycle against
//! a local sled database, then amends it through a revision request.
use std::sync::Arc;
use waste_manifest::manifest::{
    AcceptanceStatus, ManifestPatch, ManifestType, OperationCode, Packaging, TimeStamp,
};
use waste_manifest::registry::{CompanyInfo, CompanyProfile, StaticRegistry};
use waste_manifest::revision::{ApprovalDecision, RevisionPatch};
use waste_manifest::rules::Role;
use waste_manifest::service::ManifestService;
use waste_manifest::signature::SignatureStage;

fn company(siret: &str, name: &str, profiles: Vec<CompanyProfile>) -> CompanyInfo {
    CompanyInfo {
        siret: siret.into(),
        name: name.into(),
        profiles,
        transport_receipt: None,
    }
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "debug".into()),
        )
        .init();

    let db = sled::open("sled")?;
    if !db.is_empty() {
        db.clear()?;
    }

    let registry = StaticRegistry::new()
        .with_company(company(
            "11111111111111",
            "Demolition SA",
            vec![CompanyProfile::WasteProducer],
        ))
        .with_company(company(
            "22222222222222",
            "Toiture Pro",
            vec![CompanyProfile::Worker],
        ))
        .with_company(CompanyInfo {
            siret: "33333333333333".into(),
            name: "Transports Durand".into(),
            profiles: vec![CompanyProfile::Transporter],
            transport_receipt: Some("REC-2025-118".into()),
        })
        .with_company(company(
            "44444444444444",
            "Recytech",
            vec![CompanyProfile::WasteProcessor],
        ));

    let service = ManifestService::new(Arc::new(db), Arc::new(registry));

    // draft with the full emission-side picture
    let manifest = service.create_manifest(
        ManifestType::StandardCollection,
        ManifestPatch {
            emitter_company_name: Some("Demolition SA".into()),
            emitter_company_siret: Some("11111111111111".into()),
            emitter_pickup_address: Some("4 rue des Carrieres, Lyon".into()),
            worker_company_name: Some("Toiture Pro".into()),
            worker_company_siret: Some("22222222222222".into()),
            destination_company_name: Some("Recytech".into()),
            destination_company_siret: Some("44444444444444".into()),
            waste_code: Some("17 06 05*".into()),
            waste_description: Some("asbestos roofing sheets".into()),
            weight_kg: Some(1850),
            ..Default::default()
        },
        Role::Emitter,
    )?;
    println!("created {} in status {:?}", manifest.id, manifest.status);

    let manifest = service.sign_manifest(
        &manifest.id,
        SignatureStage::Emission,
        "E. Producer".into(),
        Role::Emitter,
    )?;
    println!("emission signed, status {:?}", manifest.status);

    // the worker conditions the waste before signing off the work stage
    let manifest = service.update_manifest(
        &manifest.id,
        ManifestPatch {
            packagings: Some(vec![Packaging {
                kind: "BIG_BAG".into(),
                quantity: 12,
            }]),
            waste_seal_numbers: Some(vec!["SEAL-001".into(), "SEAL-002".into()]),
            ..Default::default()
        },
        Role::Worker,
    )?;
    let manifest = service.sign_manifest(
        &manifest.id,
        SignatureStage::Work,
        "W. Roofer".into(),
        Role::Worker,
    )?;
    println!("work signed, status {:?}", manifest.status);

    let manifest = service.update_manifest(
        &manifest.id,
        ManifestPatch {
            transporter_company_name: Some("Transports Durand".into()),
            transporter_company_siret: Some("33333333333333".into()),
            transporter_plates: Some(vec!["AB-123-CD".into()]),
            ..Default::default()
        },
        Role::Transporter,
    )?;
    println!(
        "receipt auto-completed from the registry: {:?}",
        manifest.transporter_receipt
    );
    let manifest = service.sign_manifest(
        &manifest.id,
        SignatureStage::Transport,
        "A. Driver".into(),
        Role::Transporter,
    )?;
    println!("transport signed, status {:?}", manifest.status);

    let manifest = service.update_manifest(
        &manifest.id,
        ManifestPatch {
            destination_operation_code: Some(OperationCode::D5),
            destination_reception_weight: Some(1790),
            destination_reception_date: Some(TimeStamp::new()),
            destination_acceptance_status: Some(AcceptanceStatus::Accepted),
            ..Default::default()
        },
        Role::Destination,
    )?;
    let manifest = service.sign_manifest(
        &manifest.id,
        SignatureStage::Operation,
        "D. Operator".into(),
        Role::Destination,
    )?;
    println!("operation signed, status {:?}", manifest.status);

    // the destination noticed a wrong waste description after processing;
    // amending it now takes everyone's agreement
    let revision = service.propose_revision(
        &manifest.id,
        "44444444444444",
        RevisionPatch {
            waste_description: Some("asbestos roofing sheets, fragmented".into()),
            ..Default::default()
        },
        false,
        "description did not match the delivered load".into(),
    )?;
    println!("revision {} opened, {} approvals", revision.id, revision.approvals.len());

    let revision =
        service.resolve_approval(&revision.id, "11111111111111", ApprovalDecision::Accepted, None)?;
    let revision =
        service.resolve_approval(&revision.id, "22222222222222", ApprovalDecision::Accepted, None)?;
    println!("revision settled as {:?}", revision.status);

    let manifest = service.manifest(&manifest.id)?;
    println!(
        "final description: {:?}",
        manifest.waste_description.as_deref()
    );

    Ok(())
}
