//! Core manifest aggregate and domain field types
use crate::signature::Signature;
use crate::status::ManifestStatus;
use chrono::{DateTime, TimeZone, Utc};

/// Discriminant for the kind of waste movement the manifest covers.
#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, Copy, Eq, PartialEq)]
pub enum ManifestType {
    /// Ordinary single-producer collection.
    #[n(0)]
    StandardCollection,
    /// Consolidates several prior manifests into one shipment.
    #[n(1)]
    Grouping,
    /// Forwards one prior manifest to a new destination.
    #[n(2)]
    Reshipment,
    /// Waste handed over directly at a collection site. No transporter,
    /// and the destination's operation signature is the only one applied.
    #[n(3)]
    OnSiteCollection,
}

/// Planned or performed treatment operation code.
#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, Copy, Eq, PartialEq)]
pub enum OperationCode {
    #[n(0)]
    R5,
    #[n(1)]
    D5,
    #[n(2)]
    D9,
    /// Storage pending recovery. The waste moves on under a child manifest.
    #[n(3)]
    R13,
    /// Transit storage pending disposal. Also continued under a child.
    #[n(4)]
    D15,
}

impl OperationCode {
    /// Partial codes leave the waste awaiting a follow-up manifest.
    pub fn is_partial(self) -> bool {
        matches!(self, OperationCode::R13 | OperationCode::D15)
    }
}

#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, Copy, Eq, PartialEq)]
pub enum AcceptanceStatus {
    #[n(0)]
    Accepted,
    #[n(1)]
    Refused,
}

#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, Eq, PartialEq)]
pub struct Packaging {
    #[n(0)]
    pub kind: String,
    #[n(1)]
    pub quantity: u32,
}

#[derive(Debug, PartialEq, Eq, PartialOrd, Ord, Clone)]
pub struct TimeStamp<T: TimeZone>(DateTime<T>);

impl TimeStamp<Utc> {
    pub fn new() -> Self {
        Self(Utc::now())
    }
    pub fn new_with(year: i32, month: u32, day: u32, hour: u32, min: u32, sec: u32) -> Self {
        Utc.with_ymd_and_hms(year, month, day, hour, min, sec)
            .unwrap()
            .into()
    }
    pub fn to_datetime_utc(&self) -> DateTime<Utc> {
        self.0
    }
}

impl Default for TimeStamp<Utc> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: TimeZone> From<DateTime<T>> for TimeStamp<T> {
    fn from(value: DateTime<T>) -> Self {
        TimeStamp(value)
    }
}

impl<C> minicbor::Encode<C> for TimeStamp<Utc> {
    fn encode<W: minicbor::encode::Write>(
        &self,
        e: &mut minicbor::Encoder<W>,
        _: &mut C,
    ) -> Result<(), minicbor::encode::Error<W::Error>> {
        if let Some(nsec) = self.0.timestamp_nanos_opt() {
            return e.i64(nsec)?.ok();
        }

        Err(minicbor::encode::Error::message(
            "failed to encode timestamp. timestamp_nanos_opt returned None",
        ))
    }
}

impl<'b, C> minicbor::Decode<'b, C> for TimeStamp<Utc> {
    fn decode(d: &mut minicbor::Decoder<'b>, _: &mut C) -> Result<Self, minicbor::decode::Error> {
        let nsecs = d.i64()?;

        Ok(TimeStamp(DateTime::from_timestamp_nanos(nsecs)))
    }
}

/// The regulated waste-transport document.
///
/// Key is the bech32 id. Every domain field is governed by one entry in the
/// rule table; signature slots only ever go from empty to filled.
#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, PartialEq)]
pub struct Manifest {
    #[n(0)]
    pub id: String,
    #[n(1)]
    pub manifest_type: ManifestType,
    #[n(2)]
    pub status: ManifestStatus,
    #[n(3)]
    pub is_deleted: bool,

    // emitter
    #[n(4)]
    pub emitter_company_name: Option<String>,
    #[n(5)]
    pub emitter_company_siret: Option<String>,
    #[n(6)]
    pub emitter_pickup_address: Option<String>,
    #[n(7)]
    pub emitter_is_private_individual: bool,
    #[n(8)]
    pub emitter_paper_signature: bool,

    // worker
    #[n(9)]
    pub worker_disabled: bool,
    #[n(10)]
    pub worker_company_name: Option<String>,
    #[n(11)]
    pub worker_company_siret: Option<String>,

    // transporter
    #[n(12)]
    pub transporter_company_name: Option<String>,
    #[n(13)]
    pub transporter_company_siret: Option<String>,
    #[n(14)]
    pub transporter_receipt: Option<String>,
    #[n(15)]
    pub transporter_plates: Vec<String>,

    // destination
    #[n(16)]
    pub destination_company_name: Option<String>,
    #[n(17)]
    pub destination_company_siret: Option<String>,
    #[n(18)]
    pub destination_cap: Option<String>,
    #[n(19)]
    pub destination_operation_code: Option<OperationCode>,
    #[n(20)]
    pub destination_reception_weight: Option<u64>,
    #[n(21)]
    pub destination_reception_date: Option<TimeStamp<Utc>>,
    #[n(22)]
    pub destination_acceptance_status: Option<AcceptanceStatus>,

    // broker
    #[n(23)]
    pub broker_company_name: Option<String>,
    #[n(24)]
    pub broker_company_siret: Option<String>,

    // waste
    #[n(25)]
    pub waste_code: Option<String>,
    #[n(26)]
    pub waste_description: Option<String>,
    #[n(27)]
    pub waste_seal_numbers: Vec<String>,
    #[n(28)]
    pub packagings: Vec<Packaging>,
    #[n(29)]
    pub weight_kg: Option<u64>,

    // links to related manifests
    #[n(30)]
    pub grouped_ids: Vec<String>,
    #[n(31)]
    pub forwarded_id: Option<String>,
    #[n(32)]
    pub intermediary_sirets: Vec<String>,

    // signature slots, one per stage
    #[n(33)]
    pub emission_signature: Option<Signature>,
    #[n(34)]
    pub work_signature: Option<Signature>,
    #[n(35)]
    pub transport_signature: Option<Signature>,
    #[n(36)]
    pub operation_signature: Option<Signature>,
}

impl Manifest {
    /// A fresh draft with every domain field at its default.
    pub fn new(id: String, manifest_type: ManifestType) -> Self {
        Self {
            id,
            manifest_type,
            status: ManifestStatus::Initial,
            is_deleted: false,
            emitter_company_name: None,
            emitter_company_siret: None,
            emitter_pickup_address: None,
            emitter_is_private_individual: false,
            emitter_paper_signature: false,
            worker_disabled: false,
            worker_company_name: None,
            worker_company_siret: None,
            transporter_company_name: None,
            transporter_company_siret: None,
            transporter_receipt: None,
            transporter_plates: vec![],
            destination_company_name: None,
            destination_company_siret: None,
            destination_cap: None,
            destination_operation_code: None,
            destination_reception_weight: None,
            destination_reception_date: None,
            destination_acceptance_status: None,
            broker_company_name: None,
            broker_company_siret: None,
            waste_code: None,
            waste_description: None,
            waste_seal_numbers: vec![],
            packagings: vec![],
            weight_kg: None,
            grouped_ids: vec![],
            forwarded_id: None,
            intermediary_sirets: vec![],
            emission_signature: None,
            work_signature: None,
            transport_signature: None,
            operation_signature: None,
        }
    }

    pub fn serialize_with_hash(&self) -> anyhow::Result<(String, Vec<u8>)> {
        let cbor = minicbor::to_vec(self)?;
        let hash = sha256::digest(&cbor);

        Ok((hash, cbor))
    }
}

/// Sparse change-set submitted by a caller. `None` means the key was
/// omitted, so it never counts as changed and never overwrites.
#[derive(Debug, Default, Clone)]
pub struct ManifestPatch {
    pub emitter_company_name: Option<String>,
    pub emitter_company_siret: Option<String>,
    pub emitter_pickup_address: Option<String>,
    pub emitter_is_private_individual: Option<bool>,
    pub emitter_paper_signature: Option<bool>,
    pub worker_disabled: Option<bool>,
    pub worker_company_name: Option<String>,
    pub worker_company_siret: Option<String>,
    pub transporter_company_name: Option<String>,
    pub transporter_company_siret: Option<String>,
    pub transporter_receipt: Option<String>,
    pub transporter_plates: Option<Vec<String>>,
    pub destination_company_name: Option<String>,
    pub destination_company_siret: Option<String>,
    pub destination_cap: Option<String>,
    pub destination_operation_code: Option<OperationCode>,
    pub destination_reception_weight: Option<u64>,
    pub destination_reception_date: Option<TimeStamp<Utc>>,
    pub destination_acceptance_status: Option<AcceptanceStatus>,
    pub broker_company_name: Option<String>,
    pub broker_company_siret: Option<String>,
    pub waste_code: Option<String>,
    pub waste_description: Option<String>,
    pub waste_seal_numbers: Option<Vec<String>>,
    pub packagings: Option<Vec<Packaging>>,
    pub weight_kg: Option<u64>,
    pub grouped_ids: Option<Vec<String>>,
    pub forwarded_id: Option<String>,
    pub intermediary_sirets: Option<Vec<String>>,
}

impl ManifestPatch {
    /// Write every present key onto the manifest, leaving omitted keys alone.
    pub fn apply_to(&self, manifest: &mut Manifest) {
        if let Some(v) = &self.emitter_company_name {
            manifest.emitter_company_name = Some(v.clone());
        }
        if let Some(v) = &self.emitter_company_siret {
            manifest.emitter_company_siret = Some(v.clone());
        }
        if let Some(v) = &self.emitter_pickup_address {
            manifest.emitter_pickup_address = Some(v.clone());
        }
        if let Some(v) = self.emitter_is_private_individual {
            manifest.emitter_is_private_individual = v;
        }
        if let Some(v) = self.emitter_paper_signature {
            manifest.emitter_paper_signature = v;
        }
        if let Some(v) = self.worker_disabled {
            manifest.worker_disabled = v;
        }
        if let Some(v) = &self.worker_company_name {
            manifest.worker_company_name = Some(v.clone());
        }
        if let Some(v) = &self.worker_company_siret {
            manifest.worker_company_siret = Some(v.clone());
        }
        if let Some(v) = &self.transporter_company_name {
            manifest.transporter_company_name = Some(v.clone());
        }
        if let Some(v) = &self.transporter_company_siret {
            manifest.transporter_company_siret = Some(v.clone());
        }
        if let Some(v) = &self.transporter_receipt {
            manifest.transporter_receipt = Some(v.clone());
        }
        if let Some(v) = &self.transporter_plates {
            manifest.transporter_plates = v.clone();
        }
        if let Some(v) = &self.destination_company_name {
            manifest.destination_company_name = Some(v.clone());
        }
        if let Some(v) = &self.destination_company_siret {
            manifest.destination_company_siret = Some(v.clone());
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
        if let Some(v) = &self.destination_reception_date {
            manifest.destination_reception_date = Some(v.clone());
        }
        if let Some(v) = self.destination_acceptance_status {
            manifest.destination_acceptance_status = Some(v);
        }
        if let Some(v) = &self.broker_company_name {
            manifest.broker_company_name = Some(v.clone());
        }
        if let Some(v) = &self.broker_company_siret {
            manifest.broker_company_siret = Some(v.clone());
        }
        if let Some(v) = &self.waste_code {
            manifest.waste_code = Some(v.clone());
        }
        if let Some(v) = &self.waste_description {
            manifest.waste_description = Some(v.clone());
        }
        if let Some(v) = &self.waste_seal_numbers {
            manifest.waste_seal_numbers = v.clone();
        }
        if let Some(v) = &self.packagings {
            manifest.packagings = v.clone();
        }
        if let Some(v) = self.weight_kg {
            manifest.weight_kg = Some(v);
        }
        if let Some(v) = &self.grouped_ids {
            manifest.grouped_ids = v.clone();
        }
        if let Some(v) = &self.forwarded_id {
            manifest.forwarded_id = Some(v.clone());
        }
        if let Some(v) = &self.intermediary_sirets {
            manifest.intermediary_sirets = v.clone();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::signature::SignatureStage;

    #[test]
    fn timestamp_encoding() {
        let original = TimeStamp::new();

        let encoding = minicbor::to_vec(original.clone()).unwrap();
        let decode: TimeStamp<Utc> = minicbor::decode(&encoding).unwrap();

        assert_eq!(original, decode);
    }

    #[test]
    fn manifest_cbor_roundtrip() {
        let mut manifest = Manifest::new("manifest_test".into(), ManifestType::Grouping);
        manifest.emitter_company_name = Some("Recytech".into());
        manifest.grouped_ids = vec!["manifest_a".into(), "manifest_b".into()];
        manifest.packagings = vec![Packaging {
            kind: "BIG_BAG".into(),
            quantity: 3,
        }];
        manifest.emission_signature = Some(Signature::new("Jean Martin".into()));

        let (_, cbor) = manifest.serialize_with_hash().unwrap();
        let decoded: Manifest = minicbor::decode(&cbor).unwrap();

        assert_eq!(manifest, decoded);
        assert!(!decoded.is_awaiting(SignatureStage::Emission));
    }

    #[test]
    fn patch_apply_leaves_omitted_keys_alone() {
        let mut manifest = Manifest::new("manifest_test".into(), ManifestType::StandardCollection);
        manifest.emitter_company_name = Some("Demolition SA".into());
        manifest.weight_kg = Some(1200);

        let patch = ManifestPatch {
            waste_code: Some("17 06 05*".into()),
            ..Default::default()
        };
        patch.apply_to(&mut manifest);

        assert_eq!(manifest.waste_code.as_deref(), Some("17 06 05*"));
        assert_eq!(manifest.emitter_company_name.as_deref(), Some("Demolition SA"));
        assert_eq!(manifest.weight_kg, Some(1200));
    }
}
