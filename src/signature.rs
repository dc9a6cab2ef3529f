//! Signature stages, slots and the awaiting-signature ledger queries
use crate::manifest::{Manifest, TimeStamp};
use chrono::Utc;

/// Ordered signature hierarchy. Each stage points at the next one; the
/// order is total and fixed.
#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, Copy, Eq, PartialEq, PartialOrd, Ord, Hash)]
pub enum SignatureStage {
    #[n(0)]
    Emission,
    #[n(1)]
    Work,
    #[n(2)]
    Transport,
    #[n(3)]
    Operation,
}

impl SignatureStage {
    /// Every stage in hierarchy order.
    pub const ALL: [SignatureStage; 4] = [
        SignatureStage::Emission,
        SignatureStage::Work,
        SignatureStage::Transport,
        SignatureStage::Operation,
    ];

    pub fn next(self) -> Option<SignatureStage> {
        match self {
            SignatureStage::Emission => Some(SignatureStage::Work),
            SignatureStage::Work => Some(SignatureStage::Transport),
            SignatureStage::Transport => Some(SignatureStage::Operation),
            SignatureStage::Operation => None,
        }
    }

    pub fn parent(self) -> Option<SignatureStage> {
        match self {
            SignatureStage::Emission => None,
            SignatureStage::Work => Some(SignatureStage::Emission),
            SignatureStage::Transport => Some(SignatureStage::Work),
            SignatureStage::Operation => Some(SignatureStage::Transport),
        }
    }

    /// The stage itself followed by everything before it, closest first.
    /// Used whenever all signatures up to and including the current one
    /// must be checked: a skipped stage still gets its rules evaluated
    /// because a later signature seals it too.
    pub fn ancestors(self) -> Vec<SignatureStage> {
        let mut stages = vec![self];
        let mut cursor = self;
        while let Some(parent) = cursor.parent() {
            stages.push(parent);
            cursor = parent;
        }
        stages
    }
}

/// A filled signature slot. Slots only ever go from empty to filled;
/// filling one is the only way time moves forward in the ledger.
#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, PartialEq)]
pub struct Signature {
    #[n(0)]
    pub author: String,
    #[n(1)]
    pub signed_at: TimeStamp<Utc>,
}

impl Signature {
    pub fn new(author: String) -> Self {
        Self {
            author,
            signed_at: TimeStamp::new(),
        }
    }
}

impl Manifest {
    pub fn signature(&self, stage: SignatureStage) -> Option<&Signature> {
        match stage {
            SignatureStage::Emission => self.emission_signature.as_ref(),
            SignatureStage::Work => self.work_signature.as_ref(),
            SignatureStage::Transport => self.transport_signature.as_ref(),
            SignatureStage::Operation => self.operation_signature.as_ref(),
        }
    }

    pub fn set_signature(&mut self, stage: SignatureStage, signature: Signature) {
        let slot = match stage {
            SignatureStage::Emission => &mut self.emission_signature,
            SignatureStage::Work => &mut self.work_signature,
            SignatureStage::Transport => &mut self.transport_signature,
            SignatureStage::Operation => &mut self.operation_signature,
        };
        *slot = Some(signature);
    }

    /// Recursive skip-aware query: a stage is still awaited only while its
    /// own slot is empty and every later stage is also still awaited. A
    /// later real signature retroactively closes a skipped earlier stage.
    pub fn is_awaiting(&self, stage: SignatureStage) -> bool {
        if self.signature(stage).is_some() {
            return false;
        }
        match stage.next() {
            Some(next) => self.is_awaiting(next),
            None => true,
        }
    }
}

/// The stages whose sealing and requirement rules apply to one validation
/// pass. When signing, everything up to and including the target stage;
/// otherwise everything up to the deepest stage no longer awaited. Empty
/// for an unsigned draft.
pub fn stages_to_check(manifest: &Manifest, target: Option<SignatureStage>) -> Vec<SignatureStage> {
    if let Some(stage) = target {
        return stage.ancestors();
    }
    SignatureStage::ALL
        .into_iter()
        .rev()
        .find(|stage| !manifest.is_awaiting(*stage))
        .map(|stage| stage.ancestors())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::manifest::ManifestType;

    #[test]
    fn stage_chain_is_total() {
        let mut cursor = Some(SignatureStage::Emission);
        let mut walked = vec![];
        while let Some(stage) = cursor {
            walked.push(stage);
            cursor = stage.next();
        }
        assert_eq!(walked, SignatureStage::ALL);
    }

    #[test]
    fn ancestors_walk_back_to_emission() {
        assert_eq!(
            SignatureStage::Transport.ancestors(),
            vec![
                SignatureStage::Transport,
                SignatureStage::Work,
                SignatureStage::Emission
            ]
        );
        assert_eq!(SignatureStage::Emission.ancestors(), vec![SignatureStage::Emission]);
    }

    #[test]
    fn later_signature_closes_skipped_stages() {
        let mut manifest = Manifest::new("manifest_test".into(), ManifestType::Grouping);
        assert!(manifest.is_awaiting(SignatureStage::Emission));

        manifest.set_signature(SignatureStage::Transport, Signature::new("A. Driver".into()));

        assert!(!manifest.is_awaiting(SignatureStage::Emission));
        assert!(!manifest.is_awaiting(SignatureStage::Work));
        assert!(!manifest.is_awaiting(SignatureStage::Transport));
        assert!(manifest.is_awaiting(SignatureStage::Operation));
    }

    #[test]
    fn stages_to_check_follows_deepest_signature() {
        let mut manifest = Manifest::new("manifest_test".into(), ManifestType::StandardCollection);
        assert!(stages_to_check(&manifest, None).is_empty());

        manifest.set_signature(SignatureStage::Emission, Signature::new("E. Producer".into()));
        assert_eq!(
            stages_to_check(&manifest, None),
            vec![SignatureStage::Emission]
        );

        assert_eq!(
            stages_to_check(&manifest, Some(SignatureStage::Work)),
            vec![SignatureStage::Work, SignatureStage::Emission]
        );
    }
}
