//! Canonical vocabularies and their mappings from provider codes.

use serde::{Deserialize, Serialize};

/// Canonical vocabularies referenced by processed observations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum VocabularyId {
    Activity,
    Biotope,
    Sex,
    LifeStage,
    Substrate,
    Unit,
    VerificationStatus,
    DiscoveryMethod,
    DeterminationMethod,
    Institution,
}

/// Source systems whose codes are mapped onto canonical ids.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ExternalSystem {
    Artportalen,
    DarwinCore,
}

/// A canonical value with its translations.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VocabularyEntry {
    pub id: i32,
    pub value: String,
}

/// Maps one external code onto one canonical id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MappingValue {
    pub value: i32,
    pub sos_id: i32,
}

/// Mapping table for one external system.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExternalSystemMapping {
    pub external_system: ExternalSystem,
    pub values: Vec<MappingValue>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Vocabulary {
    pub id: VocabularyId,
    pub name: String,
    pub values: Vec<VocabularyEntry>,
    pub external_system_mappings: Vec<ExternalSystemMapping>,
}

impl Vocabulary {
    /// Mapping table for `system`, if the vocabulary has one.
    pub fn mapping_for(&self, system: ExternalSystem) -> Option<&ExternalSystemMapping> {
        self.external_system_mappings
            .iter()
            .find(|m| m.external_system == system)
    }
}

/// A resolved vocabulary reference on a processed observation.
///
/// `id` is the canonical id, or [`VocabularyValue::NO_MAPPING_FOUND`] with
/// the source text kept in `value`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VocabularyValue {
    pub id: i32,
    pub value: Option<String>,
}

impl VocabularyValue {
    pub const NO_MAPPING_FOUND: i32 = -1;

    pub fn mapped(id: i32) -> Self {
        Self { id, value: None }
    }

    pub fn unmapped(value: impl Into<String>) -> Self {
        Self {
            id: Self::NO_MAPPING_FOUND,
            value: Some(value.into()),
        }
    }

    pub fn is_mapped(&self) -> bool {
        self.id != Self::NO_MAPPING_FOUND
    }
}
