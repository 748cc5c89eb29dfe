//! Resolution of Artportalen codes into canonical vocabulary values.

use std::collections::HashMap;

use crate::AppError;
use crate::metadata::{Metadata, SWEDISH};
use crate::models::{ExternalSystem, Vocabulary, VocabularyId, VocabularyValue};
use crate::traits::VocabularySource;

/// Per-vocabulary lookup of Artportalen code to canonical id.
#[derive(Debug, Clone, Default)]
pub struct VocabularyResolver {
    mappings: HashMap<VocabularyId, HashMap<i32, i32>>,
}

impl VocabularyResolver {
    /// Builds the lookup tables from the Artportalen mappings of each vocabulary.
    pub fn new(vocabularies: &[Vocabulary]) -> Self {
        let mappings = vocabularies
            .iter()
            .filter_map(|vocabulary| {
                let mapping = vocabulary.mapping_for(ExternalSystem::Artportalen)?;
                let table = mapping
                    .values
                    .iter()
                    .map(|m| (m.value, m.sos_id))
                    .collect();
                Some((vocabulary.id, table))
            })
            .collect();
        Self { mappings }
    }

    pub async fn load<V: VocabularySource>(source: &V) -> Result<Self, AppError> {
        let vocabularies = source.get_all().await?;
        Ok(Self::new(&vocabularies))
    }

    /// Canonical id of a source code, if one is mapped.
    pub fn sos_id(&self, vocabulary: VocabularyId, source_id: i32) -> Option<i32> {
        self.mappings
            .get(&vocabulary)
            .and_then(|table| table.get(&source_id))
            .copied()
    }

    /// Resolves a source code into a vocabulary value.
    ///
    /// - No code at all: `default_id` when given, otherwise `None`.
    /// - Mapped code: the canonical id.
    /// - Unmapped code with `set_null_if_no_mapping`: `None`.
    /// - Unmapped code otherwise: [`VocabularyValue::NO_MAPPING_FOUND`] with
    ///   the Swedish text, so the source value is never lost.
    pub fn get_sos_id_from_metadata(
        &self,
        metadata: Option<&Metadata>,
        vocabulary: VocabularyId,
        default_id: Option<i32>,
        set_null_if_no_mapping: bool,
    ) -> Option<VocabularyValue> {
        let Some(metadata) = metadata else {
            return default_id.map(VocabularyValue::mapped);
        };

        if let Some(sos_id) = self.sos_id(vocabulary, metadata.id) {
            return Some(VocabularyValue::mapped(sos_id));
        }
        if set_null_if_no_mapping {
            return None;
        }

        let text = metadata
            .translate(SWEDISH)
            .map(str::to_string)
            .unwrap_or_else(|| metadata.id.to_string());
        Some(VocabularyValue::unmapped(text))
    }
}
