//! Reconciliation of normalized batches into the registry.
//!
//! The registry holds exactly one [`Publication`] per [`IdentityKey`], in
//! insertion order. Merging a batch applies, per incoming record:
//!
//! 1. key absent → insert
//! 2. key present, same source → the incoming record replaces the existing one
//! 3. key present, different source → the record from the higher-precedence
//!    source is kept (`Excel > EuropePMC > OpenAlex`)
//!
//! When the key is absent, an OpenAlex record and an EuropePMC or Excel record
//! with the same title (case-insensitive) are treated as the same publication
//! for step 3, provided either side has no DOI. EuropePMC and Excel records are
//! never matched on title alone. Decisions are whole-record: fields are
//! never combined across records.

use crate::normalize::Batch;
use crate::publication::{title_key, IdentityKey, Publication, Source};
use indexmap::IndexMap;
use std::collections::HashMap;
use tracing::{debug, info, warn};

/// What happened to one incoming record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeOutcome {
    Inserted,
    Replaced { previous: Source },
    KeptExisting { existing: Source },
}

/// Per-batch merge counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MergeStats {
    pub source: Source,
    pub inserted: usize,
    pub replaced: usize,
    pub kept_existing: usize,
}

impl MergeStats {
    fn new(source: Source) -> Self {
        Self {
            source,
            inserted: 0,
            replaced: 0,
            kept_existing: 0,
        }
    }

    fn record(&mut self, outcome: MergeOutcome) {
        match outcome {
            MergeOutcome::Inserted => self.inserted += 1,
            MergeOutcome::Replaced { .. } => self.replaced += 1,
            MergeOutcome::KeptExisting { .. } => self.kept_existing += 1,
        }
    }
}

/// Whether `incoming` takes the place of a record from `existing`.
fn incoming_wins(existing: Source, incoming: Source) -> bool {
    existing == incoming || incoming.precedence() > existing.precedence()
}

/// Insertion-ordered map from identity key to canonical publication.
#[derive(Debug, Clone, Default)]
pub struct Registry {
    entries: IndexMap<IdentityKey, Publication>,
    /// lowercased title → keys of entries carrying it
    titles: HashMap<String, Vec<IdentityKey>>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild a registry from persisted records; the first record per key wins.
    pub fn from_publications(publications: impl IntoIterator<Item = Publication>) -> Self {
        let mut registry = Self::new();
        for publication in publications {
            let key = publication.identity_key();
            if registry.entries.contains_key(&key) {
                warn!(key = %key, "Duplicate identity key in persisted registry, keeping first");
                continue;
            }
            registry.insert_new(key, publication);
        }
        registry
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, key: &IdentityKey) -> Option<&Publication> {
        self.entries.get(key)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&IdentityKey, &Publication)> {
        self.entries.iter()
    }

    pub fn publications(&self) -> impl Iterator<Item = &Publication> {
        self.entries.values()
    }

    fn index_title(&mut self, key: &IdentityKey, title: &str) {
        self.titles
            .entry(title_key(title))
            .or_default()
            .push(key.clone());
    }

    fn unindex_title(&mut self, key: &IdentityKey, title: &str) {
        let title = title_key(title);
        if let Some(keys) = self.titles.get_mut(&title) {
            keys.retain(|k| k != key);
            if keys.is_empty() {
                self.titles.remove(&title);
            }
        }
    }

    fn insert_new(&mut self, key: IdentityKey, publication: Publication) {
        self.index_title(&key, &publication.title);
        self.entries.insert(key, publication);
    }

    /// Put `publication` in the slot held by `old_key`, keeping its position.
    fn replace(&mut self, old_key: &IdentityKey, new_key: IdentityKey, publication: Publication) {
        if *old_key == new_key {
            if let Some(slot) = self.entries.get_mut(old_key) {
                let old_title = std::mem::replace(slot, publication).title;
                let new_title = slot.title.clone();
                if title_key(&old_title) != title_key(&new_title) {
                    self.unindex_title(old_key, &old_title);
                    self.index_title(old_key, &new_title);
                }
            }
            return;
        }

        if let Some((index, _, old)) = self.entries.shift_remove_full(old_key) {
            self.unindex_title(old_key, &old.title);
            self.index_title(&new_key, &publication.title);
            self.entries.shift_insert(index, new_key, publication);
        }
    }

    /// Key of a same-titled record pairing OpenAlex with another source, where either side lacks a DOI.
    fn find_title_match(&self, publication: &Publication) -> Option<IdentityKey> {
        let keys = self.titles.get(&title_key(&publication.title))?;
        keys.iter()
            .find(|key| {
                self.entries.get(*key).is_some_and(|existing| {
                    existing.source != publication.source
                        && (existing.source == Source::OpenAlex
                            || publication.source == Source::OpenAlex)
                        && (!existing.has_doi() || !publication.has_doi())
                })
            })
            .cloned()
    }

    /// Merge one normalized record.
    pub fn merge_publication(&mut self, publication: Publication) -> MergeOutcome {
        let key = publication.identity_key();

        let matched = if self.entries.contains_key(&key) {
            Some(key.clone())
        } else {
            self.find_title_match(&publication)
        };

        let Some(existing_key) = matched else {
            debug!(key = %key, source = %publication.source, "Inserting new publication");
            self.insert_new(key, publication);
            return MergeOutcome::Inserted;
        };

        let existing = match self.entries.get(&existing_key) {
            Some(existing) => existing.source,
            None => {
                self.insert_new(key, publication);
                return MergeOutcome::Inserted;
            }
        };

        if incoming_wins(existing, publication.source) {
            debug!(
                key = %existing_key,
                previous = %existing,
                incoming = %publication.source,
                "Replacing publication"
            );
            self.replace(&existing_key, key, publication);
            MergeOutcome::Replaced { previous: existing }
        } else {
            debug!(
                key = %existing_key,
                existing = %existing,
                incoming = %publication.source,
                "Keeping higher-precedence publication"
            );
            MergeOutcome::KeptExisting { existing }
        }
    }

    /// Merge a whole batch, in batch order.
    pub fn merge(&mut self, batch: &Batch) -> MergeStats {
        let mut stats = MergeStats::new(batch.source);
        for publication in &batch.publications {
            let outcome = self.merge_publication(publication.clone());
            stats.record(outcome);
        }
        info!(
            source = %batch.source,
            inserted = stats.inserted,
            replaced = stats.replaced,
            kept_existing = stats.kept_existing,
            total = self.len(),
            "Merged batch"
        );
        stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    fn publication(title: &str, date: &str, doi: &str, source: Source) -> Publication {
        Publication {
            title: title.to_string(),
            authors: format!("{} authors", source),
            journal: String::new(),
            date: date.to_string(),
            doi: doi.to_string(),
            source,
        }
    }

    fn batch(source: Source, publications: Vec<Publication>) -> Batch {
        Batch {
            source,
            publications,
            skipped: Vec::new(),
        }
    }

    fn snapshot(registry: &Registry) -> Vec<(IdentityKey, Publication)> {
        registry.iter().map(|(k, p)| (k.clone(), p.clone())).collect()
    }

    fn assert_identity_invariant(registry: &Registry) {
        let mut seen = HashSet::new();
        for (key, publication) in registry.iter() {
            assert_eq!(*key, publication.identity_key());
            assert!(seen.insert(key.clone()), "duplicate key {}", key);
        }
    }

    #[test]
    fn test_merge_is_idempotent() {
        let mut registry = Registry::new();
        registry.merge(&batch(
            Source::Excel,
            vec![publication("Shared", "2023", "", Source::Excel)],
        ));

        let oa = batch(
            Source::OpenAlex,
            vec![
                publication("A", "2023-01-01", "10.1/a", Source::OpenAlex),
                publication("B", "2023", "", Source::OpenAlex),
                publication("A duplicate doi", "2023-01-01", "10.1/A", Source::OpenAlex),
                publication("shared", "2022", "10.1/shared", Source::OpenAlex),
            ],
        );
        registry.merge(&oa);
        let once = snapshot(&registry);
        let stats = registry.merge(&oa);

        assert_eq!(snapshot(&registry), once);
        assert_eq!(stats.inserted, 0);
        assert_identity_invariant(&registry);
    }

    #[test]
    fn test_excel_precedence_over_openalex() {
        let mut registry = Registry::new();
        let excel = publication("Curated", "2023-05-12", "10.1/x", Source::Excel);
        registry.merge(&batch(Source::Excel, vec![excel.clone()]));

        let stats = registry.merge(&batch(
            Source::OpenAlex,
            vec![publication("Different", "2020", "10.1/X", Source::OpenAlex)],
        ));

        assert_eq!(stats.kept_existing, 1);
        assert_eq!(registry.len(), 1);
        assert_eq!(registry.get(&IdentityKey::Doi("10.1/x".to_string())), Some(&excel));
    }

    #[test]
    fn test_higher_precedence_replaces_lower() {
        let mut registry = Registry::new();
        registry.merge(&batch(
            Source::OpenAlex,
            vec![publication("Old", "2023", "10.1/x", Source::OpenAlex)],
        ));
        let epmc = publication("New", "2023-02-02", "10.1/x", Source::EuropePmc);
        let outcome = registry.merge_publication(epmc.clone());

        assert_eq!(outcome, MergeOutcome::Replaced { previous: Source::OpenAlex });
        assert_eq!(registry.publications().collect::<Vec<_>>(), vec![&epmc]);
    }

    #[test]
    fn test_same_source_latest_wins() {
        let mut registry = Registry::new();
        registry.merge_publication(publication("Typo", "2023", "10.1/x", Source::EuropePmc));
        let fixed = publication("Fixed", "2023", "10.1/x", Source::EuropePmc);
        let outcome = registry.merge_publication(fixed.clone());

        assert_eq!(outcome, MergeOutcome::Replaced { previous: Source::EuropePmc });
        assert_eq!(registry.len(), 1);
        assert_eq!(registry.publications().next(), Some(&fixed));
        // title index follows the replacement
        assert!(registry.find_title_match(&publication("typo", "2023", "", Source::OpenAlex)).is_none());
        assert!(registry.find_title_match(&publication("FIXED", "2023", "", Source::OpenAlex)).is_some());
    }

    #[test]
    fn test_title_match_when_doi_missing() {
        let mut registry = Registry::new();
        registry.merge_publication(publication("Organoids", "2023-05-12", "10.1/x", Source::EuropePmc));

        // OpenAlex copy without DOI loses to EuropePMC
        let outcome =
            registry.merge_publication(publication("ORGANOIDS", "2023", "", Source::OpenAlex));
        assert_eq!(outcome, MergeOutcome::KeptExisting { existing: Source::EuropePmc });
        assert_eq!(registry.len(), 1);

        // Excel copy without DOI wins over an OpenAlex record and takes its slot
        registry.merge_publication(publication("Niche", "2022", "", Source::OpenAlex));
        let excel = publication("niche", "2022-03-01", "", Source::Excel);
        let outcome = registry.merge_publication(excel.clone());
        assert_eq!(outcome, MergeOutcome::Replaced { previous: Source::OpenAlex });
        assert_eq!(registry.len(), 2);
        assert_eq!(registry.publications().nth(1), Some(&excel));
        assert_identity_invariant(&registry);
    }

    #[test]
    fn test_excel_and_europepmc_never_title_match() {
        let mut registry = Registry::new();
        let epmc = publication("Editorial", "2019-03-01", "10.1/ed2019", Source::EuropePmc);
        registry.merge_publication(epmc.clone());

        let excel = publication("Editorial", "2024-11-20", "", Source::Excel);
        let outcome = registry.merge_publication(excel.clone());

        assert_eq!(outcome, MergeOutcome::Inserted);
        assert_eq!(registry.len(), 2);
        assert_eq!(registry.get(&IdentityKey::Doi("10.1/ed2019".to_string())), Some(&epmc));
        assert_eq!(registry.get(&excel.identity_key()), Some(&excel));
        assert_identity_invariant(&registry);
    }

    #[test]
    fn test_title_match_rekeys_in_place() {
        let mut registry = Registry::new();
        registry.merge_publication(publication("First", "2021", "10.1/first", Source::OpenAlex));
        registry.merge_publication(publication("Middle", "2022", "", Source::OpenAlex));
        registry.merge_publication(publication("Last", "2023", "10.1/last", Source::OpenAlex));

        registry.merge_publication(publication("middle", "2022-06-01", "10.1/middle", Source::EuropePmc));

        let titles: Vec<_> = registry.publications().map(|p| p.title.as_str()).collect();
        assert_eq!(titles, vec!["First", "middle", "Last"]);
        assert!(registry.get(&IdentityKey::Doi("10.1/middle".to_string())).is_some());
        assert_identity_invariant(&registry);
    }

    #[test]
    fn test_title_match_ignored_when_both_have_doi() {
        let mut registry = Registry::new();
        registry.merge_publication(publication("Same title", "2023", "10.1/a", Source::EuropePmc));
        let outcome =
            registry.merge_publication(publication("Same title", "2023", "10.1/b", Source::OpenAlex));

        assert_eq!(outcome, MergeOutcome::Inserted);
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn test_title_match_ignored_within_same_source() {
        let mut registry = Registry::new();
        registry.merge_publication(publication("Same title", "2022", "", Source::OpenAlex));
        let outcome =
            registry.merge_publication(publication("Same title", "2023", "", Source::OpenAlex));

        assert_eq!(outcome, MergeOutcome::Inserted);
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn test_from_publications_keeps_first_duplicate() {
        let first = publication("A", "2023", "10.1/a", Source::Excel);
        let registry = Registry::from_publications(vec![
            first.clone(),
            publication("A again", "2023", "10.1/A", Source::OpenAlex),
            publication("B", "2023", "", Source::OpenAlex),
        ]);

        assert_eq!(registry.len(), 2);
        assert_eq!(registry.publications().next(), Some(&first));
    }
}
