// Memoizing cache for source reads
//
// Key = (source id, sheet or dataset). Each slot remembers the content
// fingerprint it was read at: a matching fingerprint is served from memory, a
// changed one re-reads and replaces the slot. Failed reads are never cached.

use crate::error::Result;
use crate::remote::{fetch_all, PagedRecordSource, RemoteRecord};
use crate::sources::TabularSource;
use crate::table::RawTable;
use std::collections::HashMap;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct CacheKey {
    source: String,
    name: String,
}

#[derive(Debug, Clone)]
struct Slot<T> {
    fingerprint: Option<String>,
    value: T,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: usize,
    pub misses: usize,
}

#[derive(Debug, Default)]
pub struct TableCache {
    tables: HashMap<CacheKey, Slot<RawTable>>,
    records: HashMap<CacheKey, Slot<Vec<RemoteRecord>>>,
    stats: CacheStats,
}

/// Stored value when the slot was filled at this fingerprint
fn lookup<'a, T>(
    map: &'a HashMap<CacheKey, Slot<T>>,
    key: &CacheKey,
    fingerprint: &Option<String>,
) -> Option<&'a T> {
    map.get(key)
        .filter(|slot| slot.fingerprint == *fingerprint)
        .map(|slot| &slot.value)
}

impl TableCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Read a sheet, or return the stored copy for an unchanged source
    pub fn read_sheet(&mut self, source: &dyn TabularSource, sheet: &str) -> Result<RawTable> {
        let key = CacheKey {
            source: source.source_id().to_string(),
            name: sheet.to_string(),
        };
        let fingerprint = source.fingerprint();

        if let Some(table) = lookup(&self.tables, &key, &fingerprint) {
            self.stats.hits += 1;
            tracing::debug!(source = %key.source, sheet, "cache hit");
            return Ok(table.clone());
        }

        self.stats.misses += 1;
        let table = source.read_sheet(sheet)?;
        self.tables.insert(
            key,
            Slot {
                fingerprint,
                value: table.clone(),
            },
        );
        Ok(table)
    }

    /// Fetch every page of a dataset, or return the stored records
    pub fn fetch_all(
        &mut self,
        source: &dyn PagedRecordSource,
        dataset: &str,
    ) -> Result<Vec<RemoteRecord>> {
        let key = CacheKey {
            source: source.source_id().to_string(),
            name: dataset.to_string(),
        };
        let fingerprint = source.fingerprint(dataset);

        if let Some(records) = lookup(&self.records, &key, &fingerprint) {
            self.stats.hits += 1;
            tracing::debug!(source = %key.source, dataset, "cache hit");
            return Ok(records.clone());
        }

        self.stats.misses += 1;
        let records = fetch_all(source, dataset)?;
        self.records.insert(
            key,
            Slot {
                fingerprint,
                value: records.clone(),
            },
        );
        Ok(records)
    }

    pub fn stats(&self) -> CacheStats {
        self.stats
    }

    pub fn len(&self) -> usize {
        self.tables.len() + self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&mut self) {
        self.tables.clear();
        self.records.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::PipelineError;
    use crate::remote::RecordPage;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingSource {
        reads: AtomicUsize,
        version: AtomicUsize,
    }

    impl CountingSource {
        fn new() -> Self {
            CountingSource {
                reads: AtomicUsize::new(0),
                version: AtomicUsize::new(1),
            }
        }
    }

    impl TabularSource for CountingSource {
        fn source_id(&self) -> &str {
            "counting"
        }

        fn read_sheet(&self, sheet: &str) -> Result<RawTable> {
            self.reads.fetch_add(1, Ordering::SeqCst);
            if sheet == "missing" {
                return Err(PipelineError::source_read("counting", "sheet 'missing' not found"));
            }
            Ok(RawTable::from_strings(sheet, vec![vec!["x"]]))
        }

        fn sheet_names(&self) -> Result<Vec<String>> {
            Ok(vec!["CX".to_string()])
        }

        fn fingerprint(&self) -> Option<String> {
            Some(format!("v{}", self.version.load(Ordering::SeqCst)))
        }
    }

    impl PagedRecordSource for CountingSource {
        fn source_id(&self) -> &str {
            "counting"
        }

        fn query(&self, _dataset: &str, _cursor: Option<&str>) -> Result<RecordPage> {
            self.reads.fetch_add(1, Ordering::SeqCst);
            Ok(RecordPage::default())
        }

        fn fingerprint(&self, _dataset: &str) -> Option<String> {
            Some(format!("v{}", self.version.load(Ordering::SeqCst)))
        }
    }

    #[test]
    fn test_identical_reads_hit_cache() {
        let source = CountingSource::new();
        let mut cache = TableCache::new();

        let first = cache.read_sheet(&source, "CX").unwrap();
        let second = cache.read_sheet(&source, "CX").unwrap();

        assert_eq!(first, second);
        assert_eq!(source.reads.load(Ordering::SeqCst), 1);
        assert_eq!(cache.stats(), CacheStats { hits: 1, misses: 1 });
    }

    #[test]
    fn test_changed_fingerprint_rereads_and_replaces() {
        let source = CountingSource::new();
        let mut cache = TableCache::new();

        cache.read_sheet(&source, "CX").unwrap();
        source.version.store(2, Ordering::SeqCst);
        cache.read_sheet(&source, "CX").unwrap();

        assert_eq!(source.reads.load(Ordering::SeqCst), 2);
        assert_eq!(cache.len(), 1);

        // The replaced slot serves the new version
        cache.read_sheet(&source, "CX").unwrap();
        assert_eq!(source.reads.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_repeated_edits_keep_one_slot_per_sheet() {
        let source = CountingSource::new();
        let mut cache = TableCache::new();

        for version in 1..=50 {
            source.version.store(version, Ordering::SeqCst);
            cache.read_sheet(&source, "CX").unwrap();
            cache.fetch_all(&source, "Tabela A").unwrap();
        }

        assert_eq!(cache.len(), 2);
        assert_eq!(cache.stats().misses, 100);
    }

    #[test]
    fn test_errors_are_not_cached() {
        let source = CountingSource::new();
        let mut cache = TableCache::new();

        assert!(cache.read_sheet(&source, "missing").is_err());
        assert!(cache.read_sheet(&source, "missing").is_err());
        assert_eq!(source.reads.load(Ordering::SeqCst), 2);
        assert!(cache.is_empty());
    }

    #[test]
    fn test_remote_fetch_is_memoized() {
        let source = CountingSource::new();
        let mut cache = TableCache::new();

        cache.fetch_all(&source, "Tabela A").unwrap();
        cache.fetch_all(&source, "Tabela A").unwrap();
        cache.fetch_all(&source, "Tabela B").unwrap();

        assert_eq!(source.reads.load(Ordering::SeqCst), 2);
        cache.clear();
        assert!(cache.is_empty());
    }
}
