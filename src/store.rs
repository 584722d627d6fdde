use chrono::NaiveDate;
use tracing::debug;

use crate::error::{ReportError, Result};
use crate::types::{DetentionRecord, Dimension, LoadingRecord};

/// Query used by the comparative reports: a date range plus an optional
/// single dimension value.
#[derive(Debug, Clone, PartialEq)]
pub struct LoadingFilter {
    pub date_from: NaiveDate,
    pub date_to: NaiveDate,
    pub dimension: Option<(Dimension, String)>,
}

impl LoadingFilter {
    pub fn matches(&self, record: &LoadingRecord) -> bool {
        if record.date < self.date_from || record.date > self.date_to {
            return false;
        }
        match &self.dimension {
            Some((dimension, value)) => record.dimension_value(*dimension) == value.trim(),
            None => true,
        }
    }
}

/// Storage seam for the report service. Updates are last-write-wins.
pub trait RecordStore {
    fn query_loading_records(&self, filter: &LoadingFilter) -> Result<Vec<LoadingRecord>>;
    fn query_detention_records(&self) -> Result<Vec<DetentionRecord>>;

    fn insert_loading(&mut self, record: LoadingRecord) -> Result<u64>;
    fn update_loading(&mut self, record: LoadingRecord) -> Result<()>;
    fn get_loading(&self, id: u64) -> Option<LoadingRecord>;

    fn insert_detention(&mut self, record: DetentionRecord) -> Result<u64>;
    fn update_detention(&mut self, record: DetentionRecord) -> Result<()>;
}

#[derive(Debug, Default)]
pub struct InMemoryStore {
    loading: Vec<LoadingRecord>,
    detention: Vec<DetentionRecord>,
    next_id: u64,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_records(loading: Vec<LoadingRecord>, detention: Vec<DetentionRecord>) -> Self {
        let mut store = Self::new();
        for r in loading {
            store.push_loading(r);
        }
        for r in detention {
            store.push_detention(r);
        }
        store
    }

    pub fn loading_len(&self) -> usize {
        self.loading.len()
    }

    pub fn detention_len(&self) -> usize {
        self.detention.len()
    }

    fn allocate_id(&mut self) -> u64 {
        self.next_id += 1;
        self.next_id
    }

    fn push_loading(&mut self, mut record: LoadingRecord) -> u64 {
        record.id = self.allocate_id();
        let id = record.id;
        self.loading.push(record);
        id
    }

    fn push_detention(&mut self, mut record: DetentionRecord) -> u64 {
        record.id = self.allocate_id();
        let id = record.id;
        self.detention.push(record);
        id
    }
}

impl RecordStore for InMemoryStore {
    fn query_loading_records(&self, filter: &LoadingFilter) -> Result<Vec<LoadingRecord>> {
        let rows: Vec<LoadingRecord> = self
            .loading
            .iter()
            .filter(|r| filter.matches(r))
            .cloned()
            .collect();
        debug!(
            from = %filter.date_from,
            to = %filter.date_to,
            rows = rows.len(),
            "queried loading records"
        );
        Ok(rows)
    }

    fn query_detention_records(&self) -> Result<Vec<DetentionRecord>> {
        Ok(self.detention.clone())
    }

    fn insert_loading(&mut self, record: LoadingRecord) -> Result<u64> {
        Ok(self.push_loading(record))
    }

    fn update_loading(&mut self, record: LoadingRecord) -> Result<()> {
        let slot = self
            .loading
            .iter_mut()
            .find(|r| r.id == record.id)
            .ok_or(ReportError::RecordNotFound {
                kind: "loading",
                id: record.id,
            })?;
        *slot = record;
        Ok(())
    }

    fn get_loading(&self, id: u64) -> Option<LoadingRecord> {
        self.loading.iter().find(|r| r.id == id).cloned()
    }

    fn insert_detention(&mut self, record: DetentionRecord) -> Result<u64> {
        Ok(self.push_detention(record))
    }

    fn update_detention(&mut self, record: DetentionRecord) -> Result<()> {
        let slot = self
            .detention
            .iter_mut()
            .find(|r| r.id == record.id)
            .ok_or(ReportError::RecordNotFound {
                kind: "detention",
                id: record.id,
            })?;
        *slot = record;
        Ok(())
    }
}
