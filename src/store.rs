//! Thin typed facade over the trade-document store. See spec §4.G/§7.
//!
//! `sled` stands in for the external relational store (spec §1). Its own
//! transactional tree API (`Transactional::transaction`) supplies the
//! "serializable, read-write transaction" spec §4.F.3 calls for: within one
//! `append_version` call, the check of the previous version and the insert
//! of the new one happen atomically, so two racing mutations on the same
//! pack id can't both succeed (spec §5).

use std::sync::Arc;

use sled::transaction::{ConflictableTransactionError, TransactionError};
use sled::{Db, Transactional, Tree};

use crate::config::StoreConfig;
use crate::error::EblError;
use crate::meta::{MetaBucket, Metadata};

pub const KIND_FILE_BASED_BILL_OF_LADING: &str = "FileBasedBillOfLading";

/// One persisted pack version, mirroring the persistence row of spec §7
/// (`raw_id` is the sled key this row is filed under, computed by the
/// caller as the envelope's content hash — see `envelope::Envelope::document_id`).
#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, PartialEq, Eq)]
pub struct TradeDocument {
    #[n(0)]
    pub raw_id: String,
    #[n(1)]
    pub kind: String,
    #[n(2)]
    pub doc_id: String,
    #[n(3)]
    pub doc_version: u64,
    #[n(4)]
    pub envelope: Vec<u8>,
    #[n(5)]
    pub created_at: i64,
    #[n(6)]
    pub meta: Metadata,
}

/// Filters `list_trade_document` per spec §4.G: always scoped to `kind`,
/// optionally to a set of `doc_id`s and to a single meta bucket containing
/// `business_unit`, with offset/limit pagination.
#[derive(Debug, Clone)]
pub struct ListFilter {
    pub kind: String,
    pub doc_ids: Option<Vec<String>>,
    pub bucket: Option<(MetaBucket, crate::ids::Did)>,
    pub offset: usize,
    pub limit: usize,
}

impl ListFilter {
    pub fn new(kind: impl Into<String>) -> Self {
        ListFilter {
            kind: kind.into(),
            doc_ids: None,
            bucket: None,
            offset: 0,
            limit: usize::MAX,
        }
    }
}

/// Result of a `list_trade_document` call: the page requested by
/// `filter.offset`/`filter.limit`, plus the total count of documents that
/// matched `filter` before pagination was applied (mirrors the original's
/// `ListTradeDocumentResponse{Total, Docs}`).
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ListTradeDocumentResult {
    pub total: usize,
    pub docs: Vec<TradeDocument>,
}

/// Trade-document store plus BU directory stand-in: the two shared,
/// transactional resources the Controller depends on (spec §5). Only the
/// store half lives here; `crate::bu_directory::BuDirectory` is the other.
pub trait Store: Send + Sync {
    /// Latest version for `doc_id`, or `None` if never created.
    fn get_latest(&self, doc_id: &str) -> Result<Option<TradeDocument>, EblError>;

    /// Atomically checks that the current latest version of `doc.doc_id`
    /// still equals `expected_previous_version` (`None` for `Create`, where
    /// no row may yet exist) and, if so, inserts `doc` as the new latest
    /// version. Fails with [`EblError::StorageConflict`] if another writer
    /// already advanced the pack past `expected_previous_version` --
    /// callers may retry (spec §5), this store never retries internally.
    fn append_version(
        &self,
        expected_previous_version: Option<u64>,
        doc: TradeDocument,
    ) -> Result<(), EblError>;

    fn list_trade_document(
        &self,
        filter: &ListFilter,
    ) -> Result<ListTradeDocumentResult, EblError>;
}

/// `sled`-backed implementation. Three namespaces: `versions` keyed by
/// `{doc_id}\0{version:020}`, `latest` keyed by `doc_id` holding the current
/// version number, and `raw_ids` keyed by `raw_id` guarding against the
/// duplicate-insert case spec §4.G allows a store to reject.
pub struct SledStore {
    db: Arc<Db>,
    versions: Tree,
    latest: Tree,
    raw_ids: Tree,
}

impl SledStore {
    pub fn open(config: &StoreConfig) -> Result<Self, EblError> {
        let db = sled::open(&config.path)?;
        if let Some(ms) = config.flush_every_ms {
            log::debug!("sled flush_every_ms configured at {ms}ms (caller owns the flush loop)");
        }
        Self::from_db(Arc::new(db))
    }

    pub fn from_db(db: Arc<Db>) -> Result<Self, EblError> {
        let versions = db.open_tree("ebl_versions")?;
        let latest = db.open_tree("ebl_latest")?;
        let raw_ids = db.open_tree("ebl_raw_ids")?;
        Ok(SledStore {
            db,
            versions,
            latest,
            raw_ids,
        })
    }

    fn version_key(doc_id: &str, version: u64) -> Vec<u8> {
        let mut key = doc_id.as_bytes().to_vec();
        key.push(0);
        key.extend_from_slice(&version.to_be_bytes());
        key
    }

    pub fn flush(&self) -> Result<(), EblError> {
        self.db.flush()?;
        Ok(())
    }
}

impl Store for SledStore {
    fn get_latest(&self, doc_id: &str) -> Result<Option<TradeDocument>, EblError> {
        let Some(version_bytes) = self.latest.get(doc_id.as_bytes())? else {
            return Ok(None);
        };
        let version = u64::from_be_bytes(version_bytes.as_ref().try_into().map_err(|_| {
            EblError::StorageFailed("corrupt latest-version pointer".into())
        })?);
        let key = Self::version_key(doc_id, version);
        let Some(row_bytes) = self.versions.get(&key)? else {
            return Ok(None);
        };
        Ok(Some(minicbor::decode(&row_bytes)?))
    }

    fn append_version(
        &self,
        expected_previous_version: Option<u64>,
        doc: TradeDocument,
    ) -> Result<(), EblError> {
        let doc_id = doc.doc_id.clone();
        let raw_id = doc.raw_id.clone();
        let row_bytes = minicbor::to_vec(&doc)?;
        let key = Self::version_key(&doc_id, doc.doc_version);

        let result: Result<(), TransactionError<EblError>> =
            (&self.versions, &self.latest, &self.raw_ids).transaction(
                |(versions, latest, raw_ids)| {
                    let current = latest.get(doc_id.as_bytes())?;
                    let current_version = current
                        .as_ref()
                        .map(|bytes| u64::from_be_bytes(bytes.as_ref().try_into().unwrap()));

                    if current_version != expected_previous_version {
                        log::warn!(
                            "append_version conflict on {doc_id}: expected {:?}, found {:?}",
                            expected_previous_version,
                            current_version
                        );
                        return Err(ConflictableTransactionError::Abort(
                            EblError::StorageConflict,
                        ));
                    }

                    if raw_ids.get(raw_id.as_bytes())?.is_some() {
                        return Err(ConflictableTransactionError::Abort(
                            EblError::StorageFailed(format!("duplicate raw_id {raw_id}")),
                        ));
                    }

                    versions.insert(key.clone(), row_bytes.clone())?;
                    latest.insert(doc_id.as_bytes(), &doc.doc_version.to_be_bytes())?;
                    raw_ids.insert(raw_id.as_bytes(), doc_id.as_bytes())?;

                    Ok(())
                },
            );

        result.map_err(EblError::from)?;
        log::debug!("committed version {} of pack {}", doc.doc_version, doc.doc_id);
        Ok(())
    }

    fn list_trade_document(
        &self,
        filter: &ListFilter,
    ) -> Result<ListTradeDocumentResult, EblError> {
        let mut matches = Vec::new();

        for entry in self.versions.iter() {
            let (_, row_bytes) = entry?;
            let row: TradeDocument = minicbor::decode(&row_bytes)?;

            if row.kind != filter.kind {
                continue;
            }
            if let Some(doc_ids) = &filter.doc_ids {
                if !doc_ids.contains(&row.doc_id) {
                    continue;
                }
            }

            // Only the latest version of a pack is ever listed.
            let Some(latest_version_bytes) = self.latest.get(row.doc_id.as_bytes())? else {
                continue;
            };
            let latest_version = u64::from_be_bytes(
                latest_version_bytes
                    .as_ref()
                    .try_into()
                    .map_err(|_| EblError::StorageFailed("corrupt latest-version pointer".into()))?,
            );
            if row.doc_version != latest_version {
                continue;
            }

            if let Some((bucket, bu)) = &filter.bucket {
                if !row.meta.contains(*bucket, bu) {
                    continue;
                }
            }

            matches.push(row);
        }

        matches.sort_by(|a, b| a.doc_id.cmp(&b.doc_id));
        let total = matches.len();
        let docs = matches
            .into_iter()
            .skip(filter.offset)
            .take(filter.limit)
            .collect();
        Ok(ListTradeDocumentResult { total, docs })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ids::Did;

    fn store() -> SledStore {
        let db = sled::Config::new().temporary(true).open().unwrap();
        SledStore::from_db(Arc::new(db)).unwrap()
    }

    fn doc(doc_id: &str, version: u64, bucket_bu: Option<&str>) -> TradeDocument {
        let mut meta = Metadata::default();
        if let Some(bu) = bucket_bu {
            meta.action_needed.push(Did::new(bu));
        }
        TradeDocument {
            raw_id: format!("raw-{doc_id}-{version}"),
            kind: KIND_FILE_BASED_BILL_OF_LADING.to_string(),
            doc_id: doc_id.to_string(),
            doc_version: version,
            envelope: vec![1, 2, 3],
            created_at: 0,
            meta,
        }
    }

    #[test]
    fn create_then_get_latest_round_trips() {
        let store = store();
        store.append_version(None, doc("p1", 1, None)).unwrap();
        let latest = store.get_latest("p1").unwrap().unwrap();
        assert_eq!(latest.doc_version, 1);
    }

    #[test]
    fn append_rejects_stale_expected_version() {
        let store = store();
        store.append_version(None, doc("p1", 1, None)).unwrap();
        let err = store.append_version(None, doc("p1", 2, None)).unwrap_err();
        assert!(matches!(err, EblError::StorageConflict));
    }

    #[test]
    fn append_accepts_correct_expected_version() {
        let store = store();
        store.append_version(None, doc("p1", 1, None)).unwrap();
        store.append_version(Some(1), doc("p1", 2, None)).unwrap();
        assert_eq!(store.get_latest("p1").unwrap().unwrap().doc_version, 2);
    }

    #[test]
    fn duplicate_raw_id_rejected() {
        let store = store();
        let mut d1 = doc("p1", 1, None);
        d1.raw_id = "same".into();
        store.append_version(None, d1.clone()).unwrap();

        let mut d2 = doc("p2", 1, None);
        d2.raw_id = "same".into();
        let err = store.append_version(None, d2).unwrap_err();
        assert!(matches!(err, EblError::StorageFailed(_)));
    }

    #[test]
    fn list_filters_by_bucket_membership() {
        let store = store();
        store
            .append_version(None, doc("p1", 1, Some("did:ex:s")))
            .unwrap();
        store
            .append_version(None, doc("p2", 1, Some("did:ex:other")))
            .unwrap();

        let filter = ListFilter {
            bucket: Some((MetaBucket::ActionNeeded, Did::new("did:ex:s"))),
            ..ListFilter::new(KIND_FILE_BASED_BILL_OF_LADING)
        };
        let results = store.list_trade_document(&filter).unwrap();
        assert_eq!(results.total, 1);
        assert_eq!(results.docs[0].doc_id, "p1");
    }

    #[test]
    fn list_only_returns_latest_version() {
        let store = store();
        store.append_version(None, doc("p1", 1, None)).unwrap();
        store.append_version(Some(1), doc("p1", 2, None)).unwrap();

        let results = store
            .list_trade_document(&ListFilter::new(KIND_FILE_BASED_BILL_OF_LADING))
            .unwrap();
        assert_eq!(results.total, 1);
        assert_eq!(results.docs[0].doc_version, 2);
    }

    #[test]
    fn list_respects_offset_and_limit() {
        let store = store();
        store.append_version(None, doc("p1", 1, None)).unwrap();
        store.append_version(None, doc("p2", 1, None)).unwrap();
        store.append_version(None, doc("p3", 1, None)).unwrap();

        let filter = ListFilter {
            offset: 1,
            limit: 1,
            ..ListFilter::new(KIND_FILE_BASED_BILL_OF_LADING)
        };
        let results = store.list_trade_document(&filter).unwrap();
        assert_eq!(results.total, 3);
        assert_eq!(results.docs.len(), 1);
        assert_eq!(results.docs[0].doc_id, "p2");
    }
}
