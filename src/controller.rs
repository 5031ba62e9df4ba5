//! Orchestrates every mutating eBL action: validate shape, check the acting
//! business units exist and are active, load and verify the previous
//! version, run the state machine, build and sign the new pack version, and
//! persist it under a single serializable transaction. See spec §4.F.

use std::sync::Arc;

use crate::bu_directory::BuDirectory;
use crate::envelope::Envelope;
use crate::error::EblError;
use crate::ids::{new_bech32_id, Did};
use crate::meta::{self, MetaBucket};
use crate::pack::{
    DocumentParty, DocumentStatus, Event, FileRef, Location, Pack, PartyFunction,
    ShippingInstruction, TimeStamp, TransportDocument,
};
use crate::state_machine::{self, Action};
use crate::store::{ListFilter, ListTradeDocumentResult, Store, TradeDocument};

pub const KIND_FILE_BASED_BILL_OF_LADING: &str = "FileBasedBillOfLading";

/// Shared document fields carried by both `Create` and `UpdateDraft` --
/// everything needed to build the pack's `BillOfLading` event. Mirrors the
/// original's `IssueFileBasedEBLRequest`.
#[derive(Debug, Clone)]
pub struct BillOfLadingFields {
    pub file: FileRef,
    pub bl_number: String,
    pub to_order: bool,
    pub pol: Location,
    pub pod: Location,
    pub eta: Option<TimeStamp>,
    pub shipper: Did,
    pub consignee: Did,
    pub release_agent: Did,
    pub note: String,
}

#[derive(Debug, Clone)]
pub struct IssueFileBasedEblRequest {
    pub application: String,
    pub issuer: Did,
    pub authentication_id: String,
    pub draft: bool,
    pub fields: BillOfLadingFields,
}

#[derive(Debug, Clone)]
pub struct UpdateFileBasedEblDraftRequest {
    pub id: String,
    pub issue: IssueFileBasedEblRequest,
}

#[derive(Debug, Clone)]
pub struct TransferEblRequest {
    pub application: String,
    pub transfer_by: Did,
    pub authentication_id: String,
    pub id: String,
    pub note: String,
}

#[derive(Debug, Clone)]
pub struct ReturnEblRequest {
    pub application: String,
    pub return_by: Did,
    pub authentication_id: String,
    pub id: String,
    pub note: String,
}

#[derive(Debug, Clone)]
pub struct SurrenderEblRequest {
    pub application: String,
    pub surrender_by: Did,
    pub authentication_id: String,
    pub id: String,
    pub note: String,
}

#[derive(Debug, Clone)]
pub struct AmendmentRequestEblRequest {
    pub application: String,
    pub request_by: Did,
    pub authentication_id: String,
    pub id: String,
    pub note: String,
}

#[derive(Debug, Clone)]
pub struct AmendEblRequest {
    pub application: String,
    pub amend_by: Did,
    pub authentication_id: String,
    pub id: String,
    pub fields: BillOfLadingFields,
}

#[derive(Debug, Clone)]
pub struct AccomplishEblRequest {
    pub application: String,
    pub accomplish_by: Did,
    pub authentication_id: String,
    pub id: String,
}

#[derive(Debug, Clone)]
pub struct PrintToPaperEblRequest {
    pub application: String,
    pub print_by: Did,
    pub authentication_id: String,
    pub id: String,
}

#[derive(Debug, Clone)]
pub struct ListFileBasedEblRequest {
    pub application: String,
    pub lister: Did,
    pub status: MetaBucket,
    pub offset: usize,
    pub limit: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListFileBasedEblRecord {
    pub total: usize,
    pub records: Vec<Pack>,
}

fn require_non_empty(field: &str, value: &str) -> Result<(), EblError> {
    if value.trim().is_empty() {
        return Err(EblError::InvalidRequest(format!("{field} must not be empty")));
    }
    Ok(())
}

fn require_non_empty_did(field: &str, value: &Did) -> Result<(), EblError> {
    require_non_empty(field, value.as_str())
}

fn validate_bill_of_lading_fields(fields: &BillOfLadingFields) -> Result<(), EblError> {
    require_non_empty("bl_number", &fields.bl_number)?;
    require_non_empty_did("shipper", &fields.shipper)?;
    require_non_empty_did("consignee", &fields.consignee)?;
    require_non_empty_did("release_agent", &fields.release_agent)?;
    Ok(())
}

/// Orchestrates every eBL mutation. Holds only the two shared,
/// transactional/stateless resources spec §5 allows: the trade-document
/// store and the business-unit directory. `trusted_roots` is the configured
/// root certificate set envelope verification checks chains against.
pub struct Controller {
    store: Arc<dyn Store>,
    bu_directory: Arc<dyn BuDirectory>,
    trusted_roots: Vec<Vec<u8>>,
}

impl Controller {
    pub fn new(
        store: Arc<dyn Store>,
        bu_directory: Arc<dyn BuDirectory>,
        trusted_roots: Vec<Vec<u8>>,
    ) -> Self {
        Controller {
            store,
            bu_directory,
            trusted_roots,
        }
    }

    fn build_bill_of_lading_event(
        issuer: &Did,
        fields: &BillOfLadingFields,
        draft: bool,
        ts: TimeStamp,
    ) -> Event {
        let parties = vec![
            DocumentParty {
                function: PartyFunction::Issuer,
                identifying_code: issuer.clone(),
            },
            DocumentParty {
                function: PartyFunction::Shipper,
                identifying_code: fields.shipper.clone(),
            },
            DocumentParty {
                function: PartyFunction::Consignee,
                identifying_code: fields.consignee.clone(),
            },
            DocumentParty {
                function: PartyFunction::ReleaseAgent,
                identifying_code: fields.release_agent.clone(),
            },
        ];

        Event::BillOfLading {
            file: fields.file.clone(),
            transport_document: TransportDocument {
                bl_number: fields.bl_number.clone(),
                pol: fields.pol.clone(),
                pod: fields.pod.clone(),
                eta: fields.eta,
                shipping_instruction: ShippingInstruction {
                    parties,
                    to_order: fields.to_order,
                    status: Some(if draft {
                        DocumentStatus::Draft
                    } else {
                        DocumentStatus::Issued
                    }),
                },
            },
            created_by: issuer.clone(),
            created_at: ts,
            note: fields.note.clone(),
        }
    }

    /// Issues a new eBL pack (spec §4.F `Create`).
    pub fn create(&self, ts: i64, request: IssueFileBasedEblRequest) -> Result<Pack, EblError> {
        require_non_empty("application", &request.application)?;
        require_non_empty_did("issuer", &request.issuer)?;
        validate_bill_of_lading_fields(&request.fields)?;

        self.bu_directory.require_active(&request.application, &request.issuer)?;
        self.bu_directory
            .require_active(&request.application, &request.fields.shipper)?;
        self.bu_directory
            .require_active(&request.application, &request.fields.consignee)?;
        self.bu_directory
            .require_active(&request.application, &request.fields.release_agent)?;

        let timestamp = TimeStamp::from_unix_secs(ts);
        let current_owner = if request.draft {
            request.issuer.clone()
        } else {
            request.fields.shipper.clone()
        };

        let mut events = vec![Self::build_bill_of_lading_event(
            &request.issuer,
            &request.fields,
            request.draft,
            timestamp,
        )];
        if !request.draft {
            events.push(Event::Transfer {
                by: request.issuer.clone(),
                to: request.fields.shipper.clone(),
                at: timestamp,
                note: String::new(),
            });
        }

        let pack = Pack {
            id: new_bech32_id("ebl_").map_err(|e| EblError::InvalidRequest(e.to_string()))?,
            version: 1,
            parent_hash: String::new(),
            current_owner,
            events,
        };

        self.sign_and_persist(&pack, &request.application, &request.issuer, &request.authentication_id, ts, None)?;
        log::debug!("created pack {} (draft={})", pack.id, request.draft);
        Ok(pack.stripped())
    }

    /// Updates a draft in place (spec §4.F `UpdateDraft`): same pack id,
    /// version incremented, the sole `BillOfLading` event replaced rather
    /// than appended to.
    pub fn update_draft(
        &self,
        ts: i64,
        request: UpdateFileBasedEblDraftRequest,
    ) -> Result<Pack, EblError> {
        require_non_empty("id", &request.id)?;
        require_non_empty("application", &request.issue.application)?;
        require_non_empty_did("issuer", &request.issue.issuer)?;
        validate_bill_of_lading_fields(&request.issue.fields)?;

        self.bu_directory
            .require_active(&request.issue.application, &request.issue.issuer)?;
        self.bu_directory
            .require_active(&request.issue.application, &request.issue.fields.shipper)?;
        self.bu_directory
            .require_active(&request.issue.application, &request.issue.fields.consignee)?;
        self.bu_directory
            .require_active(&request.issue.application, &request.issue.fields.release_agent)?;

        let (old_pack, old_version, parent_hash) =
            self.load_verified(&request.issue.application, &request.id)?;

        state_machine::check_update_draft_precondition(&old_pack, &request.issue.issuer)?;

        let timestamp = TimeStamp::from_unix_secs(ts);
        let current_owner = if request.issue.draft {
            request.issue.issuer.clone()
        } else {
            request.issue.fields.shipper.clone()
        };

        let mut events = vec![Self::build_bill_of_lading_event(
            &request.issue.issuer,
            &request.issue.fields,
            request.issue.draft,
            timestamp,
        )];
        if !request.issue.draft {
            events.push(Event::Transfer {
                by: request.issue.issuer.clone(),
                to: request.issue.fields.shipper.clone(),
                at: timestamp,
                note: String::new(),
            });
        }

        let pack = Pack {
            id: old_pack.id.clone(),
            version: old_version + 1,
            parent_hash,
            current_owner,
            events,
        };

        self.sign_and_persist(
            &pack,
            &request.issue.application,
            &request.issue.issuer,
            &request.issue.authentication_id,
            ts,
            Some(old_version),
        )?;
        log::debug!("updated draft {} to version {}", pack.id, pack.version);
        Ok(pack.stripped())
    }

    fn mutate(
        &self,
        ts: i64,
        application: &str,
        actor: &Did,
        authentication_id: &str,
        id: &str,
        action: Action,
        build_event: impl FnOnce(&Did, Option<&Did>, TimeStamp) -> Event,
    ) -> Result<Pack, EblError> {
        require_non_empty("application", application)?;
        require_non_empty_did("actor", actor)?;
        require_non_empty("id", id)?;

        self.bu_directory.require_active(application, actor)?;

        let (old_pack, old_version, parent_hash) = self.load_verified(application, id)?;

        if let Err(err) = state_machine::check_precondition(&old_pack, actor, action) {
            log::warn!("rejected {action:?} on pack {id} by {actor}: {err}");
            return Err(err);
        }
        let next_owner = state_machine::next_owner(&old_pack, actor, action)?;

        let timestamp = TimeStamp::from_unix_secs(ts);
        let event = build_event(actor, next_owner.as_ref(), timestamp);

        let mut events = old_pack.events.clone();
        events.push(event);

        let pack = Pack {
            id: old_pack.id.clone(),
            version: old_version + 1,
            parent_hash,
            current_owner: next_owner.unwrap_or(old_pack.current_owner),
            events,
        };

        self.sign_and_persist(&pack, application, actor, authentication_id, ts, Some(old_version))?;
        log::debug!("applied {action:?} to pack {id}, now version {}", pack.version);
        Ok(pack.stripped())
    }

    /// Transfers ownership onward (spec §4.F `Transfer`).
    pub fn transfer(&self, ts: i64, request: TransferEblRequest) -> Result<Pack, EblError> {
        self.mutate(
            ts,
            &request.application,
            &request.transfer_by,
            &request.authentication_id,
            &request.id,
            Action::Transfer,
            |by, to, at| Event::Transfer {
                by: by.clone(),
                to: to.cloned().unwrap_or_default(),
                at,
                note: request.note.clone(),
            },
        )
    }

    /// Returns ownership backward along the chain (spec §4.F `Return`).
    pub fn return_ebl(&self, ts: i64, request: ReturnEblRequest) -> Result<Pack, EblError> {
        self.mutate(
            ts,
            &request.application,
            &request.return_by,
            &request.authentication_id,
            &request.id,
            Action::Return,
            |by, to, at| Event::Return {
                by: by.clone(),
                to: to.cloned().unwrap_or_default(),
                at,
                note: request.note.clone(),
            },
        )
    }

    /// Surrenders the eBL to the release agent (spec §4.F `Surrender`).
    pub fn surrender(&self, ts: i64, request: SurrenderEblRequest) -> Result<Pack, EblError> {
        self.mutate(
            ts,
            &request.application,
            &request.surrender_by,
            &request.authentication_id,
            &request.id,
            Action::Surrender,
            |by, to, at| Event::Surrender {
                by: by.clone(),
                to: to.cloned().unwrap_or_default(),
                at,
                note: request.note.clone(),
            },
        )
    }

    /// Requests an amendment, handing ownership back to the issuer (spec
    /// §4.F `AmendmentRequest`).
    pub fn amendment_request(
        &self,
        ts: i64,
        request: AmendmentRequestEblRequest,
    ) -> Result<Pack, EblError> {
        self.mutate(
            ts,
            &request.application,
            &request.request_by,
            &request.authentication_id,
            &request.id,
            Action::AmendmentRequest,
            |by, to, at| Event::AmendmentRequest {
                by: by.clone(),
                to: to.cloned().unwrap_or_default(),
                at,
                note: request.note.clone(),
            },
        )
    }

    /// Resolves an outstanding amendment request: the issuer appends a fresh
    /// `BillOfLading` event carrying the amended document, and ownership
    /// passes to whichever business unit requested the amendment (spec §4.F
    /// `Amend`). There is no dedicated `Amend` event variant -- amending
    /// *is* issuing a new version of the document, per spec §3.
    pub fn amend(&self, ts: i64, request: AmendEblRequest) -> Result<Pack, EblError> {
        require_non_empty("application", &request.application)?;
        require_non_empty_did("amend_by", &request.amend_by)?;
        require_non_empty("id", &request.id)?;
        validate_bill_of_lading_fields(&request.fields)?;

        self.bu_directory
            .require_active(&request.application, &request.amend_by)?;

        let (old_pack, old_version, parent_hash) =
            self.load_verified(&request.application, &request.id)?;

        state_machine::check_precondition(&old_pack, &request.amend_by, Action::Amend)?;
        let next_owner = state_machine::next_owner(&old_pack, &request.amend_by, Action::Amend)?;

        let timestamp = TimeStamp::from_unix_secs(ts);
        let event =
            Self::build_bill_of_lading_event(&request.amend_by, &request.fields, false, timestamp);

        let mut events = old_pack.events.clone();
        events.push(event);

        let pack = Pack {
            id: old_pack.id.clone(),
            version: old_version + 1,
            parent_hash,
            current_owner: next_owner.unwrap_or(old_pack.current_owner),
            events,
        };

        self.sign_and_persist(
            &pack,
            &request.application,
            &request.amend_by,
            &request.authentication_id,
            ts,
            Some(old_version),
        )?;
        Ok(pack.stripped())
    }

    /// Marks the eBL as accomplished at the release agent -- terminal (spec
    /// §4.F `Accomplish`).
    pub fn accomplish(&self, ts: i64, request: AccomplishEblRequest) -> Result<Pack, EblError> {
        self.mutate(
            ts,
            &request.application,
            &request.accomplish_by,
            &request.authentication_id,
            &request.id,
            Action::Accomplish,
            |by, _to, at| Event::Accomplish {
                by: by.clone(),
                at,
            },
        )
    }

    /// Prints the eBL to paper -- terminal (spec §4.F `PrintToPaper`).
    pub fn print_to_paper(
        &self,
        ts: i64,
        request: PrintToPaperEblRequest,
    ) -> Result<Pack, EblError> {
        self.mutate(
            ts,
            &request.application,
            &request.print_by,
            &request.authentication_id,
            &request.id,
            Action::PrintToPaper,
            |by, _to, at| Event::PrintToPaper {
                by: by.clone(),
                at,
            },
        )
    }

    /// Lists the packs visible to `request.lister` under `request.status`'s
    /// meta bucket (spec §4.F `List`). Uses a read-only transaction in the
    /// sense that it never calls `append_version`; the store's own
    /// `list_trade_document` is free to run outside a write transaction.
    pub fn list(&self, request: ListFileBasedEblRequest) -> Result<ListFileBasedEblRecord, EblError> {
        require_non_empty("application", &request.application)?;
        require_non_empty_did("lister", &request.lister)?;

        self.bu_directory
            .require_known(&request.application, &request.lister)?;

        let filter = ListFilter {
            bucket: Some((request.status, request.lister.clone())),
            offset: request.offset,
            limit: request.limit,
            ..ListFilter::new(KIND_FILE_BASED_BILL_OF_LADING)
        };

        let ListTradeDocumentResult { total, docs } = self.store.list_trade_document(&filter)?;

        let mut records = Vec::with_capacity(docs.len());
        for doc in &docs {
            let envelope = Self::decode_envelope(doc)?;
            let pack = envelope.pack()?;
            self.verify_envelope(&request.application, &envelope, &pack)?;
            records.push(pack.stripped());
        }

        Ok(ListFileBasedEblRecord { total, records })
    }

    fn decode_envelope(doc: &TradeDocument) -> Result<Envelope, EblError> {
        let compact = String::from_utf8(doc.envelope.clone())
            .map_err(|_| EblError::StorageFailed("corrupt envelope encoding".into()))?;
        Envelope::from_compact(&compact)
    }

    fn verify_envelope(
        &self,
        application: &str,
        envelope: &Envelope,
        pack: &Pack,
    ) -> Result<(), EblError> {
        let expected_signer = pack
            .last_event()
            .map(Event::actor)
            .cloned()
            .unwrap_or_default();
        let verifier = self.bu_directory.jws_verifier(application, &expected_signer)?;
        envelope.verify(verifier.as_ref(), &self.trusted_roots, &expected_signer)
    }

    /// Loads the latest version of `id`, verifies its signature and
    /// certificate chain, and returns `(pack, version, parent_hash-for-the-
    /// next-version)`. Fails with [`EblError::EblNotFound`] if no such pack
    /// exists.
    fn load_verified(&self, application: &str, id: &str) -> Result<(Pack, u64, String), EblError> {
        let doc = self
            .store
            .get_latest(id)?
            .ok_or_else(|| EblError::EblNotFound(id.to_string()))?;

        let envelope = Self::decode_envelope(&doc)?;
        let pack = envelope.pack()?;
        self.verify_envelope(application, &envelope, &pack)?;
        let parent_hash = envelope.parent_hash()?;

        Ok((pack, doc.doc_version, parent_hash))
    }

    fn sign_and_persist(
        &self,
        pack: &Pack,
        application: &str,
        signer_bu: &Did,
        authentication_id: &str,
        ts: i64,
        expected_previous_version: Option<u64>,
    ) -> Result<(), EblError> {
        let signer = self
            .bu_directory
            .jws_signer(application, signer_bu, authentication_id)?;
        let envelope = Envelope::sign(pack, signer.as_ref())?;
        log::debug!("signed pack {} version {} as {signer_bu}", pack.id, pack.version);
        let meta = meta::build(pack);
        let raw_id = envelope.document_id()?;
        let compact = envelope.to_compact()?;

        let doc = TradeDocument {
            raw_id,
            kind: KIND_FILE_BASED_BILL_OF_LADING.to_string(),
            doc_id: pack.id.clone(),
            doc_version: pack.version,
            envelope: compact.into_bytes(),
            created_at: ts,
            meta,
        };

        self.store.append_version(expected_previous_version, doc)
    }
}
