use std::sync::Arc;

use ebl_pack_core::bu_directory::{BuStatus, InMemoryBuDirectory};
use ebl_pack_core::controller::{BillOfLadingFields, Controller};
use ebl_pack_core::ids::Did;
use ebl_pack_core::pack::{FileRef, Location};
use ebl_pack_core::store::{SledStore, Store, TradeDocument};
use ebl_pack_core::test_support::Ed25519Signer;

pub const APP: &str = "app1";

/// A fully wired `Controller` over a temporary `sled` database, with the
/// four standard parties (issuer/shipper/consignee/release agent) already
/// registered as active business units carrying their own signing keys.
pub struct Harness {
    pub controller: Controller,
    pub store: Arc<SledStore>,
    pub issuer: Did,
    pub shipper: Did,
    pub consignee: Did,
    pub release_agent: Did,
    _tempdir: tempfile::TempDir,
}

impl Harness {
    pub fn new() -> Self {
        let tempdir = tempfile::tempdir().expect("tempdir");
        let db = sled::Config::new().temporary(true).open().expect("sled open");
        let store = Arc::new(SledStore::from_db(Arc::new(db)).expect("store"));

        let directory = Arc::new(InMemoryBuDirectory::new());
        let issuer = Did::new("did:ex:issuer");
        let shipper = Did::new("did:ex:shipper");
        let consignee = Did::new("did:ex:consignee");
        let release_agent = Did::new("did:ex:release-agent");

        for bu in [&issuer, &shipper, &consignee, &release_agent] {
            directory.register(APP, bu.clone(), BuStatus::Active);
            directory.register_signer(APP, bu.clone(), Arc::new(Ed25519Signer::generate(bu.clone())));
        }

        let trusted_roots = vec![Ed25519Signer::generate(issuer.clone()).root_certificate()];
        let controller = Controller::new(store.clone(), directory, trusted_roots);

        Harness {
            controller,
            store,
            issuer,
            shipper,
            consignee,
            release_agent,
            _tempdir: tempdir,
        }
    }

    /// Fetches the latest persisted version of `doc_id` directly from the
    /// store, bypassing the controller. Used by tests that need to inspect
    /// the raw envelope bytes written for a previous version.
    pub fn latest_document(&self, doc_id: &str) -> TradeDocument {
        self.store
            .get_latest(doc_id)
            .expect("store read")
            .expect("document exists")
    }

    pub fn fields(&self) -> BillOfLadingFields {
        BillOfLadingFields {
            file: FileRef {
                name: "bl.pdf".into(),
                mime_type: "application/pdf".into(),
                content: vec![1, 2, 3],
                created_at: None,
            },
            bl_number: "BL1".into(),
            to_order: true,
            pol: Location::default(),
            pod: Location::default(),
            eta: None,
            shipper: self.shipper.clone(),
            consignee: self.consignee.clone(),
            release_agent: self.release_agent.clone(),
            note: String::new(),
        }
    }
}
