//! Derives per-party index labels from a pack's final state so the store can
//! answer "list my pending/sent/archived eBLs" without replaying the chain.
//! See spec §4.E.

use crate::ids::Did;
use crate::pack::Pack;
use crate::participators::resolve;

/// The five index buckets a stored document may carry. Query by
/// `(kind=FileBasedBillOfLading, meta[bucket] contains bu)`.
#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, PartialEq, Eq, Default)]
pub struct Metadata {
    #[n(0)]
    pub action_needed: Vec<Did>,
    #[n(1)]
    pub visible_to_bu: Vec<Did>,
    #[n(2)]
    pub sent: Vec<Did>,
    #[n(3)]
    pub upcoming: Vec<Did>,
    #[n(4)]
    pub archive: Vec<Did>,
}

impl Metadata {
    /// The buckets containing `bu`, by name, matching the status strings a
    /// thin HTTP layer's `?status=` query parameter would map to.
    pub fn bucket(&self, bucket: MetaBucket) -> &[Did] {
        match bucket {
            MetaBucket::ActionNeeded => &self.action_needed,
            MetaBucket::VisibleToBu => &self.visible_to_bu,
            MetaBucket::Sent => &self.sent,
            MetaBucket::Upcoming => &self.upcoming,
            MetaBucket::Archive => &self.archive,
        }
    }

    pub fn contains(&self, bucket: MetaBucket, bu: &Did) -> bool {
        self.bucket(bucket).contains(bu)
    }
}

/// Names the five query-able buckets in [`Metadata`] without borrowing from
/// it, so a store filter can name one without holding a `Metadata` alive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetaBucket {
    ActionNeeded,
    VisibleToBu,
    Sent,
    Upcoming,
    Archive,
}

/// Pure function of the pack's current state: same pack in, same metadata
/// out, every time.
pub fn build(pack: &Pack) -> Metadata {
    let participators = resolve(pack);
    let ordered = participators.ordered();

    if pack.is_terminal() {
        return Metadata {
            visible_to_bu: ordered.to_vec(),
            archive: ordered.to_vec(),
            ..Default::default()
        };
    }

    if !pack.has_outstanding_amendment_request() {
        let owner_idx = ordered
            .iter()
            .position(|p| *p == pack.current_owner)
            .unwrap_or(ordered.len());

        Metadata {
            action_needed: vec![pack.current_owner.clone()],
            visible_to_bu: ordered.to_vec(),
            sent: ordered[..owner_idx].to_vec(),
            upcoming: ordered[owner_idx.saturating_add(1).min(ordered.len())..].to_vec(),
            archive: Vec::new(),
        }
    } else {
        let requester = pack
            .last_amendment_request()
            .and_then(crate::pack::Event::transfer_parties)
            .map(|(by, _)| by.clone())
            .unwrap_or_default();
        let requester_idx = ordered
            .iter()
            .position(|p| *p == requester)
            .unwrap_or(ordered.len());

        Metadata {
            action_needed: vec![pack.current_owner.clone()],
            visible_to_bu: ordered.to_vec(),
            sent: ordered[..requester_idx].to_vec(),
            upcoming: ordered[requester_idx..].to_vec(),
            archive: Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pack::{
        DocumentParty, Event, FileRef, PartyFunction, ShippingInstruction, TimeStamp,
        TransportDocument,
    };

    fn party(function: PartyFunction, did: &str) -> DocumentParty {
        DocumentParty {
            function,
            identifying_code: Did::new(did),
        }
    }

    fn issued_pack(current_owner: &str) -> Pack {
        let bol = Event::BillOfLading {
            file: FileRef::default(),
            transport_document: TransportDocument {
                shipping_instruction: ShippingInstruction {
                    parties: vec![
                        party(PartyFunction::Issuer, "did:ex:i"),
                        party(PartyFunction::Shipper, "did:ex:s"),
                        party(PartyFunction::Consignee, "did:ex:c"),
                        party(PartyFunction::ReleaseAgent, "did:ex:r"),
                    ],
                    ..Default::default()
                },
                ..Default::default()
            },
            created_by: Did::new("did:ex:i"),
            created_at: TimeStamp::from_unix_secs(0),
            note: String::new(),
        };
        Pack {
            id: "pack_1".into(),
            version: 1,
            parent_hash: String::new(),
            current_owner: Did::new(current_owner),
            events: vec![bol],
        }
    }

    #[test]
    fn s1_issue_non_draft_transferred_to_shipper() {
        let mut pack = issued_pack("did:ex:s");
        pack.events.push(Event::Transfer {
            by: Did::new("did:ex:i"),
            to: Did::new("did:ex:s"),
            at: TimeStamp::from_unix_secs(1),
            note: String::new(),
        });

        let meta = build(&pack);
        assert_eq!(meta.action_needed, vec![Did::new("did:ex:s")]);
        assert_eq!(meta.sent, vec![Did::new("did:ex:i")]);
        assert_eq!(meta.upcoming, vec![Did::new("did:ex:c"), Did::new("did:ex:r")]);
    }

    #[test]
    fn terminal_pack_has_archive_and_no_action_needed() {
        let mut pack = issued_pack("did:ex:r");
        pack.events.push(Event::Accomplish {
            by: Did::new("did:ex:r"),
            at: TimeStamp::from_unix_secs(2),
        });

        let meta = build(&pack);
        assert!(meta.action_needed.is_empty());
        assert_eq!(meta.archive.len(), 4);
    }

    #[test]
    fn outstanding_amendment_splits_by_requester_index() {
        // S4: Consignee (index 2) requests amendment; Issuer becomes owner.
        let mut pack = issued_pack("did:ex:c");
        pack.events.push(Event::AmendmentRequest {
            by: Did::new("did:ex:c"),
            to: Did::new("did:ex:i"),
            at: TimeStamp::from_unix_secs(3),
            note: String::new(),
        });
        pack.current_owner = Did::new("did:ex:i");

        let meta = build(&pack);
        assert_eq!(meta.action_needed, vec![Did::new("did:ex:i")]);
        assert_eq!(meta.sent, vec![Did::new("did:ex:i"), Did::new("did:ex:s")]);
        assert_eq!(meta.upcoming, vec![Did::new("did:ex:c"), Did::new("did:ex:r")]);
    }

    #[test]
    fn meta_is_pure() {
        let pack = issued_pack("did:ex:s");
        assert_eq!(build(&pack), build(&pack));
    }
}
