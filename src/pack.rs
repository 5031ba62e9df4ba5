//! The eBL pack: a versioned, hash-chained container for the event history
//! of a single bill of lading. See spec §3 / §4.A.

use chrono::{DateTime, Utc};

use crate::ids::Did;

/// Unix-seconds timestamp, supplied by the caller at request arrival rather
/// than read from the system clock inside this crate (keeps the core
/// deterministic and testable).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct TimeStamp(i64);

impl TimeStamp {
    pub fn from_unix_secs(secs: i64) -> Self {
        Self(secs)
    }

    pub fn unix_secs(&self) -> i64 {
        self.0
    }

    pub fn to_datetime_utc(&self) -> DateTime<Utc> {
        DateTime::from_timestamp(self.0, 0).expect("unix seconds in range")
    }
}

impl<C> minicbor::Encode<C> for TimeStamp {
    fn encode<W: minicbor::encode::Write>(
        &self,
        e: &mut minicbor::Encoder<W>,
        _: &mut C,
    ) -> Result<(), minicbor::encode::Error<W::Error>> {
        e.i64(self.0)?.ok()
    }
}

impl<'b, C> minicbor::Decode<'b, C> for TimeStamp {
    fn decode(d: &mut minicbor::Decoder<'b>, _: &mut C) -> Result<Self, minicbor::decode::Error> {
        Ok(TimeStamp(d.i64()?))
    }
}

#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, Copy, PartialEq, Eq)]
pub enum PartyFunction {
    /// DDR — document recipient / issuer of the shipping instruction.
    #[n(0)]
    Issuer,
    /// OS — original shipper.
    #[n(1)]
    Shipper,
    /// CN — consignee.
    #[n(2)]
    Consignee,
    /// DDS — release agent (delivery/destination agent).
    #[n(3)]
    ReleaseAgent,
}

#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentStatus {
    #[n(0)]
    Draft,
    #[n(1)]
    Issued,
}

#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, PartialEq, Eq, Default)]
pub struct Location {
    #[n(0)]
    pub location_name: String,
    #[n(1)]
    pub un_location_code: String,
}

#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, PartialEq, Eq)]
pub struct DocumentParty {
    #[n(0)]
    pub function: PartyFunction,
    #[n(1)]
    pub identifying_code: Did,
}

#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, PartialEq, Eq, Default)]
pub struct ShippingInstruction {
    #[n(0)]
    pub parties: Vec<DocumentParty>,
    #[n(1)]
    pub to_order: bool,
    #[n(2)]
    pub status: Option<DocumentStatus>,
}

#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, PartialEq, Eq, Default)]
pub struct TransportDocument {
    #[n(0)]
    pub bl_number: String,
    #[n(1)]
    pub pol: Location,
    #[n(2)]
    pub pod: Location,
    #[n(3)]
    pub eta: Option<TimeStamp>,
    #[n(4)]
    pub shipping_instruction: ShippingInstruction,
}

#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, PartialEq, Eq, Default)]
pub struct FileRef {
    #[n(0)]
    pub name: String,
    #[n(1)]
    pub mime_type: String,
    #[n(2)]
    pub content: Vec<u8>,
    #[n(3)]
    pub created_at: Option<TimeStamp>,
}

/// A single chain entry. Exactly one arm is ever populated — enforced by
/// construction through a real tagged union, rather than the
/// pointer-per-field struct an earlier implementation of this idea used.
#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, PartialEq, Eq)]
pub enum Event {
    #[n(0)]
    BillOfLading {
        #[n(0)]
        file: FileRef,
        #[n(1)]
        transport_document: TransportDocument,
        #[n(2)]
        created_by: Did,
        #[n(3)]
        created_at: TimeStamp,
        #[n(4)]
        note: String,
    },
    #[n(1)]
    Transfer {
        #[n(0)]
        by: Did,
        #[n(1)]
        to: Did,
        #[n(2)]
        at: TimeStamp,
        #[n(3)]
        note: String,
    },
    #[n(2)]
    Return {
        #[n(0)]
        by: Did,
        #[n(1)]
        to: Did,
        #[n(2)]
        at: TimeStamp,
        #[n(3)]
        note: String,
    },
    #[n(3)]
    Surrender {
        #[n(0)]
        by: Did,
        #[n(1)]
        to: Did,
        #[n(2)]
        at: TimeStamp,
        #[n(3)]
        note: String,
    },
    #[n(4)]
    AmendmentRequest {
        #[n(0)]
        by: Did,
        #[n(1)]
        to: Did,
        #[n(2)]
        at: TimeStamp,
        #[n(3)]
        note: String,
    },
    #[n(5)]
    Accomplish {
        #[n(0)]
        by: Did,
        #[n(1)]
        at: TimeStamp,
    },
    #[n(6)]
    PrintToPaper {
        #[n(0)]
        by: Did,
        #[n(1)]
        at: TimeStamp,
    },
}

impl Event {
    pub fn is_bill_of_lading(&self) -> bool {
        matches!(self, Event::BillOfLading { .. })
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Event::Accomplish { .. } | Event::PrintToPaper { .. })
    }

    pub fn is_amendment_request(&self) -> bool {
        matches!(self, Event::AmendmentRequest { .. })
    }

    /// The actor and recipient of an ownership-transferring event, if any.
    pub fn transfer_parties(&self) -> Option<(&Did, &Did)> {
        match self {
            Event::Transfer { by, to, .. }
            | Event::Return { by, to, .. }
            | Event::Surrender { by, to, .. }
            | Event::AmendmentRequest { by, to, .. } => Some((by, to)),
            _ => None,
        }
    }

    /// The business unit that performed this event.
    pub fn actor(&self) -> &Did {
        match self {
            Event::BillOfLading { created_by, .. } => created_by,
            Event::Transfer { by, .. }
            | Event::Return { by, .. }
            | Event::Surrender { by, .. }
            | Event::AmendmentRequest { by, .. }
            | Event::Accomplish { by, .. }
            | Event::PrintToPaper { by, .. } => by,
        }
    }

    pub fn transport_document(&self) -> Option<&TransportDocument> {
        match self {
            Event::BillOfLading {
                transport_document, ..
            } => Some(transport_document),
            _ => None,
        }
    }

    /// Returns a copy with file content bytes removed (invariant 7: file
    /// bytes travel only inside the signed envelope, never in a metadata-only
    /// view returned to callers).
    fn strip_file_content(&self) -> Event {
        match self.clone() {
            Event::BillOfLading {
                mut file,
                transport_document,
                created_by,
                created_at,
                note,
            } => {
                file.content.clear();
                Event::BillOfLading {
                    file,
                    transport_document,
                    created_by,
                    created_at,
                    note,
                }
            }
            other => other,
        }
    }
}

/// The versioned container holding the event chain of a single eBL.
#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, PartialEq, Eq)]
pub struct Pack {
    #[n(0)]
    pub id: String,
    #[n(1)]
    pub version: u64,
    #[n(2)]
    pub parent_hash: String,
    #[n(3)]
    pub current_owner: Did,
    #[n(4)]
    pub events: Vec<Event>,
}

impl Pack {
    /// Last event in the chain, i.e. the most recent action taken.
    pub fn last_event(&self) -> Option<&Event> {
        self.events.last()
    }

    /// Most recent `BillOfLading` event, scanning from the tail. Every pack
    /// is expected to have at least one (invariant 2: `events[0]` is always a
    /// `BillOfLading`).
    pub fn last_bill_of_lading(&self) -> Option<&Event> {
        self.events.iter().rev().find(|e| e.is_bill_of_lading())
    }

    /// Most recent `AmendmentRequest`, if the chain has one at all.
    pub fn last_amendment_request(&self) -> Option<&Event> {
        self.events.iter().rev().find(|e| e.is_amendment_request())
    }

    /// A pack is terminal once an `Accomplish` or `PrintToPaper` event
    /// exists — by construction that can only ever be the last event, since
    /// no further mutation is legal afterwards (invariant 6).
    pub fn is_terminal(&self) -> bool {
        self.last_event().is_some_and(Event::is_terminal)
    }

    /// Whether the chain has an amendment request newer than the most recent
    /// `BillOfLading` event (i.e. still outstanding).
    pub fn has_outstanding_amendment_request(&self) -> bool {
        for event in self.events.iter().rev() {
            if event.is_bill_of_lading() {
                return false;
            }
            if event.is_amendment_request() {
                return true;
            }
        }
        false
    }

    /// Canonical, deterministic byte encoding of this pack. CBOR fields are
    /// addressed by fixed numeric index (`#[n(..)]`), so two packs with
    /// identical content always encode identically regardless of how they
    /// were constructed — this is what makes parent-hash chaining and
    /// signature verification agree across implementations (spec §9).
    pub fn canonical_bytes(&self) -> Result<Vec<u8>, crate::error::EblError> {
        Ok(minicbor::to_vec(self)?)
    }

    /// A copy of this pack with every event's file content bytes cleared.
    /// Returned to callers in place of the full pack (invariant 7); the raw
    /// bytes live only inside the signed envelope persisted by the store.
    pub fn stripped(&self) -> Pack {
        Pack {
            id: self.id.clone(),
            version: self.version,
            parent_hash: self.parent_hash.clone(),
            current_owner: self.current_owner.clone(),
            events: self.events.iter().map(Event::strip_file_content).collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bol_event(created_by: &str) -> Event {
        Event::BillOfLading {
            file: FileRef {
                name: "bl.pdf".into(),
                mime_type: "application/pdf".into(),
                content: vec![1, 2, 3],
                created_at: Some(TimeStamp::from_unix_secs(100)),
            },
            transport_document: TransportDocument::default(),
            created_by: Did::new(created_by),
            created_at: TimeStamp::from_unix_secs(100),
            note: String::new(),
        }
    }

    #[test]
    fn pack_canonical_bytes_are_deterministic() {
        let pack = Pack {
            id: "pack_1".into(),
            version: 1,
            parent_hash: String::new(),
            current_owner: Did::new("did:openebl:issuer"),
            events: vec![bol_event("did:openebl:issuer")],
        };

        let a = pack.canonical_bytes().unwrap();
        let b = pack.canonical_bytes().unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn stripped_clears_file_content_but_keeps_shape() {
        let pack = Pack {
            id: "pack_1".into(),
            version: 1,
            parent_hash: String::new(),
            current_owner: Did::new("did:openebl:issuer"),
            events: vec![bol_event("did:openebl:issuer")],
        };

        let stripped = pack.stripped();
        match &stripped.events[0] {
            Event::BillOfLading { file, .. } => assert!(file.content.is_empty()),
            _ => panic!("expected bill of lading event"),
        }
        assert_eq!(stripped.id, pack.id);
        assert_eq!(stripped.version, pack.version);
    }

    #[test]
    fn is_terminal_true_only_after_accomplish_or_print() {
        let mut pack = Pack {
            id: "pack_1".into(),
            version: 1,
            parent_hash: String::new(),
            current_owner: Did::new("did:openebl:issuer"),
            events: vec![bol_event("did:openebl:issuer")],
        };
        assert!(!pack.is_terminal());

        pack.events.push(Event::Accomplish {
            by: Did::new("did:openebl:agent"),
            at: TimeStamp::from_unix_secs(200),
        });
        assert!(pack.is_terminal());
    }

    #[test]
    fn outstanding_amendment_request_detection() {
        let mut pack = Pack {
            id: "pack_1".into(),
            version: 1,
            parent_hash: String::new(),
            current_owner: Did::new("did:openebl:issuer"),
            events: vec![bol_event("did:openebl:issuer")],
        };
        assert!(!pack.has_outstanding_amendment_request());

        pack.events.push(Event::AmendmentRequest {
            by: Did::new("did:openebl:consignee"),
            to: Did::new("did:openebl:issuer"),
            at: TimeStamp::from_unix_secs(200),
            note: String::new(),
        });
        assert!(pack.has_outstanding_amendment_request());

        pack.events.push(bol_event("did:openebl:issuer"));
        assert!(!pack.has_outstanding_amendment_request());
    }
}
