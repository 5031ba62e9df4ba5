//! Legality and ownership-transfer rules for eBL mutations. See spec §4.C.

use crate::error::EblError;
use crate::ids::Did;
use crate::pack::{DocumentStatus, Event, Pack};
use crate::participators::{resolve, Participators};

/// The mutating actions a business unit may request against a pack.
/// `Create` and `UpdateDraft` build a pack rather than branch one, so they
/// are handled directly by the controller; the remaining seven all flow
/// through [`check_precondition`] and [`next_owner`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Transfer,
    Return,
    Surrender,
    AmendmentRequest,
    Amend,
    Accomplish,
    PrintToPaper,
}

/// One of the four named roles a business unit can hold on a pack.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Issuer,
    Shipper,
    Consignee,
    ReleaseAgent,
}

/// Which of the pack's four named roles (if any) `actor` occupies.
pub fn role_of(participators: &Participators, actor: &Did) -> Option<Role> {
    if *actor == participators.issuer {
        Some(Role::Issuer)
    } else if *actor == participators.shipper {
        Some(Role::Shipper)
    } else if *actor == participators.consignee {
        Some(Role::Consignee)
    } else if *actor == participators.release_agent {
        Some(Role::ReleaseAgent)
    } else {
        None
    }
}

/// Validates that `actor` may perform `action` against `pack` right now.
/// Fails with [`EblError::InvalidState`] whenever a precondition in spec
/// §4.C is violated.
pub fn check_precondition(pack: &Pack, actor: &Did, action: Action) -> Result<(), EblError> {
    if *actor != pack.current_owner {
        return Err(EblError::InvalidState(format!(
            "{actor} is not the current owner of pack {}",
            pack.id
        )));
    }

    let participators = resolve(pack);
    let role = role_of(&participators, actor);
    let terminal = pack.is_terminal();

    match action {
        Action::Transfer => {
            if terminal {
                return Err(EblError::InvalidState("pack is terminal".into()));
            }
            if role != Some(Role::Shipper) {
                return Err(EblError::InvalidState(
                    "only the shipper may transfer a to-order bill of lading".into(),
                ));
            }
        }
        Action::AmendmentRequest => {
            if terminal {
                return Err(EblError::InvalidState("pack is terminal".into()));
            }
            if !matches!(role, Some(Role::Shipper) | Some(Role::Consignee) | Some(Role::ReleaseAgent)) {
                return Err(EblError::InvalidState(
                    "only shipper, consignee, or release agent may request an amendment".into(),
                ));
            }
            if pack.has_outstanding_amendment_request() {
                return Err(EblError::InvalidState(
                    "an amendment request is already outstanding".into(),
                ));
            }
        }
        Action::Amend => {
            if terminal {
                return Err(EblError::InvalidState("pack is terminal".into()));
            }
            if role != Some(Role::Issuer) {
                return Err(EblError::InvalidState("only the issuer may amend".into()));
            }
            if !matches!(pack.last_event(), Some(Event::AmendmentRequest { .. })) {
                return Err(EblError::InvalidState(
                    "amend requires the last event to be an amendment request".into(),
                ));
            }
        }
        Action::Return => {
            if terminal {
                return Err(EblError::InvalidState("pack is terminal".into()));
            }
            if !matches!(
                role,
                Some(Role::ReleaseAgent) | Some(Role::Consignee) | Some(Role::Shipper) | Some(Role::Issuer)
            ) {
                return Err(EblError::InvalidState(
                    "actor holds no role eligible to return the pack".into(),
                ));
            }
        }
        Action::Surrender => {
            if terminal {
                return Err(EblError::InvalidState("pack is terminal".into()));
            }
            if role != Some(Role::Consignee) {
                return Err(EblError::InvalidState("only the consignee may surrender".into()));
            }
        }
        Action::Accomplish => {
            if terminal {
                return Err(EblError::InvalidState("pack is terminal".into()));
            }
            if role != Some(Role::ReleaseAgent) {
                return Err(EblError::InvalidState(
                    "only the release agent may accomplish".into(),
                ));
            }
        }
        Action::PrintToPaper => {
            if terminal {
                return Err(EblError::InvalidState("pack is terminal".into()));
            }
            if role != Some(Role::Issuer) {
                return Err(EblError::InvalidState("only the issuer may print to paper".into()));
            }
            if pack.events.iter().any(|e| matches!(e, Event::Surrender { .. })) {
                return Err(EblError::InvalidState(
                    "cannot print to paper after surrender".into(),
                ));
            }
        }
    }

    Ok(())
}

/// Validates the `UpdateDraft` precondition (spec §4.C): the pack must be
/// exactly one event long, a `BillOfLading` with status DRAFT, owned by the
/// Issuer, and `actor` must be that same Issuer. `Create` and `UpdateDraft`
/// build a pack rather than branch one, so this lives alongside
/// [`check_precondition`] rather than inside its `Action` match.
pub fn check_update_draft_precondition(pack: &Pack, actor: &Did) -> Result<(), EblError> {
    if *actor != pack.current_owner {
        return Err(EblError::InvalidState(format!(
            "{actor} is not the current owner of pack {}",
            pack.id
        )));
    }

    if pack.events.len() != 1 {
        return Err(EblError::InvalidState(
            "draft update requires a pack exactly one event long".into(),
        ));
    }

    let participators = resolve(pack);
    if role_of(&participators, actor) != Some(Role::Issuer) {
        return Err(EblError::InvalidState(
            "only the issuer may update a draft".into(),
        ));
    }

    match pack.events.first() {
        Some(Event::BillOfLading {
            transport_document, ..
        }) if transport_document.shipping_instruction.status == Some(DocumentStatus::Draft) => {
            Ok(())
        }
        _ => Err(EblError::InvalidState(
            "only a draft bill of lading may be updated".into(),
        )),
    }
}

/// Derives the next `current_owner` for `action` taken by `actor` against
/// `pack`. Returns `Ok(None)` for the two terminal actions, which admit no
/// further owner. Returns [`EblError::InvalidRoleOrAction`] when the matrix
/// in spec §4.C has no entry for this (role, action) pair -- this includes
/// `Return`/`Amend` by the `Issuer` when no `AmendmentRequest` has ever been
/// made: there is no row of the table for that case, so it is an error
/// rather than a silent `Ok(None)` that would otherwise be mistaken for a
/// legitimate terminal action by callers.
///
/// The `Transfer` row only fires for the `Shipper` role: a straight
/// (non-to-order) bill of lading is issued directly to its named consignee
/// and this implementation treats it as non-transferable beyond that
/// initial issue-time hop, since no role beyond `Shipper` maps to
/// `Transfer` in the table (spec §9 leaves this as an open policy choice;
/// see DESIGN.md).
pub fn next_owner(pack: &Pack, actor: &Did, action: Action) -> Result<Option<Did>, EblError> {
    let participators = resolve(pack);
    let role = role_of(&participators, actor);

    let owner = match (action, role) {
        (Action::Transfer, Some(Role::Shipper)) => Some(participators.consignee.clone()),
        (Action::Return, Some(Role::ReleaseAgent)) => Some(participators.consignee.clone()),
        (Action::Return, Some(Role::Consignee)) => Some(participators.shipper.clone()),
        (Action::Return, Some(Role::Shipper)) => Some(participators.issuer.clone()),
        (Action::Return, Some(Role::Issuer)) => match pack
            .last_amendment_request()
            .and_then(Event::transfer_parties)
            .map(|(by, _)| by.clone())
        {
            Some(requester) => Some(requester),
            None => return Err(EblError::InvalidRoleOrAction),
        },
        (Action::Surrender, Some(Role::Consignee)) => Some(participators.release_agent.clone()),
        (
            Action::AmendmentRequest,
            Some(Role::Shipper) | Some(Role::Consignee) | Some(Role::ReleaseAgent),
        ) => Some(participators.issuer.clone()),
        (Action::Amend, Some(Role::Issuer)) => match pack
            .last_amendment_request()
            .and_then(Event::transfer_parties)
            .map(|(by, _)| by.clone())
        {
            Some(requester) => Some(requester),
            None => return Err(EblError::InvalidRoleOrAction),
        },
        (Action::Accomplish, Some(Role::ReleaseAgent)) => None,
        (Action::PrintToPaper, Some(Role::Issuer)) => None,
        _ => return Err(EblError::InvalidRoleOrAction),
    };

    Ok(owner)
}
