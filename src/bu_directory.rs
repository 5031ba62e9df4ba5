//! Business unit existence and activation lookups. A thin external
//! boundary: the pack core never needs anything about a business unit
//! beyond "does this DID exist for this application, and is it active".
//! See spec §4.F step 2/6 and the `List` additional check in §4.F.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, RwLock};

use crate::envelope::{JwsSigner, JwsVerifier};
use crate::error::EblError;
use crate::ids::Did;

/// Whether a registered business unit may currently act.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuStatus {
    Active,
    Inactive,
}

/// Looks up business units by (application, DID). A real implementation
/// would call out to the application's identity service; this crate only
/// depends on the trait.
pub trait BuDirectory: Send + Sync {
    /// Returns the unit's status, or `None` if no such business unit is
    /// registered for `application`.
    fn lookup(&self, application: &str, business_unit: &Did) -> Option<BuStatus>;

    /// Convenience used throughout the controller: fails with
    /// [`EblError::BusinessUnitNotFound`] or
    /// [`EblError::BusinessUnitInactive`] instead of returning `Option`.
    fn require_active(&self, application: &str, business_unit: &Did) -> Result<(), EblError> {
        match self.lookup(application, business_unit) {
            None => Err(EblError::BusinessUnitNotFound(business_unit.to_string())),
            Some(BuStatus::Inactive) => {
                Err(EblError::BusinessUnitInactive(business_unit.to_string()))
            }
            Some(BuStatus::Active) => Ok(()),
        }
    }

    /// Used by `List`'s additional lister-existence check (spec §4.F):
    /// confirms the business unit exists at all, active or not.
    fn require_known(&self, application: &str, business_unit: &Did) -> Result<(), EblError> {
        match self.lookup(application, business_unit) {
            None => Err(EblError::BusinessUnitNotFound(business_unit.to_string())),
            Some(_) => Ok(()),
        }
    }

    /// Obtains a signing key bound to (application, business unit,
    /// authentication id), per spec §4.D step 1. A real implementation asks
    /// a KMS; this crate only depends on the trait.
    fn jws_signer(
        &self,
        application: &str,
        business_unit: &Did,
        authentication_id: &str,
    ) -> Result<Arc<dyn JwsSigner>, EblError>;

    /// Obtains the verifier counterpart of `jws_signer` for `business_unit`,
    /// used when the controller re-verifies a loaded envelope (spec §9).
    fn jws_verifier(
        &self,
        application: &str,
        business_unit: &Did,
    ) -> Result<Arc<dyn JwsVerifier>, EblError>;
}

/// An in-memory directory for tests and local experimentation. Holds, per
/// (application, business unit), both its activation status and its signing
/// key material so a test can drive the full sign-then-verify path without a
/// real KMS or certificate authority.
#[derive(Default)]
pub struct InMemoryBuDirectory {
    entries: RwLock<HashMap<(String, Did), BuStatus>>,
    known_applications: RwLock<HashSet<String>>,
    signers: RwLock<HashMap<(String, Did), Arc<dyn JwsSigner>>>,
    verifiers: RwLock<HashMap<(String, Did), Arc<dyn JwsVerifier>>>,
}

impl InMemoryBuDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, application: &str, business_unit: Did, status: BuStatus) {
        self.known_applications
            .write()
            .expect("lock poisoned")
            .insert(application.to_string());
        self.entries
            .write()
            .expect("lock poisoned")
            .insert((application.to_string(), business_unit), status);
    }

    pub fn deactivate(&self, application: &str, business_unit: &Did) {
        if let Some(status) = self
            .entries
            .write()
            .expect("lock poisoned")
            .get_mut(&(application.to_string(), business_unit.clone()))
        {
            *status = BuStatus::Inactive;
        }
    }

    /// Registers `material` as both the signer and the verifier for
    /// (application, business_unit). `material` typically also implements
    /// [`crate::envelope::CertificateChain`] (e.g. `test_support::Ed25519Signer`).
    pub fn register_signer<T>(&self, application: &str, business_unit: Did, material: Arc<T>)
    where
        T: JwsSigner + JwsVerifier + 'static,
    {
        let key = (application.to_string(), business_unit);
        self.signers
            .write()
            .expect("lock poisoned")
            .insert(key.clone(), material.clone() as Arc<dyn JwsSigner>);
        self.verifiers
            .write()
            .expect("lock poisoned")
            .insert(key, material as Arc<dyn JwsVerifier>);
    }
}

impl BuDirectory for InMemoryBuDirectory {
    fn lookup(&self, application: &str, business_unit: &Did) -> Option<BuStatus> {
        self.entries
            .read()
            .expect("lock poisoned")
            .get(&(application.to_string(), business_unit.clone()))
            .copied()
    }

    fn jws_signer(
        &self,
        application: &str,
        business_unit: &Did,
        _authentication_id: &str,
    ) -> Result<Arc<dyn JwsSigner>, EblError> {
        self.signers
            .read()
            .expect("lock poisoned")
            .get(&(application.to_string(), business_unit.clone()))
            .cloned()
            .ok_or_else(|| EblError::BusinessUnitNotFound(business_unit.to_string()))
    }

    fn jws_verifier(
        &self,
        application: &str,
        business_unit: &Did,
    ) -> Result<Arc<dyn JwsVerifier>, EblError> {
        self.verifiers
            .read()
            .expect("lock poisoned")
            .get(&(application.to_string(), business_unit.clone()))
            .cloned()
            .ok_or_else(|| EblError::BusinessUnitNotFound(business_unit.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_bu_fails_not_found() {
        let dir = InMemoryBuDirectory::new();
        let err = dir
            .require_active("app1", &Did::new("did:ex:nobody"))
            .unwrap_err();
        assert!(matches!(err, EblError::BusinessUnitNotFound(_)));
    }

    #[test]
    fn inactive_bu_fails_inactive() {
        let dir = InMemoryBuDirectory::new();
        dir.register("app1", Did::new("did:ex:a"), BuStatus::Inactive);
        let err = dir.require_active("app1", &Did::new("did:ex:a")).unwrap_err();
        assert!(matches!(err, EblError::BusinessUnitInactive(_)));
    }

    #[test]
    fn active_bu_passes() {
        let dir = InMemoryBuDirectory::new();
        dir.register("app1", Did::new("did:ex:a"), BuStatus::Active);
        dir.require_active("app1", &Did::new("did:ex:a")).unwrap();
    }

    #[test]
    fn scoped_to_application() {
        let dir = InMemoryBuDirectory::new();
        dir.register("app1", Did::new("did:ex:a"), BuStatus::Active);
        assert!(dir.require_active("app2", &Did::new("did:ex:a")).is_err());
    }

    #[test]
    fn require_known_accepts_inactive() {
        let dir = InMemoryBuDirectory::new();
        dir.register("app1", Did::new("did:ex:a"), BuStatus::Inactive);
        dir.require_known("app1", &Did::new("did:ex:a")).unwrap();
    }

    #[test]
    fn unregistered_signer_fails_not_found() {
        let dir = InMemoryBuDirectory::new();
        let err = dir
            .jws_signer("app1", &Did::new("did:ex:a"), "auth1")
            .unwrap_err();
        assert!(matches!(err, EblError::BusinessUnitNotFound(_)));
    }

    #[test]
    fn registered_signer_is_also_its_own_verifier() {
        use crate::test_support::Ed25519Signer;

        let dir = InMemoryBuDirectory::new();
        let material = Arc::new(Ed25519Signer::generate(Did::new("did:ex:a")));
        dir.register_signer("app1", Did::new("did:ex:a"), material);

        let signer = dir.jws_signer("app1", &Did::new("did:ex:a"), "auth1").unwrap();
        let verifier = dir.jws_verifier("app1", &Did::new("did:ex:a")).unwrap();

        let sig = signer.sign("EdDSA", b"hello").unwrap();
        verifier.verify("EdDSA", b"hello", &sig).unwrap();
    }
}
