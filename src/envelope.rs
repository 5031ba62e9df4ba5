//! Canonicalizes a pack, requests a JWS-shaped signature from the acting
//! business unit's key custodian, and attaches its certificate chain. See
//! spec §4.D.
//!
//! The real certificate authority, KMS, and JOSE wire codec are external
//! collaborators (spec §1/§6) this crate only depends on through the
//! [`JwsSigner`]/[`CertificateChain`]/[`JwsVerifier`] traits below.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine as _;
use sha2::{Digest, Sha256, Sha512};

use crate::error::EblError;
use crate::ids::Did;
use crate::pack::Pack;

/// Supplies the leaf certificate plus intermediate chain for a business
/// unit's signing key, in leaf-to-root order, ready for a JWS `x5c` header.
pub trait CertificateChain: Send + Sync {
    fn chain(&self) -> Vec<Vec<u8>>;
}

/// A signing key bound to (application, business unit, authentication id),
/// obtained from the BU directory per spec §4.D step 1.
pub trait JwsSigner: Send + Sync {
    /// Algorithms this signer can produce, in preference order. Envelope
    /// signing always uses the first entry.
    fn available_algorithms(&self) -> &[String];

    fn sign(&self, algorithm: &str, payload: &[u8]) -> Result<Vec<u8>, EblError>;

    fn certificate_chain(&self) -> &dyn CertificateChain;

    /// The business unit this signer is bound to.
    fn business_unit(&self) -> &Did;
}

/// Verifies a signature produced by the matching [`JwsSigner`] algorithm.
/// Downstream code (load-time verification) depends only on this trait, not
/// on any particular crypto backend.
pub trait JwsVerifier: Send + Sync {
    fn verify(&self, algorithm: &str, payload: &[u8], signature: &[u8]) -> Result<(), EblError>;
}

#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, PartialEq, Eq)]
pub struct Header {
    #[n(0)]
    pub algorithm: String,
    #[n(1)]
    pub signer: Did,
    #[n(2)]
    pub x5c: Vec<Vec<u8>>,
}

/// A signed, self-contained pack version: compact JWS-shaped header,
/// payload (canonical CBOR-encoded pack), and signature, joined with `.`
/// when serialized to its wire form via [`Envelope::to_compact`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Envelope {
    pub header: Header,
    pub payload: Vec<u8>,
    pub signature: Vec<u8>,
}

impl Envelope {
    /// Signs `pack` with the first algorithm `signer` advertises, carrying
    /// its certificate chain in the header.
    pub fn sign(pack: &Pack, signer: &dyn JwsSigner) -> Result<Self, EblError> {
        let algorithm = signer
            .available_algorithms()
            .first()
            .ok_or_else(|| EblError::SigningFailed("signer advertises no algorithms".into()))?
            .clone();
        let payload = pack.canonical_bytes()?;
        let signature = signer.sign(&algorithm, &payload)?;

        Ok(Envelope {
            header: Header {
                algorithm,
                signer: signer.business_unit().clone(),
                x5c: signer.certificate_chain().chain(),
            },
            payload,
            signature,
        })
    }

    /// Compact wire form: `base64url(header) . base64url(payload) . base64url(signature)`.
    pub fn to_compact(&self) -> Result<String, EblError> {
        let header_bytes = minicbor::to_vec(&self.header)?;
        Ok(format!(
            "{}.{}.{}",
            URL_SAFE_NO_PAD.encode(header_bytes),
            URL_SAFE_NO_PAD.encode(&self.payload),
            URL_SAFE_NO_PAD.encode(&self.signature),
        ))
    }

    pub fn from_compact(s: &str) -> Result<Self, EblError> {
        let mut parts = s.split('.');
        let (Some(h), Some(p), Some(sig), None) =
            (parts.next(), parts.next(), parts.next(), parts.next())
        else {
            return Err(EblError::InvalidRequest(
                "malformed envelope: expected exactly 3 dot-separated segments".into(),
            ));
        };

        let header_bytes = URL_SAFE_NO_PAD
            .decode(h)
            .map_err(|e| EblError::InvalidRequest(format!("bad envelope header encoding: {e}")))?;
        let header: Header = minicbor::decode(&header_bytes)?;
        let payload = URL_SAFE_NO_PAD
            .decode(p)
            .map_err(|e| EblError::InvalidRequest(format!("bad envelope payload encoding: {e}")))?;
        let signature = URL_SAFE_NO_PAD
            .decode(sig)
            .map_err(|e| EblError::InvalidRequest(format!("bad envelope signature encoding: {e}")))?;

        Ok(Envelope {
            header,
            payload,
            signature,
        })
    }

    /// Parses the payload back into a [`Pack`]. Callers that need verified
    /// data should call [`Envelope::verify`] first.
    pub fn pack(&self) -> Result<Pack, EblError> {
        Ok(minicbor::decode(&self.payload)?)
    }

    /// Checks the signature, confirms the declared signer matches the acting
    /// business unit, and confirms the leaf certificate chains to one of
    /// `roots` (by direct byte membership of the chain's root entry — a full
    /// X.509 path-validation walk is the certificate authority's job,
    /// out of scope per spec §1/§9).
    pub fn verify(
        &self,
        verifier: &dyn JwsVerifier,
        roots: &[Vec<u8>],
        expected_signer: &Did,
    ) -> Result<(), EblError> {
        if self.header.signer != *expected_signer {
            return Err(EblError::SigningFailed(format!(
                "envelope signed by {} but expected {expected_signer}",
                self.header.signer
            )));
        }

        verifier.verify(&self.header.algorithm, &self.payload, &self.signature)?;

        let root = self
            .header
            .x5c
            .last()
            .ok_or_else(|| EblError::SigningFailed("envelope carries no certificate chain".into()))?;
        if !roots.iter().any(|r| r == root) {
            return Err(EblError::SigningFailed(
                "certificate chain does not terminate in a trusted root".into(),
            ));
        }

        Ok(())
    }

    /// Document id seen by the relay/store: a strong hash of the signed
    /// envelope bytes.
    pub fn document_id(&self) -> Result<String, EblError> {
        Ok(hex::encode(Sha256::digest(self.to_compact()?.as_bytes())))
    }

    /// `parent_hash` for the next version: SHA-512 of these envelope bytes.
    pub fn parent_hash(&self) -> Result<String, EblError> {
        Ok(hex::encode(Sha512::digest(self.to_compact()?.as_bytes())))
    }
}
