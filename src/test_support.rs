//! In-memory stand-ins for the signing/verification boundary defined in
//! [`crate::envelope`]. Kept out of `#[cfg(test)]` so integration tests
//! under `tests/` can build packs and envelopes without a real KMS or CA.

use ed25519_dalek::{Signature, Signer as _, SigningKey, Verifier as _, VerifyingKey};
use rand::rngs::OsRng;

use crate::envelope::{CertificateChain, JwsSigner, JwsVerifier};
use crate::error::EblError;
use crate::ids::Did;

const ROOT_CERT: &[u8] = b"test-root-ca-0001";

/// A self-signing, self-verifying Ed25519 key standing in for a business
/// unit's custodied signing key and the certificate authority that issued
/// it.
pub struct Ed25519Signer {
    business_unit: Did,
    signing_key: SigningKey,
    verifying_key: VerifyingKey,
    algorithms: Vec<String>,
}

impl Ed25519Signer {
    pub fn generate(business_unit: Did) -> Self {
        let signing_key = SigningKey::generate(&mut OsRng);
        let verifying_key = signing_key.verifying_key();
        Ed25519Signer {
            business_unit,
            signing_key,
            verifying_key,
            algorithms: vec!["EdDSA".to_string()],
        }
    }

    /// The fixed root certificate bytes every signer minted by this test
    /// double chains to.
    pub fn root_certificate(&self) -> Vec<u8> {
        ROOT_CERT.to_vec()
    }
}

impl CertificateChain for Ed25519Signer {
    fn chain(&self) -> Vec<Vec<u8>> {
        vec![self.verifying_key.to_bytes().to_vec(), ROOT_CERT.to_vec()]
    }
}

impl JwsSigner for Ed25519Signer {
    fn available_algorithms(&self) -> &[String] {
        &self.algorithms
    }

    fn sign(&self, algorithm: &str, payload: &[u8]) -> Result<Vec<u8>, EblError> {
        if algorithm != "EdDSA" {
            return Err(EblError::SigningFailed(format!(
                "unsupported algorithm {algorithm}"
            )));
        }
        Ok(self.signing_key.sign(payload).to_bytes().to_vec())
    }

    fn certificate_chain(&self) -> &dyn CertificateChain {
        self
    }

    fn business_unit(&self) -> &Did {
        &self.business_unit
    }
}

impl JwsVerifier for Ed25519Signer {
    fn verify(&self, algorithm: &str, payload: &[u8], signature: &[u8]) -> Result<(), EblError> {
        if algorithm != "EdDSA" {
            return Err(EblError::SigningFailed(format!(
                "unsupported algorithm {algorithm}"
            )));
        }
        let sig_bytes: [u8; 64] = signature
            .try_into()
            .map_err(|_| EblError::SigningFailed("malformed signature length".into()))?;
        let signature = Signature::from_bytes(&sig_bytes);
        self.verifying_key
            .verify(payload, &signature)
            .map_err(|e| EblError::SigningFailed(format!("signature verification failed: {e}")))
    }
}
