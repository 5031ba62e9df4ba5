//! Decentralized Identifier handling for business units and packs.

use uuid7::uuid7;

/// A Decentralized Identifier string, e.g. `did:openebl:...`.
///
/// Kept as an opaque newtype rather than a bare `String` so that the
/// state machine and metadata builder can't accidentally compare a DID
/// against an unrelated string slot.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct Did(String);

impl Did {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<String> for Did {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl From<&str> for Did {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl std::fmt::Display for Did {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl<C> minicbor::Encode<C> for Did {
    fn encode<W: minicbor::encode::Write>(
        &self,
        e: &mut minicbor::Encoder<W>,
        ctx: &mut C,
    ) -> Result<(), minicbor::encode::Error<W::Error>> {
        self.0.encode(e, ctx)
    }
}

impl<'b, C> minicbor::Decode<'b, C> for Did {
    fn decode(d: &mut minicbor::Decoder<'b>, ctx: &mut C) -> Result<Self, minicbor::decode::Error> {
        String::decode(d, ctx).map(Did)
    }
}

/// Generates a fresh bech32m-encoded identifier under the given human-readable
/// prefix, e.g. `new_bech32_id("pack_")` -> `pack_1qqq...`.
///
/// Used to mint pack ids and, in tests, fixture business-unit DIDs.
pub fn new_bech32_id(hrp: &str) -> anyhow::Result<String> {
    let hrp = bech32::Hrp::parse(hrp)?;
    let encoded = bech32::encode::<bech32::Bech32m>(hrp, uuid7().as_bytes())?;
    Ok(encoded)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bech32_id_carries_prefix() {
        let id = new_bech32_id("pack_").unwrap();
        assert!(id.starts_with("pack_1"));
    }

    #[test]
    fn bech32_id_rejects_empty_hrp() {
        assert!(new_bech32_id("").is_err());
    }

    #[test]
    fn did_roundtrips_through_cbor() {
        let did = Did::new("did:openebl:abc123");
        let encoded = minicbor::to_vec(&did).unwrap();
        let decoded: Did = minicbor::decode(&encoded).unwrap();
        assert_eq!(did, decoded);
    }
}
