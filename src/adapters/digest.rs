//! OpenSSL-backed digest support.
//!
//! Maps CMS digest algorithm identifiers to OpenSSL digests and hashes the
//! encapsulated content incrementally while it streams through the decoder.

use der::asn1::ObjectIdentifier;
use openssl::hash::{Hasher, MessageDigest};
use openssl::md::{Md, MdRef};

use crate::domain::cms::ContentDigest;
use crate::infra::error::{P7vError, P7vResult};

/// id-sha1 (1.3.14.3.2.26)
pub const OID_SHA1: ObjectIdentifier = ObjectIdentifier::new_unwrap("1.3.14.3.2.26");
/// id-sha224 (2.16.840.1.101.3.4.2.4)
pub const OID_SHA224: ObjectIdentifier = ObjectIdentifier::new_unwrap("2.16.840.1.101.3.4.2.4");
/// id-sha256 (2.16.840.1.101.3.4.2.1)
pub const OID_SHA256: ObjectIdentifier = ObjectIdentifier::new_unwrap("2.16.840.1.101.3.4.2.1");
/// id-sha384 (2.16.840.1.101.3.4.2.2)
pub const OID_SHA384: ObjectIdentifier = ObjectIdentifier::new_unwrap("2.16.840.1.101.3.4.2.2");
/// id-sha512 (2.16.840.1.101.3.4.2.3)
pub const OID_SHA512: ObjectIdentifier = ObjectIdentifier::new_unwrap("2.16.840.1.101.3.4.2.3");

/// Digest algorithms accepted for signer verification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DigestAlgorithm {
    Sha1,
    Sha224,
    Sha256,
    Sha384,
    Sha512,
}

impl DigestAlgorithm {
    #[must_use]
    pub fn from_oid(oid: &ObjectIdentifier) -> Option<Self> {
        match *oid {
            o if o == OID_SHA1 => Some(DigestAlgorithm::Sha1),
            o if o == OID_SHA224 => Some(DigestAlgorithm::Sha224),
            o if o == OID_SHA256 => Some(DigestAlgorithm::Sha256),
            o if o == OID_SHA384 => Some(DigestAlgorithm::Sha384),
            o if o == OID_SHA512 => Some(DigestAlgorithm::Sha512),
            _ => None,
        }
    }

    #[must_use]
    pub fn message_digest(self) -> MessageDigest {
        match self {
            DigestAlgorithm::Sha1 => MessageDigest::sha1(),
            DigestAlgorithm::Sha224 => MessageDigest::sha224(),
            DigestAlgorithm::Sha256 => MessageDigest::sha256(),
            DigestAlgorithm::Sha384 => MessageDigest::sha384(),
            DigestAlgorithm::Sha512 => MessageDigest::sha512(),
        }
    }

    /// Digest handle used when verifying a signature over a precomputed hash.
    #[must_use]
    pub fn md(self) -> &'static MdRef {
        match self {
            DigestAlgorithm::Sha1 => Md::sha1(),
            DigestAlgorithm::Sha224 => Md::sha224(),
            DigestAlgorithm::Sha256 => Md::sha256(),
            DigestAlgorithm::Sha384 => Md::sha384(),
            DigestAlgorithm::Sha512 => Md::sha512(),
        }
    }
}

/// Running digests of one signed-data level's content.
pub struct DigestSet {
    entries: Vec<(ObjectIdentifier, Hasher)>,
}

impl DigestSet {
    /// Start a hasher for every supported, distinct algorithm in `algorithms`.
    /// Unsupported algorithms are skipped; signers using them cannot verify.
    pub fn new(algorithms: &[ObjectIdentifier]) -> P7vResult<Self> {
        let mut entries: Vec<(ObjectIdentifier, Hasher)> = Vec::new();
        for oid in algorithms {
            if entries.iter().any(|(seen, _)| seen == oid) {
                continue;
            }
            let Some(algorithm) = DigestAlgorithm::from_oid(oid) else {
                log::debug!("digest algorithm {oid} not supported, not hashing content for it");
                continue;
            };
            let hasher = Hasher::new(algorithm.message_digest()).map_err(|e| {
                P7vError::DecoderUpdateFailed(format!("cannot start {algorithm:?} digest: {e}"))
            })?;
            entries.push((*oid, hasher));
        }
        Ok(Self { entries })
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn update(&mut self, data: &[u8]) -> P7vResult<()> {
        for (oid, hasher) in &mut self.entries {
            hasher
                .update(data)
                .map_err(|e| P7vError::DecoderUpdateFailed(format!("digest {oid} update: {e}")))?;
        }
        Ok(())
    }

    pub fn finish(self) -> P7vResult<Vec<ContentDigest>> {
        self.entries
            .into_iter()
            .map(|(algorithm, mut hasher)| {
                let value = hasher.finish().map_err(|e| {
                    P7vError::DecoderFinishFailed(format!("digest {algorithm} finish: {e}"))
                })?;
                Ok(ContentDigest {
                    algorithm,
                    value: value.to_vec(),
                })
            })
            .collect()
    }
}
