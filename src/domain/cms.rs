//! In-memory model of a decoded CMS / PKCS#7 message.
//!
//! Produced by the decode engine once all input has been consumed and owned
//! by the verification engine afterwards. Content bytes are never retained
//! here: they were streamed to the output sink and only their digests
//! survive, one per digest algorithm the signed-data level declared.

use std::fmt;

use der::asn1::ObjectIdentifier;

use crate::domain::constants::{OID_PKCS7_DATA, OID_PKCS7_SIGNED_DATA};
use crate::domain::verification::VerificationStatus;

/// Content type tag of one content level.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContentType {
    Data,
    SignedData,
    Other(ObjectIdentifier),
}

impl ContentType {
    #[must_use]
    pub fn from_oid(oid: ObjectIdentifier) -> Self {
        if oid == OID_PKCS7_DATA {
            ContentType::Data
        } else if oid == OID_PKCS7_SIGNED_DATA {
            ContentType::SignedData
        } else {
            ContentType::Other(oid)
        }
    }

    #[must_use]
    pub fn oid(&self) -> ObjectIdentifier {
        match self {
            ContentType::Data => OID_PKCS7_DATA,
            ContentType::SignedData => OID_PKCS7_SIGNED_DATA,
            ContentType::Other(oid) => *oid,
        }
    }

    #[must_use]
    pub fn is_signed_data(&self) -> bool {
        matches!(self, ContentType::SignedData)
    }
}

impl fmt::Display for ContentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ContentType::Data => f.write_str("data"),
            ContentType::SignedData => f.write_str("signedData"),
            ContentType::Other(oid) => write!(f, "{oid}"),
        }
    }
}

/// Digest of the encapsulated content for one declared digest algorithm.
#[derive(Clone, PartialEq, Eq)]
pub struct ContentDigest {
    pub algorithm: ObjectIdentifier,
    pub value: Vec<u8>,
}

impl fmt::Debug for ContentDigest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ContentDigest({}, {})", self.algorithm, hex::encode(&self.value))
    }
}

/// How a `SignerInfo` names its certificate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SignerIdentifier {
    /// DER of the issuer `Name` plus the big-endian serial number bytes
    /// as encoded (including any leading zero).
    IssuerAndSerialNumber { issuer: Vec<u8>, serial: Vec<u8> },
    SubjectKeyIdentifier(Vec<u8>),
}

/// Authenticated attributes of one signer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedAttributes {
    /// The attributes re-tagged as a DER `SET OF`, i.e. the exact bytes the
    /// signature is computed over.
    pub encoded_set: Vec<u8>,
    pub content_type: Option<ObjectIdentifier>,
    pub message_digest: Option<Vec<u8>>,
}

/// One signature of a signed-data level.
#[derive(Debug, Clone)]
pub struct SignerInfo {
    pub version: u32,
    pub sid: SignerIdentifier,
    pub digest_algorithm: ObjectIdentifier,
    pub signed_attributes: Option<SignedAttributes>,
    pub signature_algorithm: ObjectIdentifier,
    pub signature: Vec<u8>,
    status: VerificationStatus,
}

impl SignerInfo {
    #[must_use]
    pub fn new(
        version: u32,
        sid: SignerIdentifier,
        digest_algorithm: ObjectIdentifier,
        signed_attributes: Option<SignedAttributes>,
        signature_algorithm: ObjectIdentifier,
        signature: Vec<u8>,
    ) -> Self {
        Self {
            version,
            sid,
            digest_algorithm,
            signed_attributes,
            signature_algorithm,
            signature,
            status: VerificationStatus::Unverified,
        }
    }

    /// Status recorded by the last verification; `Unverified` until then.
    #[must_use]
    pub fn status(&self) -> VerificationStatus {
        self.status
    }

    pub fn set_status(&mut self, status: VerificationStatus) {
        self.status = status;
    }
}

/// Signed-data content of one level.
#[derive(Debug, Clone)]
pub struct SignedDataBlock {
    pub version: u32,
    pub digest_algorithms: Vec<ObjectIdentifier>,
    pub encapsulated_content_type: ContentType,
    /// False for detached signatures (no eContent in the stream).
    pub content_present: bool,
    pub content_digests: Vec<ContentDigest>,
    /// Embedded certificates, DER encoded, in encoding order.
    pub certificates: Vec<Vec<u8>>,
    pub signers: Vec<SignerInfo>,
}

impl SignedDataBlock {
    #[must_use]
    pub fn signer_count(&self) -> usize {
        self.signers.len()
    }

    /// Streamed content digest for `algorithm`, if that algorithm was
    /// declared and supported while decoding.
    #[must_use]
    pub fn content_digest(&self, algorithm: &ObjectIdentifier) -> Option<&[u8]> {
        self.content_digests
            .iter()
            .find(|d| &d.algorithm == algorithm)
            .map(|d| d.value.as_slice())
    }
}

/// One nested content layer.
#[derive(Debug, Clone)]
pub struct ContentLevel {
    pub content_type: ContentType,
    pub signed_data: Option<SignedDataBlock>,
}

impl ContentLevel {
    #[must_use]
    pub fn data() -> Self {
        Self {
            content_type: ContentType::Data,
            signed_data: None,
        }
    }

    #[must_use]
    pub fn signed(block: SignedDataBlock) -> Self {
        Self {
            content_type: ContentType::SignedData,
            signed_data: Some(block),
        }
    }
}

/// Fully decoded message: content levels from outer to inner.
#[derive(Debug, Clone, Default)]
pub struct DecodedMessage {
    levels: Vec<ContentLevel>,
}

impl DecodedMessage {
    #[must_use]
    pub fn new(levels: Vec<ContentLevel>) -> Self {
        Self { levels }
    }

    #[must_use]
    pub fn level_count(&self) -> usize {
        self.levels.len()
    }

    #[must_use]
    pub fn levels(&self) -> &[ContentLevel] {
        &self.levels
    }

    pub fn levels_mut(&mut self) -> &mut [ContentLevel] {
        &mut self.levels
    }

    /// True when any content level is signed data.
    #[must_use]
    pub fn is_signed(&self) -> bool {
        self.levels.iter().any(|l| l.content_type.is_signed_data())
    }

    #[must_use]
    pub fn signer_total(&self) -> usize {
        self.levels
            .iter()
            .filter_map(|l| l.signed_data.as_ref())
            .map(SignedDataBlock::signer_count)
            .sum()
    }
}
