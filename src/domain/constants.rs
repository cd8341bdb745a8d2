//! Centralized constants for ASN.1 tags, CMS object identifiers and
//! streaming limits.
//! Keep this intentionally small; only broadly reused literals should live here.

use der::asn1::ObjectIdentifier;

// === ASN.1 Tag Constants ===

/// End-of-contents marker tag for indefinite length encodings
pub const ASN1_EOC_TAG: u8 = 0x00;

/// ASN.1 INTEGER tag
pub const ASN1_INTEGER_TAG: u8 = 0x02;

/// ASN.1 OCTET STRING tag (primitive form)
pub const ASN1_OCTET_STRING_TAG: u8 = 0x04;

/// ASN.1 OCTET STRING tag (constructed form, BER only)
pub const ASN1_OCTET_STRING_CONSTRUCTED_TAG: u8 = 0x24;

/// ASN.1 OBJECT IDENTIFIER tag
pub const ASN1_OID_TAG: u8 = 0x06;

/// ASN.1 SEQUENCE tag
pub const ASN1_SEQUENCE_TAG: u8 = 0x30;

/// ASN.1 SET tag
pub const ASN1_SET_TAG: u8 = 0x31;

/// Context-specific constructed [0]
pub const CONTEXT_0_CONSTRUCTED: u8 = 0xA0;

/// Context-specific constructed [1]
pub const CONTEXT_1_CONSTRUCTED: u8 = 0xA1;

/// Context-specific primitive [0] (`SubjectKeyIdentifier` signer identifier)
pub const CONTEXT_0_PRIMITIVE: u8 = 0x80;

/// Indefinite length marker
pub const BER_INDEFINITE_LENGTH: u8 = 0x80;

/// Bit set on constructed tags
pub const CONSTRUCTED_BIT: u8 = 0x20;

// === PKCS#7/CMS OID Constants ===

/// id-data (1.2.840.113549.1.7.1)
pub const OID_PKCS7_DATA: ObjectIdentifier = ObjectIdentifier::new_unwrap("1.2.840.113549.1.7.1");

/// id-signedData (1.2.840.113549.1.7.2)
pub const OID_PKCS7_SIGNED_DATA: ObjectIdentifier =
    ObjectIdentifier::new_unwrap("1.2.840.113549.1.7.2");

/// id-contentType signed attribute (1.2.840.113549.1.9.3)
pub const OID_ATTR_CONTENT_TYPE: ObjectIdentifier =
    ObjectIdentifier::new_unwrap("1.2.840.113549.1.9.3");

/// id-messageDigest signed attribute (1.2.840.113549.1.9.4)
pub const OID_ATTR_MESSAGE_DIGEST: ObjectIdentifier =
    ObjectIdentifier::new_unwrap("1.2.840.113549.1.9.4");

// === X.509 extension OIDs used by the usage policy ===

/// id-at-commonName (2.5.4.3)
pub const OID_COMMON_NAME: ObjectIdentifier = ObjectIdentifier::new_unwrap("2.5.4.3");

/// id-ce-subjectKeyIdentifier (2.5.29.14)
pub const OID_SUBJECT_KEY_IDENTIFIER: ObjectIdentifier = ObjectIdentifier::new_unwrap("2.5.29.14");

/// id-ce-keyUsage (2.5.29.15)
pub const OID_KEY_USAGE: ObjectIdentifier = ObjectIdentifier::new_unwrap("2.5.29.15");

/// id-ce-extKeyUsage (2.5.29.37)
pub const OID_EXTENDED_KEY_USAGE: ObjectIdentifier = ObjectIdentifier::new_unwrap("2.5.29.37");

/// id-kp-codeSigning (1.3.6.1.5.5.7.3.3)
pub const OID_KP_CODE_SIGNING: ObjectIdentifier = ObjectIdentifier::new_unwrap("1.3.6.1.5.5.7.3.3");

/// id-kp-emailProtection (1.3.6.1.5.5.7.3.4)
pub const OID_KP_EMAIL_PROTECTION: ObjectIdentifier =
    ObjectIdentifier::new_unwrap("1.3.6.1.5.5.7.3.4");

/// anyExtendedKeyUsage (2.5.29.37.0)
pub const OID_ANY_EXTENDED_KEY_USAGE: ObjectIdentifier =
    ObjectIdentifier::new_unwrap("2.5.29.37.0");

// === Streaming limits ===

/// Default input block size fed to the decoder.
pub const DEFAULT_CHUNK_SIZE: usize = 4096;

/// Upper bound accepted for a configured input block size.
pub const MAX_CHUNK_SIZE: usize = 1024 * 1024;

/// Initial capacity of a decoder session arena.
pub const ARENA_INITIAL_CAPACITY: usize = 4096;

/// Largest single structural element (certificate, signer info, OID) the
/// streaming decoder retains in memory.
pub const MAX_RETAINED_ELEMENT_LEN: usize = 16 * 1024 * 1024;

/// Maximum nesting depth of ASN.1 elements within one content level.
pub const MAX_ELEMENT_DEPTH: usize = 64;

/// Maximum number of nested signed-data content levels.
pub const MAX_CONTENT_LEVELS: usize = 8;
