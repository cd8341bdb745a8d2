//! Per-signer cryptographic verification.
//!
//! Checks run in a fixed order and stop at the first problem: signer
//! certificate lookup, digest algorithm, signed attributes against the
//! streamed content digest, the signature itself, the certificate chain and
//! finally the usage policy.

use der::asn1::ObjectIdentifier;
use openssl::hash::hash;
use openssl::pkey::{Id, PKey, Public};
use openssl::pkey_ctx::PkeyCtx;
use openssl::rsa::Padding;
use openssl::x509::{X509Ref, X509StoreContext};

use crate::adapters::digest::DigestAlgorithm;
use crate::adapters::trust::store::OpenSslTrustStore;
use crate::domain::cms::SignedDataBlock;
use crate::domain::types::CertUsage;
use crate::domain::verification::VerificationStatus;

const OID_RSA_ENCRYPTION: ObjectIdentifier = ObjectIdentifier::new_unwrap("1.2.840.113549.1.1.1");
const OID_SHA1_WITH_RSA: ObjectIdentifier = ObjectIdentifier::new_unwrap("1.2.840.113549.1.1.5");
const OID_SHA256_WITH_RSA: ObjectIdentifier =
    ObjectIdentifier::new_unwrap("1.2.840.113549.1.1.11");
const OID_SHA384_WITH_RSA: ObjectIdentifier =
    ObjectIdentifier::new_unwrap("1.2.840.113549.1.1.12");
const OID_SHA512_WITH_RSA: ObjectIdentifier =
    ObjectIdentifier::new_unwrap("1.2.840.113549.1.1.13");
const OID_SHA224_WITH_RSA: ObjectIdentifier =
    ObjectIdentifier::new_unwrap("1.2.840.113549.1.1.14");
const OID_EC_PUBLIC_KEY: ObjectIdentifier = ObjectIdentifier::new_unwrap("1.2.840.10045.2.1");
const OID_ECDSA_WITH_SHA1: ObjectIdentifier = ObjectIdentifier::new_unwrap("1.2.840.10045.4.1");
const OID_ECDSA_WITH_SHA224: ObjectIdentifier =
    ObjectIdentifier::new_unwrap("1.2.840.10045.4.3.1");
const OID_ECDSA_WITH_SHA256: ObjectIdentifier =
    ObjectIdentifier::new_unwrap("1.2.840.10045.4.3.2");
const OID_ECDSA_WITH_SHA384: ObjectIdentifier =
    ObjectIdentifier::new_unwrap("1.2.840.10045.4.3.3");
const OID_ECDSA_WITH_SHA512: ObjectIdentifier =
    ObjectIdentifier::new_unwrap("1.2.840.10045.4.3.4");

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum KeyFamily {
    Rsa,
    Ec,
}

impl KeyFamily {
    fn from_signature_algorithm(oid: &ObjectIdentifier) -> Option<Self> {
        const RSA: [ObjectIdentifier; 6] = [
            OID_RSA_ENCRYPTION,
            OID_SHA1_WITH_RSA,
            OID_SHA224_WITH_RSA,
            OID_SHA256_WITH_RSA,
            OID_SHA384_WITH_RSA,
            OID_SHA512_WITH_RSA,
        ];
        const EC: [ObjectIdentifier; 6] = [
            OID_EC_PUBLIC_KEY,
            OID_ECDSA_WITH_SHA1,
            OID_ECDSA_WITH_SHA224,
            OID_ECDSA_WITH_SHA256,
            OID_ECDSA_WITH_SHA384,
            OID_ECDSA_WITH_SHA512,
        ];
        if RSA.contains(oid) {
            Some(KeyFamily::Rsa)
        } else if EC.contains(oid) {
            Some(KeyFamily::Ec)
        } else {
            None
        }
    }

    fn id(self) -> Id {
        match self {
            KeyFamily::Rsa => Id::RSA,
            KeyFamily::Ec => Id::EC,
        }
    }
}

pub(super) fn check_signer(
    store: &OpenSslTrustStore,
    block: &SignedDataBlock,
    index: usize,
    usage: CertUsage,
) -> VerificationStatus {
    match verify(store, block, index, usage) {
        Ok(()) => VerificationStatus::Valid,
        Err(status) => {
            log::debug!("signer {index}: {status}");
            status
        }
    }
}

fn verify(
    store: &OpenSslTrustStore,
    block: &SignedDataBlock,
    index: usize,
    usage: CertUsage,
) -> Result<(), VerificationStatus> {
    let signer = block
        .signers
        .get(index)
        .ok_or(VerificationStatus::ProcessingError)?;
    let cert = store
        .find(&signer.sid)
        .ok_or(VerificationStatus::SigningCertNotFound)?;

    let algorithm = DigestAlgorithm::from_oid(&signer.digest_algorithm)
        .ok_or(VerificationStatus::SignatureAlgorithmUnknown)?;
    let content_digest = block
        .content_digest(&signer.digest_algorithm)
        .ok_or(VerificationStatus::SignatureAlgorithmUnknown)?;

    let signed_digest = match &signer.signed_attributes {
        Some(attributes) => {
            let message_digest = attributes
                .message_digest
                .as_deref()
                .ok_or(VerificationStatus::MalformedSignature)?;
            if message_digest != content_digest {
                return Err(VerificationStatus::DigestMismatch);
            }
            if attributes.content_type != Some(block.encapsulated_content_type.oid()) {
                return Err(VerificationStatus::MalformedSignature);
            }
            hash(algorithm.message_digest(), &attributes.encoded_set)
                .map_err(|_| VerificationStatus::ProcessingError)?
                .to_vec()
        }
        None => content_digest.to_vec(),
    };

    let family = KeyFamily::from_signature_algorithm(&signer.signature_algorithm)
        .ok_or(VerificationStatus::UnsupportedSignatureAlgorithm)?;
    let public_key = cert
        .x509
        .public_key()
        .map_err(|_| VerificationStatus::ProcessingError)?;
    verify_signature(&public_key, family, algorithm, &signed_digest, &signer.signature)?;

    verify_chain(store, &cert.x509)?;
    cert.analysis.permits(usage).map_err(|reason| {
        log::debug!("signer {index}: {reason}");
        VerificationStatus::SigningCertNotTrusted
    })
}

fn verify_signature(
    public_key: &PKey<Public>,
    family: KeyFamily,
    algorithm: DigestAlgorithm,
    digest: &[u8],
    signature: &[u8],
) -> Result<(), VerificationStatus> {
    if public_key.id() != family.id() {
        return Err(VerificationStatus::MalformedSignature);
    }
    let processing = |_| VerificationStatus::ProcessingError;
    let mut ctx = PkeyCtx::new(public_key).map_err(processing)?;
    ctx.verify_init().map_err(processing)?;
    if family == KeyFamily::Rsa {
        ctx.set_rsa_padding(Padding::PKCS1).map_err(processing)?;
    }
    ctx.set_signature_md(algorithm.md()).map_err(processing)?;
    match ctx.verify(digest, signature) {
        Ok(true) => Ok(()),
        Ok(false) | Err(_) => Err(VerificationStatus::BadSignature),
    }
}

fn verify_chain(store: &OpenSslTrustStore, cert: &X509Ref) -> Result<(), VerificationStatus> {
    let chain = store
        .untrusted_chain()
        .map_err(|_| VerificationStatus::ProcessingError)?;
    let mut ctx = X509StoreContext::new().map_err(|_| VerificationStatus::ProcessingError)?;
    let (verified, result) = ctx
        .init(store.roots(), cert, &chain, |c| {
            let verified = c.verify_cert()?;
            Ok((verified, c.error()))
        })
        .map_err(|_| VerificationStatus::ProcessingError)?;
    if verified {
        Ok(())
    } else {
        log::debug!("certificate chain rejected: {result}");
        Err(VerificationStatus::SigningCertNotTrusted)
    }
}
