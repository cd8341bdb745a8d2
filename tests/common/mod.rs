//! Shared fixtures for integration tests.
//!
//! Certificates and signatures are generated with OpenSSL at test time.
//! Structures OpenSSL cannot produce directly (nested signed data, several
//! signers, damaged certificates) are assembled by hand with the DER helpers
//! below and signed with the same keys.

#![allow(dead_code)]

use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

use openssl::asn1::Asn1Time;
use openssl::bn::BigNum;
use openssl::hash::{hash, MessageDigest};
use openssl::pkcs7::{Pkcs7, Pkcs7Flags};
use openssl::pkey::{PKey, Private};
use openssl::rsa::Rsa;
use openssl::sign::Signer;
use openssl::stack::Stack;
use openssl::x509::extension::{
    BasicConstraints, ExtendedKeyUsage, KeyUsage, SubjectKeyIdentifier,
};
use openssl::x509::{X509Builder, X509NameBuilder, X509};
use tempfile::TempDir;

use p7verify::{
    verify_package, Diagnostics, InputSource, OutputTarget, RunOutcome, VerifyOptions,
    VerifyRequest,
};

pub const OID_DATA: &[u8] = &[0x2a, 0x86, 0x48, 0x86, 0xf7, 0x0d, 0x01, 0x07, 0x01];
pub const OID_SIGNED_DATA: &[u8] = &[0x2a, 0x86, 0x48, 0x86, 0xf7, 0x0d, 0x01, 0x07, 0x02];
const OID_SHA256: &[u8] = &[0x60, 0x86, 0x48, 0x01, 0x65, 0x03, 0x04, 0x02, 0x01];
const OID_RSA_ENCRYPTION: &[u8] = &[0x2a, 0x86, 0x48, 0x86, 0xf7, 0x0d, 0x01, 0x01, 0x01];
const OID_CONTENT_TYPE: &[u8] = &[0x2a, 0x86, 0x48, 0x86, 0xf7, 0x0d, 0x01, 0x09, 0x03];
const OID_MESSAGE_DIGEST: &[u8] = &[0x2a, 0x86, 0x48, 0x86, 0xf7, 0x0d, 0x01, 0x09, 0x04];

static NEXT_SERIAL: AtomicU32 = AtomicU32::new(1);

// ---------------------------------------------------------------------------
// DER helpers
// ---------------------------------------------------------------------------

pub fn der(tag: u8, content: &[u8]) -> Vec<u8> {
    let mut out = vec![tag];
    let len = content.len();
    if len < 0x80 {
        out.push(len as u8);
    } else {
        let bytes: Vec<u8> = len
            .to_be_bytes()
            .into_iter()
            .skip_while(|b| *b == 0)
            .collect();
        out.push(0x80 | bytes.len() as u8);
        out.extend_from_slice(&bytes);
    }
    out.extend_from_slice(content);
    out
}

pub fn seq(parts: &[&[u8]]) -> Vec<u8> {
    der(0x30, &parts.concat())
}

fn set(parts: &[&[u8]]) -> Vec<u8> {
    der(0x31, &parts.concat())
}

fn oid(bytes: &[u8]) -> Vec<u8> {
    der(0x06, bytes)
}

fn integer(magnitude: &[u8]) -> Vec<u8> {
    let trimmed: Vec<u8> = magnitude.iter().copied().skip_while(|b| *b == 0).collect();
    let mut content = trimmed;
    if content.is_empty() || content[0] & 0x80 != 0 {
        content.insert(0, 0);
    }
    der(0x02, &content)
}

fn sha256_algorithm() -> Vec<u8> {
    seq(&[&oid(OID_SHA256), &[0x05, 0x00]])
}

/// Length of the identifier and length octets of a definite DER element.
pub fn header_len(element: &[u8]) -> usize {
    match element[1] {
        len if len < 0x80 => 2,
        len => 2 + usize::from(len & 0x7f),
    }
}

/// `ContentInfo { content_type, [0] content }`.
pub fn content_info(content_type: &[u8], content: &[u8]) -> Vec<u8> {
    seq(&[&oid(content_type), &der(0xa0, content)])
}

/// Unsigned `ContentInfo` of type data.
pub fn data_message(payload: &[u8]) -> Vec<u8> {
    content_info(OID_DATA, &der(0x04, payload))
}

/// Re-encode the outer `ContentInfo` of a DER message with indefinite
/// lengths, leaving the inner signed data untouched.
pub fn outer_to_ber(message: &[u8]) -> Vec<u8> {
    let body = &message[header_len(message)..];
    let oid_len = header_len(body) + usize::from(body[1]);
    let (type_oid, explicit) = body.split_at(oid_len);
    let content = &explicit[header_len(explicit)..];

    let mut out = vec![0x30, 0x80];
    out.extend_from_slice(type_oid);
    out.extend_from_slice(&[0xa0, 0x80]);
    out.extend_from_slice(content);
    out.extend_from_slice(&[0x00, 0x00, 0x00, 0x00]);
    out
}

/// Flip one byte of the first occurrence of `needle` in `message`.
pub fn tamper(message: &[u8], needle: &[u8]) -> Vec<u8> {
    let at = message
        .windows(needle.len())
        .position(|w| w == needle)
        .expect("needle present in message");
    let mut out = message.to_vec();
    out[at] ^= 0x01;
    out
}

// ---------------------------------------------------------------------------
// PKI fixtures
// ---------------------------------------------------------------------------

/// Which extensions a leaf certificate carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LeafProfile {
    CodeSigning,
    EmailProtection,
    Bare,
}

pub struct Identity {
    pub cert: X509,
    pub key: PKey<Private>,
}

pub fn rsa_key() -> PKey<Private> {
    PKey::from_rsa(Rsa::generate(2048).unwrap()).unwrap()
}

fn x509_builder(cn: &str, key: &PKey<Private>) -> X509Builder {
    let mut name = X509NameBuilder::new().unwrap();
    name.append_entry_by_text("O", "p7verify tests").unwrap();
    name.append_entry_by_text("CN", cn).unwrap();
    let name = name.build();

    let serial = BigNum::from_u32(NEXT_SERIAL.fetch_add(1, Ordering::SeqCst) + 0x7f00)
        .unwrap()
        .to_asn1_integer()
        .unwrap();

    let mut builder = X509Builder::new().unwrap();
    builder.set_version(2).unwrap();
    builder.set_serial_number(&serial).unwrap();
    builder.set_subject_name(&name).unwrap();
    builder.set_issuer_name(&name).unwrap();
    builder.set_pubkey(key).unwrap();
    builder
        .set_not_before(&Asn1Time::days_from_now(0).unwrap())
        .unwrap();
    builder
        .set_not_after(&Asn1Time::days_from_now(365).unwrap())
        .unwrap();
    builder
}

/// Self-signed certification authority.
pub fn make_ca(cn: &str) -> Identity {
    let key = rsa_key();
    let mut builder = x509_builder(cn, &key);
    builder
        .append_extension(BasicConstraints::new().critical().ca().build().unwrap())
        .unwrap();
    builder
        .append_extension(
            KeyUsage::new()
                .critical()
                .key_cert_sign()
                .crl_sign()
                .build()
                .unwrap(),
        )
        .unwrap();
    let ski = SubjectKeyIdentifier::new()
        .build(&builder.x509v3_context(None, None))
        .unwrap();
    builder.append_extension(ski).unwrap();
    builder.sign(&key, MessageDigest::sha256()).unwrap();
    Identity {
        cert: builder.build(),
        key,
    }
}

impl Identity {
    /// Issue a leaf certificate signed by this authority.
    pub fn issue(&self, cn: &str, profile: LeafProfile) -> Identity {
        let key = rsa_key();
        let mut builder = x509_builder(cn, &key);
        builder.set_issuer_name(self.cert.subject_name()).unwrap();
        match profile {
            LeafProfile::CodeSigning => {
                builder
                    .append_extension(KeyUsage::new().critical().digital_signature().build().unwrap())
                    .unwrap();
                builder
                    .append_extension(ExtendedKeyUsage::new().code_signing().build().unwrap())
                    .unwrap();
            }
            LeafProfile::EmailProtection => {
                builder
                    .append_extension(
                        KeyUsage::new()
                            .critical()
                            .digital_signature()
                            .non_repudiation()
                            .build()
                            .unwrap(),
                    )
                    .unwrap();
                builder
                    .append_extension(ExtendedKeyUsage::new().email_protection().build().unwrap())
                    .unwrap();
            }
            LeafProfile::Bare => {}
        }
        builder.sign(&self.key, MessageDigest::sha256()).unwrap();
        Identity {
            cert: builder.build(),
            key,
        }
    }
}

/// Trust store directory holding the PEM of each authority.
pub fn trust_dir(authorities: &[&Identity]) -> TempDir {
    let dir = tempfile::tempdir().unwrap();
    for (i, ca) in authorities.iter().enumerate() {
        fs::write(dir.path().join(format!("ca{i}.pem")), ca.cert.to_pem().unwrap()).unwrap();
    }
    dir
}

/// PKCS#7 signed-data message produced by OpenSSL itself.
pub fn openssl_signed(signer: &Identity, payload: &[u8], flags: Pkcs7Flags) -> Vec<u8> {
    let extra: Stack<X509> = Stack::new().unwrap();
    Pkcs7::sign(&signer.cert, &signer.key, &extra, payload, flags | Pkcs7Flags::BINARY)
        .unwrap()
        .to_der()
        .unwrap()
}

// ---------------------------------------------------------------------------
// Hand-assembled signed data
// ---------------------------------------------------------------------------

/// One `SignerInfo` to emit.
pub struct SignerEntry<'a> {
    pub identity: &'a Identity,
    /// Damage the signature value after signing.
    pub corrupt: bool,
}

impl<'a> SignerEntry<'a> {
    pub fn good(identity: &'a Identity) -> Self {
        Self {
            identity,
            corrupt: false,
        }
    }

    pub fn corrupted(identity: &'a Identity) -> Self {
        Self {
            identity,
            corrupt: true,
        }
    }
}

/// Builder for a CMS `SignedData` with signed attributes over SHA-256.
pub struct SignedDataBuilder<'a> {
    content_type: &'a [u8],
    content: Vec<u8>,
    signers: Vec<SignerEntry<'a>>,
    extra_certificates: Vec<Vec<u8>>,
}

impl<'a> SignedDataBuilder<'a> {
    pub fn new(content_type: &'a [u8], content: &[u8]) -> Self {
        Self {
            content_type,
            content: content.to_vec(),
            signers: Vec::new(),
            extra_certificates: Vec::new(),
        }
    }

    pub fn signer(mut self, entry: SignerEntry<'a>) -> Self {
        self.signers.push(entry);
        self
    }

    /// Embed raw bytes in the certificate set.
    pub fn raw_certificate(mut self, bytes: &[u8]) -> Self {
        self.extra_certificates.push(bytes.to_vec());
        self
    }

    fn signer_info(&self, entry: &SignerEntry<'_>) -> Vec<u8> {
        let digest = hash(MessageDigest::sha256(), &self.content).unwrap();
        let content_type_attr = seq(&[&oid(OID_CONTENT_TYPE), &set(&[&oid(self.content_type)])]);
        let digest_attr = seq(&[&oid(OID_MESSAGE_DIGEST), &set(&[&der(0x04, &digest)])]);
        let attrs = [content_type_attr, digest_attr].concat();

        let mut signer = Signer::new(MessageDigest::sha256(), &entry.identity.key).unwrap();
        signer.update(&der(0x31, &attrs)).unwrap();
        let mut signature = signer.sign_to_vec().unwrap();
        if entry.corrupt {
            let last = signature.len() - 1;
            signature[last] ^= 0x55;
        }

        let cert = &entry.identity.cert;
        let issuer = cert.issuer_name().to_der().unwrap();
        let serial = cert.serial_number().to_bn().unwrap().to_vec();
        seq(&[
            &integer(&[1]),
            &seq(&[&issuer, &integer(&serial)]),
            &sha256_algorithm(),
            &der(0xa0, &attrs),
            &seq(&[&oid(OID_RSA_ENCRYPTION), &[0x05, 0x00]]),
            &der(0x04, &signature),
        ])
    }

    /// DER `SignedData` (not wrapped in a `ContentInfo`).
    pub fn build(&self) -> Vec<u8> {
        let mut certificates: Vec<u8> = self
            .signers
            .iter()
            .map(|s| s.identity.cert.to_der().unwrap())
            .collect::<Vec<_>>()
            .concat();
        for raw in &self.extra_certificates {
            certificates.extend_from_slice(raw);
        }
        let signer_infos: Vec<u8> = self
            .signers
            .iter()
            .map(|s| self.signer_info(s))
            .collect::<Vec<_>>()
            .concat();

        seq(&[
            &integer(&[1]),
            &set(&[&sha256_algorithm()]),
            &seq(&[
                &oid(self.content_type),
                &der(0xa0, &der(0x04, &self.content)),
            ]),
            &der(0xa0, &certificates),
            &der(0x31, &signer_infos),
        ])
    }

    /// `ContentInfo` of type signed data around [`Self::build`].
    pub fn build_message(&self) -> Vec<u8> {
        content_info(OID_SIGNED_DATA, &self.build())
    }
}

// ---------------------------------------------------------------------------
// Running the workflow
// ---------------------------------------------------------------------------

/// Cloneable in-memory writer for capturing diagnostics.
#[derive(Clone, Default)]
pub struct SharedBuffer(Arc<Mutex<Vec<u8>>>);

impl SharedBuffer {
    pub fn contents(&self) -> String {
        String::from_utf8_lossy(&self.0.lock().unwrap()).into_owned()
    }
}

impl Write for SharedBuffer {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Scratch directory with an input package and an output path.
pub struct Workspace {
    pub dir: TempDir,
}

impl Workspace {
    pub fn new() -> Self {
        Self {
            dir: tempfile::tempdir().unwrap(),
        }
    }

    pub fn write_input(&self, bytes: &[u8]) -> PathBuf {
        let path = self.dir.path().join("package.p7m");
        fs::write(&path, bytes).unwrap();
        path
    }

    pub fn output_path(&self) -> PathBuf {
        self.dir.path().join("payload.bin")
    }
}

pub struct Run {
    pub outcome: RunOutcome,
    pub diagnostics: String,
}

/// Run the workflow from `input` to `output` with verbose diagnostics.
pub fn run_workflow(
    input: &Path,
    output: &Path,
    trust: Option<&Path>,
    options: VerifyOptions,
) -> Run {
    let capture = SharedBuffer::default();
    let diagnostics = Diagnostics::with_writer(true, capture.clone());
    let request = VerifyRequest {
        input: InputSource::File(input.to_path_buf()),
        output: OutputTarget::File(output.to_path_buf()),
        trust_store_dir: trust.map(Path::to_path_buf),
        options,
    };
    let outcome = verify_package(request, &diagnostics);
    Run {
        outcome,
        diagnostics: capture.contents(),
    }
}
