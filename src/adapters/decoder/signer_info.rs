//! `SignerInfo` parsing (RFC 5652 section 5.3).

use crate::adapters::decoder::der_reader::{oid_from_content, unsigned_from_content, DerReader};
use crate::domain::cms::{SignedAttributes, SignerIdentifier, SignerInfo};
use crate::domain::constants::{
    ASN1_INTEGER_TAG, ASN1_OCTET_STRING_TAG, ASN1_OID_TAG, ASN1_SEQUENCE_TAG, ASN1_SET_TAG,
    CONTEXT_0_CONSTRUCTED, CONTEXT_0_PRIMITIVE, CONTEXT_1_CONSTRUCTED, OID_ATTR_CONTENT_TYPE,
    OID_ATTR_MESSAGE_DIGEST,
};

/// Parse one DER encoded `SignerInfo`.
pub fn parse_signer_info(encoded: &[u8]) -> Result<SignerInfo, String> {
    let seq = DerReader::new(encoded).read_expected(ASN1_SEQUENCE_TAG)?;
    let mut reader = DerReader::new(seq.content);

    let version = unsigned_from_content(reader.read_expected(ASN1_INTEGER_TAG)?.content)?;
    let sid = parse_signer_identifier(&mut reader)?;
    let digest_algorithm = algorithm_oid(&mut reader)?;

    let signed_attributes = reader
        .read_optional(CONTEXT_0_CONSTRUCTED)?
        .map(|tlv| parse_signed_attributes(tlv.raw, tlv.content))
        .transpose()?;

    let signature_algorithm = algorithm_oid(&mut reader)?;
    let signature = reader.read_expected(ASN1_OCTET_STRING_TAG)?.content.to_vec();

    // Unsigned attributes (countersignatures, timestamps) play no part in the
    // trust decision.
    reader.read_optional(CONTEXT_1_CONSTRUCTED)?;
    if !reader.is_empty() {
        return Err("unexpected trailing elements in SignerInfo".to_string());
    }

    Ok(SignerInfo::new(
        version,
        sid,
        digest_algorithm,
        signed_attributes,
        signature_algorithm,
        signature,
    ))
}

fn parse_signer_identifier(reader: &mut DerReader<'_>) -> Result<SignerIdentifier, String> {
    match reader.peek_tag() {
        Some(ASN1_SEQUENCE_TAG) => {
            let ias = reader.read_any()?;
            let mut inner = DerReader::new(ias.content);
            let issuer = inner.read_expected(ASN1_SEQUENCE_TAG)?.raw.to_vec();
            let serial = inner.read_expected(ASN1_INTEGER_TAG)?.content.to_vec();
            Ok(SignerIdentifier::IssuerAndSerialNumber { issuer, serial })
        }
        Some(CONTEXT_0_PRIMITIVE) => Ok(SignerIdentifier::SubjectKeyIdentifier(
            reader.read_any()?.content.to_vec(),
        )),
        Some(tag) => Err(format!("unsupported signer identifier tag 0x{tag:02x}")),
        None => Err("missing signer identifier".to_string()),
    }
}

fn algorithm_oid(reader: &mut DerReader<'_>) -> Result<der::asn1::ObjectIdentifier, String> {
    let seq = reader.read_expected(ASN1_SEQUENCE_TAG)?;
    oid_from_content(DerReader::new(seq.content).read_expected(ASN1_OID_TAG)?.content)
}

fn parse_signed_attributes(raw: &[u8], content: &[u8]) -> Result<SignedAttributes, String> {
    // The signature covers the attributes with an explicit SET OF tag.
    let mut encoded_set = raw.to_vec();
    encoded_set[0] = ASN1_SET_TAG;

    let mut content_type = None;
    let mut message_digest = None;
    let mut reader = DerReader::new(content);
    while !reader.is_empty() {
        let attribute = reader.read_expected(ASN1_SEQUENCE_TAG)?;
        let mut attr = DerReader::new(attribute.content);
        let attr_type = oid_from_content(attr.read_expected(ASN1_OID_TAG)?.content)?;
        let values = attr.read_expected(ASN1_SET_TAG)?;
        let mut values = DerReader::new(values.content);

        if attr_type == OID_ATTR_CONTENT_TYPE {
            if content_type.is_some() {
                return Err("duplicate contentType attribute".to_string());
            }
            content_type = Some(oid_from_content(values.read_expected(ASN1_OID_TAG)?.content)?);
        } else if attr_type == OID_ATTR_MESSAGE_DIGEST {
            if message_digest.is_some() {
                return Err("duplicate messageDigest attribute".to_string());
            }
            message_digest = Some(values.read_expected(ASN1_OCTET_STRING_TAG)?.content.to_vec());
        }
    }

    Ok(SignedAttributes {
        encoded_set,
        content_type,
        message_digest,
    })
}
