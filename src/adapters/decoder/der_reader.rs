//! Minimal DER reader for elements retained by the streaming decoder.
//!
//! Retained elements (certificates, signer infos, algorithm identifiers) are
//! small and must be DER to be verifiable, so a plain slice walker is enough.

use der::asn1::ObjectIdentifier;

use crate::domain::constants::{ASN1_INTEGER_TAG, ASN1_OID_TAG, ASN1_SEQUENCE_TAG};

/// One element read from a DER slice.
#[derive(Debug, Clone, Copy)]
pub struct Tlv<'a> {
    pub tag: u8,
    pub content: &'a [u8],
    /// Identifier, length and content octets.
    pub raw: &'a [u8],
}

#[derive(Debug, Clone)]
pub struct DerReader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> DerReader<'a> {
    #[must_use]
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.pos >= self.data.len()
    }

    #[must_use]
    pub fn peek_tag(&self) -> Option<u8> {
        self.data.get(self.pos).copied()
    }

    pub fn read_any(&mut self) -> Result<Tlv<'a>, String> {
        let start = self.pos;
        let tag = *self
            .data
            .get(start)
            .ok_or_else(|| "unexpected end of element".to_string())?;
        if tag & 0x1F == 0x1F {
            return Err(format!("unsupported high tag number form (0x{tag:02x})"));
        }
        let (length, length_bytes) = parse_der_length(&self.data[start + 1..])?;
        let content_start = start + 1 + length_bytes;
        let end = content_start
            .checked_add(length)
            .filter(|end| *end <= self.data.len())
            .ok_or_else(|| format!("element 0x{tag:02x} extends beyond data"))?;
        self.pos = end;
        Ok(Tlv {
            tag,
            content: &self.data[content_start..end],
            raw: &self.data[start..end],
        })
    }

    pub fn read_expected(&mut self, tag: u8) -> Result<Tlv<'a>, String> {
        let tlv = self.read_any()?;
        if tlv.tag != tag {
            return Err(format!("expected tag 0x{tag:02x}, found 0x{:02x}", tlv.tag));
        }
        Ok(tlv)
    }

    /// Read the next element only when it carries `tag`.
    pub fn read_optional(&mut self, tag: u8) -> Result<Option<Tlv<'a>>, String> {
        if self.peek_tag() == Some(tag) {
            self.read_any().map(Some)
        } else {
            Ok(None)
        }
    }
}

/// Parse a DER length; returns `(length, octets used)`. Indefinite lengths
/// are rejected.
pub fn parse_der_length(data: &[u8]) -> Result<(usize, usize), String> {
    let first_byte = *data.first().ok_or_else(|| "empty length data".to_string())?;
    if first_byte & 0x80 == 0 {
        return Ok((usize::from(first_byte), 1));
    }
    let length_bytes = usize::from(first_byte & 0x7f);
    if length_bytes == 0 {
        return Err("indefinite length not allowed in DER".to_string());
    }
    if length_bytes > 4 || data.len() < 1 + length_bytes {
        return Err("invalid long form length".to_string());
    }
    let mut length = 0usize;
    for &byte in &data[1..=length_bytes] {
        length = (length << 8) | usize::from(byte);
    }
    Ok((length, 1 + length_bytes))
}

/// Read exactly one element of `tag` spanning all of `data`.
pub fn read_single(data: &[u8], tag: u8) -> Result<Tlv<'_>, String> {
    let mut reader = DerReader::new(data);
    let tlv = reader.read_expected(tag)?;
    if !reader.is_empty() {
        return Err(format!("trailing bytes after element 0x{tag:02x}"));
    }
    Ok(tlv)
}

pub fn oid_from_content(content: &[u8]) -> Result<ObjectIdentifier, String> {
    ObjectIdentifier::from_bytes(content).map_err(|e| format!("invalid object identifier: {e}"))
}

/// Decode an encoded OBJECT IDENTIFIER element.
pub fn parse_oid(encoded: &[u8]) -> Result<ObjectIdentifier, String> {
    oid_from_content(read_single(encoded, ASN1_OID_TAG)?.content)
}

/// Algorithm OID of an encoded `AlgorithmIdentifier`; parameters are ignored.
pub fn parse_algorithm_identifier(encoded: &[u8]) -> Result<ObjectIdentifier, String> {
    let seq = read_single(encoded, ASN1_SEQUENCE_TAG)?;
    let mut inner = DerReader::new(seq.content);
    oid_from_content(inner.read_expected(ASN1_OID_TAG)?.content)
}

/// Decode a small non-negative INTEGER element (versions).
pub fn parse_small_unsigned(encoded: &[u8]) -> Result<u32, String> {
    unsigned_from_content(read_single(encoded, ASN1_INTEGER_TAG)?.content)
}

pub fn unsigned_from_content(content: &[u8]) -> Result<u32, String> {
    if content.is_empty() || content.len() > 4 || content[0] & 0x80 != 0 {
        return Err("integer out of range".to_string());
    }
    Ok(content
        .iter()
        .fold(0u32, |acc, &b| (acc << 8) | u32::from(b)))
}
