//! CMS structure tracking on top of the TLV tokenizer.
//!
//! A [`LevelDecoder`] decodes one content level. It keeps a stack of the
//! open elements with their role in the `ContentInfo` / `SignedData`
//! grammar, retains the small structural elements in the session arena,
//! hashes encapsulated content with every declared digest algorithm and
//! routes the content either to the caller or, for nested signed data, to a
//! child decoder for the next level.

use der::asn1::ObjectIdentifier;

use crate::adapters::decoder::arena::{Arena, ArenaSpan};
use crate::adapters::decoder::der_reader::{
    parse_algorithm_identifier, parse_oid, parse_small_unsigned,
};
use crate::adapters::decoder::signer_info::parse_signer_info;
use crate::adapters::decoder::tlv::{ElementHeader, TlvEvent, TlvTokenizer};
use crate::adapters::digest::DigestSet;
use crate::domain::cms::{ContentDigest, ContentLevel, ContentType, SignedDataBlock};
use crate::domain::constants::{
    ASN1_INTEGER_TAG, ASN1_OCTET_STRING_CONSTRUCTED_TAG, ASN1_OCTET_STRING_TAG, ASN1_OID_TAG,
    ASN1_SEQUENCE_TAG, ASN1_SET_TAG, CONTEXT_0_CONSTRUCTED, CONTEXT_1_CONSTRUCTED,
    MAX_CONTENT_LEVELS, MAX_ELEMENT_DEPTH, MAX_RETAINED_ELEMENT_LEN,
};
use crate::infra::error::{P7vError, P7vResult};

/// Outermost element expected by a level decoder.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum RootKind {
    /// A full `ContentInfo` (the message itself).
    ContentInfo,
    /// A bare `SignedData` (encapsulated content of a signed level).
    SignedData,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Role {
    ContentInfo,
    ContentType,
    ExplicitContent,
    SignedData,
    Version,
    DigestAlgorithms,
    DigestAlgorithm,
    EncapContentInfo,
    EContentType,
    EContentExplicit,
    /// OCTET STRING (or a segment of a constructed one) carrying content.
    Payload,
    /// PKCS#7 style nested `SignedData` placed directly under `[0]`.
    NestedSignedData,
    Certificates,
    Certificate,
    Crls,
    SignerInfos,
    SignerInfo,
    Skip,
    /// Descendant of a retained or forwarded element.
    Inner,
}

impl Role {
    fn is_retained(self) -> bool {
        matches!(
            self,
            Role::ContentType
                | Role::Version
                | Role::DigestAlgorithm
                | Role::EContentType
                | Role::Certificate
                | Role::SignerInfo
        )
    }
}

#[derive(Debug)]
struct Node {
    role: Role,
    children: usize,
}

impl Node {
    fn new(role: Role) -> Self {
        Self { role, children: 0 }
    }
}

/// Retention of one element into the arena.
#[derive(Debug, Clone, Copy)]
struct Capture {
    start: usize,
    /// Stack depth of the retained element.
    depth: usize,
}

/// Position inside the optional tail of `SignedData`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum Tail {
    Open,
    Certificates,
    Crls,
    SignerInfos,
}

fn is_octet_string(identifier: u8) -> bool {
    identifier == ASN1_OCTET_STRING_TAG || identifier == ASN1_OCTET_STRING_CONSTRUCTED_TAG
}

struct LevelState {
    root: RootKind,
    level: usize,
    stack: Vec<Node>,
    capture: Option<Capture>,
    /// Stack depth of the nested `SignedData` being forwarded, if any.
    forward_depth: Option<usize>,
    content_type: Option<ContentType>,
    version: Option<u32>,
    digest_algorithms: Vec<ObjectIdentifier>,
    encapsulated_type: Option<ContentType>,
    content_present: bool,
    digests: Option<DigestSet>,
    content_digests: Vec<ContentDigest>,
    certificates: Vec<ArenaSpan>,
    signer_infos: Vec<ArenaSpan>,
    tail: Tail,
    inner: Option<Box<LevelDecoder>>,
    inner_levels: Vec<ContentLevel>,
}

/// Streaming decoder for one content level.
pub(crate) struct LevelDecoder {
    tokenizer: TlvTokenizer,
    state: LevelState,
}

impl LevelDecoder {
    pub(crate) fn new(root: RootKind, level: usize) -> Self {
        let content_type = match root {
            RootKind::ContentInfo => None,
            RootKind::SignedData => Some(ContentType::SignedData),
        };
        Self {
            tokenizer: TlvTokenizer::new(MAX_ELEMENT_DEPTH),
            state: LevelState {
                root,
                level,
                stack: Vec::new(),
                capture: None,
                forward_depth: None,
                content_type,
                version: None,
                digest_algorithms: Vec::new(),
                encapsulated_type: None,
                content_present: false,
                digests: None,
                content_digests: Vec::new(),
                certificates: Vec::new(),
                signer_infos: Vec::new(),
                tail: Tail::Open,
                inner: None,
                inner_levels: Vec::new(),
            },
        }
    }

    /// Feed the next slice of the encoding.
    pub(crate) fn update(
        &mut self,
        arena: &mut Arena,
        data: &[u8],
        on_content: &mut dyn FnMut(&[u8]),
    ) -> P7vResult<()> {
        let state = &mut self.state;
        self.tokenizer
            .push(data, &mut |event| state.on_event(event, arena, on_content))
    }

    /// Bytes consumed by this level so far.
    pub(crate) fn offset(&self) -> u64 {
        self.tokenizer.offset()
    }

    /// Complete the level and return it followed by any nested levels.
    pub(crate) fn finish(self, arena: &Arena) -> P7vResult<Vec<ContentLevel>> {
        if !self.tokenizer.is_complete() {
            let message = if self.tokenizer.offset() == 0 {
                format!("level {}: no input", self.state.level)
            } else {
                format!(
                    "level {}: message truncated at offset {} with {} element(s) open",
                    self.state.level,
                    self.tokenizer.offset(),
                    self.tokenizer.open_elements()
                )
            };
            return Err(P7vError::DecoderFinishFailed(message));
        }
        self.state.into_levels(arena)
    }
}

impl LevelState {
    fn on_event(
        &mut self,
        event: TlvEvent<'_>,
        arena: &mut Arena,
        on_content: &mut dyn FnMut(&[u8]),
    ) -> P7vResult<()> {
        match event {
            TlvEvent::Start { header, raw } => self.on_start(&header, raw, arena, on_content),
            TlvEvent::Content(bytes) => {
                if self.forward_depth.is_some() {
                    return self.forward(arena, bytes, true, on_content);
                }
                if let Some(capture) = self.capture {
                    return retain(arena, capture, bytes);
                }
                match self.stack.last() {
                    Some(Node {
                        role: Role::Payload,
                        ..
                    }) => self.deliver(arena, bytes, on_content),
                    _ => Ok(()),
                }
            }
            TlvEvent::End { raw } => self.on_end(raw, arena, on_content),
        }
    }

    fn on_start(
        &mut self,
        header: &ElementHeader,
        raw: &[u8],
        arena: &mut Arena,
        on_content: &mut dyn FnMut(&[u8]),
    ) -> P7vResult<()> {
        if self.forward_depth.is_some() {
            self.stack.push(Node::new(Role::Inner));
            return self.forward(arena, raw, true, on_content);
        }
        if let Some(capture) = self.capture {
            self.stack.push(Node::new(Role::Inner));
            return retain(arena, capture, raw);
        }

        let role = self
            .child_role(header)
            .map_err(|e| P7vError::DecoderUpdateFailed(format!("level {}: {e}", self.level)))?;
        let parent_role = self.stack.last().map(|n| n.role);
        if let Some(parent) = self.stack.last_mut() {
            parent.children += 1;
        }

        match role {
            Role::EContentExplicit => self.content_present = true,
            Role::Certificates => self.tail = Tail::Certificates,
            Role::Crls => self.tail = Tail::Crls,
            Role::SignerInfos => self.tail = Tail::SignerInfos,
            _ => {}
        }
        if parent_role == Some(Role::EContentExplicit)
            && self.encapsulated_type == Some(ContentType::SignedData)
        {
            self.open_inner()?;
        }

        self.stack.push(Node::new(role));
        let depth = self.stack.len();
        if role.is_retained() {
            let capture = Capture {
                start: arena.len(),
                depth,
            };
            self.capture = Some(capture);
            retain(arena, capture, raw)?;
        } else if role == Role::NestedSignedData {
            self.forward_depth = Some(depth);
            self.forward(arena, raw, false, on_content)?;
        }
        Ok(())
    }

    fn on_end(
        &mut self,
        raw: &[u8],
        arena: &mut Arena,
        on_content: &mut dyn FnMut(&[u8]),
    ) -> P7vResult<()> {
        let depth = self.stack.len();
        let node = self.stack.pop().ok_or_else(|| {
            P7vError::DecoderUpdateFailed(format!("level {}: unbalanced element end", self.level))
        })?;

        if let Some(forward_depth) = self.forward_depth {
            // The closing octets of the nested SignedData itself are not
            // part of its contents octets and are not hashed.
            let hashed = depth > forward_depth;
            if !hashed {
                self.forward_depth = None;
            }
            return self.forward(arena, raw, hashed, on_content);
        }

        if let Some(capture) = self.capture {
            retain(arena, capture, raw)?;
            if depth > capture.depth {
                return Ok(());
            }
            self.capture = None;
            return self
                .retained(node.role, arena.span_from(capture.start), arena)
                .map_err(|e| P7vError::DecoderUpdateFailed(format!("level {}: {e}", self.level)));
        }

        match node.role {
            Role::DigestAlgorithms => {
                self.digests = Some(DigestSet::new(&self.digest_algorithms)?);
            }
            Role::EContentExplicit => {
                if let Some(inner) = self.inner.take() {
                    self.inner_levels = inner.finish(arena)?;
                }
            }
            Role::SignedData => {
                if let Some(digests) = self.digests.take() {
                    if self.content_present {
                        self.content_digests = digests.finish()?;
                    }
                }
                log::debug!(
                    "level {}: signedData closed ({} certificate(s), {} signer(s))",
                    self.level,
                    self.certificates.len(),
                    self.signer_infos.len()
                );
            }
            _ => {}
        }
        Ok(())
    }

    fn child_role(&self, header: &ElementHeader) -> Result<Role, String> {
        let id = header.identifier;
        let Some(parent) = self.stack.last() else {
            return match (self.root, id) {
                (RootKind::ContentInfo, ASN1_SEQUENCE_TAG) => Ok(Role::ContentInfo),
                (RootKind::SignedData, ASN1_SEQUENCE_TAG) => Ok(Role::SignedData),
                _ => Err(format!("expected SEQUENCE at start, found tag 0x{id:02x}")),
            };
        };

        let role = match (parent.role, parent.children, id) {
            (Role::ContentInfo, 0, ASN1_OID_TAG) => Role::ContentType,
            (Role::ContentInfo, 1, CONTEXT_0_CONSTRUCTED) => Role::ExplicitContent,
            (Role::ExplicitContent, 0, _) => match self.content_type {
                Some(ContentType::Data) if is_octet_string(id) => Role::Payload,
                Some(ContentType::SignedData) if id == ASN1_SEQUENCE_TAG => Role::SignedData,
                _ => return Err(format!("unexpected content tag 0x{id:02x}")),
            },
            (Role::SignedData, 0, ASN1_INTEGER_TAG) => Role::Version,
            (Role::SignedData, 1, ASN1_SET_TAG) => Role::DigestAlgorithms,
            (Role::SignedData, 2, ASN1_SEQUENCE_TAG) => Role::EncapContentInfo,
            (Role::SignedData, 3.., CONTEXT_0_CONSTRUCTED) if self.tail < Tail::Certificates => {
                Role::Certificates
            }
            (Role::SignedData, 3.., CONTEXT_1_CONSTRUCTED) if self.tail < Tail::Crls => Role::Crls,
            (Role::SignedData, 3.., ASN1_SET_TAG) if self.tail < Tail::SignerInfos => {
                Role::SignerInfos
            }
            (Role::DigestAlgorithms, _, ASN1_SEQUENCE_TAG) => Role::DigestAlgorithm,
            (Role::EncapContentInfo, 0, ASN1_OID_TAG) => Role::EContentType,
            (Role::EncapContentInfo, 1, CONTEXT_0_CONSTRUCTED) => Role::EContentExplicit,
            (Role::EContentExplicit, 0, _) => match self.encapsulated_type {
                Some(ContentType::SignedData) if id == ASN1_SEQUENCE_TAG => {
                    Role::NestedSignedData
                }
                Some(_) if is_octet_string(id) => Role::Payload,
                _ => return Err(format!("unexpected eContent tag 0x{id:02x}")),
            },
            (Role::Payload, _, _) if is_octet_string(id) => Role::Payload,
            (Role::Certificates, _, ASN1_SEQUENCE_TAG) => Role::Certificate,
            (Role::Certificates | Role::Crls | Role::Skip, _, _) => Role::Skip,
            (Role::SignerInfos, _, ASN1_SEQUENCE_TAG) => Role::SignerInfo,
            (parent_role, index, _) => {
                return Err(format!(
                    "unexpected tag 0x{id:02x} at position {index} of {parent_role:?}"
                ))
            }
        };
        Ok(role)
    }

    fn retained(&mut self, role: Role, span: ArenaSpan, arena: &Arena) -> Result<(), String> {
        let bytes = arena.get(span);
        match role {
            Role::ContentType => {
                let content_type = ContentType::from_oid(parse_oid(bytes)?);
                if let ContentType::Other(oid) = content_type {
                    return Err(format!("unsupported content type {oid}"));
                }
                log::debug!("level {}: content type {content_type}", self.level);
                self.content_type = Some(content_type);
            }
            Role::Version => self.version = Some(parse_small_unsigned(bytes)?),
            Role::DigestAlgorithm => self
                .digest_algorithms
                .push(parse_algorithm_identifier(bytes)?),
            Role::EContentType => {
                let content_type = ContentType::from_oid(parse_oid(bytes)?);
                log::debug!("level {}: encapsulated content type {content_type}", self.level);
                self.encapsulated_type = Some(content_type);
            }
            Role::Certificate => self.certificates.push(span),
            Role::SignerInfo => self.signer_infos.push(span),
            _ => {}
        }
        Ok(())
    }

    fn open_inner(&mut self) -> P7vResult<()> {
        if self.inner.is_some() {
            return Ok(());
        }
        let level = self.level + 1;
        if level >= MAX_CONTENT_LEVELS {
            return Err(P7vError::DecoderUpdateFailed(format!(
                "signed data nested deeper than {MAX_CONTENT_LEVELS} levels"
            )));
        }
        log::debug!("level {}: opening nested signed data level {level}", self.level);
        self.inner = Some(Box::new(LevelDecoder::new(RootKind::SignedData, level)));
        Ok(())
    }

    /// Hash encapsulated content and pass it on.
    fn deliver(
        &mut self,
        arena: &mut Arena,
        bytes: &[u8],
        on_content: &mut dyn FnMut(&[u8]),
    ) -> P7vResult<()> {
        if let Some(digests) = self.digests.as_mut() {
            digests.update(bytes)?;
        }
        match self.inner.as_mut() {
            Some(inner) => inner.update(arena, bytes, on_content),
            None => {
                on_content(bytes);
                Ok(())
            }
        }
    }

    /// Pass raw octets of a nested `SignedData` to the child level.
    fn forward(
        &mut self,
        arena: &mut Arena,
        bytes: &[u8],
        hashed: bool,
        on_content: &mut dyn FnMut(&[u8]),
    ) -> P7vResult<()> {
        if hashed {
            if let Some(digests) = self.digests.as_mut() {
                digests.update(bytes)?;
            }
        }
        match self.inner.as_mut() {
            Some(inner) => inner.update(arena, bytes, on_content),
            None => Err(P7vError::DecoderUpdateFailed(format!(
                "level {}: nested content without a decoder",
                self.level
            ))),
        }
    }

    fn into_levels(self, arena: &Arena) -> P7vResult<Vec<ContentLevel>> {
        match self.content_type {
            Some(ContentType::Data) => Ok(vec![ContentLevel::data()]),
            Some(ContentType::SignedData) => {
                let level = self.level;
                let finish_error =
                    |e: String| P7vError::DecoderFinishFailed(format!("level {level}: {e}"));

                let version = self
                    .version
                    .ok_or_else(|| finish_error("signedData content missing".to_string()))?;
                let encapsulated_content_type = self.encapsulated_type.ok_or_else(|| {
                    finish_error("encapsulated content info missing".to_string())
                })?;
                let signers = self
                    .signer_infos
                    .iter()
                    .enumerate()
                    .map(|(i, span)| {
                        parse_signer_info(arena.get(*span))
                            .map_err(|e| finish_error(format!("signer {i}: {e}")))
                    })
                    .collect::<P7vResult<Vec<_>>>()?;
                let certificates = self
                    .certificates
                    .iter()
                    .map(|span| arena.get(*span).to_vec())
                    .collect();

                let block = SignedDataBlock {
                    version,
                    digest_algorithms: self.digest_algorithms,
                    encapsulated_content_type,
                    content_present: self.content_present,
                    content_digests: self.content_digests,
                    certificates,
                    signers,
                };
                let mut levels = vec![ContentLevel::signed(block)];
                if encapsulated_content_type.is_signed_data() {
                    levels.extend(self.inner_levels);
                } else {
                    levels.push(ContentLevel {
                        content_type: encapsulated_content_type,
                        signed_data: None,
                    });
                }
                Ok(levels)
            }
            _ => Err(P7vError::DecoderFinishFailed(format!(
                "level {}: message carries no content type",
                self.level
            ))),
        }
    }
}

fn retain(arena: &mut Arena, capture: Capture, bytes: &[u8]) -> P7vResult<()> {
    if arena.len() - capture.start + bytes.len() > MAX_RETAINED_ELEMENT_LEN {
        return Err(P7vError::DecoderUpdateFailed(format!(
            "structural element exceeds {MAX_RETAINED_ELEMENT_LEN} bytes"
        )));
    }
    arena.push(bytes)
}
