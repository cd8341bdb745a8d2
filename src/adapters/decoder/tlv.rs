//! Incremental BER/DER tokenizer.
//!
//! Accepts input in arbitrary slices and reports element boundaries as
//! events, so callers never need the whole encoding in memory. Supports
//! definite and indefinite lengths, high tag numbers and zero-length
//! elements. Exactly one top-level element is accepted.

use crate::domain::constants::{ASN1_EOC_TAG, BER_INDEFINITE_LENGTH, CONSTRUCTED_BIT};
use crate::infra::error::{P7vError, P7vResult};

/// Parsed identifier and length octets of one element.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ElementHeader {
    /// First identifier octet (class, constructed bit and low tag number).
    pub identifier: u8,
    pub tag_number: u32,
    pub constructed: bool,
    /// `None` for indefinite length.
    pub length: Option<usize>,
}

#[derive(Debug)]
pub enum TlvEvent<'a> {
    /// Element header complete; `raw` holds its identifier and length octets.
    Start { header: ElementHeader, raw: &'a [u8] },
    /// Content octets of the innermost primitive element.
    Content(&'a [u8]),
    /// Innermost open element closed; `raw` holds the end-of-contents octets
    /// for indefinite length elements and is empty otherwise.
    End { raw: &'a [u8] },
}

#[derive(Debug, Clone, Copy)]
enum ReadState {
    Identifier,
    TagNumber,
    LengthFirst,
    LengthLong { remaining: u8 },
    Content,
}

#[derive(Debug)]
struct Frame {
    remaining: Option<usize>,
}

const EOC_OCTETS: [u8; 2] = [0x00, 0x00];

#[derive(Debug)]
pub struct TlvTokenizer {
    state: ReadState,
    header: Vec<u8>,
    identifier: u8,
    tag_number: u32,
    length: usize,
    frames: Vec<Frame>,
    root_done: bool,
    offset: u64,
    max_depth: usize,
}

impl TlvTokenizer {
    #[must_use]
    pub fn new(max_depth: usize) -> Self {
        Self {
            state: ReadState::Identifier,
            header: Vec::with_capacity(12),
            identifier: 0,
            tag_number: 0,
            length: 0,
            frames: Vec::new(),
            root_done: false,
            offset: 0,
            max_depth,
        }
    }

    /// Total bytes consumed so far.
    #[must_use]
    pub fn offset(&self) -> u64 {
        self.offset
    }

    /// True once the top-level element has been closed.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.root_done
    }

    #[must_use]
    pub fn open_elements(&self) -> usize {
        self.frames.len()
    }

    /// Tokenize `data`, reporting events to `on_event` in encoding order.
    pub fn push<F>(&mut self, mut data: &[u8], on_event: &mut F) -> P7vResult<()>
    where
        F: FnMut(TlvEvent<'_>) -> P7vResult<()>,
    {
        while !data.is_empty() {
            if let ReadState::Content = self.state {
                let remaining = self.frames.last().and_then(|f| f.remaining).unwrap_or(0);
                let (now, rest) = data.split_at(remaining.min(data.len()));
                self.consume(now.len())?;
                self.offset += now.len() as u64;
                on_event(TlvEvent::Content(now))?;
                data = rest;
                self.close_completed(on_event)?;
                continue;
            }

            if self.root_done {
                return Err(self.error("trailing data after end of message"));
            }

            let byte = data[0];
            data = &data[1..];
            self.offset += 1;
            self.header.push(byte);
            self.step_header(byte, on_event)?;
        }
        Ok(())
    }

    fn step_header<F>(&mut self, byte: u8, on_event: &mut F) -> P7vResult<()>
    where
        F: FnMut(TlvEvent<'_>) -> P7vResult<()>,
    {
        match self.state {
            ReadState::Identifier => {
                self.identifier = byte;
                if byte & 0x1F == 0x1F {
                    self.tag_number = 0;
                    self.state = ReadState::TagNumber;
                } else {
                    self.tag_number = u32::from(byte & 0x1F);
                    self.state = ReadState::LengthFirst;
                }
                Ok(())
            }
            ReadState::TagNumber => {
                if self.tag_number > (u32::MAX >> 7) {
                    return Err(self.error("tag number too large"));
                }
                self.tag_number = (self.tag_number << 7) | u32::from(byte & 0x7F);
                if byte & 0x80 == 0 {
                    self.state = ReadState::LengthFirst;
                }
                Ok(())
            }
            ReadState::LengthFirst => {
                if byte == BER_INDEFINITE_LENGTH {
                    self.header_complete(None, on_event)
                } else if byte & 0x80 == 0 {
                    self.header_complete(Some(usize::from(byte)), on_event)
                } else {
                    let count = byte & 0x7F;
                    if count == 0x7F || usize::from(count) > std::mem::size_of::<usize>() {
                        return Err(self.error("unsupported length encoding"));
                    }
                    self.length = 0;
                    self.state = ReadState::LengthLong { remaining: count };
                    Ok(())
                }
            }
            ReadState::LengthLong { remaining } => {
                self.length = (self.length << 8) | usize::from(byte);
                if remaining == 1 {
                    self.header_complete(Some(self.length), on_event)
                } else {
                    self.state = ReadState::LengthLong {
                        remaining: remaining - 1,
                    };
                    Ok(())
                }
            }
            ReadState::Content => Err(self.error("header octet while reading content")),
        }
    }

    fn header_complete<F>(&mut self, length: Option<usize>, on_event: &mut F) -> P7vResult<()>
    where
        F: FnMut(TlvEvent<'_>) -> P7vResult<()>,
    {
        let constructed = self.identifier & CONSTRUCTED_BIT != 0;
        let header_len = self.header.len();
        self.state = ReadState::Identifier;

        if self.identifier == ASN1_EOC_TAG {
            if length != Some(0) {
                return Err(self.error("malformed end-of-contents"));
            }
            self.consume(header_len)?;
            self.header.clear();
            match self.frames.last() {
                Some(frame) if frame.remaining.is_none() => {}
                _ => return Err(self.error("end-of-contents outside indefinite length element")),
            }
            self.frames.pop();
            on_event(TlvEvent::End { raw: &EOC_OCTETS })?;
            if self.frames.is_empty() {
                self.root_done = true;
            }
            return self.close_completed(on_event);
        }

        if length.is_none() && !constructed {
            return Err(self.error("indefinite length on primitive element"));
        }
        if self.frames.len() >= self.max_depth {
            return Err(self.error("elements nested too deeply"));
        }

        self.consume(header_len)?;
        let header = ElementHeader {
            identifier: self.identifier,
            tag_number: self.tag_number,
            constructed,
            length,
        };
        on_event(TlvEvent::Start {
            header,
            raw: &self.header,
        })?;
        self.header.clear();
        self.frames.push(Frame { remaining: length });
        if !constructed {
            self.state = ReadState::Content;
        }
        self.close_completed(on_event)
    }

    /// Charge `n` bytes against every open definite-length element.
    fn consume(&mut self, n: usize) -> P7vResult<()> {
        let overrun = self
            .frames
            .iter()
            .any(|f| matches!(f.remaining, Some(r) if n > r));
        if overrun {
            return Err(self.error("element overruns its enclosing element"));
        }
        for frame in &mut self.frames {
            if let Some(r) = frame.remaining.as_mut() {
                *r -= n;
            }
        }
        Ok(())
    }

    /// Close every exhausted definite-length element on top of the stack.
    fn close_completed<F>(&mut self, on_event: &mut F) -> P7vResult<()>
    where
        F: FnMut(TlvEvent<'_>) -> P7vResult<()>,
    {
        while matches!(self.frames.last(), Some(Frame { remaining: Some(0) })) {
            self.frames.pop();
            self.state = ReadState::Identifier;
            on_event(TlvEvent::End { raw: &[] })?;
            if self.frames.is_empty() {
                self.root_done = true;
            }
        }
        Ok(())
    }

    fn error(&self, message: &str) -> P7vError {
        P7vError::DecoderUpdateFailed(format!("{message} (offset {})", self.offset))
    }
}
