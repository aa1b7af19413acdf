use std::iter::FusedIterator;

use num_traits::FromPrimitive;
use spirv_headers as spv;

use crate::*;
use crate::node::Parse;
use crate::reader::{Header, Reader, HEADER_LEN};

/// A single undecoded instruction.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct Instruction<'data> {
    opcode: u16,
    op: Option<spv::Op>,
    offset: usize,
    // Operand words following the opcode word
    operands: &'data [u32],
}

/// Splits the leading word of an instruction into its opcode and word
/// count.
fn decode_op(word: u32) -> (u16, usize) {
    let size = (word >> 16) & 0xffff;
    let opcode = (word & 0xffff) as u16;
    (opcode, size as _)
}

impl<'data> Instruction<'data> {
    pub fn opcode(&self) -> u16 {
        self.opcode
    }

    /// `None` if the opcode is not in the SPIR-V grammar known to this
    /// crate.
    pub fn op(&self) -> Option<spv::Op> {
        self.op
    }

    /// Word count including the opcode word.
    pub fn word_count(&self) -> usize {
        self.operands.len() + 1
    }

    /// Word offset of the instruction from the start of the module.
    pub fn offset(&self) -> usize {
        self.offset
    }

    pub fn operand_words(&self) -> &'data [u32] {
        self.operands
    }

    pub fn operands(&self) -> Operands<'data> {
        Operands {
            offset: self.offset,
            words: self.operands,
        }
    }
}

/// Consumes the operands of one instruction front to back.
#[derive(Clone, Debug)]
pub struct Operands<'data> {
    offset: usize,
    words: &'data [u32],
}

impl<'data> Operands<'data> {
    fn malformed(&self) -> Error {
        Error::at(ErrorKind::MalformedInstruction, self.offset)
    }

    pub fn is_empty(&self) -> bool {
        self.words.is_empty()
    }

    pub fn consume(&mut self) -> Result<u32> {
        let (&first, rest) = self.words.split_first()
            .ok_or_else(|| self.malformed())?;
        self.words = rest;
        Ok(first)
    }

    /// Takes every remaining operand word.
    pub fn rest(&mut self) -> &'data [u32] {
        std::mem::replace(&mut self.words, &[])
    }

    /// Literal strings are nul-terminated UTF-8 packed four bytes per
    /// word, lowest byte first, and padded to a word boundary.
    pub fn parse_string(&mut self) -> Result<String> {
        let words = self.words;
        let mut bytes = Vec::new();
        for (i, &word) in words.iter().enumerate() {
            for &byte in word.to_le_bytes().iter() {
                if byte == 0 {
                    let s = std::str::from_utf8(&bytes)
                        .map_err(|_| self.malformed())?
                        .to_owned();
                    self.words = &words[i + 1..];
                    return Ok(s);
                }
                bytes.push(byte);
            }
        }
        Err(self.malformed())
    }

    pub(crate) fn parse<T: Parse>(&mut self) -> Result<T> {
        T::parse(self)
    }

    pub(crate) fn parse_many<T: Parse>(&mut self) -> Result<Vec<T>> {
        let mut res = Vec::new();
        while !self.words.is_empty() {
            res.push(self.parse()?);
        }
        Ok(res)
    }

    pub(crate) fn parse_option<T: Parse>(&mut self) -> Result<Option<T>> {
        Ok(if !self.words.is_empty() {
            Some(self.parse()?)
        } else { None })
    }
}

/// Instruction stream of a module whose header has been validated.
#[derive(Clone, Debug)]
pub struct Decoder<'data> {
    header: Header,
    body: Reader<'data>,
}

impl<'data> Decoder<'data> {
    pub fn new(words: &'data [u32]) -> Result<Self> {
        let mut body = Reader::new(words);
        let header = body.read_header()?;
        debug_assert_eq!(body.offset(), HEADER_LEN);
        Ok(Self { header, body })
    }

    pub fn header(&self) -> &Header {
        &self.header
    }

    /// Returns a fresh iterator over the instruction stream. Each call
    /// starts again from the first instruction after the header.
    pub fn instructions(&self) -> Instructions<'data> {
        Instructions {
            reader: self.body.clone(),
            failed: false,
        }
    }
}

/// Lazily decodes instructions. After yielding an error the iterator is
/// exhausted.
#[derive(Clone, Debug)]
pub struct Instructions<'data> {
    reader: Reader<'data>,
    failed: bool,
}

impl<'data> Instructions<'data> {
    fn decode(&mut self) -> Result<Instruction<'data>> {
        let offset = self.reader.offset();
        let (opcode, word_count) = decode_op(self.reader.next_word()?);
        if word_count == 0 || word_count - 1 > self.reader.remaining() {
            return Err(Error::at(ErrorKind::MalformedInstruction, offset));
        }
        let operands = self.reader.next_words(word_count - 1)?;
        Ok(Instruction {
            opcode,
            op: spv::Op::from_u32(opcode as u32),
            offset,
            operands,
        })
    }
}

impl<'data> Iterator for Instructions<'data> {
    type Item = Result<Instruction<'data>>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed || self.reader.is_empty() {
            return None;
        }
        let res = self.decode();
        self.failed = res.is_err();
        Some(res)
    }
}

impl FusedIterator for Instructions<'_> {}
