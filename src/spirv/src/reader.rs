use byteorder::{ByteOrder, LittleEndian};
use log::trace;

use crate::*;

pub const MAGIC: u32 = 0x07230203;
pub const HEADER_LEN: usize = 5;

const WORD_SIZE: usize = std::mem::size_of::<u32>();

/// Newest SPIR-V version whose layout this crate knows.
pub const MAX_VERSION: Version = (1, 6);

/// SPIR-V version as a pair `(major, minor)`.
pub type Version = (u8, u8);

#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct Header {
    pub version: Version,
    /// Raw generator word: vendor tool id in the high half, tool version
    /// in the low half.
    pub generator: u32,
    /// All result ids are strictly less than this.
    pub bound: u32,
    pub schema: u32,
}

impl Header {
    pub fn generator_tool(&self) -> u16 {
        (self.generator >> 16) as u16
    }

    pub fn generator_version(&self) -> u16 {
        (self.generator & 0xffff) as u16
    }

    pub fn is_supported_version(&self) -> bool {
        self.version <= MAX_VERSION
    }
}

/// Copies `bytes` into an owned word buffer in host order. Modules
/// written in the opposite byte order are recognized by their swapped
/// magic number.
pub(crate) fn words_from_bytes(bytes: &[u8]) -> Result<Vec<u32>> {
    if bytes.len() < HEADER_LEN * WORD_SIZE || bytes.len() % WORD_SIZE != 0 {
        return Err(Error::new(ErrorKind::TruncatedStream));
    }
    let mut words = vec![0; bytes.len() / WORD_SIZE];
    LittleEndian::read_u32_into(bytes, &mut words);
    normalize_words(words)
}

pub(crate) fn normalize_words(mut words: Vec<u32>) -> Result<Vec<u32>> {
    match words.first().copied() {
        None => Err(Error::new(ErrorKind::TruncatedStream)),
        Some(MAGIC) => Ok(words),
        Some(magic) if magic == MAGIC.swap_bytes() => {
            trace!("normalize_words: swapping {} words", words.len());
            for word in words.iter_mut() {
                *word = word.swap_bytes();
            }
            Ok(words)
        },
        Some(_) => Err(Error::new(ErrorKind::InvalidMagic)),
    }
}

/// Sequential cursor over a word stream.
#[derive(Clone, Debug)]
pub struct Reader<'data> {
    words: &'data [u32],
    offset: usize,
}

impl<'data> Reader<'data> {
    pub fn new(words: &'data [u32]) -> Self {
        Self { words, offset: 0 }
    }

    /// Word offset of the cursor from the start of the stream.
    pub fn offset(&self) -> usize {
        self.offset
    }

    pub fn remaining(&self) -> usize {
        self.words.len() - self.offset
    }

    pub fn is_empty(&self) -> bool {
        self.remaining() == 0
    }

    pub fn peek_word(&self) -> Option<u32> {
        self.words.get(self.offset).copied()
    }

    pub fn next_word(&mut self) -> Result<u32> {
        let word = self.peek_word()
            .ok_or_else(|| Error::at(ErrorKind::TruncatedStream, self.offset))?;
        self.offset += 1;
        Ok(word)
    }

    pub fn next_words(&mut self, n: usize) -> Result<&'data [u32]> {
        if self.remaining() < n {
            return Err(Error::at(ErrorKind::TruncatedStream, self.offset));
        }
        let words = &self.words[self.offset..self.offset + n];
        self.offset += n;
        Ok(words)
    }

    pub fn read_header(&mut self) -> Result<Header> {
        let header = self.next_words(HEADER_LEN)?;
        if header[0] != MAGIC {
            return Err(Error::at(ErrorKind::InvalidMagic, 0));
        }
        let byte = |word: u32, n: u32| ((word >> (8 * n)) & 0xff) as u8;
        Ok(Header {
            version: (byte(header[1], 2), byte(header[1], 1)),
            generator: header[2],
            bound: header[3],
            schema: header[4],
        })
    }
}
