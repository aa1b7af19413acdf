use derive_more::Display;

use crate::Id;

#[derive(Clone, Copy, Debug, Display, Eq, Hash, PartialEq)]
#[non_exhaustive]
pub enum ErrorKind {
    /// The buffer is shorter than the header or an operand demands.
    #[display(fmt = "truncated stream")]
    TruncatedStream,
    /// The byte stream does not start with the SPIR-V magic number.
    #[display(fmt = "invalid magic number")]
    InvalidMagic,
    /// Corrupt word count, operand list or result id.
    #[display(fmt = "malformed instruction")]
    MalformedInstruction,
    /// A type reference points at no declared type.
    #[display(fmt = "unresolved type")]
    UnresolvedType,
    /// A required cross-reference points at no declared node.
    #[display(fmt = "unresolved id")]
    UnresolvedId,
    /// A result id is defined more than once.
    #[display(fmt = "duplicate id")]
    DuplicateId,
    /// A type contains itself without pointer indirection.
    #[display(fmt = "cyclic type")]
    CyclicType,
    /// An array length or layout size does not fit in 32 bits.
    #[display(fmt = "limit exceeded")]
    LimitExceeded,
    /// The handle has not been loaded yet.
    #[display(fmt = "module handle is uninitialized")]
    Uninitialized,
    /// The handle was accessed after being destroyed.
    #[display(fmt = "use of destroyed module handle")]
    UseAfterDestroy,
    /// The handle was destroyed twice.
    #[display(fmt = "module handle destroyed twice")]
    DoubleDestroy,
    /// The requested transition is not valid in the handle's current state.
    #[display(fmt = "invalid module handle state")]
    InvalidState,
}

#[derive(Clone, Copy, Debug, Display, Eq, Hash, PartialEq)]
pub enum Context {
    #[display(fmt = "at word {}", _0)]
    Offset(usize),
    #[display(fmt = "for id %{}", _0)]
    Id(Id),
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct Error {
    kind: ErrorKind,
    context: Option<Context>,
}

pub type Result<T> = std::result::Result<T, Error>;

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self.context {
            Some(context) => write!(f, "{} {}", self.kind, context),
            None => write!(f, "{}", self.kind),
        }
    }
}

impl std::error::Error for Error {}

impl Error {
    pub fn new(kind: ErrorKind) -> Self {
        Self { kind, context: None }
    }

    pub(crate) fn at(kind: ErrorKind, offset: usize) -> Self {
        Self { kind, context: Some(Context::Offset(offset)) }
    }

    pub(crate) fn for_id(kind: ErrorKind, id: Id) -> Self {
        Self { kind, context: Some(Context::Id(id)) }
    }

    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    pub fn context(&self) -> Option<Context> {
        self.context
    }
}

impl From<ErrorKind> for Error {
    fn from(kind: ErrorKind) -> Self {
        Self::new(kind)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_with_context() {
        let err = Error::at(ErrorKind::MalformedInstruction, 12);
        assert_eq!(err.to_string(), "malformed instruction at word 12");
        let err = Error::for_id(ErrorKind::UnresolvedType, 7);
        assert_eq!(err.to_string(), "unresolved type for id %7");
        let err: Error = ErrorKind::InvalidMagic.into();
        assert_eq!(err.to_string(), "invalid magic number");
        assert_eq!(err.context(), None);
        let err = Error::for_id(ErrorKind::LimitExceeded, 3);
        assert_eq!(err.to_string(), "limit exceeded for id %3");
    }
}
