use derive_more::Display;
use log::{debug, warn};

use crate::*;

/// Which binding decorations a descriptor variable is missing.
#[derive(Clone, Copy, Debug, Display, Eq, Hash, PartialEq)]
pub enum MissingDecoration {
    #[display(fmt = "DescriptorSet")]
    DescriptorSet,
    #[display(fmt = "Binding")]
    Binding,
    #[display(fmt = "DescriptorSet and Binding")]
    Both,
}

/// A recoverable oddity found while reflecting a module. Diagnostics never
/// abort parsing; they are collected on the module in discovery order.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Diagnostic {
    /// The header declares a version newer than this crate understands.
    UnsupportedVersion { major: u8, minor: u8 },
    /// An opcode was skipped. Repeated occurrences are folded together.
    UnhandledOpcode { opcode: u16, offset: usize, count: usize },
    UnknownExtInstSet { id: Id, name: String },
    UnboundDescriptorVariable {
        variable: Id,
        name: Option<String>,
        missing: MissingDecoration,
    },
    /// A resource variable whose type maps to no descriptor type.
    UnclassifiedResource { variable: Id, name: Option<String> },
    NonStructPushConstant { variable: Id },
    /// An array length given by a specialization expression rather than
    /// a literal; the dimension is reported as 1.
    NonLiteralArrayLength { array: Id },
}

struct VarName<'a>(Id, &'a Option<String>);

impl std::fmt::Display for VarName<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self.1 {
            Some(name) => write!(f, "%{} '{}'", self.0, name),
            None => write!(f, "%{}", self.0),
        }
    }
}

impl std::fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            Self::UnsupportedVersion { major, minor } =>
                write!(f, "unsupported SPIR-V version {}.{}", major, minor),
            Self::UnhandledOpcode { opcode, offset, count } => write!(
                f, "unhandled opcode {} ({} occurrence(s), first at word {})",
                opcode, count, offset,
            ),
            Self::UnknownExtInstSet { id, name } =>
                write!(f, "unknown extended instruction set %{} \"{}\"", id, name),
            Self::UnboundDescriptorVariable { variable, name, missing } => write!(
                f, "descriptor variable {} has no {} decoration",
                VarName(*variable, name), missing,
            ),
            Self::UnclassifiedResource { variable, name } => write!(
                f, "resource variable {} has no descriptor type",
                VarName(*variable, name),
            ),
            Self::NonStructPushConstant { variable } =>
                write!(f, "push constant %{} is not a struct", variable),
            Self::NonLiteralArrayLength { array } =>
                write!(f, "array type %{} has a non-literal length", array),
        }
    }
}

impl Diagnostic {
    /// Whether this is worth surfacing to a user at the default log level.
    pub fn is_warning(&self) -> bool {
        match self {
            Self::UnhandledOpcode { .. } => false,
            Self::UnknownExtInstSet { name, .. } =>
                !ExtInstSet::from_name(name).is_non_semantic(),
            _ => true,
        }
    }
}

/// Records a diagnostic and logs it.
pub(crate) fn report(diagnostics: &mut Vec<Diagnostic>, diag: Diagnostic) {
    if diag.is_warning() {
        warn!("{}", diag);
    } else {
        debug!("{}", diag);
    }
    diagnostics.push(diag);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display() {
        let diag = Diagnostic::UnboundDescriptorVariable {
            variable: 9,
            name: Some("ubo".to_owned()),
            missing: MissingDecoration::Binding,
        };
        assert_eq!(diag.to_string(), "descriptor variable %9 'ubo' has no Binding decoration");
        let diag = Diagnostic::UnhandledOpcode { opcode: 4242, offset: 30, count: 2 };
        assert_eq!(
            diag.to_string(),
            "unhandled opcode 4242 (2 occurrence(s), first at word 30)",
        );
        assert!(!diag.is_warning());
    }

    #[test]
    fn non_semantic_sets_are_quiet() {
        let diag = Diagnostic::UnknownExtInstSet {
            id: 1,
            name: "NonSemantic.Vendor".to_owned(),
        };
        assert!(!diag.is_warning());
        let diag = Diagnostic::UnknownExtInstSet { id: 1, name: "Vendor".to_owned() };
        assert!(diag.is_warning());
    }
}
