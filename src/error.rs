use std::fmt;

/// Runtime error taxonomy shared by the rewrite engine, the interpreters,
/// and the C backend.
///
/// "No match" is deliberately absent: rewrite rules signal it out-of-band
/// by returning `Option::None`, so a rule may legitimately rewrite a node
/// to any term value without colliding with the signal.
#[derive(Debug)]
pub enum Error {
    /// A name was referenced before any frame bound it.
    UnboundVariable(String),

    /// A declared type disagrees with the type at the point of use, or an
    /// operation was applied to operands it does not accept.
    TypeMismatch(String),

    /// A node kind reached a component that has no rule for it. This is a
    /// programming error (an unimplemented language feature), never
    /// silently ignored.
    UnsupportedNode { node: String, context: String },

    /// No `ftype` computation is known for a value's runtime representation.
    UnknownFType(String),

    /// A call received the wrong number of arguments.
    Arity {
        name: String,
        expected: usize,
        got: usize,
    },

    /// A buffer access outside its extent.
    OutOfBounds { index: Vec<usize>, shape: Vec<usize> },

    /// The external toolchain failed. Carries the full generated source and
    /// the toolchain's own diagnostics for debuggability.
    BuildFailure {
        command: String,
        stderr: String,
        /// The generated C translation unit that failed to build.
        source: String,
    },

    Io(std::io::Error),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::UnboundVariable(name) => write!(f, "unbound variable `{name}`"),
            Error::TypeMismatch(msg) => write!(f, "type mismatch: {msg}"),
            Error::UnsupportedNode { node, context } => {
                write!(f, "unsupported node {node} in {context}")
            }
            Error::UnknownFType(repr) => write!(f, "ftype is not implemented for `{repr}`"),
            Error::Arity {
                name,
                expected,
                got,
            } => write!(f, "`{name}` expects {expected} argument(s), got {got}"),
            Error::OutOfBounds { index, shape } => {
                write!(f, "index {index:?} out of bounds for shape {shape:?}")
            }
            Error::BuildFailure {
                command, stderr, ..
            } => write!(f, "build failure running `{command}`:\n{stderr}"),
            Error::Io(err) => write!(f, "i/o error: {err}"),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Io(err) => Some(err),
            _ => None,
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::Io(err)
    }
}

impl Error {
    pub fn unsupported(node: impl Into<String>, context: impl Into<String>) -> Self {
        Error::UnsupportedNode {
            node: node.into(),
            context: context.into(),
        }
    }

    pub fn mismatch(message: impl Into<String>) -> Self {
        Error::TypeMismatch(message.into())
    }
}
