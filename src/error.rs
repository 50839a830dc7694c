use std::error;
use std::fmt;




#[derive(Debug)]


/**
 * Error to represent invalid or missing run-time parameters. Violations of
 * the hierarchy's preconditions (bad level indexes, mismatched box and rank
 * counts) are not represented here; those panic at the detecting call.
 */
pub enum Error {
    Syntax(String),
    MissingParameter(String),
    MissingValue { name: String, index: usize },
    TypeMismatch { name: String, value: String, expected: &'static str },
    InvalidParameter(String),
    Io(String, std::io::Error),
    Codec(String),
}




// ============================================================================
impl Error {
    pub fn invalid<S: Into<String>>(message: S) -> Self {
        Error::InvalidParameter(message.into())
    }
}

impl fmt::Display for Error {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> Result<(), fmt::Error> {
        use Error::*;

        match self {
            Syntax(s) => write!(fmt, "syntax error in parameter input: {}", s),
            MissingParameter(name) => write!(fmt, "required parameter {} not found", name),
            MissingValue { name, index } => write!(fmt, "parameter {} has no value number {}", name, index),
            TypeMismatch { name, value, expected } => write!(fmt, "parameter {}: expected {}, got \"{}\"", name, expected, value),
            InvalidParameter(s) => write!(fmt, "invalid parameter: {}", s),
            Io(path, e) => write!(fmt, "could not read {}: {}", path, e),
            Codec(s) => write!(fmt, "codec failure: {}", s),
        }
    }
}

impl error::Error for Error {
    fn source(&self) -> Option<&(dyn error::Error + 'static)> {
        match self {
            Error::Io(_, e) => Some(e),
            _ => None,
        }
    }
}
