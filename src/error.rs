use std::fmt;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug)]
pub enum Error {
    /// Bad input or setup, detected before any oracle traffic.
    Configuration(String),
    /// The oracle gave up on a query after exhausting its own retries.
    OracleTransport(String),
    /// No guess produced a valid padding decision for the byte at `index`.
    OracleExhausted { index: usize },
    /// The recovered plaintext does not end in well-formed padding.
    InvalidPadding,
    /// A failure while cracking the 1-based ciphertext block `block`.
    Block { block: usize, source: Box<Error> },
}

impl Error {
    pub(crate) fn config(message: impl Into<String>) -> Self {
        Self::Configuration(message.into())
    }

    pub(crate) fn at_block(self, block: usize) -> Self {
        Self::Block {
            block,
            source: Box::new(self),
        }
    }

    /// The error underneath any block context.
    pub fn root(&self) -> &Error {
        match self {
            Self::Block { source, .. } => source.root(),
            other => other,
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::Configuration(s) => write!(f, "{}", s),
            Self::OracleTransport(s) => write!(f, "oracle request failed: {}", s),
            Self::OracleExhausted { index } => write!(
                f,
                "oracle returned false for all probes of byte {}",
                index
            ),
            Self::InvalidPadding => write!(f, "invalid padding"),
            Self::Block { block, source } => write!(f, "block {}: {}", block, source),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Block { source, .. } => Some(source.as_ref()),
            _ => None,
        }
    }
}
