//! Error types of the assembler and of the memory dump importer.

use std::fmt;

/// The reason an assembly line was rejected.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ErrorKind {
    /// The instruction or directive got too few or too many arguments.
    WrongNumberOfArguments { mnemonic: String },

    /// The mnemonic is neither an instruction of the machine nor a directive.
    InvalidInstruction {
        mnemonic: String,
        /// A known mnemonic close to the one written.
        suggestion: Option<String>,
    },

    /// An address operand is out of range or cannot be resolved.
    InvalidAddress { value: String },

    /// A value operand is out of range or cannot be resolved.
    InvalidValue { value: String },

    InvalidString { value: String },

    /// A label is not a letter or underscore followed by letters, digits and underscores.
    InvalidLabel { label: String },

    /// An argument does not fit any syntax the instruction accepts.
    InvalidArgument { argument: String },

    DuplicateLabel { label: String },

    /// The line places a byte on an address an earlier line already used.
    MemoryOverlap { address: usize },

    /// The line uses a feature the machine does not support.
    NotImplemented { feature: String },
}

impl ErrorKind {
    /// The code identifying the kind of error, eg. `MEMORY_OVERLAP`.
    pub fn code(&self) -> &'static str {
        match self {
            ErrorKind::WrongNumberOfArguments { .. } => "WRONG_NUMBER_OF_ARGUMENTS",
            ErrorKind::InvalidInstruction { .. } => "INVALID_INSTRUCTION",
            ErrorKind::InvalidAddress { .. } => "INVALID_ADDRESS",
            ErrorKind::InvalidValue { .. } => "INVALID_VALUE",
            ErrorKind::InvalidString { .. } => "INVALID_STRING",
            ErrorKind::InvalidLabel { .. } => "INVALID_LABEL",
            ErrorKind::InvalidArgument { .. } => "INVALID_ARGUMENT",
            ErrorKind::DuplicateLabel { .. } => "DUPLICATE_LABEL",
            ErrorKind::MemoryOverlap { .. } => "MEMORY_OVERLAP",
            ErrorKind::NotImplemented { .. } => "NOT_IMPLEMENTED",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            ErrorKind::WrongNumberOfArguments { mnemonic } => {
                write!(f, "Wrong number of arguments for {}", mnemonic)
            }
            ErrorKind::InvalidInstruction { mnemonic, suggestion: Some(suggestion) } => {
                write!(f, "Invalid instruction {}, did you mean {}?", mnemonic, suggestion)
            }
            ErrorKind::InvalidInstruction { mnemonic, suggestion: None } => {
                write!(f, "Invalid instruction {}", mnemonic)
            }
            ErrorKind::InvalidAddress { value } => write!(f, "Invalid address {}", value),
            ErrorKind::InvalidValue { value } => write!(f, "Invalid value {}", value),
            ErrorKind::InvalidString { value } => write!(f, "Invalid string {}", value),
            ErrorKind::InvalidLabel { label } => write!(f, "Invalid label {}", label),
            ErrorKind::InvalidArgument { argument } => write!(f, "Invalid argument {}", argument),
            ErrorKind::DuplicateLabel { label } => write!(f, "Duplicate label {}", label),
            ErrorKind::MemoryOverlap { address } => {
                write!(f, "Memory overlap at address {}", address)
            }
            ErrorKind::NotImplemented { feature } => write!(f, "Not implemented: {}", feature),
        }
    }
}

/// An error on a line of assembly source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssemblerError {
    /// Zero based line number.
    pub line: usize,
    pub kind: ErrorKind,
}

impl AssemblerError {
    pub fn new(line: usize, kind: ErrorKind) -> AssemblerError {
        AssemblerError { line, kind }
    }
}

impl fmt::Display for AssemblerError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "Line {}: {}", self.line + 1, self.kind)
    }
}

impl std::error::Error for AssemblerError {}

/// Reasons a memory dump cannot be loaded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImportError {
    /// The dump does not have exactly the size the machine requires.
    InvalidSize { expected: usize, found: usize },

    /// The dump was made by another machine.
    IdentifierMismatch { expected: String, found: String },

    /// The dump could not be parsed.
    Malformed,
}

impl fmt::Display for ImportError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            ImportError::InvalidSize { expected, found } => {
                write!(f, "invalid file size: expected {} bytes, found {}", expected, found)
            }
            ImportError::IdentifierMismatch { expected, found } => {
                write!(f, "file belongs to machine {:?}, expected {:?}", found, expected)
            }
            ImportError::Malformed => write!(f, "malformed memory dump"),
        }
    }
}

impl std::error::Error for ImportError {}
