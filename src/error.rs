use thiserror::Error;

/// Error type bits (15..14) of a classified error code.
///
/// The two patterns differ in both bits, so a single flipped bit can never turn a
/// fail-safe error into a not-fail-safe one.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Severity {
    /// Stack integrity or program flow violated. The device must enter a latched
    /// safe state and the stack must not be called again until restart.
    FailSafe,
    /// Malformed or out-of-range input. The stack reports it and carries on.
    NotFailSafe,
}

const SEVERITY_SHIFT: u16 = 14;
const SEVERITY_FAIL_SAFE: u16 = 0b10;
const SEVERITY_NOT_FAIL_SAFE: u16 = 0b01;
const LAYER_STACK: u16 = 0x2000;
const UNIT_SHIFT: u16 = 8;
const UNIT_MASK: u16 = 0x1F;

impl Severity {
    const fn bits(self) -> u16 {
        match self {
            Severity::FailSafe => SEVERITY_FAIL_SAFE,
            Severity::NotFailSafe => SEVERITY_NOT_FAIL_SAFE,
        }
    }
}

/// Functional units of the stack. The value is the 5-bit unit ID of an [`ErrorCode`]
/// and the low byte of a transport command.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[repr(u8)]
pub enum Unit {
    /// Command dispatch and instance arena.
    Stack = 0x01,
    /// EPATH parser.
    Epath = 0x02,
    /// SafetyOpen / SafetyClose parsing and validation.
    Sce = 0x03,
    /// Safety frame assembly (codec).
    Sfa = 0x04,
    /// Safety validator client (producer).
    Svc = 0x05,
    /// Safety validator server (consumer).
    Svs = 0x06,
}

impl TryFrom<u8> for Unit {
    type Error = u8;
    fn try_from(value: u8) -> Result<Self, u8> {
        match value {
            0x01 => Ok(Unit::Stack),
            0x02 => Ok(Unit::Epath),
            0x03 => Ok(Unit::Sce),
            0x04 => Ok(Unit::Sfa),
            0x05 => Ok(Unit::Svc),
            0x06 => Ok(Unit::Svs),
            other => Err(other),
        }
    }
}

/// Packed 16-bit error code handed to the safety application.
///
/// Layout: bits 15..14 error type, bit 13 layer, bits 12..8 unit ID, bits 7..0
/// unit specific code.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub struct ErrorCode(u16);

impl ErrorCode {
    pub const fn new(severity: Severity, unit: Unit, code: u8) -> Self {
        ErrorCode(
            (severity.bits() << SEVERITY_SHIFT)
                | LAYER_STACK
                | ((unit as u16 & UNIT_MASK) << UNIT_SHIFT)
                | code as u16,
        )
    }

    #[inline]
    pub const fn value(&self) -> u16 {
        self.0
    }

    /// `None` when the type bits hold neither valid pattern.
    pub const fn severity(&self) -> Option<Severity> {
        match self.0 >> SEVERITY_SHIFT {
            SEVERITY_FAIL_SAFE => Some(Severity::FailSafe),
            SEVERITY_NOT_FAIL_SAFE => Some(Severity::NotFailSafe),
            _ => None,
        }
    }

    /// Codes with corrupted type bits are treated as fail-safe.
    #[inline]
    pub const fn is_fail_safe(&self) -> bool {
        !matches!(self.severity(), Some(Severity::NotFailSafe))
    }

    #[inline]
    pub const fn is_stack_layer(&self) -> bool {
        self.0 & LAYER_STACK != 0
    }

    pub fn unit(&self) -> Result<Unit, u8> {
        Unit::try_from(((self.0 >> UNIT_SHIFT) & UNIT_MASK) as u8)
    }

    #[inline]
    pub const fn local_code(&self) -> u8 {
        (self.0 & 0xFF) as u8
    }
}

impl From<u16> for ErrorCode {
    fn from(value: u16) -> Self {
        ErrorCode(value)
    }
}

impl From<ErrorCode> for u16 {
    fn from(code: ErrorCode) -> u16 {
        code.0
    }
}

/// Implemented by every unit error so it can be reported through the safety
/// application callback.
pub trait Classify {
    fn unit(&self) -> Unit;
    fn severity(&self) -> Severity;
    /// Unit specific code, stable across releases.
    fn local_code(&self) -> u8;

    fn error_code(&self) -> ErrorCode {
        ErrorCode::new(self.severity(), self.unit(), self.local_code())
    }

    fn is_fail_safe(&self) -> bool {
        self.severity() == Severity::FailSafe
    }
}

/// Errors raised by the stack itself (dispatch, arena, configuration).
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StackError {
    #[error("Declared command length {declared} does not match buffer length {actual}")]
    LengthMismatch { declared: u16, actual: usize },
    #[error("Unknown command 0x{0:04X}")]
    UnknownCommand(u16),
    #[error("Command payload too short: {0} bytes")]
    CommandTooShort(usize),
    #[error("No safety validator instance {0}")]
    InstanceNotFound(u16),
    #[error("Safety validator instance {0} has the wrong role for this command")]
    WrongInstanceKind(u16),
    #[error("Invalid stack configuration: {0}")]
    InvalidConfig(&'static str),
    #[error("Instance index table corrupted at index {0}")]
    IndexTableCorrupted(usize),
    #[error("Stack is latched after a fail-safe error")]
    Latched,
    #[error("Stack actor is no longer running")]
    ActorStopped,
    #[error("Reply does not fit the reply buffer")]
    ReplyEncoding,
}

impl StackError {
    pub const CODE_LENGTH_MISMATCH: u8 = 0x01;
    pub const CODE_UNKNOWN_COMMAND: u8 = 0x02;
    pub const CODE_COMMAND_TOO_SHORT: u8 = 0x03;
    pub const CODE_INSTANCE_NOT_FOUND: u8 = 0x04;
    pub const CODE_WRONG_INSTANCE_KIND: u8 = 0x05;
    pub const CODE_INVALID_CONFIG: u8 = 0x06;
    pub const CODE_INDEX_TABLE: u8 = 0x07;
    pub const CODE_LATCHED: u8 = 0x08;
    pub const CODE_ACTOR_STOPPED: u8 = 0x09;
    pub const CODE_REPLY_ENCODING: u8 = 0x0A;

    pub(crate) const DESCRIPTIONS: &'static [(u8, &'static str)] = &[
        (Self::CODE_LENGTH_MISMATCH, "command length mismatch"),
        (Self::CODE_UNKNOWN_COMMAND, "unknown command"),
        (Self::CODE_COMMAND_TOO_SHORT, "command payload too short"),
        (Self::CODE_INSTANCE_NOT_FOUND, "instance not found"),
        (Self::CODE_WRONG_INSTANCE_KIND, "wrong instance kind"),
        (Self::CODE_INVALID_CONFIG, "invalid configuration"),
        (Self::CODE_INDEX_TABLE, "instance index table corrupted"),
        (Self::CODE_LATCHED, "stack latched"),
        (Self::CODE_ACTOR_STOPPED, "actor stopped"),
        (Self::CODE_REPLY_ENCODING, "reply encoding"),
    ];
}

impl Classify for StackError {
    fn unit(&self) -> Unit {
        Unit::Stack
    }

    fn severity(&self) -> Severity {
        match self {
            StackError::LengthMismatch { .. }
            | StackError::InvalidConfig(_)
            | StackError::IndexTableCorrupted(_)
            | StackError::Latched
            | StackError::ReplyEncoding => Severity::FailSafe,
            StackError::UnknownCommand(_)
            | StackError::CommandTooShort(_)
            | StackError::InstanceNotFound(_)
            | StackError::WrongInstanceKind(_)
            | StackError::ActorStopped => Severity::NotFailSafe,
        }
    }

    fn local_code(&self) -> u8 {
        match self {
            StackError::LengthMismatch { .. } => Self::CODE_LENGTH_MISMATCH,
            StackError::UnknownCommand(_) => Self::CODE_UNKNOWN_COMMAND,
            StackError::CommandTooShort(_) => Self::CODE_COMMAND_TOO_SHORT,
            StackError::InstanceNotFound(_) => Self::CODE_INSTANCE_NOT_FOUND,
            StackError::WrongInstanceKind(_) => Self::CODE_WRONG_INSTANCE_KIND,
            StackError::InvalidConfig(_) => Self::CODE_INVALID_CONFIG,
            StackError::IndexTableCorrupted(_) => Self::CODE_INDEX_TABLE,
            StackError::Latched => Self::CODE_LATCHED,
            StackError::ActorStopped => Self::CODE_ACTOR_STOPPED,
            StackError::ReplyEncoding => Self::CODE_REPLY_ENCODING,
        }
    }
}

/// Crate level error wrapping the error of the unit that raised it.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    #[error(transparent)]
    Stack(#[from] StackError),
    #[error(transparent)]
    Path(#[from] crate::epath::EpathError),
    #[error(transparent)]
    Frame(#[from] crate::sfa::SfaError),
    #[error(transparent)]
    Connection(#[from] crate::sce::SceError),
    #[error(transparent)]
    Validator(#[from] crate::validator::ValidatorError),
}

impl Classify for Error {
    fn unit(&self) -> Unit {
        match self {
            Error::Stack(e) => e.unit(),
            Error::Path(e) => e.unit(),
            Error::Frame(e) => e.unit(),
            Error::Connection(e) => e.unit(),
            Error::Validator(e) => e.unit(),
        }
    }

    fn severity(&self) -> Severity {
        match self {
            Error::Stack(e) => e.severity(),
            Error::Path(e) => e.severity(),
            Error::Frame(e) => e.severity(),
            Error::Connection(e) => e.severity(),
            Error::Validator(e) => e.severity(),
        }
    }

    fn local_code(&self) -> u8 {
        match self {
            Error::Stack(e) => e.local_code(),
            Error::Path(e) => e.local_code(),
            Error::Frame(e) => e.local_code(),
            Error::Connection(e) => e.local_code(),
            Error::Validator(e) => e.local_code(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_code_layout() {
        let code = ErrorCode::new(Severity::FailSafe, Unit::Sfa, 0x12);
        assert_eq!(code.value(), 0x8000 | 0x2000 | 0x0400 | 0x12);
        assert_eq!(code.severity(), Some(Severity::FailSafe));
        assert_eq!(code.unit(), Ok(Unit::Sfa));
        assert_eq!(code.local_code(), 0x12);
        assert!(code.is_stack_layer());

        let code = ErrorCode::new(Severity::NotFailSafe, Unit::Epath, 0x01);
        assert_eq!(code.value(), 0x4000 | 0x2000 | 0x0200 | 0x01);
        assert!(!code.is_fail_safe());
    }

    #[test]
    fn test_severity_patterns_differ_in_two_bits() {
        let fail_safe = ErrorCode::new(Severity::FailSafe, Unit::Svc, 0x05).value();
        let not_fail_safe = ErrorCode::new(Severity::NotFailSafe, Unit::Svc, 0x05).value();
        assert_eq!((fail_safe ^ not_fail_safe).count_ones(), 2);
    }

    #[test]
    fn test_corrupted_type_bits_are_fail_safe() {
        let code = ErrorCode::from(0x0000 | 0x2000 | 0x0100 | 0x01);
        assert_eq!(code.severity(), None);
        assert!(code.is_fail_safe());
        let code = ErrorCode::from(0xC000 | 0x2000 | 0x0100 | 0x01);
        assert!(code.is_fail_safe());
    }

    #[test]
    fn test_stack_error_classification() {
        let err = StackError::LengthMismatch {
            declared: 10,
            actual: 9,
        };
        assert!(err.is_fail_safe());
        assert_eq!(err.error_code().unit(), Ok(Unit::Stack));

        let err = Error::from(StackError::UnknownCommand(0x0909));
        assert!(!err.is_fail_safe());
        assert_eq!(err.local_code(), StackError::CODE_UNKNOWN_COMMAND);
    }
}
