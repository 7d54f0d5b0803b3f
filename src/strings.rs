//! Text rendering of reported error codes.

use core::fmt::{self, Write};

use thiserror::Error;

use crate::epath::EpathError;
use crate::error::{ErrorCode, Severity, StackError, Unit};
use crate::sce::SceError;
use crate::sfa::SfaError;
use crate::validator::ValidatorError;

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum StringError {
    #[error("Empty output buffer")]
    EmptyBuffer,
    /// The buffer holds the first `written` bytes of the text.
    #[error("Output buffer too small, text truncated after {written} bytes")]
    Truncated { written: usize },
}

fn unit_name(unit: Unit) -> &'static str {
    match unit {
        Unit::Stack => "STACK",
        Unit::Epath => "EPATH",
        Unit::Sce => "SCE",
        Unit::Sfa => "SFA",
        Unit::Svc => "SVC",
        Unit::Svs => "SVS",
    }
}

/// Short description of a code, `None` for codes no unit defines.
pub fn description(code: ErrorCode) -> Option<&'static str> {
    let table = match code.unit().ok()? {
        Unit::Stack => StackError::DESCRIPTIONS,
        Unit::Epath => EpathError::DESCRIPTIONS,
        Unit::Sce => SceError::DESCRIPTIONS,
        Unit::Sfa => SfaError::DESCRIPTIONS,
        Unit::Svc => ValidatorError::SVC_DESCRIPTIONS,
        Unit::Svs => ValidatorError::SVS_DESCRIPTIONS,
    };
    table
        .iter()
        .find(|(local, _)| *local == code.local_code())
        .map(|(_, text)| *text)
}

struct SliceWriter<'a> {
    buf: &'a mut [u8],
    len: usize,
}

impl Write for SliceWriter<'_> {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        let room = self.buf.len() - self.len;
        let take = s.len().min(room);
        self.buf[self.len..self.len + take].copy_from_slice(&s.as_bytes()[..take]);
        self.len += take;
        if take < s.len() {
            return Err(fmt::Error);
        }
        Ok(())
    }
}

/// Render `code` with its context into `buf`. Returns the text length.
///
/// # Errors
/// - [`StringError::EmptyBuffer`] if `buf` is empty
/// - [`StringError::Truncated`] if the text does not fit
pub fn error_string(
    code: ErrorCode,
    instance_id: u16,
    add_info: u32,
    buf: &mut [u8],
) -> Result<usize, StringError> {
    if buf.is_empty() {
        return Err(StringError::EmptyBuffer);
    }
    let mut writer = SliceWriter {
        buf,
        len: 0,
    };
    let severity = match code.severity() {
        Some(Severity::NotFailSafe) => "error",
        Some(Severity::FailSafe) | None => "FAIL-SAFE",
    };
    let unit = code.unit().map_or("?", unit_name);
    let text = description(code).unwrap_or("unknown error");
    let result = write!(
        writer,
        "{} 0x{:04X} {}: {} (instance {}, info 0x{:08X})",
        severity,
        code.value(),
        unit,
        text,
        instance_id,
        add_info
    );
    match result {
        Ok(()) => Ok(writer.len),
        Err(fmt::Error) => Err(StringError::Truncated {
            written: writer.len,
        }),
    }
}
