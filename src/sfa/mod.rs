//! Safety frame assembly: wire layouts of data, time coordination and time
//! correction messages.
//!
//! Decoding reads a plain received buffer. Encoding always goes through a
//! [`MixedWriter`] so a complete telegram never exists in wire order.

mod data_msg;
mod error;
mod mix;
mod time_msg;

pub use data_msg::{DataLayout, DataMsg, ModeByte};
pub use error::SfaError;
pub use mix::{MixMethod, MixedWriter, scatter_write, unmix};
pub use time_msg::{AckByte, McastByte, TcooMsg, TcorrMsg};

/// Size of a time coordination message in both formats.
pub const TCOO_SIZE: usize = 6;
/// Size of a time correction message in both formats.
pub const TCORR_SIZE: usize = 6;

pub const MIN_DATA_LEN: usize = 1;
pub const MAX_SHORT_DATA_LEN: usize = 2;
pub const MAX_DATA_LEN: usize = 250;

/// Largest Base Short frame (2 data bytes).
pub const BASE_SHORT_MAX_FRAME: usize = MAX_SHORT_DATA_LEN + 6;
/// Largest Base Long frame (250 data bytes).
pub const BASE_LONG_MAX_FRAME: usize = 2 * MAX_DATA_LEN + 8;
/// Largest Extended frame (250 data bytes).
pub const EXTENDED_MAX_FRAME: usize = MAX_DATA_LEN + 6;

/// Largest frame of any kind, sizes the transmit buffers.
pub const MAX_FRAME_SIZE: usize = BASE_LONG_MAX_FRAME;

/// Frame format negotiated at connection establishment.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub enum SafetyFormat {
    #[default]
    Base,
    Extended,
}

/// Data length class of a data message.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum MsgLength {
    /// 1 or 2 data bytes.
    Short,
    /// 3 to 250 data bytes.
    Long,
}

impl MsgLength {
    pub fn for_data_len(data_len: usize) -> Result<Self, SfaError> {
        match data_len {
            MIN_DATA_LEN..=MAX_SHORT_DATA_LEN => Ok(MsgLength::Short),
            3..=MAX_DATA_LEN => Ok(MsgLength::Long),
            other => Err(SfaError::DataLength(other)),
        }
    }
}

/// Wire size of a data message carrying `data_len` bytes.
pub fn data_frame_size(format: SafetyFormat, data_len: usize) -> Result<usize, SfaError> {
    let length = MsgLength::for_data_len(data_len)?;
    Ok(match (format, length) {
        (SafetyFormat::Base, MsgLength::Short) => data_len + 6,
        (SafetyFormat::Base, MsgLength::Long) => 2 * data_len + 8,
        (SafetyFormat::Extended, _) => data_len + 6,
    })
}

/// Data length carried by a data frame of `frame_size` bytes, `None` if no
/// data message has that size.
pub fn data_len_for_frame(format: SafetyFormat, frame_size: usize) -> Option<usize> {
    let data_len = match format {
        SafetyFormat::Base if frame_size <= BASE_SHORT_MAX_FRAME => frame_size.checked_sub(6)?,
        SafetyFormat::Base => {
            let doubled = frame_size.checked_sub(8)?;
            if doubled % 2 != 0 {
                return None;
            }
            doubled / 2
        }
        SafetyFormat::Extended => frame_size.checked_sub(6)?,
    };
    match data_frame_size(format, data_len) {
        Ok(size) if size == frame_size => Some(data_len),
        _ => None,
    }
}

/// Encode `msg` into `out` with every byte scattered by `method`. Returns the
/// telegram length.
///
/// # Errors
/// - if `out` is too small or the message does not fill its telegram exactly
pub fn encode_mixed<T: crate::traits::WireFormat>(
    msg: &T,
    layout: T::Layout,
    method: MixMethod,
    out: &mut [u8],
) -> Result<usize, SfaError> {
    let total_len = msg.required_size(layout)?;
    let mut writer = MixedWriter::new(out, total_len, method)?;
    msg.encode(layout, &mut writer)?;
    writer.finish()
}

/// Reject a received buffer whose length is not the expected frame size.
pub(crate) fn expect_len(bytes: &[u8], expected: usize) -> Result<(), SfaError> {
    if bytes.len() != expected {
        return Err(SfaError::LengthMismatch {
            expected,
            actual: bytes.len(),
        });
    }
    Ok(())
}
