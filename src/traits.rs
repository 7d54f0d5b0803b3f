use crate::error::ErrorCode;
use crate::sfa::{MixedWriter, SfaError};

/// A trait for safety telegrams that can be decoded from a received buffer and
/// encoded through a [`MixedWriter`].
///
/// `WireFormat` acts as the base trait for every cyclic message of the
/// stack. Encoding never produces a telegram in wire order; see
/// [`crate::sfa::encode_mixed`].
pub trait WireFormat: Sized {
    /// Everything besides the bytes themselves needed to pick the layout.
    type Layout: Copy;

    /// Decode a value from a received buffer.
    /// # Errors
    /// - if the buffer length is not the frame size of `layout`
    fn decode(layout: Self::Layout, bytes: &[u8]) -> Result<Self, SfaError>;

    /// Returns the number of bytes required to encode this value.
    /// # Errors
    /// - if the value cannot be represented in `layout`
    fn required_size(&self, layout: Self::Layout) -> Result<usize, SfaError>;

    /// Encode a value through the mixing writer.
    /// # Errors
    /// - If a byte cannot be placed in the telegram
    fn encode(&self, layout: Self::Layout, writer: &mut MixedWriter<'_>) -> Result<(), SfaError>;
}

/// The safety application the stack reports to.
pub trait SafetyApplication {
    /// Called once per error at the stack boundary.
    ///
    /// For a fail-safe `code` the application must put the device into a
    /// latched safe state and must not call the stack again until restart.
    /// `instance_id` is 0 when the error is not tied to a validator instance.
    fn report_error(&mut self, code: ErrorCode, instance_id: u16, add_info: u32);

    /// Called with the safety data of every data message a consumer instance
    /// accepted.
    fn data_received(&mut self, _instance_id: u16, _data: &[u8], _run: bool) {}
}

/// Outbound side of the transport boundary.
pub trait Transport {
    /// Push a reply or telegram towards the network. `command` uses the same
    /// layout as inbound commands: command index in the high byte, unit ID in
    /// the low byte.
    ///
    /// Safety telegrams are handed over mixed; the transport delivers
    /// received telegrams in wire order.
    fn tx_data_put(&mut self, command: u16, data: &[u8]);
}

impl<F> SafetyApplication for F
where
    F: FnMut(ErrorCode, u16, u32),
{
    fn report_error(&mut self, code: ErrorCode, instance_id: u16, add_info: u32) {
        self(code, instance_id, add_info)
    }
}
