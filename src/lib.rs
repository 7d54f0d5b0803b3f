//! # CIP Safety
//!
//! Target side of a CIP Safety stack: the part of a safety device that accepts
//! safety connections and runs the safety validators on them.
//!
//! The crate covers:
//! - EPATH parsing of connection paths ([`epath`])
//! - SafetyOpen (Forward_Open) and SafetyClose (Forward_Close) parsing,
//!   validation and replies ([`sce`])
//! - the safety frame codec with the mixing copy ([`sfa`])
//! - producing and consuming safety validators with time coordination
//!   ([`validator`])
//! - command dispatch over an arena of validator instances ([`Stack`])
//!
//! ## Design
//!
//! Every call runs to completion; there is no internal threading. Time is
//! passed in explicitly as a free running 16-bit counter of 128 us ticks.
//! Errors carry a packed [`ErrorCode`] and are split into fail-safe and not
//! fail-safe errors. After a fail-safe error the device must enter a latched
//! safe state; the [`Stack`] refuses every further call.
//!
//! With the `runtime` feature the stack can be moved onto a tokio task and
//! driven through a [`StackHandle`].
//!
//! ## Example
//!
//! ```
//! use cip_safety::{DeviceIdentity, ErrorCode, Stack, StackConfig, Transport};
//!
//! struct Outbox;
//! impl Transport for Outbox {
//!     fn tx_data_put(&mut self, _command: u16, _data: &[u8]) {}
//! }
//!
//! let config = StackConfig::new(DeviceIdentity::new(0x1234, 0x0023, 0x0001, 1, 1), 4);
//! let report = |code: ErrorCode, _instance: u16, _info: u32| {
//!     assert!(!code.is_fail_safe());
//! };
//! let stack = Stack::new(config, report, Outbox).unwrap();
//! assert!(!stack.is_latched());
//! ```

pub mod cip;
mod config;
pub mod epath;
mod error;
pub mod sce;
pub mod sfa;
mod stack;
#[cfg(feature = "error-strings")]
pub mod strings;
pub mod traits;
pub mod validator;
mod wire;

#[cfg(feature = "runtime")]
mod runtime;

pub use config::{DeviceIdentity, MAX_CONSUMERS, Role, StackConfig};
pub use error::{Classify, Error, ErrorCode, Severity, StackError, Unit};
pub use stack::{
    CMD_DATA, CMD_FORWARD_CLOSE, CMD_FORWARD_OPEN, CMD_TCOO, CMD_TCORR, CMD_TX_DATA, CMD_TX_TCOO,
    CMD_TX_TCORR, Stack, command,
};
pub use traits::{SafetyApplication, Transport, WireFormat};

#[cfg(feature = "runtime")]
pub use runtime::StackHandle;
