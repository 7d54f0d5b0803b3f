//! Safety validator instances and their time coordination.
//!
//! A target owns two kinds of instances:
//! - a [`SafetyValidatorClient`] produces safety data for up to 15 consumers
//!   and checks their time coordination replies
//! - a [`SafetyValidatorServer`] consumes safety data, answers ping counts
//!   and applies time corrections
//!
//! Time is passed in explicitly as a free running 16-bit counter of
//! [`TICK_US`] microsecond ticks.

mod client;
pub mod crc;
mod error;
mod server;
mod tcoo;

pub use client::{SafetyValidatorClient, TcooOutcome};
pub use error::ValidatorError;
pub use server::{Consumed, SafetyValidatorServer};
pub use tcoo::{
    ConsumerState, ConsumerTime, MAX_RESPONSE_LIMIT, MIN_RESPONSE_LIMIT, TICK_US, TcooCheck,
    TimeConstants, build_tcoo, connection_correction_constant, response_epi_limit,
    time_drift_constant, time_drift_per_ping_interval,
};

use crate::sce::ConnectionTriad;

/// One allocated validator instance.
#[derive(Debug, Clone)]
pub enum Validator {
    Client(SafetyValidatorClient),
    Server(SafetyValidatorServer),
}

impl Validator {
    pub fn instance_id(&self) -> u16 {
        match self {
            Validator::Client(client) => client.instance_id(),
            Validator::Server(server) => server.instance_id(),
        }
    }

    /// Whether the connection identified by `triad` runs through this instance.
    pub fn owns(&self, triad: &ConnectionTriad) -> bool {
        match self {
            Validator::Client(client) => client.consumer_of(triad).is_some(),
            Validator::Server(server) => server.triad() == *triad,
        }
    }
}
