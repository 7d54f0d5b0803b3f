//! Command dispatch and the validator instance arena.
//!
//! The [`Stack`] owns every validator instance and talks to the outside
//! world through two collaborators:
//! - [`SafetyApplication`] receives every error exactly once, plus the data
//!   of accepted data messages
//! - [`Transport`] takes replies and transmitted telegrams
//!
//! Inbound traffic enters through [`Stack::cmd_process`] as a 16-bit command
//! (command index in the high byte, unit ID in the low byte) or through the
//! typed entry points it dispatches to. Once a fail-safe error has been
//! reported the stack latches and refuses every further call.

use std::io::{self, Cursor};

use tracing::{debug, error, info, trace, warn};

use crate::cip::{CipStatus, GeneralStatus};
use crate::config::StackConfig;
use crate::error::{Classify, Error, StackError, Unit};
use crate::sce::{
    ConnectionTriad, ForwardCloseReply, ForwardOpenFailure, ForwardOpenSuccess, MAX_REPLY_SIZE,
    OpenPlan, SafetyAppReply, SceError, ValidatorKind, parse_forward_close, parse_forward_open,
    validate_forward_open,
};
use crate::sfa::{MAX_FRAME_SIZE, SfaError, TCOO_SIZE};
use crate::traits::{SafetyApplication, Transport};
use crate::validator::{
    SafetyValidatorClient, SafetyValidatorServer, TcooOutcome, Validator, ValidatorError,
};
use crate::wire::WireReader;

/// SafetyOpen request body. Reply sent with the same command.
pub const CMD_FORWARD_OPEN: u8 = 0x01;
/// SafetyClose request body. Reply sent with the same command.
pub const CMD_FORWARD_CLOSE: u8 = 0x02;
/// Time coordination message: instance ID (2), consumer number (1), frame.
pub const CMD_TCOO: u8 = 0x03;
/// Data message: instance ID (2), frame.
pub const CMD_DATA: u8 = 0x04;
/// Time correction message: instance ID (2), frame.
pub const CMD_TCORR: u8 = 0x05;
/// Outbound data message: instance ID (2), mixed frame.
pub const CMD_TX_DATA: u8 = 0x10;
/// Outbound time correction message: instance ID (2), consumer number (1), mixed frame.
pub const CMD_TX_TCORR: u8 = 0x11;
/// Outbound time coordination message: instance ID (2), mixed frame.
pub const CMD_TX_TCOO: u8 = 0x12;

/// Assemble a transport command from its index and destination unit.
pub const fn command(index: u8, unit: Unit) -> u16 {
    ((index as u16) << 8) | unit as u16
}

const INSTANCE_PREFIX: usize = 2;
const TX_BUFFER_SIZE: usize = INSTANCE_PREFIX + 1 + MAX_FRAME_SIZE;

/// An error on its way to the safety application, with the instance it
/// belongs to.
struct Failure {
    error: Error,
    instance_id: u16,
}

impl Failure {
    fn at(instance_id: u16, error: impl Into<Error>) -> Self {
        Self {
            error: error.into(),
            instance_id,
        }
    }
}

impl From<StackError> for Failure {
    fn from(error: StackError) -> Self {
        Failure::at(0, error)
    }
}

impl From<SceError> for Failure {
    fn from(error: SceError) -> Self {
        Failure::at(0, error)
    }
}

/// Additional information reported with an error code.
fn add_info(error: &Error) -> u32 {
    match error {
        Error::Stack(StackError::LengthMismatch { actual, .. }) => {
            u32::try_from(*actual).unwrap_or(u32::MAX)
        }
        Error::Stack(StackError::UnknownCommand(command)) => (*command).into(),
        Error::Stack(
            StackError::InstanceNotFound(instance_id) | StackError::WrongInstanceKind(instance_id),
        ) => (*instance_id).into(),
        Error::Connection(err) => err.status().extended.map_or(0, |ext| u16::from(ext).into()),
        Error::Validator(err) => err.add_info(),
        Error::Frame(SfaError::LengthMismatch { actual, .. }) => {
            u32::try_from(*actual).unwrap_or(u32::MAX)
        }
        _ => 0,
    }
}

/// Connection Triad of a SafetyOpen request that failed to parse, default if
/// the request is too short to carry one.
fn request_triad(payload: &[u8]) -> ConnectionTriad {
    fn read(payload: &[u8]) -> Option<ConnectionTriad> {
        let mut reader = WireReader::new(payload);
        reader.skip(10)?;
        Some(ConnectionTriad {
            connection_serial: reader.read_u16()?,
            vendor_id: reader.read_u16()?,
            originator_serial: reader.read_u32()?,
        })
    }
    read(payload).unwrap_or_default()
}

fn split_header<const N: usize>(bytes: &[u8]) -> Result<([u8; N], &[u8]), StackError> {
    let (head, rest) = bytes
        .split_first_chunk::<N>()
        .ok_or(StackError::CommandTooShort(bytes.len()))?;
    Ok((*head, rest))
}

/// A CIP Safety target: SafetyOpen/SafetyClose handling and every validator
/// instance it created.
pub struct Stack<A, T> {
    config: StackConfig,
    app: A,
    transport: T,
    /// Slot `i` holds instance ID `i + 1`.
    instances: Vec<Option<Validator>>,
    latched: bool,
}

impl<A, T> Stack<A, T>
where
    A: SafetyApplication,
    T: Transport,
{
    /// Create a stack with an arena of `config.max_instances` instances.
    ///
    /// # Errors
    /// - [`StackError::InvalidConfig`] (fail-safe) for impossible sizing
    pub fn new(config: StackConfig, app: A, transport: T) -> Result<Self, StackError> {
        config.validate()?;
        info!(
            "CIP Safety stack: {:?}, {} instances, {} consumers per producer",
            config.role, config.max_instances, config.max_consumers
        );
        Ok(Self {
            instances: vec![None; config.max_instances],
            config,
            app,
            transport,
            latched: false,
        })
    }

    pub fn config(&self) -> &StackConfig {
        &self.config
    }

    pub fn app(&self) -> &A {
        &self.app
    }

    pub fn app_mut(&mut self) -> &mut A {
        &mut self.app
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    /// A fail-safe error has been reported.
    pub fn is_latched(&self) -> bool {
        self.latched
    }

    pub fn instance(&self, instance_id: u16) -> Option<&Validator> {
        let index = self.index_of(instance_id).ok()?;
        self.instances[index].as_ref()
    }

    /// IDs of every allocated instance.
    pub fn instance_ids(&self) -> impl Iterator<Item = u16> + '_ {
        self.instances.iter().flatten().map(Validator::instance_id)
    }

    fn index_of(&self, instance_id: u16) -> Result<usize, StackError> {
        let index = usize::from(instance_id)
            .checked_sub(1)
            .filter(|index| *index < self.instances.len())
            .ok_or(StackError::InstanceNotFound(instance_id))?;
        match &self.instances[index] {
            None => Err(StackError::InstanceNotFound(instance_id)),
            Some(validator) if validator.instance_id() != instance_id => {
                Err(StackError::IndexTableCorrupted(index))
            }
            Some(_) => Ok(index),
        }
    }

    fn guard(&self) -> Result<(), Error> {
        if self.latched {
            return Err(StackError::Latched.into());
        }
        Ok(())
    }

    fn report(&mut self, error: &Error, instance_id: u16) {
        let code = error.error_code();
        if error.is_fail_safe() {
            error!(
                "Fail-safe error 0x{:04X} on instance {}: {}",
                code.value(),
                instance_id,
                error
            );
            self.latched = true;
        } else {
            warn!(
                "Error 0x{:04X} on instance {}: {}",
                code.value(),
                instance_id,
                error
            );
        }
        self.app.report_error(code, instance_id, add_info(error));
    }

    fn finish(&mut self, result: Result<(), Failure>) -> Result<(), Error> {
        result.map_err(|failure| {
            self.report(&failure.error, failure.instance_id);
            failure.error
        })
    }

    /// Dispatch one command from the transport.
    ///
    /// `len` is the length the transport declared for `bytes`; `now` the
    /// current time in 128 us ticks.
    ///
    /// # Errors
    /// - [`StackError::LengthMismatch`] (fail-safe) if `len` disagrees with `bytes`
    /// - [`StackError::UnknownCommand`] for an unknown command or unit
    /// - whatever the addressed unit raised; every error is reported to the
    ///   safety application before it is returned
    pub fn cmd_process(&mut self, cmd: u16, len: u16, bytes: &[u8], now: u16) -> Result<(), Error> {
        self.guard()?;
        if usize::from(len) != bytes.len() {
            let err = StackError::LengthMismatch {
                declared: len,
                actual: bytes.len(),
            };
            return self.finish(Err(err.into()));
        }
        let index = (cmd >> 8) as u8;
        let unit = Unit::try_from((cmd & 0xFF) as u8);
        trace!("Command 0x{:04X}, {} bytes", cmd, bytes.len());
        match (index, unit) {
            (CMD_FORWARD_OPEN, Ok(Unit::Sce)) => self.forward_open(bytes).map(|_| ()),
            (CMD_FORWARD_CLOSE, Ok(Unit::Sce)) => self.forward_close(bytes),
            (CMD_TCOO, Ok(Unit::Svc)) => match split_header::<3>(bytes) {
                Ok(([lo, hi, consumer], frame)) => {
                    self.process_tcoo(u16::from_le_bytes([lo, hi]), consumer, frame, now)
                }
                Err(err) => self.finish(Err(err.into())),
            },
            (CMD_DATA, Ok(Unit::Svs)) => match split_header::<2>(bytes) {
                Ok((id, frame)) => self.process_data(u16::from_le_bytes(id), frame, now),
                Err(err) => self.finish(Err(err.into())),
            },
            (CMD_TCORR, Ok(Unit::Svs)) => match split_header::<2>(bytes) {
                Ok((id, frame)) => self.process_tcorr(u16::from_le_bytes(id), frame),
                Err(err) => self.finish(Err(err.into())),
            },
            _ => self.finish(Err(StackError::UnknownCommand(cmd).into())),
        }
    }

    fn send_reply(
        &mut self,
        cmd: u16,
        write: impl FnOnce(&mut Cursor<&mut [u8]>) -> io::Result<usize>,
    ) -> Result<(), Failure> {
        let mut buffer = [0u8; MAX_REPLY_SIZE];
        let mut cursor = Cursor::new(&mut buffer[..]);
        let len = write(&mut cursor).map_err(|_| StackError::ReplyEncoding)?;
        self.transport.tx_data_put(cmd, &buffer[..len]);
        Ok(())
    }

    /// Handle a SafetyOpen request and send the Successful or Unsuccessful
    /// reply. Returns the instance ID serving the connection.
    ///
    /// # Errors
    /// - the [`SceError`] the request was rejected with
    /// - [`ValidatorError::ResponseLimitRange`] (fail-safe) if cold start fails
    pub fn forward_open(&mut self, payload: &[u8]) -> Result<u16, Error> {
        self.guard()?;
        let cmd = command(CMD_FORWARD_OPEN, Unit::Sce);
        match self.open(payload) {
            Ok(reply) => {
                let instance_id = reply.1;
                let result = self.send_reply(cmd, |w| reply.0.to_writer(w));
                self.finish(result).map(|_| instance_id)
            }
            Err(failure) => {
                if let Error::Connection(err) = &failure.error {
                    let reply = ForwardOpenFailure {
                        triad: request_triad(payload),
                        status: err.status(),
                        remaining_path_words: 0,
                    };
                    if let Err(reply_failure) = self.send_reply(cmd, |w| reply.to_writer(w)) {
                        self.report(&reply_failure.error, 0);
                    }
                }
                self.finish(Err(failure)).map(|_| 0)
            }
        }
    }

    fn open(&mut self, payload: &[u8]) -> Result<(ForwardOpenSuccess, u16), Failure> {
        let params = parse_forward_open(payload, self.config.role)?;
        if self.instances.iter().flatten().any(|v| v.owns(&params.triad)) {
            return Err(SceError::DuplicateConnection.into());
        }
        let plan = validate_forward_open(&params, &self.config)?;
        if let Some(data) = params.config_data {
            debug!(
                "SafetyOpen {:?}: {} bytes of configuration data",
                params.triad,
                data.len()
            );
        }
        let joined = if plan.kind == ValidatorKind::Producer && plan.multicast {
            self.join_producer(params.triad, &plan)?
        } else {
            None
        };
        let (instance_id, consumer_number, opener) = match joined {
            Some(joined) => joined,
            None => self.allocate(params.triad, &plan)?,
        };
        let reply = ForwardOpenSuccess {
            ot_connection_id: params.ot_connection_id,
            to_connection_id: params.to_connection_id,
            triad: params.triad,
            ot_api: params.ot_rpi,
            to_api: params.to_rpi,
            app_reply: SafetyAppReply {
                consumer_number: consumer_number.into(),
                opener,
            },
        };
        Ok((reply, instance_id))
    }

    /// Add a consumer to a running multicast producer of the same data.
    fn join_producer(
        &mut self,
        triad: ConnectionTriad,
        plan: &OpenPlan,
    ) -> Result<Option<(u16, u8, ConnectionTriad)>, Failure> {
        let Some(client) = self.instances.iter_mut().flatten().find_map(|v| match v {
            Validator::Client(client) if client.accepts(plan) => Some(client),
            _ => None,
        }) else {
            return Ok(None);
        };
        let instance_id = client.instance_id();
        let consumer = client
            .join(triad)
            .map_err(|err| Failure::at(instance_id, err))?
            .ok_or(Failure::at(instance_id, SceError::ConsumerNumberUnavailable))?;
        info!(
            "SafetyOpen {:?} joined producer instance {} as consumer {}",
            triad, instance_id, consumer
        );
        Ok(Some((instance_id, consumer, client.opener())))
    }

    fn allocate(
        &mut self,
        triad: ConnectionTriad,
        plan: &OpenPlan,
    ) -> Result<(u16, u8, ConnectionTriad), Failure> {
        let index = self
            .instances
            .iter()
            .position(Option::is_none)
            .ok_or(SceError::OutOfConnections)?;
        let instance_id =
            u16::try_from(index + 1).map_err(|_| StackError::IndexTableCorrupted(index))?;
        let mix_method = self.config.mix_method;
        let validator = match plan.kind {
            ValidatorKind::Producer => Validator::Client(
                SafetyValidatorClient::open(instance_id, triad, plan, mix_method)
                    .map_err(|err| Failure::at(instance_id, err))?,
            ),
            ValidatorKind::Consumer => Validator::Server(SafetyValidatorServer::open(
                instance_id,
                triad,
                plan,
                mix_method,
            )),
        };
        self.instances[index] = Some(validator);
        Ok((instance_id, 1, triad))
    }

    /// Handle a SafetyClose request and send its reply. A producer instance is
    /// freed with its last connection.
    ///
    /// # Errors
    /// - [`SceError::ConnectionNotFound`] if no connection has the request's triad
    pub fn forward_close(&mut self, payload: &[u8]) -> Result<(), Error> {
        self.guard()?;
        let cmd = command(CMD_FORWARD_CLOSE, Unit::Sce);
        let (triad, result) = match parse_forward_close(payload) {
            Ok(request) => (request.triad, self.close(&request.triad)),
            Err(err) => (ConnectionTriad::default(), Err(err.into())),
        };
        let status = match &result {
            Ok(_) => CipStatus::general_only(GeneralStatus::Success),
            Err(Failure {
                error: Error::Connection(err),
                ..
            }) => err.status(),
            Err(_) => CipStatus::general_only(GeneralStatus::DeviceStateConflict),
        };
        let reply = ForwardCloseReply { triad, status };
        let sent = self.send_reply(cmd, |w| reply.to_writer(w));
        self.finish(result.and(sent))
    }

    fn close(&mut self, triad: &ConnectionTriad) -> Result<(), Failure> {
        let index = self
            .instances
            .iter()
            .position(|slot| slot.as_ref().is_some_and(|v| v.owns(triad)))
            .ok_or(SceError::ConnectionNotFound)?;
        let Some(validator) = self.instances[index].as_mut() else {
            return Err(StackError::IndexTableCorrupted(index).into());
        };
        let instance_id = validator.instance_id();
        let free = match validator {
            Validator::Client(client) => {
                client.leave(triad);
                client.is_idle()
            }
            Validator::Server(_) => true,
        };
        if free {
            self.instances[index] = None;
            info!("SafetyClose {:?}: instance {} freed", triad, instance_id);
        } else {
            info!("SafetyClose {:?}: consumer left instance {}", triad, instance_id);
        }
        Ok(())
    }

    /// Produce the next data message of a producer instance and, for
    /// multicast, the next pending time correction message.
    ///
    /// # Errors
    /// - [`StackError::InstanceNotFound`] / [`StackError::WrongInstanceKind`]
    /// - [`ValidatorError::InstanceFaulted`] once every consumer faulted
    pub fn produce(&mut self, instance_id: u16, data: &[u8], run: bool, now: u16) -> Result<(), Error> {
        self.guard()?;
        let result = self.produce_frames(instance_id, data, run, now);
        self.finish(result)
    }

    fn produce_frames(&mut self, instance_id: u16, data: &[u8], run: bool, now: u16) -> Result<(), Failure> {
        let index = self
            .index_of(instance_id)
            .map_err(|err| Failure::at(instance_id, err))?;
        let Some(Validator::Client(client)) = self.instances[index].as_mut() else {
            return Err(Failure::at(instance_id, StackError::WrongInstanceKind(instance_id)));
        };
        let mut tx = [0u8; TX_BUFFER_SIZE];
        tx[..INSTANCE_PREFIX].copy_from_slice(&instance_id.to_le_bytes());
        let len = client
            .produce(data, run, now, &mut tx[INSTANCE_PREFIX..])
            .map_err(|err| Failure::at(instance_id, err))?;
        self.transport
            .tx_data_put(command(CMD_TX_DATA, Unit::Svc), &tx[..INSTANCE_PREFIX + len]);

        let body = INSTANCE_PREFIX + 1;
        if let Some((consumer, len)) = client
            .time_correction_msg(&mut tx[body..])
            .map_err(|err| Failure::at(instance_id, err))?
        {
            tx[INSTANCE_PREFIX] = consumer;
            self.transport
                .tx_data_put(command(CMD_TX_TCORR, Unit::Svc), &tx[..body + len]);
        }
        Ok(())
    }

    /// Process a time coordination message received by a producer instance.
    /// Rejected messages are reported; a duplicate consumer time value is
    /// dropped without touching the consumer.
    ///
    /// # Errors
    /// - [`StackError::InstanceNotFound`] / [`StackError::WrongInstanceKind`]
    /// - [`ValidatorError::UnknownConsumer`]
    /// - frame errors (fail-safe) for a message of the wrong size
    pub fn process_tcoo(
        &mut self,
        instance_id: u16,
        consumer: u8,
        frame: &[u8],
        now: u16,
    ) -> Result<(), Error> {
        self.guard()?;
        let outcome = self.on_tcoo(instance_id, consumer, frame, now);
        match outcome {
            Ok(outcome) => {
                self.report_outcome(instance_id, outcome);
                Ok(())
            }
            Err(failure) => self.finish(Err(failure)),
        }
    }

    fn on_tcoo(
        &mut self,
        instance_id: u16,
        consumer: u8,
        frame: &[u8],
        now: u16,
    ) -> Result<TcooOutcome, Failure> {
        let index = self
            .index_of(instance_id)
            .map_err(|err| Failure::at(instance_id, err))?;
        match self.instances[index].as_mut() {
            Some(Validator::Client(client)) => client
                .on_tcoo(consumer, frame, now)
                .map_err(|err| Failure::at(instance_id, err)),
            _ => Err(Failure::at(instance_id, StackError::WrongInstanceKind(instance_id))),
        }
    }

    fn report_outcome(&mut self, instance_id: u16, outcome: TcooOutcome) {
        match outcome {
            TcooOutcome::Ignored => trace!("Instance {}: time coordination ignored", instance_id),
            TcooOutcome::Accepted {
                consumer,
                correction,
            } => trace!(
                "Instance {}: consumer {} correction {}",
                instance_id, consumer, correction
            ),
            TcooOutcome::Duplicate { consumer_time, .. } => {
                let err = ValidatorError::DuplicateConsumerTime(consumer_time);
                self.report(&err.into(), instance_id);
            }
            TcooOutcome::Fault {
                consumer,
                reason,
                faulted,
                all_faulted,
            } => {
                self.report(&reason.into(), instance_id);
                if all_faulted {
                    self.report(&ValidatorError::AllConsumersFaulted.into(), instance_id);
                } else if faulted {
                    self.report(&ValidatorError::ConsumerFaulted(consumer).into(), instance_id);
                }
            }
        }
    }

    /// Check a data message received by a consumer instance, hand its data to
    /// the safety application and send the time coordination reply to a new
    /// ping count.
    ///
    /// # Errors
    /// - [`StackError::InstanceNotFound`] / [`StackError::WrongInstanceKind`]
    /// - the [`ValidatorError`] the message was discarded with
    pub fn process_data(&mut self, instance_id: u16, frame: &[u8], now: u16) -> Result<(), Error> {
        self.guard()?;
        let result = self.consume(instance_id, frame, now);
        self.finish(result)
    }

    fn consume(&mut self, instance_id: u16, frame: &[u8], now: u16) -> Result<(), Failure> {
        let index = self
            .index_of(instance_id)
            .map_err(|err| Failure::at(instance_id, err))?;
        let Some(Validator::Server(server)) = self.instances[index].as_mut() else {
            return Err(Failure::at(instance_id, StackError::WrongInstanceKind(instance_id)));
        };
        let mut tx = [0u8; INSTANCE_PREFIX + TCOO_SIZE];
        let consumed = server
            .on_data(frame, now, &mut tx[INSTANCE_PREFIX..])
            .map_err(|err| Failure::at(instance_id, err))?;
        self.app.data_received(instance_id, &consumed.data, consumed.run);
        if let Some(len) = consumed.tcoo_len {
            tx[..INSTANCE_PREFIX].copy_from_slice(&instance_id.to_le_bytes());
            self.transport
                .tx_data_put(command(CMD_TX_TCOO, Unit::Svs), &tx[..INSTANCE_PREFIX + len]);
        }
        Ok(())
    }

    /// Apply a time correction message received by a consumer instance.
    ///
    /// # Errors
    /// - [`StackError::InstanceNotFound`] / [`StackError::WrongInstanceKind`]
    /// - the [`ValidatorError`] the message was discarded with
    pub fn process_tcorr(&mut self, instance_id: u16, frame: &[u8]) -> Result<(), Error> {
        self.guard()?;
        let result = match self.index_of(instance_id) {
            Err(err) => Err(Failure::at(instance_id, err)),
            Ok(index) => match self.instances[index].as_mut() {
                Some(Validator::Server(server)) => server
                    .on_time_correction(frame)
                    .map_err(|err| Failure::at(instance_id, err)),
                _ => Err(Failure::at(instance_id, StackError::WrongInstanceKind(instance_id))),
            },
        };
        self.finish(result)
    }

    /// Periodic housekeeping: fault every consumer whose time coordination
    /// reply is overdue.
    ///
    /// # Errors
    /// - [`StackError::Latched`]
    pub fn background_task(&mut self) -> Result<(), Error> {
        self.guard()?;
        for index in 0..self.instances.len() {
            let Some(Validator::Client(client)) = self.instances[index].as_mut() else {
                continue;
            };
            let instance_id = client.instance_id();
            let outcomes = client.check_overdue();
            for outcome in outcomes {
                self.report_outcome(instance_id, outcome);
            }
        }
        Ok(())
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::cip::ExtendedStatus;
    use crate::config::DeviceIdentity;
    use crate::error::{ErrorCode, Severity};
    use crate::sce::ReplyHeader;
    use crate::sce::test_requests::{long_path, request};
    use crate::sfa::SafetyFormat;

    #[derive(Debug, Default)]
    pub(crate) struct Recorder {
        pub errors: std::vec::Vec<(ErrorCode, u16, u32)>,
        pub data: std::vec::Vec<(u16, std::vec::Vec<u8>, bool)>,
    }

    impl SafetyApplication for Recorder {
        fn report_error(&mut self, code: ErrorCode, instance_id: u16, add_info: u32) {
            self.errors.push((code, instance_id, add_info));
        }

        fn data_received(&mut self, instance_id: u16, data: &[u8], run: bool) {
            self.data.push((instance_id, data.to_vec(), run));
        }
    }

    #[derive(Debug, Default)]
    pub(crate) struct Outbox {
        pub sent: std::vec::Vec<(u16, std::vec::Vec<u8>)>,
    }

    impl Transport for Outbox {
        fn tx_data_put(&mut self, command: u16, data: &[u8]) {
            self.sent.push((command, data.to_vec()));
        }
    }

    fn stack(max_instances: usize) -> Stack<Recorder, Outbox> {
        let config = StackConfig::new(DeviceIdentity::default(), max_instances);
        Stack::new(config, Recorder::default(), Outbox::default()).unwrap()
    }

    fn with_serial(mut bytes: std::vec::Vec<u8>, serial: u16) -> std::vec::Vec<u8> {
        bytes[10..12].copy_from_slice(&serial.to_le_bytes());
        bytes
    }

    fn last_status(stack: &Stack<Recorder, Outbox>) -> CipStatus {
        let (_, reply) = stack.transport().sent.last().unwrap();
        ReplyHeader::from_reader(&mut reply.as_slice()).unwrap().status
    }

    fn close_request(serial: u16) -> std::vec::Vec<u8> {
        let mut bytes = vec![0x0A, 0xF0];
        bytes.extend_from_slice(&serial.to_le_bytes());
        bytes.extend_from_slice(&0x1234u16.to_le_bytes());
        bytes.extend_from_slice(&0xDEAD_BEEFu32.to_le_bytes());
        bytes.extend_from_slice(&[0x00, 0x00]);
        bytes
    }

    #[test]
    fn test_length_mismatch_latches() {
        let mut stack = stack(2);
        let err = stack
            .cmd_process(command(CMD_DATA, Unit::Svs), 5, &[0; 4], 0)
            .unwrap_err();
        assert!(err.is_fail_safe());
        assert!(stack.is_latched());
        assert_eq!(stack.app().errors.len(), 1);
        assert_eq!(stack.app().errors[0].0.severity(), Some(Severity::FailSafe));

        assert_eq!(
            stack.cmd_process(command(CMD_DATA, Unit::Svs), 4, &[0; 4], 0),
            Err(StackError::Latched.into())
        );
        assert_eq!(stack.app().errors.len(), 1);
    }

    #[test]
    fn test_unknown_command_is_not_fail_safe() {
        let mut stack = stack(2);
        let cmd = command(0x7F, Unit::Sfa);
        let err = stack.cmd_process(cmd, 0, &[], 0).unwrap_err();
        assert_eq!(err, StackError::UnknownCommand(cmd).into());
        assert!(!stack.is_latched());
        assert_eq!(stack.app().errors[0].2, u32::from(cmd));
    }

    #[test]
    fn test_open_and_close_consumer() {
        let mut stack = stack(2);
        let bytes = request(&long_path(SafetyFormat::Base));
        let len = bytes.len() as u16;
        stack
            .cmd_process(command(CMD_FORWARD_OPEN, Unit::Sce), len, &bytes, 0)
            .unwrap();
        assert!(matches!(stack.instance(1), Some(Validator::Server(_))));
        let (cmd, reply) = stack.transport().sent.last().unwrap();
        assert_eq!(*cmd, command(CMD_FORWARD_OPEN, Unit::Sce));
        let mut reader = reply.as_slice();
        let header = ReplyHeader::from_reader(&mut reader).unwrap();
        assert_eq!(header.status, CipStatus::general_only(GeneralStatus::Success));
        let success = ForwardOpenSuccess::from_reader(&mut reader).unwrap();
        assert_eq!(success.app_reply.consumer_number, 1);
        assert_eq!(success.ot_api, 10_000);

        let close = close_request(0x0102);
        stack
            .cmd_process(command(CMD_FORWARD_CLOSE, Unit::Sce), close.len() as u16, &close, 0)
            .unwrap();
        assert_eq!(last_status(&stack), CipStatus::general_only(GeneralStatus::Success));
        assert_eq!(stack.instance_ids().count(), 0);
        assert!(stack.app().errors.is_empty());
    }

    #[test]
    fn test_arena_rejections() {
        let mut stack = stack(1);
        let bytes = request(&long_path(SafetyFormat::Base));
        assert_eq!(stack.forward_open(&bytes), Ok(1));

        assert_eq!(
            stack.forward_open(&bytes),
            Err(SceError::DuplicateConnection.into())
        );
        assert_eq!(
            last_status(&stack).extended,
            Some(ExtendedStatus::DuplicateForwardOpen)
        );

        assert_eq!(
            stack.forward_open(&with_serial(bytes, 0x0999)),
            Err(SceError::OutOfConnections.into())
        );
        assert_eq!(
            last_status(&stack).extended,
            Some(ExtendedStatus::OutOfConnections)
        );
        assert_eq!(stack.app().errors.len(), 2);
        assert!(!stack.is_latched());
    }

    #[test]
    fn test_close_of_unknown_connection() {
        let mut stack = stack(1);
        assert_eq!(
            stack.forward_close(&close_request(0x4242)),
            Err(SceError::ConnectionNotFound.into())
        );
        assert_eq!(
            last_status(&stack).extended,
            Some(ExtendedStatus::ConnectionNotFound)
        );
        assert_eq!(stack.app().errors[0].2, 0x0107);
    }

    #[test]
    fn test_wrong_instance_kind() {
        let mut stack = stack(1);
        let bytes = request(&long_path(SafetyFormat::Base));
        stack.forward_open(&bytes).unwrap();
        assert_eq!(
            stack.produce(1, &[0, 0], true, 0),
            Err(StackError::WrongInstanceKind(1).into())
        );
        assert_eq!(
            stack.process_tcorr(2, &[0; 6]),
            Err(StackError::InstanceNotFound(2).into())
        );
    }
}
