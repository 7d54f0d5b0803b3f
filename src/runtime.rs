//! Actor front-end: one tokio task owns the [`Stack`] and serves requests
//! sent over a channel, so every instance is only ever touched from that task.
//!
//! The task also runs [`Stack::background_task`] once per configured period.

use std::time::Duration;

use tokio::{
    select,
    sync::{
        mpsc::{self, Receiver, Sender},
        oneshot,
    },
    task::JoinHandle,
    time::{self, MissedTickBehavior},
};
use tracing::{debug, info, trace};

use crate::error::{Error, StackError};
use crate::stack::Stack;
use crate::traits::{SafetyApplication, Transport};

#[derive(Clone, Debug, PartialEq)]
enum Control {
    Command { cmd: u16, len: u16, bytes: Vec<u8>, now: u16 },
    Produce {
        instance_id: u16,
        data: Vec<u8>,
        run: bool,
        now: u16,
    },
    Background,
}

#[derive(Debug)]
struct ControlMessage {
    control: Control,
    response: oneshot::Sender<Result<(), Error>>,
}

impl ControlMessage {
    fn new(control: Control) -> (Self, oneshot::Receiver<Result<(), Error>>) {
        let (response, receiver) = oneshot::channel();
        (Self { control, response }, receiver)
    }
}

/// Handle to a stack running on its own task.
pub struct StackHandle<A, T> {
    control_sender: Sender<ControlMessage>,
    task: JoinHandle<Stack<A, T>>,
}

impl<A, T> StackHandle<A, T>
where
    A: SafetyApplication + Send + 'static,
    T: Transport + Send + 'static,
{
    /// Move `stack` onto a new task. `background_period` is how often the
    /// overdue time coordination check runs.
    pub fn spawn(stack: Stack<A, T>, background_period: Duration) -> Self {
        info!("Starting CIP Safety stack task");
        let (control_sender, control_receiver) = mpsc::channel(16);
        let task = tokio::spawn(run(stack, control_receiver, background_period));
        Self {
            control_sender,
            task,
        }
    }

    async fn request(&self, control: Control) -> Result<(), Error> {
        let (message, response) = ControlMessage::new(control);
        self.control_sender
            .send(message)
            .await
            .map_err(|_| StackError::ActorStopped)?;
        response.await.map_err(|_| StackError::ActorStopped)?
    }

    /// See [`Stack::cmd_process`].
    ///
    /// # Errors
    /// - [`StackError::ActorStopped`] if the task is gone
    /// - whatever the stack returned
    pub async fn cmd_process(&self, cmd: u16, len: u16, bytes: &[u8], now: u16) -> Result<(), Error> {
        self.request(Control::Command {
            cmd,
            len,
            bytes: bytes.to_vec(),
            now,
        })
        .await
    }

    /// See [`Stack::produce`].
    ///
    /// # Errors
    /// - [`StackError::ActorStopped`] if the task is gone
    /// - whatever the stack returned
    pub async fn produce(&self, instance_id: u16, data: &[u8], run: bool, now: u16) -> Result<(), Error> {
        self.request(Control::Produce {
            instance_id,
            data: data.to_vec(),
            run,
            now,
        })
        .await
    }

    /// Run the background task now instead of waiting for the next period.
    ///
    /// # Errors
    /// - [`StackError::ActorStopped`] if the task is gone
    /// - [`StackError::Latched`]
    pub async fn background_task(&self) -> Result<(), Error> {
        self.request(Control::Background).await
    }

    /// Stop the task and take the stack back.
    ///
    /// # Errors
    /// - [`StackError::ActorStopped`] if the task panicked or was cancelled
    pub async fn shut_down(self) -> Result<Stack<A, T>, Error> {
        let Self {
            control_sender,
            task,
        } = self;
        // Dropping the sender ends the loop
        drop(control_sender);
        info!("Shutting down CIP Safety stack task");
        task.await
            .map_err(|_| Error::from(StackError::ActorStopped))
    }
}

async fn run<A, T>(
    mut stack: Stack<A, T>,
    mut control_receiver: Receiver<ControlMessage>,
    background_period: Duration,
) -> Stack<A, T>
where
    A: SafetyApplication,
    T: Transport,
{
    debug!("CIP Safety stack loop started");
    let mut ticker = time::interval(background_period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    loop {
        select! {
            _ = ticker.tick() => {
                if let Err(err) = stack.background_task() {
                    trace!("Background task skipped: {}", err);
                }
            }
            message = control_receiver.recv() => {
                let Some(message) = message else {
                    break;
                };
                let result = match message.control {
                    Control::Command { cmd, len, bytes, now } => stack.cmd_process(cmd, len, &bytes, now),
                    Control::Produce { instance_id, data, run, now } => {
                        stack.produce(instance_id, &data, run, now)
                    }
                    Control::Background => stack.background_task(),
                };
                if message.response.send(result).is_err() {
                    debug!("Requester dropped before the reply");
                }
            }
        }
    }
    debug!("CIP Safety stack loop stopped");
    stack
}
