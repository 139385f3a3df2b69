//! Fire-and-forget execution of actuation commands
//!
//! Commands run on tokio's blocking pool so the frame loop never waits for the
//! operating system. Key and mouse button commands go through one ordered
//! queue: a release submitted after a press is never executed before it.
//! Motion commands are independent of each other and run as soon as they are
//! submitted. Every outcome comes back over an unbounded channel and is
//! drained by the frame loop at the start of the next frame.

use crate::actuation::{
    ActuationCommand, ActuationError, Actuator, CommandOrigin, CommandSink, Completion,
};
use std::sync::Arc;
use tokio::runtime::Handle;
use tokio::sync::mpsc;
use tracing::{debug, error, warn};

type QueuedCommand = (CommandOrigin, ActuationCommand);

pub struct TaskDispatcher {
    actuator: Arc<dyn Actuator>,
    runtime: Handle,
    completion_sender: mpsc::UnboundedSender<Completion>,
    key_queue: mpsc::UnboundedSender<QueuedCommand>,
    submitted: u64,
    keys_submitted: u64,
}

impl TaskDispatcher {
    /// Creates a dispatcher and the receiver its completions arrive on
    pub fn new(
        actuator: Arc<dyn Actuator>,
        runtime: Handle,
    ) -> (Self, mpsc::UnboundedReceiver<Completion>) {
        let (completion_sender, completion_receiver) = mpsc::unbounded_channel();
        let (key_queue, key_receiver) = mpsc::unbounded_channel();
        debug!("Created completion channel for actuation dispatcher");

        runtime.spawn(run_key_worker(
            actuator.clone(),
            key_receiver,
            completion_sender.clone(),
        ));

        (
            Self {
                actuator,
                runtime,
                completion_sender,
                key_queue,
                submitted: 0,
                keys_submitted: 0,
            },
            completion_receiver,
        )
    }

    /// Number of commands submitted since creation
    pub fn submitted(&self) -> u64 {
        self.submitted
    }

    /// Number of key and mouse button commands submitted since creation
    pub fn keys_submitted(&self) -> u64 {
        self.keys_submitted
    }

    fn spawn_motion(&self, origin: CommandOrigin, command: ActuationCommand) {
        let actuator = self.actuator.clone();
        let sender = self.completion_sender.clone();
        self.runtime.spawn_blocking(move || {
            let result = command.execute(actuator.as_ref());
            send_completion(&sender, Completion { origin, result });
        });
    }
}

impl CommandSink for TaskDispatcher {
    fn submit(&mut self, origin: CommandOrigin, command: ActuationCommand) {
        self.submitted += 1;
        debug!("Dispatching {:?} for {}", command, origin);

        match command {
            ActuationCommand::MoveBy { .. } => self.spawn_motion(origin, command),
            ActuationCommand::SetTarget { .. } => {
                self.keys_submitted += 1;
                if let Err(mpsc::error::SendError((origin, _))) =
                    self.key_queue.send((origin, command))
                {
                    error!("Key worker stopped, dropping command for {}", origin);
                    send_completion(
                        &self.completion_sender,
                        Completion {
                            origin,
                            result: Err(ActuationError::Unavailable(
                                "key worker stopped".into(),
                            )),
                        },
                    );
                }
            }
        }
    }
}

/// Executes key commands one at a time in submission order
async fn run_key_worker(
    actuator: Arc<dyn Actuator>,
    mut queue: mpsc::UnboundedReceiver<QueuedCommand>,
    completion_sender: mpsc::UnboundedSender<Completion>,
) {
    debug!("Key worker started");
    while let Some((origin, command)) = queue.recv().await {
        let actuator = actuator.clone();
        let result = match tokio::task::spawn_blocking(move || command.execute(actuator.as_ref()))
            .await
        {
            Ok(result) => result,
            Err(e) => {
                error!("Key command for {} did not complete: {}", origin, e);
                Err(ActuationError::Backend(e.to_string()))
            }
        };
        send_completion(&completion_sender, Completion { origin, result });
    }
    debug!("Key worker stopped");
}

fn send_completion(sender: &mpsc::UnboundedSender<Completion>, completion: Completion) {
    if sender.send(completion).is_err() {
        warn!("Completion dropped, frame loop already stopped");
    }
}
