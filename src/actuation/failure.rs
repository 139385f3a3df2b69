//! One-shot reporting of actuation failures
//!
//! A failing backend fails on every frame. Each origin reports a given error
//! class once; the entry is forgotten after the next success so a later,
//! separate failure is reported again.

use crate::actuation::{ActuationError, CommandOrigin, Completion};
use std::collections::HashMap;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

/// Diagnostics for the surrounding application
#[derive(Debug, Clone, PartialEq)]
pub enum EngineNotice {
    /// The OS refused to synthesize input; the user has to grant access
    PermissionRequired { origin: String, detail: String },
    ActuationFailed { origin: String, error: ActuationError },
}

#[derive(Debug, Default)]
pub struct FailureLog {
    reported: HashMap<CommandOrigin, &'static str>,
    notice_sender: Option<mpsc::Sender<EngineNotice>>,
}

impl FailureLog {
    pub fn new(notice_sender: Option<mpsc::Sender<EngineNotice>>) -> Self {
        Self {
            reported: HashMap::new(),
            notice_sender,
        }
    }

    /// Records a completion; returns true when a new diagnostic was emitted
    pub fn record(&mut self, completion: &Completion) -> bool {
        let error = match &completion.result {
            Ok(()) => {
                if self.reported.remove(&completion.origin).is_some() {
                    info!("Actuation for {} recovered", completion.origin);
                }
                return false;
            }
            Err(error) => error,
        };

        let class = error.class();
        if self.reported.get(&completion.origin) == Some(&class) {
            debug!("Repeated failure for {}: {}", completion.origin, error);
            return false;
        }
        self.reported.insert(completion.origin.clone(), class);

        let origin = completion.origin.to_string();
        let notice = if error.is_permission_denied() {
            error!(
                "Actuation for {} was denied by the operating system: {}",
                origin, error
            );
            EngineNotice::PermissionRequired {
                origin,
                detail: error.to_string(),
            }
        } else {
            warn!("Actuation for {} failed: {}", origin, error);
            EngineNotice::ActuationFailed {
                origin,
                error: error.clone(),
            }
        };

        if let Some(sender) = &self.notice_sender {
            if let Err(e) = sender.try_send(notice) {
                warn!("Failed to forward actuation notice: {}", e);
            }
        }
        true
    }

    pub fn outstanding(&self) -> usize {
        self.reported.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mapping::ActuationTarget;

    fn completion(origin: CommandOrigin, result: Result<(), ActuationError>) -> Completion {
        Completion { origin, result }
    }

    #[test]
    fn repeated_failures_are_reported_once() {
        let mut log = FailureLog::default();
        let origin = CommandOrigin::Motion { device: 0, stick: 1 };
        let failure = || Err(ActuationError::Backend("write failed".into()));

        assert!(log.record(&completion(origin.clone(), failure())));
        for _ in 0..60 {
            assert!(!log.record(&completion(origin.clone(), failure())));
        }
        assert_eq!(log.outstanding(), 1);
    }

    #[test]
    fn success_rearms_reporting() {
        let mut log = FailureLog::default();
        let origin = CommandOrigin::Key(ActuationTarget::key("A").unwrap());
        let failure = || Err(ActuationError::Backend("write failed".into()));

        assert!(log.record(&completion(origin.clone(), failure())));
        assert!(!log.record(&completion(origin.clone(), Ok(()))));
        assert_eq!(log.outstanding(), 0);
        assert!(log.record(&completion(origin, failure())));
    }

    #[tokio::test]
    async fn permission_failures_produce_a_distinct_notice() {
        let (sender, mut receiver) = mpsc::channel(4);
        let mut log = FailureLog::new(Some(sender));
        let origin = CommandOrigin::Key(ActuationTarget::key("A").unwrap());

        log.record(&completion(
            origin.clone(),
            Err(ActuationError::PermissionDenied("/dev/uinput".into())),
        ));
        log.record(&completion(
            CommandOrigin::Motion { device: 0, stick: 0 },
            Err(ActuationError::Backend("io".into())),
        ));

        assert!(matches!(
            receiver.recv().await,
            Some(EngineNotice::PermissionRequired { .. })
        ));
        assert!(matches!(
            receiver.recv().await,
            Some(EngineNotice::ActuationFailed { .. })
        ));
    }
}
