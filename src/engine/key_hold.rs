//! Reference-counted key holding
//!
//! Several inputs may map to the same key. Each active input is a *holder* of
//! its target; the target is pressed when the first holder appears and
//! released when the last one goes away. Reports are edge-triggered: repeating
//! the previous activity of an input issues nothing.
//!
//! ```text
//! inactive ──(becomes active)──► holding ──(becomes inactive)──► inactive
//!                                   │
//!                 press only if first holder / release only if last holder
//! ```
//!
//! The holder tables are the authoritative model of what should be down. A
//! failed press or release is reported elsewhere and never rolls them back.

use crate::actuation::{ActuationCommand, CommandOrigin, CommandSink};
use crate::mapping::{ActuationTarget, LogicalStateKey};
use std::collections::{HashMap, HashSet};
use tracing::debug;

#[derive(Debug, Default)]
pub struct KeyHoldActuator {
    /// Active inputs and the target each one holds
    active: HashMap<LogicalStateKey, ActuationTarget>,
    holders: HashMap<ActuationTarget, HashSet<LogicalStateKey>>,
}

impl KeyHoldActuator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reports the current activity of one input for `target`
    pub fn report(
        &mut self,
        target: &ActuationTarget,
        source: LogicalStateKey,
        active: bool,
        sink: &mut dyn CommandSink,
    ) {
        let same_target = self.active.get(&source).map(|held| held == target);
        match (same_target, active) {
            (Some(true), true) | (None, false) => {}
            (Some(false), true) => {
                // Mapping changed while held: hand the hold over to the new target
                self.release(source, sink);
                self.hold(target, source, sink);
            }
            (None, true) => self.hold(target, source, sink),
            (Some(_), false) => self.release(source, sink),
        }
    }

    /// Releases every active input not contained in `reported`
    pub fn release_unreported(
        &mut self,
        reported: &HashSet<LogicalStateKey>,
        sink: &mut dyn CommandSink,
    ) {
        let stale: Vec<LogicalStateKey> = self
            .active
            .keys()
            .filter(|source| !reported.contains(source))
            .copied()
            .collect();

        for source in stale {
            debug!("{} no longer reported, releasing", source);
            self.release(source, sink);
        }
    }

    /// Releases everything that is held
    pub fn release_all(&mut self, sink: &mut dyn CommandSink) {
        self.release_unreported(&HashSet::new(), sink);
    }

    pub fn is_held(&self, target: &ActuationTarget) -> bool {
        self.holders.contains_key(target)
    }

    pub fn holder_count(&self, target: &ActuationTarget) -> usize {
        self.holders.get(target).map_or(0, HashSet::len)
    }

    pub fn is_active(&self, source: &LogicalStateKey) -> bool {
        self.active.contains_key(source)
    }

    fn hold(&mut self, target: &ActuationTarget, source: LogicalStateKey, sink: &mut dyn CommandSink) {
        self.active.insert(source, target.clone());

        let holders = self.holders.entry(target.clone()).or_default();
        let first = holders.is_empty();
        holders.insert(source);

        if first {
            debug!("{} pressed by {}", target, source);
            sink.submit(
                CommandOrigin::Key(target.clone()),
                ActuationCommand::press(target.clone()),
            );
        } else {
            debug!(
                "{} already held, {} joins {} other holder(s)",
                target,
                source,
                holders.len() - 1
            );
        }
    }

    fn release(&mut self, source: LogicalStateKey, sink: &mut dyn CommandSink) {
        let Some(target) = self.active.remove(&source) else {
            return;
        };

        let now_empty = match self.holders.get_mut(&target) {
            Some(holders) => {
                holders.remove(&source);
                holders.is_empty()
            }
            None => false,
        };

        if now_empty {
            self.holders.remove(&target);
            debug!("{} released by {}", target, source);
            sink.submit(
                CommandOrigin::Key(target.clone()),
                ActuationCommand::release(target),
            );
        } else {
            debug!("{} stays held after {} let go", target, source);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::actuation::RecordingSink;
    use crate::mapping::Direction;

    fn space() -> ActuationTarget {
        ActuationTarget::key("Space").unwrap()
    }

    #[test]
    fn shared_key_is_pressed_once_and_released_by_the_last_holder() {
        let mut keys = KeyHoldActuator::new();
        let mut sink = RecordingSink::default();
        let button = LogicalStateKey::button(0, 0);
        let dpad = LogicalStateKey::dpad(0, Direction::Up);

        keys.report(&space(), button, true, &mut sink);
        keys.report(&space(), dpad, true, &mut sink);
        keys.report(&space(), button, false, &mut sink);

        assert!(keys.is_held(&space()));
        assert_eq!(sink.presses(), 1);
        assert_eq!(sink.releases(), 0);

        keys.report(&space(), dpad, false, &mut sink);

        assert!(!keys.is_held(&space()));
        assert_eq!(sink.presses(), 1);
        assert_eq!(sink.releases(), 1);
    }

    #[test]
    fn every_interleaving_issues_one_press_and_one_release() {
        let a = LogicalStateKey::button(0, 0);
        let b = LogicalStateKey::stick(0, 0, Direction::Up);
        // (holder, active) sequences covering all orderings of two overlapping holds
        let orders = [
            [(a, true), (b, true), (a, false), (b, false)],
            [(a, true), (b, true), (b, false), (a, false)],
            [(b, true), (a, true), (a, false), (b, false)],
            [(b, true), (a, true), (b, false), (a, false)],
        ];

        for order in orders {
            let mut keys = KeyHoldActuator::new();
            let mut sink = RecordingSink::default();
            for (source, active) in order {
                keys.report(&space(), source, active, &mut sink);
                // Repeated identical reports are no-ops
                keys.report(&space(), source, active, &mut sink);
                assert!(sink.presses() <= sink.releases() + 1);
            }
            assert_eq!(sink.presses(), 1, "{order:?}");
            assert_eq!(sink.releases(), 1, "{order:?}");
        }
    }

    #[test]
    fn release_without_prior_press_is_ignored() {
        let mut keys = KeyHoldActuator::new();
        let mut sink = RecordingSink::default();
        keys.report(&space(), LogicalStateKey::button(0, 3), false, &mut sink);
        assert!(sink.commands.is_empty());
    }

    #[test]
    fn retargeting_a_held_input_moves_the_hold() {
        let mut keys = KeyHoldActuator::new();
        let mut sink = RecordingSink::default();
        let source = LogicalStateKey::button(0, 1);
        let enter = ActuationTarget::key("Enter").unwrap();

        keys.report(&space(), source, true, &mut sink);
        keys.report(&enter, source, true, &mut sink);

        assert!(!keys.is_held(&space()));
        assert!(keys.is_held(&enter));
        let commands = sink.take();
        assert_eq!(
            commands.iter().map(|(_, c)| c.clone()).collect::<Vec<_>>(),
            vec![
                ActuationCommand::press(space()),
                ActuationCommand::release(space()),
                ActuationCommand::press(enter.clone()),
            ]
        );

        keys.report(&enter, source, false, &mut sink);
        assert_eq!(sink.releases(), 1);
    }

    #[test]
    fn unreported_inputs_are_released() {
        let mut keys = KeyHoldActuator::new();
        let mut sink = RecordingSink::default();
        let kept = LogicalStateKey::button(0, 0);
        let gone = LogicalStateKey::button(1, 0);

        keys.report(&space(), kept, true, &mut sink);
        keys.report(&space(), gone, true, &mut sink);
        keys.release_unreported(&HashSet::from([kept]), &mut sink);

        assert_eq!(keys.holder_count(&space()), 1);
        assert_eq!(sink.releases(), 0);

        keys.release_all(&mut sink);
        assert!(!keys.is_active(&kept));
        assert_eq!(sink.releases(), 1);
    }
}
