//! One frame of input translation
//!
//! [`TranslationEngine::step`] samples every connected device and evaluates its
//! mappings in a fixed order: buttons, then D-pad, then sticks. Boolean inputs
//! go through the [`KeyHoldActuator`]; mouse-mode sticks drive one
//! [`MotionIntegrator`] each. Commands are handed to a [`CommandSink`] and never
//! awaited; their outcomes come back through [`TranslationEngine::on_completion`].

use crate::actuation::{
    ActuationCommand, CommandOrigin, CommandSink, Completion, EngineNotice, FailureLog,
};
use crate::controller::{DeviceSample, DeviceSource};
use crate::engine::key_hold::KeyHoldActuator;
use crate::engine::mouse_motion::{is_at_rest, MotionIntegrator, MotionPlan};
use crate::mapping::{
    classify_dpad, classify_stick, resolve_directions, DeviceMapping, Direction, LogicalStateKey,
    MappingStore, MouseSettings, StickConfig,
};
use std::collections::{HashMap, HashSet};
use std::time::Instant;
use tokio::sync::mpsc;
use tracing::{debug, info};

/// Counters accumulated over the engine's lifetime
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct EngineStats {
    pub frames: u64,
    pub motion_dispatched: u64,
    /// Dropped because the previous command for the stick was still pending
    pub motion_dropped: u64,
    /// Suppressed because the stick was back at rest when re-read
    pub motion_suppressed: u64,
    pub failures_reported: u64,
}

/// What happened during one frame
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct FrameReport {
    pub devices: usize,
    /// Devices that produced a sample but have no mapping entry yet
    pub unknown_devices: Vec<usize>,
}

type StickId = (usize, usize);

#[derive(Debug, Default)]
pub struct TranslationEngine {
    keys: KeyHoldActuator,
    integrators: HashMap<StickId, MotionIntegrator>,
    failures: FailureLog,
    stats: EngineStats,
}

impl TranslationEngine {
    pub fn new(notice_sender: Option<mpsc::Sender<EngineNotice>>) -> Self {
        Self {
            keys: KeyHoldActuator::new(),
            integrators: HashMap::new(),
            failures: FailureLog::new(notice_sender),
            stats: EngineStats::default(),
        }
    }

    /// Runs one frame against the current mappings
    pub fn step(
        &mut self,
        store: &MappingStore,
        source: &mut dyn DeviceSource,
        sink: &mut dyn CommandSink,
        now: Instant,
    ) -> FrameReport {
        self.stats.frames += 1;

        let samples = source.poll();
        let mut report = FrameReport {
            devices: samples.len(),
            ..Default::default()
        };
        let mut reported = HashSet::new();
        let mut mouse_sticks = HashSet::new();

        for (device_index, sample) in samples {
            let Some(mapping) = store.device(device_index) else {
                // Unknown device: nothing configured yet
                report.unknown_devices.push(device_index);
                continue;
            };

            self.evaluate_buttons(mapping, &sample, &mut reported, sink);
            self.evaluate_dpad(mapping, &sample, &mut reported, sink);

            for stick in mapping.mapped_sticks() {
                match mapping.stick_config(stick) {
                    Some(StickConfig::Hotkeys(entries)) => {
                        let configured: Vec<Direction> =
                            entries.iter().map(|entry| entry.direction).collect();
                        let (x, y) = sample.stick(stick);

                        for entry in &entries {
                            let active = resolve_directions(
                                classify_stick(x, y, entry.threshold),
                                &configured,
                            );
                            let source_key =
                                LogicalStateKey::stick(device_index, stick, entry.direction);
                            self.keys.report(
                                entry.key,
                                source_key,
                                active.contains(entry.direction),
                                sink,
                            );
                            reported.insert(source_key);
                        }
                    }
                    Some(StickConfig::Mouse(settings)) => {
                        mouse_sticks.insert((device_index, stick));
                        self.drive_pointer(
                            (device_index, stick),
                            &sample,
                            settings,
                            source,
                            sink,
                            now,
                        );
                    }
                    None => {}
                }
            }
        }

        // Anything not evaluated this frame lost its device or its mapping
        self.keys.release_unreported(&reported, sink);

        self.integrators.retain(|stick, _| {
            let keep = mouse_sticks.contains(stick);
            if !keep {
                debug!("Discarding motion state of device {} stick {}", stick.0, stick.1);
            }
            keep
        });

        report
    }

    fn evaluate_buttons(
        &mut self,
        mapping: &DeviceMapping,
        sample: &DeviceSample,
        reported: &mut HashSet<LogicalStateKey>,
        sink: &mut dyn CommandSink,
    ) {
        for button in mapping.buttons() {
            let source_key = LogicalStateKey::button(mapping.device_index, button.button_index);
            let pressed = sample.button(button.button_index).pressed;
            self.keys.report(&button.key, source_key, pressed, sink);
            reported.insert(source_key);
        }
    }

    fn evaluate_dpad(
        &mut self,
        mapping: &DeviceMapping,
        sample: &DeviceSample,
        reported: &mut HashSet<LogicalStateKey>,
        sink: &mut dyn CommandSink,
    ) {
        if mapping.dpad().is_empty() {
            return;
        }

        let configured: Vec<Direction> = mapping.dpad().iter().map(|m| m.direction).collect();
        let active = resolve_directions(classify_dpad(sample.dpad()), &configured);

        for dpad in mapping.dpad() {
            let source_key = LogicalStateKey::dpad(mapping.device_index, dpad.direction);
            self.keys
                .report(&dpad.key, source_key, active.contains(dpad.direction), sink);
            reported.insert(source_key);
        }
    }

    fn drive_pointer(
        &mut self,
        stick_id: StickId,
        sample: &DeviceSample,
        settings: &MouseSettings,
        source: &mut dyn DeviceSource,
        sink: &mut dyn CommandSink,
        now: Instant,
    ) {
        let (device, stick) = stick_id;
        let integrator = self.integrators.entry(stick_id).or_default();

        let delta = match integrator.plan(sample.stick(stick), settings, now) {
            MotionPlan::AtRest => return,
            MotionPlan::Busy => {
                self.stats.motion_dropped += 1;
                return;
            }
            MotionPlan::Move(delta) => delta,
        };

        // Re-read right before dispatch; the stick may have been released meanwhile
        let still_moving = source
            .resample(device)
            .is_some_and(|fresh| !is_at_rest(fresh.stick(stick), settings));
        if !still_moving {
            debug!(
                "Device {} stick {} came to rest before dispatch, suppressing motion",
                device, stick
            );
            self.stats.motion_suppressed += 1;
            return;
        }

        integrator.mark_dispatched();
        self.stats.motion_dispatched += 1;
        sink.submit(
            CommandOrigin::Motion { device, stick },
            ActuationCommand::MoveBy {
                dx: delta.dx,
                dy: delta.dy,
            },
        );
    }

    /// Applies the outcome of a dispatched command
    pub fn on_completion(&mut self, completion: Completion) {
        if let CommandOrigin::Motion { device, stick } = completion.origin {
            match self.integrators.get_mut(&(device, stick)) {
                Some(integrator) => integrator.complete(),
                None => debug!(
                    "Ignoring late motion completion for device {} stick {}",
                    device, stick
                ),
            }
        }

        if self.failures.record(&completion) {
            self.stats.failures_reported += 1;
        }
    }

    /// Releases every held key, used when the loop stops
    pub fn release_all(&mut self, sink: &mut dyn CommandSink) {
        info!("Releasing all held keys");
        self.keys.release_all(sink);
    }

    pub fn stats(&self) -> EngineStats {
        self.stats
    }

    pub fn keys(&self) -> &KeyHoldActuator {
        &self.keys
    }

    pub fn motion_pending(&self, device: usize, stick: usize) -> bool {
        self.integrators
            .get(&(device, stick))
            .is_some_and(MotionIntegrator::in_flight)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::actuation::{ActuationError, RecordingSink};
    use crate::mapping::ActuationTarget;
    use std::collections::BTreeMap;
    use std::time::Duration;

    /// Device source replaying whatever the test puts into it
    #[derive(Default)]
    struct ScriptedSource {
        devices: BTreeMap<usize, DeviceSample>,
        /// Returned by the next `resample` instead of the current state
        next_resample: Option<DeviceSample>,
    }

    impl ScriptedSource {
        fn with_device(device: usize) -> Self {
            let mut source = Self::default();
            source.devices.insert(device, DeviceSample::neutral());
            source
        }

        fn sample(&mut self, device: usize) -> &mut DeviceSample {
            self.devices.entry(device).or_insert_with(DeviceSample::neutral)
        }
    }

    impl DeviceSource for ScriptedSource {
        fn poll(&mut self) -> Vec<(usize, DeviceSample)> {
            self.devices
                .iter()
                .map(|(index, sample)| (*index, sample.clone()))
                .collect()
        }

        fn resample(&mut self, device: usize) -> Option<DeviceSample> {
            self.next_resample
                .take()
                .or_else(|| self.devices.get(&device).cloned())
        }
    }

    fn key(name: &str) -> ActuationTarget {
        ActuationTarget::key(name).unwrap()
    }

    fn pressed_keys(sink: &RecordingSink) -> Vec<String> {
        sink.commands
            .iter()
            .filter_map(|(_, command)| match command {
                ActuationCommand::SetTarget { target, down: true } => Some(target.to_string()),
                _ => None,
            })
            .collect()
    }

    fn moves(sink: &RecordingSink) -> usize {
        sink.commands
            .iter()
            .filter(|(_, command)| matches!(command, ActuationCommand::MoveBy { .. }))
            .count()
    }

    fn mouse_store() -> MappingStore {
        let mut store = MappingStore::new();
        store
            .set_axis_mouse(0, 1, MouseSettings::default())
            .unwrap();
        store
    }

    #[test]
    fn held_button_presses_once_and_releases_once() {
        let mut store = MappingStore::new();
        store.set_button_mapping(0, 0, key("Space"));
        let mut source = ScriptedSource::with_device(0);
        let mut sink = RecordingSink::default();
        let mut engine = TranslationEngine::default();
        let start = Instant::now();

        source.sample(0).set_button(0, true);
        for frame in 0..100u64 {
            engine.step(&store, &mut source, &mut sink, start + Duration::from_millis(frame * 16));
        }
        assert_eq!(sink.presses(), 1);
        assert_eq!(sink.releases(), 0);

        source.sample(0).set_button(0, false);
        engine.step(&store, &mut source, &mut sink, start + Duration::from_secs(2));
        assert_eq!(sink.presses(), 1);
        assert_eq!(sink.releases(), 1);
    }

    #[test]
    fn unconfigured_diagonal_activates_both_cardinals() {
        let mut store = MappingStore::new();
        store.set_axis_hotkey(0, 0, Direction::Up, key("W"), 0.3).unwrap();
        store.set_axis_hotkey(0, 0, Direction::Left, key("A"), 0.3).unwrap();
        store.set_axis_hotkey(0, 0, Direction::Right, key("D"), 0.3).unwrap();
        let mut source = ScriptedSource::with_device(0);
        let mut sink = RecordingSink::default();
        let mut engine = TranslationEngine::default();

        source.sample(0).set_stick(0, -0.7, -0.7);
        engine.step(&store, &mut source, &mut sink, Instant::now());

        let mut pressed = pressed_keys(&sink);
        pressed.sort();
        assert_eq!(pressed, vec!["A", "W"]);
    }

    #[test]
    fn configured_diagonal_activates_only_itself() {
        let mut store = MappingStore::new();
        store.set_axis_hotkey(0, 0, Direction::Up, key("W"), 0.3).unwrap();
        store.set_axis_hotkey(0, 0, Direction::Left, key("A"), 0.3).unwrap();
        store.set_axis_hotkey(0, 0, Direction::UpLeft, key("Q"), 0.3).unwrap();
        let mut source = ScriptedSource::with_device(0);
        let mut sink = RecordingSink::default();
        let mut engine = TranslationEngine::default();

        source.sample(0).set_stick(0, -0.7, -0.7);
        engine.step(&store, &mut source, &mut sink, Instant::now());

        assert_eq!(pressed_keys(&sink), vec!["Q"]);
    }

    #[test]
    fn dpad_diagonal_falls_back_to_cardinals() {
        let mut store = MappingStore::new();
        store.set_dpad_mapping(0, Direction::Down, key("ArrowDown"));
        store.set_dpad_mapping(0, Direction::Right, key("ArrowRight"));
        let mut source = ScriptedSource::with_device(0);
        let mut sink = RecordingSink::default();
        let mut engine = TranslationEngine::default();

        source.sample(0).set_button(crate::controller::DPAD_DOWN, true);
        source.sample(0).set_button(crate::controller::DPAD_RIGHT, true);
        engine.step(&store, &mut source, &mut sink, Instant::now());

        assert_eq!(sink.presses(), 2);
    }

    #[test]
    fn pending_motion_is_dropped_until_it_completes() {
        let store = mouse_store();
        let mut source = ScriptedSource::with_device(0);
        let mut sink = RecordingSink::default();
        let mut engine = TranslationEngine::default();
        let start = Instant::now();

        source.sample(0).set_stick(1, 0.9, 0.0);
        engine.step(&store, &mut source, &mut sink, start);
        assert_eq!(moves(&sink), 1);
        assert!(engine.motion_pending(0, 1));

        for frame in 1..=5u64 {
            engine.step(&store, &mut source, &mut sink, start + Duration::from_millis(frame * 16));
        }
        assert_eq!(moves(&sink), 1);
        assert_eq!(engine.stats().motion_dropped, 5);

        // A failed command clears the pending flag too
        engine.on_completion(Completion {
            origin: CommandOrigin::Motion { device: 0, stick: 1 },
            result: Err(ActuationError::Backend("io".into())),
        });
        engine.step(&store, &mut source, &mut sink, start + Duration::from_millis(100));
        assert_eq!(moves(&sink), 2);
    }

    #[test]
    fn motion_is_suppressed_when_the_stick_rests_at_dispatch() {
        let store = mouse_store();
        let mut source = ScriptedSource::with_device(0);
        let mut sink = RecordingSink::default();
        let mut engine = TranslationEngine::default();

        source.sample(0).set_stick(1, 0.9, 0.9);
        source.next_resample = Some(DeviceSample::neutral());
        engine.step(&store, &mut source, &mut sink, Instant::now());

        assert_eq!(moves(&sink), 0);
        assert!(!engine.motion_pending(0, 1));
        assert_eq!(engine.stats().motion_suppressed, 1);
    }

    #[test]
    fn unknown_devices_are_reported_without_commands() {
        let store = MappingStore::new();
        let mut source = ScriptedSource::with_device(5);
        let mut sink = RecordingSink::default();
        let mut engine = TranslationEngine::default();

        source.sample(5).set_button(0, true);
        let report = engine.step(&store, &mut source, &mut sink, Instant::now());

        assert_eq!(report.devices, 1);
        assert_eq!(report.unknown_devices, vec![5]);
        assert!(sink.commands.is_empty());
    }

    #[test]
    fn removing_a_mapping_mid_press_releases_the_key() {
        let mut store = MappingStore::new();
        store.set_button_mapping(0, 2, key("E"));
        let mut source = ScriptedSource::with_device(0);
        let mut sink = RecordingSink::default();
        let mut engine = TranslationEngine::default();

        source.sample(0).set_button(2, true);
        engine.step(&store, &mut source, &mut sink, Instant::now());
        assert_eq!(sink.presses(), 1);

        store.remove_button_mapping(0, 2).unwrap();
        engine.step(&store, &mut source, &mut sink, Instant::now());
        assert_eq!(sink.releases(), 1);
        assert!(!engine.keys().is_held(&key("E")));
    }

    #[test]
    fn disconnecting_a_device_releases_its_keys() {
        let mut store = MappingStore::new();
        store.set_button_mapping(0, 0, key("Space"));
        let mut source = ScriptedSource::with_device(0);
        let mut sink = RecordingSink::default();
        let mut engine = TranslationEngine::default();

        source.sample(0).set_button(0, true);
        engine.step(&store, &mut source, &mut sink, Instant::now());
        source.devices.clear();
        engine.step(&store, &mut source, &mut sink, Instant::now());

        assert_eq!(sink.releases(), 1);
    }

    #[test]
    fn switching_a_stick_to_hotkeys_discards_its_motion_state() {
        let mut store = mouse_store();
        let mut source = ScriptedSource::with_device(0);
        let mut sink = RecordingSink::default();
        let mut engine = TranslationEngine::default();

        source.sample(0).set_stick(1, 0.9, 0.0);
        engine.step(&store, &mut source, &mut sink, Instant::now());
        assert!(engine.motion_pending(0, 1));

        store.set_axis_hotkey(0, 1, Direction::Right, key("L"), 0.3).unwrap();
        engine.step(&store, &mut source, &mut sink, Instant::now());
        assert!(!engine.motion_pending(0, 1));
        assert_eq!(pressed_keys(&sink), vec!["L"]);

        // Late completion of the discarded command is harmless
        engine.on_completion(Completion {
            origin: CommandOrigin::Motion { device: 0, stick: 1 },
            result: Ok(()),
        });
    }

    #[test]
    fn release_all_lets_go_of_everything() {
        let mut store = MappingStore::new();
        store.set_button_mapping(0, 0, key("Space"));
        store.set_button_mapping(0, 1, key("MouseLeft"));
        let mut source = ScriptedSource::with_device(0);
        let mut sink = RecordingSink::default();
        let mut engine = TranslationEngine::default();

        source.sample(0).set_button(0, true);
        source.sample(0).set_button(1, true);
        engine.step(&store, &mut source, &mut sink, Instant::now());
        engine.release_all(&mut sink);

        assert_eq!(sink.presses(), 2);
        assert_eq!(sink.releases(), 2);
    }

    #[test]
    fn spellings_of_one_key_share_its_holders() {
        let mut store = MappingStore::new();
        store.set_button_mapping(0, 0, key("a"));
        store.set_button_mapping(0, 1, key("A"));
        let mut source = ScriptedSource::with_device(0);
        let mut sink = RecordingSink::default();
        let mut engine = TranslationEngine::default();

        source.sample(0).set_button(0, true);
        source.sample(0).set_button(1, true);
        engine.step(&store, &mut source, &mut sink, Instant::now());
        assert_eq!(sink.presses(), 1);
        assert_eq!(engine.keys().holder_count(&key("A")), 2);

        source.sample(0).set_button(0, false);
        engine.step(&store, &mut source, &mut sink, Instant::now());
        assert_eq!(sink.releases(), 0);
        assert!(engine.keys().is_held(&key("a")));

        source.sample(0).set_button(1, false);
        engine.step(&store, &mut source, &mut sink, Instant::now());
        assert_eq!(sink.releases(), 1);
    }

    #[test]
    fn failed_key_actuation_keeps_the_holders() {
        let mut store = MappingStore::new();
        store.set_button_mapping(0, 0, key("Space"));
        let mut source = ScriptedSource::with_device(0);
        let mut sink = RecordingSink::default();
        let mut engine = TranslationEngine::default();
        let denied = || Completion {
            origin: CommandOrigin::Key(key("Space")),
            result: Err(ActuationError::PermissionDenied("uinput".into())),
        };

        source.sample(0).set_button(0, true);
        engine.step(&store, &mut source, &mut sink, Instant::now());
        engine.on_completion(denied());
        assert!(engine.keys().is_held(&key("Space")));

        // Still held, so no retry until the next activation edge
        engine.step(&store, &mut source, &mut sink, Instant::now());
        assert_eq!(sink.presses(), 1);

        source.sample(0).set_button(0, false);
        engine.step(&store, &mut source, &mut sink, Instant::now());
        assert_eq!(sink.releases(), 1);
        engine.on_completion(denied());
        assert!(!engine.keys().is_held(&key("Space")));

        source.sample(0).set_button(0, true);
        engine.step(&store, &mut source, &mut sink, Instant::now());
        assert_eq!(sink.presses(), 2);
        engine.on_completion(denied());

        assert_eq!(engine.stats().failures_reported, 1);
    }
}
