//! In-memory mapping data model
//!
//! [`MappingStore`] owns one [`DeviceMapping`] per device index. All invariants
//! are enforced by the setters:
//!
//! - button mappings are unique by button index
//! - D-pad mappings are unique by direction
//! - a stick holds either hotkey entries (at most one per direction) or exactly
//!   one mouse entry, never both
//!
//! Readers (the frame loop) never have to re-check any of these.

use crate::controller::STICK_COUNT;
use crate::mapping::{ActuationTarget, Direction, MappingError};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::{debug, info, warn};

pub const DEFAULT_THRESHOLD: f32 = 0.3;
pub const DEFAULT_SENSITIVITY: f32 = 1.0;
pub const DEFAULT_ACCELERATION: f32 = 1.0;

/// Documented default parameter set for new axis mappings
#[derive(Deserialize, Serialize, Clone, Copy, Debug, PartialEq)]
pub struct MappingDefaults {
    pub threshold: f32,
    pub sensitivity: f32,
    pub acceleration: f32,
}

impl Default for MappingDefaults {
    fn default() -> Self {
        Self {
            threshold: DEFAULT_THRESHOLD,
            sensitivity: DEFAULT_SENSITIVITY,
            acceleration: DEFAULT_ACCELERATION,
        }
    }
}

#[derive(Deserialize, Serialize, Clone, Debug, PartialEq, Eq)]
pub struct ButtonMapping {
    pub button_index: usize,
    pub key: ActuationTarget,
}

#[derive(Deserialize, Serialize, Clone, Debug, PartialEq, Eq)]
pub struct DpadMapping {
    pub direction: Direction,
    pub key: ActuationTarget,
}

/// Interpretation of a stick's axis mappings
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AxisMode {
    Hotkey,
    Mouse,
}

/// Parameters of a stick driving the pointer
#[derive(Deserialize, Serialize, Clone, Copy, Debug, PartialEq)]
pub struct MouseSettings {
    pub threshold: f32,
    pub sensitivity: f32,
    pub acceleration: f32,
    #[serde(default)]
    pub invert_x: bool,
    #[serde(default)]
    pub invert_y: bool,
}

impl MouseSettings {
    pub fn from_defaults(defaults: &MappingDefaults) -> Self {
        Self {
            threshold: defaults.threshold,
            sensitivity: defaults.sensitivity,
            acceleration: defaults.acceleration,
            invert_x: false,
            invert_y: false,
        }
    }

    fn validate(&self) -> Result<(), MappingError> {
        validate_threshold(self.threshold)?;
        if !(self.sensitivity > 0.0 && self.sensitivity.is_finite()) {
            return Err(MappingError::InvalidSensitivity(self.sensitivity));
        }
        if !(self.acceleration > 0.0 && self.acceleration.is_finite()) {
            return Err(MappingError::InvalidAcceleration(self.acceleration));
        }
        Ok(())
    }
}

impl Default for MouseSettings {
    fn default() -> Self {
        Self::from_defaults(&MappingDefaults::default())
    }
}

/// One axis mapping entry of a stick
#[derive(Deserialize, Serialize, Clone, Debug, PartialEq)]
#[serde(tag = "mode", rename_all = "lowercase")]
pub enum AxisMapping {
    Hotkey {
        stick_index: usize,
        direction: Direction,
        key: ActuationTarget,
        threshold: f32,
    },
    Mouse {
        stick_index: usize,
        settings: MouseSettings,
    },
}

impl AxisMapping {
    pub fn stick_index(&self) -> usize {
        match self {
            AxisMapping::Hotkey { stick_index, .. } | AxisMapping::Mouse { stick_index, .. } => {
                *stick_index
            }
        }
    }

    pub fn mode(&self) -> AxisMode {
        match self {
            AxisMapping::Hotkey { .. } => AxisMode::Hotkey,
            AxisMapping::Mouse { .. } => AxisMode::Mouse,
        }
    }
}

/// A hotkey entry borrowed out of a stick's configuration
#[derive(Debug, Clone, Copy)]
pub struct HotkeyEntry<'a> {
    pub direction: Direction,
    pub key: &'a ActuationTarget,
    pub threshold: f32,
}

/// Configuration of a single stick, as seen by the frame loop
#[derive(Debug, Clone)]
pub enum StickConfig<'a> {
    Hotkeys(Vec<HotkeyEntry<'a>>),
    Mouse(&'a MouseSettings),
}

/// All mappings of one device
#[derive(Deserialize, Serialize, Clone, Debug, Default, PartialEq)]
pub struct DeviceMapping {
    pub device_index: usize,
    #[serde(default)]
    buttons: Vec<ButtonMapping>,
    #[serde(default)]
    axes: Vec<AxisMapping>,
    #[serde(default)]
    dpad: Vec<DpadMapping>,
}

impl DeviceMapping {
    pub fn new(device_index: usize) -> Self {
        Self {
            device_index,
            ..Default::default()
        }
    }

    /// Starter layout written on first run when nothing is persisted yet
    pub fn default_layout(device_index: usize, defaults: &MappingDefaults) -> Self {
        let mut mapping = Self::new(device_index);
        if let Err(e) = mapping.apply_default_layout(defaults) {
            warn!("Default layout incomplete: {}", e);
        }
        mapping
    }

    fn apply_default_layout(&mut self, defaults: &MappingDefaults) -> Result<(), MappingError> {
        let key = ActuationTarget::key;

        self.set_button(0, key("Space")?);
        self.set_button(1, key("Escape")?);
        self.set_button(2, key("E")?);
        self.set_button(3, key("Tab")?);
        self.set_button(4, key("MouseRight")?);
        self.set_button(5, key("MouseLeft")?);
        self.set_button(9, key("Enter")?);

        self.set_dpad(Direction::Up, key("ArrowUp")?);
        self.set_dpad(Direction::Down, key("ArrowDown")?);
        self.set_dpad(Direction::Left, key("ArrowLeft")?);
        self.set_dpad(Direction::Right, key("ArrowRight")?);

        for (direction, name) in [
            (Direction::Up, "W"),
            (Direction::Left, "A"),
            (Direction::Down, "S"),
            (Direction::Right, "D"),
        ] {
            self.set_axis_hotkey(0, direction, key(name)?, defaults.threshold)?;
        }
        self.set_axis_mouse(1, MouseSettings::from_defaults(defaults))
    }

    pub fn buttons(&self) -> &[ButtonMapping] {
        &self.buttons
    }

    pub fn axes(&self) -> &[AxisMapping] {
        &self.axes
    }

    pub fn dpad(&self) -> &[DpadMapping] {
        &self.dpad
    }

    pub fn is_empty(&self) -> bool {
        self.buttons.is_empty() && self.axes.is_empty() && self.dpad.is_empty()
    }

    pub fn set_button(&mut self, button_index: usize, key: ActuationTarget) {
        match self
            .buttons
            .iter_mut()
            .find(|mapping| mapping.button_index == button_index)
        {
            Some(existing) => existing.key = key,
            None => self.buttons.push(ButtonMapping { button_index, key }),
        }
    }

    pub fn remove_button(&mut self, button_index: usize) -> bool {
        let before = self.buttons.len();
        self.buttons.retain(|mapping| mapping.button_index != button_index);
        self.buttons.len() != before
    }

    pub fn set_dpad(&mut self, direction: Direction, key: ActuationTarget) {
        match self
            .dpad
            .iter_mut()
            .find(|mapping| mapping.direction == direction)
        {
            Some(existing) => existing.key = key,
            None => self.dpad.push(DpadMapping { direction, key }),
        }
    }

    pub fn remove_dpad(&mut self, direction: Direction) -> bool {
        let before = self.dpad.len();
        self.dpad.retain(|mapping| mapping.direction != direction);
        self.dpad.len() != before
    }

    /// Maps one stick direction to a key, switching the stick to hotkey mode.
    ///
    /// Any mouse entry on the same stick is removed first.
    pub fn set_axis_hotkey(
        &mut self,
        stick_index: usize,
        direction: Direction,
        key: ActuationTarget,
        threshold: f32,
    ) -> Result<(), MappingError> {
        validate_stick(stick_index)?;
        validate_threshold(threshold)?;

        let dropped = self.retain_axes(|mapping| {
            !(mapping.stick_index() == stick_index
                && match mapping {
                    AxisMapping::Mouse { .. } => true,
                    AxisMapping::Hotkey { direction: d, .. } => *d == direction,
                })
        });
        if dropped > 0 {
            debug!(
                "Replaced {} axis mapping(s) on device {} stick {}",
                dropped, self.device_index, stick_index
            );
        }

        self.axes.push(AxisMapping::Hotkey {
            stick_index,
            direction,
            key,
            threshold,
        });
        Ok(())
    }

    /// Switches a stick to mouse mode, removing all of its hotkey entries
    pub fn set_axis_mouse(
        &mut self,
        stick_index: usize,
        settings: MouseSettings,
    ) -> Result<(), MappingError> {
        validate_stick(stick_index)?;
        settings.validate()?;

        let dropped = self.retain_axes(|mapping| mapping.stick_index() != stick_index);
        if dropped > 0 {
            debug!(
                "Switched device {} stick {} to mouse mode, dropped {} mapping(s)",
                self.device_index, stick_index, dropped
            );
        }

        self.axes.push(AxisMapping::Mouse {
            stick_index,
            settings,
        });
        Ok(())
    }

    /// Removes axis mappings of a stick.
    ///
    /// With a direction only that hotkey entry goes; without one every entry of
    /// the stick goes, including a mouse entry.
    pub fn remove_axis(&mut self, stick_index: usize, direction: Option<Direction>) -> bool {
        let dropped = self.retain_axes(|mapping| {
            if mapping.stick_index() != stick_index {
                return true;
            }
            match (direction, mapping) {
                (None, _) => false,
                (Some(wanted), AxisMapping::Hotkey { direction, .. }) => *direction != wanted,
                (Some(_), AxisMapping::Mouse { .. }) => true,
            }
        });
        dropped > 0
    }

    pub fn clear(&mut self) {
        self.buttons.clear();
        self.axes.clear();
        self.dpad.clear();
    }

    /// Mode of a stick, `None` if the stick has no mappings
    pub fn stick_mode(&self, stick_index: usize) -> Option<AxisMode> {
        self.axes
            .iter()
            .find(|mapping| mapping.stick_index() == stick_index)
            .map(AxisMapping::mode)
    }

    /// Sticks with at least one mapping, in ascending order
    pub fn mapped_sticks(&self) -> Vec<usize> {
        let mut sticks: Vec<usize> = self.axes.iter().map(AxisMapping::stick_index).collect();
        sticks.sort_unstable();
        sticks.dedup();
        sticks
    }

    pub fn stick_config(&self, stick_index: usize) -> Option<StickConfig<'_>> {
        let mut hotkeys = Vec::new();
        for mapping in self.axes.iter().filter(|m| m.stick_index() == stick_index) {
            match mapping {
                AxisMapping::Mouse { settings, .. } => return Some(StickConfig::Mouse(settings)),
                AxisMapping::Hotkey {
                    direction,
                    key,
                    threshold,
                    ..
                } => hotkeys.push(HotkeyEntry {
                    direction: *direction,
                    key,
                    threshold: *threshold,
                }),
            }
        }

        if hotkeys.is_empty() {
            None
        } else {
            Some(StickConfig::Hotkeys(hotkeys))
        }
    }

    fn retain_axes(&mut self, keep: impl Fn(&AxisMapping) -> bool) -> usize {
        let before = self.axes.len();
        self.axes.retain(|mapping| keep(mapping));
        before - self.axes.len()
    }

    /// Rebuilds a mapping through the setters so every invariant holds
    fn normalized(self) -> Self {
        let mut mapping = Self::new(self.device_index);
        for button in self.buttons {
            mapping.set_button(button.button_index, button.key);
        }
        for dpad in self.dpad {
            mapping.set_dpad(dpad.direction, dpad.key);
        }
        for axis in self.axes {
            let stick = axis.stick_index();
            let result = match axis {
                AxisMapping::Hotkey {
                    direction,
                    key,
                    threshold,
                    ..
                } => mapping.set_axis_hotkey(stick, direction, key, threshold),
                AxisMapping::Mouse { settings, .. } => mapping.set_axis_mouse(stick, settings),
            };
            if let Err(e) = result {
                warn!(
                    "Dropping invalid axis mapping on device {} stick {}: {}",
                    mapping.device_index, stick, e
                );
            }
        }
        mapping
    }
}

fn validate_threshold(threshold: f32) -> Result<(), MappingError> {
    if threshold > 0.0 && threshold < 1.0 {
        Ok(())
    } else {
        Err(MappingError::InvalidThreshold(threshold))
    }
}

fn validate_stick(stick_index: usize) -> Result<(), MappingError> {
    if stick_index < STICK_COUNT {
        Ok(())
    } else {
        Err(MappingError::UnknownStick(stick_index))
    }
}

/// Mapping sets of all devices, keyed by device index
#[derive(Debug, Clone, Default)]
pub struct MappingStore {
    devices: BTreeMap<usize, DeviceMapping>,
}

impl MappingStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Restores a persisted mapping set, re-applying every entry through the setters
    pub fn from_devices(devices: Vec<DeviceMapping>) -> Self {
        let mut store = Self::new();
        for device in devices {
            let index = device.device_index;
            if store.devices.contains_key(&index) {
                warn!("Duplicate mapping for device {}, keeping the last one", index);
            }
            store.devices.insert(index, device.normalized());
        }
        info!("Mapping store restored with {} device(s)", store.devices.len());
        store
    }

    pub fn to_devices(&self) -> Vec<DeviceMapping> {
        self.devices.values().cloned().collect()
    }

    pub fn device(&self, device_index: usize) -> Option<&DeviceMapping> {
        self.devices.get(&device_index)
    }

    pub fn is_empty(&self) -> bool {
        self.devices.is_empty()
    }

    /// Returns the device's mapping, creating an empty one on first observation
    pub fn ensure_device(&mut self, device_index: usize) -> &mut DeviceMapping {
        self.devices.entry(device_index).or_insert_with(|| {
            info!("Created empty mapping for newly observed device {}", device_index);
            DeviceMapping::new(device_index)
        })
    }

    pub fn set_button_mapping(
        &mut self,
        device_index: usize,
        button_index: usize,
        key: ActuationTarget,
    ) -> &DeviceMapping {
        let device = self.ensure_device(device_index);
        device.set_button(button_index, key);
        device
    }

    pub fn remove_button_mapping(
        &mut self,
        device_index: usize,
        button_index: usize,
    ) -> Result<&DeviceMapping, MappingError> {
        let device = self.existing_device(device_index)?;
        device.remove_button(button_index);
        Ok(device)
    }

    pub fn set_axis_hotkey(
        &mut self,
        device_index: usize,
        stick_index: usize,
        direction: Direction,
        key: ActuationTarget,
        threshold: f32,
    ) -> Result<&DeviceMapping, MappingError> {
        let device = self.ensure_device(device_index);
        device.set_axis_hotkey(stick_index, direction, key, threshold)?;
        Ok(device)
    }

    pub fn set_axis_mouse(
        &mut self,
        device_index: usize,
        stick_index: usize,
        settings: MouseSettings,
    ) -> Result<&DeviceMapping, MappingError> {
        let device = self.ensure_device(device_index);
        device.set_axis_mouse(stick_index, settings)?;
        Ok(device)
    }

    pub fn remove_axis_mapping(
        &mut self,
        device_index: usize,
        stick_index: usize,
        direction: Option<Direction>,
    ) -> Result<&DeviceMapping, MappingError> {
        let device = self.existing_device(device_index)?;
        device.remove_axis(stick_index, direction);
        Ok(device)
    }

    pub fn set_dpad_mapping(
        &mut self,
        device_index: usize,
        direction: Direction,
        key: ActuationTarget,
    ) -> &DeviceMapping {
        let device = self.ensure_device(device_index);
        device.set_dpad(direction, key);
        device
    }

    pub fn remove_dpad_mapping(
        &mut self,
        device_index: usize,
        direction: Direction,
    ) -> Result<&DeviceMapping, MappingError> {
        let device = self.existing_device(device_index)?;
        device.remove_dpad(direction);
        Ok(device)
    }

    /// Clears a device's mappings; the (now empty) entry is kept
    pub fn clear_device(&mut self, device_index: usize) -> Result<&DeviceMapping, MappingError> {
        let device = self.existing_device(device_index)?;
        device.clear();
        Ok(device)
    }

    fn existing_device(&mut self, device_index: usize) -> Result<&mut DeviceMapping, MappingError> {
        self.devices
            .get_mut(&device_index)
            .ok_or(MappingError::UnknownDevice(device_index))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(name: &str) -> ActuationTarget {
        ActuationTarget::key(name).unwrap()
    }

    fn assert_exclusive(device: &DeviceMapping) {
        for stick in device.mapped_sticks() {
            let modes: Vec<AxisMode> = device
                .axes()
                .iter()
                .filter(|m| m.stick_index() == stick)
                .map(AxisMapping::mode)
                .collect();
            let mouse = modes.iter().filter(|m| **m == AxisMode::Mouse).count();
            let hotkey = modes.len() - mouse;
            assert!(mouse == 0 || (mouse == 1 && hotkey == 0), "stick {stick}: {modes:?}");
        }
    }

    #[test]
    fn button_mappings_are_unique_by_index() {
        let mut store = MappingStore::new();
        store.set_button_mapping(0, 6, key("A"));
        let device = store.set_button_mapping(0, 6, key("B"));

        assert_eq!(device.buttons().len(), 1);
        assert_eq!(device.buttons()[0].key, key("B"));
    }

    #[test]
    fn mouse_mapping_replaces_hotkeys_on_the_same_stick() {
        let mut store = MappingStore::new();
        store
            .set_axis_hotkey(0, 0, Direction::Up, key("W"), 0.3)
            .unwrap();
        store
            .set_axis_hotkey(0, 0, Direction::Left, key("A"), 0.3)
            .unwrap();
        store
            .set_axis_hotkey(0, 1, Direction::Up, key("I"), 0.3)
            .unwrap();

        let device = store.set_axis_mouse(0, 0, MouseSettings::default()).unwrap();

        assert_eq!(device.stick_mode(0), Some(AxisMode::Mouse));
        assert_eq!(device.stick_mode(1), Some(AxisMode::Hotkey));
        assert_eq!(device.axes().len(), 2);
        assert_exclusive(device);
    }

    #[test]
    fn hotkey_mapping_replaces_mouse_on_the_same_stick() {
        let mut store = MappingStore::new();
        store.set_axis_mouse(0, 0, MouseSettings::default()).unwrap();
        let device = store
            .set_axis_hotkey(0, 0, Direction::Down, key("S"), 0.4)
            .unwrap();

        assert_eq!(device.stick_mode(0), Some(AxisMode::Hotkey));
        assert_eq!(device.axes().len(), 1);
    }

    #[test]
    fn hotkey_direction_is_replaced_not_duplicated() {
        let mut device = DeviceMapping::new(0);
        device.set_axis_hotkey(0, Direction::Up, key("W"), 0.3).unwrap();
        device.set_axis_hotkey(0, Direction::Up, key("K"), 0.5).unwrap();

        assert_eq!(device.axes().len(), 1);
        assert!(matches!(
            &device.axes()[0],
            AxisMapping::Hotkey { threshold, .. } if *threshold == 0.5
        ));
    }

    #[test]
    fn mode_exclusivity_holds_for_mixed_operation_sequences() {
        let mut device = DeviceMapping::new(0);
        let directions = Direction::ALL;

        for step in 0..64usize {
            let stick = step % STICK_COUNT;
            match step % 5 {
                0 | 1 => device
                    .set_axis_hotkey(stick, directions[step % 8], key("X"), 0.3)
                    .unwrap(),
                2 => device.set_axis_mouse(stick, MouseSettings::default()).unwrap(),
                3 => {
                    device.remove_axis(stick, Some(directions[(step / 3) % 8]));
                }
                _ => {
                    device.remove_axis(stick, None);
                }
            }
            assert_exclusive(&device);
        }
    }

    #[test]
    fn remove_axis_with_direction_keeps_other_directions() {
        let mut device = DeviceMapping::new(0);
        device.set_axis_hotkey(0, Direction::Up, key("W"), 0.3).unwrap();
        device.set_axis_hotkey(0, Direction::Down, key("S"), 0.3).unwrap();

        assert!(device.remove_axis(0, Some(Direction::Up)));
        assert_eq!(device.axes().len(), 1);
        assert!(device.remove_axis(0, None));
        assert!(device.axes().is_empty());
    }

    #[test]
    fn invalid_parameters_are_rejected() {
        let mut device = DeviceMapping::new(0);
        assert!(matches!(
            device.set_axis_hotkey(0, Direction::Up, key("W"), 1.0),
            Err(MappingError::InvalidThreshold(_))
        ));
        assert!(matches!(
            device.set_axis_hotkey(STICK_COUNT, Direction::Up, key("W"), 0.3),
            Err(MappingError::UnknownStick(_))
        ));
        let settings = MouseSettings {
            sensitivity: 0.0,
            ..MouseSettings::default()
        };
        assert!(matches!(
            device.set_axis_mouse(0, settings),
            Err(MappingError::InvalidSensitivity(_))
        ));
        assert!(device.axes().is_empty());
    }

    #[test]
    fn removing_from_unknown_device_fails() {
        let mut store = MappingStore::new();
        assert!(matches!(
            store.remove_button_mapping(3, 0),
            Err(MappingError::UnknownDevice(3))
        ));
    }

    #[test]
    fn clearing_keeps_the_device_entry() {
        let mut store = MappingStore::new();
        store.set_dpad_mapping(2, Direction::Up, key("ArrowUp"));
        store.clear_device(2).unwrap();

        let device = store.device(2).unwrap();
        assert!(device.is_empty());
    }

    #[test]
    fn restoring_normalizes_conflicting_entries() {
        let raw = DeviceMapping {
            device_index: 0,
            buttons: vec![
                ButtonMapping {
                    button_index: 1,
                    key: key("A"),
                },
                ButtonMapping {
                    button_index: 1,
                    key: key("B"),
                },
            ],
            axes: vec![
                AxisMapping::Hotkey {
                    stick_index: 0,
                    direction: Direction::Up,
                    key: key("W"),
                    threshold: 0.3,
                },
                AxisMapping::Mouse {
                    stick_index: 0,
                    settings: MouseSettings::default(),
                },
            ],
            dpad: vec![],
        };

        let store = MappingStore::from_devices(vec![raw]);
        let device = store.device(0).unwrap();

        assert_eq!(device.buttons().len(), 1);
        assert_eq!(device.buttons()[0].key, key("B"));
        assert_eq!(device.stick_mode(0), Some(AxisMode::Mouse));
        assert_eq!(device.axes().len(), 1);
    }

    #[test]
    fn default_layout_is_complete() {
        let device = DeviceMapping::default_layout(0, &MappingDefaults::default());

        assert_eq!(device.stick_mode(0), Some(AxisMode::Hotkey));
        assert_eq!(device.stick_mode(1), Some(AxisMode::Mouse));
        assert_eq!(device.dpad().len(), 4);
        assert_eq!(device.buttons().len(), 7);
    }
}
