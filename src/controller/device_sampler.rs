//! Device sampling through gilrs
//!
//! The sampler drains pending gilrs events (keeping connection bookkeeping up to
//! date) and then reads the cached state of every connected gamepad into a
//! [`DeviceSample`]. It never blocks; one call per frame is enough.

use crate::controller::sample::{DeviceSample, ButtonState, AXIS_COUNT};
use chrono::{DateTime, Local};
use gilrs::{Axis, Button, Event, EventType, Gamepad, GamepadId, Gilrs};
use statum::{machine, state};
use std::collections::HashMap;
use tracing::{debug, error, info, warn};

/// Source of per-frame device state
pub trait DeviceSource {
    /// Current state of every connected device, keyed by device index
    fn poll(&mut self) -> Vec<(usize, DeviceSample)>;

    /// Fresh state of one device, read again right before a command is dispatched
    fn resample(&mut self, device: usize) -> Option<DeviceSample>;
}

/// Errors of the gamepad backend
#[derive(Debug, thiserror::Error)]
pub enum ControllerError {
    #[error("Failed to initialize gamepad backend: {0}")]
    InitializationError(String),
}

/// Buttons in the order of the fixed layout
const BUTTON_LAYOUT: [Button; 17] = [
    Button::South,
    Button::East,
    Button::West,
    Button::North,
    Button::LeftTrigger,
    Button::RightTrigger,
    Button::LeftTrigger2,
    Button::RightTrigger2,
    Button::Select,
    Button::Start,
    Button::LeftThumb,
    Button::RightThumb,
    Button::DPadUp,
    Button::DPadDown,
    Button::DPadLeft,
    Button::DPadRight,
    Button::Mode,
];

/// Axes in the order of the fixed layout, with whether the value is flipped
const AXIS_LAYOUT: [(Axis, bool); AXIS_COUNT] = [
    (Axis::LeftStickX, false),
    (Axis::LeftStickY, true),
    (Axis::RightStickX, false),
    (Axis::RightStickY, true),
];

#[derive(Debug, Clone)]
struct ConnectedDevice {
    id: GamepadId,
    name: String,
    since: DateTime<Local>,
}

#[state]
#[derive(Debug, Clone)]
pub enum SamplerState {
    Initializing,
    Sampling,
}

#[machine]
#[derive(Debug)]
pub struct DeviceSampler<S: SamplerState> {
    gilrs: Gilrs,

    // Device index -> gilrs id for every currently connected gamepad
    connected: HashMap<usize, ConnectedDevice>,
}

impl DeviceSampler<Initializing> {
    pub fn create() -> Result<Self, ControllerError> {
        info!("Initializing gilrs controller interface");
        let gilrs = match Gilrs::new() {
            Ok(g) => {
                info!("Successfully initialized gilrs");
                g
            }
            Err(e) => {
                error!("Failed to initialize gilrs: {}", e);
                return Err(ControllerError::InitializationError(e.to_string()));
            }
        };

        Ok(Self::new(gilrs, HashMap::new()))
    }

    /// Registers the gamepads that are already connected and starts sampling
    pub fn initialize(mut self) -> DeviceSampler<Sampling> {
        let gamepads: Vec<(GamepadId, String)> = self
            .gilrs
            .gamepads()
            .map(|(id, gamepad)| (id, gamepad.name().to_string()))
            .collect();

        if gamepads.is_empty() {
            warn!("No gamepad connected, waiting for devices");
        } else {
            info!("Found {} gamepads:", gamepads.len());
        }
        for (id, name) in gamepads {
            register(&mut self.connected, id, name);
        }

        info!("Device sampler initialized, transitioning to Sampling state");
        self.transition()
    }
}

impl DeviceSampler<Sampling> {
    /// Drains pending gilrs events so the cached gamepad state is current
    fn pump_events(&mut self) {
        while let Some(Event { id, event, .. }) = self.gilrs.next_event() {
            match event {
                EventType::Connected => {
                    let name = self.gilrs.gamepad(id).name().to_string();
                    register(&mut self.connected, id, name);
                }
                EventType::Disconnected => {
                    let index = usize::from(id);
                    if let Some(device) = self.connected.remove(&index) {
                        warn!(
                            "Device {} ({}) disconnected after {}s",
                            index,
                            device.name,
                            (Local::now() - device.since).num_seconds()
                        );
                    }
                }
                _ => {}
            }
        }
    }

    fn read(gamepad: Gamepad<'_>) -> DeviceSample {
        let buttons = BUTTON_LAYOUT
            .iter()
            .map(|&button| match gamepad.button_data(button) {
                Some(data) => ButtonState {
                    pressed: data.is_pressed(),
                    value: data.value(),
                },
                None => ButtonState::default(),
            })
            .collect();

        let axes = AXIS_LAYOUT
            .iter()
            .map(|&(axis, flipped)| {
                let value = gamepad.value(axis);
                if flipped {
                    -value
                } else {
                    value
                }
            })
            .collect();

        DeviceSample { buttons, axes }
    }
}

impl DeviceSource for DeviceSampler<Sampling> {
    fn poll(&mut self) -> Vec<(usize, DeviceSample)> {
        self.pump_events();

        let mut samples: Vec<(usize, DeviceSample)> = self
            .connected
            .iter()
            .filter_map(|(&index, device)| {
                self.gilrs
                    .connected_gamepad(device.id)
                    .map(|gamepad| (index, Self::read(gamepad)))
            })
            .collect();
        samples.sort_by_key(|(index, _)| *index);
        samples
    }

    fn resample(&mut self, device: usize) -> Option<DeviceSample> {
        self.pump_events();

        let id = self.connected.get(&device)?.id;
        self.gilrs.connected_gamepad(id).map(Self::read)
    }
}

fn register(connected: &mut HashMap<usize, ConnectedDevice>, id: GamepadId, name: String) {
    let index = usize::from(id);
    info!("Device {} connected: {}", index, name);
    debug!("gilrs id {} registered as device index {}", id, index);
    connected.insert(
        index,
        ConnectedDevice {
            id,
            name,
            since: Local::now(),
        },
    );
}
