//! Joystick event sink.
//!
//! The sink is an injected collaborator: the registry and the drivers emit
//! decoded events into it and never care what consumes them. The `mock`
//! module has a recording implementation used throughout the test suites.

use serde::Serialize;

use crate::events::{Hat, PowerState, SensorKind};

/// Decoded joystick event.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum JoystickEvent {
    Button { button: u8, pressed: bool },
    Axis { axis: u8, value: i16 },
    Hat { index: u8, position: Hat },
    Power { state: PowerState, percent: i32 },
    Sensor {
        kind: SensorKind,
        timestamp_ns: u64,
        values: [f32; 3],
    },
    Touchpad {
        touchpad: u8,
        finger: u8,
        down: bool,
        x: f32,
        y: f32,
        pressure: f32,
    },
    Connected,
    Disconnected,
}

pub trait JoystickEventSink {
    fn button(&mut self, button: u8, pressed: bool);
    fn axis(&mut self, axis: u8, value: i16);
    fn hat(&mut self, index: u8, position: Hat);
    fn power(&mut self, state: PowerState, percent: i32);
    fn sensor(&mut self, kind: SensorKind, timestamp_ns: u64, values: [f32; 3]);
    fn touchpad(&mut self, touchpad: u8, finger: u8, down: bool, x: f32, y: f32, pressure: f32);

    /// A logical joystick became usable on this device.
    fn joystick_connected(&mut self);

    /// The logical joystick went away (unplug, defunct transport, or a
    /// wireless slot losing its controller).
    fn joystick_disconnected(&mut self);
}

pub mod mock {
    use super::*;

    /// Sink that records everything it is handed.
    #[derive(Default)]
    pub struct RecordingSink {
        events: Vec<JoystickEvent>,
    }

    impl RecordingSink {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn events(&self) -> &[JoystickEvent] {
            &self.events
        }

        pub fn take_events(&mut self) -> Vec<JoystickEvent> {
            std::mem::take(&mut self.events)
        }

        pub fn clear(&mut self) {
            self.events.clear();
        }

        pub fn button_events(&self) -> Vec<(u8, bool)> {
            self.events
                .iter()
                .filter_map(|e| match e {
                    JoystickEvent::Button { button, pressed } => Some((*button, *pressed)),
                    _ => None,
                })
                .collect()
        }

        pub fn axis_events(&self) -> Vec<(u8, i16)> {
            self.events
                .iter()
                .filter_map(|e| match e {
                    JoystickEvent::Axis { axis, value } => Some((*axis, *value)),
                    _ => None,
                })
                .collect()
        }

        pub fn hat_events(&self) -> Vec<(u8, Hat)> {
            self.events
                .iter()
                .filter_map(|e| match e {
                    JoystickEvent::Hat { index, position } => Some((*index, *position)),
                    _ => None,
                })
                .collect()
        }

        pub fn power_events(&self) -> Vec<(PowerState, i32)> {
            self.events
                .iter()
                .filter_map(|e| match e {
                    JoystickEvent::Power { state, percent } => Some((*state, *percent)),
                    _ => None,
                })
                .collect()
        }

        pub fn sensor_events(&self) -> Vec<(SensorKind, u64, [f32; 3])> {
            self.events
                .iter()
                .filter_map(|e| match e {
                    JoystickEvent::Sensor {
                        kind,
                        timestamp_ns,
                        values,
                    } => Some((*kind, *timestamp_ns, *values)),
                    _ => None,
                })
                .collect()
        }

        pub fn touchpad_events(&self) -> Vec<(u8, u8, bool, f32, f32, f32)> {
            self.events
                .iter()
                .filter_map(|e| match e {
                    JoystickEvent::Touchpad {
                        touchpad,
                        finger,
                        down,
                        x,
                        y,
                        pressure,
                    } => Some((*touchpad, *finger, *down, *x, *y, *pressure)),
                    _ => None,
                })
                .collect()
        }

        pub fn connected_count(&self) -> usize {
            self.events
                .iter()
                .filter(|e| matches!(e, JoystickEvent::Connected))
                .count()
        }

        pub fn disconnected_count(&self) -> usize {
            self.events
                .iter()
                .filter(|e| matches!(e, JoystickEvent::Disconnected))
                .count()
        }
    }

    impl JoystickEventSink for RecordingSink {
        fn button(&mut self, button: u8, pressed: bool) {
            self.events.push(JoystickEvent::Button { button, pressed });
        }

        fn axis(&mut self, axis: u8, value: i16) {
            self.events.push(JoystickEvent::Axis { axis, value });
        }

        fn hat(&mut self, index: u8, position: Hat) {
            self.events.push(JoystickEvent::Hat { index, position });
        }

        fn power(&mut self, state: PowerState, percent: i32) {
            self.events.push(JoystickEvent::Power { state, percent });
        }

        fn sensor(&mut self, kind: SensorKind, timestamp_ns: u64, values: [f32; 3]) {
            self.events.push(JoystickEvent::Sensor {
                kind,
                timestamp_ns,
                values,
            });
        }

        fn touchpad(
            &mut self,
            touchpad: u8,
            finger: u8,
            down: bool,
            x: f32,
            y: f32,
            pressure: f32,
        ) {
            self.events.push(JoystickEvent::Touchpad {
                touchpad,
                finger,
                down,
                x,
                y,
                pressure,
            });
        }

        fn joystick_connected(&mut self) {
            self.events.push(JoystickEvent::Connected);
        }

        fn joystick_disconnected(&mut self) {
            self.events.push(JoystickEvent::Disconnected);
        }
    }
}
