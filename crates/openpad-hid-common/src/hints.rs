//! Hint registry
//!
//! Hints are the runtime tunables of the driver stack: which drivers are
//! enabled, protocol toggles, test overrides. The registry is injected into
//! the device registry and the drivers; it never owns policy itself. A
//! generation counter lets callers notice that hints changed and re-run
//! driver dispatch.

use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};

/// Well-known hint keys.
pub mod keys {
    /// Master switch for the whole HIDAPI driver stack.
    pub const JOYSTICK_HIDAPI: &str = "joystick_hidapi";
    /// Per-driver switches.
    pub const JOYSTICK_HIDAPI_GIP: &str = "joystick_hidapi_gip";
    pub const JOYSTICK_HIDAPI_8BITDO: &str = "joystick_hidapi_8bitdo";
    pub const JOYSTICK_HIDAPI_HOJA: &str = "joystick_hidapi_hoja";
    pub const JOYSTICK_HIDAPI_SINPUT: &str = "joystick_hidapi_sinput";
    pub const JOYSTICK_HIDAPI_PSMOVE: &str = "joystick_hidapi_psmove";
    pub const JOYSTICK_HIDAPI_ZUIKI: &str = "joystick_hidapi_zuiki";
    pub const JOYSTICK_HIDAPI_GAMESIR: &str = "joystick_hidapi_gamesir";
    pub const JOYSTICK_HIDAPI_TRITON: &str = "joystick_hidapi_triton";
    /// Ask a GIP device to reset if its metadata never arrives.
    pub const JOYSTICK_HIDAPI_GIP_RESET_FOR_METADATA: &str =
        "joystick_hidapi_gip_reset_for_metadata";
    /// Expose Elite paddles as buttons.
    pub const JOYSTICK_HIDAPI_GIP_PADDLES: &str = "joystick_hidapi_gip_paddles";
}

/// Parse a hint string the permissive way: anything that is not an explicit
/// "off" spelling counts as on, and vice versa; unparseable text falls back.
pub fn parse_bool(value: &str, default: bool) -> bool {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => true,
        "0" | "false" | "no" | "off" => false,
        _ => default,
    }
}

pub trait HintRegistry: Send + Sync {
    /// Raw hint value, if set.
    fn value(&self, key: &str) -> Option<String>;

    /// Monotonic counter bumped whenever any hint changes.
    fn generation(&self) -> u64;

    /// Boolean view of a hint.
    fn enabled(&self, key: &str, default: bool) -> bool {
        match self.value(key) {
            Some(v) => parse_bool(&v, default),
            None => default,
        }
    }
}

/// Hint registry backed by process environment variables.
///
/// A hint key `joystick_hidapi_gip` maps to `OPENPAD_HINT_JOYSTICK_HIDAPI_GIP`.
/// Programmatic overrides shadow the environment and bump the generation;
/// the environment itself is treated as immutable for the process lifetime.
pub struct EnvHints {
    prefix: &'static str,
    overrides: Mutex<HashMap<String, String>>,
    generation: AtomicU64,
}

impl EnvHints {
    pub fn new() -> Self {
        Self {
            prefix: "OPENPAD_HINT_",
            overrides: Mutex::new(HashMap::new()),
            generation: AtomicU64::new(0),
        }
    }

    pub fn set(&self, key: &str, value: impl Into<String>) {
        let mut overrides = self.overrides.lock().unwrap_or_else(|e| e.into_inner());
        overrides.insert(key.to_string(), value.into());
        self.generation.fetch_add(1, Ordering::Relaxed);
    }

    fn env_name(&self, key: &str) -> String {
        format!("{}{}", self.prefix, key.to_ascii_uppercase())
    }
}

impl Default for EnvHints {
    fn default() -> Self {
        Self::new()
    }
}

impl HintRegistry for EnvHints {
    fn value(&self, key: &str) -> Option<String> {
        {
            let overrides = self.overrides.lock().unwrap_or_else(|e| e.into_inner());
            if let Some(v) = overrides.get(key) {
                return Some(v.clone());
            }
        }
        std::env::var(self.env_name(key)).ok()
    }

    fn generation(&self) -> u64 {
        self.generation.load(Ordering::Relaxed)
    }
}

/// In-memory hint registry for tests and embedders that manage their own
/// configuration.
#[derive(Default)]
pub struct StaticHints {
    values: Mutex<HashMap<String, String>>,
    generation: AtomicU64,
}

impl StaticHints {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, key: &str, value: impl Into<String>) {
        let mut values = self.values.lock().unwrap_or_else(|e| e.into_inner());
        values.insert(key.to_string(), value.into());
        self.generation.fetch_add(1, Ordering::Relaxed);
    }

    pub fn set_enabled(&self, key: &str, enabled: bool) {
        self.set(key, if enabled { "1" } else { "0" });
    }

    pub fn clear(&self, key: &str) {
        let mut values = self.values.lock().unwrap_or_else(|e| e.into_inner());
        if values.remove(key).is_some() {
            self.generation.fetch_add(1, Ordering::Relaxed);
        }
    }
}

impl HintRegistry for StaticHints {
    fn value(&self, key: &str) -> Option<String> {
        let values = self.values.lock().unwrap_or_else(|e| e.into_inner());
        values.get(key).cloned()
    }

    fn generation(&self) -> u64 {
        self.generation.load(Ordering::Relaxed)
    }
}
