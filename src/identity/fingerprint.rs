//! Environment fingerprint supplied by the embedder.

use super::hash::fnv1a_base36;

/// Environment characteristics combined into the fingerprint hash.
///
/// The embedder probes its host context (the crate cannot) and fills in
/// whatever it can observe. Fields were chosen to raise identity uniqueness
/// without retaining anything identifiable: only the reduced hash ever leaves
/// this struct.
#[derive(Clone, Debug, PartialEq)]
pub struct EnvironmentFingerprint {
    /// BCP 47 locale tag, e.g. `en-US`.
    pub locale: String,
    /// Offset from UTC in minutes.
    pub timezone_offset_minutes: i32,
    /// Screen geometry in physical pixels.
    pub screen_width: u32,
    pub screen_height: u32,
    /// Colour depth in bits per pixel.
    pub color_depth: u8,
    /// Logical processor count hint.
    pub hardware_concurrency: u32,
    /// Approximate device memory hint in gigabytes.
    pub device_memory_gb: u32,
    /// Platform string as reported by the host.
    pub platform: String,
    /// Whether session-scoped storage is available.
    pub storage_available: bool,
    /// Whether cookies are enabled.
    pub cookies_enabled: bool,
    /// Maximum simultaneous touch points.
    pub touch_points: u8,
}

impl Default for EnvironmentFingerprint {
    fn default() -> Self {
        Self {
            locale: String::new(),
            timezone_offset_minutes: 0,
            screen_width: 0,
            screen_height: 0,
            color_depth: 0,
            hardware_concurrency: 0,
            device_memory_gb: 0,
            platform: String::new(),
            storage_available: false,
            cookies_enabled: false,
            touch_points: 0,
        }
    }
}

impl EnvironmentFingerprint {
    /// Reduce the fingerprint to its hash.
    ///
    /// The canonical rendering joins every field with `|` in declaration
    /// order, so two environments differing in any observed characteristic
    /// hash differently.
    pub fn hash(&self) -> String {
        let canonical = format!(
            "{}|{}|{}x{}|{}|{}|{}|{}|{}|{}|{}",
            self.locale,
            self.timezone_offset_minutes,
            self.screen_width,
            self.screen_height,
            self.color_depth,
            self.hardware_concurrency,
            self.device_memory_gb,
            self.platform,
            self.storage_available,
            self.cookies_enabled,
            self.touch_points,
        );
        fnv1a_base36(&canonical)
    }
}
