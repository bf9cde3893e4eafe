//! Per-world UI settings

use serde::{Deserialize, Serialize};

use super::{Config, ConfigError, Format};
use crate::raycast::{RaycastType, TraceChannel};

/// Settings injected into a [`crate::world::UiWorld`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct UiSettings {
    /// Trace channel given to newly created nodes and raycasters
    pub default_trace_channel: TraceChannel,

    /// Hit-test type given to newly created nodes
    pub default_raycast_type: RaycastType,

    /// Skip update callbacks of screen-overlay UI while the world is paused
    pub screen_space_affected_by_pause: bool,

    /// Skip update callbacks of world-space and render-target UI while paused
    pub world_space_affected_by_pause: bool,

    /// Warn when two raycasters share depth and trace channel
    pub warn_duplicate_raycasters: bool,
}

impl UiSettings {
    /// Create settings with default values
    pub fn new() -> Self {
        Self {
            default_trace_channel: TraceChannel::default(),
            default_raycast_type: RaycastType::Rect,
            screen_space_affected_by_pause: true,
            world_space_affected_by_pause: false,
            warn_duplicate_raycasters: true,
        }
    }

    /// Set the default trace channel
    pub fn with_default_trace_channel(mut self, channel: TraceChannel) -> Self {
        self.default_trace_channel = channel;
        self
    }

    /// Set the default raycast type
    pub fn with_default_raycast_type(mut self, raycast_type: RaycastType) -> Self {
        self.default_raycast_type = raycast_type;
        self
    }

    /// Set which UI spaces stop updating while paused
    pub fn with_pause_behaviour(mut self, screen_space: bool, world_space: bool) -> Self {
        self.screen_space_affected_by_pause = screen_space;
        self.world_space_affected_by_pause = world_space;
        self
    }

    /// Enable or disable the duplicate raycaster warning
    pub fn with_duplicate_raycaster_warning(mut self, enabled: bool) -> Self {
        self.warn_duplicate_raycasters = enabled;
        self
    }

    /// Validate the settings
    pub fn validate(&self) -> Result<(), String> {
        if self.default_trace_channel.0 >= TraceChannel::COUNT {
            return Err(format!(
                "default_trace_channel {} is out of range (0..{})",
                self.default_trace_channel.0,
                TraceChannel::COUNT
            ));
        }
        Ok(())
    }

    /// Parse and validate settings text
    pub fn parse(contents: &str, format: Format) -> Result<Self, ConfigError> {
        let settings = Self::from_str_with_format(contents, format)?;
        settings.validate().map_err(ConfigError::Invalid)?;
        Ok(settings)
    }
}

impl Default for UiSettings {
    fn default() -> Self {
        Self::new()
    }
}

impl Config for UiSettings {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_settings_are_valid() {
        let settings = UiSettings::default();
        assert!(settings.validate().is_ok());
        assert!(settings.screen_space_affected_by_pause);
        assert!(!settings.world_space_affected_by_pause);
    }

    #[test]
    fn test_partial_toml_fills_defaults() {
        let settings = UiSettings::parse(
            "default_raycast_type = \"Mesh\"\nworld_space_affected_by_pause = true\n",
            Format::Toml,
        )
        .unwrap();

        assert_eq!(settings.default_raycast_type, RaycastType::Mesh);
        assert!(settings.world_space_affected_by_pause);
        assert!(settings.warn_duplicate_raycasters);
    }

    #[test]
    fn test_ron_round_trip() {
        let settings = UiSettings::new()
            .with_default_trace_channel(TraceChannel(3))
            .with_duplicate_raycaster_warning(false);

        let text = settings.to_string_with_format(Format::Ron).unwrap();
        let parsed = UiSettings::parse(&text, Format::Ron).unwrap();
        assert_eq!(parsed, settings);
    }

    #[test]
    fn test_out_of_range_channel_rejected() {
        let result = UiSettings::parse("default_trace_channel = 200\n", Format::Toml);
        assert!(matches!(result, Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_unknown_extension_rejected() {
        let result = Format::of(std::path::Path::new("ui_settings.json"));
        assert!(matches!(result, Err(ConfigError::UnsupportedFormat(_))));
    }
}
