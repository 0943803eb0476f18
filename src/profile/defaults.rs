//! Versioned-defaults resolution for stored profile records

use crate::constants::profile::{CUSTOM_WIDTH_UNIT, CUSTOM_WIDTH_VALUE, DEFAULT_NAME, MAX_THUMB_RADIUS};

use super::{Buttons, OverrideMode, PartialProfile, Profile, ScrollbarColors, Width};

/// Button style native to the host platform
pub fn platform_buttons() -> Buttons {
    if cfg!(target_os = "macos") {
        Buttons::None
    } else {
        Buttons::Light
    }
}

fn default_name() -> String {
    DEFAULT_NAME.to_string()
}

fn default_width() -> Width {
    Width::Auto
}

fn default_custom_width_unit() -> String {
    CUSTOM_WIDTH_UNIT.to_string()
}

fn default_thumb_radius() -> u8 {
    0
}

/// Fill every absent field of a stored record with its schema default
///
/// Total and idempotent. The stored record is never touched; `unset`
/// widths collapse to `auto` here rather than in storage.
pub fn normalize(raw: &PartialProfile) -> Profile {
    let width = match raw.width.unwrap_or_else(default_width) {
        Width::Unset => Width::Auto,
        other => other,
    };

    // Custom colors are all-or-nothing
    let colors = match (&raw.color_track, &raw.color_thumb) {
        (Some(track), Some(thumb)) => Some(ScrollbarColors {
            track: track.clone(),
            thumb: thumb.clone(),
        }),
        _ => None,
    };

    Profile {
        name: raw.name.clone().unwrap_or_else(default_name),
        width,
        custom_width_value: raw.custom_width_value.unwrap_or(CUSTOM_WIDTH_VALUE),
        custom_width_unit: raw
            .custom_width_unit
            .clone()
            .unwrap_or_else(default_custom_width_unit),
        colors,
        allow_override: raw.allow_override.unwrap_or(OverrideMode::NONE),
        buttons: raw.buttons.unwrap_or_else(platform_buttons),
        thumb_radius: raw
            .thumb_radius
            .unwrap_or_else(default_thumb_radius)
            .min(MAX_THUMB_RADIUS),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_normalize_empty_record() {
        let profile = normalize(&PartialProfile::default());
        assert_eq!(profile.name, DEFAULT_NAME);
        assert_eq!(profile.width, Width::Auto);
        assert_eq!(profile.allow_override, OverrideMode::NONE);
        assert_eq!(profile.buttons, platform_buttons());
        assert_eq!(profile.thumb_radius, 0);
        assert_eq!(profile.custom_width_value, CUSTOM_WIDTH_VALUE);
        assert_eq!(profile.custom_width_unit, CUSTOM_WIDTH_UNIT);
        assert_eq!(profile.colors, None);
    }

    #[test]
    fn test_normalize_collapses_unset_width() {
        let raw = PartialProfile {
            width: Some(Width::Unset),
            ..PartialProfile::default()
        };
        assert_eq!(normalize(&raw).width, Width::Auto);
        // Stored record keeps the legacy value
        assert_eq!(raw.width, Some(Width::Unset));
    }

    #[test]
    fn test_normalize_half_colors_disabled() {
        let raw = PartialProfile {
            color_track: Some("#FFFFFFFF".into()),
            ..PartialProfile::default()
        };
        assert_eq!(normalize(&raw).colors, None);
    }

    #[test]
    fn test_normalize_clamps_radius() {
        let raw = PartialProfile::from_record(&json!({ "thumbRadius": 250 }));
        assert_eq!(normalize(&raw).thumb_radius, MAX_THUMB_RADIUS);
    }

    #[test]
    fn test_normalize_is_idempotent() {
        let records = [
            json!({}),
            json!({ "width": "unset", "colorTrack": "#fff" }),
            json!({ "name": "Work", "width": "other", "customWidthValue": 3, "customWidthUnit": "em",
                    "colorTrack": "#000000FF", "colorThumb": "#FF0000FF", "allowOverride": 11,
                    "buttons": "dark", "thumbRadius": 180 }),
        ];

        for record in records {
            let once = normalize(&PartialProfile::from_record(&record));
            let twice = normalize(&PartialProfile::from(&once));
            assert_eq!(once, twice);

            // Through the persisted form as well
            let stored = normalize(&PartialProfile::from_record(&once.to_record()));
            assert_eq!(stored.name, once.name);
            assert_eq!(stored.width, once.width);
            assert_eq!(stored.colors, once.colors);
        }
    }
}
