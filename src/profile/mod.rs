//! Scrollbar profile model
//!
//! A profile is stored as a sparse JSON record (`PartialProfile`) and is
//! always passed through [`defaults::normalize`] before use, so every
//! consumer sees a fully populated [`Profile`].

pub mod defaults;
pub mod store;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::str::FromStr;
use tracing::warn;

pub use defaults::normalize;
pub use store::ProfileStore;

/// Stable profile identifier (creation timestamp in milliseconds)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProfileId(pub i64);

impl ProfileId {
    pub fn as_i64(self) -> i64 {
        self.0
    }
}

impl fmt::Display for ProfileId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for ProfileId {
    type Err = std::num::ParseIntError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.trim().parse::<i64>().map(ProfileId)
    }
}

/// Scrollbar width mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Width {
    Auto,
    Thin,
    None,
    Other,
    /// Legacy spelling of `Auto`, collapsed during normalization
    Unset,
}

impl Width {
    pub fn as_str(self) -> &'static str {
        match self {
            Width::Auto => "auto",
            Width::Thin => "thin",
            Width::None => "none",
            Width::Other => "other",
            Width::Unset => "unset",
        }
    }
}

/// Visibility and style of the scrollbar arrow buttons
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Buttons {
    None,
    Light,
    Dark,
}

impl Buttons {
    pub fn as_str(self) -> &'static str {
        match self {
            Buttons::None => "none",
            Buttons::Light => "light",
            Buttons::Dark => "dark",
        }
    }
}

/// Which parts of the scrollbar styling a page's own stylesheet may override
///
/// Persisted as a decimal-encoded pair of bits: tens digit = width,
/// units digit = color (`0`, `1`, `10`, `11`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(try_from = "i64", into = "i64")]
pub struct OverrideMode {
    pub color: bool,
    pub width: bool,
}

impl OverrideMode {
    pub const NONE: OverrideMode = OverrideMode { color: false, width: false };

    pub fn from_code(code: i64) -> Option<Self> {
        match code {
            0 => Some(Self { color: false, width: false }),
            1 => Some(Self { color: true, width: false }),
            10 => Some(Self { color: false, width: true }),
            11 => Some(Self { color: true, width: true }),
            _ => None,
        }
    }

    pub fn code(self) -> i64 {
        (self.width as i64) * 10 + (self.color as i64)
    }
}

impl TryFrom<i64> for OverrideMode {
    type Error = String;

    fn try_from(code: i64) -> Result<Self, Self::Error> {
        Self::from_code(code).ok_or_else(|| format!("invalid allowOverride code {code}"))
    }
}

impl From<OverrideMode> for i64 {
    fn from(mode: OverrideMode) -> i64 {
        mode.code()
    }
}

/// Custom track/thumb colors as opaque hex8 strings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScrollbarColors {
    pub track: String,
    pub thumb: String,
}

/// Fully populated profile, produced by [`normalize`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Profile {
    pub name: String,
    pub width: Width,
    pub custom_width_value: u32,
    pub custom_width_unit: String,
    /// `None` means custom colors are disabled
    pub colors: Option<ScrollbarColors>,
    pub allow_override: OverrideMode,
    pub buttons: Buttons,
    pub thumb_radius: u8,
}

impl Profile {
    /// CSS length for `width = other`
    pub fn custom_width(&self) -> String {
        format!("{}{}", self.custom_width_value, self.custom_width_unit)
    }

    /// Stored record for this profile
    ///
    /// Disabled colors are written as explicit nulls; the custom width
    /// fields are only written when `width = other`.
    pub fn to_record(&self) -> Value {
        let mut map = Map::new();
        map.insert("name".into(), Value::String(self.name.clone()));
        map.insert("width".into(), Value::String(self.width.as_str().into()));
        let (track, thumb) = match &self.colors {
            Some(colors) => (
                Value::String(colors.track.clone()),
                Value::String(colors.thumb.clone()),
            ),
            None => (Value::Null, Value::Null),
        };
        map.insert("colorTrack".into(), track);
        map.insert("colorThumb".into(), thumb);
        map.insert("allowOverride".into(), Value::from(self.allow_override.code()));
        map.insert("buttons".into(), Value::String(self.buttons.as_str().into()));
        map.insert("thumbRadius".into(), Value::from(self.thumb_radius));
        if self.width == Width::Other {
            map.insert("customWidthValue".into(), Value::from(self.custom_width_value));
            map.insert("customWidthUnit".into(), Value::String(self.custom_width_unit.clone()));
        }
        Value::Object(map)
    }
}

/// Stored profile record; any field may be missing
///
/// Reading is lenient: a field with the wrong type or an unknown value is
/// treated as absent, so a record never fails to load.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PartialProfile {
    #[serde(default, deserialize_with = "lenient", skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, deserialize_with = "lenient", skip_serializing_if = "Option::is_none")]
    pub width: Option<Width>,
    #[serde(default, deserialize_with = "lenient_count", skip_serializing_if = "Option::is_none")]
    pub custom_width_value: Option<u32>,
    #[serde(default, deserialize_with = "lenient", skip_serializing_if = "Option::is_none")]
    pub custom_width_unit: Option<String>,
    #[serde(default, deserialize_with = "lenient", skip_serializing_if = "Option::is_none")]
    pub color_track: Option<String>,
    #[serde(default, deserialize_with = "lenient", skip_serializing_if = "Option::is_none")]
    pub color_thumb: Option<String>,
    #[serde(default, deserialize_with = "lenient", skip_serializing_if = "Option::is_none")]
    pub allow_override: Option<OverrideMode>,
    #[serde(default, deserialize_with = "lenient", skip_serializing_if = "Option::is_none")]
    pub buttons: Option<Buttons>,
    #[serde(default, deserialize_with = "lenient_radius", skip_serializing_if = "Option::is_none")]
    pub thumb_radius: Option<u8>,
}

impl PartialProfile {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: Some(name.into()),
            ..Self::default()
        }
    }

    /// Parse a stored record; a non-object record yields an empty profile
    pub fn from_record(record: &Value) -> Self {
        if !record.is_object() {
            warn!(record = %record, "Profile record is not an object, treating as empty");
            return Self::default();
        }
        Self::deserialize(record).unwrap_or_else(|e| {
            warn!(record = %record, error = %e, "Unreadable profile record, treating as empty");
            Self::default()
        })
    }

    /// Merge a patch into this record
    pub fn apply(&mut self, patch: &ProfilePatch) {
        if let Some(name) = &patch.name {
            self.name = Some(name.clone());
        }
        if let Some(width) = patch.width {
            self.width = Some(width);
        }
        if let Some((value, unit)) = &patch.custom_width {
            self.custom_width_value = Some(*value);
            self.custom_width_unit = Some(unit.clone());
        }
        match &patch.colors {
            Some(Some(colors)) => {
                self.color_track = Some(colors.track.clone());
                self.color_thumb = Some(colors.thumb.clone());
            }
            Some(None) => {
                self.color_track = None;
                self.color_thumb = None;
            }
            None => {}
        }
        if let Some(mode) = patch.allow_override {
            self.allow_override = Some(mode);
        }
        if let Some(buttons) = patch.buttons {
            self.buttons = Some(buttons);
        }
        if let Some(radius) = patch.thumb_radius {
            self.thumb_radius = Some(radius);
        }
    }
}

impl From<&Profile> for PartialProfile {
    fn from(profile: &Profile) -> Self {
        let (color_track, color_thumb) = match &profile.colors {
            Some(colors) => (Some(colors.track.clone()), Some(colors.thumb.clone())),
            None => (None, None),
        };
        Self {
            name: Some(profile.name.clone()),
            width: Some(profile.width),
            custom_width_value: Some(profile.custom_width_value),
            custom_width_unit: Some(profile.custom_width_unit.clone()),
            color_track,
            color_thumb,
            allow_override: Some(profile.allow_override),
            buttons: Some(profile.buttons),
            thumb_radius: Some(profile.thumb_radius),
        }
    }
}

/// Partial update of a profile record
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProfilePatch {
    pub name: Option<String>,
    pub width: Option<Width>,
    pub custom_width: Option<(u32, String)>,
    /// `Some(None)` disables custom colors
    pub colors: Option<Option<ScrollbarColors>>,
    pub allow_override: Option<OverrideMode>,
    pub buttons: Option<Buttons>,
    pub thumb_radius: Option<u8>,
}

/// Field value, or `None` when it has the wrong type or an unknown value
fn lenient<'de, D, T>(deserializer: D) -> Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned,
{
    let value = Value::deserialize(deserializer)?;
    if value.is_null() {
        return Ok(None);
    }
    match T::deserialize(&value) {
        Ok(parsed) => Ok(Some(parsed)),
        Err(e) => {
            warn!(value = %value, error = %e, "Ignoring malformed profile field");
            Ok(None)
        }
    }
}

/// Accepts a non-negative integer or a numeric string
fn lenient_count<'de, D>(deserializer: D) -> Result<Option<u32>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    let parsed = match &value {
        Value::Null => return Ok(None),
        Value::Number(n) => n.as_u64().and_then(|n| u32::try_from(n).ok()),
        Value::String(s) => s.trim().parse::<u32>().ok(),
        _ => None,
    };
    if parsed.is_none() {
        warn!(value = %value, "Ignoring malformed profile field");
    }
    Ok(parsed)
}

fn lenient_radius<'de, D>(deserializer: D) -> Result<Option<u8>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(lenient_count(deserializer)?.map(|r| r.min(u8::MAX as u32) as u8))
}
