//! Application-wide constants
//!
//! Storage keys, schema defaults and stylesheet metrics live here so the
//! layout and the generator agree on a single source of truth.

/// Persisted key space (schema v2)
pub mod storage {
    /// Schema version marker key
    pub const SCHEMA_KEY: &str = "schema";

    /// Current schema version written by the migrator
    pub const CURRENT_SCHEMA: i64 = 2;

    /// Key holding the default profile id
    pub const DEFAULT_PROFILE_KEY: &str = "defaultProfile";

    /// Key holding the optional profile id for `file://` pages
    pub const LOCAL_FILE_PROFILE_KEY: &str = "localFileProfile";

    /// Key holding the domain-pattern -> `profile_<id>` mapping
    pub const RULES_KEY: &str = "rules";

    /// Prefix of every per-profile record key and every stored profile reference
    pub const PROFILE_PREFIX: &str = "profile_";
}

/// Profile schema defaults
pub mod profile {
    /// Name given to a profile record that carries none
    pub const DEFAULT_NAME: &str = "Default";

    /// Name tagged onto the profile produced from legacy storage
    pub const MIGRATED_NAME: &str = "Migrated profile";

    /// Fallback value for `customWidthValue`
    pub const CUSTOM_WIDTH_VALUE: u32 = 17;

    /// Fallback unit for `customWidthUnit`
    pub const CUSTOM_WIDTH_UNIT: &str = "px";

    /// Upper bound of `thumbRadius` (percent)
    pub const MAX_THUMB_RADIUS: u8 = 100;
}

/// Hostname grammar limits
pub mod hostname {
    /// Longest DNS label
    pub const MAX_LABEL_LEN: usize = 63;

    /// Longest full hostname
    pub const MAX_HOST_LEN: usize = 253;

    /// Prefix marking a subdomain wildcard pattern
    pub const WILDCARD_PREFIX: &str = "*.";
}

/// Stylesheet metrics used for `::-webkit-scrollbar` sizing
pub mod style {
    /// Width used when `width = auto`
    pub const AUTO_WIDTH_PX: u32 = 17;

    /// Width used when `width = thin`
    pub const THIN_WIDTH_PX: u32 = 8;

    /// Button background for the light button style
    pub const LIGHT_BUTTON_COLOR: &str = "#F0F0F0FF";

    /// Button background for the dark button style
    pub const DARK_BUTTON_COLOR: &str = "#2B2B2BFF";
}

/// On-disk locations
pub mod config {
    /// Directory under the platform config/data dirs
    pub const APP_DIR: &str = "scrollbar-profiles";

    /// Settings file name
    pub const SETTINGS_FILENAME: &str = "settings.json";

    /// Storage file name
    pub const STORAGE_FILENAME: &str = "storage.json";
}
