//! Runtime configuration
//!
//! Settings can be built in code or loaded from TOML:
//!
//! ```toml
//! attribute = "data-elemental"
//! observe_removals = true
//! resize_debounce_ms = 200
//!
//! [breakpoints]
//! tablet = 768
//! desktop = 1024
//! large_desktop = 1440
//! ```

use elemental_core::Viewport;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;

use crate::error::ConfigError;

/// Configuration shared by every component of a [`Runtime`](crate::Runtime)
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct RuntimeConfig {
    /// Attribute carrying elemental declarations
    #[serde(default = "default_attribute")]
    pub attribute: String,
    /// Evict stored state when an instantiated element leaves the document
    #[serde(default = "default_true")]
    pub observe_removals: bool,
    /// Quiet period before a resize recomputes the viewport
    #[serde(default = "default_resize_debounce_ms")]
    pub resize_debounce_ms: u64,
    #[serde(default)]
    pub breakpoints: Breakpoints,
}

fn default_attribute() -> String {
    "data-elemental".to_string()
}

fn default_true() -> bool {
    true
}

fn default_resize_debounce_ms() -> u64 {
    200
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            attribute: default_attribute(),
            observe_removals: default_true(),
            resize_debounce_ms: default_resize_debounce_ms(),
            breakpoints: Breakpoints::default(),
        }
    }
}

impl RuntimeConfig {
    /// Parse a TOML document; missing keys take their defaults
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(content)?)
    }

    /// Load from a TOML file
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path.as_ref())?;
        Self::from_toml_str(&content)
    }

    pub fn resize_debounce(&self) -> Duration {
        Duration::from_millis(self.resize_debounce_ms)
    }
}

/// Minimum widths (in CSS pixels) of each viewport tier above mobile
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
pub struct Breakpoints {
    #[serde(default = "default_tablet")]
    pub tablet: u32,
    #[serde(default = "default_desktop")]
    pub desktop: u32,
    #[serde(default = "default_large_desktop")]
    pub large_desktop: u32,
}

fn default_tablet() -> u32 {
    768
}

fn default_desktop() -> u32 {
    1024
}

fn default_large_desktop() -> u32 {
    1440
}

impl Default for Breakpoints {
    fn default() -> Self {
        Self {
            tablet: default_tablet(),
            desktop: default_desktop(),
            large_desktop: default_large_desktop(),
        }
    }
}

impl Breakpoints {
    /// The tier a viewport of the given width falls into
    pub fn classify(&self, width: u32) -> Viewport {
        if width >= self.large_desktop {
            Viewport::LargeDesktop
        } else if width >= self.desktop {
            Viewport::Desktop
        } else if width >= self.tablet {
            Viewport::Tablet
        } else {
            Viewport::Mobile
        }
    }
}
