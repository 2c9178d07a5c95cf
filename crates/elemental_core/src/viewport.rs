//! Responsive viewport tiers

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// One of the four responsive breakpoints
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Viewport {
    Mobile,
    Tablet,
    Desktop,
    LargeDesktop,
}

impl Viewport {
    /// All tiers, smallest first
    pub const ALL: [Viewport; 4] = [
        Viewport::Mobile,
        Viewport::Tablet,
        Viewport::Desktop,
        Viewport::LargeDesktop,
    ];

    /// The name used in markup (`isActiveOn`) and in change events
    pub fn as_str(self) -> &'static str {
        match self {
            Viewport::Mobile => "mobile",
            Viewport::Tablet => "tablet",
            Viewport::Desktop => "desktop",
            Viewport::LargeDesktop => "large-desktop",
        }
    }

    /// Class of the tracking marker that renders only on this tier
    pub fn marker_class(self) -> String {
        format!("responsive-tracking--visible-on-{}", self.as_str())
    }
}

impl fmt::Display for Viewport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when parsing an unknown viewport name
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown viewport '{0}'")]
pub struct UnknownViewport(pub String);

impl FromStr for Viewport {
    type Err = UnknownViewport;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Viewport::ALL
            .into_iter()
            .find(|v| v.as_str() == s)
            .ok_or_else(|| UnknownViewport(s.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_names_round_trip() {
        for viewport in Viewport::ALL {
            assert_eq!(viewport.as_str().parse::<Viewport>(), Ok(viewport));
        }
        assert!("phablet".parse::<Viewport>().is_err());
    }

    #[test]
    fn test_serde_names() {
        let json = serde_json::to_string(&Viewport::LargeDesktop).unwrap();
        assert_eq!(json, "\"large-desktop\"");
        assert_eq!(
            Viewport::Desktop.marker_class(),
            "responsive-tracking--visible-on-desktop"
        );
    }
}
