//! App screens addressed by path.

use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

static VIDEO_PATH: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^/videos/([A-Za-z0-9_-]+)/?$").expect("valid regex"));

/// A path that does not name a known screen.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown route: {0}")]
pub struct RouteError(pub String);

/// A screen in the app.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Route {
    /// Entry screen where the parent solves the challenge.
    Root,
    /// Watch-time selection.
    SelectDuration,
    /// The protected watch list.
    Videos,
    /// A single video player page, also protected.
    Video { id: String },
}

impl Route {
    /// Parse a path such as `/videos/abc123`.
    pub fn parse(path: &str) -> Result<Self, RouteError> {
        let trimmed = path.trim();
        match trimmed.trim_end_matches('/') {
            "" => return Ok(Self::Root),
            "/select-duration" => return Ok(Self::SelectDuration),
            "/videos" => return Ok(Self::Videos),
            _ => {}
        }
        VIDEO_PATH
            .captures(trimmed)
            .map(|caps| Self::Video {
                id: caps[1].to_string(),
            })
            .ok_or_else(|| RouteError(path.to_string()))
    }

    pub fn path(&self) -> String {
        match self {
            Self::Root => "/".to_string(),
            Self::SelectDuration => "/select-duration".to_string(),
            Self::Videos => "/videos".to_string(),
            Self::Video { id } => format!("/videos/{id}"),
        }
    }

    /// First path segment, `None` for the root screen.
    pub const fn segment(&self) -> Option<&'static str> {
        match self {
            Self::Root => None,
            Self::SelectDuration => Some("select-duration"),
            Self::Videos | Self::Video { .. } => Some("videos"),
        }
    }
}

impl TryFrom<String> for Route {
    type Error = RouteError;

    fn try_from(path: String) -> Result<Self, Self::Error> {
        Self::parse(&path)
    }
}

impl From<Route> for String {
    fn from(route: Route) -> Self {
        route.path()
    }
}

impl std::fmt::Display for Route {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.path())
    }
}
