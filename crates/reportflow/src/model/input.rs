//! Submission input: raw request shape and its normalized, typed form.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Validation failures for a submission.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum InputError {
    #[error("theme_text is required")]
    MissingTheme,

    #[error("Unknown source type '{0}'")]
    UnknownSource(String),

    #[error("Source type '{0}' listed more than once")]
    DuplicateSource(String),

    #[error("source_priority must name at least one source")]
    EmptyPriority,
}

/// Where a piece of evidence came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceType {
    Internal,
    #[serde(alias = "youtube")]
    Video,
    Web,
}

impl SourceType {
    pub const ALL: [SourceType; 3] = [SourceType::Internal, SourceType::Video, SourceType::Web];

    pub fn as_str(&self) -> &'static str {
        match self {
            SourceType::Internal => "internal",
            SourceType::Video => "video",
            SourceType::Web => "web",
        }
    }
}

impl FromStr for SourceType {
    type Err = InputError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "internal" => Ok(SourceType::Internal),
            "video" | "youtube" => Ok(SourceType::Video),
            "web" => Ok(SourceType::Web),
            _ => Err(InputError::UnknownSource(s.to_string())),
        }
    }
}

impl fmt::Display for SourceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Ordered, non-empty list of distinct source types.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "Vec<SourceType>", into = "Vec<SourceType>")]
pub struct SourcePriority(Vec<SourceType>);

impl SourcePriority {
    pub fn new(sources: Vec<SourceType>) -> Result<Self, InputError> {
        if sources.is_empty() {
            return Err(InputError::EmptyPriority);
        }
        let mut seen: Vec<SourceType> = Vec::with_capacity(sources.len());
        for source in &sources {
            if seen.contains(source) {
                return Err(InputError::DuplicateSource(source.as_str().to_string()));
            }
            seen.push(*source);
        }
        Ok(Self(sources))
    }

    /// Parses request tokens. An empty list yields the default order.
    pub fn parse_tokens<S: AsRef<str>>(tokens: &[S]) -> Result<Self, InputError> {
        if tokens.is_empty() {
            return Ok(Self::default());
        }
        let sources = tokens
            .iter()
            .map(|t| t.as_ref().parse::<SourceType>())
            .collect::<Result<Vec<_>, _>>()?;
        Self::new(sources)
    }

    pub fn sources(&self) -> &[SourceType] {
        &self.0
    }

    pub fn first(&self) -> SourceType {
        self.0[0]
    }

    pub fn iter(&self) -> impl Iterator<Item = SourceType> + '_ {
        self.0.iter().copied()
    }
}

impl Default for SourcePriority {
    fn default() -> Self {
        Self(SourceType::ALL.to_vec())
    }
}

impl TryFrom<Vec<SourceType>> for SourcePriority {
    type Error = InputError;

    fn try_from(value: Vec<SourceType>) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<SourcePriority> for Vec<SourceType> {
    fn from(value: SourcePriority) -> Self {
        value.0
    }
}

/// What the collector does when a preferred source fails.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FallbackPolicy {
    /// Move on to the next source in priority order.
    #[default]
    Auto,
    /// Fail the section.
    Strict,
}

impl FallbackPolicy {
    pub fn from_flag(auto_fallback: bool) -> Self {
        if auto_fallback {
            FallbackPolicy::Auto
        } else {
            FallbackPolicy::Strict
        }
    }

    pub fn is_auto(&self) -> bool {
        matches!(self, FallbackPolicy::Auto)
    }
}

/// Normalized research request. Immutable once stored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportInput {
    pub theme_text: String,
    pub purpose: Option<String>,
    pub region: Option<String>,
    pub period: Option<String>,
    pub assumptions: Option<String>,
    pub focus_points: Vec<String>,
    pub source_priority: SourcePriority,
    pub fallback: FallbackPolicy,
}

impl ReportInput {
    /// Minimal input with defaults for every optional field.
    pub fn new(theme_text: impl Into<String>) -> Self {
        Self {
            theme_text: theme_text.into(),
            purpose: None,
            region: None,
            period: None,
            assumptions: None,
            focus_points: Vec::new(),
            source_priority: SourcePriority::default(),
            fallback: FallbackPolicy::Auto,
        }
    }
}

/// Submission as received from a client.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default, rename_all = "camelCase")]
pub struct SubmitRequest {
    pub theme_text: Option<String>,
    pub purpose: Option<String>,
    pub region: Option<String>,
    pub period: Option<String>,
    pub assumptions: Option<String>,
    pub focus_points: Option<Vec<String>>,
    pub source_priority: Option<Vec<String>>,
    pub auto_fallback: Option<bool>,
    pub owner: Option<String>,
}

impl SubmitRequest {
    pub fn with_theme(theme_text: impl Into<String>) -> Self {
        Self {
            theme_text: Some(theme_text.into()),
            ..Self::default()
        }
    }

    /// Validates the request and produces the stored input.
    pub fn normalize(&self) -> Result<ReportInput, InputError> {
        let theme_text = non_blank(&self.theme_text).ok_or(InputError::MissingTheme)?;

        let mut focus_points: Vec<String> = Vec::new();
        for point in self.focus_points.iter().flatten() {
            let point = point.trim();
            if !point.is_empty() && !focus_points.iter().any(|p| p == point) {
                focus_points.push(point.to_string());
            }
        }

        let source_priority = match &self.source_priority {
            Some(tokens) => SourcePriority::parse_tokens(tokens)?,
            None => SourcePriority::default(),
        };

        Ok(ReportInput {
            theme_text,
            purpose: non_blank(&self.purpose),
            region: non_blank(&self.region),
            period: non_blank(&self.period),
            assumptions: non_blank(&self.assumptions),
            focus_points,
            source_priority,
            fallback: FallbackPolicy::from_flag(self.auto_fallback.unwrap_or(true)),
        })
    }
}

fn non_blank(value: &Option<String>) -> Option<String> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}
