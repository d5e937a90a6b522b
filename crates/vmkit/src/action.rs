//! Lifecycle actions and alias normalization.
//!
//! Users may type any of the [`ActionRequest`] spellings; everything past the
//! CLI boundary works with the canonical [`Action`].

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// An action as requested by the user, aliases included.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ActionRequest {
    Start,
    Stop,
    Reset,
    Suspend,
    /// Alias of [`ActionRequest::Suspend`]
    Pause,
    /// Alias of [`ActionRequest::Start`]
    Unpause,
    Snapshot,
    Revert,
    /// Alias of [`ActionRequest::Revert`]
    RevertToSnapshot,
}

/// Canonical action after alias normalization.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Action {
    Start,
    Stop,
    Reset,
    Suspend,
    Snapshot,
    Revert,
}

impl ActionRequest {
    /// Every accepted spelling, in help-text order.
    pub const ALL: [ActionRequest; 9] = [
        Self::Start,
        Self::Stop,
        Self::Suspend,
        Self::Reset,
        Self::Pause,
        Self::Unpause,
        Self::Snapshot,
        Self::Revert,
        Self::RevertToSnapshot,
    ];

    /// Map aliases onto their canonical action.
    pub fn normalize(self) -> Action {
        match self {
            Self::Start | Self::Unpause => Action::Start,
            Self::Stop => Action::Stop,
            Self::Reset => Action::Reset,
            Self::Suspend | Self::Pause => Action::Suspend,
            Self::Snapshot => Action::Snapshot,
            Self::Revert | Self::RevertToSnapshot => Action::Revert,
        }
    }

    /// Lowercase spelling accepted on the command line.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Start => "start",
            Self::Stop => "stop",
            Self::Reset => "reset",
            Self::Suspend => "suspend",
            Self::Pause => "pause",
            Self::Unpause => "unpause",
            Self::Snapshot => "snapshot",
            Self::Revert => "revert",
            Self::RevertToSnapshot => "reverttosnapshot",
        }
    }

    /// Comma-separated list of supported spellings, for guidance messages.
    pub fn supported() -> String {
        Self::ALL
            .iter()
            .map(ActionRequest::as_str)
            .collect::<Vec<_>>()
            .join(", ")
    }
}

/// Error returned when parsing an unsupported action.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnsupportedAction(pub String);

impl fmt::Display for UnsupportedAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "unsupported action '{}'; supported actions: {}",
            self.0,
            ActionRequest::supported()
        )
    }
}

impl std::error::Error for UnsupportedAction {}

impl FromStr for ActionRequest {
    type Err = UnsupportedAction;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_lowercase();
        Self::ALL
            .into_iter()
            .find(|a| a.as_str() == wanted)
            .ok_or_else(|| UnsupportedAction(s.trim().to_string()))
    }
}

impl fmt::Display for ActionRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<ActionRequest> for Action {
    fn from(request: ActionRequest) -> Self {
        request.normalize()
    }
}

impl Action {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Start => "start",
            Self::Stop => "stop",
            Self::Reset => "reset",
            Self::Suspend => "suspend",
            Self::Snapshot => "snapshot",
            Self::Revert => "revert",
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
