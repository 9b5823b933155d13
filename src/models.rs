use serde::Serialize;
use std::fmt;

/// Reachability of a link's target as last observed by the health checker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize)]
pub enum LinkStatus {
    #[default]
    Unknown,
    #[serde(rename = "OK")]
    Ok,
    Failed,
}

impl LinkStatus {
    /// Integer code persisted in the `link_status` column.
    pub fn code(self) -> i64 {
        match self {
            LinkStatus::Unknown => 0,
            LinkStatus::Ok => 1,
            LinkStatus::Failed => 2,
        }
    }

    /// Inverse of [`LinkStatus::code`]. Unrecognised codes read as `Unknown`.
    pub fn from_code(code: i64) -> Self {
        match code {
            1 => LinkStatus::Ok,
            2 => LinkStatus::Failed,
            _ => LinkStatus::Unknown,
        }
    }
}

impl fmt::Display for LinkStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            LinkStatus::Unknown => "Unknown",
            LinkStatus::Ok => "OK",
            LinkStatus::Failed => "Failed",
        };
        f.write_str(s)
    }
}

/// A shortened link.
///
/// `short_id`, `target_url` and `owner_id` never change once stored; only
/// `status` is rewritten, and only by the health checker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Link {
    pub short_id: String,
    pub target_url: String,
    pub status: LinkStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub owner_id: Option<String>,
}

impl Link {
    /// A freshly cut link in the `Unknown` state.
    pub fn new(
        short_id: impl Into<String>,
        target_url: impl Into<String>,
        owner_id: Option<String>,
    ) -> Self {
        Self {
            short_id: short_id.into(),
            target_url: target_url.into(),
            status: LinkStatus::Unknown,
            owner_id: owner_id.filter(|o| !o.is_empty()),
        }
    }

    pub fn is_owned_by(&self, account_id: &str) -> bool {
        self.owner_id.as_deref() == Some(account_id)
    }
}
