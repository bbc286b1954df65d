// SPDX-License-Identifier: MIT

//! Workflow task identifiers, the date-path they encode, ad-hoc stage task
//! identifiers, and the terminal status of a single step run as recorded in
//! its artifact's status file.

use crate::simple_display;

/// A workflow run id: a 10-digit `YYYYMMDDHH` prefix (which doubles as the
/// artifact store's date path, spec.md §4.I) followed by a random,
/// non-whitespace suffix. `generate` produces a 32-byte id to match
/// [`crate::ServiceId`]'s shape, but `validate` accepts any length per the
/// wire-level regex `^\d{10}\S+$`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(transparent)]
pub struct TaskId(String);

impl TaskId {
    const PREFIX_LEN: usize = 10;

    /// `date_hour` must be a 10-digit `YYYYMMDDHH` string.
    pub fn generate(date_hour: &str) -> Self {
        debug_assert_eq!(date_hour.len(), Self::PREFIX_LEN, "prefix must be YYYYMMDDHH");
        let suffix = nanoid::nanoid!(22);
        Self(format!("{date_hour}{suffix}"))
    }

    /// Validates the wire-level shape: a 10-digit leading prefix followed by
    /// at least one non-whitespace character, no embedded whitespace
    /// anywhere in the id.
    pub fn validate(raw: &str) -> Result<(), crate::ZalletError> {
        Self::parse(raw).map(|_| ())
    }

    pub fn parse(raw: &str) -> Result<Self, crate::ZalletError> {
        let bad = || crate::ZalletError::Validation(format!("invalid task id {raw:?}"));
        if raw.len() <= Self::PREFIX_LEN {
            return Err(bad());
        }
        let (prefix, suffix) = raw.split_at(Self::PREFIX_LEN);
        if !prefix.bytes().all(|b| b.is_ascii_digit()) {
            return Err(bad());
        }
        if suffix.is_empty() || raw.chars().any(char::is_whitespace) {
            return Err(bad());
        }
        Ok(Self(raw.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Decomposes the id's `YYYYMMDDHH` prefix and random suffix into the
    /// four path segments the artifact store nests task directories under
    /// (`<root>/YYYY/MM/DD/HH/<suffix>/`), plus the suffix itself as the
    /// leaf directory name.
    pub fn date_path(&self) -> DatePath<'_> {
        let prefix = &self.0[..Self::PREFIX_LEN];
        DatePath {
            year: &prefix[0..4],
            month: &prefix[4..6],
            day: &prefix[6..8],
            hour: &prefix[8..10],
            suffix: &self.0[Self::PREFIX_LEN..],
        }
    }
}

impl std::fmt::Display for TaskId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// The `YYYY`/`MM`/`DD`/`HH`/`<suffix>` path segments a [`TaskId`] encodes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DatePath<'a> {
    pub year: &'a str,
    pub month: &'a str,
    pub day: &'a str,
    pub hour: &'a str,
    pub suffix: &'a str,
}

/// An ad-hoc stage execution id (`execute -s <service> -i <taskId>`,
/// spec.md §4.I): a 32-character opaque, non-whitespace token, unrelated to
/// [`TaskId`]'s date-prefixed shape.
#[derive(Debug, Clone, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(transparent)]
pub struct StageTaskId(String);

impl StageTaskId {
    pub const LEN: usize = 32;

    pub fn generate() -> Self {
        Self(nanoid::nanoid!(Self::LEN))
    }

    pub fn validate(raw: &str) -> Result<(), crate::ZalletError> {
        if raw.chars().count() != Self::LEN || raw.chars().any(char::is_whitespace) {
            return Err(crate::ZalletError::Validation(format!(
                "invalid stage task id {raw:?}"
            )));
        }
        Ok(())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for StageTaskId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// The terminal (or in-flight) status of one step's execution, as written
/// into its artifact status file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    Running,
    Success,
    Fail,
    Cancelled,
    Timeout,
}

simple_display!(RunStatus {
    Running => "running",
    Success => "success",
    Fail => "fail",
    Cancelled => "cancelled",
    Timeout => "timeout",
});

impl RunStatus {
    fn from_token(token: &str) -> Option<Self> {
        match token {
            "running" => Some(Self::Running),
            "success" => Some(Self::Success),
            "fail" => Some(Self::Fail),
            "cancelled" => Some(Self::Cancelled),
            "timeout" => Some(Self::Timeout),
            _ => None,
        }
    }
}

/// Formats a status file body: `"<status> <durationMillis>"`.
pub fn format_status_line(status: RunStatus, duration_millis: u64) -> String {
    format!("{status} {duration_millis}")
}

/// Parses a status file body. Per the artifact store's tolerant-read rule,
/// anything that isn't exactly two whitespace-separated fields with a
/// recognized status token and an integer duration falls back to
/// `(Unknown-as-Fail-shaped, 0)` rather than erroring — callers reading a
/// status file mid-write should see a placeholder, not a crash.
pub fn parse_status_line(body: &str) -> (Option<RunStatus>, u64) {
    let mut fields = body.split_whitespace();
    let (Some(token), Some(duration_raw), None) = (fields.next(), fields.next(), fields.next())
    else {
        return (None, 0);
    };
    let Some(status) = RunStatus::from_token(token) else {
        return (None, 0);
    };
    let duration = duration_raw.parse().unwrap_or(0);
    (Some(status), duration)
}
