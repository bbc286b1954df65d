// SPDX-License-Identifier: MIT

//! Health probe configuration for a supervised service.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Consecutive probe failures before `onFail` fires, when a probe carries no
/// `onFail` block (spec.md §4.E: "default 5 if `onFail` absent").
pub const DEFAULT_FAIL_THRESHOLD: u32 = 5;

/// How the supervisor checks that a running child is actually healthy,
/// beyond "the process hasn't exited".
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Probe {
    Http {
        url: String,
        #[serde(default, with = "duration_fmt::option")]
        delay: Option<Duration>,
        #[serde(with = "duration_fmt")]
        interval: Duration,
        #[serde(default, rename = "onFail")]
        on_fail: Option<OnFail>,
    },
    Tcp {
        host: String,
        #[serde(default, with = "duration_fmt::option")]
        delay: Option<Duration>,
        #[serde(with = "duration_fmt")]
        interval: Duration,
        #[serde(default, rename = "onFail")]
        on_fail: Option<OnFail>,
    },
}

impl Probe {
    pub fn delay(&self) -> Option<Duration> {
        match self {
            Probe::Http { delay, .. } | Probe::Tcp { delay, .. } => *delay,
        }
    }

    pub fn interval(&self) -> Duration {
        match self {
            Probe::Http { interval, .. } | Probe::Tcp { interval, .. } => *interval,
        }
    }

    pub fn on_fail(&self) -> Option<&OnFail> {
        match self {
            Probe::Http { on_fail, .. } | Probe::Tcp { on_fail, .. } => on_fail.as_ref(),
        }
    }

    /// Consecutive failures required to trigger `onFail`: `onFail.times` when
    /// present, else [`DEFAULT_FAIL_THRESHOLD`].
    pub fn fail_threshold(&self) -> u32 {
        self.on_fail().map_or(DEFAULT_FAIL_THRESHOLD, |f| f.times)
    }

    pub fn validate(&self) -> Result<(), crate::ZalletError> {
        match self {
            Probe::Http { url, .. } => {
                if url.trim().is_empty() {
                    return Err(crate::ZalletError::Validation(
                        "probe: http url must not be empty".into(),
                    ));
                }
            }
            Probe::Tcp { host, .. } => {
                if host.trim().is_empty() {
                    return Err(crate::ZalletError::Validation(
                        "probe: tcp host must not be empty".into(),
                    ));
                }
            }
        }
        if self.interval().is_zero() {
            return Err(crate::ZalletError::Validation(
                "probe: interval must be greater than zero".into(),
            ));
        }
        if let Some(on_fail) = self.on_fail() {
            if on_fail.times == 0 {
                return Err(crate::ZalletError::Validation(
                    "probe: onFail.times must be greater than zero".into(),
                ));
            }
            if on_fail.action.trim().is_empty() {
                return Err(crate::ZalletError::Validation(
                    "probe: onFail.action must not be empty".into(),
                ));
            }
        }
        Ok(())
    }
}

/// What to do once a probe has failed `times` consecutive times: run `action`
/// as a shell command (spec.md §3 `Probe.onFail`; `original_source`'s
/// `ProbeFail.Action` is the same free-form shell string, run via
/// `reexec.ExecCommand` in `internal/app/probe.go`). The child is always
/// killed and restarted once the threshold is reached; `action` is an
/// additional side-effecting script, not a choice between outcomes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub struct OnFail {
    pub times: u32,
    pub action: String,
}

/// `serde(with = "duration_fmt")` for human-readable durations (`"30s"`,
/// `"5m"`, `"1h30m"`, `"500ms"`), formatted back out in whichever unit
/// divides evenly.
pub(crate) mod duration_fmt {
    use super::*;
    use serde::{Deserializer, Serializer};

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&format_duration(*d))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        let raw = String::deserialize(d)?;
        parse_duration(&raw).map_err(serde::de::Error::custom)
    }

    pub mod option {
        use super::*;

        pub fn serialize<S: Serializer>(d: &Option<Duration>, s: S) -> Result<S::Ok, S::Error> {
            match d {
                Some(d) => s.serialize_some(&format_duration(*d)),
                None => s.serialize_none(),
            }
        }

        pub fn deserialize<'de, D: Deserializer<'de>>(
            d: D,
        ) -> Result<Option<Duration>, D::Error> {
            let raw: Option<String> = Option::deserialize(d)?;
            raw.map(|s| parse_duration(&s).map_err(serde::de::Error::custom))
                .transpose()
        }
    }
}

/// Parses strings like `"30s"`, `"5m"`, `"1h"`, `"500ms"`. A bare integer is
/// treated as whole seconds.
pub fn parse_duration(raw: &str) -> Result<Duration, String> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Err("empty duration".into());
    }
    let split_at = raw
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(raw.len());
    let (digits, unit) = raw.split_at(split_at);
    let value: u64 = digits
        .parse()
        .map_err(|_| format!("invalid duration {raw:?}: no leading number"))?;
    let duration = match unit {
        "" | "s" => Duration::from_secs(value),
        "ms" => Duration::from_millis(value),
        "m" => Duration::from_secs(value * 60),
        "h" => Duration::from_secs(value * 3600),
        other => return Err(format!("invalid duration unit {other:?} in {raw:?}")),
    };
    Ok(duration)
}

fn format_duration(d: Duration) -> String {
    let ms = d.as_millis();
    if ms % 3_600_000 == 0 {
        format!("{}h", ms / 3_600_000)
    } else if ms % 60_000 == 0 {
        format!("{}m", ms / 60_000)
    } else if ms % 1_000 == 0 {
        format!("{}s", ms / 1_000)
    } else {
        format!("{ms}ms")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[yare::parameterized(
        seconds = { "30s", Duration::from_secs(30) },
        minutes = { "5m", Duration::from_secs(300) },
        hours = { "1h", Duration::from_secs(3600) },
        millis = { "500ms", Duration::from_millis(500) },
        bare_number = { "45", Duration::from_secs(45) },
    )]
    fn parses_duration_strings(raw: &str, expected: Duration) {
        assert_eq!(parse_duration(raw).unwrap(), expected);
    }

    #[test]
    fn rejects_malformed_duration() {
        assert!(parse_duration("soon").is_err());
        assert!(parse_duration("").is_err());
    }

    #[test]
    fn validate_rejects_empty_http_url() {
        let probe = Probe::Http {
            url: "  ".into(),
            delay: None,
            interval: Duration::from_secs(1),
            on_fail: None,
        };
        assert!(probe.validate().is_err());
    }

    #[test]
    fn validate_rejects_zero_interval() {
        let probe = Probe::Tcp {
            host: "localhost:8080".into(),
            delay: None,
            interval: Duration::ZERO,
            on_fail: None,
        };
        assert!(probe.validate().is_err());
    }

    #[test]
    fn validate_rejects_zero_times_on_fail() {
        let probe = Probe::Tcp {
            host: "127.0.0.1:1".into(),
            delay: None,
            interval: Duration::from_secs(1),
            on_fail: Some(OnFail { times: 0, action: "echo hi".into() }),
        };
        assert!(probe.validate().is_err());
    }

    #[test]
    fn validate_rejects_empty_on_fail_action() {
        let probe = Probe::Tcp {
            host: "127.0.0.1:1".into(),
            delay: None,
            interval: Duration::from_secs(1),
            on_fail: Some(OnFail { times: 3, action: "  ".into() }),
        };
        assert!(probe.validate().is_err());
    }

    #[test]
    fn fail_threshold_defaults_to_five_without_on_fail() {
        let probe = Probe::Tcp {
            host: "127.0.0.1:1".into(),
            delay: None,
            interval: Duration::from_secs(1),
            on_fail: None,
        };
        assert_eq!(probe.fail_threshold(), 5);
    }
}
