//! Pure rule evaluation: effective settings and trigger matching.
use crate::{
    config::{RateLimit, Rule, TriggerMode},
    error::KickerError,
};

/// Returns the poll interval in effect for a rule.
pub fn effective_poll_interval(rule: &Rule, default_poll_interval: f64) -> f64 {
    rule.poll_interval_seconds.unwrap_or(default_poll_interval)
}

/// Returns the command timeout in effect for a rule. Without an explicit
/// override the timeout is 90% of the poll interval, so a slow check cannot
/// eat its own next slot.
pub fn effective_timeout(rule: &Rule, default_poll_interval: f64) -> f64 {
    match rule.timeout_seconds {
        Some(timeout) => timeout,
        None => effective_poll_interval(rule, default_poll_interval) * 0.9,
    }
}

/// Returns the action rate limit in effect for a rule. The default policy is
/// at most one action per poll interval.
pub fn effective_rate_limit(rule: &Rule, default_poll_interval: f64) -> RateLimit {
    rule.rate_limit.unwrap_or(RateLimit {
        count: 1,
        window_seconds: effective_poll_interval(rule, default_poll_interval),
    })
}

/// Decides whether a rule's trigger fires for the observed exit codes.
/// Transition modes never fire on the very first observation.
pub fn trigger_matches(rule: &Rule, previous_rc: Option<i32>, current_rc: i32) -> bool {
    match rule.trigger {
        TriggerMode::OnNonzero => current_rc != 0,
        TriggerMode::OnZero => current_rc == 0,
        TriggerMode::OnTransitionFailToPass => {
            matches!(previous_rc, Some(previous) if previous != 0) && current_rc == 0
        }
        TriggerMode::OnTransitionPassToFail => {
            previous_rc == Some(0) && current_rc != 0
        }
        TriggerMode::OnCode(code) => current_rc == code,
    }
}

/// Parses a `N/S` rate-limit parameter into count and window seconds.
pub fn parse_rate_limit(text: &str) -> Result<RateLimit, KickerError> {
    let Some((count_raw, seconds_raw)) = text.trim().split_once('/') else {
        return Err(KickerError::Parameter(
            "rate limit must be in number/seconds format".to_string(),
        ));
    };

    let count: i64 = count_raw.parse().map_err(|_| {
        KickerError::Parameter("rate limit must be in number/seconds format".to_string())
    })?;
    let window_seconds: f64 = seconds_raw.parse().map_err(|_| {
        KickerError::Parameter("rate limit must be in number/seconds format".to_string())
    })?;

    if count <= 0 {
        return Err(KickerError::Parameter(
            "rate limit count must be > 0".to_string(),
        ));
    }
    if window_seconds <= 0.0 {
        return Err(KickerError::Parameter(
            "rate limit seconds must be > 0".to_string(),
        ));
    }

    Ok(RateLimit {
        count: count as u32,
        window_seconds,
    })
}
