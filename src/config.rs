//! Rule configuration model and on-disk store.
//!
//! The config file lives at `~/.config/kicker/config.yaml` but its codec is
//! strict JSON. Rules are kept sorted by ascending id on disk.
use std::{
    collections::BTreeSet,
    fmt, fs,
    path::{Path, PathBuf},
};

use serde::{Deserialize, Serialize};

use crate::{error::KickerError, paths};

/// Condition evaluated against check exit codes to decide whether a rule's
/// action should fire.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TriggerMode {
    /// Fire whenever the check exits nonzero.
    OnNonzero,
    /// Fire whenever the check exits zero.
    OnZero,
    /// Fire when the check goes from nonzero to zero.
    OnTransitionFailToPass,
    /// Fire when the check goes from zero to nonzero.
    OnTransitionPassToFail,
    /// Fire whenever the check exits with this specific code.
    OnCode(i32),
}

impl TriggerMode {
    /// Returns the wire tag used in the config file.
    pub fn wire_name(&self) -> &'static str {
        match self {
            TriggerMode::OnNonzero => "on_nonzero",
            TriggerMode::OnZero => "on_zero",
            TriggerMode::OnTransitionFailToPass => "on_transition_fail_to_pass",
            TriggerMode::OnTransitionPassToFail => "on_transition_pass_to_fail",
            TriggerMode::OnCode(_) => "on_code_n",
        }
    }

    /// Returns the payload of `on_code_n`, if any.
    pub fn code(&self) -> Option<i32> {
        match self {
            TriggerMode::OnCode(code) => Some(*code),
            _ => None,
        }
    }

    fn from_wire(mode: &str, code: Option<i32>) -> Result<Self, KickerError> {
        let trigger = match mode {
            "on_nonzero" => TriggerMode::OnNonzero,
            "on_zero" => TriggerMode::OnZero,
            "on_transition_fail_to_pass" => TriggerMode::OnTransitionFailToPass,
            "on_transition_pass_to_fail" => TriggerMode::OnTransitionPassToFail,
            "on_code_n" => {
                return code.map(TriggerMode::OnCode).ok_or_else(|| {
                    KickerError::RuleInvalid(
                        "trigger_code is required for on_code_n".to_string(),
                    )
                });
            }
            other => {
                return Err(KickerError::RuleInvalid(format!(
                    "Unknown trigger mode: {other}"
                )));
            }
        };

        if code.is_some() {
            return Err(KickerError::RuleInvalid(
                "trigger_code only allowed for on_code_n".to_string(),
            ));
        }
        Ok(trigger)
    }
}

impl fmt::Display for TriggerMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.wire_name())
    }
}

/// Sliding-window action limit: at most `count` actions per
/// `window_seconds`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RateLimit {
    /// Maximum number of actions inside the window.
    pub count: u32,
    /// Window length in seconds.
    pub window_seconds: f64,
}

/// A single check/action policy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawRule", into = "RawRule")]
pub struct Rule {
    /// Unique positive id within the config.
    pub id: u32,
    /// Check command, shell-interpreted.
    pub check: String,
    /// Action command, shell-interpreted.
    pub action: String,
    /// Trigger condition over the check's exit codes.
    pub trigger: TriggerMode,
    /// Remove the rule after its first executed action.
    pub once: bool,
    /// Per-rule poll interval override.
    pub poll_interval_seconds: Option<f64>,
    /// Per-rule action rate limit override.
    pub rate_limit: Option<RateLimit>,
    /// Per-rule command timeout override.
    pub timeout_seconds: Option<f64>,
}

impl Rule {
    /// Checks the rule's invariants.
    pub fn validate(&self) -> Result<(), KickerError> {
        if self.id == 0 {
            return Err(KickerError::RuleInvalid(
                "Rule id must be positive".to_string(),
            ));
        }
        if self.check.trim().is_empty() {
            return Err(KickerError::RuleInvalid(
                "Rule check command must not be empty".to_string(),
            ));
        }
        if self.action.trim().is_empty() {
            return Err(KickerError::RuleInvalid(
                "Rule action command must not be empty".to_string(),
            ));
        }
        if let Some(interval) = self.poll_interval_seconds
            && interval <= 0.0
        {
            return Err(KickerError::RuleInvalid(
                "poll_interval_seconds must be > 0".to_string(),
            ));
        }
        if let Some(timeout) = self.timeout_seconds
            && timeout <= 0.0
        {
            return Err(KickerError::RuleInvalid(
                "timeout_seconds must be > 0".to_string(),
            ));
        }
        if let Some(limit) = self.rate_limit {
            if limit.count == 0 {
                return Err(KickerError::RuleInvalid(
                    "rate_limit_count must be > 0".to_string(),
                ));
            }
            if limit.window_seconds <= 0.0 {
                return Err(KickerError::RuleInvalid(
                    "rate_limit_seconds must be > 0".to_string(),
                ));
            }
        }
        Ok(())
    }
}

/// Flat wire representation of [`Rule`]. The trigger is split into a string
/// tag plus an optional `trigger_code` so existing config files keep their
/// layout.
#[derive(Serialize, Deserialize)]
struct RawRule {
    id: u32,
    check: String,
    action: String,
    trigger_mode: String,
    #[serde(default)]
    once: bool,
    #[serde(default)]
    trigger_code: Option<i32>,
    #[serde(default)]
    poll_interval_seconds: Option<f64>,
    #[serde(default)]
    rate_limit_count: Option<u32>,
    #[serde(default)]
    rate_limit_seconds: Option<f64>,
    #[serde(default)]
    timeout_seconds: Option<f64>,
}

impl TryFrom<RawRule> for Rule {
    type Error = KickerError;

    fn try_from(raw: RawRule) -> Result<Self, Self::Error> {
        let trigger = TriggerMode::from_wire(&raw.trigger_mode, raw.trigger_code)?;
        let rate_limit = match (raw.rate_limit_count, raw.rate_limit_seconds) {
            (Some(count), Some(window_seconds)) => Some(RateLimit {
                count,
                window_seconds,
            }),
            (None, None) => None,
            _ => {
                return Err(KickerError::RuleInvalid(
                    "rate_limit_count and rate_limit_seconds must be set together"
                        .to_string(),
                ));
            }
        };

        let rule = Rule {
            id: raw.id,
            check: raw.check,
            action: raw.action,
            trigger,
            once: raw.once,
            poll_interval_seconds: raw.poll_interval_seconds,
            rate_limit,
            timeout_seconds: raw.timeout_seconds,
        };
        rule.validate()?;
        Ok(rule)
    }
}

impl From<Rule> for RawRule {
    fn from(rule: Rule) -> Self {
        RawRule {
            id: rule.id,
            check: rule.check,
            action: rule.action,
            trigger_mode: rule.trigger.wire_name().to_string(),
            once: rule.once,
            trigger_code: rule.trigger.code(),
            poll_interval_seconds: rule.poll_interval_seconds,
            rate_limit_count: rule.rate_limit.map(|limit| limit.count),
            rate_limit_seconds: rule.rate_limit.map(|limit| limit.window_seconds),
            timeout_seconds: rule.timeout_seconds,
        }
    }
}

fn default_version() -> u32 {
    1
}

fn default_poll_interval() -> f64 {
    60.0
}

/// Global daemon settings shared by all rules.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GlobalSettings {
    /// Poll interval applied to rules without their own override.
    #[serde(default = "default_poll_interval")]
    pub default_poll_interval_seconds: f64,
}

impl Default for GlobalSettings {
    fn default() -> Self {
        GlobalSettings {
            default_poll_interval_seconds: default_poll_interval(),
        }
    }
}

/// Represents the structure of the configuration file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuleConfig {
    /// Configuration schema version; only `1` is supported.
    #[serde(default = "default_version")]
    pub version: u32,
    /// Global settings.
    #[serde(default, rename = "global")]
    pub globals: GlobalSettings,
    /// Rules, ordered by ascending id on disk.
    #[serde(default)]
    pub rules: Vec<Rule>,
}

impl RuleConfig {
    /// Returns a config with no rules and default globals.
    pub fn empty() -> Self {
        RuleConfig {
            version: 1,
            globals: GlobalSettings::default(),
            rules: Vec::new(),
        }
    }

    /// Checks config-level invariants.
    pub fn validate(&self) -> Result<(), KickerError> {
        if self.version != 1 {
            return Err(KickerError::ConfigInvalid(format!(
                "Unsupported config version: {}",
                self.version
            )));
        }
        if self.globals.default_poll_interval_seconds <= 0.0 {
            return Err(KickerError::ConfigInvalid(
                "default_poll_interval_seconds must be > 0".to_string(),
            ));
        }
        let mut seen = BTreeSet::new();
        for rule in &self.rules {
            if !seen.insert(rule.id) {
                return Err(KickerError::ConfigInvalid(
                    "Rule ids must be unique".to_string(),
                ));
            }
        }
        Ok(())
    }

    /// Returns the next free rule id.
    pub fn next_rule_id(&self) -> u32 {
        self.rules.iter().map(|rule| rule.id).max().unwrap_or(0) + 1
    }
}

/// Loads and persists the rule configuration file.
pub struct ConfigStore {
    path: PathBuf,
}

impl ConfigStore {
    /// Creates a store over an explicit file path.
    pub fn new(path: PathBuf) -> Self {
        ConfigStore { path }
    }

    /// Creates a store over `~/.config/kicker/config.yaml`.
    pub fn default_location() -> Self {
        ConfigStore::new(paths::config_file())
    }

    /// Returns the backing file path.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Loads the config, returning an empty one when the file is absent or
    /// blank.
    pub fn load(&self) -> Result<RuleConfig, KickerError> {
        if !self.path.exists() {
            return Ok(RuleConfig::empty());
        }
        let raw = fs::read_to_string(&self.path).map_err(KickerError::ConfigRead)?;
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Ok(RuleConfig::empty());
        }
        let config: RuleConfig =
            serde_json::from_str(trimmed).map_err(KickerError::ConfigParse)?;
        config.validate()?;
        Ok(config)
    }

    /// Writes the config as pretty JSON with a trailing newline.
    pub fn save(&self, config: &RuleConfig) -> Result<(), KickerError> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).map_err(KickerError::ConfigWrite)?;
        }
        let payload = serde_json::to_string_pretty(config)
            .map_err(|err| KickerError::ConfigWrite(std::io::Error::other(err)))?;
        fs::write(&self.path, payload + "\n").map_err(KickerError::ConfigWrite)
    }

    /// Validates and appends a rule, keeping the file sorted by id.
    pub fn add_rule(&self, rule: Rule) -> Result<Rule, KickerError> {
        rule.validate()?;
        let mut config = self.load()?;
        if config.rules.iter().any(|existing| existing.id == rule.id) {
            return Err(KickerError::ConfigInvalid(format!(
                "Rule id already exists: {}",
                rule.id
            )));
        }
        config.rules.push(rule.clone());
        config.rules.sort_by_key(|item| item.id);
        self.save(&config)?;
        Ok(rule)
    }

    /// Removes a rule by id; returns whether anything was removed.
    pub fn remove_rule(&self, rule_id: u32) -> Result<bool, KickerError> {
        let mut config = self.load()?;
        let before = config.rules.len();
        config.rules.retain(|rule| rule.id != rule_id);
        if config.rules.len() == before {
            return Ok(false);
        }
        self.save(&config)?;
        Ok(true)
    }
}
