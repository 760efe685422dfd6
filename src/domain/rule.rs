use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::IpAddr;

use super::null_default;

const OPERATING_SYSTEMS: &[&str] = &[
    "linux",
    "macos",
    "windows",
    "chrome_os",
    "ios",
    "android",
    "blackberry",
    "windows_phone",
];

const BROWSERS: &[&str] = &[
    "chrome",
    "chrome_mobile",
    "safari",
    "safari_mobile",
    "firefox",
    "firefox_mobile",
    "edge",
    "internet_explorer",
    "internet_explorer_mobile",
    "opera",
    "opera_mobile",
];

/// Criterion a rule constrains.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RuleType {
    /// Client operating system
    OperatingSystem,
    /// Client browser family
    Browser,
    /// Client geographic location
    Location,
    /// Networks a client must come from
    WhitelistNetworks,
    /// Networks a client must not come from
    BlacklistNetworks,
}

impl RuleType {
    pub const ALL: [RuleType; 5] = [
        RuleType::OperatingSystem,
        RuleType::Browser,
        RuleType::Location,
        RuleType::WhitelistNetworks,
        RuleType::BlacklistNetworks,
    ];

    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "operating_system" => Some(RuleType::OperatingSystem),
            "browser" => Some(RuleType::Browser),
            "location" => Some(RuleType::Location),
            "whitelist_networks" => Some(RuleType::WhitelistNetworks),
            "blacklist_networks" => Some(RuleType::BlacklistNetworks),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            RuleType::OperatingSystem => "operating_system",
            RuleType::Browser => "browser",
            RuleType::Location => "location",
            RuleType::WhitelistNetworks => "whitelist_networks",
            RuleType::BlacklistNetworks => "blacklist_networks",
        }
    }

    /// Check a single rule value against this criterion.
    fn check_value(&self, value: &str) -> Result<(), String> {
        if value.trim().is_empty() {
            return Err("Rule values cannot be empty".to_string());
        }

        let ok = match self {
            RuleType::OperatingSystem => OPERATING_SYSTEMS.contains(&value),
            RuleType::Browser => BROWSERS.contains(&value),
            RuleType::Location => is_location(value),
            RuleType::WhitelistNetworks | RuleType::BlacklistNetworks => is_cidr(value),
        };

        if ok {
            Ok(())
        } else {
            Err(format!("Invalid {} value: {}", self.as_str(), value))
        }
    }
}

impl fmt::Display for RuleType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A stored constraint for one criterion.
///
/// The type is kept as the raw string so that unknown criteria reach the
/// validator instead of failing at decode time.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rule {
    #[serde(rename = "type", default, deserialize_with = "null_default")]
    pub rule_type: String,

    #[serde(default, deserialize_with = "null_default")]
    pub disable: bool,

    #[serde(default, deserialize_with = "null_default")]
    pub values: Vec<String>,
}

impl Rule {
    pub fn new(rule_type: RuleType, values: Vec<String>) -> Self {
        Rule {
            rule_type: rule_type.as_str().to_string(),
            disable: false,
            values,
        }
    }

    /// Recognised criterion, if any.
    pub fn kind(&self) -> Option<RuleType> {
        RuleType::from_str(&self.rule_type)
    }

    /// Check that the type is known and every value fits it.
    ///
    /// The criterion key a rule is stored under is free-form.
    pub fn check_shape(&self) -> Result<(), String> {
        let Some(kind) = self.kind() else {
            return Err(format!("Unknown rule type: {:?}", self.rule_type));
        };

        for value in &self.values {
            kind.check_value(value)?;
        }

        Ok(())
    }
}

/// `CC` or `CC_REGION`, upper-case alphanumeric.
fn is_location(value: &str) -> bool {
    let mut parts = value.splitn(2, '_');
    let country = parts.next().unwrap_or_default();

    if country.len() != 2 || !country.chars().all(|c| c.is_ascii_uppercase()) {
        return false;
    }

    match parts.next() {
        None => true,
        Some(region) => {
            !region.is_empty()
                && region
                    .chars()
                    .all(|c| c.is_ascii_uppercase() || c.is_ascii_digit())
        }
    }
}

fn is_cidr(value: &str) -> bool {
    let Some((addr, prefix)) = value.split_once('/') else {
        return false;
    };

    let Ok(addr) = addr.parse::<IpAddr>() else {
        return false;
    };

    let Ok(prefix) = prefix.parse::<u8>() else {
        return false;
    };

    match addr {
        IpAddr::V4(_) => prefix <= 32,
        IpAddr::V6(_) => prefix <= 128,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn values(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_rule_type_round_trip() {
        for kind in RuleType::ALL {
            assert_eq!(RuleType::from_str(kind.as_str()), Some(kind));
        }
        assert_eq!(RuleType::from_str("time_of_day"), None);
    }

    #[test]
    fn test_valid_rules() {
        let rule = Rule::new(RuleType::WhitelistNetworks, values(&["10.0.0.0/8", "fd00::/8"]));
        assert!(rule.check_shape().is_ok());

        let rule = Rule::new(RuleType::OperatingSystem, values(&["linux", "macos"]));
        assert!(rule.check_shape().is_ok());

        let rule = Rule::new(RuleType::Location, values(&["US", "US_CA", "DE_BY"]));
        assert!(rule.check_shape().is_ok());

        let rule = Rule::new(RuleType::Browser, vec![]);
        assert!(rule.check_shape().is_ok());
    }

    #[test]
    fn test_unknown_type() {
        let rule = Rule {
            rule_type: "time_of_day".to_string(),
            ..Default::default()
        };
        let err = rule.check_shape().unwrap_err();
        assert!(err.contains("Unknown rule type"));
    }

    #[test]
    fn test_null_fields_decode_as_empty() {
        let rule: Rule =
            serde_json::from_str(r#"{"type": "browser", "disable": null, "values": null}"#)
                .unwrap();

        assert_eq!(rule.rule_type, "browser");
        assert!(!rule.disable);
        assert!(rule.values.is_empty());
        assert!(rule.check_shape().is_ok());

        let rule: Rule = serde_json::from_str(r#"{"type": null}"#).unwrap();
        assert_eq!(rule, Rule::default());
    }

    #[test]
    fn test_bad_values() {
        let rule = Rule::new(RuleType::BlacklistNetworks, values(&["10.0.0.0/33"]));
        assert!(rule.check_shape().is_err());

        let rule = Rule::new(RuleType::WhitelistNetworks, values(&["10.0.0.1"]));
        assert!(rule.check_shape().is_err());

        let rule = Rule::new(RuleType::OperatingSystem, values(&["beos"]));
        assert!(rule.check_shape().is_err());

        let rule = Rule::new(RuleType::Location, values(&["usa"]));
        assert!(rule.check_shape().is_err());

        let rule = Rule::new(RuleType::Browser, values(&[" "]));
        assert!(rule.check_shape().is_err());
    }

    #[test]
    fn test_disabled_rule_still_checked() {
        let rule = Rule {
            rule_type: "browser".to_string(),
            disable: true,
            values: values(&["netscape"]),
        };
        assert!(rule.check_shape().is_err());
    }
}
