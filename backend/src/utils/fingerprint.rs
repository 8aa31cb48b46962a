//! User-agent classification into browser, OS and device class.
//!
//! Matching is ordered and first-match-wins: several vendors embed another
//! vendor's token in their own signature (Edge and Opera carry `Chrome`,
//! Chrome carries `Safari`, Android carries `Linux`, iOS carries
//! `like Mac OS X`), so specific tokens come before generic ones.

use serde::{Deserialize, Serialize};

use crate::models::device_session::DeviceType;

pub const UNKNOWN_BROWSER: &str = "Unknown Browser";
pub const UNKNOWN_OS: &str = "Unknown OS";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Fingerprint {
    pub browser: String,
    pub os: String,
    pub device_type: DeviceType,
}

impl Default for Fingerprint {
    fn default() -> Self {
        Self {
            browser: UNKNOWN_BROWSER.to_string(),
            os: UNKNOWN_OS.to_string(),
            device_type: DeviceType::Unknown,
        }
    }
}

const BROWSER_RULES: &[(&[&str], &str)] = &[
    (&["Firefox"], "Firefox"),
    (&["Edg"], "Microsoft Edge"),
    (&["OPR", "Opera"], "Opera"),
    (&["Chrome"], "Chrome"),
    (&["Safari"], "Safari"),
];

const OS_RULES: &[(&[&str], &str)] = &[
    (&["Windows NT 10"], "Windows 10/11"),
    (&["Windows"], "Windows"),
    (&["Android"], "Android"),
    (&["iPhone", "iPad"], "iOS"),
    (&["Mac OS X"], "macOS"),
    (&["Linux"], "Linux"),
];

fn first_match(raw: &str, rules: &[(&[&str], &'static str)]) -> Option<&'static str> {
    rules
        .iter()
        .find(|(tokens, _)| tokens.iter().any(|token| raw.contains(token)))
        .map(|(_, label)| *label)
}

pub fn detect_browser(raw: &str) -> &'static str {
    first_match(raw, BROWSER_RULES).unwrap_or(UNKNOWN_BROWSER)
}

pub fn detect_os(raw: &str) -> &'static str {
    first_match(raw, OS_RULES).unwrap_or(UNKNOWN_OS)
}

/// Tablet tokens win over mobile tokens, which win over desktop OS tokens.
pub fn detect_device_type(raw: &str) -> DeviceType {
    let ua = raw.to_lowercase();

    if ua.contains("ipad") || ua.contains("tablet") {
        return DeviceType::Tablet;
    }

    if ua.contains("mobile") || ua.contains("iphone") {
        return DeviceType::Mobile;
    }

    if ua.contains("windows")
        || ua.contains("mac os")
        || (ua.contains("linux") && !ua.contains("android"))
    {
        return DeviceType::Desktop;
    }

    DeviceType::Unknown
}

/// Never fails; unmatched input yields the unknown defaults.
pub fn parse_fingerprint(raw: &str) -> Fingerprint {
    Fingerprint {
        browser: detect_browser(raw).to_string(),
        os: detect_os(raw).to_string(),
        device_type: detect_device_type(raw),
    }
}
