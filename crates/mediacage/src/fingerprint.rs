//! Browser identity used on every outgoing request.
//!
//! Only Chromium-family browsers are generated so that the client hints are
//! always something a real browser would send alongside the User-Agent.

use std::fmt;

use rand::{Rng, SeedableRng, rngs::StdRng};
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, USER_AGENT};
use tracing::{debug, warn};

pub const SEC_CH_UA: &str = "sec-ch-ua";
pub const SEC_CH_UA_MOBILE: &str = "sec-ch-ua-mobile";
pub const SEC_CH_UA_PLATFORM: &str = "sec-ch-ua-platform";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Platform {
    Windows,
    MacOs,
    Linux,
    Android,
}

impl Platform {
    const ALL: [Platform; 4] = [
        Platform::Windows,
        Platform::MacOs,
        Platform::Linux,
        Platform::Android,
    ];

    /// The parenthesised system token of the User-Agent.
    fn ua_system(&self) -> &'static str {
        match self {
            Platform::Windows => "Windows NT 10.0; Win64; x64",
            Platform::MacOs => "Macintosh; Intel Mac OS X 10_15_7",
            Platform::Linux => "X11; Linux x86_64",
            Platform::Android => "Linux; Android 10; K",
        }
    }

    /// Value of `sec-ch-ua-platform`, without the quotes.
    pub fn client_hint(&self) -> &'static str {
        match self {
            Platform::Windows => "Windows",
            Platform::MacOs => "macOS",
            Platform::Linux => "Linux",
            Platform::Android => "Android",
        }
    }

    pub fn is_mobile(&self) -> bool {
        matches!(self, Platform::Android)
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.client_hint())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Browser {
    Chrome,
    Edge,
}

impl Browser {
    const ALL: [Browser; 2] = [Browser::Chrome, Browser::Edge];

    fn brand(&self) -> &'static str {
        match self {
            Browser::Chrome => "Google Chrome",
            Browser::Edge => "Microsoft Edge",
        }
    }
}

const CHROMIUM_MAJORS: [u32; 6] = [131, 132, 133, 134, 135, 136];

const LOCALES: [&str; 12] = [
    "en-US", "en-GB", "en-CA", "en-AU", "de-DE", "fr-FR", "es-ES", "it-IT", "nl-NL", "pt-BR",
    "pl-PL", "sv-SE",
];

/// A self-consistent browser identity. Created once per session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FingerprintProfile {
    pub user_agent: String,
    /// Client hints in the order a browser sends them.
    pub client_hints: Vec<(&'static str, String)>,
    pub accept_language: String,
    pub platform: Platform,
    pub browser: Browser,
}

impl FingerprintProfile {
    /// Generates a random profile, or a reproducible one when `seed` is given.
    pub fn generate(seed: Option<u64>) -> Self {
        let mut rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_os_rng(),
        };

        let platform = Platform::ALL[rng.random_range(0..Platform::ALL.len())];
        let browser = Browser::ALL[rng.random_range(0..Browser::ALL.len())];
        let major = CHROMIUM_MAJORS[rng.random_range(0..CHROMIUM_MAJORS.len())];
        let locale = LOCALES[rng.random_range(0..LOCALES.len())];

        let profile = Self::build(platform, browser, major, locale);
        debug!(
            platform = %profile.platform,
            browser = ?profile.browser,
            user_agent = %profile.user_agent,
            accept_language = %profile.accept_language,
            "Generated browser fingerprint"
        );
        profile
    }

    fn build(platform: Platform, browser: Browser, major: u32, locale: &str) -> Self {
        let safari = if platform.is_mobile() {
            "Mobile Safari/537.36"
        } else {
            "Safari/537.36"
        };
        let mut user_agent = format!(
            "Mozilla/5.0 ({}) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/{major}.0.0.0 {safari}",
            platform.ua_system()
        );
        if browser == Browser::Edge {
            user_agent.push_str(&format!(" Edg/{major}.0.0.0"));
        }

        let sec_ch_ua = format!(
            r#""{}";v="{major}", "Chromium";v="{major}", "Not.A/Brand";v="99""#,
            browser.brand()
        );
        let mobile = if platform.is_mobile() { "?1" } else { "?0" };

        let client_hints = vec![
            (SEC_CH_UA, sec_ch_ua),
            (SEC_CH_UA_MOBILE, mobile.to_string()),
            (SEC_CH_UA_PLATFORM, format!("\"{}\"", platform.client_hint())),
        ];

        let short = locale.split('-').next().unwrap_or(locale);
        let accept_language = format!("{locale},{short};q=0.9");

        Self {
            user_agent,
            client_hints,
            accept_language,
            platform,
            browser,
        }
    }

    /// User-Agent plus client hints, ready to be merged into a request.
    pub fn headers(&self) -> HeaderMap {
        let mut headers = HeaderMap::new();
        let pairs = std::iter::once(("user-agent", self.user_agent.as_str()))
            .chain(self.client_hints.iter().map(|(k, v)| (*k, v.as_str())));

        for (name, value) in pairs {
            match (
                HeaderName::from_bytes(name.as_bytes()),
                HeaderValue::from_str(value),
            ) {
                (Ok(name), Ok(value)) => {
                    headers.insert(name, value);
                }
                _ => warn!("Skipping invalid fingerprint header {}", name),
            }
        }
        headers
    }

    pub fn client_hint(&self, name: &str) -> Option<&str> {
        self.client_hints
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}
