//! Client configuration
//!
//! All knobs are construction-time; embedders that keep their own config
//! files can deserialize this directly.

use serde::{Deserialize, Serialize};
use std::ops::RangeInclusive;
use std::time::Duration;

pub const DEFAULT_BASE_URL: &str = "https://chat.openai.com";

const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) \
     AppleWebKit/537.36 (KHTML, like Gecko) Chrome/88.0.4324.146 Safari/537.36";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Base origin of the backend. The cookie store is bound to this origin
    /// for the lifetime of the client.
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// User-Agent sent on every request.
    #[serde(default = "default_user_agent")]
    pub user_agent: String,

    /// Connect timeout for the underlying HTTP client.
    #[serde(default = "default_connect_timeout", with = "duration_secs")]
    pub connect_timeout: Duration,

    /// Overall per-request deadline. Streamed conversation reads count
    /// against this too, so keep it generous.
    #[serde(default = "default_request_timeout", with = "duration_secs")]
    pub request_timeout: Duration,

    /// Page size for history retrieval.
    #[serde(default = "default_page_limit")]
    pub page_limit: u32,

    /// How many no-progress pages the retrieval engine tolerates before
    /// returning what it has.
    #[serde(default = "default_max_failed_attempts")]
    pub max_failed_attempts: u32,

    /// Randomized backoff between history pages, in milliseconds. The wide
    /// default range matches the backend's rate-limit tolerance.
    #[serde(default = "default_backoff_ms")]
    pub backoff_ms: RangeInclusive<u64>,

    /// `timezone_offset_min` value attached to outbound messages.
    #[serde(default)]
    pub timezone_offset_min: i32,
}

fn default_base_url() -> String {
    DEFAULT_BASE_URL.to_string()
}

fn default_user_agent() -> String {
    DEFAULT_USER_AGENT.to_string()
}

fn default_connect_timeout() -> Duration {
    Duration::from_secs(30)
}

fn default_request_timeout() -> Duration {
    Duration::from_secs(600)
}

fn default_page_limit() -> u32 {
    100
}

fn default_max_failed_attempts() -> u32 {
    5
}

fn default_backoff_ms() -> RangeInclusive<u64> {
    1000..=10000
}

impl Default for Config {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            user_agent: default_user_agent(),
            connect_timeout: default_connect_timeout(),
            request_timeout: default_request_timeout(),
            page_limit: default_page_limit(),
            max_failed_attempts: default_max_failed_attempts(),
            backoff_ms: default_backoff_ms(),
            timezone_offset_min: 0,
        }
    }
}

mod duration_secs {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_secs())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        Ok(Duration::from_secs(u64::deserialize(d)?))
    }
}
