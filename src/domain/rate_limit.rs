use std::fmt;
use std::net::IpAddr;
use time::{Duration, OffsetDateTime};

/// The key a send window is tracked under.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ClientIdentity(String);

impl ClientIdentity {
    #[must_use]
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    #[must_use]
    pub fn from_ip(ip: IpAddr) -> Self {
        Self(format!("ip:{ip}"))
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ClientIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Returns true if a new send is allowed given the previous send time.
///
/// A send is denied while `now - last_sent_at < window`.
#[must_use]
pub fn rate_limit(last_sent_at: Option<OffsetDateTime>, now: OffsetDateTime, window: Duration) -> bool {
    last_sent_at.is_none_or(|last| now - last >= window)
}

/// Time left until the identity may send again, or `None` if it may send now.
#[must_use]
pub fn retry_after(last_sent_at: Option<OffsetDateTime>, now: OffsetDateTime, window: Duration) -> Option<Duration> {
    let last = last_sent_at?;
    let elapsed = now - last;
    (elapsed < window).then(|| window - elapsed)
}

/// Rounds a wait up to whole seconds, never returning zero for a pending wait.
#[must_use]
pub fn whole_seconds(wait: Duration) -> u64 {
    let millis = u64::try_from(wait.whole_milliseconds().max(0)).unwrap_or(u64::MAX);
    millis.div_ceil(1000).max(1)
}
