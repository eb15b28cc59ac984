//! Channel namespacing.
//!
//! Maps logical event names to the channel names a backend actually sees and
//! back. A bus instance derives its prefix once at creation; these helpers
//! apply and strip it.

/// Build the backend channel name for an event under a prefix.
///
/// An empty prefix leaves the event name unchanged.
pub fn to_channel(prefix: &str, event: &str) -> String {
    if prefix.is_empty() {
        event.to_string()
    } else {
        format!("{prefix}:{event}")
    }
}

/// Recover the event name from a backend channel name.
///
/// Strips exactly `prefix.len() + 1` leading bytes when the prefix is
/// non-empty. No validation is performed; event names that embed the
/// separator ambiguously will not round-trip exactly.
pub fn from_channel(prefix: &str, channel: &str) -> String {
    if prefix.is_empty() {
        channel.to_string()
    } else {
        channel.get(prefix.len() + 1..).unwrap_or_default().to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_to_channel_with_prefix() {
        assert_eq!(to_channel("namedbus:jobs", "created"), "namedbus:jobs:created");
    }

    #[test]
    fn test_to_channel_empty_prefix() {
        assert_eq!(to_channel("", "created"), "created");
    }

    #[test]
    fn test_from_channel_with_prefix() {
        assert_eq!(from_channel("namedbus:jobs", "namedbus:jobs:created"), "created");
    }

    #[test]
    fn test_from_channel_empty_prefix() {
        assert_eq!(from_channel("", "created"), "created");
    }

    #[test]
    fn test_round_trip() {
        let prefix = "tenantnamedbus:orders";
        for event in ["msg", "order.shipped", "a"] {
            assert_eq!(from_channel(prefix, &to_channel(prefix, event)), event);
        }
    }

    #[test]
    fn test_from_channel_shorter_than_prefix() {
        // Not a channel this bus produced; stripping yields an empty event.
        assert_eq!(from_channel("namedbus:jobs", "short"), "");
    }
}
