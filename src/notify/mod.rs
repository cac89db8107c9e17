//! Push notification delivery.
//!
//! Delivery is fire-and-forget from the point of view of the alert logic:
//! one attempt per alert, no retries. Callers log failures and move on.

mod line;

use anyhow::{anyhow, Result};
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::debounce::AlertCondition;

pub(crate) use line::parse_endpoint;
pub use line::{LineNotifier, DEFAULT_NOTIFY_ENDPOINT, DEFAULT_NOTIFY_TIMEOUT_MS};

pub const SITTING_ALERT_MESSAGE: &str =
    "Alert: A person has been detected sitting for over 5 minutes!";
pub const FALLING_ALERT_MESSAGE: &str =
    "Alert: A person has been detected falling for over 1 minute!";
pub const TEST_MESSAGE: &str = "This is a test notification.";

/// Fixed message text for an alert condition.
pub fn alert_message(condition: AlertCondition) -> &'static str {
    match condition {
        AlertCondition::Sitting => SITTING_ALERT_MESSAGE,
        AlertCondition::Falling => FALLING_ALERT_MESSAGE,
    }
}

/// Bearer token for the notification service.
///
/// Held in process memory only and wiped on drop. `Debug` never prints it.
#[derive(Clone, Default, PartialEq, Eq, Zeroize, ZeroizeOnDrop)]
pub struct NotifyToken(String);

impl NotifyToken {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into().trim().to_string())
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Debug for NotifyToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.is_empty() {
            f.write_str("NotifyToken(<unset>)")
        } else {
            f.write_str("NotifyToken(<redacted>)")
        }
    }
}

/// Notification transport.
pub trait Notifier: Send {
    fn name(&self) -> &'static str;

    /// Make one delivery attempt.
    fn notify(&self, message: &str, token: &NotifyToken) -> Result<()>;
}

/// Send the fixed test message. Refuses to send without a token.
pub fn send_test_notification(notifier: &dyn Notifier, token: &NotifyToken) -> Result<()> {
    if token.is_empty() {
        return Err(anyhow!("notify token not set"));
    }
    notifier.notify(TEST_MESSAGE, token)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[derive(Default)]
    struct Recording {
        sent: Mutex<Vec<String>>,
    }

    impl Notifier for Recording {
        fn name(&self) -> &'static str {
            "recording"
        }

        fn notify(&self, message: &str, _token: &NotifyToken) -> Result<()> {
            self.sent.lock().unwrap().push(message.to_string());
            Ok(())
        }
    }

    #[test]
    fn test_notification_requires_token() {
        let notifier = Recording::default();
        let err = send_test_notification(&notifier, &NotifyToken::new("  ")).unwrap_err();
        assert!(err.to_string().contains("token"));
        assert!(notifier.sent.lock().unwrap().is_empty());

        send_test_notification(&notifier, &NotifyToken::new("abc")).unwrap();
        assert_eq!(*notifier.sent.lock().unwrap(), vec![TEST_MESSAGE.to_string()]);
    }

    #[test]
    fn token_debug_is_redacted() {
        let token = NotifyToken::new("super-secret");
        let printed = format!("{:?}", token);
        assert!(!printed.contains("super-secret"));
        assert_eq!(token.expose(), "super-secret");
    }

    #[test]
    fn messages_match_conditions() {
        assert!(alert_message(AlertCondition::Sitting).contains("sitting"));
        assert!(alert_message(AlertCondition::Falling).contains("falling"));
    }
}
