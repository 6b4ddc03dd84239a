//! Credential validity record: whether a user's provider credential is
//! currently usable and when it was last confirmed.
//!
//! Only validity tracking lives here. The credential secret itself (and
//! the provider's login protocol) is handled by the bridge service.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Per-user credential validity state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CredentialRecord {
    pub user_id: u64,
    /// Account name at the provider (for logs and probes)
    pub garmin_username: String,
    pub is_valid: bool,
    /// Last explicit successful validation; `None` if never probed
    pub last_validated_at: Option<DateTime<Utc>>,
    /// Why the credential was last marked invalid
    pub validation_error: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl CredentialRecord {
    pub fn new(user_id: u64, garmin_username: String, now: DateTime<Utc>) -> Self {
        Self {
            user_id,
            garmin_username,
            is_valid: false,
            last_validated_at: None,
            validation_error: None,
            created_at: now,
        }
    }

    /// Whether a revalidation probe is due: still trusted, but not
    /// confirmed since `cutoff` (or never confirmed at all).
    pub fn needs_validation(&self, cutoff: DateTime<Utc>) -> bool {
        self.is_valid
            && match self.last_validated_at {
                Some(at) => at < cutoff,
                None => true,
            }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn test_needs_validation_when_stale() {
        let now = Utc::now();
        let cutoff = now - Duration::hours(24);

        let mut cred = CredentialRecord::new(1, "athlete@example.com".to_string(), now);
        cred.is_valid = true;
        cred.last_validated_at = Some(now - Duration::hours(48));
        assert!(cred.needs_validation(cutoff));

        cred.last_validated_at = Some(now - Duration::hours(1));
        assert!(!cred.needs_validation(cutoff));
    }

    #[test]
    fn test_never_validated_counts_as_due() {
        let now = Utc::now();
        let mut cred = CredentialRecord::new(1, "athlete@example.com".to_string(), now);
        cred.is_valid = true;

        assert!(cred.needs_validation(now - Duration::hours(24)));
    }

    #[test]
    fn test_invalid_credentials_are_never_due() {
        let now = Utc::now();
        let mut cred = CredentialRecord::new(1, "athlete@example.com".to_string(), now);
        cred.is_valid = false;
        cred.last_validated_at = Some(now - Duration::days(30));

        // Invalid credentials wait for an explicit re-validation, not
        // the periodic sweep.
        assert!(!cred.needs_validation(now - Duration::hours(24)));
    }
}
