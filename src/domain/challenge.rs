use super::account::AccountId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ChallengeId(pub Uuid);

impl ChallengeId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ChallengeId {
    fn default() -> Self {
        Self::new()
    }
}

/// What a one-time code authorizes.
#[derive(Debug, Serialize, Deserialize, PartialEq, Eq, Hash, Clone, Copy)]
#[serde(rename_all = "snake_case")]
pub enum ChallengePurpose {
    Transfer,
    Withdrawal,
    LargeDeposit,
    Login,
    Registration,
    PasswordReset,
    KycVerification,
    AdminRegistration,
    AdminLogin,
}

impl fmt::Display for ChallengePurpose {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Transfer => "transfer",
            Self::Withdrawal => "withdrawal",
            Self::LargeDeposit => "large_deposit",
            Self::Login => "login",
            Self::Registration => "registration",
            Self::PasswordReset => "password_reset",
            Self::KycVerification => "kyc_verification",
            Self::AdminRegistration => "admin_registration",
            Self::AdminLogin => "admin_login",
        };
        f.write_str(s)
    }
}

/// A single-use, time-boxed numeric code scoped to (account, purpose).
#[derive(Debug, Serialize, Deserialize, PartialEq, Eq, Clone)]
pub struct Challenge {
    pub id: ChallengeId,
    pub account: AccountId,
    pub purpose: ChallengePurpose,
    pub code: String,
    /// Fingerprint of the request this code was issued for, if any.
    pub binding: Option<String>,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub consumed: bool,
}

impl Challenge {
    pub fn is_live(&self, now: DateTime<Utc>) -> bool {
        !self.consumed && now < self.expires_at
    }

    /// True when this challenge can be consumed by the given submission.
    pub fn accepts(&self, code: &str, binding: Option<&str>, now: DateTime<Utc>) -> bool {
        self.is_live(now) && self.code == code && self.binding.as_deref() == binding
    }
}
