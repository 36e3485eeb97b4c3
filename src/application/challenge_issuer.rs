use crate::config::ChallengeConfig;
use crate::domain::account::AccountId;
use crate::domain::challenge::{Challenge, ChallengeId, ChallengePurpose};
use crate::domain::ports::ChallengeStoreRef;
use crate::error::Result;
use chrono::{DateTime, Duration, Utc};
use rand::Rng;
use tracing::{debug, info};

/// What the caller learns about a freshly issued challenge.
///
/// The code is meant for the delivery collaborator only and is never logged.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IssuedChallenge {
    pub code: String,
    pub expires_at: DateTime<Utc>,
}

/// Issues and verifies single-use numeric codes scoped to (account, purpose).
pub struct ChallengeIssuer {
    store: ChallengeStoreRef,
    config: ChallengeConfig,
}

impl ChallengeIssuer {
    /// Fails with [`LedgerError::Config`](crate::error::LedgerError::Config)
    /// when the code length is out of range.
    pub fn new(store: ChallengeStoreRef, config: ChallengeConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self { store, config })
    }

    pub fn config(&self) -> &ChallengeConfig {
        &self.config
    }

    pub async fn issue(
        &self,
        account: AccountId,
        purpose: ChallengePurpose,
    ) -> Result<IssuedChallenge> {
        self.issue_with(account, purpose, None).await
    }

    /// Issues a code that only confirms the request described by `binding`.
    pub async fn issue_bound(
        &self,
        account: AccountId,
        purpose: ChallengePurpose,
        binding: &str,
    ) -> Result<IssuedChallenge> {
        self.issue_with(account, purpose, Some(binding.to_string()))
            .await
    }

    async fn issue_with(
        &self,
        account: AccountId,
        purpose: ChallengePurpose,
        binding: Option<String>,
    ) -> Result<IssuedChallenge> {
        let now = Utc::now();
        let expires_at = i64::try_from(self.config.ttl_secs)
            .ok()
            .and_then(Duration::try_seconds)
            .and_then(|ttl| now.checked_add_signed(ttl))
            .unwrap_or(DateTime::<Utc>::MAX_UTC);
        let code = self.generate_code();

        let challenge = Challenge {
            id: ChallengeId::new(),
            account,
            purpose,
            code: code.clone(),
            binding,
            created_at: now,
            expires_at,
            consumed: false,
        };
        let invalidated = self.store.replace_active(challenge).await?;
        info!(%account, %purpose, invalidated, %expires_at, "Challenge issued");

        Ok(IssuedChallenge { code, expires_at })
    }

    /// Consumes the matching live challenge. Any miss returns `false` and
    /// leaves every stored challenge untouched.
    pub async fn verify(
        &self,
        account: AccountId,
        purpose: ChallengePurpose,
        code: &str,
    ) -> Result<bool> {
        self.verify_with(account, purpose, code, None).await
    }

    pub async fn verify_bound(
        &self,
        account: AccountId,
        purpose: ChallengePurpose,
        code: &str,
        binding: &str,
    ) -> Result<bool> {
        self.verify_with(account, purpose, code, Some(binding)).await
    }

    async fn verify_with(
        &self,
        account: AccountId,
        purpose: ChallengePurpose,
        code: &str,
        binding: Option<&str>,
    ) -> Result<bool> {
        let consumed = self
            .store
            .consume_matching(account, purpose, code, binding, Utc::now())
            .await?;
        let accepted = consumed.is_some();
        debug!(%account, %purpose, accepted, "Challenge verification");
        Ok(accepted)
    }

    fn generate_code(&self) -> String {
        let width = self.config.code_length as usize;
        let upper = 10u64.pow(self.config.code_length);
        let value = rand::thread_rng().gen_range(0..upper);
        format!("{value:0width$}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::in_memory::InMemoryChallengeStore;
    use std::sync::Arc;

    fn issuer(ttl_secs: u64) -> ChallengeIssuer {
        ChallengeIssuer::new(
            Arc::new(InMemoryChallengeStore::new()),
            ChallengeConfig {
                ttl_secs,
                code_length: 6,
            },
        )
        .unwrap()
    }

    #[test]
    fn test_out_of_range_code_length_rejected() {
        for code_length in [0, 3, 11, 20] {
            let result = ChallengeIssuer::new(
                Arc::new(InMemoryChallengeStore::new()),
                ChallengeConfig {
                    ttl_secs: 600,
                    code_length,
                },
            );
            assert!(matches!(result, Err(crate::error::LedgerError::Config(_))));
        }
    }

    #[tokio::test]
    async fn test_code_is_fixed_length_numeric() {
        let issuer = issuer(600);
        for _ in 0..20 {
            let issued = issuer.issue(AccountId(1), ChallengePurpose::Login).await.unwrap();
            assert_eq!(issued.code.len(), 6);
            assert!(issued.code.chars().all(|c| c.is_ascii_digit()));
        }
    }

    #[tokio::test]
    async fn test_code_verifies_once() {
        let issuer = issuer(600);
        let issued = issuer.issue(AccountId(1), ChallengePurpose::Transfer).await.unwrap();

        assert!(issuer.verify(AccountId(1), ChallengePurpose::Transfer, &issued.code).await.unwrap());
        assert!(!issuer.verify(AccountId(1), ChallengePurpose::Transfer, &issued.code).await.unwrap());
    }

    #[tokio::test]
    async fn test_wrong_code_does_not_consume() {
        let issuer = issuer(600);
        let issued = issuer.issue(AccountId(1), ChallengePurpose::Transfer).await.unwrap();
        let wrong = if issued.code == "000000" { "000001" } else { "000000" };

        assert!(!issuer.verify(AccountId(1), ChallengePurpose::Transfer, wrong).await.unwrap());
        assert!(issuer.verify(AccountId(1), ChallengePurpose::Transfer, &issued.code).await.unwrap());
    }

    #[tokio::test]
    async fn test_scope_is_account_and_purpose() {
        let issuer = issuer(600);
        let issued = issuer.issue(AccountId(1), ChallengePurpose::Transfer).await.unwrap();

        assert!(!issuer.verify(AccountId(2), ChallengePurpose::Transfer, &issued.code).await.unwrap());
        assert!(!issuer.verify(AccountId(1), ChallengePurpose::Withdrawal, &issued.code).await.unwrap());
        assert!(issuer.verify(AccountId(1), ChallengePurpose::Transfer, &issued.code).await.unwrap());
    }

    #[tokio::test]
    async fn test_resend_invalidates_previous_code() {
        let issuer = issuer(600);
        let first = issuer.issue(AccountId(1), ChallengePurpose::Withdrawal).await.unwrap();
        let second = issuer.issue(AccountId(1), ChallengePurpose::Withdrawal).await.unwrap();

        if first.code != second.code {
            assert!(!issuer.verify(AccountId(1), ChallengePurpose::Withdrawal, &first.code).await.unwrap());
        }
        assert!(issuer.verify(AccountId(1), ChallengePurpose::Withdrawal, &second.code).await.unwrap());
    }

    #[tokio::test]
    async fn test_expired_code_rejected() {
        let issuer = issuer(0);
        let issued = issuer.issue(AccountId(1), ChallengePurpose::Transfer).await.unwrap();
        assert!(!issuer.verify(AccountId(1), ChallengePurpose::Transfer, &issued.code).await.unwrap());
    }

    #[tokio::test]
    async fn test_binding_mismatch_keeps_challenge() {
        let issuer = issuer(600);
        let issued = issuer
            .issue_bound(AccountId(1), ChallengePurpose::Transfer, "transfer:1:2:500")
            .await
            .unwrap();

        assert!(
            !issuer
                .verify_bound(AccountId(1), ChallengePurpose::Transfer, &issued.code, "transfer:1:2:9000")
                .await
                .unwrap()
        );
        assert!(!issuer.verify(AccountId(1), ChallengePurpose::Transfer, &issued.code).await.unwrap());
        assert!(
            issuer
                .verify_bound(AccountId(1), ChallengePurpose::Transfer, &issued.code, "transfer:1:2:500")
                .await
                .unwrap()
        );
    }
}
