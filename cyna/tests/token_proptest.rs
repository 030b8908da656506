//! Property-based tests for bearer verification.
//!
//! Whatever string is presented, only issued credentials authenticate.

use argon2::Params;
use cyna::auth::{AuthError, AuthManager, LoginOutcome, LoginRequest, RegisterRequest};
use cyna::db::MemoryAuthStore;
use proptest::prelude::*;
use std::sync::Arc;

const MASTER: &str = "proptest-master-secret";

fn runtime() -> tokio::runtime::Runtime {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .unwrap()
}

/// Manager with one account, one live session and the bootstrap API token
async fn seeded_manager() -> (AuthManager, Vec<String>) {
    let auth = AuthManager::new(
        Arc::new(MemoryAuthStore::new()),
        "proptest_pepper_value".to_string(),
        Some(MASTER.to_string()),
    )
    .with_hash_params(Params::new(1024, 1, 1, None).unwrap());

    auth.register(RegisterRequest {
        email: "prop@example.com".to_string(),
        password: "password-123".to_string(),
        first_name: None,
        last_name: None,
        phone: None,
    })
    .await
    .unwrap();

    let session = match auth
        .login(LoginRequest {
            email: "prop@example.com".to_string(),
            password: "password-123".to_string(),
            totp_code: None,
        })
        .await
        .unwrap()
    {
        LoginOutcome::Authenticated(grant) => grant.token,
        LoginOutcome::TwoFactorRequired => unreachable!(),
    };
    let api_key = auth.bootstrap_api_token().await.unwrap().unwrap().key;

    (auth, vec![session, api_key, MASTER.to_string()])
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn test_unissued_hex_tokens_never_authenticate(token in "[0-9a-f]{64}") {
        let rt = runtime();
        rt.block_on(async {
            let (auth, issued) = seeded_manager().await;
            prop_assume!(!issued.contains(&token));

            let result = auth.authenticate(&token).await;
            prop_assert!(matches!(result, Err(AuthError::Unauthorized)));
            Ok(())
        })?;
    }

    #[test]
    fn test_arbitrary_strings_never_authenticate(token in "\\PC{0,80}") {
        let rt = runtime();
        rt.block_on(async {
            let (auth, issued) = seeded_manager().await;
            prop_assume!(!issued.contains(&token));

            let result = auth.authenticate(&token).await;
            prop_assert!(matches!(result, Err(AuthError::Unauthorized)));
            Ok(())
        })?;
    }

    #[test]
    fn test_master_secret_prefixes_rejected(len in 0usize..MASTER.len()) {
        let rt = runtime();
        rt.block_on(async {
            let (auth, _) = seeded_manager().await;
            let result = auth.authenticate(&MASTER[..len]).await;
            prop_assert!(matches!(result, Err(AuthError::Unauthorized)));
            Ok(())
        })?;
    }
}
