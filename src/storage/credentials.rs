//! API token storage in the OS keychain.
//!
//! One keychain entry per credential profile (see `api.credential_profile`
//! in the config), holding the bearer token and the operator it belongs to.
//! `ApiCredential` redacts the token in `Debug` and keeps it in a
//! `SecretString` so it is not printed by accident.

use std::fmt;

use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};

use crate::error::AppError;

/// The service name used for all keychain entries.
const SERVICE_NAME: &str = "gateway-backoffice";

fn keychain_key(profile: &str) -> String {
    format!("api-token:{profile}")
}

/// Bearer token for one back-office profile.
#[derive(Clone)]
pub struct ApiCredential {
    pub token: SecretString,
    /// Operator the token was issued to, for display only.
    pub username: Option<String>,
}

impl fmt::Debug for ApiCredential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ApiCredential")
            .field("token", &"***")
            .field("username", &self.username)
            .finish()
    }
}

#[derive(Serialize, Deserialize)]
struct StoredCredential {
    token: String,
    #[serde(default)]
    username: Option<String>,
}

impl From<StoredCredential> for ApiCredential {
    fn from(stored: StoredCredential) -> Self {
        ApiCredential {
            token: SecretString::from(stored.token),
            username: stored.username,
        }
    }
}

/// Stores the token for `profile`, replacing any previous one.
///
/// # Errors
/// Returns `AppError::Internal` if the keychain operation fails.
pub async fn store_credential(profile: &str, credential: &ApiCredential) -> Result<(), AppError> {
    let key = keychain_key(profile);
    let stored = StoredCredential {
        token: credential.token.expose_secret().to_string(),
        username: credential.username.clone(),
    };

    let json = serde_json::to_string(&stored)
        .map_err(|_| AppError::Internal("Failed to serialize credential.".into()))?;

    tokio::task::spawn_blocking(move || {
        let entry = keyring::Entry::new(SERVICE_NAME, &key)
            .map_err(|_| AppError::Internal("Failed to access keychain.".into()))?;

        entry
            .set_password(&json)
            .map_err(|_| AppError::Internal("Failed to store credentials.".into()))?;

        Ok(())
    })
    .await
    .map_err(|_| AppError::Internal("Keychain task failed.".into()))?
}

/// Loads the token for `profile`.
///
/// # Errors
/// Returns `AppError::NotAuthenticated` if nothing is stored for the profile.
pub async fn get_credential(profile: &str) -> Result<ApiCredential, AppError> {
    let key = keychain_key(profile);

    tokio::task::spawn_blocking(move || {
        let entry = keyring::Entry::new(SERVICE_NAME, &key)
            .map_err(|_| AppError::Internal("Failed to access keychain.".into()))?;

        let json = entry.get_password().map_err(|e| match e {
            keyring::Error::NoEntry => AppError::NotAuthenticated,
            _ => AppError::Internal("Failed to retrieve credentials.".into()),
        })?;

        parse_stored(&json)
    })
    .await
    .map_err(|_| AppError::Internal("Keychain task failed.".into()))?
}

/// Removes the token for `profile`. Removing a missing entry succeeds.
pub async fn delete_credential(profile: &str) -> Result<(), AppError> {
    let key = keychain_key(profile);

    tokio::task::spawn_blocking(move || {
        let entry = keyring::Entry::new(SERVICE_NAME, &key)
            .map_err(|_| AppError::Internal("Failed to access keychain.".into()))?;

        match entry.delete_credential() {
            Ok(()) | Err(keyring::Error::NoEntry) => Ok(()),
            Err(_) => Err(AppError::Internal("Failed to delete credentials.".into())),
        }
    })
    .await
    .map_err(|_| AppError::Internal("Keychain task failed.".into()))?
}

fn parse_stored(json: &str) -> Result<ApiCredential, AppError> {
    let stored: StoredCredential = serde_json::from_str(json)
        .map_err(|_| AppError::Internal("Failed to parse stored credential.".into()))?;
    if stored.token.trim().is_empty() {
        return Err(AppError::NotAuthenticated);
    }
    Ok(stored.into())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn debug_redacts_token() {
        let credential = ApiCredential {
            token: SecretString::from("super_secret_token_12345".to_string()),
            username: Some("ops@example.com".into()),
        };

        let debug_output = format!("{:?}", credential);

        // Don't print debug_output in the failure message.
        assert!(
            !debug_output.contains("super_secret_token_12345"),
            "Debug output leaked token"
        );
        assert!(debug_output.contains("***"));
        assert!(debug_output.contains("ops@example.com"));
    }

    #[test]
    fn parses_stored_json_without_username() {
        let credential = parse_stored(r#"{"token": "abc"}"#).unwrap();
        assert_eq!(credential.token.expose_secret(), "abc");
        assert!(credential.username.is_none());
    }

    #[test]
    fn blank_stored_token_is_not_authenticated() {
        assert!(matches!(
            parse_stored(r#"{"token": "  "}"#),
            Err(AppError::NotAuthenticated)
        ));
    }

    #[test]
    fn keys_are_namespaced_per_profile() {
        assert_eq!(keychain_key("staging"), "api-token:staging");
    }

    /// Touches the real OS keychain, so it is ignored by default. Run with
    /// `--ignored` on a workstation.
    #[tokio::test]
    #[ignore]
    async fn keychain_integration() {
        let profile = "integration-test";
        delete_credential(profile).await.expect("Cleanup should succeed");

        let credential = ApiCredential {
            token: SecretString::from("test_token".to_string()),
            username: Some("tester".into()),
        };
        store_credential(profile, &credential).await.expect("Failed to store");

        let loaded = get_credential(profile).await.expect("Failed to load");
        assert_eq!(loaded.token.expose_secret(), "test_token");
        assert_eq!(loaded.username.as_deref(), Some("tester"));

        delete_credential(profile).await.expect("Failed to delete");
        assert!(matches!(
            get_credential(profile).await,
            Err(AppError::NotAuthenticated)
        ));
    }
}
