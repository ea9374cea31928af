//! API token commands.
//!
//! These commands handle:
//! - Saving a token to the keychain and activating it
//! - Restoring the saved token at startup
//! - Signing out (clearing the token everywhere)

use secrecy::{ExposeSecret, SecretString};
use serde::Serialize;
use tracing::info;

use crate::error::AppError;
use crate::state::AppState;
use crate::storage::credentials::{self as keychain, ApiCredential};

// ─────────────────────────────────────────────────────────────────────────────
// Response Types
// ─────────────────────────────────────────────────────────────────────────────

/// Sign-in state returned to the front end (no sensitive data).
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AuthStatus {
    pub authenticated: bool,
    pub profile: String,
    pub username: Option<String>,
}

// ─────────────────────────────────────────────────────────────────────────────
// Commands
// ─────────────────────────────────────────────────────────────────────────────

/// Stores `token` for the configured credential profile and uses it for
/// every following request.
pub async fn set_api_token(
    state: &AppState,
    token: String,
    username: Option<String>,
) -> Result<AuthStatus, AppError> {
    let token = normalize_token(&token)?;
    let profile = state.config.api.credential_profile.clone();

    let credential = ApiCredential {
        token: SecretString::from(token),
        username: username.filter(|u| !u.trim().is_empty()),
    };
    keychain::store_credential(&profile, &credential).await?;
    state.api.set_token(Some(credential.token.clone())).await;

    info!("[AUTH] Token saved for profile {}", profile);

    Ok(AuthStatus {
        authenticated: true,
        profile,
        username: credential.username,
    })
}

/// Loads the saved token into the API client, if there is one.
pub async fn restore_token(state: &AppState) -> Result<AuthStatus, AppError> {
    let profile = state.config.api.credential_profile.clone();

    match keychain::get_credential(&profile).await {
        Ok(credential) => {
            if credential.token.expose_secret().trim().is_empty() {
                return Ok(signed_out(profile));
            }
            state.api.set_token(Some(credential.token.clone())).await;
            info!("[AUTH] Restored token for profile {}", profile);
            Ok(AuthStatus {
                authenticated: true,
                profile,
                username: credential.username,
            })
        }
        Err(AppError::NotAuthenticated) => Ok(signed_out(profile)),
        Err(e) => Err(e),
    }
}

/// Forgets the token in memory and in the keychain.
pub async fn clear_api_token(state: &AppState) -> Result<AuthStatus, AppError> {
    let profile = state.config.api.credential_profile.clone();

    state.api.set_token(None).await;
    keychain::delete_credential(&profile).await?;

    info!("[AUTH] Signed out of profile {}", profile);
    Ok(signed_out(profile))
}

// ─────────────────────────────────────────────────────────────────────────────
// Helper Functions
// ─────────────────────────────────────────────────────────────────────────────

fn signed_out(profile: String) -> AuthStatus {
    AuthStatus {
        authenticated: false,
        profile,
        username: None,
    }
}

/// Trims a pasted token and strips a leading `Bearer ` scheme.
fn normalize_token(raw: &str) -> Result<String, AppError> {
    let trimmed = raw.trim();
    let token = match trimmed.split_once(' ') {
        Some((scheme, rest)) if scheme.eq_ignore_ascii_case("bearer") => rest.trim(),
        _ => trimmed,
    };
    if token.is_empty() || token.eq_ignore_ascii_case("bearer") || token.contains(char::is_whitespace) {
        return Err(AppError::NotAuthenticated);
    }
    Ok(token.to_string())
}
