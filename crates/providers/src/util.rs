//! Helpers shared by the HTTP adapters.

use pt_domain::config::AuthConfig;
use pt_domain::error::{Error, Result};

/// Map a [`reqwest::Error`] onto the domain error, keeping timeouts distinct.
pub(crate) fn from_reqwest(e: reqwest::Error) -> Error {
    if e.is_timeout() {
        Error::Timeout(e.to_string())
    } else {
        Error::Http(e.to_string())
    }
}

/// Find the credential described by an [`AuthConfig`].
///
/// Sources are tried in order: inline `key` (logged as a warning), the OS
/// keychain entry `service`/`account`, the `env` variable, and finally the
/// `{SERVICE}_{ACCOUNT}` variable for headless hosts without a keychain.
pub fn resolve_api_key(auth: &AuthConfig) -> Result<String> {
    if let Some(key) = &auth.key {
        tracing::warn!("API key read from the plaintext 'key' field; prefer 'env' or the keychain");
        return Ok(key.clone());
    }

    let keychain = auth.service.as_deref().zip(auth.account.as_deref());

    if let Some((service, account)) = keychain {
        match keychain_secret(service, account) {
            Ok(secret) => return Ok(secret),
            Err(e) => tracing::debug!(service, account, error = %e, "keychain lookup failed"),
        }
    }

    if let Some(var) = &auth.env {
        return std::env::var(var)
            .map_err(|_| Error::Auth(format!("environment variable '{var}' is not set")));
    }

    if let Some((service, account)) = keychain {
        let var = headless_env_name(service, account);
        if let Ok(secret) = std::env::var(&var) {
            return Ok(secret);
        }
        return Err(Error::Auth(format!(
            "no keychain entry for {service}/{account} and {var} is not set"
        )));
    }

    Err(Error::Auth(
        "no API key configured (set 'env', 'key', or 'service' + 'account')".into(),
    ))
}

fn keychain_secret(service: &str, account: &str) -> Result<String> {
    keyring::Entry::new(service, account)
        .and_then(|entry| entry.get_password())
        .map_err(|e| Error::Auth(format!("keychain: {e}")))
}

/// `("psytrainer", "anthropic-key")` → `"PSYTRAINER_ANTHROPIC_KEY"`.
fn headless_env_name(service: &str, account: &str) -> String {
    format!("{service}_{account}").to_uppercase().replace('-', "_")
}
