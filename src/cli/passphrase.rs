//! Passphrase acquisition for CLI commands
//!
//! A passphrase comes from a named environment variable when one is given,
//! otherwise from a hidden terminal prompt.

use crate::crypto::SecureString;
use crate::error::{BackupError, BackupResult};

/// Minimum accepted length for a new passphrase entered at the prompt
const MIN_NEW_PASSPHRASE_LEN: usize = 8;

/// Read an existing passphrase (restore, info)
pub fn read_passphrase(env_var: Option<&str>) -> BackupResult<SecureString> {
    match env_var {
        Some(var) => from_env(var),
        None => prompt_passphrase("Enter passphrase: "),
    }
}

/// Read a passphrase for a new encrypted archive, confirming it when prompting
pub fn read_new_passphrase(env_var: Option<&str>) -> BackupResult<SecureString> {
    if let Some(var) = env_var {
        return from_env(var);
    }

    loop {
        let pass1 = prompt_passphrase("Enter new passphrase: ")?;

        if pass1.len() < MIN_NEW_PASSPHRASE_LEN {
            eprintln!(
                "Passphrase must be at least {} characters. Please try again.",
                MIN_NEW_PASSPHRASE_LEN
            );
            continue;
        }

        let pass2 = prompt_passphrase("Confirm passphrase: ")?;

        if pass1.as_str() != pass2.as_str() {
            eprintln!("Passphrases do not match. Please try again.");
            continue;
        }

        return Ok(pass1);
    }
}

fn from_env(var: &str) -> BackupResult<SecureString> {
    let value = std::env::var(var).map_err(|_| {
        BackupError::Config(format!("Passphrase environment variable {} is not set", var))
    })?;
    if value.is_empty() {
        return Err(BackupError::Config(format!(
            "Passphrase environment variable {} is empty",
            var
        )));
    }
    Ok(SecureString::new(value))
}

/// Prompt for a passphrase (hidden input)
fn prompt_passphrase(prompt: &str) -> BackupResult<SecureString> {
    rpassword::prompt_password(prompt)
        .map(SecureString::new)
        .map_err(|e| BackupError::Encryption(format!("Failed to read passphrase: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_passphrase_from_env() {
        std::env::set_var("SNAPVAULT_TEST_PASSPHRASE_SET", "hunter22");
        let pass = read_passphrase(Some("SNAPVAULT_TEST_PASSPHRASE_SET")).unwrap();
        assert_eq!(pass.as_str(), "hunter22");
        std::env::remove_var("SNAPVAULT_TEST_PASSPHRASE_SET");
    }

    #[test]
    fn test_missing_env_var_is_config_error() {
        let err = read_new_passphrase(Some("SNAPVAULT_TEST_PASSPHRASE_UNSET")).unwrap_err();
        assert!(matches!(err, BackupError::Config(_)));
    }
}
