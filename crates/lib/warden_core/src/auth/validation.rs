//! Input normalization for the engine's entry points.

use std::sync::LazyLock;

use regex::Regex;

use super::{AuthError, AuthResult};

pub const MIN_PASSWORD_LEN: usize = 6;

static EMAIL_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[^\s@]+@[^\s@]+\.[^\s@]+$").expect("email pattern compiles"));

/// Trim and lowercase. Emails compare case-insensitively everywhere.
pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

/// Normalize and check the address shape.
pub fn validate_email(email: &str) -> AuthResult<String> {
    let normalized = normalize_email(email);
    if normalized.is_empty() {
        return Err(AuthError::Validation("Email is required".into()));
    }
    if !EMAIL_RE.is_match(&normalized) {
        return Err(AuthError::Validation(
            "Please provide a valid email address".into(),
        ));
    }
    Ok(normalized)
}

pub fn validate_password(password: &str) -> AuthResult<()> {
    if password.chars().count() < MIN_PASSWORD_LEN {
        return Err(AuthError::Validation(format!(
            "Password must be at least {MIN_PASSWORD_LEN} characters long"
        )));
    }
    Ok(())
}

pub fn validate_name(name: &str) -> AuthResult<String> {
    let trimmed = name.trim();
    if trimmed.is_empty() {
        return Err(AuthError::Validation("Name is required".into()));
    }
    Ok(trimmed.to_string())
}

/// Drop blank entries and surrounding whitespace from a permission set.
pub fn normalize_permissions<I>(permissions: I) -> std::collections::BTreeSet<String>
where
    I: IntoIterator<Item = String>,
{
    permissions
        .into_iter()
        .map(|p| p.trim().to_string())
        .filter(|p| !p.is_empty())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn emails_are_trimmed_and_lowercased() {
        assert_eq!(validate_email("  Ann@Example.COM ").unwrap(), "ann@example.com");
    }

    #[test]
    fn malformed_emails_are_rejected() {
        for bad in ["", "ann", "ann@", "@x.com", "ann@x", "a nn@x.com", "a@b@c.com"] {
            assert!(
                matches!(validate_email(bad), Err(AuthError::Validation(_))),
                "accepted {bad:?}"
            );
        }
    }

    #[test]
    fn short_passwords_are_rejected() {
        assert!(validate_password("12345").is_err());
        assert!(validate_password("123456").is_ok());
    }

    #[test]
    fn blank_names_are_rejected() {
        assert!(validate_name("   ").is_err());
        assert_eq!(validate_name(" Ann ").unwrap(), "Ann");
    }

    #[test]
    fn permission_sets_drop_blanks() {
        let set = normalize_permissions(vec![" read:self ".into(), "".into(), "read:self".into()]);
        assert_eq!(set.len(), 1);
        assert!(set.contains("read:self"));
    }
}
