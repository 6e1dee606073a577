use anyhow::{Result, anyhow};

/// Structural check on a recipient address; deliverability is the mailer's problem.
pub fn validate_recipient_email(email: &str) -> Result<()> {
    let email = email.trim();

    if email.is_empty() {
        return Err(anyhow!("Recipient email cannot be empty"));
    }

    if email.len() > 254 {
        return Err(anyhow!("Recipient email too long (maximum 254 characters)"));
    }

    if email.chars().any(|c| c.is_whitespace() || c.is_control()) {
        return Err(anyhow!("Recipient email contains invalid characters"));
    }

    let (local, domain) = email
        .rsplit_once('@')
        .ok_or_else(|| anyhow!("Recipient email is missing '@'"))?;

    if local.is_empty() || domain.is_empty() {
        return Err(anyhow!("Recipient email must have a local part and a domain"));
    }

    if domain.starts_with('.') || domain.ends_with('.') {
        return Err(anyhow!("Recipient email domain is malformed"));
    }

    Ok(())
}
