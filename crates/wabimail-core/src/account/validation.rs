//! Account validation.

use std::fmt;

use super::model::{Account, AccountSettings, AccountType};

/// Validation error for account configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    /// Account name is empty.
    EmptyName,
    /// Email address is empty.
    EmptyEmail,
    /// Email address format is invalid.
    InvalidEmail,
    /// Incoming server is empty.
    EmptyIncomingHost,
    /// Incoming port outside 1-65535.
    InvalidIncomingPort(u32),
    /// Outgoing server is empty.
    EmptyOutgoingHost,
    /// Outgoing port outside 1-65535.
    InvalidOutgoingPort(u32),
}

impl ValidationError {
    /// Get the field name this error relates to.
    #[must_use]
    pub const fn field(&self) -> &'static str {
        match self {
            Self::EmptyName => "name",
            Self::EmptyEmail | Self::InvalidEmail => "email",
            Self::EmptyIncomingHost => "incoming_server",
            Self::InvalidIncomingPort(_) => "incoming_port",
            Self::EmptyOutgoingHost => "outgoing_server",
            Self::InvalidOutgoingPort(_) => "outgoing_port",
        }
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::EmptyName => f.write_str("Account name is required"),
            Self::EmptyEmail => f.write_str("Email address is required"),
            Self::InvalidEmail => f.write_str("Invalid email address format"),
            Self::EmptyIncomingHost => f.write_str("Incoming server is required"),
            Self::InvalidIncomingPort(port) => {
                write!(f, "Incoming port {port} is outside 1-65535")
            }
            Self::EmptyOutgoingHost => f.write_str("Outgoing server is required"),
            Self::InvalidOutgoingPort(port) => {
                write!(f, "Outgoing port {port} is outside 1-65535")
            }
        }
    }
}

impl std::error::Error for ValidationError {}

/// Result of validating an account.
pub type ValidationResult = Result<(), Vec<ValidationError>>;

/// Validate an account configuration.
///
/// Hosts are required for the directions the account type uses: incoming
/// for Gmail, IMAP and POP3, outgoing for Gmail, IMAP and SMTP. Ports are
/// always checked.
///
/// # Errors
///
/// Returns every problem found, not just the first.
pub fn validate_account(account: &Account) -> ValidationResult {
    let mut errors = Vec::new();

    if account.name.trim().is_empty() {
        errors.push(ValidationError::EmptyName);
    }

    if account.email.trim().is_empty() {
        errors.push(ValidationError::EmptyEmail);
    } else if !is_valid_email(&account.email) {
        errors.push(ValidationError::InvalidEmail);
    }

    let settings = &account.settings;
    let needs_incoming = matches!(
        account.account_type,
        AccountType::Gmail | AccountType::Imap | AccountType::Pop3
    );
    let needs_outgoing = matches!(
        account.account_type,
        AccountType::Gmail | AccountType::Imap | AccountType::Smtp
    );

    if needs_incoming && settings.incoming_server.trim().is_empty() {
        errors.push(ValidationError::EmptyIncomingHost);
    }
    if !is_valid_port(settings.incoming_port) {
        errors.push(ValidationError::InvalidIncomingPort(settings.incoming_port));
    }
    if needs_outgoing && settings.outgoing_server.trim().is_empty() {
        errors.push(ValidationError::EmptyOutgoingHost);
    }
    if !is_valid_port(settings.outgoing_port) {
        errors.push(ValidationError::InvalidOutgoingPort(settings.outgoing_port));
    }

    into_result(errors)
}

/// Checks the settings an IMAP or POP3 client is about to use.
///
/// # Errors
///
/// Returns the problems with the incoming host and port.
pub fn validate_incoming(settings: &AccountSettings) -> ValidationResult {
    let mut errors = Vec::new();
    if settings.incoming_server.trim().is_empty() {
        errors.push(ValidationError::EmptyIncomingHost);
    }
    if !is_valid_port(settings.incoming_port) {
        errors.push(ValidationError::InvalidIncomingPort(settings.incoming_port));
    }
    into_result(errors)
}

/// Checks the settings an SMTP client is about to use.
///
/// # Errors
///
/// Returns the problems with the outgoing host and port.
pub fn validate_outgoing(settings: &AccountSettings) -> ValidationResult {
    let mut errors = Vec::new();
    if settings.outgoing_server.trim().is_empty() {
        errors.push(ValidationError::EmptyOutgoingHost);
    }
    if !is_valid_port(settings.outgoing_port) {
        errors.push(ValidationError::InvalidOutgoingPort(settings.outgoing_port));
    }
    into_result(errors)
}

fn into_result(errors: Vec<ValidationError>) -> ValidationResult {
    if errors.is_empty() { Ok(()) } else { Err(errors) }
}

/// Port usable for a TCP connection.
#[must_use]
pub const fn is_valid_port(port: u32) -> bool {
    matches!(port, 1..=65535)
}

/// Syntactic check: one `@`, a non-empty local part, and a domain with a
/// dot and no empty labels.
#[must_use]
pub fn is_valid_email(email: &str) -> bool {
    let email = email.trim();
    if email.chars().any(char::is_whitespace) {
        return false;
    }
    let Some((local, domain)) = email.split_once('@') else {
        return false;
    };
    !local.is_empty()
        && !domain.contains('@')
        && domain.contains('.')
        && domain.split('.').all(|label| !label.is_empty())
}
