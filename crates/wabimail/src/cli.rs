//! Command-line arguments.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use wabimail_core::{AccountType, AuthType, SecurityMode};

/// `WabiMail` - mail accounts over IMAP, POP3 and SMTP.
#[derive(Debug, Parser)]
#[command(name = "wabimail", version, about)]
pub struct Cli {
    /// Config file instead of the default location.
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Manage configured accounts.
    #[command(subcommand)]
    Accounts(AccountsCommand),
    /// Sign in: browser consent for OAuth2 accounts, a password otherwise.
    Login {
        /// Account address.
        email: String,
        /// Read the password from standard input instead of prompting.
        #[arg(long)]
        password_stdin: bool,
    },
    /// Forget the stored credential of an account.
    Logout {
        /// Account address.
        email: String,
    },
    /// Connect to the incoming and outgoing servers and report each.
    Test {
        /// Account address.
        email: String,
    },
    /// List IMAP folders.
    Folders {
        /// Account address.
        email: String,
    },
    /// Fetch the newest messages.
    Fetch {
        /// Account address.
        email: String,
        /// IMAP folder; ignored for POP3.
        #[arg(long, default_value = "INBOX")]
        folder: String,
        /// Maximum number of messages.
        #[arg(long, default_value_t = 20)]
        limit: usize,
        /// Only unread messages (IMAP).
        #[arg(long)]
        unread: bool,
        /// Print messages as JSON.
        #[arg(long)]
        json: bool,
    },
    /// Send a plain-text message.
    Send {
        /// Sending account address.
        email: String,
        /// Recipient; repeat for several.
        #[arg(long, required = true)]
        to: Vec<String>,
        /// Carbon-copy recipient.
        #[arg(long)]
        cc: Vec<String>,
        /// Blind carbon-copy recipient.
        #[arg(long)]
        bcc: Vec<String>,
        /// Subject line.
        #[arg(long)]
        subject: String,
        /// Text body.
        #[arg(long)]
        body: String,
    },
}

#[derive(Debug, Subcommand)]
pub enum AccountsCommand {
    /// List accounts; the default is marked with `*`.
    List {
        /// Print the account set as JSON.
        #[arg(long)]
        json: bool,
    },
    /// Add an account.
    Add(AddAccount),
    /// Remove an account and its stored credential.
    Remove {
        /// Account address.
        email: String,
    },
    /// Make an account the default.
    Default {
        /// Account address.
        email: String,
    },
    /// Counts per type and state.
    Stats,
}

#[derive(Debug, Args)]
pub struct AddAccount {
    /// Account address.
    pub email: String,
    /// Service kind: gmail, imap, smtp, pop3 or exchange.
    #[arg(long = "type", value_name = "TYPE", default_value = "imap")]
    pub account_type: AccountType,
    /// Label; defaults to the address.
    #[arg(long)]
    pub name: Option<String>,
    /// password, oauth2, app_password or none; defaults per type.
    #[arg(long)]
    pub auth: Option<AuthType>,
    /// IMAP or POP3 host.
    #[arg(long)]
    pub incoming_server: Option<String>,
    /// IMAP or POP3 port.
    #[arg(long)]
    pub incoming_port: Option<u32>,
    /// ssl, starttls or none.
    #[arg(long)]
    pub incoming_security: Option<SecurityMode>,
    /// SMTP host.
    #[arg(long)]
    pub outgoing_server: Option<String>,
    /// SMTP port.
    #[arg(long)]
    pub outgoing_port: Option<u32>,
    /// ssl, starttls or none.
    #[arg(long)]
    pub outgoing_security: Option<SecurityMode>,
    /// Login name when it differs from the address.
    #[arg(long)]
    pub username: Option<String>,
    /// Submit mail without authenticating.
    #[arg(long)]
    pub no_smtp_auth: bool,
    /// Sender display name.
    #[arg(long)]
    pub display_name: Option<String>,
    /// Appended to outgoing messages.
    #[arg(long)]
    pub signature: Option<String>,
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use clap::CommandFactory;

    use super::*;

    #[test]
    fn test_cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_add_account() {
        let cli = Cli::parse_from([
            "wabimail",
            "accounts",
            "add",
            "me@example.com",
            "--type",
            "pop3",
            "--incoming-server",
            "pop.example.com",
            "--incoming-security",
            "starttls",
            "--no-smtp-auth",
        ]);
        let Command::Accounts(AccountsCommand::Add(add)) = cli.command else {
            panic!("expected accounts add");
        };
        assert_eq!(add.account_type, AccountType::Pop3);
        assert_eq!(add.incoming_security, Some(SecurityMode::StartTls));
        assert!(add.no_smtp_auth);
        assert!(add.auth.is_none());
    }

    #[test]
    fn test_fetch_defaults() {
        let cli = Cli::parse_from(["wabimail", "fetch", "me@example.com"]);
        let Command::Fetch {
            folder,
            limit,
            unread,
            ..
        } = cli.command
        else {
            panic!("expected fetch");
        };
        assert_eq!(folder, "INBOX");
        assert_eq!(limit, 20);
        assert!(!unread);
    }

    #[test]
    fn test_send_requires_recipient() {
        let result = Cli::try_parse_from([
            "wabimail",
            "send",
            "me@example.com",
            "--subject",
            "Hi",
            "--body",
            "Hello",
        ]);
        assert!(result.is_err());
    }
}
