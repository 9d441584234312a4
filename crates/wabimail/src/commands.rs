//! Command handlers.

use std::sync::Arc;

use anyhow::{Context, bail};
use tokio::io::AsyncBufReadExt;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use wabimail_core::{
    Account, AccountManager, AuthType, CheckOutcome, CoreConfig, CredentialStore, Error,
    FetchBatch, MailClientFactory, OAuth2Authenticator, OutgoingMessage, SqliteAccountStore,
};

use crate::cli::{AccountsCommand, AddAccount, Command};

/// Everything a command needs, opened from the config.
struct App {
    accounts: AccountManager,
    auth: Arc<OAuth2Authenticator>,
    factory: MailClientFactory,
}

impl App {
    async fn open(config: &CoreConfig) -> anyhow::Result<Self> {
        config.validate()?;
        let data_dir = config.data_dir();
        tokio::fs::create_dir_all(&data_dir)
            .await
            .with_context(|| format!("creating {}", data_dir.display()))?;

        let store = SqliteAccountStore::open(&config.accounts_db_path()).await?;
        let accounts = AccountManager::load(Arc::new(store)).await?;
        let credentials = Arc::new(CredentialStore::new(config.credentials_dir()));
        let auth = Arc::new(OAuth2Authenticator::from_config(credentials, config)?);
        let factory =
            MailClientFactory::new(auth.clone()).with_timeouts(config.network_timeouts());
        Ok(Self {
            accounts,
            auth,
            factory,
        })
    }

    async fn account(&self, email: &str) -> anyhow::Result<Account> {
        self.accounts
            .get_by_email(email)
            .await
            .ok_or_else(|| Error::AccountNotFound(email.to_string()).into())
    }
}

/// Runs one command.
pub async fn run(command: Command, config: &CoreConfig) -> anyhow::Result<()> {
    let app = App::open(config).await?;
    match command {
        Command::Accounts(command) => accounts(&app, command).await,
        Command::Login {
            email,
            password_stdin,
        } => login(&app, &email, password_stdin).await,
        Command::Logout { email } => {
            let account = app.account(&email).await?;
            app.auth.sign_out(&account.id).await?;
            println!("Signed out of {}", account.email);
            Ok(())
        }
        Command::Test { email } => test(&app, &email).await,
        Command::Folders { email } => folders(&app, &email).await,
        Command::Fetch {
            email,
            folder,
            limit,
            unread,
            json,
        } => fetch(&app, &email, &folder, limit, unread, json).await,
        Command::Send {
            email,
            to,
            cc,
            bcc,
            subject,
            body,
        } => {
            let message = to
                .into_iter()
                .fold(OutgoingMessage::new(subject, body), OutgoingMessage::with_to);
            let message = cc.into_iter().fold(message, OutgoingMessage::with_cc);
            let message = bcc.into_iter().fold(message, OutgoingMessage::with_bcc);
            send(&app, &email, &message).await
        }
    }
}

/// Follow-up advice for errors the user can fix.
pub fn hint(error: &anyhow::Error) -> Option<String> {
    match error.downcast_ref::<Error>()? {
        Error::ReauthRequired(email) => Some(format!("run `wabimail login {email}`")),
        Error::AccountNotFound(_) => Some("see `wabimail accounts list`".to_string()),
        Error::Connection(_) => Some("check the server settings and try again".to_string()),
        _ => None,
    }
}

async fn accounts(app: &App, command: AccountsCommand) -> anyhow::Result<()> {
    match command {
        AccountsCommand::List { json } => {
            if json {
                println!("{}", app.accounts.export_json(false).await?);
                return Ok(());
            }
            let accounts = app.accounts.list().await;
            if accounts.is_empty() {
                println!("No accounts configured.");
            }
            for account in accounts {
                let marker = if account.is_default { '*' } else { ' ' };
                let state = if account.is_active { "" } else { " (inactive)" };
                println!("{marker} {account}{state}");
            }
        }
        AccountsCommand::Add(add) => {
            let account = app.accounts.add(new_account(add)).await?;
            println!("Added {account}");
            if account.auth_type != AuthType::None {
                println!("Sign in with `wabimail login {}`", account.email);
            }
        }
        AccountsCommand::Remove { email } => {
            let account = app.account(&email).await?;
            let removed = app.accounts.remove(&account.id).await?;
            if let Err(e) = app.auth.sign_out(&removed.id).await {
                warn!(account = %removed.id, error = %e, "could not delete stored credential");
            }
            println!("Removed {removed}");
        }
        AccountsCommand::Default { email } => {
            let account = app.account(&email).await?;
            app.accounts.set_default(&account.id).await?;
            println!("{} is now the default account", account.email);
        }
        AccountsCommand::Stats => {
            let stats = app.accounts.statistics().await;
            println!("{}", serde_json::to_string_pretty(&stats)?);
        }
    }
    Ok(())
}

fn new_account(add: AddAccount) -> Account {
    let name = add.name.unwrap_or_else(|| add.email.clone());
    let mut account = Account::new(name, add.email, add.account_type);
    if let Some(auth) = add.auth {
        account = account.with_auth_type(auth);
    }
    if let Some(display_name) = add.display_name {
        account = account.with_display_name(display_name);
    }
    if let Some(signature) = add.signature {
        account = account.with_signature(signature);
    }

    let settings = &mut account.settings;
    if let Some(host) = add.incoming_server {
        settings.incoming_server = host;
    }
    if let Some(port) = add.incoming_port {
        settings.incoming_port = port;
    }
    if let Some(security) = add.incoming_security {
        settings.incoming_security = security;
    }
    if let Some(host) = add.outgoing_server {
        settings.outgoing_server = host;
    }
    if let Some(port) = add.outgoing_port {
        settings.outgoing_port = port;
    }
    if let Some(security) = add.outgoing_security {
        settings.outgoing_security = security;
    }
    settings.username = add.username;
    settings.requires_auth = !add.no_smtp_auth;
    account
}

async fn login(app: &App, email: &str, password_stdin: bool) -> anyhow::Result<()> {
    let account = app.account(email).await?;
    match account.auth_type {
        AuthType::None => {
            println!("{} does not authenticate", account.email);
        }
        AuthType::OAuth2 => {
            let cancel = CancellationToken::new();
            let on_interrupt = cancel.clone();
            let watcher = tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    on_interrupt.cancel();
                }
            });
            println!("Complete the sign-in in your browser (Ctrl-C to cancel)...");
            let result = app.auth.begin_auth_flow(&account, &cancel).await;
            watcher.abort();
            result?;
            println!("Signed in to {}", account.email);
        }
        AuthType::Password | AuthType::AppPassword => {
            let secret = if password_stdin {
                read_stdin_line().await?
            } else {
                let prompt = format!("Password for {}: ", account.email);
                tokio::task::spawn_blocking(move || rpassword::prompt_password(prompt))
                    .await
                    .context("password prompt")??
            };
            if secret.is_empty() {
                bail!("empty password");
            }
            app.auth.store_password(&account, secret).await?;
            println!("Password stored for {}", account.email);
        }
    }
    Ok(())
}

async fn read_stdin_line() -> anyhow::Result<String> {
    let mut line = String::new();
    tokio::io::BufReader::new(tokio::io::stdin())
        .read_line(&mut line)
        .await
        .context("reading password from stdin")?;
    Ok(line.trim_end_matches(['\r', '\n']).to_string())
}

async fn test(app: &App, email: &str) -> anyhow::Result<()> {
    let account = app.account(email).await?;
    let report = app.factory.test_account_connection(&account).await;
    for (direction, outcome) in [("incoming", &report.receive), ("outgoing", &report.send)] {
        match outcome {
            CheckOutcome::Passed => println!("{direction}: ok"),
            CheckOutcome::NotApplicable => println!("{direction}: not applicable"),
            CheckOutcome::Failed(e) => println!("{direction}: failed: {e}"),
        }
    }
    if !report.is_ok() {
        bail!("connection test failed for {}", account.email);
    }
    Ok(())
}

async fn folders(app: &App, email: &str) -> anyhow::Result<()> {
    let account = app.account(email).await?;
    let mut client = app.factory.create_receive_client(&account).await?;
    let Some(imap) = client.as_imap() else {
        bail!("{} accounts have no folders", account.account_type);
    };
    imap.connect().await?;
    let result = imap.list_folders().await;
    imap.disconnect().await;

    for folder in result? {
        let marker = if folder.selectable { ' ' } else { '-' };
        println!("{marker} {:<40} {:?}", folder.name, folder.kind);
    }
    Ok(())
}

async fn fetch(
    app: &App,
    email: &str,
    folder: &str,
    limit: usize,
    unread: bool,
    json: bool,
) -> anyhow::Result<()> {
    let account = app.account(email).await?;
    let mut client = app.factory.create_receive_client(&account).await?;
    client.connect().await?;

    let result = if let Some(imap) = client.as_imap() {
        imap.fetch_messages(folder, limit, unread).await
    } else if let Some(pop) = client.as_pop3() {
        if unread {
            warn!("POP3 has no read state; fetching the newest messages");
        }
        pop.fetch_messages(limit).await
    } else {
        Err(Error::Unsupported(format!("{} cannot fetch", client.kind())))
    };
    client.disconnect().await;
    let batch = result?;

    app.accounts
        .update_last_sync(&account.id, chrono::Utc::now())
        .await?;
    info!(account = %account.email, fetched = batch.len(), "fetch finished");
    print_batch(&batch, json)
}

fn print_batch(batch: &FetchBatch, json: bool) -> anyhow::Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(&batch.messages)?);
    } else {
        for message in &batch.messages {
            let marker = if message.is_unread() { '*' } else { ' ' };
            let date = message
                .date
                .map(|d| d.format("%Y-%m-%d %H:%M").to_string())
                .unwrap_or_default();
            println!(
                "{marker} {:<12} {date:<16} {:<30} {}",
                message.id.to_string(),
                message.from,
                message.subject
            );
        }
    }
    for failure in &batch.failures {
        eprintln!("could not read {}: {}", failure.id, failure.error);
    }
    Ok(())
}

async fn send(app: &App, email: &str, message: &OutgoingMessage) -> anyhow::Result<()> {
    let account = app.account(email).await?;
    let mut client = app.factory.create_send_client(&account).await?;
    client.connect().await?;
    let result = match client.as_smtp() {
        Some(smtp) => smtp.send(message).await,
        None => Err(Error::Unsupported("not an SMTP client".to_string())),
    };
    client.disconnect().await;
    let report = result?;

    println!("Sent to {} recipient(s)", report.accepted.len());
    for rejected in &report.rejected {
        println!(
            "rejected {}: {} {}",
            rejected.address, rejected.code, rejected.message
        );
    }
    Ok(())
}
