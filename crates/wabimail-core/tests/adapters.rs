//! Adapters driven against scripted servers.

#![allow(clippy::unwrap_used)]

use std::sync::Arc;

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, DuplexStream};
use tokio::sync::Mutex;
use tokio_test::io::Builder;

use wabimail_core::service::FlagAction;
use wabimail_core::{
    Account, AccountType, Credential, Error, ImapAdapter, MessageId, OutgoingMessage, SmtpAdapter,
};

/// Submission server that refuses every address in `refused` and keeps
/// the DATA payload.
fn smtp_server(stream: DuplexStream, refused: &'static [&'static str], data: Arc<Mutex<String>>) {
    tokio::spawn(async move {
        let (reader, mut writer) = tokio::io::split(stream);
        let mut lines = BufReader::new(reader).lines();
        writer.write_all(b"220 mx ready\r\n").await.unwrap();
        while let Ok(Some(line)) = lines.next_line().await {
            let reply: &[u8] = if line.starts_with("EHLO") {
                b"250-mx\r\n250 AUTH PLAIN XOAUTH2\r\n"
            } else if line.starts_with("AUTH") {
                b"235 ok\r\n"
            } else if let Some(rcpt) = line.strip_prefix("RCPT TO:<") {
                if refused.iter().any(|r| rcpt.starts_with(r)) {
                    b"550 5.1.1 mailbox unavailable\r\n"
                } else {
                    b"250 ok\r\n"
                }
            } else if line.starts_with("MAIL") {
                b"250 ok\r\n"
            } else if line == "DATA" {
                writer.write_all(b"354 go\r\n").await.unwrap();
                let mut body = data.lock().await;
                while let Ok(Some(line)) = lines.next_line().await {
                    if line == "." {
                        break;
                    }
                    body.push_str(&line);
                    body.push('\n');
                }
                b"250 queued\r\n"
            } else if line == "QUIT" {
                writer.write_all(b"221 bye\r\n").await.unwrap();
                break;
            } else {
                b"502 not implemented\r\n"
            };
            writer.write_all(reply).await.unwrap();
        }
    });
}

async fn smtp_adapter(
    refused: &'static [&'static str],
) -> (SmtpAdapter<DuplexStream>, Arc<Mutex<String>>) {
    let mut account = Account::new("Work", "me@example.com", AccountType::Smtp)
        .with_signature("Taro");
    account.settings.outgoing_server = "smtp.example.com".into();

    let (client_end, server_end) = tokio::io::duplex(64 * 1024);
    let data = Arc::new(Mutex::new(String::new()));
    smtp_server(server_end, refused, Arc::clone(&data));

    let client = wabimail_smtp::Client::from_stream(client_end)
        .await
        .unwrap()
        .ehlo("test.local")
        .await
        .unwrap();
    let mut adapter = SmtpAdapter::new(account, Some(Credential::Password("pw".into())));
    adapter.start(client).await.unwrap();
    (adapter, data)
}

#[tokio::test]
async fn test_one_of_three_recipients_rejected() {
    let (mut adapter, data) = smtp_adapter(&["nobody@"]).await;
    let message = OutgoingMessage::new("Quarterly numbers", "Attached below.")
        .with_to("alice@example.org")
        .with_to("nobody@example.org")
        .with_bcc("boss@example.org");

    let report = adapter.send(&message).await.unwrap();
    assert!(report.is_partial());
    assert_eq!(report.accepted.len(), 2);
    assert_eq!(report.rejected.len(), 1);
    assert_eq!(report.rejected[0].address, "nobody@example.org");

    let payload = data.lock().await.clone();
    assert!(payload.contains("Subject: Quarterly numbers"));
    assert!(payload.contains("-- \nTaro"));
    assert!(!payload.contains("boss@example.org"));
    adapter.disconnect().await;
}

#[tokio::test]
async fn test_every_recipient_rejected() {
    let (mut adapter, _) = smtp_adapter(&["a@", "b@"]).await;
    let message = OutgoingMessage::new("Hi", "Hello")
        .with_to("a@example.org")
        .with_cc("b@example.org");

    match adapter.send(&message).await.unwrap_err() {
        Error::AllRecipientsRejected(rejected) => assert_eq!(rejected.len(), 2),
        other => panic!("unexpected error: {other}"),
    }
}

#[tokio::test]
async fn test_imap_move_without_move_extension() {
    let mock = Builder::new()
        .read(b"* OK [CAPABILITY IMAP4rev1] ready\r\n")
        .write(b"A0001 LOGIN me@example.com pw\r\n")
        .read(b"A0001 OK Logged in\r\n")
        .write(b"A0002 SELECT INBOX\r\n")
        .read(b"* 1 EXISTS\r\nA0002 OK [READ-WRITE] SELECT completed\r\n")
        .write(b"A0003 UID COPY 9 Archive\r\n")
        .read(b"A0003 OK COPY completed\r\n")
        .write(b"A0004 UID STORE 9 +FLAGS.SILENT (\\Deleted)\r\n")
        .read(b"A0004 OK STORE completed\r\n")
        .write(b"A0005 EXPUNGE\r\n")
        .read(b"* 1 EXPUNGE\r\nA0005 OK EXPUNGE completed\r\n")
        .write(b"A0006 UID STORE 3 FLAGS.SILENT (\\Flagged)\r\n")
        .read(b"A0006 OK STORE completed\r\n")
        .write(b"A0007 LOGOUT\r\n")
        .read(b"* BYE\r\nA0007 OK LOGOUT completed\r\n")
        .build();

    let mut account = Account::new("Work", "me@example.com", AccountType::Imap);
    account.settings.incoming_server = "imap.example.com".into();
    let mut adapter = ImapAdapter::new(account, Some(Credential::Password("pw".into())));
    adapter
        .start(wabimail_imap::Client::from_stream(mock).await.unwrap())
        .await
        .unwrap();

    adapter
        .move_message(&MessageId::imap("INBOX", 9), "Archive")
        .await
        .unwrap();
    adapter
        .set_flags(
            &MessageId::imap("INBOX", 3),
            FlagAction::Replace,
            &[wabimail_core::service::MessageFlag::Flagged],
        )
        .await
        .unwrap();
    adapter.disconnect().await;
    assert!(!adapter.is_connected());
}
