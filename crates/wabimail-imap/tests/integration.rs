//! Scripted sessions against a mock server.

#![allow(clippy::unwrap_used)]

use tokio_test::io::Builder;

use wabimail_imap::{Client, Error, Flag, FolderAttribute, SearchCriteria, StoreAction};
use wabimail_oauth::sasl::xoauth2_response;

const GREETING: &[u8] = b"* OK [CAPABILITY IMAP4rev1 SASL-IR AUTH=XOAUTH2 MOVE] ready\r\n";
const PLAIN_GREETING: &[u8] = b"* OK [CAPABILITY IMAP4rev1 AUTH=XOAUTH2] ready\r\n";

#[tokio::test]
async fn test_login_list_and_status() {
    let mock = Builder::new()
        .read(GREETING)
        .write(b"A0001 LOGIN user@example.com secret\r\n")
        .read(b"A0001 OK [CAPABILITY IMAP4rev1 MOVE UIDPLUS] Logged in\r\n")
        .write(b"A0002 LIST \"\" \"*\"\r\n")
        .read(b"* LIST (\\HasNoChildren) \"/\" INBOX\r\n")
        .read(b"* LIST (\\HasNoChildren \\Trash) \"/\" Trash\r\n")
        .read(b"* LIST (\\Noselect \\HasChildren) \"/\" &U9dP4Xux-\r\n")
        .read(b"A0002 OK LIST completed\r\n")
        .write(b"A0003 STATUS INBOX (MESSAGES RECENT UNSEEN UIDNEXT UIDVALIDITY)\r\n")
        .read(b"* STATUS INBOX (MESSAGES 12 RECENT 0 UNSEEN 3 UIDNEXT 40 UIDVALIDITY 9)\r\n")
        .read(b"A0003 OK STATUS completed\r\n")
        .build();

    let client = Client::from_stream(mock).await.unwrap();
    assert!(client.supports_auth("XOAUTH2"));

    let mut client = client.login("user@example.com", "secret").await.unwrap();
    assert!(client.has_capability("uidplus"));
    assert!(!client.supports_auth("XOAUTH2"));

    let folders = client.list("", "*").await.unwrap();
    assert_eq!(folders.len(), 3);
    assert_eq!(folders[1].special_use(), Some(&FolderAttribute::Trash));
    assert_eq!(folders[2].name, "受信箱");
    assert!(!folders[2].is_selectable());

    let status = client.status("INBOX").await.unwrap();
    assert_eq!(status.messages, Some(12));
    assert_eq!(status.unseen, Some(3));
    assert_eq!(status.uid_validity, Some(9));
}

#[tokio::test]
async fn test_login_rejected() {
    let mock = Builder::new()
        .read(GREETING)
        .write(b"A0001 LOGIN user@example.com wrong\r\n")
        .read(b"A0001 NO [AUTHENTICATIONFAILED] Invalid credentials\r\n")
        .build();

    let client = Client::from_stream(mock).await.unwrap();
    let err = client.login("user@example.com", "wrong").await.unwrap_err();
    assert!(matches!(err, Error::Auth(text) if text == "Invalid credentials"));
}

#[tokio::test]
async fn test_greeting_bye() {
    let mock = Builder::new()
        .read(b"* BYE Too many connections\r\n")
        .build();
    let err = Client::from_stream(mock).await.unwrap_err();
    assert!(matches!(err, Error::Bye(_)));
    assert!(err.is_connection());
}

#[tokio::test]
async fn test_xoauth2_initial_response() {
    let initial = xoauth2_response("user@gmail.com", "ya29.token");
    let command = format!("A0001 AUTHENTICATE XOAUTH2 {initial}\r\n");
    let mock = Builder::new()
        .read(GREETING)
        .write(command.as_bytes())
        .read(b"A0001 OK user@gmail.com authenticated (Success)\r\n")
        .build();

    let client = Client::from_stream(mock).await.unwrap();
    client
        .authenticate_xoauth2("user@gmail.com", "ya29.token")
        .await
        .unwrap();
}

#[tokio::test]
async fn test_xoauth2_without_sasl_ir() {
    let initial = xoauth2_response("user@gmail.com", "ya29.token");
    let mock = Builder::new()
        .read(PLAIN_GREETING)
        .write(b"A0001 AUTHENTICATE XOAUTH2\r\n")
        .read(b"+ \r\n")
        .write(format!("{initial}\r\n").as_bytes())
        .read(b"A0001 OK Success\r\n")
        .build();

    let client = Client::from_stream(mock).await.unwrap();
    client
        .authenticate_xoauth2("user@gmail.com", "ya29.token")
        .await
        .unwrap();
}

#[tokio::test]
async fn test_xoauth2_rejected_token() {
    let initial = xoauth2_response("user@gmail.com", "expired");
    let command = format!("A0001 AUTHENTICATE XOAUTH2 {initial}\r\n");
    // {"status":"401","schemes":"bearer","scope":"https://mail.google.com/"}
    let challenge = b"+ eyJzdGF0dXMiOiI0MDEiLCJzY2hlbWVzIjoiYmVhcmVyIiwic2NvcGUiOiJodHRwczovL21haWwuZ29vZ2xlLmNvbS8ifQ==\r\n";
    let mock = Builder::new()
        .read(GREETING)
        .write(command.as_bytes())
        .read(challenge)
        .write(b"\r\n")
        .read(b"A0001 NO [AUTHENTICATIONFAILED] Invalid credentials (Failure)\r\n")
        .build();

    let client = Client::from_stream(mock).await.unwrap();
    let err = client
        .authenticate_xoauth2("user@gmail.com", "expired")
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Auth(_)));
}

#[tokio::test]
async fn test_select_search_fetch_store() {
    let mock = Builder::new()
        .read(GREETING)
        .write(b"A0001 LOGIN user pass\r\n")
        .read(b"A0001 OK Logged in\r\n")
        .write(b"A0002 SELECT INBOX\r\n")
        .read(b"* FLAGS (\\Answered \\Flagged \\Deleted \\Seen \\Draft)\r\n")
        .read(b"* 3 EXISTS\r\n* 0 RECENT\r\n")
        .read(b"* OK [UIDVALIDITY 1700000000] UIDs valid\r\n")
        .read(b"* OK [UIDNEXT 12] Predicted next UID\r\n")
        .read(b"A0002 OK [READ-WRITE] SELECT completed\r\n")
        .write(b"A0003 UID SEARCH UNSEEN\r\n")
        .read(b"* SEARCH 11 7\r\n")
        .read(b"A0003 OK SEARCH completed\r\n")
        .write(b"A0004 UID FETCH 7,11 (UID FLAGS RFC822.SIZE INTERNALDATE BODY.PEEK[])\r\n")
        .read(b"* 2 FETCH (UID 7 FLAGS () RFC822.SIZE 16 BODY[] {16}\r\nSubject: one\r\n\r\n)\r\n")
        .read(b"* 3 FETCH (UID 11 FLAGS (\\Flagged) RFC822.SIZE 16 BODY[] {16}\r\nSubject: two\r\n\r\n)\r\n")
        .read(b"A0004 OK FETCH completed\r\n")
        .write(b"A0005 UID STORE 7 +FLAGS.SILENT (\\Seen)\r\n")
        .read(b"A0005 OK STORE completed\r\n")
        .write(b"A0006 LOGOUT\r\n")
        .read(b"* BYE Logging out\r\nA0006 OK LOGOUT completed\r\n")
        .build();

    let client = Client::from_stream(mock).await.unwrap();
    let client = client.login("user", "pass").await.unwrap();
    let mut inbox = client.select("INBOX").await.unwrap();
    assert_eq!(inbox.mailbox(), "INBOX");
    assert_eq!(inbox.mailbox_status().exists, 3);
    assert_eq!(inbox.mailbox_status().uid_validity, Some(1_700_000_000));
    assert_eq!(inbox.mailbox_status().uid_next, Some(12));
    assert!(!inbox.mailbox_status().read_only);

    let unseen = inbox.uid_search(SearchCriteria::Unseen).await.unwrap();
    assert_eq!(unseen, vec![7, 11]);

    let messages = inbox.uid_fetch(&unseen).await.unwrap();
    assert_eq!(messages.len(), 2);
    assert_eq!(messages[0].uid, Some(7));
    assert_eq!(messages[1].flags, vec![Flag::Flagged]);
    assert_eq!(messages[1].body.as_deref(), Some(&b"Subject: two\r\n\r\n"[..]));

    inbox
        .uid_store(&[7], StoreAction::Add, &[Flag::Seen])
        .await
        .unwrap();
    // Nothing is sent for an empty UID set.
    inbox
        .uid_store(&[], StoreAction::Add, &[Flag::Seen])
        .await
        .unwrap();
    assert!(inbox.uid_fetch(&[]).await.unwrap().is_empty());

    inbox.logout().await.unwrap();
}

#[tokio::test]
async fn test_move_falls_back_to_copy_and_expunge() {
    let mock = Builder::new()
        .read(PLAIN_GREETING)
        .write(b"A0001 LOGIN user pass\r\n")
        .read(b"A0001 OK Logged in\r\n")
        .write(b"A0002 SELECT INBOX\r\n")
        .read(b"* 5 EXISTS\r\nA0002 OK [READ-WRITE] SELECT completed\r\n")
        .write(b"A0003 UID COPY 5 Archive\r\n")
        .read(b"A0003 OK COPY completed\r\n")
        .write(b"A0004 UID STORE 5 +FLAGS.SILENT (\\Deleted)\r\n")
        .read(b"A0004 OK STORE completed\r\n")
        .write(b"A0005 EXPUNGE\r\n")
        .read(b"* 4 EXPUNGE\r\nA0005 OK EXPUNGE completed\r\n")
        .build();

    let client = Client::from_stream(mock).await.unwrap();
    let mut inbox = client
        .login("user", "pass")
        .await
        .unwrap()
        .select("INBOX")
        .await
        .unwrap();
    assert!(!inbox.supports_move());
    inbox.uid_move(&[5], "Archive").await.unwrap();
}

#[tokio::test]
async fn test_uid_expunge_with_uidplus() {
    let mock = Builder::new()
        .read(b"* OK [CAPABILITY IMAP4rev1 UIDPLUS] ready\r\n")
        .write(b"A0001 LOGIN user pass\r\n")
        .read(b"A0001 OK Logged in\r\n")
        .write(b"A0002 SELECT INBOX\r\n")
        .read(b"* 5 EXISTS\r\nA0002 OK [READ-WRITE] SELECT completed\r\n")
        .write(b"A0003 UID COPY 5 Archive\r\n")
        .read(b"A0003 OK COPY completed\r\n")
        .write(b"A0004 UID STORE 5 +FLAGS.SILENT (\\Deleted)\r\n")
        .read(b"A0004 OK STORE completed\r\n")
        .write(b"A0005 UID EXPUNGE 5\r\n")
        .read(b"* 4 EXPUNGE\r\nA0005 OK EXPUNGE completed\r\n")
        .write(b"A0006 UID EXPUNGE 7:8\r\n")
        .read(b"* 5 EXPUNGE\r\n* 5 EXPUNGE\r\nA0006 OK EXPUNGE completed\r\n")
        .build();

    let client = Client::from_stream(mock).await.unwrap();
    let mut inbox = client
        .login("user", "pass")
        .await
        .unwrap()
        .select("INBOX")
        .await
        .unwrap();
    assert!(inbox.supports_uidplus());
    inbox.uid_move(&[5], "Archive").await.unwrap();
    assert_eq!(inbox.uid_expunge(&[8, 7]).await.unwrap(), vec![5, 5]);
    assert!(inbox.uid_expunge(&[]).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_move_uses_move_when_advertised() {
    let mock = Builder::new()
        .read(GREETING)
        .write(b"A0001 LOGIN user pass\r\n")
        .read(b"A0001 OK Logged in\r\n")
        .write(b"A0002 SELECT INBOX\r\n")
        .read(b"* 5 EXISTS\r\nA0002 OK [READ-WRITE] SELECT completed\r\n")
        .write(b"A0003 UID MOVE 4:5 \"[Gmail]/All Mail\"\r\n")
        .read(b"* 4 EXPUNGE\r\n* 4 EXPUNGE\r\nA0003 OK MOVE completed\r\n")
        .build();

    let client = Client::from_stream(mock).await.unwrap();
    let mut inbox = client
        .login("user", "pass")
        .await
        .unwrap()
        .select("INBOX")
        .await
        .unwrap();
    inbox.uid_move(&[5, 4], "[Gmail]/All Mail").await.unwrap();
}

#[tokio::test]
async fn test_examine_is_read_only() {
    let mock = Builder::new()
        .read(GREETING)
        .write(b"A0001 LOGIN user pass\r\n")
        .read(b"A0001 OK Logged in\r\n")
        .write(b"A0002 EXAMINE INBOX\r\n")
        .read(b"* 1 EXISTS\r\nA0002 OK [READ-ONLY] EXAMINE completed\r\n")
        .write(b"A0003 CLOSE\r\n")
        .read(b"A0003 OK CLOSE completed\r\n")
        .build();

    let client = Client::from_stream(mock).await.unwrap();
    let mut inbox = client
        .login("user", "pass")
        .await
        .unwrap()
        .examine("INBOX")
        .await
        .unwrap();
    assert!(inbox.mailbox_status().read_only);

    let err = inbox
        .uid_store(&[1], StoreAction::Add, &[Flag::Deleted])
        .await
        .unwrap_err();
    assert!(matches!(err, Error::InvalidState(_)));
    assert!(matches!(inbox.expunge().await, Err(Error::InvalidState(_))));

    inbox.close().await.unwrap();
}

#[tokio::test]
async fn test_select_missing_mailbox() {
    let mock = Builder::new()
        .read(GREETING)
        .write(b"A0001 LOGIN user pass\r\n")
        .read(b"A0001 OK Logged in\r\n")
        .write(b"A0002 SELECT Nowhere\r\n")
        .read(b"A0002 NO [NONEXISTENT] Mailbox doesn't exist\r\n")
        .build();

    let client = Client::from_stream(mock).await.unwrap();
    let client = client.login("user", "pass").await.unwrap();
    let err = client.select("Nowhere").await.unwrap_err();
    assert!(matches!(err, Error::No(_)));
}
