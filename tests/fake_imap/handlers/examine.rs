//! EXAMINE command handler.
//!
//! Microsoft's IMAP client only ever opens a folder read-only (RFC
//! 3501 Section 6.3.2) before SEARCH/FETCH, never SELECT, so the fake
//! server only implements EXAMINE. The response shape is the same as
//! SELECT except the final tagged line reports `[READ-ONLY]` and
//! `PERMANENTFLAGS` is empty, since the client can never mutate flags
//! in this mode.

use crate::fake_imap::io::write_line;
use crate::fake_imap::mailbox::Mailbox;
use tokio::io::{AsyncRead, AsyncWrite, BufReader};

/// Handle the EXAMINE command. Returns the selected folder name.
pub async fn handle_examine<S: AsyncRead + AsyncWrite + Unpin>(
    tag: &str,
    folder_name: &str,
    mailbox: &Mailbox,
    stream: &mut BufReader<S>,
) -> Option<String> {
    if let Some(folder) = mailbox.get_folder(folder_name) {
        let _ = write_line(
            stream,
            "* FLAGS (\\Seen \\Answered \\Flagged \\Deleted \\Draft)\r\n",
        )
        .await;

        let exists = format!("* {} EXISTS\r\n", folder.emails.len());
        let _ = write_line(stream, &exists).await;

        let _ = write_line(stream, "* 0 RECENT\r\n").await;
        let _ = write_line(stream, "* OK [UIDVALIDITY 1]\r\n").await;

        let uidnext = folder
            .emails
            .iter()
            .map(|e| e.uid)
            .max()
            .map_or(1, |max| max + 1);
        let _ = write_line(stream, &format!("* OK [UIDNEXT {uidnext}]\r\n")).await;

        let _ = write_line(stream, "* OK [PERMANENTFLAGS ()] No permanent flags\r\n").await;

        if let Some(pos) = folder.emails.iter().position(|e| !e.seen) {
            let _ = write_line(stream, &format!("* OK [UNSEEN {}]\r\n", pos + 1)).await;
        }

        let resp = format!("{tag} OK [READ-ONLY] EXAMINE completed\r\n");
        let _ = write_line(stream, &resp).await;
        Some(folder_name.to_string())
    } else {
        let resp = format!("{tag} NO Folder not found\r\n");
        let _ = write_line(stream, &resp).await;
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fake_imap::mailbox::MailboxBuilder;
    use tokio::io::BufReader;

    fn make_raw_email() -> Vec<u8> {
        b"From: a@b.com\r\nSubject: Test\r\n\r\nBody".to_vec()
    }

    async fn run(tag: &str, folder_name: &str, mailbox: &Mailbox) -> (String, Option<String>) {
        let (client, server) = tokio::io::duplex(4096);
        let mut stream = BufReader::new(server);

        let selected = handle_examine(tag, folder_name, mailbox, &mut stream).await;
        drop(stream);

        let mut buf = Vec::new();
        tokio::io::AsyncReadExt::read_to_end(&mut BufReader::new(client), &mut buf)
            .await
            .unwrap();
        (String::from_utf8(buf).unwrap(), selected)
    }

    #[tokio::test]
    async fn examines_existing_folder_read_only() {
        let raw = make_raw_email();
        let mailbox = MailboxBuilder::new()
            .folder("INBOX")
            .email(1, false, &raw)
            .email(2, true, &raw)
            .build();

        let (output, selected) = run("A1", "INBOX", &mailbox).await;

        assert_eq!(selected, Some("INBOX".to_string()));
        assert!(output.contains("* 2 EXISTS"));
        assert!(output.contains("A1 OK [READ-ONLY] EXAMINE completed"));
    }

    #[tokio::test]
    async fn returns_none_for_missing_folder() {
        let mailbox = MailboxBuilder::new().folder("INBOX").build();

        let (output, selected) = run("A1", "NoSuchFolder", &mailbox).await;

        assert!(selected.is_none());
        assert!(output.contains("A1 NO Folder not found"));
    }

    #[tokio::test]
    async fn permanentflags_are_empty_in_read_only_mode() {
        let mailbox = MailboxBuilder::new().folder("INBOX").build();
        let (output, _) = run("A1", "INBOX", &mailbox).await;
        assert!(output.contains("* OK [PERMANENTFLAGS ()]"));
    }

    #[tokio::test]
    async fn sends_uidnext_response() {
        let raw = make_raw_email();
        let mailbox = MailboxBuilder::new()
            .folder("INBOX")
            .email(5, true, &raw)
            .email(10, true, &raw)
            .build();
        let (output, _) = run("A1", "INBOX", &mailbox).await;
        assert!(output.contains("* OK [UIDNEXT 11]"));
    }
}
