//! AUTHENTICATE command handler.
//!
//! Real Microsoft IMAP only accepts SASL XOAUTH2: the client sends
//! `AUTHENTICATE XOAUTH2`, the server replies with an empty
//! continuation (`+ \r\n`), and the client answers with one
//! base64-encoded line carrying `user=...\x01auth=Bearer ...\x01\x01`.
//! This fake accepts any well-formed response -- it exists to exercise
//! the client's connect/authenticate/fetch/logout sequence, not to
//! validate tokens.

use crate::fake_imap::io::write_line;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, BufReader};

/// Handle `AUTHENTICATE XOAUTH2`. Reads the client's base64 SASL
/// continuation line and replies OK as long as it decodes and looks
/// like an XOAUTH2 initial response (`user=...\x01auth=...`).
pub async fn handle_authenticate<S: AsyncRead + AsyncWrite + Unpin>(
    tag: &str,
    stream: &mut BufReader<S>,
) -> bool {
    if write_line(stream, "+ \r\n").await.is_err() {
        return false;
    }

    let mut line = String::new();
    if stream.read_line(&mut line).await.is_err() {
        return false;
    }

    let decoded = STANDARD.decode(line.trim().as_bytes());
    let well_formed = matches!(
        decoded.as_deref().map(|b| String::from_utf8_lossy(b).into_owned()),
        Ok(s) if s.starts_with("user=") && s.contains("auth=Bearer ")
    );

    let resp = if well_formed {
        format!("{tag} OK AUTHENTICATE completed\r\n")
    } else {
        format!("{tag} NO AUTHENTICATE failed\r\n")
    };
    write_line(stream, &resp).await.is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncWriteExt, BufReader, duplex};

    async fn run(tag: &str, sasl_line: &str) -> (String, bool) {
        let (client, server) = duplex(4096);
        let mut stream = BufReader::new(server);
        let tag = tag.to_string();

        let handler = tokio::spawn(async move { handle_authenticate(&tag, &mut stream).await });

        let mut client = BufReader::new(client);
        let mut cont = String::new();
        client.read_line(&mut cont).await.unwrap();
        assert_eq!(cont, "+ \r\n");

        client
            .get_mut()
            .write_all(format!("{sasl_line}\r\n").as_bytes())
            .await
            .unwrap();

        let ok = handler.await.unwrap();
        let mut final_line = String::new();
        client.read_line(&mut final_line).await.unwrap();

        (final_line, ok)
    }

    fn xoauth2_line(address: &str, token: &str) -> String {
        STANDARD.encode(format!("user={address}\x01auth=Bearer {token}\x01\x01"))
    }

    #[tokio::test]
    async fn accepts_well_formed_xoauth2_response() {
        let line = xoauth2_line("a@x.com", "tok123");
        let (output, ok) = run("A1", &line).await;
        assert!(ok);
        assert!(output.contains("A1 OK AUTHENTICATE completed"));
    }

    #[tokio::test]
    async fn rejects_garbage_response() {
        let (output, _) = run("A1", "not-base64-at-all-!!!").await;
        assert!(output.contains("A1 NO AUTHENTICATE failed"));
    }
}
