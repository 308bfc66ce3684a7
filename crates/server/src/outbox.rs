use std::path::PathBuf;

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use chrono::Utc;
use tracing::info;
use uuid::Uuid;

use quotecraft_core::delivery::{DeliveryError, MailTransport, OutgoingMail};

const LINE_WIDTH: usize = 76;

/// Writes each accepted message as an `.eml` file into a pickup directory
/// served by the local MTA.
pub struct OutboxTransport {
    dir: PathBuf,
}

impl OutboxTransport {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }
}

#[async_trait]
impl MailTransport for OutboxTransport {
    async fn send(&self, mail: &OutgoingMail) -> Result<(), DeliveryError> {
        tokio::fs::create_dir_all(&self.dir).await.map_err(|error| {
            DeliveryError::Transport(format!("outbox `{}` unavailable: {error}", self.dir.display()))
        })?;

        let id = Uuid::new_v4();
        let final_path = self.dir.join(format!("{id}.eml"));
        let staging_path = self.dir.join(format!(".{id}.tmp"));

        // Pickup agents only see complete files.
        tokio::fs::write(&staging_path, to_mime(mail, id).as_bytes())
            .await
            .map_err(|error| DeliveryError::Transport(format!("outbox write failed: {error}")))?;
        tokio::fs::rename(&staging_path, &final_path)
            .await
            .map_err(|error| DeliveryError::Transport(format!("outbox write failed: {error}")))?;

        info!(
            event_name = "delivery.outbox.written",
            path = %final_path.display(),
            has_attachment = mail.attachment.is_some(),
            "mail written to outbox"
        );
        Ok(())
    }
}

/// Rejects every message; used when `mail.enabled = false`.
pub struct DisabledTransport;

#[async_trait]
impl MailTransport for DisabledTransport {
    async fn send(&self, _mail: &OutgoingMail) -> Result<(), DeliveryError> {
        Err(DeliveryError::Transport("mail delivery is disabled".to_string()))
    }
}

fn to_mime(mail: &OutgoingMail, id: Uuid) -> String {
    let boundary = format!("quotecraft-{}", id.simple());
    let mut message = String::new();
    message.push_str(&format!("Message-ID: <{id}@quotecraft>\r\n"));
    message.push_str(&format!("Date: {}\r\n", Utc::now().to_rfc2822()));
    message.push_str(&format!("From: {}\r\n", header_value(&mail.from)));
    message.push_str(&format!("To: {}\r\n", header_value(&mail.to)));
    message.push_str(&format!("Subject: {}\r\n", header_value(&mail.subject)));
    message.push_str("MIME-Version: 1.0\r\n");

    let Some(attachment) = &mail.attachment else {
        message.push_str("Content-Type: text/html; charset=utf-8\r\n");
        message.push_str("Content-Transfer-Encoding: base64\r\n\r\n");
        message.push_str(&wrapped_base64(mail.html_body.as_bytes()));
        return message;
    };

    message.push_str(&format!("Content-Type: multipart/mixed; boundary=\"{boundary}\"\r\n\r\n"));
    message.push_str(&format!("--{boundary}\r\n"));
    message.push_str("Content-Type: text/html; charset=utf-8\r\n");
    message.push_str("Content-Transfer-Encoding: base64\r\n\r\n");
    message.push_str(&wrapped_base64(mail.html_body.as_bytes()));
    message.push_str(&format!("--{boundary}\r\n"));
    message.push_str(&format!("Content-Type: {}\r\n", attachment.content_type));
    message.push_str(&format!(
        "Content-Disposition: attachment; filename=\"{}\"\r\n",
        header_value(&attachment.filename).replace('"', "")
    ));
    message.push_str("Content-Transfer-Encoding: base64\r\n\r\n");
    message.push_str(&wrapped_base64(&attachment.bytes));
    message.push_str(&format!("--{boundary}--\r\n"));
    message
}

/// Strips CR/LF so user-supplied values cannot inject headers.
fn header_value(raw: &str) -> String {
    raw.chars().filter(|ch| *ch != '\r' && *ch != '\n').collect()
}

fn wrapped_base64(bytes: &[u8]) -> String {
    let encoded = STANDARD.encode(bytes);
    let mut wrapped = String::with_capacity(encoded.len() + encoded.len() / LINE_WIDTH * 2 + 2);
    for chunk in encoded.as_bytes().chunks(LINE_WIDTH) {
        wrapped.push_str(&String::from_utf8_lossy(chunk));
        wrapped.push_str("\r\n");
    }
    wrapped
}
