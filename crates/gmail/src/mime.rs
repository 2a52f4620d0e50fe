//! Plain-text RFC 822 message assembly.

use base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD};

/// One outgoing plain-text email.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MailMessage {
    pub from: String,
    pub to: Vec<String>,
    pub subject: String,
    pub body: String,
}

impl MailMessage {
    /// Render headers and body with CRLF line endings.
    ///
    /// CR and LF inside header values become spaces so caller-supplied text
    /// cannot start a new header.
    pub fn to_rfc822(&self) -> String {
        let to = self
            .to
            .iter()
            .map(|addr| header_value(addr))
            .collect::<Vec<_>>()
            .join(", ");
        format!(
            "From: {}\r\nTo: {}\r\nSubject: {}\r\nMIME-Version: 1.0\r\nContent-Type: text/plain; charset=\"UTF-8\"\r\n\r\n{}",
            header_value(&self.from),
            to,
            header_value(&self.subject),
            self.body,
        )
    }

    /// The `raw` field Gmail's `messages.send` expects: base64url, unpadded.
    pub fn encode_raw(&self) -> String {
        URL_SAFE_NO_PAD.encode(self.to_rfc822())
    }
}

fn header_value(value: &str) -> String {
    value.replace(['\r', '\n'], " ")
}
