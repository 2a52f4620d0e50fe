//! Outbound mail: message assembly, the Gmail REST client and the retrying
//! notification dispatcher.

pub mod client;
pub mod dispatcher;
pub mod error;
pub mod mime;
pub mod transport;

pub use {
    client::GmailClient,
    dispatcher::{DeliveryObserver, DeliveryOutcome, Notification, NotificationDispatcher},
    error::{Error, Result},
    mime::MailMessage,
    transport::{GmailTransport, MailTransport},
};
