//! Slack side of the relay: webhook classification, Web API lookups and
//! recipient resolution.

pub mod api;
pub mod error;
pub mod event;
pub mod resolver;

pub use {
    api::{SlackClient, SlackDirectory},
    error::{Error, Result},
    event::{ChannelEvent, Classification, IgnoreReason, classify},
    resolver::{RecipientResolver, Resolution, ResolverLimits},
};
