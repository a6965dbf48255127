//! Deploy notification adapters.
//!
//! Implements the [`deploy::NotificationSink`] trait twice:
//!
//! - [`MailgunNotifier`]: posts one e-mail per completed sync to the Mailgun
//!   messages API over HTTPS.
//! - [`LogNotifier`]: writes the same subject line to the service log; used
//!   when e-mail is disabled.
//!
//! ## Architectural Layer
//!
//! **Infrastructure.** HTTP transport and message formatting live here. The
//! gateway treats every sink as fire-and-forget: a [`deploy::NotifyError`] is
//! logged and dropped, never retried.

mod log;
mod mailgun;
pub mod message;

pub use log::LogNotifier;
pub use mailgun::{MailgunNotifier, MailgunSettings};
