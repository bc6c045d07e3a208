//! Notification fan-out, rendering and delivery

pub mod delivery;
pub mod fanout;
pub mod render;
pub mod sendgrid;
pub mod slack;

pub use delivery::{ChatWebhook, Delivery, DeliveryReport, MailTransport};
pub use fanout::{NotificationItem, UpdateNotifier, UserCache, UserQueue};
pub use render::{SlackAttachment, SlackField, SlackPayload};
pub use sendgrid::SendGridMailer;
pub use slack::SlackWebhookClient;
