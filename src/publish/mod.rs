//! Durable outputs and outbound messages: the run artifact log, the idea
//! archive, operator feedback, and notifications.

pub mod archive;
pub mod artifact;
pub mod feedback;
pub mod notify;

pub use archive::{ArchivedIdea, IdeaArchive};
pub use artifact::{ARTIFACT_SCHEMA_VERSION, ArtifactLog, BatchRecord};
pub use feedback::{FeedbackLog, FeedbackRecord, FeedbackSummary};
pub use notify::{
    EmbedField, Notification, NotificationSink, NullSink, WebhookSink, build_sink, idea_alert,
    system_alert,
};
