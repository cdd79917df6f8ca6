//! Stage 6: record the batch, alert on top ideas, archive.

use std::sync::Arc;

use anyhow::Context;
use tracing::{info, warn};

use super::StageContext;
use crate::candidate::Candidate;
use crate::errors::PipelineError;
use crate::orchestrator::outputs::{PublicationOutput, StageOutcome};
use crate::publish::{ArtifactLog, IdeaArchive, NotificationSink, idea_alert};

pub async fn run(
    ctx: &StageContext<'_>,
    graded: &[Candidate],
    notifier: &Arc<dyn NotificationSink>,
) -> Result<StageOutcome<PublicationOutput>, PipelineError> {
    // The run artifact is the durable contract for downstream readers.
    ArtifactLog::new(ctx.config.artifact_file())
        .append(ctx.batch_id, ctx.now, graded)
        .context("Failed to append run artifact")?;

    let mut notes = Vec::new();
    let mut sent = 0;
    let mut failed = 0;
    for alert in graded.iter().filter_map(|idea| idea_alert(idea, ctx.batch_id)) {
        if notifier.send(&alert).await {
            sent += 1;
        } else {
            warn!(title = %alert.title, "Idea notification not delivered");
            failed += 1;
        }
    }
    if failed > 0 {
        notes.push(format!("{} notification(s) not delivered", failed));
    }

    let archived = match IdeaArchive::new(ctx.config.archive_file()).append(ctx.batch_id, graded, ctx.now) {
        Ok(n) => n,
        Err(e) => {
            warn!(error = %e, "Failed to archive ideas");
            notes.push(format!("Archive append failed: {:#}", e));
            0
        }
    };

    info!(
        published = graded.len(),
        notifications_sent = sent,
        notifications_failed = failed,
        archived,
        "Batch published"
    );

    Ok(StageOutcome::from_notes(
        PublicationOutput {
            published: graded.len(),
            notifications_sent: sent,
            notifications_failed: failed,
            archived,
            duration_sec: 0.0,
        },
        notes,
    ))
}
