use std::time::{Duration, Instant};

use project_matching_database::{matching, schedule, DatabaseError, DatabasePool};
use project_matching_optimizer::entities::AttemptId;
use project_matching_optimizer::progress::ProgressReporter;
use tokio::sync::mpsc::{UnboundedReceiver, UnboundedSender};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Milestone {
    pub percent: u8,
    pub message: String,
}

/// Which attempt table progress is written to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProgressTarget {
    Matching(AttemptId),
    Schedule(AttemptId),
}

/// Hands milestones from the blocking solve over to the async writer.
///
/// A milestone that does not advance the percentage is dropped unless `interval`
/// has passed since the last one sent.
#[derive(Debug)]
pub struct ChannelProgress {
    sender: UnboundedSender<Milestone>,
    interval: Duration,
    last_sent: Option<(u8, Instant)>,
}

impl ChannelProgress {
    #[must_use]
    pub const fn new(sender: UnboundedSender<Milestone>, interval: Duration) -> Self {
        Self {
            sender,
            interval,
            last_sent: None,
        }
    }
}

impl ProgressReporter for ChannelProgress {
    fn report(&mut self, percent: u8, message: &str) {
        let now = Instant::now();
        let due = self.last_sent.is_none_or(|(last_percent, last)| {
            percent > last_percent || now.duration_since(last) >= self.interval
        });
        if !due {
            return;
        }
        self.last_sent = Some((percent, now));
        // the writer only goes away once the job is over
        let _ = self.sender.send(Milestone {
            percent,
            message: message.to_owned(),
        });
    }
}

async fn write(
    pool: &DatabasePool,
    target: ProgressTarget,
    milestone: &Milestone,
) -> Result<(), DatabaseError> {
    let mut connection = pool.get().await?;
    match target {
        ProgressTarget::Matching(attempt) => {
            matching::set_progress(&mut connection, attempt, milestone.percent, &milestone.message)
                .await
        }
        ProgressTarget::Schedule(attempt) => {
            schedule::set_progress(&mut connection, attempt, milestone.percent, &milestone.message)
                .await
        }
    }
}

/// Drains `receiver` into the database until every sender is dropped.
///
/// Progress is advisory, so write failures are logged and skipped.
pub fn spawn_progress_writer(
    pool: DatabasePool,
    target: ProgressTarget,
    mut receiver: UnboundedReceiver<Milestone>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(milestone) = receiver.recv().await {
            debug!(?target, percent = milestone.percent, message = %milestone.message, "progress");
            if let Err(error) = write(&pool, target, &milestone).await {
                warn!(?target, %error, "could not record progress");
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use project_matching_optimizer::progress::{Monotonic, ProgressReporter};
    use tokio::sync::mpsc;

    use super::{ChannelProgress, Milestone};

    fn drain(receiver: &mut mpsc::UnboundedReceiver<Milestone>) -> Vec<u8> {
        let mut seen = Vec::new();
        while let Ok(milestone) = receiver.try_recv() {
            seen.push(milestone.percent);
        }
        seen
    }

    #[test]
    fn repeats_are_throttled_but_advances_pass() {
        let (sender, mut receiver) = mpsc::unbounded_channel();
        let mut progress = ChannelProgress::new(sender, Duration::from_secs(3600));
        progress.report(5, "start");
        progress.report(5, "still starting");
        progress.report(30, "model");
        progress.report(100, "done");
        assert_eq!(drain(&mut receiver), vec![5, 30, 100]);
    }

    #[test]
    fn monotonic_wrapper_drops_regressions() {
        let (sender, mut receiver) = mpsc::unbounded_channel();
        let mut progress = Monotonic::new(ChannelProgress::new(sender, Duration::ZERO));
        progress.report(50, "solving");
        progress.report(20, "stale");
        progress.report(80, "decoding");
        drop(progress);
        assert_eq!(drain(&mut receiver), vec![50, 80]);
    }

    #[test]
    fn closed_writer_is_ignored() {
        let (sender, receiver) = mpsc::unbounded_channel();
        drop(receiver);
        let mut progress = ChannelProgress::new(sender, Duration::ZERO);
        progress.report(10, "nobody listens");
    }
}
