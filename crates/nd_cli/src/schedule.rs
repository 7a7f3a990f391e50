use std::future::Future;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::info;

/// Delay before the first scrape after startup.
pub const SCRAPE_OFFSET: Duration = Duration::from_secs(60);
/// Delay before the first scoring run, leaving the first scrape time to finish.
pub const SCORE_OFFSET: Duration = Duration::from_secs(11 * 60);

/// Run `job` every `every`, first after `first_in`. A run that overlaps the
/// next tick delays it instead of piling up.
pub fn spawn_every<F, Fut>(name: &'static str, first_in: Duration, every: Duration, job: F) -> JoinHandle<()>
where
    F: Fn() -> Fut + Send + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    tokio::spawn(async move {
        let mut ticker = interval_at(Instant::now() + first_in, every);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        info!(job = name, first_in_secs = first_in.as_secs(), every_secs = every.as_secs(), "⏰ Scheduled job");
        loop {
            ticker.tick().await;
            info!(job = name, "Starting scheduled run");
            job().await;
        }
    })
}
