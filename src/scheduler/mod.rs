use anyhow::{Context, Result};
use chrono::{Duration as ChronoDuration, Local, LocalResult, NaiveDate, NaiveTime, TimeZone};
use std::future::Future;
use tokio::time::{Duration, sleep};
use tracing::{error, info};

const RESCHEDULE_POLL_SECONDS: u64 = 30;

// Runs `task` once per day at the provided local time. The provider is re-read
// every cycle so a config change takes effect without a restart.
pub async fn run_daily_rollup<S, F, Fut>(mut schedule_provider: S, mut task: F) -> Result<()>
where
    S: FnMut() -> Result<NaiveTime>,
    F: FnMut(NaiveDate) -> Fut,
    Fut: Future<Output = Result<()>>,
{
    let mut last_logged_time: Option<NaiveTime> = None;

    loop {
        let target_time = match schedule_provider() {
            Ok(value) => value,
            Err(error) => {
                error!(error = %error, "failed to load rollup schedule");
                sleep(Duration::from_secs(RESCHEDULE_POLL_SECONDS)).await;
                continue;
            }
        };

        let delay = match delay_until(target_time) {
            Ok(value) => value,
            Err(error) => {
                error!(error = %error, time = %target_time, "invalid rollup time");
                sleep(Duration::from_secs(RESCHEDULE_POLL_SECONDS)).await;
                continue;
            }
        };

        if last_logged_time != Some(target_time) {
            info!(seconds = delay.as_secs(), time = %target_time, "next score rollup scheduled");
            last_logged_time = Some(target_time);
        }

        if delay > Duration::from_secs(RESCHEDULE_POLL_SECONDS) {
            sleep(Duration::from_secs(RESCHEDULE_POLL_SECONDS)).await;
            continue;
        }

        sleep(delay).await;

        let date = Local::now().date_naive();
        if let Err(error) = task(date).await {
            error!(error = %error, date = %date, "daily score rollup failed");
        }

        sleep(Duration::from_secs(1)).await;
    }
}

fn delay_until(target_time: NaiveTime) -> Result<Duration> {
    let now = Local::now();
    let today = now.date_naive();

    let candidate_today = match Local.from_local_datetime(&today.and_time(target_time)) {
        LocalResult::Single(datetime) => datetime,
        // DST gap: the wall-clock time does not exist today, run tomorrow.
        _ => {
            let fallback_day = today + ChronoDuration::days(1);
            Local
                .from_local_datetime(&fallback_day.and_time(target_time))
                .single()
                .context("Failed to convert rollup time")?
        }
    };

    let next_run = if candidate_today > now {
        candidate_today
    } else {
        let tomorrow = today + ChronoDuration::days(1);
        Local
            .from_local_datetime(&tomorrow.and_time(target_time))
            .single()
            .context("Failed to convert next rollup time")?
    };

    (next_run - now)
        .to_std()
        .context("Failed to compute rollup delay")
}

#[cfg(test)]
mod tests {
    use super::delay_until;
    use chrono::NaiveTime;

    #[test]
    fn rollup_delay_is_positive() {
        let target = NaiveTime::from_hms_opt(23, 55, 0).expect("time");
        let delay = delay_until(target).expect("delay");
        assert!(delay.as_secs() > 0);
        assert!(delay.as_secs() <= 24 * 3600);
    }

    #[test]
    fn past_time_rolls_to_tomorrow() {
        let now = chrono::Local::now().time();
        let minute_ago = now - chrono::Duration::minutes(1);
        let delay = delay_until(minute_ago).expect("delay");
        assert!(delay.as_secs() > 23 * 3600);
    }
}
