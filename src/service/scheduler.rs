use crate::error::PilotError;
use crate::service::plugin_actor::PluginHandle;
use crate::service::registry::PluginRegistry;
use crate::types::{TriggerAck, TriggerSource};
use chrono::Utc;
use chrono_tz::Tz;
use cron::Schedule;
use std::collections::BTreeSet;
use std::str::FromStr;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

const WEEKDAYS: [&str; 7] = ["Sun", "Mon", "Tue", "Wed", "Thu", "Fri", "Sat"];

/// Parse a cron expression.
///
/// Five-field expressions follow crontab: a `0` seconds field is prepended and
/// numeric days of week (0-7, both 0 and 7 meaning Sunday) become day names.
/// Six and seven field expressions are used as is.
pub fn parse_cron(expr: &str) -> Result<Schedule, PilotError> {
    let cron_err = |reason: String| PilotError::Cron {
        expr: expr.to_string(),
        reason,
    };
    let fields: Vec<&str> = expr.split_whitespace().collect();
    let normalized = if let [minute, hour, dom, month, dow] = fields[..] {
        let dow = crontab_weekdays(dow).map_err(cron_err)?;
        format!("0 {minute} {hour} {dom} {month} {dow}")
    } else {
        fields.join(" ")
    };
    Schedule::from_str(&normalized).map_err(|e| cron_err(e.to_string()))
}

/// Rewrite a crontab day-of-week field into day names.
fn crontab_weekdays(field: &str) -> Result<String, String> {
    let mut out = Vec::new();
    for item in field.split(',') {
        if !item.bytes().any(|b| b.is_ascii_digit()) {
            out.push(item.to_string());
            continue;
        }
        let (range, step) = match item.split_once('/') {
            Some((range, step)) => match step.parse::<usize>() {
                Ok(step) if step > 0 => (range, step),
                _ => return Err(format!("invalid step in `{item}`")),
            },
            None => (item, 1),
        };
        let (start, end) = match range.split_once('-') {
            _ if range == "*" => (0, 6),
            Some((a, b)) => (weekday_number(a)?, weekday_number(b)?),
            None if step > 1 => (weekday_number(range)?, 6),
            None => {
                let day = weekday_number(range)?;
                (day, day)
            }
        };
        if start > end {
            return Err(format!("day-of-week range `{item}` runs backwards"));
        }
        let days: BTreeSet<usize> = (start..=end).step_by(step).map(|d| d % 7).collect();
        out.extend(days.into_iter().map(|d| WEEKDAYS[d].to_string()));
    }
    Ok(out.join(","))
}

fn weekday_number(raw: &str) -> Result<usize, String> {
    raw.parse::<usize>()
        .ok()
        .filter(|d| *d <= 7)
        .ok_or_else(|| format!("day of week `{raw}` is outside 0-7"))
}

/// Time until the next fire of `schedule` in `tz`, or `None` if it never fires again.
pub fn until_next(schedule: &Schedule, tz: Tz) -> Option<Duration> {
    let now = Utc::now().with_timezone(&tz);
    let next = schedule.after(&now).next()?;
    Some((next - now).to_std().unwrap_or(Duration::ZERO))
}

/// Drives triggers for every scheduled plugin until stopped.
pub struct Scheduler {
    stop_tx: watch::Sender<bool>,
    tasks: Vec<JoinHandle<()>>,
}

impl Scheduler {
    pub async fn start(registry: &PluginRegistry, tz: Tz) -> Result<Self, PilotError> {
        let (stop_tx, stop_rx) = watch::channel(false);
        let mut tasks = Vec::new();

        for handle in registry.handles() {
            let job = handle.status().await?.job;

            if job.run_on_start {
                let ack = handle.trigger(TriggerSource::Startup).await;
                info!(plugin = handle.id(), ?ack, "startup run requested");
            }
            if let Some(expr) = job.cron.as_deref() {
                let schedule = parse_cron(expr)?;
                info!(plugin = handle.id(), cron = expr, %tz, "cron schedule armed");
                tasks.push(tokio::spawn(cron_loop(
                    handle.clone(),
                    schedule,
                    tz,
                    stop_rx.clone(),
                )));
            }
            if let Some(secs) = job.interval_secs.filter(|s| *s > 0) {
                info!(plugin = handle.id(), interval_secs = secs, "interval schedule armed");
                tasks.push(tokio::spawn(interval_loop(
                    handle.clone(),
                    Duration::from_secs(secs),
                    stop_rx.clone(),
                )));
            }
        }

        Ok(Self { stop_tx, tasks })
    }

    pub fn task_count(&self) -> usize {
        self.tasks.len()
    }

    /// Stop every loop and wait for them to exit.
    pub async fn stop(self) {
        let _ = self.stop_tx.send(true);
        for task in self.tasks {
            let _ = task.await;
        }
        debug!("scheduler stopped");
    }
}

async fn fire(handle: &PluginHandle) {
    match handle.trigger(TriggerSource::Schedule).await {
        TriggerAck::Started => debug!(plugin = handle.id(), "scheduled run started"),
        TriggerAck::Busy => debug!(plugin = handle.id(), "scheduled run skipped; still busy"),
        TriggerAck::Closed => debug!(plugin = handle.id(), "scheduled run skipped; closed"),
    }
}

async fn cron_loop(
    handle: PluginHandle,
    schedule: Schedule,
    tz: Tz,
    mut stop_rx: watch::Receiver<bool>,
) {
    loop {
        let Some(wait) = until_next(&schedule, tz) else {
            warn!(plugin = handle.id(), "cron schedule has no upcoming fire time");
            return;
        };
        tokio::select! {
            _ = tokio::time::sleep(wait) => fire(&handle).await,
            _ = stop_rx.changed() => return,
        }
    }
}

async fn interval_loop(handle: PluginHandle, every: Duration, mut stop_rx: watch::Receiver<bool>) {
    let start = tokio::time::Instant::now() + every;
    let mut ticker = tokio::time::interval_at(start, every);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    loop {
        tokio::select! {
            _ = ticker.tick() => fire(&handle).await,
            _ = stop_rx.changed() => return,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Datelike, Weekday};
    use std::collections::HashSet;

    #[test]
    fn five_field_cron_gets_seconds() {
        let schedule = parse_cron("30 8 * * *").unwrap();
        let tz: Tz = "Asia/Shanghai".parse().unwrap();
        let now = Utc::now().with_timezone(&tz);
        let next = schedule.after(&now).next().unwrap();
        assert_eq!(next.format("%H:%M:%S").to_string(), "08:30:00");
    }

    #[test]
    fn six_field_cron_is_used_as_is() {
        let schedule = parse_cron("15 0 9 * * *").unwrap();
        let next = schedule.upcoming(Utc).next().unwrap();
        assert_eq!(next.format("%H:%M:%S").to_string(), "09:00:15");
    }

    #[test]
    fn invalid_cron_reports_expression() {
        let err = parse_cron("every morning").unwrap_err();
        assert!(matches!(err, PilotError::Cron { ref expr, .. } if expr == "every morning"));
    }

    fn weekdays_of(expr: &str) -> HashSet<chrono::Weekday> {
        let schedule = parse_cron(expr).unwrap();
        schedule.upcoming(Utc).take(14).map(|t| t.weekday()).collect()
    }

    #[test]
    fn crontab_monday_is_one() {
        assert_eq!(weekdays_of("30 8 * * 1"), HashSet::from([Weekday::Mon]));
    }

    #[test]
    fn crontab_sunday_is_zero_or_seven() {
        assert_eq!(weekdays_of("0 9 * * 0"), HashSet::from([Weekday::Sun]));
        assert_eq!(weekdays_of("0 9 * * 7"), HashSet::from([Weekday::Sun]));
    }

    #[test]
    fn crontab_weekday_range() {
        assert_eq!(
            weekdays_of("30 8 * * 1-5"),
            HashSet::from([
                Weekday::Mon,
                Weekday::Tue,
                Weekday::Wed,
                Weekday::Thu,
                Weekday::Fri
            ])
        );
        assert_eq!(
            weekdays_of("0 0 * * 5-7"),
            HashSet::from([Weekday::Fri, Weekday::Sat, Weekday::Sun])
        );
        assert_eq!(
            weekdays_of("0 0 * * */2"),
            HashSet::from([Weekday::Sun, Weekday::Tue, Weekday::Thu, Weekday::Sat])
        );
    }

    #[test]
    fn crontab_day_names_pass_through() {
        assert_eq!(
            weekdays_of("0 0 * * Sat,Sun"),
            HashSet::from([Weekday::Sat, Weekday::Sun])
        );
    }

    #[test]
    fn out_of_range_weekday_is_rejected() {
        assert!(matches!(parse_cron("0 0 * * 8"), Err(PilotError::Cron { .. })));
    }

    #[test]
    fn until_next_is_bounded_by_period() {
        let schedule = parse_cron("* * * * *").unwrap();
        let wait = until_next(&schedule, chrono_tz::UTC).unwrap();
        assert!(wait <= Duration::from_secs(60));
    }
}
