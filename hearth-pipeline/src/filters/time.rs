use super::Filter;
use chrono::{DateTime, Datelike, NaiveTime, Utc, Weekday};
use hearth_model::Event;
use std::collections::HashSet;

/// Event timestamp falls within an allowed time-of-day range and an
/// allowed day-of-week set (§4.2). An empty day set means every day is
/// allowed. A range where `end < start` wraps past midnight.
pub struct TimeFilter {
    name: String,
    start: NaiveTime,
    end: NaiveTime,
    allowed_days: HashSet<Weekday>,
}

impl TimeFilter {
    pub fn new(
        name: impl Into<String>,
        start: NaiveTime,
        end: NaiveTime,
        allowed_days: impl IntoIterator<Item = Weekday>,
    ) -> Self {
        Self {
            name: name.into(),
            start,
            end,
            allowed_days: allowed_days.into_iter().collect(),
        }
    }

    fn time_in_range(&self, time: NaiveTime) -> bool {
        if self.start <= self.end {
            time >= self.start && time <= self.end
        } else {
            time >= self.start || time <= self.end
        }
    }
}

impl Filter for TimeFilter {
    fn name(&self) -> &str {
        &self.name
    }

    fn should_process(&self, event: &Event) -> bool {
        let Some(dt) = DateTime::<Utc>::from_timestamp(
            event.timestamp_ns / 1_000_000_000,
            (event.timestamp_ns % 1_000_000_000) as u32,
        ) else {
            return false;
        };

        if !self.allowed_days.is_empty() && !self.allowed_days.contains(&dt.weekday()) {
            return false;
        }

        self.time_in_range(dt.time())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn ns_at(hour: u32, minute: u32) -> i64 {
        // 2024-01-01 was a Monday.
        NaiveDate::from_ymd_opt(2024, 1, 1)
            .unwrap()
            .and_hms_opt(hour, minute, 0)
            .unwrap()
            .and_utc()
            .timestamp_nanos_opt()
            .unwrap()
    }

    #[test]
    fn daytime_range_allows_within_bounds() {
        let filter = TimeFilter::new(
            "daytime",
            NaiveTime::from_hms_opt(8, 0, 0).unwrap(),
            NaiveTime::from_hms_opt(20, 0, 0).unwrap(),
            [],
        );
        let noon = Event::new("light", "light.kitchen", "state_changed", ns_at(12, 0));
        let midnight = Event::new("light", "light.kitchen", "state_changed", ns_at(23, 0));

        assert!(filter.should_process(&noon));
        assert!(!filter.should_process(&midnight));
    }

    #[test]
    fn overnight_range_wraps_past_midnight() {
        let filter = TimeFilter::new(
            "overnight",
            NaiveTime::from_hms_opt(22, 0, 0).unwrap(),
            NaiveTime::from_hms_opt(6, 0, 0).unwrap(),
            [],
        );
        let late = Event::new("light", "light.kitchen", "state_changed", ns_at(23, 30));
        let early = Event::new("light", "light.kitchen", "state_changed", ns_at(2, 0));
        let midday = Event::new("light", "light.kitchen", "state_changed", ns_at(12, 0));

        assert!(filter.should_process(&late));
        assert!(filter.should_process(&early));
        assert!(!filter.should_process(&midday));
    }

    #[test]
    fn day_of_week_restricts_to_listed_days() {
        let filter = TimeFilter::new(
            "weekdays_only",
            NaiveTime::from_hms_opt(0, 0, 0).unwrap(),
            NaiveTime::from_hms_opt(23, 59, 59).unwrap(),
            [Weekday::Mon],
        );
        // 2024-01-01 is a Monday.
        let monday = Event::new("light", "light.kitchen", "state_changed", ns_at(9, 0));
        assert!(filter.should_process(&monday));
    }
}
