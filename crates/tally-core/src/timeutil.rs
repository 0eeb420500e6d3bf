//! Wall-clock helpers: next occurrence of a local time, snooze choices and
//! human-readable formatting.
//!
//! Everything here is generic over [`TimeZone`] and resolves the offset at
//! the instant in question, so a daylight-saving change between two
//! occurrences keeps the same wall-clock time.

use chrono::{
    DateTime, Datelike, Duration, FixedOffset, Local, LocalResult, NaiveDate, NaiveDateTime,
    NaiveTime, Offset, TimeZone, Timelike, Utc, Weekday,
};
use serde::Serialize;

use crate::error::ConfigError;
use crate::storage::SnoozeConfig;

/// The user's local zone: a configured fixed offset, or the system zone
/// looked up afresh for every instant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LocalZone {
    Fixed(FixedOffset),
    System,
}

impl TimeZone for LocalZone {
    type Offset = FixedOffset;

    fn from_offset(offset: &FixedOffset) -> Self {
        LocalZone::Fixed(*offset)
    }

    fn offset_from_local_date(&self, local: &NaiveDate) -> LocalResult<FixedOffset> {
        self.offset_from_local_datetime(&local.and_time(NaiveTime::MIN))
    }

    fn offset_from_local_datetime(&self, local: &NaiveDateTime) -> LocalResult<FixedOffset> {
        match self {
            LocalZone::Fixed(offset) => LocalResult::Single(*offset),
            LocalZone::System => Local.offset_from_local_datetime(local),
        }
    }

    fn offset_from_utc_date(&self, utc: &NaiveDate) -> FixedOffset {
        self.offset_from_utc_datetime(&utc.and_time(NaiveTime::MIN))
    }

    fn offset_from_utc_datetime(&self, utc: &NaiveDateTime) -> FixedOffset {
        match self {
            LocalZone::Fixed(offset) => *offset,
            LocalZone::System => Local.offset_from_utc_datetime(utc),
        }
    }
}

/// The instant a local wall-clock time names in `zone`. Ambiguous times
/// (clocks going back) take the earlier instant; skipped times (clocks going
/// forward) move an hour later.
pub(crate) fn resolve_local<Tz: TimeZone>(zone: &Tz, local: NaiveDateTime) -> Option<DateTime<Utc>> {
    zone.from_local_datetime(&local)
        .earliest()
        .or_else(|| zone.from_local_datetime(&(local + Duration::hours(1))).earliest())
        .map(|at| at.with_timezone(&Utc))
}

/// First instant strictly after `after` whose wall-clock time in `zone`
/// is `time`, optionally skipping Saturdays and Sundays.
pub fn next_occurrence<Tz: TimeZone>(
    after: DateTime<Utc>,
    zone: Tz,
    time: NaiveTime,
    skip_weekends: bool,
) -> DateTime<Utc> {
    let start = after.with_timezone(&zone).date_naive();
    // At most two weekend days to skip plus today.
    for day in 0..8 {
        let date = start + Duration::days(day);
        if skip_weekends && matches!(date.weekday(), Weekday::Sat | Weekday::Sun) {
            continue;
        }
        match resolve_local(&zone, date.and_time(time)) {
            Some(candidate) if candidate > after => return candidate,
            _ => {}
        }
    }
    after + Duration::days(1)
}

/// The choices offered by the snooze button.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SnoozeOptions {
    /// Main button target.
    pub default: DateTime<Utc>,
    /// Later half-hour steps after `default`.
    pub extra: Vec<DateTime<Utc>>,
    /// Start of the next working session.
    pub next_session: DateTime<Utc>,
    /// When these choices go stale and should be recomputed.
    pub refresh_at: DateTime<Utc>,
}

/// Compute snooze choices at `now`.
///
/// The default is `now + buffer` rounded up to the next increment boundary in
/// local time, so 2:29:59 never offers "2:30".
///
/// # Errors
/// Returns an error if the configured day start does not parse.
pub fn snooze_options<Tz: TimeZone>(
    now: DateTime<Utc>,
    zone: Tz,
    config: &SnoozeConfig,
) -> Result<SnoozeOptions, ConfigError> {
    let day_start = config.day_start_time()?;
    let increment = i64::from(config.increment_minutes.max(1)) * 60;

    let earliest = now + Duration::minutes(i64::from(config.buffer_minutes));
    let shift = i64::from(
        zone.offset_from_utc_datetime(&earliest.naive_utc())
            .fix()
            .local_minus_utc(),
    );
    let local_secs = earliest.timestamp() + shift;
    let rounded = local_secs.div_euclid(increment) * increment
        + if local_secs.rem_euclid(increment) == 0 && earliest.timestamp_subsec_nanos() == 0 {
            0
        } else {
            increment
        };
    let default = Utc
        .timestamp_opt(rounded - shift, 0)
        .single()
        .unwrap_or(earliest);

    let extra: Vec<DateTime<Utc>> = (1..=i64::from(config.extra_options))
        .map(|step| default + Duration::seconds(increment * step))
        .collect();
    let latest = extra.last().copied().unwrap_or(default);
    let next_session = next_occurrence(latest, zone, day_start, !config.include_weekends);

    Ok(SnoozeOptions {
        default,
        extra,
        next_session,
        refresh_at: default - Duration::minutes(5),
    })
}

/// Succinct clock time such as `9:05am`.
pub fn format_clock<Tz: TimeZone>(at: DateTime<Utc>, zone: Tz) -> String {
    let local = at.with_timezone(&zone);
    let (pm, hour) = local.hour12();
    format!("{}:{:02}{}", hour, local.minute(), if pm { "pm" } else { "am" })
}

/// Days, hours and minutes such as `1d 2h 5m`; zero units are omitted and
/// anything under a minute is `0m`.
pub fn format_duration(duration: Duration) -> String {
    let total = duration.num_minutes().max(0);
    let (days, hours, minutes) = (total / (24 * 60), (total / 60) % 24, total % 60);

    let mut parts = Vec::new();
    if days > 0 {
        parts.push(format!("{days}d"));
    }
    if hours > 0 {
        parts.push(format!("{hours}h"));
    }
    if minutes > 0 || parts.is_empty() {
        parts.push(format!("{minutes}m"));
    }
    parts.join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn utc(d: u32, h: u32, m: u32) -> DateTime<Utc> {
        // 2024-05-06 is a Monday.
        Utc.with_ymd_and_hms(2024, 5, d, h, m, 0).unwrap()
    }

    fn hm(h: u32, m: u32) -> NaiveTime {
        NaiveTime::from_hms_opt(h, m, 0).unwrap()
    }

    fn offset(hours: i32) -> FixedOffset {
        FixedOffset::east_opt(hours * 3600).unwrap()
    }

    /// US Eastern for 2024: EDT from 2024-03-10 07:00Z to 2024-11-03 06:00Z.
    #[derive(Debug, Clone, Copy)]
    struct Eastern2024;

    impl Eastern2024 {
        fn edt() -> FixedOffset {
            FixedOffset::west_opt(4 * 3600).unwrap()
        }

        fn est() -> FixedOffset {
            FixedOffset::west_opt(5 * 3600).unwrap()
        }
    }

    impl TimeZone for Eastern2024 {
        type Offset = FixedOffset;

        fn from_offset(_offset: &FixedOffset) -> Self {
            Eastern2024
        }

        fn offset_from_local_date(&self, local: &NaiveDate) -> LocalResult<FixedOffset> {
            self.offset_from_local_datetime(&local.and_time(NaiveTime::MIN))
        }

        fn offset_from_local_datetime(&self, local: &NaiveDateTime) -> LocalResult<FixedOffset> {
            let fits = |offset: FixedOffset| {
                let utc = *local - Duration::seconds(i64::from(offset.local_minus_utc()));
                self.offset_from_utc_datetime(&utc) == offset
            };
            match (fits(Self::edt()), fits(Self::est())) {
                (true, true) => LocalResult::Ambiguous(Self::edt(), Self::est()),
                (true, false) => LocalResult::Single(Self::edt()),
                (false, true) => LocalResult::Single(Self::est()),
                (false, false) => LocalResult::None,
            }
        }

        fn offset_from_utc_date(&self, utc: &NaiveDate) -> FixedOffset {
            self.offset_from_utc_datetime(&utc.and_time(NaiveTime::MIN))
        }

        fn offset_from_utc_datetime(&self, utc: &NaiveDateTime) -> FixedOffset {
            let spring = Utc.with_ymd_and_hms(2024, 3, 10, 7, 0, 0).unwrap().naive_utc();
            let fall = Utc.with_ymd_and_hms(2024, 11, 3, 6, 0, 0).unwrap().naive_utc();
            if *utc >= spring && *utc < fall {
                Self::edt()
            } else {
                Self::est()
            }
        }
    }

    fn utc_on(month: u32, day: u32, h: u32, m: u32, s: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, month, day, h, m, s).unwrap()
    }

    #[test]
    fn next_occurrence_is_strictly_after() {
        let tz = offset(0);
        assert_eq!(next_occurrence(utc(6, 18, 0), tz, hm(18, 30), false), utc(6, 18, 30));
        assert_eq!(next_occurrence(utc(6, 18, 30), tz, hm(18, 30), false), utc(7, 18, 30));
    }

    #[test]
    fn next_occurrence_respects_offset() {
        // 18:30 at UTC-4 is 22:30 UTC.
        assert_eq!(
            next_occurrence(utc(6, 20, 0), offset(-4), hm(18, 30), false),
            utc(6, 22, 30)
        );
    }

    #[test]
    fn next_occurrence_keeps_wall_time_across_fall_back() {
        let evening = NaiveTime::from_hms_opt(18, 29, 30).unwrap();
        // 18:29:30 EDT on Saturday, then 18:29:30 EST on Sunday.
        let first = next_occurrence(utc_on(11, 2, 16, 0, 0), Eastern2024, evening, false);
        assert_eq!(first, utc_on(11, 2, 22, 29, 30));
        let second = next_occurrence(first, Eastern2024, evening, false);
        assert_eq!(second, utc_on(11, 3, 23, 29, 30));
        assert_eq!(format_clock(second, Eastern2024), "6:29pm");
    }

    #[test]
    fn next_occurrence_handles_repeated_and_skipped_hours() {
        // 01:30 happens twice on 2024-11-03; the first one wins.
        assert_eq!(
            next_occurrence(utc_on(11, 3, 0, 0, 0), Eastern2024, hm(1, 30), false),
            utc_on(11, 3, 5, 30, 0)
        );
        // 02:30 never happens on 2024-03-10; it lands at 03:30 EDT.
        assert_eq!(
            next_occurrence(utc_on(3, 10, 0, 0, 0), Eastern2024, hm(2, 30), false),
            utc_on(3, 10, 7, 30, 0)
        );
    }

    #[test]
    fn snooze_next_session_follows_the_new_offset() {
        // Saturday 20:00 EDT; Monday 09:00 is already EST.
        let opts = snooze_options(utc_on(11, 3, 0, 0, 0), Eastern2024, &SnoozeConfig::default()).unwrap();
        assert_eq!(opts.next_session, utc_on(11, 4, 14, 0, 0));
    }

    #[test]
    fn fixed_local_zone_never_shifts() {
        let zone = LocalZone::Fixed(offset(-4));
        let evening = hm(18, 30);
        let first = next_occurrence(utc_on(11, 2, 16, 0, 0), zone, evening, false);
        let second = next_occurrence(first, zone, evening, false);
        assert_eq!(second - first, Duration::days(1));
    }

    #[test]
    fn next_occurrence_can_skip_weekends() {
        // Friday evening -> Monday morning.
        let friday = utc(10, 17, 0);
        assert_eq!(next_occurrence(friday, offset(0), hm(9, 0), true), utc(13, 9, 0));
        assert_eq!(next_occurrence(friday, offset(0), hm(9, 0), false), utc(11, 9, 0));
    }

    #[test]
    fn snooze_default_rounds_up_past_buffer() {
        let cfg = SnoozeConfig::default();
        let at_229 = utc(6, 14, 19) + Duration::seconds(59);
        let opts = snooze_options(at_229, offset(0), &cfg).unwrap();
        assert_eq!(opts.default, utc(6, 14, 30));

        let opts = snooze_options(utc(6, 14, 21), offset(0), &cfg).unwrap();
        assert_eq!(opts.default, utc(6, 15, 0));
        assert_eq!(opts.extra, vec![utc(6, 15, 30), utc(6, 16, 0), utc(6, 16, 30)]);
        assert_eq!(opts.next_session, utc(7, 9, 0));
        assert_eq!(opts.refresh_at, utc(6, 14, 55));
    }

    #[test]
    fn snooze_boundary_is_not_rounded_further() {
        let opts = snooze_options(utc(6, 14, 20), offset(0), &SnoozeConfig::default()).unwrap();
        assert_eq!(opts.default, utc(6, 14, 30));
    }

    #[test]
    fn snooze_rounds_in_local_time() {
        // UTC+5:45: local 14:21 + 10m rounds up to local 15:00.
        let tz = FixedOffset::east_opt(5 * 3600 + 45 * 60).unwrap();
        let now = utc(6, 8, 36); // 14:21 local
        let opts = snooze_options(now, tz, &SnoozeConfig::default()).unwrap();
        assert_eq!(format_clock(opts.default, tz), "3:00pm");
    }

    #[test]
    fn clock_format_is_succinct() {
        assert_eq!(format_clock(utc(6, 9, 5), offset(0)), "9:05am");
        assert_eq!(format_clock(utc(6, 0, 0), offset(0)), "12:00am");
        assert_eq!(format_clock(utc(6, 18, 30), offset(0)), "6:30pm");
    }

    #[test]
    fn duration_format_omits_zero_units() {
        assert_eq!(format_duration(Duration::minutes(24 * 60 + 125)), "1d 2h 5m");
        assert_eq!(format_duration(Duration::hours(3)), "3h");
        assert_eq!(format_duration(Duration::seconds(59)), "0m");
        assert_eq!(format_duration(Duration::minutes(-5)), "0m");
    }
}
