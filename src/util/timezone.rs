use chrono::{DateTime, Offset, TimeZone, Utc};
use chrono_tz::Tz;
use time::{Date, OffsetDateTime, UtcOffset};

/// UTC offset that `tz` observes at the instant `time`.
pub fn utc_offset_at(time: OffsetDateTime, tz: Tz) -> UtcOffset {
    let Some(utc) = DateTime::<Utc>::from_timestamp(time.unix_timestamp(), 0) else {
        return UtcOffset::UTC;
    };
    let seconds = tz
        .offset_from_utc_datetime(&utc.naive_utc())
        .fix()
        .local_minus_utc();
    UtcOffset::from_whole_seconds(seconds).unwrap_or(UtcOffset::UTC)
}

/// Calendar date of `time` as seen in `tz`.
pub fn localized_date(time: OffsetDateTime, tz: Tz) -> Date {
    time.to_offset(utc_offset_at(time, tz)).date()
}

#[cfg(test)]
mod tests {
    use time::macros::{date, datetime};

    use super::*;

    #[test]
    fn date_rolls_over_east_of_utc() {
        let instant = datetime!(2024-03-09 17:30 UTC);
        assert_eq!(localized_date(instant, Tz::Asia__Shanghai), date!(2024 - 03 - 10));
        assert_eq!(localized_date(instant, Tz::UTC), date!(2024 - 03 - 09));
    }

    #[test]
    fn date_stays_behind_west_of_utc() {
        let instant = datetime!(2024-07-01 02:00 UTC);
        assert_eq!(
            localized_date(instant, Tz::America__New_York),
            date!(2024 - 06 - 30)
        );
    }

    #[test]
    fn offset_tracks_daylight_saving() {
        let winter = utc_offset_at(datetime!(2024-01-15 12:00 UTC), Tz::Europe__Berlin);
        let summer = utc_offset_at(datetime!(2024-07-15 12:00 UTC), Tz::Europe__Berlin);
        assert_eq!(winter.whole_hours(), 1);
        assert_eq!(summer.whole_hours(), 2);
    }
}
