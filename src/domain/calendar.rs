//! Trading-day arithmetic. Weekends are the only non-trading days.

use chrono::{Datelike, Duration, NaiveDate, Weekday};

pub fn is_weekend(date: NaiveDate) -> bool {
    matches!(date.weekday(), Weekday::Sat | Weekday::Sun)
}

pub fn is_monday(date: NaiveDate) -> bool {
    date.weekday() == Weekday::Mon
}

/// `date` itself when it is a weekday, otherwise the following Monday.
pub fn roll_forward(date: NaiveDate) -> NaiveDate {
    let mut day = date;
    while is_weekend(day) {
        day += Duration::days(1);
    }
    day
}

/// The first weekday strictly after `date`.
pub fn next_business_day(date: NaiveDate) -> NaiveDate {
    roll_forward(date + Duration::days(1))
}

pub fn first_business_day_of_month(date: NaiveDate) -> NaiveDate {
    roll_forward(date.with_day(1).unwrap_or(date))
}

pub fn is_first_business_day_of_month(date: NaiveDate) -> bool {
    first_business_day_of_month(date) == date
}

/// First day of the month containing `date`.
pub fn start_of_month(date: NaiveDate) -> NaiveDate {
    date.with_day(1).unwrap_or(date)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn weekend_detection() {
        assert!(is_weekend(date(2024, 3, 2)));
        assert!(is_weekend(date(2024, 3, 3)));
        assert!(!is_weekend(date(2024, 3, 4)));
    }

    #[test]
    fn next_business_day_skips_weekend() {
        assert_eq!(next_business_day(date(2024, 3, 1)), date(2024, 3, 4));
        assert_eq!(next_business_day(date(2024, 3, 4)), date(2024, 3, 5));
        assert_eq!(next_business_day(date(2024, 3, 2)), date(2024, 3, 4));
    }

    #[test]
    fn roll_forward_leaves_weekdays_alone() {
        assert_eq!(roll_forward(date(2024, 3, 5)), date(2024, 3, 5));
        assert_eq!(roll_forward(date(2024, 3, 9)), date(2024, 3, 11));
    }

    #[test]
    fn first_business_day_handles_weekend_month_start() {
        // June 2024 starts on a Saturday
        assert_eq!(first_business_day_of_month(date(2024, 6, 14)), date(2024, 6, 3));
        assert!(is_first_business_day_of_month(date(2024, 6, 3)));
        assert!(!is_first_business_day_of_month(date(2024, 6, 4)));
        assert!(is_first_business_day_of_month(date(2024, 5, 1)));
    }

    #[test]
    fn monday_detection() {
        assert!(is_monday(date(2024, 3, 4)));
        assert!(!is_monday(date(2024, 3, 5)));
    }
}
