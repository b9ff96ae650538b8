use anyhow::{anyhow, Result};
use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

pub const INITIAL_CREDITS: u32 = 5;
pub const MONTHLY_CREDITS: u32 = 5;
pub const MAX_ADS_PER_DAY: u32 = 10;
pub const MAX_USERNAME_LENGTH: usize = 32;
/// Credits added by one confirmed credit-pack purchase.
pub const PURCHASE_CREDITS: u32 = 50;

/// A calendar month, stored as `"YYYY-MM"` in the persisted state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct YearMonth {
    pub year: i32,
    pub month: u32,
}

impl YearMonth {
    pub fn from_date(date: NaiveDate) -> YearMonth {
        YearMonth {
            year: date.year(),
            month: date.month(),
        }
    }

    /// Whole calendar months elapsed since `earlier`. Negative when `earlier`
    /// is in the future.
    pub fn months_since(&self, earlier: YearMonth) -> i32 {
        (self.year - earlier.year) * 12 + self.month as i32 - earlier.month as i32
    }

    pub fn next(&self) -> YearMonth {
        if self.month == 12 {
            YearMonth {
                year: self.year + 1,
                month: 1,
            }
        } else {
            YearMonth {
                year: self.year,
                month: self.month + 1,
            }
        }
    }

    pub fn first_day(&self) -> NaiveDate {
        // month is kept in 1..=12 by construction
        NaiveDate::from_ymd_opt(self.year, self.month, 1).expect("valid calendar month")
    }
}

impl std::fmt::Display for YearMonth {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:04}-{:02}", self.year, self.month)
    }
}

impl std::str::FromStr for YearMonth {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        let (year, month) = s
            .split_once('-')
            .ok_or_else(|| anyhow!("Invalid month value: {}", s))?;
        let year: i32 = year.parse().map_err(|_| anyhow!("Invalid year in: {}", s))?;
        let month: u32 = month.parse().map_err(|_| anyhow!("Invalid month in: {}", s))?;
        if !(1..=12).contains(&month) {
            return Err(anyhow!("Month out of range: {}", s));
        }
        Ok(YearMonth { year, month })
    }
}

impl Serialize for YearMonth {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for YearMonth {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// Per-user entitlement state. A record exists only for users who agreed to
/// the disclaimer; the map key in the store is the user id.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EntitlementRecord {
    pub username: Option<String>,
    pub credits: u32,
    pub subscribed: bool,
    pub month_joined: YearMonth,
    pub last_reset: YearMonth,
    pub ads_used_today: u32,
    pub last_ad_day: Option<NaiveDate>,
}

impl EntitlementRecord {
    pub fn new(today: NaiveDate) -> EntitlementRecord {
        let month = YearMonth::from_date(today);
        EntitlementRecord {
            username: None,
            credits: INITIAL_CREDITS,
            subscribed: false,
            month_joined: month,
            last_reset: month,
            ads_used_today: 0,
            last_ad_day: None,
        }
    }

    pub fn is_onboarded(&self) -> bool {
        self.username.is_some()
    }

    /// Grants any unclaimed monthly credits and advances `last_reset` to the
    /// current month. Returns the number of months granted; a month is never
    /// granted twice, and several unattended months are caught up in one call.
    pub fn apply_monthly_rollover(&mut self, today: NaiveDate) -> u32 {
        let current = YearMonth::from_date(today);
        let elapsed = current.months_since(self.last_reset).max(0) as u32;
        if elapsed > 0 {
            self.credits += MONTHLY_CREDITS * elapsed;
            self.last_reset = current;
        }
        elapsed
    }

    /// Zeroes the daily ad counter when the calendar date has moved past the
    /// last recorded ad day.
    pub fn apply_daily_rollover(&mut self, today: NaiveDate) {
        if self.last_ad_day != Some(today) {
            self.ads_used_today = 0;
            self.last_ad_day = Some(today);
        }
    }

    pub fn can_watch_ad(&self) -> bool {
        self.ads_used_today < MAX_ADS_PER_DAY
    }

    /// Records one watched ad. Callers check `can_watch_ad` first.
    pub fn record_ad_watch(&mut self) {
        self.credits += 1;
        self.ads_used_today += 1;
    }

    /// First day of the month after the last credit grant.
    pub fn next_reset_date(&self) -> NaiveDate {
        self.last_reset.next().first_day()
    }
}

/// Checks onboarding username input. Returns the trimmed name on success.
pub fn validate_username(text: &str) -> Result<&str, String> {
    let trimmed = text.trim();
    let length = trimmed.chars().count();
    if length == 0 || length > MAX_USERNAME_LENGTH {
        return Err(format!(
            "Usernames must be between 1 and {} characters. Try again.",
            MAX_USERNAME_LENGTH
        ));
    }
    Ok(trimmed)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn day(year: i32, month: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(year, month, day).unwrap()
    }

    #[test]
    fn test_year_month_round_trip() {
        let month: YearMonth = "2025-03".parse().unwrap();
        assert_eq!(month, YearMonth { year: 2025, month: 3 });
        assert_eq!(month.to_string(), "2025-03");
        assert!("2025-13".parse::<YearMonth>().is_err());
        assert!("March".parse::<YearMonth>().is_err());
    }

    #[test]
    fn test_months_since_spans_year_boundary() {
        let november: YearMonth = "2024-11".parse().unwrap();
        let february: YearMonth = "2025-02".parse().unwrap();
        assert_eq!(february.months_since(november), 3);
        assert_eq!(november.months_since(february), -3);
        assert_eq!(november.months_since(november), 0);
    }

    #[test]
    fn test_next_reset_date() {
        let mut record = EntitlementRecord::new(day(2024, 12, 20));
        assert_eq!(record.next_reset_date(), day(2025, 1, 1));
        record.last_reset = YearMonth { year: 2025, month: 4 };
        assert_eq!(record.next_reset_date(), day(2025, 5, 1));
    }

    #[test]
    fn test_monthly_rollover_applies_once_per_month() {
        let mut record = EntitlementRecord::new(day(2024, 1, 10));
        assert_eq!(record.apply_monthly_rollover(day(2024, 1, 25)), 0);
        assert_eq!(record.credits, INITIAL_CREDITS);

        assert_eq!(record.apply_monthly_rollover(day(2024, 2, 1)), 1);
        assert_eq!(record.credits, INITIAL_CREDITS + MONTHLY_CREDITS);

        // Same month again: nothing further granted.
        assert_eq!(record.apply_monthly_rollover(day(2024, 2, 28)), 0);
        assert_eq!(record.credits, INITIAL_CREDITS + MONTHLY_CREDITS);
    }

    #[test]
    fn test_monthly_rollover_catches_up_missed_months() {
        let mut record = EntitlementRecord::new(day(2024, 1, 10));
        record.credits = 0;

        assert_eq!(record.apply_monthly_rollover(day(2024, 4, 3)), 3);
        assert_eq!(record.credits, 3 * MONTHLY_CREDITS);
        assert_eq!(record.last_reset, YearMonth { year: 2024, month: 4 });
    }

    #[test]
    fn test_daily_rollover_resets_counter_on_new_date() {
        let mut record = EntitlementRecord::new(day(2024, 6, 1));
        record.apply_daily_rollover(day(2024, 6, 1));
        record.ads_used_today = 7;

        // Same date: counter untouched.
        record.apply_daily_rollover(day(2024, 6, 1));
        assert_eq!(record.ads_used_today, 7);

        record.apply_daily_rollover(day(2024, 6, 2));
        assert_eq!(record.ads_used_today, 0);
        assert_eq!(record.last_ad_day, Some(day(2024, 6, 2)));
    }

    #[test]
    fn test_ad_cap() {
        let mut record = EntitlementRecord::new(day(2024, 6, 1));
        record.credits = 0;
        record.apply_daily_rollover(day(2024, 6, 1));

        for _ in 0..MAX_ADS_PER_DAY {
            assert!(record.can_watch_ad());
            record.record_ad_watch();
        }
        assert!(!record.can_watch_ad());
        assert_eq!(record.credits, MAX_ADS_PER_DAY);
        assert_eq!(record.ads_used_today, MAX_ADS_PER_DAY);
    }

    #[test]
    fn test_validate_username() {
        assert_eq!(validate_username("  alice  ").unwrap(), "alice");
        assert!(validate_username("").is_err());
        assert!(validate_username("   ").is_err());
        assert!(validate_username(&"x".repeat(MAX_USERNAME_LENGTH)).is_ok());
        assert!(validate_username(&"x".repeat(MAX_USERNAME_LENGTH + 1)).is_err());
    }

    #[test]
    fn test_record_serializes_with_wire_field_names() {
        let mut record = EntitlementRecord::new(day(2024, 5, 2));
        record.username = Some("alice".to_string());
        record.last_ad_day = Some(day(2024, 5, 2));

        let json: serde_json::Value = serde_json::to_value(&record).unwrap();
        assert_eq!(json["username"], "alice");
        assert_eq!(json["credits"], 5);
        assert_eq!(json["subscribed"], false);
        assert_eq!(json["month_joined"], "2024-05");
        assert_eq!(json["last_reset"], "2024-05");
        assert_eq!(json["ads_used_today"], 0);
        assert_eq!(json["last_ad_day"], "2024-05-02");

        let back: EntitlementRecord = serde_json::from_value(json).unwrap();
        assert_eq!(back.username.as_deref(), Some("alice"));
        assert_eq!(back.last_reset, YearMonth { year: 2024, month: 5 });
    }
}
