//! Code tables: categorical and temporal inputs mapped to the small integer
//! codes the genre recommender was trained on.
//!
//! Every lookup is total. Unknown or garbled inputs resolve to the table's
//! documented default instead of failing.

use std::collections::HashSet;

use chrono::{Datelike, NaiveDate};

/// Immutable finite map from category strings to codes, with an explicit default.
#[derive(Debug)]
pub struct CodeTable {
    pub name: &'static str,
    entries: &'static [(&'static str, u8)],
    pub default: u8,
}

impl CodeTable {
    pub const fn new(name: &'static str, entries: &'static [(&'static str, u8)], default: u8) -> Self {
        Self { name, entries, default }
    }

    /// Case-insensitive, whitespace-trimmed lookup. Never fails.
    pub fn lookup(&self, raw: &str) -> u8 {
        self.get(raw).unwrap_or_else(|| {
            log::debug!("Unknown {} '{}', using code {}", self.name, raw.trim(), self.default);
            self.default
        })
    }

    /// Lookup without the default, for callers that need to know whether the
    /// value was recognized.
    pub fn get(&self, raw: &str) -> Option<u8> {
        let key = raw.trim();
        self.entries
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(key))
            .map(|&(_, code)| code)
    }
}

pub const LOCATION: CodeTable = CodeTable::new(
    "location",
    &[("home", 1), ("public place", 2), ("friends house", 3)],
    1,
);

pub const SOCIAL: CodeTable = CodeTable::new(
    "social",
    &[
        ("alone", 1),
        ("partner", 2),
        ("my partner", 2),
        ("friends", 3),
        ("colleagues", 4),
        ("parents", 5),
        ("public", 6),
        ("family", 7),
        ("my family", 7),
    ],
    1,
);

/// Provider condition category → weather code. Unknown conditions share the
/// code used when the lookup fails entirely ("clouds").
pub const WEATHER: CodeTable = CodeTable::new(
    "weather",
    &[
        ("clear", 1),
        ("sunny", 1),
        ("rain", 2),
        ("drizzle", 2),
        ("thunderstorm", 3),
        ("snow", 4),
        ("clouds", 5),
    ],
    5,
);

/// Emotion label → valence/end code. The dominance code is the same value.
pub const VALENCE: CodeTable = CodeTable::new(
    "valence",
    &[
        ("sad", 1),
        ("happy", 2),
        ("scared", 3),
        ("surprised", 4),
        ("angry", 5),
        ("disgusted", 6),
        ("neutral", 7),
    ],
    7,
);

/// Emotion label → mood cluster: 1 positive, 2 neutral/ambiguous, 3 negative.
pub const MOOD: CodeTable = CodeTable::new(
    "mood",
    &[
        ("happy", 1),
        ("calm", 2),
        ("neutral", 2),
        ("surprised", 2),
        ("sad", 3),
        ("angry", 3),
        ("fearful", 3),
        ("disgust", 3),
    ],
    2,
);

pub fn location_code(raw: &str) -> u8 {
    LOCATION.lookup(raw)
}

pub fn social_code(raw: &str) -> u8 {
    SOCIAL.lookup(raw)
}

pub fn weather_code(condition: &str) -> u8 {
    WEATHER.lookup(condition)
}

pub fn valence_code(emotion: &str) -> u8 {
    VALENCE.lookup(emotion)
}

pub fn mood_code(emotion: &str) -> u8 {
    MOOD.lookup(emotion)
}

/// 1 = healthy, 2 = anything else.
pub fn physical_code(raw: &str) -> u8 {
    if raw.trim().eq_ignore_ascii_case("healthy") { 1 } else { 2 }
}

/// 1 = user-initiated ("user", "user decided", ...), 2 = system-given.
pub fn decision_code(raw: &str) -> u8 {
    if raw.trim().to_lowercase().starts_with("user") { 1 } else { 2 }
}

/// Spring 1, summer 2, autumn 3, winter 4.
pub fn month_to_season(month: u32) -> u8 {
    match month {
        3..=5 => 1,
        6..=8 => 2,
        9..=11 => 3,
        _ => 4,
    }
}

/// Morning [5,12) 1, afternoon [12,17) 2, evening [17,21) 3, night 4.
pub fn hour_to_timecode(hour: u32) -> u8 {
    match hour {
        5..=11 => 1,
        12..=16 => 2,
        17..=20 => 3,
        _ => 4,
    }
}

/// Explicit holiday dates, matched by exact `YYYY-MM-DD` string.
#[derive(Debug, Clone, Default)]
pub struct HolidaySet {
    dates: HashSet<String>,
}

impl HolidaySet {
    pub fn new<I, S>(dates: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let dates: HashSet<String> = dates.into_iter().map(Into::into).collect();
        for d in &dates {
            if NaiveDate::parse_from_str(d, "%Y-%m-%d").is_err() {
                log::warn!("Holiday '{d}' is not a YYYY-MM-DD date and will never match");
            }
        }
        Self { dates }
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        self.dates.contains(&date.format("%Y-%m-%d").to_string())
    }

}

/// Holiday 3 (checked first), weekend 2, working day 1.
pub fn date_to_daytype(date: NaiveDate, holidays: &HolidaySet) -> u8 {
    if holidays.contains(date) {
        return 3;
    }
    if date.weekday().num_days_from_monday() >= 5 {
        return 2;
    }
    1
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_month_partition() {
        let mut counts = [0usize; 5];
        for m in 1..=12 {
            let s = month_to_season(m);
            assert!((1..=4).contains(&s));
            counts[s as usize] += 1;
        }
        // Four seasons of three months each, no gaps
        assert_eq!(&counts[1..], &[3, 3, 3, 3]);
        assert_eq!(month_to_season(12), 4);
        assert_eq!(month_to_season(1), 4);
        assert_eq!(month_to_season(3), 1);
        assert_eq!(month_to_season(11), 3);
    }

    #[test]
    fn test_hour_partition() {
        let expected = |h: u32| -> u8 {
            if (5..12).contains(&h) {
                1
            } else if (12..17).contains(&h) {
                2
            } else if (17..21).contains(&h) {
                3
            } else {
                4
            }
        };
        for h in 0..24 {
            assert_eq!(hour_to_timecode(h), expected(h), "hour {h}");
        }
        assert_eq!(hour_to_timecode(4), 4);
        assert_eq!(hour_to_timecode(5), 1);
        assert_eq!(hour_to_timecode(21), 4);
    }

    #[test]
    fn test_weekdays_are_working_days_unless_holiday() {
        // 2024-06-03 is a Monday
        let monday = NaiveDate::from_ymd_opt(2024, 6, 3).unwrap();
        let none = HolidaySet::default();
        for offset in 0..5 {
            let day = monday + chrono::Duration::days(offset);
            assert_eq!(date_to_daytype(day, &none), 1);

            let holidays = HolidaySet::new([day.format("%Y-%m-%d").to_string()]);
            assert_eq!(date_to_daytype(day, &holidays), 3);
        }
    }

    #[test]
    fn test_weekend_and_holiday_weekend() {
        let saturday = NaiveDate::from_ymd_opt(2024, 6, 8).unwrap();
        let sunday = NaiveDate::from_ymd_opt(2024, 6, 9).unwrap();
        let none = HolidaySet::default();
        assert_eq!(date_to_daytype(saturday, &none), 2);
        assert_eq!(date_to_daytype(sunday, &none), 2);

        let holidays = HolidaySet::new(["2024-06-09"]);
        assert_eq!(date_to_daytype(sunday, &holidays), 3);
    }

    #[test]
    fn test_holiday_match_is_exact_string() {
        let day = NaiveDate::from_ymd_opt(2024, 1, 2).unwrap();
        // Non zero-padded form does not match
        let holidays = HolidaySet::new(["2024-1-2"]);
        assert_eq!(date_to_daytype(day, &holidays), 1);
    }

    #[test]
    fn test_lookups_are_case_insensitive_and_trimmed() {
        assert_eq!(location_code("  Public Place "), 2);
        assert_eq!(location_code("FRIENDS HOUSE"), 3);
        assert_eq!(social_code("My Partner"), 2);
        assert_eq!(social_code("family"), 7);
        assert_eq!(weather_code("Thunderstorm"), 3);
        assert_eq!(weather_code("clear"), 1);
    }

    #[test]
    fn test_unknown_inputs_resolve_to_defaults() {
        for garbage in ["", "   ", "moon base", "🙃", "home2", "\0"] {
            assert_eq!(location_code(garbage), 1);
            assert_eq!(social_code(garbage), 1);
            assert_eq!(weather_code(garbage), 5);
            assert_eq!(valence_code(garbage), 7);
            assert_eq!(mood_code(garbage), 2);
        }
        assert_eq!(weather_code("Tornado"), weather_code("clouds"));
    }

    #[test]
    fn test_emotion_tables() {
        assert_eq!(valence_code("sad"), 1);
        assert_eq!(valence_code("Happy"), 2);
        assert_eq!(valence_code("disgusted"), 6);
        // Classifier labels outside the valence table take the neutral code
        assert_eq!(valence_code("fearful"), 7);
        assert_eq!(valence_code("calm"), 7);

        assert_eq!(mood_code("happy"), 1);
        assert_eq!(mood_code("surprised"), 2);
        assert_eq!(mood_code("fearful"), 3);
        assert_eq!(mood_code("disgust"), 3);
    }

    #[test]
    fn test_physical_and_decision() {
        assert_eq!(physical_code("Healthy"), 1);
        assert_eq!(physical_code("ill"), 2);
        assert_eq!(physical_code(""), 2);
        assert_eq!(decision_code("user"), 1);
        assert_eq!(decision_code("User decided"), 1);
        assert_eq!(decision_code("given"), 2);
        assert_eq!(decision_code("the user"), 2);
    }
}
