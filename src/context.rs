use std::fmt;

use chrono::{Datelike, NaiveDateTime, Timelike};
use serde::Serialize;

use crate::codes::{self, HolidaySet};

/// Number of columns in the context vector.
pub const CONTEXT_WIDTH: usize = 12;

/// Column order of the context vector. The genre recommender was trained on
/// exactly this order; reordering silently corrupts its predictions.
pub const CONTEXT_COLUMNS: [&str; CONTEXT_WIDTH] = [
    "time_of_day",
    "day_type",
    "season",
    "location",
    "weather",
    "social",
    "emotion_valence",
    "emotion_dominance",
    "mood_cluster",
    "physical_state",
    "decision_authority",
    "interaction_count",
];

/// Fixed-order encoding of the moment plus the derived emotion codes.
/// Raw codes, no scaling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ContextVector {
    pub time_of_day: u8,
    pub day_type: u8,
    pub season: u8,
    pub location: u8,
    pub weather: u8,
    pub social: u8,
    pub emotion_valence: u8,
    pub emotion_dominance: u8,
    pub mood_cluster: u8,
    pub physical_state: u8,
    pub decision_authority: u8,
    pub interaction_count: u32,
}

impl ContextVector {
    /// Model input row, in `CONTEXT_COLUMNS` order.
    pub fn to_features(&self) -> [f32; CONTEXT_WIDTH] {
        [
            self.time_of_day as f32,
            self.day_type as f32,
            self.season as f32,
            self.location as f32,
            self.weather as f32,
            self.social as f32,
            self.emotion_valence as f32,
            self.emotion_dominance as f32,
            self.mood_cluster as f32,
            self.physical_state as f32,
            self.decision_authority as f32,
            self.interaction_count as f32,
        ]
    }

    /// (column, value) pairs, for logging and audits.
    pub fn columns(&self) -> impl Iterator<Item = (&'static str, f32)> {
        CONTEXT_COLUMNS.into_iter().zip(self.to_features())
    }
}

impl fmt::Display for ContextVector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let values: Vec<String> = self.to_features().iter().map(|v| format!("{v:.1}")).collect();
        write!(f, "[[{}]]", values.join(", "))
    }
}

/// Situational inputs supplied by the user.
#[derive(Debug, Clone)]
pub struct UserContext {
    pub location: String,
    pub social: String,
    pub physical: String,
    pub decision: String,
    /// 1 for the first interaction, n for the n-th.
    pub interaction: u32,
}

impl Default for UserContext {
    fn default() -> Self {
        Self {
            location: "home".into(),
            social: "alone".into(),
            physical: "healthy".into(),
            decision: "user".into(),
            interaction: 1,
        }
    }
}

/// Codes derived purely from a timestamp.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TemporalCodes {
    pub time_of_day: u8,
    pub day_type: u8,
    pub season: u8,
}

impl TemporalCodes {
    pub fn from_datetime(now: NaiveDateTime, holidays: &HolidaySet) -> Self {
        Self {
            time_of_day: codes::hour_to_timecode(now.hour()),
            day_type: codes::date_to_daytype(now.date(), holidays),
            season: codes::month_to_season(now.month()),
        }
    }
}

/// Codes derived from the detected emotion label.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EmotionCodes {
    pub valence: u8,
    pub dominance: u8,
    pub mood: u8,
}

impl EmotionCodes {
    pub fn from_label(emotion: &str) -> Self {
        let valence = codes::valence_code(emotion);
        Self {
            valence,
            // No independent dominance signal exists; it mirrors valence.
            dominance: valence,
            mood: codes::mood_code(emotion),
        }
    }
}

/// Assembles context vectors. Holds the only per-deployment input (holidays).
#[derive(Debug, Clone, Default)]
pub struct ContextEncoder {
    holidays: HolidaySet,
}

impl ContextEncoder {
    pub fn new(holidays: HolidaySet) -> Self {
        Self { holidays }
    }

    pub fn encode(
        &self,
        now: NaiveDateTime,
        weather_code: u8,
        user: &UserContext,
        emotion_label: &str,
    ) -> ContextVector {
        let temporal = TemporalCodes::from_datetime(now, &self.holidays);
        let emotion = EmotionCodes::from_label(emotion_label);
        assemble(temporal, weather_code, user, emotion)
    }
}

/// Place every code in its fixed slot.
pub fn assemble(
    temporal: TemporalCodes,
    weather_code: u8,
    user: &UserContext,
    emotion: EmotionCodes,
) -> ContextVector {
    ContextVector {
        time_of_day: temporal.time_of_day,
        day_type: temporal.day_type,
        season: temporal.season,
        location: codes::location_code(&user.location),
        weather: weather_code,
        social: codes::social_code(&user.social),
        emotion_valence: emotion.valence,
        emotion_dominance: emotion.dominance,
        mood_cluster: emotion.mood,
        physical_state: codes::physical_code(&user.physical),
        decision_authority: codes::decision_code(&user.decision),
        interaction_count: user.interaction,
    }
}
