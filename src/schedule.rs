//! Derivation of the rendered schedule from a raw listing: the visibility
//! filter, the broadcast ordering and the broadcast-time label.

use std::{cmp::Ordering, sync::LazyLock};

use chrono::{Datelike, Days, NaiveDate, Weekday};
use clap::ValueEnum;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::state::FavoriteSet;
use crate::types::{AnimeRecord, Broadcast, MediaType, StartSeason};

/// Hours added to a JST broadcast time for display.
pub const DISPLAY_OFFSET_HOURS: i64 = -1;
/// Days (today included) scanned by the past-week filter.
pub const PAST_WEEK_WINDOW_DAYS: u64 = 8;

static START_TIME: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^([01]\d|2[0-3]):([0-5]\d)$").expect("start time pattern is valid")
});

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TimeFilter {
    #[default]
    All,
    Today,
    Tomorrow,
    PastWeek,
    Favorites,
}

impl TimeFilter {
    pub const ALL: [TimeFilter; 5] = [
        TimeFilter::All,
        TimeFilter::Today,
        TimeFilter::Tomorrow,
        TimeFilter::PastWeek,
        TimeFilter::Favorites,
    ];

    pub fn label(self) -> &'static str {
        match self {
            TimeFilter::All => "All",
            TimeFilter::Today => "Today",
            TimeFilter::Tomorrow => "Tomorrow",
            TimeFilter::PastWeek => "Past week",
            TimeFilter::Favorites => "Favorites",
        }
    }
}

/// Everything the filter needs besides the record itself.
#[derive(Debug, Clone, Copy)]
pub struct FilterContext<'a> {
    pub today: NaiveDate,
    pub favorites: &'a FavoriteSet,
}

impl FilterContext<'_> {
    pub fn season(&self) -> StartSeason {
        StartSeason::current(self.today)
    }
}

pub fn is_visible(record: &AnimeRecord, filter: TimeFilter, ctx: &FilterContext<'_>) -> bool {
    let Some(day) = record.weekday() else {
        return false;
    };
    if record.media_type == MediaType::Dub {
        return false;
    }
    if record.start_season != Some(ctx.season()) {
        return false;
    }

    match filter {
        TimeFilter::Favorites => ctx.favorites.contains(record.id),
        TimeFilter::All => true,
        TimeFilter::Today => day == ctx.today.weekday(),
        TimeFilter::Tomorrow => day == ctx.today.weekday().succ(),
        TimeFilter::PastWeek => past_week_days(ctx.today).contains(&day),
    }
}

/// Weekday names of today and the preceding days in the rolling window.
/// Eight consecutive days always name all seven weekdays.
pub fn past_week_days(today: NaiveDate) -> Vec<Weekday> {
    (0..PAST_WEEK_WINDOW_DAYS)
        .filter_map(|offset| today.checked_sub_days(Days::new(offset)))
        .map(|date| date.weekday())
        .collect()
}

pub fn compare_broadcast(a: &AnimeRecord, b: &AnimeRecord) -> Ordering {
    let day_index = |record: &AnimeRecord| {
        record
            .weekday()
            .map(|day| day.num_days_from_sunday())
            .unwrap_or(7)
    };
    day_index(a)
        .cmp(&day_index(b))
        .then_with(|| a.start_time().unwrap_or("").cmp(b.start_time().unwrap_or("")))
}

/// Stable sort by broadcast slot; favorites lead when a set is given.
pub fn sort_schedule(records: &mut [AnimeRecord], favorites: Option<&FavoriteSet>) {
    records.sort_by(|a, b| {
        let favorite_rank = |record: &AnimeRecord| {
            favorites.is_some_and(|set| set.contains(record.id))
        };
        favorite_rank(b)
            .cmp(&favorite_rank(a))
            .then_with(|| compare_broadcast(a, b))
    });
}

pub fn derive_schedule(
    records: Vec<AnimeRecord>,
    filter: TimeFilter,
    favorites: &FavoriteSet,
    today: NaiveDate,
) -> Vec<AnimeRecord> {
    let ctx = FilterContext { today, favorites };
    let mut visible: Vec<AnimeRecord> = records
        .into_iter()
        .filter(|record| is_visible(record, filter, &ctx))
        .collect();
    sort_schedule(&mut visible, Some(favorites));
    visible
}

pub fn weekday_name(day: Weekday) -> &'static str {
    match day {
        Weekday::Mon => "Monday",
        Weekday::Tue => "Tuesday",
        Weekday::Wed => "Wednesday",
        Weekday::Thu => "Thursday",
        Weekday::Fri => "Friday",
        Weekday::Sat => "Saturday",
        Weekday::Sun => "Sunday",
    }
}

/// Display label for a JST broadcast slot, shifted by
/// [`DISPLAY_OFFSET_HOURS`] with no daylight-saving handling.
pub fn broadcast_label(broadcast: &Broadcast) -> Option<String> {
    let day = broadcast.weekday()?;
    let Some((hour, minute)) = broadcast.start_time.as_deref().and_then(parse_start_time) else {
        return Some(weekday_name(day).to_string());
    };

    let shifted = hour as i64 + DISPLAY_OFFSET_HOURS;
    let (day, hour) = if shifted < 0 {
        (day.pred(), shifted + 24)
    } else if shifted >= 24 {
        (day.succ(), shifted - 24)
    } else {
        (day, shifted)
    };

    let suffix = if hour < 12 { "AM" } else { "PM" };
    let hour12 = match hour % 12 {
        0 => 12,
        h => h,
    };
    Some(format!(
        "{} {}:{:02} {}",
        weekday_name(day),
        hour12,
        minute,
        suffix
    ))
}

fn parse_start_time(value: &str) -> Option<(u32, u32)> {
    let caps = START_TIME.captures(value.trim())?;
    let hour = caps.get(1)?.as_str().parse().ok()?;
    let minute = caps.get(2)?.as_str().parse().ok()?;
    Some((hour, minute))
}
