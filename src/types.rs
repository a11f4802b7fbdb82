use chrono::{Datelike, Weekday};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Season {
    Winter,
    Spring,
    Summer,
    Fall,
}

impl Season {
    pub fn as_str(self) -> &'static str {
        match self {
            Season::Winter => "winter",
            Season::Spring => "spring",
            Season::Summer => "summer",
            Season::Fall => "fall",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Season::Winter => "Winter",
            Season::Spring => "Spring",
            Season::Summer => "Summer",
            Season::Fall => "Fall",
        }
    }

    /// Calendar month (1-12) to anime season.
    pub fn for_month(month: u32) -> Self {
        match month {
            1..=3 => Season::Winter,
            4..=6 => Season::Spring,
            7..=9 => Season::Summer,
            _ => Season::Fall,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct StartSeason {
    pub season: Season,
    pub year: i32,
}

impl StartSeason {
    /// The season airing on `date`. Recomputed on every call so month
    /// rollovers take effect immediately.
    pub fn current(date: impl Datelike) -> Self {
        Self {
            season: Season::for_month(date.month()),
            year: date.year(),
        }
    }

    pub fn label(self) -> String {
        format!("{} {}", self.season.label(), self.year)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum MediaType {
    Tv,
    TvSpecial,
    Ova,
    Ona,
    Movie,
    Special,
    Music,
    Dub,
    #[default]
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct Broadcast {
    #[serde(default)]
    pub day_of_the_week: Option<String>,
    #[serde(default)]
    pub start_time: Option<String>,
}

impl Broadcast {
    /// Parsed broadcast weekday. MAL uses `"other"` for irregular slots,
    /// which yields `None` just like a missing day.
    pub fn weekday(&self) -> Option<Weekday> {
        self.day_of_the_week
            .as_deref()
            .and_then(|day| day.trim().parse::<Weekday>().ok())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Picture {
    #[serde(default)]
    pub medium: Option<String>,
    #[serde(default)]
    pub large: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Genre {
    #[serde(default)]
    pub id: u64,
    pub name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct StreamingService {
    pub name: String,
    #[serde(default)]
    pub url: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AnimeRecord {
    pub id: u64,
    pub title: String,
    #[serde(default)]
    pub main_picture: Option<Picture>,
    #[serde(default)]
    pub synopsis: Option<String>,
    #[serde(default)]
    pub mean: Option<f64>,
    #[serde(default)]
    pub rank: Option<u32>,
    #[serde(default)]
    pub popularity: Option<u32>,
    #[serde(default)]
    pub num_episodes: Option<u32>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub rating: Option<String>,
    #[serde(default)]
    pub broadcast: Option<Broadcast>,
    #[serde(default)]
    pub start_season: Option<StartSeason>,
    #[serde(default)]
    pub genres: Vec<Genre>,
    #[serde(default, alias = "streams")]
    pub streaming_services: Vec<StreamingService>,
    #[serde(default)]
    pub media_type: MediaType,
}

impl AnimeRecord {
    pub fn weekday(&self) -> Option<Weekday> {
        self.broadcast.as_ref().and_then(Broadcast::weekday)
    }

    pub fn start_time(&self) -> Option<&str> {
        self.broadcast
            .as_ref()
            .and_then(|b| b.start_time.as_deref())
    }

    pub fn page_url(&self) -> String {
        format!("https://myanimelist.net/anime/{}", self.id)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AnimeNode {
    pub node: AnimeRecord,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Paging {
    #[serde(default)]
    pub next: Option<String>,
}

/// One page of a MAL listing (`/anime`, `/anime/season/...`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnimeList {
    #[serde(default)]
    pub data: Vec<AnimeNode>,
    #[serde(default)]
    pub paging: Option<Paging>,
}

impl AnimeList {
    pub fn into_records(self) -> Vec<AnimeRecord> {
        if let Some(next) = self.paging.as_ref().and_then(|p| p.next.as_deref()) {
            tracing::debug!(count = self.data.len(), next, "listing truncated to first page");
        }
        self.data.into_iter().map(|wrapper| wrapper.node).collect()
    }
}
