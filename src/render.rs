use dialoguer::theme::{ColorfulTheme, SimpleTheme, Theme};

use crate::schedule::broadcast_label;
use crate::state::ViewPreferences;
use crate::types::AnimeRecord;

const SYNOPSIS_PREVIEW_CHARS: usize = 240;

pub fn theme(preferences: ViewPreferences) -> Box<dyn Theme> {
    if preferences.dark_mode {
        Box::new(ColorfulTheme::default())
    } else {
        Box::new(SimpleTheme)
    }
}

fn favorite_marker(favorite: bool) -> &'static str {
    if favorite { "\u{2605}" } else { " " }
}

fn slot(record: &AnimeRecord) -> String {
    record
        .broadcast
        .as_ref()
        .and_then(broadcast_label)
        .unwrap_or_else(|| String::from("Unscheduled"))
}

fn score(record: &AnimeRecord) -> String {
    record
        .mean
        .map(|mean| format!("{mean:.2}"))
        .unwrap_or_else(|| String::from("N/A"))
}

/// One line per record, used by compact view and selection menus.
pub fn card_line(record: &AnimeRecord, favorite: bool) -> String {
    format!(
        "{} {} \u{00b7} {} \u{00b7} {}",
        favorite_marker(favorite),
        slot(record),
        record.title,
        score(record)
    )
}

pub fn card(record: &AnimeRecord, favorite: bool) -> String {
    let mut lines = vec![
        format!("{} {}", favorite_marker(favorite), record.title),
        format!(
            "  {} \u{00b7} Score: {} \u{00b7} Episodes: {}",
            slot(record),
            score(record),
            record
                .num_episodes
                .map(|n| n.to_string())
                .unwrap_or_else(|| String::from("N/A"))
        ),
    ];
    if !record.genres.is_empty() {
        let genres: Vec<&str> = record.genres.iter().map(|g| g.name.as_str()).collect();
        lines.push(format!("  {}", genres.join(", ")));
    }
    let synopsis = record
        .synopsis
        .as_deref()
        .unwrap_or("No synopsis available.");
    lines.push(format!("  {}", truncate(synopsis, SYNOPSIS_PREVIEW_CHARS)));
    lines.join("\n")
}

pub fn detail(record: &AnimeRecord, favorite: bool) -> String {
    let mut lines = vec![
        format!("{} {}", favorite_marker(favorite), record.title),
        format!("  Broadcast: {}", slot(record)),
        format!("  Score: {}", score(record)),
    ];
    if let Some(season) = record.start_season {
        lines.push(format!("  Season: {}", season.label()));
    }
    if let Some(rank) = record.rank {
        lines.push(format!("  Rank: #{rank}"));
    }
    if let Some(popularity) = record.popularity {
        lines.push(format!("  Popularity: #{popularity}"));
    }
    if let Some(episodes) = record.num_episodes {
        lines.push(format!("  Episodes: {episodes}"));
    }
    if let Some(status) = &record.status {
        lines.push(format!("  Status: {}", status.replace('_', " ")));
    }
    if !record.genres.is_empty() {
        let genres: Vec<&str> = record.genres.iter().map(|g| g.name.as_str()).collect();
        lines.push(format!("  Genres: {}", genres.join(", ")));
    }
    if !record.streaming_services.is_empty() {
        let services: Vec<&str> = record
            .streaming_services
            .iter()
            .map(|s| s.name.as_str())
            .collect();
        lines.push(format!("  Streaming: {}", services.join(", ")));
    }
    if let Some(picture) = record.main_picture.as_ref().and_then(|p| p.large.as_ref().or(p.medium.as_ref())) {
        lines.push(format!("  Picture: {picture}"));
    }
    lines.push(format!("  {}", record.page_url()));
    lines.push(String::new());
    lines.push(
        record
            .synopsis
            .clone()
            .unwrap_or_else(|| String::from("No synopsis available.")),
    );
    lines.join("\n")
}

pub fn print_schedule(records: &[AnimeRecord], compact: bool, is_favorite: impl Fn(u64) -> bool) {
    if records.is_empty() {
        println!("Nothing airing for this filter.");
        return;
    }
    for record in records {
        if compact {
            println!("{}", card_line(record, is_favorite(record.id)));
        } else {
            println!("{}\n", card(record, is_favorite(record.id)));
        }
    }
}

fn truncate(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    let cut: String = text.chars().take(max_chars).collect();
    format!("{}\u{2026}", cut.trim_end())
}
