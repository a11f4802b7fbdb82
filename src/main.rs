use std::{path::PathBuf, time::Duration};

use anyhow::{Context, Result};
use chrono::Local;
use clap::{Parser, Subcommand};
use dialoguer::{FuzzySelect, Select};
use tracing_subscriber::EnvFilter;

mod cache;
mod config;
mod interrupt;
mod keepalive;
mod providers;
mod proxy;
mod render;
mod schedule;
mod service;
mod state;
mod storage;
mod types;

use cache::ResponseCache;
use config::Settings;
use interrupt::Interrupt;
use keepalive::KeepAlive;
use providers::{ClientError, relay::RelayClient};
use schedule::{TimeFilter, derive_schedule};
use service::AnimeService;
use state::ViewState;
use storage::FileStorage;
use types::{AnimeRecord, StartSeason};

#[derive(Debug, Parser)]
#[command(
    name = "anitrack",
    about = "Seasonal anime broadcast schedules from MyAnimeList.",
    version
)]
struct Cli {
    /// Config file (defaults to <config dir>/anitrack/config.toml).
    #[arg(long, value_name = "FILE", global = true)]
    config: Option<PathBuf>,

    /// Relay base URL, overriding `relay_url`.
    #[arg(long, value_name = "URL", global = true)]
    relay: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Run the relay in front of the MyAnimeList API.
    Serve {
        #[arg(long)]
        port: Option<u16>,
    },
    /// Print this season's broadcast schedule.
    Schedule {
        #[arg(short, long, value_enum, default_value_t = TimeFilter::All)]
        filter: TimeFilter,
        #[arg(long)]
        refresh: bool,
    },
    /// Browse the schedule interactively.
    Browse {
        #[arg(short, long, value_enum, default_value_t = TimeFilter::All)]
        filter: TimeFilter,
        #[arg(long)]
        refresh: bool,
    },
    /// Search MyAnimeList and show the matches airing this season.
    Search {
        #[arg(value_name = "QUERY", required = true)]
        query: Vec<String>,
        #[arg(short, long, value_enum, default_value_t = TimeFilter::All)]
        filter: TimeFilter,
        #[arg(long)]
        refresh: bool,
    },
    /// Show one anime in full.
    Details { id: u64 },
    /// Add or remove a favorite.
    Favorite { id: u64 },
    /// Show view preferences, toggling the given ones first.
    Prefs {
        #[arg(long)]
        dark_mode: bool,
        #[arg(long)]
        compact: bool,
    },
}

struct Viewer {
    service: AnimeService<RelayClient, FileStorage>,
    state: ViewState<FileStorage>,
    client: RelayClient,
    keepalive_interval: Duration,
    interrupt: Interrupt,
}

impl Viewer {
    fn open(settings: &Settings, relay_override: Option<String>) -> Result<Self> {
        let storage = FileStorage::open_at(settings.storage_dir()?);
        let relay_url = relay_override.unwrap_or_else(|| settings.relay_url.clone());
        let client = RelayClient::new(&relay_url)
            .with_context(|| format!("failed to create relay client for {relay_url}"))?;
        Ok(Self {
            service: AnimeService::new(client.clone(), ResponseCache::new(storage.clone())),
            state: ViewState::load(storage),
            client,
            keepalive_interval: Duration::from_secs(settings.keepalive_secs.max(1)),
            interrupt: Interrupt::listen(),
        })
    }
}

#[tokio::main]
async fn main() {
    if let Err(err) = run().await {
        eprintln!("error: {err:?}");
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    let cli = Cli::parse();
    let default_level = match cli.command {
        Command::Serve { .. } => "info",
        _ => "warn",
    };
    init_logging(default_level);

    let mut settings = Settings::load(cli.config.as_deref())?;

    match cli.command {
        Command::Serve { port } => {
            if let Some(port) = port {
                settings.port = port;
            }
            proxy::serve(&settings, async {
                let _ = tokio::signal::ctrl_c().await;
            })
            .await
        }
        Command::Schedule { filter, refresh } => {
            let viewer = Viewer::open(&settings, cli.relay)?;
            run_schedule(&viewer, filter, refresh).await
        }
        Command::Browse { filter, refresh } => {
            let mut viewer = Viewer::open(&settings, cli.relay)?;
            run_browse(&mut viewer, filter, refresh).await
        }
        Command::Search {
            query,
            filter,
            refresh,
        } => {
            let viewer = Viewer::open(&settings, cli.relay)?;
            run_search(&viewer, &query.join(" "), filter, refresh).await
        }
        Command::Details { id } => {
            let viewer = Viewer::open(&settings, cli.relay)?;
            let cancel = viewer.interrupt.token();
            match viewer.service.details(id, &cancel).await {
                Ok(record) => {
                    println!("{}", render::detail(&record, viewer.state.is_favorite(id)));
                    Ok(())
                }
                Err(ClientError::Cancelled) => {
                    println!("Cancelled.");
                    Ok(())
                }
                Err(err) => Err(err).with_context(|| format!("failed to fetch anime {id}")),
            }
        }
        Command::Favorite { id } => {
            let mut viewer = Viewer::open(&settings, cli.relay)?;
            if viewer.state.toggle_favorite(id) {
                println!("Added {id} to favorites.");
            } else {
                println!("Removed {id} from favorites.");
            }
            Ok(())
        }
        Command::Prefs { dark_mode, compact } => {
            let mut viewer = Viewer::open(&settings, cli.relay)?;
            if dark_mode {
                viewer.state.toggle_dark_mode();
            }
            if compact {
                viewer.state.toggle_compact_view();
            }
            let prefs = viewer.state.preferences();
            println!("Dark mode: {}", on_off(prefs.dark_mode));
            println!("Compact view: {}", on_off(prefs.compact_view));
            println!("Favorites: {}", viewer.state.favorites().len());
            Ok(())
        }
    }
}

fn init_logging(default_directive: &str) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directive));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn on_off(flag: bool) -> &'static str {
    if flag { "on" } else { "off" }
}

async fn run_schedule(viewer: &Viewer, filter: TimeFilter, refresh: bool) -> Result<()> {
    let cancel = viewer.interrupt.token();
    let records = match viewer.service.seasonal(&cancel, refresh).await {
        Ok(records) => records,
        Err(ClientError::Cancelled) => {
            println!("Cancelled.");
            return Ok(());
        }
        Err(err) => return Err(err).context("failed to load seasonal anime"),
    };

    let today = Local::now().date_naive();
    let schedule = derive_schedule(records, filter, viewer.state.favorites(), today);
    println!(
        "{} \u{00b7} {} \u{00b7} {} shows\n",
        StartSeason::current(today).label(),
        filter.label(),
        schedule.len()
    );
    render::print_schedule(
        &schedule,
        viewer.state.preferences().compact_view,
        |id| viewer.state.is_favorite(id),
    );
    Ok(())
}

async fn run_search(viewer: &Viewer, query: &str, filter: TimeFilter, refresh: bool) -> Result<()> {
    let cancel = viewer.interrupt.token();
    let records = match viewer.service.search(query, &cancel, refresh).await {
        Ok(records) => records,
        Err(ClientError::Cancelled) => {
            println!("Cancelled.");
            return Ok(());
        }
        Err(err) => return Err(err).with_context(|| format!("search for \"{query}\" failed")),
    };

    let total = records.len();
    let today = Local::now().date_naive();
    let schedule = derive_schedule(records, filter, viewer.state.favorites(), today);
    println!(
        "\"{}\" \u{00b7} {} of {} results airing in {}\n",
        query.trim(),
        schedule.len(),
        total,
        StartSeason::current(today).label()
    );
    render::print_schedule(
        &schedule,
        viewer.state.preferences().compact_view,
        |id| viewer.state.is_favorite(id),
    );
    Ok(())
}

enum MenuAction {
    Open(usize),
    ChangeFilter,
    Refresh,
    ToggleDarkMode,
    ToggleCompactView,
}

async fn run_browse(viewer: &mut Viewer, filter: TimeFilter, refresh: bool) -> Result<()> {
    viewer.state.set_filter(filter);
    let keepalive = KeepAlive::start(viewer.client.clone(), viewer.keepalive_interval);
    let result = browse_loop(viewer, &keepalive, refresh).await;
    keepalive.stop().await;
    result
}

async fn browse_loop(viewer: &mut Viewer, keepalive: &KeepAlive, refresh: bool) -> Result<()> {
    let mut refresh_next = refresh;
    loop {
        viewer.state.set_online(keepalive.is_online());
        let cancel = viewer.interrupt.token();
        let records = match viewer.service.seasonal(&cancel, refresh_next).await {
            Ok(records) => records,
            Err(ClientError::Cancelled) => return Ok(()),
            Err(err) => {
                println!("Failed to load seasonal anime: {err}");
                viewer.state.set_online(false);
                Vec::new()
            }
        };
        refresh_next = false;

        let today = Local::now().date_naive();
        let schedule = derive_schedule(
            records,
            viewer.state.filter(),
            viewer.state.favorites(),
            today,
        );

        let mut items: Vec<String> = schedule
            .iter()
            .map(|record| render::card_line(record, viewer.state.is_favorite(record.id)))
            .collect();
        let mut actions: Vec<MenuAction> = (0..schedule.len()).map(MenuAction::Open).collect();
        items.push(format!("[Filter: {}]", viewer.state.filter().label()));
        actions.push(MenuAction::ChangeFilter);
        items.push(String::from("[Refresh]"));
        actions.push(MenuAction::Refresh);
        items.push(format!(
            "[Dark mode: {}]",
            on_off(viewer.state.preferences().dark_mode)
        ));
        actions.push(MenuAction::ToggleDarkMode);
        items.push(format!(
            "[Compact view: {}]",
            on_off(viewer.state.preferences().compact_view)
        ));
        actions.push(MenuAction::ToggleCompactView);

        let status = if viewer.state.is_online() {
            ""
        } else {
            " \u{00b7} offline"
        };
        let prompt = format!(
            "{} \u{00b7} {} \u{00b7} {} shows{} (Esc to quit)",
            StartSeason::current(today).label(),
            viewer.state.filter().label(),
            schedule.len(),
            status
        );

        let theme = render::theme(viewer.state.preferences());
        let selection = FuzzySelect::with_theme(&*theme)
            .with_prompt(prompt)
            .items(&items)
            .default(0)
            .interact_opt()?;
        let Some(idx) = selection else {
            println!("Bye.");
            return Ok(());
        };

        match actions.get(idx) {
            Some(MenuAction::Open(pos)) => {
                viewer.state.select(schedule[*pos].clone());
                detail_view(viewer)?;
            }
            Some(MenuAction::ChangeFilter) => {
                let labels: Vec<&str> = TimeFilter::ALL.iter().map(|f| f.label()).collect();
                let current = TimeFilter::ALL
                    .iter()
                    .position(|f| *f == viewer.state.filter())
                    .unwrap_or(0);
                let choice = Select::with_theme(&*theme)
                    .with_prompt("Show")
                    .items(&labels)
                    .default(current)
                    .interact_opt()?;
                if let Some(choice) = choice {
                    viewer.state.set_filter(TimeFilter::ALL[choice]);
                }
            }
            Some(MenuAction::Refresh) => refresh_next = true,
            Some(MenuAction::ToggleDarkMode) => {
                viewer.state.toggle_dark_mode();
            }
            Some(MenuAction::ToggleCompactView) => {
                viewer.state.toggle_compact_view();
            }
            None => {}
        }
    }
}

fn detail_view(viewer: &mut Viewer) -> Result<()> {
    loop {
        let Some(record) = viewer.state.selected().cloned() else {
            return Ok(());
        };
        let favorite = viewer.state.is_favorite(record.id);
        println!("\n{}\n", render::detail(&record, favorite));

        let options = [
            if favorite {
                "Remove from favorites"
            } else {
                "Add to favorites"
            },
            "Open on MyAnimeList",
            "Back",
        ];
        let theme = render::theme(viewer.state.preferences());
        let selection = Select::with_theme(&*theme)
            .with_prompt(record.title.as_str())
            .items(&options)
            .default(0)
            .interact_opt()?;

        match selection {
            Some(0) => {
                viewer.state.toggle_favorite(record.id);
            }
            Some(1) => open_page(&record),
            _ => {
                viewer.state.dismiss();
                return Ok(());
            }
        }
    }
}

fn open_page(record: &AnimeRecord) {
    let url = record.page_url();
    if let Err(err) = open::that(&url) {
        println!("Could not open a browser ({err}). Visit {url}");
    }
}
