use std::{sync::Arc, time::Duration};

use anyhow::{anyhow, Context, Result};
use chrono::{Local, NaiveTime, Timelike, Weekday};
use clap::{Parser, Subcommand, ValueEnum};

use homezone::{
    dispatch::{DeviceCommandChannel, LogNotifier, LoggingCommandChannel},
    file_store::FileStore,
    location::FixedPositionSource,
    schedule::{run_due_schedules, RecurringSchedule, ScheduleAction},
    store::HomeSettings,
    AutomationError, Device, GeoPoint, ZoneMonitor,
};
use homezone_config::{default_config, get_parsed, CompositeConfig, Config, EnvConfig};

#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    /// State file, overrides HOMEZONE_STORE_PATH
    #[arg(long)]
    store: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(clap::Args, Debug, Clone, Copy)]
struct Position {
    #[arg(long, allow_negative_numbers = true)]
    lat: f64,
    #[arg(long, allow_negative_numbers = true)]
    lon: f64,
}

impl From<Position> for GeoPoint {
    fn from(p: Position) -> Self {
        GeoPoint::new(p.lat, p.lon)
    }
}

#[derive(ValueEnum, Debug, Clone, Copy)]
enum Switch {
    On,
    Off,
}

impl Switch {
    fn enabled(self) -> bool {
        matches!(self, Switch::On)
    }
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Save the given position as home
    SetHome(Position),
    /// Enable or disable activating a device on arrival
    Toggle { device: Device, switch: Switch },
    /// Enable or disable periodic location checks
    AutoCheck { switch: Switch },
    /// Check once whether the given position enters or leaves home
    Check(Position),
    /// Keep checking the given position until interrupted
    Watch {
        #[command(flatten)]
        position: Position,
        /// Seconds between checks, overrides HOMEZONE_POLL_INTERVAL_SECS
        #[arg(long)]
        interval: Option<u64>,
    },
    /// Manage recurring weekly schedules
    #[command(subcommand)]
    Schedule(ScheduleCommand),
}

#[derive(Subcommand, Debug)]
enum ScheduleCommand {
    Add {
        #[arg(long, value_parser = parse_action)]
        action: ScheduleAction,
        /// Local time as HH:MM
        #[arg(long, value_parser = parse_time)]
        at: NaiveTime,
        /// Comma separated, e.g. mon,wed,fri
        #[arg(long, value_delimiter = ',', required = true)]
        days: Vec<Weekday>,
    },
    List,
    Remove { id: String },
    Toggle { id: String },
    /// Send the commands of all schedules that are due now
    Run,
}

fn parse_action(s: &str) -> Result<ScheduleAction, String> {
    ScheduleAction::from_key(s).ok_or_else(|| {
        let keys: Vec<_> = ScheduleAction::ALL.iter().map(|a| a.key()).collect();
        format!("unknown action '{s}', expected one of {}", keys.join(", "))
    })
}

fn parse_time(s: &str) -> Result<NaiveTime, String> {
    NaiveTime::parse_from_str(s, "%H:%M").map_err(|e| format!("expected HH:MM: {e}"))
}

fn report(err: AutomationError) -> anyhow::Error {
    match err.user_prompt() {
        Some(prompt) => anyhow!("{err}\n{prompt}"),
        None => anyhow::Error::new(err),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let config = CompositeConfig::new(vec![
        Box::new(EnvConfig::from_env()),
        Box::new(default_config()),
    ]);
    homezone::init_logging(&config);

    let store_path = match &args.store {
        Some(path) => path.clone(),
        None => config.get(homezone_config::STORE_PATH)?,
    };
    log::debug!("using state file {store_path}");
    let store = FileStore::open(&store_path)?;

    match args.command {
        Command::SetHome(position) => {
            let monitor = build_monitor(store, position.into());
            let home = monitor.set_home_from_current_position().await.map_err(report)?;
            println!("home set to {:.6}, {:.6}", home.latitude, home.longitude);
        }
        Command::Toggle { device, switch } => {
            HomeSettings::new(store).set_toggle(device, switch.enabled())?;
            println!("auto activation of {device} {}", if switch.enabled() { "on" } else { "off" });
        }
        Command::AutoCheck { switch } => {
            HomeSettings::new(store).set_auto_check(switch.enabled())?;
        }
        Command::Check(position) => {
            let monitor = build_monitor(store, position.into());
            let outcome = monitor.check().await.map_err(report)?;
            let decision = &outcome.decision;
            println!(
                "{:.1} m from home, {}",
                decision.distance_meters,
                if decision.is_inside { "inside" } else { "outside" }
            );
            if let Some(summary) = &outcome.summary {
                println!("{summary}");
            }
        }
        Command::Watch { position, interval } => {
            let interval = match interval {
                Some(secs) => secs,
                None => get_parsed::<u64>(&config, homezone_config::POLL_INTERVAL_SECS)?,
            };
            watch(store, position.into(), Duration::from_secs(interval.max(1))).await?;
        }
        Command::Schedule(command) => schedule(HomeSettings::new(store), command).await?,
    }

    Ok(())
}

fn build_monitor(store: FileStore, position: GeoPoint) -> ZoneMonitor<FileStore> {
    ZoneMonitor::new(
        store,
        Arc::new(FixedPositionSource::new(position)),
        Arc::new(LoggingCommandChannel),
        Arc::new(LogNotifier),
    )
}

async fn watch(store: FileStore, position: GeoPoint, interval: Duration) -> Result<()> {
    let monitor = build_monitor(store, position);
    let settings = monitor.settings();
    if !settings.lock().await.auto_check()? {
        log::warn!("automatic location check is off, enable it with `auto-check on`");
    }

    let polling = monitor.spawn_polling(interval);

    let channel: Arc<dyn DeviceCommandChannel> = Arc::new(LoggingCommandChannel);
    let schedules = tokio::spawn(async move {
        let mut ival = tokio::time::interval(interval);
        ival.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            ival.tick().await;
            let now = Local::now().naive_local();
            if let Err(e) = run_due_schedules(&settings, &channel, now).await {
                log::error!("running schedules failed: {e:#}");
            }
        }
    });

    tokio::signal::ctrl_c().await.context("waiting for ctrl-c")?;
    log::info!("stopping");
    polling.abort();
    schedules.abort();
    Ok(())
}

async fn schedule(mut settings: HomeSettings<FileStore>, command: ScheduleCommand) -> Result<()> {
    let now = Local::now().naive_local();
    match command {
        ScheduleCommand::Add { action, at, days } => {
            let schedule = RecurringSchedule::new(action, at.hour(), at.minute(), days);
            let id = settings.add_schedule(schedule, now)?;
            println!("added schedule {id}");
        }
        ScheduleCommand::List => {
            for s in settings.schedules()? {
                let state = if s.enabled { "" } else { " (disabled)" };
                let next = s
                    .next_run_after(now)
                    .map(|t| t.format("%a %Y-%m-%d %H:%M").to_string())
                    .unwrap_or_else(|| "-".to_string());
                println!("{}  {}{state}  next: {next}", s.id, s.describe());
            }
        }
        ScheduleCommand::Remove { id } => settings.remove_schedule(&id)?,
        ScheduleCommand::Toggle { id } => {
            let enabled = settings.toggle_schedule(&id)?;
            println!("schedule {id} {}", if enabled { "enabled" } else { "disabled" });
        }
        ScheduleCommand::Run => {
            let channel: Arc<dyn DeviceCommandChannel> = Arc::new(LoggingCommandChannel);
            let settings = Arc::new(tokio::sync::Mutex::new(settings));
            let ran = run_due_schedules(&settings, &channel, now).await?;
            println!("ran {} schedule(s)", ran.len());
        }
    }
    Ok(())
}
