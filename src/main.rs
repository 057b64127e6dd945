use anyhow::Context;
use calamity::alerts::{
    FanoutSink, LogSink, NotificationSink, RateLimiter, TerminalBell, ThrottledSink,
};
use calamity::config::{AlertsConfig, Config};
use calamity::events::{SensorReading, Status, TrackedPerson};
use calamity::monitoring::{MonitoringSession, Snapshot};
use calamity::roster::{Device, DeviceKind, PersonUpdate};
use calamity::storage::{JsonFileStore, KeyValueStore, Settings};
use clap::{Parser, Subcommand};
use log::{debug, error, info, warn};
use std::path::PathBuf;
use std::time::{Duration, Instant};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::time::MissedTickBehavior;

/// Command-line arguments for the calamity monitor
#[derive(Parser)]
#[command(
    name = "calamity",
    about = "Campus calamity monitor - track people and devices, raise and acknowledge SOS alerts",
    long_about = "Keeps a roster of students and their RFID/GPS devices. In calamity mode it \
                  refreshes positions and statuses on a fixed cadence, raises an SOS alert \
                  whenever someone becomes trapped and lets the operator acknowledge them."
)]
struct Cli {
    /// Path to configuration file
    #[arg(
        short,
        long,
        value_name = "FILE",
        help = "Configuration file path (TOML format)"
    )]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(
        short,
        long,
        help = "Enable verbose logging output (sets RUST_LOG=debug)"
    )]
    verbose: bool,

    /// Override the data directory from the configuration
    #[arg(long, value_name = "DIR")]
    data_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug, PartialEq)]
enum Command {
    /// Activate calamity mode and monitor until Ctrl+C or `stop`
    Run {
        /// Only start if calamity mode was active when the monitor last exited
        #[arg(long)]
        resume: bool,
    },
    /// Append generated people to the roster
    Seed {
        #[arg(short = 'n', long, default_value_t = 20)]
        count: usize,
    },
    /// Print the roster, optionally filtered
    List {
        #[arg(long, value_parser = parse_status)]
        status: Option<Status>,
        /// Only people in this group (class)
        #[arg(long)]
        group: Option<String>,
    },
    /// Print roster totals: people, RFID tags, GPS locators and groups
    Summary,
    /// Add a person to the roster
    Add {
        id: String,
        name: String,
        #[arg(long, default_value = "Unassigned")]
        group: String,
        #[arg(long)]
        section: Option<String>,
        #[arg(long)]
        contact: Option<String>,
        #[arg(long, allow_hyphen_values = true)]
        lat: Option<f64>,
        #[arg(long, allow_hyphen_values = true)]
        lng: Option<f64>,
    },
    /// Change fields of a person; an empty value clears an optional field
    Edit {
        id: String,
        #[arg(long)]
        name: Option<String>,
        #[arg(long)]
        group: Option<String>,
        #[arg(long)]
        section: Option<String>,
        #[arg(long)]
        contact: Option<String>,
        /// GPS locator id
        #[arg(long)]
        locator: Option<String>,
        /// RFID tag id
        #[arg(long)]
        tag: Option<String>,
        #[arg(long, allow_hyphen_values = true)]
        lat: Option<f64>,
        #[arg(long, allow_hyphen_values = true)]
        lng: Option<f64>,
    },
    /// Remove a person from the roster
    Remove { id: String },
    /// Register a device and assign it to a person
    RegisterDevice {
        id: String,
        #[arg(long, value_parser = parse_device_kind, default_value = "gps")]
        kind: DeviceKind,
        /// Id of the person wearing the device
        #[arg(long)]
        person: Option<String>,
    },
    /// Remove a device and clear it from its wearer
    UnregisterDevice { id: String },
    /// Ping a device and mark it online
    Ping { id: String },
    /// Print the most recent events
    Events {
        #[arg(short, long, default_value_t = 20)]
        limit: usize,
    },
    /// Show or change the campus settings
    Settings {
        #[arg(long)]
        campus: Option<String>,
        #[arg(long, allow_hyphen_values = true)]
        lat: Option<f64>,
        #[arg(long, allow_hyphen_values = true)]
        lng: Option<f64>,
        #[arg(long)]
        zoom: Option<u8>,
    },
}

fn parse_device_kind(value: &str) -> Result<DeviceKind, String> {
    match value.to_ascii_lowercase().as_str() {
        "rfid" => Ok(DeviceKind::Rfid),
        "gps" => Ok(DeviceKind::Gps),
        "both" => Ok(DeviceKind::Both),
        other => Err(format!(
            "unknown device kind '{}', expected rfid, gps or both",
            other
        )),
    }
}

fn parse_status(value: &str) -> Result<Status, String> {
    Status::ALL
        .into_iter()
        .find(|status| status.as_str().eq_ignore_ascii_case(value))
        .ok_or_else(|| {
            format!(
                "unknown status '{}', expected safe, trapped or missing",
                value
            )
        })
}

impl Cli {
    /// Validate the CLI arguments
    ///
    /// # Returns
    ///
    /// `Ok(())` if all arguments are valid, `Err(String)` with error message otherwise
    fn validate(&self) -> Result<(), String> {
        if let Some(ref config_path) = self.config {
            // Missing files fall back to defaults, only a directory is rejected
            if config_path.exists() {
                if !config_path.is_file() {
                    return Err(format!(
                        "Configuration path is not a file: {}",
                        config_path.display()
                    ));
                }

                if let Some(extension) = config_path.extension() {
                    if extension != "toml" {
                        warn!(
                            "Configuration file does not have .toml extension: {}",
                            config_path.display()
                        );
                    }
                }
            }
        }

        match &self.command {
            Command::Seed { count: 0 } => Err("Seed count must be at least 1".to_string()),
            Command::Add { lat, lng, .. }
            | Command::Edit { lat, lng, .. }
            | Command::Settings { lat, lng, .. } => check_coordinates(*lat, *lng),
            _ => Ok(()),
        }
    }
}

fn check_coordinates(lat: Option<f64>, lng: Option<f64>) -> Result<(), String> {
    if let Some(lat) = lat {
        if !(-90.0..=90.0).contains(&lat) {
            return Err(format!("Latitude out of range: {}", lat));
        }
    }
    if let Some(lng) = lng {
        if !(-180.0..=180.0).contains(&lng) {
            return Err(format!("Longitude out of range: {}", lng));
        }
    }
    Ok(())
}

/// A line typed by the operator while calamity mode runs
#[derive(Debug, PartialEq)]
enum OperatorCommand {
    Acknowledge(usize),
    Status,
    Stop,
    Reading(SensorReading),
}

/// Parse one line of operator input; blank lines yield `None`
fn parse_operator_line(line: &str) -> Result<Option<OperatorCommand>, String> {
    let line = line.trim();
    if line.is_empty() {
        return Ok(None);
    }

    if line.starts_with('{') {
        return serde_json::from_str(line)
            .map(|reading| Some(OperatorCommand::Reading(reading)))
            .map_err(|e| format!("Invalid sensor reading: {}", e));
    }

    let mut words = line.split_whitespace();
    match (words.next(), words.next(), words.next()) {
        (Some("ack"), Some(index), None) => index
            .parse()
            .map(|index| Some(OperatorCommand::Acknowledge(index)))
            .map_err(|_| format!("Invalid alert index: {}", index)),
        (Some("status"), None, None) => Ok(Some(OperatorCommand::Status)),
        (Some("stop"), None, None) => Ok(Some(OperatorCommand::Stop)),
        _ => Err(format!(
            "Unrecognized input '{}' (expected `ack <N>`, `status`, `stop` or a JSON reading)",
            line
        )),
    }
}

/// Notification sinks for new SOS alerts
///
/// Every alert is logged; the terminal bell, when enabled, is rate limited.
fn build_sink(config: &AlertsConfig) -> Box<dyn NotificationSink> {
    let mut fanout = FanoutSink::new();
    fanout.push(Box::new(LogSink));
    if config.terminal_bell {
        fanout.push(Box::new(ThrottledSink::new(
            TerminalBell,
            RateLimiter::per_minute(config.notifications_per_minute),
        )));
    }
    Box::new(fanout)
}

fn print_snapshot(snapshot: &Snapshot) {
    let counts = &snapshot.counts;
    println!(
        "[cycle {}] {} safe | {} trapped | {} missing | {} with locators | devices {}/{} online",
        snapshot.cycle,
        counts.safe,
        counts.trapped,
        counts.missing,
        counts.devices_active,
        snapshot.devices.online,
        snapshot.devices.total
    );
    for row in &snapshot.active_alerts {
        let who = row.person_name.as_deref().unwrap_or("(removed)");
        match row.position {
            Some(pos) => println!(
                "  [{}] {} {} ({}) at {:.6}, {:.6} since {}",
                row.index,
                row.label,
                who,
                row.person_id,
                pos.latitude,
                pos.longitude,
                row.raised_at.format("%H:%M:%S")
            ),
            None => println!(
                "  [{}] {} {} ({}) since {}",
                row.index,
                row.label,
                who,
                row.person_id,
                row.raised_at.format("%H:%M:%S")
            ),
        }
    }
}

fn print_person(person: &TrackedPerson) {
    println!(
        "{:<10} {:<24} {:<10} {:<8} {:>10.6} {:>11.6}  {}",
        person.id,
        person.name,
        person.group,
        person.status,
        person.latitude,
        person.longitude,
        person.locator_device.as_deref().unwrap_or("-")
    );
}

/// Apply one operator line to the running session
fn handle_operator_line(session: &mut MonitoringSession, line: &str) {
    match parse_operator_line(line) {
        Ok(Some(OperatorCommand::Acknowledge(index))) => match session.acknowledge(index) {
            Some(alert) => println!("Acknowledged {}", alert.label()),
            None => println!("No active alert at position {}", index),
        },
        Ok(Some(OperatorCommand::Status)) => print_snapshot(&session.get_snapshot()),
        Ok(Some(OperatorCommand::Stop)) => {
            if session.stop_monitoring() {
                println!("Calamity mode deactivated");
            }
        }
        Ok(Some(OperatorCommand::Reading(reading))) => session.ingest(reading),
        Ok(None) => {}
        Err(e) => warn!("{}", e),
    }
}

/// Drive calamity mode on a single-threaded runtime until stopped
///
/// The refresh cycle, persistence, fleet simulation, operator input and
/// Ctrl+C all share one thread; none of them ever runs concurrently.
async fn monitor(mut session: MonitoringSession) -> anyhow::Result<()> {
    let snapshot = session
        .start_monitoring(Instant::now())
        .context("Failed to start monitoring")?;
    print_snapshot(snapshot);

    let (shutdown_sender, mut shutdown_receiver) = tokio::sync::mpsc::unbounded_channel();
    ctrlc::set_handler(move || {
        info!("Received interrupt signal (SIGINT), shutting down gracefully...");
        if let Err(e) = shutdown_sender.send(()) {
            error!("Failed to send shutdown signal: {}", e);
        }
    })
    .context("Error setting SIGINT handler for graceful shutdown")?;

    let mut persist = tokio::time::interval(session.config().storage.persist_interval());
    persist.set_missed_tick_behavior(MissedTickBehavior::Skip);
    persist.tick().await;
    let mut fleet = tokio::time::interval(session.config().devices.interval());
    fleet.set_missed_tick_behavior(MissedTickBehavior::Skip);
    fleet.tick().await;

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdin_open = true;

    info!("Calamity monitor is running. Type `ack <N>`, `status` or `stop`; Ctrl+C exits.");

    while let Some(due) = session.next_due() {
        tokio::select! {
            _ = tokio::time::sleep_until(tokio::time::Instant::from_std(due)) => {
                if let Some(snapshot) = session.poll(Instant::now()) {
                    print_snapshot(snapshot);
                }
            }
            _ = persist.tick() => {
                if let Err(e) = session.persist_all() {
                    error!("Periodic save failed: {}", e);
                }
            }
            _ = fleet.tick() => {
                let toggled = session.simulate_devices();
                debug!("Fleet simulation toggled {} devices", toggled);
            }
            line = lines.next_line(), if stdin_open => {
                match line {
                    Ok(Some(line)) => handle_operator_line(&mut session, &line),
                    Ok(None) => {
                        debug!("Operator input closed");
                        stdin_open = false;
                    }
                    Err(e) => {
                        warn!("Failed to read operator input: {}", e);
                        stdin_open = false;
                    }
                }
            }
            _ = shutdown_receiver.recv() => {
                info!("Shutdown signal received");
                break;
            }
        }
    }

    session
        .persist_all()
        .context("Failed to save state on shutdown")?;
    info!("Calamity monitor stopped after {} cycles", session.cycles());
    Ok(())
}

fn run(session: MonitoringSession, store: &dyn KeyValueStore, resume: bool) -> anyhow::Result<()> {
    if resume && !MonitoringSession::calamity_flag(store) {
        println!("Calamity mode was not active, nothing to resume");
        return Ok(());
    }

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("Failed to build async runtime")?;
    let result = runtime.block_on(monitor(session));
    // A pending stdin read cannot be cancelled, so do not wait for it
    runtime.shutdown_timeout(Duration::from_millis(250));
    result
}

fn execute(cli: Cli, config: Config) -> anyhow::Result<()> {
    let data_dir = cli
        .data_dir
        .clone()
        .unwrap_or_else(|| config.storage.data_dir.clone());
    let store = JsonFileStore::open(&data_dir)
        .with_context(|| format!("Failed to open data directory {}", data_dir.display()))?;
    let sink = build_sink(&config.alerts);
    let mut session = MonitoringSession::load(config, Box::new(store.clone()), sink);

    match cli.command {
        Command::Run { resume } => return run(session, &store, resume),
        Command::Seed { count } => {
            let added = session.seed_sample(count);
            println!("Added {} people ({} total)", added, session.roster().len());
        }
        Command::List { status, group } => {
            let mut shown = 0;
            for person in session.roster().filter(status, group.as_deref()) {
                print_person(person);
                shown += 1;
            }
            if shown == 0 {
                println!("No matching people");
            }
        }
        Command::Summary => {
            let summary = session.roster().summary();
            println!("People:        {}", summary.total);
            println!("With RFID tag: {}", summary.with_tag);
            println!("With GPS:      {}", summary.with_locator);
            println!("Groups:        {}", summary.groups);
        }
        Command::Add {
            id,
            name,
            group,
            section,
            contact,
            lat,
            lng,
        } => {
            let settings = session.settings();
            let mut person = TrackedPerson::new(
                id.clone(),
                name,
                group,
                lat.unwrap_or(settings.latitude),
                lng.unwrap_or(settings.longitude),
            );
            if let Some(section) = section {
                person = person.with_section(section);
            }
            if let Some(contact) = contact {
                person = person.with_contact(contact);
            }
            session.add_person(person)?;
            println!("Added {}", id);
        }
        Command::Edit {
            id,
            name,
            group,
            section,
            contact,
            locator,
            tag,
            lat,
            lng,
        } => {
            let update = PersonUpdate {
                name,
                group,
                section,
                contact,
                locator_device: locator,
                tag_device: tag,
                latitude: lat,
                longitude: lng,
            };
            if update == PersonUpdate::default() {
                anyhow::bail!("Nothing to change for {}", id);
            }
            session.update_person(&id, update)?;
            println!("Updated {}", id);
        }
        Command::Remove { id } => {
            let person = session.remove_person(&id)?;
            println!("Removed {} ({})", person.id, person.name);
        }
        Command::RegisterDevice { id, kind, person } => {
            session.register_device(Device::new(id.clone(), kind, person))?;
            println!("Registered {}", id);
        }
        Command::UnregisterDevice { id } => {
            session.unregister_device(&id)?;
            println!("Unregistered {}", id);
        }
        Command::Ping { id } => {
            session.ping_device(&id)?;
            println!("{} is online", id);
        }
        Command::Events { limit } => {
            for event in session.events().recent(limit) {
                println!(
                    "{} {:<20} {}",
                    event.timestamp.format("%Y-%m-%d %H:%M:%S"),
                    serde_json::to_string(&event.kind)?.trim_matches('"'),
                    event.message
                );
            }
        }
        Command::Settings {
            campus,
            lat,
            lng,
            zoom,
        } => {
            if campus.is_none() && lat.is_none() && lng.is_none() && zoom.is_none() {
                println!("{}", serde_json::to_string_pretty(session.settings())?);
                return Ok(());
            }
            let current = session.settings().clone();
            let updated = Settings {
                campus_name: campus.unwrap_or(current.campus_name),
                latitude: lat.unwrap_or(current.latitude),
                longitude: lng.unwrap_or(current.longitude),
                zoom: zoom.unwrap_or(current.zoom),
            };
            session.update_settings(updated);
            println!("Settings updated");
        }
    }

    session.persist_all().context("Failed to save state")?;
    Ok(())
}

fn main() {
    // Parse command-line arguments
    let cli = Cli::parse();

    // Initialize logging based on verbosity
    if cli.verbose {
        std::env::set_var("RUST_LOG", "debug");
    }
    env_logger::init();

    if let Err(e) = cli.validate() {
        error!("Invalid arguments: {}", e);
        std::process::exit(1);
    }

    let config = Config::load_or_default(cli.config.as_deref());

    if let Err(e) = execute(cli, config) {
        error!("{:#}", e);
        std::process::exit(1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cli(config: Option<PathBuf>, command: Command) -> Cli {
        Cli {
            config,
            verbose: false,
            data_dir: None,
            command,
        }
    }

    fn list_all() -> Command {
        Command::List {
            status: None,
            group: None,
        }
    }

    #[test]
    fn test_cli_validation_with_existing_file() {
        let temp_file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        std::fs::write(temp_file.path(), "[simulation]\nseed = 1").unwrap();

        let cli = cli(Some(temp_file.path().to_path_buf()), list_all());
        assert!(cli.validate().is_ok());
    }

    #[test]
    fn test_cli_validation_with_missing_file() {
        let cli = cli(Some(PathBuf::from("/nonexistent/config.toml")), list_all());

        // Should not fail - missing files are handled gracefully
        assert!(cli.validate().is_ok());
    }

    #[test]
    fn test_cli_validation_with_directory() {
        let dir = tempfile::tempdir().unwrap();
        let cli = cli(Some(dir.path().to_path_buf()), list_all());

        assert!(cli.validate().is_err());
    }

    #[test]
    fn test_cli_validation_rejects_zero_seed() {
        let cli = cli(None, Command::Seed { count: 0 });
        assert!(cli.validate().is_err());
    }

    #[test]
    fn test_cli_validation_rejects_bad_coordinates() {
        let cli = cli(
            None,
            Command::Settings {
                campus: None,
                lat: Some(91.0),
                lng: None,
                zoom: None,
            },
        );
        assert!(cli.validate().is_err());
    }

    #[test]
    fn test_parse_subcommands() {
        let cli = Cli::try_parse_from(["calamity", "--verbose", "run", "--resume"]).unwrap();
        assert!(cli.verbose);
        assert_eq!(cli.command, Command::Run { resume: true });

        let cli = Cli::try_parse_from([
            "calamity",
            "register-device",
            "RFID00001",
            "--kind",
            "both",
            "--person",
            "STU0001",
        ])
        .unwrap();
        assert_eq!(
            cli.command,
            Command::RegisterDevice {
                id: "RFID00001".to_string(),
                kind: DeviceKind::Both,
                person: Some("STU0001".to_string()),
            }
        );

        let unknown_kind = ["calamity", "register-device", "X", "--kind", "radio"];
        assert!(Cli::try_parse_from(unknown_kind).is_err());
    }

    #[test]
    fn test_parse_list_filters_and_summary() {
        let cli = Cli::try_parse_from(["calamity", "list"]).unwrap();
        assert_eq!(cli.command, list_all());

        let cli = Cli::try_parse_from([
            "calamity", "list", "--status", "Trapped", "--group", "Grade 7",
        ])
        .unwrap();
        assert_eq!(
            cli.command,
            Command::List {
                status: Some(Status::Trapped),
                group: Some("Grade 7".to_string()),
            }
        );
        assert!(Cli::try_parse_from(["calamity", "list", "--status", "lost"]).is_err());

        let cli = Cli::try_parse_from(["calamity", "summary"]).unwrap();
        assert_eq!(cli.command, Command::Summary);
    }

    #[test]
    fn test_parse_edit_and_ping() {
        let cli = Cli::try_parse_from([
            "calamity", "edit", "STU0001", "--name", "Ana Cruz", "--tag", "", "--lat", "-7.5",
        ])
        .unwrap();
        assert_eq!(
            cli.command,
            Command::Edit {
                id: "STU0001".to_string(),
                name: Some("Ana Cruz".to_string()),
                group: None,
                section: None,
                contact: None,
                locator: None,
                tag: Some(String::new()),
                lat: Some(-7.5),
                lng: None,
            }
        );
        assert!(cli.validate().is_ok());

        let cli = Cli::try_parse_from(["calamity", "edit", "STU0001", "--lng", "200"]).unwrap();
        assert!(cli.validate().is_err());

        let cli = Cli::try_parse_from(["calamity", "ping", "GPS0001"]).unwrap();
        assert_eq!(
            cli.command,
            Command::Ping {
                id: "GPS0001".to_string()
            }
        );
        assert!(Cli::try_parse_from(["calamity", "ping"]).is_err());
    }

    #[test]
    fn test_parse_operator_commands() {
        assert_eq!(
            parse_operator_line("ack 2").unwrap(),
            Some(OperatorCommand::Acknowledge(2))
        );
        assert_eq!(
            parse_operator_line("  status ").unwrap(),
            Some(OperatorCommand::Status)
        );
        assert_eq!(parse_operator_line("stop").unwrap(), Some(OperatorCommand::Stop));
        assert_eq!(parse_operator_line("").unwrap(), None);
        assert!(parse_operator_line("ack").is_err());
        assert!(parse_operator_line("ack -1").is_err());
        assert!(parse_operator_line("dance").is_err());
    }

    #[test]
    fn test_parse_operator_reading() {
        let line = r#"{"device_id":"GPS0001","latitude":7.07,"longitude":125.61,"emergency":true}"#;
        match parse_operator_line(line).unwrap() {
            Some(OperatorCommand::Reading(reading)) => {
                assert_eq!(reading.device_id, "GPS0001");
                assert!(reading.emergency);
            }
            other => panic!("expected a reading, got {:?}", other),
        }

        assert!(parse_operator_line("{\"device_id\":1}").is_err());
    }

    #[test]
    fn test_build_sink_without_bell() {
        let config = AlertsConfig {
            terminal_bell: false,
            ..AlertsConfig::default()
        };
        let mut sink = build_sink(&config);
        let person = TrackedPerson::new("S1", "Ana", "Grade 7", 7.0, 125.0);
        let alert = calamity::alerts::Alert {
            id: 1,
            person_id: "S1".to_string(),
            raised_at: chrono::Utc::now(),
            acknowledged: false,
        };
        assert!(sink.play_alert(&alert, &person).is_ok());
    }
}
