use std::path;

use structopt::StructOpt;

#[derive(Debug, StructOpt)]
#[structopt(name = "soak", about = "Schedule-driven plant watering controller")]
pub struct Options {
    #[structopt(subcommand)]
    pub command: Command,
}

#[derive(Debug, StructOpt)]
pub enum Command {
    /// Run the watering loop: fire configured time slots, gated on rain.
    #[structopt(name = "water")]
    Water(WaterOptions),
    /// Run the status reporter loop, pushing snapshots to the dashboard.
    #[structopt(name = "report")]
    Report(ReportOptions),
    /// Serve the status dashboard.
    #[structopt(name = "dashboard")]
    Dashboard(DashboardOptions),
}

#[derive(Debug, StructOpt)]
pub struct WaterOptions {
    /// Pulse duration in seconds.
    #[structopt(short = "d", long = "duration", default_value = "20")]
    pub duration: u64,

    /// Simulate pulses without driving the relay.
    #[structopt(long = "dry-run")]
    pub dry_run: bool,

    /// Comma-separated HH:MM watering times.
    #[structopt(short = "t", long = "times", default_value = "06:00,18:00")]
    pub times: String,

    /// Water every N seconds instead of at fixed times.
    #[structopt(long = "every", conflicts_with = "times")]
    pub every: Option<u64>,

    /// Seconds between scheduler ticks (at most 60).
    #[structopt(long = "poll-interval", default_value = "30")]
    pub poll_interval: u64,

    /// Path of the append-only watering journal.
    #[structopt(
        long = "journal",
        default_value = "watering_log.jsonl",
        parse(from_os_str)
    )]
    pub journal: path::PathBuf,

    /// Settings file name (without extension).
    #[structopt(short = "c", long = "config", default_value = "soak")]
    pub config: String,
}

#[derive(Debug, StructOpt)]
pub struct ReportOptions {
    /// Comma-separated HH:MM watering times, for the next-scheduled field.
    #[structopt(short = "t", long = "times", default_value = "06:00,18:00")]
    pub times: String,

    /// Path of the append-only watering journal.
    #[structopt(
        long = "journal",
        default_value = "watering_log.jsonl",
        parse(from_os_str)
    )]
    pub journal: path::PathBuf,

    /// Settings file name (without extension).
    #[structopt(short = "c", long = "config", default_value = "soak")]
    pub config: String,
}

#[derive(Debug, StructOpt)]
pub struct DashboardOptions {
    /// Address to listen on.
    #[structopt(short = "l", long = "listen", default_value = "0.0.0.0:5000")]
    pub listen: String,
}
