use std::env;
use std::sync;
use std::sync::atomic;
use std::time;

use slog::{o, Drain};
use structopt::StructOpt;

mod clock;
mod dashboard;
mod journal;
mod options;
mod relay;
mod report;
mod scheduler;
mod settings;
mod slots;
mod weather;

fn main() -> Result<(), failure::Error> {
    let options = options::Options::from_args();

    let _guard = init_logging();
    slog_stdlog::init()?;

    match options.command {
        options::Command::Water(ref water) => run_water(water),
        options::Command::Report(ref report) => run_report(report),
        options::Command::Dashboard(ref opts) => dashboard::run(opts),
    }
}

fn init_logging() -> slog_scope::GlobalLoggerGuard {
    let decorator = slog_term::TermDecorator::new().build();
    let drain = slog_term::FullFormat::new(decorator).build().fuse();

    let mut builder = slog_envlogger::LogBuilder::new(drain);
    builder = builder.filter(None, slog::FilterLevel::Info);
    if let Ok(spec) = env::var("RUST_LOG") {
        builder = builder.parse(&spec);
    }
    let drain = builder.build().fuse();

    let drain = slog_async::Async::new(drain).build().fuse();

    slog_scope::set_global_logger(slog::Logger::root(drain, o!()))
}

fn run_water(options: &options::WaterOptions) -> Result<(), failure::Error> {
    if options.poll_interval > 60 {
        return Err(slots::ConfigError::PollIntervalTooCoarse(options.poll_interval).into());
    }

    // Configuration must be rejected before the relay is touched or the
    // loop is entered.
    let trigger_slots = match options.every {
        Some(_) => None,
        None => {
            let parsed = slots::parse_times(&options.times)?;
            if parsed.is_empty() {
                return Err(slots::ConfigError::NothingToTrigger.into());
            }
            Some(parsed)
        }
    };

    let settings = settings::load(&options.config)?;

    if options.dry_run {
        water_loop(options, &settings, relay::NullRelay, trigger_slots)
    } else {
        let gpio = relay::GpioRelay::new(settings.relay.pin, settings.relay.active_low)?;
        water_loop(options, &settings, gpio, trigger_slots)
    }
}

fn water_loop<R>(
    options: &options::WaterOptions,
    settings: &settings::Settings,
    relay: R,
    trigger_slots: Option<Vec<slots::TimeSlot>>,
) -> Result<(), failure::Error>
where
    R: relay::Relay,
{
    let actuator = relay::Actuator::new(relay);
    let gate = weather::RainGate::new(&settings.weather);
    let journal = journal::EventLog::new(options.journal.clone());
    let duration = time::Duration::from_secs(options.duration);

    let mut scheduler = match trigger_slots {
        None => scheduler::Scheduler::with_frequency(
            time::Duration::from_secs(options.every.unwrap_or(0)),
            actuator,
            gate,
            journal,
            duration,
            options.dry_run,
        ),
        Some(parsed) => scheduler::Scheduler::with_slots(
            parsed,
            actuator,
            gate,
            journal,
            duration,
            options.dry_run,
        )?,
    };

    let running = shutdown_flag()?;

    scheduler.run(
        &clock::SystemClock,
        time::Duration::from_secs(options.poll_interval),
        &running,
    )
}

fn run_report(options: &options::ReportOptions) -> Result<(), failure::Error> {
    let settings = settings::load(&options.config)?;
    let slots = slots::parse_times(&options.times)?;
    let journal = journal::EventLog::new(options.journal.clone());
    let gate = weather::RainGate::new(&settings.weather);

    let reporter = report::Reporter::new(
        journal,
        slots,
        &settings.dashboard,
        time::Duration::from_secs(settings.reporter.interval_secs),
    );

    let running = shutdown_flag()?;
    reporter.run(&clock::SystemClock, &gate, &running);

    Ok(())
}

/// Set on startup, cleared by SIGINT/SIGTERM.  The loops poll it so the
/// process winds down through the normal exit path, which drives the relay
/// inactive before the GPIO pin is released.
fn shutdown_flag() -> Result<sync::Arc<atomic::AtomicBool>, failure::Error> {
    let running = sync::Arc::new(atomic::AtomicBool::new(true));

    let handler_flag = running.clone();
    ctrlc::set_handler(move || {
        handler_flag.store(false, atomic::Ordering::SeqCst);
    })?;

    Ok(running)
}
