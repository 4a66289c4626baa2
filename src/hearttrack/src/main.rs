#[macro_use]
extern crate log;

use std::{
    path::PathBuf,
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
    thread,
    time::Duration,
};

use anyhow::{Context, anyhow};
use clap::{CommandFactory, Parser, Subcommand};
use dotenv::dotenv;
use hearttrack::{FileStorage, HttpTransport, SimulatedSensor, SystemClock};
use hearttrack_codec::{
    ConfigRecord, QueueImage, iso8601,
    layout::{CONFIG_REGION_OFFSET, QUEUE_REGION_OFFSET},
};
use hearttrack_device::{
    BootError, ConfigStore, Controller, ControllerOptions, DeviceEvent, DurableQueue, Storage,
};
use hearttrack_types::StatusPattern;

#[derive(Parser)]
pub struct HeartTrackCli {
    #[arg(env, long, default_value = "hearttrack.bin")]
    pub storage_path: PathBuf,
    #[arg(env, long, default_value_t = 96)]
    pub queue_capacity: usize,
    #[clap(subcommand)]
    pub subcommand: HeartTrackCommand,
}

#[derive(Subcommand)]
pub enum HeartTrackCommand {
    ///
    /// Run the measurement controller until Ctrl-C
    ///
    Run {
        #[arg(env, long)]
        api_base_url: String,
        #[arg(env, long)]
        api_key: String,
        #[arg(env, long)]
        device_id: String,
        #[arg(env, long, default_value_t = 100)]
        tick_ms: u64,
        ///
        /// Seconds until the first measurement, instead of one full interval
        ///
        #[arg(long)]
        first_measurement_in: Option<u64>,
        #[arg(long, hide = true)]
        simulate_missing_sensor: bool,
    },
    ///
    /// Print results waiting in the persisted queue
    ///
    Queue {
        #[arg(long)]
        json: bool,
    },
    ///
    /// Print the persisted schedule configuration
    ///
    Config {
        #[arg(long)]
        json: bool,
    },
    ///
    /// Hex dump of both persisted regions
    ///
    Dump,
    ///
    /// Generate shell completions
    ///
    Completions { shell: Option<clap_complete::Shell> },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    if let Err(error) = dotenv() {
        println!("{}", error);
    }

    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .filter_module("hyper", log::LevelFilter::Warn)
        .filter_module("hyper_util", log::LevelFilter::Warn)
        .filter_module("reqwest", log::LevelFilter::Warn)
        .init();

    let cli = HeartTrackCli::parse();

    match cli.subcommand {
        HeartTrackCommand::Run {
            api_base_url,
            api_key,
            device_id,
            tick_ms,
            first_measurement_in,
            simulate_missing_sensor,
        } => {
            let transport = HttpTransport::new(&api_base_url, &api_key, &device_id)?;
            let storage = FileStorage::open(&cli.storage_path)
                .with_context(|| format!("failed to open {}", cli.storage_path.display()))?;
            let options = ControllerOptions {
                queue_capacity: cli.queue_capacity,
                first_measurement_delay_ms: first_measurement_in.map(|seconds| seconds * 1000),
                ..ControllerOptions::default()
            };
            let sensor = SimulatedSensor::new(!simulate_missing_sensor);

            let running = Arc::new(AtomicBool::new(true));
            let flag = running.clone();
            ctrlc::set_handler(move || flag.store(false, Ordering::SeqCst))
                .context("failed to install Ctrl-C handler")?;

            tokio::task::spawn_blocking(move || {
                let controller = Controller::boot(
                    device_id,
                    options,
                    SystemClock::new(),
                    sensor,
                    transport,
                    storage,
                );
                match controller {
                    Ok(mut controller) => {
                        run_loop(&mut controller, Duration::from_millis(tick_ms), &running);
                        info!("Stopped in state {}", controller.state());
                        Ok(())
                    }
                    Err(BootError::SensorNotFound) => {
                        halt(&running);
                        Err(anyhow!(BootError::SensorNotFound))
                    }
                    Err(error) => Err(anyhow::Error::new(error).context("failed to boot controller")),
                }
            })
            .await?
        }
        HeartTrackCommand::Queue { json } => {
            let storage = FileStorage::open(&cli.storage_path)?;
            let queue = DurableQueue::load(&storage, cli.queue_capacity)?;
            let pending = queue
                .entries()
                .iter()
                .filter(|entry| entry.is_pending())
                .copied()
                .collect::<Vec<_>>();

            if json {
                println!("{}", serde_json::to_string_pretty(&pending)?);
                return Ok(());
            }

            for entry in &pending {
                println!(
                    "{}  HR {:>5.1} bpm  SpO2 {:>5.1}%",
                    iso8601(entry.taken_at),
                    entry.heart_rate,
                    entry.spo2
                );
            }
            println!(
                "{} pending of {} slots (cursor {})",
                pending.len(),
                queue.capacity(),
                queue.cursor()
            );
            Ok(())
        }
        HeartTrackCommand::Config { json } => {
            let storage = FileStorage::open(&cli.storage_path)?;
            let config = ConfigStore::load(&storage)?;
            if json {
                println!("{}", serde_json::to_string_pretty(&config)?);
            } else {
                println!("{}", config);
            }
            Ok(())
        }
        HeartTrackCommand::Dump => {
            let storage = FileStorage::open(&cli.storage_path)?;
            println!("{}", storage.path().display());

            let mut config = vec![0; ConfigRecord::LEN];
            storage.read(CONFIG_REGION_OFFSET, &mut config)?;
            println!("config @ {:#06x}", CONFIG_REGION_OFFSET);
            print_hex(CONFIG_REGION_OFFSET, &config);

            let mut queue = vec![0; QueueImage::region_len(cli.queue_capacity)];
            storage.read(QUEUE_REGION_OFFSET, &mut queue)?;
            println!("queue @ {:#06x}", QUEUE_REGION_OFFSET);
            print_hex(QUEUE_REGION_OFFSET, &queue);
            Ok(())
        }
        HeartTrackCommand::Completions { shell } => {
            let shell = shell.unwrap_or_else(|| {
                clap_complete::Shell::from_env().unwrap_or(clap_complete::Shell::Bash)
            });
            let mut command = HeartTrackCli::command();
            let name = command.get_name().to_string();
            clap_complete::generate(shell, &mut command, name, &mut std::io::stdout());
            Ok(())
        }
    }
}

fn run_loop<C, A, T, S>(controller: &mut Controller<C, A, T, S>, tick: Duration, running: &AtomicBool)
where
    C: hearttrack_device::Clock,
    A: hearttrack_device::Acquisition,
    T: hearttrack_device::Transport,
    S: Storage,
{
    show(controller.status_pattern());
    while running.load(Ordering::SeqCst) {
        controller.tick();
        for event in controller.take_events() {
            report(&event);
        }
        thread::sleep(tick);
    }
}

/// Shows the fault pattern until interrupted.
fn halt(running: &AtomicBool) {
    error!("Heart rate sensor not found, device halted");
    show(StatusPattern::BlinkRed);
    while running.load(Ordering::SeqCst) {
        thread::sleep(Duration::from_millis(250));
    }
}

fn show(pattern: StatusPattern) {
    info!(target: "status", "{}", pattern);
}

fn report(event: &DeviceEvent) {
    match event {
        DeviceEvent::UserTimeout => warn!("No finger detected, measurement skipped"),
        DeviceEvent::ConfigApplied(config) => {
            debug!("Schedule now every {} s", config.interval_ms / 1000)
        }
        _ => trace!("{:?}", event),
    }
    if let Some(pattern) = event.pattern() {
        show(pattern);
    }
}

fn print_hex(base: usize, bytes: &[u8]) {
    for (row, chunk) in bytes.chunks(16).enumerate() {
        println!("{:06x}  {}", base + row * 16, hex::encode(chunk));
    }
}
