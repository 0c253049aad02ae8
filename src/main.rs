mod config;
mod controller;
mod error;
mod ingest;
mod recorder;
mod replay;
mod ring_buffer;
mod session;
mod telemetry;

use config::Config;
use controller::{SessionController, SessionEvent, SessionState};
use crossbeam_channel::unbounded;
use ingest::{spawn_reader, IngestUpdate};
use ring_buffer::Axis;
use std::error::Error;
use std::io::{self, BufReader};
use std::path::PathBuf;
use std::time::Duration;
use telemetry::TelemetryMessage;

// Consumer refresh rate, same as a 60 Hz UI tick
const POLL_INTERVAL: Duration = Duration::from_millis(16);

const USAGE: &str = "usage: shoepad-telemetry <ingest | record | replay <file>>";

enum Command {
    Ingest,
    Record,
    Replay(PathBuf),
}

fn parse_args() -> Option<Command> {
    let mut args = std::env::args().skip(1);
    let command = match args.next()?.as_str() {
        "ingest" => Command::Ingest,
        "record" => Command::Record,
        "replay" => Command::Replay(PathBuf::from(args.next()?)),
        _ => return None,
    };
    args.next().is_none().then_some(command)
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let Some(command) = parse_args() else {
        eprintln!("{}", USAGE);
        std::process::exit(2);
    };

    let config = Config::load().unwrap_or_else(|e| {
        log::warn!("{}; using defaults", e);
        Config::default()
    });
    let mut controller = SessionController::new(&config);

    let result = match command {
        Command::Ingest => run_live(&mut controller, false),
        Command::Record => run_live(&mut controller, true),
        Command::Replay(path) => run_replay(&mut controller, path),
    };

    if let Err(e) = result {
        log::error!("{}", e);
        std::process::exit(1);
    }
}

/// Feed stdin through the controller until it closes, optionally recording it
fn run_live(controller: &mut SessionController, record: bool) -> Result<(), Box<dyn Error>> {
    let (sender, receiver) = unbounded::<IngestUpdate>();
    let reader = spawn_reader(BufReader::new(io::stdin()), sender)?;

    if record {
        controller.start_recording()?;
    }

    for update in receiver.iter() {
        match update {
            IngestUpdate::Message(TelemetryMessage::Data { key, tuple }) => {
                controller.on_sample(&key, tuple);
            }
            IngestUpdate::Message(TelemetryMessage::Status { device, online }) => {
                log::info!("Device {} is {}", device, if online { "online" } else { "offline" });
            }
            IngestUpdate::Message(TelemetryMessage::CalibrationEnd { device, sensor }) => {
                log::info!("Calibration finished for {}", telemetry::device_key(&device, &sensor));
            }
            IngestUpdate::Closed => break,
        }
    }

    if reader.join().is_err() {
        log::error!("Ingest thread panicked");
    }

    if controller.state() == SessionState::Recording {
        let path = controller.stop_recording()?;
        println!("{}", path.display());
    }
    log_device_summary(controller);
    Ok(())
}

/// Replay a recording, printing each released sample as `key ts T X Y Z`
fn run_replay(controller: &mut SessionController, path: PathBuf) -> Result<(), Box<dyn Error>> {
    controller.start_replaying(&path)?;

    let ticker = crossbeam_channel::tick(POLL_INTERVAL);
    let mut finished = false;
    while !finished {
        ticker.recv()?;
        for event in controller.poll_events() {
            match event {
                SessionEvent::PlaybackSample { key, tuple, .. } => {
                    println!(
                        "{} {} {} {} {} {}",
                        key, tuple.timestamp, tuple.t, tuple.x, tuple.y, tuple.z
                    );
                }
                SessionEvent::ReplayFinished { .. } => finished = true,
                _ => {}
            }
        }
    }

    if controller.state() == SessionState::Replaying {
        controller.stop_replaying()?;
    }
    log_device_summary(controller);
    Ok(())
}

fn log_device_summary(controller: &SessionController) {
    for key in controller.device_keys() {
        let Some(buffer) = controller.buffer(key) else {
            continue;
        };
        let ring = buffer.read();
        let ranges: Vec<String> = Axis::all()
            .iter()
            .filter_map(|&axis| ring.value_range(axis).map(|(lo, hi)| format!("{:?} {}..{}", axis, lo, hi)))
            .collect();
        log::info!(
            "{}: {}/{} samples, time {:?}, {}",
            key,
            ring.size(),
            ring.capacity(),
            ring.time_range(),
            ranges.join(", ")
        );
    }
}
