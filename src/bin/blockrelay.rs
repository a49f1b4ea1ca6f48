use anyhow::{bail, Result};
use blockrelay::audio::{
    AudioEngine, CpalOutput, EngineCallbacks, EngineStatus, InputDevice, RunParams,
};
use blockrelay::config::{AppConfig, MAX_GAIN, MAX_SPEED, MIN_SPEED};
use blockrelay::{init_logging, init_tracing, log_debug, log_file_path, log_panic};
use std::io::{self, BufRead};
use std::process::ExitCode;
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

fn main() -> ExitCode {
    let config = match AppConfig::parse_args() {
        Ok(config) => config,
        Err(err) => {
            eprintln!("error: {err:#}");
            return ExitCode::FAILURE;
        }
    };

    init_logging(&config);
    init_tracing(&config);
    std::panic::set_hook(Box::new(|info| log_panic(info)));

    if config.list_input_devices {
        return list_devices("input", InputDevice::list_devices());
    }
    if config.list_output_devices {
        return list_devices("output", CpalOutput::list_devices());
    }

    match run(&config) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("error: {err:#}");
            ExitCode::FAILURE
        }
    }
}

fn list_devices(kind: &str, devices: Result<Vec<String>>) -> ExitCode {
    match devices {
        Ok(names) if names.is_empty() => {
            println!("No {kind} devices detected.");
            ExitCode::SUCCESS
        }
        Ok(names) => {
            println!("Detected {kind} devices:");
            for name in names {
                println!("  {name}");
            }
            ExitCode::SUCCESS
        }
        Err(err) => {
            println!("Failed to enumerate {kind} devices: {err:#}");
            ExitCode::SUCCESS
        }
    }
}

fn run(config: &AppConfig) -> Result<()> {
    let params = Arc::new(Mutex::new(config.run_params()));
    let json = config.json;

    let params_src = params.clone();
    let callbacks = EngineCallbacks {
        on_status: Arc::new(move |status: EngineStatus| {
            if json {
                match serde_json::to_string(&status) {
                    Ok(line) => println!("{line}"),
                    Err(err) => log_debug(&format!("status serialization failed: {err}")),
                }
            } else {
                match &status.message {
                    Some(message) => println!("[{}] {message}", status.state.label()),
                    None => println!("[{}]", status.state.label()),
                }
            }
        }),
        on_queue_update: Arc::new(move |len| {
            if json {
                println!("{}", serde_json::json!({ "queue_length": len }));
            }
        }),
        get_params: Arc::new(move || {
            *params_src
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner())
        }),
    };

    let engine = AudioEngine::new(config, callbacks);
    engine.start(config.block_seconds)?;

    if config.logs || config.log_timings {
        eprintln!("Debug log: {}", log_file_path().display());
    }

    match config.run_seconds {
        Some(seconds) => thread::sleep(Duration::from_secs(seconds)),
        None => command_loop(&engine, &params)?,
    }

    engine.stop();
    Ok(())
}

/// Read control commands from stdin until `stop`, a blank line, or EOF.
fn command_loop(engine: &AudioEngine, params: &Arc<Mutex<RunParams>>) -> Result<()> {
    println!("Commands: gain <x> | speed <x> | block <seconds> | status | stop (or Enter)");
    let stdin = io::stdin();
    for line in stdin.lock().lines() {
        let line = line?;
        let mut words = line.split_whitespace();
        match words.next() {
            None | Some("stop") => break,
            Some("gain") => match parse_gain(words.next()) {
                Ok(gain) => {
                    lock_params(params).gain = gain;
                    println!("gain set to {gain}");
                }
                Err(err) => eprintln!("{err:#}"),
            },
            Some("speed") => match parse_speed(words.next()) {
                Ok(speed) => {
                    lock_params(params).speed = speed;
                    println!("speed set to {speed}");
                }
                Err(err) => eprintln!("{err:#}"),
            },
            Some("block") => match parse_block_seconds(words.next()) {
                Ok(seconds) => {
                    let effective = engine.set_block_duration(seconds);
                    lock_params(params).block_seconds = effective;
                    println!("block size set to {effective}s (takes effect next block)");
                }
                Err(err) => eprintln!("{err:#}"),
            },
            Some("status") => {
                println!(
                    "state={} queue={} level={:.1}dB",
                    engine.state().label(),
                    engine.queue_len(),
                    engine.meter().level_db()
                );
            }
            Some(other) => eprintln!("unknown command: {other}"),
        }
    }
    Ok(())
}

fn lock_params(params: &Arc<Mutex<RunParams>>) -> std::sync::MutexGuard<'_, RunParams> {
    params.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn parse_gain(word: Option<&str>) -> Result<f32> {
    let Some(word) = word else {
        bail!("usage: gain <0.0-{MAX_GAIN}>");
    };
    let gain: f32 = word.parse()?;
    if !gain.is_finite() || !(0.0..=MAX_GAIN).contains(&gain) {
        bail!("gain must be between 0.0 and {MAX_GAIN}");
    }
    Ok(gain)
}

fn parse_speed(word: Option<&str>) -> Result<f32> {
    let Some(word) = word else {
        bail!("usage: speed <{MIN_SPEED}-{MAX_SPEED}>");
    };
    let speed: f32 = word.parse()?;
    if !speed.is_finite() || !(MIN_SPEED..=MAX_SPEED).contains(&speed) {
        bail!("speed must be between {MIN_SPEED} and {MAX_SPEED}");
    }
    Ok(speed)
}

fn parse_block_seconds(word: Option<&str>) -> Result<u64> {
    let Some(word) = word else {
        bail!("usage: block <seconds>");
    };
    Ok(word.parse()?)
}
