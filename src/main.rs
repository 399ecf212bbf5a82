use std::error::Error;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{mpsc, Arc};
use std::thread;
use std::time::{Duration, Instant};

use colored::Colorize;

use rain_impulse_engine::config::{load_config, save_config};
use rain_impulse_engine::sim::feed_with_watchdog;
use rain_impulse_engine::sim::generator::{GeneratorConfig, RainSignalGenerator};
use rain_impulse_engine::sim::replay;
use rain_impulse_engine::utils::wait::wait_until;
use rain_impulse_engine::{DetectionEngine, EngineConfig};

fn main() {
    env_logger::init();

    let args: Vec<String> = std::env::args().collect();
    if args.len() > 1 {
        match args[1].as_str() {
            "sim" => run_sim().unwrap(),
            "replay" => run_replay(&args[2..]).unwrap(),
            "config" => write_default_config(&args[2..]).unwrap(),
            _ => println!(
                "Invalid argument, please use 'sim', 'replay <file> [config.yaml]' or 'config [path]'"
            ),
        }
    } else {
        println!("Please specify 'sim', 'replay <file> [config.yaml]' or 'config [path]' as argument");
    }
}

// LIVE SYNTHETIC MONITOR ------------------------------------------------------

fn run_sim() -> Result<(), Box<dyn Error>> {
    let config = EngineConfig::default();
    let batch_size = config.sampling.batch_size.max(1);
    let sample_interval_us = config.sampling.sample_interval_us;
    let samples_per_tick =
        ((config.aggregator.tick_ms as f32 * 1000.0 / sample_interval_us) as usize).max(1);

    let mut engine = DetectionEngine::new(config);

    let feed_alive = Arc::new(AtomicBool::new(false));
    let feed_flag = Arc::clone(&feed_alive);
    let (tx, rx) = mpsc::sync_channel::<Vec<u16>>(8);

    thread::spawn(move || {
        let mut generator = RainSignalGenerator::new(GeneratorConfig::default(), rand::random());
        let batch_period = Duration::from_micros((sample_interval_us as u64) * batch_size as u64);
        feed_flag.store(true, Ordering::SeqCst);
        loop {
            if tx.send(generator.next_batch(batch_size)).is_err() {
                break;
            }
            thread::sleep(batch_period);
        }
    });

    // feed handshake before entering the consumer loop
    wait_until(|| feed_alive.load(Ordering::SeqCst), Duration::from_secs(1))?;

    let mut since_tick = 0usize;
    let mut last_report = Instant::now();

    for batch in rx.iter() {
        feed_with_watchdog(&mut engine, &batch);
        since_tick += batch.len();
        while since_tick >= samples_per_tick {
            engine.tick();
            since_tick -= samples_per_tick;
        }

        if last_report.elapsed() >= Duration::from_millis(200) {
            last_report = Instant::now();
            print_status(&engine);
        }
    }

    Ok(())
}

fn print_status(engine: &DetectionEngine) {
    let fields = engine.display_fields();
    let stats = engine.stats();
    let live = engine.recent_waveform(1).first().copied().unwrap_or(0);

    let health = if engine.is_system_normal() {
        "  OK  ".green()
    } else {
        " STALL".red()
    };
    let bar_len = (fields.peak_code as usize / 60).min(60);
    let bar = "|".repeat(bar_len);

    println!(
        "{} live {:>4}  peak {:>4} ({:.2} V)  rain {:>6.2} mm  {:>6.2} mm/h  drops {:>4}  thr {:>4}  {}",
        health,
        live,
        fields.peak_code,
        fields.peak_voltage,
        fields.total_rain_mm,
        fields.intensity_mmh,
        stats.events_accepted,
        engine.threshold(),
        bar.cyan(),
    );
}

fn write_default_config(args: &[String]) -> Result<(), Box<dyn Error>> {
    let path = args.first().map(String::as_str).unwrap_or("engine.yaml");
    save_config(&EngineConfig::default(), path)?;
    println!("wrote default configuration to {path}");
    Ok(())
}

// TRACE REPLAY ----------------------------------------------------------------

fn run_replay(args: &[String]) -> Result<(), Box<dyn Error>> {
    let Some(path) = args.first() else {
        println!("replay needs a CSV trace file");
        return Ok(());
    };
    let config = match args.get(1) {
        Some(config_path) => load_config(config_path)?,
        None => EngineConfig::default(),
    };

    let summary = replay::run(path, config)?;

    println!("samples     {}", summary.samples);
    println!(
        "drops       {} ({} accepted, {} rejected)",
        summary.drop_count.to_string().green(),
        summary.stats.events_accepted,
        summary.stats.events_rejected
    );
    println!(
        "captures    {} ({} discarded, {} swallowed triggers)",
        summary.stats.snapshots_captured,
        summary.stats.snapshots_discarded,
        summary.stats.triggers_swallowed
    );
    println!("rain        {:.2} mm", summary.total_rain_mm);
    println!("intensity   {:.2} mm/h", summary.intensity_mmh);
    println!("threshold   {}", summary.final_threshold);
    if let Some(snapshot) = summary.snapshot_path {
        println!("snapshot    {}", snapshot);
    }
    Ok(())
}
