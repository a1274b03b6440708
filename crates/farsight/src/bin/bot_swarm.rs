//! # Bot Swarm
//!
//! Headless stress run for the snapshot cache: one simulated world, one
//! refresh thread, and a pool of worker threads each driving a slice of the
//! actors through [`BotBrain`]. Prints decision latency and staleness as it
//! goes, then a summary.
//!
//! ## Configuration (flags / env)
//!
//! | Flag               | Env                      | Default | Description                     |
//! |--------------------|--------------------------|---------|---------------------------------|
//! | `--config`         | `FARSIGHT_CONFIG`        | none    | Cache TOML (defaults if absent) |
//! | `--maps`           | `FARSIGHT_MAPS`          | `4`     | Simulated maps                  |
//! | `--actors-per-map` | `FARSIGHT_ACTORS`        | `2000`  | Actors per map                  |
//! | `--workers`        | `FARSIGHT_WORKERS`       | `4`     | Worker threads                  |
//! | `--bots`           | `FARSIGHT_BOTS`          | `500`   | Bots driven (across workers)    |
//! | `--duration-secs`  | `FARSIGHT_DURATION_SECS` | `10`    | Run length                      |
//! | `--sim-hz`         | `FARSIGHT_SIM_HZ`        | `20`    | World step rate                 |
//! | `--seed`           | `FARSIGHT_SEED`          | `42`    | World seed                      |

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use clap::Parser;
use crossbeam_channel::{unbounded, Receiver, Sender};
use farsight::{BotAction, BotBrain, SimWorld, WorldConfig};
use farsight_core::{CacheConfig, DoubleBufferedSnapshots, QueryService, RefreshLoop, TickOutcome, UpdateScheduler};

// ---------------------------------------------------------------------------
// CLI
// ---------------------------------------------------------------------------

#[derive(Parser, Debug)]
#[command(name = "bot_swarm", about = "FARSIGHT snapshot cache stress run", version)]
struct Args {
    /// Cache configuration file
    #[arg(long, env = "FARSIGHT_CONFIG")]
    config: Option<PathBuf>,

    /// Simulated maps
    #[arg(long, env = "FARSIGHT_MAPS", default_value_t = 4)]
    maps: u32,

    /// Actors per map
    #[arg(long, env = "FARSIGHT_ACTORS", default_value_t = 2_000)]
    actors_per_map: u32,

    /// Worker threads
    #[arg(long, env = "FARSIGHT_WORKERS", default_value_t = 4)]
    workers: usize,

    /// Bots driven, split across workers
    #[arg(long, env = "FARSIGHT_BOTS", default_value_t = 500)]
    bots: usize,

    /// Run length in seconds
    #[arg(long, env = "FARSIGHT_DURATION_SECS", default_value_t = 10)]
    duration_secs: u64,

    /// World step rate (Hz)
    #[arg(long, env = "FARSIGHT_SIM_HZ", default_value_t = 20)]
    sim_hz: u32,

    /// World seed
    #[arg(long, env = "FARSIGHT_SEED", default_value_t = 42)]
    seed: u64,
}

// ---------------------------------------------------------------------------
// Worker reports
// ---------------------------------------------------------------------------

/// What one worker saw since its last report.
#[derive(Clone, Copy, Debug, Default)]
struct WorkerReport {
    decisions: u64,
    absent: u64,
    attacks: u64,
    flees: u64,
    escapes: u64,
    loots: u64,
    total_latency_us: u64,
    max_latency_us: u64,
    max_staleness_ms: u64,
}

impl WorkerReport {
    fn record(&mut self, action: BotAction, latency: Duration) {
        self.decisions += 1;
        match action {
            BotAction::Absent => self.absent += 1,
            BotAction::Attack { .. } => self.attacks += 1,
            BotAction::Flee { .. } => self.flees += 1,
            BotAction::Escape { .. } => self.escapes += 1,
            BotAction::Loot { .. } => self.loots += 1,
            BotAction::Wander => {}
        }
        let us = u64::try_from(latency.as_micros()).unwrap_or(u64::MAX);
        self.total_latency_us += us;
        self.max_latency_us = self.max_latency_us.max(us);
    }

    fn merge(&mut self, other: &Self) {
        self.decisions += other.decisions;
        self.absent += other.absent;
        self.attacks += other.attacks;
        self.flees += other.flees;
        self.escapes += other.escapes;
        self.loots += other.loots;
        self.total_latency_us += other.total_latency_us;
        self.max_latency_us = self.max_latency_us.max(other.max_latency_us);
        self.max_staleness_ms = self.max_staleness_ms.max(other.max_staleness_ms);
    }

    fn avg_latency_us(&self) -> u64 {
        self.total_latency_us / self.decisions.max(1)
    }
}

const REPORT_INTERVAL: Duration = Duration::from_secs(1);

fn run_worker(brains: &[BotBrain], queries: &QueryService, stop: &AtomicBool, reports: &Sender<WorkerReport>) {
    let mut report = WorkerReport::default();
    let mut last_report = Instant::now();

    while !stop.load(Ordering::Acquire) {
        for brain in brains {
            let start = Instant::now();
            let decision = brain.decide(queries);
            report.record(decision.action, start.elapsed());
        }
        if let Some(stale) = queries.staleness(Instant::now()) {
            let ms = u64::try_from(stale.as_millis()).unwrap_or(u64::MAX);
            report.max_staleness_ms = report.max_staleness_ms.max(ms);
        }

        if last_report.elapsed() >= REPORT_INTERVAL {
            if reports.send(report).is_err() {
                return;
            }
            report = WorkerReport::default();
            last_report = Instant::now();
        }
        thread::sleep(Duration::from_millis(5));
    }
    let _ = reports.send(report);
}

fn run_refresh(scheduler: &UpdateScheduler<SimWorld>, stop: &AtomicBool) {
    let mut refresh = RefreshLoop::new(scheduler.refresh_interval());

    while !stop.load(Ordering::Acquire) {
        if refresh.should_refresh() {
            let start = refresh.begin();
            if let TickOutcome::Failed(err) = scheduler.tick(start) {
                tracing::error!("Refresh failed: {}", err);
            }
            refresh.end(start);
        }
        refresh.wait_for_next();
    }

    let stats = refresh.stats();
    tracing::info!(
        "Refresh loop: {} refreshes, avg {} us, max {} us, {} late, {} intervals missed",
        stats.total_refreshes,
        stats.avg_refresh_us,
        stats.max_refresh_us,
        stats.late_refreshes,
        stats.missed_intervals,
    );
}

/// Raises the stop flag when dropped, so an early return from the scoped
/// section still lets every spawned thread exit.
struct StopOnDrop<'a>(&'a AtomicBool);

impl Drop for StopOnDrop<'_> {
    fn drop(&mut self) {
        self.0.store(true, Ordering::Release);
    }
}

fn drain(reports: &Receiver<WorkerReport>, into: &mut WorkerReport) -> WorkerReport {
    let mut window = WorkerReport::default();
    for report in reports.try_iter() {
        window.merge(&report);
    }
    into.merge(&window);
    window
}

// ---------------------------------------------------------------------------
// Entry point
// ---------------------------------------------------------------------------

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("bot_swarm=info".parse()?)
                .add_directive("farsight_core=info".parse()?),
        )
        .init();

    let args = Args::parse();

    let config = match &args.config {
        Some(path) => CacheConfig::load(path).with_context(|| format!("loading {}", path.display()))?,
        None => CacheConfig::default(),
    };

    tracing::info!(
        "Starting bot_swarm (maps={}, actors/map={}, workers={}, bots={}, refresh={:?}, cell={})",
        args.maps,
        args.actors_per_map,
        args.workers,
        args.bots,
        config.refresh_interval(),
        config.cell_size,
    );

    let world = Arc::new(SimWorld::new(WorldConfig {
        maps: args.maps,
        actors_per_map: args.actors_per_map,
        seed: args.seed,
        ..WorldConfig::default()
    }));

    let buffers = DoubleBufferedSnapshots::from_config(&config).context("invalid cache configuration")?;
    let queries = QueryService::new(Arc::clone(&buffers), &config);
    let scheduler = UpdateScheduler::new(buffers, Arc::clone(&world), config);

    // Workers start against a populated cache.
    if let TickOutcome::Failed(err) = scheduler.tick(Instant::now()) {
        return Err(err).context("initial snapshot build");
    }

    let brains: Vec<BotBrain> = world
        .actor_ids()
        .into_iter()
        .take(args.bots)
        .map(|(map, id)| BotBrain::new(id, map))
        .collect();
    let per_worker = brains.len().div_ceil(args.workers.max(1)).max(1);

    let stop = AtomicBool::new(false);
    let (report_tx, report_rx) = unbounded();
    let mut total = WorkerReport::default();

    let sim_step = Duration::from_secs_f64(1.0 / f64::from(args.sim_hz.max(1)));
    let deadline = Instant::now() + Duration::from_secs(args.duration_secs);
    let started = Instant::now();

    thread::scope(|s| -> Result<()> {
        let stop_guard = StopOnDrop(&stop);
        let refresh = thread::Builder::new()
            .name("farsight-refresh".into())
            .spawn_scoped(s, || run_refresh(&scheduler, &stop))
            .context("spawning refresh thread")?;

        for (n, chunk) in brains.chunks(per_worker).enumerate() {
            let queries = queries.clone();
            let reports = report_tx.clone();
            let stop = &stop;
            thread::Builder::new()
                .name(format!("farsight-worker-{n}"))
                .spawn_scoped(s, move || run_worker(chunk, &queries, stop, &reports))
                .context("spawning worker thread")?;
        }

        let mut last_report = Instant::now();
        while Instant::now() < deadline {
            let step_start = Instant::now();
            let step = world.step(sim_step.as_secs_f32());
            if step.deaths > 0 || step.zones_spawned > 0 {
                tracing::trace!("World step: {:?}", step);
            }

            if last_report.elapsed() >= REPORT_INTERVAL {
                let window = drain(&report_rx, &mut total);
                tracing::info!(
                    "{:?}: {} decisions, avg {} us, max {} us, staleness <= {} ms",
                    queries.generation(),
                    window.decisions,
                    window.avg_latency_us(),
                    window.max_latency_us,
                    window.max_staleness_ms,
                );
                last_report = Instant::now();
            }

            if let Some(rest) = sim_step.checked_sub(step_start.elapsed()) {
                thread::sleep(rest);
            }
        }

        drop(stop_guard);
        if refresh.join().is_err() {
            anyhow::bail!("refresh thread panicked");
        }
        Ok(())
    })?;

    // Scoped workers have all exited; pick up their final reports.
    drop(report_tx);
    let _ = drain(&report_rx, &mut total);

    let stats = scheduler.stats();
    let elapsed = started.elapsed().as_secs_f64();
    tracing::info!("Run finished in {:.2} s", elapsed);
    tracing::info!(
        "Cache: {} published, {} failed, {} skipped, last build {} us (max {} us), {} entities",
        stats.builds_published,
        stats.builds_failed,
        stats.ticks_skipped,
        stats.last_build_micros,
        stats.max_build_micros,
        stats.last_entity_count,
    );
    tracing::info!(
        "Workers: {} decisions ({:.0}/s), avg {} us, max {} us, max staleness {} ms",
        total.decisions,
        total.decisions as f64 / elapsed.max(f64::EPSILON),
        total.avg_latency_us(),
        total.max_latency_us,
        total.max_staleness_ms,
    );
    tracing::info!(
        "Actions: {} attack, {} flee, {} escape, {} loot, {} absent",
        total.attacks,
        total.flees,
        total.escapes,
        total.loots,
        total.absent,
    );

    Ok(())
}
