//! CLI entry point: argument parsing, config load, scheduler drive loop,
//! exit codes (0 normal end-of-trace, 1 deadlock, 2 configuration error).
//!
//! Grounded on the teacher's binary entry points and `clap::Parser` usage
//! elsewhere in the pack.

use clap::Parser;
use hmsim::config::SimConfig;
use hmsim::dram::FixedLatencyDram;
use hmsim::error::{exit_code, SimError};
use hmsim::operable::{Operable, Scheduler};
use hmsim::remap::RemappingEngine;
use hmsim::router::MemoryRouter;
use hmsim::trace::TraceReader;
use log::{error, info};
use std::process::ExitCode;

#[derive(Parser, Debug)]
#[command(name = "simulate", about = "Cache + hybrid-memory hierarchy simulator")]
struct Args {
    /// Path to a JSON configuration file.
    #[arg(long)]
    config: String,

    /// Override the trace path from the configuration file.
    #[arg(long)]
    trace: Option<String>,

    /// Number of warmup cycles before entering the region of interest.
    #[arg(long, default_value_t = 0)]
    warmup_cycles: u64,

    /// Total cycles to simulate (0 = run until the trace is exhausted).
    #[arg(long, default_value_t = 0)]
    max_cycles: u64,
}

fn run(args: Args) -> Result<(), (i32, String)> {
    let config_text = std::fs::read_to_string(&args.config)
        .map_err(|e| (exit_code::CONFIG_ERROR, format!("reading config: {e}")))?;
    let mut config = SimConfig::load_from_str(&config_text)
        .map_err(|e| (exit_code::CONFIG_ERROR, e.to_string()))?;
    if let Some(trace) = args.trace {
        config.trace_path = trace;
    }
    config
        .validate()
        .map_err(|e| (exit_code::CONFIG_ERROR, e.to_string()))?;

    let mut trace = TraceReader::open(&config.trace_path)
        .map_err(|e| (exit_code::CONFIG_ERROR, format!("opening trace: {e}")))?;

    let prefetcher = hmsim::prefetcher::PrefetcherShim::new(
        vec![Box::new(hmsim::prefetcher::no::No)],
        config.cache.is_data_cache,
    );
    let replacement = hmsim::replacement::ReplacementShim::new(vec![Box::new(
        hmsim::replacement::lru::Lru::new(config.cache.sets, config.cache.ways),
    )]);
    let mut cache = hmsim::cache::Cache::new("L1D", config.cache.clone(), prefetcher, replacement);

    let remap = RemappingEngine::new(
        config.remapping.hotness_threshold,
        config.remapping.total_capacity,
        config.remapping.fast_memory_capacity,
        config.remapping.remapping_request_queue_length,
        config.remapping.queue_busy_degree_threshold,
        config.remapping.decay_driver,
        config.remapping.interval_for_decrement,
    );
    let near = FixedLatencyDram::new(config.dram_near.fixed_latency, config.dram_near.queue_capacity);
    let far = FixedLatencyDram::new(config.dram_far.fixed_latency, config.dram_far.queue_capacity);
    let mut router = MemoryRouter::new(Box::new(near), Box::new(far), remap);

    let mut scheduler = Scheduler::new();
    scheduler.begin_phase(&mut [&mut cache]);

    let mut instr_id = 0u64;
    let mut exhausted = false;
    loop {
        if args.max_cycles != 0 && scheduler.now() >= args.max_cycles {
            break;
        }
        if !exhausted {
            if let Some(entry) = trace.next_entry() {
                let request = hmsim::mem_fetch::Request {
                    address: entry.address,
                    v_address: entry.address,
                    data: Vec::new(),
                    ip: 0,
                    instr_id,
                    pf_metadata: 0,
                    cpu: 0,
                    r#type: entry.op.as_access_type(),
                    prefetch_from_this: false,
                    skip_fill: false,
                    is_translated: true,
                    asid: [0, 0],
                    event_cycle: 0,
                    instr_depend_on_me: Vec::new(),
                    to_return: vec![0],
                };
                instr_id += 1;
                match entry.op {
                    hmsim::trace::TraceOp::Write => {
                        cache.add_wq(request);
                    }
                    hmsim::trace::TraceOp::Prefetch => {
                        cache.add_pq(request);
                    }
                    hmsim::trace::TraceOp::Read => {
                        cache.add_rq(request);
                    }
                }
            } else {
                exhausted = true;
            }
        }

        let step_result = scheduler.step(&mut [&mut cache]);
        let now = scheduler.now();

        // Ferry misses the cache forwarded this cycle down to the memory
        // router, advance it, then hand completions back via the public
        // `finish_packet` contract. Kept as explicit glue in the driver
        // (rather than folding the router into the scheduler's component
        // list) so this ordering — cache forwards, router resolves, cache
        // is notified — stays visible at the call site.
        let forwarded = cache.drain_lower_requests();
        router.route(forwarded, now);
        router.tick(now);
        for response in router.drain_completions() {
            cache.finish_packet(&response, now);
        }

        match step_result {
            Ok(work) => {
                if exhausted && work == 0 {
                    break;
                }
            }
            Err(SimError::Deadlock { .. }) => {
                return Err((exit_code::DEADLOCK, "deadlock detected".to_string()));
            }
            Err(e) => {
                return Err((exit_code::CONFIG_ERROR, e.to_string()));
            }
        }
    }

    scheduler.end_phase(&mut [&mut cache]);

    let mut stats_writer = hmsim::stats::StatisticsWriter::new(&config.stats_path);
    {
        let stats = stats_writer.stats_mut();
        stats.remapping_request_queue_congestion = router.remap().congestion_count();
        stats.read_request_in_memory = router.read_request_in_memory();
        stats.write_request_in_memory = router.write_request_in_memory();
        stats.swapping_count = router.swapping_count();
        stats.swapping_traffic_in_bytes = router.swapping_traffic_in_bytes();
    }
    let name = cache.name().to_string();
    stats_writer
        .stats_mut()
        .sim_cache_stats
        .insert(name.clone(), std::mem::take(&mut cache.sim_stats));
    stats_writer
        .stats_mut()
        .roi_cache_stats
        .insert(name, std::mem::take(&mut cache.roi_stats));
    stats_writer
        .finish()
        .map_err(|e| (exit_code::CONFIG_ERROR, format!("writing stats: {e}")))?;

    info!("simulation complete at cycle {}", scheduler.now());
    Ok(())
}

fn main() -> ExitCode {
    env_logger::init();
    let args = Args::parse();
    match run(args) {
        Ok(()) => ExitCode::from(exit_code::NORMAL as u8),
        Err((code, message)) => {
            error!("{message}");
            ExitCode::from(code as u8)
        }
    }
}
