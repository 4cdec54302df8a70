//! Statistics file writer: an explicit object owned by the simulator root
//! (not a process-wide singleton), finalized deterministically on
//! teardown.
//!
//! Grounded on the teacher's `ported/stats.rs` (converted away from its
//! `lazy_static!` global, per the specification's explicit design note)
//! and the mandatory + supplemented key set from
//! `examples/original_source/source/ProjectConfiguration.cc`'s
//! `SIMULATOR_STATISTICS`.

use serde::Serialize;
use std::collections::HashMap;
use std::io::Write;

#[derive(Debug, Default, Serialize)]
pub struct CacheStats {
    pub hits: HashMap<String, u64>,
    pub misses: HashMap<String, u64>,
    pub pf_requested: u64,
    pub pf_issued: u64,
    pub pf_useful: u64,
    pub pf_useless: u64,
    pub pf_fill: u64,
    pub total_miss_latency: u64,
    pub miss_count_for_latency: u64,
}

impl CacheStats {
    pub fn record_hit(&mut self, access_type: &str) {
        *self.hits.entry(access_type.to_string()).or_insert(0) += 1;
    }

    pub fn record_miss(&mut self, access_type: &str) {
        *self.misses.entry(access_type.to_string()).or_insert(0) += 1;
    }

    pub fn avg_miss_latency(&self) -> f64 {
        if self.miss_count_for_latency == 0 {
            0.0
        } else {
            self.total_miss_latency as f64 / self.miss_count_for_latency as f64
        }
    }
}

/// Mandatory run-end statistics, per the external interface contract
/// (§6), plus the memory-controller counters the original tracks in
/// `SIMULATOR_STATISTICS`.
#[derive(Debug, Default, Serialize)]
pub struct SimulatorStatistics {
    pub valid_pte_count: Vec<u64>,
    pub virtual_page_count: u64,
    pub read_request_in_memory: [u64; 2],
    pub write_request_in_memory: [u64; 2],
    pub swapping_count: u64,
    pub swapping_traffic_in_bytes: u64,
    pub remapping_request_queue_congestion: u64,

    pub sim_cache_stats: HashMap<String, CacheStats>,
    pub roi_cache_stats: HashMap<String, CacheStats>,
}

/// Owns the statistics file handle and finalizes it when dropped or when
/// `finish` is called explicitly. No global state: one instance per
/// simulator run, passed into components by reference.
pub struct StatisticsWriter {
    path: String,
    stats: SimulatorStatistics,
}

impl StatisticsWriter {
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            stats: SimulatorStatistics::default(),
        }
    }

    pub fn stats_mut(&mut self) -> &mut SimulatorStatistics {
        &mut self.stats
    }

    pub fn stats(&self) -> &SimulatorStatistics {
        &self.stats
    }

    /// Writes the free-form key/value statistics file and consumes the
    /// writer, guaranteeing a single deterministic teardown point.
    pub fn finish(self) -> std::io::Result<()> {
        let mut file = std::fs::File::create(&self.path)?;
        writeln!(file, "valid_pte_count={:?}", self.stats.valid_pte_count)?;
        writeln!(file, "virtual_page_count={}", self.stats.virtual_page_count)?;
        writeln!(
            file,
            "read_request_in_memory={:?}",
            self.stats.read_request_in_memory
        )?;
        writeln!(
            file,
            "write_request_in_memory={:?}",
            self.stats.write_request_in_memory
        )?;
        writeln!(file, "swapping_count={}", self.stats.swapping_count)?;
        writeln!(
            file,
            "swapping_traffic_in_bytes={}",
            self.stats.swapping_traffic_in_bytes
        )?;
        writeln!(
            file,
            "remapping_request_queue_congestion={}",
            self.stats.remapping_request_queue_congestion
        )?;
        let json = serde_json::to_string_pretty(&self.stats.sim_cache_stats)
            .unwrap_or_default();
        writeln!(file, "sim_cache_stats={json}")?;
        let json = serde_json::to_string_pretty(&self.stats.roi_cache_stats)
            .unwrap_or_default();
        writeln!(file, "roi_cache_stats={json}")?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn avg_miss_latency_handles_zero_misses() {
        let stats = CacheStats::default();
        assert_eq!(stats.avg_miss_latency(), 0.0);
    }

    #[test]
    fn records_hits_and_misses_per_access_type() {
        let mut stats = CacheStats::default();
        stats.record_hit("load");
        stats.record_hit("load");
        stats.record_miss("load");
        assert_eq!(stats.hits["load"], 2);
        assert_eq!(stats.misses["load"], 1);
    }
}
