// stats.rs
//
// Timing/counter accumulators, pervasive instrumentation per spec §2
// component I. Plain owned structs updated by the query engine as it
// works — per spec §9, "the core has [no global mutable state] worth
// preserving; per-query caches and stats are owned by the engine
// instance."

use std::time::Duration;

/// Byte/time counters for region reads against an `IndexPartitionIo`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IoStats {
    pub region_reads: u64,
    pub bytes_read: u64,
}

impl IoStats {
    pub fn record_read(&mut self, bytes: u64) {
        self.region_reads += 1;
        self.bytes_read += bytes;
    }

    pub fn merge(&mut self, other: &IoStats) {
        self.region_reads += other.region_reads;
        self.bytes_read += other.bytes_read;
    }
}

/// Stats for evaluating one `ConstraintTerm` at one partition: which plan
/// alternatives were costed, which one won, and the I/O actually spent
/// materializing it.
#[derive(Debug, Clone, Default)]
pub struct ConstraintTermEvalStats {
    pub varname: String,
    /// Cost of every alternative `compute_optimal_region_math_for_bin_range`
    /// considered, in the order generated (primary first).
    pub candidate_costs: Vec<u64>,
    pub chose_complement: bool,
    pub io: IoStats,
    pub short_circuited: bool,
}

/// Stats accumulated while evaluating one partition's worth of a `Query`:
/// one `ConstraintTermEvalStats` per constraint term plus the I/O spent
/// combining per-constraint results with the outer query operators.
#[derive(Debug, Clone, Default)]
pub struct PartitionEvalStats {
    pub partition_id: u32,
    pub constraints: Vec<ConstraintTermEvalStats>,
    pub combine_io: IoStats,
    pub elapsed: Duration,
}

impl PartitionEvalStats {
    pub fn total_io(&self) -> IoStats {
        let mut total = self.combine_io;
        for c in &self.constraints {
            total.merge(&c.io);
        }
        total
    }
}

/// Running totals across every partition a `QueryCursor` has visited so
/// far, exposed via `QueryCursor::stats()`.
#[derive(Debug, Clone, Default)]
pub struct QuerySummaryStats {
    pub partitions_visited: u64,
    pub partitions_skipped_arithmetic_error: u64,
    pub io: IoStats,
    pub elapsed: Duration,
}

impl QuerySummaryStats {
    pub fn record_partition(&mut self, partition: &PartitionEvalStats) {
        self.partitions_visited += 1;
        self.io.merge(&partition.total_io());
        self.elapsed += partition.elapsed;
    }

    pub fn record_skip(&mut self) {
        self.partitions_skipped_arithmetic_error += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_total_io_merges_constraints_and_combine() {
        let mut stats = PartitionEvalStats {
            partition_id: 0,
            ..Default::default()
        };
        let mut c1 = ConstraintTermEvalStats {
            varname: "temp".into(),
            ..Default::default()
        };
        c1.io.record_read(100);
        let mut c2 = ConstraintTermEvalStats {
            varname: "pressure".into(),
            ..Default::default()
        };
        c2.io.record_read(50);
        stats.constraints.push(c1);
        stats.constraints.push(c2);
        stats.combine_io.record_read(10);

        let total = stats.total_io();
        assert_eq!(total.region_reads, 3);
        assert_eq!(total.bytes_read, 160);
    }

    #[test]
    fn test_summary_accumulates_across_partitions() {
        let mut summary = QuerySummaryStats::default();
        let mut p0 = PartitionEvalStats {
            partition_id: 0,
            ..Default::default()
        };
        p0.combine_io.record_read(20);
        summary.record_partition(&p0);
        summary.record_skip();
        assert_eq!(summary.partitions_visited, 1);
        assert_eq!(summary.partitions_skipped_arithmetic_error, 1);
        assert_eq!(summary.io.bytes_read, 20);
    }
}
