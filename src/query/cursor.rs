// query/cursor.rs
//
// Streams a `Query`'s result one partition at a time. Grounded on
// original_source/include/pique/query/simple-query-engine.hpp's
// `evaluate_constraint_at_partition`/`evaluate_query_region_math`, and on
// the error-class-driven continue/stop/skip policy this crate's error
// module documents.

use super::plan::compute_optimal_region_math_for_bin_range;
use super::{ConstraintTerm, Query, QueryTerm};
use crate::binning::BinningSpecification;
use crate::config::EngineConfig;
use crate::error::{ErrorClass, PiqueError};
use crate::index_encoding::IndexEncodingId;
use crate::io::cache::{CachedPartition, IndexIoCache};
use crate::io::PartitionExtent;
use crate::region::setops::{PreferenceListSetOperations, SetOperations};
use crate::region::{make_null_region, make_uniform_region, RegionEncoding};
use crate::region_math::{self, RegionMathTerm, RegionSource};
use crate::stats::{ConstraintTermEvalStats, PartitionEvalStats, QuerySummaryStats};
use std::rc::Rc;
use std::time::Instant;
use tracing::{debug_span, warn};

/// One partition's worth of a query's answer: the resulting region,
/// reindexed to global record IDs via `begin_rid`, plus the stats gathered
/// evaluating it.
pub struct PartitionResult {
    pub partition_id: u32,
    pub begin_rid: u64,
    pub end_rid: u64,
    pub region: RegionEncoding,
    pub stats: PartitionEvalStats,
}

struct PartitionRegionSource {
    partition: Rc<CachedPartition>,
}

impl RegionSource for PartitionRegionSource {
    fn read_region(&self, region_id: u32) -> Result<RegionEncoding, PiqueError> {
        self.partition.read_region(region_id)
    }
}

pub struct QueryCursor {
    query: Query,
    extents: Vec<PartitionExtent>,
    cache: Rc<IndexIoCache>,
    config: EngineConfig,
    ops: PreferenceListSetOperations,
    next_idx: usize,
    stopped: bool,
    partitions_since_release: u32,
    summary: QuerySummaryStats,
}

impl QueryCursor {
    pub(crate) fn new(
        query: Query,
        _variables: Vec<String>,
        mut extents: Vec<PartitionExtent>,
        cache: Rc<IndexIoCache>,
        config: EngineConfig,
    ) -> Self {
        extents.sort_by_key(|e| e.begin_rid);
        Self {
            query,
            extents,
            cache,
            config,
            ops: PreferenceListSetOperations::default_pipeline(),
            next_idx: 0,
            stopped: false,
            partitions_since_release: 0,
            summary: QuerySummaryStats::default(),
        }
    }

    pub fn stats(&self) -> &QuerySummaryStats {
        &self.summary
    }

    fn evaluate_constraint_at_partition(
        &self,
        constraint: &ConstraintTerm,
        partition_id: u32,
    ) -> Result<(RegionEncoding, ConstraintTermEvalStats), PiqueError> {
        let cached = self.cache.open_index_partition_io(&constraint.varname, partition_id)?;
        let meta = cached.partition_metadata();
        let binning_spec = BinningSpecification::from_blob(&meta.binning_spec_blob)?;
        let bin_keys = cached.bin_keys()?;
        let (lb_bin, ub_bin) = binning_spec.compute_bin_range(bin_keys, constraint.lower_bound, constraint.upper_bound)?;
        let nbins = meta.nbins;
        let domain_size = meta.domain_size;
        let region_encoding_id = meta.region_encoding_id;

        let mut cstats = ConstraintTermEvalStats {
            varname: constraint.varname.clone(),
            ..Default::default()
        };

        if lb_bin == ub_bin {
            cstats.short_circuited = true;
            return Ok((make_null_region(region_encoding_id, domain_size), cstats));
        }
        if lb_bin == 0 && ub_bin == nbins {
            cstats.short_circuited = true;
            return Ok((make_uniform_region(region_encoding_id, domain_size, true), cstats));
        }

        let index_encoding_id = IndexEncodingId::from_wire_tag(meta.index_encoding_id)?;
        let plan = compute_optimal_region_math_for_bin_range(
            index_encoding_id,
            nbins,
            lb_bin,
            ub_bin,
            self.config.complement_mode,
            &*cached,
        )?;
        cstats.candidate_costs = plan.candidate_costs.clone();
        cstats.chose_complement = plan.is_complement;

        for term in &plan.math {
            if let RegionMathTerm::RegionTerm(id) = term {
                cstats.io.record_read(cached.regions_size_in_bytes(*id, *id + 1)?);
            }
        }

        let source = PartitionRegionSource { partition: cached };
        let region = region_math::evaluate(&plan.math, &source, &self.ops)?;
        Ok((region, cstats))
    }

    fn evaluate_partition(&self, extent: &PartitionExtent) -> Result<PartitionResult, PiqueError> {
        let start = Instant::now();
        let mut partition_stats = PartitionEvalStats {
            partition_id: extent.partition_id,
            ..Default::default()
        };
        let mut stack: Vec<RegionEncoding> = Vec::new();
        for term in &self.query {
            match term {
                QueryTerm::Constraint(c) => {
                    let (region, cstats) = self.evaluate_constraint_at_partition(c, extent.partition_id)?;
                    partition_stats.constraints.push(cstats);
                    stack.push(region);
                }
                QueryTerm::UnaryNot => {
                    let top = stack
                        .pop()
                        .ok_or_else(|| PiqueError::MalformedQuery("UnaryNot: empty stack".into()))?;
                    stack.push(self.ops.inplace_unary_not(top)?);
                }
                QueryTerm::NAry(op, arity) => {
                    if stack.len() < *arity {
                        return Err(PiqueError::MalformedQuery(format!(
                            "NAry({op:?}, {arity}) needs {arity} operands, stack has {}",
                            stack.len()
                        )));
                    }
                    let operands = stack.split_off(stack.len() - arity);
                    stack.push(self.ops.inplace_nary(operands, *op)?);
                }
            }
        }
        if stack.len() != 1 {
            return Err(PiqueError::MalformedQuery(format!(
                "query left {} values on the stack, expected exactly 1",
                stack.len()
            )));
        }
        partition_stats.elapsed = start.elapsed();
        Ok(PartitionResult {
            partition_id: extent.partition_id,
            begin_rid: extent.begin_rid,
            end_rid: extent.end_rid,
            region: stack.pop().unwrap(),
            stats: partition_stats,
        })
    }
}

impl Iterator for QueryCursor {
    type Item = Result<PartitionResult, PiqueError>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if self.stopped || self.next_idx >= self.extents.len() {
                return None;
            }
            let extent = self.extents[self.next_idx];
            self.next_idx += 1;
            let span = debug_span!("next_partition", partition_id = extent.partition_id);
            let _enter = span.enter();

            match self.evaluate_partition(&extent) {
                Ok(result) => {
                    self.summary.record_partition(&result.stats);
                    self.partitions_since_release += 1;
                    if self.partitions_since_release >= self.config.release_unused_every_n_partitions {
                        self.partitions_since_release = 0;
                        if let Err(e) = self.cache.release_unused() {
                            self.stopped = true;
                            return Some(Err(e));
                        }
                    }
                    return Some(Ok(result));
                }
                Err(e) if e.class() == ErrorClass::Arithmetic && self.config.skip_partition_on_arithmetic_error => {
                    warn!(partition_id = extent.partition_id, error = %e, "skipping partition after arithmetic error");
                    self.summary.record_skip();
                    continue;
                }
                Err(e) => {
                    self.stopped = true;
                    return Some(Err(e));
                }
            }
        }
    }
}
