//! Query parameter samplers
//!
//! This crate provides implementations of the `ParamSampler` trait for:
//!
//! - Uniform random integers
//! - Random alphanumeric strings
//! - Sequential integer ranges (wrapping)
//! - Random choice from a fixed list

#![warn(missing_docs)]
#![warn(clippy::all)]

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use rand::distributions::{Alphanumeric, DistString};
use rand::seq::SliceRandom;
use rand::Rng;

use sql_bench_core::{
    placeholder_count, BenchError, BenchResult, ParamSampler, ParamSpec, ParamValue,
    PreparedQuery, QueryDef,
};

/// Uniform integer in `min..=max`
#[derive(Debug)]
pub struct RandomIntSampler {
    min: i64,
    max: i64,
}

impl RandomIntSampler {
    /// Create a sampler; `min` must not exceed `max`
    pub fn new(min: i64, max: i64) -> BenchResult<Self> {
        if min > max {
            return Err(BenchError::config(format!(
                "random_int min {min} is greater than max {max}"
            )));
        }
        Ok(Self { min, max })
    }
}

impl ParamSampler for RandomIntSampler {
    fn name(&self) -> &str {
        "random_int"
    }

    fn sample(&self) -> ParamValue {
        ParamValue::Int(rand::thread_rng().gen_range(self.min..=self.max))
    }
}

/// Random alphanumeric string of fixed length
#[derive(Debug)]
pub struct RandomStringSampler {
    len: usize,
}

impl RandomStringSampler {
    /// Create a sampler producing strings of `len` characters
    pub fn new(len: usize) -> Self {
        Self { len }
    }
}

impl ParamSampler for RandomStringSampler {
    fn name(&self) -> &str {
        "random_string"
    }

    fn sample(&self) -> ParamValue {
        ParamValue::Text(Alphanumeric.sample_string(&mut rand::thread_rng(), self.len))
    }
}

/// Sequential integers `start..=end`, starting over after `end`
#[derive(Debug)]
pub struct RangeSampler {
    start: i64,
    span: u128,
    next: AtomicU64,
}

impl RangeSampler {
    /// Create a sampler; `start` must not exceed `end`
    pub fn new(start: i64, end: i64) -> BenchResult<Self> {
        if start > end {
            return Err(BenchError::config(format!(
                "range start {start} is greater than end {end}"
            )));
        }
        Ok(Self {
            start,
            span: (i128::from(end) - i128::from(start) + 1) as u128,
            next: AtomicU64::new(0),
        })
    }
}

impl ParamSampler for RangeSampler {
    fn name(&self) -> &str {
        "range"
    }

    fn sample(&self) -> ParamValue {
        let n = self.next.fetch_add(1, Ordering::Relaxed);
        let offset = u128::from(n) % self.span;
        // start + offset <= end, so this always fits in i64
        ParamValue::Int((i128::from(self.start) + offset as i128) as i64)
    }
}

/// Random choice from a fixed, non-empty list
#[derive(Debug)]
pub struct ListSampler {
    values: Vec<ParamValue>,
}

impl ListSampler {
    /// Create a sampler; `values` must not be empty
    pub fn new(values: Vec<ParamValue>) -> BenchResult<Self> {
        if values.is_empty() {
            return Err(BenchError::config("list has no values"));
        }
        Ok(Self { values })
    }
}

impl ParamSampler for ListSampler {
    fn name(&self) -> &str {
        "list"
    }

    fn sample(&self) -> ParamValue {
        self.values
            .choose(&mut rand::thread_rng())
            .cloned()
            .unwrap_or(ParamValue::Int(0))
    }
}

/// Build the sampler described by `spec`
pub fn build_sampler(spec: &ParamSpec) -> BenchResult<Arc<dyn ParamSampler>> {
    Ok(match spec {
        ParamSpec::RandomInt { min, max } => Arc::new(RandomIntSampler::new(*min, *max)?),
        ParamSpec::RandomString { len } => Arc::new(RandomStringSampler::new(*len)),
        ParamSpec::Range { start, end } => Arc::new(RangeSampler::new(*start, *end)?),
        ParamSpec::List { values } => Arc::new(ListSampler::new(values.clone())?),
    })
}

/// Turn query definitions into prepared queries, one sampler per placeholder
///
/// The result keeps the input order, so schedule indices stay valid.
pub fn prepare_queries(queries: &[QueryDef]) -> BenchResult<Vec<PreparedQuery>> {
    queries
        .iter()
        .map(|query| {
            let expected = placeholder_count(&query.statement);
            if query.params.len() != expected {
                return Err(BenchError::config(format!(
                    "query '{}' has {} placeholders but {} params",
                    query.id,
                    expected,
                    query.params.len()
                )));
            }

            let samplers = query
                .params
                .iter()
                .map(build_sampler)
                .collect::<BenchResult<Vec<_>>>()?;
            Ok(PreparedQuery::new(&query.id, &query.statement, samplers))
        })
        .collect()
}
