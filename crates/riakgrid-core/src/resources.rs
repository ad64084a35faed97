//! Offer resource model.
//!
//! A resource is a named quantity on an offer. Two shapes exist: scalars
//! such as "cpus", "mem", and "disk", and ranges such as "ports" (a set of
//! closed integer intervals). Range sets are kept canonical: ascending,
//! non-overlapping, and any two intervals closer than a gap of 2 coalesce.

use serde::{Deserialize, Serialize};

/// A closed integer interval `[begin, end]`.
pub type ValueRange = (u64, u64);

/// A named quantity carried on an offer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Resource {
    pub name: String,
    pub value: ResourceValue,
}

/// The two shapes a resource can take.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceValue {
    Scalar(f64),
    Ranges(Vec<ValueRange>),
}

impl Resource {
    /// A scalar resource such as `cpus` or `mem`.
    pub fn scalar(name: impl Into<String>, value: f64) -> Self {
        Self {
            name: name.into(),
            value: ResourceValue::Scalar(value),
        }
    }

    /// A ranges resource such as `ports`. The range set is canonicalized.
    pub fn ranges(name: impl Into<String>, ranges: Vec<ValueRange>) -> Self {
        Self {
            name: name.into(),
            value: ResourceValue::Ranges(array_to_ranges(&ranges_to_array(&ranges))),
        }
    }

    pub fn as_scalar(&self) -> Option<f64> {
        match self.value {
            ResourceValue::Scalar(v) => Some(v),
            ResourceValue::Ranges(_) => None,
        }
    }

    pub fn as_ranges(&self) -> Option<&[ValueRange]> {
        match &self.value {
            ResourceValue::Scalar(_) => None,
            ResourceValue::Ranges(r) => Some(r),
        }
    }

    /// Total quantity: the scalar value, or the number of integers covered.
    pub fn quantity(&self) -> f64 {
        match &self.value {
            ResourceValue::Scalar(v) => *v,
            ResourceValue::Ranges(r) => r.iter().map(|(b, e)| e - b + 1).sum::<u64>() as f64,
        }
    }
}

/// Expand a range set into the sorted list of integers it covers.
pub fn ranges_to_array(ranges: &[ValueRange]) -> Vec<u64> {
    let mut out = Vec::new();
    for &(begin, end) in ranges {
        out.extend(begin..=end);
    }
    out.sort_unstable();
    out
}

/// Collapse an integer list into a canonical range set.
///
/// The input need not be sorted. Adjacent or overlapping values merge into
/// one interval; a new interval starts only past a gap of at least 2.
pub fn array_to_ranges(values: &[u64]) -> Vec<ValueRange> {
    let mut sorted = values.to_vec();
    sorted.sort_unstable();
    sorted.dedup();

    let mut ranges: Vec<ValueRange> = Vec::new();
    for value in sorted {
        match ranges.last_mut() {
            Some((_, end)) if value <= *end + 1 => *end = value,
            _ => ranges.push((value, value)),
        }
    }
    ranges
}

/// Sum of all scalar resources with the given name.
pub fn scalar_sum(resources: &[Resource], name: &str) -> f64 {
    resources
        .iter()
        .filter(|r| r.name == name)
        .filter_map(Resource::as_scalar)
        .sum()
}
