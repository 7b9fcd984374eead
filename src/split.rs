//! Split planning: carving `[min, max]` of a numeric column into contiguous,
//! non-overlapping ranges that partitions can read independently.
//!
//! Every split is half-open `[lo, hi)` except the last, which is closed
//! `[lo, max]`, so the union of all splits covers the range exactly once.
//!
//! ```
//! use sluice::split::{BoundValue, plan_splits};
//!
//! let splits = plan_splits(BoundValue::Int(1), BoundValue::Int(10), 3)?;
//! assert_eq!(splits.len(), 3);
//! assert_eq!(splits[0].predicate("ID"), "ID >= 1 AND ID < 4");
//! assert_eq!(splits[2].predicate("ID"), "ID >= 7 AND ID <= 10");
//! # Ok::<(), sluice::ConnectorError>(())
//! ```

use crate::error::{ConnectorError, Result};
use ordered_float::OrderedFloat;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;

/// A numeric split boundary.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BoundValue {
    Int(i64),
    Float(OrderedFloat<f64>),
}

impl BoundValue {
    #[must_use]
    pub fn float(v: f64) -> Self {
        Self::Float(OrderedFloat(v))
    }

    #[allow(clippy::cast_precision_loss)]
    fn as_f64(self) -> f64 {
        match self {
            Self::Int(v) => v as f64,
            Self::Float(v) => v.0,
        }
    }

    fn compare(self, other: Self) -> Ordering {
        match (self, other) {
            (Self::Int(a), Self::Int(b)) => a.cmp(&b),
            (a, b) => OrderedFloat(a.as_f64()).cmp(&OrderedFloat(b.as_f64())),
        }
    }
}

impl fmt::Display for BoundValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Int(v) => write!(f, "{v}"),
            Self::Float(v) => write!(f, "{}", v.0),
        }
    }
}

/// One end of a split.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SplitBound {
    Unbounded,
    Value(BoundValue),
}

/// A contiguous range of the split column.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Split {
    pub lower: SplitBound,
    pub upper: SplitBound,
    pub inclusive_lower: bool,
    pub inclusive_upper: bool,
}

impl Split {
    /// The split that matches every row.
    #[must_use]
    pub const fn unbounded() -> Self {
        Self {
            lower: SplitBound::Unbounded,
            upper: SplitBound::Unbounded,
            inclusive_lower: true,
            inclusive_upper: true,
        }
    }

    const fn range(lo: BoundValue, hi: BoundValue, inclusive_upper: bool) -> Self {
        Self {
            lower: SplitBound::Value(lo),
            upper: SplitBound::Value(hi),
            inclusive_lower: true,
            inclusive_upper,
        }
    }

    /// Whether `v` falls inside this split.
    #[must_use]
    pub fn contains(&self, v: BoundValue) -> bool {
        let above = match self.lower {
            SplitBound::Unbounded => true,
            SplitBound::Value(lo) => match v.compare(lo) {
                Ordering::Greater => true,
                Ordering::Equal => self.inclusive_lower,
                Ordering::Less => false,
            },
        };
        let below = match self.upper {
            SplitBound::Unbounded => true,
            SplitBound::Value(hi) => match v.compare(hi) {
                Ordering::Less => true,
                Ordering::Equal => self.inclusive_upper,
                Ordering::Greater => false,
            },
        };
        above && below
    }

    /// SQL predicate selecting this split's rows of `column`.
    #[must_use]
    pub fn predicate(&self, column: &str) -> String {
        let mut terms = Vec::with_capacity(2);
        if let SplitBound::Value(lo) = self.lower {
            let op = if self.inclusive_lower { ">=" } else { ">" };
            terms.push(format!("{column} {op} {lo}"));
        }
        if let SplitBound::Value(hi) = self.upper {
            let op = if self.inclusive_upper { "<=" } else { "<" };
            terms.push(format!("{column} {op} {hi}"));
        }
        if terms.is_empty() {
            "1 = 1".to_string()
        } else {
            terms.join(" AND ")
        }
    }
}

impl fmt::Display for Split {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let open = if self.inclusive_lower { '[' } else { '(' };
        let close = if self.inclusive_upper { ']' } else { ')' };
        match self.lower {
            SplitBound::Unbounded => write!(f, "{open}-inf, ")?,
            SplitBound::Value(v) => write!(f, "{open}{v}, ")?,
        }
        match self.upper {
            SplitBound::Unbounded => write!(f, "+inf{close}"),
            SplitBound::Value(v) => write!(f, "{v}{close}"),
        }
    }
}

/// Plan up to `n` splits over `[min, max]`.
///
/// Integral bounds yield `min(n, max - min)` splits of equal width, the last
/// one absorbing the remainder; floating bounds yield `n` splits (fewer only
/// when the range is too narrow to separate them). `min == max` yields a single
/// closed split.
///
/// # Errors
/// `InvalidSplitRange` when `n == 0`, `min > max`, a bound is NaN or infinite,
/// or the bounds mix integral and floating values.
pub fn plan_splits(min: BoundValue, max: BoundValue, n: usize) -> Result<Vec<Split>> {
    if n == 0 {
        return Err(ConnectorError::InvalidSplitRange(
            "number of splits must be positive, got 0".into(),
        ));
    }
    match (min, max) {
        (BoundValue::Int(lo), BoundValue::Int(hi)) => plan_integral(lo, hi, n),
        (BoundValue::Float(lo), BoundValue::Float(hi)) => plan_floating(lo.0, hi.0, n),
        _ => Err(ConnectorError::InvalidSplitRange(format!(
            "bounds {min} and {max} mix integral and floating values"
        ))),
    }
}

#[allow(clippy::cast_possible_truncation)]
fn plan_integral(min: i64, max: i64, n: usize) -> Result<Vec<Split>> {
    if min > max {
        return Err(ConnectorError::InvalidSplitRange(format!(
            "lower bound {min} is greater than upper bound {max}"
        )));
    }
    if min == max {
        return Ok(vec![Split::range(BoundValue::Int(min), BoundValue::Int(max), true)]);
    }

    let width = i128::from(max) - i128::from(min);
    let count = width.min(n as i128);
    let bucket = width / count;

    let mut splits = Vec::with_capacity(count as usize);
    for i in 0..count {
        let lo = i128::from(min) + i * bucket;
        let last = i == count - 1;
        let hi = if last { i128::from(max) } else { lo + bucket };
        // lo and hi stay within [min, max].
        splits.push(Split::range(
            BoundValue::Int(lo as i64),
            BoundValue::Int(hi as i64),
            last,
        ));
    }
    Ok(splits)
}

#[allow(clippy::cast_precision_loss)]
fn plan_floating(min: f64, max: f64, n: usize) -> Result<Vec<Split>> {
    if !min.is_finite() || !max.is_finite() {
        return Err(ConnectorError::InvalidSplitRange(format!(
            "bounds must be finite, got {min} and {max}"
        )));
    }
    if min > max {
        return Err(ConnectorError::InvalidSplitRange(format!(
            "lower bound {min} is greater than upper bound {max}"
        )));
    }
    if min == max {
        return Ok(vec![Split::range(BoundValue::float(min), BoundValue::float(max), true)]);
    }

    let span = max - min;
    if !span.is_finite() {
        return Err(ConnectorError::InvalidSplitRange(format!(
            "range {min}..{max} is too wide to split"
        )));
    }
    let bucket = span / n as f64;
    // rounding may push an interior edge past max
    let mut edges: Vec<f64> = (0..n).map(|i| (min + i as f64 * bucket).min(max)).collect();
    edges.push(max);
    edges.dedup();

    let last = edges.len() - 2;
    Ok(edges
        .windows(2)
        .enumerate()
        .map(|(i, w)| Split::range(BoundValue::float(w[0]), BoundValue::float(w[1]), i == last))
        .collect())
}

/// A planned set of splits over one column.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SplitPlan {
    /// `None` for the single unbounded split.
    pub split_column: Option<String>,
    pub splits: Vec<Split>,
}

impl SplitPlan {
    /// One split covering every row.
    #[must_use]
    pub fn unbounded() -> Self {
        Self {
            split_column: None,
            splits: vec![Split::unbounded()],
        }
    }

    /// Plan `n` splits of `column` over `[min, max]`.
    ///
    /// # Errors
    /// See [`plan_splits`].
    pub fn new(column: impl Into<String>, min: BoundValue, max: BoundValue, n: usize) -> Result<Self> {
        Ok(Self {
            split_column: Some(column.into()),
            splits: plan_splits(min, max, n)?,
        })
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.splits.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.splits.is_empty()
    }

    /// Predicate for one split of this plan.
    #[must_use]
    pub fn predicate(&self, split: &Split) -> String {
        match &self.split_column {
            Some(column) => split.predicate(column),
            None => "1 = 1".to_string(),
        }
    }
}

#[cfg(feature = "split-transport")]
mod transport {
    use super::SplitPlan;
    use crate::error::Result;
    use anyhow::{Context, anyhow};
    use serde::{Deserialize, Serialize};
    use sha2::{Digest, Sha256};

    #[derive(Serialize, Deserialize)]
    struct Envelope {
        checksum: String,
        payload: Vec<u8>,
    }

    fn compute_checksum(data: &[u8]) -> String {
        let mut hasher = Sha256::new();
        hasher.update(data);
        format!("{:x}", hasher.finalize())
    }

    impl SplitPlan {
        /// Encode the plan for shipping to worker processes.
        ///
        /// # Errors
        /// Serialization failure.
        pub fn encode(&self) -> Result<Vec<u8>> {
            let payload = postcard::to_allocvec(self).context("encode split plan")?;
            let envelope = Envelope {
                checksum: compute_checksum(&payload),
                payload,
            };
            Ok(postcard::to_allocvec(&envelope).context("encode split plan envelope")?)
        }

        /// Decode a plan produced by [`SplitPlan::encode`], verifying its checksum.
        ///
        /// # Errors
        /// Malformed bytes or a checksum mismatch.
        pub fn decode(bytes: &[u8]) -> Result<Self> {
            let envelope: Envelope =
                postcard::from_bytes(bytes).context("decode split plan envelope")?;
            if compute_checksum(&envelope.payload) != envelope.checksum {
                return Err(anyhow!("split plan integrity check failed: checksum mismatch").into());
            }
            Ok(postcard::from_bytes(&envelope.payload).context("decode split plan")?)
        }
    }
}
