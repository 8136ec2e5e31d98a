//! Resource limits for ShEx validation.
//!
//! Partition search is exponential in the worst case (closed shapes with many constraints sharing a
//! predicate) and recursion through shape references is only bounded by the number of distinct
//! (node, shape) pairs. These limits turn both into reportable outcomes instead of hangs or stack
//! overflows.

/// Default maximum recursion depth for shape references.
pub const DEFAULT_MAX_RECURSION_DEPTH: usize = 256;

/// Default maximum number of candidate partitions explored during one validation call.
pub const DEFAULT_MAX_PARTITION_COMBINATIONS: usize = 100_000;

/// Default maximum length for regex patterns in `pattern` facets.
pub const DEFAULT_MAX_REGEX_LENGTH: usize = 1000;

/// Configurable resource limits for ShEx validation.
///
/// ```
/// use oxshex::ValidationLimits;
///
/// let limits = ValidationLimits::default()
///     .with_max_recursion_depth(64)
///     .with_max_partition_combinations(10_000);
/// assert_eq!(limits.max_recursion_depth, 64);
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationLimits {
    /// Maximum depth of nested shape references.
    pub max_recursion_depth: usize,

    /// Maximum number of neighborhood partitions tried during one validation call.
    pub max_partition_combinations: usize,

    /// Maximum length for regex patterns.
    pub max_regex_length: usize,
}

impl Default for ValidationLimits {
    fn default() -> Self {
        Self {
            max_recursion_depth: DEFAULT_MAX_RECURSION_DEPTH,
            max_partition_combinations: DEFAULT_MAX_PARTITION_COMBINATIONS,
            max_regex_length: DEFAULT_MAX_REGEX_LENGTH,
        }
    }
}

impl ValidationLimits {
    /// Creates a new ValidationLimits with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates permissive limits suitable for trusted schemas and data.
    pub fn permissive() -> Self {
        Self {
            max_recursion_depth: 4096,
            max_partition_combinations: 10_000_000,
            max_regex_length: 10_000,
        }
    }

    /// Creates strict limits suitable for services validating untrusted input.
    pub fn strict() -> Self {
        Self {
            max_recursion_depth: 64,
            max_partition_combinations: 10_000,
            max_regex_length: 500,
        }
    }

    /// Sets the maximum recursion depth.
    #[must_use]
    pub fn with_max_recursion_depth(mut self, depth: usize) -> Self {
        self.max_recursion_depth = depth;
        self
    }

    /// Sets the partition search budget.
    #[must_use]
    pub fn with_max_partition_combinations(mut self, count: usize) -> Self {
        self.max_partition_combinations = count;
        self
    }

    /// Sets the maximum regex pattern length.
    #[must_use]
    pub fn with_max_regex_length(mut self, length: usize) -> Self {
        self.max_regex_length = length;
        self
    }
}

/// Tracks resource consumption of a single validation call and enforces the limits.
#[derive(Debug)]
pub(crate) struct LimitTracker {
    limits: ValidationLimits,
    combinations: usize,
    exhausted: Option<ValidationLimitError>,
}

impl LimitTracker {
    pub(crate) fn new(limits: ValidationLimits) -> Self {
        Self {
            limits,
            combinations: 0,
            exhausted: None,
        }
    }

    /// Records one explored partition.
    pub(crate) fn record_combination(&mut self) -> Result<(), ValidationLimitError> {
        self.combinations += 1;
        if self.combinations > self.limits.max_partition_combinations {
            return Err(self.exhaust(ValidationLimitError::SearchBudgetExceeded {
                budget: self.limits.max_partition_combinations,
            }));
        }
        Ok(())
    }

    /// Checks a recursion depth against the limit.
    pub(crate) fn check_depth(&mut self, depth: usize) -> Result<(), ValidationLimitError> {
        if depth > self.limits.max_recursion_depth {
            return Err(self.exhaust(ValidationLimitError::MaxRecursionDepthExceeded {
                depth,
                limit: self.limits.max_recursion_depth,
            }));
        }
        Ok(())
    }

    /// Validates that a regex pattern length is within limits.
    pub(crate) fn check_regex_length(&self, pattern: &str) -> Result<(), ValidationLimitError> {
        if pattern.len() > self.limits.max_regex_length {
            return Err(ValidationLimitError::RegexTooLong {
                length: pattern.len(),
                limit: self.limits.max_regex_length,
            });
        }
        Ok(())
    }

    /// The first budget or depth limit hit during this call, if any.
    ///
    /// Once set, the outcome of the whole call is indeterminate.
    pub(crate) fn exhausted(&self) -> Option<&ValidationLimitError> {
        self.exhausted.as_ref()
    }

    pub(crate) fn combinations(&self) -> usize {
        self.combinations
    }

    fn exhaust(&mut self, error: ValidationLimitError) -> ValidationLimitError {
        if self.exhausted.is_none() {
            tracing::warn!(%error, "validation limit reached");
            self.exhausted = Some(error.clone());
        }
        error
    }
}

/// Errors that occur when validation limits are exceeded.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[non_exhaustive]
pub enum ValidationLimitError {
    /// Maximum recursion depth exceeded.
    #[error("Maximum recursion depth exceeded: reached {depth}, limit is {limit}")]
    MaxRecursionDepthExceeded { depth: usize, limit: usize },

    /// The partition search budget is spent.
    #[error("Partition search budget of {budget} combinations exhausted")]
    SearchBudgetExceeded { budget: usize },

    /// Regex pattern too long.
    #[error("Regex pattern too long: {length} bytes, limit is {limit}")]
    RegexTooLong { length: usize, limit: usize },
}
