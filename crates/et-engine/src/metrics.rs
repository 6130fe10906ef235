//! Validation-metric extraction from captured job output.

use tracing::debug;

/// Tag identifying a validation-metric line in the job output.
pub const VALIDATION_TAG: &str = "Validation bpb";

/// Running minimum and last value of every recognized metric line.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MetricReading {
    /// `+inf` when nothing parsed.
    pub min: f64,
    /// `+inf` when nothing parsed.
    pub last: f64,
    pub matched: usize,
    pub skipped: usize,
}

impl MetricReading {
    pub fn is_present(&self) -> bool {
        self.min.is_finite()
    }
}

impl Default for MetricReading {
    fn default() -> Self {
        Self {
            min: f64::INFINITY,
            last: f64::INFINITY,
            matched: 0,
            skipped: 0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetricExtractor {
    tag: String,
}

impl Default for MetricExtractor {
    fn default() -> Self {
        Self::new(VALIDATION_TAG)
    }
}

impl MetricExtractor {
    pub fn new(tag: impl Into<String>) -> Self {
        Self { tag: tag.into() }
    }

    pub fn tag(&self) -> &str {
        &self.tag
    }

    /// Scan `text` line by line. The value is whatever follows the last `:`.
    pub fn extract(&self, text: &str) -> MetricReading {
        let mut reading = MetricReading::default();
        for line in text.lines().filter(|line| line.contains(self.tag.as_str())) {
            let field = line.rsplit(':').next().unwrap_or(line).trim();
            match field.parse::<f64>() {
                Ok(value) if !value.is_nan() => {
                    reading.min = reading.min.min(value);
                    reading.last = value;
                    reading.matched += 1;
                }
                _ => {
                    debug!("Skipping malformed metric line: {line}");
                    reading.skipped += 1;
                }
            }
        }
        reading
    }
}
