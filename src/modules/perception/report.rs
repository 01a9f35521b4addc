use crate::error::FetchError;

/// One failed provider call, kept for the end-of-run summary.
#[derive(Debug)]
pub struct FetchFailure {
    pub call: String,
    pub error: FetchError,
}

/// Outcome bookkeeping for a fetch pass. Failures never abort the pass.
#[derive(Debug, Default)]
pub struct FetchReport {
    pub calls: usize,
    pub records: usize,
    pub skipped: usize,
    pub failures: Vec<FetchFailure>,
}

impl FetchReport {
    pub fn record_failure(&mut self, call: impl Into<String>, error: FetchError) {
        self.failures.push(FetchFailure { call: call.into(), error });
    }

    pub fn failed_calls(&self) -> usize {
        self.failures.len()
    }

    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }
}
