//! Per-operation tracing hooks.
//!
//! Only emits `tracing` events; a binary that wants real metrics can install a
//! subscriber layer that turns these into counters.

use std::time::Instant;

use zbridge_core::error::Result;

/// Timer for one codec operation.
pub(crate) struct OpTimer {
    op: &'static str,
    input_len: usize,
    started: Instant,
}

impl OpTimer {
    pub(crate) fn start(op: &'static str, input_len: usize) -> Self {
        Self {
            op,
            input_len,
            started: Instant::now(),
        }
    }

    /// Emit the outcome and hand the result back unchanged.
    pub(crate) fn finish(self, result: Result<Vec<u8>>) -> Result<Vec<u8>> {
        let elapsed_us = self.started.elapsed().as_micros() as u64;
        match &result {
            Ok(out) => tracing::debug!(
                op = self.op,
                input_len = self.input_len,
                output_len = out.len(),
                elapsed_us,
                "codec operation complete"
            ),
            Err(e) => tracing::debug!(
                op = self.op,
                input_len = self.input_len,
                elapsed_us,
                error = %e,
                "codec operation failed"
            ),
        }
        result
    }
}
