use super::ApiMetrics;

/// Weight given to the newest sample in the response time average
pub const RESPONSE_TIME_EMA_ALPHA: f64 = 0.2;

/// Error rate rises by this much per failed request...
pub const ERROR_RATE_STEP_UP: f64 = 0.1;

/// ...and decays by this much per successful one
pub const ERROR_RATE_STEP_DOWN: f64 = 0.01;

impl ApiMetrics {
    /// Fold one completed request into the running API statistics.
    ///
    /// Error rate moves asymmetrically: ten successes undo one failure, so a
    /// burst of errors stays visible long after traffic recovers.
    pub fn record_request(&mut self, duration_ms: f64, success: bool) {
        self.request_count += 1;
        self.average_response_time = self.average_response_time * (1.0 - RESPONSE_TIME_EMA_ALPHA)
            + duration_ms * RESPONSE_TIME_EMA_ALPHA;

        self.error_rate = if success {
            (self.error_rate - ERROR_RATE_STEP_DOWN).max(0.0)
        } else {
            (self.error_rate + ERROR_RATE_STEP_UP).min(100.0)
        };
    }
}
