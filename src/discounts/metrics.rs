// Performance and outcome metrics for discount evaluation
//
// Counts evaluations, applied discounts and coupon traffic, and tracks
// evaluation time so slow requests show up in the logs.

use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use utoipa::ToSchema;

use crate::discounts::types::DiscountKind;

/// Evaluations slower than this are logged and counted (100ms)
const SLOW_EVALUATION_THRESHOLD_MS: u64 = 100;

/// Shared counters for the discount engine
#[derive(Debug, Clone)]
pub struct DiscountMetrics {
    inner: Arc<MetricsInner>,
}

#[derive(Debug, Default)]
struct MetricsInner {
    evaluations: AtomicU64,
    total_evaluation_time_us: AtomicU64,
    slow_evaluations: AtomicU64,

    // Winning rule per evaluation
    client_tier_applied: AtomicU64,
    minimum_amount_applied: AtomicU64,
    seasonal_applied: AtomicU64,
    coupon_applied: AtomicU64,
    no_discount: AtomicU64,

    coupon_rejections: AtomicU64,
    lookup_failures: AtomicU64,
    failed_evaluations: AtomicU64,
    write_back_failures: AtomicU64,
}

impl DiscountMetrics {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(MetricsInner::default()),
        }
    }

    /// Start timing one evaluation; the time is recorded when the timer drops
    pub fn start_evaluation(&self) -> EvaluationTimer {
        EvaluationTimer {
            start: Instant::now(),
            metrics: self.clone(),
        }
    }

    /// Record which rule won an evaluation
    pub fn record_outcome(&self, kind: DiscountKind) {
        let counter = match kind {
            DiscountKind::ClientTier => &self.inner.client_tier_applied,
            DiscountKind::MinimumAmount => &self.inner.minimum_amount_applied,
            DiscountKind::Seasonal => &self.inner.seasonal_applied,
            DiscountKind::Coupon => &self.inner.coupon_applied,
            DiscountKind::NoDiscount => &self.inner.no_discount,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_coupon_rejection(&self) {
        self.inner.coupon_rejections.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_lookup_failure(&self) {
        self.inner.lookup_failures.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a discounted total the sales subsystem did not accept
    pub fn record_write_back_failure(&self) {
        self.inner.write_back_failures.fetch_add(1, Ordering::Relaxed);
    }

    /// Record an evaluation that ended in an error of any kind
    pub fn record_failure(&self) {
        self.inner.failed_evaluations.fetch_add(1, Ordering::Relaxed);
    }

    fn record_evaluation(&self, duration: Duration) {
        self.inner.evaluations.fetch_add(1, Ordering::Relaxed);
        self.inner
            .total_evaluation_time_us
            .fetch_add(duration.as_micros() as u64, Ordering::Relaxed);

        if duration.as_millis() as u64 > SLOW_EVALUATION_THRESHOLD_MS {
            self.inner.slow_evaluations.fetch_add(1, Ordering::Relaxed);
            tracing::warn!("Slow discount evaluation: {}ms", duration.as_millis());
        }
    }

    /// Average evaluation time in milliseconds
    pub fn avg_evaluation_time_ms(&self) -> f64 {
        let count = self.inner.evaluations.load(Ordering::Relaxed);
        let total_us = self.inner.total_evaluation_time_us.load(Ordering::Relaxed);

        if count == 0 {
            0.0
        } else {
            (total_us as f64 / count as f64) / 1000.0
        }
    }

    pub fn summary(&self) -> MetricsSummary {
        let load = |counter: &AtomicU64| counter.load(Ordering::Relaxed);
        MetricsSummary {
            evaluations: load(&self.inner.evaluations),
            avg_evaluation_time_ms: self.avg_evaluation_time_ms(),
            slow_evaluations: load(&self.inner.slow_evaluations),
            client_tier_applied: load(&self.inner.client_tier_applied),
            minimum_amount_applied: load(&self.inner.minimum_amount_applied),
            seasonal_applied: load(&self.inner.seasonal_applied),
            coupon_applied: load(&self.inner.coupon_applied),
            no_discount: load(&self.inner.no_discount),
            coupon_rejections: load(&self.inner.coupon_rejections),
            lookup_failures: load(&self.inner.lookup_failures),
            failed_evaluations: load(&self.inner.failed_evaluations),
            write_back_failures: load(&self.inner.write_back_failures),
        }
    }

    pub fn log_summary(&self) {
        let summary = self.summary();
        tracing::info!(
            "Discount Engine Metrics:\n\
             Evaluations: {} (avg {:.2}ms, {} slow, {} failed)\n\
             Applied: tier {}, minimum amount {}, seasonal {}, coupon {}, none {}\n\
             Coupon rejections: {}, lookup failures: {}",
            summary.evaluations,
            summary.avg_evaluation_time_ms,
            summary.slow_evaluations,
            summary.failed_evaluations,
            summary.client_tier_applied,
            summary.minimum_amount_applied,
            summary.seasonal_applied,
            summary.coupon_applied,
            summary.no_discount,
            summary.coupon_rejections,
            summary.lookup_failures,
        );
    }
}

impl Default for DiscountMetrics {
    fn default() -> Self {
        Self::new()
    }
}

/// Records the elapsed time of one evaluation when dropped
pub struct EvaluationTimer {
    start: Instant,
    metrics: DiscountMetrics,
}

impl Drop for EvaluationTimer {
    fn drop(&mut self) {
        self.metrics.record_evaluation(self.start.elapsed());
    }
}

/// Snapshot of the discount metrics
#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct MetricsSummary {
    pub evaluations: u64,
    pub avg_evaluation_time_ms: f64,
    pub slow_evaluations: u64,
    pub client_tier_applied: u64,
    pub minimum_amount_applied: u64,
    pub seasonal_applied: u64,
    pub coupon_applied: u64,
    pub no_discount: u64,
    pub coupon_rejections: u64,
    pub lookup_failures: u64,
    pub failed_evaluations: u64,
    pub write_back_failures: u64,
}
