/* src/metrics.rs */
//! Lightweight metrics that report through `tracing` instead of an exporter.
/*▫~•◦────────────────────────────────────────────────────────────────────────────────────‣
 * © 2025 ArcMoon Studios ◦ SPDX-License-Identifier MIT OR Apache-2.0 ◦ Author: Lord Xyn ✶
 *///◦────────────────────────────────────────────────────────────────────────────────────‣

use std::sync::atomic::{AtomicU64, Ordering};

use tracing::{debug, trace};

/// A monotonically increasing counter that emits a `trace!` event per increment.
#[derive(Debug)]
pub struct Counter {
    name: &'static str,
    value: AtomicU64,
}

impl Counter {
    /// Creates a new `Counter` with the given name.
    pub const fn new(name: &'static str) -> Self {
        Self { name, value: AtomicU64::new(0) }
    }

    /// Increments the counter by `delta`.
    pub fn increment(&self, delta: u64) {
        let new_value = self.value.fetch_add(delta, Ordering::Relaxed) + delta;
        trace!(
            metric_type = "counter",
            metric_name = self.name,
            value = new_value,
            delta,
            "Counter incremented"
        );
    }

    /// Current value.
    pub fn get(&self) -> u64 {
        self.value.load(Ordering::Relaxed)
    }
}

/// Last-value metric. Stores the value as `f64` bits so it can be read back.
#[derive(Debug)]
pub struct Gauge {
    name: &'static str,
    bits: AtomicU64,
}

impl Gauge {
    /// Creates a new `Gauge` reading `0.0`.
    pub const fn new(name: &'static str) -> Self {
        Self { name, bits: AtomicU64::new(0) }
    }

    /// Replace the current value.
    pub fn set(&self, value: f64) {
        self.bits.store(value.to_bits(), Ordering::Relaxed);
        debug!(metric_type = "gauge", metric_name = self.name, value, "Gauge updated");
    }

    /// Most recently set value.
    pub fn get(&self) -> f64 {
        f64::from_bits(self.bits.load(Ordering::Relaxed))
    }
}

/// A histogram that emits each observation as a `debug!` event.
#[derive(Debug)]
pub struct Histogram {
    name: &'static str,
}

impl Histogram {
    /// Creates a new `Histogram` with the given name.
    pub const fn new(name: &'static str) -> Self {
        Self { name }
    }

    /// Records a single observation.
    pub fn record(&self, value: f64) {
        debug!(
            metric_type = "histogram",
            metric_name = self.name,
            value,
            "Histogram value recorded"
        );
    }
}

/// Creates or retrieves a static [`Counter`] instance.
#[macro_export]
macro_rules! counter {
    ($name:expr) => {{
        static COUNTER: $crate::metrics::Counter = $crate::metrics::Counter::new($name);
        &COUNTER
    }};
}

/// Creates or retrieves a static [`Gauge`] instance.
#[macro_export]
macro_rules! gauge {
    ($name:expr) => {{
        static GAUGE: $crate::metrics::Gauge = $crate::metrics::Gauge::new($name);
        &GAUGE
    }};
}

/// Creates or retrieves a static [`Histogram`] instance.
#[macro_export]
macro_rules! histogram {
    ($name:expr) => {{
        static HISTOGRAM: $crate::metrics::Histogram = $crate::metrics::Histogram::new($name);
        &HISTOGRAM
    }};
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counter_accumulates() {
        let counter = Counter::new("test.counter");
        counter.increment(2);
        counter.increment(3);
        assert_eq!(counter.get(), 5);
    }

    #[test]
    fn test_static_macro_is_shared() {
        fn bump() -> u64 {
            let c = counter!("test.shared");
            c.increment(1);
            c.get()
        }
        let first = bump();
        let second = bump();
        assert_eq!(second, first + 1);
        histogram!("test.histogram").record(1.5);
    }

    #[test]
    fn test_gauge_keeps_last_value() {
        let g = Gauge::new("test.gauge");
        assert_eq!(g.get(), 0.0);
        g.set(4096.0);
        g.set(-2.5);
        assert_eq!(g.get(), -2.5);
    }
}
