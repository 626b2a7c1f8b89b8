//! Always-on timing and counter aggregation for the mixer.
//!
//! Spans and counters land in a process-wide collector of relaxed atomics, so
//! independent streaming sessions on different threads can record without
//! coordination. [`report`] renders an end-of-run table.

use std::fmt::Write;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::OnceLock;
use std::time::{Duration, Instant};

/// Named metrics tracked by the collector.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Metric {
    PomForward,
    PomStateForward,
    PolyExpand,
    MaskReduce,
    StreamMerge,
    LinearProjection,
    WeightsLoad,
    PomTokens,
    StreamChunks,
}

impl Metric {
    const COUNT: usize = 9;

    const ALL: [Metric; Metric::COUNT] = [
        Metric::PomForward,
        Metric::PomStateForward,
        Metric::PolyExpand,
        Metric::MaskReduce,
        Metric::StreamMerge,
        Metric::LinearProjection,
        Metric::WeightsLoad,
        Metric::PomTokens,
        Metric::StreamChunks,
    ];

    /// Dotted name used in reports.
    pub fn name(self) -> &'static str {
        match self {
            Metric::PomForward => "pom.forward",
            Metric::PomStateForward => "pom.state_forward",
            Metric::PolyExpand => "poly.expand",
            Metric::MaskReduce => "mask.reduce",
            Metric::StreamMerge => "stream.merge",
            Metric::LinearProjection => "linear.projection",
            Metric::WeightsLoad => "weights.load",
            Metric::PomTokens => "pom.tokens",
            Metric::StreamChunks => "stream.chunks",
        }
    }

    /// Counters only accumulate deltas; everything else is a timer.
    pub fn is_counter(self) -> bool {
        matches!(self, Metric::PomTokens | Metric::StreamChunks)
    }

    fn index(self) -> usize {
        self as usize
    }
}

#[derive(Default)]
struct Slot {
    total_us: AtomicU64,
    count: AtomicU64,
}

struct Collector {
    start: Instant,
    slots: [Slot; Metric::COUNT],
}

static COLLECTOR: OnceLock<Collector> = OnceLock::new();

fn collector() -> &'static Collector {
    COLLECTOR.get_or_init(|| Collector {
        start: Instant::now(),
        slots: std::array::from_fn(|_| Slot::default()),
    })
}

/// RAII timer that records into its metric on drop.
pub struct PerfSpan {
    metric: Metric,
    start: Instant,
}

impl Drop for PerfSpan {
    fn drop(&mut self) {
        add_duration(self.metric, self.start.elapsed());
    }
}

/// Begin a timing span for `metric`.
pub fn span(metric: Metric) -> PerfSpan {
    PerfSpan {
        metric,
        start: Instant::now(),
    }
}

/// Record one timed occurrence of `metric`.
pub fn add_duration(metric: Metric, duration: Duration) {
    let micros = u64::try_from(duration.as_micros()).unwrap_or(u64::MAX);
    let slot = &collector().slots[metric.index()];
    slot.total_us.fetch_add(micros, Ordering::Relaxed);
    slot.count.fetch_add(1, Ordering::Relaxed);
}

/// Add `delta` to a counter metric.
pub fn add_count(metric: Metric, delta: u64) {
    collector().slots[metric.index()]
        .count
        .fetch_add(delta, Ordering::Relaxed);
}

/// Point-in-time copy of the collector.
#[derive(Debug, Clone)]
pub struct PerfSnapshot {
    uptime: Duration,
    totals_us: [u64; Metric::COUNT],
    counts: [u64; Metric::COUNT],
}

/// Copy the current totals.
pub fn snapshot() -> PerfSnapshot {
    let collector = collector();
    PerfSnapshot {
        uptime: collector.start.elapsed(),
        totals_us: std::array::from_fn(|i| collector.slots[i].total_us.load(Ordering::Relaxed)),
        counts: std::array::from_fn(|i| collector.slots[i].count.load(Ordering::Relaxed)),
    }
}

impl PerfSnapshot {
    /// Occurrences (timers) or accumulated value (counters) for `metric`.
    pub fn count(&self, metric: Metric) -> u64 {
        self.counts[metric.index()]
    }

    /// Total recorded time for a timer metric.
    pub fn total(&self, metric: Metric) -> Duration {
        Duration::from_micros(self.totals_us[metric.index()])
    }

    /// Render timers (slowest first) and then counters.
    pub fn format(&self) -> String {
        let mut output = String::new();
        let _ = writeln!(
            &mut output,
            "Performance summary (uptime: {:.3}s)",
            self.uptime.as_secs_f64()
        );

        let mut timers: Vec<Metric> = Metric::ALL
            .into_iter()
            .filter(|m| !m.is_counter() && self.count(*m) > 0)
            .collect();
        timers.sort_by_key(|m| std::cmp::Reverse(self.totals_us[m.index()]));
        let counters: Vec<Metric> = Metric::ALL
            .into_iter()
            .filter(|m| m.is_counter() && self.count(*m) > 0)
            .collect();

        if timers.is_empty() && counters.is_empty() {
            let _ = writeln!(&mut output, "No performance data recorded.");
            return output;
        }

        if !timers.is_empty() {
            let _ = writeln!(
                &mut output,
                "  {:<24} {:>10} {:>8} {:>10}",
                "timer", "total", "calls", "avg"
            );
            for metric in timers {
                let total = self.total(metric).as_secs_f64();
                let calls = self.count(metric);
                let avg_ms = total * 1000.0 / calls as f64;
                let _ = writeln!(
                    &mut output,
                    "  {:<24} {:>9.3}s {:>8} {:>8.3}ms",
                    metric.name(),
                    total,
                    calls,
                    avg_ms
                );
            }
        }

        for metric in counters {
            let _ = writeln!(&mut output, "  {:<24} {}", metric.name(), self.count(metric));
        }
        output
    }
}

/// Format a report of all collected metrics.
pub fn report() -> String {
    snapshot().format()
}
