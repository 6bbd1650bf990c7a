//! Terminal progress bar for the upload phase.

use std::time::{Duration, Instant};

#[derive(Debug, Clone)]
pub struct ProgressBar {
    total: u64,
    current: u64,
    width: u16,
    message: String,
    started: Instant,
}

impl ProgressBar {
    pub fn new(total: u64, message: impl Into<String>) -> Self {
        Self {
            total,
            current: 0,
            width: 24,
            message: message.into(),
            started: Instant::now(),
        }
    }

    pub fn inc(&mut self, delta: u64) {
        self.current = self.current.saturating_add(delta).min(self.total);
    }

    pub fn set(&mut self, value: u64) {
        self.current = value.min(self.total);
    }

    pub fn is_done(&self) -> bool {
        self.current >= self.total
    }

    pub fn eta(&self) -> Option<Duration> {
        if self.total == 0 || self.current == 0 {
            return None;
        }
        if self.current >= self.total {
            return Some(Duration::from_secs(0));
        }
        let elapsed = self.started.elapsed().as_secs_f64();
        if elapsed <= 0.0 {
            return None;
        }
        let rate = self.current as f64 / elapsed;
        let secs = (self.total - self.current) as f64 / rate;
        if !secs.is_finite() {
            return None;
        }
        Some(Duration::from_secs_f64(secs))
    }

    pub fn render(&self, unicode: bool) -> String {
        let width = self.width.max(1) as usize;
        let filled = if self.total == 0 {
            width
        } else {
            ((self.current as f64 / self.total as f64) * width as f64).round() as usize
        }
        .min(width);
        let bar = if unicode {
            format!("{}{}", "━".repeat(filled), "─".repeat(width - filled))
        } else {
            format!("{}{}", "=".repeat(filled), "-".repeat(width - filled))
        };

        let pct = if self.total == 0 {
            100
        } else {
            self.current * 100 / self.total
        };
        let mut out = format!(
            "{} {}  {}/{} ({}%)",
            self.message, bar, self.current, self.total, pct
        );
        if let Some(eta) = self.eta() {
            let secs = eta.as_secs();
            if secs > 0 {
                out.push_str(&format!("  ETA: {}", format_compact(eta)));
            }
        }
        out
    }
}

fn format_compact(d: Duration) -> String {
    let secs = d.as_secs();
    if secs < 60 {
        format!("{secs}s")
    } else if secs < 3600 {
        format!("{}m", secs / 60)
    } else {
        format!("{}h", secs / 3600)
    }
}
