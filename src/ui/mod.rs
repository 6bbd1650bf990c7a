//! Terminal presentation for the deployment engine
//!
//! Implements the engine's `Logger` capability: phase headings, transfer
//! progress, warnings and the final summary. Color and the live progress
//! bar switch off automatically when stdout is not a terminal or
//! `--no-progress` is set.

mod progress;

use std::io::Write;

use crossterm::style::Stylize;
use is_terminal::IsTerminal;

use sitesync::deploy::{DeploySummary, Logger};
use sitesync::SitesyncError;

pub use progress::ProgressBar;

pub struct ConsoleLogger {
    verbose: u8,
    show_progress: bool,
    use_color: bool,
    bar: Option<ProgressBar>,
}

impl ConsoleLogger {
    pub fn new(verbose: u8, no_progress: bool) -> Self {
        let tty = std::io::stdout().is_terminal();
        Self {
            verbose,
            show_progress: tty && !no_progress,
            use_color: tty,
            bar: None,
        }
    }

    /// Heading for one site section of a config file.
    pub fn section(&mut self, name: &str) {
        self.finish_bar();
        let line = format!("═══ {name} ═══");
        if self.use_color {
            println!("{}", line.bold());
        } else {
            println!("{line}");
        }
    }

    pub fn summary(&mut self, summary: &DeploySummary) {
        self.finish_bar();
        let mut line = format!(
            "{} uploaded, {} deleted, {} purged, {} unchanged",
            summary.uploaded, summary.deleted, summary.purged, summary.skipped
        );
        if summary.test_mode {
            line.push_str(" (test mode, nothing deployed)");
        }
        if self.use_color {
            println!("{} {line}", "✓".green());
        } else {
            println!("OK {line}");
        }
    }

    fn finish_bar(&mut self) {
        if let Some(bar) = self.bar.take() {
            if self.show_progress {
                println!("\r{}", bar.render(self.use_color));
            }
        }
    }

    fn redraw_bar(&mut self) {
        if !self.show_progress {
            return;
        }
        if let Some(bar) = &self.bar {
            let mut out = std::io::stdout();
            let _ = write!(out, "\r\x1b[2K{}", bar.render(self.use_color));
            let _ = out.flush();
        }
    }
}

impl Logger for ConsoleLogger {
    fn phase(&mut self, title: &str) {
        self.finish_bar();
        if self.use_color {
            println!("{}", title.to_string().cyan());
        } else {
            println!("{title}");
        }
    }

    fn info(&mut self, message: &str) {
        self.finish_bar();
        println!("  {message}");
    }

    fn warn(&mut self, message: &str) {
        self.finish_bar();
        if self.use_color {
            eprintln!("{} {message}", "warning:".yellow());
        } else {
            eprintln!("warning: {message}");
        }
    }

    fn begin_transfers(&mut self, total: usize) {
        self.bar = Some(ProgressBar::new(total as u64, "Uploading"));
        self.redraw_bar();
    }

    fn transfer_progress(&mut self, rel: &str, percent: u8) {
        if self.verbose >= 2 && !self.show_progress {
            println!("  {rel}: {percent}%");
        }
    }

    fn transfer_done(&mut self, rel: &str) {
        if let Some(bar) = &mut self.bar {
            bar.inc(1);
        }
        if self.show_progress {
            self.redraw_bar();
        } else if self.verbose >= 1 {
            println!("  {rel}");
        }
    }

    fn transfer_failed(&mut self, rel: &str, message: &str, retrying: bool) {
        if self.show_progress {
            eprint!("\r\x1b[2K");
        }
        let label = if retrying {
            format!("{rel}: {message}, retrying")
        } else {
            format!("{rel}: {message}")
        };
        if self.use_color {
            eprintln!("{} {label}", "warning:".yellow());
        } else {
            eprintln!("warning: {label}");
        }
        self.redraw_bar();
    }
}

/// Print a run-ending error.
pub fn print_error(err: &SitesyncError) {
    let tty = std::io::stderr().is_terminal();
    if tty {
        eprintln!("{} {err}", "error:".red());
    } else {
        eprintln!("error: {err}");
    }
}
