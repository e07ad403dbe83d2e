// src/exec/progress.rs

//! Text progress line shown under a running cell.

use std::time::Duration;

use chrono::Utc;

use crate::client::Timestamp;

/// Renders a progress percentage into a single line of text.
pub trait ProgressRenderer: Send {
    fn render(&mut self, percent: f64) -> String;
}

const SPINNER: [char; 4] = ['|', '/', '-', '\\'];

/// `[spinner] bar | Elapsed: hh:mm:ss.sss | 42.00%`, padded to a fixed width.
#[derive(Debug, Clone)]
pub struct TextProgressBar {
    width: usize,
    started_at: Timestamp,
    frame: usize,
}

impl TextProgressBar {
    pub const DEFAULT_WIDTH: usize = 57;

    pub fn new(started_at: Option<Timestamp>) -> Self {
        Self::with_width(Self::DEFAULT_WIDTH, started_at)
    }

    pub fn with_width(width: usize, started_at: Option<Timestamp>) -> Self {
        Self {
            width,
            started_at: started_at.unwrap_or_else(Utc::now),
            frame: 0,
        }
    }

    fn elapsed(&self) -> Duration {
        (Utc::now() - self.started_at)
            .to_std()
            .unwrap_or(Duration::ZERO)
    }

    fn line(&self, percent: f64, elapsed: Duration, spinner: char) -> String {
        let percent = if percent.is_finite() {
            percent.clamp(0.0, 100.0)
        } else {
            0.0
        };
        let head = format!("[{spinner}] ");
        let tail = format!(" | Elapsed: {} | {percent:.2}%", format_elapsed(elapsed));
        let bar_width = self.width.saturating_sub(head.len() + tail.len());
        let filled = ((bar_width as f64) * percent / 100.0).round() as usize;
        let filled = filled.min(bar_width);

        let mut out = String::with_capacity(self.width);
        out.push_str(&head);
        out.extend(std::iter::repeat_n('#', filled));
        out.extend(std::iter::repeat_n('-', bar_width - filled));
        out.push_str(&tail);
        out
    }
}

impl ProgressRenderer for TextProgressBar {
    fn render(&mut self, percent: f64) -> String {
        let spinner = SPINNER[self.frame % SPINNER.len()];
        self.frame = self.frame.wrapping_add(1);
        self.line(percent, self.elapsed(), spinner)
    }
}

/// `hh:mm:ss.sss`
pub fn format_elapsed(elapsed: Duration) -> String {
    let millis = elapsed.as_millis();
    let hours = millis / 3_600_000;
    let minutes = (millis / 60_000) % 60;
    let seconds = (millis / 1000) % 60;
    let ms = millis % 1000;
    format!("{hours:02}:{minutes:02}:{seconds:02}.{ms:03}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn elapsed_format() {
        assert_eq!(format_elapsed(Duration::from_millis(0)), "00:00:00.000");
        assert_eq!(
            format_elapsed(Duration::from_millis(3_723_045)),
            "01:02:03.045"
        );
    }

    #[test]
    fn line_has_fixed_width_and_fill() {
        let bar = TextProgressBar::new(None);
        let line = bar.line(50.0, Duration::from_secs(1), '|');
        assert_eq!(line.chars().count(), TextProgressBar::DEFAULT_WIDTH);
        assert!(line.starts_with("[|] #"));
        assert!(line.ends_with("| Elapsed: 00:00:01.000 | 50.00%"));

        let hashes = line.chars().filter(|c| *c == '#').count();
        let dashes = line.chars().filter(|c| *c == '-').count();
        assert!(hashes.abs_diff(dashes) <= 1, "{line}");
    }

    #[test]
    fn out_of_range_percent_is_clamped() {
        let bar = TextProgressBar::new(None);
        assert!(bar.line(250.0, Duration::ZERO, '|').ends_with("100.00%"));
        assert!(bar.line(f64::NAN, Duration::ZERO, '|').ends_with(" 0.00%"));
    }

    #[test]
    fn spinner_advances_between_renders() {
        let mut bar = TextProgressBar::new(None);
        let a = bar.render(1.0);
        let b = bar.render(1.0);
        assert_ne!(a.chars().nth(1), b.chars().nth(1));
    }
}
