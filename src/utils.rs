use std::{borrow::Cow, time::Duration};

use chrono::{Local, NaiveDateTime};
use indicatif::{ProgressBar, ProgressStyle};
use rand::{Rng, distr::Alphanumeric};

/// Random value for the OAuth `state` parameter.
pub fn generate_state() -> String {
    rand::rng()
        .sample_iter(&Alphanumeric)
        .take(16)
        .map(char::from)
        .collect()
}

/// Offsets of every page needed to cover `total` items with pages of `limit`.
pub fn page_offsets(total: u32, limit: u32) -> Vec<u32> {
    if limit == 0 {
        return Vec::new();
    }
    (0..total).step_by(limit as usize).collect()
}

pub fn default_backup_name(now: NaiveDateTime) -> String {
    format!("Backup {}", now.format("%Y-%m-%d %H:%M"))
}

pub fn default_backup_name_now() -> String {
    default_backup_name(Local::now().naive_local())
}

/// Trims `value` to at most `max` characters, marking the cut with `…`.
pub fn truncate(value: &str, max: usize) -> String {
    if value.chars().count() <= max {
        return value.to_string();
    }
    let mut out: String = value.chars().take(max.saturating_sub(1)).collect();
    out.push('…');
    out
}

pub fn spinner(message: impl Into<Cow<'static, str>>) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    pb.set_message(message);
    pb.enable_steady_tick(Duration::from_millis(100));
    if let Ok(style) = ProgressStyle::with_template("{spinner:.blue} {msg}") {
        pb.set_style(style.tick_chars("⠋⠙⠹⠸⠼⠴⠦⠧⠇⠏"));
    }
    pb
}
