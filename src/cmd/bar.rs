//! Terminal rendering of pipeline progress, built on indicatif.

use crate::progress::ProgressSink;
use indicatif::{ProgressBar, ProgressStyle};
use std::time::Duration;

/// Progress-bar sink for interactive runs.
pub struct BarSink {
    bar: Option<ProgressBar>,
    chunks_total: u64,
}

impl BarSink {
    pub fn new() -> Self {
        Self {
            bar: None,
            chunks_total: 0,
        }
    }
}

impl Default for BarSink {
    fn default() -> Self {
        Self::new()
    }
}

impl ProgressSink for BarSink {
    fn begin(&mut self, table: &str, total_rows: u64, start_chunk: u64, chunks_total: u64, chunk_rows: u64) {
        if start_chunk > 0 {
            println!("  resuming {} from chunk {}", table, start_chunk);
        }
        self.chunks_total = chunks_total;

        let bar = ProgressBar::new(total_rows);
        bar.set_style(
            ProgressStyle::with_template(
                "{spinner:.green} {prefix:.bold.cyan} [{bar:40.cyan/blue}] {percent:>3}% {human_pos}/{human_len} rows [{elapsed_precise}] {msg}",
            )
            .unwrap()
            .progress_chars("█▓▒░  ")
            .tick_chars("⠋⠙⠹⠸⠼⠴⠦⠧⠇⠏"),
        );
        bar.set_prefix(table.to_string());
        bar.set_position((start_chunk * chunk_rows).min(total_rows));
        bar.set_message(format!("chunk {}/{}", start_chunk, chunks_total));
        bar.enable_steady_tick(Duration::from_millis(100));
        self.bar = Some(bar);
    }

    fn update(&mut self, rows_done: u64, chunk_idx: u64, speed: &str) {
        if let Some(bar) = &self.bar {
            bar.set_position(rows_done);
            if speed.is_empty() {
                bar.set_message(format!("chunk {}/{}", chunk_idx, self.chunks_total));
            } else {
                bar.set_message(format!("chunk {}/{} at {}", chunk_idx, self.chunks_total, speed));
            }
        }
    }

    fn end(&mut self) {
        if let Some(bar) = self.bar.take() {
            bar.finish_and_clear();
        }
    }
}
