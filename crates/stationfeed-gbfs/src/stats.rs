//! Per-run statistics and their summary table

use std::time::Duration;

use comfy_table::{Cell, Color, Table, modifiers::UTF8_ROUND_CORNERS, presets::UTF8_FULL};
use stationfeed_core::{fmt_bytes, fmt_num};

/// Counters from one refresh
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RunStats {
    /// Stations read from `data.stations`
    pub items_scanned: usize,
    /// Stations that passed the capacity filter (= CSV rows)
    pub rows_kept: usize,
    /// CSV blocks handed to the sink
    pub blocks: usize,
    /// Feed body bytes received
    pub bytes_in: u64,
    /// CSV bytes delivered
    pub bytes_out: u64,
    pub elapsed: Duration,
}

impl RunStats {
    pub fn format_table(&self, changed: bool) -> String {
        let mut table = Table::new();
        table
            .load_preset(UTF8_FULL)
            .apply_modifier(UTF8_ROUND_CORNERS)
            .set_header(vec![
                Cell::new("Refresh")
                    .fg(Color::Cyan)
                    .add_attribute(comfy_table::Attribute::Bold),
                Cell::new("Value").fg(Color::Cyan),
                Cell::new("%").fg(Color::Cyan),
            ]);

        if !changed {
            table.add_row(vec![
                Cell::new("Feed").fg(Color::Yellow),
                Cell::new("unchanged, artifact reused").fg(Color::Yellow),
                Cell::new(""),
            ]);
            return format!("\n{table}");
        }

        table.add_row(vec![
            Cell::new("Downloaded"),
            Cell::new(fmt_bytes(self.bytes_in)),
            Cell::new(""),
        ]);
        table.add_row(vec![
            Cell::new("Stations scanned"),
            Cell::new(fmt_num(self.items_scanned)),
            Cell::new(""),
        ]);
        table.add_row(vec![
            Cell::new("Rows kept").fg(Color::Green),
            Cell::new(fmt_num(self.rows_kept)).fg(Color::Green),
            Cell::new(format!("{:.1}", pct(self.rows_kept, self.items_scanned))).fg(Color::Green),
        ]);
        table.add_row(vec![
            Cell::new("CSV blocks"),
            Cell::new(fmt_num(self.blocks)),
            Cell::new(""),
        ]);
        table.add_row(vec![
            Cell::new("Delivered"),
            Cell::new(fmt_bytes(self.bytes_out)),
            Cell::new(""),
        ]);
        table.add_row(vec![
            Cell::new("Elapsed"),
            Cell::new(format!("{:.2}s", self.elapsed.as_secs_f64())),
            Cell::new(""),
        ]);

        format!("\n{table}")
    }

    /// One-line summary (non-TTY mode)
    pub fn log(&self, changed: bool) {
        if !changed {
            log::info!("Feed unchanged, reused previous artifact [{:.2}s]", self.elapsed.as_secs_f64());
            return;
        }
        log::info!(
            "Kept {} / {} stations ({:.1}%) in {} blocks, {} in, {} out [{:.2}s]",
            fmt_num(self.rows_kept),
            fmt_num(self.items_scanned),
            pct(self.rows_kept, self.items_scanned),
            self.blocks,
            fmt_bytes(self.bytes_in),
            fmt_bytes(self.bytes_out),
            self.elapsed.as_secs_f64()
        );
    }
}

fn pct(part: usize, total: usize) -> f64 {
    if total > 0 {
        part as f64 / total as f64 * 100.0
    } else {
        0.0
    }
}
