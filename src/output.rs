use std::io::{self, Write};

use serde::Serialize;

use crate::pipeline::{HarvestSummary, ProgressEvent, ProgressSink};

#[derive(Debug, Clone, Copy)]
pub enum OutputMode {
    Interactive,
    NonInteractive,
}

pub struct JsonOutput;

impl JsonOutput {
    pub fn print_summary(summary: &HarvestSummary) -> io::Result<()> {
        Self::print_json(summary)
    }

    fn print_json<T: Serialize>(value: &T) -> io::Result<()> {
        let json = serde_json::to_string_pretty(value).map_err(io::Error::other)?;
        let mut stdout = io::stdout();
        stdout.write_all(json.as_bytes())?;
        stdout.write_all(b"\n")?;
        Ok(())
    }
}

impl ProgressSink for JsonOutput {
    fn event(&self, _event: ProgressEvent) {}
}

/// Forwards progress events to the tracing subscriber.
pub struct LogProgress;

impl ProgressSink for LogProgress {
    fn event(&self, event: ProgressEvent) {
        match event.elapsed {
            Some(elapsed) => tracing::info!(
                elapsed_ms = elapsed.as_millis() as u64,
                "{}",
                event.message
            ),
            None => tracing::info!("{}", event.message),
        }
    }
}

pub struct HumanOutput;

impl HumanOutput {
    pub fn print_summary(summary: &HarvestSummary) -> io::Result<()> {
        let mut out = io::stdout().lock();
        Self::write_summary(&mut out, summary)
    }

    pub fn write_summary<W: Write>(out: &mut W, summary: &HarvestSummary) -> io::Result<()> {
        let green = "\x1b[32m";
        let yellow = "\x1b[33m";
        let cyan = "\x1b[36m";
        let reset = "\x1b[0m";

        writeln!(out, "{cyan}xeno-harvest summary{reset}")?;
        writeln!(out, "query: {}", summary.query)?;
        if summary.records == 0 {
            writeln!(
                out,
                "{yellow}No recordings found for the specified region.{reset}"
            )?;
            return Ok(());
        }
        writeln!(
            out,
            "recordings: {} (catalog total: {})",
            summary.records,
            summary
                .declared_total
                .map(|total| total.to_string())
                .unwrap_or_else(|| "n/a".to_string())
        )?;
        if summary.stop.is_partial() {
            writeln!(
                out,
                "{yellow}pagination stopped early: {:?}{reset}",
                summary.stop
            )?;
        }
        writeln!(out, "unique species: {}", summary.species.len())?;
        for (idx, species) in summary.species.iter().enumerate() {
            writeln!(out, "  {}. {species}", idx + 1)?;
        }

        let downloads = &summary.downloads;
        writeln!(
            out,
            "{green}downloaded: {} ({} new, {} already present){reset}",
            downloads.downloaded, downloads.fetched, downloads.already_present
        )?;
        if downloads.failed > 0 {
            writeln!(out, "{yellow}failed: {}{reset}", downloads.failed)?;
        }

        let organized = &summary.organized;
        writeln!(
            out,
            "{green}organized {} files into {} species folders ({} new copies){reset}",
            organized.organized,
            organized.category_count(),
            organized.copied
        )?;
        for (category, count) in organized.ranked_categories() {
            writeln!(out, "  {category}: {count} recordings")?;
        }
        writeln!(out, "raw downloads: {}", summary.raw_dir)?;
        writeln!(out, "organized by species: {}", summary.organized_dir)?;
        Ok(())
    }
}
