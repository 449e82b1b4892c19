use std::io::{self, Write};

use serde::Serialize;

use crate::app::{
    EnsureAction, EnsureResult, InfoResult, LoadSummary, LocalListResult, ProgressEvent,
    ProgressSink, RemoteListResult, RemoveResult,
};

#[derive(Debug, Clone, Copy)]
pub enum OutputMode {
    Interactive,
    NonInteractive,
}

pub struct JsonOutput;

impl JsonOutput {
    pub fn print<T: Serialize>(value: &T) -> io::Result<()> {
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

/// Plain text summaries on stdout, progress lines on stderr.
pub struct HumanOutput;

impl HumanOutput {
    pub fn print_ensure(result: &EnsureResult) {
        match (result.action, &result.provider) {
            (EnsureAction::Downloaded, Some(provider)) => {
                println!("downloaded {} from {provider}", result.name)
            }
            (EnsureAction::Downloaded, None) => println!("downloaded {}", result.name),
            (EnsureAction::Cached, _) => println!("{} already present", result.name),
        }
        println!("  path: {}", result.path);
    }

    pub fn print_remote(result: &RemoteListResult) {
        println!("datasets on {} ({}):", result.provider, result.datasets.len());
        for entry in &result.datasets {
            let size = entry
                .info
                .size
                .map(|size| format!(" [{}]", human_size(size)))
                .unwrap_or_default();
            match &entry.info.description {
                Some(description) => println!("  {}{size}  {description}", entry.name),
                None => println!("  {}{size}", entry.name),
            }
        }
    }

    pub fn print_local(result: &LocalListResult) {
        println!("{}", result.datasets_path);
        if result.datasets.is_empty() {
            println!("  (no datasets downloaded)");
        }
        for name in &result.datasets {
            println!("  {name}");
        }
    }

    pub fn print_info(result: &InfoResult) {
        println!("{}", result.name);
        println!("  path: {}", result.path);
        println!("  size: {}", human_size(result.size));
    }

    pub fn print_remove(result: &RemoveResult) {
        if result.removed {
            println!("removed {}", result.name);
        } else {
            println!("{} was not present", result.name);
        }
    }

    pub fn print_load(summary: &LoadSummary) {
        println!("{}: {} elements", summary.name, summary.elements);
        println!("  path: {}", summary.path);
        if let (Some(min), Some(max)) = (summary.nodes_min, summary.nodes_max) {
            println!("  nodes per graph: {min}..={max}");
        }
        if !summary.importances.is_empty() {
            println!("  importances: {}", summary.importances.join(", "));
        }
        for skipped in &summary.skipped {
            println!("  skipped {}: {}", skipped.index, skipped.reason);
        }
    }
}

impl ProgressSink for HumanOutput {
    fn event(&self, event: ProgressEvent) {
        match event.elapsed {
            Some(elapsed) => eprintln!("{} ({:.1}s)", event.message, elapsed.as_secs_f64()),
            None => eprintln!("{}", event.message),
        }
    }
}

fn human_size(bytes: u64) -> String {
    const UNITS: [&str; 4] = ["B", "KiB", "MiB", "GiB"];
    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{bytes} B")
    } else {
        format!("{value:.1} {}", UNITS[unit])
    }
}
