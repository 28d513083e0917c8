use crate::domain::models::{ContextDocument, ExtractionStatus};
use chrono::{DateTime, Local};
use crossterm::{
    ExecutableCommand,
    style::{Color, ResetColor, SetForegroundColor},
};
use log::{debug, info};
use std::collections::BTreeMap;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

pub trait OutputWriter {
    fn write(&self, content: &str) -> anyhow::Result<()>;
}

pub struct FileWriter {
    path: PathBuf,
}

impl FileWriter {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl OutputWriter for FileWriter {
    fn write(&self, content: &str) -> anyhow::Result<()> {
        debug!("Writing output to file: {}", self.path.display());
        fs::write(&self.path, content)?;
        info!("Output written to file: {}", self.path.display());
        Ok(())
    }
}

#[cfg(feature = "clipboard-support")]
pub struct ClipboardWriter;

#[cfg(feature = "clipboard-support")]
impl OutputWriter for ClipboardWriter {
    fn write(&self, content: &str) -> anyhow::Result<()> {
        use clipboard::{ClipboardContext, ClipboardProvider};

        debug!("Writing output to clipboard");
        let mut ctx: ClipboardContext = ClipboardProvider::new()
            .map_err(|e| anyhow::anyhow!("Failed to access clipboard: {}", e))?;
        ctx.set_contents(content.to_owned())
            .map_err(|e| anyhow::anyhow!("Failed to copy to clipboard: {}", e))?;
        info!("Output copied to clipboard (size: {} bytes)", content.len());
        Ok(())
    }
}

/// `{directory_name}_context_{YYYYmmdd_HHMMSS}.txt`. A root without a final
/// path component, such as `/`, is named `root`.
pub fn output_file_name(root_name: &str, now: DateTime<Local>) -> String {
    let stem = Path::new(root_name)
        .file_name()
        .and_then(|n| n.to_str())
        .filter(|n| !n.is_empty())
        .unwrap_or("root");
    format!("{}_context_{}.txt", stem, now.format("%Y%m%d_%H%M%S"))
}

/// The explicit path when given, otherwise a timestamped name in the current
/// working directory.
pub fn resolve_output_path(
    explicit: Option<&Path>,
    root_name: &str,
    now: DateTime<Local>,
) -> PathBuf {
    match explicit {
        Some(path) => path.to_path_buf(),
        None => PathBuf::from(output_file_name(root_name, now)),
    }
}

/// Writes the document to `path`, then optionally to the clipboard. A
/// clipboard failure does not undo the file write.
pub fn write_output(content: &str, path: &Path, clipboard_output: bool) -> anyhow::Result<()> {
    FileWriter::new(path).write(content)?;

    if clipboard_output {
        copy_to_clipboard(content)?;
    }
    Ok(())
}

#[cfg(feature = "clipboard-support")]
fn copy_to_clipboard(content: &str) -> anyhow::Result<()> {
    ClipboardWriter.write(content)
}

#[cfg(not(feature = "clipboard-support"))]
fn copy_to_clipboard(_content: &str) -> anyhow::Result<()> {
    anyhow::bail!("Clipboard support is not compiled in (enable the clipboard-support feature)")
}

pub fn format_size(bytes: u64) -> String {
    const UNITS: [&str; 4] = ["KB", "MB", "GB", "TB"];
    if bytes < 1024 {
        return format!("{} B", bytes);
    }
    let mut value = bytes as f64 / 1024.0;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    format!("{:.1} {}", value, UNITS[unit])
}

/// `1234567` as `1,234,567`.
pub fn format_count(n: usize) -> String {
    let digits = n.to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(c);
    }
    out
}

fn failure_lines(doc: &ContextDocument) -> Vec<String> {
    doc.failures()
        .map(|r| match &r.status {
            ExtractionStatus::Failed { kind, reason } => {
                format!("{} [{}]: {}", r.display_path, kind, reason)
            }
            ExtractionStatus::SkippedUnsupported { reason } => {
                format!("{} [Unsupported]: {}", r.display_path, reason)
            }
            ExtractionStatus::Ok => r.display_path.clone(),
        })
        .collect()
}

pub fn print_export_summary(doc: &ContextDocument, output_path: &Path) -> io::Result<()> {
    let stats = &doc.stats;
    let mut stdout = io::stdout();

    writeln!(stdout)?;
    stdout.execute(SetForegroundColor(Color::Green))?;
    writeln!(stdout, "✓ Context written to {}", output_path.display())?;
    stdout.execute(ResetColor)?;
    writeln!(
        stdout,
        "  Files: {} | Selected: {} | Extracted: {} | Skipped: {}",
        stats.file_count,
        format_size(stats.selected_bytes),
        format_size(stats.extracted_bytes as u64),
        stats.by_classification.skipped
    )?;
    let lines: usize = doc.results.iter().map(|r| r.text.lines().count()).sum();
    let chars: usize = doc.results.iter().map(|r| r.text.chars().count()).sum();
    writeln!(
        stdout,
        "  Lines: {} | Characters: {}",
        format_count(lines),
        format_count(chars)
    )?;

    let failures = failure_lines(doc);
    if !failures.is_empty() {
        stdout.execute(SetForegroundColor(Color::Yellow))?;
        writeln!(stdout, "  {} files failed to extract:", failures.len())?;
        stdout.execute(ResetColor)?;
        for line in failures {
            writeln!(stdout, "    - {}", line)?;
        }
    }
    Ok(())
}

pub fn print_extension_counts(counts: &BTreeMap<String, usize>) -> io::Result<()> {
    let mut stdout = io::stdout();
    stdout.execute(SetForegroundColor(Color::Cyan))?;
    writeln!(stdout, "Files found by extension:")?;
    stdout.execute(ResetColor)?;
    for (ext, count) in counts {
        writeln!(stdout, "  {:<10} {}", ext, count)?;
    }
    Ok(())
}
