//! Styled terminal output

use console::style;
use droidprobe::{Element, Handle, StabilizeReport};
use std::io::Write;

/// Writes styled status lines. Styling follows console's color detection,
/// so piped output stays plain.
#[derive(Debug)]
pub struct Printer<W: Write> {
    out: W,
}

impl<W: Write> Printer<W> {
    /// Wrap a writer
    pub const fn new(out: W) -> Self {
        Self { out }
    }

    /// Unwrap the writer
    pub fn into_inner(self) -> W {
        self.out
    }

    /// Plain line
    pub fn line(&mut self, text: &str) -> std::io::Result<()> {
        writeln!(self.out, "{text}")
    }

    /// Success line
    pub fn success(&mut self, message: &str) -> std::io::Result<()> {
        writeln!(self.out, "{} {message}", style("✓").green().bold())
    }

    /// Failure line
    pub fn failure(&mut self, message: &str) -> std::io::Result<()> {
        writeln!(self.out, "{} {message}", style("✗").red().bold())
    }

    /// Informational line
    pub fn info(&mut self, message: &str) -> std::io::Result<()> {
        writeln!(self.out, "{} {message}", style("ℹ").blue().bold())
    }

    /// Key/value detail line
    pub fn detail(&mut self, key: &str, value: &str) -> std::io::Result<()> {
        writeln!(self.out, "  {:<10} {value}", style(key).dim())
    }

    /// Attributes of an element
    pub fn element(&mut self, element: &Element) -> std::io::Result<()> {
        self.detail("class", &element.class_name)?;
        if !element.text.is_empty() {
            self.detail("text", &element.text)?;
        }
        if !element.content_desc.is_empty() {
            self.detail("desc", &element.content_desc)?;
        }
        if !element.resource_id.is_empty() {
            self.detail("id", &element.resource_id)?;
        }
        self.detail("bounds", &element.bounds.to_string())
    }

    /// A resolved handle
    pub fn handle(&mut self, handle: &Handle) -> std::io::Result<()> {
        self.success(&format!(
            "found {} by {}",
            style(&handle.target).bold(),
            handle.strategy
        ))?;
        self.element(&handle.element)?;
        let center = handle.center();
        self.detail("center", &format!("{},{}", center.x, center.y))
    }

    /// Summary of a stabilization run
    pub fn stabilized(&mut self, report: &StabilizeReport) -> std::io::Result<()> {
        if report.was_clean() {
            return self.success("screen stable, no popups");
        }
        self.success(&format!(
            "screen stable after {} cycle(s), {} tap(s)",
            report.cycles, report.taps
        ))?;
        for name in &report.dismissed {
            self.detail("dismissed", name)?;
        }
        Ok(())
    }
}
