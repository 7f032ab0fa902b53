// THEORY:
// Per-trial reporting. Every trial produces exactly one `TrialReport`, whether or not
// anything was detected. Where the rows go is up to the `ReportSink`: tests keep them
// in a `Vec`, the runner writes them through `CsvReport`.

use crate::error::Result;
use std::io::Write;
use std::time::Duration;

/// One row of results: the configuration a trial ran with and how it scored.
#[derive(Debug, Clone, PartialEq)]
pub struct TrialReport {
    /// 1-based trial number across the whole run.
    pub iteration: u64,
    /// The parameter being tuned during this trial.
    pub parameter: String,
    /// Every tuned parameter's value during this trial, in tuning order.
    pub values: Vec<(String, f64)>,
    /// Average quality of the trial's recent detections.
    pub quality: f64,
    pub detected_frames: u64,
    pub total_frames: u64,
    /// Frames that actually reached the scorer. Below `total_frames` when a source
    /// failed or yielded fewer frames than it announced.
    pub scored_frames: u64,
    /// The score this trial measured, before any rollback.
    pub score: f64,
    pub elapsed: Duration,
}

impl TrialReport {
    /// Processing rate of the trial, in frames per second.
    pub fn fps(&self) -> f64 {
        let secs = self.elapsed.as_secs_f64();
        if secs <= 0.0 {
            return 0.0;
        }
        self.total_frames as f64 / secs
    }
}

/// Receives one row per trial.
pub trait ReportSink {
    fn record(&mut self, report: &TrialReport) -> Result<()>;
}

impl ReportSink for Vec<TrialReport> {
    fn record(&mut self, report: &TrialReport) -> Result<()> {
        self.push(report.clone());
        Ok(())
    }
}

/// Writes trial rows as comma separated text, header first.
pub struct CsvReport<W: Write> {
    writer: W,
    header_written: bool,
}

impl<W: Write> CsvReport<W> {
    pub fn new(writer: W) -> Self {
        Self {
            writer,
            header_written: false,
        }
    }

    pub fn into_inner(self) -> W {
        self.writer
    }

    fn write_header(&mut self, report: &TrialReport) -> Result<()> {
        write!(self.writer, "iteration,")?;
        for (name, _) in &report.values {
            write!(self.writer, "{name},")?;
        }
        writeln!(self.writer, "quality,detected frames,total frames,score,runtime,fps")?;
        Ok(())
    }
}

impl<W: Write> ReportSink for CsvReport<W> {
    fn record(&mut self, report: &TrialReport) -> Result<()> {
        if !self.header_written {
            self.write_header(report)?;
            self.header_written = true;
        }

        write!(self.writer, "{},", report.iteration)?;
        for (_, value) in &report.values {
            write!(self.writer, "{value:.4},")?;
        }
        writeln!(
            self.writer,
            "{:.4},{},{},{:.4},{:.2},{:.2}",
            report.quality,
            report.detected_frames,
            report.total_frames,
            report.score,
            report.elapsed.as_secs_f64(),
            report.fps()
        )?;
        // Rows must survive an interrupted run.
        self.writer.flush()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(iteration: u64, value: f64) -> TrialReport {
        TrialReport {
            iteration,
            parameter: "kanglewindow".into(),
            values: vec![("kanglewindow".into(), value), ("kellipseheight".into(), 60.0)],
            quality: 71.25,
            detected_frames: 90,
            total_frames: 100,
            scored_frames: 100,
            score: 79.875,
            elapsed: Duration::from_millis(2500),
        }
    }

    #[test]
    fn csv_has_one_header_and_one_line_per_trial() {
        let mut csv = CsvReport::new(Vec::new());
        csv.record(&row(1, 80.0)).unwrap();
        csv.record(&row(2, 83.6)).unwrap();
        let text = String::from_utf8(csv.into_inner()).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 3);
        assert_eq!(
            lines[0],
            "iteration,kanglewindow,kellipseheight,quality,detected frames,total frames,score,runtime,fps"
        );
        assert_eq!(lines[1], "1,80.0000,60.0000,71.2500,90,100,79.8750,2.50,40.00");
        assert!(lines[2].starts_with("2,83.6000,"));
    }

    #[test]
    fn zero_elapsed_has_zero_fps() {
        let mut r = row(1, 1.0);
        r.elapsed = Duration::ZERO;
        assert_eq!(r.fps(), 0.0);
    }
}
