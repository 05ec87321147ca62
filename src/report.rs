//! Throughput accounting and strategy comparison.

use crate::{Role, TaskResult};
use std::fmt;
use std::time::Duration;

/// Operations completed per role over a measured window.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Throughput {
    pub reads: u64,
    pub writes: u64,
    pub duration: Duration,
}

impl Throughput {
    pub fn new(reads: u64, writes: u64, duration: Duration) -> Self {
        Self {
            reads,
            writes,
            duration,
        }
    }

    /// Sums the results of every task by role.
    pub fn from_results<'a, I>(results: I, duration: Duration) -> Self
    where
        I: IntoIterator<Item = &'a TaskResult>,
    {
        let (reads, writes) = results
            .into_iter()
            .fold((0, 0), |(reads, writes), result| match result.role {
                Role::Reader => (reads + result.ops, writes),
                Role::Writer => (reads, writes + result.ops),
            });
        Self::new(reads, writes, duration)
    }

    pub fn total(&self) -> u64 {
        self.reads + self.writes
    }

    pub fn reads_per_sec(&self) -> f64 {
        per_sec(self.reads, self.duration)
    }

    pub fn writes_per_sec(&self) -> f64 {
        per_sec(self.writes, self.duration)
    }

    pub fn ops_per_sec(&self) -> f64 {
        per_sec(self.total(), self.duration)
    }
}

fn per_sec(count: u64, duration: Duration) -> f64 {
    let secs = duration.as_secs_f64();
    if secs > 0.0 {
        count as f64 / secs
    } else {
        0.0
    }
}

/// `numerator / denominator`, where zero over zero is even and anything else over zero is infinite.
fn ratio(numerator: f64, denominator: f64) -> f64 {
    if denominator > 0.0 {
        numerator / denominator
    } else if numerator > 0.0 {
        f64::INFINITY
    } else {
        1.0
    }
}

/// The throughput of one strategy's run.
#[derive(Debug, Clone, PartialEq)]
pub struct Report {
    pub strategy: String,
    pub throughput: Throughput,
}

impl Report {
    pub fn new(strategy: impl Into<String>, throughput: Throughput) -> Self {
        Self {
            strategy: strategy.into(),
            throughput,
        }
    }
}

impl fmt::Display for Report {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{} Results:", self.strategy)?;
        writeln!(f, "  Total Reads: {}", self.throughput.reads)?;
        writeln!(f, "  Total Writes: {}", self.throughput.writes)?;
        writeln!(f, "  Reads/sec: {:.2}", self.throughput.reads_per_sec())?;
        write!(f, "  Writes/sec: {:.2}", self.throughput.writes_per_sec())
    }
}

/// Which of two strategies won one operation category.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Verdict<'a> {
    Equal,
    Faster {
        faster: &'a str,
        slower: &'a str,
        factor: f64,
    },
}

impl<'a> Verdict<'a> {
    fn between(a: (&'a str, f64), b: (&'a str, f64)) -> Self {
        let ((faster, fast), (slower, slow)) = match a.1.partial_cmp(&b.1) {
            Some(std::cmp::Ordering::Greater) => (a, b),
            Some(std::cmp::Ordering::Less) => (b, a),
            _ => return Verdict::Equal,
        };
        Verdict::Faster {
            faster,
            slower,
            factor: ratio(fast, slow),
        }
    }

    pub fn faster(&self) -> Option<&'a str> {
        match self {
            Verdict::Equal => None,
            Verdict::Faster { faster, .. } => Some(*faster),
        }
    }
}

impl fmt::Display for Verdict<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Verdict::Equal => f.write_str("both strategies were equally fast"),
            Verdict::Faster {
                faster,
                slower,
                factor,
            } => write!(f, "{faster} was {factor:.2}x faster than {slower}"),
        }
    }
}

/// Compares a candidate strategy's report against a baseline.
///
/// Reads and writes are judged independently; they need not favor the same side.
#[derive(Debug, Clone, Copy)]
pub struct Comparison<'a> {
    baseline: &'a Report,
    candidate: &'a Report,
}

impl<'a> Comparison<'a> {
    pub fn new(baseline: &'a Report, candidate: &'a Report) -> Self {
        Self {
            baseline,
            candidate,
        }
    }

    /// Candidate reads/sec over baseline reads/sec.
    pub fn read_ratio(&self) -> f64 {
        ratio(
            self.candidate.throughput.reads_per_sec(),
            self.baseline.throughput.reads_per_sec(),
        )
    }

    /// Candidate writes/sec over baseline writes/sec.
    pub fn write_ratio(&self) -> f64 {
        ratio(
            self.candidate.throughput.writes_per_sec(),
            self.baseline.throughput.writes_per_sec(),
        )
    }

    pub fn reads(&self) -> Verdict<'a> {
        Verdict::between(
            (
                self.baseline.strategy.as_str(),
                self.baseline.throughput.reads_per_sec(),
            ),
            (
                self.candidate.strategy.as_str(),
                self.candidate.throughput.reads_per_sec(),
            ),
        )
    }

    /// Judges reads and writes together, by operations per second.
    pub fn overall(&self) -> Verdict<'a> {
        Verdict::between(
            (
                self.baseline.strategy.as_str(),
                self.baseline.throughput.ops_per_sec(),
            ),
            (
                self.candidate.strategy.as_str(),
                self.candidate.throughput.ops_per_sec(),
            ),
        )
    }

    pub fn writes(&self) -> Verdict<'a> {
        Verdict::between(
            (
                self.baseline.strategy.as_str(),
                self.baseline.throughput.writes_per_sec(),
            ),
            (
                self.candidate.strategy.as_str(),
                self.candidate.throughput.writes_per_sec(),
            ),
        )
    }
}

impl fmt::Display for Comparison<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let (candidate, baseline) = (&self.candidate.strategy, &self.baseline.strategy);
        writeln!(
            f,
            "{candidate}/{baseline} reads ratio: {:.2}",
            self.read_ratio()
        )?;
        writeln!(
            f,
            "{candidate}/{baseline} writes ratio: {:.2}",
            self.write_ratio()
        )?;
        writeln!(f, "Reads: {}", self.reads())?;
        write!(f, "Writes: {}", self.writes())
    }
}
