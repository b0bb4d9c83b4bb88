use std::fmt;

use log::debug;

use sensorgraph_log::{SensorLog, Walker};
use sensorgraph_primitives::{Reading, Selector};

use crate::error::GraphError;

/// Automatic triggering rule of a streamer.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StreamerTrigger {
    /// Fire on every n-th evaluation that finds data.
    Periodic(u32),
    /// Fire once the selector has at least n unreported readings.
    OnCount(u32),
    /// Fire only when manually marked.
    ManualOnly,
}

/// How a streamer's report payload is laid out.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ReportFormat {
    /// One report per reading.
    Individual,
    /// All selected readings in one checksummed list.
    HashedList,
}

/// Whether a report is addressed or broadcast.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ReportType {
    Telegram,
    Broadcast,
}

/// A rule that periodically assembles readings matching a selector into an
/// outbound report.
///
/// A streamer owns a walker over its selector; "has data" means that walker
/// sees at least one unreported reading. Once a streamer is selected by
/// `check_streamers` it stays *armed* (and is not selected again) until its
/// report is built, which drains the walker.
#[derive(Debug)]
pub struct Streamer {
    selector: Selector,
    trigger: StreamerTrigger,
    format: ReportFormat,
    report_type: ReportType,
    with_other: Option<usize>,
    index: usize,
    walker: Option<Walker>,
    armed: bool,
    ticks: u32,
}

/// The readings a fired streamer hands to the transport layer.
#[derive(Debug)]
pub struct Report {
    pub streamer: usize,
    pub format: ReportFormat,
    pub report_type: ReportType,
    pub readings: Vec<Reading>,
}

impl Streamer {
    pub fn new(selector: Selector, trigger: StreamerTrigger, format: ReportFormat, report_type: ReportType) -> Self {
        Self {
            selector,
            trigger,
            format,
            report_type,
            with_other: None,
            index: 0,
            walker: None,
            armed: false,
            ticks: 0,
        }
    }

    /// Couple this streamer to a leader: it fires whenever the leader does,
    /// provided it has data of its own.
    pub fn with_other(mut self, leader: usize) -> Self {
        self.with_other = Some(leader);
        self
    }

    pub fn selector(&self) -> Selector {
        self.selector
    }

    pub fn trigger(&self) -> StreamerTrigger {
        self.trigger
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub(crate) fn leader(&self) -> Option<usize> {
        self.with_other
    }

    pub(crate) fn link_to_storage(&mut self, log: &SensorLog, index: usize) {
        self.walker = Some(log.create_walker(self.selector, false));
        self.index = index;
    }

    pub(crate) fn unlink(&mut self, log: &SensorLog) {
        if let Some(walker) = self.walker.take() {
            log.destroy_walker(walker);
        }
    }

    /// Whether the selector has unreported readings.
    pub fn has_data(&self) -> bool {
        self.walker.as_ref().is_some_and(|w| w.count() >= 1)
    }

    pub(crate) fn advance_tick(&mut self) {
        self.ticks = self.ticks.saturating_add(1);
    }

    /// Whether this streamer should fire now.
    ///
    /// An armed streamer never re-fires; it first has to deliver its pending
    /// report.
    pub fn triggered(&self, manual: bool) -> bool {
        if self.armed || !self.has_data() {
            return false;
        }
        manual
            || match self.trigger {
                StreamerTrigger::Periodic(interval) => self.ticks >= interval,
                StreamerTrigger::OnCount(count) => {
                    self.walker.as_ref().is_some_and(|w| w.count() >= count)
                }
                StreamerTrigger::ManualOnly => false,
            }
    }

    pub(crate) fn arm(&mut self) {
        debug!("streamer {} armed", self.index);
        self.armed = true;
        self.ticks = 0;
    }

    /// Drain the walker into a report and disarm.
    pub fn build_report(&mut self) -> Result<Report, GraphError> {
        let walker = self.walker.as_ref().ok_or(GraphError::UnlinkedStreamer { index: self.index })?;
        let mut readings = Vec::new();
        if self.selector.inexhaustible() {
            // A constant selector never drains; report its current value once.
            readings.push(walker.pop()?);
        } else {
            readings.reserve(walker.count() as usize);
            while let Ok(reading) = walker.pop() {
                readings.push(reading);
            }
        }
        self.armed = false;
        debug!("streamer {} built a report of {} readings", self.index, readings.len());
        Ok(Report {
            streamer: self.index,
            format: self.format,
            report_type: self.report_type,
            readings,
        })
    }
}

impl fmt::Display for Streamer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let trigger = match self.trigger {
            StreamerTrigger::Periodic(n) => format!("every {n} checks"),
            StreamerTrigger::OnCount(n) => format!("on {n} readings"),
            StreamerTrigger::ManualOnly => "manual".to_string(),
        };
        let format = match self.format {
            ReportFormat::Individual => "individual",
            ReportFormat::HashedList => "hashedlist",
        };
        let report_type = match self.report_type {
            ReportType::Telegram => "telegram",
            ReportType::Broadcast => "broadcast",
        };
        write!(f, "{} from `{}` as {format} {report_type}", trigger, self.selector)?;
        if let Some(leader) = self.with_other {
            write!(f, " with streamer {leader}")?;
        }
        Ok(())
    }
}
