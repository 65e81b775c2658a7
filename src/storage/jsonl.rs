//! JSON Lines export of a swarm's trail
//!
//! One record per line, tagged with `"record": "event"` or
//! `"record": "observation"`, in the order they were written. Exports are
//! meant for offline analysis and for diffing two runs of the same swarm.

use crate::events::{Observation, SwarmEvent};
use crate::{BidSwarmError, Result};
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::Path;

/// One line of an export
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "record", rename_all = "snake_case")]
pub enum TrailRecord {
    Event(SwarmEvent),
    Observation(Observation),
}

/// Everything read back from an export
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Trail {
    pub events: Vec<SwarmEvent>,
    pub observations: Vec<Observation>,
}

impl Trail {
    pub fn len(&self) -> usize {
        self.events.len() + self.observations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn push(&mut self, record: TrailRecord) {
        match record {
            TrailRecord::Event(event) => self.events.push(event),
            TrailRecord::Observation(observation) => self.observations.push(observation),
        }
    }
}

/// Writes trail records to any sink
pub struct TrailWriter<W: Write> {
    sink: W,
    written: usize,
}

impl TrailWriter<BufWriter<File>> {
    /// Truncate or create `path`
    pub fn create(path: impl AsRef<Path>) -> Result<Self> {
        Ok(Self::new(BufWriter::new(File::create(path)?)))
    }
}

impl<W: Write> TrailWriter<W> {
    pub fn new(sink: W) -> Self {
        Self { sink, written: 0 }
    }

    pub fn event(&mut self, event: &SwarmEvent) -> Result<()> {
        self.line(&TrailRecord::Event(event.clone()))
    }

    pub fn observation(&mut self, observation: &Observation) -> Result<()> {
        self.line(&TrailRecord::Observation(observation.clone()))
    }

    fn line(&mut self, record: &TrailRecord) -> Result<()> {
        serde_json::to_writer(&mut self.sink, record)?;
        self.sink.write_all(b"\n")?;
        self.written += 1;
        Ok(())
    }

    /// Flush and return the number of records written
    pub fn finish(mut self) -> Result<usize> {
        self.sink.flush()?;
        Ok(self.written)
    }
}

/// Parse an export; blank lines are skipped and errors name the line
pub fn parse_trail(reader: impl BufRead) -> Result<Trail> {
    let mut trail = Trail::default();
    for (index, line) in reader.lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let record: TrailRecord = serde_json::from_str(&line).map_err(|e| {
            BidSwarmError::Persistence(format!("Invalid export line {}: {}", index + 1, e))
        })?;
        trail.push(record);
    }
    Ok(trail)
}

/// Write events then observations to a fresh file
pub fn export_trail(
    path: impl AsRef<Path>,
    events: &[SwarmEvent],
    observations: &[Observation],
) -> Result<usize> {
    let mut writer = TrailWriter::create(path)?;
    for event in events {
        writer.event(event)?;
    }
    for observation in observations {
        writer.observation(observation)?;
    }
    writer.finish()
}

pub fn export_events(path: impl AsRef<Path>, events: &[SwarmEvent]) -> Result<usize> {
    export_trail(path, events, &[])
}

pub fn read_trail(path: impl AsRef<Path>) -> Result<Trail> {
    parse_trail(BufReader::new(File::open(path)?))
}

/// Events of an export, ignoring observations
pub fn read_events(path: impl AsRef<Path>) -> Result<Vec<SwarmEvent>> {
    Ok(read_trail(path)?.events)
}

#[cfg(test)]
mod tests {
    use super::super::test_support::*;
    use super::*;
    use crate::events::{EventType, ObservationKind};
    use tempfile::NamedTempFile;

    #[test]
    fn test_export_and_read_back() {
        let file = NamedTempFile::new().unwrap();
        let events = vec![
            event(1, EventType::BidPlaced, "a", 1),
            event(2, EventType::BidWon, "a", 9),
        ];
        let observations = vec![observation("o-1", ObservationKind::OpportunityIdentified, 3)];

        assert_eq!(export_trail(file.path(), &events, &observations).unwrap(), 3);

        let trail = read_trail(file.path()).unwrap();
        assert_eq!(trail.events, events);
        assert_eq!(trail.observations, observations);
        assert_eq!(read_events(file.path()).unwrap(), events);

        let raw = std::fs::read_to_string(file.path()).unwrap();
        let first = raw.lines().next().unwrap();
        assert!(first.contains("\"record\":\"event\""));
        assert!(raw.contains("\"event_type\":\"BID_WON\""));
        assert!(raw.lines().last().unwrap().contains("\"record\":\"observation\""));
    }

    #[test]
    fn test_writer_counts_records_in_memory() {
        let mut writer = TrailWriter::new(Vec::new());
        writer.event(&event(1, EventType::OfferSubmitted, "a", 1)).unwrap();
        writer.event(&event(2, EventType::OfferAccepted, "a", 2)).unwrap();
        assert_eq!(writer.finish().unwrap(), 2);
    }

    #[test]
    fn test_blank_lines_are_skipped() {
        let mut buffer = Vec::new();
        {
            let mut writer = TrailWriter::new(&mut buffer);
            writer.event(&event(1, EventType::BidPlaced, "a", 1)).unwrap();
            writer.finish().unwrap();
        }
        buffer.extend_from_slice(b"\n  \n");
        {
            let mut writer = TrailWriter::new(&mut buffer);
            writer.event(&event(2, EventType::BidLost, "a", 2)).unwrap();
            writer.finish().unwrap();
        }

        let trail = parse_trail(buffer.as_slice()).unwrap();
        assert_eq!(trail.len(), 2);
        assert!(trail.observations.is_empty());
    }

    #[test]
    fn test_invalid_line_names_its_position() {
        let input = format!(
            "{}\n{{not json}}\n",
            serde_json::to_string(&TrailRecord::Event(event(1, EventType::BidPlaced, "a", 1)))
                .unwrap()
        );
        let err = parse_trail(input.as_bytes()).unwrap_err();
        assert!(err.to_string().contains("line 2"));
    }
}
