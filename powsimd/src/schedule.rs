//! The workload schedule driver.
//!
//! A schedule is a text file of externally injected events, one per line:
//!
//! ```text
//! # <time_seconds> <node> <command> [p1,p2,...]
//! 1 0 new_block
//! 2 0 tx 1,10
//! ```
//!
//! Times are relative to the moment the schedule is loaded. The command
//! vocabulary is open at this layer; nodes drop commands they do not
//! recognize.

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use thiserror::Error;
use tracing::warn;

use powsim_network::{NodeId, SimTime};

/// An error reading the schedule file. Parse problems are not errors:
/// malformed lines are logged and dropped.
#[derive(Error, Debug)]
pub enum ScheduleError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// One parsed schedule line: deliver `command(params)` to `node` at `time`
/// seconds after the schedule starts.
#[derive(Clone, Debug, PartialEq)]
pub struct ScheduleEntry {
    pub time: SimTime,
    pub node: NodeId,
    pub command: String,
    pub params: Vec<i64>,
}

/// Read and parse a schedule file.
pub fn read_schedule(path: impl AsRef<Path>) -> Result<Vec<ScheduleEntry>, ScheduleError> {
    let reader = BufReader::new(File::open(path)?);
    parse_schedule(reader)
}

/// Parse a schedule, skipping blank lines and `#` comments.
pub fn parse_schedule(reader: impl BufRead) -> Result<Vec<ScheduleEntry>, ScheduleError> {
    let mut entries = Vec::new();
    for (number, line) in reader.lines().enumerate() {
        let line = line?;
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }
        match parse_line(trimmed) {
            Some(entry) => entries.push(entry),
            None => warn!(line = number + 1, "malformed schedule line dropped"),
        }
    }
    Ok(entries)
}

fn parse_line(line: &str) -> Option<ScheduleEntry> {
    let mut fields = line.split_whitespace();
    let time = fields.next()?.parse().ok()?;
    let node = fields.next()?.parse().ok()?;
    let command = fields.next()?.to_string();
    let params = match fields.next() {
        Some(list) => list
            .split(',')
            .map(|token| token.trim().parse().ok())
            .collect::<Option<Vec<i64>>>()?,
        None => Vec::new(),
    };
    Some(ScheduleEntry {
        time,
        node,
        command,
        params,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_commands_with_and_without_params() {
        powsim_test::init();

        let schedule = "\
# mining workload
1 0 new_block

2 0 tx 1,10
";
        let entries = parse_schedule(schedule.as_bytes()).unwrap();
        assert_eq!(
            entries,
            vec![
                ScheduleEntry {
                    time: 1,
                    node: 0,
                    command: "new_block".to_string(),
                    params: vec![],
                },
                ScheduleEntry {
                    time: 2,
                    node: 0,
                    command: "tx".to_string(),
                    params: vec![1, 10],
                },
            ]
        );
    }

    #[test]
    fn malformed_lines_are_dropped() {
        powsim_test::init();

        let schedule = "\
not a number 0 tx
1 0 tx 1,oops
3 1 new_block
";
        let entries = parse_schedule(schedule.as_bytes()).unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].command, "new_block");
    }
}
