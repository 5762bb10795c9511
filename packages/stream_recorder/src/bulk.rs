use std::io::BufRead;

use stream_mux::{ConnectionId, RegistryError, Subscription};

/// Outcome of one line of a bulk subscription file (lines are 1-based)
#[derive(Debug)]
pub enum BulkLine {
    Skipped { line: usize },
    Subscribed { channel: String, id: ConnectionId },
    Failed { line: usize, channel: String, error: RegistryError },
    /// Reading stopped here; later lines were not processed
    Unreadable { line: usize, error: std::io::Error },
}

/// Subscribe to every channel listed in `input`, one per line.
///
/// Lines are trimmed; blank lines and lines that are not valid UTF-8 are
/// skipped. A read error ends the load but keeps the outcomes so far.
pub fn load_bulk<R, F>(mut input: R, mut subscribe: F) -> Vec<BulkLine>
where
    R: BufRead,
    F: FnMut(Subscription) -> Result<ConnectionId, RegistryError>,
{
    let mut outcomes = Vec::new();
    let mut buf = Vec::new();
    let mut line_no = 0;
    loop {
        buf.clear();
        line_no += 1;
        match input.read_until(b'\n', &mut buf) {
            Ok(0) => break,
            Ok(_) => {}
            Err(error) => {
                outcomes.push(BulkLine::Unreadable { line: line_no, error });
                break;
            }
        }

        let channel = match std::str::from_utf8(&buf) {
            Ok(text) => text.trim(),
            Err(_) => "",
        };
        if channel.is_empty() {
            outcomes.push(BulkLine::Skipped { line: line_no });
            continue;
        }

        let outcome = match subscribe(Subscription::new(channel)) {
            Ok(id) => BulkLine::Subscribed {
                channel: channel.to_string(),
                id,
            },
            Err(error) => BulkLine::Failed {
                line: line_no,
                channel: channel.to_string(),
                error,
            },
        };
        outcomes.push(outcome);
    }
    outcomes
}

impl std::fmt::Display for BulkLine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BulkLine::Skipped { line } => write!(
                f,
                "[WARNING] cannot read data at line [{}], line skipped!",
                line
            ),
            BulkLine::Subscribed { channel, id } => write!(
                f,
                "[INFO] reader with id : [{}] is subscribing channel: {}",
                id, channel
            ),
            BulkLine::Failed { line, channel, error } => write!(
                f,
                "[Error] cannot subscribe to channel {} (line {}: {}) please refer to log file for more details",
                channel, line, error
            ),
            BulkLine::Unreadable { line, error } => write!(
                f,
                "[Error] cannot read line {}: {}, remaining lines ignored",
                line, error
            ),
        }
    }
}
