use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::io::{self, BufRead};
use std::path::PathBuf;
use std::sync::Arc;

use stream_mux::{Connection, ConnectionId};
use thiserror::Error;

pub const HELP: &str = "
Command List:
subscribe <channel_name>
disconnect <reader_idx>
bulk <file_name>
active: display details about active connections
help: Display this help text
quit: Exit the program
";

/// One line typed at the prompt
#[derive(Debug, PartialEq, Eq)]
pub enum Command {
    Subscribe(String),
    Disconnect(ConnectionId),
    Bulk(PathBuf),
    Active,
    Help,
    Quit,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CommandError {
    #[error("bad arguments")]
    BadArguments,
    #[error("unknown command: {0}")]
    Unknown(String),
}

impl Command {
    /// Parse a prompt line; `Ok(None)` for a blank line
    pub fn parse(line: &str) -> Result<Option<Command>, CommandError> {
        let mut words = line.split_whitespace();
        let Some(verb) = words.next() else {
            return Ok(None);
        };
        let arg = words.next();

        let command = match verb {
            "subscribe" => Command::Subscribe(arg.ok_or(CommandError::BadArguments)?.to_string()),
            "disconnect" => {
                let id = arg
                    .and_then(|a| a.parse().ok())
                    .ok_or(CommandError::BadArguments)?;
                Command::Disconnect(ConnectionId(id))
            }
            "bulk" => Command::Bulk(PathBuf::from(arg.ok_or(CommandError::BadArguments)?)),
            "active" => Command::Active,
            "help" => Command::Help,
            "quit" => Command::Quit,
            other => return Err(CommandError::Unknown(other.to_string())),
        };
        Ok(Some(command))
    }
}

/// Read one prompt line, decoding invalid UTF-8 lossily; `Ok(None)` at end
/// of input
pub fn read_prompt_line<R: BufRead>(input: &mut R) -> io::Result<Option<String>> {
    let mut buf = Vec::new();
    if input.read_until(b'\n', &mut buf)? == 0 {
        return Ok(None);
    }
    Ok(Some(String::from_utf8_lossy(&buf).into_owned()))
}

/// Render the `active` listing: id padded to ten columns, channel, status
pub fn format_active(connections: &BTreeMap<ConnectionId, Arc<Connection>>) -> String {
    let mut out = String::new();
    for (id, connection) in connections {
        let _ = write!(
            out,
            "{:<10}{} ({})",
            id.to_string(),
            connection.subscription().channel(),
            connection.status()
        );
        if connection.send_failed() {
            out.push_str(" [subscription not sent]");
        }
        out.push('\n');
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use stream_mux::{EventHandler, Subscription, TransportHandle};

    struct Discard;

    impl EventHandler for Discard {
        fn handle_new_message(&self, _payload: String) {}
        fn handle_log(&self, _text: String) {}
    }

    #[test]
    fn test_parse_subscribe() {
        assert_eq!(
            Command::parse("  subscribe live_trades_btcusd  "),
            Ok(Some(Command::Subscribe("live_trades_btcusd".into())))
        );
        assert_eq!(Command::parse("subscribe"), Err(CommandError::BadArguments));
    }

    #[test]
    fn test_parse_disconnect() {
        assert_eq!(
            Command::parse("disconnect 3"),
            Ok(Some(Command::Disconnect(ConnectionId(3))))
        );
        assert_eq!(Command::parse("disconnect x"), Err(CommandError::BadArguments));
        assert_eq!(Command::parse("disconnect -1"), Err(CommandError::BadArguments));
    }

    #[test]
    fn test_parse_simple_verbs() {
        assert_eq!(Command::parse("active"), Ok(Some(Command::Active)));
        assert_eq!(Command::parse("help"), Ok(Some(Command::Help)));
        assert_eq!(Command::parse("quit"), Ok(Some(Command::Quit)));
        assert_eq!(
            Command::parse("bulk channels.txt"),
            Ok(Some(Command::Bulk(PathBuf::from("channels.txt"))))
        );
    }

    #[test]
    fn test_parse_blank_and_unknown() {
        assert_eq!(Command::parse("   "), Ok(None));
        assert_eq!(
            Command::parse("dance"),
            Err(CommandError::Unknown("dance".into()))
        );
    }

    #[test]
    fn test_invalid_utf8_line_does_not_end_the_prompt() {
        let mut input = io::Cursor::new(b"help\n\xff\nactive\nquit".to_vec());
        let mut commands = Vec::new();
        while let Some(line) = read_prompt_line(&mut input).unwrap() {
            commands.push(Command::parse(&line));
        }

        assert_eq!(
            commands,
            vec![
                Ok(Some(Command::Help)),
                Err(CommandError::Unknown("\u{FFFD}".into())),
                Ok(Some(Command::Active)),
                Ok(Some(Command::Quit)),
            ]
        );
    }

    #[test]
    fn test_format_active() {
        let mut connections = BTreeMap::new();
        for (id, channel) in [(1, "live_trades_btcusd"), (12, "order_book_ethusd")] {
            connections.insert(
                ConnectionId(id),
                Arc::new(Connection::new(
                    ConnectionId(id),
                    TransportHandle(id),
                    Subscription::new(channel),
                    Arc::new(Discard),
                )),
            );
        }

        assert_eq!(
            format_active(&connections),
            "1         live_trades_btcusd (connecting)\n\
             12        order_book_ethusd (connecting)\n"
        );
    }
}
