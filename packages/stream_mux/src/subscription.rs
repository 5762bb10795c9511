use serde::Serialize;

/// Event name the endpoint expects on a channel join
const SUBSCRIBE_EVENT: &str = "bts:subscribe";

#[derive(Serialize)]
struct JoinRequest<'a> {
    event: &'a str,
    data: JoinData<'a>,
}

#[derive(Serialize)]
struct JoinData<'a> {
    channel: &'a str,
}

/// Which logical channel a connection joins, and how the join payload looks
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Subscription {
    channel: String,
}

impl Subscription {
    pub fn new(channel: impl Into<String>) -> Self {
        Self {
            channel: channel.into(),
        }
    }

    /// Render the join request sent once the connection opens
    pub fn generate_request(&self) -> String {
        let request = JoinRequest {
            event: SUBSCRIBE_EVENT,
            data: JoinData {
                channel: &self.channel,
            },
        };
        // Serializing two borrowed strings cannot fail.
        serde_json::to_string(&request).unwrap_or_default()
    }

    pub fn channel(&self) -> &str {
        &self.channel
    }
}
