// One decoded DNS log line.

/// A DNS resolution as read from a log. `answers` and `ttls` are parallel lists;
/// the record source is responsible for keeping them the same length.
#[derive(Debug, Clone, PartialEq)]
pub struct DnsRecord {
    /// Epoch seconds, fractional.
    pub ts: f64,
    pub query: String,
    pub qtype: String,
    pub answers: Vec<String>,
    pub ttls: Vec<String>,
}
