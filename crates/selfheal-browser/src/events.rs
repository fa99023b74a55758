//! Ordered browser event log
//!
//! Console messages, network traffic and uncaught page errors are appended in
//! arrival order to three separate logs. Request/response pairing for timing
//! analysis relies on that order.

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

/// Raw event as reported by a backend
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum BrowserEvent {
    /// `console.*` call
    Console { level: String, text: String, ts: u64 },
    /// Uncaught error or unhandled rejection
    PageError { message: String, ts: u64 },
    /// Outgoing request
    Request { url: String, method: String, ts: u64 },
    /// Response received
    Response { url: String, status: u16, ts: u64 },
    /// Request failed before a response arrived
    RequestFailed { url: String, error: String, ts: u64 },
}

/// Console message
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConsoleMessage {
    pub level: String,
    pub text: String,
    pub ts: u64,
}

impl ConsoleMessage {
    /// Check if this is an error-level message
    #[inline]
    #[must_use]
    pub fn is_error(&self) -> bool {
        self.level.eq_ignore_ascii_case("error")
    }
}

/// Network log entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum NetworkEvent {
    Request { url: String, method: String, ts: u64 },
    Response { url: String, status: u16, ts: u64 },
    Failed { url: String, error: String, ts: u64 },
}

impl NetworkEvent {
    /// URL this entry refers to
    #[must_use]
    pub fn url(&self) -> &str {
        match self {
            Self::Request { url, .. } | Self::Response { url, .. } | Self::Failed { url, .. } => {
                url
            }
        }
    }
}

/// Uncaught page error
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageError {
    pub message: String,
    pub ts: u64,
}

/// Request paired with its response
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkTiming {
    pub url: String,
    pub method: String,
    /// `None` when the request failed without a response
    pub status: Option<u16>,
    pub duration_ms: u64,
}

impl NetworkTiming {
    /// Check if the call failed (no response or HTTP error status)
    #[inline]
    #[must_use]
    pub fn is_failure(&self) -> bool {
        self.status.map_or(true, |s| s >= 400)
    }
}

#[derive(Debug, Default)]
struct Logs {
    console: Vec<ConsoleMessage>,
    network: Vec<NetworkEvent>,
    page_errors: Vec<PageError>,
}

/// Append-only event log shared by the driver
#[derive(Debug, Default)]
pub struct EventLog {
    inner: Mutex<Logs>,
}

impl EventLog {
    /// Create empty log
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append one event to the matching log
    pub fn append(&self, event: BrowserEvent) {
        let mut guard = self.inner.lock();
        match event {
            BrowserEvent::Console { level, text, ts } => {
                guard.console.push(ConsoleMessage { level, text, ts });
            }
            BrowserEvent::PageError { message, ts } => {
                guard.page_errors.push(PageError { message, ts });
            }
            BrowserEvent::Request { url, method, ts } => {
                guard.network.push(NetworkEvent::Request { url, method, ts });
            }
            BrowserEvent::Response { url, status, ts } => {
                guard.network.push(NetworkEvent::Response { url, status, ts });
            }
            BrowserEvent::RequestFailed { url, error, ts } => {
                guard.network.push(NetworkEvent::Failed { url, error, ts });
            }
        }
    }

    /// Append events preserving their order
    pub fn extend(&self, events: impl IntoIterator<Item = BrowserEvent>) {
        for event in events {
            self.append(event);
        }
    }

    /// Console messages in arrival order
    #[must_use]
    pub fn console_messages(&self) -> Vec<ConsoleMessage> {
        self.inner.lock().console.clone()
    }

    /// Network events in arrival order
    #[must_use]
    pub fn network_events(&self) -> Vec<NetworkEvent> {
        self.inner.lock().network.clone()
    }

    /// Page errors in arrival order
    #[must_use]
    pub fn page_errors(&self) -> Vec<PageError> {
        self.inner.lock().page_errors.clone()
    }

    /// Total number of network entries
    #[must_use]
    pub fn network_len(&self) -> usize {
        self.inner.lock().network.len()
    }

    /// Number of page errors recorded so far
    #[must_use]
    pub fn page_error_count(&self) -> usize {
        self.inner.lock().page_errors.len()
    }

    /// Pair every response (or failure) with the nearest preceding unmatched
    /// request for the same URL
    #[must_use]
    pub fn network_timings(&self) -> Vec<NetworkTiming> {
        pair_timings(&self.inner.lock().network)
    }

    /// Timings slower than `threshold_ms`
    #[must_use]
    pub fn slow_requests(&self, threshold_ms: u64) -> Vec<NetworkTiming> {
        self.network_timings()
            .into_iter()
            .filter(|t| t.duration_ms > threshold_ms)
            .collect()
    }

    /// Drop everything recorded so far
    pub fn clear(&self) {
        *self.inner.lock() = Logs::default();
    }
}

fn pair_timings(network: &[NetworkEvent]) -> Vec<NetworkTiming> {
    // (url, method, ts, matched)
    let mut open: Vec<(&str, &str, u64, bool)> = Vec::new();
    let mut timings = Vec::new();

    for event in network {
        match event {
            NetworkEvent::Request { url, method, ts } => open.push((url, method, *ts, false)),
            NetworkEvent::Response { url, ts, .. } | NetworkEvent::Failed { url, ts, .. } => {
                let status = match event {
                    NetworkEvent::Response { status, .. } => Some(*status),
                    _ => None,
                };
                if let Some(req) = open
                    .iter_mut()
                    .rev()
                    .find(|entry| !entry.3 && entry.0 == url.as_str())
                {
                    req.3 = true;
                    timings.push(NetworkTiming {
                        url: url.clone(),
                        method: req.1.to_string(),
                        status,
                        duration_ms: ts.saturating_sub(req.2),
                    });
                }
            }
        }
    }

    timings
}

#[cfg(test)]
mod tests {
    use super::*;

    fn req(url: &str, ts: u64) -> BrowserEvent {
        BrowserEvent::Request {
            url: url.into(),
            method: "GET".into(),
            ts,
        }
    }

    fn res(url: &str, status: u16, ts: u64) -> BrowserEvent {
        BrowserEvent::Response {
            url: url.into(),
            status,
            ts,
        }
    }

    #[test]
    fn events_routed_to_separate_logs() {
        let log = EventLog::new();
        log.append(BrowserEvent::Console {
            level: "error".into(),
            text: "boom".into(),
            ts: 1,
        });
        log.append(req("/api/orders", 2));
        log.append(BrowserEvent::PageError {
            message: "TypeError".into(),
            ts: 3,
        });

        assert_eq!(log.console_messages().len(), 1);
        assert!(log.console_messages()[0].is_error());
        assert_eq!(log.network_events().len(), 1);
        assert_eq!(log.page_errors().len(), 1);
    }

    #[test]
    fn pairs_response_with_preceding_request() {
        let log = EventLog::new();
        log.extend([
            req("/api/orders", 100),
            req("/api/stock", 110),
            res("/api/stock", 200, 150),
            res("/api/orders", 500, 2_600),
        ]);

        let timings = log.network_timings();
        assert_eq!(timings.len(), 2);
        assert_eq!(timings[0].url, "/api/stock");
        assert_eq!(timings[0].duration_ms, 40);
        assert_eq!(timings[1].duration_ms, 2_500);
        assert!(timings[1].is_failure());
    }

    #[test]
    fn repeated_url_pairs_latest_open_request() {
        let log = EventLog::new();
        log.extend([
            req("/api/orders", 0),
            res("/api/orders", 200, 10),
            req("/api/orders", 20),
            res("/api/orders", 200, 70),
        ]);
        let timings = log.network_timings();
        assert_eq!(timings[0].duration_ms, 10);
        assert_eq!(timings[1].duration_ms, 50);
    }

    #[test]
    fn failed_request_has_no_status() {
        let log = EventLog::new();
        log.extend([
            req("/api/health", 0),
            BrowserEvent::RequestFailed {
                url: "/api/health".into(),
                error: "net::ERR_CONNECTION_REFUSED".into(),
                ts: 5,
            },
        ]);
        let timings = log.network_timings();
        assert_eq!(timings[0].status, None);
        assert!(timings[0].is_failure());
    }

    #[test]
    fn slow_requests_filters_by_threshold() {
        let log = EventLog::new();
        log.extend([
            req("/a", 0),
            res("/a", 200, 100),
            req("/b", 0),
            res("/b", 200, 3_000),
        ]);
        let slow = log.slow_requests(2_000);
        assert_eq!(slow.len(), 1);
        assert_eq!(slow[0].url, "/b");
    }

    #[test]
    fn event_deserializes_from_page_buffer() {
        let raw = r#"{"kind":"response","url":"/api/x","status":404,"ts":9}"#;
        let event: BrowserEvent = serde_json::from_str(raw).unwrap();
        assert_eq!(event, res("/api/x", 404, 9));
    }
}
