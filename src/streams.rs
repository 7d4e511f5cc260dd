//! In-memory streaming gateway: per-deployment log ring buffers with live
//! broadcast fan-out, and bounded CPU/RAM sample windows.
//!
//! Delivery policy: a subscriber receives the buffered tail followed by live
//! lines; there are no cursors, a reconnect simply resubscribes. Slow
//! subscribers lag on the bounded broadcast channel and skip dropped lines
//! (drop-oldest), so memory stays bounded per deployment.
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use tokio::sync::broadcast;
use uuid::Uuid;

pub const LOG_BUFFER_LINES: usize = 1000;
pub const METRIC_WINDOW_POINTS: usize = 900;
const SUBSCRIBER_CAPACITY: usize = 256;

#[derive(Debug, Clone, Serialize)]
pub struct MetricSample {
    pub ts: DateTime<Utc>,
    pub cpu: f64,
    pub ram: f64,
}

struct LogChannel {
    tx: broadcast::Sender<String>,
    recent: VecDeque<String>,
}

impl Default for LogChannel {
    fn default() -> Self {
        Self { tx: broadcast::channel(SUBSCRIBER_CAPACITY).0, recent: VecDeque::new() }
    }
}

#[derive(Default)]
struct MetricSeries {
    points: VecDeque<MetricSample>,
}

#[derive(Default)]
struct HubInner {
    logs: HashMap<Uuid, LogChannel>,
    metrics: HashMap<Uuid, MetricSeries>,
}

#[derive(Clone, Default)]
pub struct StreamHub {
    inner: Arc<Mutex<HubInner>>,
}

impl StreamHub {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn publish_log(&self, deployment_id: Uuid, line: String) {
        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        let ch = inner.logs.entry(deployment_id).or_default();
        if ch.recent.len() == LOG_BUFFER_LINES {
            ch.recent.pop_front();
        }
        ch.recent.push_back(line.clone());
        // No receivers is fine; the ring buffer keeps the tail.
        let _ = ch.tx.send(line);
    }

    pub fn recent_logs(&self, deployment_id: Uuid, limit: usize) -> Vec<String> {
        let inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        match inner.logs.get(&deployment_id) {
            Some(ch) => {
                let skip = ch.recent.len().saturating_sub(limit);
                ch.recent.iter().skip(skip).cloned().collect()
            }
            None => Vec::new(),
        }
    }

    /// Tail snapshot plus a live receiver, taken under one lock so lines are
    /// neither duplicated nor lost at the boundary.
    pub fn subscribe(&self, deployment_id: Uuid) -> (Vec<String>, broadcast::Receiver<String>) {
        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        let ch = inner.logs.entry(deployment_id).or_default();
        (ch.recent.iter().cloned().collect(), ch.tx.subscribe())
    }

    pub fn record_sample(&self, deployment_id: Uuid, cpu: f64, ram: f64) {
        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        let series = inner.metrics.entry(deployment_id).or_default();
        if series.points.len() == METRIC_WINDOW_POINTS {
            series.points.pop_front();
        }
        series.points.push_back(MetricSample { ts: Utc::now(), cpu, ram });
    }

    /// Last recorded sample, used as the random-walk seed by the runtime engine.
    pub fn last_sample(&self, deployment_id: Uuid) -> Option<(f64, f64)> {
        let inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        inner
            .metrics
            .get(&deployment_id)
            .and_then(|s| s.points.back())
            .map(|p| (p.cpu, p.ram))
    }

    pub fn metric_window(&self, deployment_id: Uuid) -> Vec<MetricSample> {
        let inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        inner
            .metrics
            .get(&deployment_id)
            .map(|s| s.points.iter().cloned().collect())
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn log_ring_drops_oldest() {
        let hub = StreamHub::default();
        let id = Uuid::new_v4();
        for i in 0..(LOG_BUFFER_LINES + 10) {
            hub.publish_log(id, format!("line {i}"));
        }
        let logs = hub.recent_logs(id, LOG_BUFFER_LINES * 2);
        assert_eq!(logs.len(), LOG_BUFFER_LINES);
        assert_eq!(logs[0], "line 10");
    }

    #[tokio::test]
    async fn subscribe_delivers_tail_then_live_in_order() {
        let hub = StreamHub::default();
        let id = Uuid::new_v4();
        hub.publish_log(id, "a".into());
        hub.publish_log(id, "b".into());
        let (tail, mut rx) = hub.subscribe(id);
        assert_eq!(tail, vec!["a".to_string(), "b".to_string()]);
        hub.publish_log(id, "c".into());
        hub.publish_log(id, "d".into());
        assert_eq!(rx.recv().await.unwrap(), "c");
        assert_eq!(rx.recv().await.unwrap(), "d");
    }

    #[test]
    fn metric_window_is_bounded() {
        let hub = StreamHub::default();
        let id = Uuid::new_v4();
        for i in 0..(METRIC_WINDOW_POINTS + 50) {
            hub.record_sample(id, i as f64 % 100.0, 42.0);
        }
        assert_eq!(hub.metric_window(id).len(), METRIC_WINDOW_POINTS);
    }

    #[test]
    fn recent_logs_respects_limit() {
        let hub = StreamHub::default();
        let id = Uuid::new_v4();
        for i in 0..10 {
            hub.publish_log(id, format!("l{i}"));
        }
        let logs = hub.recent_logs(id, 3);
        assert_eq!(logs, vec!["l7", "l8", "l9"]);
    }
}
