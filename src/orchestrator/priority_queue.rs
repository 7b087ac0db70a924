//! Priority-queue scheduler (§4.3.6): four levels, starvation bounded by
//! wait-time escalation.

use chrono::{DateTime, Duration, Utc};
use std::collections::VecDeque;
use tokio::sync::Mutex;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Priority {
    Low,
    Normal,
    High,
    Critical,
}

impl Priority {
    fn escalated(self) -> Priority {
        match self {
            Priority::Low => Priority::Normal,
            Priority::Normal => Priority::High,
            Priority::High => Priority::Critical,
            Priority::Critical => Priority::Critical,
        }
    }

    fn wait_threshold(self, cfg: &WaitThresholds) -> Option<Duration> {
        match self {
            Priority::Low => Some(Duration::seconds(cfg.low_secs as i64)),
            Priority::Normal => Some(Duration::seconds(cfg.normal_secs as i64)),
            Priority::High => Some(Duration::seconds(cfg.high_secs as i64)),
            Priority::Critical => None,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct WaitThresholds {
    pub low_secs: u64,
    pub normal_secs: u64,
    pub high_secs: u64,
}

struct Entry<T> {
    item: T,
    enqueued_at: DateTime<Utc>,
    priority: Priority,
}

/// Four FIFO lanes, one per priority level. `dequeue` escalates any entry
/// that has waited past its level's threshold before picking the highest
/// non-empty lane, bounding starvation of LOW/NORMAL work.
pub struct PriorityQueue<T> {
    thresholds: WaitThresholds,
    lanes: Mutex<[VecDeque<Entry<T>>; 4]>,
}

fn lane_index(p: Priority) -> usize {
    match p {
        Priority::Low => 0,
        Priority::Normal => 1,
        Priority::High => 2,
        Priority::Critical => 3,
    }
}

impl<T> PriorityQueue<T> {
    pub fn new(thresholds: WaitThresholds) -> Self {
        Self { thresholds, lanes: Mutex::new([VecDeque::new(), VecDeque::new(), VecDeque::new(), VecDeque::new()]) }
    }

    pub async fn enqueue(&self, item: T, priority: Priority) {
        let mut lanes = self.lanes.lock().await;
        lanes[lane_index(priority)].push_back(Entry { item, enqueued_at: Utc::now(), priority });
    }

    /// Escalate overdue entries, then pop the highest-priority non-empty
    /// lane (FIFO within that lane).
    pub async fn dequeue(&self) -> Option<T> {
        let mut lanes = self.lanes.lock().await;
        self.escalate(&mut lanes);

        for idx in (0..4).rev() {
            if let Some(entry) = lanes[idx].pop_front() {
                return Some(entry.item);
            }
        }
        None
    }

    fn escalate(&self, lanes: &mut [VecDeque<Entry<T>>; 4]) {
        let now = Utc::now();
        for idx in 0..3 {
            let mut still_waiting = VecDeque::new();
            while let Some(entry) = lanes[idx].pop_front() {
                let threshold = entry.priority.wait_threshold(&self.thresholds);
                let overdue = threshold.map(|t| now - entry.enqueued_at >= t).unwrap_or(false);
                if overdue {
                    let escalated_priority = entry.priority.escalated();
                    lanes[lane_index(escalated_priority)].push_back(Entry {
                        item: entry.item,
                        enqueued_at: entry.enqueued_at,
                        priority: escalated_priority,
                    });
                } else {
                    still_waiting.push_back(entry);
                }
            }
            lanes[idx] = still_waiting;
        }
    }

    pub async fn len(&self) -> usize {
        self.lanes.lock().await.iter().map(|l| l.len()).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn thresholds() -> WaitThresholds {
        WaitThresholds { low_secs: 120, normal_secs: 60, high_secs: 30 }
    }

    #[tokio::test]
    async fn test_critical_overtakes_lower_priorities() {
        let q = PriorityQueue::new(thresholds());
        q.enqueue("low-job", Priority::Low).await;
        q.enqueue("critical-job", Priority::Critical).await;
        assert_eq!(q.dequeue().await, Some("critical-job"));
        assert_eq!(q.dequeue().await, Some("low-job"));
    }

    #[tokio::test]
    async fn test_fifo_within_priority_level() {
        let q = PriorityQueue::new(thresholds());
        q.enqueue("first", Priority::Normal).await;
        q.enqueue("second", Priority::Normal).await;
        assert_eq!(q.dequeue().await, Some("first"));
        assert_eq!(q.dequeue().await, Some("second"));
    }

    #[tokio::test]
    async fn test_escalation_promotes_overdue_low_priority() {
        let q = PriorityQueue::new(WaitThresholds { low_secs: 0, normal_secs: 60, high_secs: 30 });
        q.enqueue("stale-low", Priority::Low).await;
        q.enqueue("fresh-normal", Priority::Normal).await;
        // stale-low's 0s threshold is already exceeded, so it escalates to
        // Normal and, being enqueued first, lands behind fresh-normal's lane
        // position chronologically but escalation appends it at the back.
        let first = q.dequeue().await;
        let second = q.dequeue().await;
        assert_eq!(first, Some("fresh-normal"));
        assert_eq!(second, Some("stale-low"));
    }

    #[tokio::test]
    async fn test_empty_queue_returns_none() {
        let q: PriorityQueue<&str> = PriorityQueue::new(thresholds());
        assert_eq!(q.dequeue().await, None);
    }

    #[test]
    fn test_priority_ordering() {
        assert!(Priority::Critical > Priority::High);
        assert!(Priority::High > Priority::Normal);
        assert!(Priority::Normal > Priority::Low);
    }
}
