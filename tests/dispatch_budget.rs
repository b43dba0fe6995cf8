//! Request budget under burst load.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::{Value, json};
use std::sync::{Arc, Mutex};
use threadsync::Result;
use threadsync::clock::{Clock, ManualClock};
use threadsync::config::DispatchConfig;
use threadsync::dispatch::{DispatchQueue, RetryPolicy, WriteOp};
use threadsync::export::{PageParent, PageRef, PageRequest, PageWriter};
use threadsync::storage::{MemoryStore, SharedStore};

struct TimedWriter {
    clock: ManualClock,
    calls: Mutex<Vec<DateTime<Utc>>>,
}

impl TimedWriter {
    fn stamp(&self) -> usize {
        let mut calls = self.calls.lock().unwrap();
        calls.push(self.clock.now());
        calls.len()
    }
}

#[async_trait]
impl PageWriter for TimedWriter {
    async fn create_page(&self, _request: &PageRequest) -> Result<PageRef> {
        let n = self.stamp();
        Ok(PageRef {
            id: format!("page-{n}"),
            url: None,
        })
    }

    async fn append_children(&self, _page_id: &str, _children: &[Value]) -> Result<()> {
        self.stamp();
        Ok(())
    }

    async fn archive_page(&self, _page_id: &str) -> Result<()> {
        self.stamp();
        Ok(())
    }
}

fn create(n: usize) -> WriteOp {
    WriteOp::CreatePage(PageRequest {
        parent: PageParent::Page("root".into()),
        properties: json!({"title": {"title": [{"text": {"content": format!("t{n}")}}]}}),
        children: Vec::new(),
    })
}

#[tokio::test]
async fn test_burst_never_exceeds_window_budget() {
    let clock = ManualClock::at_epoch(0);
    let writer = Arc::new(TimedWriter {
        clock: clock.clone(),
        calls: Mutex::new(Vec::new()),
    });
    let config = DispatchConfig {
        max_requests: 5,
        ..DispatchConfig::default()
    };
    let queue = Arc::new(DispatchQueue::spawn(
        Arc::clone(&writer) as Arc<dyn PageWriter>,
        Arc::new(clock.clone()),
        Arc::new(MemoryStore::new()) as SharedStore,
        config,
        RetryPolicy::default(),
    ));

    let mut handles = Vec::new();
    for n in 0..23 {
        let queue = Arc::clone(&queue);
        handles.push(tokio::spawn(async move { queue.enqueue(create(n)).await }));
    }
    for handle in handles {
        assert!(handle.await.unwrap().is_ok());
    }

    let calls = writer.calls.lock().unwrap().clone();
    assert_eq!(calls.len(), 23);
    for pair in calls.windows(6) {
        assert!(
            pair[5] - pair[0] >= chrono::Duration::seconds(60),
            "six writes inside one window: {pair:?}"
        );
    }
    assert!(calls.windows(2).all(|w| w[0] <= w[1]));
    assert_eq!(queue.depth(), 0);
}
