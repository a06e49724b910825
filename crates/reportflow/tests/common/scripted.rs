//! Evidence collector whose behavior is scripted per section.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;

use reportflow::collaborators::{
    CollectorError, EvidenceCollector, EvidenceRequest, EvidenceSet, SkippedSource,
};
use reportflow::model::{EvidenceItem, SourceType};

/// One observed `collect` call.
#[derive(Debug, Clone)]
pub struct CollectorCall {
    pub order_no: u32,
    pub prior_evidence: usize,
}

pub struct ScriptedCollector {
    items_per_call: usize,
    failures: Mutex<HashMap<u32, CollectorError>>,
    delays: Mutex<HashMap<u32, Duration>>,
    empty: Mutex<Vec<u32>>,
    skipped: Mutex<HashMap<u32, SourceType>>,
    calls: Mutex<Vec<CollectorCall>>,
    active: AtomicUsize,
    max_active: AtomicUsize,
}

impl ScriptedCollector {
    pub fn new() -> Self {
        Self {
            items_per_call: 2,
            failures: Mutex::new(HashMap::new()),
            delays: Mutex::new(HashMap::new()),
            empty: Mutex::new(Vec::new()),
            skipped: Mutex::new(HashMap::new()),
            calls: Mutex::new(Vec::new()),
            active: AtomicUsize::new(0),
            max_active: AtomicUsize::new(0),
        }
    }

    pub fn items_per_call(&self) -> usize {
        self.items_per_call
    }

    pub fn fail_section(&self, order_no: u32, error: CollectorError) {
        self.failures.lock().unwrap().insert(order_no, error);
    }

    pub fn clear_failures(&self) {
        self.failures.lock().unwrap().clear();
    }

    pub fn delay_section(&self, order_no: u32, delay: Duration) {
        self.delays.lock().unwrap().insert(order_no, delay);
    }

    pub fn clear_delays(&self) {
        self.delays.lock().unwrap().clear();
    }

    pub fn empty_section(&self, order_no: u32) {
        self.empty.lock().unwrap().push(order_no);
    }

    /// Reports `source_type` as skipped by fallback for this section.
    pub fn skip_source(&self, order_no: u32, source_type: SourceType) {
        self.skipped.lock().unwrap().insert(order_no, source_type);
    }

    pub fn calls(&self) -> Vec<CollectorCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn called_orders(&self) -> Vec<u32> {
        self.calls().iter().map(|c| c.order_no).collect()
    }

    pub fn reset_calls(&self) {
        self.calls.lock().unwrap().clear();
    }

    /// Highest number of `collect` calls seen in flight at once.
    pub fn max_concurrent(&self) -> usize {
        self.max_active.load(Ordering::SeqCst)
    }
}

impl Default for ScriptedCollector {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl EvidenceCollector for ScriptedCollector {
    async fn collect(&self, request: &EvidenceRequest) -> Result<EvidenceSet, CollectorError> {
        let order_no = request.topic.order_no;
        self.calls.lock().unwrap().push(CollectorCall {
            order_no,
            prior_evidence: request.prior_evidence.len(),
        });

        let now_active = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_active.fetch_max(now_active, Ordering::SeqCst);

        let delay = self.delays.lock().unwrap().get(&order_no).copied();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        self.active.fetch_sub(1, Ordering::SeqCst);

        if let Some(error) = self.failures.lock().unwrap().get(&order_no).cloned() {
            return Err(error);
        }
        if self.empty.lock().unwrap().contains(&order_no) {
            return Ok(EvidenceSet::default());
        }

        let mut set = EvidenceSet::default();
        let source_type = request.sources.first();
        for i in 0..self.items_per_call {
            set.items.push(EvidenceItem::new(
                source_type,
                format!("{} #{}", request.topic.title, i + 1),
                format!("test://{}/{}/{}", request.topic.report_id, order_no, i + 1),
                format!("Evidence {} for {}", i + 1, request.topic.theme_text),
            ));
        }
        if let Some(skipped) = self.skipped.lock().unwrap().get(&order_no) {
            set.skipped.push(SkippedSource {
                source_type: *skipped,
                reason: format!("{} quota exhausted (HTTP 429)", skipped),
            });
        }
        Ok(set)
    }
}
