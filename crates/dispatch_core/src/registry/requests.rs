use std::collections::VecDeque;

use h3o::CellIndex;

use crate::error::{DispatchError, DispatchResult};
use crate::ids::RequestId;
use crate::schedule::TripRequest;

/// Requests waiting to be matched, in arrival order.
#[derive(Debug, Clone, Default)]
pub struct RequestQueue {
    requests: VecDeque<TripRequest>,
}

impl RequestQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn enqueue(&mut self, request: TripRequest) -> DispatchResult<()> {
        if self.contains(request.id) {
            return Err(DispatchError::DuplicateRequest(request.id));
        }
        self.requests.push_back(request);
        Ok(())
    }

    /// Remove a request that has been placed into a schedule.
    pub fn dequeue_matched(&mut self, id: RequestId) -> DispatchResult<TripRequest> {
        let index = self
            .requests
            .iter()
            .position(|request| request.id == id)
            .ok_or(DispatchError::UnknownRequest(id))?;
        self.requests
            .remove(index)
            .ok_or(DispatchError::UnknownRequest(id))
    }

    /// Drop every request that has waited longer than `max_wait_ms` and
    /// return them in queue order.
    pub fn expire(&mut self, now_ms: u64, max_wait_ms: u64) -> Vec<TripRequest> {
        let mut expired = Vec::new();
        self.requests.retain(|request| {
            let waited = now_ms.saturating_sub(request.issued_at_ms);
            if waited > max_wait_ms {
                expired.push(request.clone());
                false
            } else {
                true
            }
        });
        expired
    }

    pub fn contains(&self, id: RequestId) -> bool {
        self.requests.iter().any(|request| request.id == id)
    }

    pub fn get(&self, id: RequestId) -> Option<&TripRequest> {
        self.requests.iter().find(|request| request.id == id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &TripRequest> {
        self.requests.iter()
    }

    pub fn pickups(&self) -> Vec<CellIndex> {
        self.requests.iter().map(|request| request.pickup).collect()
    }

    pub fn len(&self) -> usize {
        self.requests.len()
    }

    pub fn is_empty(&self) -> bool {
        self.requests.is_empty()
    }
}
