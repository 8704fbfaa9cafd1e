//! Allocation ledger for parse contexts, objects and pixel buffers.

use serde::Serialize;

/// Running counts of every allocation and free performed by one module.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ResourceStats {
    pub parse_contexts_opened: u64,
    pub parse_contexts_closed: u64,
    pub objects_created: u64,
    pub objects_destroyed: u64,
    pub buffers_fetched: u64,
    pub buffers_released: u64,
    /// Bytes held by buffers the host has not released yet.
    pub bytes_outstanding: usize,
}

impl ResourceStats {
    pub fn live_parse_contexts(&self) -> u64 {
        self.parse_contexts_opened - self.parse_contexts_closed
    }

    pub fn live_objects(&self) -> u64 {
        self.objects_created - self.objects_destroyed
    }

    pub fn outstanding_buffers(&self) -> u64 {
        self.buffers_fetched - self.buffers_released
    }

    /// True when every allocation has been matched by a free.
    pub fn is_balanced(&self) -> bool {
        self.live_parse_contexts() == 0
            && self.live_objects() == 0
            && self.outstanding_buffers() == 0
            && self.bytes_outstanding == 0
    }

    pub(crate) fn parse_opened(&mut self) {
        self.parse_contexts_opened += 1;
    }

    pub(crate) fn parse_closed(&mut self) {
        self.parse_contexts_closed += 1;
    }

    pub(crate) fn object_created(&mut self) {
        self.objects_created += 1;
    }

    pub(crate) fn object_destroyed(&mut self) {
        self.objects_destroyed += 1;
    }

    pub(crate) fn buffer_fetched(&mut self, bytes: usize) {
        self.buffers_fetched += 1;
        self.bytes_outstanding += bytes;
    }

    pub(crate) fn buffer_released(&mut self, bytes: usize) {
        self.buffers_released += 1;
        self.bytes_outstanding -= bytes;
    }
}

#[cfg(test)]
mod tests {
    use super::ResourceStats;

    #[test]
    fn balance_tracks_every_family() {
        let mut stats = ResourceStats::default();
        assert!(stats.is_balanced());

        stats.object_created();
        stats.buffer_fetched(16);
        assert_eq!(stats.live_objects(), 1);
        assert_eq!(stats.outstanding_buffers(), 1);
        assert!(!stats.is_balanced());

        stats.buffer_released(16);
        stats.object_destroyed();
        assert!(stats.is_balanced());
    }

    #[test]
    fn serializes_for_reports() {
        let stats = ResourceStats::default();
        let json = serde_json::to_value(stats).expect("serialize stats");
        assert_eq!(json["objects_created"], 0);
        assert_eq!(json["bytes_outstanding"], 0);
    }
}
