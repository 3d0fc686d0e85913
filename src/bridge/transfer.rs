//! Chunked-transfer accumulator for the save channel.
//!
//! One transfer per caller-generated id, alive from BEGIN until END commits
//! it or a protocol error aborts it. Per-id operations only; the map is
//! concurrent so save callbacks from different view frames never contend.

use std::time::{Duration, Instant};

use dashmap::DashMap;

use super::{BridgeError, SaveKind};

/// Sender-side chunk bound (base64 chars), kept under the transport's
/// per-message ceiling. The injected script uses the same value.
pub const MAX_CHUNK_CHARS: usize = 24_000;

/// Accumulation cap per transfer (base64 chars). Exceeding it aborts the
/// transfer and frees its memory immediately.
pub const MAX_TRANSFER_CHARS: usize = 32 * 1024 * 1024;

/// An opened-but-never-committed transfer is evicted after this long.
pub const TRANSFER_IDLE_TIMEOUT: Duration = Duration::from_secs(120);

/// A transfer between BEGIN and END.
#[derive(Debug)]
pub struct PendingTransfer {
    pub kind: SaveKind,
    pub name: String,
    pub data: String,
    last_touch: Instant,
}

/// Concurrent per-id transfer table.
#[derive(Debug, Default)]
pub struct TransferStore {
    map: DashMap<String, PendingTransfer>,
}

impl TransferStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Open a transfer. A reused id replaces the previous transfer: after
    /// END the id is free again and a new BEGIN starts fresh.
    pub fn begin(&self, id: &str, kind: SaveKind, name: &str) {
        self.map.insert(
            id.to_string(),
            PendingTransfer {
                kind,
                name: name.to_string(),
                data: String::new(),
                last_touch: Instant::now(),
            },
        );
    }

    /// Append a fragment to an open transfer.
    ///
    /// Exceeding the accumulation cap aborts the transfer: the id is
    /// removed, its memory freed, and only this call fails.
    pub fn chunk(&self, id: &str, data: &str) -> Result<(), BridgeError> {
        let mut over_cap = false;
        {
            let mut entry = self.map.get_mut(id).ok_or(BridgeError::NoSuchTransfer)?;
            if entry.data.len() + data.len() > MAX_TRANSFER_CHARS {
                over_cap = true;
            } else {
                entry.data.push_str(data);
                entry.last_touch = Instant::now();
            }
        }
        if over_cap {
            self.map.remove(id);
            return Err(BridgeError::TransferTooLarge);
        }
        Ok(())
    }

    /// Close and take a transfer for commit.
    pub fn end(&self, id: &str) -> Result<PendingTransfer, BridgeError> {
        self.map
            .remove(id)
            .map(|(_, transfer)| transfer)
            .ok_or(BridgeError::NoSuchTransfer)
    }

    /// Drop transfers idle longer than [`TRANSFER_IDLE_TIMEOUT`]. Returns
    /// how many were evicted.
    pub fn evict_idle(&self) -> usize {
        let before = self.map.len();
        self.map
            .retain(|_, transfer| transfer.last_touch.elapsed() < TRANSFER_IDLE_TIMEOUT);
        before - self.map.len()
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_begin_chunk_end_round_trip() {
        let store = TransferStore::new();
        store.begin("t1", SaveKind::Svg, "chart.svg");
        store.chunk("t1", "AAAA").unwrap();
        store.chunk("t1", "BBBB").unwrap();
        store.chunk("t1", "CC").unwrap();

        let transfer = store.end("t1").unwrap();
        assert_eq!(transfer.kind, SaveKind::Svg);
        assert_eq!(transfer.name, "chart.svg");
        assert_eq!(transfer.data, "AAAABBBBCC");
        assert!(store.is_empty());
    }

    #[test]
    fn test_chunk_on_unknown_id() {
        let store = TransferStore::new();
        assert_eq!(
            store.chunk("ghost", "AAAA"),
            Err(BridgeError::NoSuchTransfer)
        );
        assert!(matches!(
            store.end("ghost"),
            Err(BridgeError::NoSuchTransfer)
        ));
    }

    #[test]
    fn test_cap_aborts_and_frees_transfer() {
        let store = TransferStore::new();
        store.begin("big", SaveKind::Png, "big.png");

        let half = "x".repeat(MAX_TRANSFER_CHARS / 2 + 1);
        store.chunk("big", &half).unwrap();
        assert_eq!(store.chunk("big", &half), Err(BridgeError::TransferTooLarge));

        // The id is gone: subsequent CHUNK/END report NoSuchTransfer
        assert_eq!(store.chunk("big", "x"), Err(BridgeError::NoSuchTransfer));
        assert!(matches!(store.end("big"), Err(BridgeError::NoSuchTransfer)));
        assert!(store.is_empty());
    }

    #[test]
    fn test_abort_leaves_other_transfers_alone() {
        let store = TransferStore::new();
        store.begin("big", SaveKind::Png, "big.png");
        store.begin("ok", SaveKind::Json, "ok.json");
        store.chunk("ok", "AAAA").unwrap();

        let over = "x".repeat(MAX_TRANSFER_CHARS + 1);
        assert_eq!(store.chunk("big", &over), Err(BridgeError::TransferTooLarge));

        let transfer = store.end("ok").unwrap();
        assert_eq!(transfer.data, "AAAA");
    }

    #[test]
    fn test_id_reuse_after_end_is_fresh() {
        let store = TransferStore::new();
        store.begin("r", SaveKind::Json, "a.json");
        store.chunk("r", "AAAA").unwrap();
        store.end("r").unwrap();

        store.begin("r", SaveKind::Svg, "b.svg");
        store.chunk("r", "BB").unwrap();
        let transfer = store.end("r").unwrap();
        assert_eq!(transfer.kind, SaveKind::Svg);
        assert_eq!(transfer.data, "BB");
    }

    #[test]
    fn test_evict_idle_keeps_fresh_transfers() {
        let store = TransferStore::new();
        store.begin("fresh", SaveKind::File, "f.bin");
        assert_eq!(store.evict_idle(), 0);
        assert_eq!(store.len(), 1);
    }
}
