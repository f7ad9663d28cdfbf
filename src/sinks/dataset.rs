//! Per-epoch signature dataset export.

use crate::{bitmap, sinks::Sink, types::Snapshot};
use serde::Serialize;
use std::{
    collections::HashMap,
    fs::File,
    io::{self, BufWriter},
    path::PathBuf,
};
use tracing::{info, warn};

#[derive(Serialize, Clone)]
struct ValidatorEntry {
    name: String,
    address: String,
    signed: u64,
    total: u64,
    /// One bit per recorded checkpoint, LSB-first within each byte.
    bitmap: Vec<u8>,
}

impl ValidatorEntry {
    fn new(name: &str, address: &str) -> Self {
        Self {
            name: name.to_string(),
            address: address.to_string(),
            signed: 0,
            total: 0,
            bitmap: Vec::new(),
        }
    }

    fn append(&mut self, signed: bool) {
        let byte = (self.total / 8) as usize;
        if byte >= self.bitmap.len() {
            self.bitmap.push(0);
        }
        if signed {
            self.bitmap[byte] |= 1 << (self.total % 8);
            self.signed += 1;
        }
        self.total += 1;
    }
}

struct EpochData {
    epoch: u64,
    start: u64,
    end: u64,
    validators: HashMap<String, ValidatorEntry>,
    /// Committee order of first sight, preserved in the export.
    order: Vec<String>,
}

#[derive(Serialize)]
struct EpochFile<'a> {
    epoch: u64,
    start_checkpoint: u64,
    end_checkpoint: u64,
    validators: Vec<&'a ValidatorEntry>,
}

/// Accumulates one signed/missed bit per validator per checkpoint and writes
/// an `epoch_<epoch>_<start>-<end>.json` file when the epoch rolls over (and
/// for the in-progress epoch on close).
pub struct DatasetSink {
    dir: PathBuf,
    data: Option<EpochData>,
}

impl DatasetSink {
    pub fn new(dir: impl Into<PathBuf>) -> io::Result<Self> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir)?;
        Ok(Self { dir, data: None })
    }

    fn start_epoch(&mut self, snapshot: &Snapshot) {
        let mut validators = HashMap::new();
        let mut order = Vec::with_capacity(snapshot.committee.len());
        for v in &snapshot.committee.validators {
            validators.insert(v.sui_address.clone(), ValidatorEntry::new(&v.name, &v.sui_address));
            order.push(v.sui_address.clone());
        }
        self.data = Some(EpochData {
            epoch: snapshot.epoch,
            start: snapshot.sequence,
            end: snapshot.sequence,
            validators,
            order,
        });
    }

    fn record(&mut self, snapshot: &Snapshot) {
        if matches!(&self.data, Some(data) if data.epoch != snapshot.epoch) {
            self.finish_epoch();
        }
        if self.data.is_none() {
            self.start_epoch(snapshot);
        }
        let Some(data) = self.data.as_mut() else {
            return;
        };
        data.end = snapshot.sequence;
        for v in &snapshot.committee.validators {
            let entry = data
                .validators
                .entry(v.sui_address.clone())
                .or_insert_with(|| {
                    data.order.push(v.sui_address.clone());
                    ValidatorEntry::new(&v.name, &v.sui_address)
                });
            entry.append(bitmap::is_signer(&snapshot.signers, v.bitmap_index));
        }
    }

    fn finish_epoch(&mut self) {
        let Some(data) = self.data.take() else {
            return;
        };
        let name = format!("epoch_{}_{}-{}.json", data.epoch, data.start, data.end);
        let path = self.dir.join(&name);
        let out = EpochFile {
            epoch: data.epoch,
            start_checkpoint: data.start,
            end_checkpoint: data.end,
            validators: data
                .order
                .iter()
                .filter_map(|addr| data.validators.get(addr))
                .collect(),
        };
        let result = File::create(&path)
            .map(BufWriter::new)
            .and_then(|w| serde_json::to_writer(w, &out).map_err(io::Error::from));
        match result {
            Ok(()) => info!(path = %path.display(), "wrote epoch dataset"),
            Err(err) => warn!(%err, path = %path.display(), "failed to write epoch dataset"),
        }
    }
}

impl Sink for DatasetSink {
    fn publish(&mut self, snapshot: &Snapshot) {
        self.record(snapshot);
    }

    fn close(&mut self) {
        self.finish_epoch();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Committee, Validator};
    use std::sync::Arc;

    fn committee(epoch: u64, n: u32) -> Arc<Committee> {
        Arc::new(Committee {
            epoch,
            validators: (0..n)
                .map(|i| Validator {
                    name: format!("validator-{i}"),
                    sui_address: format!("0x{i}"),
                    protocol_pubkey: format!("pk-{i}"),
                    bitmap_index: i,
                    voting_power: 100,
                })
                .collect(),
        })
    }

    fn snapshot(epoch: u64, sequence: u64, signers: &[u32], committee: Arc<Committee>) -> Snapshot {
        Snapshot {
            epoch,
            sequence,
            total_attested: 0,
            signed_power: 0,
            total_power: committee.total_power(),
            committee,
            counters: HashMap::new(),
            signers: signers.to_vec(),
        }
    }

    fn temp_dir(tag: &str) -> PathBuf {
        std::env::temp_dir().join(format!("suiwatch-dataset-{tag}-{}", std::process::id()))
    }

    #[test]
    fn test_export_on_epoch_rollover() {
        let dir = temp_dir("rollover");
        let mut sink = DatasetSink::new(&dir).unwrap();
        let epoch_5 = committee(5, 2);

        sink.publish(&snapshot(5, 100, &[0], epoch_5.clone()));
        sink.publish(&snapshot(5, 101, &[0, 1], epoch_5.clone()));
        sink.publish(&snapshot(5, 102, &[1], epoch_5));
        // Rollover flushes epoch 5.
        sink.publish(&snapshot(6, 103, &[0], committee(6, 2)));

        let raw = std::fs::read_to_string(dir.join("epoch_5_100-102.json")).unwrap();
        let parsed: serde_json::Value = serde_json::from_str(&raw).unwrap();
        assert_eq!(parsed["epoch"], 5);
        assert_eq!(parsed["start_checkpoint"], 100);
        assert_eq!(parsed["end_checkpoint"], 102);
        let validators = parsed["validators"].as_array().unwrap();
        assert_eq!(validators.len(), 2);
        // Validator 0 signed checkpoints 100 and 101: bits 0 and 1.
        assert_eq!(validators[0]["address"], "0x0");
        assert_eq!(validators[0]["signed"], 2);
        assert_eq!(validators[0]["total"], 3);
        assert_eq!(validators[0]["bitmap"][0], 0b011);
        // Validator 1 signed checkpoints 101 and 102: bits 1 and 2.
        assert_eq!(validators[1]["signed"], 2);
        assert_eq!(validators[1]["bitmap"][0], 0b110);

        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn test_close_flushes_open_epoch() {
        let dir = temp_dir("close");
        let mut sink = DatasetSink::new(&dir).unwrap();

        sink.publish(&snapshot(7, 50, &[0], committee(7, 1)));
        sink.close();

        let raw = std::fs::read_to_string(dir.join("epoch_7_50-50.json")).unwrap();
        let parsed: serde_json::Value = serde_json::from_str(&raw).unwrap();
        assert_eq!(parsed["validators"][0]["bitmap"][0], 1);

        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn test_close_without_data_is_a_noop() {
        let dir = temp_dir("noop");
        let mut sink = DatasetSink::new(&dir).unwrap();
        sink.close();
        assert_eq!(std::fs::read_dir(&dir).unwrap().count(), 0);
        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn test_bit_packing_crosses_byte_boundary() {
        let mut entry = ValidatorEntry::new("a", "0xa");
        for i in 0..9 {
            entry.append(i % 2 == 0);
        }
        assert_eq!(entry.total, 9);
        assert_eq!(entry.signed, 5);
        assert_eq!(entry.bitmap, vec![0b0101_0101, 0b0000_0001]);
    }
}
