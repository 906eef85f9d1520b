//! Replay sink: a side-channel that records every inbound packet dispatched
//! by a [`crate::connection::Connection`], for later playback through a
//! [`crate::connection::replay::ReplayConnection`].

use std::fs::File;
use std::io::{self, BufWriter, Read, Write};
use std::path::Path;

use crate::net::ClientId;

/// Installed via `Connection::start_recording`; called for every dispatched
/// inbound packet (including locally-echoed syncs and synthesized ack
/// batches).
pub trait ReplaySink: Send {
    fn record(&mut self, client: ClientId, payload: &[u8]);
}

/// Length-prefixed `(ClientId, payload)` log: `u32 client | u32 len | payload[len]`.
///
/// This is the symmetric format [`crate::connection::replay::ReplayConnection`]
/// reads back, so the sink and the player share one concrete layout.
pub struct FileReplaySink {
    writer: BufWriter<File>,
}

impl FileReplaySink {
    pub fn create(path: impl AsRef<Path>) -> io::Result<Self> {
        Ok(Self {
            writer: BufWriter::new(File::create(path)?),
        })
    }
}

impl ReplaySink for FileReplaySink {
    fn record(&mut self, client: ClientId, payload: &[u8]) {
        let _ = self.write_record(client, payload);
    }
}

impl FileReplaySink {
    fn write_record(&mut self, client: ClientId, payload: &[u8]) -> io::Result<()> {
        self.writer.write_all(&client.0.to_le_bytes())?;
        self.writer.write_all(&(payload.len() as u32).to_le_bytes())?;
        self.writer.write_all(payload)?;
        self.writer.flush()
    }
}

/// Reads every `(ClientId, payload)` record from a replay file in order.
pub fn read_replay_file(path: impl AsRef<Path>) -> io::Result<Vec<(ClientId, Vec<u8>)>> {
    let mut reader = io::BufReader::new(File::open(path)?);
    let mut out = Vec::new();
    loop {
        let mut header = [0u8; 8];
        match reader.read_exact(&mut header) {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => break,
            Err(e) => return Err(e),
        }
        let client = ClientId(u32::from_le_bytes(header[0..4].try_into().unwrap()));
        let len = u32::from_le_bytes(header[4..8].try_into().unwrap());
        let mut payload = vec![0u8; len as usize];
        reader.read_exact(&mut payload)?;
        out.push((client, payload));
    }
    Ok(out)
}

/// A [`ReplaySink`] that buffers records in memory — used by tests and by
/// callers that want to inspect what was recorded without touching disk.
#[derive(Default)]
pub struct MemoryReplaySink {
    pub records: Vec<(ClientId, Vec<u8>)>,
}

impl ReplaySink for MemoryReplaySink {
    fn record(&mut self, client: ClientId, payload: &[u8]) {
        self.records.push((client, payload.to_vec()));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn file_replay_sink_roundtrip() {
        let dir = std::env::temp_dir();
        let path = dir.join(format!("lockstep_replay_test_{}.bin", std::process::id()));

        {
            let mut sink = FileReplaySink::create(&path).unwrap();
            sink.record(ClientId(1), &[1, 2, 3]);
            sink.record(ClientId(2), &[9]);
        }

        let records = read_replay_file(&path).unwrap();
        assert_eq!(records, vec![(ClientId(1), vec![1, 2, 3]), (ClientId(2), vec![9])]);

        let _ = std::fs::remove_file(path);
    }

    #[test]
    fn memory_replay_sink_collects_records() {
        let mut sink = MemoryReplaySink::default();
        sink.record(ClientId(1), &[7, 7]);
        assert_eq!(sink.records, vec![(ClientId(1), vec![7, 7])]);
    }
}
