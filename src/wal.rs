use std::fs::{self, File, OpenOptions};
use std::io::{self, BufReader, BufWriter, ErrorKind, Read, Write};
use std::path::{Path, PathBuf};

use crate::model::Event;

const LEN_BYTES: u64 = 4;
const CRC_BYTES: u64 = 4;

/// Frame one event as `[u32 len][bincode payload][u32 crc32]`, little endian.
/// `len` counts the payload only.
fn frame(event: &Event) -> io::Result<Vec<u8>> {
    let payload =
        bincode::serialize(event).map_err(|e| io::Error::new(ErrorKind::InvalidData, e))?;
    let mut buf = Vec::with_capacity(payload.len() + (LEN_BYTES + CRC_BYTES) as usize);
    buf.extend_from_slice(&(payload.len() as u32).to_le_bytes());
    buf.extend_from_slice(&payload);
    buf.extend_from_slice(&crc32fast::hash(&payload).to_le_bytes());
    Ok(buf)
}

/// `false` when the reader ran dry before `buf` was full.
fn fill(reader: &mut impl Read, buf: &mut [u8]) -> io::Result<bool> {
    match reader.read_exact(buf) {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == ErrorKind::UnexpectedEof => Ok(false),
        Err(e) => Err(e),
    }
}

/// Next whole record and its size on disk. `None` at end of file and at the
/// first torn, corrupt or undecodable record; `remaining` bounds the length
/// prefix so a garbage length never allocates past the file.
fn next_record(reader: &mut impl Read, remaining: u64) -> io::Result<Option<(Event, u64)>> {
    let mut len_buf = [0u8; LEN_BYTES as usize];
    if !fill(reader, &mut len_buf)? {
        return Ok(None);
    }
    let len = u64::from(u32::from_le_bytes(len_buf));
    let size = LEN_BYTES + len + CRC_BYTES;
    if size > remaining {
        return Ok(None);
    }

    let mut payload = vec![0u8; len as usize];
    let mut crc_buf = [0u8; CRC_BYTES as usize];
    if !fill(reader, &mut payload)? || !fill(reader, &mut crc_buf)? {
        return Ok(None);
    }
    if u32::from_le_bytes(crc_buf) != crc32fast::hash(&payload) {
        return Ok(None);
    }
    Ok(bincode::deserialize::<Event>(&payload)
        .ok()
        .map(|event| (event, size)))
}

/// What a pass over the log found on disk.
#[derive(Debug, Default)]
pub struct Replay {
    pub events: Vec<Event>,
    /// Length of the prefix made of whole, checksummed records.
    pub valid_len: u64,
    /// Bytes after `valid_len`: a torn or corrupt tail.
    pub discarded: u64,
}

/// Append-only log of booking events, one framed record per event.
///
/// The writer tracks how many bytes hold whole records. Anything past that
/// mark, left by a crash or a failed append, is cut off before the next
/// record is written, so a later replay never stops short of a committed one.
pub struct Wal {
    file: File,
    path: PathBuf,
    len: u64,
    dirty: bool,
    appends_since_compact: u64,
}

impl Wal {
    /// Replay the log at `path` (creating it if missing), cut off any torn
    /// tail and open it for appends.
    pub fn open(path: &Path) -> io::Result<(Self, Replay)> {
        let replay = Self::replay(path)?;
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        let mut wal = Self {
            file,
            path: path.to_path_buf(),
            len: replay.valid_len,
            dirty: replay.discarded > 0,
            appends_since_compact: 0,
        };
        if wal.dirty {
            wal.rollback()?;
        }
        Ok((wal, replay))
    }

    /// Append one event and sync it before returning. On error the partial
    /// record is rolled back, at the latest before the next append.
    pub fn append(&mut self, event: &Event) -> io::Result<()> {
        if self.dirty {
            self.rollback()?;
        }
        let record = frame(event)?;
        self.dirty = true;
        self.file.write_all(&record)?;
        self.file.sync_data()?;
        self.dirty = false;
        self.len += record.len() as u64;
        self.appends_since_compact += 1;
        Ok(())
    }

    /// Truncate the file back to its last whole record.
    fn rollback(&mut self) -> io::Result<()> {
        self.file.set_len(self.len)?;
        self.file.sync_all()?;
        self.dirty = false;
        Ok(())
    }

    /// Replace the log with `events`, typically the minimal set that
    /// recreates the current state. The new log is written beside the old
    /// one and renamed over it, so a crash leaves one of the two intact.
    pub fn compact(&mut self, events: &[Event]) -> io::Result<()> {
        let tmp_path = self.path.with_extension("wal.tmp");
        let mut len = 0;
        {
            let mut writer = BufWriter::new(File::create(&tmp_path)?);
            for event in events {
                let record = frame(event)?;
                writer.write_all(&record)?;
                len += record.len() as u64;
            }
            writer.flush()?;
            writer.get_ref().sync_all()?;
        }
        fs::rename(&tmp_path, &self.path)?;
        self.file = OpenOptions::new().append(true).open(&self.path)?;
        self.len = len;
        self.dirty = false;
        self.appends_since_compact = 0;
        Ok(())
    }

    pub fn appends_since_compact(&self) -> u64 {
        self.appends_since_compact
    }

    /// Read every whole record from the start of the log. A missing file
    /// replays as empty.
    pub fn replay(path: &Path) -> io::Result<Replay> {
        let file = match File::open(path) {
            Ok(f) => f,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Replay::default()),
            Err(e) => return Err(e),
        };
        let file_len = file.metadata()?.len();
        let mut reader = BufReader::new(file);
        let mut replay = Replay::default();
        while let Some((event, size)) = next_record(&mut reader, file_len - replay.valid_len)? {
            replay.events.push(event);
            replay.valid_len += size;
        }
        replay.discarded = file_len - replay.valid_len;
        Ok(replay)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::*;
    use chrono::NaiveDate;
    use ulid::Ulid;

    fn tmp_path(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join("brewcal_test_wal");
        fs::create_dir_all(&dir).unwrap();
        let path = dir.join(name);
        let _ = fs::remove_file(&path);
        path
    }

    fn sample_run() -> BrewingRun {
        BrewingRun {
            id: Ulid::new(),
            title: "Märzen".into(),
            start: NaiveDate::from_ymd_opt(2025, 3, 3).unwrap(),
            brew_type: BrewType::BottomFermenting,
            transfer_override: None,
            tank: TankId(1),
            containers: [ContainerId(1), ContainerId(2), ContainerId(3)],
        }
    }

    fn cut_tail(path: &Path, bytes: u64) {
        let len = fs::metadata(path).unwrap().len();
        let file = OpenOptions::new().write(true).open(path).unwrap();
        file.set_len(len - bytes).unwrap();
    }

    #[test]
    fn append_and_replay() {
        let path = tmp_path("append_and_replay.wal");
        let run = sample_run();
        let events = vec![
            Event::RunBooked { run: run.clone() },
            Event::RunCancelled { id: run.id },
        ];

        {
            let (mut wal, replay) = Wal::open(&path).unwrap();
            assert!(replay.events.is_empty());
            for e in &events {
                wal.append(e).unwrap();
            }
            assert_eq!(wal.appends_since_compact(), 2);
        }

        let replay = Wal::replay(&path).unwrap();
        assert_eq!(replay.events, events);
        assert_eq!(replay.valid_len, fs::metadata(&path).unwrap().len());
        assert_eq!(replay.discarded, 0);
    }

    #[test]
    fn replay_missing_file_is_empty() {
        let path = tmp_path("never_written.wal");
        let replay = Wal::replay(&path).unwrap();
        assert!(replay.events.is_empty());
        assert_eq!(replay.valid_len, 0);
    }

    #[test]
    fn truncated_tail_is_discarded() {
        let path = tmp_path("truncated.wal");
        let first = Event::RunBooked { run: sample_run() };
        let first_len;
        {
            let (mut wal, _) = Wal::open(&path).unwrap();
            wal.append(&first).unwrap();
            first_len = fs::metadata(&path).unwrap().len();
            wal.append(&Event::RunBooked { run: sample_run() }).unwrap();
        }
        cut_tail(&path, 3);

        let replay = Wal::replay(&path).unwrap();
        assert_eq!(replay.events, vec![first]);
        assert_eq!(replay.valid_len, first_len);
        assert!(replay.discarded > 0);
    }

    #[test]
    fn corrupt_crc_stops_replay() {
        let path = tmp_path("corrupt.wal");
        let first = Event::RunBooked { run: sample_run() };
        {
            let (mut wal, _) = Wal::open(&path).unwrap();
            wal.append(&first).unwrap();
            wal.append(&Event::RunCancelled { id: Ulid::new() }).unwrap();
        }
        let mut bytes = fs::read(&path).unwrap();
        let last = bytes.len() - 1;
        bytes[last] ^= 0xff;
        fs::write(&path, &bytes).unwrap();

        assert_eq!(Wal::replay(&path).unwrap().events, vec![first]);
    }

    #[test]
    fn garbage_length_prefix_is_a_torn_tail() {
        let path = tmp_path("garbage_len.wal");
        let first = Event::RunBooked { run: sample_run() };
        {
            let (mut wal, _) = Wal::open(&path).unwrap();
            wal.append(&first).unwrap();
        }
        let mut bytes = fs::read(&path).unwrap();
        bytes.extend_from_slice(&u32::MAX.to_le_bytes());
        fs::write(&path, &bytes).unwrap();

        let replay = Wal::replay(&path).unwrap();
        assert_eq!(replay.events, vec![first]);
        assert_eq!(replay.discarded, 4);
    }

    #[test]
    fn open_cuts_torn_tail_before_appending() {
        let path = tmp_path("reopen_torn.wal");
        let first = Event::RunBooked { run: sample_run() };
        {
            let (mut wal, _) = Wal::open(&path).unwrap();
            wal.append(&first).unwrap();
            wal.append(&Event::RunBooked { run: sample_run() }).unwrap();
        }
        cut_tail(&path, 3);

        let after = Event::RunBooked { run: sample_run() };
        {
            let (mut wal, replay) = Wal::open(&path).unwrap();
            assert_eq!(replay.events, vec![first.clone()]);
            assert!(replay.discarded > 0);
            wal.append(&after).unwrap();
        }

        let replay = Wal::replay(&path).unwrap();
        assert_eq!(replay.events, vec![first, after]);
        assert_eq!(replay.discarded, 0);
    }

    #[test]
    fn failed_append_is_rolled_back() {
        let path = tmp_path("rollback.wal");
        let first = Event::RunBooked { run: sample_run() };
        let (mut wal, _) = Wal::open(&path).unwrap();
        wal.append(&first).unwrap();

        // Half a record reached the disk before the write failed.
        wal.file.write_all(&[7, 0, 0, 0, 1, 2]).unwrap();
        wal.dirty = true;

        let second = Event::RunCancelled { id: Ulid::new() };
        wal.append(&second).unwrap();
        let replay = Wal::replay(&path).unwrap();
        assert_eq!(replay.events, vec![first, second]);
        assert_eq!(replay.discarded, 0);
    }

    #[test]
    fn compact_replaces_log() {
        let path = tmp_path("compact.wal");
        let run = sample_run();
        let (mut wal, _) = Wal::open(&path).unwrap();
        for _ in 0..5 {
            wal.append(&Event::RunRescheduled { run: run.clone() }).unwrap();
        }
        let kept = vec![Event::RunBooked { run: run.clone() }];
        wal.compact(&kept).unwrap();
        assert_eq!(wal.appends_since_compact(), 0);

        // Appends after compaction land in the new file.
        wal.append(&Event::RunCancelled { id: run.id }).unwrap();
        let replay = Wal::replay(&path).unwrap();
        assert_eq!(replay.events.len(), 2);
        assert_eq!(replay.events[0], kept[0]);
        assert_eq!(wal.len, replay.valid_len);
        assert!(!path.with_extension("wal.tmp").exists());
    }
}
