//! Header log file.
//!
//! Every line is `\n`-terminated and holds up to [`BATCH_SIZE`] records
//! separated by `;`. A record is `number,timestamp,prevHeaderHash,txRoot,receiptsRoot`
//! with hashes as `0x` hex. Every line but the last holds exactly
//! [`BATCH_SIZE`] records; a shorter last line is the persisted tail cache.
use std::fs::{File, OpenOptions, create_dir_all};
use std::io::{BufRead, BufReader, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use relay_primitives::{Hash32, Header};
use tracing::{debug, warn};

use super::{BATCH_SIZE, Store};
use crate::error::StoreError;

const RECORD_SEP: char = ';';
const FIELD_SEP: char = ',';

pub struct FileStore {
    path: PathBuf,
    /// Records in complete, immutable batch lines.
    flushed: u64,
    /// Byte length of the complete batch lines; the tail line starts here.
    flushed_bytes: u64,
    tail: Vec<Header>,
}

impl FileStore {
    /// Opens the log at `path`, creating it if needed, and rebuilds the tail
    /// cache from its last line.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, StoreError> {
        let p = path.as_ref().to_path_buf();
        if let Some(dir) = p.parent()
            && !dir.exists()
        {
            create_dir_all(dir)?;
        }
        if !p.exists() {
            File::create(&p)?;
        }

        let mut store = FileStore {
            path: p,
            flushed: 0,
            flushed_bytes: 0,
            tail: Vec::new(),
        };

        let mut reader = BufReader::new(File::open(&store.path)?);
        let mut line = String::new();
        let mut line_no = 0usize;
        loop {
            line.clear();
            let n = reader.read_line(&mut line)?;
            if n == 0 {
                break;
            }
            line_no += 1;

            // Lines are always written whole, so an unterminated one is a torn write.
            // Its headers will be fetched again.
            let Some(text) = line.strip_suffix('\n') else {
                warn!(
                    path = %store.path.display(),
                    line = line_no,
                    "discarding torn trailing line in header log"
                );
                break;
            };

            if !store.tail.is_empty() {
                return Err(StoreError::Corrupt {
                    line: line_no - 1,
                    reason: "incomplete batch is not the last line".to_string(),
                });
            }

            let records = decode_line(text, store.flushed)
                .map_err(|reason| StoreError::Corrupt { line: line_no, reason })?;
            if records.len() == BATCH_SIZE {
                store.flushed += BATCH_SIZE as u64;
                store.flushed_bytes += n as u64;
            } else {
                store.tail = records;
            }
        }

        debug!(
            path = %store.path.display(),
            flushed = store.flushed,
            tail = store.tail.len(),
            "opened header log"
        );
        Ok(store)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Opens the log for writing positioned at the end of the last flushed
    /// batch, discarding whatever followed it.
    fn reopen_after_flushed(&self) -> Result<File, StoreError> {
        let mut file = OpenOptions::new().write(true).open(&self.path)?;
        file.set_len(self.flushed_bytes)?;
        file.seek(SeekFrom::Start(self.flushed_bytes))?;
        Ok(file)
    }

    fn read_batches(&self, first_line: u64, count: u64) -> Result<Vec<Header>, StoreError> {
        let reader = BufReader::new(File::open(&self.path)?);
        let mut out = Vec::with_capacity(count as usize * BATCH_SIZE);
        for (idx, line) in reader
            .lines()
            .enumerate()
            .skip(first_line as usize)
            .take(count as usize)
        {
            let line = line?;
            let base = idx as u64 * BATCH_SIZE as u64;
            let records = decode_line(&line, base)
                .map_err(|reason| StoreError::Corrupt { line: idx + 1, reason })?;
            out.extend(records);
        }
        if out.len() as u64 != count * BATCH_SIZE as u64 {
            return Err(StoreError::Corrupt {
                line: (first_line + count) as usize,
                reason: "header log is shorter than its flushed batches".to_string(),
            });
        }
        Ok(out)
    }
}

impl Store for FileStore {
    fn append(&mut self, headers: &[Header]) -> Result<usize, StoreError> {
        let mut next = self.highest_stored();
        let mut fresh = Vec::new();
        for header in headers {
            if header.number < next {
                continue;
            }
            if header.number != next {
                return Err(StoreError::NonContiguous {
                    expected: next,
                    found: header.number,
                });
            }
            fresh.push(*header);
            next += 1;
        }
        if fresh.is_empty() {
            return Ok(0);
        }
        let appended = fresh.len();

        let mut pending = self.tail.clone();
        pending.extend(fresh);

        let mut file = self.reopen_after_flushed()?;
        let mut flushed = self.flushed;
        let mut flushed_bytes = self.flushed_bytes;

        let mut batches = pending.chunks_exact(BATCH_SIZE);
        for batch in &mut batches {
            let line = encode_line(batch);
            file.write_all(line.as_bytes())?;
            flushed += BATCH_SIZE as u64;
            flushed_bytes += line.len() as u64;
        }
        let remainder = batches.remainder().to_vec();
        if !remainder.is_empty() {
            file.write_all(encode_line(&remainder).as_bytes())?;
        }
        file.sync_data()?;

        self.flushed = flushed;
        self.flushed_bytes = flushed_bytes;
        self.tail = remainder;
        Ok(appended)
    }

    fn load(&self, start: u64, end: u64) -> Result<Vec<Header>, StoreError> {
        if start > end {
            return Err(StoreError::InvalidRange { start, end });
        }
        let highest = self.highest_stored();
        if end > highest {
            return Err(StoreError::NotSynced {
                requested: end,
                highest,
            });
        }
        if start == end {
            return Ok(Vec::new());
        }

        let mut out = Vec::with_capacity((end - start) as usize);
        if start < self.flushed {
            let batch = BATCH_SIZE as u64;
            let first_line = start / batch;
            let last_line = (end.min(self.flushed) - 1) / batch;
            let records = self.read_batches(first_line, last_line - first_line + 1)?;
            out.extend(
                records
                    .into_iter()
                    .filter(|h| h.number >= start && h.number < end),
            );
        }
        out.extend(
            self.tail
                .iter()
                .filter(|h| h.number >= start && h.number < end),
        );
        Ok(out)
    }

    fn highest_stored(&self) -> u64 {
        self.flushed + self.tail.len() as u64
    }

    fn tail(&self) -> &[Header] {
        &self.tail
    }

    fn clear_tail(&mut self) -> Result<(), StoreError> {
        let file = self.reopen_after_flushed()?;
        file.sync_data()?;
        self.tail.clear();
        Ok(())
    }
}

fn encode_line(records: &[Header]) -> String {
    let mut line = records
        .iter()
        .map(|h| {
            format!(
                "{}{FIELD_SEP}{}{FIELD_SEP}{}{FIELD_SEP}{}{FIELD_SEP}{}",
                h.number, h.timestamp, h.prev_header_hash, h.tx_root, h.receipts_root
            )
        })
        .collect::<Vec<_>>()
        .join(&RECORD_SEP.to_string());
    line.push('\n');
    line
}

/// Decodes one line whose first record must be block `first`.
fn decode_line(line: &str, first: u64) -> Result<Vec<Header>, String> {
    let mut out = Vec::with_capacity(BATCH_SIZE);
    for (i, record) in line.split(RECORD_SEP).enumerate() {
        if i == BATCH_SIZE {
            return Err(format!("more than {BATCH_SIZE} records"));
        }
        let header = decode_record(record)?;
        let expected = first + i as u64;
        if header.number != expected {
            return Err(format!(
                "record {i} is block {}, expected {expected}",
                header.number
            ));
        }
        out.push(header);
    }
    Ok(out)
}

fn decode_record(record: &str) -> Result<Header, String> {
    let fields: Vec<&str> = record.split(FIELD_SEP).collect();
    let [number, timestamp, prev, tx, receipts] = fields[..] else {
        return Err(format!("expected 5 fields, found {}", fields.len()));
    };
    let hash = |s: &str| s.parse::<Hash32>().map_err(|e| format!("{s:?}: {e}"));
    Ok(Header {
        number: number.parse().map_err(|e| format!("number {number:?}: {e}"))?,
        timestamp: timestamp
            .parse()
            .map_err(|e| format!("timestamp {timestamp:?}: {e}"))?,
        prev_header_hash: hash(prev)?,
        tx_root: hash(tx)?,
        receipts_root: hash(receipts)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn header(number: u64) -> Header {
        Header {
            number,
            timestamp: 1_000 + number,
            prev_header_hash: Hash32([(number % 256) as u8; 32]),
            tx_root: Hash32([1; 32]),
            receipts_root: Hash32([2; 32]),
        }
    }

    fn headers(range: std::ops::Range<u64>) -> Vec<Header> {
        range.map(header).collect()
    }

    #[test]
    fn line_codec_round_trips_and_checks_numbering() {
        let hs = headers(5..8);
        let line = encode_line(&hs);
        assert!(line.ends_with('\n'));
        assert_eq!(decode_line(line.trim_end(), 5).unwrap(), hs);
        assert!(decode_line(line.trim_end(), 4).is_err());
        assert!(decode_line("1,2,3", 1).is_err());
    }

    #[test]
    fn append_flushes_full_batches_and_keeps_remainder() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = FileStore::open(dir.path().join("headers.log")).unwrap();

        assert_eq!(store.append(&headers(0..130)).unwrap(), 130);
        assert_eq!(store.highest_stored(), 130);
        assert_eq!(store.tail().len(), 30);

        assert_eq!(store.append(&headers(130..200)).unwrap(), 70);
        assert_eq!(store.tail().len(), 0);

        let contents = std::fs::read_to_string(store.path()).unwrap();
        assert_eq!(contents.lines().count(), 2);
    }

    #[test]
    fn append_is_idempotent_and_rejects_gaps() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = FileStore::open(dir.path().join("headers.log")).unwrap();

        store.append(&headers(0..50)).unwrap();
        assert_eq!(store.append(&headers(0..50)).unwrap(), 0);
        assert_eq!(store.append(&headers(40..60)).unwrap(), 10);
        assert!(matches!(
            store.append(&headers(61..70)),
            Err(StoreError::NonContiguous {
                expected: 60,
                found: 61
            })
        ));
        assert_eq!(store.load(0, 60).unwrap(), headers(0..60));
    }

    #[test]
    fn load_spans_batches_and_tail() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = FileStore::open(dir.path().join("headers.log")).unwrap();
        store.append(&headers(0..250)).unwrap();

        assert_eq!(store.load(95, 205).unwrap(), headers(95..205));
        assert_eq!(store.load(230, 250).unwrap(), headers(230..250));
        assert_eq!(store.load(100, 200).unwrap(), headers(100..200));
        assert!(store.load(7, 7).unwrap().is_empty());
        assert!(matches!(
            store.load(0, 251),
            Err(StoreError::NotSynced {
                requested: 251,
                highest: 250
            })
        ));
        assert!(matches!(
            store.load(9, 3),
            Err(StoreError::InvalidRange { start: 9, end: 3 })
        ));
    }

    #[test]
    fn torn_trailing_line_is_discarded_on_open() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("headers.log");
        {
            let mut store = FileStore::open(&path).unwrap();
            store.append(&headers(0..100)).unwrap();
        }
        let mut file = OpenOptions::new().append(true).open(&path).unwrap();
        file.write_all(b"100,1100,0x64").unwrap();
        drop(file);

        let mut store = FileStore::open(&path).unwrap();
        assert_eq!(store.highest_stored(), 100);
        assert!(store.tail().is_empty());

        store.append(&headers(100..105)).unwrap();
        let reopened = FileStore::open(&path).unwrap();
        assert_eq!(reopened.load(0, 105).unwrap(), headers(0..105));
    }

    #[test]
    fn short_line_before_the_end_is_corrupt() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("headers.log");
        let mut contents = encode_line(&headers(0..3));
        contents.push_str(&encode_line(&headers(3..5)));
        std::fs::write(&path, contents).unwrap();

        assert!(matches!(
            FileStore::open(&path),
            Err(StoreError::Corrupt { line: 1, .. })
        ));
    }
}
