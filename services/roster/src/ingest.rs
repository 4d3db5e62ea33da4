use std::{
    borrow::Cow,
    io::{BufRead, BufReader, Read},
};

use store::{DEFAULT_CONTENT_TYPE, KeyedRecordStore, ObjectStore};
use tracing::{debug, error, info, warn};
use url::Url;

use crate::{
    RosterError, StateGuard,
    parser::{LineRejected, parse_line},
    source::SourceFetcher,
};

pub const DEFAULT_SIZE_LIMIT_BYTES: usize = 1 << 20;
/// Largest configurable limit; the raw feed is buffered in memory for archival.
pub const MAX_SIZE_LIMIT_BYTES: usize = 1 << 30;

/// Counters for one load call.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct LoadReport {
    pub records_upserted: usize,
    pub records_failed: usize,
    pub lines_skipped: usize,
    pub fragments_skipped: usize,
    pub bytes_read: u64,
    pub archive_location: String,
}

/// Streams a feed into the table and archives the raw bytes.
pub struct IngestionEngine<'a> {
    table: &'a dyn KeyedRecordStore,
    objects: &'a dyn ObjectStore,
    fetcher: &'a dyn SourceFetcher,
    size_limit: usize,
}

impl<'a> IngestionEngine<'a> {
    pub fn new(
        table: &'a dyn KeyedRecordStore,
        objects: &'a dyn ObjectStore,
        fetcher: &'a dyn SourceFetcher,
        size_limit: usize,
    ) -> Self {
        Self {
            table,
            objects,
            fetcher,
            size_limit,
        }
    }

    /// Load the feed at `source_url` under the exclusive guard.
    ///
    /// Records are merged one at a time and stay committed whatever happens
    /// afterwards; a size-limit abort skips archival, an archival failure is
    /// reported after the merge.
    pub fn load(&self, guard: &StateGuard, source_url: &str) -> Result<LoadReport, RosterError> {
        let mut access = guard.exclusive();
        access.mark_dirty();

        let url = Url::parse(source_url).map_err(|err| {
            debug!(source_url, error = %err, "rejected load url");
            RosterError::invalid_input("invalid url")
        })?;

        let source = self.fetcher.fetch(&url).inspect_err(|err| {
            error!(%url, error = %err, "source fetch failed");
        })?;
        if let Some(declared) = source.content_length
            && declared > self.size_limit as u64
        {
            warn!(%url, declared, limit = self.size_limit, "declared length over size limit");
            return Err(RosterError::SizeLimitExceeded {
                limit: self.size_limit,
                observed: declared,
            });
        }
        let content_type = match source.content_types.as_slice() {
            [single] => single.clone(),
            _ => DEFAULT_CONTENT_TYPE.to_string(),
        };

        let mut report = LoadReport::default();
        let mut lines = BoundedLines::new(source.body, self.size_limit);
        for line in lines.by_ref() {
            let line = line.inspect_err(|err| {
                warn!(%url, error = %err, records = report.records_upserted, "load aborted mid-stream");
            })?;
            self.ingest_line(&line, &mut report);
        }
        let raw = lines.into_raw();
        report.bytes_read = raw.len() as u64;

        report.archive_location = self.objects.put(&raw, &content_type).map_err(|err| {
            error!(error = %err, "archival upload failed");
            RosterError::ArchivalFailed(err)
        })?;

        info!(
            %url,
            records_upserted = report.records_upserted,
            records_failed = report.records_failed,
            lines_skipped = report.lines_skipped,
            fragments_skipped = report.fragments_skipped,
            bytes_read = report.bytes_read,
            location = %report.archive_location,
            "load finished"
        );
        Ok(report)
    }

    fn ingest_line(&self, line: &str, report: &mut LoadReport) {
        let parsed = match parse_line(line) {
            Ok(parsed) => parsed,
            Err(LineRejected::Blank) => {
                report.lines_skipped += 1;
                return;
            }
            Err(LineRejected::MissingRowKey(_)) => {
                debug!(line, "invalid line");
                report.lines_skipped += 1;
                return;
            }
        };
        for fragment in &parsed.skipped_fragments {
            debug!(fragment = %fragment, "skipped attribute fragment");
        }
        report.fragments_skipped += parsed.skipped_fragments.len();

        match self.table.merge_upsert(&parsed.record) {
            Ok(()) => {
                report.records_upserted += 1;
                debug!(line, "processed");
            }
            Err(err) => {
                report.records_failed += 1;
                warn!(key = %parsed.record.key(), error = %err, "record upsert failed");
            }
        }
    }
}

/// Line iterator over a feed that keeps every byte read and stops with
/// [`RosterError::SizeLimitExceeded`] once more than `limit` bytes arrived.
struct BoundedLines<R> {
    reader: BufReader<std::io::Take<R>>,
    raw: Vec<u8>,
    limit: usize,
    done: bool,
}

impl<R: Read> BoundedLines<R> {
    fn new(reader: R, limit: usize) -> Self {
        Self {
            // One byte past the limit is enough to detect the overflow.
            reader: BufReader::new(reader.take((limit as u64).saturating_add(1))),
            raw: Vec::new(),
            limit,
            done: false,
        }
    }

    fn into_raw(self) -> Vec<u8> {
        self.raw
    }
}

impl<R: Read> Iterator for BoundedLines<R> {
    type Item = Result<String, RosterError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        let start = self.raw.len();
        match self.reader.read_until(b'\n', &mut self.raw) {
            Ok(0) => {
                self.done = true;
                None
            }
            Ok(_) if self.raw.len() > self.limit => {
                self.done = true;
                Some(Err(RosterError::SizeLimitExceeded {
                    limit: self.limit,
                    observed: self.raw.len() as u64,
                }))
            }
            Ok(_) => {
                let line = &self.raw[start..];
                let line = line.strip_suffix(b"\n").unwrap_or(line);
                let line = line.strip_suffix(b"\r").unwrap_or(line);
                let text = String::from_utf8_lossy(line);
                if matches!(text, Cow::Owned(_)) {
                    debug!(
                        offset = start,
                        len = line.len(),
                        "replaced invalid UTF-8 in feed line"
                    );
                }
                Some(Ok(text.into_owned()))
            }
            Err(err) => {
                self.done = true;
                Some(Err(RosterError::SourceUnavailable {
                    status: None,
                    detail: format!("error while reading source: {err}"),
                }))
            }
        }
    }
}
