//! Corpus access: chunked streaming for the builder and the materialized
//! recipe table shared by the ranker and filter.

use std::fs::File;
use std::io::{BufReader, Read};
use std::path::{Path, PathBuf};

use sha2::{Digest, Sha256};
use tastyai_core::{RecipeRecord, TastyError, TastyResult};

/// Columns every corpus file must carry.
pub const REQUIRED_COLUMNS: [&str; 4] = ["title", "ingredients", "directions", "NER"];

#[derive(Debug, Clone, Copy)]
struct ColumnIndex {
    title: usize,
    ingredients: usize,
    directions: usize,
    ner: usize,
}

/// Streams a corpus CSV in fixed-size chunks of parsed records.
pub struct CorpusReader {
    reader: csv::Reader<BufReader<File>>,
    columns: ColumnIndex,
    path: PathBuf,
    chunk_size: usize,
    rows_read: usize,
}

impl CorpusReader {
    /// Open `path` and validate the header. Fails with
    /// [`TastyError::CorpusFormat`] naming the first missing column.
    pub fn open(path: &Path, chunk_size: usize) -> TastyResult<Self> {
        let file = File::open(path)
            .map_err(|e| TastyError::corpus(path, format!("cannot open corpus: {e}")))?;
        let mut reader = csv::Reader::from_reader(BufReader::new(file));
        let headers = reader
            .headers()
            .map_err(|e| TastyError::corpus(path, format!("unreadable header row: {e}")))?
            .clone();

        let find = |name: &str| {
            headers
                .iter()
                .position(|h| h.trim() == name)
                .ok_or_else(|| TastyError::corpus(path, format!("missing required column '{name}'")))
        };
        let columns = ColumnIndex {
            title: find("title")?,
            ingredients: find("ingredients")?,
            directions: find("directions")?,
            ner: find("NER")?,
        };

        Ok(Self {
            reader,
            columns,
            path: path.to_path_buf(),
            chunk_size: chunk_size.max(1),
            rows_read: 0,
        })
    }

    /// Rows consumed so far.
    pub fn rows_read(&self) -> usize {
        self.rows_read
    }

    /// Next chunk of at most `chunk_size` records, or `None` at end of file.
    pub fn next_chunk(&mut self) -> TastyResult<Option<Vec<RecipeRecord>>> {
        let mut chunk = Vec::with_capacity(self.chunk_size.min(4096));
        let mut record = csv::StringRecord::new();
        while chunk.len() < self.chunk_size {
            let more = self.reader.read_record(&mut record).map_err(|e| {
                TastyError::corpus(
                    &self.path,
                    format!("malformed row {}: {e}", self.rows_read + 1),
                )
            })?;
            if !more {
                break;
            }
            let field = |i: usize| record.get(i).unwrap_or_default();
            chunk.push(RecipeRecord::from_raw(
                field(self.columns.title),
                field(self.columns.ingredients),
                field(self.columns.directions),
                field(self.columns.ner),
            ));
            self.rows_read += 1;
        }
        Ok((!chunk.is_empty()).then_some(chunk))
    }
}

/// The read-only recipe table, positionally aligned with the matrix rows.
#[derive(Debug, Clone, Default)]
pub struct RecipeCatalog {
    records: Vec<RecipeRecord>,
}

impl RecipeCatalog {
    /// Read the whole corpus into memory.
    pub fn load(path: &Path) -> TastyResult<Self> {
        let mut reader = CorpusReader::open(path, 50_000)?;
        let mut records = Vec::new();
        while let Some(chunk) = reader.next_chunk()? {
            records.extend(chunk);
        }
        tracing::debug!(path = %path.display(), rows = records.len(), "Recipe catalog loaded");
        Ok(Self { records })
    }

    /// Catalog over records already in memory.
    pub fn from_records(records: Vec<RecipeRecord>) -> Self {
        Self { records }
    }

    /// Record at `row`, matching the matrix row.
    pub fn get(&self, row: usize) -> Option<&RecipeRecord> {
        self.records.get(row)
    }

    /// Number of records.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Whether the corpus has no records.
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

/// Hex SHA-256 of the corpus file contents, streamed.
pub fn corpus_fingerprint(path: &Path) -> TastyResult<String> {
    let mut file = BufReader::new(File::open(path)?);
    let mut hasher = Sha256::new();
    let mut buf = [0u8; 64 * 1024];
    loop {
        let n = file.read(&mut buf)?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(hex::encode(hasher.finalize()))
}
