//! Persisted embedding matrix.
//!
//! Layout (all integers little-endian):
//!
//! ```text
//! header (20 bytes): magic "TAVM" | version u16 | strategy u8 | pad u8 | dimension u32 | rows u64
//! dense row:         dimension x f32
//! sparse row:        nnz u32 | nnz x (index u32, value f32)
//! ```
//!
//! Rows are appended one chunk at a time. Every commit rewrites the file
//! into a temporary sibling and renames it over the original, so a reader
//! only ever observes a complete header and exactly `rows` rows.

use std::fs::{self, File};
use std::io::{BufWriter, Read, Write};
use std::path::{Path, PathBuf};

use memmap2::Mmap;
use tastyai_core::{TastyError, TastyResult};

use crate::embedding::EmbeddingStrategy;
use crate::tfidf::SparseVector;

/// File magic identifying a matrix file.
pub const MAGIC: [u8; 4] = *b"TAVM";
/// Current on-disk format version.
pub const FORMAT_VERSION: u16 = 1;
/// Size of the fixed header in bytes.
pub const HEADER_LEN: usize = 20;

/// Fixed-size header at the start of every matrix file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MatrixHeader {
    /// Strategy the rows were produced with.
    pub strategy: EmbeddingStrategy,
    /// Entries per dense row, or vocabulary size for sparse rows.
    pub dimension: u32,
    /// Committed row count.
    pub rows: u64,
}

impl MatrixHeader {
    /// Header for a matrix of `rows` rows. Fails when `dimension` exceeds `u32`.
    pub fn new(strategy: EmbeddingStrategy, dimension: usize, rows: u64) -> TastyResult<Self> {
        let dimension = u32::try_from(dimension).map_err(|_| {
            TastyError::InvalidArgument(format!("dimension {dimension} does not fit the matrix format"))
        })?;
        Ok(Self {
            strategy,
            dimension,
            rows,
        })
    }

    fn encode(&self) -> [u8; HEADER_LEN] {
        let mut out = [0u8; HEADER_LEN];
        out[0..4].copy_from_slice(&MAGIC);
        out[4..6].copy_from_slice(&FORMAT_VERSION.to_le_bytes());
        out[6] = self.strategy.tag();
        out[8..12].copy_from_slice(&self.dimension.to_le_bytes());
        out[12..20].copy_from_slice(&self.rows.to_le_bytes());
        out
    }

    fn decode(bytes: &[u8], path: &Path) -> TastyResult<Self> {
        if bytes.len() < HEADER_LEN {
            return Err(TastyError::corrupt(
                path,
                format!("file is {} bytes, shorter than the header", bytes.len()),
            ));
        }
        if bytes[0..4] != MAGIC {
            return Err(TastyError::corrupt(path, "not a matrix file (bad magic)"));
        }
        let version = read_u16(bytes, 4).unwrap_or_default();
        if version != FORMAT_VERSION {
            return Err(TastyError::corrupt(
                path,
                format!("unsupported format version {version}"),
            ));
        }
        let strategy = EmbeddingStrategy::from_tag(bytes[6]).ok_or_else(|| {
            TastyError::corrupt(path, format!("unknown strategy tag {}", bytes[6]))
        })?;
        Ok(Self {
            strategy,
            dimension: read_u32(bytes, 8).unwrap_or_default(),
            rows: read_u64(bytes, 12).unwrap_or_default(),
        })
    }

    /// Dimension as `usize`.
    pub fn dimension(&self) -> usize {
        self.dimension as usize
    }
}

fn read_u16(bytes: &[u8], at: usize) -> Option<u16> {
    let raw: [u8; 2] = bytes.get(at..at + 2)?.try_into().ok()?;
    Some(u16::from_le_bytes(raw))
}

fn read_u32(bytes: &[u8], at: usize) -> Option<u32> {
    let raw: [u8; 4] = bytes.get(at..at + 4)?.try_into().ok()?;
    Some(u32::from_le_bytes(raw))
}

fn read_u64(bytes: &[u8], at: usize) -> Option<u64> {
    let raw: [u8; 8] = bytes.get(at..at + 8)?.try_into().ok()?;
    Some(u64::from_le_bytes(raw))
}

fn read_f32(bytes: &[u8], at: usize) -> Option<f32> {
    read_u32(bytes, at).map(f32::from_bits)
}

/// Encode dense rows. Every row must have exactly `dimension` entries.
pub fn encode_dense(rows: &[Vec<f32>], dimension: usize) -> TastyResult<Vec<u8>> {
    let mut out = Vec::with_capacity(rows.len() * dimension * 4);
    for (i, row) in rows.iter().enumerate() {
        if row.len() != dimension {
            return Err(TastyError::Embedding(format!(
                "row {i} has {} values, expected {dimension}",
                row.len()
            )));
        }
        for v in row {
            out.extend_from_slice(&v.to_le_bytes());
        }
    }
    Ok(out)
}

/// Encode sparse rows.
pub fn encode_sparse(rows: &[SparseVector]) -> Vec<u8> {
    let size: usize = rows.iter().map(|r| 4 + r.nnz() * 8).sum();
    let mut out = Vec::with_capacity(size);
    for row in rows {
        out.extend_from_slice(&(row.nnz() as u32).to_le_bytes());
        for (i, v) in row.indices.iter().zip(&row.values) {
            out.extend_from_slice(&i.to_le_bytes());
            out.extend_from_slice(&v.to_le_bytes());
        }
    }
    out
}

fn temp_sibling(path: &Path) -> PathBuf {
    let mut name = path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}

fn commit(tmp: &Path, path: &Path, writer: BufWriter<File>) -> TastyResult<()> {
    let file = writer
        .into_inner()
        .map_err(std::io::IntoInnerError::into_error)?;
    file.sync_all()?;
    fs::rename(tmp, path)?;
    Ok(())
}

/// Write a header-only matrix with zero rows, replacing any existing file.
pub fn initialize(path: &Path, strategy: EmbeddingStrategy, dimension: usize) -> TastyResult<()> {
    let header = MatrixHeader::new(strategy, dimension, 0)?;
    let tmp = temp_sibling(path);
    let mut writer = BufWriter::new(File::create(&tmp)?);
    writer.write_all(&header.encode())?;
    commit(&tmp, path, writer)
}

/// Append an encoded chunk of `new_rows` rows and atomically replace the file.
///
/// The existing file must already carry a header for `strategy` and
/// `dimension` (see [`initialize`]). Returns the committed row count.
pub fn append_rows(
    path: &Path,
    strategy: EmbeddingStrategy,
    dimension: usize,
    new_rows: u64,
    body: &[u8],
) -> TastyResult<u64> {
    let mut existing = File::open(path)?;
    let mut head = [0u8; HEADER_LEN];
    existing
        .read_exact(&mut head)
        .map_err(|e| TastyError::corrupt(path, format!("cannot read header: {e}")))?;
    let current = MatrixHeader::decode(&head, path)?;
    if current.strategy != strategy || current.dimension() != dimension {
        return Err(TastyError::corrupt(
            path,
            format!(
                "cannot append {strategy} rows of {dimension} dims to a {} matrix of {} dims",
                current.strategy, current.dimension
            ),
        ));
    }

    let updated = MatrixHeader {
        rows: current.rows + new_rows,
        ..current
    };
    let tmp = temp_sibling(path);
    let mut writer = BufWriter::new(File::create(&tmp)?);
    writer.write_all(&updated.encode())?;
    std::io::copy(&mut existing, &mut writer)?;
    writer.write_all(body)?;
    commit(&tmp, path, writer)?;
    Ok(updated.rows)
}

/// Read only the header of a matrix file.
pub fn read_header(path: &Path) -> TastyResult<MatrixHeader> {
    let mut file = File::open(path)?;
    let mut head = [0u8; HEADER_LEN];
    file.read_exact(&mut head)
        .map_err(|e| TastyError::corrupt(path, format!("cannot read header: {e}")))?;
    MatrixHeader::decode(&head, path)
}

/// Cosine similarity between two vectors. Returns 0 when the lengths
/// differ or either vector has zero norm.
#[cfg(test)]
pub(crate) fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() {
        return 0.0;
    }
    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let na: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let nb: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if na == 0.0 || nb == 0.0 {
        0.0
    } else {
        dot / (na * nb)
    }
}

/// A read-only, memory-mapped matrix file.
///
/// Opening validates the whole layout up front; afterwards every row read
/// is in bounds.
pub struct MappedMatrix {
    mmap: Mmap,
    header: MatrixHeader,
    path: PathBuf,
    /// Byte offset of each row (sparse only).
    sparse_offsets: Vec<usize>,
}

impl std::fmt::Debug for MappedMatrix {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MappedMatrix")
            .field("path", &self.path)
            .field("header", &self.header)
            .finish()
    }
}

impl MappedMatrix {
    /// Map and validate a matrix file.
    pub fn open(path: &Path) -> TastyResult<Self> {
        let file = File::open(path)?;
        let len = file.metadata()?.len();
        if len < HEADER_LEN as u64 {
            return Err(TastyError::corrupt(
                path,
                format!("file is {len} bytes, shorter than the header"),
            ));
        }
        // SAFETY: the file is opened read-only and cache files are only ever
        // replaced by rename, never modified in place, so the mapped pages stay
        // valid for the lifetime of the map.
        let mmap = unsafe { memmap2::MmapOptions::new().map(&file)? };
        let header = MatrixHeader::decode(&mmap, path)?;
        let body_len = mmap.len() - HEADER_LEN;

        let sparse_offsets = match header.strategy {
            EmbeddingStrategy::Dense => {
                let expected = (header.rows as u128) * (header.dimension as u128) * 4;
                if body_len as u128 != expected {
                    return Err(TastyError::corrupt(
                        path,
                        format!(
                            "body is {body_len} bytes, expected {expected} for {} rows of {} dims",
                            header.rows, header.dimension
                        ),
                    ));
                }
                Vec::new()
            }
            EmbeddingStrategy::Sparse => scan_sparse(&mmap, &header, path)?,
        };

        Ok(Self {
            mmap,
            header,
            path: path.to_path_buf(),
            sparse_offsets,
        })
    }

    /// The validated header.
    pub fn header(&self) -> MatrixHeader {
        self.header
    }

    /// Committed row count.
    pub fn rows(&self) -> usize {
        self.header.rows as usize
    }

    /// Entries per row in dense form.
    pub fn dimension(&self) -> usize {
        self.header.dimension()
    }

    /// Strategy recorded in the header.
    pub fn strategy(&self) -> EmbeddingStrategy {
        self.header.strategy
    }

    /// File the matrix was mapped from.
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn dense_bytes(&self, row: usize) -> Option<&[u8]> {
        let width = self.dimension() * 4;
        let start = HEADER_LEN + row * width;
        self.mmap.get(start..start + width)
    }

    fn sparse_entries(&self, row: usize) -> Option<&[u8]> {
        let start = *self.sparse_offsets.get(row)?;
        let nnz = read_u32(&self.mmap, start)? as usize;
        self.mmap.get(start + 4..start + 4 + nnz * 8)
    }

    /// Row `row` expanded to a dense vector, or `None` past the last row.
    pub fn row_vector(&self, row: usize) -> Option<Vec<f32>> {
        if row >= self.rows() {
            return None;
        }
        match self.header.strategy {
            EmbeddingStrategy::Dense => Some(
                self.dense_bytes(row)?
                    .chunks_exact(4)
                    .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
                    .collect(),
            ),
            EmbeddingStrategy::Sparse => {
                let mut dense = vec![0.0f32; self.dimension()];
                for pair in self.sparse_entries(row)?.chunks_exact(8) {
                    let i = read_u32(pair, 0)? as usize;
                    if let Some(slot) = dense.get_mut(i) {
                        *slot = read_f32(pair, 4)?;
                    }
                }
                Some(dense)
            }
        }
    }

    /// Cosine similarity of `query` against every row, in row order.
    ///
    /// `query` must have the matrix dimension. Zero-norm rows score 0.
    pub fn cosine_scores(&self, query: &[f32]) -> TastyResult<Vec<f32>> {
        if query.len() != self.dimension() {
            return Err(TastyError::EmbeddingSpaceMismatch {
                expected: format!("{} dims", self.dimension()),
                found: format!("{} dims", query.len()),
            });
        }
        let query_norm = query.iter().map(|x| x * x).sum::<f32>().sqrt();
        let mut scores = Vec::with_capacity(self.rows());
        for row in 0..self.rows() {
            let (dot, row_norm_sq) = match self.header.strategy {
                EmbeddingStrategy::Dense => self.dense_dot(row, query),
                EmbeddingStrategy::Sparse => self.sparse_dot(row, query),
            };
            let denom = query_norm * row_norm_sq.sqrt();
            scores.push(if denom == 0.0 { 0.0 } else { dot / denom });
        }
        Ok(scores)
    }

    fn dense_dot(&self, row: usize, query: &[f32]) -> (f32, f32) {
        let Some(bytes) = self.dense_bytes(row) else {
            return (0.0, 0.0);
        };
        let mut dot = 0.0f32;
        let mut norm = 0.0f32;
        for (c, q) in bytes.chunks_exact(4).zip(query) {
            let v = f32::from_le_bytes([c[0], c[1], c[2], c[3]]);
            dot += v * q;
            norm += v * v;
        }
        (dot, norm)
    }

    fn sparse_dot(&self, row: usize, query: &[f32]) -> (f32, f32) {
        let Some(entries) = self.sparse_entries(row) else {
            return (0.0, 0.0);
        };
        let mut dot = 0.0f32;
        let mut norm = 0.0f32;
        for pair in entries.chunks_exact(8) {
            let (Some(i), Some(v)) = (read_u32(pair, 0), read_f32(pair, 4)) else {
                continue;
            };
            dot += v * query.get(i as usize).copied().unwrap_or_default();
            norm += v * v;
        }
        (dot, norm)
    }
}

/// Walk every sparse row once, checking bounds and recording offsets.
fn scan_sparse(bytes: &[u8], header: &MatrixHeader, path: &Path) -> TastyResult<Vec<usize>> {
    let rows = usize::try_from(header.rows)
        .map_err(|_| TastyError::corrupt(path, "row count overflows this platform"))?;
    let mut offsets = Vec::with_capacity(rows.min(bytes.len() / 4));
    let mut at = HEADER_LEN;
    for row in 0..rows {
        let nnz = read_u32(bytes, at).ok_or_else(|| {
            TastyError::corrupt(path, format!("truncated at row {row} of {rows}"))
        })? as usize;
        let end = at + 4 + nnz * 8;
        let entries = bytes.get(at + 4..end).ok_or_else(|| {
            TastyError::corrupt(path, format!("row {row} runs past the end of the file"))
        })?;
        for pair in entries.chunks_exact(8) {
            let index = read_u32(pair, 0).unwrap_or(u32::MAX);
            if index >= header.dimension {
                return Err(TastyError::corrupt(
                    path,
                    format!("row {row} has index {index} outside {} dims", header.dimension),
                ));
            }
        }
        offsets.push(at);
        at = end;
    }
    if at != bytes.len() {
        return Err(TastyError::corrupt(
            path,
            format!("{} trailing bytes after {rows} rows", bytes.len() - at),
        ));
    }
    Ok(offsets)
}
