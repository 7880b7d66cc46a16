//! Memory-mapped vector file backing the flat index.
//!
//! # Storage Format
//!
//! - Header (16 bytes): magic `VSIX`, version, dimension, vector count
//! - Records: `u32` verse id followed by `dimension` f32 values, all
//!   little-endian, in id order
//!
//! The file is written in one pass and never appended to afterwards; a
//! rebuilt index gets a fresh file.

use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::Path;

use memmap2::{Mmap, MmapOptions};

use crate::vector::{VectorDimension, VectorError, VerseId};

/// Current storage format version.
const STORAGE_VERSION: u32 = 1;

/// Size of the storage header in bytes.
const HEADER_SIZE: usize = 16;

/// Magic bytes to identify vector storage files.
const MAGIC_BYTES: &[u8; 4] = b"VSIX";

const BYTES_PER_F32: usize = 4;
const BYTES_PER_ID: usize = 4;

/// Read-only, memory-mapped view of a vector file.
#[derive(Debug)]
pub struct MmapVectorStorage {
    mmap: Mmap,
    dimension: VectorDimension,
    vector_count: usize,
}

impl MmapVectorStorage {
    /// Writes `vectors` to a new file at `path`, replacing any existing file.
    pub fn write(
        path: &Path,
        dimension: VectorDimension,
        vectors: &[(VerseId, &[f32])],
    ) -> Result<(), VectorError> {
        for (_, vector) in vectors {
            dimension.validate_vector(vector)?;
        }
        let count = u32::try_from(vectors.len())
            .map_err(|_| VectorError::InvalidFormat("Too many vectors for one file".into()))?;
        let dim = u32::try_from(dimension.get())
            .map_err(|_| VectorError::InvalidFormat("Dimension does not fit in u32".into()))?;

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let mut writer = BufWriter::new(File::create(path)?);
        writer.write_all(MAGIC_BYTES)?;
        writer.write_all(&STORAGE_VERSION.to_le_bytes())?;
        writer.write_all(&dim.to_le_bytes())?;
        writer.write_all(&count.to_le_bytes())?;

        for (id, vector) in vectors {
            writer.write_all(&id.to_bytes())?;
            for &value in *vector {
                writer.write_all(&value.to_le_bytes())?;
            }
        }

        writer
            .into_inner()
            .map_err(|e| VectorError::Storage(e.into_error()))?
            .sync_all()?;
        Ok(())
    }

    /// Opens and validates an existing vector file.
    ///
    /// Fails if the file is missing, has the wrong magic or version, or its
    /// length disagrees with the header.
    pub fn open(path: &Path) -> Result<Self, VectorError> {
        if !path.exists() {
            return Err(VectorError::Storage(io::Error::new(
                io::ErrorKind::NotFound,
                format!("Vector storage file not found: {}", path.display()),
            )));
        }

        let file = File::open(path)?;
        let mmap = unsafe { MmapOptions::new().map(&file)? };

        let (version, dimension, vector_count) = Self::read_header(&mmap)?;
        if version != STORAGE_VERSION {
            return Err(VectorError::VersionMismatch {
                expected: STORAGE_VERSION,
                actual: version,
            });
        }

        // Header values are untrusted; a corrupt count or dimension must not overflow
        let expected_len = dimension
            .get()
            .checked_mul(BYTES_PER_F32)
            .and_then(|n| n.checked_add(BYTES_PER_ID))
            .and_then(|record| record.checked_mul(vector_count))
            .and_then(|n| n.checked_add(HEADER_SIZE))
            .ok_or_else(|| {
                VectorError::InvalidFormat(format!(
                    "Header size overflow: {vector_count} vectors of dimension {}",
                    dimension.get()
                ))
            })?;
        if mmap.len() != expected_len {
            return Err(VectorError::InvalidFormat(format!(
                "Expected {expected_len} bytes for {vector_count} vectors, found {}",
                mmap.len()
            )));
        }

        Ok(Self {
            mmap,
            dimension,
            vector_count,
        })
    }

    /// Reads all vectors in file order.
    pub fn read_all_vectors(&self) -> Vec<(VerseId, Vec<f32>)> {
        let dimension = self.dimension.get();
        let record_size = Self::record_size(self.dimension);

        self.mmap[HEADER_SIZE..]
            .chunks_exact(record_size)
            .map(|record| {
                let id = VerseId::from_bytes([record[0], record[1], record[2], record[3]]);
                let vector = record[BYTES_PER_ID..]
                    .chunks_exact(BYTES_PER_F32)
                    .take(dimension)
                    .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
                    .collect();
                (id, vector)
            })
            .collect()
    }

    #[must_use]
    pub fn vector_count(&self) -> usize {
        self.vector_count
    }

    #[must_use]
    pub fn dimension(&self) -> VectorDimension {
        self.dimension
    }

    /// Bytes per record; only called once `open` has checked the file length.
    fn record_size(dimension: VectorDimension) -> usize {
        BYTES_PER_ID + dimension.get() * BYTES_PER_F32
    }

    fn read_header(mmap: &Mmap) -> Result<(u32, VectorDimension, usize), VectorError> {
        if mmap.len() < HEADER_SIZE {
            return Err(VectorError::InvalidFormat(
                "File too small to contain header".to_string(),
            ));
        }

        if &mmap[0..4] != MAGIC_BYTES {
            return Err(VectorError::InvalidFormat("Invalid magic bytes".to_string()));
        }

        let version = u32::from_le_bytes([mmap[4], mmap[5], mmap[6], mmap[7]]);
        let dim_value = u32::from_le_bytes([mmap[8], mmap[9], mmap[10], mmap[11]]);
        let dimension = VectorDimension::new(dim_value as usize)?;
        let vector_count = u32::from_le_bytes([mmap[12], mmap[13], mmap[14], mmap[15]]) as usize;

        Ok((version, dimension, vector_count))
    }
}
