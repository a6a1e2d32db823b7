use crate::error::SourceError;
use async_trait::async_trait;
use bytes::Bytes;
use model::TemporalRange;
use serde::{Deserialize, Serialize};
use std::{ops::Range, path::PathBuf, sync::Arc};

/// Shape and layout of an addressable input.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceDescriptor {
    pub path: Option<PathBuf>,
    pub dataset: String,
    /// Full shape; the leading dimension is the one chunks are cut along.
    pub shape: Vec<u64>,
    pub dtype: String,
    /// Size of one element in bytes.
    pub element_size: u64,
}

impl SourceDescriptor {
    pub fn new(dataset: impl Into<String>, shape: Vec<u64>, dtype: impl Into<String>, element_size: u64) -> Self {
        Self {
            path: None,
            dataset: dataset.into(),
            shape,
            dtype: dtype.into(),
            element_size,
        }
    }

    pub fn with_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.path = Some(path.into());
        self
    }

    /// Number of elements along the leading dimension.
    pub fn leading_extent(&self) -> u64 {
        self.shape.first().copied().unwrap_or(0)
    }

    pub fn trailing_shape(&self) -> &[u64] {
        self.shape.get(1..).unwrap_or(&[])
    }

    /// Bytes occupied by one step along the leading dimension.
    pub fn row_bytes(&self) -> u64 {
        self.trailing_shape()
            .iter()
            .fold(self.element_size, |acc, dim| acc.saturating_mul(*dim))
    }

    pub fn total_bytes(&self) -> u64 {
        self.row_bytes().saturating_mul(self.leading_extent())
    }

    /// Shape of a chunk covering `rows` leading elements.
    pub fn chunk_shape(&self, rows: u64) -> Vec<u64> {
        std::iter::once(rows)
            .chain(self.trailing_shape().iter().copied())
            .collect()
    }

    /// Structural signature: element type plus trailing shape.
    pub fn fingerprint(&self) -> String {
        let mut h = blake3::Hasher::new();
        h.update(self.dtype.as_bytes());
        h.update(b":");
        h.update(&self.element_size.to_le_bytes());
        for dim in self.trailing_shape() {
            h.update(b":");
            h.update(&dim.to_le_bytes());
        }
        format!("fp-{}", &h.finalize().to_hex()[..16])
    }
}

/// An input that can be read in slices along its leading dimension.
#[async_trait]
pub trait DataSource: Send + Sync {
    fn descriptor(&self) -> &SourceDescriptor;

    /// Reads the elements `range` along the leading dimension.
    async fn read(&self, range: Range<u64>) -> Result<Bytes, SourceError>;

    /// Time span covered by `range`, when the data has a time axis.
    fn temporal_range(&self, _range: Range<u64>) -> Option<TemporalRange> {
        None
    }

    /// Structural fingerprint of `range`. Sources whose layout changes
    /// partway through override this.
    fn fingerprint(&self, _range: Range<u64>) -> String {
        self.descriptor().fingerprint()
    }
}

/// The subject handed to checkers.
#[derive(Clone)]
pub struct ValidationInput {
    source: Arc<dyn DataSource>,
}

impl ValidationInput {
    pub fn new(source: Arc<dyn DataSource>) -> Self {
        Self { source }
    }

    pub fn from_source(source: impl DataSource + 'static) -> Self {
        Self::new(Arc::new(source))
    }

    pub fn source(&self) -> &Arc<dyn DataSource> {
        &self.source
    }

    pub fn descriptor(&self) -> &SourceDescriptor {
        self.source.descriptor()
    }

    pub fn total_bytes(&self) -> u64 {
        self.descriptor().total_bytes()
    }

    pub async fn read_all(&self) -> Result<Bytes, SourceError> {
        self.source.read(0..self.descriptor().leading_extent()).await
    }
}

impl std::fmt::Debug for ValidationInput {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ValidationInput")
            .field("descriptor", self.descriptor())
            .finish()
    }
}

/// Already-loaded buffer with an optional regular time axis.
#[derive(Debug, Clone)]
pub struct InMemorySource {
    descriptor: SourceDescriptor,
    data: Bytes,
    time_axis: Option<(f64, f64)>,
}

impl InMemorySource {
    pub fn new(descriptor: SourceDescriptor, data: impl Into<Bytes>) -> Result<Self, SourceError> {
        let data = data.into();
        let expected = descriptor.total_bytes();
        if data.len() as u64 != expected {
            return Err(SourceError::SizeMismatch {
                expected,
                actual: data.len() as u64,
            });
        }
        Ok(Self {
            descriptor,
            data,
            time_axis: None,
        })
    }

    /// Zero-filled buffer matching `descriptor`.
    pub fn zeroed(descriptor: SourceDescriptor) -> Self {
        let len = descriptor.total_bytes() as usize;
        Self {
            descriptor,
            data: Bytes::from(vec![0u8; len]),
            time_axis: None,
        }
    }

    /// Leading element `i` sits at time `origin + i * step`.
    pub fn with_time_axis(mut self, origin: f64, step: f64) -> Self {
        self.time_axis = Some((origin, step));
        self
    }
}

#[async_trait]
impl DataSource for InMemorySource {
    fn descriptor(&self) -> &SourceDescriptor {
        &self.descriptor
    }

    async fn read(&self, range: Range<u64>) -> Result<Bytes, SourceError> {
        let extent = self.descriptor.leading_extent();
        if range.start > range.end || range.end > extent {
            return Err(SourceError::OutOfBounds {
                start: range.start,
                end: range.end,
                extent,
            });
        }
        let row = self.descriptor.row_bytes();
        let from = (range.start * row) as usize;
        let to = (range.end * row) as usize;
        Ok(self.data.slice(from..to))
    }

    fn temporal_range(&self, range: Range<u64>) -> Option<TemporalRange> {
        let (origin, step) = self.time_axis?;
        if range.start >= range.end {
            return None;
        }
        Some(TemporalRange::new(
            origin + range.start as f64 * step,
            origin + range.end as f64 * step,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn descriptor() -> SourceDescriptor {
        SourceDescriptor::new("voltage", vec![10, 4], "f32", 4)
    }

    #[test]
    fn test_descriptor_layout() {
        let d = descriptor();
        assert_eq!(d.leading_extent(), 10);
        assert_eq!(d.row_bytes(), 16);
        assert_eq!(d.total_bytes(), 160);
        assert_eq!(d.chunk_shape(3), vec![3, 4]);
    }

    #[test]
    fn test_fingerprint_tracks_structure_not_extent() {
        let a = SourceDescriptor::new("v", vec![10, 4], "f32", 4);
        let b = SourceDescriptor::new("v", vec![99, 4], "f32", 4);
        let c = SourceDescriptor::new("v", vec![10, 5], "f32", 4);
        let d = SourceDescriptor::new("v", vec![10, 4], "i32", 4);

        assert_eq!(a.fingerprint(), b.fingerprint());
        assert_ne!(a.fingerprint(), c.fingerprint());
        assert_ne!(a.fingerprint(), d.fingerprint());
    }

    #[test]
    fn test_in_memory_rejects_wrong_size() {
        let err = InMemorySource::new(descriptor(), vec![0u8; 10]).unwrap_err();
        assert!(matches!(err, SourceError::SizeMismatch { expected: 160, actual: 10 }));
    }

    #[tokio::test]
    async fn test_in_memory_read_slices_rows() {
        let data: Vec<u8> = (0..160).map(|i| i as u8).collect();
        let source = InMemorySource::new(descriptor(), data).unwrap();

        let slice = source.read(2..4).await.unwrap();
        assert_eq!(slice.len(), 32);
        assert_eq!(slice[0], 32);

        assert!(matches!(
            source.read(8..11).await,
            Err(SourceError::OutOfBounds { extent: 10, .. })
        ));
    }

    #[test]
    fn test_time_axis() {
        let source = InMemorySource::zeroed(descriptor()).with_time_axis(100.0, 0.5);
        assert_eq!(source.temporal_range(0..4), Some(TemporalRange::new(100.0, 102.0)));
        assert_eq!(source.temporal_range(4..8).map(|t| t.start), Some(102.0));
        assert_eq!(source.temporal_range(4..4), None);
        assert_eq!(InMemorySource::zeroed(descriptor()).temporal_range(0..4), None);
    }
}
