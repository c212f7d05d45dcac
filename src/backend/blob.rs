use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::color::HdrMetadata;

static NEXT_BLOB_ID: AtomicU64 = AtomicU64::new(1);

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BlobData {
    HdrMetadata(HdrMetadata),
    Bytes(Vec<u8>),
}

type DestroyHook = Box<dyn FnOnce(u64) + Send + Sync>;

/// Opaque data shared between the compositor and a backend.
///
/// Every blob has a process-unique id, so identity comparisons survive
/// re-wrapping. Dropping the last handle runs the creating backend's hook.
pub struct BackendBlob {
    id: u64,
    data: BlobData,
    on_destroy: Option<DestroyHook>,
}

impl BackendBlob {
    pub fn new(data: BlobData) -> Self {
        Self {
            id: NEXT_BLOB_ID.fetch_add(1, Ordering::Relaxed),
            data,
            on_destroy: None,
        }
    }

    pub fn with_destroy_hook(
        data: BlobData,
        hook: impl FnOnce(u64) + Send + Sync + 'static,
    ) -> Self {
        Self {
            id: NEXT_BLOB_ID.fetch_add(1, Ordering::Relaxed),
            data,
            on_destroy: Some(Box::new(hook)),
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn data(&self) -> &BlobData {
        &self.data
    }

    pub fn hdr_metadata(&self) -> Option<&HdrMetadata> {
        match &self.data {
            BlobData::HdrMetadata(meta) => Some(meta),
            BlobData::Bytes(_) => None,
        }
    }
}

impl fmt::Debug for BackendBlob {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BackendBlob")
            .field("id", &self.id)
            .field("data", &self.data)
            .finish_non_exhaustive()
    }
}

impl Drop for BackendBlob {
    fn drop(&mut self) {
        if let Some(hook) = self.on_destroy.take() {
            hook(self.id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicU64;
    use std::sync::Arc;

    #[test]
    fn test_blob_ids_are_unique() {
        let a = BackendBlob::new(BlobData::Bytes(vec![1]));
        let b = BackendBlob::new(BlobData::Bytes(vec![1]));
        assert_ne!(a.id(), b.id());
    }

    #[test]
    fn test_destroy_hook_runs_on_last_drop() {
        let destroyed = Arc::new(AtomicU64::new(0));
        let seen = destroyed.clone();
        let blob = Arc::new(BackendBlob::with_destroy_hook(
            BlobData::HdrMetadata(HdrMetadata::default()),
            move |id| seen.store(id, Ordering::SeqCst),
        ));
        let id = blob.id();
        let second = blob.clone();

        drop(blob);
        assert_eq!(destroyed.load(Ordering::SeqCst), 0);
        drop(second);
        assert_eq!(destroyed.load(Ordering::SeqCst), id);
    }
}
