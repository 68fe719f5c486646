//! Media upload: an opaque blob store behind a one-shot upload token.
//!
//! The gateway mints a UPT (see `tokens.rs`) scoped to a session; presenting
//! it here both authorizes and consumes the upload in one step. Storage
//! itself is content-addressed the same way the teacher addresses package
//! tarballs (`dashflow-registry/src/content_hash.rs`), so a re-upload of
//! identical bytes is a cheap no-op rather than a duplicate blob.

use std::sync::Arc;

use dashmap::DashMap;
use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::error::{AppError, Result};

/// An opaque reference to an uploaded blob, handed back to the client and
/// later embedded in an [`crate::answer::AnswerPayload::Voice`] payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlobRef(pub String);

impl BlobRef {
    fn for_bytes(bytes: &[u8]) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(bytes);
        Self(format!("sha256:{}", hex::encode(hasher.finalize())))
    }
}

struct StoredBlob {
    bytes: Vec<u8>,
    content_type: String,
}

/// Tracks which upload tokens (by jti) have already been consumed, and
/// holds the uploaded bytes themselves.
pub struct UploadStore {
    consumed_tokens: DashMap<Uuid, ()>,
    blobs: Arc<DashMap<String, StoredBlob>>,
}

impl UploadStore {
    pub fn new() -> Self {
        Self {
            consumed_tokens: DashMap::new(),
            blobs: Arc::new(DashMap::new()),
        }
    }

    /// Consume `token_id` and store `bytes`, returning its [`BlobRef`].
    /// Rejects a second call with the same `token_id` since UPTs are
    /// single-use by design (see `tokens.rs`'s `Audience::is_single_use`).
    pub fn upload(&self, token_id: Uuid, bytes: Vec<u8>, content_type: String) -> Result<BlobRef> {
        if self.consumed_tokens.contains_key(&token_id) {
            return Err(AppError::TokenAlreadyUsed);
        }
        self.consumed_tokens.insert(token_id, ());

        let blob_ref = BlobRef::for_bytes(&bytes);
        self.blobs
            .entry(blob_ref.0.clone())
            .or_insert_with(|| StoredBlob { bytes, content_type });
        Ok(blob_ref)
    }

    pub fn fetch(&self, blob_ref: &BlobRef) -> Option<(Vec<u8>, String)> {
        self.blobs
            .get(&blob_ref.0)
            .map(|b| (b.bytes.clone(), b.content_type.clone()))
    }
}

impl Default for UploadStore {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn upload_then_fetch_round_trips() {
        let store = UploadStore::new();
        let token_id = Uuid::new_v4();
        let blob_ref = store
            .upload(token_id, b"hello".to_vec(), "audio/webm".into())
            .unwrap();
        let (bytes, content_type) = store.fetch(&blob_ref).unwrap();
        assert_eq!(bytes, b"hello");
        assert_eq!(content_type, "audio/webm");
    }

    #[test]
    fn same_token_cannot_upload_twice() {
        let store = UploadStore::new();
        let token_id = Uuid::new_v4();
        store
            .upload(token_id, b"a".to_vec(), "audio/webm".into())
            .unwrap();
        let err = store
            .upload(token_id, b"b".to_vec(), "audio/webm".into())
            .unwrap_err();
        assert!(matches!(err, AppError::TokenAlreadyUsed));
    }

    #[test]
    fn identical_bytes_reuse_the_same_blob() {
        let store = UploadStore::new();
        let ref1 = store
            .upload(Uuid::new_v4(), b"same".to_vec(), "audio/webm".into())
            .unwrap();
        let ref2 = store
            .upload(Uuid::new_v4(), b"same".to_vec(), "audio/webm".into())
            .unwrap();
        assert_eq!(ref1, ref2);
    }
}
