use crate::disc::models::DiscIdentity;
use crate::metadata::error::MetadataResult;
use async_trait::async_trait;
use log::warn;

pub mod error;
pub mod models;

pub use models::Metadata;

/// Looks up album information for an identified disc.
///
/// Implementations own their transport and caching. `Ok(None)` means the disc is unknown.
#[async_trait]
pub trait MetadataResolver: Send + Sync {
    async fn resolve(&self, identity: &DiscIdentity) -> MetadataResult<Option<Metadata>>;
}

/// Resolver that knows no discs.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullResolver;

#[async_trait]
impl MetadataResolver for NullResolver {
    async fn resolve(&self, _identity: &DiscIdentity) -> MetadataResult<Option<Metadata>> {
        Ok(None)
    }
}

/// Makes sure the returned record describes `identity`, falling back to empty metadata.
///
/// A track list that does not match the physical track count is dropped.
pub fn reconcile(identity: &DiscIdentity, resolved: Option<Metadata>) -> Metadata {
    let Some(mut metadata) = resolved else {
        return Metadata::empty(identity.hash.as_str());
    };

    metadata.disc_id = identity.hash.clone();
    if !metadata.tracks.is_empty() && metadata.tracks.len() != identity.track_count as usize {
        warn!(
            "Track listing has {} entries but the disc has {} tracks, ignoring it",
            metadata.tracks.len(),
            identity.track_count
        );
        metadata.tracks.clear();
    }
    metadata
}
