use std::path::PathBuf;

use thiserror::Error;

type Source = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Failures surfaced by the build and query paths. Per-image build failures
/// and per-strategy cascade failures are recovered internally and never
/// reach this taxonomy.
#[derive(Debug, Error)]
pub enum Error {
    /// The input could not be decoded as an image.
    #[error("could not decode image {path}")]
    ImageDecode {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },

    /// Every detection strategy was exhausted without an embedding. The
    /// message is the stable user-facing one; per-strategy reasons are
    /// logged as diagnostics only.
    #[error("face not detected, please upload a clearer photo")]
    NoFaceFound,

    /// The persisted embedding database is missing or corrupt. Fatal at
    /// startup; never silently replaced with an empty store.
    #[error("could not load embedding database at {path}")]
    StoreLoad {
        path: PathBuf,
        #[source]
        source: Source,
    },

    /// Query embedding dimensionality differs from the stored records.
    /// A configuration/programming error; never retried.
    #[error("query embedding has {query} dimensions, store records have {store}")]
    DimensionMismatch { query: usize, store: usize },
}
