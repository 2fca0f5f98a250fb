//! Vertical (9:16) reframing pipeline for trendclip.
//!
//! A [`TransformJob`] moves through [`JobState`]s as the
//! [`TransformExecutor`] resolves the transcoder, plans a center crop with
//! [`geometry::plan`], runs ffmpeg and validates the result.

pub mod executor;
pub mod geometry;
pub mod job;
pub mod metadata;
pub mod validate;

pub use executor::{
    transform_args, EncodeSettings, FixedLocator, TranscoderLocator, TranscoderPaths,
    TransformExecutor,
};
pub use geometry::{AspectRatio, CropWindow, Dimensions, GeometryPlan};
pub use job::{check_paths, JobState, TransformJob};
pub use metadata::{MediaMetadata, MediaProbe, StreamInfo, StreamKind};
pub use validate::validate_output;
