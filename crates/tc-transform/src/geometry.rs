//! Center-crop geometry for reframing a source into a target aspect ratio.
//!
//! All arithmetic is integer (`u64`), so results are exact and identical on
//! every platform: a 1920x1080 source reframed to 9:16 always crops
//! 607x1080 at (656, 0).

use std::fmt;
use std::path::Path;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::metadata::MediaProbe;

// ---------------------------------------------------------------------------
// AspectRatio
// ---------------------------------------------------------------------------

/// A target aspect ratio `width:height`, both positive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct AspectRatio {
    pub width: u32,
    pub height: u32,
}

impl AspectRatio {
    /// Vertical 9:16.
    pub const VERTICAL: Self = Self {
        width: 9,
        height: 16,
    };

    pub fn new(width: u32, height: u32) -> tc_core::Result<Self> {
        if width == 0 || height == 0 {
            return Err(tc_core::Error::InvalidInput(format!(
                "aspect ratio {width}:{height} must have positive terms"
            )));
        }
        Ok(Self { width, height })
    }

    pub fn is_portrait(&self) -> bool {
        self.height >= self.width
    }
}

impl Default for AspectRatio {
    fn default() -> Self {
        Self::VERTICAL
    }
}

impl fmt::Display for AspectRatio {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.width, self.height)
    }
}

impl FromStr for AspectRatio {
    type Err = tc_core::Error;

    fn from_str(s: &str) -> tc_core::Result<Self> {
        let invalid = || {
            tc_core::Error::InvalidInput(format!("'{s}' is not an aspect ratio (expected W:H)"))
        };
        let (w, h) = s.trim().split_once(':').ok_or_else(invalid)?;
        let w = w.trim().parse::<u32>().map_err(|_| invalid())?;
        let h = h.trim().parse::<u32>().map_err(|_| invalid())?;
        Self::new(w, h)
    }
}

impl TryFrom<String> for AspectRatio {
    type Error = tc_core::Error;

    fn try_from(s: String) -> tc_core::Result<Self> {
        s.parse()
    }
}

impl From<AspectRatio> for String {
    fn from(a: AspectRatio) -> Self {
        a.to_string()
    }
}

// ---------------------------------------------------------------------------
// Plan types
// ---------------------------------------------------------------------------

/// Frame size in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dimensions {
    pub width: u32,
    pub height: u32,
}

impl Dimensions {
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }
}

impl fmt::Display for Dimensions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

/// The region of the source kept by the crop filter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum CropWindow {
    /// Keep the whole input frame (`crop=iw:ih`).
    FullFrame,
    Region {
        width: u32,
        height: u32,
        x: u32,
        y: u32,
    },
}

impl CropWindow {
    /// The ffmpeg `crop` filter for this window.
    pub fn filter(&self) -> String {
        match self {
            Self::FullFrame => "crop=iw:ih".to_string(),
            Self::Region {
                width,
                height,
                x,
                y,
            } => format!("crop={width}:{height}:{x}:{y}"),
        }
    }
}

/// Crop, scale and pad parameters for one source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct GeometryPlan {
    /// Source frame size; `None` for the fallback plan.
    pub source: Option<Dimensions>,
    pub crop: CropWindow,
    pub output: Dimensions,
    /// Set when source metadata was unavailable.
    pub fallback: bool,
}

impl GeometryPlan {
    /// The plan used when the source cannot be measured: keep the full
    /// frame and let scale + pad letterbox it into the output.
    pub fn fallback(aspect: AspectRatio, long_edge: u32) -> Self {
        Self {
            source: None,
            crop: CropWindow::FullFrame,
            output: output_dimensions(aspect, long_edge),
            fallback: true,
        }
    }

    /// The `crop,scale,pad` filter chain for ffmpeg's `-vf`.
    pub fn filter_chain(&self) -> String {
        let Dimensions { width, height } = self.output;
        format!(
            "{},scale={width}:{height}:force_original_aspect_ratio=decrease,\
             pad={width}:{height}:(ow-iw)/2:(oh-ih)/2:black",
            self.crop.filter()
        )
    }
}

// ---------------------------------------------------------------------------
// Planning
// ---------------------------------------------------------------------------

/// Output frame for `aspect` with `long_edge` pixels along its longer axis.
///
/// The short edge is rounded down to an even number (yuv420p needs even
/// dimensions), never below 2.
pub fn output_dimensions(aspect: AspectRatio, long_edge: u32) -> Dimensions {
    let long = u64::from(long_edge.max(2) & !1);
    let (tw, th) = (u64::from(aspect.width), u64::from(aspect.height));

    let even = |v: u64| (v & !1).max(2) as u32;
    if aspect.is_portrait() {
        Dimensions::new(even(long * tw / th), long as u32)
    } else {
        Dimensions::new(long as u32, even(long * th / tw))
    }
}

/// Center-crop `source` to `aspect`, cropping whichever axis is too long.
///
/// # Errors
///
/// [`tc_core::Error::InvalidInput`] if either source dimension is zero.
pub fn plan(
    source: Dimensions,
    aspect: AspectRatio,
    long_edge: u32,
) -> tc_core::Result<GeometryPlan> {
    if source.width == 0 || source.height == 0 {
        return Err(tc_core::Error::InvalidInput(format!(
            "source dimensions {source} must be positive"
        )));
    }

    let (w, h) = (u64::from(source.width), u64::from(source.height));
    let (tw, th) = (u64::from(aspect.width), u64::from(aspect.height));

    let (crop_w, crop_h) = if w * th > h * tw {
        // Too wide: keep full height.
        ((h * tw / th).clamp(1, w), h)
    } else {
        // Too tall (or exact): keep full width.
        (w, (w * th / tw).clamp(1, h))
    };
    let x = (w - crop_w) / 2;
    let y = (h - crop_h) / 2;

    Ok(GeometryPlan {
        source: Some(source),
        crop: CropWindow::Region {
            width: crop_w as u32,
            height: crop_h as u32,
            x: x as u32,
            y: y as u32,
        },
        output: output_dimensions(aspect, long_edge),
        fallback: false,
    })
}

/// Measure `input` with `probe` and plan its reframing.
///
/// Never fails: when metadata is unavailable the fallback plan is returned
/// and a warning logged.
pub async fn plan_for_source(
    probe: &MediaProbe,
    input: &Path,
    aspect: AspectRatio,
    long_edge: u32,
) -> GeometryPlan {
    let measured = probe.probe(input).await.and_then(|meta| meta.video_dimensions());

    match measured.and_then(|dims| plan(dims, aspect, long_edge)) {
        Ok(planned) => {
            tracing::debug!(
                "Planned {} for {}: {}",
                planned.output,
                input.display(),
                planned.crop.filter()
            );
            planned
        }
        Err(e) => {
            tracing::warn!(
                "Cannot measure {} ({e}); using full-frame fallback",
                input.display()
            );
            GeometryPlan::fallback(aspect, long_edge)
        }
    }
}
