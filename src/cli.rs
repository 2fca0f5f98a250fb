use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tc_core::DigestAlgorithm;
use tc_transform::{AspectRatio, Dimensions};

#[derive(Parser)]
#[command(name = "trendclip")]
#[command(author, version, about = "Self-healing media toolchain and vertical video reframer")]
pub struct Cli {
    /// Path to config file (JSON)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Install or repair every managed tool
    Heal {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Probe every managed tool without installing anything
    CheckTools {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Print the resolved path of a managed tool
    Path {
        /// Tool name (e.g. ffmpeg, yt-dlp)
        name: String,
    },

    /// Reframe a video into a vertical clip
    Transform {
        /// Source video
        #[arg(required = true)]
        input: PathBuf,

        /// Destination file
        #[arg(required = true)]
        output: PathBuf,

        /// Maximum clip length in seconds
        #[arg(short, long, value_parser = clap::value_parser!(u32).range(1..))]
        duration: Option<u32>,

        /// Target aspect ratio as W:H
        #[arg(short, long)]
        aspect: Option<AspectRatio>,
    },

    /// Show the crop/scale/pad plan for a source
    Plan {
        /// Source video to measure
        #[arg(required_unless_present = "size")]
        input: Option<PathBuf>,

        /// Plan for a frame size (WxH) instead of probing a file
        #[arg(long, value_parser = parse_size)]
        size: Option<Dimensions>,

        /// Target aspect ratio as W:H
        #[arg(short, long)]
        aspect: Option<AspectRatio>,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Grab a single frame as an image
    Thumbnail {
        #[arg(required = true)]
        input: PathBuf,

        #[arg(required = true)]
        output: PathBuf,

        /// Position in seconds
        #[arg(long, default_value = "5")]
        at: f64,
    },

    /// Extract the audio track
    ExtractAudio {
        #[arg(required = true)]
        input: PathBuf,

        #[arg(required = true)]
        output: PathBuf,
    },

    /// Print a media file's duration in seconds
    Duration {
        #[arg(required = true)]
        input: PathBuf,
    },

    /// Compute a file digest
    Digest {
        #[arg(required = true)]
        file: PathBuf,

        /// Hash algorithm (sha256 or sha512)
        #[arg(long, default_value = "sha256")]
        algorithm: DigestAlgorithm,
    },

    /// Write a shell (or .bat) script exporting the toolchain environment
    EnvScript {
        /// Script path
        #[arg(required = true)]
        path: PathBuf,
    },

    /// Validate configuration file
    Validate,
}

fn parse_size(s: &str) -> Result<Dimensions, String> {
    let (w, h) = s
        .split_once(['x', 'X'])
        .ok_or_else(|| format!("'{s}' is not of the form WxH"))?;
    let parse = |v: &str| {
        v.trim()
            .parse::<u32>()
            .ok()
            .filter(|n| *n > 0)
            .ok_or_else(|| format!("'{v}' is not a positive integer"))
    };
    Ok(Dimensions::new(parse(w)?, parse(h)?))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn size_parsing() {
        assert_eq!(parse_size("1920x1080").unwrap(), Dimensions::new(1920, 1080));
        assert_eq!(parse_size("720X1280").unwrap(), Dimensions::new(720, 1280));
        assert!(parse_size("1920").is_err());
        assert!(parse_size("0x1080").is_err());
        assert!(parse_size("axb").is_err());
    }

    #[test]
    fn cli_is_well_formed() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }
}
