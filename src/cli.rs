use std::path::PathBuf;

use clap::{Parser, Subcommand};
use volume_reorient::AxisCode;

#[derive(Parser, Debug)]
#[command(
    name = "volume-reorient",
    version,
    about = "Reorient 3D volumes to and from canonical LAS orientation"
)]
pub struct Cli {
    #[arg(long, global = true, help = "Output machine-readable JSON")]
    pub json: bool,
    #[arg(short, long, global = true, help = "Log debug output to stderr")]
    pub verbose: bool,
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Reorient a volume to a canonical axis code
    ToCanonical {
        /// NIfTI file or DICOM series directory
        #[arg(long)]
        input: PathBuf,
        /// Output NIfTI file (.nii or .nii.gz)
        #[arg(long)]
        output: PathBuf,
        #[arg(long, default_value_t = AxisCode::LAS)]
        target: AxisCode,
    },
    /// Restore an LAS volume to the reference volume's own orientation
    Restore {
        #[arg(long = "las-seg")]
        las_seg: PathBuf,
        #[arg(long = "orig-img")]
        orig_img: PathBuf,
        #[arg(long)]
        output: PathBuf,
    },
    /// Restore an LAS volume assuming the reference is itself LAS
    RestoreAssumingCanonical {
        #[arg(long = "las-seg")]
        las_seg: PathBuf,
        #[arg(long = "orig-img")]
        orig_img: PathBuf,
        #[arg(long)]
        output: PathBuf,
    },
}
