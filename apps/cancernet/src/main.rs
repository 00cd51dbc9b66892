//! 前列腺 MRI 二维分割训练程序.
//!
//! ```text
//! cancernet --model segresnet --epochs 100 --prostate-mask --save --test
//! ```

use std::path::PathBuf;

use clap::Parser;
use pca_berry::nn::ModelKind;

mod result;
mod runner;

/// 命令行参数.
#[derive(Parser, Debug, Clone)]
#[command(
    name = "cancernet",
    version,
    about = "Train a 2-D prostate MRI segmentation network on a fixed slice of each case"
)]
pub struct Args {
    /// Samples per batch.
    #[arg(long, default_value_t = 16)]
    pub batch_size: usize,

    /// Number of training epochs.
    #[arg(long, default_value_t = 200)]
    pub epochs: usize,

    /// Initial learning rate, divided by 10 every quarter of the epochs.
    #[arg(long, default_value_t = 0.001)]
    pub learning_rate: f64,

    /// Network: `unet` or `segresnet`.
    #[arg(long, default_value = "unet")]
    pub model: ModelKind,

    /// Image volume directory. Falls back to `$PCA_IMG_DIR`, then `data/images`.
    #[arg(long)]
    pub img_dir: Option<PathBuf>,

    /// Mask array directory. Falls back to `$PCA_MASK_DIR`, then `data_2`.
    #[arg(long)]
    pub mask_dir: Option<PathBuf>,

    /// Train on `prostate_mask.npy` instead of `lesion_mask.npy`.
    #[arg(long, default_value_t = false)]
    pub prostate_mask: bool,

    /// Side length slices are resized to.
    #[arg(long, default_value_t = 256)]
    pub size: usize,

    /// Slice index taken from every volume along z.
    #[arg(long, default_value_t = 9)]
    pub slice: usize,

    /// Validate every N epochs.
    #[arg(long, default_value_t = 2)]
    pub val_interval: usize,

    /// Save the best weights and the score curves.
    #[arg(long, default_value_t = false)]
    pub save: bool,

    /// Evaluate on the test split after training.
    #[arg(long, default_value_t = false)]
    pub test: bool,

    /// Fraction of cases used for training.
    #[arg(long, default_value_t = 0.7)]
    pub train_ratio: f64,

    /// Fraction of cases used for validation; the rest is the test split.
    #[arg(long, default_value_t = 0.15)]
    pub val_ratio: f64,

    /// Shuffle cases with this seed before splitting.
    #[arg(long)]
    pub seed: Option<u64>,

    /// Pair images and masks by sorted position instead of by case id.
    #[arg(long, default_value_t = false)]
    pub pair_by_order: bool,

    /// Directory for model weights.
    #[arg(long, default_value = "models")]
    pub models_dir: PathBuf,

    /// Directory for score curves.
    #[arg(long, default_value = "scores")]
    pub scores_dir: PathBuf,
}

fn main() -> anyhow::Result<()> {
    simple_logger::SimpleLogger::new()
        .with_level(log::LevelFilter::Info)
        .env()
        .init()?;

    let args = Args::parse();
    log::debug!("{args:?}");

    let report = runner::run(&args)?;
    report.analyze()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let args = Args::parse_from(["cancernet"]);
        assert_eq!(args.batch_size, 16);
        assert_eq!(args.epochs, 200);
        assert_eq!(args.model, ModelKind::UNet);
        assert_eq!(args.size, 256);
        assert_eq!(args.slice, 9);
        assert_eq!(args.val_interval, 2);
        assert!(!args.save && !args.test && !args.prostate_mask);
        assert_eq!(args.models_dir, PathBuf::from("models"));
    }

    #[test]
    fn test_unknown_model_is_rejected() {
        assert!(Args::try_parse_from(["cancernet", "--model", "vnet"]).is_err());
        let args = Args::try_parse_from(["cancernet", "--model", "segresnet", "--prostate-mask"])
            .unwrap();
        assert_eq!(args.model, ModelKind::SegResNet);
        assert!(args.prostate_mask);
    }
}
