//! 训练结果.

use std::io::{self, Write};
use std::path::PathBuf;

use pca_berry::consts::MaskKind;
use pca_berry::nn::ModelKind;
use utils::metric_to_display;

/// 一次运行的最终结果.
#[derive(Debug, Clone)]
pub struct RunReport {
    pub model: ModelKind,
    pub mask: MaskKind,
    pub samples: (usize, usize, usize),
    pub last_train: Option<(f64, f64)>,
    pub best_metric: f64,
    pub best_epoch: usize,
    pub test: Option<(f64, f64)>,
    pub weights: Option<PathBuf>,
    pub scores: Option<PathBuf>,
}

impl RunReport {
    /// 将结果写进 `w` 中.
    fn describe_into<W: Write>(&self, w: &mut W) -> io::Result<()> {
        const S4: &str = "    ";

        let path_to_display = |p: &Option<PathBuf>| match p {
            Some(p) => p.display().to_string(),
            None => "/".to_string(),
        };

        writeln!(w, "Run `{}` on {:?} masks:", self.model, self.mask)?;
        writeln!(
            w,
            "{S4}Cases (train / val / test): {} / {} / {}",
            self.samples.0, self.samples.1, self.samples.2
        )?;
        writeln!(
            w,
            "{S4}Last train loss: {}, dice: {}",
            metric_to_display(self.last_train.map(|t| t.0)),
            metric_to_display(self.last_train.map(|t| t.1))
        )?;
        let best = (self.best_epoch > 0).then_some(self.best_metric);
        writeln!(
            w,
            "{S4}Best val dice: {} at epoch {}",
            metric_to_display(best),
            self.best_epoch
        )?;
        writeln!(
            w,
            "{S4}Test loss: {}, dice: {}",
            metric_to_display(self.test.map(|t| t.0)),
            metric_to_display(self.test.map(|t| t.1))
        )?;
        writeln!(w, "{S4}Weights: {}", path_to_display(&self.weights))?;
        write!(w, "{S4}Scores: {}", path_to_display(&self.scores))?;
        Ok(())
    }

    /// 打印运行结果.
    pub fn analyze(&self) -> io::Result<()> {
        let stdout = io::stdout();
        let mut out = stdout.lock();
        utils::sep_to(&mut out)?;
        self.describe_into(&mut out)?;
        writeln!(out)?;
        utils::sep_to(&mut out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_describe() {
        let report = RunReport {
            model: ModelKind::UNet,
            mask: MaskKind::Prostate,
            samples: (7, 1, 2),
            last_train: Some((3.5, 0.42)),
            best_metric: 0.61,
            best_epoch: 4,
            test: None,
            weights: Some(PathBuf::from("models/CancerNetPCa-prostate-unet.mpk.gz")),
            scores: None,
        };
        let mut buf = Vec::new();
        report.describe_into(&mut buf).unwrap();
        let text = String::from_utf8(buf).unwrap();
        assert!(text.starts_with("Run `unet` on Prostate masks:"));
        assert!(text.contains("7 / 1 / 2"));
        assert!(text.contains("Best val dice: 0.6100 at epoch 4"));
        assert!(text.contains("Test loss: /, dice: /"));
        assert!(text.contains("CancerNetPCa-prostate-unet.mpk.gz"));
        assert!(text.ends_with("Scores: /"));
    }
}
