//! 通用常量.

/// 病灶标签文件名.
pub const LESION_MASK_FILE: &str = "lesion_mask.npy";

/// 前列腺标签文件名.
pub const PROSTATE_MASK_FILE: &str = "prostate_mask.npy";

/// 权重文件名前缀.
pub const WEIGHTS_STEM: &str = "CancerNetPCa";

/// 默认图像目录.
pub const DEFAULT_IMG_DIR: &str = "data/images";

/// 默认标签目录.
pub const DEFAULT_MASK_DIR: &str = "data_2";

/// 分数文件名. 顺序即写入顺序.
pub mod scores {
    /// 每轮训练 Dice.
    pub const TRAIN_DICE: &str = "train_dice.npy";

    /// 每轮训练损失之和.
    pub const TRAIN_LOSS: &str = "train_loss.npy";

    /// 每次验证 Dice.
    pub const VAL_DICE: &str = "val_dice.npy";

    /// 每次验证损失之和.
    pub const VAL_LOSS: &str = "val_loss.npy";

    /// 测试 Dice.
    pub const TEST_DICE: &str = "test_dice.npy";

    /// 测试损失之和.
    pub const TEST_LOSS: &str = "test_loss.npy";

    /// 运行摘要.
    pub const SUMMARY: &str = "summary.json";
}

/// 标签种类, 决定每个病例加载哪一个标签文件.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Default, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MaskKind {
    /// `lesion_mask.npy`.
    #[default]
    Lesion,

    /// `prostate_mask.npy`.
    Prostate,
}

impl MaskKind {
    /// 由是否使用前列腺标签的开关得到.
    #[inline]
    pub fn from_prostate_flag(prostate: bool) -> Self {
        if prostate {
            Self::Prostate
        } else {
            Self::Lesion
        }
    }

    /// 是否为前列腺标签?
    #[inline]
    pub fn is_prostate(&self) -> bool {
        matches!(self, Self::Prostate)
    }

    /// 对应的文件名.
    #[inline]
    pub const fn file_name(&self) -> &'static str {
        match self {
            Self::Lesion => LESION_MASK_FILE,
            Self::Prostate => PROSTATE_MASK_FILE,
        }
    }

    /// 权重文件名 (不含扩展名): `CancerNetPCa-{model}` 或 `CancerNetPCa-prostate-{model}`.
    pub fn weights_name(&self, model: &str) -> String {
        if self.is_prostate() {
            format!("{WEIGHTS_STEM}-prostate-{model}")
        } else {
            format!("{WEIGHTS_STEM}-{model}")
        }
    }

    /// 分数目录名: `{model}` 或 `prostate-{model}`.
    pub fn scores_name(&self, model: &str) -> String {
        if self.is_prostate() {
            format!("prostate-{model}")
        } else {
            model.to_string()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::MaskKind;

    #[test]
    fn test_output_names() {
        let lesion = MaskKind::from_prostate_flag(false);
        let prostate = MaskKind::from_prostate_flag(true);
        assert_eq!(lesion.weights_name("unet"), "CancerNetPCa-unet");
        assert_eq!(prostate.weights_name("segresnet"), "CancerNetPCa-prostate-segresnet");
        assert_eq!(lesion.scores_name("unet"), "unet");
        assert_eq!(prostate.scores_name("unet"), "prostate-unet");
        assert_eq!(prostate.file_name(), "prostate_mask.npy");
    }
}
