//! 程序运行函数.

use anyhow::Context;
use pca_berry::prelude::*;
use utils::loader;

use crate::result::RunReport;
use crate::Args;

/// 数据集与训练参数, 在加载任何数据前完成检查.
struct Plan {
    dataset: SliceDatasetConfig,
    pairing: Pairing,
    looper: TrainingLoop,
}

fn plan(args: &Args) -> Result<Plan, ConfigError> {
    args.model.check_size(args.size)?;
    if args.batch_size == 0 {
        return Err(ConfigError::ZeroBatch);
    }
    let looper = TrainingLoop::new(LoopConfig {
        epochs: args.epochs,
        val_interval: args.val_interval,
    })?;
    let dataset = SliceDatasetConfig {
        batch_size: args.batch_size,
        size: args.size,
        slice_index: args.slice,
        mask: MaskKind::from_prostate_flag(args.prostate_mask),
        split: SplitRatio::new(args.train_ratio, args.val_ratio)?,
        shuffle_seed: args.seed,
    };
    let pairing = if args.pair_by_order {
        Pairing::BySortOrder
    } else {
        Pairing::ByCaseId
    };
    Ok(Plan {
        dataset,
        pairing,
        looper,
    })
}

/// 实际运行.
pub fn run(args: &Args) -> anyhow::Result<RunReport> {
    let plan = plan(args).context("invalid configuration")?;

    let img_dir = loader::img_dir_or_env(args.img_dir.clone());
    let mask_dir = loader::mask_dir_or_env(args.mask_dir.clone());
    let dataset = SliceDataset::from_dirs(&img_dir, &mask_dir, plan.pairing, &plan.dataset)
        .with_context(|| {
            format!(
                "failed to build the dataset from `{}` and `{}`",
                img_dir.display(),
                mask_dir.display()
            )
        })?;
    log::info!(
        "split: {} train / {} val / {} test case(s)",
        dataset.len(Split::Train),
        dataset.len(Split::Val),
        dataset.len(Split::Test)
    );

    let mut required = vec![Split::Train, Split::Val];
    if args.test {
        required.push(Split::Test);
    }
    dataset
        .require_nonempty(&required)
        .context("invalid configuration")?;

    let device = TrainDevice::default();
    let schedule = StepLr::quarters(args.learning_rate, args.epochs);
    match args.model {
        ModelKind::UNet => {
            log::info!("using UNet");
            let model = UNetConfig::new().init::<TrainBackend>(&device);
            train(adam_segmenter(model, schedule, device), args, &plan, &dataset)
        }
        ModelKind::SegResNet => {
            log::info!("using SegResNet");
            let model = SegResNetConfig::new().init::<TrainBackend>(&device);
            train(adam_segmenter(model, schedule, device), args, &plan, &dataset)
        }
    }
}

/// 训练, 可选测试, 可选写出分数.
fn train<M>(
    mut model: M,
    args: &Args,
    plan: &Plan,
    dataset: &SliceDataset,
) -> anyhow::Result<RunReport>
where
    M: SegModel,
    M::Error: Send + Sync,
{
    let mask = plan.dataset.mask;
    let name = args.model.name();
    let weights = args
        .save
        .then(|| args.models_dir.join(mask.weights_name(name)));
    let mut checkpointer = Checkpointer::new(weights);
    let mut metric = DiceMetric::new();

    log::info!("starting training");
    let mut state = plan
        .looper
        .run(&mut model, dataset, &mut metric, &mut checkpointer)?;

    let test = if args.test {
        Some(plan.looper.test(&model, dataset, &mut metric, &mut state)?)
    } else {
        None
    };

    let samples = (
        dataset.len(Split::Train),
        dataset.len(Split::Val),
        dataset.len(Split::Test),
    );
    let scores = if args.save {
        log::info!("saving values");
        let summary = RunSummary {
            model: name.to_string(),
            dataset: plan.dataset,
            epochs: args.epochs,
            val_interval: args.val_interval,
            learning_rate: args.learning_rate,
            samples,
            best_metric: checkpointer.best_metric(),
            best_epoch: checkpointer.best_epoch(),
            weights: checkpointer.saved_to().map(ToOwned::to_owned),
        };
        let dir = ScoreWriter::new(&args.scores_dir)
            .write(&mask.scores_name(name), &state, &summary)
            .context("failed to write scores")?;
        Some(dir)
    } else {
        None
    };

    Ok(RunReport {
        model: args.model,
        mask,
        samples,
        last_train: state.train_loss.last().copied().zip(state.train_dice.last().copied()),
        best_metric: checkpointer.best_metric(),
        best_epoch: checkpointer.best_epoch(),
        test,
        weights: checkpointer.saved_to().map(ToOwned::to_owned),
        scores,
    })
}
