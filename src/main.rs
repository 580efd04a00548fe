use std::env;

use alexnet::{AlexNet, NetConfig, PretrainedWeights, arch::layers::IMAGE_SIZE};
use anyhow::{Context, Result, bail};
use log::info;
use ndarray::{Array2, Array4};
use ndarray_rand::RandomExt;
use rand::{Rng, SeedableRng, rngs::StdRng};
use rand_distr::Uniform;

const BATCH_SIZE: usize = 2;
const DATA_SEED: u64 = 7;

fn one_hot<R: Rng>(n: usize, classes: usize, rng: &mut R) -> Array2<f32> {
    let mut labels = Array2::zeros((n, classes));
    for mut row in labels.rows_mut() {
        row[rng.random_range(0..classes)] = 1.;
    }

    labels
}

/// Paths given on the command line.
#[derive(Debug, PartialEq, Eq)]
struct Args {
    config: String,
    pretrained: Option<String>,
    checkpoint: Option<String>,
}

impl Args {
    fn parse<I: Iterator<Item = String>>(mut args: I) -> Result<Self> {
        let program = args.next().unwrap_or_else(|| "alexnet".into());
        let Some(config) = args.next() else {
            bail!(
                "usage: {program} <config.json> [pretrained.safetensors] [checkpoint.safetensors]"
            );
        };

        Ok(Self {
            config,
            pretrained: args.next(),
            checkpoint: args.next(),
        })
    }
}

fn main() -> Result<()> {
    env_logger::init();

    let args = Args::parse(env::args())?;
    let config =
        NetConfig::from_path(&args.config).with_context(|| format!("loading {}", args.config))?;
    let pretrained = args
        .pretrained
        .as_ref()
        .map(|path| PretrainedWeights::load(path).with_context(|| format!("loading {path}")))
        .transpose()?;

    let classes = config.object_class_num;
    let trainable = config.trainable;
    let mut net = AlexNet::new(config, pretrained)?;

    let mut rng = StdRng::seed_from_u64(DATA_SEED);
    let images = Array4::random_using(
        (BATCH_SIZE, IMAGE_SIZE, IMAGE_SIZE, 3),
        Uniform::new(0., 255.)?,
        &mut rng,
    );
    let labels = trainable.then(|| one_hot(BATCH_SIZE, classes, &mut rng));
    let finetune_labels = trainable.then(|| one_hot(BATCH_SIZE, classes + 1, &mut rng));

    let base = net.build(images.view(), labels.as_ref().map(|labels| labels.view()))?;
    info!("prob {:?}", base.prob.dim());
    let step = base.objective.as_ref().map(|objective| {
        info!(
            "loss {}, accuracy {}",
            objective.loss_mean, objective.accuracy
        );
        objective.step
    });

    if let Some(step) = step {
        net.minimize(&step)?;
        let base = net.evaluate(images.view(), labels.as_ref().map(|labels| labels.view()))?;
        if let Some(objective) = &base.objective {
            info!("loss after one step {}", objective.loss_mean);
        }
    }

    let finetune = net.build_finetune(finetune_labels.as_ref().map(|labels| labels.view()))?;
    info!("finetune prob {:?}", finetune.finetune_prob.dim());
    info!("{} parameters", net.param_count());

    if let Some(path) = &args.checkpoint {
        net.params().to_pretrained().save(path)?;
        info!("saved checkpoint to {path}");
    }

    Ok(())
}
