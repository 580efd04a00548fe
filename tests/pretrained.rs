mod common;

use alexnet::{AlexNet, NetConfig, NetErr, PretrainedWeights};
use ndarray::{ArrayD, IxDyn};

const CLASSES: usize = 5;

fn config(seed: u64) -> NetConfig {
    NetConfig::new(CLASSES, false).with_seed(seed)
}

#[test]
fn pretrained_values_round_trip_exactly() {
    let _guard = common::heavy();
    let images = common::images(1, 30);

    let mut source = AlexNet::new(config(31), None).unwrap();
    let expected_prob = source.build(images.view(), None).unwrap().prob.clone();
    let checkpoint = source.params().to_pretrained();
    let expected = source.params().clone();
    drop(source);

    assert_eq!(checkpoint.len(), 8);

    let mut net = AlexNet::new(config(32), Some(checkpoint)).unwrap();
    assert!(net.has_pretrained());
    let prob = net.build(images.view(), None).unwrap().prob.clone();

    assert!(!net.has_pretrained());
    assert_eq!(prob, expected_prob);
    for (key, param) in expected.iter() {
        assert_eq!(net.params().get(key).unwrap().value(), param.value(), "{key}");
    }
}

#[test]
fn partial_pretrained_weights() {
    let _guard = common::heavy();
    let images = common::images(1, 33);
    let filters = ArrayD::from_elem(IxDyn(&[11, 11, 3, 96]), 0.5);
    let biases = ArrayD::from_elem(IxDyn(&[96]), -0.25);

    let mut pretrained = PretrainedWeights::new();
    pretrained.insert("conv1", filters.clone(), biases.clone());
    let mut net = AlexNet::new(config(34), Some(pretrained)).unwrap();
    net.build(images.view(), None).unwrap();

    let params = net.params();
    assert_eq!(params.value("conv1", 0).unwrap(), &filters);
    assert_eq!(params.value("conv1", 1).unwrap(), &biases);
    // everything else is drawn within two standard deviations of zero
    let conv2 = params.value("conv2", 0).unwrap();
    assert!(conv2.iter().all(|v| v.abs() <= 0.002));
    assert!(conv2.iter().any(|&v| v != 0.));

    // the pretrained source is gone, a rebuild is random everywhere
    net.build(images.view(), None).unwrap();
    assert_ne!(net.params().value("conv1", 0).unwrap(), &filters);
}

#[test]
fn mismatched_pretrained_shape_aborts_the_build() {
    let _guard = common::heavy();
    let images = common::images(1, 35);

    let mut pretrained = PretrainedWeights::new();
    pretrained.insert(
        "fc8",
        ArrayD::zeros(IxDyn(&[4096, CLASSES + 1])),
        ArrayD::zeros(IxDyn(&[CLASSES + 1])),
    );
    let mut net = AlexNet::new(config(36), Some(pretrained)).unwrap();

    let err = net.build(images.view(), None).unwrap_err();

    let NetErr::ShapeMismatch {
        param,
        expected,
        got,
    } = &err
    else {
        panic!("expected a shape mismatch, got {err}");
    };
    assert_eq!(param, "fc8_weights");
    assert_eq!(expected.as_slice(), &[4096, CLASSES]);
    assert_eq!(got.as_slice(), &[4096, CLASSES + 1]);

    // nothing stays built and the weights are kept for another attempt
    assert!(net.params().is_empty());
    assert!(net.base().is_none());
    assert!(net.has_pretrained());
}

#[test]
fn finetune_head_is_random_even_with_a_pretrained_entry() {
    let _guard = common::heavy();
    let images = common::images(1, 37);

    let mut pretrained = PretrainedWeights::new();
    pretrained.insert(
        "finetune_fc8",
        ArrayD::from_elem(IxDyn(&[4096, CLASSES + 1]), 1.),
        ArrayD::from_elem(IxDyn(&[CLASSES + 1]), 1.),
    );
    let mut net = AlexNet::new(config(38), Some(pretrained)).unwrap();
    net.build(images.view(), None).unwrap();
    net.build_finetune(None).unwrap();

    let weights = net.params().value("finetune_fc8", 0).unwrap();
    assert!(weights.iter().all(|v| v.abs() <= 0.002));
}

#[test]
fn checkpoint_file_round_trip() {
    let mut pretrained = PretrainedWeights::new();
    pretrained.insert(
        "conv1",
        ArrayD::from_shape_fn(IxDyn(&[2, 2, 3, 4]), |i| i[3] as f32 - 1.5),
        ArrayD::from_elem(IxDyn(&[4]), 0.1),
    );
    pretrained.insert(
        "fc8",
        ArrayD::from_elem(IxDyn(&[3, 2]), 2.),
        ArrayD::zeros(IxDyn(&[2])),
    );

    let path = std::env::temp_dir().join(format!("alexnet-{}.safetensors", std::process::id()));
    pretrained.save(&path).unwrap();
    let loaded = PretrainedWeights::load(&path).unwrap();
    std::fs::remove_file(&path).unwrap();

    assert_eq!(loaded.len(), 2);
    for layer in ["conv1", "fc8"] {
        assert_eq!(loaded.get(layer), pretrained.get(layer));
    }
}
