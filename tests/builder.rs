mod common;

use alexnet::{AlexNet, NetConfig, NetErr};
use ndarray::{Array2, Array4, Axis};

const CLASSES: usize = 10;

fn net(trainable: bool, seed: u64) -> AlexNet {
    AlexNet::new(NetConfig::new(CLASSES, trainable).with_seed(seed), None).unwrap()
}

#[test]
fn independent_builders_have_identical_shapes() {
    let _guard = common::heavy();
    let images = common::images(1, 0);

    let mut a = net(false, 1);
    a.build(images.view(), None).unwrap();
    let shapes_a: Vec<_> = a
        .params()
        .iter()
        .map(|(key, p)| (key.clone(), p.name().to_string(), p.shape().to_vec()))
        .collect();
    drop(a);

    let mut b = net(false, 2);
    b.build(images.view(), None).unwrap();
    let shapes_b: Vec<_> = b
        .params()
        .iter()
        .map(|(key, p)| (key.clone(), p.name().to_string(), p.shape().to_vec()))
        .collect();

    assert_eq!(shapes_a.len(), 16);
    assert_eq!(shapes_a, shapes_b);
}

#[test]
fn output_shapes() {
    let _guard = common::heavy();
    let images = common::images(2, 0);
    let mut net = net(false, 3);

    let base = net.build(images.view(), None).unwrap();
    assert_eq!(base.conv1.dim(), (2, 55, 55, 96));
    assert_eq!(base.pool1.dim(), (2, 27, 27, 96));
    assert_eq!(base.pool2.dim(), (2, 13, 13, 256));
    assert_eq!(base.conv4.dim(), (2, 13, 13, 384));
    assert_eq!(base.pool5.dim(), (2, 6, 6, 256));
    assert_eq!(base.relu7.dim(), (2, 4096));
    assert_eq!(base.tanh7.dim(), (2, 4096));
    assert_eq!(base.prob.dim(), (2, CLASSES));
    assert!(base.objective.is_none());
    for row in base.prob.rows() {
        assert!((row.sum() - 1.).abs() < 1e-5);
    }

    let finetune = net.build_finetune(None).unwrap();
    assert_eq!(finetune.finetune_prob.dim(), (2, CLASSES + 1));
    assert!(finetune.objective.is_none());
}

#[test]
fn param_count_is_the_sum_of_shape_products() {
    let _guard = common::heavy();
    let images = common::images(1, 0);
    let mut net = net(false, 4);

    assert_eq!(net.param_count(), 0);
    net.build(images.view(), None).unwrap();

    let conv = |k: usize, i: usize, o: usize| k * k * i * o + o;
    let fc = |i: usize, o: usize| i * o + o;
    let expected = conv(11, 3, 96)
        + conv(5, 96, 256)
        + conv(3, 256, 384)
        + conv(3, 384, 384)
        + conv(3, 384, 256)
        + fc(9216, 4096)
        + fc(4096, 4096)
        + fc(4096, CLASSES);

    assert_eq!(conv(11, 3, 96), 34_944);
    assert_eq!(net.param_count(), expected);
    assert_eq!(
        net.param_count(),
        net.params().iter().map(|(_, p)| p.size()).sum::<usize>()
    );

    net.build_finetune(None).unwrap();
    assert_eq!(net.param_count(), expected + fc(4096, CLASSES + 1));
}

#[test]
fn input_is_centered_per_channel() {
    let _guard = common::heavy();
    let images = Array4::<f32>::from_elem((1, 227, 227, 3), 10.);
    let config = NetConfig::new(CLASSES, false)
        .with_seed(13)
        .with_mean([1., 2., 3.]);
    let mut net = AlexNet::new(config, None).unwrap();

    let base = net.build(images.view(), None).unwrap();

    // blue, green, red
    for (c, expected) in [9., 8., 7.].into_iter().enumerate() {
        let channel = base.input.index_axis(Axis(3), c);
        assert!(channel.iter().all(|&v| v == expected), "channel {c}");
    }
    // the caller's batch is untouched
    assert!(images.iter().all(|&v| v == 10.));
}

#[test]
fn inference_is_deterministic() {
    let _guard = common::heavy();
    let images = common::images(2, 5);
    let mut net = net(false, 6);

    let first = net.build(images.view(), None).unwrap().prob.clone();
    let second = net.evaluate(images.view(), None).unwrap().prob.clone();

    assert_eq!(first, second);
}

#[test]
fn accuracy_lies_in_unit_interval() {
    let _guard = common::heavy();
    let images = common::images(2, 0);
    let labels = common::one_hot(CLASSES, &[3, 7]);
    let mut net = net(true, 7);

    let objective = net
        .build(images.view(), Some(labels.view()))
        .unwrap()
        .objective
        .clone()
        .unwrap();

    assert!((0. ..=1.).contains(&objective.accuracy));
    assert_eq!(objective.loss.len(), 2);
    assert!(objective.loss_mean.is_finite());
    // near zero initial weights give close to uniform predictions
    assert!((objective.loss_mean - (CLASSES as f32).ln()).abs() < 0.1);
}

#[test]
fn finetune_requires_a_build() {
    let mut net = net(false, 8);

    assert!(matches!(net.build_finetune(None), Err(NetErr::NotBuilt)));
    assert!(matches!(net.evaluate_finetune(None), Err(NetErr::NotBuilt)));

    let images = common::images(1, 0);
    assert!(matches!(net.evaluate(images.view(), None), Err(NetErr::NotBuilt)));
}

#[test]
fn rejects_wrong_channel_count() {
    let _guard = common::heavy();
    let images = Array4::<f32>::zeros((1, 227, 227, 1));
    let mut net = net(false, 9);

    let err = net.build(images.view(), None).unwrap_err();

    assert!(matches!(err, NetErr::ChannelMismatch { expected: 3, got: 1 }));
    assert!(net.params().is_empty());
    assert!(net.base().is_none());
}

#[test]
fn rejects_images_of_the_wrong_size() {
    let _guard = common::heavy();
    let images = Array4::<f32>::zeros((1, 64, 64, 3));
    let mut net = net(false, 10);

    let err = net.build(images.view(), None).unwrap_err();

    assert!(matches!(err, NetErr::SizeMismatch { .. }));
    assert_eq!(net.param_count(), 0);
}

#[test]
fn trainable_labels_are_checked() {
    let _guard = common::heavy();
    let images = common::images(2, 0);
    let mut net = net(true, 11);

    let missing = net.build(images.view(), None).unwrap_err();
    assert!(matches!(missing, NetErr::MissingLabels { head: "base" }));

    let wrong = Array2::<f32>::zeros((2, CLASSES + 1));
    let shape = net.build(images.view(), Some(wrong.view())).unwrap_err();
    assert!(matches!(
        shape,
        NetErr::LabelShape {
            head: "base",
            expected: (2, CLASSES),
            got: (2, 11),
        }
    ));

    let labels = common::one_hot(CLASSES, &[0, 1]);
    net.build(images.view(), Some(labels.view())).unwrap();

    // the base labels are one class short for the fine-tune head
    let err = net.build_finetune(Some(labels.view())).unwrap_err();
    assert!(matches!(err, NetErr::LabelShape { head: "finetune", .. }));
    assert!(net.finetune().is_none());
}

#[test]
fn labels_are_ignored_for_inference() {
    let _guard = common::heavy();
    let images = common::images(1, 0);
    let labels = common::one_hot(CLASSES, &[2]);
    let mut net = net(false, 12);

    let base = net.build(images.view(), Some(labels.view())).unwrap();

    assert!(base.objective.is_none());
}

#[test]
fn invalid_config() {
    let config = NetConfig::new(0, false);
    assert!(matches!(
        AlexNet::new(config, None),
        Err(NetErr::InvalidConfig(_))
    ));
}
