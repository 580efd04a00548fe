use super::ops::Padding;

/// Height and width of the images the fully connected layers are sized for.
pub const IMAGE_SIZE: usize = 227;
/// Width of the hidden fully connected layers.
pub const FC_WIDTH: usize = 4096;
/// Flattened size of pool5 for a `227 x 227` image, `6 * 6 * 256`.
pub const FC6_INPUT: usize = 6 * 6 * 256;

pub const POOL_SIZE: usize = 3;
pub const POOL_STRIDE: usize = 2;

/// The geometry of one convolutional layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConvLayer {
    pub name: &'static str,
    pub in_channels: usize,
    pub out_channels: usize,
    pub filter_size: usize,
    pub stride: usize,
    pub padding: Padding,
}

impl ConvLayer {
    /// `[k, k, in, out]`
    pub fn filters_shape(&self) -> [usize; 4] {
        [
            self.filter_size,
            self.filter_size,
            self.in_channels,
            self.out_channels,
        ]
    }
}

/// The geometry of one fully connected layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FcLayer {
    pub name: &'static str,
    pub in_size: usize,
    pub out_size: usize,
}

impl FcLayer {
    /// `[in, out]`
    pub fn weights_shape(&self) -> [usize; 2] {
        [self.in_size, self.out_size]
    }
}

const fn conv(
    name: &'static str,
    in_channels: usize,
    out_channels: usize,
    filter_size: usize,
    stride: usize,
    padding: Padding,
) -> ConvLayer {
    ConvLayer {
        name,
        in_channels,
        out_channels,
        filter_size,
        stride,
        padding,
    }
}

pub const CONV1: ConvLayer = conv("conv1", 3, 96, 11, 4, Padding::Valid);
pub const CONV2: ConvLayer = conv("conv2", 96, 256, 5, 1, Padding::Same);
pub const CONV3: ConvLayer = conv("conv3", 256, 384, 3, 1, Padding::Same);
pub const CONV4: ConvLayer = conv("conv4", 384, 384, 3, 1, Padding::Same);
pub const CONV5: ConvLayer = conv("conv5", 384, 256, 3, 1, Padding::Same);

pub const CONV_LAYERS: [ConvLayer; 5] = [CONV1, CONV2, CONV3, CONV4, CONV5];

pub const FC6: FcLayer = FcLayer {
    name: "fc6",
    in_size: FC6_INPUT,
    out_size: FC_WIDTH,
};

pub const FC7: FcLayer = FcLayer {
    name: "fc7",
    in_size: FC_WIDTH,
    out_size: FC_WIDTH,
};

/// The classifier of the base head.
pub fn fc8(object_class_num: usize) -> FcLayer {
    FcLayer {
        name: "fc8",
        in_size: FC_WIDTH,
        out_size: object_class_num,
    }
}

/// The classifier of the fine-tune head, it has one extra class.
pub fn finetune_fc8(object_class_num: usize) -> FcLayer {
    FcLayer {
        name: "finetune_fc8",
        in_size: FC_WIDTH,
        out_size: object_class_num + 1,
    }
}
