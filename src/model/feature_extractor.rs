use candle_core::{Module, Tensor};
use candle_nn::{Conv1d, Conv1dConfig, VarBuilder};

use crate::config::Wav2Vec2ModelConfig;
use crate::model::layers::{group_norm_1d, layer_norm, GroupNorm1d, LayerNorm};

/// Normalization applied after a feature-encoder convolution.
enum ConvNorm {
    Identity,
    /// `feat_extract_norm = "group"`: one group per channel, first layer only.
    Group(GroupNorm1d),
    /// `feat_extract_norm = "layer"`: over channels at each time step.
    Layer(LayerNorm),
}

impl ConvNorm {
    fn apply(&self, xs: Tensor) -> candle_core::Result<Tensor> {
        match self {
            Self::Identity => Ok(xs),
            Self::Group(gn) => gn.forward(&xs),
            Self::Layer(ln) => ln.forward(&xs.transpose(1, 2)?)?.transpose(1, 2)?.contiguous(),
        }
    }
}

/// Shape of one convolution in the feature encoder stack.
struct ConvShape {
    in_channels: usize,
    out_channels: usize,
    kernel: usize,
    stride: usize,
}

impl ConvShape {
    fn stack(cfg: &Wav2Vec2ModelConfig) -> Vec<Self> {
        cfg.conv_dim
            .iter()
            .zip(&cfg.conv_kernel)
            .zip(&cfg.conv_stride)
            .enumerate()
            .map(|(i, ((&out_channels, &kernel), &stride))| Self {
                in_channels: if i == 0 { 1 } else { cfg.conv_dim[i - 1] },
                out_channels,
                kernel,
                stride,
            })
            .collect()
    }
}

struct ConvBlock {
    conv: Conv1d,
    norm: ConvNorm,
}

impl ConvBlock {
    fn load(
        shape: &ConvShape,
        index: usize,
        cfg: &Wav2Vec2ModelConfig,
        vb: VarBuilder,
    ) -> candle_core::Result<Self> {
        let conv_cfg = Conv1dConfig {
            stride: shape.stride,
            ..Default::default()
        };
        let (c_in, c_out, k) = (shape.in_channels, shape.out_channels, shape.kernel);
        let conv = if cfg.conv_bias {
            candle_nn::conv1d(c_in, c_out, k, conv_cfg, vb.pp("conv"))?
        } else {
            candle_nn::conv1d_no_bias(c_in, c_out, k, conv_cfg, vb.pp("conv"))?
        };
        let eps = cfg.layer_norm_eps;
        let norm = match cfg.feat_extract_norm.as_str() {
            "layer" => ConvNorm::Layer(layer_norm(c_out, eps, vb.pp("layer_norm"))?),
            "group" if index == 0 => {
                ConvNorm::Group(group_norm_1d(c_out, c_out, eps, vb.pp("layer_norm"))?)
            }
            _ => ConvNorm::Identity,
        };
        Ok(Self { conv, norm })
    }

    fn forward(&self, xs: &Tensor) -> candle_core::Result<Tensor> {
        self.norm.apply(self.conv.forward(xs)?)?.gelu()
    }
}

/// Strided convolutions turning `(batch, 1, samples)` into `(batch, channels, frames)`.
pub(crate) struct FeatureExtractor {
    blocks: Vec<ConvBlock>,
}

impl FeatureExtractor {
    pub(crate) fn load(cfg: &Wav2Vec2ModelConfig, vb: VarBuilder) -> candle_core::Result<Self> {
        let blocks = ConvShape::stack(cfg)
            .iter()
            .enumerate()
            .map(|(i, shape)| ConvBlock::load(shape, i, cfg, vb.pp(format!("conv_layers.{i}"))))
            .collect::<candle_core::Result<Vec<_>>>()?;
        Ok(Self { blocks })
    }

    pub(crate) fn forward(&self, xs: &Tensor) -> candle_core::Result<Tensor> {
        self.blocks
            .iter()
            .try_fold(xs.clone(), |h, block| block.forward(&h))
    }
}

/// Positional convolution stored with weight normalization.
///
/// Older checkpoints name the factors `weight_g` / `weight_v`; checkpoints
/// saved through `torch.nn.utils.parametrizations` use
/// `parametrizations.weight.original0` / `original1`. Plain `weight` is
/// accepted for already-fused exports.
pub(crate) fn load_weight_norm_conv(
    in_c: usize,
    out_c: usize,
    kernel: usize,
    cfg: Conv1dConfig,
    vb: VarBuilder,
) -> candle_core::Result<Conv1d> {
    let dim_per_group = in_c / cfg.groups;
    let v_shape = (out_c, dim_per_group, kernel);

    let factors = if let Ok(wv) = vb.get(v_shape, "weight_v") {
        Some((weight_norm_gain(&vb, "weight_g", out_c, kernel)?, wv))
    } else if let Ok(wv) = vb.get(v_shape, "parametrizations.weight.original1") {
        Some((
            weight_norm_gain(&vb, "parametrizations.weight.original0", out_c, kernel)?,
            wv,
        ))
    } else {
        None
    };

    let weight = match factors {
        Some((wg, wv)) => fuse_weight_norm(&wg, &wv, kernel)?,
        None => vb.get(v_shape, "weight")?,
    };

    let bias = vb.get(out_c, "bias")?;
    Ok(Conv1d::new(weight, Some(bias), cfg))
}

fn weight_norm_gain(
    vb: &VarBuilder,
    name: &str,
    out_c: usize,
    kernel: usize,
) -> candle_core::Result<Tensor> {
    // wav2vec2 normalizes over dim=2, giving a (1, 1, kernel) gain; some
    // exports keep the default dim=0 gain of shape (out_c, 1, 1).
    vb.get((1, 1, kernel), name)
        .or_else(|_| vb.get((out_c, 1, 1), name))
}

fn fuse_weight_norm(wg: &Tensor, wv: &Tensor, kernel: usize) -> candle_core::Result<Tensor> {
    if wg.dims3()? == (1, 1, kernel) {
        let norm = wv.sqr()?.sum_keepdim(0)?.sum_keepdim(1)?.sqrt()?;
        wv.broadcast_div(&norm)?.broadcast_mul(wg)
    } else {
        let (o, ig, k) = wv.dims3()?;
        let norm = wv
            .reshape((o, ig * k))?
            .sqr()?
            .sum_keepdim(1)?
            .sqrt()?
            .unsqueeze(2)?;
        wv.broadcast_div(&norm)?.broadcast_mul(wg)
    }
}
