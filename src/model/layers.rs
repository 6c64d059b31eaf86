use candle_core::{DType, Tensor, D};
use candle_nn::VarBuilder;

/// Statistics are accumulated in f32 even when the model runs in f16;
/// sums over a 1024-wide hidden state or a full window of conv frames
/// overflow half precision.
fn load_affine(size: usize, vb: &VarBuilder) -> candle_core::Result<(Tensor, Tensor)> {
    let weight = vb.get(size, "weight")?.to_dtype(DType::F32)?;
    let bias = vb.get(size, "bias")?.to_dtype(DType::F32)?;
    Ok((weight, bias))
}

pub(crate) struct LayerNorm {
    weight: Tensor,
    bias: Tensor,
    eps: f64,
}

impl LayerNorm {
    pub(crate) fn forward(&self, x: &Tensor) -> candle_core::Result<Tensor> {
        let in_dtype = x.dtype();
        let x = x.to_dtype(DType::F32)?;
        let mean = x.mean_keepdim(D::Minus1)?;
        let centered = x.broadcast_sub(&mean)?;
        let var = centered.sqr()?.mean_keepdim(D::Minus1)?;
        let normed = centered.broadcast_div(&(var + self.eps)?.sqrt()?)?;
        normed
            .broadcast_mul(&self.weight)?
            .broadcast_add(&self.bias)?
            .to_dtype(in_dtype)
    }
}

pub(crate) fn layer_norm(size: usize, eps: f64, vb: VarBuilder) -> candle_core::Result<LayerNorm> {
    let (weight, bias) = load_affine(size, &vb)?;
    Ok(LayerNorm { weight, bias, eps })
}

/// GroupNorm over `(batch, channels, time)` inputs, matching PyTorch.
pub(crate) struct GroupNorm1d {
    weight: Tensor,
    bias: Tensor,
    eps: f64,
    num_groups: usize,
}

impl GroupNorm1d {
    pub(crate) fn forward(&self, x: &Tensor) -> candle_core::Result<Tensor> {
        let (b, c, t) = x.dims3()?;
        if self.num_groups == 0 || c % self.num_groups != 0 || c != self.weight.dim(0)? {
            return Err(candle_core::Error::Msg(format!(
                "GroupNorm1d: {c} channels cannot be split into {} groups",
                self.num_groups
            )));
        }
        let in_dtype = x.dtype();
        let grouped = x
            .to_dtype(DType::F32)?
            .reshape((b, self.num_groups, (c / self.num_groups) * t))?;
        let mean = grouped.mean_keepdim(D::Minus1)?;
        let centered = grouped.broadcast_sub(&mean)?;
        let var = centered.sqr()?.mean_keepdim(D::Minus1)?;
        let normed = centered
            .broadcast_div(&(var + self.eps)?.sqrt()?)?
            .reshape((b, c, t))?;
        normed
            .broadcast_mul(&self.weight.reshape((1, c, 1))?)?
            .broadcast_add(&self.bias.reshape((1, c, 1))?)?
            .to_dtype(in_dtype)
    }
}

pub(crate) fn group_norm_1d(
    num_groups: usize,
    num_channels: usize,
    eps: f64,
    vb: VarBuilder,
) -> candle_core::Result<GroupNorm1d> {
    let (weight, bias) = load_affine(num_channels, &vb)?;
    Ok(GroupNorm1d {
        weight,
        bias,
        eps,
        num_groups,
    })
}
