use candle_core::{DType, Module, Tensor};
use candle_nn::{Conv1d, Conv1dConfig, Linear, VarBuilder};

use crate::config::Wav2Vec2ModelConfig;
use crate::model::feature_extractor::load_weight_norm_conv;
use crate::model::layers::{layer_norm, LayerNorm};

/// Where each transformer block applies its layer norms.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum NormPlacement {
    /// wav2vec2-base: `ln(x + sublayer(x))`, encoder norm before the stack.
    Post,
    /// MMS / large checkpoints: `x + sublayer(ln(x))`, encoder norm after the stack.
    StablePre,
}

impl NormPlacement {
    fn from_config(cfg: &Wav2Vec2ModelConfig) -> Self {
        if cfg.do_stable_layer_norm {
            Self::StablePre
        } else {
            Self::Post
        }
    }
}

/// Grouped convolution over time acting as a relative position embedding.
struct PositionalConvEmbedding {
    conv: Conv1d,
}

impl PositionalConvEmbedding {
    fn load(cfg: &Wav2Vec2ModelConfig, vb: VarBuilder) -> candle_core::Result<Self> {
        let conv_cfg = Conv1dConfig {
            padding: cfg.num_conv_pos_embeddings / 2,
            groups: cfg.num_conv_pos_embedding_groups,
            ..Default::default()
        };
        let conv = load_weight_norm_conv(
            cfg.hidden_size,
            cfg.hidden_size,
            cfg.num_conv_pos_embeddings,
            conv_cfg,
            vb.pp("conv"),
        )?;
        Ok(Self { conv })
    }

    /// `(batch, frames, hidden)` in and out. An even kernel yields one extra
    /// frame, which is cut.
    fn forward(&self, xs: &Tensor) -> candle_core::Result<Tensor> {
        let frames = xs.dim(1)?;
        self.conv
            .forward(&xs.transpose(1, 2)?.contiguous()?)?
            .narrow(2, 0, frames)?
            .gelu()?
            .transpose(1, 2)?
            .contiguous()
    }
}

/// Multi-head self attention with the three input projections fused into one matmul.
struct SelfAttention {
    qkv: Linear,
    out: Linear,
    num_heads: usize,
    head_dim: usize,
    scale: f64,
}

impl SelfAttention {
    fn load(cfg: &Wav2Vec2ModelConfig, vb: VarBuilder) -> candle_core::Result<Self> {
        let hidden = cfg.hidden_size;
        let head_dim = hidden / cfg.num_attention_heads;

        let mut weights = Vec::with_capacity(3);
        let mut biases = Vec::with_capacity(3);
        for name in ["q_proj", "k_proj", "v_proj"] {
            let proj = vb.pp(name);
            weights.push(proj.get((hidden, hidden), "weight")?);
            biases.push(proj.get(hidden, "bias")?);
        }
        let qkv = Linear::new(Tensor::cat(&weights, 0)?, Some(Tensor::cat(&biases, 0)?));

        Ok(Self {
            qkv,
            out: candle_nn::linear(hidden, hidden, vb.pp("out_proj"))?,
            num_heads: cfg.num_attention_heads,
            head_dim,
            scale: (head_dim as f64).powf(-0.5),
        })
    }

    fn forward(&self, xs: &Tensor) -> candle_core::Result<Tensor> {
        let (b, t, hidden) = xs.dims3()?;
        // (b, t, 3 * hidden) -> (3, b, heads, t, head_dim)
        let qkv = self
            .qkv
            .forward(xs)?
            .reshape((b, t, 3, self.num_heads, self.head_dim))?
            .permute((2, 0, 3, 1, 4))?;
        let q = (qkv.get(0)?.contiguous()? * self.scale)?;
        let k = qkv.get(1)?.contiguous()?;
        let v = qkv.get(2)?.contiguous()?;

        let scores = q.matmul(&k.transpose(2, 3)?.contiguous()?)?;
        let weights = candle_nn::ops::softmax_last_dim(&scores.to_dtype(DType::F32)?)?
            .to_dtype(v.dtype())?;
        let context = weights
            .matmul(&v)?
            .transpose(1, 2)?
            .contiguous()?
            .reshape((b, t, hidden))?;
        self.out.forward(&context)
    }
}

struct FeedForward {
    intermediate: Linear,
    output: Linear,
}

impl FeedForward {
    fn load(cfg: &Wav2Vec2ModelConfig, vb: VarBuilder) -> candle_core::Result<Self> {
        Ok(Self {
            intermediate: candle_nn::linear(
                cfg.hidden_size,
                cfg.intermediate_size,
                vb.pp("intermediate_dense"),
            )?,
            output: candle_nn::linear(
                cfg.intermediate_size,
                cfg.hidden_size,
                vb.pp("output_dense"),
            )?,
        })
    }

    fn forward(&self, xs: &Tensor) -> candle_core::Result<Tensor> {
        self.output.forward(&self.intermediate.forward(xs)?.gelu()?)
    }
}

struct EncoderLayer {
    attention: SelfAttention,
    attention_norm: LayerNorm,
    feed_forward: FeedForward,
    final_norm: LayerNorm,
    placement: NormPlacement,
}

impl EncoderLayer {
    fn load(cfg: &Wav2Vec2ModelConfig, vb: VarBuilder) -> candle_core::Result<Self> {
        let eps = cfg.layer_norm_eps;
        Ok(Self {
            attention: SelfAttention::load(cfg, vb.pp("attention"))?,
            attention_norm: layer_norm(cfg.hidden_size, eps, vb.pp("layer_norm"))?,
            feed_forward: FeedForward::load(cfg, vb.pp("feed_forward"))?,
            final_norm: layer_norm(cfg.hidden_size, eps, vb.pp("final_layer_norm"))?,
            placement: NormPlacement::from_config(cfg),
        })
    }

    fn forward(&self, xs: &Tensor) -> candle_core::Result<Tensor> {
        match self.placement {
            NormPlacement::StablePre => {
                let attended = self.attention.forward(&self.attention_norm.forward(xs)?)?;
                let h = (xs + attended)?;
                let projected = self.feed_forward.forward(&self.final_norm.forward(&h)?)?;
                &h + projected
            }
            NormPlacement::Post => {
                let h = self
                    .attention_norm
                    .forward(&(xs + self.attention.forward(xs)?)?)?;
                let projected = self.feed_forward.forward(&h)?;
                self.final_norm.forward(&(&h + projected)?)
            }
        }
    }
}

pub(crate) struct Encoder {
    pos_conv: PositionalConvEmbedding,
    layer_norm: LayerNorm,
    layers: Vec<EncoderLayer>,
    placement: NormPlacement,
}

impl Encoder {
    pub(crate) fn load(cfg: &Wav2Vec2ModelConfig, vb: VarBuilder) -> candle_core::Result<Self> {
        let layers = (0..cfg.num_hidden_layers)
            .map(|i| EncoderLayer::load(cfg, vb.pp(format!("layers.{i}"))))
            .collect::<candle_core::Result<Vec<_>>>()?;
        Ok(Self {
            pos_conv: PositionalConvEmbedding::load(cfg, vb.pp("pos_conv_embed"))?,
            layer_norm: layer_norm(cfg.hidden_size, cfg.layer_norm_eps, vb.pp("layer_norm"))?,
            layers,
            placement: NormPlacement::from_config(cfg),
        })
    }

    /// `(batch, frames, hidden)` projected features to contextual states.
    pub(crate) fn forward(&self, xs: &Tensor) -> candle_core::Result<Tensor> {
        let mut h = (xs + self.pos_conv.forward(xs)?)?;
        if self.placement == NormPlacement::Post {
            h = self.layer_norm.forward(&h)?;
        }
        for layer in &self.layers {
            h = layer.forward(&h)?;
        }
        match self.placement {
            NormPlacement::StablePre => self.layer_norm.forward(&h),
            NormPlacement::Post => Ok(h),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use candle_core::Device;

    use super::*;

    fn tiny_config(stable: bool) -> Wav2Vec2ModelConfig {
        serde_json::from_value(serde_json::json!({
            "hidden_size": 4,
            "num_hidden_layers": 1,
            "num_attention_heads": 2,
            "intermediate_size": 8,
            "conv_dim": [4],
            "conv_kernel": [2],
            "conv_stride": [2],
            "num_conv_pos_embeddings": 2,
            "num_conv_pos_embedding_groups": 2,
            "do_stable_layer_norm": stable,
            "pad_token_id": 0,
            "vocab_size": 3
        }))
        .expect("config")
    }

    fn encoder_weights(cfg: &Wav2Vec2ModelConfig) -> HashMap<String, Tensor> {
        let dev = Device::Cpu;
        let h = cfg.hidden_size;
        let i = cfg.intermediate_size;
        let k = cfg.num_conv_pos_embeddings;
        let per_group = h / cfg.num_conv_pos_embedding_groups;
        let filled = |shape: &[usize], value: f32| {
            Tensor::full(value, shape, &dev).expect("tensor")
        };

        let mut w = HashMap::new();
        w.insert("pos_conv_embed.conv.weight".to_string(), filled(&[h, per_group, k], 0.1));
        w.insert("pos_conv_embed.conv.bias".to_string(), filled(&[h], 0.0));
        for norm in ["layer_norm", "layers.0.layer_norm", "layers.0.final_layer_norm"] {
            w.insert(format!("{norm}.weight"), filled(&[h], 1.0));
            w.insert(format!("{norm}.bias"), filled(&[h], 0.0));
        }
        for proj in ["q_proj", "k_proj", "v_proj", "out_proj"] {
            w.insert(format!("layers.0.attention.{proj}.weight"), filled(&[h, h], 0.05));
            w.insert(format!("layers.0.attention.{proj}.bias"), filled(&[h], 0.0));
        }
        w.insert("layers.0.feed_forward.intermediate_dense.weight".to_string(), filled(&[i, h], 0.02));
        w.insert("layers.0.feed_forward.intermediate_dense.bias".to_string(), filled(&[i], 0.0));
        w.insert("layers.0.feed_forward.output_dense.weight".to_string(), filled(&[h, i], 0.02));
        w.insert("layers.0.feed_forward.output_dense.bias".to_string(), filled(&[h], 0.0));
        w
    }

    #[test]
    fn forward_keeps_batch_and_frame_shape() {
        for stable in [false, true] {
            let cfg = tiny_config(stable);
            let vb = VarBuilder::from_tensors(encoder_weights(&cfg), DType::F32, &Device::Cpu);
            let encoder = Encoder::load(&cfg, vb).expect("load encoder");
            let xs = Tensor::arange(0f32, 2.0 * 5.0 * 4.0, &Device::Cpu)
                .and_then(|t| t.reshape((2, 5, 4)))
                .and_then(|t| t * 0.1)
                .expect("input");
            let out = encoder.forward(&xs).expect("forward");
            assert_eq!(out.dims(), &[2, 5, 4]);
        }
    }

    #[test]
    fn norm_placement_follows_config() {
        assert_eq!(NormPlacement::from_config(&tiny_config(true)), NormPlacement::StablePre);
        assert_eq!(NormPlacement::from_config(&tiny_config(false)), NormPlacement::Post);
    }
}
