use candle_core::{DType, Module, Tensor, D};
use candle_nn::{Linear, VarBuilder};

use crate::config::Wav2Vec2ModelConfig;
use crate::model::encoder::Encoder;
use crate::model::feature_extractor::FeatureExtractor;
use crate::model::layers::{layer_norm, LayerNorm};

struct FeatureProjection {
    layer_norm: LayerNorm,
    projection: Linear,
}

impl FeatureProjection {
    fn load(cfg: &Wav2Vec2ModelConfig, vb: VarBuilder) -> candle_core::Result<Self> {
        let dim = *cfg.conv_dim.last().unwrap_or(&cfg.hidden_size);
        Ok(Self {
            layer_norm: layer_norm(dim, cfg.layer_norm_eps, vb.pp("layer_norm"))?,
            projection: candle_nn::linear(dim, cfg.hidden_size, vb.pp("projection"))?,
        })
    }

    fn forward(&self, xs: &Tensor) -> candle_core::Result<Tensor> {
        self.projection.forward(&self.layer_norm.forward(xs)?)
    }
}

pub(crate) struct Wav2Vec2ForCTC {
    feat_extract: FeatureExtractor,
    feat_proj: FeatureProjection,
    encoder: Encoder,
    lm_head: Linear,
}

impl Wav2Vec2ForCTC {
    pub(crate) fn load(cfg: &Wav2Vec2ModelConfig, vb: VarBuilder) -> candle_core::Result<Self> {
        let w = vb.pp("wav2vec2");
        Ok(Self {
            feat_extract: FeatureExtractor::load(cfg, w.pp("feature_extractor"))?,
            feat_proj: FeatureProjection::load(cfg, w.pp("feature_projection"))?,
            encoder: Encoder::load(cfg, w.pp("encoder"))?,
            lm_head: candle_nn::linear(cfg.hidden_size, cfg.vocab_size, vb.pp("lm_head"))?,
        })
    }

    /// `audio` is `(batch, samples)`; returns logits `(batch, frames, vocab)`.
    pub(crate) fn forward(&self, audio: &Tensor) -> candle_core::Result<Tensor> {
        let h = self.feat_extract.forward(&audio.unsqueeze(1)?)?;
        let h = self.feat_proj.forward(&h.transpose(1, 2)?.contiguous()?)?;
        let h = self.encoder.forward(&h)?;
        self.lm_head.forward(&h)
    }

    /// Frame-level log probabilities in f32, whatever precision the weights use.
    pub(crate) fn log_probs(&self, audio: &Tensor) -> candle_core::Result<Tensor> {
        let logits = self.forward(audio)?.to_dtype(DType::F32)?;
        candle_nn::ops::log_softmax(&logits, D::Minus1)
    }
}
