use candle_core::{DType, Device, Tensor};
use candle_nn::VarBuilder;

use crate::config::{AlignerConfig, ComputeDevice, Precision, Wav2Vec2ModelConfig};
use crate::error::AlignmentError;
use crate::model::ctc_model::Wav2Vec2ForCTC;
use crate::pipeline::traits::RuntimeBackend;

pub(crate) fn build_runtime_backend(
    config: &AlignerConfig,
    model_cfg: &Wav2Vec2ModelConfig,
) -> Result<Box<dyn RuntimeBackend>, AlignmentError> {
    Ok(Box::new(CandleRuntimeBackend::load(config, model_cfg)?))
}

pub(crate) fn select_device(device: ComputeDevice) -> Result<Device, AlignmentError> {
    match device {
        ComputeDevice::Cpu => Ok(Device::Cpu),
        ComputeDevice::Cuda(ordinal) => {
            Device::new_cuda(ordinal).map_err(|e| AlignmentError::runtime("CUDA init", e))
        }
        ComputeDevice::Auto => Ok(Device::cuda_if_available(0).unwrap_or(Device::Cpu)),
    }
}

pub(crate) fn select_dtype(precision: Precision, device: &Device) -> DType {
    match precision {
        Precision::F32 => DType::F32,
        Precision::F16 => DType::F16,
        Precision::Auto if device.is_cuda() => DType::F16,
        Precision::Auto => DType::F32,
    }
}

fn device_label(device: &Device) -> String {
    if device.is_cuda() {
        "cuda".to_string()
    } else if device.is_metal() {
        "metal".to_string()
    } else {
        "cpu".to_string()
    }
}

struct CandleRuntimeBackend {
    model: Wav2Vec2ForCTC,
    device: Device,
    dtype: DType,
}

impl CandleRuntimeBackend {
    fn load(
        config: &AlignerConfig,
        model_cfg: &Wav2Vec2ModelConfig,
    ) -> Result<Self, AlignmentError> {
        let device = select_device(config.device)?;
        let dtype = select_dtype(config.precision, &device);

        let model_data = std::fs::read(&config.model_path)
            .map_err(|e| AlignmentError::io("read safetensors", e))?;
        let vb = VarBuilder::from_buffered_safetensors(model_data, dtype, &device)
            .map_err(|e| AlignmentError::runtime("load safetensors", e))?;
        let model = Wav2Vec2ForCTC::load(model_cfg, vb)
            .map_err(|e| AlignmentError::runtime("build model", e))?;

        tracing::info!(
            hidden_size = model_cfg.hidden_size,
            layers = model_cfg.num_hidden_layers,
            vocab = model_cfg.vocab_size,
            stable_layer_norm = model_cfg.do_stable_layer_norm,
            ?dtype,
            device = %device_label(&device),
            "wav2vec2 Candle runtime loaded"
        );

        Ok(Self {
            model,
            device,
            dtype,
        })
    }

    fn build_batch_tensor(&self, windows: &[&[f32]]) -> Result<Tensor, AlignmentError> {
        let len = windows.first().map_or(0, |w| w.len());
        if len == 0 || windows.iter().any(|w| w.len() != len) {
            return Err(AlignmentError::invalid_input(
                "batch windows must be non-empty and equally long",
            ));
        }
        let flat = windows.concat();
        Tensor::from_vec(flat, (windows.len(), len), &self.device)
            .and_then(|t| t.to_dtype(self.dtype))
            .map_err(|e| AlignmentError::runtime("tensor creation", e))
    }
}

impl RuntimeBackend for CandleRuntimeBackend {
    fn infer(&self, windows: &[&[f32]]) -> Result<Vec<Vec<Vec<f32>>>, AlignmentError> {
        if windows.is_empty() {
            return Ok(Vec::new());
        }
        let audio_tensor = self.build_batch_tensor(windows)?;
        let log_probs_t = self
            .model
            .log_probs(&audio_tensor)
            .map_err(|e| AlignmentError::runtime("forward pass", e))?;
        let (batch, frames, vocab_size) = log_probs_t
            .dims3()
            .map_err(|e| AlignmentError::runtime("log_probs dims3", e))?;
        tracing::trace!(batch, frames, vocab_size, "batch inferred");
        log_probs_t
            .to_vec3()
            .map_err(|e| AlignmentError::runtime("to_vec3", e))
    }

    fn device_label(&self) -> String {
        device_label(&self.device)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cpu_device_and_auto_precision() {
        let device = select_device(ComputeDevice::Cpu).expect("cpu device");
        assert!(device.is_cpu());
        assert_eq!(select_dtype(Precision::Auto, &device), DType::F32);
        assert_eq!(select_dtype(Precision::F16, &device), DType::F16);
        assert_eq!(device_label(&device), "cpu");
    }

    #[test]
    fn auto_device_always_resolves() {
        assert!(select_device(ComputeDevice::Auto).is_ok());
    }

    #[test]
    fn missing_weights_file_is_io_error() {
        let config = AlignerConfig {
            model_path: "/nonexistent/model.safetensors".to_string(),
            device: ComputeDevice::Cpu,
            ..AlignerConfig::default()
        };
        let model_cfg: Wav2Vec2ModelConfig = serde_json::from_str(
            r#"{
                "hidden_size": 8,
                "num_hidden_layers": 1,
                "num_attention_heads": 2,
                "intermediate_size": 16,
                "conv_dim": [8],
                "conv_kernel": [10],
                "conv_stride": [5],
                "num_conv_pos_embeddings": 4,
                "num_conv_pos_embedding_groups": 2,
                "pad_token_id": 0,
                "vocab_size": 4
            }"#,
        )
        .expect("config json");
        assert!(matches!(
            build_runtime_backend(&config, &model_cfg),
            Err(AlignmentError::Io { .. })
        ));
    }
}
