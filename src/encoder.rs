//! Text -> embedding boundary. The retriever never depends on a concrete
//! inference stack directly, only on this trait, so the default build can
//! run without an ONNX runtime installed.

use crate::domain::EMBEDDING_DIM;
use crate::error::{AppError, Result};
use async_trait::async_trait;

#[async_trait]
pub trait Encoder: Send + Sync {
    async fn encode(&self, text: &str) -> Result<[f32; EMBEDDING_DIM]>;
}

/// Deterministic, hash-based embedding. Stable across runs and processes,
/// so it is also what the test suite uses to avoid depending on model
/// files. Not semantically meaningful beyond rough repeatability.
pub struct StubEncoder;

#[async_trait]
impl Encoder for StubEncoder {
    async fn encode(&self, text: &str) -> Result<[f32; EMBEDDING_DIM]> {
        use sha2::{Digest, Sha256};

        let mut out = [0f32; EMBEDDING_DIM];
        let mut seed = text.as_bytes().to_vec();
        let mut cursor = 0usize;
        while cursor < EMBEDDING_DIM {
            let mut hasher = Sha256::new();
            hasher.update(&seed);
            let digest = hasher.finalize();
            for byte in digest.iter() {
                if cursor >= EMBEDDING_DIM {
                    break;
                }
                // Map byte -> [-1, 1]
                out[cursor] = (*byte as f32 / 127.5) - 1.0;
                cursor += 1;
            }
            seed = digest.to_vec();
        }

        let norm: f32 = out.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > 0.0 {
            for v in &mut out {
                *v /= norm;
            }
        }
        Ok(out)
    }
}

/// ONNX-backed encoder: mean-pools the last hidden state over the
/// attention mask and L2-normalizes, the same shape the bi-encoder uses
/// for document embeddings, just invoked one string at a time here.
#[cfg(feature = "onnx")]
pub struct OnnxEncoder {
    session: tokio::sync::Mutex<ort::session::Session>,
    tokenizer: tokenizers::Tokenizer,
    max_length: usize,
}

#[cfg(feature = "onnx")]
impl OnnxEncoder {
    pub fn load(model_path: &std::path::Path, tokenizer_path: &std::path::Path, max_length: usize) -> Result<Self> {
        use ort::session::{builder::GraphOptimizationLevel, Session};

        let tokenizer = tokenizers::Tokenizer::from_file(tokenizer_path)
            .map_err(|e| AppError::ModelError(format!("failed to load tokenizer: {e}")))?;

        let session = Session::builder()
            .map_err(|e| AppError::ModelError(e.to_string()))?
            .with_optimization_level(GraphOptimizationLevel::Level3)
            .map_err(|e| AppError::ModelError(e.to_string()))?
            .with_intra_threads(1)
            .map_err(|e| AppError::ModelError(e.to_string()))?
            .commit_from_file(model_path)
            .map_err(|e| AppError::ModelError(format!("failed to load encoder model: {e}")))?;

        Ok(Self {
            session: tokio::sync::Mutex::new(session),
            tokenizer,
            max_length,
        })
    }
}

#[cfg(feature = "onnx")]
#[async_trait]
impl Encoder for OnnxEncoder {
    async fn encode(&self, text: &str) -> Result<[f32; EMBEDDING_DIM]> {
        use ort::value::Tensor;

        let encoding = self
            .tokenizer
            .encode(text, true)
            .map_err(|e| AppError::ModelError(format!("tokenization failed: {e}")))?;

        let ids = encoding.get_ids();
        let mask = encoding.get_attention_mask();
        let len = ids.len().min(self.max_length);

        let input_ids: Vec<i64> = ids[..len].iter().map(|&v| v as i64).collect();
        let attention_mask: Vec<i64> = mask[..len].iter().map(|&v| v as i64).collect();
        let shape = [1usize, len];

        let input_ids_tensor =
            Tensor::from_array((shape, input_ids)).map_err(|e| AppError::ModelError(e.to_string()))?;
        let attention_mask_tensor = Tensor::from_array((shape, attention_mask.clone()))
            .map_err(|e| AppError::ModelError(e.to_string()))?;

        let mut session = self.session.lock().await;
        let outputs = session
            .run(ort::inputs![
                "input_ids" => input_ids_tensor,
                "attention_mask" => attention_mask_tensor,
            ])
            .map_err(|e| AppError::ModelError(format!("encoder inference failed: {e}")))?;

        let hidden_state = outputs
            .get("last_hidden_state")
            .ok_or_else(|| AppError::ModelError("no last_hidden_state output".into()))?;
        let tensor = hidden_state
            .try_extract_tensor::<f32>()
            .map_err(|e| AppError::ModelError(e.to_string()))?;
        let (shape_info, data) = tensor;
        let hidden_size = shape_info[2] as usize;

        let mut sum = vec![0f32; hidden_size];
        let mut count = 0f32;
        for j in 0..len {
            if attention_mask[j] == 1 {
                let base = j * hidden_size;
                for k in 0..hidden_size {
                    sum[k] += data[base + k];
                }
                count += 1.0;
            }
        }
        if count > 0.0 {
            for v in &mut sum {
                *v /= count;
            }
        }

        // Truncate/pad to EMBEDDING_DIM so the retriever can assume a fixed
        // dimension regardless of the underlying model's hidden size.
        let mut out = [0f32; EMBEDDING_DIM];
        for i in 0..EMBEDDING_DIM.min(hidden_size) {
            out[i] = sum[i];
        }
        let norm: f32 = out.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > 0.0 {
            for v in &mut out {
                *v /= norm;
            }
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn stub_encoder_is_deterministic() {
        let enc = StubEncoder;
        let a = enc.encode("rust web scraper").await.unwrap();
        let b = enc.encode("rust web scraper").await.unwrap();
        assert_eq!(a, b);
    }

    #[tokio::test]
    async fn stub_encoder_is_unit_norm() {
        let enc = StubEncoder;
        let v = enc.encode("machine learning project").await.unwrap();
        let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-4);
    }

    #[tokio::test]
    async fn stub_encoder_differs_for_different_text() {
        let enc = StubEncoder;
        let a = enc.encode("rust").await.unwrap();
        let b = enc.encode("python").await.unwrap();
        assert_ne!(a, b);
    }
}
