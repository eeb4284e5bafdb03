use crate::config::{Config, EncoderBackend, StoreBackend};
use crate::encoder::{Encoder, StubEncoder};
use crate::error::{AppError, Result};
use crate::store::{MemoryStore, Store};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::Semaphore;

/// Application state shared across all request handlers. `store` and
/// `encoder` are trait objects so the backend can be swapped by
/// configuration without touching handler code.
pub struct AppState {
    pub store: Arc<dyn Store>,
    pub encoder: Arc<dyn Encoder>,
    pub encoder_semaphore: Arc<Semaphore>,
    pub config: Arc<Config>,
    ready: AtomicBool,
}

impl AppState {
    pub async fn new(config: Config) -> Result<Self> {
        let store: Arc<dyn Store> = match &config.store_backend {
            StoreBackend::Memory => Arc::new(MemoryStore::new()),
            #[allow(unreachable_patterns)]
            StoreBackend::Sqlite(url) => {
                #[cfg(feature = "sql")]
                {
                    Arc::new(
                        crate::store::sqlite::SqlStore::connect(url)
                            .await
                            .map_err(|e| AppError::Transient(format!("failed to connect store: {e}")))?,
                    )
                }
                #[cfg(not(feature = "sql"))]
                {
                    let _ = url;
                    return Err(AppError::Validation(
                        "STORE_BACKEND=sqlite requires the `sql` feature".into(),
                    ));
                }
            }
        };

        let encoder: Arc<dyn Encoder> = match config.encoder_backend {
            EncoderBackend::Stub => Arc::new(StubEncoder),
            #[allow(unreachable_patterns)]
            EncoderBackend::Onnx => {
                #[cfg(feature = "onnx")]
                {
                    Arc::new(crate::encoder::OnnxEncoder::load(
                        &config.onnx_model_path,
                        &config.onnx_tokenizer_path,
                        config.onnx_max_sequence_length,
                    )?)
                }
                #[cfg(not(feature = "onnx"))]
                {
                    return Err(AppError::Validation(
                        "ENCODER_BACKEND=onnx requires the `onnx` feature".into(),
                    ));
                }
            }
        };

        let permits = config.encoder_permits.max(1);
        let state = Self {
            store,
            encoder,
            encoder_semaphore: Arc::new(Semaphore::new(permits)),
            config: Arc::new(config),
            ready: AtomicBool::new(true),
        };

        tracing::info!(permits, "application state initialized");
        Ok(state)
    }

    pub fn is_ready(&self) -> bool {
        self.ready.load(Ordering::SeqCst)
    }

    /// Build state from an already-constructed store and encoder, bypassing
    /// the `config.store_backend`/`config.encoder_backend` switch. Used by
    /// tests that want a `MemoryStore` handle to seed directly.
    pub fn from_parts(store: Arc<dyn Store>, encoder: Arc<dyn Encoder>, config: Config) -> Self {
        let permits = config.encoder_permits.max(1);
        Self {
            store,
            encoder,
            encoder_semaphore: Arc::new(Semaphore::new(permits)),
            config: Arc::new(config),
            ready: AtomicBool::new(true),
        }
    }
}
