//! Forensic fingerprint worker binary.

use std::sync::Arc;

use tracing::{error, info, warn};

use proofprint_media::{FingerprintPipeline, MediaDecoder, PipelineConfig};
use proofprint_queue::{ForensicQueue, QueueConfig};
use proofprint_worker::{init_tracing, metrics, JobExecutor, WorkerConfig};

#[tokio::main]
async fn main() {
    // Load environment variables
    dotenvy::dotenv().ok();
    init_tracing();

    // TLS for the S3 client
    if rustls::crypto::ring::default_provider()
        .install_default()
        .is_err()
    {
        warn!("A rustls crypto provider was already installed");
    }

    info!("Starting proofprint-worker");

    let config = WorkerConfig::from_env();
    info!("Worker config: {:?}", config);

    if let Some(addr) = config.metrics_addr {
        match metrics::install_exporter(addr) {
            Ok(()) => info!("Serving metrics on {}", addr),
            Err(e) => warn!("{}", e),
        }
    }

    let queue = match ForensicQueue::connect(&QueueConfig::from_env()).await {
        Ok(q) => q,
        Err(e) => {
            error!("Failed to open forensic queue: {}", e);
            std::process::exit(1);
        }
    };

    let store = match proofprint_storage::open_from_env().await {
        Ok(s) => s,
        Err(e) => {
            error!("Failed to open object store: {}", e);
            std::process::exit(1);
        }
    };

    let pipeline = FingerprintPipeline::new(
        PipelineConfig::default(),
        MediaDecoder::with_timeout(config.decode_timeout.as_secs()),
    );

    let executor = Arc::new(JobExecutor::new(config, queue, store, Arc::new(pipeline)));

    // Setup signal handler
    let signal_executor = Arc::clone(&executor);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Received shutdown signal");
            signal_executor.shutdown();
        }
    });

    if let Err(e) = executor.run().await {
        error!("Executor error: {}", e);
        std::process::exit(1);
    }

    info!("Worker shutdown complete");
}
