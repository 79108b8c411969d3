use std::path::Path;
use std::process::Command;

use proofprint_queue::{ForensicQueue, QueueConfig};
use proofprint_storage::{R2Client, StorageBackend};
use proofprint_worker::WorkerConfig;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let config = WorkerConfig::from_env();

    println!(
        "worker-selfcheck: starting with work_dir={}",
        config.work_dir.display()
    );
    ensure_workdir(&config.work_dir).await?;
    ensure_tool("ffmpeg", proofprint_media::check_ffmpeg().is_ok())?;
    ensure_tool("ffprobe", proofprint_media::check_ffprobe().is_ok())?;
    ensure_database().await?;
    ensure_storage().await?;

    println!("worker-selfcheck: ok");
    Ok(())
}

async fn ensure_workdir<P: AsRef<Path>>(path: P) -> anyhow::Result<()> {
    let path = path.as_ref();
    tokio::fs::create_dir_all(path).await?;

    let probe = tempfile::NamedTempFile::new_in(path)
        .map_err(|e| anyhow::anyhow!("work dir {} not writable: {}", path.display(), e))?;
    drop(probe);
    Ok(())
}

fn ensure_tool(name: &str, on_path: bool) -> anyhow::Result<()> {
    if !on_path {
        return Err(anyhow::anyhow!("{} not found in PATH", name));
    }

    let output = Command::new(name)
        .arg("-version")
        .output()
        .map_err(|e| anyhow::anyhow!("{} not available: {}", name, e))?;

    if !output.status.success() {
        return Err(anyhow::anyhow!(
            "{} -version failed: {:?}",
            name,
            output.status
        ));
    }
    Ok(())
}

async fn ensure_database() -> anyhow::Result<()> {
    let queue = ForensicQueue::connect(&QueueConfig::from_env()).await?;
    queue.init().await?;

    let missing = queue.missing_tables().await?;
    if !missing.is_empty() {
        return Err(anyhow::anyhow!("missing tables: {}", missing.join(", ")));
    }
    Ok(())
}

async fn ensure_storage() -> anyhow::Result<()> {
    match StorageBackend::from_env()? {
        StorageBackend::Local { root } => {
            tokio::fs::create_dir_all(&root).await.map_err(|e| {
                anyhow::anyhow!("storage root {} not usable: {}", root.display(), e)
            })?;
        }
        StorageBackend::R2 => {
            rustls::crypto::ring::default_provider()
                .install_default()
                .ok();
            let client = R2Client::from_env().await?;
            client.check_connectivity().await?;
        }
    }
    Ok(())
}
