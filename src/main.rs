//! # Kubeturbo Operator
//!
//! Deploys and maintains the kubeturbo agent described by `Kubeturbo`
//! custom resources.

use anyhow::Result;
use kubeturbo_operator::runtime::{initialize, run_watch_loop};

#[tokio::main]
async fn main() -> Result<()> {
    let init_result = initialize().await?;
    run_watch_loop(init_result).await
}
