#[tokio::main]
async fn main() -> anyhow::Result<()> {
    consensus_cli::run().await
}
