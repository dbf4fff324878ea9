//! Root binary for the workspace. The actual argument parsing, scenario
//! construction, and kernel dispatch live in `consensus-cli`, which is also
//! usable as `cargo run -p consensus-cli`; this binary exists so the
//! workspace has a single top-level entry point named after the package.

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    consensus_cli::run().await
}
