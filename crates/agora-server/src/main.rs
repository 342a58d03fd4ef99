//! Agora Server Binary
//!
//! Standalone entry point - delegates to lib.

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let port: Option<u16> = std::env::var("PORT").ok().and_then(|p| p.parse().ok());

    agora_server::run_server(port).await
}
