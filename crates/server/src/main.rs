#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dm_server::run().await
}
