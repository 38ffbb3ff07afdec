#[tokio::main]
async fn main() -> anyhow::Result<()> {
    back_office_lib::run().await
}
