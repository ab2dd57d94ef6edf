#[tokio::main]
async fn main() -> anyhow::Result<()> {
    sos_relay_lib::init_logging();
    sos_relay_lib::run().await
}
