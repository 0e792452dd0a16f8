use anyhow::Result;
use wheeld::{config, logging, App};

#[tokio::main]
async fn main() -> Result<()> {
    let cfg = config::load()?;
    logging::init_tracing(&cfg);

    let app = App::init_from(cfg)?;
    app.run().await
}
