use std::path::Path;

use citadel::config::Config;
use citadel::server::listener::Server;

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_target(false)
        .with_level(true)
        .init();

    let config_path = std::env::args().nth(1);
    let cfg = Config::load(config_path.as_deref().map(Path::new))?;

    Server::bind(cfg)?.run()
}
