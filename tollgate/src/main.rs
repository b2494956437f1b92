mod args;
mod logger;

use args::Args;
use clap::Parser;

#[tokio::main]
async fn main() {
    let args = Args::parse();

    logger::init(args.log_level, args.log_style);

    let config = match args.load_config() {
        Ok(config) => config,
        Err(e) => {
            log::error!("Configuration error: {e:#}");
            std::process::exit(2);
        }
    };

    // CLI flag wins over the configuration file; the file's absence falls
    // back to the address shipped with the defaults.
    let listen_address = args
        .listen_address
        .unwrap_or_else(|| config.server.listen_address_or_default());

    if let Err(e) = server::serve(server::ServeConfig { listen_address, config }).await {
        log::error!("Server failed to start: {e}");
        std::process::exit(1);
    }
}
