//! depotd: the remote shell server.

use std::process::ExitCode;

use depot::cli::{self, ServerArgs};
use depot::config::{Config, Transport};
use depot::{logging, server};
use tokio::net::TcpListener;
use tracing::{error, info};

#[tokio::main]
async fn main() -> ExitCode {
    let args = match cli::parse_server_args() {
        Ok(args) => args,
        Err(e) => {
            eprintln!("error: {}", e);
            eprintln!("Try 'depotd --help' for more information.");
            return ExitCode::FAILURE;
        }
    };

    if args.help {
        cli::print_server_help();
        return ExitCode::SUCCESS;
    }
    if args.version {
        cli::print_version("depotd");
        return ExitCode::SUCCESS;
    }

    match run(args).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{}", e);
            eprintln!("error: {}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run(args: ServerArgs) -> Result<(), Box<dyn std::error::Error>> {
    let config = Config::load(&args)?;
    let _ = logging::init_with_filter(config.log_filter());

    info!("depotd v{}", env!("CARGO_PKG_VERSION"));

    let tls = config.tls_acceptor()?;
    let state = config.server_state();
    let listener = TcpListener::bind(&config.server.listen).await?;

    let serving = async {
        match config.server.proto {
            Transport::Tcp => server::tcp::serve(listener, state, tls).await,
            Transport::Httpws => {
                server::ws::serve(listener, state, &config.server.ws_path, tls).await
            }
        }
    };

    tokio::select! {
        result = serving => result?,
        _ = tokio::signal::ctrl_c() => info!("interrupted, shutting down"),
    }

    Ok(())
}
