//! depot: connect the local terminal to a depotd shell.

use std::process::ExitCode;

use depot::cli::{self, ClientArgs, ClientTransport};
use depot::client::{self, terminal::RawModeGuard};
use depot::logging;

#[tokio::main]
async fn main() -> ExitCode {
    let args = match cli::parse_client_args() {
        Ok(args) => args,
        Err(e) => {
            eprintln!("error: {}", e);
            eprintln!("Try 'depot --help' for more information.");
            return ExitCode::FAILURE;
        }
    };

    if args.help {
        cli::print_client_help();
        return ExitCode::SUCCESS;
    }
    if args.version {
        cli::print_version("depot");
        return ExitCode::SUCCESS;
    }

    let _ = logging::init_with_filter(args.log_level.as_deref().unwrap_or("warn"));

    let code = match run(args).await {
        Ok(()) => 0,
        Err(e) => {
            eprintln!("depot: {}", e);
            1
        }
    };

    // A pending stdin read would hold the runtime open on shutdown.
    std::process::exit(code)
}

async fn run(args: ClientArgs) -> Result<(), Box<dyn std::error::Error>> {
    let secret = args.resolve_password()?;

    let stdin = tokio::io::stdin();
    let stdout = tokio::io::stdout();

    match args.proto {
        ClientTransport::Tcp => {
            let stream = client::connect_tcp(&args.addr).await?;
            let _raw = RawModeGuard::enable()?;
            client::run(stream, &secret, stdin, stdout).await?;
        }
        ClientTransport::Httpws | ClientTransport::Httpswss => {
            let secure = args.proto == ClientTransport::Httpswss;
            let url = client::ws_url(&args.addr, &args.ws_path, secure)?;
            let stream = client::connect_ws(&url).await?;
            let _raw = RawModeGuard::enable()?;
            client::run(stream, &secret, stdin, stdout).await?;
        }
    }

    Ok(())
}
