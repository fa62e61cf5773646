use clap::Parser;
use server::network::RetrieveServer;
use server::registry::ServerRegistry;
use std::net::SocketAddr;
use std::sync::Arc;

/// Main-method of the application.
/// Parses command-line arguments, binds the retrieval listener and serves
/// browse requests until interrupted.
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Command line arguments
    #[derive(Parser, Debug)]
    #[clap(author, version, about)]
    struct Args {
        /// Address to bind the retrieval listener to
        #[clap(short = 'H', long, default_value = "0.0.0.0")]
        host: String,
        /// Port to listen on
        #[clap(short, long, default_value = "28910")]
        port: u16,
    }

    env_logger::init();
    let args = Args::parse();

    // The registry is populated by the reporting/heartbeat service; this
    // process only serves queries against it.
    let registry = Arc::new(ServerRegistry::new());

    let addr: SocketAddr = format!("{}:{}", args.host, args.port).parse()?;
    let server = RetrieveServer::bind(addr, Arc::clone(&registry)).await?;

    tokio::select! {
        result = server.run() => {
            if let Err(e) = result {
                eprintln!("Server list retrieval stopped: {}", e);
            }
        }
        _ = tokio::signal::ctrl_c() => {
            println!("Received Ctrl+C, shutting down gracefully...");
        }
    }

    Ok(())
}
