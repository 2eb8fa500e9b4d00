/*!
 * Tuple Space Entry Point
 *
 * One argument starts the server on that port; three arguments replay a
 * request file against a running server.
 */

use anyhow::*;
use clap::Parser;
use tuplespace::cli::{self, Cli, Mode};
use tuplespace::{client, Server};

#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

fn main() -> Result<()> {
    // Respects RUST_LOG, e.g. RUST_LOG=debug tuplespace 5000
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();
    let mode = match cli.mode() {
        std::result::Result::Ok(mode) => mode,
        Err(e) => {
            println!("{}", e);
            std::process::exit(2);
        }
    };

    match mode {
        Mode::Server { port } => {
            if cli::is_privileged(port) {
                println!("{}", cli::PRIVILEGED_PORT_WARNING);
            }
            let server = Server::bind(cli.server_config(port))?;
            println!("Server started on port {}", server.local_addr()?.port());
            server.run().context("server stopped")
        }
        Mode::Client {
            host,
            port,
            requests,
        } => client::run(&host, port, &requests),
    }
}
