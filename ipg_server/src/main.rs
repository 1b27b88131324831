use std::process::ExitCode;

use clap::Parser;
use dotenvy::dotenv;
use ipg_server::cli::{run_command, Arguments};

#[actix_web::main]
async fn main() -> ExitCode {
    dotenv().ok();
    env_logger::init();
    let args = Arguments::parse();
    run_command(args).await.into()
}
