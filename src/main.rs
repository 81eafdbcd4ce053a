use clap::Parser;
use std::error::Error;
use toolrelay::Cli;

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    toolrelay::run(Cli::parse()).await
}
