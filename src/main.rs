use std::{fs, io::{self, Write}, path::Path};

use anyhow::{Result, bail};
use clap::Parser as _;

use gander::{config, engine, http, log};

mod cli;

use self::cli::{Cli, Command};


#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    match cli.cmd {
        Command::Run => {
            let config = config::load(cli.config.as_deref())?;
            log::init(&config.log)?;
            let ctx = http::Context::new(config)?;
            http::serve(ctx).await?;
        }

        Command::Check => check(cli.config.as_deref()).await?,

        Command::GenConfigTemplate { out } => {
            let template = config::template();
            match out {
                Some(path) => fs::write(path, &template)?,
                None => io::stdout().write_all(template.as_bytes())?,
            }
        }
    }

    Ok(())
}

async fn check(config_path: Option<&Path>) -> Result<()> {
    let config = config::load(config_path)?;
    println!("Config OK");

    if config.auth.enabled() {
        println!("Auth: login required");
        if config.auth.secret.is_none() {
            println!("Note: 'auth.secret' is unset, sessions will not survive restarts");
        }
    } else {
        println!("Auth: disabled, console open to everyone");
    }

    match engine::Controller::connect(&config.engine).await {
        Ok(_) => println!("Engine controller reachable at {}", config.engine.controller_addr()),
        Err(e) => bail!("engine controller not reachable: {e:#}"),
    }

    Ok(())
}
