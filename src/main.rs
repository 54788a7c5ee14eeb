use std::error::Error;
use std::path::PathBuf;
use std::process::ExitCode;

use brewdata_setup::{
    run, SetupError, SetupOptions, SnowflakeConnector, StdConsole, DEFAULT_PACKAGE_URL,
};
use clap::Parser;

/// Set up BrewData package with dbt Core and Snowflake
#[derive(Parser, Debug)]
#[command(name = "brewdata-setup", version, about, long_about = None)]
struct Cli {
    /// GitHub URL for the BrewData package
    #[arg(long, default_value = DEFAULT_PACKAGE_URL)]
    url: String,

    /// Path to download the BrewData package
    #[arg(long = "download_path", default_value = ".")]
    download_path: PathBuf,

    /// Custom stage name (optional)
    #[arg(long = "stage_name")]
    stage_name: Option<String>,

    /// Keep the ZIP file after upload
    #[arg(long = "keep_zip")]
    keep_zip: bool,

    /// Directory containing profiles.yml
    #[arg(long = "profiles_dir", env = "DBT_PROFILES_DIR")]
    profiles_dir: Option<PathBuf>,
}

fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();
    let cli = Cli::parse();

    let runtime = match tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(err) => return report(&err),
    };

    let result = std::env::current_dir()
        .map_err(SetupError::from)
        .and_then(|working_dir| {
            let options = SetupOptions {
                url: cli.url,
                download_path: cli.download_path,
                stage_name: cli.stage_name,
                keep_zip: cli.keep_zip,
                profiles_dir: cli.profiles_dir,
                working_dir,
            };
            runtime.block_on(run(&options, &SnowflakeConnector::default(), &mut StdConsole))
        });

    match result {
        Ok(_) => ExitCode::SUCCESS,
        Err(err) => report(&err),
    }
}

/// Print the error and everything that caused it
fn report(err: &dyn Error) -> ExitCode {
    eprintln!("Error: {err}");
    eprintln!("{err:?}");
    let mut source = err.source();
    while let Some(cause) = source {
        eprintln!("Caused by: {cause}");
        source = cause.source();
    }
    ExitCode::FAILURE
}
