use std::path::{Path, PathBuf};

use crate::console::Console;
use crate::errors::SetupResult;
use crate::fetch::{PackageFetcher, DEFAULT_PACKAGE_URL, PACKAGE_FILE_NAME};
use crate::profile::{self, ProfileStore};
use crate::session::Connector;
use crate::stage;

/// Everything a setup run needs to know up front
#[derive(Debug, Clone)]
pub struct SetupOptions {
    /// Where the package is downloaded from
    pub url: String,
    /// Directory the package is downloaded into
    pub download_path: PathBuf,
    /// Short stage name, `BREWDATA_STAGE` when absent
    pub stage_name: Option<String>,
    /// Keep the package on disk after a successful upload
    pub keep_zip: bool,
    /// Directory holding `profiles.yml`, instead of the platform default
    pub profiles_dir: Option<PathBuf>,
    /// The dbt project directory, which also names the profile
    pub working_dir: PathBuf,
}

impl SetupOptions {
    pub fn new(working_dir: impl Into<PathBuf>) -> SetupOptions {
        SetupOptions {
            url: DEFAULT_PACKAGE_URL.to_owned(),
            download_path: PathBuf::from("."),
            stage_name: None,
            keep_zip: false,
            profiles_dir: None,
            working_dir: working_dir.into(),
        }
    }
}

/// Resolve the profile, fetch the package, stage it and print how to use it
///
/// Returns the fully-qualified stage name. Nothing is cleaned up when a step
/// fails, so a downloaded package survives a failed upload.
pub async fn run<C: Connector, K: Console>(
    options: &SetupOptions,
    connector: &C,
    console: &mut K,
) -> SetupResult<String> {
    let profiles_path =
        profile::profiles_path(&options.working_dir, options.profiles_dir.as_deref())?;
    log::debug!("Reading dbt profiles from {}", profiles_path.display());
    let store = ProfileStore::load(&profiles_path)?;
    let candidate = profile::candidate_profile_name(&options.working_dir);
    let (profile_name, target) = profile::resolve_profile(&store, &candidate, console)?;
    console.say(&format!("Using profile: {profile_name}"));
    console.say(&format!(
        "Snowflake connection: {}@{}",
        target.user, target.account
    ));

    let artifact = PackageFetcher::new()?
        .fetch(&options.download_path, &options.url, console)
        .await?;

    let stage = stage::upload_to_stage(
        connector,
        &target,
        &artifact.path,
        options.stage_name.as_deref(),
        console,
    )
    .await?;

    if !options.keep_zip && artifact.path.exists() {
        remove_artifact(&artifact.path, console)?;
    }

    console.say("");
    console.say("Setup Complete!");
    console.say("===================================");
    console.say("To use BrewData in your dbt-Python model, include the following in your model file:");
    console.say(&usage_template(&stage));
    Ok(stage)
}

fn remove_artifact<K: Console>(path: &Path, console: &mut K) -> SetupResult<()> {
    console.say(&format!("Removing temporary ZIP file: {}", path.display()));
    std::fs::remove_file(path)?;
    Ok(())
}

/// A dbt Python model that imports the staged package
pub fn usage_template(stage: &str) -> String {
    format!(
        r#"
def model(dbt, session):
    dbt.config(
         materialized="table",
         packages=["shapely", "transformers", "sympy", "faker", "requests", "xmltodict", "xmlschema",
                   "pandas", "numpy", "scikit-learn", "scipy", "tqdm", "pytorch", "datasets"],
         imports=['@{stage}/{PACKAGE_FILE_NAME}'] # change to your @{{DB_NAME}}.{{SCHEMA_NAME}}.{{STAGE_NAME}}/{PACKAGE_FILE_NAME}
    )

    # Import custom BrewData module AFTER the config call
    from brewdata_dbt import FileSyntheticData

    # Your code here
    # ...
"#
    )
}
