//! Stages the BrewData package in Snowflake for dbt Python models.
//!
//! A setup run reads the dbt connection profile of the current project,
//! downloads the packaged code bundle, and uploads it to an internal stage
//! where dbt Python models can import it.
//!
//! Example usage:
//!
//! ```rust,no_run
//! use brewdata_setup::{run, SetupError, SetupOptions, SnowflakeConnector, StdConsole};
//!
//! #[tokio::main(flavor = "current_thread")]
//! async fn main() -> Result<(), SetupError> {
//!     let mut options = SetupOptions::new(std::env::current_dir()?);
//!     options.stage_name = Some("brewdata_libs".into());
//!
//!     let stage = run(&options, &SnowflakeConnector::default(), &mut StdConsole).await?;
//!     println!("Staged in {stage}");
//!     Ok(())
//! }
//! ```
//!
//! Each step is usable on its own: [`resolve_profile`] picks the connection,
//! [`PackageFetcher`] downloads, and [`upload_to_stage`] stages through any
//! [`Connector`].

mod console;
mod encryption;
mod errors;
mod fetch;
mod jwt;
mod profile;
mod response;
mod session;
mod setup;
mod stage;
mod transfer;

pub use console::{Console, StdConsole};
pub use errors::{SetupError, SetupResult, SnowflakeError, SnowflakeResult};
pub use fetch::{
    progress_bar, DownloadedArtifact, PackageFetcher, DEFAULT_PACKAGE_URL, PACKAGE_FILE_NAME,
    PROGRESS_THRESHOLD,
};
pub use jwt_simple;
pub use profile::{
    candidate_profile_name, profiles_path, resolve_profile, ConnectionTarget, Profile,
    ProfileStore, DEFAULT_TARGET, PROFILES_FILE_NAME,
};
pub use session::{account_url, Connection, Connector, Session, SnowflakeConnector};
pub use setup::{run, usage_template, SetupOptions};
pub use stage::{
    create_stage_sql, put_sql, qualified_stage_name, upload_to_stage, DEFAULT_STAGE_NAME,
};
