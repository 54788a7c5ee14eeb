use std::path::Path;

use crate::console::Console;
use crate::errors::{SetupError, SetupResult};
use crate::profile::ConnectionTarget;
use crate::session::{Connection, Connector};

/// Stage used when none is named on the command line
pub const DEFAULT_STAGE_NAME: &str = "BREWDATA_STAGE";

/// `database.schema.NAME` for the target, upper-casing a user-supplied name
pub fn qualified_stage_name(target: &ConnectionTarget, stage_name: Option<&str>) -> String {
    let name = stage_name
        .map(str::to_uppercase)
        .unwrap_or_else(|| DEFAULT_STAGE_NAME.to_owned());
    format!("{}.{}.{name}", target.database, target.schema)
}

pub fn create_stage_sql(stage: &str) -> String {
    format!("CREATE STAGE IF NOT EXISTS {stage}")
}

/// The `PUT` for `path`, stored uncompressed and replacing any earlier copy
pub fn put_sql(path: &Path, stage: &str) -> SetupResult<String> {
    let absolute = std::path::absolute(path)?;
    let location = format!("file://{}", absolute.to_string_lossy().replace('\\', "/"));
    let location = if location.contains(|c: char| c.is_whitespace() || c == '\'') {
        format!("'{}'", location.replace('\'', "''"))
    } else {
        location
    };
    Ok(format!("PUT {location} @{stage} AUTO_COMPRESS=FALSE OVERWRITE=TRUE"))
}

/// Make sure the stage exists and put the artifact in it
///
/// Returns the fully-qualified stage name. The connection is closed whether or
/// not the statements succeed; a failure to close is only logged so it never
/// hides the error that matters.
pub async fn upload_to_stage<C: Connector, K: Console>(
    connector: &C,
    target: &ConnectionTarget,
    artifact: &Path,
    stage_name: Option<&str>,
    console: &mut K,
) -> SetupResult<String> {
    console.say(&format!(
        "Connecting to Snowflake as {}@{}...",
        target.user, target.account
    ));
    let mut connection = connector
        .connect(target)
        .await
        .map_err(SetupError::ConnectionFailed)?;

    let stage = qualified_stage_name(target, stage_name);
    let outcome = run_upload(&mut connection, &stage, artifact, console).await;

    if let Err(err) = connection.close().await {
        log::warn!("Failed to close Snowflake connection: {err}");
    }
    outcome?;
    Ok(stage)
}

async fn run_upload<C: Connection, K: Console>(
    connection: &mut C,
    stage: &str,
    artifact: &Path,
    console: &mut K,
) -> SetupResult<()> {
    console.say(&format!("Creating stage {stage}..."));
    connection
        .execute(&create_stage_sql(stage))
        .await
        .map_err(SetupError::UploadFailed)?;

    console.say(&format!("Uploading ZIP file to stage {stage}..."));
    connection
        .execute(&put_sql(artifact, stage)?)
        .await
        .map_err(SetupError::UploadFailed)?;
    console.say("Upload completed successfully!");
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;
    use std::rc::Rc;

    use crate::console::ScriptedConsole;
    use crate::errors::{SnowflakeError, SnowflakeResult};

    use super::*;

    #[derive(Default)]
    struct Log {
        statements: Vec<String>,
        stages: Vec<String>,
        files: Vec<String>,
        closes: usize,
    }

    /// Pretends to be a warehouse where stage creation is idempotent and PUT overwrites
    #[derive(Default)]
    struct FakeWarehouse {
        log: Rc<RefCell<Log>>,
        refuse_login: bool,
        fail_on: Option<&'static str>,
    }

    struct FakeConnection {
        log: Rc<RefCell<Log>>,
        fail_on: Option<&'static str>,
    }

    impl Connector for FakeWarehouse {
        type Connection = FakeConnection;

        async fn connect(&self, _target: &ConnectionTarget) -> SnowflakeResult<FakeConnection> {
            if self.refuse_login {
                return Err(SnowflakeError::ServerError {
                    code: "390100".into(),
                    message: "Incorrect username or password was specified.".into(),
                });
            }
            Ok(FakeConnection {
                log: self.log.clone(),
                fail_on: self.fail_on,
            })
        }
    }

    impl Connection for FakeConnection {
        async fn execute(&mut self, sql: &str) -> SnowflakeResult<()> {
            let mut log = self.log.borrow_mut();
            log.statements.push(sql.to_owned());
            if self.fail_on.is_some_and(|prefix| sql.starts_with(prefix)) {
                return Err(SnowflakeError::ServerError {
                    code: "003001".into(),
                    message: "Insufficient privileges".into(),
                });
            }
            if let Some(stage) = sql.strip_prefix("CREATE STAGE IF NOT EXISTS ") {
                if !log.stages.iter().any(|existing| existing == stage) {
                    log.stages.push(stage.to_owned());
                }
            } else if let Some(rest) = sql.strip_prefix("PUT ") {
                let file = rest.split_whitespace().next().unwrap_or_default().to_owned();
                log.files.retain(|existing| existing != &file);
                log.files.push(file);
            }
            Ok(())
        }

        async fn close(self) -> SnowflakeResult<()> {
            self.log.borrow_mut().closes += 1;
            Ok(())
        }
    }

    fn target() -> ConnectionTarget {
        serde_yaml_ng::from_str(
            "account: XY12345\nuser: ANALYST\npassword: pw\nwarehouse: WH\ndatabase: ANALYTICS\nschema: PUBLIC\n",
        )
        .unwrap()
    }

    #[test]
    fn stage_name_defaults_and_upper_cases() {
        assert_eq!(
            qualified_stage_name(&target(), None),
            "ANALYTICS.PUBLIC.BREWDATA_STAGE"
        );
        assert_eq!(
            qualified_stage_name(&target(), Some("my_libs")),
            "ANALYTICS.PUBLIC.MY_LIBS"
        );
    }

    #[cfg(not(windows))]
    #[test]
    fn put_statement_disables_compression_and_overwrites() -> SetupResult<()> {
        assert_eq!(
            put_sql(Path::new("/tmp/brewdata_lib.zip"), "DB.S.STAGE")?,
            "PUT file:///tmp/brewdata_lib.zip @DB.S.STAGE AUTO_COMPRESS=FALSE OVERWRITE=TRUE"
        );
        assert_eq!(
            put_sql(Path::new("/tmp/my dir/brewdata_lib.zip"), "DB.S.STAGE")?,
            "PUT 'file:///tmp/my dir/brewdata_lib.zip' @DB.S.STAGE AUTO_COMPRESS=FALSE OVERWRITE=TRUE"
        );
        Ok(())
    }

    #[cfg(not(windows))]
    #[test]
    fn put_statement_escapes_quotes_in_path() -> SetupResult<()> {
        assert_eq!(
            put_sql(Path::new("/home/o'brien/brewdata_lib.zip"), "DB.S.STAGE")?,
            "PUT 'file:///home/o''brien/brewdata_lib.zip' @DB.S.STAGE AUTO_COMPRESS=FALSE OVERWRITE=TRUE"
        );
        Ok(())
    }

    #[test]
    fn put_statement_uses_absolute_forward_slash_path() -> SetupResult<()> {
        let sql = put_sql(Path::new("brewdata_lib.zip"), "DB.S.STAGE")?;
        let location = sql
            .strip_prefix("PUT file://")
            .and_then(|rest| rest.split(' ').next())
            .unwrap_or_default();
        assert!(!location.contains('\\'));
        assert!(location.ends_with("/brewdata_lib.zip"));
        assert!(Path::new(location).is_absolute() || location.chars().nth(1) == Some(':'));
        Ok(())
    }

    #[tokio::test]
    async fn uploads_and_closes() -> SetupResult<()> {
        let warehouse = FakeWarehouse::default();
        let mut console = ScriptedConsole::default();
        let stage = upload_to_stage(
            &warehouse,
            &target(),
            Path::new("/tmp/brewdata_lib.zip"),
            Some("libs"),
            &mut console,
        )
        .await?;
        assert_eq!(stage, "ANALYTICS.PUBLIC.LIBS");

        let log = warehouse.log.borrow();
        assert_eq!(log.statements.len(), 2);
        assert_eq!(log.statements[0], "CREATE STAGE IF NOT EXISTS ANALYTICS.PUBLIC.LIBS");
        assert!(log.statements[1].starts_with("PUT file://"));
        assert!(log.statements[1]
            .ends_with("@ANALYTICS.PUBLIC.LIBS AUTO_COMPRESS=FALSE OVERWRITE=TRUE"));
        assert_eq!(log.closes, 1);
        assert!(console.output().contains("Connecting to Snowflake as ANALYST@XY12345..."));
        assert!(console.output().contains("Upload completed successfully!"));
        Ok(())
    }

    #[tokio::test]
    async fn rerunning_reuses_stage_and_replaces_file() -> SetupResult<()> {
        let warehouse = FakeWarehouse::default();
        let mut console = ScriptedConsole::default();
        for _ in 0..2 {
            upload_to_stage(
                &warehouse,
                &target(),
                Path::new("/tmp/brewdata_lib.zip"),
                None,
                &mut console,
            )
            .await?;
        }
        let log = warehouse.log.borrow();
        assert_eq!(log.statements.len(), 4);
        assert_eq!(log.statements[0], log.statements[2]);
        assert_eq!(log.statements[1], log.statements[3]);
        assert_eq!(log.stages, vec!["ANALYTICS.PUBLIC.BREWDATA_STAGE"]);
        assert_eq!(log.files.len(), 1);
        assert_eq!(log.closes, 2);
        Ok(())
    }

    #[tokio::test]
    async fn failed_statement_still_closes() {
        let warehouse = FakeWarehouse {
            fail_on: Some("PUT"),
            ..Default::default()
        };
        let mut console = ScriptedConsole::default();
        let err = upload_to_stage(
            &warehouse,
            &target(),
            Path::new("/tmp/brewdata_lib.zip"),
            None,
            &mut console,
        )
        .await
        .unwrap_err();
        assert!(matches!(err, SetupError::UploadFailed(_)));
        assert_eq!(warehouse.log.borrow().closes, 1);
        assert!(!console.output().contains("Upload completed"));
    }

    #[tokio::test]
    async fn refused_login_is_a_connection_failure() {
        let warehouse = FakeWarehouse {
            refuse_login: true,
            ..Default::default()
        };
        let mut console = ScriptedConsole::default();
        let err = upload_to_stage(
            &warehouse,
            &target(),
            Path::new("/tmp/brewdata_lib.zip"),
            None,
            &mut console,
        )
        .await
        .unwrap_err();
        assert!(matches!(err, SetupError::ConnectionFailed(_)));
        assert!(warehouse.log.borrow().statements.is_empty());
    }
}
