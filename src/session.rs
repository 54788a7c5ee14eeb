use std::path::Path;
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::errors::{SnowflakeError, SnowflakeResult, SnowflakeWireResult};
use crate::profile::ConnectionTarget;
use crate::response::{LoginData, QueryData, QUERY_IN_PROGRESS, QUERY_IN_PROGRESS_ASYNC};
use crate::{jwt, transfer};

/// Opens connections to a warehouse
#[allow(async_fn_in_trait)]
pub trait Connector {
    type Connection: Connection;

    async fn connect(&self, target: &ConnectionTarget) -> SnowflakeResult<Self::Connection>;
}

/// An open warehouse connection
///
/// `close` consumes the connection, so it can only be released once.
#[allow(async_fn_in_trait)]
pub trait Connection {
    /// Run one statement to completion, including any file transfer it asks for
    async fn execute(&mut self, sql: &str) -> SnowflakeResult<()>;

    async fn close(self) -> SnowflakeResult<()>;
}

/// Connects through Snowflake's session endpoints with username/password or key-pair login
#[derive(Debug, Clone)]
pub struct SnowflakeConnector {
    /// Client-side timeout for each request
    pub timeout: Duration,
    /// How long to wait between polls of a statement still running
    pub poll_interval: Duration,
}

impl Default for SnowflakeConnector {
    fn default() -> Self {
        SnowflakeConnector {
            timeout: Duration::from_secs(300),
            poll_interval: Duration::from_millis(500),
        }
    }
}

impl Connector for SnowflakeConnector {
    type Connection = Session;

    async fn connect(&self, target: &ConnectionTarget) -> SnowflakeResult<Session> {
        Session::login(self, target).await
    }
}

/// A logged-in Snowflake session
#[derive(Debug)]
pub struct Session {
    http: reqwest::Client,
    host: String,
    token: String,
    sequence_id: u64,
    poll_interval: Duration,
    closed: bool,
}

/// Base URL of the account, honouring the target's `host`, `port` and `protocol`
pub fn account_url(target: &ConnectionTarget) -> String {
    let protocol = target.protocol.as_deref().unwrap_or("https");
    let host = target.host.clone().unwrap_or_else(|| {
        format!(
            "{}.snowflakecomputing.com",
            target.account.to_ascii_lowercase()
        )
    });
    match target.port {
        Some(port) => format!("{protocol}://{host}:{port}"),
        None => format!("{protocol}://{host}"),
    }
}

impl Session {
    fn client(timeout: Duration) -> SnowflakeResult<reqwest::Client> {
        use reqwest::header::*;
        let mut headers = HeaderMap::with_capacity(3);
        headers.append(CONTENT_TYPE, "application/json".parse()?);
        headers.append(ACCEPT, "application/snowflake".parse()?);
        headers.append(
            USER_AGENT,
            concat!(env!("CARGO_PKG_NAME"), '/', env!("CARGO_PKG_VERSION")).parse()?,
        );
        Ok(reqwest::Client::builder()
            .default_headers(headers)
            .timeout(timeout)
            .build()?)
    }

    async fn login(
        connector: &SnowflakeConnector,
        target: &ConnectionTarget,
    ) -> SnowflakeResult<Session> {
        let http = Self::client(connector.timeout)?;
        let host = account_url(target);
        let account_name = target
            .account
            .split('.')
            .next()
            .unwrap_or(&target.account)
            .to_ascii_uppercase();

        let mut data = serde_json::json!({
            "CLIENT_APP_ID": env!("CARGO_PKG_NAME"),
            "CLIENT_APP_VERSION": env!("CARGO_PKG_VERSION"),
            "ACCOUNT_NAME": account_name,
            "LOGIN_NAME": target.user,
            "CLIENT_ENVIRONMENT": {
                "APPLICATION": env!("CARGO_PKG_NAME"),
                "OS": std::env::consts::OS,
            },
        });
        if let Some(key_path) = &target.private_key_path {
            let key_pair = jwt::load_key_pair(Path::new(key_path))?;
            data["AUTHENTICATOR"] = "SNOWFLAKE_JWT".into();
            data["TOKEN"] = jwt::login_token(&key_pair, &target.account, &target.user)?.into();
        } else if let Some(password) = &target.password {
            data["PASSWORD"] = password.as_str().into();
        } else {
            return Err(SnowflakeError::MissingCredentials);
        }

        let mut query = vec![
            ("warehouse", target.warehouse.clone()),
            ("databaseName", target.database.clone()),
            ("schemaName", target.schema.clone()),
            ("request_id", uuid::Uuid::new_v4().to_string()),
        ];
        if let Some(role) = &target.role {
            query.push(("roleName", role.clone()));
        }

        log::debug!("Logging in to {host} as {}", target.user);
        let login: LoginData = http
            .post(format!("{host}/session/v1/login-request"))
            .query(&query)
            .json(&serde_json::json!({ "data": data }))
            .send()
            .await?
            .error_for_status()?
            .json::<SnowflakeWireResult<LoginData>>()
            .await?
            .into_result()?;
        log::info!("Opened Snowflake session on {host}");

        Ok(Session {
            http,
            host,
            token: login.token,
            sequence_id: 0,
            poll_interval: connector.poll_interval,
            closed: false,
        })
    }

    fn authorization(&self) -> String {
        format!("Snowflake Token=\"{}\"", self.token)
    }

    async fn post<B: Serialize, T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, String)],
        body: &B,
    ) -> SnowflakeResult<SnowflakeWireResult<T>> {
        Ok(self
            .http
            .post(format!("{}{path}", self.host))
            .query(query)
            .header(reqwest::header::AUTHORIZATION, self.authorization())
            .json(body)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?)
    }

    /// Submit a statement and wait for its result
    pub async fn query(&mut self, sql: &str) -> SnowflakeResult<QueryData> {
        self.sequence_id += 1;
        let request_id = uuid::Uuid::new_v4();
        log::debug!("Sending statement {}: {sql}", self.sequence_id);
        let body = serde_json::json!({
            "sqlText": sql,
            "asyncExec": false,
            "sequenceId": self.sequence_id,
            "querySubmissionTime": chrono::Utc::now().timestamp_millis(),
        });
        let mut response: SnowflakeWireResult<QueryData> = self
            .post(
                "/queries/v1/query-request",
                &[("requestId", request_id.to_string())],
                &body,
            )
            .await?;

        while matches!(
            response.code.as_deref(),
            Some(QUERY_IN_PROGRESS | QUERY_IN_PROGRESS_ASYNC)
        ) {
            let Some(result_url) = response
                .data
                .as_ref()
                .and_then(|data| data.get_result_url.clone())
            else {
                break;
            };
            tokio::time::sleep(self.poll_interval).await;
            log::debug!("Statement still running, polling {result_url}");
            response = self
                .http
                .get(format!("{}{result_url}", self.host))
                .header(reqwest::header::AUTHORIZATION, self.authorization())
                .send()
                .await?
                .error_for_status()?
                .json()
                .await?;
        }
        response.into_result()
    }
}

impl Connection for Session {
    async fn execute(&mut self, sql: &str) -> SnowflakeResult<()> {
        let data = self.query(sql).await?;
        if !data.is_upload() {
            return Ok(());
        }
        log::debug!(
            "Query {} asks to upload {} file(s), overwrite={}, auto_compress={}",
            data.query_id.as_deref().unwrap_or("?"),
            data.src_locations.len(),
            data.overwrite,
            data.auto_compress
        );
        let stage = data.stage_info.as_ref().ok_or_else(|| {
            SnowflakeError::UnsupportedFeature("upload response without stage info".into())
        })?;
        for (index, source) in data.src_locations.iter().enumerate() {
            let file =
                transfer::StagedFile::prepare(Path::new(source), stage, data.material_for(index))
                    .await?;
            transfer::upload(&self.http, stage, file).await?;
        }
        Ok(())
    }

    async fn close(mut self) -> SnowflakeResult<()> {
        self.closed = true;
        let response: SnowflakeWireResult<serde_json::Value> = self
            .post("/session", &[("delete", "true".to_owned())], &serde_json::json!({}))
            .await?;
        if !response.success {
            return Err(SnowflakeError::ServerError {
                code: response.code.unwrap_or_default(),
                message: response.message.unwrap_or_default(),
            });
        }
        log::info!("Closed Snowflake session on {}", self.host);
        Ok(())
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        if !self.closed {
            log::warn!("Snowflake session on {} dropped without being closed", self.host);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn target() -> ConnectionTarget {
        serde_yaml_ng::from_str(
            "account: XY12345.eu-west-1\nuser: ANALYST\npassword: pw\nwarehouse: WH\ndatabase: DB\nschema: PUBLIC\n",
        )
        .unwrap()
    }

    #[test]
    fn account_url_defaults_to_snowflakecomputing() {
        assert_eq!(
            account_url(&target()),
            "https://xy12345.eu-west-1.snowflakecomputing.com"
        );
    }

    #[test]
    fn account_url_honours_host_port_and_protocol() {
        let mut target = target();
        target.host = Some("127.0.0.1".into());
        target.port = Some(8080);
        target.protocol = Some("http".into());
        assert_eq!(account_url(&target), "http://127.0.0.1:8080");
    }

    #[tokio::test]
    async fn login_without_credentials_is_refused() {
        let mut target = target();
        target.password = None;
        let err = SnowflakeConnector::default()
            .connect(&target)
            .await
            .unwrap_err();
        assert!(matches!(err, SnowflakeError::MissingCredentials));
    }
}
