use std::collections::HashMap;

use serde::Deserialize;

/// Query response codes meaning the statement is still running
pub const QUERY_IN_PROGRESS: &str = "333333";
pub const QUERY_IN_PROGRESS_ASYNC: &str = "333334";

#[derive(Deserialize, Debug)]
pub struct LoginData {
    pub token: String,
}

/// The `data` of a query response
///
/// Ordinary statements only need the query id. File transfer statements
/// (`PUT`) come back with a `command` and the stage metadata the client
/// needs to move the bytes itself.
#[derive(Deserialize, Debug, Default)]
#[serde(rename_all = "camelCase")]
pub struct QueryData {
    #[serde(default)]
    pub query_id: Option<String>,
    #[serde(default)]
    pub get_result_url: Option<String>,
    #[serde(default)]
    pub command: Option<String>,
    #[serde(default, rename = "src_locations")]
    pub src_locations: Vec<String>,
    #[serde(default)]
    pub auto_compress: bool,
    #[serde(default)]
    pub overwrite: bool,
    #[serde(default)]
    pub stage_info: Option<StageInfo>,
    #[serde(default)]
    pub encryption_material: Option<OneOrMany<EncryptionMaterial>>,
}

impl QueryData {
    pub fn is_upload(&self) -> bool {
        self.command.as_deref() == Some("UPLOAD")
    }

    /// Encryption material for the `index`th source file
    pub fn material_for(&self, index: usize) -> Option<&EncryptionMaterial> {
        match self.encryption_material.as_ref()? {
            OneOrMany::One(material) => Some(material),
            OneOrMany::Many(materials) => materials.get(index).or(materials.first()),
        }
    }
}

#[derive(Deserialize, Debug)]
#[serde(untagged)]
pub enum OneOrMany<T> {
    One(T),
    Many(Vec<T>),
}

/// Where a stage keeps its files and how to reach them
#[derive(Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct StageInfo {
    pub location_type: String,
    /// `bucket/prefix/` for cloud stages, a directory for `LOCAL_FS`
    pub location: String,
    #[serde(default)]
    pub region: Option<String>,
    #[serde(default)]
    pub end_point: Option<String>,
    #[serde(default)]
    pub storage_account: Option<String>,
    #[serde(default)]
    pub presigned_url: Option<String>,
    #[serde(default, rename = "useS3RegionalUrl")]
    pub use_s3_regional_url: bool,
    #[serde(default = "client_side_encrypted")]
    pub is_client_side_encrypted: bool,
    #[serde(default)]
    pub creds: HashMap<String, serde_json::Value>,
}

fn client_side_encrypted() -> bool {
    true
}

impl StageInfo {
    pub fn credential(&self, name: &str) -> Option<&str> {
        self.creds.get(name).and_then(|value| value.as_str())
    }

    /// Split `location` into its bucket (or container) and key prefix
    pub fn bucket_and_prefix(&self) -> (&str, String) {
        let (bucket, prefix) = self
            .location
            .split_once('/')
            .unwrap_or((self.location.as_str(), ""));
        let mut prefix = prefix.to_owned();
        if !prefix.is_empty() && !prefix.ends_with('/') {
            prefix.push('/');
        }
        (bucket, prefix)
    }
}

#[derive(Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct EncryptionMaterial {
    pub query_stage_master_key: String,
    pub query_id: String,
    pub smk_id: i64,
}

#[cfg(test)]
mod tests {
    use super::*;

    const PUT_RESPONSE: &str = r#"{
        "command": "UPLOAD",
        "src_locations": ["/tmp/brewdata_lib.zip"],
        "autoCompress": false,
        "overwrite": true,
        "stageInfo": {
            "locationType": "S3",
            "location": "sfc-stage-bucket/abcd/stages/1234",
            "region": "eu-west-1",
            "creds": {"AWS_KEY_ID": "AKID", "AWS_SECRET_KEY": "SECRET", "AWS_TOKEN": "TOKEN"},
            "endPoint": null
        },
        "encryptionMaterial": [
            {"queryStageMasterKey": "AAAAAAAAAAAAAAAAAAAAAA==", "queryId": "01b2", "smkId": 42}
        ]
    }"#;

    #[test]
    fn upload_command_carries_stage_metadata() {
        let data: QueryData = serde_json::from_str(PUT_RESPONSE).unwrap();
        assert!(data.is_upload());
        assert!(data.overwrite);
        assert!(!data.auto_compress);
        let stage = data.stage_info.as_ref().unwrap();
        assert!(stage.is_client_side_encrypted);
        assert_eq!(stage.credential("AWS_TOKEN"), Some("TOKEN"));
        let (bucket, prefix) = stage.bucket_and_prefix();
        assert_eq!(bucket, "sfc-stage-bucket");
        assert_eq!(prefix, "abcd/stages/1234/");
        assert_eq!(data.material_for(0).unwrap().smk_id, 42);
    }

    #[test]
    fn single_encryption_material_is_accepted() {
        let data: QueryData = serde_json::from_str(
            r#"{"encryptionMaterial": {"queryStageMasterKey": "k", "queryId": "q", "smkId": 7}}"#,
        )
        .unwrap();
        assert!(!data.is_upload());
        assert_eq!(data.material_for(3).unwrap().query_id, "q");
    }
}
