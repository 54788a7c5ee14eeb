//! Moves a file into stage storage after a `PUT` statement hands back the
//! stage's location and short-lived credentials.
use std::path::Path;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use hmac::{Hmac, Mac};
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, CONTENT_TYPE};
use sha2::{Digest, Sha256};

use crate::encryption::{self, EncryptionMetadata};
use crate::errors::{SnowflakeError, SnowflakeResult};
use crate::response::{EncryptionMaterial, StageInfo};

/// A file ready to be written to a stage
#[derive(Debug)]
pub struct StagedFile {
    pub name: String,
    pub body: Vec<u8>,
    /// Base64 SHA-256 of the plaintext
    pub digest: String,
    pub encryption: Option<EncryptionMetadata>,
}

impl StagedFile {
    /// Read `path` and encrypt it when the stage asks for it
    pub async fn prepare(
        path: &Path,
        stage: &StageInfo,
        material: Option<&EncryptionMaterial>,
    ) -> SnowflakeResult<StagedFile> {
        let name = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .ok_or_else(|| {
                SnowflakeError::UnsupportedFeature(format!("uploading {}", path.display()))
            })?;
        let plain = tokio::fs::read(path).await?;
        let digest = BASE64.encode(Sha256::digest(&plain));

        let (body, encryption) = match material {
            Some(material)
                if stage.is_client_side_encrypted && stage.location_type != "LOCAL_FS" =>
            {
                let (body, meta) = encryption::encrypt(material, &plain)?;
                (body, Some(meta))
            }
            _ => (plain, None),
        };
        Ok(StagedFile {
            name,
            body,
            digest,
            encryption,
        })
    }
}

/// Write `file` to wherever `stage` points, replacing any file of the same name
pub async fn upload(
    http: &reqwest::Client,
    stage: &StageInfo,
    file: StagedFile,
) -> SnowflakeResult<()> {
    log::debug!(
        "Uploading {} ({} bytes) to {} stage at {}",
        file.name,
        file.body.len(),
        stage.location_type,
        stage.location
    );
    match stage.location_type.as_str() {
        "S3" => upload_s3(http, stage, file).await,
        "AZURE" => upload_azure(http, stage, file).await,
        "GCS" => upload_gcs(http, stage, file).await,
        "LOCAL_FS" => upload_local(stage, file).await,
        other => Err(SnowflakeError::UnsupportedFeature(format!(
            "stage location type {other}"
        ))),
    }
}

async fn upload_local(stage: &StageInfo, file: StagedFile) -> SnowflakeResult<()> {
    let dir = Path::new(&stage.location);
    tokio::fs::create_dir_all(dir).await?;
    tokio::fs::write(dir.join(&file.name), &file.body).await?;
    Ok(())
}

async fn upload_s3(
    http: &reqwest::Client,
    stage: &StageInfo,
    file: StagedFile,
) -> SnowflakeResult<()> {
    let (bucket, prefix) = stage.bucket_and_prefix();
    let region = stage.region.as_deref().unwrap_or("us-east-1");
    let host = match &stage.end_point {
        Some(end_point) if !end_point.is_empty() => format!("{bucket}.{end_point}"),
        _ if stage.use_s3_regional_url || region != "us-east-1" => {
            format!("{bucket}.s3.{region}.amazonaws.com")
        }
        _ => format!("{bucket}.s3.amazonaws.com"),
    };
    let key = format!("{prefix}{}", file.name);

    let mut metadata = vec![("x-amz-meta-sfc-digest", file.digest.clone())];
    if let Some(meta) = &file.encryption {
        metadata.push(("x-amz-meta-x-amz-key", meta.wrapped_key.clone()));
        metadata.push(("x-amz-meta-x-amz-iv", meta.iv.clone()));
        metadata.push(("x-amz-meta-x-amz-matdesc", meta.matdesc.clone()));
    }
    if let Some(token) = stage.credential("AWS_TOKEN") {
        metadata.push(("x-amz-security-token", token.to_owned()));
    }

    let signer = SigV4 {
        access_key: stage.credential("AWS_KEY_ID").unwrap_or_default(),
        secret_key: stage.credential("AWS_SECRET_KEY").unwrap_or_default(),
        region,
        now: chrono::Utc::now(),
    };
    let headers = signer.sign_put(&host, &key, &metadata, &file.body)?;
    let url = format!("https://{host}/{}", uri_encode(&key));
    send(http.put(url).headers(headers), file).await
}

async fn upload_azure(
    http: &reqwest::Client,
    stage: &StageInfo,
    file: StagedFile,
) -> SnowflakeResult<()> {
    let (container, prefix) = stage.bucket_and_prefix();
    let account = stage.storage_account.as_deref().ok_or_else(|| {
        SnowflakeError::UnsupportedFeature("Azure stage without a storage account".into())
    })?;
    let end_point = stage
        .end_point
        .as_deref()
        .unwrap_or("blob.core.windows.net");
    let sas = stage.credential("AZURE_SAS_TOKEN").unwrap_or_default();
    let url = format!(
        "https://{account}.{end_point}/{container}/{}?{}",
        uri_encode(&format!("{prefix}{}", file.name)),
        sas.trim_start_matches('?')
    );

    let mut headers = HeaderMap::new();
    headers.insert("x-ms-blob-type", HeaderValue::from_static("BlockBlob"));
    headers.insert("x-ms-meta-sfcdigest", file.digest.parse()?);
    if let Some(meta) = &file.encryption {
        headers.insert("x-ms-meta-encryptiondata", meta.encryption_data().parse()?);
        headers.insert("x-ms-meta-matdesc", meta.matdesc.parse()?);
    }
    send(http.put(url).headers(headers), file).await
}

async fn upload_gcs(
    http: &reqwest::Client,
    stage: &StageInfo,
    file: StagedFile,
) -> SnowflakeResult<()> {
    let mut headers = HeaderMap::new();
    headers.insert("x-goog-meta-sfc-digest", file.digest.parse()?);
    if let Some(meta) = &file.encryption {
        headers.insert("x-goog-meta-encryptiondata", meta.encryption_data().parse()?);
        headers.insert("x-goog-meta-matdesc", meta.matdesc.parse()?);
    }

    let presigned_url = stage.presigned_url.as_deref().filter(|url| !url.is_empty());
    let request = if let Some(url) = presigned_url {
        http.put(url)
    } else if let Some(token) = stage.credential("GCS_ACCESS_TOKEN") {
        let (bucket, prefix) = stage.bucket_and_prefix();
        let object = uri_encode(&format!("{prefix}{}", file.name));
        http.put(format!("https://storage.googleapis.com/{bucket}/{object}"))
            .bearer_auth(token)
    } else {
        return Err(SnowflakeError::UnsupportedFeature(
            "GCS stage without a presigned URL or access token".into(),
        ));
    };
    send(request.headers(headers), file).await
}

async fn send(request: reqwest::RequestBuilder, file: StagedFile) -> SnowflakeResult<()> {
    let response = request
        .header(CONTENT_TYPE, "application/octet-stream")
        .body(file.body)
        .send()
        .await?;
    let status = response.status();
    if status.is_success() {
        Ok(())
    } else {
        Err(SnowflakeError::Storage {
            file: file.name,
            status,
            body: response.text().await.unwrap_or_default(),
        })
    }
}

/// AWS Signature Version 4 for a single-object `PUT`
struct SigV4<'a> {
    access_key: &'a str,
    secret_key: &'a str,
    region: &'a str,
    now: chrono::DateTime<chrono::Utc>,
}

impl SigV4<'_> {
    /// Every header the request needs, `Authorization` included
    fn sign_put(
        &self,
        host: &str,
        key: &str,
        extra: &[(&str, String)],
        body: &[u8],
    ) -> SnowflakeResult<HeaderMap> {
        let amz_date = self.now.format("%Y%m%dT%H%M%SZ").to_string();
        let date = self.now.format("%Y%m%d").to_string();
        let payload_hash = hex::encode(Sha256::digest(body));

        let mut signed: Vec<(String, String)> = vec![
            ("content-type".into(), "application/octet-stream".into()),
            ("host".into(), host.into()),
            ("x-amz-content-sha256".into(), payload_hash.clone()),
            ("x-amz-date".into(), amz_date.clone()),
        ];
        signed.extend(
            extra
                .iter()
                .map(|(name, value)| (name.to_ascii_lowercase(), value.trim().to_owned())),
        );
        signed.sort();

        let canonical_headers: String = signed
            .iter()
            .map(|(name, value)| format!("{name}:{value}\n"))
            .collect();
        let signed_headers = signed
            .iter()
            .map(|(name, _)| name.as_str())
            .collect::<Vec<_>>()
            .join(";");
        let canonical_request = format!(
            "PUT\n/{}\n\n{canonical_headers}\n{signed_headers}\n{payload_hash}",
            uri_encode(key)
        );

        let scope = format!("{date}/{}/s3/aws4_request", self.region);
        let string_to_sign = format!(
            "AWS4-HMAC-SHA256\n{amz_date}\n{scope}\n{}",
            hex::encode(Sha256::digest(canonical_request.as_bytes()))
        );
        let signing_key = [self.region, "s3", "aws4_request"].iter().try_fold(
            hmac_sha256(format!("AWS4{}", self.secret_key).as_bytes(), date.as_bytes())?,
            |key, part| hmac_sha256(&key, part.as_bytes()),
        )?;
        let signature = hex::encode(hmac_sha256(&signing_key, string_to_sign.as_bytes())?);

        let mut headers = HeaderMap::with_capacity(signed.len() + 1);
        // `host` comes from the URL and `send` sets the content type
        for (name, value) in signed
            .iter()
            .filter(|(name, _)| name != "host" && name != "content-type")
        {
            let header = HeaderName::from_bytes(name.as_bytes()).map_err(|_| {
                SnowflakeError::UnsupportedFeature(format!("header name {name}"))
            })?;
            headers.insert(header, value.parse()?);
        }
        headers.insert(
            reqwest::header::AUTHORIZATION,
            format!(
                "AWS4-HMAC-SHA256 Credential={}/{scope}, SignedHeaders={signed_headers}, Signature={signature}",
                self.access_key
            )
            .parse()?,
        );
        Ok(headers)
    }
}

fn hmac_sha256(key: &[u8], data: &[u8]) -> SnowflakeResult<Vec<u8>> {
    let mut mac = <Hmac<Sha256> as Mac>::new_from_slice(key)
        .map_err(|_| SnowflakeError::EncryptionKey(key.len()))?;
    mac.update(data);
    Ok(mac.finalize().into_bytes().to_vec())
}

/// RFC 3986 percent-encoding of an object key, keeping `/`
fn uri_encode(input: &str) -> String {
    let mut encoded = String::with_capacity(input.len());
    for byte in input.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => {
                encoded.push(byte as char)
            }
            b'/' => encoded.push('/'),
            _ => encoded.push_str(&format!("%{byte:02X}")),
        }
    }
    encoded
}
