//! Download of the packaged code bundle.
use std::path::{Path, PathBuf};

use reqwest::header::CONTENT_LENGTH;
use tokio::io::AsyncWriteExt;

use crate::console::Console;
use crate::errors::{SetupError, SetupResult};

/// The artifact always lands under this name, whatever the URL is called
pub const PACKAGE_FILE_NAME: &str = "brewdata_lib.zip";

/// Release asset downloaded when no `--url` is given
pub const DEFAULT_PACKAGE_URL: &str =
    "https://github.com/vaidikcs/ttd/releases/download/main/brewdata_lib.zip";

/// Bodies larger than this get a progress bar
pub const PROGRESS_THRESHOLD: u64 = 1024 * 1024;

const PROGRESS_WIDTH: u64 = 50;
const BLOCK_SIZE: usize = 1024;
const MIB: u64 = 1024 * 1024;

/// A package on local disk
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadedArtifact {
    pub path: PathBuf,
    /// `Content-Length` of the download, 0 when unknown or when an existing file was reused
    pub declared_len: u64,
    pub reused: bool,
}

#[derive(Debug, Clone)]
pub struct PackageFetcher {
    http: reqwest::Client,
}

impl PackageFetcher {
    pub fn new() -> SetupResult<PackageFetcher> {
        let http = reqwest::Client::builder()
            .user_agent(concat!(
                env!("CARGO_PKG_NAME"),
                '/',
                env!("CARGO_PKG_VERSION")
            ))
            .build()?;
        Ok(PackageFetcher { http })
    }

    /// Put the package from `url` into `dest_dir`
    ///
    /// A package already in `dest_dir` is reused if the user says so,
    /// without any network traffic. Otherwise it is downloaded over it.
    pub async fn fetch<C: Console>(
        &self,
        dest_dir: &Path,
        url: &str,
        console: &mut C,
    ) -> SetupResult<DownloadedArtifact> {
        let path = dest_dir.join(PACKAGE_FILE_NAME);

        if path.exists() {
            let answer = console.ask(&format!(
                "Found {PACKAGE_FILE_NAME} in {}. Use this file? (y/n): ",
                dest_dir.display()
            ))?;
            if answer.trim().eq_ignore_ascii_case("y") {
                console.say(&format!("Using existing file at {}", path.display()));
                return Ok(DownloadedArtifact {
                    path,
                    declared_len: 0,
                    reused: true,
                });
            }
        }

        console.say(&format!("Downloading BrewData package from {url}..."));
        let mut response = self.http.get(url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(SetupError::DownloadFailed {
                url: url.to_owned(),
                status,
            });
        }

        // Read the header itself: reqwest hides the length of decoded bodies
        let total = response
            .headers()
            .get(CONTENT_LENGTH)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.trim().parse::<u64>().ok())
            .unwrap_or(0);
        log::debug!("{url} declares {total} bytes");

        let mut file = tokio::fs::File::create(&path).await?;
        if total > PROGRESS_THRESHOLD {
            console.say(&format!("Downloading {}MB file...", total / MIB));
            let mut downloaded = 0u64;
            while let Some(chunk) = response.chunk().await? {
                for block in chunk.chunks(BLOCK_SIZE) {
                    file.write_all(block).await?;
                    downloaded += block.len() as u64;
                    console.write(&format!("\r{}", progress_bar(downloaded, total)));
                }
            }
            console.say("");
        } else {
            file.write_all(&response.bytes().await?).await?;
        }
        file.flush().await?;

        console.say(&format!("Package downloaded to {}", path.display()));
        Ok(DownloadedArtifact {
            path,
            declared_len: total,
            reused: false,
        })
    }
}

/// `[=====     ] 2MB/5MB`, fifty columns wide
pub fn progress_bar(downloaded: u64, total: u64) -> String {
    let done = match total {
        0 => PROGRESS_WIDTH,
        _ => (PROGRESS_WIDTH * downloaded / total).min(PROGRESS_WIDTH),
    };
    let done = done as usize;
    format!(
        "[{}{}] {}MB/{}MB",
        "=".repeat(done),
        " ".repeat(PROGRESS_WIDTH as usize - done),
        downloaded / MIB,
        total / MIB
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn progress_bar_fills_proportionally() {
        assert_eq!(
            progress_bar(0, 5 * MIB),
            format!("[{}] 0MB/5MB", " ".repeat(50))
        );
        assert_eq!(
            progress_bar(2 * MIB + MIB / 2, 5 * MIB),
            format!("[{}{}] 2MB/5MB", "=".repeat(25), " ".repeat(25))
        );
        assert_eq!(
            progress_bar(5 * MIB, 5 * MIB),
            "[==================================================] 5MB/5MB"
        );
    }

    #[test]
    fn progress_bar_never_overflows() {
        assert_eq!(progress_bar(6 * MIB, 5 * MIB).matches('=').count(), 50);
    }
}
