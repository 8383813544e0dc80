//! ---
//! termup_section: "05-networking-external-interfaces"
//! termup_subsection: "binary"
//! termup_type: "source"
//! termup_scope: "code"
//! termup_description: "Operator CLI talking to the update service."
//! termup_version: "v0.1.0"
//! termup_owner: "tbd"
//! ---
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{anyhow, bail, Context, Result};
use clap::Args;
use reqwest::multipart::{Form, Part};
use reqwest::{Client, Response};
use termup_manifest::{
    CheckUpdateResponse, ErrorBody, Manifest, PublishResponse, ARTIFACT_CONTENT_TYPE,
};
use tokio::runtime::Runtime;
use tracing::{debug, info};
use url::Url;

/// Connection options shared by every command.
#[derive(Debug, Args)]
pub struct ServerArgs {
    /// Base URL of the update service.
    #[arg(
        long,
        env = "TERMUP_SERVER_URL",
        default_value = "http://127.0.0.1:8080",
        value_name = "URL"
    )]
    pub server: Url,

    /// Request timeout in seconds.
    #[arg(long, default_value_t = 300, value_name = "SECS")]
    pub timeout: u64,
}

/// Arguments of `termupctl publish`.
#[derive(Debug, Args)]
pub struct PublishArgs {
    #[command(flatten)]
    pub server: ServerArgs,

    /// Version the package installs.
    #[arg(long = "version", value_name = "VERSION")]
    pub release: String,

    /// Zip archive to upload.
    #[arg(value_name = "FILE")]
    pub package: PathBuf,
}

/// Arguments of `termupctl check`.
#[derive(Debug, Args)]
pub struct CheckArgs {
    #[command(flatten)]
    pub server: ServerArgs,

    /// Version the terminal reports.
    #[arg(long = "version", value_name = "VERSION", default_value = "0.0.0")]
    pub local: String,
}

/// Upload a package and print the published version.
pub fn publish(args: PublishArgs) -> Result<()> {
    let package = std::fs::read(&args.package)
        .with_context(|| format!("unable to read package {}", args.package.display()))?;
    if package.is_empty() {
        bail!("package {} is empty", args.package.display());
    }
    let file_name = args
        .package
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| "package.zip".to_owned());
    let url = endpoint(&args.server.server, &["upload_update"]);
    info!(url = %url, version = %args.release, bytes = package.len(), "uploading package");

    let form = Form::new().text("version", args.release.clone()).part(
        "file",
        Part::bytes(package)
            .file_name(file_name)
            .mime_str(ARTIFACT_CONTENT_TYPE)?,
    );
    let response: PublishResponse = block_on(async {
        let response = client(&args.server)?
            .post(url)
            .multipart(form)
            .send()
            .await
            .context("upload request failed")?;
        decode(response).await
    })?;
    println!("{} {}", response.status, response.version);
    Ok(())
}

/// Run an update check for `args.local` and print the answer.
pub fn check(args: CheckArgs) -> Result<()> {
    let url = endpoint(&args.server.server, &["check_update"]);
    let response: CheckUpdateResponse = block_on(async {
        let response = client(&args.server)?
            .get(url)
            .query(&[("version", args.local.as_str())])
            .send()
            .await
            .context("update check failed")?;
        decode(response).await
    })?;
    if response.update_available {
        println!(
            "Current: {}\nLatest: {}\nUpdate Available: true\nURL: {}",
            args.local,
            response.latest_version.as_deref().unwrap_or("unknown"),
            response.url.as_deref().unwrap_or("none")
        );
    } else {
        println!("Current: {}\nUpdate Available: false", args.local);
    }
    Ok(())
}

/// Print the manifest the service currently serves.
pub fn manifest(args: ServerArgs) -> Result<()> {
    let url = endpoint(&args.server, &["manifest"]);
    let manifest: Manifest = block_on(async {
        let response = client(&args)?
            .get(url)
            .send()
            .await
            .context("manifest request failed")?;
        decode(response).await
    })?;
    println!("{}", serde_json::to_string_pretty(&manifest)?);
    Ok(())
}

fn block_on<T>(future: impl std::future::Future<Output = Result<T>>) -> Result<T> {
    let runtime = Runtime::new()?;
    runtime.block_on(future)
}

fn client(args: &ServerArgs) -> Result<Client> {
    Client::builder()
        .timeout(Duration::from_secs(args.timeout))
        .build()
        .context("failed to build HTTP client")
}

fn endpoint(base: &Url, segments: &[&str]) -> Url {
    let mut url = base.clone();
    if let Ok(mut path) = url.path_segments_mut() {
        path.pop_if_empty().extend(segments);
    }
    url
}

async fn decode<T: serde::de::DeserializeOwned>(response: Response) -> Result<T> {
    let status = response.status();
    debug!(%status, "response received");
    if status.is_success() {
        return response
            .json::<T>()
            .await
            .context("unexpected response body");
    }
    let text = response.text().await.unwrap_or_default();
    let message = serde_json::from_str::<ErrorBody>(&text)
        .map(|body| body.error)
        .unwrap_or(text);
    Err(anyhow!("server returned HTTP {status}: {message}"))
}
