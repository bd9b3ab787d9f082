use std::path::PathBuf;
use std::process::Stdio;

use async_trait::async_trait;
use mediacage::{BoxError, DownloadRequest, MediaDownloader};
use tokio::process::Command;
use tracing::{debug, info};

/// Hands the authorized stream to `yt-dlp`, which handles the HLS playlist,
/// segment download and AES-128 decryption.
#[derive(Debug, Clone)]
pub struct YtDlpDownloader {
    pub binary: PathBuf,
    pub output_dir: Option<PathBuf>,
    /// Overrides the title found on the embed page.
    pub name: Option<String>,
    pub concurrent_fragments: u32,
}

impl YtDlpDownloader {
    pub fn file_name(&self, request: &DownloadRequest) -> String {
        let stem = self
            .name
            .as_deref()
            .or(request.title.as_deref())
            .unwrap_or("video");
        if stem.ends_with(".mp4") {
            stem.to_string()
        } else {
            format!("{stem}.mp4")
        }
    }

    pub fn build_args(&self, request: &DownloadRequest) -> Vec<String> {
        let file_name = self.file_name(request);
        let mut args: Vec<String> = [
            "--no-warnings",
            "--no-check-certificates",
            "--no-part",
            "--restrict-filenames",
            "--windows-filenames",
            "--abort-on-unavailable-fragments",
            "--retries",
            "infinite",
            "--fragment-retries",
            "infinite",
            "--extractor-retries",
            "infinite",
        ]
        .into_iter()
        .map(String::from)
        .collect();

        args.push("--concurrent-fragments".into());
        args.push(self.concurrent_fragments.to_string());
        args.push("-o".into());
        args.push(file_name.clone());

        if let Some(dir) = &self.output_dir {
            args.push("--paths".into());
            args.push(format!("home:{}", dir.display()));
        }
        args.push("--paths".into());
        args.push(format!("temp:.{file_name}/"));

        for (name, value) in &request.headers {
            args.push("--add-header".into());
            args.push(format!("{name}:{value}"));
        }
        if let Some(cookie) = request.cookie_header() {
            args.push("--add-header".into());
            args.push(format!("Cookie:{cookie}"));
        }

        args.push(request.url.clone());
        args
    }
}

#[async_trait]
impl MediaDownloader for YtDlpDownloader {
    async fn download(&self, request: &DownloadRequest) -> Result<(), BoxError> {
        let args = self.build_args(request);
        info!(
            "Downloading {} with {}",
            self.file_name(request),
            self.binary.display()
        );
        debug!("yt-dlp arguments: {} total", args.len());

        let status = Command::new(&self.binary)
            .args(&args)
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .status()
            .await
            .map_err(|e| format!("failed to launch {}: {e}", self.binary.display()))?;

        if !status.success() {
            return Err(format!("yt-dlp exited with {status}").into());
        }
        Ok(())
    }
}
