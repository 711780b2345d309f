//! Packs carousel children into one zip archive.
//!
//! Per-child fetch failures are non-fatal: a dead CDN link in a ten-item
//! carousel must not deny the other nine. Children are fetched sequentially
//! and written in descriptor order; the filename ordinal is the child's
//! display position, so skipped children leave gaps rather than renumbering.

use std::io::{Cursor, Write};

use futures::StreamExt;
use gramgrab_common::{ChildMedia, FetchError};
use tracing::{info, warn};
use zip::write::SimpleFileOptions;
use zip::ZipWriter;

use crate::deliver::{image_extension, AssetFetcher};

pub const ARCHIVE_FILENAME: &str = "carousel.zip";

/// Fetch every child and return the finished archive bytes. Only a failure
/// to write or finalize the archive itself propagates.
pub async fn pack_carousel(
    children: &[ChildMedia],
    fetcher: &dyn AssetFetcher,
) -> Result<Vec<u8>, FetchError> {
    let mut zip = ZipWriter::new(Cursor::new(Vec::new()));
    let options = SimpleFileOptions::default();
    let mut packed = 0usize;

    for (idx, child) in children.iter().enumerate() {
        let ordinal = idx + 1;

        let (url, ext) = match (&child.video, &child.image) {
            (Some(v), _) => (v.url.as_str(), "mp4"),
            (None, Some(i)) => (i.url.as_str(), image_extension(&i.url)),
            (None, None) => {
                warn!(ordinal, "Carousel child carries no asset url, skipping");
                continue;
            }
        };

        // Buffer the whole child before opening its entry, so a mid-stream
        // failure skips the child instead of corrupting the archive.
        let bytes = match fetch_all(fetcher, url).await {
            Ok(b) => b,
            Err(e) => {
                warn!(ordinal, url, error = %e, "Carousel child fetch failed, skipping");
                continue;
            }
        };

        zip.start_file(format!("media_{ordinal}.{ext}"), options)
            .map_err(|e| FetchError::DownloadFailed(format!("archive entry failed: {e}")))?;
        zip.write_all(&bytes)
            .map_err(|e| FetchError::DownloadFailed(format!("archive write failed: {e}")))?;
        packed += 1;
    }

    // Finalized exactly once, whether zero, some, or all children made it.
    let cursor = zip
        .finish()
        .map_err(|e| FetchError::DownloadFailed(format!("archive finalize failed: {e}")))?;

    info!(total = children.len(), packed, "Carousel archive finalized");
    Ok(cursor.into_inner())
}

async fn fetch_all(fetcher: &dyn AssetFetcher, url: &str) -> Result<Vec<u8>, FetchError> {
    let mut stream = fetcher.fetch(url).await?;
    let mut buf = Vec::new();
    while let Some(chunk) = stream.next().await {
        let chunk =
            chunk.map_err(|e| FetchError::DownloadFailed(format!("stream error: {e}")))?;
        buf.extend_from_slice(&chunk);
    }
    Ok(buf)
}
